//! # UI Module
//!
//! This module contains the layout components for the ToneMeter application.

pub mod main_display;
