//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the dashboard core:
//! - Math types and camera projection
//! - Bounded collections and double buffering
//! - Clocks and tick timing
//! - Logging utilities

pub mod collections;
pub mod logging;
pub mod math;
pub mod time;
