//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the sound runtime:
//! - Math types for 3D positioning
//! - Slot tables for fixed-capacity arenas
//! - Logging utilities

pub mod collections;
pub mod logging;
pub mod math;
