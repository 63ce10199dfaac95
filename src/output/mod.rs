//! Output module for discovery results.
//!
//! This module handles:
//! - Colored console output
//! - JSON output formatting
//! - The progress spinner shown while a run is in flight

pub mod console;

pub use console::ConsoleOutput;
