//! Configuration module for MultiCopy
//!
//! Provides CLI arguments and the runtime settings handed explicitly to the
//! transfer engine.

mod settings;

pub use settings::*;
