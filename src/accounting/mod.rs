//! Transfer accounting
//!
//! Byte counting, chunk counting and bandwidth limiting for a transfer.

mod account;
mod throttle;

pub use account::*;
pub use throttle::*;
