//! Progress reporting
//!
//! Terminal display of a running transfer: bytes with rate and ETA, and
//! chunks finished or in flight.

mod reporter;

pub use reporter::*;
