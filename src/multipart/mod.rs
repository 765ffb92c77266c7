//! Parallel chunked transfers
//!
//! This module provides:
//! - Range math for splitting an object into chunks
//! - The eligibility decider and chunk planner
//! - The chunk writer capability, native or adapted from random-access writes
//! - Per-chunk copying with streamed or buffered reads
//! - The coordinator that runs a transfer with bounded parallelism

mod adapter;
mod buffer;
mod coordinator;
mod copier;
mod offset;
mod planner;
mod range;
mod reader;
mod writer;

pub use adapter::*;
pub use buffer::*;
pub use coordinator::*;
pub use copier::*;
pub use offset::*;
pub use planner::*;
pub use range::*;
pub use reader::*;
pub use writer::*;
