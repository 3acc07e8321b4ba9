//! # Synchronization Primitives
//!
//! ## The Problem
//!
//! ```text
//! Thread 1 (Simulation):  WRITE particle snapshots
//! Thread 2 (Render):      READ particle snapshots
//! ```
//!
//! ## The Solution: Double Buffering
//!
//! ```text
//! Frame N:
//!   Simulation writes to Buffer A
//!   Render reads from Buffer B (last frame's state)
//!
//! Frame N+1:
//!   SWAP (atomic index flip)
//!   Simulation writes to Buffer B
//!   Render reads from Buffer A
//! ```

mod double_buffer;

pub use double_buffer::{DoubleBuffer, ReadHandle, WriteHandle};
