//! # Memory Management
//!
//! Handle-addressed storage for objects that are shared by several owners
//! and released explicitly.

mod arena;

pub use arena::{Arena, Handle};
