//! # EMBER Core
//!
//! Building blocks shared by the particle engine and its hosts:
//! - `math`: plain-old-data vectors, colors and bounds
//! - `memory`: generation-checked handle arena
//! - `sync`: double buffer for the simulation -> render hand-off
//!
//! ## Architecture Rules
//!
//! 1. **Everything stored in a particle record is `Pod`**
//! 2. **Handles, not references** - shared objects live in arenas
//! 3. **The producer never waits on a consumer**

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod math;
pub mod memory;
pub mod sync;

pub use math::{Aabb, LinearColor, Vec3, KINDA_SMALL_NUMBER, TWO_PI};
pub use memory::{Arena, Handle};
pub use sync::{DoubleBuffer, ReadHandle, WriteHandle};
