//! Error types for the particle engine.
//!
//! Only configuration and construction paths return these. A running tick
//! absorbs soft conditions instead of failing.

use thiserror::Error;

/// Errors that can occur while building or initializing particle data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParticleError {
    /// The per-particle record would exceed the addressable stride.
    #[error("payload layout overflow: stride {stride} exceeds maximum {max}")]
    LayoutOverflow {
        /// Required record stride in bytes.
        stride: usize,
        /// Configured maximum stride.
        max: usize,
    },

    /// A LOD level has no Required module.
    #[error("LOD level {0} has no Required module")]
    MissingRequired(usize),

    /// A LOD level has no Spawn module.
    #[error("LOD level {0} has no Spawn module")]
    MissingSpawn(usize),

    /// A resize asked for more particles than the hard limit allows.
    #[error("particle capacity exceeded: requested {requested}, max {max}")]
    CapacityExceeded {
        /// Requested capacity.
        requested: usize,
        /// Configured hard limit.
        max: usize,
    },

    /// A LOD index does not exist.
    #[error("LOD index {index} out of range (count {count})")]
    LodOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of LOD levels.
        count: usize,
    },

    /// Too many LOD levels for the validity bitmask.
    #[error("LOD level limit reached: {0}")]
    TooManyLodLevels(usize),

    /// The last LOD level cannot be deleted.
    #[error("cannot delete the only LOD level")]
    LastLodLevel,

    /// A module slot does not exist on the level.
    #[error("invalid module slot {slot} on LOD level {lod}")]
    InvalidModuleSlot {
        /// LOD level.
        lod: usize,
        /// Slot description.
        slot: String,
    },

    /// A module handle no longer resolves.
    #[error("stale module handle {0}")]
    StaleModule(usize),

    /// Slot roles are fixed: Required, Spawn and Type-Data modules only go
    /// in their own slots.
    #[error("module {kind} cannot be placed in slot {slot}")]
    WrongSlotKind {
        /// Module kind name.
        kind: &'static str,
        /// Slot description.
        slot: String,
    },

    /// A LOD validity bitmask or module list violates the sharing rules.
    #[error("inconsistent LOD data: {0}")]
    InconsistentLod(String),

    /// The LOD distance table is not strictly increasing from zero.
    #[error("invalid LOD distance table: {0}")]
    InvalidLodDistances(String),

    /// An emitter index does not exist in the system.
    #[error("emitter index {index} out of range (count {count})")]
    EmitterOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of emitters.
        count: usize,
    },

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// TOML parse error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config file could not be read.
    #[error("config I/O error: {0}")]
    ConfigIo(String),
}

/// Result type for particle operations.
pub type ParticleResult<T> = Result<T, ParticleError>;

impl From<toml::de::Error> for ParticleError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<std::io::Error> for ParticleError {
    fn from(err: std::io::Error) -> Self {
        Self::ConfigIo(err.to_string())
    }
}
