//! # Engine Configuration
//!
//! Tunables loaded once at startup from TOML. Every field has a default, so
//! an empty document is a valid config.
//!
//! ```toml
//! seed = 1337
//! max_particles_per_emitter = 20000
//!
//! [lod_generation]
//! lowest_lod_percentage = 25
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ParticleError, ParticleResult};
use crate::particle::PARTICLE_HEADER_SIZE;

/// How a lower LOD level is derived from a higher one.
///
/// The percentage is a visual-quality heuristic, not a correctness rule:
/// hosts are free to tune it or switch individual scalings off.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodGenerationPolicy {
    /// Percentage used when auto-generating the lowest LOD level.
    pub lowest_lod_percentage: u32,
    /// Percentage used for trail and beam emitters, whose particle counts
    /// are structural.
    pub trail_beam_percentage: u32,
    /// Scale the spawn-rate distribution.
    pub scale_spawn_rate: bool,
    /// Scale burst counts.
    pub scale_burst_counts: bool,
}

impl LodGenerationPolicy {
    /// Percentage to use for an auto-generated lowest level.
    #[must_use]
    pub fn percentage_for(&self, is_trail_or_beam: bool, duplicate_highest: bool) -> u32 {
        if duplicate_highest {
            100
        } else if is_trail_or_beam {
            self.trail_beam_percentage
        } else {
            self.lowest_lod_percentage
        }
    }

    /// Multiplier for a percentage.
    #[inline]
    #[must_use]
    pub fn factor(percentage: u32) -> f32 {
        percentage as f32 / 100.0
    }

    /// Scales a discrete count, truncating.
    #[inline]
    #[must_use]
    pub fn scale_count(count: i32, percentage: u32) -> i32 {
        (count as f32 * Self::factor(percentage)) as i32
    }
}

impl Default for LodGenerationPolicy {
    fn default() -> Self {
        Self {
            lowest_lod_percentage: 10,
            trail_beam_percentage: 100,
            scale_spawn_rate: true,
            scale_burst_counts: true,
        }
    }
}

/// Engine-wide configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard ceiling for any emitter's particle buffer.
    pub max_particles_per_emitter: usize,
    /// Largest allowed particle record stride in bytes.
    pub max_particle_stride: usize,
    /// Upper bound on the initial allocation of a new instance.
    pub initial_allocation_cap: usize,
    /// Initial allocation when a template has no count hint.
    pub fallback_initial_allocation: usize,
    /// Resizes during ticks shorter than this update the template's peak
    /// active statistic.
    pub peak_active_update_delta: f32,
    /// LOD generation policy.
    pub lod_generation: LodGenerationPolicy,
    /// Capacity of the bounded external event channel.
    pub event_channel_capacity: usize,
    /// Base seed for per-instance random streams.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_particles_per_emitter: 65_536,
            max_particle_stride: 65_535,
            initial_allocation_cap: 100,
            fallback_initial_allocation: 10,
            peak_active_update_delta: 0.1,
            lod_generation: LodGenerationPolicy::default(),
            event_channel_capacity: 1024,
            seed: 0x00E3_BE12,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or out-of-range values.
    pub fn from_toml_str(source: &str) -> ParticleResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> ParticleResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&source)?;
        tracing::info!("Loaded particle config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ParticleError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> ParticleResult<()> {
        if self.max_particles_per_emitter == 0 {
            return Err(ParticleError::InvalidConfig(
                "max_particles_per_emitter must be positive".into(),
            ));
        }
        if self.max_particle_stride < PARTICLE_HEADER_SIZE {
            return Err(ParticleError::InvalidConfig(format!(
                "max_particle_stride {} is smaller than the particle header ({PARTICLE_HEADER_SIZE})",
                self.max_particle_stride
            )));
        }
        if self.fallback_initial_allocation == 0 {
            return Err(ParticleError::InvalidConfig(
                "fallback_initial_allocation must be positive".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ParticleError::InvalidConfig(
                "event_channel_capacity must be positive".into(),
            ));
        }
        if self.lod_generation.lowest_lod_percentage > 100
            || self.lod_generation.trail_beam_percentage > 100
        {
            return Err(ParticleError::InvalidConfig(
                "LOD percentages must be within 0..=100".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            seed = 7
            max_particles_per_emitter = 500

            [lod_generation]
            lowest_lod_percentage = 25
            scale_burst_counts = false
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.max_particles_per_emitter, 500);
        assert_eq!(config.lod_generation.lowest_lod_percentage, 25);
        assert!(!config.lod_generation.scale_burst_counts);
        assert!(config.lod_generation.scale_spawn_rate);
        assert_eq!(config.initial_allocation_cap, 100);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_particle_stride = 16"),
            Err(ParticleError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("seed = \"nope\""),
            Err(ParticleError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_policy_percentages() {
        let policy = LodGenerationPolicy::default();
        assert_eq!(policy.percentage_for(false, false), 10);
        assert_eq!(policy.percentage_for(true, false), 100);
        assert_eq!(policy.percentage_for(false, true), 100);
        assert_eq!(LodGenerationPolicy::scale_count(150, 10), 15);
    }
}
