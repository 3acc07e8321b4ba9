//! Lifetime.

use serde::{Deserialize, Serialize};

use crate::distribution::FloatDistribution;
use crate::module::SpawnContext;
use crate::particle::BaseParticle;

/// Sets how long a particle lives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LifetimeModule {
    /// Lifetime in seconds, sampled against emitter time.
    pub lifetime: FloatDistribution,
}

impl Default for LifetimeModule {
    fn default() -> Self {
        Self {
            lifetime: FloatDistribution::Constant(1.0),
        }
    }
}

impl LifetimeModule {
    /// Longest lifetime this module can assign.
    #[must_use]
    pub fn max_lifetime(&self) -> f32 {
        self.lifetime.min_max().1
    }

    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle, spawn_time: f32) {
        let max_lifetime = self.lifetime.value(ctx.frame.emitter_time, ctx.rng);
        apply_lifetime(particle, max_lifetime, spawn_time);
    }
}

/// Folds a lifetime contribution into the particle's reciprocal lifetime.
///
/// The first contributor sets the baseline; later ones extend it:
/// `1/new = 1/(old_max + max_lifetime)`.
pub(crate) fn apply_lifetime(particle: &mut BaseParticle, max_lifetime: f32, spawn_time: f32) {
    if particle.one_over_max_lifetime > 0.0 {
        particle.one_over_max_lifetime =
            1.0 / (max_lifetime + 1.0 / particle.one_over_max_lifetime);
    } else if max_lifetime > 0.0 {
        particle.one_over_max_lifetime = 1.0 / max_lifetime;
    } else {
        particle.one_over_max_lifetime = 0.0;
    }
    particle.relative_time = spawn_time * particle.one_over_max_lifetime;
}
