//! Rotation modules. Authored values are in turns; particles store radians.

use serde::{Deserialize, Serialize};

use ember_core::TWO_PI;

use crate::buffer::ParticleBuffer;
use crate::distribution::FloatDistribution;
use crate::module::{SpawnContext, UpdateContext};
use crate::particle::BaseParticle;

/// Initial rotation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationModule {
    /// Rotation in turns.
    pub start_rotation: FloatDistribution,
}

impl RotationModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        particle.rotation += TWO_PI * self.start_rotation.value(ctx.frame.emitter_time, ctx.rng);
    }
}

/// Initial rotation rate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationRateModule {
    /// Rate in turns per second.
    pub start_rotation_rate: FloatDistribution,
}

impl RotationRateModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let rate = TWO_PI * self.start_rotation_rate.value(ctx.frame.emitter_time, ctx.rng);
        particle.rotation_rate += rate;
        particle.base_rotation_rate += rate;
    }
}

/// Rotation over particle age.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationOverLifetimeModule {
    /// Turns added each update, or a multiplier when `scale` is set.
    pub rotation_over_life: FloatDistribution,
    /// Multiply the rotation instead of adding to it.
    pub scale: bool,
}

impl RotationOverLifetimeModule {
    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let value = self.rotation_over_life.value(particle.relative_time, ctx.rng);
            if self.scale {
                particle.rotation *= value;
            } else {
                particle.rotation += value * TWO_PI;
            }
        }
    }
}
