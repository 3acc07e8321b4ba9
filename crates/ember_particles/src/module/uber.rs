//! Combined module: lifetime, initial size, initial velocity, color over
//! life and size multiplied by life, in one pass.

use serde::{Deserialize, Serialize};

use ember_core::{LinearColor, Vec3};

use crate::buffer::ParticleBuffer;
use crate::distribution::{FloatDistribution, VectorDistribution};
use crate::module::lifetime::apply_lifetime;
use crate::module::size::AxisMask;
use crate::module::{SpawnContext, UpdateContext};
use crate::particle::BaseParticle;

/// Lifetime, initial size, initial velocity, color over life, size by life.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UberLtisivclModule {
    /// Lifetime in seconds.
    pub lifetime: FloatDistribution,
    /// Initial size.
    pub start_size: VectorDistribution,
    /// Initial velocity.
    pub start_velocity: VectorDistribution,
    /// Initial radial speed.
    pub start_velocity_radial: FloatDistribution,
    /// RGB over normalized age.
    pub color_over_life: VectorDistribution,
    /// Alpha over normalized age.
    pub alpha_over_life: FloatDistribution,
    /// Size multiplier over normalized age.
    pub life_multiplier: VectorDistribution,
    /// Axes the size multiplier touches.
    pub multiply_axes: AxisMask,
}

impl Default for UberLtisivclModule {
    fn default() -> Self {
        Self {
            lifetime: FloatDistribution::Constant(1.0),
            start_size: VectorDistribution::Constant(Vec3::ONE),
            start_velocity: VectorDistribution::default(),
            start_velocity_radial: FloatDistribution::default(),
            color_over_life: VectorDistribution::Constant(Vec3::ONE),
            alpha_over_life: FloatDistribution::Constant(1.0),
            life_multiplier: VectorDistribution::Constant(Vec3::ONE),
            multiply_axes: AxisMask::ALL,
        }
    }
}

impl UberLtisivclModule {
    /// Longest lifetime this module can assign.
    #[must_use]
    pub fn max_lifetime(&self) -> f32 {
        self.lifetime.min_max().1
    }

    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle, spawn_time: f32) {
        let time = ctx.frame.emitter_time;

        let max_lifetime = self.lifetime.value(time, ctx.rng);
        apply_lifetime(particle, max_lifetime, spawn_time);

        let size = self.start_size.value(time, ctx.rng);
        particle.size += size;
        particle.base_size += size;

        let from_origin = (particle.location - ctx.frame.location).normalize_or_zero();
        let velocity = self.start_velocity.value(time, ctx.rng)
            + from_origin * self.start_velocity_radial.value(time, ctx.rng);
        particle.velocity += velocity;
        particle.base_velocity += velocity;

        let age = particle.relative_time;
        let color = LinearColor::from_rgb_alpha(
            self.color_over_life.value(age, ctx.rng),
            self.alpha_over_life.value(age, ctx.rng),
        );
        particle.color = color;
        particle.base_color = color;

        let scale = self.life_multiplier.value(age, ctx.rng);
        self.multiply_axes.multiply(&mut particle.size, scale);
    }

    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let age = particle.relative_time;
            particle.color = LinearColor::from_rgb_alpha(
                self.color_over_life.value(age, ctx.rng),
                self.alpha_over_life.value(age, ctx.rng),
            );
            let scale = self.life_multiplier.value(age, ctx.rng);
            self.multiply_axes.multiply(&mut particle.size, scale);
        }
    }
}
