//! Size modules.

use serde::{Deserialize, Serialize};

use ember_core::Vec3;

use crate::buffer::ParticleBuffer;
use crate::distribution::VectorDistribution;
use crate::module::{SpawnContext, UpdateContext};
use crate::particle::BaseParticle;

/// Which axes a size multiplier touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMask {
    /// Apply to X.
    pub x: bool,
    /// Apply to Y.
    pub y: bool,
    /// Apply to Z.
    pub z: bool,
}

impl AxisMask {
    /// All axes.
    pub const ALL: Self = Self {
        x: true,
        y: true,
        z: true,
    };

    /// Multiplies the enabled components of `target` by `scale`.
    pub fn multiply(self, target: &mut Vec3, scale: Vec3) {
        if self.x {
            target.x *= scale.x;
        }
        if self.y {
            target.y *= scale.y;
        }
        if self.z {
            target.z *= scale.z;
        }
    }
}

impl Default for AxisMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Initial size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeModule {
    /// Size added at spawn.
    pub start_size: VectorDistribution,
}

impl Default for SizeModule {
    fn default() -> Self {
        Self {
            start_size: VectorDistribution::Constant(Vec3::ONE),
        }
    }
}

impl SizeModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let size = self.start_size.value(ctx.frame.emitter_time, ctx.rng);
        particle.size += size;
        particle.base_size += size;
    }
}

/// Multiplies size by a curve over particle age.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeMultiplyLifeModule {
    /// Multiplier over normalized age.
    pub life_multiplier: VectorDistribution,
    /// Axes to scale.
    pub axes: AxisMask,
}

impl Default for SizeMultiplyLifeModule {
    fn default() -> Self {
        Self {
            life_multiplier: VectorDistribution::Constant(Vec3::ONE),
            axes: AxisMask::ALL,
        }
    }
}

impl SizeMultiplyLifeModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let scale = self.life_multiplier.value(particle.relative_time, ctx.rng);
        self.axes.multiply(&mut particle.size, scale);
    }

    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let scale = self.life_multiplier.value(particle.relative_time, ctx.rng);
            self.axes.multiply(&mut particle.size, scale);
        }
    }
}

/// Sets size to base size times a curve over particle age.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeScaleModule {
    /// Scale over normalized age.
    pub size_scale: VectorDistribution,
    /// Axes to scale; disabled axes keep their current size.
    pub axes: AxisMask,
}

impl Default for SizeScaleModule {
    fn default() -> Self {
        Self {
            size_scale: VectorDistribution::Constant(Vec3::ONE),
            axes: AxisMask::ALL,
        }
    }
}

impl SizeScaleModule {
    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let scale = self.size_scale.value(particle.relative_time, ctx.rng);
            let mut size = particle.base_size;
            AxisMask::ALL.multiply(&mut size, scale);
            if self.axes.x {
                particle.size.x = size.x;
            }
            if self.axes.y {
                particle.size.y = size.y;
            }
            if self.axes.z {
                particle.size.z = size.z;
            }
        }
    }
}

/// Scales size by speed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeMultiplyVelocityModule {
    /// Multiplier per unit of speed, over normalized age.
    pub velocity_multiplier: VectorDistribution,
    /// Axes to scale.
    pub axes: AxisMask,
    /// Cap the result at `max_scale` times the base size.
    pub cap_max_size: bool,
    /// Cap factor.
    pub max_scale: f32,
}

impl Default for SizeMultiplyVelocityModule {
    fn default() -> Self {
        Self {
            velocity_multiplier: VectorDistribution::Constant(Vec3::ONE),
            axes: AxisMask::ALL,
            cap_max_size: false,
            max_scale: 1.0,
        }
    }
}

impl SizeMultiplyVelocityModule {
    fn apply(&self, particle: &mut BaseParticle, multiplier: Vec3) {
        let speed = particle.velocity.length();
        self.axes.multiply(&mut particle.size, multiplier * speed);
        if self.cap_max_size {
            let cap = particle.base_size * self.max_scale;
            particle.size = particle.size.min(cap);
        }
    }

    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let multiplier = self.velocity_multiplier.value(particle.relative_time, ctx.rng);
        self.apply(particle, multiplier);
    }

    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let multiplier = self.velocity_multiplier.value(particle.relative_time, ctx.rng);
            self.apply(particle, multiplier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_mask() {
        let mut size = Vec3::ONE;
        AxisMask {
            x: true,
            y: false,
            z: true,
        }
        .multiply(&mut size, Vec3::splat(3.0));
        assert_eq!(size, Vec3::new(3.0, 1.0, 3.0));
    }

    #[test]
    fn test_velocity_size_cap() {
        let module = SizeMultiplyVelocityModule {
            cap_max_size: true,
            max_scale: 2.0,
            ..SizeMultiplyVelocityModule::default()
        };
        let mut particle = BaseParticle {
            base_size: Vec3::ONE,
            size: Vec3::ONE,
            velocity: Vec3::new(10.0, 0.0, 0.0),
            ..BaseParticle::default()
        };
        module.apply(&mut particle, Vec3::ONE);
        assert_eq!(particle.size, Vec3::splat(2.0));
    }
}
