//! Color modules.

use serde::{Deserialize, Serialize};

use ember_core::{LinearColor, Vec3};

use crate::buffer::ParticleBuffer;
use crate::distribution::{FloatDistribution, ParticleRng, VectorDistribution};
use crate::module::{SpawnContext, UpdateContext};
use crate::particle::BaseParticle;

fn sample_color(
    rgb: &VectorDistribution,
    alpha: &FloatDistribution,
    clamp_alpha: bool,
    time: f32,
    rng: &mut ParticleRng,
) -> LinearColor {
    let color = rgb.value(time, rng);
    let mut a = alpha.value(time, rng);
    if clamp_alpha {
        a = a.clamp(0.0, 1.0);
    }
    LinearColor::from_rgb_alpha(color, a)
}

/// Initial color.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorModule {
    /// RGB at spawn, sampled against emitter time.
    pub start_color: VectorDistribution,
    /// Alpha at spawn.
    pub start_alpha: FloatDistribution,
    /// Clamp alpha to `[0, 1]`.
    pub clamp_alpha: bool,
}

impl Default for ColorModule {
    fn default() -> Self {
        Self {
            start_color: VectorDistribution::Constant(Vec3::ONE),
            start_alpha: FloatDistribution::Constant(1.0),
            clamp_alpha: true,
        }
    }
}

impl ColorModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let color = sample_color(
            &self.start_color,
            &self.start_alpha,
            self.clamp_alpha,
            ctx.frame.emitter_time,
            ctx.rng,
        );
        particle.color = color;
        particle.base_color = color;
    }
}

/// Color driven by particle age.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorOverLifeModule {
    /// RGB over normalized age.
    pub color_over_life: VectorDistribution,
    /// Alpha over normalized age.
    pub alpha_over_life: FloatDistribution,
    /// Clamp alpha to `[0, 1]`.
    pub clamp_alpha: bool,
}

impl Default for ColorOverLifeModule {
    fn default() -> Self {
        Self {
            color_over_life: VectorDistribution::Constant(Vec3::ONE),
            alpha_over_life: FloatDistribution::Constant(1.0),
            clamp_alpha: true,
        }
    }
}

impl ColorOverLifeModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let color = sample_color(
            &self.color_over_life,
            &self.alpha_over_life,
            self.clamp_alpha,
            particle.relative_time,
            ctx.rng,
        );
        particle.color = color;
        particle.base_color = color;
    }

    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            particle.color = sample_color(
                &self.color_over_life,
                &self.alpha_over_life,
                self.clamp_alpha,
                particle.relative_time,
                ctx.rng,
            );
        }
    }
}

/// Multiplies the current color by a scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorScaleOverLifeModule {
    /// RGB multiplier.
    pub color_scale: VectorDistribution,
    /// Alpha multiplier.
    pub alpha_scale: FloatDistribution,
    /// Sample against emitter time instead of particle age.
    pub emitter_time: bool,
}

impl Default for ColorScaleOverLifeModule {
    fn default() -> Self {
        Self {
            color_scale: VectorDistribution::Constant(Vec3::ONE),
            alpha_scale: FloatDistribution::Constant(1.0),
            emitter_time: false,
        }
    }
}

impl ColorScaleOverLifeModule {
    fn apply(&self, particle: &mut BaseParticle, emitter_time: f32, rng: &mut ParticleRng) {
        let time = if self.emitter_time {
            emitter_time
        } else {
            particle.relative_time
        };
        let rgb = self.color_scale.value(time, rng);
        let a = self.alpha_scale.value(time, rng);
        particle.color = particle.color.scaled(rgb, a);
    }

    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        self.apply(particle, ctx.frame.emitter_time, ctx.rng);
    }

    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        let emitter_time = ctx.frame.emitter_time;
        for slot in 0..buffer.active_count() {
            self.apply(buffer.particle_mut(slot), emitter_time, ctx.rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Curve;
    use rand::SeedableRng;

    #[test]
    fn test_alpha_clamped() {
        let mut rng = ParticleRng::seed_from_u64(5);
        let color = sample_color(
            &VectorDistribution::Constant(Vec3::ONE),
            &FloatDistribution::Constant(4.0),
            true,
            0.0,
            &mut rng,
        );
        assert_eq!(color.a, 1.0);
    }

    #[test]
    fn test_scale_follows_age() {
        let module = ColorScaleOverLifeModule {
            alpha_scale: FloatDistribution::ConstantCurve(Curve::from_points(&[(0.0, 1.0), (1.0, 0.0)])),
            ..ColorScaleOverLifeModule::default()
        };
        let mut rng = ParticleRng::seed_from_u64(5);
        let mut particle = BaseParticle {
            relative_time: 0.5,
            color: LinearColor::WHITE,
            ..BaseParticle::default()
        };
        module.apply(&mut particle, 0.0, &mut rng);
        assert!((particle.color.a - 0.5).abs() < 1e-6);
        assert_eq!(particle.color.r, 1.0);
    }
}
