//! Sprite sheet animation.

use bytemuck::{Pod, Zeroable};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::buffer::{read_payload, write_payload, ParticleBuffer};
use crate::distribution::{FloatDistribution, ParticleRng};
use crate::module::{RequiredModule, SpawnContext, SubUvMethod, UpdateContext};
use crate::particle::BaseParticle;

/// Per-particle sub-image state.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SubUvPayload {
    /// Current image index.
    pub image_index: f32,
    /// Particle age at the last random change.
    pub random_image_time: f32,
    /// Blend factor into the next image.
    pub interpolation: f32,
}

/// Picks the sub-image according to the required module's method.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubUvModule {
    /// Image index over normalized age, for the linear methods.
    pub sub_image_index: FloatDistribution,
}

impl SubUvModule {
    /// Payload bytes per particle.
    pub const PAYLOAD_SIZE: usize = std::mem::size_of::<SubUvPayload>();

    fn advance(
        &self,
        required: &RequiredModule,
        particle: &BaseParticle,
        state: &mut SubUvPayload,
        first: bool,
        rng: &mut ParticleRng,
    ) {
        let total = required.total_sub_images();
        #[allow(clippy::cast_precision_loss)]
        let last = (total - 1) as f32;
        match required.interpolation_method {
            SubUvMethod::None => {}
            SubUvMethod::Linear | SubUvMethod::LinearBlend => {
                let index = self
                    .sub_image_index
                    .value(particle.relative_time, rng)
                    .clamp(0.0, last);
                state.image_index = index.trunc();
                state.interpolation = if required.interpolation_method == SubUvMethod::LinearBlend {
                    index.fract()
                } else {
                    0.0
                };
            }
            SubUvMethod::Random | SubUvMethod::RandomBlend => {
                #[allow(clippy::cast_precision_loss)]
                let change_interval = 1.0 / (required.random_image_changes as f32 + 1.0);
                if first || particle.relative_time - state.random_image_time > change_interval {
                    #[allow(clippy::cast_precision_loss)]
                    let pick = rng.gen_range(0..total) as f32;
                    state.image_index = pick;
                    state.random_image_time = particle.relative_time;
                }
                state.interpolation = if required.interpolation_method == SubUvMethod::RandomBlend {
                    particle.relative_time - state.random_image_time
                } else {
                    0.0
                };
            }
        }
    }

    pub(crate) fn spawn(
        &self,
        ctx: &mut SpawnContext<'_>,
        particle: &BaseParticle,
        payload: &mut [u8],
        offset: usize,
    ) {
        let mut state = SubUvPayload::default();
        self.advance(ctx.required, particle, &mut state, true, ctx.rng);
        write_payload(payload, offset, &state);
    }

    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer, offset: usize) {
        if ctx.required.interpolation_method == SubUvMethod::None {
            return;
        }
        for slot in 0..buffer.active_count() {
            let (particle, payload) = buffer.record_mut(slot);
            let mut state: SubUvPayload = read_payload(payload, offset);
            self.advance(ctx.required, particle, &mut state, false, ctx.rng);
            write_payload(payload, offset, &state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Curve;
    use rand::SeedableRng;

    fn required(method: SubUvMethod) -> RequiredModule {
        RequiredModule {
            sub_images_horizontal: 4,
            sub_images_vertical: 2,
            interpolation_method: method,
            random_image_changes: 1,
            ..RequiredModule::default()
        }
    }

    #[test]
    fn test_linear_blend() {
        let module = SubUvModule {
            sub_image_index: FloatDistribution::ConstantCurve(Curve::from_points(&[(0.0, 0.0), (1.0, 8.0)])),
        };
        let particle = BaseParticle {
            relative_time: 0.3,
            ..BaseParticle::default()
        };
        let mut state = SubUvPayload::default();
        let mut rng = ParticleRng::seed_from_u64(1);
        module.advance(&required(SubUvMethod::LinearBlend), &particle, &mut state, false, &mut rng);
        assert_eq!(state.image_index, 2.0);
        assert!((state.interpolation - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_random_waits_for_interval() {
        let module = SubUvModule::default();
        let required = required(SubUvMethod::Random);
        let mut rng = ParticleRng::seed_from_u64(1);
        let mut state = SubUvPayload::default();
        let mut particle = BaseParticle::default();

        module.advance(&required, &particle, &mut state, true, &mut rng);
        let first = state.image_index;
        assert!(first < 8.0);

        particle.relative_time = 0.25;
        module.advance(&required, &particle, &mut state, false, &mut rng);
        assert_eq!(state.image_index, first);
        assert_eq!(state.random_image_time, 0.0);

        particle.relative_time = 0.6;
        module.advance(&required, &particle, &mut state, false, &mut rng);
        assert_eq!(state.random_image_time, 0.6);
    }
}
