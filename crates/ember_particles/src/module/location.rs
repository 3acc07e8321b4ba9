//! Location modules.

use rand::Rng;
use serde::{Deserialize, Serialize};

use ember_core::Vec3;

use crate::buffer::{read_payload, write_payload, ParticleBuffer};
use crate::distribution::{FloatDistribution, ParticleRng, VectorDistribution};
use crate::module::{SpawnContext, UpdateContext};
use crate::particle::BaseParticle;

/// How a module picks a particle of a sibling emitter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmitterSelection {
    /// Any active particle.
    #[default]
    Random,
    /// Active slots in order, wrapping around.
    Sequential,
}

impl EmitterSelection {
    /// Picks an active slot out of `active`, advancing `cursor` for
    /// sequential selection. `cursor` holds the last slot plus one.
    pub(crate) fn pick(self, active: usize, cursor: &mut u32, rng: &mut ParticleRng) -> Option<usize> {
        if active == 0 {
            return None;
        }
        match self {
            Self::Random => Some(rng.gen_range(0..active)),
            Self::Sequential => {
                let slot = (*cursor as usize) % active;
                *cursor = u32::try_from(slot + 1).unwrap_or(0);
                Some(slot)
            }
        }
    }
}

/// Offsets the spawn location.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationModule {
    /// Offset sampled against emitter time.
    pub start_location: VectorDistribution,
}

impl LocationModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        particle.location += self.start_location.value(ctx.frame.emitter_time, ctx.rng);
    }
}

/// Drives the location directly from curves over particle age.
///
/// The spawn location is kept in the payload as the curve origin. Each
/// update sets the velocity that carries the particle onto the curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationDirectModule {
    /// Location relative to the spawn origin over normalized age.
    pub location: VectorDistribution,
    /// Extra offset over normalized age.
    pub location_offset: VectorDistribution,
    /// Per-axis scale on the correction.
    pub scale_factor: VectorDistribution,
}

impl Default for LocationDirectModule {
    fn default() -> Self {
        Self {
            location: VectorDistribution::default(),
            location_offset: VectorDistribution::default(),
            scale_factor: VectorDistribution::Constant(Vec3::ONE),
        }
    }
}

impl LocationDirectModule {
    /// Payload bytes per particle.
    pub const PAYLOAD_SIZE: usize = std::mem::size_of::<Vec3>();

    pub(crate) fn spawn(
        &self,
        ctx: &mut SpawnContext<'_>,
        particle: &mut BaseParticle,
        payload: &mut [u8],
        offset: usize,
    ) {
        let origin = particle.location;
        write_payload(payload, offset, &origin);
        particle.location = origin
            + self.location.value(particle.relative_time, ctx.rng)
            + self.location_offset.value(particle.relative_time, ctx.rng);
    }

    pub(crate) fn update(
        &self,
        ctx: &mut UpdateContext<'_, '_>,
        buffer: &mut ParticleBuffer,
        offset: usize,
        delta_time: f32,
    ) {
        if delta_time <= 0.0 {
            return;
        }
        for slot in 0..buffer.active_count() {
            let (particle, payload) = buffer.record_mut(slot);
            let origin: Vec3 = read_payload(payload, offset);
            let time = particle.relative_time;
            let target = origin + self.location.value(time, ctx.rng) + self.location_offset.value(time, ctx.rng);
            let scale = self.scale_factor.value(time, ctx.rng);
            let correction = (target - particle.location).mul_elem(scale);
            particle.velocity = correction * (1.0 / delta_time);
        }
    }
}

/// Spawns on or inside a sphere around the emitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSphereModule {
    /// Sphere radius, sampled against emitter time.
    pub radius: FloatDistribution,
    /// Only spawn on the surface.
    pub surface_only: bool,
    /// Add an outward velocity.
    pub velocity: bool,
    /// Outward speed scale.
    pub velocity_scale: FloatDistribution,
}

impl Default for LocationSphereModule {
    fn default() -> Self {
        Self {
            radius: FloatDistribution::Constant(50.0),
            surface_only: false,
            velocity: false,
            velocity_scale: FloatDistribution::Constant(1.0),
        }
    }
}

impl LocationSphereModule {
    fn random_direction(rng: &mut ParticleRng) -> Vec3 {
        for _ in 0..8 {
            let candidate = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
            );
            let length_squared = candidate.length_squared();
            if length_squared > 1e-6 && length_squared <= 1.0 {
                return candidate.normalize_or_zero();
            }
        }
        Vec3::Z
    }

    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let time = ctx.frame.emitter_time;
        let direction = Self::random_direction(ctx.rng);
        let radius = self.radius.value(time, ctx.rng);
        let distance = if self.surface_only {
            radius
        } else {
            radius * ctx.rng.gen::<f32>().cbrt()
        };
        particle.location += direction * distance;
        if self.velocity {
            let speed = distance * self.velocity_scale.value(time, ctx.rng);
            let delta = direction * speed;
            particle.velocity += delta;
            particle.base_velocity += delta;
        }
    }
}

/// Spawns at a particle of a sibling emitter.
///
/// The sibling is looked up by name when the system resolves its
/// references. A missing sibling, or one with no particles, leaves the
/// spawn location untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationEmitterModule {
    /// Name of the source emitter.
    pub emitter_name: String,
    /// Which source particle to use.
    pub selection: EmitterSelection,
    /// Add the source particle's velocity.
    pub inherit_source_velocity: bool,
    /// Scale on the inherited velocity.
    pub inherit_source_velocity_scale: f32,
    /// Add the source particle's rotation.
    pub inherit_source_rotation: bool,
    /// Scale on the inherited rotation.
    pub inherit_source_rotation_scale: f32,
}

impl Default for LocationEmitterModule {
    fn default() -> Self {
        Self {
            emitter_name: String::new(),
            selection: EmitterSelection::Random,
            inherit_source_velocity: false,
            inherit_source_velocity_scale: 1.0,
            inherit_source_rotation: false,
            inherit_source_rotation_scale: 1.0,
        }
    }
}

impl LocationEmitterModule {
    /// Per-instance bytes: the sequential cursor.
    pub const INSTANCE_SIZE: usize = std::mem::size_of::<u32>();

    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let Some(source) = ctx.source_emitter.and_then(|index| ctx.siblings.get(index)) else {
            return;
        };
        let buffer = source.particles();
        let mut cursor: u32 = ctx.read_instance();
        let Some(slot) = self.selection.pick(buffer.active_count(), &mut cursor, ctx.rng) else {
            return;
        };
        ctx.write_instance(&cursor);

        let source_particle = buffer.particle(slot);
        particle.location = source_particle.location;
        if self.inherit_source_velocity {
            let delta = source_particle.velocity * self.inherit_source_velocity_scale;
            particle.velocity += delta;
            particle.base_velocity += delta;
        }
        if self.inherit_source_rotation {
            particle.rotation += source_particle.rotation * self.inherit_source_rotation_scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_sequential_selection_wraps() {
        let mut rng = ParticleRng::seed_from_u64(0);
        let mut cursor = 0;
        let picks: Vec<_> = (0..5)
            .filter_map(|_| EmitterSelection::Sequential.pick(3, &mut cursor, &mut rng))
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_selection_from_empty_source() {
        let mut rng = ParticleRng::seed_from_u64(0);
        let mut cursor = 0;
        assert_eq!(EmitterSelection::Random.pick(0, &mut cursor, &mut rng), None);
    }

    #[test]
    fn test_sphere_direction_is_unit() {
        let mut rng = ParticleRng::seed_from_u64(9);
        for _ in 0..32 {
            let direction = LocationSphereModule::random_direction(&mut rng);
            assert!((direction.length() - 1.0).abs() < 1e-4);
        }
    }
}
