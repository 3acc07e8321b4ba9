//! Attractors pull particles toward a point, a line, or a sibling's particles.

use serde::{Deserialize, Serialize};

use ember_core::Vec3;

use crate::buffer::{read_payload, write_payload, ParticleBuffer};
use crate::distribution::{FloatDistribution, VectorDistribution};
use crate::module::{EmitterSelection, SpawnContext, UpdateContext};
use crate::particle::BaseParticle;

/// Strength at `distance` inside `range`.
fn falloff_strength(
    strength: &FloatDistribution,
    by_distance: bool,
    distance: f32,
    range: f32,
    time: f32,
    rng: &mut crate::distribution::ParticleRng,
) -> f32 {
    if by_distance && range > 0.0 {
        strength.value((range - distance) / range, rng)
    } else {
        strength.value(time, rng)
    }
}

fn pull(particle: &mut BaseParticle, toward: Vec3, strength: f32, delta_time: f32, affect_base: bool) {
    let delta = toward.normalize_or_zero() * (strength * delta_time);
    particle.velocity += delta;
    if affect_base {
        particle.base_velocity += delta;
    }
}

/// Attracts toward a point relative to the emitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttractorPointModule {
    /// Point offset from the emitter, over emitter time.
    pub position: VectorDistribution,
    /// Particles farther than this are unaffected.
    pub range: FloatDistribution,
    /// Acceleration toward the point.
    pub strength: FloatDistribution,
    /// Sample strength by `(range - distance) / range` instead of emitter time.
    pub strength_by_distance: bool,
    /// Also change the base velocity.
    pub affect_base_velocity: bool,
}

impl Default for AttractorPointModule {
    fn default() -> Self {
        Self {
            position: VectorDistribution::default(),
            range: FloatDistribution::Constant(100.0),
            strength: FloatDistribution::Constant(100.0),
            strength_by_distance: true,
            affect_base_velocity: false,
        }
    }
}

impl AttractorPointModule {
    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer, delta_time: f32) {
        let time = ctx.frame.emitter_time;
        let mut point = self.position.value(time, ctx.rng);
        if !ctx.required.use_local_space {
            point += ctx.frame.location;
        }
        let range = self.range.value(time, ctx.rng);
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let toward = point - particle.location;
            let distance = toward.length();
            if distance > range {
                continue;
            }
            let strength = falloff_strength(&self.strength, self.strength_by_distance, distance, range, time, ctx.rng);
            pull(particle, toward, strength, delta_time, self.affect_base_velocity);
        }
    }
}

/// Attracts toward the closest point of a segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttractorLineModule {
    /// First end point, relative to the emitter.
    pub end_point0: Vec3,
    /// Second end point, relative to the emitter.
    pub end_point1: Vec3,
    /// Range over the position along the line.
    pub range: FloatDistribution,
    /// Strength over the position along the line.
    pub strength: FloatDistribution,
}

impl Default for AttractorLineModule {
    fn default() -> Self {
        Self {
            end_point0: Vec3::ZERO,
            end_point1: Vec3::new(100.0, 0.0, 0.0),
            range: FloatDistribution::Constant(100.0),
            strength: FloatDistribution::Constant(100.0),
        }
    }
}

impl AttractorLineModule {
    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer, delta_time: f32) {
        let origin = if ctx.required.use_local_space {
            Vec3::ZERO
        } else {
            ctx.frame.location
        };
        let start = origin + self.end_point0;
        let line = self.end_point1 - self.end_point0;
        let length_squared = line.length_squared();
        if length_squared <= f32::EPSILON {
            return;
        }
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let along = (particle.location - start).dot(line) / length_squared;
            if !(0.0..=1.0).contains(&along) {
                continue;
            }
            let closest = start + line * along;
            let toward = closest - particle.location;
            if toward.length() > self.range.value(along, ctx.rng) {
                continue;
            }
            let strength = self.strength.value(along, ctx.rng);
            pull(particle, toward, strength, delta_time, false);
        }
    }
}

/// Attracts each particle toward a particle of a sibling emitter.
///
/// The payload holds the source record index plus one, zero when unset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttractorParticleModule {
    /// Name of the source emitter.
    pub emitter_name: String,
    /// Range over normalized age.
    pub range: FloatDistribution,
    /// Sample strength by `(range - distance) / range` instead of age.
    pub strength_by_distance: bool,
    /// Strength.
    pub strength: FloatDistribution,
    /// Also change the base velocity.
    pub affect_base_velocity: bool,
    /// How the source particle is chosen.
    pub selection: EmitterSelection,
    /// Pick a new source when the old one has died.
    pub renew_source: bool,
}

impl Default for AttractorParticleModule {
    fn default() -> Self {
        Self {
            emitter_name: String::new(),
            range: FloatDistribution::Constant(100.0),
            strength_by_distance: true,
            strength: FloatDistribution::Constant(100.0),
            affect_base_velocity: false,
            selection: EmitterSelection::Random,
            renew_source: false,
        }
    }
}

impl AttractorParticleModule {
    /// Payload bytes per particle.
    pub const PAYLOAD_SIZE: usize = std::mem::size_of::<u32>();
    /// Per-instance bytes: the sequential cursor.
    pub const INSTANCE_SIZE: usize = std::mem::size_of::<u32>();

    fn pick_source(&self, source: &ParticleBuffer, cursor: &mut u32, rng: &mut crate::distribution::ParticleRng) -> u32 {
        self.selection
            .pick(source.active_count(), cursor, rng)
            .map_or(0, |slot| u32::try_from(source.record_index(slot) + 1).unwrap_or(0))
    }

    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, payload: &mut [u8], offset: usize) {
        let Some(source) = ctx.source_emitter.and_then(|index| ctx.siblings.get(index)) else {
            write_payload(payload, offset, &0_u32);
            return;
        };
        let mut cursor: u32 = ctx.read_instance();
        let record = self.pick_source(source.particles(), &mut cursor, ctx.rng);
        ctx.write_instance(&cursor);
        write_payload(payload, offset, &record);
    }

    pub(crate) fn update(
        &self,
        ctx: &mut UpdateContext<'_, '_>,
        buffer: &mut ParticleBuffer,
        offset: usize,
        delta_time: f32,
    ) {
        let Some(source) = ctx.source_emitter.and_then(|index| ctx.siblings.get(index)) else {
            return;
        };
        let source_buffer = source.particles();
        let mut cursor: u32 = ctx.read_instance();
        for slot in 0..buffer.active_count() {
            let (particle, payload) = buffer.record_mut(slot);
            let mut record: u32 = read_payload(payload, offset);

            if !source_alive(source_buffer, record) {
                record = if self.renew_source {
                    self.pick_source(source_buffer, &mut cursor, ctx.rng)
                } else {
                    0
                };
                write_payload(payload, offset, &record);
                if record == 0 {
                    continue;
                }
            }

            let target = source_buffer.record_by_index(record as usize - 1).0.location;
            let toward = target - particle.location;
            let distance = toward.length();
            let time = particle.relative_time;
            let range = self.range.value(time, ctx.rng);
            if distance > range {
                continue;
            }
            let strength = falloff_strength(&self.strength, self.strength_by_distance, distance, range, time, ctx.rng);
            pull(particle, toward, strength, delta_time, self.affect_base_velocity);
        }
        ctx.write_instance(&cursor);
    }
}

/// Whether a stored source record (index plus one, 0 for none) still
/// names a live particle of `source`.
fn source_alive(source: &ParticleBuffer, record: u32) -> bool {
    let Some(index) = record.checked_sub(1) else {
        return false;
    };
    (index as usize) < source.capacity()
        && source.active_indices().contains(&index)
        && source.record_by_index(index as usize).0.relative_time <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::ParticleRng;
    use rand::SeedableRng;

    #[test]
    fn test_falloff_by_distance() {
        let mut rng = ParticleRng::seed_from_u64(0);
        let strength = FloatDistribution::ConstantCurve(crate::distribution::Curve::from_points(&[
            (0.0, 0.0),
            (1.0, 10.0),
        ]));
        let near = falloff_strength(&strength, true, 1.0, 10.0, 0.0, &mut rng);
        let far = falloff_strength(&strength, true, 9.0, 10.0, 0.0, &mut rng);
        assert!(near > far);
        assert!((near - 9.0).abs() < 1e-4);
    }

    #[test]
    fn test_pull_affects_base_on_request() {
        let mut particle = BaseParticle::default();
        pull(&mut particle, Vec3::new(2.0, 0.0, 0.0), 10.0, 0.5, false);
        assert_eq!(particle.velocity, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(particle.base_velocity, Vec3::ZERO);

        pull(&mut particle, Vec3::new(0.0, 3.0, 0.0), 2.0, 1.0, true);
        assert_eq!(particle.base_velocity, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_killed_source_record_is_not_alive() {
        let mut source = ParticleBuffer::new(crate::particle::PARTICLE_HEADER_SIZE, 8).unwrap();
        source.resize(4).unwrap();
        for _ in 0..2 {
            let slot = source.spawn_slot().unwrap();
            source.particle_mut(slot).relative_time = 0.5;
        }
        let record = u32::try_from(source.record_index(1) + 1).unwrap();
        assert!(source_alive(&source, record));

        // The dead record keeps its young relative time after the swap
        assert!(source.kill_at(1));
        assert!(source.record_by_index(record as usize - 1).0.relative_time <= 1.0);
        assert!(!source_alive(&source, record));
        assert!(!source_alive(&source, 0));
        assert!(!source_alive(&source, 99));
    }
}
