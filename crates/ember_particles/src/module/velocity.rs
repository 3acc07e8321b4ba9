//! Velocity and acceleration modules.

use serde::{Deserialize, Serialize};

use ember_core::Vec3;

use crate::buffer::{read_payload, write_payload, ParticleBuffer};
use crate::distribution::{FloatDistribution, VectorDistribution};
use crate::module::{SpawnContext, UpdateContext};
use crate::particle::BaseParticle;

fn add_velocity(particle: &mut BaseParticle, delta: Vec3) {
    particle.velocity += delta;
    particle.base_velocity += delta;
}

/// Initial velocity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityModule {
    /// Velocity added at spawn.
    pub start_velocity: VectorDistribution,
    /// Speed along the direction from the emitter to the particle.
    pub start_velocity_radial: FloatDistribution,
}

impl VelocityModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let time = ctx.frame.emitter_time;
        let mut velocity = self.start_velocity.value(time, ctx.rng);
        let radial = self.start_velocity_radial.value(time, ctx.rng);
        let from_origin = if ctx.required.use_local_space {
            particle.location
        } else {
            particle.location - ctx.frame.location
        };
        velocity += from_origin.normalize_or_zero() * radial;
        add_velocity(particle, velocity);
    }
}

/// Inherits the owning system's velocity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VelocityInheritParentModule {
    /// Per-axis scale on the owner velocity.
    pub scale: VectorDistribution,
}

impl Default for VelocityInheritParentModule {
    fn default() -> Self {
        Self {
            scale: VectorDistribution::Constant(Vec3::ONE),
        }
    }
}

impl VelocityInheritParentModule {
    pub(crate) fn spawn(&self, ctx: &mut SpawnContext<'_>, particle: &mut BaseParticle) {
        let scale = self.scale.value(ctx.frame.emitter_time, ctx.rng);
        add_velocity(particle, ctx.frame.owner_velocity.mul_elem(scale));
    }
}

/// Velocity over particle age.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VelocityOverLifetimeModule {
    /// Velocity (absolute) or multiplier over normalized age.
    pub vel_over_life: VectorDistribution,
    /// Replace the velocity instead of scaling it.
    pub absolute: bool,
}

impl Default for VelocityOverLifetimeModule {
    fn default() -> Self {
        Self {
            vel_over_life: VectorDistribution::Constant(Vec3::ONE),
            absolute: false,
        }
    }
}

impl VelocityOverLifetimeModule {
    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let value = self.vel_over_life.value(particle.relative_time, ctx.rng);
            if self.absolute {
                particle.velocity = value;
            } else {
                particle.velocity = particle.velocity.mul_elem(value);
            }
        }
    }
}

/// Constant per-particle acceleration.
///
/// The sampled acceleration is kept in the payload so random ranges stay
/// fixed for each particle's whole life.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationModule {
    /// Acceleration sampled at spawn.
    pub acceleration: VectorDistribution,
}

impl AccelerationModule {
    /// Payload bytes per particle.
    pub const PAYLOAD_SIZE: usize = std::mem::size_of::<Vec3>();

    pub(crate) fn spawn(
        &self,
        ctx: &mut SpawnContext<'_>,
        particle: &mut BaseParticle,
        payload: &mut [u8],
        offset: usize,
        spawn_time: f32,
    ) {
        let acceleration = self.acceleration.value(ctx.frame.emitter_time, ctx.rng);
        write_payload(payload, offset, &acceleration);
        add_velocity(particle, acceleration * spawn_time);
    }

    pub(crate) fn update(buffer: &mut ParticleBuffer, offset: usize, delta_time: f32) {
        for slot in 0..buffer.active_count() {
            let (particle, payload) = buffer.record_mut(slot);
            let acceleration: Vec3 = read_payload(payload, offset);
            add_velocity(particle, acceleration * delta_time);
        }
    }
}

/// Acceleration over particle age.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationOverLifetimeModule {
    /// Acceleration over normalized age.
    pub accel_over_life: VectorDistribution,
}

impl AccelerationOverLifetimeModule {
    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer, delta_time: f32) {
        for slot in 0..buffer.active_count() {
            let particle = buffer.particle_mut(slot);
            let acceleration = self.accel_over_life.value(particle.relative_time, ctx.rng);
            add_velocity(particle, acceleration * delta_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{align_stride, PARTICLE_HEADER_SIZE};

    #[test]
    fn test_acceleration_reads_its_payload() {
        let stride = align_stride(PARTICLE_HEADER_SIZE + AccelerationModule::PAYLOAD_SIZE);
        let mut buffer = ParticleBuffer::new(stride, 16).unwrap();
        buffer.resize(4).unwrap();
        let slot = buffer.spawn_slot().unwrap();
        {
            let (_, payload) = buffer.record_mut(slot);
            write_payload(payload, 0, &Vec3::new(0.0, 0.0, -10.0));
        }

        AccelerationModule::update(&mut buffer, 0, 0.5);

        let particle = buffer.particle(slot);
        assert_eq!(particle.velocity, Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(particle.base_velocity, Vec3::new(0.0, 0.0, -5.0));
    }
}
