//! Event generator and receiver modules.

use serde::{Deserialize, Serialize};

use ember_core::Vec3;

use crate::distribution::{FloatDistribution, ParticleRng, VectorDistribution};
use crate::events::{EventCounters, ParticleEvent, ParticleEventKind};

/// One event the generator emits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventGeneratorInfo {
    /// Event kind.
    pub kind: ParticleEventKind,
    /// Report every Nth occurrence; 0 reports all.
    pub frequency: u32,
    /// Collisions only: report a particle's first collision only.
    pub first_time_only: bool,
    /// Name receivers match against.
    pub name: String,
}

/// Makes an emitter report particle events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventGeneratorModule {
    /// Events to emit.
    pub events: Vec<EventGeneratorInfo>,
}

impl EventGeneratorModule {
    /// Per-instance bytes: the running counters.
    pub const INSTANCE_SIZE: usize = std::mem::size_of::<EventCounters>();

    /// Whether any entry reports `kind`.
    #[must_use]
    pub fn has_events(&self, kind: ParticleEventKind) -> bool {
        self.events.iter().any(|info| info.kind == kind)
    }
}

/// Particles to spawn on an emitter, requested from outside its own tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnBatch {
    /// Number of particles.
    pub count: u32,
    /// Spawn location.
    pub location: Vec3,
    /// Velocity added to each particle.
    pub velocity: Vec3,
}

/// Particles placed by an outside simulation, one per position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ForcedSpawnBatch {
    /// Spawn location of each particle.
    pub positions: Vec<Vec3>,
    /// Start velocity of each particle; missing entries start at rest.
    pub velocities: Option<Vec<Vec3>>,
}

/// Spawns particles when a matching event arrives from a sibling emitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventReceiverSpawnModule {
    /// Event kind to listen for.
    pub event_kind: ParticleEventKind,
    /// Event name to listen for; empty matches any name.
    pub event_name: String,
    /// Particles per event, over emitter time or particle age.
    pub spawn_count: FloatDistribution,
    /// Sample `spawn_count` against the event's particle age.
    pub use_particle_time: bool,
    /// Spawn at the emitter instead of the event location.
    pub use_emitter_location: bool,
    /// Add the event particle's velocity.
    pub inherit_velocity: bool,
    /// Per-axis scale on the inherited velocity.
    pub inherit_velocity_scale: VectorDistribution,
}

impl Default for EventReceiverSpawnModule {
    fn default() -> Self {
        Self {
            event_kind: ParticleEventKind::Death,
            event_name: String::new(),
            spawn_count: FloatDistribution::Constant(1.0),
            use_particle_time: false,
            use_emitter_location: false,
            inherit_velocity: false,
            inherit_velocity_scale: VectorDistribution::Constant(Vec3::ONE),
        }
    }
}

impl EventReceiverSpawnModule {
    /// Whether `event` is one this receiver listens for.
    #[must_use]
    pub fn accepts(&self, event: &ParticleEvent) -> bool {
        event.kind == self.event_kind && (self.event_name.is_empty() || self.event_name == event.name)
    }

    /// Turns a matching event into a spawn request.
    #[must_use]
    pub fn receive(&self, event: &ParticleEvent, emitter_location: Vec3, rng: &mut ParticleRng) -> Option<SpawnBatch> {
        if !self.accepts(event) {
            return None;
        }
        let time = if self.use_particle_time {
            event.particle_time
        } else {
            event.emitter_time
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = self.spawn_count.value(time, rng).max(0.0) as u32;
        if count == 0 {
            return None;
        }
        let location = if self.use_emitter_location {
            emitter_location
        } else {
            event.location
        };
        let velocity = if self.inherit_velocity {
            event.velocity.mul_elem(self.inherit_velocity_scale.value(time, rng))
        } else {
            Vec3::ZERO
        };
        Some(SpawnBatch {
            count,
            location,
            velocity,
        })
    }
}
