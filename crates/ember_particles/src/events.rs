//! # Particle Events
//!
//! Spawn, death and collision records produced during a tick.
//!
//! ```text
//! ┌────────────────┐  record   ┌────────────┐  drain   ┌──────────────────┐
//! │ EmitterInstance│──────────>│ EventQueue │─────────>│ SystemComponent  │
//! │ (spawn / kill) │           │ (per tick) │          │ receivers, bus   │
//! └────────────────┘           └────────────┘          └──────────────────┘
//! ```
//!
//! The owning system forwards drained events to receiver modules and,
//! optionally, over a bounded channel to the outside world.

use bytemuck::{Pod, Zeroable};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ember_core::Vec3;
use serde::{Deserialize, Serialize};

use crate::module::EventGeneratorModule;
use crate::particle::{flags, BaseParticle};

/// What happened to a particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleEventKind {
    /// A particle was born.
    Spawn,
    /// A particle died.
    Death,
    /// A particle hit something.
    Collision,
}

/// One externally visible event.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleEvent {
    /// Event kind.
    pub kind: ParticleEventKind,
    /// Name configured on the generator.
    pub name: String,
    /// Index of the emitter that produced it.
    pub emitter_index: usize,
    /// Emitter time at the moment of the event.
    pub emitter_time: f32,
    /// Normalized particle age.
    pub particle_time: f32,
    /// Particle location.
    pub location: Vec3,
    /// Particle velocity.
    pub velocity: Vec3,
    /// Surface normal, collisions only.
    pub normal: Option<Vec3>,
}

/// Per-tick event storage, cleared at the start of every tick.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    /// Spawn events.
    pub spawn: Vec<ParticleEvent>,
    /// Death events.
    pub death: Vec<ParticleEvent>,
    /// Collision events.
    pub collision: Vec<ParticleEvent>,
}

impl EventQueue {
    /// Empties all queues, keeping their allocations.
    pub fn clear(&mut self) {
        self.spawn.clear();
        self.death.clear();
        self.collision.clear();
    }

    /// Total number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spawn.len() + self.death.len() + self.collision.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All queued events, spawn first.
    pub fn iter(&self) -> impl Iterator<Item = &ParticleEvent> {
        self.spawn
            .iter()
            .chain(self.death.iter())
            .chain(self.collision.iter())
    }

    fn push(&mut self, event: ParticleEvent) {
        match event.kind {
            ParticleEventKind::Spawn => self.spawn.push(event),
            ParticleEventKind::Death => self.death.push(event),
            ParticleEventKind::Collision => self.collision.push(event),
        }
    }
}

/// Per-instance tracking counts owned by the event generator.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct EventCounters {
    /// Particles spawned so far.
    pub spawn: u32,
    /// Particles killed so far.
    pub death: u32,
    /// Collisions reported so far.
    pub collision: u32,
}

/// Applies the generator's rules while a tick runs.
pub struct EventRecorder<'a> {
    generator: Option<&'a EventGeneratorModule>,
    counters: EventCounters,
    queue: &'a mut EventQueue,
    emitter_index: usize,
    emitter_time: f32,
}

impl<'a> EventRecorder<'a> {
    /// Creates a recorder. Without a generator nothing is recorded.
    pub fn new(
        generator: Option<&'a EventGeneratorModule>,
        counters: EventCounters,
        queue: &'a mut EventQueue,
        emitter_index: usize,
        emitter_time: f32,
    ) -> Self {
        Self {
            generator,
            counters,
            queue,
            emitter_index,
            emitter_time,
        }
    }

    /// Updated counters, to be written back into the instance block.
    #[must_use]
    pub const fn counters(&self) -> EventCounters {
        self.counters
    }

    /// Whether events of `kind` are requested at all.
    #[must_use]
    pub fn wants(&self, kind: ParticleEventKind) -> bool {
        self.generator.is_some_and(|g| g.has_events(kind))
    }

    fn report(&mut self, kind: ParticleEventKind, count: u32, particle: &BaseParticle, normal: Option<Vec3>) {
        let Some(generator) = self.generator else {
            return;
        };
        let first_collision = particle.flags & flags::COLLISION_OCCURRED == 0;
        for info in generator.events.iter().filter(|info| info.kind == kind) {
            if kind == ParticleEventKind::Collision && info.first_time_only && !first_collision {
                continue;
            }
            if info.frequency > 0 && count % info.frequency != 0 {
                continue;
            }
            self.queue.push(ParticleEvent {
                kind,
                name: info.name.clone(),
                emitter_index: self.emitter_index,
                emitter_time: self.emitter_time,
                particle_time: particle.relative_time,
                location: particle.location,
                velocity: particle.velocity,
                normal,
            });
        }
    }

    /// Records a newly spawned particle.
    pub fn particle_spawned(&mut self, particle: &BaseParticle) {
        if !self.wants(ParticleEventKind::Spawn) {
            return;
        }
        self.counters.spawn = self.counters.spawn.wrapping_add(1);
        self.report(ParticleEventKind::Spawn, self.counters.spawn, particle, None);
    }

    /// Records a particle about to be removed.
    pub fn particle_killed(&mut self, particle: &BaseParticle) {
        if !self.wants(ParticleEventKind::Death) {
            return;
        }
        self.counters.death = self.counters.death.wrapping_add(1);
        self.report(ParticleEventKind::Death, self.counters.death, particle, None);
    }

    /// Records a collision reported by the physics collaborator.
    pub fn particle_collided(&mut self, particle: &BaseParticle, normal: Vec3) {
        if !self.wants(ParticleEventKind::Collision) {
            return;
        }
        self.counters.collision = self.counters.collision.wrapping_add(1);
        self.report(
            ParticleEventKind::Collision,
            self.counters.collision,
            particle,
            Some(normal),
        );
    }
}

/// Sending half of the external event channel.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: Sender<ParticleEvent>,
}

impl EventSender {
    /// Sends without blocking.
    ///
    /// # Returns
    ///
    /// False if the channel is full or closed; the event is dropped.
    pub fn try_send(&self, event: ParticleEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!("Particle event channel full, dropping {:?} '{}'", event.kind, event.name);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Receiving half of the external event channel.
#[derive(Clone, Debug)]
pub struct EventReceiver {
    receiver: Receiver<ParticleEvent>,
}

impl EventReceiver {
    /// Receives one event without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<ParticleEvent> {
        self.receiver.try_recv().ok()
    }

    /// Drains everything currently queued.
    pub fn drain(&self) -> impl Iterator<Item = ParticleEvent> + '_ {
        self.receiver.try_iter()
    }
}

/// Creates a bounded event channel.
///
/// # Arguments
///
/// * `capacity` - Maximum events in flight before new ones are dropped
#[must_use]
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (sender, receiver) = bounded(capacity);
    (EventSender { sender }, EventReceiver { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::EventGeneratorInfo;

    fn generator(kind: ParticleEventKind, frequency: u32) -> EventGeneratorModule {
        EventGeneratorModule {
            events: vec![EventGeneratorInfo {
                kind,
                frequency,
                first_time_only: false,
                name: "puff".into(),
            }],
        }
    }

    #[test]
    fn test_frequency_gating() {
        let module = generator(ParticleEventKind::Spawn, 3);
        let mut queue = EventQueue::default();
        let mut recorder = EventRecorder::new(Some(&module), EventCounters::default(), &mut queue, 0, 0.0);

        for _ in 0..7 {
            recorder.particle_spawned(&BaseParticle::default());
        }
        // Counts 3 and 6 pass
        assert_eq!(recorder.counters().spawn, 7);
        assert_eq!(queue.spawn.len(), 2);
    }

    #[test]
    fn test_no_generator_records_nothing() {
        let mut queue = EventQueue::default();
        let mut recorder = EventRecorder::new(None, EventCounters::default(), &mut queue, 0, 0.0);
        recorder.particle_killed(&BaseParticle::default());
        assert_eq!(recorder.counters(), EventCounters::default());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_first_collision_only() {
        let mut module = generator(ParticleEventKind::Collision, 0);
        module.events[0].first_time_only = true;
        let mut queue = EventQueue::default();
        let mut recorder = EventRecorder::new(Some(&module), EventCounters::default(), &mut queue, 2, 1.5);

        let mut particle = BaseParticle::default();
        recorder.particle_collided(&particle, Vec3::Z);
        particle.flags |= flags::COLLISION_OCCURRED;
        recorder.particle_collided(&particle, Vec3::Z);

        assert_eq!(queue.collision.len(), 1);
        assert_eq!(queue.collision[0].normal, Some(Vec3::Z));
        assert_eq!(queue.collision[0].emitter_index, 2);
    }

    #[test]
    fn test_channel_drops_when_full() {
        let (sender, receiver) = event_channel(1);
        let event = ParticleEvent {
            kind: ParticleEventKind::Death,
            name: "x".into(),
            emitter_index: 0,
            emitter_time: 0.0,
            particle_time: 1.0,
            location: Vec3::ZERO,
            velocity: Vec3::ZERO,
            normal: None,
        };
        assert!(sender.try_send(event.clone()));
        assert!(!sender.try_send(event));
        assert_eq!(receiver.drain().count(), 1);
        assert!(receiver.try_recv().is_none());
    }
}
