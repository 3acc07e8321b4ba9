//! Per-call state handed to module `spawn`/`update`.

use ember_core::Vec3;

use crate::buffer::{read_payload, write_payload, ParticleBuffer};
use crate::distribution::ParticleRng;
use crate::events::EventRecorder;
use crate::instance::EmitterInstance;
use crate::module::RequiredModule;

/// Read-only view of the other emitter instances of the same system.
///
/// Indices are the owning system's emitter indices. The instance being
/// ticked is excluded and resolves to `None`.
#[derive(Clone, Copy, Default)]
pub struct SiblingEmitters<'a> {
    before: &'a [EmitterInstance],
    after: &'a [EmitterInstance],
}

impl<'a> SiblingEmitters<'a> {
    /// A view with no siblings.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            before: &[],
            after: &[],
        }
    }

    /// Builds a view around the instance at index `before.len()`.
    #[must_use]
    pub const fn new(before: &'a [EmitterInstance], after: &'a [EmitterInstance]) -> Self {
        Self { before, after }
    }

    /// Looks up a sibling by system emitter index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a EmitterInstance> {
        let own = self.before.len();
        match index.cmp(&own) {
            std::cmp::Ordering::Less => self.before.get(index),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => self.after.get(index - own - 1),
        }
    }
}

/// Emitter-level values shared by spawn and update calls.
#[derive(Clone, Copy, Debug)]
pub struct EmitterFrame {
    /// Time within the current loop, delay already subtracted.
    pub emitter_time: f32,
    /// Emitter location this tick.
    pub location: Vec3,
    /// Emitter location last tick.
    pub old_location: Vec3,
    /// Velocity of the owning system.
    pub owner_velocity: Vec3,
}

/// Context for one module's `spawn` call.
pub struct SpawnContext<'a> {
    /// Instance random stream.
    pub rng: &'a mut ParticleRng,
    /// Emitter-level values.
    pub frame: EmitterFrame,
    /// Required module of the current LOD level.
    pub required: &'a RequiredModule,
    /// Other emitters of the system.
    pub siblings: SiblingEmitters<'a>,
    /// The instance's per-instance data block.
    pub instance_data: &'a mut [u8],
    /// This module's offset into `instance_data`.
    pub instance_offset: usize,
    /// Sibling emitter this module references, if resolved.
    pub source_emitter: Option<usize>,
    /// Record index of the particle being spawned.
    pub record_index: usize,
}

impl SpawnContext<'_> {
    /// Reads this module's per-instance value.
    #[must_use]
    pub fn read_instance<T: bytemuck::Pod>(&self) -> T {
        read_payload(self.instance_data, self.instance_offset)
    }

    /// Writes this module's per-instance value.
    pub fn write_instance<T: bytemuck::Pod>(&mut self, value: &T) {
        write_payload(self.instance_data, self.instance_offset, value);
    }
}

/// Context for one module's `update` call.
pub struct UpdateContext<'a, 'r> {
    /// Instance random stream.
    pub rng: &'a mut ParticleRng,
    /// Emitter-level values.
    pub frame: EmitterFrame,
    /// Required module of the current LOD level.
    pub required: &'a RequiredModule,
    /// Other emitters of the system.
    pub siblings: SiblingEmitters<'a>,
    /// The instance's per-instance data block.
    pub instance_data: &'a mut [u8],
    /// This module's offset into `instance_data`.
    pub instance_offset: usize,
    /// Sibling emitter this module references, if resolved.
    pub source_emitter: Option<usize>,
    /// Event sink for kills.
    pub events: &'a mut EventRecorder<'r>,
}

impl UpdateContext<'_, '_> {
    /// Kills the particle in `slot`, reporting a death event first.
    ///
    /// Callers iterating the buffer must walk slots backwards.
    pub fn kill(&mut self, buffer: &mut ParticleBuffer, slot: usize) {
        self.events.particle_killed(buffer.particle(slot));
        buffer.kill_at(slot);
    }

    /// Reads this module's per-instance value.
    #[must_use]
    pub fn read_instance<T: bytemuck::Pod>(&self) -> T {
        read_payload(self.instance_data, self.instance_offset)
    }

    /// Writes this module's per-instance value.
    pub fn write_instance<T: bytemuck::Pod>(&mut self, value: &T) {
        write_payload(self.instance_data, self.instance_offset, value);
    }
}
