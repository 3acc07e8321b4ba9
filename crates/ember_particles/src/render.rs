//! # Render Hand-off
//!
//! Read-only particle snapshots packed after every system tick and
//! published through [`ember_core::DoubleBuffer`].
//!
//! ```text
//! simulation thread                         render thread
//! ┌──────────────┐  fill back copy  ┌───────────────┐  read front copy
//! │ tick() ...   │ ───────────────> │ DoubleBuffer  │ <──────────────── renderer
//! │ swap_buffers │                  └───────────────┘
//! └──────────────┘
//! ```
//!
//! Snapshots are refilled in place, so steady-state ticks do not allocate.

use bytemuck::{Pod, Zeroable};

use ember_core::{Aabb, LinearColor, Vec3};

use crate::instance::EmitterInstance;
use crate::module::EmitterKind;

/// One particle as the renderer sees it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleRenderData {
    /// Record index; stable for the particle's life within a LOD.
    pub id: u32,
    /// World or local location, per the emitter's space.
    pub location: Vec3,
    /// Current size.
    pub size: Vec3,
    /// Rotation in radians.
    pub rotation: f32,
    /// Current color.
    pub color: LinearColor,
    /// Normalized age.
    pub relative_time: f32,
    /// Sub-image index.
    pub sub_image: f32,
}

/// Render data of one emitter.
#[derive(Clone, Debug, Default)]
pub struct EmitterRenderData {
    /// Position of the emitter in its system.
    pub emitter_index: usize,
    /// Rendering specialization.
    pub kind: EmitterKind,
    /// Bounds of the live particles.
    pub bounds: Aabb,
    /// Particles to draw, capped by the max draw count.
    pub particles: Vec<ParticleRenderData>,
}

impl EmitterRenderData {
    /// Refills from `instance`.
    pub fn fill_from(&mut self, instance: &EmitterInstance) {
        let template = instance.template();
        let max_draw = template
            .lod_level(instance.lod())
            .and_then(|level| template.required(level))
            .and_then(|required| required.max_draw_count)
            .map_or(usize::MAX, |count| count as usize);

        self.emitter_index = instance.emitter_index();
        self.kind = template.emitter_kind();
        self.bounds = *instance.bounding_box();
        self.particles.clear();

        let buffer = instance.particles();
        let count = buffer.active_count().min(max_draw);
        self.particles.extend((0..count).map(|slot| {
            let particle = buffer.particle(slot);
            ParticleRenderData {
                id: u32::try_from(buffer.record_index(slot)).unwrap_or(u32::MAX),
                location: particle.location,
                size: particle.size,
                rotation: particle.rotation,
                color: particle.color,
                relative_time: particle.relative_time,
                sub_image: instance.sub_image(slot),
            }
        }));
    }
}

/// Everything one system tick hands to the renderer.
#[derive(Clone, Debug, Default)]
pub struct SystemRenderSnapshot {
    /// System tick that produced the snapshot.
    pub frame: u64,
    /// LOD the system was ticked at.
    pub lod: usize,
    /// One entry per emitter instance.
    pub emitters: Vec<EmitterRenderData>,
}

impl SystemRenderSnapshot {
    /// Refills from `instances`, reusing allocations.
    pub fn fill(&mut self, frame: u64, lod: usize, instances: &[EmitterInstance]) {
        self.frame = frame;
        self.lod = lod;
        self.emitters.resize_with(instances.len(), EmitterRenderData::default);
        for (data, instance) in self.emitters.iter_mut().zip(instances) {
            data.fill_from(instance);
        }
    }

    /// Total particles across emitters.
    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.emitters.iter().map(|emitter| emitter.particles.len()).sum()
    }
}
