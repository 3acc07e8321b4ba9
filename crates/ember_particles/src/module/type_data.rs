//! Type-data modules select the emitter specialization.
//!
//! The type-data payload always sits first in the particle payload.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use ember_core::{Vec3, TWO_PI};

use crate::buffer::{read_payload, write_payload, ParticleBuffer};
use crate::distribution::VectorDistribution;
use crate::module::{SpawnContext, UpdateContext};
use crate::particle::{flags, BaseParticle};

/// Rendering specialization of an emitter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmitterKind {
    /// Camera-facing sprites (no type-data module).
    #[default]
    Sprite,
    /// Instanced meshes.
    Mesh,
    /// Ribbon trails.
    Trail,
    /// Beams between a source and a target.
    Beam,
}

/// Mesh orientation state.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshPayload {
    /// Orientation at spawn, radians per axis.
    pub initial_orientation: Vec3,
    /// Current orientation.
    pub rotation: Vec3,
    /// Rotation rate, radians per second per axis.
    pub rotation_rate: Vec3,
}

/// Instanced mesh emitter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshTypeData {
    /// Mesh name handed to the renderer.
    pub mesh: String,
    /// Whether meshes cast shadows.
    pub cast_shadows: bool,
    /// Initial orientation in turns per axis.
    pub initial_orientation: VectorDistribution,
    /// Rotation rate in turns per second per axis.
    pub rotation_rate: VectorDistribution,
}

/// Trail link state.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TrailPayload {
    /// Record index of the previous trail particle plus one, 0 for none.
    pub previous: u32,
    /// Spawn sequence number within the instance.
    pub sequence: u32,
}

/// Per-instance trail state.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TrailInstance {
    /// Record index of the newest particle plus one.
    pub head: u32,
    /// Last issued sequence number.
    pub sequence: u32,
}

/// Ribbon trail emitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrailTypeData {
    /// Texture tiling distance along the trail, 0 stretches once.
    pub tiling_distance: f32,
    /// Sheets rendered around the trail axis.
    pub sheets: u32,
}

impl Default for TrailTypeData {
    fn default() -> Self {
        Self {
            tiling_distance: 0.0,
            sheets: 1,
        }
    }
}

/// Beam end points.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BeamPayload {
    /// Beam start.
    pub source: Vec3,
    /// Beam end.
    pub target: Vec3,
}

/// Beam emitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeamTypeData {
    /// Target offset from the emitter, over emitter time.
    pub target: VectorDistribution,
    /// Interpolation points along the beam.
    pub interpolation_points: u32,
    /// Sheets rendered around the beam axis.
    pub sheets: u32,
}

impl Default for BeamTypeData {
    fn default() -> Self {
        Self {
            target: VectorDistribution::Constant(Vec3::new(100.0, 0.0, 0.0)),
            interpolation_points: 0,
            sheets: 1,
        }
    }
}

/// The optional type-data slot of a LOD level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TypeDataModule {
    /// Explicit sprite type-data; same as having none.
    Sprite,
    /// Mesh particles.
    Mesh(MeshTypeData),
    /// Trail particles.
    Trail(TrailTypeData),
    /// Beam particles.
    Beam(BeamTypeData),
}

impl TypeDataModule {
    /// The specialization this selects.
    #[must_use]
    pub const fn emitter_kind(&self) -> EmitterKind {
        match self {
            Self::Sprite => EmitterKind::Sprite,
            Self::Mesh(_) => EmitterKind::Mesh,
            Self::Trail(_) => EmitterKind::Trail,
            Self::Beam(_) => EmitterKind::Beam,
        }
    }

    /// Trails and beams are not scaled when lower LODs are generated.
    #[must_use]
    pub const fn is_trail_or_beam(&self) -> bool {
        matches!(self, Self::Trail(_) | Self::Beam(_))
    }

    /// Payload bytes per particle.
    #[must_use]
    pub const fn required_bytes(&self) -> usize {
        match self {
            Self::Sprite => 0,
            Self::Mesh(_) => std::mem::size_of::<MeshPayload>(),
            Self::Trail(_) => std::mem::size_of::<TrailPayload>(),
            Self::Beam(_) => std::mem::size_of::<BeamPayload>(),
        }
    }

    /// Per-instance bytes.
    #[must_use]
    pub const fn required_bytes_per_instance(&self) -> usize {
        match self {
            Self::Trail(_) => std::mem::size_of::<TrailInstance>(),
            _ => 0,
        }
    }

    pub(crate) fn spawn(
        &self,
        ctx: &mut SpawnContext<'_>,
        particle: &mut BaseParticle,
        payload: &mut [u8],
        offset: usize,
    ) {
        match self {
            Self::Sprite => {}
            Self::Mesh(mesh) => {
                let time = ctx.frame.emitter_time;
                let initial = mesh.initial_orientation.value(time, ctx.rng) * TWO_PI;
                let rate = mesh.rotation_rate.value(time, ctx.rng) * TWO_PI;
                write_payload(
                    payload,
                    offset,
                    &MeshPayload {
                        initial_orientation: initial,
                        rotation: initial,
                        rotation_rate: rate,
                    },
                );
            }
            Self::Trail(_) => {
                let mut state: TrailInstance = ctx.read_instance();
                state.sequence = state.sequence.wrapping_add(1);
                write_payload(
                    payload,
                    offset,
                    &TrailPayload {
                        previous: state.head,
                        sequence: state.sequence,
                    },
                );
                state.head = u32::try_from(ctx.record_index + 1).unwrap_or(0);
                ctx.write_instance(&state);
                particle.flags |= flags::TRAIL_HEAD;
            }
            Self::Beam(beam) => {
                let origin = if ctx.required.use_local_space {
                    Vec3::ZERO
                } else {
                    ctx.frame.location
                };
                let target = origin + beam.target.value(ctx.frame.emitter_time, ctx.rng);
                write_payload(
                    payload,
                    offset,
                    &BeamPayload {
                        source: particle.location,
                        target,
                    },
                );
            }
        }
    }

    /// Runs before the ordinary update modules.
    pub(crate) fn pre_update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer, offset: usize) {
        if let Self::Beam(beam) = self {
            let origin = if ctx.required.use_local_space {
                Vec3::ZERO
            } else {
                ctx.frame.location
            };
            let target = origin + beam.target.value(ctx.frame.emitter_time, ctx.rng);
            for slot in 0..buffer.active_count() {
                let (_, payload) = buffer.record_mut(slot);
                let mut state: BeamPayload = read_payload(payload, offset);
                state.target = target;
                write_payload(payload, offset, &state);
            }
        }
    }

    /// Runs after the ordinary update modules.
    pub(crate) fn update(&self, buffer: &mut ParticleBuffer, offset: usize, delta_time: f32) {
        if let Self::Mesh(_) = self {
            for slot in 0..buffer.active_count() {
                let (particle, payload) = buffer.record_mut(slot);
                if particle.flags & (flags::FREEZE | flags::FREEZE_ROTATION) != 0 {
                    continue;
                }
                let mut state: MeshPayload = read_payload(payload, offset);
                state.rotation += state.rotation_rate * delta_time;
                write_payload(payload, offset, &state);
            }
        }
    }

    /// Runs last, after the type-data update.
    pub(crate) fn post_update(&self, ctx: &UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        if let Self::Trail(_) = self {
            let state: TrailInstance = ctx.read_instance();
            for slot in 0..buffer.active_count() {
                let is_head = buffer.record_index(slot) + 1 == state.head as usize;
                let particle = buffer.particle_mut(slot);
                if is_head {
                    particle.flags |= flags::TRAIL_HEAD;
                } else {
                    particle.flags &= !flags::TRAIL_HEAD;
                }
            }
        }
    }
}
