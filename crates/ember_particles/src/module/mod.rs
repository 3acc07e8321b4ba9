//! # Effect Modules
//!
//! A module is one stage of the particle pipeline. Every kind is a variant
//! of [`ModuleKind`]; the instance dispatches on the variant instead of
//! through trait objects.
//!
//! ```text
//! spawn:  TypeData ─> spawn modules (list order) ─> payload filled
//! update: TypeData pre ─> update modules (list order) ─> TypeData update/post
//! ```
//!
//! Modules live in the emitter template's arena. A LOD level refers to a
//! module by [`ModuleHandle`]; the module's [`LodMask`] records which
//! levels use that exact instance.

mod attractor;
mod color;
mod context;
mod event;
mod kill;
mod lifetime;
mod location;
mod required;
mod rotation;
mod size;
mod sub_uv;
mod type_data;
mod uber;
mod velocity;

use serde::{Deserialize, Serialize};

use crate::buffer::ParticleBuffer;
use crate::config::LodGenerationPolicy;
use crate::particle::BaseParticle;

pub use attractor::{AttractorLineModule, AttractorParticleModule, AttractorPointModule};
pub use color::{ColorModule, ColorOverLifeModule, ColorScaleOverLifeModule};
pub use context::{EmitterFrame, SiblingEmitters, SpawnContext, UpdateContext};
pub use event::{EventGeneratorInfo, EventGeneratorModule, EventReceiverSpawnModule, ForcedSpawnBatch, SpawnBatch};
pub use kill::{KillBoxModule, KillHeightModule};
pub use lifetime::LifetimeModule;
pub use location::{
    EmitterSelection, LocationDirectModule, LocationEmitterModule, LocationModule, LocationSphereModule,
};
pub use required::{BurstEntry, RequiredModule, ScreenAlignment, SpawnModule, SubUvMethod};
pub use rotation::{RotationModule, RotationOverLifetimeModule, RotationRateModule};
pub use size::{
    AxisMask, SizeModule, SizeMultiplyLifeModule, SizeMultiplyVelocityModule, SizeScaleModule,
};
pub use sub_uv::{SubUvModule, SubUvPayload};
pub use type_data::{
    BeamPayload, BeamTypeData, EmitterKind, MeshPayload, MeshTypeData, TrailInstance, TrailPayload,
    TrailTypeData, TypeDataModule,
};
pub use uber::UberLtisivclModule;
pub use velocity::{
    AccelerationModule, AccelerationOverLifetimeModule, VelocityInheritParentModule, VelocityModule,
    VelocityOverLifetimeModule,
};

/// Handle to a module in an emitter template's arena.
pub type ModuleHandle = ember_core::Handle;

/// Most LOD levels an emitter can have.
pub const MAX_LOD_LEVELS: usize = 32;

/// Set of LOD levels using one module instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LodMask(u32);

impl LodMask {
    /// No levels.
    pub const EMPTY: Self = Self(0);

    /// Only `level`.
    #[must_use]
    pub const fn single(level: usize) -> Self {
        Self(1 << level)
    }

    /// Levels `0..count`.
    #[must_use]
    pub const fn all(count: usize) -> Self {
        if count >= MAX_LOD_LEVELS {
            Self(u32::MAX)
        } else {
            Self((1 << count) - 1)
        }
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Adds `level`.
    pub fn set(&mut self, level: usize) {
        self.0 |= 1 << level;
    }

    /// Removes `level`.
    pub fn clear(&mut self, level: usize) {
        self.0 &= !(1 << level);
    }

    /// Whether `level` is in the set.
    #[must_use]
    pub const fn contains(self, level: usize) -> bool {
        level < MAX_LOD_LEVELS && self.0 & (1 << level) != 0
    }

    /// True when no level uses the module.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Drops `level` and renumbers the levels above it down by one.
    pub fn remove_level(&mut self, level: usize) {
        let below = self.0 & ((1_u32 << level) - 1);
        let above = if level + 1 >= MAX_LOD_LEVELS {
            0
        } else {
            (self.0 >> (level + 1)) << level
        };
        self.0 = below | above;
    }

    /// Opens a gap at `level`, renumbering it and the levels above up by one.
    pub fn insert_level(&mut self, level: usize) {
        let below = self.0 & ((1_u32 << level) - 1);
        let above = (self.0 >> level).checked_shl(u32::try_from(level + 1).unwrap_or(u32::MAX)).unwrap_or(0);
        self.0 = below | above;
    }

    /// Whether every level in the set is below `count`.
    #[must_use]
    pub const fn within(self, count: usize) -> bool {
        self.0 & !Self::all(count).0 == 0
    }

    /// Levels in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_LOD_LEVELS).filter(move |&level| self.contains(level))
    }
}

/// Addresses a module inside a LOD level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleSlot {
    /// The Required slot.
    Required,
    /// The Spawn slot.
    Spawn,
    /// The optional Type-Data slot.
    TypeData,
    /// Position in the ordinary module list.
    Ordinary(usize),
}

/// A module plus its LOD bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleModule {
    /// The effect itself.
    pub kind: ModuleKind,
    /// Disabled modules are skipped by spawn and update.
    pub enabled: bool,
    /// Levels using this exact instance.
    pub lod_validity: LodMask,
    /// Editor display color; ignored by comparisons.
    pub editor_color: [u8; 4],
}

impl ParticleModule {
    /// An enabled module used by no level yet.
    #[must_use]
    pub fn new(kind: ModuleKind) -> Self {
        Self {
            kind,
            enabled: true,
            lod_validity: LodMask::EMPTY,
            editor_color: [255, 255, 255, 255],
        }
    }

    /// Value equality, ignoring editor-only fields and the LOD mask.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        self.enabled == other.enabled && self.kind == other.kind
    }

    /// A deep copy owned by `level` only.
    #[must_use]
    pub fn duplicate_for_level(&self, level: usize) -> Self {
        Self {
            lod_validity: LodMask::single(level),
            ..self.clone()
        }
    }
}

impl From<ModuleKind> for ParticleModule {
    fn from(kind: ModuleKind) -> Self {
        Self::new(kind)
    }
}

/// Every module kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum ModuleKind {
    Required(RequiredModule),
    Spawn(SpawnModule),
    TypeData(TypeDataModule),
    Lifetime(LifetimeModule),
    Size(SizeModule),
    SizeMultiplyLife(SizeMultiplyLifeModule),
    SizeScale(SizeScaleModule),
    SizeMultiplyVelocity(SizeMultiplyVelocityModule),
    Color(ColorModule),
    ColorOverLife(ColorOverLifeModule),
    ColorScaleOverLife(ColorScaleOverLifeModule),
    Velocity(VelocityModule),
    VelocityInheritParent(VelocityInheritParentModule),
    VelocityOverLifetime(VelocityOverLifetimeModule),
    Acceleration(AccelerationModule),
    AccelerationOverLifetime(AccelerationOverLifetimeModule),
    Location(LocationModule),
    LocationDirect(LocationDirectModule),
    LocationSphere(LocationSphereModule),
    LocationEmitter(LocationEmitterModule),
    Rotation(RotationModule),
    RotationRate(RotationRateModule),
    RotationOverLifetime(RotationOverLifetimeModule),
    SubUv(SubUvModule),
    AttractorPoint(AttractorPointModule),
    AttractorLine(AttractorLineModule),
    AttractorParticle(AttractorParticleModule),
    KillBox(KillBoxModule),
    KillHeight(KillHeightModule),
    UberLtisivcl(UberLtisivclModule),
    EventGenerator(EventGeneratorModule),
    EventReceiverSpawn(EventReceiverSpawnModule),
}

impl ModuleKind {
    /// Display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Required(_) => "Required",
            Self::Spawn(_) => "Spawn",
            Self::TypeData(_) => "TypeData",
            Self::Lifetime(_) => "Lifetime",
            Self::Size(_) => "Size",
            Self::SizeMultiplyLife(_) => "SizeMultiplyLife",
            Self::SizeScale(_) => "SizeScale",
            Self::SizeMultiplyVelocity(_) => "SizeMultiplyVelocity",
            Self::Color(_) => "Color",
            Self::ColorOverLife(_) => "ColorOverLife",
            Self::ColorScaleOverLife(_) => "ColorScaleOverLife",
            Self::Velocity(_) => "Velocity",
            Self::VelocityInheritParent(_) => "VelocityInheritParent",
            Self::VelocityOverLifetime(_) => "VelocityOverLifetime",
            Self::Acceleration(_) => "Acceleration",
            Self::AccelerationOverLifetime(_) => "AccelerationOverLifetime",
            Self::Location(_) => "Location",
            Self::LocationDirect(_) => "LocationDirect",
            Self::LocationSphere(_) => "LocationSphere",
            Self::LocationEmitter(_) => "LocationEmitter",
            Self::Rotation(_) => "Rotation",
            Self::RotationRate(_) => "RotationRate",
            Self::RotationOverLifetime(_) => "RotationOverLifetime",
            Self::SubUv(_) => "SubUv",
            Self::AttractorPoint(_) => "AttractorPoint",
            Self::AttractorLine(_) => "AttractorLine",
            Self::AttractorParticle(_) => "AttractorParticle",
            Self::KillBox(_) => "KillBox",
            Self::KillHeight(_) => "KillHeight",
            Self::UberLtisivcl(_) => "UberLtisivcl",
            Self::EventGenerator(_) => "EventGenerator",
            Self::EventReceiverSpawn(_) => "EventReceiverSpawn",
        }
    }

    /// Whether this kind belongs in one of the three fixed slots.
    #[must_use]
    pub const fn is_slot_kind(&self) -> bool {
        matches!(self, Self::Required(_) | Self::Spawn(_) | Self::TypeData(_))
    }

    /// Runs when particles are born.
    #[must_use]
    pub const fn is_spawn(&self) -> bool {
        matches!(
            self,
            Self::Lifetime(_)
                | Self::Size(_)
                | Self::SizeMultiplyLife(_)
                | Self::SizeMultiplyVelocity(_)
                | Self::Color(_)
                | Self::ColorOverLife(_)
                | Self::ColorScaleOverLife(_)
                | Self::Velocity(_)
                | Self::VelocityInheritParent(_)
                | Self::Acceleration(_)
                | Self::Location(_)
                | Self::LocationDirect(_)
                | Self::LocationSphere(_)
                | Self::LocationEmitter(_)
                | Self::Rotation(_)
                | Self::RotationRate(_)
                | Self::SubUv(_)
                | Self::AttractorParticle(_)
                | Self::UberLtisivcl(_)
        )
    }

    /// Runs every tick over the live particles.
    #[must_use]
    pub const fn is_update(&self) -> bool {
        matches!(
            self,
            Self::SizeMultiplyLife(_)
                | Self::SizeScale(_)
                | Self::SizeMultiplyVelocity(_)
                | Self::ColorOverLife(_)
                | Self::ColorScaleOverLife(_)
                | Self::VelocityOverLifetime(_)
                | Self::Acceleration(_)
                | Self::AccelerationOverLifetime(_)
                | Self::LocationDirect(_)
                | Self::RotationOverLifetime(_)
                | Self::SubUv(_)
                | Self::AttractorPoint(_)
                | Self::AttractorLine(_)
                | Self::AttractorParticle(_)
                | Self::KillBox(_)
                | Self::KillHeight(_)
                | Self::UberLtisivcl(_)
        )
    }

    /// Payload bytes per particle. Depends on configuration only.
    #[must_use]
    pub const fn required_bytes(&self) -> usize {
        match self {
            Self::TypeData(type_data) => type_data.required_bytes(),
            Self::Acceleration(_) => AccelerationModule::PAYLOAD_SIZE,
            Self::LocationDirect(_) => LocationDirectModule::PAYLOAD_SIZE,
            Self::SubUv(_) => SubUvModule::PAYLOAD_SIZE,
            Self::AttractorParticle(_) => AttractorParticleModule::PAYLOAD_SIZE,
            _ => 0,
        }
    }

    /// Per-instance bytes.
    #[must_use]
    pub const fn required_bytes_per_instance(&self) -> usize {
        match self {
            Self::TypeData(type_data) => type_data.required_bytes_per_instance(),
            Self::LocationEmitter(_) => LocationEmitterModule::INSTANCE_SIZE,
            Self::AttractorParticle(_) => AttractorParticleModule::INSTANCE_SIZE,
            Self::EventGenerator(_) => EventGeneratorModule::INSTANCE_SIZE,
            _ => 0,
        }
    }

    /// Name of the sibling emitter this module reads from.
    #[must_use]
    pub fn source_emitter_name(&self) -> Option<&str> {
        match self {
            Self::LocationEmitter(module) => Some(&module.emitter_name),
            Self::AttractorParticle(module) => Some(&module.emitter_name),
            _ => None,
        }
    }

    /// Longest lifetime this module can assign, if it assigns one.
    #[must_use]
    pub fn max_lifetime(&self) -> Option<f32> {
        match self {
            Self::Lifetime(module) => Some(module.max_lifetime()),
            Self::UberLtisivcl(module) => Some(module.max_lifetime()),
            _ => None,
        }
    }

    /// Scales tunable values for a generated lower LOD.
    pub fn scale_for_lod(&mut self, percentage: u32, policy: &LodGenerationPolicy) {
        if let Self::Spawn(spawn) = self {
            spawn.scale_for_lod(percentage, policy);
        }
    }

    /// The Required module, if this is one.
    #[must_use]
    pub const fn as_required(&self) -> Option<&RequiredModule> {
        match self {
            Self::Required(module) => Some(module),
            _ => None,
        }
    }

    /// The Spawn module, if this is one.
    #[must_use]
    pub const fn as_spawn(&self) -> Option<&SpawnModule> {
        match self {
            Self::Spawn(module) => Some(module),
            _ => None,
        }
    }

    /// The type-data module, if this is one.
    #[must_use]
    pub const fn as_type_data(&self) -> Option<&TypeDataModule> {
        match self {
            Self::TypeData(module) => Some(module),
            _ => None,
        }
    }

    /// The event generator, if this is one.
    #[must_use]
    pub const fn as_event_generator(&self) -> Option<&EventGeneratorModule> {
        match self {
            Self::EventGenerator(module) => Some(module),
            _ => None,
        }
    }

    /// The event receiver, if this is one.
    #[must_use]
    pub const fn as_event_receiver(&self) -> Option<&EventReceiverSpawnModule> {
        match self {
            Self::EventReceiverSpawn(module) => Some(module),
            _ => None,
        }
    }

    /// Initializes a newborn particle.
    ///
    /// `offset` is this module's payload offset; `spawn_time` is how far
    /// into the tick the particle was born, in seconds.
    pub fn spawn(
        &self,
        ctx: &mut SpawnContext<'_>,
        particle: &mut BaseParticle,
        payload: &mut [u8],
        offset: usize,
        spawn_time: f32,
    ) {
        match self {
            Self::TypeData(module) => module.spawn(ctx, particle, payload, offset),
            Self::Lifetime(module) => module.spawn(ctx, particle, spawn_time),
            Self::Size(module) => module.spawn(ctx, particle),
            Self::SizeMultiplyLife(module) => module.spawn(ctx, particle),
            Self::SizeMultiplyVelocity(module) => module.spawn(ctx, particle),
            Self::Color(module) => module.spawn(ctx, particle),
            Self::ColorOverLife(module) => module.spawn(ctx, particle),
            Self::ColorScaleOverLife(module) => module.spawn(ctx, particle),
            Self::Velocity(module) => module.spawn(ctx, particle),
            Self::VelocityInheritParent(module) => module.spawn(ctx, particle),
            Self::Acceleration(module) => module.spawn(ctx, particle, payload, offset, spawn_time),
            Self::Location(module) => module.spawn(ctx, particle),
            Self::LocationDirect(module) => module.spawn(ctx, particle, payload, offset),
            Self::LocationSphere(module) => module.spawn(ctx, particle),
            Self::LocationEmitter(module) => module.spawn(ctx, particle),
            Self::Rotation(module) => module.spawn(ctx, particle),
            Self::RotationRate(module) => module.spawn(ctx, particle),
            Self::SubUv(module) => module.spawn(ctx, particle, payload, offset),
            Self::AttractorParticle(module) => module.spawn(ctx, payload, offset),
            Self::UberLtisivcl(module) => module.spawn(ctx, particle, spawn_time),
            _ => {}
        }
    }

    /// Advances every live particle. Tolerates an empty buffer.
    pub fn update(
        &self,
        ctx: &mut UpdateContext<'_, '_>,
        buffer: &mut ParticleBuffer,
        offset: usize,
        delta_time: f32,
    ) {
        match self {
            Self::TypeData(module) => module.update(buffer, offset, delta_time),
            Self::SizeMultiplyLife(module) => module.update(ctx, buffer),
            Self::SizeScale(module) => module.update(ctx, buffer),
            Self::SizeMultiplyVelocity(module) => module.update(ctx, buffer),
            Self::ColorOverLife(module) => module.update(ctx, buffer),
            Self::ColorScaleOverLife(module) => module.update(ctx, buffer),
            Self::VelocityOverLifetime(module) => module.update(ctx, buffer),
            Self::Acceleration(_) => AccelerationModule::update(buffer, offset, delta_time),
            Self::AccelerationOverLifetime(module) => module.update(ctx, buffer, delta_time),
            Self::LocationDirect(module) => module.update(ctx, buffer, offset, delta_time),
            Self::RotationOverLifetime(module) => module.update(ctx, buffer),
            Self::SubUv(module) => module.update(ctx, buffer, offset),
            Self::AttractorPoint(module) => module.update(ctx, buffer, delta_time),
            Self::AttractorLine(module) => module.update(ctx, buffer, delta_time),
            Self::AttractorParticle(module) => module.update(ctx, buffer, offset, delta_time),
            Self::KillBox(module) => module.update(ctx, buffer),
            Self::KillHeight(module) => module.update(ctx, buffer),
            Self::UberLtisivcl(module) => module.update(ctx, buffer),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_remove_level_shifts_down() {
        let mut mask = LodMask::EMPTY;
        mask.set(0);
        mask.set(2);
        mask.set(3);
        mask.remove_level(1);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 1, 2]);

        let mut mask = LodMask::single(1);
        mask.remove_level(1);
        assert!(mask.is_empty());
    }

    #[test]
    fn test_mask_insert_level_shifts_up() {
        let mut mask = LodMask::all(3);
        mask.insert_level(1);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 2, 3]);
    }

    #[test]
    fn test_mask_within() {
        assert!(LodMask::all(3).within(3));
        assert!(!LodMask::single(3).within(3));
        assert!(LodMask::EMPTY.within(0));
    }

    #[test]
    fn test_identity_ignores_editor_fields() {
        let a = ParticleModule::new(ModuleKind::Spawn(SpawnModule::with_rate(5.0)));
        let mut b = a.duplicate_for_level(2);
        b.editor_color = [1, 2, 3, 4];
        assert!(a.is_identical(&b));
        assert_eq!(b.lod_validity, LodMask::single(2));

        b.enabled = false;
        assert!(!a.is_identical(&b));
    }

    #[test]
    fn test_byte_requirements() {
        assert_eq!(ModuleKind::Acceleration(AccelerationModule::default()).required_bytes(), 12);
        assert_eq!(ModuleKind::AttractorParticle(AttractorParticleModule::default()).required_bytes(), 4);
        assert_eq!(ModuleKind::SubUv(SubUvModule::default()).required_bytes(), 12);
        assert_eq!(ModuleKind::Lifetime(LifetimeModule::default()).required_bytes(), 0);
        assert_eq!(
            ModuleKind::EventGenerator(EventGeneratorModule::default()).required_bytes_per_instance(),
            12
        );
    }

    #[test]
    fn test_spawn_update_roles() {
        let acceleration = ModuleKind::Acceleration(AccelerationModule::default());
        assert!(acceleration.is_spawn() && acceleration.is_update());
        let kill = ModuleKind::KillHeight(KillHeightModule::default());
        assert!(!kill.is_spawn() && kill.is_update());
        let required = ModuleKind::Required(RequiredModule::default());
        assert!(required.is_slot_kind() && !required.is_spawn() && !required.is_update());
    }
}
