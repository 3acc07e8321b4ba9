//! # LOD Levels
//!
//! One detail tier of an emitter: the Required, Spawn and optional
//! Type-Data slots plus an ordered list of ordinary modules. Levels store
//! handles into the template's module arena; a module shared by several
//! levels carries all of their bits in its [`LodMask`].
//!
//! ```text
//! level 0:  Required(a)  Spawn(b)   [ c, d ]
//! level 1:  Required(a)  Spawn(e)   [ c, f ]
//!
//! a.mask = {0,1}  b.mask = {0}  e.mask = {1}  c.mask = {0,1} ...
//! ```

use ember_core::Arena;

use crate::config::LodGenerationPolicy;
use crate::error::{ParticleError, ParticleResult};
use crate::module::{LodMask, ModuleHandle, ModuleSlot, ParticleModule};

/// One LOD level of an emitter template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LodLevel {
    pub(crate) level: usize,
    pub(crate) enabled: bool,
    pub(crate) required: ModuleHandle,
    pub(crate) spawn: ModuleHandle,
    pub(crate) type_data: Option<ModuleHandle>,
    pub(crate) modules: Vec<ModuleHandle>,
    spawn_modules: Vec<usize>,
    update_modules: Vec<usize>,
    event_generator: Option<usize>,
    event_receivers: Vec<usize>,
}

impl LodLevel {
    /// A level with only its Required and Spawn slots filled.
    #[must_use]
    pub fn new(level: usize, required: ModuleHandle, spawn: ModuleHandle) -> Self {
        Self {
            level,
            enabled: true,
            required,
            spawn,
            type_data: None,
            modules: Vec::new(),
            spawn_modules: Vec::new(),
            update_modules: Vec::new(),
            event_generator: None,
            event_receivers: Vec::new(),
        }
    }

    /// Deep-copies `source` into a new level at ordinal `level`.
    ///
    /// Every copied module is owned by the new level only and has its
    /// tunable values scaled by `percentage`.
    ///
    /// # Errors
    ///
    /// [`ParticleError::StaleModule`] if `source` refers to a released module.
    pub fn generate_from_level(
        source: &Self,
        level: usize,
        percentage: u32,
        policy: &LodGenerationPolicy,
        arena: &mut Arena<ParticleModule>,
    ) -> ParticleResult<Self> {
        let mut duplicate = |handle: ModuleHandle| -> ParticleResult<ModuleHandle> {
            let mut copy = arena
                .get(handle)
                .ok_or(ParticleError::StaleModule(source.level))?
                .duplicate_for_level(level);
            copy.kind.scale_for_lod(percentage, policy);
            Ok(arena.insert(copy))
        };

        let required = duplicate(source.required)?;
        let spawn = duplicate(source.spawn)?;
        let type_data = source.type_data.map(&mut duplicate).transpose()?;
        let modules = source
            .modules
            .iter()
            .map(|&handle| duplicate(handle))
            .collect::<ParticleResult<Vec<_>>>()?;

        let mut generated = Self {
            enabled: source.enabled,
            type_data,
            modules,
            ..Self::new(level, required, spawn)
        };
        generated.update_module_lists(arena);
        Ok(generated)
    }

    /// Ordinal of this level; 0 is the highest detail.
    #[must_use]
    pub const fn level(&self) -> usize {
        self.level
    }

    /// Disabled levels tick but never spawn.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables spawning at this level.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Required slot.
    #[must_use]
    pub const fn required(&self) -> ModuleHandle {
        self.required
    }

    /// Spawn slot.
    #[must_use]
    pub const fn spawn(&self) -> ModuleHandle {
        self.spawn
    }

    /// Type-Data slot.
    #[must_use]
    pub const fn type_data(&self) -> Option<ModuleHandle> {
        self.type_data
    }

    /// Ordinary modules in pipeline order.
    #[must_use]
    pub fn modules(&self) -> &[ModuleHandle] {
        &self.modules
    }

    /// Indices of ordinary modules that run at spawn.
    #[must_use]
    pub fn spawn_modules(&self) -> &[usize] {
        &self.spawn_modules
    }

    /// Indices of ordinary modules that run at update.
    #[must_use]
    pub fn update_modules(&self) -> &[usize] {
        &self.update_modules
    }

    /// Index of the event generator, if any.
    #[must_use]
    pub const fn event_generator(&self) -> Option<usize> {
        self.event_generator
    }

    /// Indices of event receivers.
    #[must_use]
    pub fn event_receivers(&self) -> &[usize] {
        &self.event_receivers
    }

    /// Every handle the level refers to, slots first.
    pub fn handles(&self) -> impl Iterator<Item = ModuleHandle> + '_ {
        [Some(self.required), Some(self.spawn), self.type_data]
            .into_iter()
            .flatten()
            .chain(self.modules.iter().copied())
    }

    /// Every slot paired with its handle, slots first.
    pub fn slots(&self) -> impl Iterator<Item = (ModuleSlot, ModuleHandle)> + '_ {
        [
            Some((ModuleSlot::Required, self.required)),
            Some((ModuleSlot::Spawn, self.spawn)),
            self.type_data.map(|handle| (ModuleSlot::TypeData, handle)),
        ]
        .into_iter()
        .flatten()
        .chain(
            self.modules
                .iter()
                .enumerate()
                .map(|(index, &handle)| (ModuleSlot::Ordinary(index), handle)),
        )
    }

    /// Moves the level to ordinal `new_level`, carrying its bits along.
    pub fn set_level_index(&mut self, new_level: usize, arena: &mut Arena<ParticleModule>) {
        if new_level == self.level {
            return;
        }
        for handle in self.handles().collect::<Vec<_>>() {
            if let Some(module) = arena.get_mut(handle) {
                module.lod_validity.clear(self.level);
                module.lod_validity.set(new_level);
            }
        }
        self.level = new_level;
    }

    /// Whether `handle` may be edited in place at this level.
    ///
    /// It must belong to this level and not be shared with any higher
    /// detail level.
    #[must_use]
    pub fn is_module_editable(&self, handle: ModuleHandle, arena: &Arena<ParticleModule>) -> bool {
        let Some(module) = arena.get(handle) else {
            return false;
        };
        if !module.lod_validity.contains(self.level) {
            return false;
        }
        let higher = LodMask::all(self.level);
        module.lod_validity.bits() & higher.bits() == 0
    }

    /// Slot holding `handle`.
    #[must_use]
    pub fn module_index(&self, handle: ModuleHandle) -> Option<ModuleSlot> {
        self.slots().find(|&(_, h)| h == handle).map(|(slot, _)| slot)
    }

    /// Handle in `slot`.
    #[must_use]
    pub fn module_at(&self, slot: ModuleSlot) -> Option<ModuleHandle> {
        match slot {
            ModuleSlot::Required => Some(self.required),
            ModuleSlot::Spawn => Some(self.spawn),
            ModuleSlot::TypeData => self.type_data,
            ModuleSlot::Ordinary(index) => self.modules.get(index).copied(),
        }
    }

    /// Replaces the handle in `slot`.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvalidModuleSlot`] if the slot does not exist.
    pub(crate) fn set_module_at(&mut self, slot: ModuleSlot, handle: ModuleHandle) -> ParticleResult<()> {
        match slot {
            ModuleSlot::Required => self.required = handle,
            ModuleSlot::Spawn => self.spawn = handle,
            ModuleSlot::TypeData => self.type_data = Some(handle),
            ModuleSlot::Ordinary(index) => {
                let entry = self.modules.get_mut(index).ok_or_else(|| ParticleError::InvalidModuleSlot {
                    lod: self.level,
                    slot: format!("{slot:?}"),
                })?;
                *entry = handle;
            }
        }
        Ok(())
    }

    /// Rebuilds the derived lists from the current modules.
    ///
    /// A type-data module found in the ordinary list is moved into its slot.
    pub fn update_module_lists(&mut self, arena: &Arena<ParticleModule>) {
        if let Some(position) = self
            .modules
            .iter()
            .position(|&handle| arena.get(handle).is_some_and(|m| m.kind.as_type_data().is_some()))
        {
            let handle = self.modules.remove(position);
            self.type_data = Some(handle);
        }

        self.spawn_modules.clear();
        self.update_modules.clear();
        self.event_receivers.clear();
        self.event_generator = None;

        for (index, handle) in self.modules.iter().enumerate() {
            let Some(module) = arena.get(*handle) else {
                continue;
            };
            if module.kind.is_spawn() {
                self.spawn_modules.push(index);
            }
            if module.kind.is_update() {
                self.update_modules.push(index);
            }
            if module.kind.as_event_generator().is_some() && self.event_generator.is_none() {
                self.event_generator = Some(index);
            }
            if module.kind.as_event_receiver().is_some() {
                self.event_receivers.push(index);
            }
        }
    }

    /// Worst-case live particles: `floor(rate × lifetime) + 2 + Σ bursts`.
    #[must_use]
    pub fn calculate_max_active_particle_count(&self, arena: &Arena<ParticleModule>) -> usize {
        let max_lifetime: f32 = self
            .modules
            .iter()
            .filter_map(|&handle| arena.get(handle))
            .filter_map(|module| module.kind.max_lifetime())
            .sum();
        let Some(spawn) = arena.get(self.spawn).and_then(|m| m.kind.as_spawn()) else {
            return 0;
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let from_rate = (spawn.max_spawn_rate() * max_lifetime).floor().max(0.0) as usize;
        from_rate + 2 + spawn.total_burst_count() as usize
    }

    /// Whether the type-data makes this a trail or beam emitter.
    #[must_use]
    pub fn is_trail_or_beam(&self, arena: &Arena<ParticleModule>) -> bool {
        self.type_data
            .and_then(|handle| arena.get(handle))
            .and_then(|module| module.kind.as_type_data())
            .is_some_and(crate::module::TypeDataModule::is_trail_or_beam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{
        BurstEntry, LifetimeModule, ModuleKind, RequiredModule, SpawnModule, TrailTypeData,
        TypeDataModule,
    };
    use crate::distribution::FloatDistribution;

    fn insert(arena: &mut Arena<ParticleModule>, kind: ModuleKind, level: usize) -> ModuleHandle {
        let mut module = ParticleModule::new(kind);
        module.lod_validity = LodMask::single(level);
        arena.insert(module)
    }

    fn base_level(arena: &mut Arena<ParticleModule>) -> LodLevel {
        let required = insert(arena, ModuleKind::Required(RequiredModule::default()), 0);
        let spawn = insert(
            arena,
            ModuleKind::Spawn(SpawnModule {
                burst_list: vec![BurstEntry::new(0.0, 20)],
                ..SpawnModule::with_rate(50.0)
            }),
            0,
        );
        let mut level = LodLevel::new(0, required, spawn);
        level.modules.push(insert(
            arena,
            ModuleKind::Lifetime(LifetimeModule {
                lifetime: FloatDistribution::Uniform { min: 1.0, max: 2.0 },
            }),
            0,
        ));
        level.update_module_lists(arena);
        level
    }

    #[test]
    fn test_generate_copies_and_scales() {
        let mut arena = Arena::new();
        let source = base_level(&mut arena);
        let generated =
            LodLevel::generate_from_level(&source, 1, 50, &LodGenerationPolicy::default(), &mut arena).unwrap();

        assert_eq!(generated.level(), 1);
        assert_ne!(generated.spawn(), source.spawn());
        for handle in generated.handles() {
            assert_eq!(arena.get(handle).unwrap().lod_validity, LodMask::single(1));
        }
        let spawn = arena.get(generated.spawn()).unwrap().kind.as_spawn().unwrap();
        assert_eq!(spawn.max_spawn_rate(), 25.0);
        assert_eq!(spawn.total_burst_count(), 10);
    }

    #[test]
    fn test_max_active_count() {
        let mut arena = Arena::new();
        let level = base_level(&mut arena);
        // floor(50 * 2) + 2 + 20
        assert_eq!(level.calculate_max_active_particle_count(&arena), 122);
    }

    #[test]
    fn test_slots_and_indices() {
        let mut arena = Arena::new();
        let level = base_level(&mut arena);
        let lifetime = level.modules()[0];
        assert_eq!(level.module_index(lifetime), Some(ModuleSlot::Ordinary(0)));
        assert_eq!(level.module_index(level.required()), Some(ModuleSlot::Required));
        assert_eq!(level.module_at(ModuleSlot::Ordinary(0)), Some(lifetime));
        assert_eq!(level.module_at(ModuleSlot::Ordinary(5)), None);
        assert_eq!(level.module_at(ModuleSlot::TypeData), None);
        assert_eq!(level.spawn_modules(), &[0]);
        assert!(level.update_modules().is_empty());
    }

    #[test]
    fn test_type_data_extracted_from_list() {
        let mut arena = Arena::new();
        let mut level = base_level(&mut arena);
        let trail = insert(
            &mut arena,
            ModuleKind::TypeData(TypeDataModule::Trail(TrailTypeData::default())),
            0,
        );
        level.modules.push(trail);
        level.update_module_lists(&arena);
        assert_eq!(level.type_data(), Some(trail));
        assert_eq!(level.modules().len(), 1);
        assert!(level.is_trail_or_beam(&arena));
    }

    #[test]
    fn test_editable_only_when_not_shared_upward() {
        let mut arena = Arena::new();
        let level0 = base_level(&mut arena);
        let mut level1 = level0.clone();
        level1.level = 1;
        for handle in level1.handles() {
            arena.get_mut(handle).unwrap().lod_validity.set(1);
        }

        assert!(level0.is_module_editable(level0.spawn(), &arena));
        assert!(!level1.is_module_editable(level1.spawn(), &arena));
    }

    #[test]
    fn test_set_level_index_moves_bits() {
        let mut arena = Arena::new();
        let mut level = base_level(&mut arena);
        level.set_level_index(2, &mut arena);
        assert_eq!(level.level(), 2);
        assert_eq!(arena.get(level.required()).unwrap().lod_validity, LodMask::single(2));
    }
}
