//! # Emitter Template
//!
//! Owns the module arena and the LOD levels of one emitter. All sharing
//! rules between levels are enforced here:
//!
//! - a module's [`LodMask`] holds exactly the levels that reference it,
//! - every level has a Required and a Spawn module,
//! - ordinary lists have the same length and per-slot kind on every level.
//!
//! Modules that lose their last level are parked in a pending list and
//! only released from the arena by [`EmitterTemplate::flush_pending_releases`],
//! so a render snapshot built from them stays valid until the caller
//! reaches a safe point.

use std::sync::atomic::{AtomicUsize, Ordering};

use ember_core::Arena;

use crate::config::LodGenerationPolicy;
use crate::error::{ParticleError, ParticleResult};
use crate::lod::LodLevel;
use crate::module::{
    EmitterKind, LodMask, ModuleHandle, ModuleKind, ModuleSlot, ParticleModule, RequiredModule,
    SpawnModule, TypeDataModule, MAX_LOD_LEVELS,
};

/// Static description of one emitter.
#[derive(Debug)]
pub struct EmitterTemplate {
    name: String,
    modules: Arena<ParticleModule>,
    lod_levels: Vec<LodLevel>,
    pending_release: Vec<ModuleHandle>,
    policy: LodGenerationPolicy,
    /// Particles to allocate up front; 0 uses the peak statistic.
    pub initial_allocation_count: usize,
    peak_active_particles: AtomicUsize,
}

impl EmitterTemplate {
    /// A template with a single level built from `required` and `spawn`.
    #[must_use]
    pub fn new(name: impl Into<String>, required: RequiredModule, spawn: SpawnModule) -> Self {
        let mut modules = Arena::new();
        let mut insert = |kind| {
            let mut module = ParticleModule::new(kind);
            module.lod_validity = LodMask::single(0);
            modules.insert(module)
        };
        let required = insert(ModuleKind::Required(required));
        let spawn = insert(ModuleKind::Spawn(spawn));
        let level = LodLevel::new(0, required, spawn);

        let name = name.into();
        tracing::info!("Emitter template '{}' created", name);
        Self {
            name,
            modules,
            lod_levels: vec![level],
            pending_release: Vec::new(),
            policy: LodGenerationPolicy::default(),
            initial_allocation_count: 0,
            peak_active_particles: AtomicUsize::new(0),
        }
    }

    /// Replaces the policy used when generating lower levels.
    #[must_use]
    pub fn with_policy(mut self, policy: LodGenerationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Emitter name, used by sibling references.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module arena.
    #[must_use]
    pub const fn modules(&self) -> &Arena<ParticleModule> {
        &self.modules
    }

    /// Resolves a handle.
    #[must_use]
    pub fn module(&self, handle: ModuleHandle) -> Option<&ParticleModule> {
        self.modules.get(handle)
    }

    /// Number of LOD levels.
    #[must_use]
    pub fn lod_count(&self) -> usize {
        self.lod_levels.len()
    }

    /// All levels, highest detail first.
    #[must_use]
    pub fn lod_levels(&self) -> &[LodLevel] {
        &self.lod_levels
    }

    /// Level `index`.
    #[must_use]
    pub fn lod_level(&self, index: usize) -> Option<&LodLevel> {
        self.lod_levels.get(index)
    }

    /// Enables or disables spawning at level `index`.
    ///
    /// # Errors
    ///
    /// [`ParticleError::LodOutOfRange`] for an unknown level.
    pub fn set_lod_enabled(&mut self, index: usize, enabled: bool) -> ParticleResult<()> {
        self.level_mut(index)?.set_enabled(enabled);
        Ok(())
    }

    /// Required module of a level.
    #[must_use]
    pub fn required(&self, level: &LodLevel) -> Option<&RequiredModule> {
        self.modules.get(level.required()).and_then(|m| m.kind.as_required())
    }

    /// Spawn module of a level.
    #[must_use]
    pub fn spawn(&self, level: &LodLevel) -> Option<&SpawnModule> {
        self.modules.get(level.spawn()).and_then(|m| m.kind.as_spawn())
    }

    /// Type-data module of a level.
    #[must_use]
    pub fn type_data(&self, level: &LodLevel) -> Option<&TypeDataModule> {
        level
            .type_data()
            .and_then(|handle| self.modules.get(handle))
            .and_then(|m| m.kind.as_type_data())
    }

    /// Rendering specialization, from level 0.
    #[must_use]
    pub fn emitter_kind(&self) -> EmitterKind {
        self.lod_levels
            .first()
            .and_then(|level| self.type_data(level))
            .map_or(EmitterKind::Sprite, TypeDataModule::emitter_kind)
    }

    /// Modules waiting for [`Self::flush_pending_releases`].
    #[must_use]
    pub fn pending_releases(&self) -> &[ModuleHandle] {
        &self.pending_release
    }

    /// Highest live particle count any instance has reported.
    #[must_use]
    pub fn peak_active_particles(&self) -> usize {
        self.peak_active_particles.load(Ordering::Relaxed)
    }

    /// Folds an observed particle count into the peak statistic.
    pub fn record_peak_active(&self, count: usize) {
        self.peak_active_particles.fetch_max(count, Ordering::Relaxed);
    }

    fn level_mut(&mut self, index: usize) -> ParticleResult<&mut LodLevel> {
        let count = self.lod_levels.len();
        self.lod_levels
            .get_mut(index)
            .ok_or(ParticleError::LodOutOfRange { index, count })
    }

    fn release(&mut self, handle: ModuleHandle) {
        if !self.pending_release.contains(&handle) {
            self.pending_release.push(handle);
        }
    }

    /// Clears `level` from a module's mask, parking it if nobody uses it.
    fn drop_reference(&mut self, handle: ModuleHandle, level: usize) {
        let orphaned = self.modules.get_mut(handle).is_some_and(|module| {
            module.lod_validity.clear(level);
            module.lod_validity.is_empty()
        });
        if orphaned {
            self.release(handle);
        }
    }

    fn refresh_lists(&mut self) {
        for level in &mut self.lod_levels {
            level.update_module_lists(&self.modules);
        }
    }

    /// Appends `kind` to every level, shared by all of them.
    ///
    /// # Errors
    ///
    /// [`ParticleError::WrongSlotKind`] for Required, Spawn or Type-Data.
    pub fn add_module(&mut self, kind: ModuleKind) -> ParticleResult<ModuleHandle> {
        if kind.is_slot_kind() {
            return Err(ParticleError::WrongSlotKind {
                kind: kind.name(),
                slot: "ordinary".into(),
            });
        }
        let mut module = ParticleModule::new(kind);
        module.lod_validity = LodMask::all(self.lod_levels.len());
        let handle = self.modules.insert(module);
        for level in &mut self.lod_levels {
            level.modules.push(handle);
        }
        self.refresh_lists();
        Ok(handle)
    }

    /// Installs a type-data module on every level, shared by all of them.
    ///
    /// Previous type-data modules are parked for release.
    ///
    /// # Errors
    ///
    /// [`ParticleError::WrongSlotKind`] if `type_data` is not a type-data kind.
    pub fn set_type_data(&mut self, type_data: ModuleKind) -> ParticleResult<ModuleHandle> {
        if type_data.as_type_data().is_none() {
            return Err(ParticleError::WrongSlotKind {
                kind: type_data.name(),
                slot: "TypeData".into(),
            });
        }
        let mut module = ParticleModule::new(type_data);
        module.lod_validity = LodMask::all(self.lod_levels.len());
        let handle = self.modules.insert(module);

        let previous: Vec<_> = self
            .lod_levels
            .iter_mut()
            .filter_map(|level| {
                let old = level.type_data.replace(handle);
                old.map(|old| (old, level.level))
            })
            .collect();
        for (old, level) in previous {
            self.drop_reference(old, level);
        }
        self.refresh_lists();
        Ok(handle)
    }

    /// Removes ordinary module `index` from every level.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvalidModuleSlot`] if the index does not exist.
    pub fn remove_module(&mut self, index: usize) -> ParticleResult<()> {
        if index >= self.lod_levels.first().map_or(0, |level| level.modules.len()) {
            return Err(ParticleError::InvalidModuleSlot {
                lod: 0,
                slot: format!("{:?}", ModuleSlot::Ordinary(index)),
            });
        }
        let removed: Vec<_> = self
            .lod_levels
            .iter_mut()
            .filter(|level| index < level.modules.len())
            .map(|level| (level.modules.remove(index), level.level))
            .collect();
        for (handle, level) in removed {
            self.drop_reference(handle, level);
        }
        self.refresh_lists();
        Ok(())
    }

    /// Inserts a new level at `index`.
    ///
    /// With no levels a default one is built (Required with a one second
    /// duration looping forever, Spawn at 10 per second). Otherwise the new
    /// level is a 100% copy of the next higher detail level.
    ///
    /// # Errors
    ///
    /// [`ParticleError::LodOutOfRange`] past the end,
    /// [`ParticleError::TooManyLodLevels`] at the bitmask limit.
    pub fn create_lod_level(&mut self, index: usize) -> ParticleResult<usize> {
        let count = self.lod_levels.len();
        if index > count {
            return Err(ParticleError::LodOutOfRange { index, count });
        }
        if count >= MAX_LOD_LEVELS {
            return Err(ParticleError::TooManyLodLevels(count));
        }

        if count == 0 {
            let mut insert = |kind| {
                let mut module = ParticleModule::new(kind);
                module.lod_validity = LodMask::single(0);
                self.modules.insert(module)
            };
            let required = insert(ModuleKind::Required(RequiredModule::default()));
            let spawn = insert(ModuleKind::Spawn(SpawnModule::with_rate(10.0)));
            self.lod_levels.push(LodLevel::new(0, required, spawn));
            return Ok(0);
        }

        for (_, module) in self.modules.iter_mut() {
            module.lod_validity.insert_level(index);
        }
        for level in &mut self.lod_levels[index..] {
            level.level += 1;
        }

        let source_index = index.saturating_sub(1);
        let generated = LodLevel::generate_from_level(
            &self.lod_levels[source_index],
            index,
            100,
            &self.policy,
            &mut self.modules,
        )?;
        self.lod_levels.insert(index, generated);
        tracing::debug!("Emitter '{}' created LOD level {}", self.name, index);
        Ok(index)
    }

    /// Adds a lowest level when only one exists.
    ///
    /// The copy is scaled by the policy percentage, or 100% for trail and
    /// beam emitters or when `duplicate_highest` is set.
    ///
    /// # Returns
    ///
    /// False if the template already had more than one level.
    ///
    /// # Errors
    ///
    /// Propagates [`ParticleError::StaleModule`] from generation.
    pub fn autogenerate_lowest_lod_level(&mut self, duplicate_highest: bool) -> ParticleResult<bool> {
        if self.lod_levels.len() != 1 {
            return Ok(false);
        }
        let percentage = self
            .policy
            .percentage_for(self.lod_levels[0].is_trail_or_beam(&self.modules), duplicate_highest);
        let generated =
            LodLevel::generate_from_level(&self.lod_levels[0], 1, percentage, &self.policy, &mut self.modules)?;
        self.lod_levels.push(generated);
        tracing::debug!("Emitter '{}' generated lowest LOD at {}%", self.name, percentage);
        Ok(true)
    }

    /// Deletes level `index` and renumbers the levels above it down.
    ///
    /// Modules only that level used are parked for release.
    ///
    /// # Errors
    ///
    /// [`ParticleError::LastLodLevel`] for the only level,
    /// [`ParticleError::LodOutOfRange`] for an unknown one.
    pub fn delete_lod_level(&mut self, index: usize) -> ParticleResult<()> {
        let count = self.lod_levels.len();
        if index >= count {
            return Err(ParticleError::LodOutOfRange { index, count });
        }
        if count == 1 {
            return Err(ParticleError::LastLodLevel);
        }

        let removed = self.lod_levels.remove(index);
        for handle in removed.handles() {
            self.drop_reference(handle, index);
        }
        for position in index..self.lod_levels.len() {
            self.lod_levels[position].set_level_index(position, &mut self.modules);
        }
        tracing::debug!("Emitter '{}' deleted LOD level {}", self.name, index);
        Ok(())
    }

    /// Collapses identical modules of adjacent levels onto one instance.
    ///
    /// # Returns
    ///
    /// Number of slots that now share a module.
    pub fn share_identical_modules(&mut self) -> usize {
        let mut shared = 0;
        for index in 1..self.lod_levels.len() {
            let slots: Vec<_> = self.lod_levels[index].slots().collect();
            for (slot, handle) in slots {
                let Some(above) = self.lod_levels[index - 1].module_at(slot) else {
                    continue;
                };
                if above == handle {
                    continue;
                }
                let identical = match (self.modules.get(above), self.modules.get(handle)) {
                    (Some(a), Some(b)) => a.is_identical(b),
                    _ => false,
                };
                if !identical {
                    continue;
                }
                if self.lod_levels[index].set_module_at(slot, above).is_err() {
                    continue;
                }
                if let Some(module) = self.modules.get_mut(above) {
                    module.lod_validity.set(index);
                }
                self.drop_reference(handle, index);
                shared += 1;
            }
        }
        if shared > 0 {
            self.refresh_lists();
        }
        shared
    }

    /// Gives level `lod` its own copy of the module in `slot`.
    ///
    /// An unshared module is returned as is.
    ///
    /// # Errors
    ///
    /// [`ParticleError::LodOutOfRange`], [`ParticleError::InvalidModuleSlot`]
    /// or [`ParticleError::StaleModule`].
    pub fn promote_module(&mut self, lod: usize, slot: ModuleSlot) -> ParticleResult<ModuleHandle> {
        let handle = self
            .level_mut(lod)?
            .module_at(slot)
            .ok_or_else(|| ParticleError::InvalidModuleSlot {
                lod,
                slot: format!("{slot:?}"),
            })?;
        let module = self.modules.get(handle).ok_or(ParticleError::StaleModule(lod))?;
        if module.lod_validity == LodMask::single(lod) {
            return Ok(handle);
        }

        let copy = module.duplicate_for_level(lod);
        let new_handle = self.modules.insert(copy);
        self.level_mut(lod)?.set_module_at(slot, new_handle)?;
        self.drop_reference(handle, lod);
        self.refresh_lists();
        Ok(new_handle)
    }

    /// Mutable access to the module in `slot` of level `lod`, promoting a
    /// shared module first so other levels are unaffected.
    ///
    /// # Errors
    ///
    /// As [`Self::promote_module`].
    pub fn edit_module(&mut self, lod: usize, slot: ModuleSlot) -> ParticleResult<&mut ParticleModule> {
        let handle = self.promote_module(lod, slot)?;
        self.modules.get_mut(handle).ok_or(ParticleError::StaleModule(lod))
    }

    /// Rebuilds every mask from the level references.
    ///
    /// # Returns
    ///
    /// Number of masks that changed.
    pub fn fixup_module_lod_errors(&mut self) -> usize {
        let mut expected: Vec<(ModuleHandle, LodMask)> = Vec::new();
        for level in &self.lod_levels {
            for handle in level.handles() {
                match expected.iter_mut().find(|(h, _)| *h == handle) {
                    Some((_, mask)) => mask.set(level.level),
                    None => expected.push((handle, LodMask::single(level.level))),
                }
            }
        }

        let mut fixed = 0;
        let mut orphans = Vec::new();
        for (handle, module) in self.modules.iter_mut() {
            let mask = expected
                .iter()
                .find(|(h, _)| *h == handle)
                .map_or(LodMask::EMPTY, |(_, mask)| *mask);
            if module.lod_validity != mask {
                module.lod_validity = mask;
                fixed += 1;
            }
            if mask.is_empty() {
                orphans.push(handle);
            }
        }
        for handle in orphans {
            self.release(handle);
        }
        if fixed > 0 {
            tracing::debug!("Emitter '{}' fixed {} LOD masks", self.name, fixed);
        }
        fixed
    }

    /// Releases parked modules from the arena.
    ///
    /// # Returns
    ///
    /// Number of modules released.
    pub fn flush_pending_releases(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_release);
        let mut released = 0;
        for handle in pending {
            let unused = self.modules.get(handle).is_some_and(|m| m.lod_validity.is_empty());
            if unused && self.modules.remove(handle).is_some() {
                released += 1;
            }
        }
        released
    }

    /// Rebuilds the derived module lists of every level.
    pub fn update_module_lists(&mut self) {
        self.refresh_lists();
    }

    /// Largest worst-case particle count over all levels.
    #[must_use]
    pub fn calculate_max_active_particle_count(&self) -> usize {
        self.lod_levels
            .iter()
            .map(|level| level.calculate_max_active_particle_count(&self.modules))
            .max()
            .unwrap_or(0)
    }

    /// Checks every sharing rule.
    ///
    /// # Errors
    ///
    /// The first violation found.
    pub fn validate(&self) -> ParticleResult<()> {
        let count = self.lod_levels.len();
        if count == 0 {
            return Err(ParticleError::MissingRequired(0));
        }
        let shape: Vec<&'static str> = self.ordinary_kinds(&self.lod_levels[0])?;

        for (index, level) in self.lod_levels.iter().enumerate() {
            if level.level != index {
                return Err(ParticleError::InconsistentLod(format!(
                    "level at position {index} is numbered {}",
                    level.level
                )));
            }
            if self.required(level).is_none() {
                return Err(ParticleError::MissingRequired(index));
            }
            if self.spawn(level).is_none() {
                return Err(ParticleError::MissingSpawn(index));
            }
            if level.type_data.is_some() && self.type_data(level).is_none() {
                return Err(ParticleError::WrongSlotKind {
                    kind: level
                        .type_data
                        .and_then(|handle| self.modules.get(handle))
                        .map_or("released", |m| m.kind.name()),
                    slot: "TypeData".into(),
                });
            }
            if self.ordinary_kinds(level)? != shape {
                return Err(ParticleError::InconsistentLod(format!(
                    "module list of level {index} differs from level 0"
                )));
            }
            for handle in level.handles() {
                let module = self.modules.get(handle).ok_or(ParticleError::StaleModule(index))?;
                if !module.lod_validity.contains(index) {
                    return Err(ParticleError::InconsistentLod(format!(
                        "{} used by level {index} lacks its bit",
                        module.kind.name()
                    )));
                }
            }
        }

        for (handle, module) in self.modules.iter() {
            if self.pending_release.contains(&handle) {
                continue;
            }
            if module.lod_validity.is_empty() || !module.lod_validity.within(count) {
                return Err(ParticleError::InconsistentLod(format!(
                    "{} has mask {:#b} with {count} levels",
                    module.kind.name(),
                    module.lod_validity.bits()
                )));
            }
            for level in module.lod_validity.iter() {
                if !self.lod_levels[level].handles().any(|h| h == handle) {
                    return Err(ParticleError::InconsistentLod(format!(
                        "{} claims level {level} but is not referenced there",
                        module.kind.name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn ordinary_kinds(&self, level: &LodLevel) -> ParticleResult<Vec<&'static str>> {
        level
            .modules()
            .iter()
            .map(|&handle| {
                self.modules
                    .get(handle)
                    .map(|m| m.kind.name())
                    .ok_or(ParticleError::StaleModule(level.level))
            })
            .collect()
    }
}
