//! # Emitter Instance
//!
//! Runtime state of one emitter inside one live particle system.
//!
//! ```text
//! tick(dt):
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. TIME       location, seconds, loop detection, delay       │
//! │ 2. SPAWN      forced batches | rate + bursts, event batches  │
//! │               TypeData -> spawn modules -> PostSpawn          │
//! │ 3. UPDATE     reset to base, age, modules, TypeData post      │
//! │ 4. INTEGRATE  location += v*dt, rotation += rate*dt          │
//! │ 5. KILL       relative_time > 1, walked backwards            │
//! │ 6. BOUNDS     rebuilt from survivors                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The payload layout is fixed at construction. `tick` never fails: soft
//! conditions (capacity ceiling, missing sibling, disabled level) degrade
//! and are logged.

use std::sync::Arc;

use rand::SeedableRng;

use ember_core::{Aabb, LinearColor, Vec3, KINDA_SMALL_NUMBER, TWO_PI};

use crate::buffer::{read_payload, write_payload, ParticleBuffer};
use crate::config::EngineConfig;
use crate::distribution::ParticleRng;
use crate::error::ParticleResult;
use crate::events::{EventCounters, EventQueue, EventRecorder, ParticleEvent};
use crate::layout::PayloadLayout;
use crate::lod::LodLevel;
use crate::module::{
    EmitterFrame, EventGeneratorModule, ForcedSpawnBatch, ModuleKind, RequiredModule, SiblingEmitters,
    SpawnBatch, SpawnContext, SpawnModule, SubUvPayload, UpdateContext,
};
use crate::particle::flags;
use crate::template::EmitterTemplate;

/// Golden-ratio increment separating per-emitter random streams.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Where the particles of a spawn request start.
#[derive(Clone, Debug)]
enum SpawnOrigin {
    /// The emitter location, spread along its travel this tick.
    Emitter,
    /// One location and velocity shared by every particle.
    Point { location: Vec3, velocity: Vec3 },
    /// A location and optional velocity per particle.
    PerParticle {
        positions: Vec<Vec3>,
        velocities: Option<Vec<Vec3>>,
    },
}

impl SpawnOrigin {
    /// Start location and velocity of the `i`th particle, or `None` to
    /// start at the emitter.
    fn start(&self, i: usize) -> Option<(Vec3, Vec3)> {
        match self {
            Self::Emitter => None,
            Self::Point { location, velocity } => Some((*location, *velocity)),
            Self::PerParticle { positions, velocities } => {
                let velocity = velocities
                    .as_ref()
                    .and_then(|velocities| velocities.get(i).copied())
                    .unwrap_or(Vec3::ZERO);
                positions.get(i).map(|&location| (location, velocity))
            }
        }
    }
}

/// One particle spawn request inside a tick.
#[derive(Clone, Debug)]
struct SpawnRequest {
    count: usize,
    start_time: f32,
    increment: f32,
    origin: SpawnOrigin,
}

/// A live emitter.
pub struct EmitterInstance {
    template: Arc<EmitterTemplate>,
    emitter_index: usize,
    layout: PayloadLayout,
    buffer: ParticleBuffer,
    instance_data: Vec<u8>,
    rng: ParticleRng,
    current_lod: usize,

    location: Vec3,
    target_location: Vec3,
    old_location: Vec3,
    owner_velocity: Vec3,

    seconds_since_creation: f32,
    emitter_time: f32,
    spawn_fraction: f32,
    loop_count: u32,
    /// Per LOD: rolled duration plus delay.
    durations: Vec<f32>,
    /// Per LOD: rolled delay.
    delays: Vec<f32>,
    /// Per LOD, per burst entry.
    burst_fired: Vec<Vec<bool>>,

    kill_on_deactivate: bool,
    kill_on_completed: bool,
    deactivated: bool,
    deactivate_pending: bool,

    bounds: Aabb,
    /// Events of the last tick.
    events: EventQueue,
    /// Events recorded between ticks, merged into the next tick.
    pending_events: EventQueue,
    forced_batches: Vec<ForcedSpawnBatch>,
    event_batches: Vec<SpawnBatch>,
    /// Per LOD, per ordinary module: resolved sibling emitter index.
    source_emitters: Vec<Vec<Option<usize>>>,
    sub_uv_offset: Option<usize>,
    peak_active_update_delta: f32,
}

impl std::fmt::Debug for EmitterInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterInstance")
            .field("template", &self.template.name())
            .field("emitter_index", &self.emitter_index)
            .field("lod", &self.current_lod)
            .field("active", &self.buffer.active_count())
            .field("capacity", &self.buffer.capacity())
            .field("seconds", &self.seconds_since_creation)
            .field("loops", &self.loop_count)
            .finish_non_exhaustive()
    }
}

impl EmitterInstance {
    /// Creates an instance, laying out the payload and allocating the
    /// initial particle buffer.
    ///
    /// # Arguments
    ///
    /// * `template` - The emitter template, shared by every instance
    /// * `config` - Engine configuration
    /// * `emitter_index` - Position of this emitter in its system
    ///
    /// # Errors
    ///
    /// Fails on an invalid template or a payload that overflows the
    /// configured stride.
    pub fn new(template: Arc<EmitterTemplate>, config: &EngineConfig, emitter_index: usize) -> ParticleResult<Self> {
        template.validate()?;
        let lod0 = &template.lod_levels()[0];
        let layout = PayloadLayout::compute(lod0, template.modules(), config.max_particle_stride)?;

        let hint = if template.initial_allocation_count > 0 {
            template.initial_allocation_count
        } else {
            template.peak_active_particles()
        };
        let initial = if hint > 0 {
            hint.min(config.initial_allocation_cap)
        } else {
            config.fallback_initial_allocation
        }
        .min(config.max_particles_per_emitter);

        let mut buffer = ParticleBuffer::new(layout.stride(), config.max_particles_per_emitter)?;
        buffer.resize(initial)?;

        let seed = config.seed ^ (emitter_index as u64).wrapping_mul(SEED_STRIDE);
        let mut rng = ParticleRng::seed_from_u64(seed);

        let mut durations = Vec::with_capacity(template.lod_count());
        let mut delays = Vec::with_capacity(template.lod_count());
        let mut burst_fired = Vec::with_capacity(template.lod_count());
        for level in template.lod_levels() {
            let (duration, delay) = template
                .required(level)
                .map_or((0.0, 0.0), |required| (required.roll_duration(&mut rng), required.roll_delay(&mut rng)));
            durations.push(duration + delay);
            delays.push(delay);
            burst_fired.push(vec![false; template.spawn(level).map_or(0, |s| s.burst_list.len())]);
        }

        let (kill_on_deactivate, kill_on_completed) = template
            .required(lod0)
            .map_or((false, false), |r| (r.kill_on_deactivate, r.kill_on_completed));

        let sub_uv_offset = lod0
            .modules()
            .iter()
            .position(|&handle| template.module(handle).is_some_and(|m| matches!(m.kind, ModuleKind::SubUv(_))))
            .map(|index| layout.module_offset(index));

        tracing::info!(
            "Emitter instance '{}' #{} initialized: stride {} bytes, {} particles",
            template.name(),
            emitter_index,
            layout.stride(),
            initial
        );

        Ok(Self {
            instance_data: vec![0; layout.instance_size()],
            source_emitters: vec![Vec::new(); template.lod_count()],
            template,
            emitter_index,
            layout,
            buffer,
            rng,
            current_lod: 0,
            location: Vec3::ZERO,
            target_location: Vec3::ZERO,
            old_location: Vec3::ZERO,
            owner_velocity: Vec3::ZERO,
            seconds_since_creation: 0.0,
            emitter_time: 0.0,
            spawn_fraction: 0.0,
            loop_count: 0,
            durations,
            delays,
            burst_fired,
            kill_on_deactivate,
            kill_on_completed,
            deactivated: false,
            deactivate_pending: false,
            bounds: Aabb::empty(),
            events: EventQueue::default(),
            pending_events: EventQueue::default(),
            forced_batches: Vec::new(),
            event_batches: Vec::new(),
            sub_uv_offset,
            peak_active_update_delta: config.peak_active_update_delta,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The template this instance runs.
    #[must_use]
    pub fn template(&self) -> &Arc<EmitterTemplate> {
        &self.template
    }

    /// Position of this emitter in its system.
    #[must_use]
    pub const fn emitter_index(&self) -> usize {
        self.emitter_index
    }

    /// The particle buffer.
    #[must_use]
    pub const fn particles(&self) -> &ParticleBuffer {
        &self.buffer
    }

    /// Number of live particles.
    #[must_use]
    pub const fn active_particles(&self) -> usize {
        self.buffer.active_count()
    }

    /// The payload layout fixed at construction.
    #[must_use]
    pub const fn layout(&self) -> &PayloadLayout {
        &self.layout
    }

    /// Bounds of the surviving particles after the last tick.
    #[must_use]
    pub const fn bounding_box(&self) -> &Aabb {
        &self.bounds
    }

    /// Events recorded during the last tick.
    #[must_use]
    pub const fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Seconds since creation or the last rewind.
    #[must_use]
    pub const fn seconds_since_creation(&self) -> f32 {
        self.seconds_since_creation
    }

    /// Time within the current loop, delay subtracted.
    #[must_use]
    pub const fn emitter_time(&self) -> f32 {
        self.emitter_time
    }

    /// Completed loops.
    #[must_use]
    pub const fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Fractional particle carried to the next tick.
    #[must_use]
    pub const fn spawn_fraction(&self) -> f32 {
        self.spawn_fraction
    }

    /// Current emitter location.
    #[must_use]
    pub const fn location(&self) -> Vec3 {
        self.location
    }

    /// Moves the emitter; applied at the start of the next tick so spawns
    /// interpolate along the path.
    pub fn set_location(&mut self, location: Vec3) {
        self.target_location = location;
    }

    /// Places the emitter without interpolation.
    pub fn teleport(&mut self, location: Vec3) {
        self.location = location;
        self.old_location = location;
        self.target_location = location;
    }

    /// Velocity of the owning system, read by inherit-parent modules.
    pub fn set_owner_velocity(&mut self, velocity: Vec3) {
        self.owner_velocity = velocity;
    }

    /// Whether deactivation has been applied.
    #[must_use]
    pub const fn is_deactivated(&self) -> bool {
        self.deactivated
    }

    /// Sub-image index of the particle in `slot`, 0 without a sub-UV module.
    #[must_use]
    pub fn sub_image(&self, slot: usize) -> f32 {
        self.sub_uv_offset.map_or(0.0, |offset| {
            let state: SubUvPayload = read_payload(self.buffer.record(slot).1, offset);
            state.image_index
        })
    }

    // =========================================================================
    // LOD
    // =========================================================================

    /// Current LOD ordinal.
    #[must_use]
    pub const fn lod(&self) -> usize {
        self.current_lod
    }

    /// Switches LOD; an out-of-range index is clamped to the lowest level.
    pub fn set_lod(&mut self, lod: usize) {
        let clamped = lod.min(self.template.lod_count().saturating_sub(1));
        if clamped != lod {
            tracing::debug!(
                "Emitter '{}' LOD {} out of range, clamped to {}",
                self.template.name(),
                lod,
                clamped
            );
        }
        if clamped == self.current_lod {
            return;
        }
        tracing::debug!("Emitter '{}' LOD {} -> {}", self.template.name(), self.current_lod, clamped);
        self.current_lod = clamped;

        // Bursts the new level already passed this loop must not fire late
        let template = Arc::clone(&self.template);
        let Some(level) = template.lod_level(clamped) else {
            return;
        };
        if let (Some(spawn), Some(fired)) = (template.spawn(level), self.burst_fired.get_mut(clamped)) {
            for (entry, fired) in spawn.burst_list.iter().zip(fired.iter_mut()) {
                *fired = entry.time < self.emitter_time;
            }
        }
        if let Some(required) = template.required(level) {
            self.kill_on_deactivate = required.kill_on_deactivate;
            self.kill_on_completed = required.kill_on_completed;
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Caches sibling indices for every module that names a source emitter.
    ///
    /// `names[i]` is the template name of system emitter `i`. Call again
    /// whenever the system's emitter list changes.
    pub fn resolve_references(&mut self, names: &[&str]) {
        let template = Arc::clone(&self.template);
        let own = self.emitter_index;
        for (lod, level) in template.lod_levels().iter().enumerate() {
            self.source_emitters[lod] = level
                .modules()
                .iter()
                .map(|&handle| {
                    let name = template.module(handle)?.kind.source_emitter_name()?;
                    let found = names
                        .iter()
                        .enumerate()
                        .position(|(index, candidate)| index != own && *candidate == name);
                    if found.is_none() {
                        tracing::debug!("Emitter '{}' source '{}' not found", template.name(), name);
                    }
                    found
                })
                .collect();
        }
    }

    /// Requests deactivation; applied at the start of the next tick.
    pub fn deactivate(&mut self) {
        self.deactivate_pending = true;
    }

    /// Clears a deactivation so the emitter spawns again.
    pub fn activate(&mut self) {
        self.deactivate_pending = false;
        self.deactivated = false;
    }

    /// Removes every particle without reporting deaths.
    pub fn reset_particles(&mut self) {
        self.buffer.kill_all();
        self.spawn_fraction = 0.0;
        self.bounds.init();
        self.events.clear();
        self.pending_events.clear();
    }

    /// Restarts emitter time and burst state, keeping live particles.
    pub fn rewind(&mut self) {
        self.seconds_since_creation = 0.0;
        self.emitter_time = 0.0;
        self.spawn_fraction = 0.0;
        self.loop_count = 0;
        for fired in &mut self.burst_fired {
            fired.fill(false);
        }
        self.roll_durations();
    }

    /// Kills every particle now, reporting deaths.
    pub fn kill_particles_forced(&mut self) {
        self.with_pending_recorder(|buffer, recorder| {
            for slot in (0..buffer.active_count()).rev() {
                recorder.particle_killed(buffer.particle(slot));
            }
            buffer.kill_all();
        });
    }

    /// Kills the particle in `slot`, reporting its death.
    ///
    /// # Returns
    ///
    /// False if `slot` is not active.
    pub fn kill_particle(&mut self, slot: usize) -> bool {
        if slot >= self.buffer.active_count() {
            return false;
        }
        self.with_pending_recorder(|buffer, recorder| {
            recorder.particle_killed(buffer.particle(slot));
            buffer.kill_at(slot)
        })
    }

    /// Records a collision reported by the physics collaborator.
    ///
    /// # Returns
    ///
    /// False if `slot` is not active.
    pub fn report_collision(&mut self, slot: usize, normal: Vec3) -> bool {
        if slot >= self.buffer.active_count() {
            return false;
        }
        self.with_pending_recorder(|buffer, recorder| {
            recorder.particle_collided(buffer.particle(slot), normal);
            buffer.particle_mut(slot).flags |= flags::COLLISION_OCCURRED;
        });
        true
    }

    /// Replaces rate and burst spawning with `batch` for the next tick.
    ///
    /// One particle spawns per position.
    pub fn force_spawn(&mut self, batch: ForcedSpawnBatch) {
        self.forced_batches.push(batch);
    }

    /// Feeds sibling events to this emitter's receiver modules.
    ///
    /// Events from this emitter itself are ignored.
    ///
    /// # Returns
    ///
    /// Number of spawn batches queued for the next tick.
    pub fn receive_events<'e>(&mut self, events: impl IntoIterator<Item = &'e ParticleEvent>) -> usize {
        let template = Arc::clone(&self.template);
        let Some(level) = template.lod_level(self.current_lod) else {
            return 0;
        };
        let receivers: Vec<_> = level
            .event_receivers()
            .iter()
            .filter_map(|&index| template.module(level.modules()[index]))
            .filter(|module| module.enabled)
            .filter_map(|module| module.kind.as_event_receiver())
            .collect();
        if receivers.is_empty() {
            return 0;
        }

        let before = self.event_batches.len();
        for event in events {
            if event.emitter_index == self.emitter_index {
                continue;
            }
            for receiver in &receivers {
                if let Some(batch) = receiver.receive(event, self.location, &mut self.rng) {
                    self.event_batches.push(batch);
                }
            }
        }
        self.event_batches.len() - before
    }

    /// Whether the emitter is done.
    ///
    /// A deactivated emitter is done once it has no particles. Otherwise it
    /// is done when its loops are exhausted and no particles remain.
    #[must_use]
    pub fn has_completed(&self) -> bool {
        let active = self.buffer.active_count();
        if self.deactivated {
            return active == 0;
        }
        let Some(required) = self
            .template
            .lod_level(self.current_lod)
            .and_then(|level| self.template.required(level))
        else {
            return true;
        };
        if required.emitter_loops == 0 || !self.loops_exhausted(required) {
            return false;
        }
        active == 0
    }

    fn loops_exhausted(&self, required: &RequiredModule) -> bool {
        let duration = self.durations.get(self.current_lod).copied().unwrap_or(0.0);
        #[allow(clippy::cast_precision_loss)]
        let total = duration * required.emitter_loops as f32;
        self.seconds_since_creation >= total
    }

    fn roll_durations(&mut self) {
        let template = Arc::clone(&self.template);
        for (lod, level) in template.lod_levels().iter().enumerate() {
            let Some(required) = template.required(level) else {
                continue;
            };
            let duration = required.roll_duration(&mut self.rng);
            let delay = if required.delay_first_loop_only && self.loop_count > 0 {
                0.0
            } else {
                self.delays[lod]
            };
            self.durations[lod] = duration + delay;
        }
    }

    fn event_generator<'t>(&self, template: &'t EmitterTemplate) -> (Option<&'t EventGeneratorModule>, usize) {
        let Some(level) = template.lod_level(self.current_lod) else {
            return (None, 0);
        };
        level.event_generator().map_or((None, 0), |index| {
            let generator = template
                .module(level.modules()[index])
                .filter(|module| module.enabled)
                .and_then(|module| module.kind.as_event_generator());
            (generator, self.layout.module_instance_offset(index))
        })
    }

    /// Runs `f` with a recorder that queues into the pending events.
    fn with_pending_recorder<R>(&mut self, f: impl FnOnce(&mut ParticleBuffer, &mut EventRecorder<'_>) -> R) -> R {
        let template = Arc::clone(&self.template);
        let (generator, offset) = self.event_generator(&template);
        let counters: EventCounters = read_payload(&self.instance_data, offset);
        let mut recorder = EventRecorder::new(
            generator,
            counters,
            &mut self.pending_events,
            self.emitter_index,
            self.emitter_time,
        );
        let result = f(&mut self.buffer, &mut recorder);
        let counters = recorder.counters();
        if generator.is_some() {
            write_payload(&mut self.instance_data, offset, &counters);
        }
        result
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advances the emitter by `delta_time` seconds.
    ///
    /// # Arguments
    ///
    /// * `delta_time` - Frame time in seconds
    /// * `suppress_spawning` - Tick existing particles without spawning
    /// * `siblings` - The other emitters of the owning system
    pub fn tick(&mut self, delta_time: f32, suppress_spawning: bool, siblings: SiblingEmitters<'_>) {
        let template = Arc::clone(&self.template);
        let Some(level) = template.lod_level(self.current_lod) else {
            return;
        };
        let (Some(required), Some(spawn)) = (template.required(level), template.spawn(level)) else {
            return;
        };

        let mut events = std::mem::take(&mut self.pending_events);
        let (generator, counters_offset) = self.event_generator(&template);
        let counters: EventCounters = read_payload(&self.instance_data, counters_offset);

        // 1. Time
        self.old_location = self.location;
        self.location = self.target_location;
        self.advance_time(delta_time, required);

        let mut recorder = EventRecorder::new(
            generator,
            counters,
            &mut events,
            self.emitter_index,
            self.emitter_time,
        );

        if self.deactivate_pending {
            self.deactivate_pending = false;
            self.deactivated = true;
            if self.kill_on_deactivate {
                for slot in (0..self.buffer.active_count()).rev() {
                    recorder.particle_killed(self.buffer.particle(slot));
                }
                self.buffer.kill_all();
            }
            tracing::debug!("Emitter '{}' deactivated", template.name());
        }

        // 2. Spawn
        let requests = self.collect_spawn_requests(delta_time, suppress_spawning, level, required, spawn);
        for request in requests {
            self.spawn_particles(&template, level, required, request, delta_time, siblings, &mut recorder);
        }

        // 3. Update
        self.update_particles(&template, level, required, delta_time, siblings, &mut recorder);

        // 4. Integrate
        self.integrate(delta_time);

        // 5. Kill
        for slot in (0..self.buffer.active_count()).rev() {
            if self.buffer.particle(slot).relative_time > 1.0 {
                recorder.particle_killed(self.buffer.particle(slot));
                self.buffer.kill_at(slot);
            }
        }

        if self.kill_on_completed && required.emitter_loops > 0 && self.loops_exhausted(required) {
            for slot in (0..self.buffer.active_count()).rev() {
                recorder.particle_killed(self.buffer.particle(slot));
            }
            self.buffer.kill_all();
        }

        // 6. Bounds
        self.bounds.init();
        for slot in 0..self.buffer.active_count() {
            let particle = self.buffer.particle(slot);
            self.bounds.add_point(particle.location, particle.size.abs_max());
        }

        let counters = recorder.counters();
        if generator.is_some() {
            write_payload(&mut self.instance_data, counters_offset, &counters);
        }
        self.events = events;
    }

    /// Advances emitter time and handles looping; the delay shifts emitter
    /// time below zero until it has passed.
    fn advance_time(&mut self, delta_time: f32, required: &RequiredModule) {
        self.seconds_since_creation += delta_time;
        let lod = self.current_lod;
        let duration = self.durations[lod];

        let mut looped = false;
        self.emitter_time = self.seconds_since_creation;
        if duration > KINDA_SMALL_NUMBER {
            self.emitter_time = self.seconds_since_creation % duration;
            #[allow(clippy::cast_precision_loss)]
            let elapsed = self.seconds_since_creation - duration * self.loop_count as f32;
            looped = elapsed >= duration;
        }

        if looped {
            self.loop_count += 1;
            for fired in &mut self.burst_fired {
                fired.fill(false);
            }
            if required.duration_recalc_each_loop || (required.delay_first_loop_only && self.loop_count == 1) {
                self.roll_durations();
            }
        }

        let delay = if required.delay_first_loop_only && self.loop_count > 0 {
            0.0
        } else {
            self.delays[lod]
        };
        self.emitter_time -= delay;
    }

    /// Decides what this tick spawns.
    fn collect_spawn_requests(
        &mut self,
        delta_time: f32,
        suppress_spawning: bool,
        level: &LodLevel,
        required: &RequiredModule,
        spawn: &SpawnModule,
    ) -> Vec<SpawnRequest> {
        let mut requests = Vec::new();
        let forced = std::mem::take(&mut self.forced_batches);
        let from_events = std::mem::take(&mut self.event_batches);
        if suppress_spawning || self.deactivated || !level.is_enabled() {
            return requests;
        }

        if forced.is_empty() {
            let within_loops = required.emitter_loops == 0
                || self.loop_count < required.emitter_loops
                || !self.loops_exhausted(required);
            if self.emitter_time >= 0.0 && within_loops {
                let rate = spawn.spawn_rate(self.emitter_time, &mut self.rng);
                let burst = self.process_bursts(spawn);

                let old = self.spawn_fraction;
                let leftover = old + delta_time * rate;
                let whole = leftover.floor().max(0.0);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let number = whole as usize;
                let increment = if rate > 0.0 { 1.0 / rate } else { 0.0 };
                let start_time = delta_time + old * increment - increment;
                self.spawn_fraction = leftover - whole;

                requests.push(SpawnRequest {
                    count: number,
                    start_time,
                    increment,
                    origin: SpawnOrigin::Emitter,
                });
                requests.push(SpawnRequest {
                    count: burst,
                    start_time: 0.0,
                    increment: 0.0,
                    origin: SpawnOrigin::Emitter,
                });
            }
        } else {
            requests.extend(forced.into_iter().map(|batch| SpawnRequest {
                count: batch.positions.len(),
                start_time: 0.0,
                increment: 0.0,
                origin: SpawnOrigin::PerParticle {
                    positions: batch.positions,
                    velocities: batch.velocities,
                },
            }));
        }
        requests.extend(from_events.into_iter().map(|batch: SpawnBatch| SpawnRequest {
            count: batch.count as usize,
            start_time: 0.0,
            increment: 0.0,
            origin: SpawnOrigin::Point {
                location: batch.location,
                velocity: batch.velocity,
            },
        }));
        requests.retain(|request| request.count > 0);
        requests
    }

    /// Fires due bursts of the current LOD at most once per loop.
    fn process_bursts(&mut self, spawn: &SpawnModule) -> usize {
        if !spawn.process_burst_list {
            return 0;
        }
        let Some(fired) = self.burst_fired.get_mut(self.current_lod) else {
            return 0;
        };
        let mut total = 0;
        for (entry, fired) in spawn.burst_list.iter().zip(fired.iter_mut()) {
            if !*fired && self.emitter_time >= entry.time {
                total += usize::try_from(entry.roll_count(&mut self.rng).max(0)).unwrap_or(0);
                *fired = true;
            }
        }
        total
    }

    /// Grows the buffer for `needed` live particles.
    ///
    /// # Returns
    ///
    /// How many of the requested particles fit.
    fn ensure_capacity(&mut self, count: usize, delta_time: f32) -> usize {
        let active = self.buffer.active_count();
        let needed = active + count;
        if needed <= self.buffer.capacity() {
            return count;
        }

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let grown = (needed as f32 + (needed as f32).sqrt() + 1.0).ceil() as usize;
        let target = grown.min(self.buffer.max_capacity());
        match self.buffer.resize(target) {
            Ok(_) => tracing::debug!(
                "Emitter '{}' resized to {} particles",
                self.template.name(),
                self.buffer.capacity()
            ),
            Err(err) => tracing::warn!("Emitter '{}' resize refused: {}", self.template.name(), err),
        }
        if needed > self.buffer.capacity() {
            tracing::warn!(
                "Emitter '{}' at capacity {}, dropping {} particles",
                self.template.name(),
                self.buffer.capacity(),
                needed - self.buffer.capacity()
            );
        }
        if delta_time < self.peak_active_update_delta {
            self.template.record_peak_active(needed);
        }
        self.buffer.capacity().saturating_sub(active).min(count)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_particles(
        &mut self,
        template: &EmitterTemplate,
        level: &LodLevel,
        required: &RequiredModule,
        request: SpawnRequest,
        delta_time: f32,
        siblings: SiblingEmitters<'_>,
        recorder: &mut EventRecorder<'_>,
    ) {
        let count = self.ensure_capacity(request.count, delta_time);
        if count == 0 {
            return;
        }

        let frame = self.frame();
        let local = required.use_local_space;
        let type_data = level
            .type_data()
            .and_then(|handle| template.module(handle))
            .and_then(|module| module.kind.as_type_data());
        let sources = self.source_emitters.get(self.current_lod);

        for i in 0..count {
            let Some(slot) = self.buffer.spawn_slot() else {
                break;
            };
            let record_index = self.buffer.record_index(slot);
            #[allow(clippy::cast_precision_loss)]
            let spawn_time = request.start_time - i as f32 * request.increment;
            let (particle, payload) = self.buffer.record_mut(slot);

            // PreSpawn
            let start = request.origin.start(i);
            let emitter_origin = if local { Vec3::ZERO } else { self.location };
            let (location, velocity) = start.unwrap_or((emitter_origin, Vec3::ZERO));
            particle.location = location;
            particle.old_location = particle.location;
            particle.velocity = velocity;
            particle.base_velocity = velocity;
            particle.color = LinearColor::WHITE;
            particle.base_color = LinearColor::WHITE;

            let mut ctx = SpawnContext {
                rng: &mut self.rng,
                frame,
                required,
                siblings,
                instance_data: &mut self.instance_data,
                instance_offset: 0,
                source_emitter: None,
                record_index,
            };

            if let Some(type_data) = type_data {
                ctx.instance_offset = self.layout.type_data_instance_offset();
                type_data.spawn(&mut ctx, particle, payload, self.layout.type_data_offset());
            }
            for &index in level.spawn_modules() {
                let Some(module) = template.module(level.modules()[index]) else {
                    continue;
                };
                if !module.enabled {
                    continue;
                }
                ctx.instance_offset = self.layout.module_instance_offset(index);
                ctx.source_emitter = sources.and_then(|s| s.get(index).copied().flatten());
                module
                    .kind
                    .spawn(&mut ctx, particle, payload, self.layout.module_offset(index), spawn_time);
            }

            // PostSpawn
            #[allow(clippy::cast_precision_loss)]
            let interpolation = 1.0 - (i + 1) as f32 / count as f32;
            let travelled = self.old_location - self.location;
            if !local && start.is_none() && travelled.length_squared() > 1.0 {
                particle.location += travelled * interpolation;
            }
            particle.old_location = particle.location;
            particle.location += particle.velocity * spawn_time;

            recorder.particle_spawned(particle);
        }
    }

    fn update_particles(
        &mut self,
        template: &EmitterTemplate,
        level: &LodLevel,
        required: &RequiredModule,
        delta_time: f32,
        siblings: SiblingEmitters<'_>,
        recorder: &mut EventRecorder<'_>,
    ) {
        for slot in 0..self.buffer.active_count() {
            let particle = self.buffer.particle_mut(slot);
            particle.reset_to_base();
            particle.relative_time += particle.one_over_max_lifetime * delta_time;
        }

        let frame = self.frame();
        let type_data = level
            .type_data()
            .and_then(|handle| template.module(handle))
            .and_then(|module| module.kind.as_type_data());
        let sources = self.source_emitters.get(self.current_lod);

        let mut ctx = UpdateContext {
            rng: &mut self.rng,
            frame,
            required,
            siblings,
            instance_data: &mut self.instance_data,
            instance_offset: 0,
            source_emitter: None,
            events: recorder,
        };

        if let Some(type_data) = type_data {
            ctx.instance_offset = self.layout.type_data_instance_offset();
            type_data.pre_update(&mut ctx, &mut self.buffer, self.layout.type_data_offset());
        }
        for &index in level.update_modules() {
            let Some(module) = template.module(level.modules()[index]) else {
                continue;
            };
            if !module.enabled {
                continue;
            }
            ctx.instance_offset = self.layout.module_instance_offset(index);
            ctx.source_emitter = sources.and_then(|s| s.get(index).copied().flatten());
            module
                .kind
                .update(&mut ctx, &mut self.buffer, self.layout.module_offset(index), delta_time);
        }
        if let Some(type_data) = type_data {
            ctx.instance_offset = self.layout.type_data_instance_offset();
            ctx.source_emitter = None;
            type_data.update(&mut self.buffer, self.layout.type_data_offset(), delta_time);
            type_data.post_update(&ctx, &mut self.buffer);
        }
    }

    fn integrate(&mut self, delta_time: f32) {
        for slot in 0..self.buffer.active_count() {
            let particle = self.buffer.particle_mut(slot);
            if particle.is_frozen() {
                continue;
            }
            particle.old_location = particle.location;
            if particle.flags & flags::FREEZE_TRANSLATION == 0 {
                particle.location += particle.velocity * delta_time;
            }
            if particle.flags & flags::FREEZE_ROTATION == 0 {
                particle.rotation = (particle.rotation + delta_time * particle.rotation_rate) % TWO_PI;
            }
        }
    }

    fn frame(&self) -> EmitterFrame {
        EmitterFrame {
            emitter_time: self.emitter_time,
            location: self.location,
            old_location: self.old_location,
            owner_velocity: self.owner_velocity,
        }
    }
}
