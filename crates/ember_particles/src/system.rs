//! # Particle System
//!
//! A [`ParticleSystem`] groups the emitter templates of one visual effect
//! with its LOD distance table. A [`ParticleSystemComponent`] is one live
//! placement of it: it owns an [`EmitterInstance`] per template and drives
//! them once per frame.
//!
//! ```text
//! tick(dt):
//!   resolve LOD ─> tick emitters (each sees the others) ─> route events
//!                ─> forward events to channel ─> pack + publish snapshot
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ember_core::{DoubleBuffer, Vec3};

use crate::config::EngineConfig;
use crate::error::{ParticleError, ParticleResult};
use crate::events::{event_channel, EventReceiver, EventSender, ParticleEvent};
use crate::instance::EmitterInstance;
use crate::module::{ForcedSpawnBatch, SiblingEmitters};
use crate::render::SystemRenderSnapshot;
use crate::template::EmitterTemplate;

/// Distance between LOD levels in the default table.
pub const DEFAULT_LOD_STEP: f32 = 2500.0;

/// How a component picks its LOD.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LodMethod {
    /// Re-resolve from distance every tick.
    #[default]
    Automatic,
    /// Only [`ParticleSystemComponent::set_lod_level`] changes the LOD.
    DirectSet,
    /// Resolve from distance once, on activation.
    ActivateAutomatic,
}

/// Supplies the viewer distance used to pick a LOD.
pub trait LodDistanceProvider {
    /// Distance from the viewer to `system_location`.
    fn distance(&self, system_location: Vec3) -> f32;
}

/// A viewer position.
impl LodDistanceProvider for Vec3 {
    fn distance(&self, system_location: Vec3) -> f32 {
        Vec3::distance(*self, system_location)
    }
}

/// Emitter templates of one effect plus its LOD table.
#[derive(Debug)]
pub struct ParticleSystem {
    name: String,
    emitters: Vec<Arc<EmitterTemplate>>,
    lod_distances: Vec<f32>,
    /// LOD selection method for new components.
    pub lod_method: LodMethod,
}

impl ParticleSystem {
    /// Builds a system with an evenly spaced LOD table.
    ///
    /// # Errors
    ///
    /// The first template that fails [`EmitterTemplate::validate`].
    pub fn new(name: impl Into<String>, emitters: Vec<EmitterTemplate>) -> ParticleResult<Self> {
        let lod_count = emitters.iter().map(EmitterTemplate::lod_count).max().unwrap_or(1);
        #[allow(clippy::cast_precision_loss)]
        let lod_distances = (0..lod_count).map(|level| level as f32 * DEFAULT_LOD_STEP).collect();
        let system = Self {
            name: name.into(),
            emitters: emitters.into_iter().map(Arc::new).collect(),
            lod_distances,
            lod_method: LodMethod::default(),
        };
        system.validate()?;
        tracing::info!(
            "Particle system '{}' built: {} emitters, {} LOD levels",
            system.name,
            system.emitters.len(),
            system.lod_distances.len()
        );
        Ok(system)
    }

    /// Replaces the LOD distance table.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvalidLodDistances`] unless the table starts at 0
    /// and strictly increases.
    pub fn with_lod_distances(mut self, distances: Vec<f32>) -> ParticleResult<Self> {
        check_lod_distances(&distances)?;
        self.lod_distances = distances;
        Ok(self)
    }

    /// System name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The emitter templates.
    #[must_use]
    pub fn emitters(&self) -> &[Arc<EmitterTemplate>] {
        &self.emitters
    }

    /// Number of entries in the LOD table.
    #[must_use]
    pub fn lod_count(&self) -> usize {
        self.lod_distances.len()
    }

    /// Distance at which `level` starts.
    #[must_use]
    pub fn lod_distance(&self, level: usize) -> Option<f32> {
        self.lod_distances.get(level).copied()
    }

    /// Moves the start distance of `level`.
    ///
    /// # Errors
    ///
    /// [`ParticleError::LodOutOfRange`] for an unknown level,
    /// [`ParticleError::InvalidLodDistances`] if the table would stop
    /// increasing. The table is unchanged on error.
    pub fn set_lod_distance(&mut self, level: usize, distance: f32) -> ParticleResult<()> {
        let count = self.lod_distances.len();
        let mut distances = self.lod_distances.clone();
        *distances
            .get_mut(level)
            .ok_or(ParticleError::LodOutOfRange { index: level, count })? = distance;
        check_lod_distances(&distances)?;
        self.lod_distances = distances;
        Ok(())
    }

    /// The highest-numbered level whose start distance is within `distance`.
    #[must_use]
    pub fn resolve_lod(&self, distance: f32) -> usize {
        self.lod_distances
            .iter()
            .rposition(|&start| distance >= start)
            .unwrap_or(0)
    }

    /// Validates every template and the LOD table.
    ///
    /// # Errors
    ///
    /// The first violation found.
    pub fn validate(&self) -> ParticleResult<()> {
        check_lod_distances(&self.lod_distances)?;
        for emitter in &self.emitters {
            emitter.validate()?;
        }
        Ok(())
    }
}

fn check_lod_distances(distances: &[f32]) -> ParticleResult<()> {
    match distances.first() {
        None => return Err(ParticleError::InvalidLodDistances("table is empty".into())),
        Some(&first) if first != 0.0 => {
            return Err(ParticleError::InvalidLodDistances(format!(
                "level 0 starts at {first}, expected 0"
            )));
        }
        Some(_) => {}
    }
    if let Some(index) = distances.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(ParticleError::InvalidLodDistances(format!(
            "level {} at {} does not follow {}",
            index + 1,
            distances[index + 1],
            distances[index]
        )));
    }
    Ok(())
}

/// One live placement of a [`ParticleSystem`].
pub struct ParticleSystemComponent {
    system: Arc<ParticleSystem>,
    config: EngineConfig,
    instances: Vec<EmitterInstance>,
    location: Vec3,
    last_location: Vec3,
    lod_method: LodMethod,
    lod_provider: Option<Box<dyn LodDistanceProvider + Send + Sync>>,
    current_lod: usize,
    active: bool,
    frame: u64,
    dropped_events: u64,
    events: Vec<ParticleEvent>,
    event_sender: Option<EventSender>,
    render: Arc<DoubleBuffer<SystemRenderSnapshot>>,
}

impl std::fmt::Debug for ParticleSystemComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleSystemComponent")
            .field("system", &self.system.name())
            .field("instances", &self.instances)
            .field("lod", &self.current_lod)
            .field("active", &self.active)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl ParticleSystemComponent {
    /// Creates an inactive component.
    #[must_use]
    pub fn new(system: Arc<ParticleSystem>, config: EngineConfig) -> Self {
        Self {
            lod_method: system.lod_method,
            system,
            config,
            instances: Vec::new(),
            location: Vec3::ZERO,
            last_location: Vec3::ZERO,
            lod_provider: None,
            current_lod: 0,
            active: false,
            frame: 0,
            dropped_events: 0,
            events: Vec::new(),
            event_sender: None,
            render: Arc::new(DoubleBuffer::default()),
        }
    }

    /// The system this component plays.
    #[must_use]
    pub fn system(&self) -> &Arc<ParticleSystem> {
        &self.system
    }

    /// Live emitter instances, in system order.
    #[must_use]
    pub fn instances(&self) -> &[EmitterInstance] {
        &self.instances
    }

    /// Whether the component is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Current LOD.
    #[must_use]
    pub const fn lod_level(&self) -> usize {
        self.current_lod
    }

    /// System ticks so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Events the external channel refused.
    #[must_use]
    pub const fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Events produced by the last tick.
    #[must_use]
    pub fn events(&self) -> &[ParticleEvent] {
        &self.events
    }

    /// The double buffer the renderer reads snapshots from.
    #[must_use]
    pub fn render_buffer(&self) -> Arc<DoubleBuffer<SystemRenderSnapshot>> {
        Arc::clone(&self.render)
    }

    /// Moves the component; emitters follow on the next tick.
    pub fn set_location(&mut self, location: Vec3) {
        self.location = location;
    }

    /// Installs the viewer-distance source for automatic LOD.
    pub fn set_lod_provider(&mut self, provider: impl LodDistanceProvider + Send + Sync + 'static) {
        self.lod_provider = Some(Box::new(provider));
    }

    /// Overrides the system's LOD method.
    pub fn set_lod_method(&mut self, method: LodMethod) {
        self.lod_method = method;
    }

    /// Opens a bounded channel that receives every event from now on.
    pub fn connect_events(&mut self) -> EventReceiver {
        let (sender, receiver) = event_channel(self.config.event_channel_capacity);
        self.event_sender = Some(sender);
        receiver
    }

    /// Creates the emitter instances, or restarts them if they exist.
    ///
    /// # Errors
    ///
    /// Instance construction errors (layout overflow, invalid template).
    pub fn activate(&mut self) -> ParticleResult<()> {
        if self.instances.is_empty() {
            self.instances = self
                .system
                .emitters()
                .iter()
                .enumerate()
                .map(|(index, template)| EmitterInstance::new(Arc::clone(template), &self.config, index))
                .collect::<ParticleResult<Vec<_>>>()?;
            self.resolve_references();
        } else {
            for instance in &mut self.instances {
                instance.activate();
                instance.rewind();
            }
        }

        for instance in &mut self.instances {
            instance.teleport(self.location);
        }
        self.last_location = self.location;
        if self.lod_method != LodMethod::DirectSet {
            let lod = self.resolve_lod();
            self.apply_lod(lod);
        }
        self.active = true;
        tracing::info!(
            "Particle system '{}' activated with {} emitters",
            self.system.name(),
            self.instances.len()
        );
        Ok(())
    }

    /// Stops spawning; kill-on-deactivate emitters clear on the next tick.
    pub fn deactivate(&mut self) {
        for instance in &mut self.instances {
            instance.deactivate();
        }
        self.active = false;
        tracing::info!("Particle system '{}' deactivated", self.system.name());
    }

    /// Destroys every instance.
    pub fn reset(&mut self) {
        self.instances.clear();
        self.events.clear();
        self.active = false;
        tracing::debug!("Particle system '{}' reset", self.system.name());
    }

    /// Re-resolves sibling references; call after the emitter list changes.
    pub fn resolve_references(&mut self) {
        let names: Vec<&str> = self.system.emitters().iter().map(|t| t.name()).collect();
        for instance in &mut self.instances {
            instance.resolve_references(&names);
        }
    }

    /// Forces a LOD and switches to [`LodMethod::DirectSet`].
    pub fn set_lod_level(&mut self, lod: usize) {
        self.lod_method = LodMethod::DirectSet;
        self.apply_lod(lod);
    }

    fn apply_lod(&mut self, lod: usize) {
        let clamped = lod.min(self.system.lod_count().saturating_sub(1));
        if clamped != self.current_lod {
            tracing::debug!("Particle system '{}' LOD {} -> {}", self.system.name(), self.current_lod, clamped);
        }
        self.current_lod = clamped;
        for instance in &mut self.instances {
            instance.set_lod(clamped);
        }
    }

    fn resolve_lod(&self) -> usize {
        self.lod_provider.as_ref().map_or(self.current_lod, |provider| {
            self.system.resolve_lod(provider.distance(self.location))
        })
    }

    /// Queues a physics or volume-fill batch that replaces normal spawning
    /// of one emitter on the next tick. Each position spawns one particle.
    ///
    /// # Errors
    ///
    /// [`ParticleError::EmitterOutOfRange`] for an unknown emitter.
    pub fn queue_spawn_batch(&mut self, emitter: usize, batch: ForcedSpawnBatch) -> ParticleResult<()> {
        let count = self.instances.len();
        let instance = self
            .instances
            .get_mut(emitter)
            .ok_or(ParticleError::EmitterOutOfRange { index: emitter, count })?;
        instance.force_spawn(batch);
        Ok(())
    }

    /// Kills every particle of every emitter now.
    pub fn kill_particles_forced(&mut self) {
        for instance in &mut self.instances {
            instance.kill_particles_forced();
        }
    }

    /// Whether every emitter has completed.
    #[must_use]
    pub fn has_completed(&self) -> bool {
        self.instances.iter().all(EmitterInstance::has_completed)
    }

    /// Advances every emitter and publishes a render snapshot.
    pub fn tick(&mut self, delta_time: f32) {
        if self.instances.is_empty() {
            return;
        }

        if self.lod_method == LodMethod::Automatic {
            let lod = self.resolve_lod();
            self.apply_lod(lod);
        }

        let velocity = if delta_time > 0.0 {
            (self.location - self.last_location) * (1.0 / delta_time)
        } else {
            Vec3::ZERO
        };
        self.last_location = self.location;

        for index in 0..self.instances.len() {
            let (before, rest) = self.instances.split_at_mut(index);
            let Some((instance, after)) = rest.split_first_mut() else {
                continue;
            };
            instance.set_location(self.location);
            instance.set_owner_velocity(velocity);
            instance.tick(delta_time, false, SiblingEmitters::new(before, after));
        }

        self.events.clear();
        for instance in &self.instances {
            self.events.extend(instance.events().iter().cloned());
        }
        for instance in &mut self.instances {
            instance.receive_events(&self.events);
        }
        if let Some(sender) = &self.event_sender {
            for event in &self.events {
                if !sender.try_send(event.clone()) {
                    self.dropped_events += 1;
                }
            }
        }

        self.frame += 1;
        let written = self.render.try_write().map(|mut back| {
            back.fill(self.frame, self.current_lod, &self.instances);
        });
        if written.is_some() {
            self.render.swap_buffers();
        } else {
            tracing::debug!("Particle system '{}' skipped snapshot {}", self.system.name(), self.frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{FloatDistribution, VectorDistribution};
    use crate::events::ParticleEventKind;
    use crate::module::{
        AttractorParticleModule, BurstEntry, EventGeneratorInfo, EventGeneratorModule, EventReceiverSpawnModule,
        LifetimeModule, LocationEmitterModule, LocationModule, ModuleKind, RequiredModule, SpawnModule,
    };

    fn burst_template(name: &str, count: i32) -> EmitterTemplate {
        let spawn = SpawnModule {
            burst_list: vec![BurstEntry::new(0.0, count)],
            ..SpawnModule::with_rate(0.0)
        };
        let mut template = EmitterTemplate::new(name, RequiredModule::default(), spawn);
        template
            .add_module(ModuleKind::Lifetime(LifetimeModule {
                lifetime: FloatDistribution::Constant(0.15),
            }))
            .unwrap();
        template
    }

    #[test]
    fn test_lod_table_validation() {
        assert!(check_lod_distances(&[]).is_err());
        assert!(check_lod_distances(&[5.0, 10.0]).is_err());
        assert!(check_lod_distances(&[0.0, 10.0, 10.0]).is_err());
        assert!(check_lod_distances(&[0.0, 10.0, 20.0]).is_ok());

        let system = ParticleSystem::new("fx", vec![burst_template("a", 1)]).unwrap();
        assert_eq!(system.lod_count(), 1);
        assert!(matches!(
            system.with_lod_distances(vec![1.0]),
            Err(ParticleError::InvalidLodDistances(_))
        ));
    }

    #[test]
    fn test_resolve_lod_from_distance() {
        let mut template = burst_template("a", 1);
        template.create_lod_level(1).unwrap();
        template.create_lod_level(2).unwrap();
        let mut system = ParticleSystem::new("fx", vec![template])
            .unwrap()
            .with_lod_distances(vec![0.0, 100.0, 400.0])
            .unwrap();
        assert_eq!(system.resolve_lod(50.0), 0);
        assert_eq!(system.resolve_lod(100.0), 1);
        assert_eq!(system.resolve_lod(1000.0), 2);

        assert!(system.set_lod_distance(1, 500.0).is_err());
        assert_eq!(system.lod_distance(1), Some(100.0));
        system.set_lod_distance(2, 300.0).unwrap();
        assert_eq!(system.resolve_lod(350.0), 2);
    }

    #[test]
    fn test_automatic_lod_follows_viewer() {
        let mut template = burst_template("a", 1);
        template.create_lod_level(1).unwrap();
        let system = ParticleSystem::new("fx", vec![template])
            .unwrap()
            .with_lod_distances(vec![0.0, 100.0])
            .unwrap();
        let mut component = ParticleSystemComponent::new(Arc::new(system), EngineConfig::default());
        component.set_lod_provider(Vec3::new(500.0, 0.0, 0.0));
        component.activate().unwrap();
        assert_eq!(component.lod_level(), 1);
        assert_eq!(component.instances()[0].lod(), 1);

        component.set_lod_level(0);
        component.tick(0.016);
        assert_eq!(component.instances()[0].lod(), 0);
    }

    #[test]
    fn test_tick_publishes_snapshot() {
        let system = ParticleSystem::new("fx", vec![burst_template("a", 4), burst_template("b", 2)]).unwrap();
        let mut component = ParticleSystemComponent::new(Arc::new(system), EngineConfig::default());
        let render = component.render_buffer();
        component.activate().unwrap();
        component.tick(0.016);

        let snapshot = render.read();
        assert_eq!(snapshot.frame, 1);
        assert_eq!(snapshot.emitters.len(), 2);
        assert_eq!(snapshot.particle_count(), 6);
    }

    #[test]
    fn test_death_events_spawn_on_receiver() {
        let mut source = burst_template("sparks", 3);
        source
            .add_module(ModuleKind::EventGenerator(EventGeneratorModule {
                events: vec![EventGeneratorInfo {
                    kind: ParticleEventKind::Death,
                    frequency: 0,
                    first_time_only: false,
                    name: "pop".into(),
                }],
            }))
            .unwrap();

        let mut smoke = EmitterTemplate::new("smoke", RequiredModule::default(), SpawnModule::with_rate(0.0));
        smoke
            .add_module(ModuleKind::Lifetime(LifetimeModule {
                lifetime: FloatDistribution::Constant(10.0),
            }))
            .unwrap();
        smoke
            .add_module(ModuleKind::EventReceiverSpawn(EventReceiverSpawnModule {
                event_kind: ParticleEventKind::Death,
                event_name: "pop".into(),
                spawn_count: FloatDistribution::Constant(2.0),
                ..EventReceiverSpawnModule::default()
            }))
            .unwrap();

        let system = ParticleSystem::new("fx", vec![source, smoke]).unwrap();
        let mut component = ParticleSystemComponent::new(Arc::new(system), EngineConfig::default());
        let receiver = component.connect_events();
        component.activate().unwrap();

        // Sparks live 0.15 s
        for _ in 0..4 {
            component.tick(0.05);
        }
        assert_eq!(component.instances()[0].active_particles(), 0);
        component.tick(0.05);
        assert_eq!(component.instances()[1].active_particles(), 6);
        assert_eq!(receiver.drain().count(), 3);
    }

    #[test]
    fn test_stale_reader_skips_snapshot() {
        let system = ParticleSystem::new("fx", vec![burst_template("a", 2)]).unwrap();
        let mut component = ParticleSystemComponent::new(Arc::new(system), EngineConfig::default());
        let render = component.render_buffer();
        component.activate().unwrap();

        component.tick(0.016);
        let stale = render.read();
        assert_eq!(stale.frame, 1);
        component.tick(0.016);
        component.tick(0.016);
        assert_eq!(render.skipped_frames(), 1);
        drop(stale);

        component.tick(0.016);
        assert_eq!(render.read().frame, 4);
    }

    #[test]
    fn test_full_channel_counts_dropped_events() {
        let mut source = burst_template("sparks", 4);
        source
            .add_module(ModuleKind::EventGenerator(EventGeneratorModule {
                events: vec![EventGeneratorInfo {
                    kind: ParticleEventKind::Spawn,
                    frequency: 0,
                    first_time_only: false,
                    name: "birth".into(),
                }],
            }))
            .unwrap();
        let system = ParticleSystem::new("fx", vec![source]).unwrap();
        let config = EngineConfig {
            event_channel_capacity: 1,
            ..EngineConfig::default()
        };
        let mut component = ParticleSystemComponent::new(Arc::new(system), config);
        let receiver = component.connect_events();
        component.activate().unwrap();
        component.tick(0.016);

        assert_eq!(component.events().len(), 4);
        assert_eq!(component.dropped_events(), 3);
        assert_eq!(receiver.drain().count(), 1);
    }

    #[test]
    fn test_queue_spawn_batch_bounds() {
        let system = ParticleSystem::new("fx", vec![burst_template("a", 0)]).unwrap();
        let mut component = ParticleSystemComponent::new(Arc::new(system), EngineConfig::default());
        component.activate().unwrap();
        let batch = ForcedSpawnBatch {
            positions: vec![Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0)],
            velocities: None,
        };
        assert!(matches!(
            component.queue_spawn_batch(3, batch.clone()),
            Err(ParticleError::EmitterOutOfRange { index: 3, count: 1 })
        ));
        component.queue_spawn_batch(0, batch).unwrap();
        component.tick(0.016);
        assert_eq!(component.instances()[0].active_particles(), 2);
    }

    fn long_lived(name: &str, count: i32, extra: ModuleKind) -> EmitterTemplate {
        let spawn = SpawnModule {
            burst_list: vec![BurstEntry::new(0.0, count)],
            ..SpawnModule::with_rate(0.0)
        };
        let mut template = EmitterTemplate::new(name, RequiredModule::default(), spawn);
        template
            .add_module(ModuleKind::Lifetime(LifetimeModule {
                lifetime: FloatDistribution::Constant(10.0),
            }))
            .unwrap();
        template.add_module(extra).unwrap();
        template
    }

    fn offset_source(name: &str) -> EmitterTemplate {
        long_lived(
            name,
            1,
            ModuleKind::Location(LocationModule {
                start_location: VectorDistribution::Constant(Vec3::new(10.0, 0.0, 0.0)),
            }),
        )
    }

    /// Ticks a system of a source-like emitter and a follower.
    fn run_pair(first: EmitterTemplate, follower: EmitterTemplate, ticks: usize) -> ParticleSystemComponent {
        let system = ParticleSystem::new("fx", vec![first, follower]).unwrap();
        let mut component = ParticleSystemComponent::new(Arc::new(system), EngineConfig::default());
        component.activate().unwrap();
        for _ in 0..ticks {
            component.tick(0.05);
        }
        component
    }

    #[test]
    fn test_location_emitter_follows_named_sibling() {
        let follower = || {
            long_lived(
                "follower",
                3,
                ModuleKind::LocationEmitter(LocationEmitterModule {
                    emitter_name: "source".into(),
                    ..LocationEmitterModule::default()
                }),
            )
        };

        // Unknown name: spawning still happens, at the emitter
        let component = run_pair(offset_source("decoy"), follower(), 1);
        let spawned = component.instances()[1].particles();
        assert_eq!(spawned.active_count(), 3);
        assert!((0..3).all(|slot| spawned.particle(slot).location == Vec3::ZERO));

        let component = run_pair(offset_source("source"), follower(), 1);
        let spawned = component.instances()[1].particles();
        assert_eq!(spawned.active_count(), 3);
        assert!((0..3).all(|slot| spawned.particle(slot).location == Vec3::new(10.0, 0.0, 0.0)));
    }

    #[test]
    fn test_attractor_particle_pulls_toward_named_sibling() {
        let follower = || {
            long_lived(
                "follower",
                1,
                ModuleKind::AttractorParticle(AttractorParticleModule {
                    emitter_name: "source".into(),
                    strength_by_distance: false,
                    affect_base_velocity: true,
                    ..AttractorParticleModule::default()
                }),
            )
        };

        let component = run_pair(offset_source("decoy"), follower(), 3);
        let particle = component.instances()[1].particles().particle(0);
        assert_eq!(particle.location, Vec3::ZERO);
        assert_eq!(particle.velocity, Vec3::ZERO);

        let component = run_pair(offset_source("source"), follower(), 3);
        let particle = component.instances()[1].particles().particle(0);
        assert!(particle.velocity.x > 0.0);
        assert!(particle.location.x > 0.0);
        assert!(particle.location.y.abs() < 1e-4);
    }

    #[test]
    fn test_disabled_level_ignores_spawn_batches() {
        let mut template = burst_template("a", 2);
        template.create_lod_level(1).unwrap();
        template.set_lod_enabled(1, false).unwrap();
        let system = ParticleSystem::new("fx", vec![template]).unwrap();
        let mut component = ParticleSystemComponent::new(Arc::new(system), EngineConfig::default());
        component.activate().unwrap();
        component.set_lod_level(1);

        let batch = ForcedSpawnBatch {
            positions: vec![Vec3::ZERO; 4],
            velocities: None,
        };
        component.queue_spawn_batch(0, batch).unwrap();
        component.tick(0.016);
        assert_eq!(component.instances()[0].lod(), 1);
        assert_eq!(component.instances()[0].active_particles(), 0);
        assert_eq!(component.render_buffer().read().particle_count(), 0);
    }

    #[test]
    fn test_deactivate_completes_after_particles_die() {
        let system = ParticleSystem::new("fx", vec![burst_template("a", 5)]).unwrap();
        let mut component = ParticleSystemComponent::new(Arc::new(system), EngineConfig::default());
        component.activate().unwrap();
        component.tick(0.05);
        component.deactivate();
        assert!(!component.has_completed());
        for _ in 0..5 {
            component.tick(0.05);
        }
        assert!(component.has_completed());
    }
}
