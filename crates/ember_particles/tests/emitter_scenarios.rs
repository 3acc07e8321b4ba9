//! End-to-end emitter scenarios.

use std::sync::Arc;

use ember_particles::distribution::FloatDistribution;
use ember_particles::layout::ByteRequirement;
use ember_particles::module::{LifetimeModule, SiblingEmitters};
use ember_particles::{
    BurstEntry, EmitterInstance, EmitterTemplate, EngineConfig, LodMask, ModuleKind, ModuleSlot,
    ParticleSystem, ParticleSystemComponent, PayloadLayout, RequiredModule, SpawnModule,
};

fn lifetime(seconds: f32) -> ModuleKind {
    ModuleKind::Lifetime(LifetimeModule {
        lifetime: FloatDistribution::Constant(seconds),
    })
}

#[test]
fn test_steady_rate_over_one_second() {
    let mut template = EmitterTemplate::new("steady", RequiredModule::default(), SpawnModule::with_rate(10.0));
    template.add_module(lifetime(2.0)).unwrap();

    let mut emitter = EmitterInstance::new(Arc::new(template), &EngineConfig::default(), 0).unwrap();
    for _ in 0..20 {
        emitter.tick(0.05, false, SiblingEmitters::none());
    }

    let active = emitter.active_particles();
    assert!((9..=11).contains(&active), "expected about 10 particles, got {active}");
    for slot in 0..active {
        let particle = emitter.particles().particle(slot);
        assert!(particle.relative_time > 0.0 && particle.relative_time <= 0.5);
    }
}

#[test]
fn test_burst_grows_past_initial_allocation() {
    let spawn = SpawnModule {
        burst_list: vec![BurstEntry::new(0.0, 150)],
        ..SpawnModule::with_rate(0.0)
    };
    let mut template = EmitterTemplate::new("burst", RequiredModule::default(), spawn);
    template.add_module(lifetime(5.0)).unwrap();
    template.initial_allocation_count = 100;

    let config = EngineConfig {
        initial_allocation_cap: 100,
        ..EngineConfig::default()
    };
    let mut emitter = EmitterInstance::new(Arc::new(template), &config, 0).unwrap();
    assert_eq!(emitter.particles().capacity(), 100);

    emitter.tick(0.016, false, SiblingEmitters::none());
    assert!(emitter.particles().capacity() >= 150);
    assert_eq!(emitter.active_particles(), 150);
}

#[test]
fn test_deleting_level_keeps_shared_module_for_survivor() {
    let mut template = EmitterTemplate::new("lods", RequiredModule::default(), SpawnModule::with_rate(40.0));
    template.add_module(lifetime(1.0)).unwrap();
    template.create_lod_level(1).unwrap();
    template.create_lod_level(2).unwrap();

    // Level 0 diverges so only levels 1 and 2 can share their spawn module
    template.edit_module(0, ModuleSlot::Spawn).unwrap().kind = ModuleKind::Spawn(SpawnModule::with_rate(80.0));
    assert_eq!(template.share_identical_modules(), 5);
    template.flush_pending_releases();
    template.validate().unwrap();

    let shared_spawn = template.lod_levels()[1].spawn();
    assert_eq!(template.lod_levels()[2].spawn(), shared_spawn);
    let mut expected = LodMask::single(1);
    expected.set(2);
    assert_eq!(template.module(shared_spawn).unwrap().lod_validity, expected);
    let required = template.lod_levels()[0].required();

    template.delete_lod_level(1).unwrap();

    assert_eq!(template.lod_count(), 2);
    assert_eq!(template.lod_levels()[1].level(), 1);
    assert_eq!(template.lod_levels()[1].spawn(), shared_spawn);
    assert_eq!(template.module(shared_spawn).unwrap().lod_validity, LodMask::single(1));
    assert_eq!(template.module(required).unwrap().lod_validity, LodMask::all(2));
    assert!(template.pending_releases().is_empty());
    template.validate().unwrap();
}

#[test]
fn test_payload_ranges_follow_list_order() {
    let modules = [
        ByteRequirement {
            per_particle: 12,
            per_instance: 0,
        },
        ByteRequirement {
            per_particle: 4,
            per_instance: 8,
        },
    ];
    let layout = PayloadLayout::from_requirements(None, &modules, 65_535).unwrap();

    assert_eq!(layout.module_range(0), Some(0..12));
    assert_eq!(layout.module_range(1), Some(12..16));
    assert_eq!(layout.payload_size(), 16);
    assert_eq!(layout.stride(), 144);
    assert_eq!(layout.instance_size(), 8);
}

#[test]
fn test_component_runs_to_completion() {
    let required = RequiredModule {
        emitter_loops: 1,
        ..RequiredModule::default()
    };
    let spawn = SpawnModule {
        burst_list: vec![BurstEntry::new(0.0, 12)],
        ..SpawnModule::with_rate(0.0)
    };
    let mut template = EmitterTemplate::new("flash", required, spawn);
    template.add_module(lifetime(0.5)).unwrap();

    let system = Arc::new(ParticleSystem::new("flash", vec![template]).unwrap());
    let mut component = ParticleSystemComponent::new(system, EngineConfig::default());
    component.activate().unwrap();

    component.tick(0.1);
    assert_eq!(component.render_buffer().read().particle_count(), 12);

    let mut ticks = 1;
    while !component.has_completed() && ticks < 100 {
        component.tick(0.1);
        ticks += 1;
    }
    assert!(component.has_completed());
    assert!(ticks <= 12, "took {ticks} ticks");
    assert_eq!(component.render_buffer().read().particle_count(), 0);
}
