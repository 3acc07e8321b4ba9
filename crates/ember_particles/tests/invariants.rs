//! Randomized invariant checks.
//!
//! Each test drives the engine through seeded random operations and checks
//! an invariant after every step. Seeds are fixed so failures reproduce.

use std::collections::HashMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use ember_particles::distribution::FloatDistribution;
use ember_particles::layout::ByteRequirement;
use ember_particles::module::{LifetimeModule, SiblingEmitters, SizeModule};
use ember_particles::{
    BurstEntry, EmitterInstance, EmitterTemplate, EngineConfig, ModuleKind, ModuleSlot, PayloadLayout,
    RequiredModule, SpawnModule,
};

const SEEDS: [u64; 4] = [1, 7, 42, 0xDEAD_BEEF];

fn lifetime(distribution: FloatDistribution) -> ModuleKind {
    ModuleKind::Lifetime(LifetimeModule { lifetime: distribution })
}

fn emitter(spawn: SpawnModule, lifetime_seconds: FloatDistribution) -> EmitterInstance {
    let mut template = EmitterTemplate::new("invariant", RequiredModule::default(), spawn);
    template.add_module(lifetime(lifetime_seconds)).unwrap();
    EmitterInstance::new(Arc::new(template), &EngineConfig::default(), 0).unwrap()
}

fn assert_permutation(emitter: &EmitterInstance) {
    let buffer = emitter.particles();
    let mut indices = buffer.indices().to_vec();
    assert_eq!(indices.len(), buffer.capacity());
    indices.sort_unstable();
    for (expected, actual) in indices.into_iter().enumerate() {
        assert_eq!(actual as usize, expected);
    }
}

#[test]
fn test_indices_stay_a_permutation() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut emitter = emitter(
            SpawnModule::with_rate(120.0),
            FloatDistribution::Uniform { min: 0.1, max: 0.6 },
        );

        for _ in 0..200 {
            emitter.tick(rng.gen_range(0.005..0.05), false, SiblingEmitters::none());
            assert_permutation(&emitter);

            let active = emitter.active_particles();
            if active > 0 && rng.gen_bool(0.3) {
                assert!(emitter.kill_particle(rng.gen_range(0..active)));
                assert_eq!(emitter.active_particles(), active - 1);
                assert_permutation(&emitter);
            }
            assert!(!emitter.kill_particle(emitter.active_particles()));
        }
    }
}

#[test]
fn test_layout_ranges_never_overlap() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for _ in 0..50 {
            let type_data = rng.gen_bool(0.5).then(|| ByteRequirement {
                per_particle: rng.gen_range(0..64),
                per_instance: rng.gen_range(0..32),
            });
            let modules: Vec<ByteRequirement> = (0..rng.gen_range(0..12))
                .map(|_| ByteRequirement {
                    per_particle: rng.gen_range(0..4) * 4,
                    per_instance: rng.gen_range(0..16),
                })
                .collect();

            let layout = PayloadLayout::from_requirements(type_data, &modules, 65_535).unwrap();

            let mut cursor = 0;
            for range in layout.ranges() {
                assert_eq!(range.start, cursor);
                cursor = range.end;
            }
            assert_eq!(cursor, layout.payload_size());
            for (index, module) in modules.iter().enumerate() {
                assert_eq!(layout.module_range(index).map(|r| r.len()), Some(module.per_particle));
            }
            assert_eq!(layout.stride() % 16, 0);
            assert!(layout.stride() >= 128 + layout.payload_size());
            assert!(layout.stride() < 128 + layout.payload_size() + 16);
        }
    }
}

#[test]
fn test_relative_time_only_grows() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let spawn = SpawnModule {
            burst_list: vec![BurstEntry::new(0.0, 40)],
            ..SpawnModule::with_rate(0.0)
        };
        let mut emitter = emitter(spawn, FloatDistribution::Uniform { min: 0.2, max: 0.9 });

        let mut previous: HashMap<usize, f32> = HashMap::new();
        let mut elapsed = 0.0;
        while elapsed < 0.95 {
            let dt = rng.gen_range(0.01..0.04);
            elapsed += dt;
            emitter.tick(dt, false, SiblingEmitters::none());

            let mut current = HashMap::new();
            let buffer = emitter.particles();
            for slot in 0..buffer.active_count() {
                let relative_time = buffer.particle(slot).relative_time;
                assert!((0.0..=1.0).contains(&relative_time));
                let record = buffer.record_index(slot);
                if let Some(&before) = previous.get(&record) {
                    assert!(relative_time > before, "record {record} went from {before} to {relative_time}");
                }
                current.insert(record, relative_time);
            }
            previous = current;
        }
    }
}

#[test]
fn test_lod_masks_match_references() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut template =
            EmitterTemplate::new("masks", RequiredModule::default(), SpawnModule::with_rate(30.0));
        template.add_module(lifetime(FloatDistribution::Constant(1.0))).unwrap();
        template.add_module(ModuleKind::Size(SizeModule::default())).unwrap();

        for _ in 0..60 {
            let count = template.lod_count();
            match rng.gen_range(0..5) {
                0 if count < 6 => {
                    template.create_lod_level(rng.gen_range(0..=count)).unwrap();
                }
                1 if count > 1 => {
                    template.delete_lod_level(rng.gen_range(0..count)).unwrap();
                }
                2 => {
                    let slot = [ModuleSlot::Required, ModuleSlot::Spawn, ModuleSlot::Ordinary(1)]
                        [rng.gen_range(0..3)];
                    let lod = rng.gen_range(0..count);
                    let handle = template.promote_module(lod, slot).unwrap();
                    assert_eq!(template.lod_levels()[lod].module_at(slot), Some(handle));
                }
                3 => {
                    template.share_identical_modules();
                }
                _ => {
                    template.flush_pending_releases();
                }
            }
            template.validate().unwrap();
            assert_eq!(template.fixup_module_lod_errors(), 0);
        }
    }
}

#[test]
fn test_bursts_fire_once_per_loop() {
    let spawn = SpawnModule {
        burst_list: vec![BurstEntry::new(0.5, 4)],
        ..SpawnModule::with_rate(0.0)
    };
    let mut emitter = emitter(spawn, FloatDistribution::Constant(100.0));

    let mut counts = Vec::new();
    for _ in 0..80 {
        emitter.tick(0.02, false, SiblingEmitters::none());
        counts.push(emitter.active_particles());
    }

    // Ticks 25..=70 cover emitter time 0.5 of loop one up to 0.4 of loop two
    assert_eq!(counts[10], 0);
    assert!(counts[25..70].iter().all(|&count| count == 4), "{counts:?}");
    assert_eq!(counts[79], 8);
    assert_eq!(emitter.loop_count(), 1);
}
