//! Benchmark for emitter and system ticks.
//!
//! TARGET: 100,000 live particles updated in under 2ms
//!
//! Run with: cargo bench --package ember_particles --bench tick_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ember_core::Vec3;
use ember_particles::distribution::{Curve, FloatDistribution, VectorDistribution};
use ember_particles::module::{
    AccelerationModule, ColorOverLifeModule, LifetimeModule, SiblingEmitters, SizeMultiplyLifeModule,
    VelocityModule,
};
use ember_particles::{
    BurstEntry, EmitterInstance, EmitterTemplate, EngineConfig, ModuleKind, ModuleSlot, ParticleSystem,
    ParticleSystemComponent, RequiredModule, SpawnModule,
};

const DT: f32 = 1.0 / 60.0;

fn fountain(burst: i32) -> EmitterTemplate {
    let spawn = SpawnModule {
        burst_list: vec![BurstEntry::new(0.0, burst)],
        ..SpawnModule::with_rate(0.0)
    };
    let mut template = EmitterTemplate::new("fountain", RequiredModule::default(), spawn);
    let modules = [
        ModuleKind::Lifetime(LifetimeModule {
            lifetime: FloatDistribution::Constant(1000.0),
        }),
        ModuleKind::Velocity(VelocityModule {
            start_velocity: VectorDistribution::Uniform {
                min: Vec3::new(-1.0, -1.0, 4.0),
                max: Vec3::new(1.0, 1.0, 8.0),
            },
            ..VelocityModule::default()
        }),
        ModuleKind::Acceleration(AccelerationModule {
            acceleration: VectorDistribution::Constant(Vec3::new(0.0, 0.0, -9.8)),
        }),
        ModuleKind::ColorOverLife(ColorOverLifeModule {
            color_over_life: VectorDistribution::ConstantCurve(Curve::from_points(&[
                (0.0, Vec3::ONE),
                (1.0, Vec3::ZERO),
            ])),
            ..ColorOverLifeModule::default()
        }),
        ModuleKind::SizeMultiplyLife(SizeMultiplyLifeModule::default()),
    ];
    for kind in modules {
        template
            .add_module(kind)
            .unwrap_or_else(|err| panic!("bench module rejected: {err}"));
    }
    template
}

fn warmed_emitter(count: i32) -> EmitterInstance {
    let mut template = fountain(count);
    template.initial_allocation_count = usize::try_from(count).unwrap_or(0);
    let config = EngineConfig {
        max_particles_per_emitter: 131_072,
        initial_allocation_cap: usize::try_from(count).unwrap_or(0),
        ..EngineConfig::default()
    };
    let mut emitter = EmitterInstance::new(Arc::new(template), &config, 0).unwrap();
    emitter.tick(DT, false, SiblingEmitters::none());
    emitter
}

fn bench_emitter_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("emitter_tick");

    for count in [1_000, 10_000, 100_000] {
        let mut emitter = warmed_emitter(count);
        group.throughput(Throughput::Elements(u64::try_from(count).unwrap_or(0)));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                emitter.tick(black_box(DT), false, SiblingEmitters::none());
                black_box(emitter.active_particles())
            });
        });
    }

    group.finish();
}

fn bench_steady_rate(c: &mut Criterion) {
    let mut template = fountain(0);
    template
        .edit_module(0, ModuleSlot::Spawn)
        .unwrap()
        .kind = ModuleKind::Spawn(SpawnModule::with_rate(6000.0));
    template
        .edit_module(0, ModuleSlot::Ordinary(0))
        .unwrap()
        .kind = ModuleKind::Lifetime(LifetimeModule {
        lifetime: FloatDistribution::Uniform { min: 1.0, max: 2.0 },
    });
    let mut emitter = EmitterInstance::new(Arc::new(template), &EngineConfig::default(), 0).unwrap();
    for _ in 0..120 {
        emitter.tick(DT, false, SiblingEmitters::none());
    }

    c.bench_function("steady_rate_spawn_and_update", |b| {
        b.iter(|| {
            emitter.tick(black_box(DT), false, SiblingEmitters::none());
        });
    });
}

fn bench_system_snapshot(c: &mut Criterion) {
    let emitters = (0..4).map(|_| fountain(5_000)).collect();
    let system = Arc::new(ParticleSystem::new("bench", emitters).unwrap());
    let mut component = ParticleSystemComponent::new(system, EngineConfig::default());
    component.activate().unwrap();
    component.tick(DT);

    let mut group = c.benchmark_group("system_tick");
    group.throughput(Throughput::Elements(20_000));
    group.bench_function("four_emitters_with_snapshot", |b| {
        b.iter(|| {
            component.tick(black_box(DT));
        });
    });
    group.finish();
}

criterion_group!(benches, bench_emitter_tick, bench_steady_rate, bench_system_snapshot);
criterion_main!(benches);
