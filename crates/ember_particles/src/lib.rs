//! # EMBER Particles
//!
//! Data-driven particle simulation for the EMBER engine.
//!
//! ## Design Principles
//!
//! 1. **Data, not subclasses** - An effect is a list of module values; the
//!    pipeline dispatches on [`module::ModuleKind`]
//! 2. **Flat records** - Every particle is a fixed header plus a payload
//!    whose layout is computed once per emitter instance
//! 3. **O(1) kill** - Dead particles swap with the last live one
//! 4. **Shared LOD graphs** - Levels reuse one module instance until a
//!    level edits it, tracked by a per-module bitmask
//!
//! ## Threading
//!
//! A [`ParticleSystemComponent`] is ticked by one simulation thread. The
//! renderer reads snapshots through the component's double buffer; event
//! listeners drain a bounded channel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ember_particles::{
//!     EmitterTemplate, EngineConfig, ParticleSystem, ParticleSystemComponent,
//!     RequiredModule, SpawnModule,
//! };
//!
//! let sparks = EmitterTemplate::new("sparks", RequiredModule::default(), SpawnModule::with_rate(50.0));
//! let system = Arc::new(ParticleSystem::new("fire", vec![sparks])?);
//!
//! let mut component = ParticleSystemComponent::new(system, EngineConfig::from_file("data/particles.toml")?);
//! component.activate()?;
//! component.tick(1.0 / 60.0);
//!
//! let snapshot = component.render_buffer().read();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod buffer;
pub mod config;
pub mod distribution;
pub mod error;
pub mod events;
pub mod instance;
pub mod layout;
pub mod lod;
pub mod module;
pub mod particle;
pub mod render;
pub mod system;
pub mod template;

pub use buffer::ParticleBuffer;
pub use config::{EngineConfig, LodGenerationPolicy};
pub use distribution::{Curve, CurvePoint, FloatDistribution, ParticleRng, VectorDistribution};
pub use error::{ParticleError, ParticleResult};
pub use events::{
    event_channel, EventReceiver, EventSender, ParticleEvent, ParticleEventKind,
};
pub use instance::EmitterInstance;
pub use layout::PayloadLayout;
pub use lod::LodLevel;
pub use module::{
    BurstEntry, EmitterKind, ForcedSpawnBatch, LodMask, ModuleHandle, ModuleKind, ModuleSlot,
    ParticleModule, RequiredModule, SpawnBatch, SpawnModule,
};
pub use particle::BaseParticle;
pub use render::{EmitterRenderData, ParticleRenderData, SystemRenderSnapshot};
pub use system::{LodDistanceProvider, LodMethod, ParticleSystem, ParticleSystemComponent};
pub use template::EmitterTemplate;
