//! The two slot modules every LOD level carries: Required and Spawn.

use serde::{Deserialize, Serialize};

use crate::config::LodGenerationPolicy;
use crate::distribution::{FloatDistribution, ParticleRng};

/// How sub-images are chosen from the sprite grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubUvMethod {
    /// No sub-image animation.
    #[default]
    None,
    /// Image index follows the curve.
    Linear,
    /// Like `Linear`, blending into the next image.
    LinearBlend,
    /// Random image, re-rolled on a timer.
    Random,
    /// Like `Random`, blending into the next image.
    RandomBlend,
}

/// How sprites face the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenAlignment {
    /// Square, camera facing.
    #[default]
    Square,
    /// Rectangle, camera facing.
    Rectangle,
    /// Stretched along the velocity.
    Velocity,
    /// Locked to the emitter's Z axis.
    TypeSpecific,
}

/// Lifetime-independent emitter configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredModule {
    /// Material name handed to the renderer.
    pub material: String,
    /// Length of one loop in seconds.
    pub emitter_duration: f32,
    /// Lower bound when `duration_use_range` is set.
    pub emitter_duration_low: f32,
    /// Pick a random duration in `[low, duration]`.
    pub duration_use_range: bool,
    /// Re-roll the duration at the start of every loop.
    pub duration_recalc_each_loop: bool,
    /// Number of loops, 0 loops forever.
    pub emitter_loops: u32,
    /// Delay before the emitter starts, in seconds.
    pub emitter_delay: f32,
    /// Lower bound when `delay_use_range` is set.
    pub emitter_delay_low: f32,
    /// Pick a random delay in `[low, delay]`.
    pub delay_use_range: bool,
    /// Only delay the first loop.
    pub delay_first_loop_only: bool,
    /// Simulate in emitter space instead of world space.
    pub use_local_space: bool,
    /// Kill all particles when the system is deactivated.
    pub kill_on_deactivate: bool,
    /// Kill all particles once the emitter completes.
    pub kill_on_completed: bool,
    /// Sprite facing mode.
    pub screen_alignment: ScreenAlignment,
    /// Horizontal sub-image count.
    pub sub_images_horizontal: u32,
    /// Vertical sub-image count.
    pub sub_images_vertical: u32,
    /// Sub-image selection.
    pub interpolation_method: SubUvMethod,
    /// Random image changes over a particle's life.
    pub random_image_changes: u32,
    /// Cap on rendered particles.
    pub max_draw_count: Option<u32>,
}

impl Default for RequiredModule {
    fn default() -> Self {
        Self {
            material: String::new(),
            emitter_duration: 1.0,
            emitter_duration_low: 0.0,
            duration_use_range: false,
            duration_recalc_each_loop: false,
            emitter_loops: 0,
            emitter_delay: 0.0,
            emitter_delay_low: 0.0,
            delay_use_range: false,
            delay_first_loop_only: false,
            use_local_space: false,
            kill_on_deactivate: false,
            kill_on_completed: false,
            screen_alignment: ScreenAlignment::Square,
            sub_images_horizontal: 1,
            sub_images_vertical: 1,
            interpolation_method: SubUvMethod::None,
            random_image_changes: 0,
            max_draw_count: None,
        }
    }
}

impl RequiredModule {
    /// Total number of sub-images in the grid.
    #[must_use]
    pub fn total_sub_images(&self) -> u32 {
        (self.sub_images_horizontal * self.sub_images_vertical).max(1)
    }

    /// Rolls the loop duration.
    #[must_use]
    pub fn roll_duration(&self, rng: &mut ParticleRng) -> f32 {
        if self.duration_use_range {
            FloatDistribution::Uniform {
                min: self.emitter_duration_low,
                max: self.emitter_duration,
            }
            .value(0.0, rng)
        } else {
            self.emitter_duration
        }
    }

    /// Rolls the start delay.
    #[must_use]
    pub fn roll_delay(&self, rng: &mut ParticleRng) -> f32 {
        if self.delay_use_range {
            FloatDistribution::Uniform {
                min: self.emitter_delay_low,
                max: self.emitter_delay,
            }
            .value(0.0, rng)
        } else {
            self.emitter_delay
        }
    }
}

/// One timed burst.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BurstEntry {
    /// Emitter time in seconds (within the loop) at which it fires.
    pub time: f32,
    /// Particle count (upper bound when `count_low` is set).
    pub count: i32,
    /// Lower bound for a random count, or negative for a fixed count.
    pub count_low: i32,
}

impl BurstEntry {
    /// A fixed-count burst.
    #[must_use]
    pub const fn new(time: f32, count: i32) -> Self {
        Self {
            time,
            count,
            count_low: -1,
        }
    }

    /// Rolls the count for one firing.
    #[must_use]
    pub fn roll_count(&self, rng: &mut ParticleRng) -> i32 {
        if self.count_low > -1 && self.count_low < self.count {
            use rand::Rng;
            rng.gen_range(self.count_low..=self.count)
        } else {
            self.count
        }
    }
}

/// Continuous rate and discrete bursts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnModule {
    /// Particles per second, sampled against emitter time.
    pub rate: FloatDistribution,
    /// Multiplier on `rate`, clamped to be non-negative.
    pub rate_scale: FloatDistribution,
    /// Timed bursts.
    pub burst_list: Vec<BurstEntry>,
    /// Disable rate spawning (bursts only).
    pub process_spawn_rate: bool,
    /// Disable bursts (rate only).
    pub process_burst_list: bool,
}

impl Default for SpawnModule {
    fn default() -> Self {
        Self {
            rate: FloatDistribution::Constant(10.0),
            rate_scale: FloatDistribution::Constant(1.0),
            burst_list: Vec::new(),
            process_spawn_rate: true,
            process_burst_list: true,
        }
    }
}

impl SpawnModule {
    /// A rate-only spawn module.
    #[must_use]
    pub fn with_rate(rate: f32) -> Self {
        Self {
            rate: FloatDistribution::Constant(rate),
            ..Self::default()
        }
    }

    /// Effective rate at `emitter_time`.
    #[must_use]
    pub fn spawn_rate(&self, emitter_time: f32, rng: &mut ParticleRng) -> f32 {
        if !self.process_spawn_rate {
            return 0.0;
        }
        let scale = self.rate_scale.value(emitter_time, rng).max(0.0);
        (self.rate.value(emitter_time, rng) * scale).max(0.0)
    }

    /// Highest rate the module can produce.
    #[must_use]
    pub fn max_spawn_rate(&self) -> f32 {
        let (_, rate_max) = self.rate.min_max();
        let (_, scale_max) = self.rate_scale.min_max();
        (rate_max * scale_max.max(0.0)).max(0.0)
    }

    /// Sum of the largest count of every burst.
    #[must_use]
    pub fn total_burst_count(&self) -> u32 {
        self.burst_list
            .iter()
            .map(|b| u32::try_from(b.count.max(0)).unwrap_or(0))
            .sum()
    }

    pub(crate) fn scale_for_lod(&mut self, percentage: u32, policy: &LodGenerationPolicy) {
        if policy.scale_spawn_rate {
            self.rate.scale(LodGenerationPolicy::factor(percentage));
        }
        if policy.scale_burst_counts {
            for burst in &mut self.burst_list {
                burst.count = LodGenerationPolicy::scale_count(burst.count, percentage);
                if burst.count_low > -1 {
                    burst.count_low = LodGenerationPolicy::scale_count(burst.count_low, percentage);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_rate_scale_clamped() {
        let spawn = SpawnModule {
            rate_scale: FloatDistribution::Constant(-2.0),
            ..SpawnModule::with_rate(10.0)
        };
        let mut rng = ParticleRng::seed_from_u64(1);
        assert_eq!(spawn.spawn_rate(0.0, &mut rng), 0.0);
    }

    #[test]
    fn test_burst_count_range() {
        let mut rng = ParticleRng::seed_from_u64(3);
        let burst = BurstEntry {
            time: 0.0,
            count: 20,
            count_low: 10,
        };
        for _ in 0..50 {
            let n = burst.roll_count(&mut rng);
            assert!((10..=20).contains(&n));
        }
        assert_eq!(BurstEntry::new(0.0, 5).roll_count(&mut rng), 5);
    }

    #[test]
    fn test_lod_scaling() {
        let mut spawn = SpawnModule {
            burst_list: vec![BurstEntry::new(0.0, 150)],
            ..SpawnModule::with_rate(40.0)
        };
        spawn.scale_for_lod(25, &LodGenerationPolicy::default());
        assert_eq!(spawn.max_spawn_rate(), 10.0);
        assert_eq!(spawn.total_burst_count(), 37);
    }
}
