//! Kill volumes.

use serde::{Deserialize, Serialize};

use ember_core::Vec3;

use crate::buffer::ParticleBuffer;
use crate::distribution::{FloatDistribution, VectorDistribution};
use crate::module::UpdateContext;

/// Kills particles inside (or outside) a box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KillBoxModule {
    /// Lower corner, over emitter time.
    pub lower_left: VectorDistribution,
    /// Upper corner, over emitter time.
    pub upper_right: VectorDistribution,
    /// Corners are world positions, not emitter offsets.
    pub absolute: bool,
    /// Kill particles inside the box instead of outside.
    pub kill_inside: bool,
}

impl Default for KillBoxModule {
    fn default() -> Self {
        Self {
            lower_left: VectorDistribution::Constant(Vec3::splat(-100.0)),
            upper_right: VectorDistribution::Constant(Vec3::splat(100.0)),
            absolute: false,
            kill_inside: false,
        }
    }
}

impl KillBoxModule {
    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        let time = ctx.frame.emitter_time;
        let mut lower = self.lower_left.value(time, ctx.rng);
        let mut upper = self.upper_right.value(time, ctx.rng);
        if !self.absolute && !ctx.required.use_local_space {
            lower += ctx.frame.location;
            upper += ctx.frame.location;
        }
        let (lower, upper) = (lower.min(upper), lower.max(upper));

        for slot in (0..buffer.active_count()).rev() {
            let p = buffer.particle(slot).location;
            let inside = p.x >= lower.x
                && p.y >= lower.y
                && p.z >= lower.z
                && p.x <= upper.x
                && p.y <= upper.y
                && p.z <= upper.z;
            if inside == self.kill_inside {
                ctx.kill(buffer, slot);
            }
        }
    }
}

/// Kills particles past a height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KillHeightModule {
    /// Height, over emitter time.
    pub height: FloatDistribution,
    /// Height is a world Z, not an emitter offset.
    pub absolute: bool,
    /// Kill below the height instead of above.
    pub floor: bool,
}

impl Default for KillHeightModule {
    fn default() -> Self {
        Self {
            height: FloatDistribution::Constant(0.0),
            absolute: false,
            floor: true,
        }
    }
}

impl KillHeightModule {
    pub(crate) fn update(&self, ctx: &mut UpdateContext<'_, '_>, buffer: &mut ParticleBuffer) {
        let mut height = self.height.value(ctx.frame.emitter_time, ctx.rng);
        if !self.absolute && !ctx.required.use_local_space {
            height += ctx.frame.location.z;
        }
        for slot in (0..buffer.active_count()).rev() {
            let z = buffer.particle(slot).location.z;
            let outside = if self.floor { z < height } else { z > height };
            if outside {
                ctx.kill(buffer, slot);
            }
        }
    }
}
