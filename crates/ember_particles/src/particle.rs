//! # Particle Record
//!
//! Every particle is a fixed 128-byte header followed by a payload whose
//! layout is decided once per emitter instance.
//!
//! ```text
//! ┌──────────────────────────────── stride ─────────────────────────────────┐
//! │ BaseParticle (128 bytes)        │ type-data │ module A │ module B │ pad │
//! └─────────────────────────────────┴───────────┴──────────┴──────────┴─────┘
//!                                   ^ payload offset 0
//! ```

use bytemuck::{Pod, Zeroable};
use ember_core::{LinearColor, Vec3};

/// Size of the fixed particle header in bytes.
pub const PARTICLE_HEADER_SIZE: usize = std::mem::size_of::<BaseParticle>();

/// Record strides are rounded up to this alignment.
pub const PARTICLE_STRIDE_ALIGNMENT: usize = 16;

/// Particle state flags stored in [`BaseParticle::flags`].
pub mod flags {
    /// Skip translation and rotation integration.
    pub const FREEZE: u32 = 1 << 0;
    /// Skip translation integration only.
    pub const FREEZE_TRANSLATION: u32 = 1 << 1;
    /// Skip rotation integration only.
    pub const FREEZE_ROTATION: u32 = 1 << 2;
    /// Set by the type-data module of a trail for the chain head.
    pub const TRAIL_HEAD: u32 = 1 << 3;
    /// Set once the particle has reported a collision.
    pub const COLLISION_OCCURRED: u32 = 1 << 4;
}

/// The fixed header of every particle record.
///
/// "Base" fields are the anchors relative modules reset from each tick.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BaseParticle {
    /// Location at the previous tick.
    pub old_location: Vec3,
    /// Normalized age, 0 at birth and 1 at death.
    pub relative_time: f32,
    /// Current location.
    pub location: Vec3,
    /// Reciprocal of the maximum lifetime in seconds (0 = immortal).
    pub one_over_max_lifetime: f32,
    /// Velocity anchor.
    pub base_velocity: Vec3,
    /// Current rotation in radians.
    pub rotation: f32,
    /// Current velocity.
    pub velocity: Vec3,
    /// Rotation rate anchor.
    pub base_rotation_rate: f32,
    /// Size anchor.
    pub base_size: Vec3,
    /// Current rotation rate in radians per second.
    pub rotation_rate: f32,
    /// Current size.
    pub size: Vec3,
    /// State flags, see [`flags`].
    pub flags: u32,
    /// Current color.
    pub color: LinearColor,
    /// Color anchor.
    pub base_color: LinearColor,
}

impl BaseParticle {
    /// Restores the per-tick values from their anchors.
    #[inline]
    pub fn reset_to_base(&mut self) {
        self.velocity = self.base_velocity;
        self.size = self.base_size;
        self.rotation_rate = self.base_rotation_rate;
        self.color = self.base_color;
    }

    /// Whether any freeze flag is set.
    #[inline]
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.flags & flags::FREEZE != 0
    }
}

/// Rounds `size` up to the record stride alignment.
#[inline]
#[must_use]
pub const fn align_stride(size: usize) -> usize {
    (size + PARTICLE_STRIDE_ALIGNMENT - 1) & !(PARTICLE_STRIDE_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(PARTICLE_HEADER_SIZE, 128);
        assert_eq!(PARTICLE_HEADER_SIZE % PARTICLE_STRIDE_ALIGNMENT, 0);
    }

    #[test]
    fn test_align_stride() {
        assert_eq!(align_stride(128), 128);
        assert_eq!(align_stride(129), 144);
        assert_eq!(align_stride(144), 144);
    }

    #[test]
    fn test_reset_to_base() {
        let mut particle = BaseParticle {
            base_velocity: Vec3::new(1.0, 2.0, 3.0),
            velocity: Vec3::ZERO,
            base_size: Vec3::ONE,
            base_color: LinearColor::WHITE,
            ..BaseParticle::default()
        };
        particle.reset_to_base();
        assert_eq!(particle.velocity, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(particle.size, Vec3::ONE);
        assert_eq!(particle.color, LinearColor::WHITE);
    }
}
