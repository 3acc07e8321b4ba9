//! Mathematical types shared between the simulation and the render hand-off.
//!
//! Every type here is `Pod` so it can live inside a raw particle record.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Two pi, the rotation wrap period.
pub const TWO_PI: f32 = std::f32::consts::PI * 2.0;

/// Tolerance used for "is this duration meaningful" checks.
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;

/// 3D Vector - position, velocity, size
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Creates a vector with all components set to `v`.
    #[must_use]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// One vector
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Unit Z vector
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Distance squared (avoids sqrt)
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for degenerate input.
    #[must_use]
    pub fn normalize_or_zero(self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > KINDA_SMALL_NUMBER * KINDA_SMALL_NUMBER {
            self * len_sq.sqrt().recip()
        } else {
            Self::ZERO
        }
    }

    /// Component-wise product.
    #[must_use]
    pub fn mul_elem(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    /// Largest absolute component.
    #[must_use]
    pub fn abs_max(self) -> f32 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }

    /// Component-wise minimum.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Linear interpolation towards `other`.
    #[must_use]
    pub fn lerp(self, other: Self, alpha: f32) -> Self {
        self + (other - self) * alpha
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::MulAssign<f32> for Vec3 {
    fn mul_assign(&mut self, rhs: f32) {
        *self = *self * rhs;
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Linear-space RGBA color.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct LinearColor {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
    /// Alpha
    pub a: f32,
}

impl LinearColor {
    /// Creates a new color.
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Builds a color from an RGB vector and an alpha.
    #[must_use]
    pub const fn from_rgb_alpha(rgb: Vec3, a: f32) -> Self {
        Self::new(rgb.x, rgb.y, rgb.z, a)
    }

    /// The RGB channels as a vector.
    #[must_use]
    pub const fn rgb(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    /// Channel-wise product.
    #[must_use]
    pub fn scaled(self, rgb: Vec3, a: f32) -> Self {
        Self::new(self.r * rgb.x, self.g * rgb.y, self.b * rgb.z, self.a * a)
    }

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for LinearColor {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Axis-aligned bounding box.
///
/// A freshly initialized box is invalid (empty) until the first point is added.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
    /// False until a point has been added.
    pub is_valid: bool,
}

impl Aabb {
    /// An empty box.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
            is_valid: false,
        }
    }

    /// Resets to the empty state.
    pub fn init(&mut self) {
        *self = Self::empty();
    }

    /// Grows the box to contain a cube of half-size `extent` around `point`.
    pub fn add_point(&mut self, point: Vec3, extent: f32) {
        let half = Vec3::splat(extent);
        if self.is_valid {
            self.min = self.min.min(point - half);
            self.max = self.max.max(point + half);
        } else {
            self.min = point - half;
            self.max = point + half;
            self.is_valid = true;
        }
    }

    /// Whether `point` lies inside the box (inclusive).
    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        self.is_valid
            && point.x >= self.min.x
            && point.y >= self.min.y
            && point.z >= self.min.z
            && point.x <= self.max.x
            && point.y <= self.max.y
            && point.z <= self.max.z
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}
