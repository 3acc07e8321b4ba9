//! # Distributions
//!
//! Parameter sources sampled by modules: constants, uniform ranges, and
//! piecewise-linear curves over a time input (normalized particle age or
//! emitter time).
//!
//! A curve with no points has no samples. It evaluates to zero instead of
//! failing, so a half-authored module contributes nothing.

use std::ops::{Add, Mul, Sub};

use ember_core::Vec3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Random stream used by every emitter instance.
pub type ParticleRng = ChaCha8Rng;

/// Values a curve can interpolate.
pub trait CurveValue:
    Copy + Default + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self>
{
}

impl CurveValue for f32 {}
impl CurveValue for Vec3 {}

/// A single curve key.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint<T> {
    /// Input (time) value.
    pub input: f32,
    /// Output value.
    pub output: T,
}

/// Piecewise-linear curve, clamped at both ends.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve<T> {
    /// Keys sorted by input.
    pub points: Vec<CurvePoint<T>>,
}

impl<T: CurveValue> Curve<T> {
    /// Builds a curve from `(input, output)` pairs, sorting by input.
    #[must_use]
    pub fn from_points(points: &[(f32, T)]) -> Self {
        let mut points: Vec<CurvePoint<T>> = points
            .iter()
            .map(|&(input, output)| CurvePoint { input, output })
            .collect();
        points.sort_by(|a, b| a.input.total_cmp(&b.input));
        Self { points }
    }

    /// Evaluates the curve, or None if it has no keys.
    #[must_use]
    pub fn eval(&self, input: f32) -> Option<T> {
        let first = self.points.first()?;
        if input <= first.input {
            return Some(first.output);
        }
        for pair in self.points.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if input <= b.input {
                let span = b.input - a.input;
                if span <= f32::EPSILON {
                    return Some(b.output);
                }
                let alpha = (input - a.input) / span;
                return Some(a.output + (b.output - a.output) * alpha);
            }
        }
        self.points.last().map(|p| p.output)
    }

    /// Multiplies every output by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for point in &mut self.points {
            point.output = point.output * factor;
        }
    }
}

impl Curve<f32> {
    /// Smallest and largest key output.
    #[must_use]
    pub fn output_range(&self) -> Option<(f32, f32)> {
        let mut iter = self.points.iter().map(|p| p.output);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

/// Scalar distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FloatDistribution {
    /// A fixed value.
    Constant(f32),
    /// Uniformly random in `[min, max]`.
    Uniform {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },
    /// Curve over the time input.
    ConstantCurve(Curve<f32>),
    /// Uniformly random between two curves.
    UniformCurve {
        /// Lower curve.
        min: Curve<f32>,
        /// Upper curve.
        max: Curve<f32>,
    },
}

impl FloatDistribution {
    /// Samples the distribution at `time`.
    #[must_use]
    pub fn value(&self, time: f32, rng: &mut ParticleRng) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => min + (max - min) * rng.gen::<f32>(),
            Self::ConstantCurve(curve) => curve.eval(time).unwrap_or_default(),
            Self::UniformCurve { min, max } => {
                let lo = min.eval(time).unwrap_or_default();
                let hi = max.eval(time).unwrap_or_default();
                lo + (hi - lo) * rng.gen::<f32>()
            }
        }
    }

    /// Samples without randomness: the midpoint of random ranges.
    #[must_use]
    pub fn value_deterministic(&self, time: f32) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => (min + max) * 0.5,
            Self::ConstantCurve(curve) => curve.eval(time).unwrap_or_default(),
            Self::UniformCurve { min, max } => {
                (min.eval(time).unwrap_or_default() + max.eval(time).unwrap_or_default()) * 0.5
            }
        }
    }

    /// Smallest and largest value the distribution can produce.
    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        match self {
            Self::Constant(v) => (*v, *v),
            Self::Uniform { min, max } => (min.min(*max), min.max(*max)),
            Self::ConstantCurve(curve) => curve.output_range().unwrap_or_default(),
            Self::UniformCurve { min, max } => {
                let (a_lo, a_hi) = min.output_range().unwrap_or_default();
                let (b_lo, b_hi) = max.output_range().unwrap_or_default();
                (a_lo.min(b_lo), a_hi.max(b_hi))
            }
        }
    }

    /// Multiplies every value by `factor`.
    pub fn scale(&mut self, factor: f32) {
        match self {
            Self::Constant(v) => *v *= factor,
            Self::Uniform { min, max } => {
                *min *= factor;
                *max *= factor;
            }
            Self::ConstantCurve(curve) => curve.scale(factor),
            Self::UniformCurve { min, max } => {
                min.scale(factor);
                max.scale(factor);
            }
        }
    }
}

impl Default for FloatDistribution {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

/// Vector distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VectorDistribution {
    /// A fixed value.
    Constant(Vec3),
    /// Uniformly random per component in `[min, max]`.
    Uniform {
        /// Lower bound.
        min: Vec3,
        /// Upper bound.
        max: Vec3,
    },
    /// Curve over the time input.
    ConstantCurve(Curve<Vec3>),
    /// Uniformly random per component between two curves.
    UniformCurve {
        /// Lower curve.
        min: Curve<Vec3>,
        /// Upper curve.
        max: Curve<Vec3>,
    },
}

impl VectorDistribution {
    fn lerp_random(lo: Vec3, hi: Vec3, rng: &mut ParticleRng) -> Vec3 {
        Vec3::new(
            lo.x + (hi.x - lo.x) * rng.gen::<f32>(),
            lo.y + (hi.y - lo.y) * rng.gen::<f32>(),
            lo.z + (hi.z - lo.z) * rng.gen::<f32>(),
        )
    }

    /// Samples the distribution at `time`.
    #[must_use]
    pub fn value(&self, time: f32, rng: &mut ParticleRng) -> Vec3 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => Self::lerp_random(*min, *max, rng),
            Self::ConstantCurve(curve) => curve.eval(time).unwrap_or_default(),
            Self::UniformCurve { min, max } => Self::lerp_random(
                min.eval(time).unwrap_or_default(),
                max.eval(time).unwrap_or_default(),
                rng,
            ),
        }
    }

    /// Samples without randomness: the midpoint of random ranges.
    #[must_use]
    pub fn value_deterministic(&self, time: f32) -> Vec3 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform { min, max } => (*min + *max) * 0.5,
            Self::ConstantCurve(curve) => curve.eval(time).unwrap_or_default(),
            Self::UniformCurve { min, max } => {
                (min.eval(time).unwrap_or_default() + max.eval(time).unwrap_or_default()) * 0.5
            }
        }
    }

    /// Multiplies every value by `factor`.
    pub fn scale(&mut self, factor: f32) {
        match self {
            Self::Constant(v) => *v *= factor,
            Self::Uniform { min, max } => {
                *min *= factor;
                *max *= factor;
            }
            Self::ConstantCurve(curve) => curve.scale(factor),
            Self::UniformCurve { min, max } => {
                min.scale(factor);
                max.scale(factor);
            }
        }
    }
}

impl Default for VectorDistribution {
    fn default() -> Self {
        Self::Constant(Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ParticleRng {
        ParticleRng::seed_from_u64(42)
    }

    #[test]
    fn test_curve_interpolates_and_clamps() {
        let curve = Curve::from_points(&[(1.0, 10.0), (0.0, 0.0)]);
        assert_eq!(curve.eval(-1.0), Some(0.0));
        assert_eq!(curve.eval(0.25), Some(2.5));
        assert_eq!(curve.eval(5.0), Some(10.0));
    }

    #[test]
    fn test_empty_curve_has_no_samples() {
        let dist = FloatDistribution::ConstantCurve(Curve::default());
        assert_eq!(dist.value(0.5, &mut rng()), 0.0);
        assert_eq!(dist.min_max(), (0.0, 0.0));
    }

    #[test]
    fn test_uniform_within_bounds() {
        let dist = FloatDistribution::Uniform { min: 2.0, max: 4.0 };
        let mut rng = rng();
        for _ in 0..100 {
            let v = dist.value(0.0, &mut rng);
            assert!((2.0..=4.0).contains(&v));
        }
        assert_eq!(dist.min_max(), (2.0, 4.0));
    }

    #[test]
    fn test_scale_for_lod() {
        let mut dist = FloatDistribution::ConstantCurve(Curve::from_points(&[(0.0, 10.0), (1.0, 20.0)]));
        dist.scale(0.5);
        assert_eq!(dist.min_max(), (5.0, 10.0));

        let mut vec = VectorDistribution::Uniform {
            min: Vec3::ZERO,
            max: Vec3::splat(10.0),
        };
        vec.scale(0.5);
        assert_eq!(vec.value_deterministic(0.0), Vec3::splat(2.5));
    }
}
