//! # Payload Layout
//!
//! Assigns every module its byte range in the particle payload and in the
//! per-instance block. Computed once when an instance is created; the
//! layout never changes afterwards.
//!
//! ```text
//! payload:  [ type-data ][ module 0 ][ module 1 ] ... [ module n ]
//!           ^ 0
//! instance: [ type-data ][ module 0 ] ...
//! ```
//!
//! Offsets are keyed by ordinary-module index. Every LOD level has the same
//! list shape, so a level resolves its modules to the same offsets as LOD 0.

use std::ops::Range;

use ember_core::Arena;

use crate::error::{ParticleError, ParticleResult};
use crate::lod::LodLevel;
use crate::module::{ModuleHandle, ParticleModule};
use crate::particle::{align_stride, PARTICLE_HEADER_SIZE};

/// Byte requirements of one module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ByteRequirement {
    /// Bytes per particle.
    pub per_particle: usize,
    /// Bytes per instance.
    pub per_instance: usize,
}

/// Resolved offsets for one emitter instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PayloadLayout {
    type_data: Option<Range<usize>>,
    type_data_instance: Option<Range<usize>>,
    modules: Vec<Range<usize>>,
    module_instances: Vec<Range<usize>>,
    payload_size: usize,
    instance_size: usize,
    stride: usize,
}

impl PayloadLayout {
    /// Lays out the modules of `level`, type-data first.
    ///
    /// # Errors
    ///
    /// [`ParticleError::StaleModule`] if the level refers to a released
    /// module, [`ParticleError::LayoutOverflow`] if the record stride would
    /// exceed `max_stride`.
    pub fn compute(
        level: &LodLevel,
        modules: &Arena<ParticleModule>,
        max_stride: usize,
    ) -> ParticleResult<Self> {
        let requirement = |handle: ModuleHandle| -> ParticleResult<ByteRequirement> {
            let module: &ParticleModule = modules
                .get(handle)
                .ok_or(ParticleError::StaleModule(level.level()))?;
            Ok(ByteRequirement {
                per_particle: module.kind.required_bytes(),
                per_instance: module.kind.required_bytes_per_instance(),
            })
        };

        let type_data = level.type_data().map(requirement).transpose()?;
        let ordinary = level
            .modules()
            .iter()
            .map(|&handle| requirement(handle))
            .collect::<ParticleResult<Vec<_>>>()?;

        Self::from_requirements(type_data, &ordinary, max_stride)
    }

    /// Lays out explicit requirements in pipeline order.
    ///
    /// # Errors
    ///
    /// [`ParticleError::LayoutOverflow`] if the stride would exceed `max_stride`.
    pub fn from_requirements(
        type_data: Option<ByteRequirement>,
        modules: &[ByteRequirement],
        max_stride: usize,
    ) -> ParticleResult<Self> {
        let mut payload_size = 0_usize;
        let mut instance_size = 0_usize;
        let mut claim = |req: ByteRequirement| {
            let particle = payload_size..payload_size + req.per_particle;
            let instance = instance_size..instance_size + req.per_instance;
            payload_size = particle.end;
            instance_size = instance.end;
            (particle, instance)
        };

        let (type_data, type_data_instance) = match type_data.map(&mut claim) {
            Some((particle, instance)) => (Some(particle), Some(instance)),
            None => (None, None),
        };
        let (modules, module_instances): (Vec<_>, Vec<_>) = modules.iter().map(|&req| claim(req)).unzip();

        let stride = align_stride(PARTICLE_HEADER_SIZE + payload_size);
        if stride > max_stride {
            return Err(ParticleError::LayoutOverflow {
                stride,
                max: max_stride,
            });
        }

        Ok(Self {
            type_data,
            type_data_instance,
            modules,
            module_instances,
            payload_size,
            instance_size,
            stride,
        })
    }

    /// Total payload bytes per particle.
    #[must_use]
    pub const fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Total per-instance bytes.
    #[must_use]
    pub const fn instance_size(&self) -> usize {
        self.instance_size
    }

    /// Record stride: header plus payload, 16-byte aligned.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Payload range of the type-data module.
    #[must_use]
    pub fn type_data_range(&self) -> Option<Range<usize>> {
        self.type_data.clone()
    }

    /// Payload offset of the type-data module, 0 when absent.
    #[must_use]
    pub fn type_data_offset(&self) -> usize {
        self.type_data.as_ref().map_or(0, |range| range.start)
    }

    /// Instance-block offset of the type-data module, 0 when absent.
    #[must_use]
    pub fn type_data_instance_offset(&self) -> usize {
        self.type_data_instance.as_ref().map_or(0, |range| range.start)
    }

    /// Payload range of ordinary module `index`.
    #[must_use]
    pub fn module_range(&self, index: usize) -> Option<Range<usize>> {
        self.modules.get(index).cloned()
    }

    /// Payload offset of ordinary module `index`, 0 when out of range.
    #[must_use]
    pub fn module_offset(&self, index: usize) -> usize {
        self.modules.get(index).map_or(0, |range| range.start)
    }

    /// Instance-block offset of ordinary module `index`, 0 when out of range.
    #[must_use]
    pub fn module_instance_offset(&self, index: usize) -> usize {
        self.module_instances.get(index).map_or(0, |range| range.start)
    }

    /// Number of ordinary modules laid out.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Every non-empty payload range, type-data first.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.type_data
            .iter()
            .chain(self.modules.iter())
            .filter(|range| !range.is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(per_particle: usize) -> ByteRequirement {
        ByteRequirement {
            per_particle,
            per_instance: 0,
        }
    }

    #[test]
    fn test_modules_packed_in_order() {
        let layout = PayloadLayout::from_requirements(None, &[bytes(12), bytes(4)], 65_535).unwrap();
        assert_eq!(layout.payload_size(), 16);
        assert_eq!(layout.module_range(0), Some(0..12));
        assert_eq!(layout.module_range(1), Some(12..16));
        assert_eq!(layout.stride(), 144);
    }

    #[test]
    fn test_type_data_first() {
        let layout = PayloadLayout::from_requirements(
            Some(ByteRequirement {
                per_particle: 8,
                per_instance: 8,
            }),
            &[bytes(0), ByteRequirement {
                per_particle: 4,
                per_instance: 4,
            }],
            65_535,
        )
        .unwrap();
        assert_eq!(layout.type_data_range(), Some(0..8));
        assert_eq!(layout.module_offset(1), 8);
        assert_eq!(layout.module_instance_offset(1), 8);
        assert_eq!(layout.instance_size(), 12);
        assert_eq!(layout.ranges().count(), 2);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let result = PayloadLayout::from_requirements(None, &[bytes(1024)], 512);
        assert!(matches!(result, Err(ParticleError::LayoutOverflow { max: 512, .. })));
    }
}
