//! # Particle Buffer
//!
//! Contiguous particle records plus an indirection array.
//!
//! ```text
//! indices: [ 4  0  2 | 1  3 ]      slot -> record
//!            active  | free
//!
//! kill_at(0):
//! indices: [ 2  0 | 4  1  3 ]      swapped with the last active slot
//! ```
//!
//! The indirection array is always a permutation of `0..capacity`. Record
//! memory never moves when a particle dies, so a record index identifies a
//! live particle for as long as it lives.

use bytemuck::Pod;

use crate::error::{ParticleError, ParticleResult};
use crate::particle::{BaseParticle, PARTICLE_HEADER_SIZE, PARTICLE_STRIDE_ALIGNMENT};

/// Reads a payload value at a payload-relative byte offset.
///
/// Out-of-range reads yield a zeroed value.
#[inline]
#[must_use]
pub fn read_payload<T: Pod>(payload: &[u8], offset: usize) -> T {
    payload
        .get(offset..offset + std::mem::size_of::<T>())
        .map_or_else(T::zeroed, bytemuck::pod_read_unaligned)
}

/// Writes a payload value at a payload-relative byte offset.
///
/// Out-of-range writes are ignored.
#[inline]
pub fn write_payload<T: Pod>(payload: &mut [u8], offset: usize, value: &T) {
    if let Some(dst) = payload.get_mut(offset..offset + std::mem::size_of::<T>()) {
        dst.copy_from_slice(bytemuck::bytes_of(value));
    }
}

/// Storage for one emitter instance's particles.
#[derive(Clone, Debug)]
pub struct ParticleBuffer {
    /// Record memory, word-aligned so headers can be cast in place.
    data: Vec<u32>,
    /// Record stride in bytes.
    stride: usize,
    /// Number of records.
    capacity: usize,
    /// Slot -> record index.
    indices: Vec<u32>,
    /// Number of live particles (prefix of `indices`).
    active: usize,
    /// Hard ceiling for `resize`.
    max_capacity: usize,
}

impl ParticleBuffer {
    /// Creates an empty buffer with zero capacity.
    ///
    /// # Arguments
    ///
    /// * `stride` - Record size in bytes (header + payload, 16-aligned)
    /// * `max_capacity` - Hard ceiling for growth
    ///
    /// # Errors
    ///
    /// Returns [`ParticleError::InvalidConfig`] for a malformed stride.
    pub fn new(stride: usize, max_capacity: usize) -> ParticleResult<Self> {
        if stride < PARTICLE_HEADER_SIZE || stride % PARTICLE_STRIDE_ALIGNMENT != 0 {
            return Err(ParticleError::InvalidConfig(format!(
                "particle stride {stride} must be >= {PARTICLE_HEADER_SIZE} and {PARTICLE_STRIDE_ALIGNMENT}-aligned"
            )));
        }
        Ok(Self {
            data: Vec::new(),
            stride,
            capacity: 0,
            indices: Vec::new(),
            active: 0,
            max_capacity,
        })
    }

    /// Record stride in bytes.
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Number of records allocated.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hard ceiling for growth.
    #[inline]
    #[must_use]
    pub const fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Number of live particles.
    #[inline]
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.active
    }

    /// True when no particle is alive.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Payload bytes per record.
    #[inline]
    #[must_use]
    pub const fn payload_size(&self) -> usize {
        self.stride - PARTICLE_HEADER_SIZE
    }

    /// The whole indirection array.
    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Record indices of live particles.
    #[inline]
    #[must_use]
    pub fn active_indices(&self) -> &[u32] {
        &self.indices[..self.active]
    }

    /// Grows to `new_capacity` records, keeping live particles in place.
    ///
    /// Requests at or below the current capacity are a no-op.
    ///
    /// # Returns
    ///
    /// `true` if the buffer grew.
    ///
    /// # Errors
    ///
    /// Returns [`ParticleError::CapacityExceeded`] above the hard ceiling.
    pub fn resize(&mut self, new_capacity: usize) -> ParticleResult<bool> {
        if new_capacity <= self.capacity {
            return Ok(false);
        }
        if new_capacity > self.max_capacity {
            return Err(ParticleError::CapacityExceeded {
                requested: new_capacity,
                max: self.max_capacity,
            });
        }

        let words = self.stride / 4;
        self.data.resize(new_capacity * words, 0);
        self.indices.extend(
            (self.capacity..new_capacity).map(|i| u32::try_from(i).unwrap_or(u32::MAX)),
        );
        self.capacity = new_capacity;
        Ok(true)
    }

    #[inline]
    fn record_words(&self, record: usize) -> &[u32] {
        let words = self.stride / 4;
        &self.data[record * words..(record + 1) * words]
    }

    #[inline]
    fn record_words_mut(&mut self, record: usize) -> &mut [u32] {
        let words = self.stride / 4;
        &mut self.data[record * words..(record + 1) * words]
    }

    /// Record index behind an active slot.
    #[inline]
    #[must_use]
    pub fn record_index(&self, slot: usize) -> usize {
        self.indices[slot] as usize
    }

    /// Header and payload of a record, addressed by record index.
    #[must_use]
    pub fn record_by_index(&self, record: usize) -> (&BaseParticle, &[u8]) {
        let bytes: &[u8] = bytemuck::cast_slice(self.record_words(record));
        let (header, payload) = bytes.split_at(PARTICLE_HEADER_SIZE);
        (bytemuck::from_bytes(header), payload)
    }

    /// Header and payload of the particle in `slot`.
    #[must_use]
    pub fn record(&self, slot: usize) -> (&BaseParticle, &[u8]) {
        self.record_by_index(self.record_index(slot))
    }

    /// Mutable header and payload of the particle in `slot`.
    pub fn record_mut(&mut self, slot: usize) -> (&mut BaseParticle, &mut [u8]) {
        let record = self.record_index(slot);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(self.record_words_mut(record));
        let (header, payload) = bytes.split_at_mut(PARTICLE_HEADER_SIZE);
        (bytemuck::from_bytes_mut(header), payload)
    }

    /// Header of the particle in `slot`.
    #[must_use]
    pub fn particle(&self, slot: usize) -> &BaseParticle {
        self.record(slot).0
    }

    /// Mutable header of the particle in `slot`.
    pub fn particle_mut(&mut self, slot: usize) -> &mut BaseParticle {
        self.record_mut(slot).0
    }

    /// Claims the next free slot, zeroes its record and makes it active.
    ///
    /// # Returns
    ///
    /// The new slot, or None when the buffer is full.
    pub fn spawn_slot(&mut self) -> Option<usize> {
        if self.active >= self.capacity {
            return None;
        }
        let slot = self.active;
        let record = self.record_index(slot);
        self.record_words_mut(record).fill(0);
        self.active += 1;
        Some(slot)
    }

    /// Kills the particle in `slot` in O(1).
    ///
    /// The slot is swapped with the last active slot, so the particle that
    /// was last now lives in `slot`. Iterate backwards when killing in a loop.
    ///
    /// # Returns
    ///
    /// False if `slot` was not active.
    pub fn kill_at(&mut self, slot: usize) -> bool {
        if slot >= self.active {
            return false;
        }
        self.indices.swap(slot, self.active - 1);
        self.active -= 1;
        true
    }

    /// Kills every particle.
    pub fn kill_all(&mut self) {
        self.active = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::Vec3;

    fn is_permutation(indices: &[u32]) -> bool {
        let mut seen = vec![false; indices.len()];
        for &i in indices {
            let i = i as usize;
            if i >= seen.len() || seen[i] {
                return false;
            }
            seen[i] = true;
        }
        true
    }

    #[test]
    fn test_buffer_rejects_bad_stride() {
        assert!(ParticleBuffer::new(100, 10).is_err());
        assert!(ParticleBuffer::new(136, 10).is_err());
        assert!(ParticleBuffer::new(144, 10).is_ok());
    }

    #[test]
    fn test_spawn_and_kill_swap() {
        let mut buffer = ParticleBuffer::new(PARTICLE_HEADER_SIZE, 16).unwrap();
        buffer.resize(4).unwrap();

        for i in 0..3 {
            let slot = buffer.spawn_slot().unwrap();
            buffer.particle_mut(slot).location = Vec3::splat(i as f32);
        }
        assert_eq!(buffer.active_count(), 3);

        assert!(buffer.kill_at(0));
        assert_eq!(buffer.active_count(), 2);
        // Last particle moved into slot 0
        assert_eq!(buffer.particle(0).location, Vec3::splat(2.0));
        assert_eq!(buffer.particle(1).location, Vec3::splat(1.0));
        assert!(is_permutation(buffer.indices()));

        assert!(!buffer.kill_at(5));
    }

    #[test]
    fn test_resize_keeps_particles() {
        let mut buffer = ParticleBuffer::new(144, 64).unwrap();
        buffer.resize(2).unwrap();

        let slot = buffer.spawn_slot().unwrap();
        {
            let (particle, payload) = buffer.record_mut(slot);
            particle.relative_time = 0.5;
            write_payload(payload, 4, &7.5f32);
        }
        buffer.spawn_slot().unwrap();
        assert!(buffer.spawn_slot().is_none());

        assert!(buffer.resize(10).unwrap());
        assert!(!buffer.resize(3).unwrap());
        assert_eq!(buffer.capacity(), 10);
        assert!(is_permutation(buffer.indices()));

        let (particle, payload) = buffer.record(0);
        assert_eq!(particle.relative_time, 0.5);
        assert_eq!(read_payload::<f32>(payload, 4), 7.5);
    }

    #[test]
    fn test_resize_ceiling() {
        let mut buffer = ParticleBuffer::new(PARTICLE_HEADER_SIZE, 8).unwrap();
        assert_eq!(
            buffer.resize(9),
            Err(ParticleError::CapacityExceeded { requested: 9, max: 8 })
        );
    }

    #[test]
    fn test_spawn_zeroes_recycled_record() {
        let mut buffer = ParticleBuffer::new(PARTICLE_HEADER_SIZE, 8).unwrap();
        buffer.resize(1).unwrap();

        let slot = buffer.spawn_slot().unwrap();
        buffer.particle_mut(slot).rotation = 3.0;
        buffer.kill_at(slot);

        let slot = buffer.spawn_slot().unwrap();
        assert_eq!(buffer.particle(slot).rotation, 0.0);
    }

    #[test]
    fn test_payload_out_of_range() {
        let payload = [0u8; 4];
        assert_eq!(read_payload::<u64>(&payload, 0), 0);
        let mut payload = [0u8; 4];
        write_payload(&mut payload, 2, &1u32);
        assert_eq!(payload, [0u8; 4]);
    }
}
