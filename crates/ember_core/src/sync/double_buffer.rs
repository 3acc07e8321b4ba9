//! # Double Buffer
//!
//! Two copies of a value: the producer fills the back copy while consumers
//! read the front copy, and `swap_buffers` flips them at the end of a frame.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!                    │        DoubleBuffer<T>      │
//!                    │                             │
//!                    │  ┌─────────┐  ┌─────────┐   │
//!                    │  │ Copy A  │  │ Copy B  │   │
//!                    │  └────┬────┘  └────┬────┘   │
//!                    │       │            │        │
//!                    │  ┌────┴────────────┴────┐   │
//!                    │  │   Atomic Index (0/1) │   │
//!                    │  └──────────────────────┘   │
//!                    └─────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//!      ┌──────────────┐                ┌────────────┐
//!      │ WriteHandle  │                │ ReadHandle │
//!      │ (Simulation) │                │  (Render)  │
//!      └──────────────┘                └────────────┘
//! ```
//!
//! ## Blocking Rules
//!
//! - The producer never waits. If a slow consumer still holds the back copy
//!   from two frames ago, `try_write` returns `None` and the frame is counted
//!   as skipped.
//! - Consumers may briefly wait if they race a swap.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Double-buffered value shared between one producer and many consumers.
///
/// ## Usage
///
/// ```rust,ignore
/// let buffer = DoubleBuffer::new(Snapshot::default(), Snapshot::default());
///
/// // Simulation thread
/// if let Some(mut back) = buffer.try_write() {
///     back.fill_from(&simulation);
/// }
/// buffer.swap_buffers();
///
/// // Render thread
/// let front = buffer.read();
/// draw(&front);
/// ```
#[derive(Debug)]
pub struct DoubleBuffer<T> {
    /// The two copies.
    buffers: [RwLock<T>; 2],

    /// Index of the current write copy (0 or 1).
    /// Read copy is always (write_index ^ 1).
    write_index: AtomicUsize,

    /// Whether a write handle is currently held.
    write_locked: AtomicBool,

    /// Number of completed swaps.
    frame_count: AtomicUsize,

    /// Number of frames dropped because the back copy was still being read.
    skipped_frames: AtomicUsize,
}

impl<T> DoubleBuffer<T> {
    /// Creates a double buffer from two initial copies.
    #[must_use]
    pub fn new(front: T, back: T) -> Self {
        Self {
            buffers: [RwLock::new(back), RwLock::new(front)],
            write_index: AtomicUsize::new(0),
            write_locked: AtomicBool::new(false),
            frame_count: AtomicUsize::new(0),
            skipped_frames: AtomicUsize::new(0),
        }
    }

    /// Returns the number of completed swaps.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Returns the number of frames the producer had to skip.
    #[inline]
    #[must_use]
    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames.load(Ordering::Relaxed)
    }

    /// Returns whether a write handle is currently active.
    #[inline]
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.write_locked.load(Ordering::Acquire)
    }

    /// Gets a write handle on the back copy without blocking.
    ///
    /// Returns `None` if another write handle is alive or a consumer still
    /// holds the back copy.
    #[must_use]
    pub fn try_write(&self) -> Option<WriteHandle<'_, T>> {
        if self.write_locked.swap(true, Ordering::AcqRel) {
            return None;
        }

        let write_idx = self.write_index.load(Ordering::Acquire);
        match self.buffers[write_idx].try_write() {
            Some(guard) => Some(WriteHandle {
                guard,
                owner: self,
            }),
            None => {
                self.write_locked.store(false, Ordering::Release);
                self.skipped_frames.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Gets a read handle on the front copy.
    #[must_use]
    pub fn read(&self) -> ReadHandle<'_, T> {
        let read_idx = self.write_index.load(Ordering::Acquire) ^ 1;
        ReadHandle {
            guard: self.buffers[read_idx].read(),
        }
    }

    /// Publishes the back copy by flipping the buffer index.
    ///
    /// Returns false (and does nothing) while a write handle is alive.
    pub fn swap_buffers(&self) -> bool {
        if self.is_write_locked() {
            return false;
        }
        self.write_index.fetch_xor(1, Ordering::AcqRel);
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl<T: Default> Default for DoubleBuffer<T> {
    fn default() -> Self {
        Self::new(T::default(), T::default())
    }
}

/// Exclusive access to the back copy.
///
/// Dropping the handle releases the write lock.
pub struct WriteHandle<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    owner: &'a DoubleBuffer<T>,
}

impl<T> Deref for WriteHandle<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for WriteHandle<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for WriteHandle<'_, T> {
    fn drop(&mut self) {
        self.owner.write_locked.store(false, Ordering::Release);
    }
}

/// Shared access to the front copy.
pub struct ReadHandle<'a, T> {
    guard: RwLockReadGuard<'a, T>,
}

impl<T> Deref for ReadHandle<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_swap_publishes() {
        let buffer = DoubleBuffer::new(0u32, 0u32);

        {
            let mut back = buffer.try_write().unwrap();
            *back = 7;
            assert!(!buffer.swap_buffers(), "swap must wait for the writer");
        }

        assert_eq!(*buffer.read(), 0);
        assert!(buffer.swap_buffers());
        assert_eq!(*buffer.read(), 7);
        assert_eq!(buffer.frame_count(), 1);
    }

    #[test]
    fn test_single_writer() {
        let buffer = DoubleBuffer::new(0u8, 0u8);
        let first = buffer.try_write();
        assert!(first.is_some());
        assert!(buffer.try_write().is_none());
        drop(first);
        assert!(buffer.try_write().is_some());
    }

    #[test]
    fn test_stale_reader_skips_frame() {
        let buffer = DoubleBuffer::new(1u32, 2u32);

        // Reader grabs the front copy, then the producer swaps twice.
        let stale = buffer.read();
        assert_eq!(*stale, 1);
        assert!(buffer.swap_buffers());

        // The old front copy is now the back copy and is still being read.
        assert!(buffer.try_write().is_none());
        assert_eq!(buffer.skipped_frames(), 1);

        drop(stale);
        assert!(buffer.try_write().is_some());
    }

    #[test]
    fn test_concurrent_reader() {
        use std::sync::Arc;

        let buffer = Arc::new(DoubleBuffer::new(Vec::<u32>::new(), Vec::new()));
        let reader = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                let mut seen = 0;
                for _ in 0..100 {
                    seen = seen.max(buffer.read().len());
                }
                seen
            })
        };

        for frame in 0..50u32 {
            if let Some(mut back) = buffer.try_write() {
                back.push(frame);
            }
            buffer.swap_buffers();
        }

        let seen = reader.join().unwrap();
        assert!(seen <= 50);
    }
}
