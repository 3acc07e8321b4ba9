//! # Handle Arena
//!
//! Growable slot storage addressed by generation-checked handles.
//!
//! Objects are inserted and removed individually in O(1). A removed slot is
//! recycled through a free list, and its generation is bumped so that any
//! handle still pointing at it stops resolving.

/// Handle to an object stored in an [`Arena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    /// Slot index.
    index: u32,
    /// Generation of the slot when the handle was issued.
    generation: u32,
}

impl Handle {
    /// Slot index of this handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation of this handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// One storage slot.
#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A growable arena with stable handles.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. Wrap it in a lock if it must be shared.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena: Arena<Module> = Arena::new();
///
/// let handle = arena.insert(module);
/// assert!(arena.get(handle).is_some());
///
/// arena.remove(handle);
/// assert!(arena.get(handle).is_none()); // stale handle
/// ```
#[derive(Clone, Debug)]
pub struct Arena<T> {
    /// The storage array.
    slots: Vec<Slot<T>>,
    /// Free list - indices of vacant slots.
    free_list: Vec<u32>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Creates an empty arena with room for `capacity` objects.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Returns the number of stored objects.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is stored.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores an object and returns its handle.
    ///
    /// This is **O(1)**; it only allocates when no vacant slot remains.
    ///
    /// # Arguments
    ///
    /// * `value` - The object to store
    pub fn insert(&mut self, value: T) -> Handle {
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle {
            index,
            generation: 0,
        }
    }

    /// Removes an object.
    ///
    /// # Arguments
    ///
    /// * `handle` - The handle to release
    ///
    /// # Returns
    ///
    /// The removed object, or None if the handle was stale.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;

        Some(value)
    }

    /// Returns true if the handle still resolves.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Gets a reference to a stored object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation == handle.generation {
            slot.value.as_ref()
        } else {
            None
        }
    }

    /// Gets a mutable reference to a stored object.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation == handle.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    /// Removes everything, invalidating all handles.
    pub fn clear(&mut self) {
        self.free_list.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free_list.push(u32::try_from(index).unwrap_or(u32::MAX));
        }
        self.len = 0;
    }

    /// Iterates over all stored objects.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    Handle {
                        index: u32::try_from(index).unwrap_or(u32::MAX),
                        generation: slot.generation,
                    },
                    v,
                )
            })
        })
    }

    /// Iterates mutably over all stored objects.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|v| {
                (
                    Handle {
                        index: u32::try_from(index).unwrap_or(u32::MAX),
                        generation,
                    },
                    v,
                )
            })
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_insert_remove() {
        let mut arena: Arena<u32> = Arena::new();

        let h1 = arena.insert(42);
        assert_eq!(*arena.get(h1).unwrap(), 42);
        assert_eq!(arena.len(), 1);

        let removed = arena.remove(h1).unwrap();
        assert_eq!(removed, 42);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_arena_stale_handle() {
        let mut arena: Arena<u32> = Arena::new();

        let h1 = arena.insert(1);
        arena.remove(h1);

        let h2 = arena.insert(2);
        assert_eq!(h1.index(), h2.index()); // Same slot reused
        assert_ne!(h1.generation(), h2.generation());
        assert!(arena.get(h1).is_none());
        assert!(arena.remove(h1).is_none());
        assert_eq!(*arena.get(h2).unwrap(), 2);
    }

    #[test]
    fn test_arena_clear_invalidates() {
        let mut arena: Arena<&str> = Arena::with_capacity(4);
        let a = arena.insert("a");
        let b = arena.insert("b");

        arena.clear();
        assert!(!arena.contains(a));
        assert!(!arena.contains(b));

        let c = arena.insert("c");
        assert_eq!(arena.iter().count(), 1);
        assert_eq!(arena.get(c), Some(&"c"));
    }
}
