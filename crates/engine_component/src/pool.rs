//! Fixed-capacity, index-pooled component storage.
//!
//! A [`ComponentPool`] is the backing store of one component world: a dense
//! slot array sized once at creation plus a pool of free slot indices.
//! Allocation and release are O(1) and a component never moves while it is
//! alive.
//!
//! Slots are addressed through a [`Handle`] carrying the slot index and the
//! slot's generation at allocation time. Releasing a slot bumps its
//! generation, so a handle kept by an in-flight operation after its component
//! was destroyed is detected as stale instead of silently addressing whatever
//! component reuses the slot.

use serde::{Deserialize, Serialize};

/// Errors from [`ComponentPool`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Every slot is in use.
    #[error("component pool is full (capacity {capacity})")]
    Full {
        /// The fixed capacity of the pool.
        capacity: usize,
    },

    /// The handle does not address a live component.
    #[error("stale component handle {0}")]
    Stale(Handle),
}

/// Generational address of a pooled component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index of the component.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when the component was allocated.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity slot array with a free-index pool.
#[derive(Debug)]
pub struct ComponentPool<T> {
    slots: Vec<Slot<T>>,
    /// Free slot indices. Popped from the back, so the lowest index is
    /// handed out first on a fresh pool.
    free: Vec<u32>,
}

impl<T> ComponentPool<T> {
    /// Create a pool with room for exactly `capacity` components.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        let free = (0..capacity as u32).rev().collect();
        Self { slots, free }
    }

    /// Store `value` in a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Full`] when no slot is free.
    pub fn insert(&mut self, value: T) -> Result<Handle, PoolError> {
        let Some(index) = self.free.pop() else {
            return Err(PoolError::Full {
                capacity: self.slots.len(),
            });
        };
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        Ok(Handle {
            index,
            generation: slot.generation,
        })
    }

    /// Take the component out of its slot and return the slot to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Stale`] if `handle` does not address a live
    /// component.
    pub fn remove(&mut self, handle: Handle) -> Result<T, PoolError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(PoolError::Stale(handle))?;
        let value = slot.value.take().ok_or(PoolError::Stale(handle))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(value)
    }

    /// Returns the component addressed by `handle`, if it is still alive.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutable variant of [`ComponentPool::get`].
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Returns `true` if `handle` addresses a live component.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Iterate live components in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Handle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Iterate live components mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|value| {
                (
                    Handle {
                        index: index as u32,
                        generation,
                    },
                    value,
                )
            })
        })
    }

    /// Handles of all live components, in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Number of live components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns `true` if no component is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed capacity of the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of free slots.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_until_full() {
        let mut pool = ComponentPool::with_capacity(2);
        let a = pool.insert("a").unwrap();
        let b = pool.insert("b").unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(pool.insert("c"), Err(PoolError::Full { capacity: 2 }));
        assert_eq!(pool.remaining(), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_remove_returns_slot_to_pool() {
        let mut pool = ComponentPool::with_capacity(1);
        let a = pool.insert(1).unwrap();
        assert_eq!(pool.remove(a), Ok(1));
        assert!(pool.is_empty());
        let b = pool.insert(2).unwrap();
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
    }

    #[test]
    fn test_stale_handle_is_detected_after_reuse() {
        let mut pool = ComponentPool::with_capacity(1);
        let old = pool.insert(10).unwrap();
        pool.remove(old).unwrap();
        let new = pool.insert(20).unwrap();

        assert_eq!(pool.get(old), None);
        assert_eq!(pool.get(new), Some(&20));
        assert_eq!(pool.remove(old), Err(PoolError::Stale(old)));
        assert!(pool.contains(new));
    }

    #[test]
    fn test_iteration_is_in_slot_order() {
        let mut pool = ComponentPool::with_capacity(4);
        let handles: Vec<Handle> = (0..4).map(|i| pool.insert(i).unwrap()).collect();
        pool.remove(handles[1]).unwrap();

        let seen: Vec<i32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen, vec![0, 2, 3]);

        for (_, v) in pool.iter_mut() {
            *v *= 10;
        }
        assert_eq!(pool.get(handles[3]), Some(&30));
        assert_eq!(pool.handles(), vec![handles[0], handles[2], handles[3]]);
    }

    #[test]
    fn test_zero_capacity_pool() {
        let mut pool: ComponentPool<u8> = ComponentPool::with_capacity(0);
        assert_eq!(pool.capacity(), 0);
        assert!(pool.insert(1).is_err());
    }
}
