// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! A per-frame node arena with generation-checked handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A handle to a value stored in a [`FrameArena`].
///
/// The generation makes handles from a previous frame, or to a freed slot,
/// fail to resolve instead of aliasing a newer value.
pub struct ArenaHandle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArenaHandle<T> {
    /// The slot index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The slot generation the handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls: derives would require `T: Copy` etc.
impl<T> Clone for ArenaHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaHandle<T> {}

impl<T> PartialEq for ArenaHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for ArenaHandle<T> {}

impl<T> Hash for ArenaHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for ArenaHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaHandle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-type node allocator with O(1) alloc/free and bulk reset.
///
/// Slots are never released individually: [`FrameArena::free`] pushes the
/// slot on a free list, and [`FrameArena::clear`] empties every slot at once
/// while keeping the backing storage for the next frame.
pub struct FrameArena<T> {
    slots: Vec<Slot<T>>,
    free_slots: Vec<u32>,
    len: usize,
}

impl<T> FrameArena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            len: 0,
        }
    }

    /// Stores `value`, reusing a freed slot when one is available.
    pub fn alloc(&mut self, value: T) -> ArenaHandle<T> {
        self.len += 1;
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return ArenaHandle {
                index,
                generation: slot.generation,
                _marker: PhantomData,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ArenaHandle {
            index,
            generation: 0,
            _marker: PhantomData,
        }
    }

    /// Returns a slot to the free list and hands back its value.
    ///
    /// Returns `None` for stale handles.
    pub fn free(&mut self, handle: ArenaHandle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Resolves a handle.
    pub fn get(&self, handle: ArenaHandle<T>) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Resolves a handle mutably.
    pub fn get_mut(&mut self, handle: ArenaHandle<T>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Returns `true` if the handle resolves.
    pub fn contains(&self, handle: ArenaHandle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Drops every value at once. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.free_slots.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free_slots.push(index as u32);
        }
        self.len = 0;
        log::trace!(
            "FrameArena: cleared, keeping {} slots",
            self.slots.len()
        );
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no value is live.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaHandle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    ArenaHandle {
                        index: index as u32,
                        generation: slot.generation,
                        _marker: PhantomData,
                    },
                    value,
                )
            })
        })
    }
}

impl<T> Default for FrameArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FrameArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameArena")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish()
    }
}
