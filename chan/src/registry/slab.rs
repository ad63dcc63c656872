//! Generational slab backing the registry's intrusive bucket lists.

use core::marker::PhantomData;

/// Newtype for slab indices to prevent cross-slab misuse.
// Manual Copy/Clone: derive would require T: Copy, but PhantomData is just a marker.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SlabIndex<T>(u32, PhantomData<fn() -> T>);

impl<T> Copy for SlabIndex<T> {}

impl<T> Clone for SlabIndex<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> From<u32> for SlabIndex<T> {
    #[inline]
    fn from(idx: u32) -> Self {
        Self(idx, PhantomData)
    }
}

impl<T> From<SlabIndex<T>> for usize {
    #[inline]
    fn from(idx: SlabIndex<T>) -> Self {
        idx.0 as Self
    }
}

/// Occupied slot: a value linked into one bucket list.
pub struct Node<T> {
    pub value: T,
    /// Generation counter for ABA protection.
    pub generation: u32,
    /// Next node in the bucket list.
    pub next: Option<SlabIndex<T>>,
    /// Previous node in the bucket list (None for head).
    pub prev: Option<SlabIndex<T>>,
}

/// Metadata for a free slab slot.
pub struct FreeSlot<T> {
    /// Next free slot in the free list.
    pub next: Option<SlabIndex<T>>,
    /// Generation the next occupant will carry.
    pub generation: u32,
}

/// Slot in the slab.
pub enum Entry<T> {
    Occupied(Node<T>),
    Free(FreeSlot<T>),
}

/// Growable slab with an intrusive free list.
///
/// Freed slots are reused before the slab grows; each reuse bumps the
/// slot's generation so stale indices can be told apart.
pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<SlabIndex<T>>,
    len: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Stores `value` in an unlinked node, returning its index and generation.
    ///
    /// # Panics
    ///
    /// Panics if the slab would exceed `u32::MAX` slots.
    pub fn alloc(&mut self, value: T) -> (SlabIndex<T>, u32) {
        let (idx, generation) = match self.free_head {
            Some(head) => {
                let (next_free, generation) = match &self.entries[usize::from(head)] {
                    Entry::Free(slot) => (slot.next, slot.generation),
                    Entry::Occupied(_) => unreachable!("free_head must point to free slot"),
                };
                self.free_head = next_free;
                (head, generation)
            }
            None => {
                let idx = u32::try_from(self.entries.len())
                    .expect("slab should not exceed u32::MAX slots");
                self.entries.push(Entry::Free(FreeSlot {
                    next: None,
                    generation: 0,
                }));
                (SlabIndex::from(idx), 0)
            }
        };

        self.entries[usize::from(idx)] = Entry::Occupied(Node {
            value,
            generation,
            next: None,
            prev: None,
        });
        self.len += 1;
        (idx, generation)
    }

    /// Frees a node by index, returning its value if the slot was occupied.
    pub fn free(&mut self, idx: SlabIndex<T>) -> Option<T> {
        let generation = match self.entries.get(usize::from(idx))? {
            Entry::Occupied(n) => n.generation,
            Entry::Free(_) => return None,
        };
        let old = std::mem::replace(
            &mut self.entries[usize::from(idx)],
            Entry::Free(FreeSlot {
                next: self.free_head,
                generation: generation.wrapping_add(1),
            }),
        );
        self.free_head = Some(idx);
        self.len -= 1;
        match old {
            Entry::Occupied(node) => Some(node.value),
            Entry::Free(_) => None,
        }
    }

    /// Gets immutable ref to node by index if occupied.
    #[must_use]
    pub fn get(&self, idx: SlabIndex<T>) -> Option<&Node<T>> {
        match self.entries.get(usize::from(idx))? {
            Entry::Occupied(n) => Some(n),
            Entry::Free(_) => None,
        }
    }

    /// Gets mutable ref to node by index if occupied.
    pub fn get_mut(&mut self, idx: SlabIndex<T>) -> Option<&mut Node<T>> {
        match self.entries.get_mut(usize::from(idx))? {
            Entry::Occupied(n) => Some(n),
            Entry::Free(_) => None,
        }
    }
}
