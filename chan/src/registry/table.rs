//! Fixed-size hash table of intrusive, doubly-linked bucket lists.
//!
//! Nodes live in one shared [`Slab`]; each bucket only stores the head and
//! tail indices of its list. Insertion appends at the tail, removal unlinks
//! in O(1) given the node's [`Membership`].

use std::sync::Arc;

use super::slab::{Slab, SlabIndex};
use crate::sync::queue::BlockingQueue;

type Slot = SlabIndex<Arc<BlockingQueue>>;

/// Where a registered queue sits in the table.
///
/// Stored in the queue itself so the release path can unlink it without
/// scanning its bucket.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Membership {
    pub(crate) bucket: usize,
    slot: Slot,
    generation: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    head: Option<Slot>,
    tail: Option<Slot>,
}

pub(crate) struct Table {
    buckets: Box<[Bucket]>,
    nodes: Slab<Arc<BlockingQueue>>,
}

impl Table {
    pub(crate) fn new(buckets: usize) -> Self {
        Self {
            buckets: vec![Bucket::default(); buckets].into_boxed_slice(),
            nodes: Slab::new(),
        }
    }

    /// Number of registered queues.
    pub(crate) const fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Finds the queue named `name` in `bucket`.
    pub(crate) fn find(&self, bucket: usize, name: &str) -> Option<&Arc<BlockingQueue>> {
        let mut cursor = self.buckets[bucket].head;
        while let Some(idx) = cursor {
            let node = self.nodes.get(idx)?;
            if node.value.name().as_str() == name {
                return Some(&node.value);
            }
            cursor = node.next;
        }
        None
    }

    /// Appends `queue` at the tail of `bucket`.
    ///
    /// The caller has already checked that the name is free.
    pub(crate) fn insert(&mut self, bucket: usize, queue: Arc<BlockingQueue>) -> Membership {
        let (slot, generation) = self.nodes.alloc(queue);
        let old_tail = self.buckets[bucket].tail;

        if let Some(node) = self.nodes.get_mut(slot) {
            node.prev = old_tail;
        }
        match old_tail {
            Some(tail) => {
                if let Some(node) = self.nodes.get_mut(tail) {
                    node.next = Some(slot);
                }
            }
            None => self.buckets[bucket].head = Some(slot),
        }
        self.buckets[bucket].tail = Some(slot);

        Membership {
            bucket,
            slot,
            generation,
        }
    }

    /// Unlinks the node at `membership` and returns its queue.
    ///
    /// # Panics
    ///
    /// Panics if the slot is empty or has been reused since `membership` was
    /// issued. Either means the queue was detached twice.
    pub(crate) fn detach(&mut self, membership: Membership) -> Arc<BlockingQueue> {
        let Membership {
            bucket,
            slot,
            generation,
        } = membership;

        let (prev, next) = match self.nodes.get(slot) {
            Some(node) if node.generation == generation => (node.prev, node.next),
            _ => panic!("chan registry: stale membership for bucket {bucket}"),
        };

        match prev {
            Some(prev) => {
                if let Some(node) = self.nodes.get_mut(prev) {
                    node.next = next;
                }
            }
            None => self.buckets[bucket].head = next,
        }
        match next {
            Some(next) => {
                if let Some(node) = self.nodes.get_mut(next) {
                    node.prev = prev;
                }
            }
            None => self.buckets[bucket].tail = prev,
        }

        match self.nodes.free(slot) {
            Some(queue) => queue,
            None => unreachable!("slot checked occupied above"),
        }
    }

    #[cfg(test)]
    fn bucket_names(&self, bucket: usize) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = self.buckets[bucket].head;
        while let Some(idx) = cursor {
            let node = self.nodes.get(idx).unwrap();
            names.push(node.value.name().to_string());
            cursor = node.next;
        }
        names
    }
}
