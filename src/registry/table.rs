//! Bucket array and node chains.
//!
//! Chains are persistent lists: a node never changes once linked, and a
//! bucket head is only ever replaced by a node whose tail is the old head.
//! Growth relinks the shared entries into fresh chains of a new array, so an
//! array a reader still holds keeps every entry it ever had.

use std::any::TypeId;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::key::PairKey;
use crate::synth::ErasedMapper;

/// One published mapper.
pub(crate) struct Entry {
    pub(crate) key: PairKey,
    pub(crate) hash: u64,
    pub(crate) mapper: Arc<dyn ErasedMapper>,
}

pub(crate) struct Node {
    entry: Arc<Entry>,
    next: Option<Arc<Node>>,
}

pub(crate) struct BucketTable {
    buckets: Box<[ArcSwapOption<Node>]>,
    mask: usize,
}

impl BucketTable {
    /// Table with `capacity` buckets; `capacity` must be a power of two.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let buckets = (0..capacity).map(|_| ArcSwapOption::empty()).collect();
        Self {
            buckets,
            mask: capacity - 1,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    fn bucket(&self, hash: u64) -> &ArcSwapOption<Node> {
        &self.buckets[(hash as usize) & self.mask]
    }

    /// Scan the chain for `hash`.
    pub(crate) fn find(
        &self,
        hash: u64,
        source: TypeId,
        destination: TypeId,
        profile: Option<&str>,
    ) -> Option<Arc<dyn ErasedMapper>> {
        let head = self.bucket(hash).load();
        let mut current = head.as_deref();
        while let Some(node) = current {
            let entry = &node.entry;
            if entry.hash == hash && entry.key.matches(source, destination, profile) {
                return Some(Arc::clone(&entry.mapper));
            }
            current = node.next.as_deref();
        }
        None
    }

    /// Push `entry` at the head of its bucket. Callers hold the write lock.
    pub(crate) fn link(&self, entry: Arc<Entry>) {
        let bucket = self.bucket(entry.hash);
        let node = Node {
            entry,
            next: bucket.load_full(),
        };
        bucket.store(Some(Arc::new(node)));
    }

    /// Link every entry of `self` into `target`. `self` is left untouched.
    pub(crate) fn relink_into(&self, target: &BucketTable) {
        for bucket in self.buckets.iter() {
            let head = bucket.load();
            let mut current = head.as_deref();
            while let Some(node) = current {
                target.link(Arc::clone(&node.entry));
                current = node.next.as_deref();
            }
        }
    }

    /// Entries reachable from the buckets.
    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        let mut count = 0;
        for bucket in self.buckets.iter() {
            let head = bucket.load();
            let mut current = head.as_deref();
            while let Some(node) = current {
                count += 1;
                current = node.next.as_deref();
            }
        }
        count
    }
}

impl Drop for Node {
    // Unlink iteratively so long chains do not recurse on drop.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}
