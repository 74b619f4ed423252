// This module implements the Type-Pair Registry, the concurrent cache of compiled mappers keyed by
// (source type, destination type, optional profile). The store is a power-of-two array of bucket
// heads, each holding a singly linked chain of nodes; the array is published through an ArcSwap
// so a read takes a snapshot of the current array and scans one chain without locking or
// allocating. Writes go through a single mutex and are double-checked: a thread that misses on
// the fast path takes the lock, looks again, and only builds when the key is still absent, so
// concurrent first requests for the same pair compile it exactly once. When the entry count
// calls for growth, a larger array is allocated, the existing entries are relinked into it, and
// the new array is published behind a full fence; an array a reader still holds stays intact.
// Entries are never removed and the array never shrinks. Hit, miss, build, failure and resize
// counts are kept for diagnostics.

//! Type-Pair Registry.
//!
//! # Guarantees
//!
//! - A published entry is fully built and linked before any reader can see it.
//! - A lookup never misses an entry that was published before it started.
//! - For one key, every successful lookup returns the same mapper instance.
//! - A failed build publishes nothing; the next request builds again.

use std::fmt;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use hashbrown::DefaultHashBuilder;
use parking_lot::Mutex;

use crate::config::RegistryOptions;
use crate::core::{BuildError, TypeInfo};
use crate::synth::ErasedMapper;

pub mod key;
mod table;

pub use key::PairKey;

use key::hash_parts;
use table::{BucketTable, Entry};

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    builds: AtomicUsize,
    failures: AtomicUsize,
    resizes: AtomicUsize,
}

/// Concurrent cache of compiled mappers.
pub struct TypePairRegistry {
    /// Published bucket array.
    table: ArcSwap<BucketTable>,

    /// Serializes writers.
    write: Mutex<()>,

    /// Published entries; written under `write`, read without it.
    entries: AtomicUsize,

    hasher: DefaultHashBuilder,
    options: RegistryOptions,
    counters: Counters,
}

impl TypePairRegistry {
    pub fn new(options: RegistryOptions) -> Self {
        let capacity = options.initial_size().next_power_of_two();
        Self {
            table: ArcSwap::from_pointee(BucketTable::new(capacity)),
            write: Mutex::new(()),
            entries: AtomicUsize::new(0),
            hasher: DefaultHashBuilder::default(),
            options,
            counters: Counters::default(),
        }
    }

    /// Look up a published mapper without locking.
    pub fn try_get(
        &self,
        source: TypeInfo,
        destination: TypeInfo,
        profile: Option<&str>,
    ) -> Option<Arc<dyn ErasedMapper>> {
        let hash = hash_parts(&self.hasher, source.id(), destination.id(), profile);
        let found = self
            .table
            .load()
            .find(hash, source.id(), destination.id(), profile);
        match &found {
            Some(_) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("registry hit: {} -> {}", source, destination);
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        found
    }

    /// Return the mapper for the key, calling `build` at most once per key
    /// across all threads if it is absent.
    pub fn get_or_create<F>(
        &self,
        source: TypeInfo,
        destination: TypeInfo,
        profile: Option<&str>,
        build: F,
    ) -> Result<Arc<dyn ErasedMapper>, BuildError>
    where
        F: FnOnce() -> Result<Arc<dyn ErasedMapper>, BuildError>,
    {
        if let Some(mapper) = self.try_get(source, destination, profile) {
            return Ok(mapper);
        }

        let _write = self.write.lock();
        let hash = hash_parts(&self.hasher, source.id(), destination.id(), profile);
        let current = self.table.load_full();
        if let Some(mapper) = current.find(hash, source.id(), destination.id(), profile) {
            return Ok(mapper);
        }

        let key = PairKey::new(source, destination, profile);
        let mapper = match build() {
            Ok(mapper) => mapper,
            Err(error) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("building mapper {key} failed: {error}");
                return Err(error);
            }
        };
        self.counters.builds.fetch_add(1, Ordering::Relaxed);

        let entry = Arc::new(Entry {
            key,
            hash,
            mapper: Arc::clone(&mapper),
        });

        let entries = self.entries.load(Ordering::Relaxed) + 1;
        let wanted = self.capacity_for(entries);
        if wanted > current.capacity() {
            let grown = BucketTable::new(wanted);
            current.relink_into(&grown);
            grown.link(entry);
            fence(Ordering::SeqCst);
            self.table.store(Arc::new(grown));
            self.counters.resizes.fetch_add(1, Ordering::Relaxed);
            log::info!(
                "registry grew from {} to {} buckets ({} entries)",
                current.capacity(),
                wanted,
                entries
            );
        } else {
            fence(Ordering::SeqCst);
            current.link(entry);
        }
        self.entries.store(entries, Ordering::Release);

        log::debug!("published mapper {} -> {}", source, destination);
        Ok(mapper)
    }

    /// Bucket count needed for `entries` entries.
    fn capacity_for(&self, entries: usize) -> usize {
        let wanted = entries.saturating_mul(self.options.growth_factor());
        wanted
            .max(self.options.initial_size())
            .next_power_of_two()
    }

    /// Number of published entries.
    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bucket count.
    pub fn capacity(&self) -> usize {
        self.table.load().capacity()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            entries: self.len(),
            capacity: self.capacity(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            builds: self.counters.builds.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            resizes: self.counters.resizes.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for TypePairRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypePairRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Snapshot of registry counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub entries: usize,
    pub capacity: usize,

    /// Lock-free lookups that found an entry.
    pub hits: usize,

    /// Lock-free lookups that found nothing.
    pub misses: usize,

    /// Mappers built and published.
    pub builds: usize,

    /// Builds that failed and published nothing.
    pub failures: usize,

    pub resizes: usize,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Registry Statistics:")?;
        writeln!(f, "  Entries: {} in {} buckets", self.entries, self.capacity)?;
        writeln!(f, "  Lookups: {} hits, {} misses", self.hits, self.misses)?;
        writeln!(f, "  Builds: {} ({} failed)", self.builds, self.failures)?;
        writeln!(f, "  Resizes: {}", self.resizes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MapError, Value};
    use crate::synth::Param;
    use std::any::Any;

    /// Mapper stand-in that only carries its pair.
    struct Stub {
        source: TypeInfo,
        destination: TypeInfo,
    }

    impl ErasedMapper for Stub {
        fn source(&self) -> TypeInfo {
            self.source
        }

        fn destination(&self) -> TypeInfo {
            self.destination
        }

        fn profile(&self) -> Option<&str> {
            None
        }

        fn construct_erased(&self, _: &dyn Any, _: Param<'_>) -> Result<Option<Value>, MapError> {
            Ok(None)
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn stub(source: TypeInfo, destination: TypeInfo) -> Result<Arc<dyn ErasedMapper>, BuildError> {
        Ok(Arc::new(Stub {
            source,
            destination,
        }))
    }

    /// A few distinct type identities to key on.
    fn types() -> Vec<TypeInfo> {
        vec![
            TypeInfo::of::<u8>(),
            TypeInfo::of::<u16>(),
            TypeInfo::of::<u32>(),
            TypeInfo::of::<u64>(),
            TypeInfo::of::<i8>(),
            TypeInfo::of::<i16>(),
            TypeInfo::of::<i32>(),
            TypeInfo::of::<i64>(),
            TypeInfo::of::<f32>(),
            TypeInfo::of::<f64>(),
            TypeInfo::of::<bool>(),
            TypeInfo::of::<String>(),
        ]
    }

    #[test]
    fn test_get_or_create_builds_once() {
        let registry = TypePairRegistry::new(RegistryOptions::default());
        let (a, b) = (TypeInfo::of::<u8>(), TypeInfo::of::<String>());

        let first = registry.get_or_create(a, b, None, || stub(a, b)).unwrap();
        let second = registry
            .get_or_create(a, b, None, || panic!("built twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.stats().builds, 1);
    }

    #[test]
    fn test_profiles_are_distinct_keys() {
        let registry = TypePairRegistry::new(RegistryOptions::default());
        let (a, b) = (TypeInfo::of::<u8>(), TypeInfo::of::<String>());

        let plain = registry.get_or_create(a, b, None, || stub(a, b)).unwrap();
        let admin = registry
            .get_or_create(a, b, Some("admin"), || stub(a, b))
            .unwrap();
        assert!(!Arc::ptr_eq(&plain, &admin));
        assert!(registry.try_get(a, b, Some("guest")).is_none());
        assert!(registry.try_get(b, a, None).is_none());
    }

    #[test]
    fn test_failed_build_publishes_nothing() {
        let registry = TypePairRegistry::new(RegistryOptions::default());
        let (a, b) = (TypeInfo::of::<u8>(), TypeInfo::of::<String>());

        let error = registry
            .get_or_create(a, b, None, || {
                Err(BuildError::NotRegistered { pair: "u8 -> String".into() })
            })
            .err()
            .unwrap();
        assert!(matches!(error, BuildError::NotRegistered { .. }));
        assert!(registry.is_empty());
        assert_eq!(registry.stats().failures, 1);

        registry.get_or_create(a, b, None, || stub(a, b)).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_growth_keeps_every_entry_reachable() {
        let registry = TypePairRegistry::new(RegistryOptions::new(1, 2));
        assert_eq!(registry.capacity(), 1);

        let types = types();
        let mut published = Vec::new();
        for &source in &types {
            for &destination in &types[..4] {
                let mapper = registry
                    .get_or_create(source, destination, None, || stub(source, destination))
                    .unwrap();
                published.push((source, destination, mapper));
            }
        }

        assert_eq!(registry.len(), published.len());
        assert!(registry.capacity().is_power_of_two());
        assert!(registry.capacity() >= published.len() * 2);
        assert!(registry.stats().resizes > 0);
        assert_eq!(registry.table.load().count(), published.len());
        for (source, destination, mapper) in &published {
            let found = registry.try_get(*source, *destination, None).unwrap();
            assert!(Arc::ptr_eq(&found, mapper));
            assert_eq!(found.source(), *source);
            assert_eq!(found.destination(), *destination);
        }
    }

    #[test]
    fn test_counts_readable_while_a_build_holds_the_lock() {
        let registry = TypePairRegistry::new(RegistryOptions::default());
        let (a, b) = (TypeInfo::of::<u8>(), TypeInfo::of::<String>());
        registry.get_or_create(a, b, None, || stub(a, b)).unwrap();

        let (c, d) = (TypeInfo::of::<u16>(), TypeInfo::of::<String>());
        registry
            .get_or_create(c, d, None, || {
                assert_eq!(registry.len(), 1);
                assert!(!registry.is_empty());
                assert_eq!(registry.stats().entries, 1);
                stub(c, d)
            })
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_capacity_formula() {
        let registry = TypePairRegistry::new(RegistryOptions::new(16, 2));
        assert_eq!(registry.capacity_for(1), 16);
        assert_eq!(registry.capacity_for(8), 16);
        assert_eq!(registry.capacity_for(9), 32);

        let triple = TypePairRegistry::new(RegistryOptions::new(3, 3));
        assert_eq!(triple.capacity(), 4);
        assert_eq!(triple.capacity_for(2), 8);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let registry = TypePairRegistry::new(RegistryOptions::default());
        let (a, b) = (TypeInfo::of::<u8>(), TypeInfo::of::<String>());

        assert!(registry.try_get(a, b, None).is_none());
        registry.get_or_create(a, b, None, || stub(a, b)).unwrap();
        registry.try_get(a, b, None).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert!(stats.to_string().contains("Builds: 1 (0 failed)"));
    }
}
