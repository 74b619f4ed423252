//! Test registry determinism, build-once under contention and growth.

use std::any::Any;
use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;
use shapemap::synth::Param;
use shapemap::{
    record, BuildError, ErasedMapper, MapError, MapperBuilder, MappingConfig, RegistryOptions,
    TypeInfo, TypePairRegistry, Value,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, Default)]
struct Person {
    name: String,
    age: u8,
}

record!(Person { name: String, age: u8 });

#[derive(Debug, Clone, Default)]
struct PersonView {
    name: String,
    age: String,
}

record!(PersonView { name: String, age: String });

#[test]
fn test_repeated_requests_return_the_same_mapper() {
    init_logging();
    let mapper = MapperBuilder::new()
        .register(MappingConfig::<Person, PersonView>::new())
        .register(MappingConfig::<Person, PersonView>::new().profile("audit"))
        .finalize();

    let first = mapper.mapper::<Person, PersonView>().unwrap();
    let second = mapper.mapper::<Person, PersonView>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let audit = mapper.mapper_for::<Person, PersonView>(Some("audit")).unwrap();
    let audit_again = mapper.mapper_for::<Person, PersonView>(Some("audit")).unwrap();
    assert!(Arc::ptr_eq(&audit, &audit_again));
    assert!(!Arc::ptr_eq(&first, &audit));

    let stats = mapper.stats();
    assert_eq!(stats.builds, 2);
    assert_eq!(stats.entries, 2);
}

#[test]
fn test_concurrent_first_requests_build_once() {
    init_logging();
    const THREADS: usize = 8;
    let mapper = MapperBuilder::new()
        .register(MappingConfig::<Person, PersonView>::new())
        .finalize();
    let barrier = Barrier::new(THREADS);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    mapper.mapper::<Person, PersonView>().unwrap()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    for result in &results[1..] {
        assert!(Arc::ptr_eq(&results[0], result));
    }
    assert_eq!(mapper.stats().builds, 1);

    let view = results[0]
        .construct(&Person {
            name: "Lin".into(),
            age: 30,
        })
        .unwrap();
    assert_eq!(view.age, "30");
}

/// Registry entry that only records its key.
struct Marker {
    source: TypeInfo,
    destination: TypeInfo,
    profile: String,
}

impl ErasedMapper for Marker {
    fn source(&self) -> TypeInfo {
        self.source
    }

    fn destination(&self) -> TypeInfo {
        self.destination
    }

    fn profile(&self) -> Option<&str> {
        Some(&self.profile)
    }

    fn construct_erased(&self, _: &dyn Any, _: Param<'_>) -> Result<Option<Value>, MapError> {
        Ok(None)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn marker(profile: &str) -> Result<Arc<dyn ErasedMapper>, BuildError> {
    Ok(Arc::new(Marker {
        source: TypeInfo::of::<u32>(),
        destination: TypeInfo::of::<String>(),
        profile: profile.to_string(),
    }))
}

#[test]
fn test_readers_see_every_entry_during_growth() {
    init_logging();
    const ENTRIES: usize = 512;
    let registry = TypePairRegistry::new(RegistryOptions::new(1, 2));
    let (source, destination) = (TypeInfo::of::<u32>(), TypeInfo::of::<String>());
    let profiles: Vec<String> = (0..ENTRIES).map(|i| format!("p{i}")).collect();
    let barrier = Barrier::new(3);

    thread::scope(|scope| {
        scope.spawn(|| {
            barrier.wait();
            for profile in &profiles {
                registry
                    .get_or_create(source, destination, Some(profile.as_str()), || marker(profile))
                    .unwrap();
            }
        });
        for _ in 0..2 {
            scope.spawn(|| {
                barrier.wait();
                // Whatever was published before a lookup starts must be found.
                while registry.len() < ENTRIES {
                    let published = registry.len();
                    for profile in &profiles[..published] {
                        let found = registry.try_get(source, destination, Some(profile.as_str()));
                        assert_eq!(found.unwrap().profile(), Some(profile.as_str()));
                    }
                }
            });
        }
    });

    assert_eq!(registry.len(), ENTRIES);
    assert!(registry.stats().resizes > 0);
}

proptest! {
    #[test]
    fn test_growth_keeps_entries_reachable(
        count in 1usize..300,
        initial in 1usize..64,
        growth in 0usize..5,
    ) {
        let registry = TypePairRegistry::new(RegistryOptions::new(initial, growth));
        let (source, destination) = (TypeInfo::of::<u32>(), TypeInfo::of::<String>());

        let mut published = Vec::with_capacity(count);
        for i in 0..count {
            let profile = format!("profile-{i}");
            let mapper = registry
                .get_or_create(source, destination, Some(profile.as_str()), || marker(&profile))
                .unwrap();
            published.push((profile, mapper));
        }

        prop_assert_eq!(registry.len(), count);
        let capacity = registry.capacity();
        prop_assert!(capacity.is_power_of_two());
        prop_assert!(capacity >= initial);
        prop_assert!(capacity >= count * growth.max(2));
        for (profile, mapper) in &published {
            let found = registry.try_get(source, destination, Some(profile.as_str()));
            prop_assert!(found.is_some_and(|found| Arc::ptr_eq(&found, mapper)));
        }
        prop_assert!(registry.try_get(source, destination, None).is_none());
        prop_assert!(registry.try_get(destination, source, Some("profile-0")).is_none());
    }
}
