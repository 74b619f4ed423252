// This module provides the owner of a mapper configuration. A MapperBuilder collects one
// MappingConfig per (source, destination, profile) together with the owner-wide DefaultsConfig
// and RegistryOptions; finalize() freezes them into a Mapper, which owns the Type-Pair Registry.
// Nothing is compiled at finalization: the first request for a pair resolves its configuration
// and synthesizes its routines under the registry's write lock, and every later request is a
// lock-free lookup. The Mapper also serves as the nested mapper facade for the routines it
// compiles; they hold it weakly, so a routine that outlives its owner reports RegistryDropped
// instead of keeping the registry alive. A profiled request with no profiled configuration falls
// back to the pair's unprofiled configuration and shares its cache entry.

//! Mapper ownership and the public entry points.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::{Arc, Weak};

use hashbrown::HashMap;

use crate::config::{DefaultsConfig, MappingConfig, RegistryOptions};
use crate::core::{BuildError, BuildSession, MapError, MapperError, Record, TypeInfo};
use crate::facade::NestedMappers;
use crate::plan::Profile;
use crate::registry::{RegistryStats, TypePairRegistry};
use crate::resolver::resolve;
use crate::synth::{synthesize, CompiledMapper, ErasedMapper};

/// A registered mapping that can be compiled on demand.
pub(crate) trait Blueprint: Send + Sync {
    fn profile(&self) -> Option<&str>;

    fn build(
        &self,
        defaults: &DefaultsConfig,
        facade: Weak<dyn NestedMappers>,
    ) -> Result<Arc<dyn ErasedMapper>, BuildError>;
}

impl<S: Record, D: Record> Blueprint for MappingConfig<S, D> {
    fn profile(&self) -> Option<&str> {
        self.profile_name()
    }

    fn build(
        &self,
        defaults: &DefaultsConfig,
        facade: Weak<dyn NestedMappers>,
    ) -> Result<Arc<dyn ErasedMapper>, BuildError> {
        let mut session = BuildSession::new(pair_name(
            S::type_info(),
            D::type_info(),
            self.profile_name(),
        ));
        let spec = resolve(self, defaults, &mut session)?;
        let compiled = synthesize(spec, facade, &mut session);
        log::debug!("{}: {}", session.pair(), session.stats());
        Ok(Arc::new(compiled))
    }
}

fn pair_name(source: TypeInfo, destination: TypeInfo, profile: Option<&str>) -> String {
    match profile {
        Some(profile) => format!("{source} -> {destination} [{profile}]"),
        None => format!("{source} -> {destination}"),
    }
}

type Blueprints = HashMap<(TypeId, TypeId), Vec<Arc<dyn Blueprint>>>;

/// Collects mapping configurations before the mapper is finalized.
pub struct MapperBuilder {
    blueprints: Blueprints,
    defaults: DefaultsConfig,
    options: RegistryOptions,
}

impl Default for MapperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MapperBuilder {
    pub fn new() -> Self {
        Self {
            blueprints: HashMap::new(),
            defaults: DefaultsConfig::new(),
            options: RegistryOptions::default(),
        }
    }

    /// Register the mapping for `S -> D` under the config's profile.
    ///
    /// A later registration for the same pair and profile replaces the
    /// earlier one.
    pub fn register<S: Record, D: Record>(mut self, config: MappingConfig<S, D>) -> Self {
        let entries = self
            .blueprints
            .entry((TypeId::of::<S>(), TypeId::of::<D>()))
            .or_default();
        if let Some(index) = entries
            .iter()
            .position(|entry| entry.profile() == config.profile_name())
        {
            log::warn!(
                "mapping {} registered twice, keeping the later one",
                pair_name(S::type_info(), D::type_info(), config.profile_name())
            );
            entries.remove(index);
        }
        entries.push(Arc::new(config));
        self
    }

    pub fn defaults(mut self, defaults: DefaultsConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    /// Freeze the configuration. Mappers are compiled on first request.
    pub fn finalize(self) -> Arc<Mapper> {
        let count: usize = self.blueprints.values().map(Vec::len).sum();
        log::debug!("mapper finalized with {count} registered mappings");
        Arc::new_cyclic(|this| Mapper {
            registry: TypePairRegistry::new(self.options),
            blueprints: self.blueprints,
            defaults: self.defaults,
            this: this.clone(),
        })
    }
}

/// Owner of the registry and entry point for mapping calls.
pub struct Mapper {
    registry: TypePairRegistry,
    blueprints: Blueprints,
    defaults: DefaultsConfig,
    this: Weak<Mapper>,
}

impl Mapper {
    pub fn builder() -> MapperBuilder {
        MapperBuilder::new()
    }

    /// Blueprint and the profile it is cached under.
    fn blueprint(
        &self,
        source: TypeInfo,
        destination: TypeInfo,
        profile: Option<&str>,
    ) -> Result<(&dyn Blueprint, Option<&str>), BuildError> {
        let not_registered = || BuildError::NotRegistered {
            pair: pair_name(source, destination, profile),
        };
        let entries = self
            .blueprints
            .get(&(source.id(), destination.id()))
            .ok_or_else(not_registered)?;
        let exact = entries.iter().find(|entry| entry.profile() == profile);
        let chosen = match (exact, profile) {
            (Some(entry), _) => entry,
            (None, Some(_)) => entries
                .iter()
                .find(|entry| entry.profile().is_none())
                .ok_or_else(not_registered)?,
            (None, None) => return Err(not_registered()),
        };
        Ok((chosen.as_ref(), chosen.profile()))
    }

    /// Get or build the type-erased mapper for a pair.
    pub fn erased(
        &self,
        source: TypeInfo,
        destination: TypeInfo,
        profile: Option<&str>,
    ) -> Result<Arc<dyn ErasedMapper>, BuildError> {
        let (blueprint, cached_as) = self.blueprint(source, destination, profile)?;
        self.registry
            .get_or_create(source, destination, cached_as, || {
                let facade: Weak<dyn NestedMappers> = self.this.clone();
                blueprint.build(&self.defaults, facade)
            })
    }

    pub fn mapper<S: Record, D: Record>(&self) -> Result<Arc<CompiledMapper<S, D>>, MapperError> {
        self.mapper_for(None)
    }

    /// Get or build the mapper for `S -> D` under `profile`.
    pub fn mapper_for<S: Record, D: Record>(
        &self,
        profile: Option<&str>,
    ) -> Result<Arc<CompiledMapper<S, D>>, MapperError> {
        let erased = self.erased(S::type_info(), D::type_info(), profile)?;
        Ok(downcast(erased)?)
    }

    /// Already-built mapper for `S -> D`, without building.
    pub fn try_mapper<S: Record, D: Record>(
        &self,
        profile: Option<&str>,
    ) -> Option<Arc<CompiledMapper<S, D>>> {
        let (source, destination) = (S::type_info(), D::type_info());
        let (_, cached_as) = self.blueprint(source, destination, profile).ok()?;
        let erased = self.registry.try_get(source, destination, cached_as)?;
        downcast(erased).ok()
    }

    pub fn update<S: Record, D: Record>(&self, source: &S, destination: &mut D) -> Result<(), MapperError> {
        Ok(self.mapper::<S, D>()?.update(source, destination)?)
    }

    pub fn construct<S: Record, D: Record>(&self, source: &S) -> Result<D, MapperError> {
        Ok(self.mapper::<S, D>()?.construct(source)?)
    }

    pub fn update_with<S: Record, D: Record, P: Any + Send + Sync>(
        &self,
        source: &S,
        destination: &mut D,
        parameter: &P,
    ) -> Result<(), MapperError> {
        Ok(self
            .mapper::<S, D>()?
            .update_with(source, destination, parameter)?)
    }

    pub fn construct_with<S: Record, D: Record, P: Any + Send + Sync>(
        &self,
        source: &S,
        parameter: &P,
    ) -> Result<D, MapperError> {
        Ok(self.mapper::<S, D>()?.construct_with(source, parameter)?)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Profiles registered for `S -> D`; `None` stands for the unprofiled mapping.
    pub fn profiles<S: Record, D: Record>(&self) -> Vec<Option<Profile>> {
        self.blueprints
            .get(&(TypeId::of::<S>(), TypeId::of::<D>()))
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| entry.profile().map(Profile::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn downcast<S: Record, D: Record>(
    erased: Arc<dyn ErasedMapper>,
) -> Result<Arc<CompiledMapper<S, D>>, MapError> {
    erased
        .into_any()
        .downcast::<CompiledMapper<S, D>>()
        .map_err(|_| MapError::TypeMismatch {
            expected: type_name::<CompiledMapper<S, D>>(),
        })
}

impl NestedMappers for Mapper {
    fn nested(
        &self,
        source: TypeInfo,
        target: TypeInfo,
        profile: Option<&str>,
    ) -> Result<Arc<dyn ErasedMapper>, MapError> {
        self.erased(source, target, profile).map_err(|error| match error {
            BuildError::NotRegistered { pair } => MapError::NestedMapperMissing { pair },
            other => MapError::Build(Box::new(other)),
        })
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("pairs", &self.blueprints.len())
            .field("registry", &self.registry)
            .finish()
    }
}
