// This module provides the declarative configuration surface of the mapping compiler. A
// MappingConfig describes one (source, destination, profile) pair: ignored members, explicit
// source overrides (dotted paths, provider closures, nested mappings, constants), per-member
// sentinels, conditions and ordering, converters and constants by member type, a custom
// factory, before/after hooks, a global guard, the name matcher and the calling shapes to
// compile. It is a consuming builder; nothing in it is validated until the resolver consumes
// it, so every problem of one mapping is reported together. DefaultsConfig carries the
// owner-wide fallbacks and RegistryOptions sizes the type-pair registry. All of it is passed
// explicitly to the MapperBuilder; there is no ambient global configuration.

//! Mapping configuration.
//!
//! # Key Types
//!
//! - [`MappingConfig`] - per-pair mapping description
//! - [`DefaultsConfig`] - owner-wide fallbacks
//! - [`NameMatcher`] - member name matching
//! - [`RegistryOptions`] - registry sizing

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use hashbrown::HashMap;

use crate::core::{MapContext, MapError, Mappable, Record, TypeInfo, Value};
use crate::plan::{
    ConditionFn, ConstantValue, Converter, Declared, FactoryFn, HookFn, Profile, ProviderFn,
    Shapes,
};

pub mod converter;
pub mod defaults;
pub mod matcher;

pub use converter::ConverterTable;
pub use defaults::DefaultsConfig;
pub use matcher::NameMatcher;

/// Sizing of the type-pair registry's bucket array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    initial_size: usize,
    growth_factor: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            initial_size: 16,
            growth_factor: 2,
        }
    }
}

impl RegistryOptions {
    /// `initial_size` is raised to at least 1 and `growth_factor` to at least 2.
    pub fn new(initial_size: usize, growth_factor: usize) -> Self {
        Self {
            initial_size: initial_size.max(1),
            growth_factor: growth_factor.max(2),
        }
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn growth_factor(&self) -> usize {
        self.growth_factor
    }
}

/// Explicit source of one destination member.
pub(crate) enum SourceOverride<S, D> {
    Path(String),
    Provider {
        call: Declared<ProviderFn<S, D>>,
        output: TypeInfo,
    },
    Nested {
        path: String,
        profile: Option<Profile>,
    },
    Constant(ConstantValue),
}

/// Everything configured for one destination member.
pub(crate) struct MemberConfig<S, D> {
    pub(crate) name: String,
    pub(crate) ignored: bool,
    pub(crate) sources: Vec<SourceOverride<S, D>>,
    pub(crate) sentinel: Option<ConstantValue>,
    pub(crate) conditions: Vec<Declared<ConditionFn<S, D>>>,
    pub(crate) order: Option<i32>,
}

/// Declarative description of one mapping from `S` to `D`.
pub struct MappingConfig<S, D> {
    pub(crate) profile: Option<Profile>,
    pub(crate) members: Vec<MemberConfig<S, D>>,
    pub(crate) converters: ConverterTable,
    pub(crate) constants: HashMap<TypeId, ConstantValue>,
    pub(crate) sentinels: HashMap<TypeId, ConstantValue>,
    pub(crate) factory: Option<Declared<FactoryFn<S, D>>>,
    pub(crate) before: Vec<Declared<HookFn<S, D>>>,
    pub(crate) after: Vec<Declared<HookFn<S, D>>>,
    pub(crate) guards: Vec<Declared<ConditionFn<S, D>>>,
    pub(crate) matcher: Option<NameMatcher>,
    pub(crate) shapes: Shapes,
}

impl<S: Record, D: Record> Default for MappingConfig<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

fn parameter<'a, P: Any>(ctx: &MapContext<'a>) -> Result<&'a P, MapError> {
    ctx.parameter::<P>().ok_or(MapError::ParameterMissing {
        expected: type_name::<P>(),
    })
}

impl<S: Record, D: Record> MappingConfig<S, D> {
    pub fn new() -> Self {
        Self {
            profile: None,
            members: Vec::new(),
            converters: ConverterTable::new(),
            constants: HashMap::new(),
            sentinels: HashMap::new(),
            factory: None,
            before: Vec::new(),
            after: Vec::new(),
            guards: Vec::new(),
            matcher: None,
            shapes: Shapes::default(),
        }
    }

    fn member(&mut self, name: &str) -> &mut MemberConfig<S, D> {
        let position = match self.members.iter().position(|member| member.name == name) {
            Some(position) => position,
            None => {
                self.members.push(MemberConfig {
                    name: name.to_string(),
                    ignored: false,
                    sources: Vec::new(),
                    sentinel: None,
                    conditions: Vec::new(),
                    order: None,
                });
                self.members.len() - 1
            }
        };
        &mut self.members[position]
    }

    fn provider(mut self, member: &str, call: Declared<ProviderFn<S, D>>, output: TypeInfo) -> Self {
        self.member(member)
            .sources
            .push(SourceOverride::Provider { call, output });
        self
    }

    /// Register this mapping under a named profile.
    pub fn profile(mut self, name: &str) -> Self {
        self.profile = Some(Arc::from(name));
        self
    }

    /// Never assign `member`; an existing value is preserved on update.
    pub fn ignore(mut self, member: &str) -> Self {
        self.member(member).ignored = true;
        self
    }

    /// Read `member` from a dotted source path such as `customer.address.city`.
    pub fn map_path(mut self, member: &str, path: &str) -> Self {
        self.member(member)
            .sources
            .push(SourceOverride::Path(path.to_string()));
        self
    }

    /// Compute `member` from the source.
    pub fn map_from<T, F>(self, member: &str, f: F) -> Self
    where
        T: Mappable,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        let call: ProviderFn<S, D> = Arc::new(move |source: &S, _: &D, _: &mut MapContext<'_>| {
            Ok(Box::new(f(source)) as Value)
        });
        self.provider(member, Declared::plain(call), T::type_info())
    }

    /// Compute `member` from the source and the destination as it stands.
    pub fn map_from_dest<T, F>(self, member: &str, f: F) -> Self
    where
        T: Mappable,
        F: Fn(&S, &D) -> T + Send + Sync + 'static,
    {
        let call: ProviderFn<S, D> =
            Arc::new(move |source: &S, destination: &D, _: &mut MapContext<'_>| {
                Ok(Box::new(f(source, destination)) as Value)
            });
        self.provider(member, Declared::plain(call), T::type_info())
    }

    /// Compute `member` from the source and the auxiliary parameter.
    pub fn map_from_with<P, T, F>(self, member: &str, f: F) -> Self
    where
        P: Any + Send + Sync,
        T: Mappable,
        F: Fn(&S, &P) -> T + Send + Sync + 'static,
    {
        let call: ProviderFn<S, D> =
            Arc::new(move |source: &S, _: &D, ctx: &mut MapContext<'_>| {
                let param = parameter::<P>(ctx)?;
                Ok(Box::new(f(source, param)) as Value)
            });
        self.provider(member, Declared::with_param::<P>(call), T::type_info())
    }

    /// Compute `member` with access to the per-call context.
    pub fn map_from_ctx<T, F>(self, member: &str, f: F) -> Self
    where
        T: Mappable,
        F: Fn(&S, &mut MapContext<'_>) -> T + Send + Sync + 'static,
    {
        let call: ProviderFn<S, D> =
            Arc::new(move |source: &S, _: &D, ctx: &mut MapContext<'_>| {
                Ok(Box::new(f(source, ctx)) as Value)
            });
        self.provider(member, Declared::plain(call), T::type_info())
    }

    /// Map `member` from a source path through the nested mapper for the
    /// two member types, looked up under `profile` (or this mapping's profile).
    pub fn map_nested(mut self, member: &str, path: &str, profile: Option<&str>) -> Self {
        self.member(member).sources.push(SourceOverride::Nested {
            path: path.to_string(),
            profile: profile.map(Arc::from),
        });
        self
    }

    /// Always assign `value` to `member`; the source is never read for it.
    pub fn constant<T: Mappable>(mut self, member: &str, value: T) -> Self {
        self.member(member)
            .sources
            .push(SourceOverride::Constant(ConstantValue::of(value)));
        self
    }

    /// Assign `value` to `member` when its source value is absent.
    pub fn sentinel<T: Mappable>(mut self, member: &str, value: T) -> Self {
        self.member(member).sentinel = Some(ConstantValue::of(value));
        self
    }

    /// Only assign `member` when `predicate` holds; multiple conditions must all hold.
    pub fn condition<F>(mut self, member: &str, predicate: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        let call: ConditionFn<S, D> =
            Arc::new(move |source: &S, _: &D, _: &mut MapContext<'_>| Ok(predicate(source)));
        self.member(member).conditions.push(Declared::plain(call));
        self
    }

    /// Condition that also reads the auxiliary parameter.
    pub fn condition_with<P, F>(mut self, member: &str, predicate: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&S, &P) -> bool + Send + Sync + 'static,
    {
        let call: ConditionFn<S, D> =
            Arc::new(move |source: &S, _: &D, ctx: &mut MapContext<'_>| {
                Ok(predicate(source, parameter::<P>(ctx)?))
            });
        self.member(member)
            .conditions
            .push(Declared::with_param::<P>(call));
        self
    }

    /// Explicit assignment priority; lower runs first, ties keep declaration order.
    pub fn order(mut self, member: &str, order: i32) -> Self {
        self.member(member).order = Some(order);
        self
    }

    /// Converter for a member type pair, preferred over the defaults.
    pub fn converter(mut self, converter: Converter) -> Self {
        self.converters.insert(converter);
        self
    }

    /// Constant for every member of type `T` in this mapping.
    pub fn constant_for<T: Mappable>(mut self, value: T) -> Self {
        self.constants
            .insert(TypeId::of::<T>(), ConstantValue::of(value));
        self
    }

    /// Sentinel for every member of type `T` in this mapping.
    pub fn sentinel_for<T: Mappable>(mut self, value: T) -> Self {
        self.sentinels
            .insert(TypeId::of::<T>(), ConstantValue::of(value));
        self
    }

    /// Construct destinations from the source instead of `D::default()`.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&S) -> D + Send + Sync + 'static,
    {
        let call: FactoryFn<S, D> =
            Arc::new(move |source: &S, _: &mut MapContext<'_>| Ok(factory(source)));
        self.factory = Some(Declared::plain(call));
        self
    }

    /// Factory that also reads the auxiliary parameter.
    pub fn factory_with<P, F>(mut self, factory: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&S, &P) -> D + Send + Sync + 'static,
    {
        let call: FactoryFn<S, D> = Arc::new(move |source: &S, ctx: &mut MapContext<'_>| {
            Ok(factory(source, parameter::<P>(ctx)?))
        });
        self.factory = Some(Declared::with_param::<P>(call));
        self
    }

    /// Hook run before any member is assigned.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &mut D) + Send + Sync + 'static,
    {
        self.before.push(Declared::plain(plain_hook(hook)));
        self
    }

    /// Before-hook that also reads the auxiliary parameter.
    pub fn before_with<P, F>(mut self, hook: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&S, &mut D, &P) + Send + Sync + 'static,
    {
        self.before.push(Declared::with_param::<P>(param_hook(hook)));
        self
    }

    /// Before-hook with access to the per-call context.
    pub fn before_ctx<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &mut D, &mut MapContext<'_>) + Send + Sync + 'static,
    {
        self.before.push(Declared::plain(context_hook(hook)));
        self
    }

    /// Hook run after every member is assigned.
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &mut D) + Send + Sync + 'static,
    {
        self.after.push(Declared::plain(plain_hook(hook)));
        self
    }

    /// After-hook that also reads the auxiliary parameter.
    pub fn after_with<P, F>(mut self, hook: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&S, &mut D, &P) + Send + Sync + 'static,
    {
        self.after.push(Declared::with_param::<P>(param_hook(hook)));
        self
    }

    /// After-hook with access to the per-call context.
    pub fn after_ctx<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S, &mut D, &mut MapContext<'_>) + Send + Sync + 'static,
    {
        self.after.push(Declared::plain(context_hook(hook)));
        self
    }

    /// Skip every member assignment unless `predicate` holds; hooks still run.
    pub fn guard<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        let call: ConditionFn<S, D> =
            Arc::new(move |source: &S, _: &D, _: &mut MapContext<'_>| Ok(predicate(source)));
        self.guards.push(Declared::plain(call));
        self
    }

    /// Name matcher for this mapping, replacing the default one.
    pub fn matcher(mut self, matcher: NameMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Calling shapes to compile.
    pub fn shapes(mut self, shapes: Shapes) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn profile_name(&self) -> Option<&str> {
        self.profile.as_deref()
    }
}

fn plain_hook<S: Record, D: Record, F>(hook: F) -> HookFn<S, D>
where
    F: Fn(&S, &mut D) + Send + Sync + 'static,
{
    Arc::new(move |source: &S, destination: &mut D, _: &mut MapContext<'_>| {
        hook(source, destination);
        Ok(())
    })
}

fn param_hook<S: Record, D: Record, P, F>(hook: F) -> HookFn<S, D>
where
    P: Any + Send + Sync,
    F: Fn(&S, &mut D, &P) + Send + Sync + 'static,
{
    Arc::new(move |source: &S, destination: &mut D, ctx: &mut MapContext<'_>| {
        hook(source, destination, parameter::<P>(ctx)?);
        Ok(())
    })
}

fn context_hook<S: Record, D: Record, F>(hook: F) -> HookFn<S, D>
where
    F: Fn(&S, &mut D, &mut MapContext<'_>) + Send + Sync + 'static,
{
    Arc::new(move |source: &S, destination: &mut D, ctx: &mut MapContext<'_>| {
        hook(source, destination, ctx);
        Ok(())
    })
}
