//! Owner-wide fallbacks consulted when a mapping has no specific value.

use std::any::TypeId;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::core::{Mappable, TypeInfo, Value};
use crate::plan::{ConstantValue, Converter, FallbackFactoryFn};

use super::converter::ConverterTable;
use super::matcher::NameMatcher;

/// Fallback converters, operators, constants, sentinels and factories.
#[derive(Clone, Default)]
pub struct DefaultsConfig {
    converters: ConverterTable,
    operators: ConverterTable,
    constants: HashMap<TypeId, ConstantValue>,
    sentinels: HashMap<TypeId, ConstantValue>,
    factories: HashMap<TypeId, FallbackFactoryFn>,
    matcher: NameMatcher,
}

impl DefaultsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fallback converter for a member type pair.
    pub fn converter(mut self, converter: Converter) -> Self {
        self.converters.insert(converter);
        self
    }

    /// Conversion operator backed by `B: From<A>`.
    pub fn operator<A, B>(mut self) -> Self
    where
        A: Mappable,
        B: Mappable + From<A>,
    {
        self.operators.insert(Converter::from_impl::<A, B>());
        self
    }

    /// Constant assigned to every member of type `T`.
    pub fn constant_for<T: Mappable>(mut self, value: T) -> Self {
        self.constants
            .insert(TypeId::of::<T>(), ConstantValue::of(value));
        self
    }

    /// Value substituted when a source for a member of type `T` is absent.
    pub fn sentinel_for<T: Mappable>(mut self, value: T) -> Self {
        self.sentinels
            .insert(TypeId::of::<T>(), ConstantValue::of(value));
        self
    }

    /// Factory used to construct destinations of type `D`.
    pub fn factory_for<D, F>(mut self, factory: F) -> Self
    where
        D: Mappable,
        F: Fn() -> D + Send + Sync + 'static,
    {
        let factory: FallbackFactoryFn = Arc::new(move || Box::new(factory()) as Value);
        self.factories.insert(TypeId::of::<D>(), factory);
        self
    }

    /// Name matcher for mappings that do not set their own.
    pub fn matcher(mut self, matcher: NameMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn converters(&self) -> &ConverterTable {
        &self.converters
    }

    pub fn operators(&self) -> &ConverterTable {
        &self.operators
    }

    pub fn constant(&self, ty: TypeInfo) -> Option<&ConstantValue> {
        self.constants.get(&ty.id())
    }

    pub fn sentinel(&self, ty: TypeInfo) -> Option<&ConstantValue> {
        self.sentinels.get(&ty.id())
    }

    pub fn factory(&self, ty: TypeInfo) -> Option<&FallbackFactoryFn> {
        self.factories.get(&ty.id())
    }

    pub fn name_matcher(&self) -> NameMatcher {
        self.matcher
    }
}
