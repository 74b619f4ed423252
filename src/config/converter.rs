//! Converter tables keyed by `(source type, target type)`.

use std::any::TypeId;

use hashbrown::HashMap;

use crate::core::TypeInfo;
use crate::plan::Converter;

/// Converters registered for exact member type pairs.
#[derive(Debug, Clone, Default)]
pub struct ConverterTable {
    entries: HashMap<(TypeId, TypeId), Converter>,
}

impl ConverterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter; a later one for the same pair replaces the earlier.
    pub fn insert(&mut self, converter: Converter) {
        let key = (converter.source().id(), converter.target().id());
        self.entries.insert(key, converter);
    }

    /// Converter for exactly this pair.
    pub fn get(&self, source: TypeInfo, target: TypeInfo) -> Option<&Converter> {
        self.entries.get(&(source.id(), target.id()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
