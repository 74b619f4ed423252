//! Nested mapper lookup.
//!
//! Compiled routines reach the mappers of their nested members through this
//! trait instead of the registry itself, so a sub-mapper that does not exist
//! yet is built on first use.

use std::sync::Arc;

use crate::core::{MapError, Record, TypeInfo};
use crate::synth::{CompiledMapper, ErasedMapper};

/// Lookup of sub-mappers by type pair.
pub trait NestedMappers: Send + Sync {
    /// Get, building if needed, the mapper for `source -> target`.
    fn nested(
        &self,
        source: TypeInfo,
        target: TypeInfo,
        profile: Option<&str>,
    ) -> Result<Arc<dyn ErasedMapper>, MapError>;
}

impl<'a> dyn NestedMappers + 'a {
    /// Typed form of [`NestedMappers::nested`].
    pub fn get_callable<S: Record, D: Record>(
        &self,
        profile: Option<&str>,
    ) -> Result<Arc<CompiledMapper<S, D>>, MapError> {
        let mapper = self.nested(TypeInfo::of::<S>(), TypeInfo::of::<D>(), profile)?;
        mapper
            .into_any()
            .downcast::<CompiledMapper<S, D>>()
            .map_err(|_| MapError::TypeMismatch {
                expected: std::any::type_name::<CompiledMapper<S, D>>(),
            })
    }
}
