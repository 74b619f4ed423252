//! Conversion path resolution between member types.
//!
//! Lookup order for a `(source, target)` pair:
//!
//! 1. identical types pass through;
//! 2. user converters, mapping table before defaults, through the nullable
//!    fallback chain;
//! 3. conversion operators (`From` impls) through the same chain;
//! 4. built-in conversions: `Option` unwrap/wrap, the primitive table, enums,
//!    element-wise sequences and nested records.
//!
//! The fallback chain tries the exact pair, then source without `Option`,
//! destination without `Option`, both without `Option`, and finally the
//! source wrapped in `Option`.

use crate::config::{ConverterTable, DefaultsConfig};
use crate::core::{Primitive, TypeInfo, TypeKind};
use crate::plan::{Conversion, NestedCoordinates, Profile};

/// Converter tables and profile visible to one mapping.
pub(crate) struct ConversionScope<'a> {
    mapping: &'a ConverterTable,
    defaults: &'a DefaultsConfig,
    profile: Option<Profile>,
}

impl<'a> ConversionScope<'a> {
    pub(crate) fn new(
        mapping: &'a ConverterTable,
        defaults: &'a DefaultsConfig,
        profile: Option<Profile>,
    ) -> Self {
        Self {
            mapping,
            defaults,
            profile,
        }
    }

    /// Conversion from `source` to `target`, or `None` when no path exists.
    pub(crate) fn resolve(&self, source: TypeInfo, target: TypeInfo) -> Option<Conversion> {
        if source == target {
            return Some(Conversion::PassThrough(source));
        }

        let converter = |from: TypeInfo, to: TypeInfo| {
            self.mapping
                .get(from, to)
                .or_else(|| self.defaults.converters().get(from, to))
                .cloned()
                .map(Conversion::Converter)
        };
        if let Some(found) = chain(source, target, true, converter) {
            return Some(found);
        }

        let operator = |from: TypeInfo, to: TypeInfo| {
            self.defaults
                .operators()
                .get(from, to)
                .cloned()
                .map(Conversion::Operator)
        };
        if let Some(found) = chain(source, target, false, operator) {
            return Some(found);
        }

        self.builtin(source, target)
    }

    /// Nested-only conversion for an explicit nested mapping, looking
    /// through `Option` and `Vec` on either side.
    pub(crate) fn nested(
        &self,
        source: TypeInfo,
        target: TypeInfo,
        profile: Option<Profile>,
    ) -> Option<Conversion> {
        match (source.nullable_shape(), target.nullable_shape()) {
            (Some(from), Some(to)) => {
                let inner = self.nested((from.inner)(), (to.inner)(), profile)?;
                return Some(Conversion::Unwrap {
                    shape: from,
                    then: Box::new(Conversion::Wrap {
                        then: Box::new(inner),
                        shape: to,
                    }),
                });
            }
            (Some(from), None) => {
                let inner = self.nested((from.inner)(), target, profile)?;
                return Some(Conversion::Unwrap {
                    shape: from,
                    then: Box::new(inner),
                });
            }
            (None, Some(to)) => {
                let inner = self.nested(source, (to.inner)(), profile)?;
                return Some(Conversion::Wrap {
                    then: Box::new(inner),
                    shape: to,
                });
            }
            (None, None) => {}
        }

        match (source.kind(), target.kind()) {
            (TypeKind::Sequence(from), TypeKind::Sequence(to)) => {
                let element = self.nested((from.element)(), (to.element)(), profile)?;
                Some(Conversion::Elements {
                    from,
                    to,
                    element: Box::new(element),
                })
            }
            (TypeKind::Record(_), TypeKind::Record(_)) => {
                Some(Conversion::Nested(NestedCoordinates {
                    source,
                    target,
                    profile,
                }))
            }
            _ => None,
        }
    }

    fn builtin(&self, source: TypeInfo, target: TypeInfo) -> Option<Conversion> {
        match (source.nullable_shape(), target.nullable_shape()) {
            (Some(from), Some(to)) => {
                let inner = self.resolve((from.inner)(), (to.inner)())?;
                return Some(Conversion::Unwrap {
                    shape: from,
                    then: Box::new(Conversion::Wrap {
                        then: Box::new(inner),
                        shape: to,
                    }),
                });
            }
            (Some(from), None) => {
                let inner = self.resolve((from.inner)(), target)?;
                return Some(Conversion::Unwrap {
                    shape: from,
                    then: Box::new(inner),
                });
            }
            (None, Some(to)) => {
                let inner = self.resolve(source, (to.inner)())?;
                return Some(Conversion::Wrap {
                    then: Box::new(inner),
                    shape: to,
                });
            }
            (None, None) => {}
        }

        match (source.kind(), target.kind()) {
            (TypeKind::Primitive(from), TypeKind::Primitive(to)) if from.converts_to(to) => {
                Some(Conversion::Primitive { from, to })
            }
            (TypeKind::Enum(shape), TypeKind::Primitive(to))
                if to == Primitive::Text || to.is_integral() =>
            {
                Some(Conversion::FromEnum { shape, to })
            }
            (TypeKind::Primitive(from), TypeKind::Enum(shape))
                if from == Primitive::Text || from.is_integral() =>
            {
                Some(Conversion::ToEnum { from, shape })
            }
            (TypeKind::Enum(from), TypeKind::Enum(to)) => Some(Conversion::EnumToEnum { from, to }),
            (TypeKind::Sequence(from), TypeKind::Sequence(to)) => {
                let element = self.resolve((from.element)(), (to.element)())?;
                Some(Conversion::Elements {
                    from,
                    to,
                    element: Box::new(element),
                })
            }
            (TypeKind::Record(_), TypeKind::Record(_)) => {
                Some(Conversion::Nested(NestedCoordinates {
                    source,
                    target,
                    profile: self.profile.clone(),
                }))
            }
            _ => None,
        }
    }
}

/// Walk the nullable fallback chain with `lookup`.
fn chain<F>(source: TypeInfo, target: TypeInfo, wrap_source: bool, lookup: F) -> Option<Conversion>
where
    F: Fn(TypeInfo, TypeInfo) -> Option<Conversion>,
{
    if let Some(found) = lookup(source, target) {
        return Some(found);
    }

    let from = source.nullable_shape();
    let to = target.nullable_shape();

    if let Some(shape) = from {
        if let Some(found) = lookup(source.unwrapped(), target) {
            return Some(Conversion::Unwrap {
                shape,
                then: Box::new(found),
            });
        }
    }

    if let Some(shape) = to {
        if let Some(found) = lookup(source, target.unwrapped()) {
            return Some(Conversion::Wrap {
                then: Box::new(found),
                shape,
            });
        }
    }

    if let (Some(from), Some(to)) = (from, to) {
        if let Some(found) = lookup(source.unwrapped(), target.unwrapped()) {
            return Some(Conversion::Unwrap {
                shape: from,
                then: Box::new(Conversion::Wrap {
                    then: Box::new(found),
                    shape: to,
                }),
            });
        }
    }

    if wrap_source && from.is_none() {
        let wrapped = source.wrapped()?;
        let shape = wrapped.nullable_shape()?;
        if let Some(found) = lookup(wrapped, target) {
            return Some(Conversion::WrapSource {
                source,
                shape,
                then: Box::new(found),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Converter;

    fn scope<'a>(mapping: &'a ConverterTable, defaults: &'a DefaultsConfig) -> ConversionScope<'a> {
        ConversionScope::new(mapping, defaults, None)
    }

    #[test]
    fn test_identical_types_pass_through() {
        let (mapping, defaults) = (ConverterTable::new(), DefaultsConfig::new());
        let found = scope(&mapping, &defaults)
            .resolve(TypeInfo::of::<String>(), TypeInfo::of::<String>())
            .unwrap();
        assert!(matches!(found, Conversion::PassThrough(_)));
    }

    #[test]
    fn test_mapping_converter_wins_over_defaults() {
        let mut mapping = ConverterTable::new();
        mapping.insert(Converter::new(|value: &i32| format!("mapping {value}")));
        let defaults =
            DefaultsConfig::new().converter(Converter::new(|value: &i32| format!("default {value}")));

        let found = scope(&mapping, &defaults)
            .resolve(TypeInfo::of::<i32>(), TypeInfo::of::<String>())
            .unwrap();
        let Conversion::Converter(converter) = found else {
            panic!("expected a converter");
        };
        let out = converter
            .apply(&1i32, &mut crate::core::MapContext::detached())
            .unwrap();
        assert_eq!(out.downcast_ref::<String>().unwrap(), "mapping 1");
    }

    #[test]
    fn test_fallback_chain_order() {
        let mapping = ConverterTable::new();
        let defaults = DefaultsConfig::new()
            .converter(Converter::new(|value: &i32| value.to_string()))
            .converter(Converter::new(|value: &Option<u8>| value.is_some()));
        let scope = scope(&mapping, &defaults);

        let unwrap_source = scope
            .resolve(TypeInfo::of::<Option<i32>>(), TypeInfo::of::<String>())
            .unwrap();
        assert!(matches!(
            unwrap_source,
            Conversion::Unwrap { ref then, .. } if matches!(**then, Conversion::Converter(_))
        ));

        let unwrap_target = scope
            .resolve(TypeInfo::of::<i32>(), TypeInfo::of::<Option<String>>())
            .unwrap();
        assert!(matches!(unwrap_target, Conversion::Wrap { .. }));

        let both = scope
            .resolve(TypeInfo::of::<Option<i32>>(), TypeInfo::of::<Option<String>>())
            .unwrap();
        assert!(matches!(both, Conversion::Unwrap { ref then, .. } if matches!(**then, Conversion::Wrap { .. })));

        let wrap_source = scope
            .resolve(TypeInfo::of::<u8>(), TypeInfo::of::<bool>())
            .unwrap();
        assert!(matches!(wrap_source, Conversion::WrapSource { .. }));
    }

    #[test]
    fn test_operator_before_builtin_table() {
        let mapping = ConverterTable::new();
        let defaults = DefaultsConfig::new().operator::<u8, u64>();
        let found = scope(&mapping, &defaults)
            .resolve(TypeInfo::of::<u8>(), TypeInfo::of::<u64>())
            .unwrap();
        assert!(matches!(found, Conversion::Operator(_)));

        let builtin = scope(&mapping, &defaults)
            .resolve(TypeInfo::of::<u16>(), TypeInfo::of::<u64>())
            .unwrap();
        assert!(matches!(builtin, Conversion::Primitive { .. }));
    }

    #[test]
    fn test_unsupported_primitive_pair_has_no_path() {
        let (mapping, defaults) = (ConverterTable::new(), DefaultsConfig::new());
        assert!(scope(&mapping, &defaults)
            .resolve(TypeInfo::of::<f64>(), TypeInfo::of::<char>())
            .is_none());
    }

    #[test]
    fn test_sequences_map_element_wise() {
        let (mapping, defaults) = (ConverterTable::new(), DefaultsConfig::new());
        let found = scope(&mapping, &defaults)
            .resolve(TypeInfo::of::<Vec<i32>>(), TypeInfo::of::<Vec<String>>())
            .unwrap();
        let Conversion::Elements { element, .. } = found else {
            panic!("expected element-wise conversion");
        };
        assert!(matches!(*element, Conversion::Primitive { .. }));
    }
}
