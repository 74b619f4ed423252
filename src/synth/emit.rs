//! Lowering of conversion trees and member plans into closures.
//!
//! Every node of a [`Conversion`] tree becomes one boxed closure over the fn
//! pointers and converters captured at build time. A lowered conversion
//! returns `Ok(None)` when the value is absent (an empty `Option` on the
//! way), which the member assignment turns into the sentinel or zero value.

use std::any::{type_name, Any};
use std::sync::{Arc, OnceLock, Weak};

use crate::core::{
    view, EnumShape, MapContext, MapError, Primitive, Scalar, ScalarFault, TypeInfo, Value,
};
use crate::core::record::Setter;
use crate::facade::NestedMappers;
use crate::plan::{
    ConditionFn, ConstantValue, Conversion, MemberPlan, NestedCoordinates, SourceAccessor,
};
use crate::synth::compiled::ErasedMapper;

/// A lowered conversion.
pub(crate) type Lowered =
    Arc<dyn Fn(&dyn Any, &mut MapContext<'_>) -> Result<Option<Value>, MapError> + Send + Sync>;

/// How lowered nested conversions reach their sub-mappers.
#[derive(Clone)]
pub(crate) struct NestedLink {
    facade: Weak<dyn NestedMappers>,
    /// Hand the auxiliary parameter on to nested mappers.
    thread_param: bool,
}

impl NestedLink {
    pub(crate) fn new(facade: Weak<dyn NestedMappers>, thread_param: bool) -> Self {
        Self {
            facade,
            thread_param,
        }
    }

    /// Link that never resolves; used for build-time constant evaluation.
    pub(crate) fn detached() -> Self {
        let facade: Weak<dyn NestedMappers> = Weak::<Detached>::new();
        Self::new(facade, false)
    }
}

struct Detached;

impl NestedMappers for Detached {
    fn nested(
        &self,
        _: TypeInfo,
        _: TypeInfo,
        _: Option<&str>,
    ) -> Result<Arc<dyn ErasedMapper>, MapError> {
        Err(MapError::RegistryDropped)
    }
}

fn conversion_fault(from: &'static str, to: &'static str, fault: ScalarFault) -> MapError {
    MapError::Conversion {
        from,
        to,
        reason: fault.to_string(),
    }
}

fn lowered<F>(f: F) -> Lowered
where
    F: Fn(&dyn Any, &mut MapContext<'_>) -> Result<Option<Value>, MapError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn mismatch<T>(ty: TypeInfo) -> impl FnOnce(T) -> MapError {
    move |_| MapError::TypeMismatch {
        expected: ty.name(),
    }
}

/// Lower a conversion tree.
pub(crate) fn lower(conversion: &Conversion, link: &NestedLink) -> Lowered {
    match conversion {
        Conversion::PassThrough(ty) => {
            let ty = *ty;
            lowered(move |value, _| {
                ty.clone_value(value)
                    .map(Some)
                    .ok_or(MapError::TypeMismatch {
                        expected: ty.name(),
                    })
            })
        }
        Conversion::Converter(converter) | Conversion::Operator(converter) => {
            let converter = converter.clone();
            lowered(move |value, ctx| converter.apply(value, ctx).map(Some))
        }
        Conversion::Primitive { from, to } => {
            let (from, to) = (*from, *to);
            lowered(move |value, _| match to.cast_from(from, value) {
                Ok(Some(out)) => Ok(Some(out)),
                Ok(None) => Err(MapError::TypeMismatch {
                    expected: from.name(),
                }),
                Err(fault) => Err(conversion_fault(from.name(), to.name(), fault)),
            })
        }
        Conversion::FromEnum { shape, to } => {
            let (shape, to) = (*shape, *to);
            lowered(move |value, _| from_enum(shape, to, value).map(Some))
        }
        Conversion::ToEnum { from, shape } => {
            let (from, shape) = (*from, *shape);
            lowered(move |value, _| to_enum(from, shape, value).map(Some))
        }
        Conversion::EnumToEnum { from, to } => {
            let (from, to) = (*from, *to);
            lowered(move |value, _| {
                let name = (from.name_of)(value).ok_or(MapError::TypeMismatch {
                    expected: "enum",
                })?;
                (to.from_name)(name).map(Some).ok_or_else(|| MapError::Conversion {
                    from: "enum",
                    to: "enum",
                    reason: format!("no variant named {name}"),
                })
            })
        }
        Conversion::Unwrap { shape, then } => {
            let shape = *shape;
            let then = lower(then, link);
            lowered(move |value, ctx| match (shape.unwrap_ref)(value) {
                Some(inner) => then(inner, ctx),
                None => Ok(None),
            })
        }
        Conversion::Wrap { then, shape } => {
            let shape = *shape;
            let inner_ty = (shape.inner)();
            let then = lower(then, link);
            lowered(move |value, ctx| match then(value, ctx)? {
                Some(inner) => (shape.wrap)(inner)
                    .map(Some)
                    .map_err(mismatch(inner_ty)),
                None => Ok(None),
            })
        }
        Conversion::WrapSource {
            source,
            shape,
            then,
        } => {
            let (source, shape) = (*source, *shape);
            let then = lower(then, link);
            lowered(move |value, ctx| {
                let owned = source.clone_value(value).ok_or(MapError::TypeMismatch {
                    expected: source.name(),
                })?;
                let wrapped = (shape.wrap)(owned).map_err(mismatch(source))?;
                then(view(&wrapped), ctx)
            })
        }
        Conversion::Elements { from, to, element } => {
            let (from, to) = (*from, *to);
            let (from_ty, to_ty) = ((from.element)(), (to.element)());
            let element = lower(element, link);
            lowered(move |value, ctx| {
                let items = (from.elements)(value).ok_or(MapError::TypeMismatch {
                    expected: from_ty.name(),
                })?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(element(item, ctx)?.unwrap_or_else(|| to_ty.zero()));
                }
                (to.collect)(out).map(Some).ok_or(MapError::TypeMismatch {
                    expected: to_ty.name(),
                })
            })
        }
        Conversion::Nested(coordinates) => lower_nested(coordinates.clone(), link.clone()),
    }
}

fn from_enum(shape: EnumShape, to: Primitive, value: &dyn Any) -> Result<Value, MapError> {
    if to == Primitive::Text {
        let name = (shape.name_of)(value).ok_or(MapError::TypeMismatch { expected: "enum" })?;
        return Ok(Box::new(name.to_string()) as Value);
    }
    let underlying =
        (shape.underlying)(value).ok_or(MapError::TypeMismatch { expected: "enum" })?;
    to.write(Scalar::Int(i128::from(underlying)))
        .map_err(|fault| conversion_fault("enum", to.name(), fault))
}

fn to_enum(from: Primitive, shape: EnumShape, value: &dyn Any) -> Result<Value, MapError> {
    if from == Primitive::Text {
        let name = value
            .downcast_ref::<String>()
            .ok_or(MapError::TypeMismatch {
                expected: type_name::<String>(),
            })?;
        return (shape.from_name)(name).ok_or_else(|| MapError::Conversion {
            from: from.name(),
            to: "enum",
            reason: format!("no variant named {name:?}"),
        });
    }
    let scalar = from.read(value).ok_or(MapError::TypeMismatch {
        expected: from.name(),
    })?;
    let wide = scalar
        .to_int(Primitive::I64)
        .map_err(|fault| conversion_fault(from.name(), "enum", fault))?;
    i64::try_from(wide)
        .ok()
        .and_then(shape.from_underlying)
        .ok_or_else(|| MapError::Conversion {
            from: from.name(),
            to: "enum",
            reason: format!("no variant with value {wide}"),
        })
}

fn lower_nested(coordinates: NestedCoordinates, link: NestedLink) -> Lowered {
    let slot: OnceLock<Arc<dyn ErasedMapper>> = OnceLock::new();
    lowered(move |value, ctx| {
        let mapper = match slot.get() {
            Some(mapper) => mapper.clone(),
            None => {
                let facade = link.facade.upgrade().ok_or(MapError::RegistryDropped)?;
                let found = facade.nested(
                    coordinates.source,
                    coordinates.target,
                    coordinates.profile.as_deref(),
                )?;
                slot.get_or_init(|| found).clone()
            }
        };
        let param = if link.thread_param {
            ctx.raw_parameter()
        } else {
            None
        };
        mapper.construct_erased(value, param)
    })
}

/// Convert a constant once, at build time.
pub(crate) fn convert_constant(
    conversion: &Conversion,
    value: &ConstantValue,
    target: TypeInfo,
) -> Result<ConstantValue, String> {
    if conversion.is_nested() {
        return Err("a nested mapping cannot produce a constant".to_string());
    }
    let lowered = lower(conversion, &NestedLink::detached());
    let produced = value.produce();
    let converted = lowered(view(&produced), &mut MapContext::detached())
        .map_err(|error| error.to_string())?
        .ok_or_else(|| "the value is absent".to_string())?;
    ConstantValue::from_value(target, converted)
        .ok_or_else(|| format!("conversion did not produce {target}"))
}

/// Where an assignment's value comes from.
enum ValueSource<S, D> {
    Constant(ConstantValue),
    Read {
        accessor: SourceAccessor<S, D>,
        convert: Lowered,
    },
}

/// One lowered member assignment.
pub(crate) struct Assignment<S, D> {
    name: &'static str,
    ty: TypeInfo,
    set: Setter<D>,
    guard: Option<ConditionFn<S, D>>,
    value: ValueSource<S, D>,
    /// Substituted when the source value is absent.
    fallback: Option<ConstantValue>,
}

impl<S, D> Assignment<S, D> {
    /// `None` for a plan with neither a constant nor a source and conversion.
    pub(crate) fn new(plan: MemberPlan<S, D>, link: &NestedLink) -> Option<Self> {
        let value = match (plan.constant, plan.source, plan.conversion) {
            (Some(constant), _, _) => ValueSource::Constant(constant),
            (None, Some(accessor), Some(conversion)) => ValueSource::Read {
                accessor,
                convert: lower(&conversion, link),
            },
            _ => return None,
        };
        Some(Self {
            name: plan.target.name,
            ty: plan.target.ty,
            set: plan.target.set,
            guard: plan.guard,
            value,
            fallback: plan.sentinel,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Assign the member on `destination`, unless its guard fails.
    pub(crate) fn apply(
        &self,
        source: &S,
        destination: &mut D,
        ctx: &mut MapContext<'_>,
    ) -> Result<(), MapError> {
        if let Some(guard) = &self.guard {
            if !guard(source, destination, ctx)? {
                return Ok(());
            }
        }

        let value = match &self.value {
            ValueSource::Constant(constant) => constant.produce(),
            ValueSource::Read { accessor, convert } => {
                let converted = match accessor {
                    SourceAccessor::Path(path) => match path.resolve(source) {
                        Some(raw) => convert(raw, ctx)?,
                        None => None,
                    },
                    SourceAccessor::Provider { call, .. } => {
                        let raw = call(source, destination, ctx)?;
                        convert(view(&raw), ctx)?
                    }
                };
                match converted {
                    Some(value) => value,
                    None => match &self.fallback {
                        Some(sentinel) => sentinel.produce(),
                        None => self.ty.zero(),
                    },
                }
            }
        };

        (self.set)(destination, value).map_err(mismatch(self.ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConverterTable, DefaultsConfig};
    use crate::resolver::conversion::ConversionScope;
    use crate::Mappable;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum Color {
        #[default]
        Red,
        Green,
    }

    crate::enumeration!(Color { Red = 1, Green = 2 });

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum Hue {
        #[default]
        Red,
        Green,
    }

    crate::enumeration!(Hue { Red = 10, Green = 20 });

    fn run<A: Mappable, B: Mappable>(value: A) -> Result<Option<B>, MapError> {
        let (mapping, defaults) = (ConverterTable::new(), DefaultsConfig::new());
        let conversion = ConversionScope::new(&mapping, &defaults, None)
            .resolve(A::type_info(), B::type_info())
            .unwrap();
        let lowered = lower(&conversion, &NestedLink::detached());
        let out = lowered(&value, &mut MapContext::detached())?;
        Ok(out.map(|out| *out.downcast::<B>().unwrap()))
    }

    #[test]
    fn test_enum_conversions() {
        assert_eq!(run::<Color, i32>(Color::Green).unwrap(), Some(2));
        assert_eq!(run::<Color, String>(Color::Green).unwrap(), Some("Green".to_string()));
        assert_eq!(run::<u8, Color>(1).unwrap(), Some(Color::Red));
        assert_eq!(run::<String, Color>("Green".into()).unwrap(), Some(Color::Green));
        assert_eq!(run::<Color, Hue>(Color::Green).unwrap(), Some(Hue::Green));
        assert!(matches!(run::<i64, Color>(7), Err(MapError::Conversion { .. })));
    }

    #[test]
    fn test_option_unwrap_and_wrap() {
        assert_eq!(run::<Option<i32>, String>(Some(4)).unwrap(), Some("4".to_string()));
        assert_eq!(run::<Option<i32>, String>(None).unwrap(), None);
        assert_eq!(run::<i32, Option<i64>>(4).unwrap(), Some(Some(4)));
        assert_eq!(run::<Option<u8>, Option<u8>>(None).unwrap(), Some(None));
    }

    #[test]
    fn test_elements_fill_absent_with_zero() {
        let out = run::<Vec<Option<i32>>, Vec<String>>(vec![Some(1), None, Some(3)]).unwrap();
        assert_eq!(out, Some(vec!["1".to_string(), String::new(), "3".to_string()]));
    }

    #[test]
    fn test_primitive_fault_names_types() {
        let error = run::<i32, u8>(300).unwrap_err();
        assert_eq!(
            error.to_string(),
            "cannot convert i32 to u8: 300 is out of range for u8"
        );
    }

    #[test]
    fn test_constant_conversion() {
        let (mapping, defaults) = (ConverterTable::new(), DefaultsConfig::new());
        let scope = ConversionScope::new(&mapping, &defaults, None);
        let target = TypeInfo::of::<Option<u16>>();
        let conversion = scope.resolve(TypeInfo::of::<i32>(), target).unwrap();

        let fitted = convert_constant(&conversion, &ConstantValue::of(9i32), target).unwrap();
        assert_eq!(fitted.produce().downcast_ref::<Option<u16>>(), Some(&Some(9)));

        let failed = convert_constant(&conversion, &ConstantValue::of(-9i32), target);
        assert!(failed.unwrap_err().contains("out of range"));
    }
}
