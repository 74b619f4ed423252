// This module defines the Member Resolution Model, the small intermediate representation that
// sits between the specification resolver and the routine synthesizer. A MappingSpecification
// is the fully resolved, ordered plan for one (source, destination, profile) pair: an ordered
// list of MemberPlan entries, the chosen factory, the before/after hooks, the global guard, the
// auxiliary parameter type and the set of calling shapes to compile. Each MemberPlan names its
// target member, its Strategy, how its source value is obtained (a member path or a provider)
// and the Conversion tree that turns the source value into the target type. The model is pure
// data: it holds callables captured from the configuration but never runs them, and it has no
// dependency on the registry or the synthesizer.

//! Member Resolution Model.
//!
//! # Key Types
//!
//! - [`MappingSpecification`] - resolved plan for one type pair
//! - [`MemberPlan`] - how one destination member is produced
//! - [`Conversion`] - tree of conversion steps from source to target type
//! - [`SourceAccessor`] - member path or provider function

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::core::record::{Getter, Setter};
use crate::core::{
    EnumShape, MapContext, MapError, Mappable, NullableShape, Primitive, SequenceShape, TypeInfo,
    Value,
};

pub mod converter;

pub use crate::core::session::Strategy;
pub use converter::{ConvertFn, Converter};

/// Name of a mapping profile.
pub type Profile = Arc<str>;

/// Hook run before or after member assignment.
pub type HookFn<S, D> =
    Arc<dyn Fn(&S, &mut D, &mut MapContext<'_>) -> Result<(), MapError> + Send + Sync>;

/// Provider producing a member's source value.
pub type ProviderFn<S, D> =
    Arc<dyn Fn(&S, &D, &mut MapContext<'_>) -> Result<Value, MapError> + Send + Sync>;

/// Predicate gating a member (or, as the global guard, all members).
pub type ConditionFn<S, D> =
    Arc<dyn Fn(&S, &D, &mut MapContext<'_>) -> Result<bool, MapError> + Send + Sync>;

/// Custom destination factory.
pub type FactoryFn<S, D> =
    Arc<dyn Fn(&S, &mut MapContext<'_>) -> Result<D, MapError> + Send + Sync>;

/// Destination factory registered in the defaults, keyed by destination type.
pub type FallbackFactoryFn = Arc<dyn Fn() -> Value + Send + Sync>;

bitflags! {
    /// Calling shapes a compiled mapper provides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Shapes: u8 {
        /// Update an existing destination.
        const UPDATE = 1 << 0;
        /// Construct and return a new destination.
        const CONSTRUCT = 1 << 1;
        /// Update, with an auxiliary parameter.
        const UPDATE_WITH = 1 << 2;
        /// Construct, with an auxiliary parameter.
        const CONSTRUCT_WITH = 1 << 3;
        /// Shapes without an auxiliary parameter.
        const PLAIN = Self::UPDATE.bits() | Self::CONSTRUCT.bits();
    }
}

impl Default for Shapes {
    fn default() -> Self {
        Shapes::all()
    }
}

/// Identity of an auxiliary parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamType {
    pub id: TypeId,
    pub name: &'static str,
}

impl ParamType {
    pub fn of<P: Any>() -> Self {
        Self {
            id: TypeId::of::<P>(),
            name: type_name::<P>(),
        }
    }
}

/// A callable together with the auxiliary parameter type it declared.
pub struct Declared<F> {
    pub call: F,
    pub param: Option<ParamType>,
}

impl<F: Clone> Clone for Declared<F> {
    fn clone(&self) -> Self {
        Self {
            call: self.call.clone(),
            param: self.param,
        }
    }
}

impl<F> Declared<F> {
    pub fn plain(call: F) -> Self {
        Self { call, param: None }
    }

    pub fn with_param<P: Any>(call: F) -> Self {
        Self {
            call,
            param: Some(ParamType::of::<P>()),
        }
    }
}

/// A constant or sentinel value, cloned fresh for every use.
#[derive(Clone)]
pub struct ConstantValue {
    ty: TypeInfo,
    make: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl ConstantValue {
    pub fn of<T: Mappable>(value: T) -> Self {
        Self {
            ty: T::type_info(),
            make: Arc::new(move || Box::new(value.clone()) as Value),
        }
    }

    /// Constant from an already erased value of type `ty`.
    ///
    /// A value that is not of type `ty` is rejected.
    pub fn from_value(ty: TypeInfo, value: Value) -> Option<Self> {
        ty.clone_value(&*value)?;
        Some(Self {
            ty,
            make: Arc::new(move || ty.clone_value(&*value).unwrap_or_else(|| ty.zero())),
        })
    }

    pub fn ty(&self) -> TypeInfo {
        self.ty
    }

    /// A fresh copy of the value.
    pub fn produce(&self) -> Value {
        (self.make)()
    }
}

impl fmt::Debug for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstantValue({})", self.ty)
    }
}

/// Where a nested sub-mapper is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedCoordinates {
    pub source: TypeInfo,
    pub target: TypeInfo,
    pub profile: Option<Profile>,
}

impl fmt::Display for NestedCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)?;
        if let Some(profile) = &self.profile {
            write!(f, " [{profile}]")?;
        }
        Ok(())
    }
}

/// Conversion from a source value to a target member type.
#[derive(Debug, Clone)]
pub enum Conversion {
    /// Identical types: clone the value.
    PassThrough(TypeInfo),
    /// A user converter from the mapping or the defaults.
    Converter(Converter),
    /// A conversion operator registered from a `From` impl.
    Operator(Converter),
    /// Built-in primitive table.
    Primitive { from: Primitive, to: Primitive },
    /// Enum to its underlying value or, for `String`, its variant name.
    FromEnum { shape: EnumShape, to: Primitive },
    /// Underlying value or variant name to an enum.
    ToEnum { from: Primitive, shape: EnumShape },
    /// Enum to enum by variant name.
    EnumToEnum { from: EnumShape, to: EnumShape },
    /// Borrow the `T` in `Option<T>`; `None` makes the value absent.
    Unwrap {
        shape: NullableShape,
        then: Box<Conversion>,
    },
    /// Convert, then wrap the result in `Some`.
    Wrap {
        then: Box<Conversion>,
        shape: NullableShape,
    },
    /// Wrap the source in `Some` before converting (converter declared on `Option<T>`).
    WrapSource {
        source: TypeInfo,
        shape: NullableShape,
        then: Box<Conversion>,
    },
    /// Element-wise conversion between sequences.
    Elements {
        from: SequenceShape,
        to: SequenceShape,
        element: Box<Conversion>,
    },
    /// Construct through a nested sub-mapper.
    Nested(NestedCoordinates),
}

impl Conversion {
    /// Whether a nested sub-mapper is involved anywhere in the tree.
    pub fn is_nested(&self) -> bool {
        match self {
            Conversion::Nested(_) => true,
            Conversion::Unwrap { then, .. }
            | Conversion::Wrap { then, .. }
            | Conversion::WrapSource { then, .. } => then.is_nested(),
            Conversion::Elements { element, .. } => element.is_nested(),
            _ => false,
        }
    }

    /// Whether the tree only copies, possibly unwrapping or wrapping `Option`.
    pub fn is_pass_through(&self) -> bool {
        match self {
            Conversion::PassThrough(_) => true,
            Conversion::Unwrap { then, .. } | Conversion::Wrap { then, .. } => {
                then.is_pass_through()
            }
            _ => false,
        }
    }

    /// User converters and operators linked in the tree.
    pub fn converters(&self) -> Vec<&Converter> {
        let mut found = Vec::new();
        self.collect_converters(&mut found);
        found
    }

    fn collect_converters<'a>(&'a self, found: &mut Vec<&'a Converter>) {
        match self {
            Conversion::Converter(converter) | Conversion::Operator(converter) => {
                found.push(converter)
            }
            Conversion::Unwrap { then, .. }
            | Conversion::Wrap { then, .. }
            | Conversion::WrapSource { then, .. } => then.collect_converters(found),
            Conversion::Elements { element, .. } => element.collect_converters(found),
            _ => {}
        }
    }

    /// Coordinates of every nested sub-mapper in the tree.
    pub fn nested(&self) -> Vec<&NestedCoordinates> {
        match self {
            Conversion::Nested(coordinates) => vec![coordinates],
            Conversion::Unwrap { then, .. }
            | Conversion::Wrap { then, .. }
            | Conversion::WrapSource { then, .. } => then.nested(),
            Conversion::Elements { element, .. } => element.nested(),
            _ => Vec::new(),
        }
    }
}

// Shapes are fn-pointer tables; showing them adds nothing to plan dumps.
macro_rules! opaque_debug {
    ($($ty:ty => $label:literal),* $(,)?) => {
        $(
            impl fmt::Debug for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str($label)
                }
            }
        )*
    };
}

opaque_debug! {
    EnumShape => "EnumShape",
    NullableShape => "NullableShape",
    SequenceShape => "SequenceShape",
}

/// One hop of a member path past its first segment.
#[derive(Clone, Copy)]
pub struct PathStep {
    /// Set when the previous segment is `Option<_>` and must be unwrapped first.
    pub unwrap: Option<fn(&dyn Any) -> Option<&dyn Any>>,
    pub member_ref: fn(&dyn Any, usize) -> Option<&dyn Any>,
    pub index: usize,
}

/// A dotted path through source members, e.g. `customer.address.city`.
pub struct MemberPath<S> {
    pub head: Getter<S>,
    pub steps: Vec<PathStep>,
    /// Type of the last segment.
    pub terminal: TypeInfo,
    pub display: String,
}

impl<S> Clone for MemberPath<S> {
    fn clone(&self) -> Self {
        Self {
            head: self.head,
            steps: self.steps.clone(),
            terminal: self.terminal,
            display: self.display.clone(),
        }
    }
}

impl<S> MemberPath<S> {
    /// Whether an intermediate segment can be absent.
    pub fn requires_null_check(&self) -> bool {
        self.steps.iter().any(|step| step.unwrap.is_some())
    }

    /// Borrow the terminal value; `None` when an intermediate segment is absent.
    pub fn resolve<'s>(&self, source: &'s S) -> Option<&'s dyn Any> {
        let mut current: &dyn Any = (self.head)(source);
        for step in &self.steps {
            if let Some(unwrap) = step.unwrap {
                current = unwrap(current)?;
            }
            current = (step.member_ref)(current, step.index)?;
        }
        Some(current)
    }
}

impl<S> fmt::Debug for MemberPath<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberPath({}: {})", self.display, self.terminal)
    }
}

/// How a member's source value is obtained.
pub enum SourceAccessor<S, D> {
    Path(MemberPath<S>),
    Provider {
        call: ProviderFn<S, D>,
        output: TypeInfo,
    },
}

impl<S, D> SourceAccessor<S, D> {
    /// Type of the value the accessor yields.
    pub fn value_type(&self) -> TypeInfo {
        match self {
            SourceAccessor::Path(path) => path.terminal,
            SourceAccessor::Provider { output, .. } => *output,
        }
    }
}

impl<S, D> fmt::Debug for SourceAccessor<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAccessor::Path(path) => path.fmt(f),
            SourceAccessor::Provider { output, .. } => write!(f, "Provider({output})"),
        }
    }
}

/// Writable destination member targeted by a plan.
pub struct TargetMember<D> {
    pub name: &'static str,
    pub ty: TypeInfo,
    pub set: Setter<D>,
}

impl<D> fmt::Debug for TargetMember<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// Resolved plan for one destination member.
pub struct MemberPlan<S, D> {
    pub target: TargetMember<D>,
    pub strategy: Strategy,
    /// `None` only for [`Strategy::Constant`].
    pub source: Option<SourceAccessor<S, D>>,
    /// Already converted to the target type.
    pub constant: Option<ConstantValue>,
    pub conversion: Option<Conversion>,
    pub guard: Option<ConditionFn<S, D>>,
    pub sentinel: Option<ConstantValue>,
    /// An intermediate path segment is nullable.
    pub requires_null_check: bool,
    /// A nullable terminal feeds a member that cannot represent absence.
    pub requires_null_coalescing: bool,
    pub order: i32,
    pub declaration: usize,
}

impl<S, D> fmt::Debug for MemberPlan<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberPlan")
            .field("target", &self.target)
            .field("strategy", &self.strategy)
            .field("source", &self.source)
            .field("conversion", &self.conversion)
            .field("guarded", &self.guard.is_some())
            .field("sentinel", &self.sentinel)
            .field("order", &self.order)
            .field("declaration", &self.declaration)
            .finish()
    }
}

/// How the destination is created by constructing shapes.
pub enum FactoryPlan<S, D> {
    /// Factory declared on the mapping.
    Custom(FactoryFn<S, D>),
    /// Factory registered for the destination type in the defaults.
    Fallback(FallbackFactoryFn),
    /// `Default::default()`.
    Default,
}

impl<S, D> fmt::Debug for FactoryPlan<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FactoryPlan::Custom(_) => "Custom",
            FactoryPlan::Fallback(_) => "Fallback",
            FactoryPlan::Default => "Default",
        })
    }
}

/// Fully resolved plan for one (source, destination, profile) pair.
pub struct MappingSpecification<S, D> {
    pub source: TypeInfo,
    pub destination: TypeInfo,
    pub profile: Option<Profile>,
    /// In assignment order.
    pub members: Vec<MemberPlan<S, D>>,
    pub factory: FactoryPlan<S, D>,
    pub before: Vec<HookFn<S, D>>,
    pub after: Vec<HookFn<S, D>>,
    pub guard: Option<ConditionFn<S, D>>,
    /// Auxiliary parameter type required by any callback of the plan.
    pub parameter: Option<ParamType>,
    pub shapes: Shapes,
}

impl<S, D> MappingSpecification<S, D> {
    /// Plan for a destination member, if it is mapped.
    pub fn member(&self, name: &str) -> Option<&MemberPlan<S, D>> {
        self.members.iter().find(|plan| plan.target.name == name)
    }

    /// Names of mapped members in assignment order.
    pub fn member_names(&self) -> Vec<&'static str> {
        self.members.iter().map(|plan| plan.target.name).collect()
    }
}

impl<S, D> fmt::Debug for MappingSpecification<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingSpecification")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("profile", &self.profile)
            .field("members", &self.members)
            .field("factory", &self.factory)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("guarded", &self.guard.is_some())
            .field("parameter", &self.parameter)
            .field("shapes", &self.shapes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_produces_fresh_copies() {
        let constant = ConstantValue::of(String::from("Active"));
        let first = constant.produce();
        let second = constant.produce();
        assert_eq!(first.downcast_ref::<String>().unwrap(), "Active");
        assert_eq!(second.downcast_ref::<String>().unwrap(), "Active");
        assert_eq!(constant.ty(), TypeInfo::of::<String>());
    }

    #[test]
    fn test_constant_from_value_checks_type() {
        let ty = TypeInfo::of::<u32>();
        assert!(ConstantValue::from_value(ty, Box::new(5u32)).is_some());
        assert!(ConstantValue::from_value(ty, Box::new(5i64)).is_none());
    }

    #[test]
    fn test_conversion_tree_queries() {
        let option = TypeInfo::of::<Option<i32>>().nullable_shape().unwrap();
        let tree = Conversion::Unwrap {
            shape: option,
            then: Box::new(Conversion::PassThrough(TypeInfo::of::<i32>())),
        };
        assert!(tree.is_pass_through());
        assert!(!tree.is_nested());

        let nested = Conversion::Wrap {
            then: Box::new(Conversion::Nested(NestedCoordinates {
                source: TypeInfo::of::<i32>(),
                target: TypeInfo::of::<i64>(),
                profile: None,
            })),
            shape: option,
        };
        assert!(nested.is_nested());
        assert_eq!(nested.nested().len(), 1);
        assert!(!nested.is_pass_through());
    }

    #[test]
    fn test_shapes_default_to_all() {
        assert_eq!(Shapes::default(), Shapes::all());
        assert!(Shapes::PLAIN.contains(Shapes::UPDATE | Shapes::CONSTRUCT));
        assert!(!Shapes::PLAIN.intersects(Shapes::UPDATE_WITH));
    }
}
