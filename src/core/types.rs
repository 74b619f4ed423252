// This module defines the runtime type model shared by every stage of the mapping compiler.
// TypeInfo is a small, copyable descriptor of a member type: its TypeId, its name for
// diagnostics, its shape (TypeKind) and a handful of erased helpers (zero value, clone of an
// erased reference, nullable counterpart). The shapes cover the kinds of member types the
// resolver knows how to convert between: primitives and String, unit enums with an integral
// underlying value, records, Option<T> and Vec<T>. Every helper is a plain fn pointer
// monomorphized when the Mappable impl is instantiated, so the synthesized routines never
// inspect types at call time; they only call through pointers captured at build time.

//! Runtime type descriptors for mappable member types.
//!
//! Values flowing between members are type-erased as [`Value`]; the
//! descriptors here are what lets the resolver decide how two member types
//! relate and what lets the synthesizer clone, wrap or unwrap them.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::scalar::Primitive;

/// An owned, type-erased member value.
pub type Value = Box<dyn Any + Send + Sync>;

/// Borrow an owned [`Value`] as an erased reference to its contents.
///
/// Taking `&value` directly would erase the `Box` itself, so every call site
/// that hands a [`Value`] to a conversion goes through here.
pub fn view(value: &Value) -> &dyn Any {
    &**value
}

/// A type that can appear as a member of a mapped record.
pub trait Mappable: Any + Clone + Default + Send + Sync {
    /// Descriptor for this type.
    fn type_info() -> TypeInfo;
}

/// Shape of a mappable type, used to pick a conversion strategy.
#[derive(Clone, Copy)]
pub enum TypeKind {
    /// A scalar (numbers, `bool`, `char`, `String`).
    Primitive(Primitive),
    /// A unit enum with an integral underlying value.
    Enum(EnumShape),
    /// A record whose members can be enumerated.
    Record(RecordShape),
    /// `Option<T>`.
    Nullable(NullableShape),
    /// `Vec<T>`.
    Sequence(SequenceShape),
    /// Anything else; only identical types or explicit converters apply.
    Opaque,
}

/// Erased access to a unit enum.
#[derive(Clone, Copy)]
pub struct EnumShape {
    pub underlying: fn(&dyn Any) -> Option<i64>,
    pub from_underlying: fn(i64) -> Option<Value>,
    pub name_of: fn(&dyn Any) -> Option<&'static str>,
    pub from_name: fn(&str) -> Option<Value>,
}

/// Erased member table of a record type.
#[derive(Clone, Copy)]
pub struct RecordShape {
    pub members: fn() -> Vec<MemberSignature>,
    pub member_ref: fn(&dyn Any, usize) -> Option<&dyn Any>,
}

/// Name, type and readability of one record member.
#[derive(Clone, Copy)]
pub struct MemberSignature {
    pub name: &'static str,
    pub index: usize,
    pub ty: fn() -> TypeInfo,
    pub readable: bool,
}

/// Erased access to `Option<T>`.
#[derive(Clone, Copy)]
pub struct NullableShape {
    pub inner: fn() -> TypeInfo,
    /// Turns a boxed `T` into a boxed `Some(T)`; hands the value back on type mismatch.
    pub wrap: fn(Value) -> Result<Value, Value>,
    /// Borrows the `T` inside a `Some`; `None` for an empty option.
    pub unwrap_ref: fn(&dyn Any) -> Option<&dyn Any>,
}

/// Erased access to `Vec<T>`.
#[derive(Clone, Copy)]
pub struct SequenceShape {
    pub element: fn() -> TypeInfo,
    pub elements: fn(&dyn Any) -> Option<Vec<&dyn Any>>,
    pub collect: fn(Vec<Value>) -> Option<Value>,
}

/// Descriptor of a mappable type.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
    kind: TypeKind,
    zero: fn() -> Value,
    clone_ref: fn(&dyn Any) -> Option<Value>,
    nullable: Option<fn() -> TypeInfo>,
}

impl TypeInfo {
    /// Describe a non-nullable type with the given shape.
    pub fn new<T: Mappable>(kind: TypeKind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind,
            zero: zero_of::<T>,
            clone_ref: clone_of::<T>,
            nullable: Some(<Option<T> as Mappable>::type_info),
        }
    }

    /// Descriptor of any mappable type.
    pub fn of<T: Mappable>() -> Self {
        T::type_info()
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// The natural zero value of the type (`Default::default()`).
    pub fn zero(&self) -> Value {
        (self.zero)()
    }

    /// Clone an erased reference into an owned value; `None` if the
    /// reference is not of this type.
    pub fn clone_value(&self, value: &dyn Any) -> Option<Value> {
        (self.clone_ref)(value)
    }

    /// Whether the type can represent absence.
    pub fn is_nullable(&self) -> bool {
        matches!(self.kind, TypeKind::Nullable(_))
    }

    /// The nullable shape, if this is `Option<T>`.
    pub fn nullable_shape(&self) -> Option<NullableShape> {
        match self.kind {
            TypeKind::Nullable(shape) => Some(shape),
            _ => None,
        }
    }

    /// `T` for `Option<T>`, the type itself otherwise.
    pub fn unwrapped(&self) -> TypeInfo {
        match self.kind {
            TypeKind::Nullable(shape) => (shape.inner)(),
            _ => *self,
        }
    }

    /// Descriptor of `Option<Self>`; `None` when `Self` is already nullable.
    pub fn wrapped(&self) -> Option<TypeInfo> {
        self.nullable.map(|nullable| nullable())
    }

    pub fn record_shape(&self) -> Option<RecordShape> {
        match self.kind {
            TypeKind::Record(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self.kind, TypeKind::Record(_))
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn zero_of<T: Mappable>() -> Value {
    Box::new(T::default())
}

fn clone_of<T: Mappable>(value: &dyn Any) -> Option<Value> {
    value
        .downcast_ref::<T>()
        .map(|value| Box::new(value.clone()) as Value)
}

fn wrap_some<T: Mappable>(value: Value) -> Result<Value, Value> {
    let value = value.downcast::<T>()?;
    Ok(Box::new(Some(*value)))
}

fn unwrap_option<T: Mappable>(value: &dyn Any) -> Option<&dyn Any> {
    value
        .downcast_ref::<Option<T>>()?
        .as_ref()
        .map(|inner| inner as &dyn Any)
}

fn vec_elements<T: Mappable>(value: &dyn Any) -> Option<Vec<&dyn Any>> {
    let items = value.downcast_ref::<Vec<T>>()?;
    Some(items.iter().map(|item| item as &dyn Any).collect())
}

fn vec_collect<T: Mappable>(values: Vec<Value>) -> Option<Value> {
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        items.push(*value.downcast::<T>().ok()?);
    }
    Some(Box::new(items))
}

impl<T: Mappable> Mappable for Option<T> {
    fn type_info() -> TypeInfo {
        // No nullable counterpart: Option<Option<T>> is never needed, and naming
        // it here would instantiate an unbounded chain of descriptors.
        TypeInfo {
            id: TypeId::of::<Self>(),
            name: type_name::<Self>(),
            kind: TypeKind::Nullable(NullableShape {
                inner: T::type_info,
                wrap: wrap_some::<T>,
                unwrap_ref: unwrap_option::<T>,
            }),
            zero: zero_of::<Self>,
            clone_ref: clone_of::<Self>,
            nullable: None,
        }
    }
}

impl<T: Mappable> Mappable for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Sequence(SequenceShape {
            element: T::type_info,
            elements: vec_elements::<T>,
            collect: vec_collect::<T>,
        }))
    }
}

macro_rules! impl_primitive {
    ($($ty:ty => $prim:ident),* $(,)?) => {
        $(
            impl Mappable for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::new::<Self>(TypeKind::Primitive(Primitive::$prim))
                }
            }
        )*
    };
}

impl_primitive! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => Text,
}
