// This module defines how record and enum types expose themselves to the mapping compiler.
// Record enumerates members as MemberInfo entries (name, member type, optional borrowing
// getter, optional setter) and Enumeration exposes a unit enum's underlying values and variant
// names. Both are normally implemented with the record! and enumeration! declarative macros,
// which resolve member enumeration when the user crate is compiled instead of at run time.
// Hand-written impls are the way to expose read-only or write-only members. The erased
// helpers at the bottom (record_shape, enum_shape) turn the typed tables into the
// RecordShape/EnumShape descriptors used when a record or enum appears as a member type.

//! Record and enum metadata.

use std::any::Any;

use super::types::{EnumShape, Mappable, MemberSignature, RecordShape, TypeInfo, Value};

/// Getter borrowing a member from its owning record.
pub type Getter<R> = fn(&R) -> &dyn Any;

/// Setter storing an owned value into a member; hands the value back if it
/// has the wrong type.
pub type Setter<R> = fn(&mut R, Value) -> Result<(), Value>;

/// One member of a record type.
pub struct MemberInfo<R> {
    name: &'static str,
    ty: fn() -> TypeInfo,
    get: Option<Getter<R>>,
    set: Option<Setter<R>>,
}

impl<R> Clone for MemberInfo<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for MemberInfo<R> {}

impl<R> MemberInfo<R> {
    pub const fn read_write(
        name: &'static str,
        ty: fn() -> TypeInfo,
        get: Getter<R>,
        set: Setter<R>,
    ) -> Self {
        Self {
            name,
            ty,
            get: Some(get),
            set: Some(set),
        }
    }

    pub const fn read_only(name: &'static str, ty: fn() -> TypeInfo, get: Getter<R>) -> Self {
        Self {
            name,
            ty,
            get: Some(get),
            set: None,
        }
    }

    pub const fn write_only(name: &'static str, ty: fn() -> TypeInfo, set: Setter<R>) -> Self {
        Self {
            name,
            ty,
            get: None,
            set: Some(set),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ty(&self) -> TypeInfo {
        (self.ty)()
    }

    pub fn getter(&self) -> Option<Getter<R>> {
        self.get
    }

    pub fn setter(&self) -> Option<Setter<R>> {
        self.set
    }

    pub fn is_readable(&self) -> bool {
        self.get.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

/// A record type whose members can be mapped.
pub trait Record: Mappable {
    /// Whether an absent source still constructs a zero-valued destination.
    const VALUE_AGGREGATE: bool = false;

    /// Members in declaration order.
    fn members() -> &'static [MemberInfo<Self>];
}

/// A unit enum with an integral underlying value per variant.
pub trait Enumeration: Mappable {
    fn underlying(&self) -> i64;
    fn from_underlying(value: i64) -> Option<Self>;
    fn variant_name(&self) -> &'static str;
    fn from_variant_name(name: &str) -> Option<Self>;
}

fn member_signatures<R: Record>() -> Vec<MemberSignature> {
    R::members()
        .iter()
        .enumerate()
        .map(|(index, member)| MemberSignature {
            name: member.name,
            index,
            ty: member.ty,
            readable: member.is_readable(),
        })
        .collect()
}

fn member_ref<R: Record>(value: &dyn Any, index: usize) -> Option<&dyn Any> {
    let record = value.downcast_ref::<R>()?;
    let get = R::members().get(index)?.get?;
    Some(get(record))
}

/// Erased member table for `R`, used when `R` appears as a member type.
pub fn record_shape<R: Record>() -> RecordShape {
    RecordShape {
        members: member_signatures::<R>,
        member_ref: member_ref::<R>,
    }
}

fn enum_underlying<E: Enumeration>(value: &dyn Any) -> Option<i64> {
    value.downcast_ref::<E>().map(E::underlying)
}

fn enum_from_underlying<E: Enumeration>(value: i64) -> Option<Value> {
    E::from_underlying(value).map(|variant| Box::new(variant) as Value)
}

fn enum_name<E: Enumeration>(value: &dyn Any) -> Option<&'static str> {
    value.downcast_ref::<E>().map(E::variant_name)
}

fn enum_from_name<E: Enumeration>(name: &str) -> Option<Value> {
    E::from_variant_name(name).map(|variant| Box::new(variant) as Value)
}

/// Erased variant table for `E`.
pub fn enum_shape<E: Enumeration>() -> EnumShape {
    EnumShape {
        underlying: enum_underlying::<E>,
        from_underlying: enum_from_underlying::<E>,
        name_of: enum_name::<E>,
        from_name: enum_from_name::<E>,
    }
}

/// Implement [`Mappable`] and [`Record`] for a struct with public, readable
/// and writable fields.
///
/// ```
/// #[derive(Debug, Clone, Default)]
/// struct Point { x: i32, y: i32 }
///
/// shapemap::record!(Point { x: i32, y: i32 });
/// ```
///
/// Prefix the type with `value` to mark it as a value aggregate: constructing
/// from an absent source then yields a zero-valued record instead of nothing.
#[macro_export]
macro_rules! record {
    (@impl $aggregate:expr, $name:ident { $($field:ident : $fty:ty),* }) => {
        impl $crate::Mappable for $name {
            fn type_info() -> $crate::TypeInfo {
                $crate::TypeInfo::new::<Self>($crate::TypeKind::Record(
                    $crate::core::record::record_shape::<Self>(),
                ))
            }
        }

        impl $crate::Record for $name {
            const VALUE_AGGREGATE: bool = $aggregate;

            fn members() -> &'static [$crate::MemberInfo<Self>] {
                static MEMBERS: ::std::sync::OnceLock<::std::vec::Vec<$crate::MemberInfo<$name>>> =
                    ::std::sync::OnceLock::new();
                MEMBERS.get_or_init(|| {
                    ::std::vec![$(
                        {
                            fn get(record: &$name) -> &dyn ::std::any::Any {
                                &record.$field
                            }
                            fn set(
                                record: &mut $name,
                                value: $crate::Value,
                            ) -> ::std::result::Result<(), $crate::Value> {
                                record.$field = *value.downcast::<$fty>()?;
                                ::std::result::Result::Ok(())
                            }
                            $crate::MemberInfo::read_write(
                                ::std::stringify!($field),
                                <$fty as $crate::Mappable>::type_info,
                                get,
                                set,
                            )
                        }
                    ),*]
                })
            }
        }
    };
    (value $name:ident { $($field:ident : $fty:ty),* $(,)? }) => {
        $crate::record!(@impl true, $name { $($field : $fty),* });
    };
    ($name:ident { $($field:ident : $fty:ty),* $(,)? }) => {
        $crate::record!(@impl false, $name { $($field : $fty),* });
    };
}

/// Implement [`Mappable`] and [`Enumeration`] for a unit enum.
///
/// ```
/// #[derive(Debug, Clone, Copy, Default, PartialEq)]
/// enum Status { #[default] Active, Retired }
///
/// shapemap::enumeration!(Status { Active = 1, Retired = 2 });
/// ```
#[macro_export]
macro_rules! enumeration {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        impl $crate::Mappable for $name {
            fn type_info() -> $crate::TypeInfo {
                $crate::TypeInfo::new::<Self>($crate::TypeKind::Enum(
                    $crate::core::record::enum_shape::<Self>(),
                ))
            }
        }

        impl $crate::Enumeration for $name {
            fn underlying(&self) -> i64 {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            fn from_underlying(value: i64) -> ::std::option::Option<Self> {
                $(
                    if value == $value {
                        return ::std::option::Option::Some($name::$variant);
                    }
                )+
                ::std::option::Option::None
            }

            fn variant_name(&self) -> &'static str {
                match self {
                    $($name::$variant => ::std::stringify!($variant),)+
                }
            }

            fn from_variant_name(name: &str) -> ::std::option::Option<Self> {
                match name {
                    $(::std::stringify!($variant) => ::std::option::Option::Some($name::$variant),)+
                    _ => ::std::option::Option::None,
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{Enumeration, Mappable, Record, TypeKind};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Sample {
        id: u32,
        label: String,
    }

    crate::record!(Sample { id: u32, label: String });

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum Level {
        #[default]
        Low,
        High,
    }

    crate::enumeration!(Level { Low = 10, High = 20 });

    #[test]
    fn test_record_members_in_declaration_order() {
        let names: Vec<_> = Sample::members().iter().map(|m| m.name()).collect();
        assert_eq!(names, ["id", "label"]);
        assert!(Sample::members().iter().all(|m| m.is_readable() && m.is_writable()));
    }

    #[test]
    fn test_record_getter_and_setter() {
        let mut sample = Sample::default();
        let label = Sample::members()[1];
        (label.setter().unwrap())(&mut sample, Box::new(String::from("x"))).unwrap();
        assert_eq!(sample.label, "x");

        let read = (label.getter().unwrap())(&sample);
        assert_eq!(read.downcast_ref::<String>().unwrap(), "x");

        let rejected = (label.setter().unwrap())(&mut sample, Box::new(5u8));
        assert!(rejected.is_err());
    }

    #[test]
    fn test_record_shape_exposes_erased_members() {
        let TypeKind::Record(shape) = Sample::type_info().kind() else {
            panic!("Sample should be a record");
        };
        let signatures = (shape.members)();
        assert_eq!(signatures[0].name, "id");
        assert_eq!((signatures[0].ty)(), u32::type_info());

        let sample = Sample { id: 9, label: String::new() };
        let id = (shape.member_ref)(&sample, 0).unwrap();
        assert_eq!(id.downcast_ref::<u32>(), Some(&9));
        assert!((shape.member_ref)(&sample, 5).is_none());
    }

    #[test]
    fn test_enumeration_tables() {
        assert_eq!(Level::High.underlying(), 20);
        assert_eq!(Level::from_underlying(10), Some(Level::Low));
        assert_eq!(Level::from_underlying(11), None);
        assert_eq!(Level::High.variant_name(), "High");
        assert_eq!(Level::from_variant_name("Low"), Some(Level::Low));
    }
}
