// This module is the shared foundation of the mapping compiler: the runtime type descriptors
// every other stage works with, and the error and session types that flow between them. It
// covers type identity (TypeInfo, a Copy descriptor carrying fn pointers for zero values,
// cloning, and the record, enum, Option and Vec shapes), the scalar conversion table used for
// primitives, record and enum metadata declared through the record! and enumeration! macros,
// the per-call MapContext handed to hooks and providers, the build-time diagnostics and runtime
// faults, and the BuildSession that collects diagnostics and statistics for one build.

//! Core mapping infrastructure.
//!
//! # Key Components
//!
//! ## Type Descriptors (`types`)
//! - [`TypeInfo`] identity plus shape tables for records, enums, `Option` and `Vec`
//! - [`Value`], the boxed type-erased value passed between lowered conversions
//!
//! ## Scalars (`scalar`)
//! - Numeric, `bool`, `char` and `String` conversions with range checks
//!
//! ## Member Metadata (`record`)
//! - [`Record`] and [`Enumeration`], usually implemented through
//!   [`record!`](crate::record) and [`enumeration!`](crate::enumeration)
//!
//! ## Runtime Context (`context`)
//! - [`MapContext`]: auxiliary parameter and per-call scratch values
//!
//! ## Errors and Sessions (`error`, `session`)
//! - Build diagnostics, runtime faults and per-build statistics

pub mod context;
pub mod error;
pub mod record;
pub mod scalar;
pub mod session;
pub mod types;

pub use context::MapContext;

pub use error::{BuildError, BuildResult, Diagnostic, MapError, MapResult, MapperError};

pub use record::{Enumeration, MemberInfo, Record};

pub use scalar::{Primitive, Scalar, ScalarFault};

pub use session::{BuildSession, BuildStats, Strategy};

pub use types::{
    view, EnumShape, Mappable, MemberSignature, NullableShape, RecordShape, SequenceShape,
    TypeInfo, TypeKind, Value,
};
