//! shapemap - compiled object-to-object mapping.
//!
//! A mapping between two record types is described once, resolved into a
//! plan of per-member strategies, and compiled into closures that copy and
//! convert members without inspecting types at call time. Compiled mappers
//! are cached per (source, destination, profile) in a concurrent registry.
//!
//! # Primary Usage
//!
//! ```ignore
//! use shapemap::{record, MapperBuilder, MappingConfig};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Order { id: u32, total: f64 }
//! record!(Order { id: u32, total: f64 });
//!
//! #[derive(Debug, Clone, Default)]
//! struct OrderView { id: String, total: String }
//! record!(OrderView { id: String, total: String });
//!
//! let mapper = MapperBuilder::new()
//!     .register(MappingConfig::<Order, OrderView>::new())
//!     .finalize();
//! let view: OrderView = mapper.construct(&Order { id: 42, total: 9.5 })?;
//! assert_eq!(view.id, "42");
//! ```
//!
//! # Architecture
//!
//! - [`core`] - type descriptors, member metadata, errors, build sessions
//! - [`config`] - per-pair and owner-wide mapping configuration
//! - [`plan`] - the resolved mapping specification
//! - [`resolver`] - configuration to specification
//! - [`synth`] - specification to compiled mapper
//! - [`registry`] - concurrent cache of compiled mappers
//! - [`facade`] - nested mapper lookup used by compiled routines
//! - [`mapper`] - the owner and its public entry points

pub mod config;
pub mod core;
pub mod facade;
pub mod mapper;
pub mod plan;
pub mod registry;
pub mod resolver;
pub mod synth;

pub use crate::core::{
    // Type descriptors
    view, Mappable, TypeInfo, TypeKind, Value,
    // Member metadata
    Enumeration, MemberInfo, Record,
    // Runtime context
    MapContext,
    // Errors
    BuildError, BuildResult, Diagnostic, MapError, MapResult, MapperError,
    // Sessions
    BuildSession, BuildStats, Strategy,
};
pub use config::{DefaultsConfig, MappingConfig, NameMatcher, RegistryOptions};
pub use facade::NestedMappers;
pub use mapper::{Mapper, MapperBuilder};
pub use plan::{Converter, MappingSpecification, ParamType, Shapes};
pub use registry::{RegistryStats, TypePairRegistry};
pub use synth::{CompiledMapper, ErasedMapper};
