// This module defines error types for the mapping compiler using the thiserror crate, split
// along the three failure classes of the system. Diagnostic is one build-time resolution
// problem (unknown member, missing conversion path, duplicate explicit mapping, conflicting
// auxiliary parameter types, ...); BuildError carries every diagnostic of one specification
// together, or reports the registry-misuse case of requesting a pair that was never
// registered. MapError covers faults raised while a compiled routine runs: conversion
// failures, missing nested mappers, parameter type mismatches and user callbacks failing.
// MapperError is the union returned by the owner-level convenience API.

//! Error types for the mapping compiler.
//!
//! Using thiserror for more idiomatic error handling.

use std::error::Error as StdError;

use thiserror::Error;

/// One problem found while resolving a mapping specification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("destination member `{member}` does not exist or is not writable")]
    UnknownMember { member: String },

    #[error("source path `{path}` for member `{member}` cannot be resolved")]
    UnknownSourcePath { member: String, path: String },

    #[error("no conversion from {source_type} to {target_type} for member `{member}`")]
    NoConversion {
        member: String,
        source_type: &'static str,
        target_type: &'static str,
    },

    #[error("member `{member}` has {count} explicit source mappings")]
    DuplicateMapping { member: String, count: usize },

    #[error("conflicting auxiliary parameter types {first} and {second}")]
    ConflictingParameterTypes {
        first: &'static str,
        second: &'static str,
    },

    #[error("value for member `{member}` cannot be used: {reason}")]
    ConstantConversion { member: String, reason: String },

    #[error("member `{member}` nests {pair} inside itself")]
    SelfReferentialNesting { member: String, pair: String },

    #[error("no calling shape can be compiled: {reason}")]
    NoShapes { reason: String },
}

/// Failure to produce a compiled mapper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("mapping {pair} failed to resolve: {}", render(.diagnostics))]
    Invalid {
        pair: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("no mapping registered for {pair}")]
    NotRegistered { pair: String },
}

impl BuildError {
    /// Diagnostics of an invalid specification; empty for other errors.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            BuildError::Invalid { diagnostics, .. } => diagnostics,
            BuildError::NotRegistered { .. } => &[],
        }
    }
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fault raised while a compiled routine runs.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("cannot convert {from} to {to}: {reason}")]
    Conversion {
        from: &'static str,
        to: &'static str,
        reason: String,
    },

    #[error("expected a value of type {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("no mapper available for nested pair {pair}")]
    NestedMapperMissing { pair: String },

    #[error("nested mapper could not be built")]
    Build(#[source] Box<BuildError>),

    #[error("auxiliary parameter of type {expected} is required")]
    ParameterMissing { expected: &'static str },

    #[error("auxiliary parameter must have type {expected}")]
    ParameterType { expected: &'static str },

    #[error("{shape} shape was not compiled for {pair}")]
    ShapeNotCompiled { shape: &'static str, pair: String },

    #[error("mapping callback failed")]
    Callback(#[source] Box<dyn StdError + Send + Sync>),

    #[error("the mapper owning this routine was dropped")]
    RegistryDropped,
}

/// Error returned by the owner-level [`crate::Mapper`] API.
#[derive(Error, Debug)]
pub enum MapperError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Map(#[from] MapError),
}

/// Result type alias for building mappers.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type alias for running compiled routines.
pub type MapResult<T> = Result<T, MapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_lists_every_diagnostic() {
        let error = BuildError::Invalid {
            pair: "A -> B".into(),
            diagnostics: vec![
                Diagnostic::UnknownMember { member: "x".into() },
                Diagnostic::DuplicateMapping {
                    member: "y".into(),
                    count: 2,
                },
            ],
        };
        let text = error.to_string();
        assert!(text.starts_with("mapping A -> B failed to resolve"));
        assert!(text.contains("`x` does not exist"));
        assert!(text.contains("`y` has 2 explicit source mappings"));
        assert_eq!(error.diagnostics().len(), 2);
    }

    #[test]
    fn test_not_registered_has_no_diagnostics() {
        let error = BuildError::NotRegistered { pair: "A -> B".into() };
        assert!(error.diagnostics().is_empty());
        assert_eq!(error.to_string(), "no mapping registered for A -> B");
    }
}
