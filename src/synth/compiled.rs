//! The compiled mapper and its calling shapes.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::core::{MapError, MapResult, Record, TypeInfo, Value};
use crate::plan::{ParamType, Profile, Shapes};

/// Auxiliary parameter as handed to a routine.
pub type Param<'a> = Option<&'a (dyn Any + Send + Sync)>;

pub(crate) type UpdateFn<S, D> =
    Box<dyn Fn(&S, &mut D, Param<'_>) -> Result<(), MapError> + Send + Sync>;

pub(crate) type ConstructFn<S, D> = Box<dyn Fn(&S, Param<'_>) -> Result<D, MapError> + Send + Sync>;

/// Type-erased view of a compiled mapper, as stored in the registry.
pub trait ErasedMapper: Send + Sync {
    fn source(&self) -> TypeInfo;

    fn destination(&self) -> TypeInfo;

    fn profile(&self) -> Option<&str>;

    /// Construct a destination from an erased source; nested mappings go through here.
    fn construct_erased(&self, source: &dyn Any, parameter: Param<'_>)
        -> Result<Option<Value>, MapError>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Immutable bundle of the routines compiled for one type pair.
pub struct CompiledMapper<S, D> {
    pub(crate) source: TypeInfo,
    pub(crate) destination: TypeInfo,
    pub(crate) profile: Option<Profile>,
    pub(crate) parameter: Option<ParamType>,
    pub(crate) update: Option<UpdateFn<S, D>>,
    pub(crate) construct: Option<ConstructFn<S, D>>,
    pub(crate) update_with: Option<UpdateFn<S, D>>,
    pub(crate) construct_with: Option<ConstructFn<S, D>>,
}

impl<S: Record, D: Record> CompiledMapper<S, D> {
    fn missing(&self, shape: &'static str) -> MapError {
        MapError::ShapeNotCompiled {
            shape,
            pair: format!("{} -> {}", self.source, self.destination),
        }
    }

    fn check_parameter(&self, actual: TypeId) -> Result<(), MapError> {
        match self.parameter {
            Some(expected) if expected.id != actual => Err(MapError::ParameterType {
                expected: expected.name,
            }),
            _ => Ok(()),
        }
    }

    /// Copy mapped members from `source` into an existing `destination`.
    pub fn update(&self, source: &S, destination: &mut D) -> MapResult<()> {
        let update = self.update.as_ref().ok_or_else(|| self.missing("update"))?;
        update(source, destination, None)
    }

    /// Construct a new destination from `source`.
    pub fn construct(&self, source: &S) -> MapResult<D> {
        let construct = self
            .construct
            .as_ref()
            .ok_or_else(|| self.missing("construct"))?;
        construct(source, None)
    }

    /// [`update`](Self::update) with an auxiliary parameter.
    pub fn update_with<P: Any + Send + Sync>(
        &self,
        source: &S,
        destination: &mut D,
        parameter: &P,
    ) -> MapResult<()> {
        let update = self
            .update_with
            .as_ref()
            .ok_or_else(|| self.missing("update-with-parameter"))?;
        self.check_parameter(TypeId::of::<P>())?;
        update(source, destination, Some(parameter as &(dyn Any + Send + Sync)))
    }

    /// [`construct`](Self::construct) with an auxiliary parameter.
    pub fn construct_with<P: Any + Send + Sync>(&self, source: &S, parameter: &P) -> MapResult<D> {
        let construct = self
            .construct_with
            .as_ref()
            .ok_or_else(|| self.missing("construct-with-parameter"))?;
        self.check_parameter(TypeId::of::<P>())?;
        construct(source, Some(parameter as &(dyn Any + Send + Sync)))
    }

    /// Update from a source that may be absent; an absent source changes nothing.
    pub fn update_opt(&self, source: Option<&S>, destination: &mut D) -> MapResult<()> {
        match source {
            Some(source) => self.update(source, destination),
            None => Ok(()),
        }
    }

    /// Construct from a source that may be absent.
    ///
    /// An absent source produces nothing, unless `D` is a value aggregate, in
    /// which case it produces `D::default()`.
    pub fn construct_opt(&self, source: Option<&S>) -> MapResult<Option<D>> {
        match source {
            Some(source) => self.construct(source).map(Some),
            None if D::VALUE_AGGREGATE => Ok(Some(D::default())),
            None => Ok(None),
        }
    }

    pub fn shapes(&self) -> Shapes {
        let mut shapes = Shapes::empty();
        shapes.set(Shapes::UPDATE, self.update.is_some());
        shapes.set(Shapes::CONSTRUCT, self.construct.is_some());
        shapes.set(Shapes::UPDATE_WITH, self.update_with.is_some());
        shapes.set(Shapes::CONSTRUCT_WITH, self.construct_with.is_some());
        shapes
    }

    /// Auxiliary parameter type the routines require, if any.
    pub fn parameter(&self) -> Option<ParamType> {
        self.parameter
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }
}

impl<S: Record, D: Record> ErasedMapper for CompiledMapper<S, D> {
    fn source(&self) -> TypeInfo {
        self.source
    }

    fn destination(&self) -> TypeInfo {
        self.destination
    }

    fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    fn construct_erased(
        &self,
        source: &dyn Any,
        parameter: Param<'_>,
    ) -> Result<Option<Value>, MapError> {
        let source = source.downcast_ref::<S>().ok_or(MapError::TypeMismatch {
            expected: type_name::<S>(),
        })?;
        let destination = match (parameter, &self.construct_with, &self.construct) {
            (Some(parameter), Some(construct), _) => {
                self.check_parameter((*parameter).type_id())?;
                construct(source, Some(parameter))?
            }
            (_, _, Some(construct)) => construct(source, None)?,
            (None, Some(construct), None) => construct(source, None)?,
            (_, None, None) => return Err(self.missing("construct")),
        };
        Ok(Some(Box::new(destination) as Value))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<S, D> fmt::Debug for CompiledMapper<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMapper")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("profile", &self.profile)
            .field("parameter", &self.parameter.map(|param| param.name))
            .finish()
    }
}
