//! User-supplied value converters.
//!
//! A [`Converter`] turns a value of one member type into another. It is
//! type-erased once at construction so it can sit in converter tables keyed
//! by `(source type, target type)`; the closure downcasts its input and boxes
//! its output.

use std::any::{type_name, Any};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::core::{MapContext, MapError, Mappable, TypeInfo, Value};

use super::ParamType;

/// Erased conversion function.
pub type ConvertFn =
    Arc<dyn Fn(&dyn Any, &mut MapContext<'_>) -> Result<Value, MapError> + Send + Sync>;

/// A conversion between two member types.
#[derive(Clone)]
pub struct Converter {
    source: TypeInfo,
    target: TypeInfo,
    apply: ConvertFn,
    param: Option<ParamType>,
}

fn erase<F>(f: F) -> ConvertFn
where
    F: Fn(&dyn Any, &mut MapContext<'_>) -> Result<Value, MapError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn input<A: Mappable>(value: &dyn Any) -> Result<&A, MapError> {
    value.downcast_ref::<A>().ok_or(MapError::TypeMismatch {
        expected: type_name::<A>(),
    })
}

impl Converter {
    /// Converter from a plain function of the source value.
    pub fn new<A, B, F>(f: F) -> Self
    where
        A: Mappable,
        B: Mappable,
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        Self {
            source: A::type_info(),
            target: B::type_info(),
            apply: erase(move |value, _| Ok(Box::new(f(input::<A>(value)?)) as Value)),
            param: None,
        }
    }

    /// Converter that may fail; the error reaches the caller unmodified
    /// inside [`MapError::Callback`].
    pub fn try_new<A, B, E, F>(f: F) -> Self
    where
        A: Mappable,
        B: Mappable,
        E: Into<Box<dyn StdError + Send + Sync>>,
        F: Fn(&A) -> Result<B, E> + Send + Sync + 'static,
    {
        Self {
            source: A::type_info(),
            target: B::type_info(),
            apply: erase(move |value, _| {
                f(input::<A>(value)?)
                    .map(|out| Box::new(out) as Value)
                    .map_err(|error| MapError::Callback(error.into()))
            }),
            param: None,
        }
    }

    /// Converter that reads the per-call [`MapContext`].
    pub fn with_context<A, B, F>(f: F) -> Self
    where
        A: Mappable,
        B: Mappable,
        F: Fn(&A, &mut MapContext<'_>) -> B + Send + Sync + 'static,
    {
        Self {
            source: A::type_info(),
            target: B::type_info(),
            apply: erase(move |value, ctx| Ok(Box::new(f(input::<A>(value)?, ctx)) as Value)),
            param: None,
        }
    }

    /// Converter that needs the auxiliary parameter of type `P`.
    pub fn with_param<A, B, P, F>(f: F) -> Self
    where
        A: Mappable,
        B: Mappable,
        P: Any + Send + Sync,
        F: Fn(&A, &P) -> B + Send + Sync + 'static,
    {
        Self {
            source: A::type_info(),
            target: B::type_info(),
            apply: erase(move |value, ctx| {
                let param = ctx.parameter::<P>().ok_or(MapError::ParameterMissing {
                    expected: type_name::<P>(),
                })?;
                Ok(Box::new(f(input::<A>(value)?, param)) as Value)
            }),
            param: Some(ParamType::of::<P>()),
        }
    }

    /// Conversion operator backed by a `From` impl.
    pub fn from_impl<A, B>() -> Self
    where
        A: Mappable,
        B: Mappable + From<A>,
    {
        Self::new(|value: &A| B::from(value.clone()))
    }

    pub fn source(&self) -> TypeInfo {
        self.source
    }

    pub fn target(&self) -> TypeInfo {
        self.target
    }

    pub fn param(&self) -> Option<ParamType> {
        self.param
    }

    /// Run the converter on an erased value of its source type.
    pub fn apply(&self, value: &dyn Any, ctx: &mut MapContext<'_>) -> Result<Value, MapError> {
        (self.apply)(value, ctx)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("param", &self.param)
            .finish()
    }
}
