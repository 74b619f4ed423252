//! Per-call mapping context.
//!
//! A [`MapContext`] is created once at the start of every compiled routine
//! call and handed to hooks, providers, conditions, factories and
//! context-aware converters. It carries the auxiliary parameter of the
//! `*_with` calling shapes and a scratch map for passing state between
//! those callbacks. The scratch map is only allocated on first write, so a
//! routine whose callbacks never use it pays nothing for it.

use std::any::Any;
use std::fmt;

use hashbrown::HashMap;

use super::types::Value;

/// Call-scoped state shared by the callbacks of one mapping call.
pub struct MapContext<'a> {
    parameter: Option<&'a (dyn Any + Send + Sync)>,
    scratch: Option<HashMap<String, Value>>,
}

impl<'a> MapContext<'a> {
    /// Context for a call with an optional auxiliary parameter.
    pub fn new(parameter: Option<&'a (dyn Any + Send + Sync)>) -> Self {
        Self {
            parameter,
            scratch: None,
        }
    }

    /// Context with no parameter, used when evaluating constants at build time.
    pub fn detached() -> MapContext<'static> {
        MapContext::new(None)
    }

    /// The auxiliary parameter, if one was passed and has type `P`.
    pub fn parameter<P: Any>(&self) -> Option<&'a P> {
        self.parameter?.downcast_ref::<P>()
    }

    /// The auxiliary parameter without a type check.
    pub fn raw_parameter(&self) -> Option<&'a (dyn Any + Send + Sync)> {
        self.parameter
    }

    /// Store a value in the scratch map, replacing any previous value.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.scratch
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), Box::new(value));
    }

    /// Read a value from the scratch map.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.scratch.as_ref()?.get(key)?.downcast_ref::<T>()
    }

    /// Remove a value from the scratch map.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        let value = self.scratch.as_mut()?.remove(key)?;
        value.downcast::<T>().ok().map(|value| *value)
    }

    /// Whether any callback has written to the scratch map during this call.
    pub fn has_scratch(&self) -> bool {
        self.scratch.is_some()
    }
}

impl fmt::Debug for MapContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapContext")
            .field("has_parameter", &self.parameter.is_some())
            .field(
                "scratch_keys",
                &self.scratch.as_ref().map(|scratch| scratch.len()).unwrap_or(0),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_is_typed() {
        let tenant = String::from("acme");
        let ctx = MapContext::new(Some(&tenant));
        assert_eq!(ctx.parameter::<String>().map(String::as_str), Some("acme"));
        assert!(ctx.parameter::<u32>().is_none());
        assert!(MapContext::detached().parameter::<String>().is_none());
    }

    #[test]
    fn test_scratch_is_lazy() {
        let mut ctx = MapContext::detached();
        assert!(!ctx.has_scratch());
        assert!(ctx.get::<u32>("count").is_none());

        ctx.insert("count", 3u32);
        assert!(ctx.has_scratch());
        assert_eq!(ctx.get::<u32>("count"), Some(&3));
        assert_eq!(ctx.remove::<u32>("count"), Some(3));
        assert!(ctx.get::<u32>("count").is_none());
    }
}
