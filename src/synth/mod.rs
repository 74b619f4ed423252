// This module implements the Routine Synthesizer: it turns a resolved MappingSpecification into
// a CompiledMapper. Each MemberPlan is lowered once into an Assignment, a small closure tree over
// the getters, setters, converters and fn-pointer tables captured in the plan, so a mapping call
// never inspects types; it only calls through what was captured here. The assignments, factory,
// hooks and global guard are bundled into a shared Routine, and each requested calling shape
// (update, construct, and their parameter-taking variants) is a thin closure over that routine.
// Shapes that were not requested are never built. Nested members are linked to the nested
// mapper facade through a weak reference and resolved on first use, which lets mutually
// recursive pairs be compiled independently.

//! Routine Synthesizer.
//!
//! # Emission order per call
//!
//! 1. per-call [`MapContext`] (scratch storage allocates on first write only);
//! 2. destination construction, for constructing shapes only;
//! 3. before-hooks, in declaration order;
//! 4. the global guard; when it fails no member is assigned;
//! 5. member assignments, in resolved order, each behind its own guard;
//! 6. after-hooks, in declaration order.

use std::sync::{Arc, Weak};

use crate::core::{BuildSession, MapContext, MapError, Record, TypeInfo};
use crate::facade::NestedMappers;
use crate::plan::{ConditionFn, FactoryPlan, HookFn, MappingSpecification, Shapes};

pub mod compiled;
pub(crate) mod emit;

pub use compiled::{CompiledMapper, ErasedMapper, Param};

use compiled::{ConstructFn, UpdateFn};
use emit::{Assignment, NestedLink};

/// Everything one call needs, shared by all compiled shapes.
struct Routine<S, D> {
    destination: TypeInfo,
    assignments: Vec<Assignment<S, D>>,
    factory: FactoryPlan<S, D>,
    before: Vec<HookFn<S, D>>,
    after: Vec<HookFn<S, D>>,
    guard: Option<ConditionFn<S, D>>,
}

impl<S: Record, D: Record> Routine<S, D> {
    fn update(&self, source: &S, destination: &mut D, parameter: Param<'_>) -> Result<(), MapError> {
        let mut ctx = MapContext::new(parameter);
        self.body(source, destination, &mut ctx)
    }

    fn construct(&self, source: &S, parameter: Param<'_>) -> Result<D, MapError> {
        let mut ctx = MapContext::new(parameter);
        let mut destination = self.create(source, &mut ctx)?;
        self.body(source, &mut destination, &mut ctx)?;
        Ok(destination)
    }

    fn create(&self, source: &S, ctx: &mut MapContext<'_>) -> Result<D, MapError> {
        match &self.factory {
            FactoryPlan::Custom(factory) => factory(source, ctx),
            FactoryPlan::Fallback(factory) => factory()
                .downcast::<D>()
                .map(|destination| *destination)
                .map_err(|_| MapError::TypeMismatch {
                    expected: self.destination.name(),
                }),
            FactoryPlan::Default => Ok(D::default()),
        }
    }

    fn body(&self, source: &S, destination: &mut D, ctx: &mut MapContext<'_>) -> Result<(), MapError> {
        for hook in &self.before {
            hook(source, destination, ctx)?;
        }

        let proceed = match &self.guard {
            Some(guard) => guard(source, destination, ctx)?,
            None => true,
        };
        if proceed {
            for assignment in &self.assignments {
                assignment.apply(source, destination, ctx)?;
            }
        }

        for hook in &self.after {
            hook(source, destination, ctx)?;
        }
        Ok(())
    }
}

fn update_fn<S, D, F>(f: F) -> UpdateFn<S, D>
where
    F: Fn(&S, &mut D, Param<'_>) -> Result<(), MapError> + Send + Sync + 'static,
{
    Box::new(f)
}

fn construct_fn<S, D, F>(f: F) -> ConstructFn<S, D>
where
    F: Fn(&S, Param<'_>) -> Result<D, MapError> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Compile the requested calling shapes of `spec`.
///
/// `facade` resolves nested members on first use; the auxiliary parameter is
/// handed on to nested mappers only when `spec` declares one.
pub fn synthesize<S: Record, D: Record>(
    spec: MappingSpecification<S, D>,
    facade: Weak<dyn NestedMappers>,
    session: &mut BuildSession,
) -> CompiledMapper<S, D> {
    let link = NestedLink::new(facade, spec.parameter.is_some());
    let mut assignments = Vec::with_capacity(spec.members.len());
    for plan in spec.members {
        let name = plan.target.name;
        match Assignment::new(plan, &link) {
            Some(assignment) => assignments.push(assignment),
            None => log::warn!("{}: member `{}` has no value source, skipped", session.pair(), name),
        }
    }

    let routine = Arc::new(Routine {
        destination: spec.destination,
        assignments,
        factory: spec.factory,
        before: spec.before,
        after: spec.after,
        guard: spec.guard,
    });
    let shapes = spec.shapes;

    let update = shapes.contains(Shapes::UPDATE).then(|| {
        let routine = Arc::clone(&routine);
        update_fn(move |source: &S, destination: &mut D, _: Param<'_>| {
            routine.update(source, destination, None)
        })
    });
    let construct = shapes.contains(Shapes::CONSTRUCT).then(|| {
        let routine = Arc::clone(&routine);
        construct_fn(move |source: &S, _: Param<'_>| routine.construct(source, None))
    });
    let update_with = shapes.contains(Shapes::UPDATE_WITH).then(|| {
        let routine = Arc::clone(&routine);
        update_fn(move |source: &S, destination: &mut D, parameter: Param<'_>| {
            routine.update(source, destination, parameter)
        })
    });
    let construct_with = shapes.contains(Shapes::CONSTRUCT_WITH).then(|| {
        let routine = Arc::clone(&routine);
        construct_fn(move |source: &S, parameter: Param<'_>| routine.construct(source, parameter))
    });

    for _ in 0..shapes.bits().count_ones() {
        session.record_shape();
    }
    log::debug!(
        "compiled {}: {} assignments, shapes {:?}",
        session.pair(),
        routine.assignments.len(),
        shapes
    );
    for assignment in &routine.assignments {
        log::trace!("{}: assigns `{}`", session.pair(), assignment.name());
    }

    CompiledMapper {
        source: spec.source,
        destination: spec.destination,
        profile: spec.profile,
        parameter: spec.parameter,
        update,
        construct,
        update_with,
        construct_with,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefaultsConfig, MappingConfig};
    use crate::resolver::resolve;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Source {
        value1: i32,
        secret: String,
    }

    crate::record!(Source { value1: i32, secret: String });

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Target {
        value1: String,
        secret: String,
        log: Vec<String>,
    }

    crate::record!(Target { value1: String, secret: String, log: Vec<String> });

    fn compile(config: MappingConfig<Source, Target>) -> CompiledMapper<Source, Target> {
        let mut session = BuildSession::new("Source -> Target");
        let spec = resolve(&config, &DefaultsConfig::new(), &mut session).unwrap();
        let facade: Weak<dyn NestedMappers> = Weak::<crate::Mapper>::new();
        synthesize(spec, facade, &mut session)
    }

    fn source() -> Source {
        Source {
            value1: 42,
            secret: "TopSecret".into(),
        }
    }

    #[test]
    fn test_update_converts_matched_members() {
        let mapper = compile(MappingConfig::new().ignore("secret").ignore("log"));
        let mut target = Target {
            secret: "Original".into(),
            ..Target::default()
        };
        mapper.update(&source(), &mut target).unwrap();
        assert_eq!(target.value1, "42");
        assert_eq!(target.secret, "Original");
    }

    #[test]
    fn test_hooks_surround_assignments() {
        let config = MappingConfig::new()
            .ignore("log")
            .before(|_: &Source, target: &mut Target| {
                let seen = format!("before:{}", target.value1);
                target.log.push(seen);
            })
            .after(|_: &Source, target: &mut Target| {
                let seen = format!("after:{}", target.value1);
                target.log.push(seen);
            });
        let target = compile(config).construct(&source()).unwrap();
        assert_eq!(target.log, ["before:", "after:42"]);
    }

    #[test]
    fn test_global_guard_skips_members_not_hooks() {
        let config = MappingConfig::new()
            .ignore("log")
            .guard(|source: &Source| source.value1 > 100)
            .after(|_: &Source, target: &mut Target| target.log.push("after".into()));
        let target = compile(config).construct(&source()).unwrap();
        assert_eq!(target.value1, "");
        assert_eq!(target.log, ["after"]);
    }

    #[test]
    fn test_only_requested_shapes_are_compiled() {
        let mapper = compile(MappingConfig::new().ignore("log").shapes(Shapes::UPDATE));
        assert_eq!(mapper.shapes(), Shapes::UPDATE);
        assert!(matches!(
            mapper.construct(&source()),
            Err(MapError::ShapeNotCompiled { shape: "construct", .. })
        ));
    }

    #[test]
    fn test_context_scratch_is_shared_by_callbacks() {
        let config = MappingConfig::new()
            .ignore("log")
            .before_ctx(|source: &Source, _: &mut Target, ctx: &mut MapContext<'_>| {
                ctx.insert("doubled", source.value1 * 2);
            })
            .map_from_ctx("secret", |_: &Source, ctx: &mut MapContext<'_>| {
                ctx.get::<i32>("doubled").map(ToString::to_string).unwrap_or_default()
            });
        let target = compile(config).construct(&source()).unwrap();
        assert_eq!(target.secret, "84");
    }

    #[test]
    fn test_absent_source_shortcuts() {
        let mapper = compile(MappingConfig::new());
        assert_eq!(mapper.construct_opt(None).unwrap(), None);

        let mut target = Target::default();
        mapper.update_opt(None, &mut target).unwrap();
        assert_eq!(target, Target::default());
    }
}
