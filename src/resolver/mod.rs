// This module implements the Specification Resolver: the stage that turns a MappingConfig plus
// the owner-wide DefaultsConfig into a MappingSpecification. It enumerates the writable members
// of the destination in declaration order and decides, for each one, whether it is ignored,
// fed by a constant, or read from the source through an explicit path, a provider, a nested
// mapping, a name match or a flattened path. Each read member then gets a Conversion tree from
// the conversion scope, an optional combined guard and an optional sentinel. Problems are
// collected into the BuildSession rather than returned on first sight so every diagnostic of a
// mapping is reported together; the session is turned into a BuildError at the end if any were
// found. Resolution is deterministic and has no side effects beyond the session.

//! Specification Resolver.
//!
//! # Member resolution order
//!
//! 1. explicitly ignored members are left out;
//! 2. an explicit constant, or a constant registered for the member type, wins;
//! 3. otherwise the source is an explicit override (path, provider or nested
//!    mapping) or the first readable source member whose name matches, then
//!    a flattened path; members without a source are left out silently;
//! 4. a source whose type differs needs a conversion path, or resolution fails;
//! 5. members whose source value can be absent pick up a sentinel.

use std::any::TypeId;
use std::sync::Arc;

use crate::config::{DefaultsConfig, MappingConfig, MemberConfig, NameMatcher, SourceOverride};
use crate::core::{
    BuildError, BuildSession, Diagnostic, MapContext, MemberInfo, Record, TypeInfo,
};
use crate::plan::{
    ConditionFn, ConstantValue, Conversion, Declared, FactoryPlan, MappingSpecification,
    MemberPath, MemberPlan, ParamType, Shapes, SourceAccessor, Strategy, TargetMember,
};
use crate::synth::emit;

pub(crate) mod conversion;
pub(crate) mod paths;

use conversion::ConversionScope;

/// Resolve the plan for mapping `S` to `D`.
pub fn resolve<S: Record, D: Record>(
    config: &MappingConfig<S, D>,
    defaults: &DefaultsConfig,
    session: &mut BuildSession,
) -> Result<MappingSpecification<S, D>, BuildError> {
    let mut resolver = Resolver {
        config,
        defaults,
        scope: ConversionScope::new(&config.converters, defaults, config.profile.clone()),
        matcher: config.matcher.unwrap_or(defaults.name_matcher()),
        params: ParamTracker::default(),
    };

    resolver.validate_overrides(session);

    let mut members = Vec::new();
    for (declaration, member) in D::members().iter().enumerate() {
        if let Some(plan) = resolver.member(declaration, member, session) {
            log::trace!(
                "{}: `{}` resolved as {}",
                session.pair(),
                plan.target.name,
                plan.strategy.name()
            );
            members.push(plan);
        }
    }
    members.sort_by_key(|plan| (plan.order, plan.declaration));

    let factory = match &config.factory {
        Some(factory) => {
            resolver.params.note(factory.param, session);
            FactoryPlan::Custom(factory.call.clone())
        }
        None => match defaults.factory(D::type_info()) {
            Some(factory) => FactoryPlan::Fallback(factory.clone()),
            None => FactoryPlan::Default,
        },
    };
    let before = resolver.hooks(&config.before, session);
    let after = resolver.hooks(&config.after, session);
    let guard = resolver.conditions(&config.guards, session);

    let parameter = resolver.params.first;
    let mut shapes = config.shapes;
    if parameter.is_some() {
        shapes.remove(Shapes::PLAIN);
    }
    if shapes.is_empty() {
        let reason = match parameter {
            Some(param) => format!(
                "callbacks require a parameter of type {} but only parameterless shapes were requested",
                param.name
            ),
            None => "no calling shape was requested".to_string(),
        };
        session.report(Diagnostic::NoShapes { reason });
    }

    session.finish()?;
    log::debug!(
        "resolved {}: {} members, parameter {:?}, shapes {:?}",
        session.pair(),
        members.len(),
        parameter.map(|param| param.name),
        shapes
    );

    Ok(MappingSpecification {
        source: S::type_info(),
        destination: D::type_info(),
        profile: config.profile.clone(),
        members,
        factory,
        before,
        after,
        guard,
        parameter,
        shapes,
    })
}

/// The single auxiliary parameter type of a specification.
#[derive(Default)]
struct ParamTracker {
    first: Option<ParamType>,
    reported: Vec<TypeId>,
}

impl ParamTracker {
    fn note(&mut self, param: Option<ParamType>, session: &mut BuildSession) {
        let Some(param) = param else {
            return;
        };
        match self.first {
            None => self.first = Some(param),
            Some(first) if first == param => {}
            Some(first) => {
                if !self.reported.contains(&param.id) {
                    self.reported.push(param.id);
                    session.report(Diagnostic::ConflictingParameterTypes {
                        first: first.name,
                        second: param.name,
                    });
                }
            }
        }
    }
}

struct Resolver<'a, S, D> {
    config: &'a MappingConfig<S, D>,
    defaults: &'a DefaultsConfig,
    scope: ConversionScope<'a>,
    matcher: NameMatcher,
    params: ParamTracker,
}

impl<S: Record, D: Record> Resolver<'_, S, D> {
    /// Report overrides on missing members and members with several sources.
    fn validate_overrides(&self, session: &mut BuildSession) {
        for member in &self.config.members {
            let writable = D::members()
                .iter()
                .any(|info| info.name() == member.name && info.is_writable());
            if !writable {
                session.report(Diagnostic::UnknownMember {
                    member: member.name.clone(),
                });
            } else if !member.ignored && member.sources.len() > 1 {
                session.report(Diagnostic::DuplicateMapping {
                    member: member.name.clone(),
                    count: member.sources.len(),
                });
            }
        }
    }

    fn member(
        &mut self,
        declaration: usize,
        info: &MemberInfo<D>,
        session: &mut BuildSession,
    ) -> Option<MemberPlan<S, D>> {
        let (config, defaults) = (self.config, self.defaults);
        let set = info.setter()?;
        let name = info.name();
        let ty = info.ty();
        let explicit = config.members.iter().find(|member| member.name == name);

        if let Some(explicit) = explicit {
            if explicit.ignored {
                session.record_ignored();
                return None;
            }
            if explicit.sources.len() > 1 {
                return None;
            }
        }

        let mut plan = MemberPlan {
            target: TargetMember { name, ty, set },
            strategy: Strategy::Direct,
            source: None,
            constant: None,
            conversion: None,
            guard: None,
            sentinel: None,
            requires_null_check: false,
            requires_null_coalescing: false,
            order: explicit.and_then(|member| member.order).unwrap_or(0),
            declaration,
        };
        if let Some(explicit) = explicit {
            plan.guard = self.conditions(&explicit.conditions, session);
        }

        let source = explicit.and_then(|member| member.sources.first());
        // A member constant first, then constants by type; both beat any source override.
        let constant = match source {
            Some(SourceOverride::Constant(constant)) => Some(constant),
            _ => config
                .constants
                .get(&ty.id())
                .or_else(|| defaults.constant(ty)),
        };
        if let Some(constant) = constant {
            return self.constant(plan, constant.clone(), session);
        }

        let (accessor, conversion) = match source {
            Some(SourceOverride::Path(path)) => {
                let Some(parsed) = paths::parse_path::<S>(path) else {
                    session.report(Diagnostic::UnknownSourcePath {
                        member: name.to_string(),
                        path: path.clone(),
                    });
                    return None;
                };
                let conversion = self.conversion(name, parsed.terminal, ty, session)?;
                (SourceAccessor::Path(parsed), conversion)
            }
            Some(SourceOverride::Provider { call, output }) => {
                self.params.note(call.param, session);
                let conversion = self.conversion(name, *output, ty, session)?;
                let accessor = SourceAccessor::Provider {
                    call: call.call.clone(),
                    output: *output,
                };
                (accessor, conversion)
            }
            Some(SourceOverride::Nested { path, profile }) => {
                let Some(parsed) = paths::parse_path::<S>(path) else {
                    session.report(Diagnostic::UnknownSourcePath {
                        member: name.to_string(),
                        path: path.clone(),
                    });
                    return None;
                };
                let profile = profile.clone().or_else(|| config.profile.clone());
                let Some(conversion) = self.scope.nested(parsed.terminal, ty, profile) else {
                    session.report(Diagnostic::NoConversion {
                        member: name.to_string(),
                        source_type: parsed.terminal.name(),
                        target_type: ty.name(),
                    });
                    return None;
                };
                (SourceAccessor::Path(parsed), conversion)
            }
            Some(SourceOverride::Constant(_)) | None => {
                let path = self.matched_path(name, session)?;
                let conversion = self.conversion(name, path.terminal, ty, session)?;
                (SourceAccessor::Path(path), conversion)
            }
        };

        self.read_plan(plan, explicit, accessor, conversion, session)
    }

    /// Name-matched source member, then a flattened path.
    fn matched_path(&self, name: &'static str, session: &mut BuildSession) -> Option<MemberPath<S>> {
        let direct = S::members()
            .iter()
            .filter(|member| member.is_readable())
            .find(|member| self.matcher.matches(name, member.name()))
            .and_then(|member| paths::member_path::<S>(member.name()));
        if direct.is_some() {
            return direct;
        }

        match paths::flatten::<S>(name, self.matcher) {
            Some(path) => {
                session.record_flattened();
                Some(path)
            }
            None => {
                session.record_excluded(name);
                None
            }
        }
    }

    fn read_plan(
        &mut self,
        mut plan: MemberPlan<S, D>,
        explicit: Option<&MemberConfig<S, D>>,
        accessor: SourceAccessor<S, D>,
        conversion: Conversion,
        session: &mut BuildSession,
    ) -> Option<MemberPlan<S, D>> {
        let name = plan.target.name;
        let ty = plan.target.ty;

        for coordinates in conversion.nested() {
            let own_pair = coordinates.source == S::type_info()
                && coordinates.target == D::type_info()
                && coordinates.profile == self.config.profile;
            if own_pair {
                session.report(Diagnostic::SelfReferentialNesting {
                    member: name.to_string(),
                    pair: coordinates.to_string(),
                });
                return None;
            }
        }
        for converter in conversion.converters() {
            self.params.note(converter.param(), session);
            session.record_converter();
        }

        plan.requires_null_check =
            matches!(&accessor, SourceAccessor::Path(path) if path.requires_null_check());
        plan.requires_null_coalescing = accessor.value_type().is_nullable() && !ty.is_nullable();

        if !ty.is_nullable() && (plan.requires_null_check || plan.requires_null_coalescing) {
            let sentinel = explicit
                .and_then(|member| member.sentinel.as_ref())
                .or_else(|| self.config.sentinels.get(&ty.id()))
                .or_else(|| self.defaults.sentinel(ty))
                .cloned();
            if let Some(sentinel) = sentinel {
                plan.sentinel = Some(self.fit(name, sentinel, ty, session)?);
            }
        }

        plan.strategy = if plan.sentinel.is_some() {
            Strategy::GuardedBySentinel
        } else if conversion.is_nested() {
            Strategy::Nested
        } else if conversion.is_pass_through() {
            Strategy::Direct
        } else {
            Strategy::ViaConverter
        };
        session.record_member(plan.strategy);

        plan.source = Some(accessor);
        plan.conversion = Some(conversion);
        Some(plan)
    }

    fn constant(
        &mut self,
        mut plan: MemberPlan<S, D>,
        constant: ConstantValue,
        session: &mut BuildSession,
    ) -> Option<MemberPlan<S, D>> {
        plan.constant = Some(self.fit(plan.target.name, constant, plan.target.ty, session)?);
        plan.strategy = Strategy::Constant;
        session.record_member(Strategy::Constant);
        Some(plan)
    }

    /// Convert a constant or sentinel to the member type once, at build time.
    fn fit(
        &self,
        name: &str,
        value: ConstantValue,
        ty: TypeInfo,
        session: &mut BuildSession,
    ) -> Option<ConstantValue> {
        if value.ty() == ty {
            return Some(value);
        }
        let fitted = match self.scope.resolve(value.ty(), ty) {
            Some(conversion) => emit::convert_constant(&conversion, &value, ty),
            None => Err(format!("no conversion from {} to {}", value.ty(), ty)),
        };
        match fitted {
            Ok(fitted) => Some(fitted),
            Err(reason) => {
                session.report(Diagnostic::ConstantConversion {
                    member: name.to_string(),
                    reason,
                });
                None
            }
        }
    }

    fn conversion(
        &self,
        name: &str,
        source: TypeInfo,
        target: TypeInfo,
        session: &mut BuildSession,
    ) -> Option<Conversion> {
        let found = self.scope.resolve(source, target);
        if found.is_none() {
            session.report(Diagnostic::NoConversion {
                member: name.to_string(),
                source_type: source.name(),
                target_type: target.name(),
            });
        }
        found
    }

    /// Combine conditions; all of them must hold.
    fn conditions(
        &mut self,
        conditions: &[Declared<ConditionFn<S, D>>],
        session: &mut BuildSession,
    ) -> Option<ConditionFn<S, D>> {
        for condition in conditions {
            self.params.note(condition.param, session);
        }
        match conditions {
            [] => None,
            [single] => Some(single.call.clone()),
            many => {
                let all: Vec<ConditionFn<S, D>> =
                    many.iter().map(|condition| condition.call.clone()).collect();
                let combined: ConditionFn<S, D> =
                    Arc::new(move |source: &S, destination: &D, ctx: &mut MapContext<'_>| {
                        for condition in &all {
                            if !condition(source, destination, ctx)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    });
                Some(combined)
            }
        }
    }

    fn hooks<F: Clone>(&mut self, hooks: &[Declared<F>], session: &mut BuildSession) -> Vec<F> {
        hooks
            .iter()
            .map(|hook| {
                self.params.note(hook.param, session);
                hook.call.clone()
            })
            .collect()
    }
}
