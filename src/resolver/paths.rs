//! Source member paths: explicit dotted paths and flattened matches.

use crate::config::NameMatcher;
use crate::core::{Record, TypeInfo};
use crate::plan::{MemberPath, PathStep};

/// Deepest flattened path, in segments.
const MAX_FLATTEN_DEPTH: usize = 4;

/// Resolve a dotted path such as `customer.address.city` against `S`.
///
/// Every segment must name a readable member; an `Option` segment is
/// unwrapped before descending into it.
pub(crate) fn parse_path<S: Record>(path: &str) -> Option<MemberPath<S>> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let head = S::members()
        .iter()
        .find(|member| member.name() == first)?;
    let getter = head.getter()?;

    let mut ty = head.ty();
    let mut steps = Vec::new();
    for segment in segments {
        let (unwrap, record) = match ty.nullable_shape() {
            Some(shape) => (Some(shape.unwrap_ref), (shape.inner)()),
            None => (None, ty),
        };
        let shape = record.record_shape()?;
        let member = (shape.members)()
            .into_iter()
            .find(|member| member.name == segment && member.readable)?;
        steps.push(PathStep {
            unwrap,
            member_ref: shape.member_ref,
            index: member.index,
        });
        ty = (member.ty)();
    }

    Some(MemberPath {
        head: getter,
        steps,
        terminal: ty,
        display: path.to_string(),
    })
}

/// Single-segment path for a readable member of `S`.
pub(crate) fn member_path<S: Record>(name: &'static str) -> Option<MemberPath<S>> {
    let member = S::members().iter().find(|member| member.name() == name)?;
    Some(MemberPath {
        head: member.getter()?,
        steps: Vec::new(),
        terminal: member.ty(),
        display: name.to_string(),
    })
}

/// Find a nested source path whose segment names, joined with `_`, match
/// `target` (`customer_name` matches `customer.name`).
pub(crate) fn flatten<S: Record>(target: &str, matcher: NameMatcher) -> Option<MemberPath<S>> {
    for member in S::members() {
        let Some(head) = member.getter() else {
            continue;
        };
        let mut names = vec![member.name()];
        let mut steps = Vec::new();
        if let Some(terminal) = descend(member.ty(), &mut names, &mut steps, target, matcher) {
            return Some(MemberPath {
                head,
                steps,
                terminal,
                display: names.join("."),
            });
        }
    }
    None
}

fn descend(
    ty: TypeInfo,
    names: &mut Vec<&'static str>,
    steps: &mut Vec<PathStep>,
    target: &str,
    matcher: NameMatcher,
) -> Option<TypeInfo> {
    if names.len() >= MAX_FLATTEN_DEPTH {
        return None;
    }
    let (unwrap, record) = match ty.nullable_shape() {
        Some(shape) => (Some(shape.unwrap_ref), (shape.inner)()),
        None => (None, ty),
    };
    let shape = record.record_shape()?;

    for member in (shape.members)() {
        if !member.readable {
            continue;
        }
        names.push(member.name);
        steps.push(PathStep {
            unwrap,
            member_ref: shape.member_ref,
            index: member.index,
        });

        let member_ty = (member.ty)();
        if matcher.matches(target, &names.join("_")) {
            return Some(member_ty);
        }
        if let Some(found) = descend(member_ty, names, steps, target, matcher) {
            return Some(found);
        }

        names.pop();
        steps.pop();
    }
    None
}
