// This module provides the build session that accompanies one resolve-and-synthesize pass. A
// BuildSession is created by the registry owner for every mapper it builds; the resolver
// reports diagnostics into it instead of failing on the first problem, so every error of a
// specification is surfaced together, and both the resolver and the synthesizer record what
// they did into BuildStats (members resolved per strategy, members excluded, converters
// linked, nested links, flattened paths, shapes compiled). The stats are logged at debug level
// once the mapper is built; the registry keeps its own counters separately.

//! Build session management.
//!
//! This module tracks diagnostics and statistics for a single mapper build.

use std::fmt;

use super::error::{BuildError, Diagnostic};

/// Per-member resolution strategy, as recorded in statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Pass-through copy of an identical (possibly unwrapped) type.
    Direct,
    /// A converter, conversion operator or built-in conversion is applied.
    ViaConverter,
    /// A precomputed constant; the source is never read.
    Constant,
    /// A recursively obtained sub-mapper constructs the value.
    Nested,
    /// An absent source value is replaced by a configured sentinel.
    GuardedBySentinel,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::ViaConverter => "via-converter",
            Strategy::Constant => "constant",
            Strategy::Nested => "nested",
            Strategy::GuardedBySentinel => "guarded-by-sentinel",
        }
    }
}

/// Diagnostics and statistics of one mapper build.
#[derive(Debug)]
pub struct BuildSession {
    /// Display form of the pair being built.
    pair: String,

    /// Problems found so far.
    diagnostics: Vec<Diagnostic>,

    /// Statistics for debugging.
    stats: BuildStats,
}

impl BuildSession {
    /// Create a session for the given pair.
    pub fn new(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            diagnostics: Vec::new(),
            stats: BuildStats::default(),
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Record a resolution problem.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        log::trace!("{}: {}", self.pair, diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Turn collected diagnostics into an error, if there are any.
    pub fn finish(&mut self) -> Result<(), BuildError> {
        if self.diagnostics.is_empty() {
            return Ok(());
        }
        Err(BuildError::Invalid {
            pair: self.pair.clone(),
            diagnostics: std::mem::take(&mut self.diagnostics),
        })
    }

    /// Record a resolved member.
    pub fn record_member(&mut self, strategy: Strategy) {
        self.stats.members_resolved += 1;
        match strategy {
            Strategy::Direct => self.stats.direct += 1,
            Strategy::ViaConverter => self.stats.via_converter += 1,
            Strategy::Constant => self.stats.constants += 1,
            Strategy::Nested => self.stats.nested += 1,
            Strategy::GuardedBySentinel => self.stats.sentinels += 1,
        }
    }

    /// Record a member that had no source and was left out.
    pub fn record_excluded(&mut self, member: &str) {
        log::trace!("{}: member `{}` has no source, excluded", self.pair, member);
        self.stats.members_excluded += 1;
    }

    /// Record an explicitly ignored member.
    pub fn record_ignored(&mut self) {
        self.stats.members_ignored += 1;
    }

    /// Record a member matched through a flattened source path.
    pub fn record_flattened(&mut self) {
        self.stats.flattened += 1;
    }

    /// Record a user converter or conversion operator linked into a member.
    pub fn record_converter(&mut self) {
        self.stats.converters_linked += 1;
    }

    /// Record a compiled calling shape.
    pub fn record_shape(&mut self) {
        self.stats.shapes_compiled += 1;
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }
}

/// Statistics of one mapper build.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildStats {
    /// Members with a resolved plan.
    pub members_resolved: usize,

    /// Members without any source, silently left out.
    pub members_excluded: usize,

    /// Members explicitly ignored.
    pub members_ignored: usize,

    /// Resolved members by strategy.
    pub direct: usize,
    pub via_converter: usize,
    pub constants: usize,
    pub nested: usize,
    pub sentinels: usize,

    /// Members matched through a flattened path.
    pub flattened: usize,

    /// User converters and conversion operators linked.
    pub converters_linked: usize,

    /// Calling shapes compiled.
    pub shapes_compiled: usize,
}

impl fmt::Display for BuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mapper Build Statistics:")?;
        writeln!(f, "  Members resolved: {}", self.members_resolved)?;
        writeln!(f, "  Members excluded: {}", self.members_excluded)?;
        writeln!(f, "  Members ignored: {}", self.members_ignored)?;
        writeln!(
            f,
            "  By strategy: direct {}, converter {}, constant {}, nested {}, sentinel {}",
            self.direct, self.via_converter, self.constants, self.nested, self.sentinels
        )?;
        writeln!(f, "  Flattened paths: {}", self.flattened)?;
        writeln!(f, "  Converters linked: {}", self.converters_linked)?;
        writeln!(f, "  Shapes compiled: {}", self.shapes_compiled)?;
        Ok(())
    }
}
