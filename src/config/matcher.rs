//! Member name matching.

use std::fmt;

/// Decides whether a destination member name matches a source member name.
#[derive(Clone, Copy, Default)]
pub enum NameMatcher {
    /// Names must be identical.
    #[default]
    Exact,
    /// ASCII case is ignored.
    IgnoreCase,
    /// ASCII case and `_` separators are ignored (`order_id` matches `orderId`).
    Flexible,
    /// User-supplied predicate called as `(destination, source)`.
    Custom(fn(&str, &str) -> bool),
}

impl NameMatcher {
    pub fn matches(&self, destination: &str, source: &str) -> bool {
        match self {
            NameMatcher::Exact => destination == source,
            NameMatcher::IgnoreCase => destination.eq_ignore_ascii_case(source),
            NameMatcher::Flexible => {
                let strip = |name: &str| {
                    name.chars()
                        .filter(|c| *c != '_')
                        .map(|c| c.to_ascii_lowercase())
                        .collect::<String>()
                };
                strip(destination) == strip(source)
            }
            NameMatcher::Custom(matcher) => matcher(destination, source),
        }
    }
}

impl fmt::Debug for NameMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NameMatcher::Exact => "Exact",
            NameMatcher::IgnoreCase => "IgnoreCase",
            NameMatcher::Flexible => "Flexible",
            NameMatcher::Custom(_) => "Custom",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_is_default() {
        let matcher = NameMatcher::default();
        assert!(matcher.matches("value1", "value1"));
        assert!(!matcher.matches("value1", "Value1"));
    }

    #[test]
    fn test_relaxed_matchers() {
        assert!(NameMatcher::IgnoreCase.matches("value1", "VALUE1"));
        assert!(!NameMatcher::IgnoreCase.matches("order_id", "orderId"));
        assert!(NameMatcher::Flexible.matches("order_id", "orderId"));
    }

    #[test]
    fn test_custom_matcher() {
        fn prefixed(destination: &str, source: &str) -> bool {
            source.strip_prefix("src_") == Some(destination)
        }
        let matcher = NameMatcher::Custom(prefixed);
        assert!(matcher.matches("id", "src_id"));
        assert!(!matcher.matches("id", "id"));
    }
}
