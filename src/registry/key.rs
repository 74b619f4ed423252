//! Registry keys.

use std::any::TypeId;
use std::fmt;
use std::hash::BuildHasher;

use crate::core::TypeInfo;
use crate::plan::Profile;

/// Odd multiplier that makes the pair hash order-sensitive.
const DESTINATION_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Identity of one registry entry.
#[derive(Clone, PartialEq, Eq)]
pub struct PairKey {
    pub source: TypeInfo,
    pub destination: TypeInfo,
    pub profile: Option<Profile>,
}

impl PairKey {
    pub fn new(source: TypeInfo, destination: TypeInfo, profile: Option<&str>) -> Self {
        Self {
            source,
            destination,
            profile: profile.map(Profile::from),
        }
    }

    /// Compare against borrowed key parts without building a key.
    pub(crate) fn matches(&self, source: TypeId, destination: TypeId, profile: Option<&str>) -> bool {
        self.source.id() == source
            && self.destination.id() == destination
            && self.profile.as_deref() == profile
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)?;
        if let Some(profile) = &self.profile {
            write!(f, " [{profile}]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// `h(source) ^ h(destination) * odd ^ h(profile)`.
pub(crate) fn hash_parts<H: BuildHasher>(
    hasher: &H,
    source: TypeId,
    destination: TypeId,
    profile: Option<&str>,
) -> u64 {
    hasher.hash_one(source)
        ^ hasher.hash_one(destination).wrapping_mul(DESTINATION_MIX)
        ^ hasher.hash_one(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::DefaultHashBuilder;

    #[test]
    fn test_hash_is_order_sensitive() {
        let hasher = DefaultHashBuilder::default();
        let a = TypeId::of::<u8>();
        let b = TypeId::of::<String>();
        assert_ne!(
            hash_parts(&hasher, a, b, None),
            hash_parts(&hasher, b, a, None)
        );
        assert_ne!(
            hash_parts(&hasher, a, b, None),
            hash_parts(&hasher, a, b, Some("admin"))
        );
        assert_eq!(
            hash_parts(&hasher, a, b, Some("admin")),
            hash_parts(&hasher, a, b, Some("admin"))
        );
    }

    #[test]
    fn test_key_matches_parts() {
        let key = PairKey::new(TypeInfo::of::<u8>(), TypeInfo::of::<String>(), Some("admin"));
        assert!(key.matches(TypeId::of::<u8>(), TypeId::of::<String>(), Some("admin")));
        assert!(!key.matches(TypeId::of::<u8>(), TypeId::of::<String>(), None));
        assert!(!key.matches(TypeId::of::<String>(), TypeId::of::<u8>(), Some("admin")));
        let text = key.to_string();
        assert!(text.starts_with("u8 -> "));
        assert!(text.ends_with("String [admin]"));
    }
}
