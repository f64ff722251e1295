//! Command fingerprinting

use runcached_core::CommandSpec;
use sha2::{Digest, Sha256};
use std::fmt;

/// Separator fed to the hasher between elements
///
/// NUL cannot occur inside a process argument, so `["a b"]` and `["a", "b"]`
/// never produce the same hash input.
const ELEMENT_DELIMITER: &[u8] = b"\0";

/// Hex digest identifying a command, shared stem of its cache and lock files
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hex string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the fingerprint of a command specification
pub fn fingerprint(spec: &CommandSpec) -> Fingerprint {
    let mut hasher = Sha256::new();
    for (index, element) in spec.iter().enumerate() {
        if index > 0 {
            hasher.update(ELEMENT_DELIMITER);
        }
        hasher.update(element.as_bytes());
    }
    Fingerprint(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(parts: &[&str]) -> CommandSpec {
        CommandSpec::new(parts.iter().copied()).unwrap()
    }

    #[test]
    fn test_fixed_length_hex() {
        let fp = fingerprint(&spec(&["echo", "hello"]));
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.short().len(), 12);
    }

    #[test]
    fn test_stable_across_calls() {
        let a = fingerprint(&spec(&["df", "-h", "/"]));
        let b = fingerprint(&spec(&["df", "-h", "/"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_known_digest() {
        // sha256("echo\0hello"); on-disk keys must not drift between releases
        let fp = fingerprint(&spec(&["echo", "hello"]));
        assert_eq!(
            fp.as_str(),
            "6d9387f23a79ea8f3b0f1b033f7c1990e31eea0d290d3a889e37ae698c8b5eb4"
        );
    }

    #[test]
    fn test_sensitive_to_boundaries_order_and_whitespace() {
        let base = fingerprint(&spec(&["echo", "a b"]));
        assert_ne!(base, fingerprint(&spec(&["echo", "a", "b"])));
        assert_ne!(base, fingerprint(&spec(&["a b", "echo"])));
        assert_ne!(base, fingerprint(&spec(&["echo", "a  b"])));
        assert_ne!(base, fingerprint(&spec(&["echo", "a b "])));
        assert_ne!(base, fingerprint(&spec(&["echo", "a c"])));
    }

    proptest! {
        #[test]
        fn prop_deterministic(parts in prop::collection::vec(".*", 1..6)) {
            let spec = CommandSpec::new(parts.clone()).unwrap();
            let again = CommandSpec::new(parts).unwrap();
            prop_assert_eq!(fingerprint(&spec), fingerprint(&again));
        }

        #[test]
        fn prop_one_character_changes_digest(
            parts in prop::collection::vec("[a-z]{0,8}", 1..6),
            index in any::<prop::sample::Index>(),
            extra in "[a-z]",
        ) {
            let original = CommandSpec::new(parts.clone()).unwrap();
            let mut changed = parts;
            let i = index.index(changed.len());
            changed[i].push_str(&extra);
            let changed = CommandSpec::new(changed).unwrap();
            prop_assert_ne!(fingerprint(&original), fingerprint(&changed));
        }
    }
}
