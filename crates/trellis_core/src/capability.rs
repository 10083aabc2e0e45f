//! Capability identifiers used as registry lookup keys.
//!
//! A [`CapabilityId`] is derived from a capability type's **qualified name**
//! using the FNV-1a 64-bit hash algorithm. The same derivation covers both
//! exact component types (`"game.actors.HealthRegen"`) and capability
//! interfaces (`"game.shared.IHealthProvider"`), so a single key space serves
//! every registry lookup. The hash is deterministic, which lets generated
//! code bake capability constants into `const` items.

use serde::{Deserialize, Serialize};

/// Qualified name of the root component-marker capability.
///
/// Every capability interface derives from this marker. It is excluded from
/// registry indexing: looking up "any component at all" is meaningless in a
/// per-entity registry.
pub const BASE_CAPABILITY: &str = "trellis.IComponent";

/// A unique identifier for a capability type, derived from its qualified
/// string name using the FNV-1a 64-bit hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct CapabilityId(pub u64);

impl CapabilityId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`CapabilityId`] for a qualified type name.
    ///
    /// `const`, so generated sources can declare capability constants:
    ///
    /// ```rust
    /// use trellis_core::CapabilityId;
    ///
    /// const I_HEALTH_PROVIDER: CapabilityId =
    ///     CapabilityId::from_name("game.shared.IHealthProvider");
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// The id of the root component-marker capability ([`BASE_CAPABILITY`]).
    #[must_use]
    pub const fn base() -> Self {
        Self::from_name(BASE_CAPABILITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_id_is_stable() {
        let id1 = CapabilityId::from_name("game.shared.IHealthProvider");
        let id2 = CapabilityId::from_name("game.shared.IHealthProvider");
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_capability_id_differs_between_names() {
        assert_ne!(
            CapabilityId::from_name("IHealthProvider"),
            CapabilityId::from_name("IStaminaProvider")
        );
    }

    #[test]
    fn test_fnv1a_known_vector() {
        // FNV-1a 64-bit of the empty string is the offset basis itself.
        assert_eq!(
            CapabilityId::from_name(""),
            CapabilityId(0xcbf2_9ce4_8422_2325)
        );
    }

    #[test]
    fn test_base_capability_matches_name_constant() {
        assert_eq!(CapabilityId::base(), CapabilityId::from_name(BASE_CAPABILITY));
    }
}
