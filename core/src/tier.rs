//! Loyalty tiers and the wager-to-tier mapping.
//!
//! RULE: The mapping is a pure function over an ordered threshold
//! table. No caller re-implements the cutoffs; reclassification,
//! tooling, and tests all go through `tier_for_wager`.

use serde::{Deserialize, Serialize};

/// Loyalty rank, ordered lowest to highest. The derived `Ord` is what
/// "promotion" and "demotion" mean everywhere in the core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
            Tier::Diamond => "diamond",
        }
    }

    /// Parse the store's TEXT representation. Unknown strings fall
    /// back to the base tier rather than poisoning a whole batch.
    pub fn parse(s: &str) -> Self {
        match s {
            "diamond" => Tier::Diamond,
            "platinum" => Tier::Platinum,
            "gold" => Tier::Gold,
            _ => Tier::Silver,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descending wager cutoffs, first match wins. All cutoffs are
/// exclusive: a wager exactly at a cutoff stays in the tier below.
const TIER_CUTOFFS: &[(f64, Tier)] = &[
    (100_000.0, Tier::Diamond),
    (50_000.0, Tier::Platinum),
    (10_000.0, Tier::Gold),
];

/// Map a cumulative wager total to its loyalty tier.
pub fn tier_for_wager(total_wager: f64) -> Tier {
    for &(cutoff, tier) in TIER_CUTOFFS {
        if total_wager > cutoff {
            return tier;
        }
    }
    Tier::Silver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoffs_are_exclusive() {
        assert_eq!(tier_for_wager(100_000.0), Tier::Platinum);
        assert_eq!(tier_for_wager(100_000.01), Tier::Diamond);
        assert_eq!(tier_for_wager(50_000.0), Tier::Gold);
        assert_eq!(tier_for_wager(10_000.0), Tier::Silver);
    }

    #[test]
    fn tier_order_matches_wager_order() {
        assert!(Tier::Silver < Tier::Gold);
        assert!(Tier::Gold < Tier::Platinum);
        assert!(Tier::Platinum < Tier::Diamond);
    }

    #[test]
    fn text_round_trip() {
        for tier in [Tier::Silver, Tier::Gold, Tier::Platinum, Tier::Diamond] {
            assert_eq!(Tier::parse(tier.as_str()), tier);
        }
    }
}
