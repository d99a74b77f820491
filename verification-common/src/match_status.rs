use crate::verification_match::Match;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User-facing match level. `Perfect` means the metadata hash of the
/// recompiled and the on-chain bytecode is bit-identical; `Partial` means the
/// bytecodes match only after accounting for metadata-trailer differences.
/// The derived `Ord` relies on variant order: `Partial < Perfect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Partial,
    Perfect,
}

impl MatchStatus {
    pub fn from_match(r#match: &Match) -> Self {
        if r#match.metadata_match {
            MatchStatus::Perfect
        } else {
            MatchStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Perfect => "perfect",
            MatchStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perfect" => Ok(MatchStatus::Perfect),
            "partial" => Ok(MatchStatus::Partial),
            _ => Err(format!("unknown match status: {s}")),
        }
    }
}

/// `(runtime, creation)` status pair of a verification; `None` means the
/// corresponding side did not match.
pub type MatchStatusPair = (Option<MatchStatus>, Option<MatchStatus>);

/// Rank used when choosing the best row for a deployment, preferring
/// `(perfect, perfect) > (perfect, partial) > (partial, perfect) >
/// (partial, partial)`, with the runtime side as the more significant axis.
pub fn status_pair_rank(pair: &MatchStatusPair) -> (u8, u8) {
    let axis = |status: &Option<MatchStatus>| match status {
        Some(MatchStatus::Perfect) => 2,
        Some(MatchStatus::Partial) => 1,
        None => 0,
    };
    (axis(&pair.0), axis(&pair.1))
}

/// Whether `new` improves upon `old` under the repointing policy: at least as
/// good on both axes and strictly better on at least one.
pub fn is_status_upgrade(old: &MatchStatusPair, new: &MatchStatusPair) -> bool {
    let (old_runtime, old_creation) = status_pair_rank(old);
    let (new_runtime, new_creation) = status_pair_rank(new);

    new_runtime >= old_runtime
        && new_creation >= old_creation
        && (new_runtime > old_runtime || new_creation > old_creation)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERFECT: Option<MatchStatus> = Some(MatchStatus::Perfect);
    const PARTIAL: Option<MatchStatus> = Some(MatchStatus::Partial);

    #[test]
    fn perfect_beats_partial() {
        assert!(MatchStatus::Perfect > MatchStatus::Partial);
    }

    #[test]
    fn pair_preference_order() {
        let ordered = [
            (PERFECT, PERFECT),
            (PERFECT, PARTIAL),
            (PARTIAL, PERFECT),
            (PARTIAL, PARTIAL),
        ];
        for window in ordered.windows(2) {
            assert!(
                status_pair_rank(&window[0]) > status_pair_rank(&window[1]),
                "{:?} should rank above {:?}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn upgrades_require_strict_improvement_on_an_axis() {
        assert!(is_status_upgrade(&(PARTIAL, PARTIAL), &(PERFECT, PARTIAL)));
        assert!(is_status_upgrade(&(PARTIAL, None), &(PARTIAL, PARTIAL)));
        assert!(is_status_upgrade(&(None, None), &(PARTIAL, None)));

        // equal pairs are not upgrades
        assert!(!is_status_upgrade(&(PERFECT, PARTIAL), &(PERFECT, PARTIAL)));
        // regression on one axis disqualifies even with a gain on the other
        assert!(!is_status_upgrade(&(PERFECT, PARTIAL), &(PARTIAL, PERFECT)));
        assert!(!is_status_upgrade(&(PERFECT, PERFECT), &(PERFECT, PARTIAL)));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [MatchStatus::Perfect, MatchStatus::Partial] {
            assert_eq!(status.as_str().parse::<MatchStatus>().unwrap(), status);
        }
        assert!("full".parse::<MatchStatus>().is_err());
    }
}
