// 🛡️ Consistency Guard - Block bulk writes that would erase most matches
//
// Unsafe when:
//   current < min_floor
//   prior known and (prior - current) / prior > max_drop_pct
//
// A trip halts the whole regeneration cycle; nothing is written.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub safe: bool,
    pub message: String,
    pub current: u64,
    pub prior: Option<u64>,

    /// Relative drop in percent (None when prior unknown or zero)
    pub drop_pct: Option<f64>,
}

impl fmt::Display for GuardVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = if self.safe { "✅" } else { "🛑" };
        write!(f, "{} {}", icon, self.message)
    }
}

pub struct ConsistencyGuard {
    /// Absolute minimum number of matches (default: 1)
    pub min_floor: u64,

    /// Max tolerated drop vs prior, in percent (default: 20.0)
    pub max_drop_pct: f64,
}

impl ConsistencyGuard {
    pub fn new(min_floor: u64, max_drop_pct: f64) -> Self {
        ConsistencyGuard {
            min_floor,
            max_drop_pct,
        }
    }

    pub fn check_safe(&self, current: u64, prior: Option<u64>) -> GuardVerdict {
        let drop_pct = prior.filter(|p| *p > 0).map(|p| {
            if current >= p {
                0.0
            } else {
                (p - current) as f64 / p as f64 * 100.0
            }
        });

        let verdict = |safe: bool, message: String| GuardVerdict {
            safe,
            message,
            current,
            prior,
            drop_pct,
        };

        if current < self.min_floor {
            return verdict(
                false,
                format!(
                    "Blocked: {} matches is below the floor of {}. Live matches were left untouched; check that startups and investors loaded before regenerating.",
                    current, self.min_floor
                ),
            );
        }

        if let (Some(p), Some(pct)) = (prior, drop_pct) {
            if pct > self.max_drop_pct {
                return verdict(
                    false,
                    format!(
                        "Blocked: match count would drop {:.1}% ({} → {}), above the {:.1}% limit. Live matches were left untouched; investigate upstream inputs or raise guard.max_drop_pct for this run.",
                        pct, p, current, self.max_drop_pct
                    ),
                );
            }
        }

        let message = match (prior, drop_pct) {
            (Some(p), Some(pct)) => format!("Safe: {} matches (prior {}, drop {:.1}%)", current, p, pct),
            _ => format!("Safe: {} matches (no prior snapshot)", current),
        };
        verdict(true, message)
    }
}

impl Default for ConsistencyGuard {
    fn default() -> Self {
        Self::new(1, 20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_large_drop() {
        let guard = ConsistencyGuard::default();

        let verdict = guard.check_safe(167_949, Some(388_744));

        assert!(!verdict.safe);
        assert!(verdict.drop_pct.unwrap() > 56.0);
        assert!(verdict.message.contains("388744 → 167949"));
    }

    #[test]
    fn test_allows_small_drop_and_growth() {
        let guard = ConsistencyGuard::default();

        assert!(guard.check_safe(900, Some(1_000)).safe);
        assert!(guard.check_safe(800, Some(1_000)).safe); // exactly 20%
        assert!(guard.check_safe(5_000, Some(1_000)).safe);
        assert!(!guard.check_safe(799, Some(1_000)).safe);
    }

    #[test]
    fn test_floor_applies_without_prior() {
        let guard = ConsistencyGuard::new(100, 20.0);

        let verdict = guard.check_safe(10, None);

        assert!(!verdict.safe);
        assert!(verdict.message.contains("below the floor"));
        assert!(guard.check_safe(100, None).safe);
    }

    #[test]
    fn test_zero_prior_has_no_drop() {
        let guard = ConsistencyGuard::default();

        let verdict = guard.check_safe(5, Some(0));

        assert!(verdict.safe);
        assert_eq!(verdict.drop_pct, None);
    }

    #[test]
    fn test_verdict_display() {
        let verdict = ConsistencyGuard::default().check_safe(0, Some(10));

        assert!(verdict.to_string().starts_with("🛑 Blocked"));
    }
}
