//! Running-balance chain checks.
//!
//! Ordered by id, every entry's balance must equal its predecessor's balance
//! minus its own amount, and ids must run 1..N without gaps. The first entry's
//! balance is taken as given.

use super::LedgerEntry;
use std::fmt;

/// First place where the chain stops holding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainBreak {
    /// `id` does not directly follow `previous_id` (or the ledger does not start at 1).
    IdGap { previous_id: Option<i64>, id: i64 },
    /// Balance disagrees with predecessor balance minus amount.
    Balance { id: i64, expected: i64, actual: i64 },
}

impl ChainBreak {
    pub fn id(&self) -> i64 {
        match self {
            ChainBreak::IdGap { id, .. } | ChainBreak::Balance { id, .. } => *id,
        }
    }
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainBreak::IdGap {
                previous_id: Some(prev),
                id,
            } => write!(f, "entry {} follows entry {}", id, prev),
            ChainBreak::IdGap {
                previous_id: None,
                id,
            } => write!(f, "ledger starts at entry {} instead of 1", id),
            ChainBreak::Balance {
                id,
                expected,
                actual,
            } => write!(
                f,
                "entry {} has balance {} but its predecessor implies {}",
                id, actual, expected
            ),
        }
    }
}

/// One row of the chain as seen by the checker. `previous` is the
/// immediately preceding row by id, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub id: i64,
    pub amount: i64,
    pub balance: i64,
    pub previous: Option<(i64, i64)>,
}

impl ChainLink {
    pub fn check(&self) -> Option<ChainBreak> {
        match self.previous {
            None if self.id != 1 => Some(ChainBreak::IdGap {
                previous_id: None,
                id: self.id,
            }),
            None => None,
            Some((prev_id, _)) if prev_id.checked_add(1) != Some(self.id) => {
                Some(ChainBreak::IdGap {
                    previous_id: Some(prev_id),
                    id: self.id,
                })
            }
            Some((_, prev_balance)) => {
                let expected = prev_balance.checked_sub(self.amount);
                if expected == Some(self.balance) {
                    None
                } else {
                    Some(ChainBreak::Balance {
                        id: self.id,
                        expected: expected.unwrap_or(i64::MIN),
                        actual: self.balance,
                    })
                }
            }
        }
    }
}

/// Check `entries` (sorted by id ascending) for links at or after `from_id`.
pub fn find_chain_break(entries: &[LedgerEntry], from_id: i64) -> Option<ChainBreak> {
    let mut previous: Option<(i64, i64)> = None;
    for entry in entries {
        if entry.id >= from_id {
            let link = ChainLink {
                id: entry.id,
                amount: entry.amount,
                balance: entry.balance,
                previous,
            };
            if let Some(broken) = link.check() {
                return Some(broken);
            }
        }
        previous = Some((entry.id, entry.balance));
    }
    None
}
