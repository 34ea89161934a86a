//! Account types persisted in the ledger file

use serde::{Deserialize, Serialize};

/// Stable external user identifier, unique and never reused.
pub type UserId = u64;

/// Coarse per-user game statistics.
///
/// These are the auxiliary fields game handlers bump after each round; the
/// ledger keeps them next to the balance so a single file holds everything
/// about a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStats {
    #[serde(default)]
    pub rounds_played: u64,
    #[serde(default)]
    pub rounds_won: u64,
    #[serde(default)]
    pub total_wagered: u64,
    #[serde(default)]
    pub total_paid_out: u64,
}

/// One user's record in the ledger.
///
/// The `extra` map captures keys written by external tooling (manual edits,
/// a separate sync process) so a full-file rewrite never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub balance: u64,
    #[serde(flatten)]
    pub stats: GameStats,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Account {
    /// A fresh account holding the configured starting balance.
    pub fn new(starting_balance: u64) -> Self {
        Self {
            balance: starting_balance,
            ..Self::default()
        }
    }
}
