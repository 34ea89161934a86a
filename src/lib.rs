//! chipbank - shared economy ledger for chat minigame bots
//!
//! All the minigame handlers of a bot (coin flip, dice, slots, cards, daily
//! rewards, admin grants) read and mutate the same balances concurrently.
//! This crate is the core they share:
//! - ledger: the authoritative balance store, its file persistence and the
//!   external-change watcher
//! - wager: bet expression parsing and validation
//! - session: the per-user exclusive game slot
//! - rate_limit: the per-user sliding-window command throttle
//! - economy: the facade wiring it all together for command handlers
//!
//! Command dispatch, game rules and all platform I/O live in the host bot
//! and talk to this crate through [`Economy`].

pub mod config;
pub mod economy;
pub mod error;
pub mod ledger;
pub mod rate_limit;
pub mod session;
pub mod wager;

// Re-export commonly used types for easy access
pub use config::{EconomyConfig, FlushPolicy, RateLimitConfig};
pub use economy::{CallerPrivileges, Economy, NoPrivileges};
pub use error::{Error, Result};
pub use ledger::{
    Account, BalanceStore, FileWatcher, GameStats, LedgerFile, ReloadReport, UserId, WatcherStatus,
};
pub use rate_limit::RateLimiter;
pub use session::{SessionGuard, SessionTicket};
pub use wager::PendingWager;
