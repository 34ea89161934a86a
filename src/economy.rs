//! The economy facade consumed by command handlers
//!
//! One explicitly constructed [`Economy`] instance wires the balance store,
//! session guard, rate limiter and file watcher together. Hosts create it
//! on startup, hand it (behind an `Arc`) to every command handler, and call
//! [`Economy::shutdown`] before exiting so acknowledged mutations reach
//! disk.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{EconomyConfig, FlushPolicy};
use crate::error::{Error, Result};
use crate::ledger::{BalanceStore, FileWatcher, ReloadReport, UserId, WatcherStatus};
use crate::rate_limit::RateLimiter;
use crate::session::{SessionGuard, SessionTicket};
use crate::wager::{self, PendingWager};

/// Capabilities the command-dispatch layer grants a caller.
///
/// The core depends on the dispatch layer only through this interface; it
/// never inspects the caller beyond what the trait answers.
pub trait CallerPrivileges: Send + Sync {
    /// Whether this caller's commands bypass the per-user rate limit.
    fn bypasses_rate_limit(&self, user: UserId) -> bool;
}

/// A caller with no special capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrivileges;

impl CallerPrivileges for NoPrivileges {
    fn bypasses_rate_limit(&self, _user: UserId) -> bool {
        false
    }
}

struct FlushTask {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Handle to the whole economy core.
pub struct Economy {
    store: Arc<BalanceStore>,
    sessions: Arc<SessionGuard>,
    limiter: RateLimiter,
    watcher: FileWatcher,
    flush_task: parking_lot::Mutex<Option<FlushTask>>,
    config: EconomyConfig,
}

impl Economy {
    /// Validate the config, load the ledger and start the batched flush
    /// task when configured. The file watcher is not started here; that is
    /// an administrative action (`start_file_watching`).
    pub async fn open(config: EconomyConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(BalanceStore::open(&config).await?);
        let watcher = FileWatcher::new(Arc::clone(&store));
        let limiter = RateLimiter::new(&config.rate_limit);

        let economy = Self {
            store,
            sessions: Arc::new(SessionGuard::new()),
            limiter,
            watcher,
            flush_task: parking_lot::Mutex::new(None),
            config,
        };

        if let FlushPolicy::Batched { interval } = economy.config.flush {
            economy.spawn_flush_task(interval);
        }

        Ok(economy)
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    // --- command-handler boundary -------------------------------------

    pub async fn get_balance(&self, user: UserId) -> u64 {
        self.store.get_balance(user).await
    }

    pub async fn add_balance(&self, user: UserId, amount: u64) -> Result<u64> {
        self.store.add_balance(user, amount).await
    }

    pub async fn subtract_balance(&self, user: UserId, amount: u64) -> Result<u64> {
        self.store.subtract_balance(user, amount).await
    }

    /// Resolve a raw wager expression against the user's current balance.
    pub async fn parse_bet_amount(&self, user: UserId, raw: &str) -> PendingWager {
        let balance = self.store.get_balance(user).await;
        wager::resolve(raw, balance)
    }

    /// Claim the user's exclusive game slot; false if a round is already
    /// running for them.
    pub fn start_game_for_user(&self, user: UserId) -> bool {
        self.sessions.begin(user)
    }

    /// Release the user's game slot. Idempotent; must be called on every
    /// exit path of a round.
    pub fn end_game_for_user(&self, user: UserId) -> bool {
        self.sessions.end(user)
    }

    pub fn user_in_game(&self, user: UserId) -> bool {
        self.sessions.is_active(user)
    }

    /// Claim the slot as a drop-guard ticket instead of the begin/end pair.
    pub fn game_session(&self, user: UserId) -> Result<SessionTicket> {
        self.sessions
            .ticket(user)
            .ok_or(Error::AlreadyActive(user))
    }

    /// Throttle check for one command invocation. Privileged callers are
    /// never counted or limited.
    pub fn check_command_rate(&self, user: UserId, caller: &dyn CallerPrivileges) -> Result<()> {
        if caller.bypasses_rate_limit(user) {
            return Ok(());
        }
        let now = Instant::now();
        if self.limiter.is_limited(user, now) {
            return Err(Error::RateLimited {
                retry_after: self.limiter.reset_time(user, now),
            });
        }
        self.limiter.record(user, now);
        Ok(())
    }

    /// Record coarse statistics for a finished round.
    pub async fn record_game_result(&self, user: UserId, wagered: u64, paid_out: u64) {
        self.store.record_game_result(user, wagered, paid_out).await;
    }

    pub async fn reload_data(&self) -> Result<ReloadReport> {
        self.store.reload_data().await
    }

    pub async fn total_money_in_system(&self) -> u64 {
        self.store.total_money_in_system().await
    }

    pub async fn user_count(&self) -> usize {
        self.store.user_count().await
    }

    pub async fn all_users_with_money(&self, limit: Option<usize>) -> Vec<(UserId, u64)> {
        self.store.all_users_with_money(limit).await
    }

    // --- administrative boundary --------------------------------------

    pub async fn set_balance(&self, user: UserId, amount: u64) {
        self.store.set_balance(user, amount).await;
    }

    /// Start polling the ledger file for external changes. Returns false if
    /// the watcher is already running.
    pub fn start_file_watching(&self, interval: Duration) -> bool {
        self.watcher.start(interval)
    }

    /// Stop the watcher. Returns false if it was not running.
    pub fn stop_file_watching(&self) -> bool {
        self.watcher.stop()
    }

    pub fn watcher_status(&self) -> WatcherStatus {
        self.watcher.status()
    }

    /// Stop background tasks and perform the mandatory final flush. Every
    /// mutation acknowledged before this call is on disk when it returns.
    pub async fn shutdown(&self) -> Result<()> {
        self.watcher.stop();

        let task = self.flush_task.lock().take();
        if let Some(task) = task {
            task.shutdown.notify_one();
            let _ = task.handle.await;
        }

        self.store.flush().await
    }

    fn spawn_flush_task(&self, interval: Duration) {
        let store = Arc::clone(&self.store);
        let shutdown = Arc::new(Notify::new());
        let notify = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush().await {
                            log::warn!("periodic ledger flush failed: {e}");
                        }
                    }
                    _ = notify.notified() => break,
                }
            }
            log::debug!("flush task stopped");
        });

        *self.flush_task.lock() = Some(FlushTask { shutdown, handle });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct AdminCaller;

    impl CallerPrivileges for AdminCaller {
        fn bypasses_rate_limit(&self, _user: UserId) -> bool {
            true
        }
    }

    fn config_in(dir: &TempDir) -> EconomyConfig {
        EconomyConfig {
            ledger_path: dir.path().join("economy.json"),
            ..EconomyConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rate_limit_bypass_is_per_caller() {
        let dir = TempDir::new().unwrap();
        let economy = Economy::open(config_in(&dir)).await.unwrap();

        let max = economy.config().rate_limit.max_commands;
        for _ in 0..max {
            economy.check_command_rate(1, &NoPrivileges).unwrap();
        }
        let err = economy.check_command_rate(1, &NoPrivileges).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));

        // the same user through a privileged caller is not throttled
        economy.check_command_rate(1, &AdminCaller).unwrap();
        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_game_session_ticket_reports_conflict() {
        let dir = TempDir::new().unwrap();
        let economy = Economy::open(config_in(&dir)).await.unwrap();

        let ticket = economy.game_session(1).unwrap();
        assert!(matches!(
            economy.game_session(1),
            Err(Error::AlreadyActive(1))
        ));
        drop(ticket);
        assert!(economy.game_session(1).is_ok());
        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_batched_flush_persists_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        // long interval: only the shutdown flush can write the file
        config.flush = FlushPolicy::Batched {
            interval: Duration::from_secs(3600),
        };

        let economy = Economy::open(config.clone()).await.unwrap();
        economy.set_balance(1, 999).await;
        economy.shutdown().await.unwrap();

        let reopened = Economy::open(config).await.unwrap();
        assert_eq!(reopened.get_balance(1).await, 999);
        reopened.shutdown().await.unwrap();
    }
}
