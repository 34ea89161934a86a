//! Balance ledger: the single source of truth for user balances
//!
//! Every balance mutation in the process goes through [`BalanceStore`].
//! Accounts are guarded individually so unrelated users never contend, while
//! [`BalanceStore::reload_data`] takes the store-wide exclusive section to
//! swap the whole map without tearing in-flight operations.

pub mod account;
pub mod file;
pub mod watcher;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, RwLock};

use crate::config::{EconomyConfig, FlushPolicy};
use crate::error::{Error, Result};

pub use account::{Account, GameStats, UserId};
pub use file::LedgerFile;
pub use watcher::{FileWatcher, WatcherStatus};

/// Attempts per save before giving up until the next mutation.
const SAVE_RETRY_LIMIT: u32 = 3;
/// Base delay between save retries, doubled per attempt.
const SAVE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Aggregate deltas reported by [`BalanceStore::reload_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    pub old_count: usize,
    pub old_total: u64,
    pub new_count: usize,
    pub new_total: u64,
}

type AccountMap = HashMap<UserId, Arc<Mutex<Account>>>;

/// Authoritative mapping of user id to balance.
///
/// Locking layers, outermost first:
/// 1. `flush_lock` orders persistence: snapshot+save pairs, write-through
///    mutations, and `reload_data` all serialize here, so a save that
///    completed before a reload's file read is part of what gets reloaded,
///    and a save that starts later snapshots the post-reload state.
/// 2. `accounts` read/write lock: read for per-account work, write for the
///    reload swap.
/// 3. One mutex per account, giving each user a total order of operations
///    without unrelated users contending.
pub struct BalanceStore {
    accounts: RwLock<AccountMap>,
    file: LedgerFile,
    starting_balance: u64,
    flush_policy: FlushPolicy,
    /// Set on every mutation, cleared by a successful flush.
    dirty: AtomicBool,
    flush_lock: Mutex<()>,
    /// mtime of the file as of our last load or save. The watcher compares
    /// against this, which is what keeps it blind to our own writes.
    last_synced: parking_lot::Mutex<Option<SystemTime>>,
}

impl BalanceStore {
    /// Open the store, loading the ledger file if it exists.
    ///
    /// A missing file is a first run and starts empty. An unparsable file
    /// aborts startup unless `init_fresh_on_corrupt` is set: wiping real
    /// balances by accident is the one thing this store must never do.
    pub async fn open(config: &EconomyConfig) -> Result<Self> {
        let file = LedgerFile::new(&config.ledger_path);

        let accounts = match file.load().await {
            Ok(Some(accounts)) => {
                log::info!("loaded {} accounts from {:?}", accounts.len(), file.path());
                accounts
            }
            Ok(None) => {
                log::info!("no ledger file at {:?}, starting empty", file.path());
                HashMap::new()
            }
            Err(Error::CorruptFile(detail)) if config.init_fresh_on_corrupt => {
                log::warn!("ignoring corrupt ledger ({detail}), starting fresh as configured");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        let last_synced = file.modified().await.unwrap_or(None);

        Ok(Self {
            accounts: RwLock::new(wrap_accounts(accounts)),
            file,
            starting_balance: config.starting_balance,
            flush_policy: config.flush,
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
            last_synced: parking_lot::Mutex::new(last_synced),
        })
    }

    /// Run `op` against the user's account, creating it with the starting
    /// balance on first sight. Holds the outer read lock (or write lock when
    /// creating) for the whole critical section so a concurrent reload can
    /// never strand the mutation in a discarded map.
    async fn with_account<T>(
        &self,
        user: UserId,
        op: impl FnOnce(&mut Account) -> Result<T>,
    ) -> (Result<T>, bool) {
        {
            let map = self.accounts.read().await;
            if let Some(slot) = map.get(&user) {
                let mut account = slot.lock().await;
                return (op(&mut account), false);
            }
        }

        let mut map = self.accounts.write().await;
        let created = !map.contains_key(&user);
        let slot = map
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(Account::new(self.starting_balance))));
        let mut account = slot.lock().await;
        (op(&mut account), created)
    }

    /// Mutation wrapper applying the flush policy. Every op routed through
    /// here mutates the account when it returns `Ok` (creating the account
    /// counts as a mutation); plain reads take the fast path in
    /// [`BalanceStore::get_balance`] instead.
    ///
    /// Under write-through the whole operation runs inside `flush_lock`:
    /// once the caller is acknowledged, the mutation is on disk and no
    /// concurrent reload can sit between the two. Under batched flushing the
    /// mutation only marks the store dirty.
    async fn mutate<T>(
        &self,
        user: UserId,
        op: impl FnOnce(&mut Account) -> Result<T>,
    ) -> Result<T> {
        match self.flush_policy {
            FlushPolicy::WriteThrough => {
                let _guard = self.flush_lock.lock().await;
                let (result, created) = self.with_account(user, op).await;
                if created || result.is_ok() {
                    self.dirty.store(true, Ordering::Release);
                    if let Err(e) = self.flush_locked().await {
                        log::warn!(
                            "write-through flush failed, in-memory state remains authoritative: {e}"
                        );
                    }
                }
                result
            }
            FlushPolicy::Batched { .. } => {
                let (result, created) = self.with_account(user, op).await;
                if created || result.is_ok() {
                    self.dirty.store(true, Ordering::Release);
                }
                result
            }
        }
    }

    /// Current balance, creating the account if this user is new.
    pub async fn get_balance(&self, user: UserId) -> u64 {
        {
            let map = self.accounts.read().await;
            if let Some(slot) = map.get(&user) {
                return slot.lock().await.balance;
            }
        }

        // first sight of this user: creation is a mutation and persists
        self.mutate(user, |account| Ok(account.balance))
            .await
            .unwrap_or(self.starting_balance)
    }

    /// Atomically credit `amount` and return the new balance.
    pub async fn add_balance(&self, user: UserId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidAmount(
                "credit must be greater than zero".into(),
            ));
        }

        self.mutate(user, |account| {
            let next = account.balance.checked_add(amount).ok_or_else(|| {
                Error::InvalidAmount(format!("credit of {amount} overflows the balance"))
            })?;
            account.balance = next;
            Ok(next)
        })
        .await
    }

    /// Atomically debit `amount` and return the new balance.
    ///
    /// The only path that can reduce a balance. The check and the decrement
    /// happen under the account lock, so concurrent debits can never drive
    /// the balance below zero: exactly the debits that fit succeed.
    pub async fn subtract_balance(&self, user: UserId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidAmount(
                "debit must be greater than zero".into(),
            ));
        }

        self.mutate(user, |account| {
            if account.balance < amount {
                return Err(Error::InsufficientFunds {
                    balance: account.balance,
                    requested: amount,
                });
            }
            account.balance -= amount;
            Ok(account.balance)
        })
        .await
    }

    /// Administrative unconditional overwrite.
    pub async fn set_balance(&self, user: UserId, amount: u64) {
        let _ = self
            .mutate(user, |account| {
                account.balance = amount;
                Ok(())
            })
            .await;
    }

    /// Record the coarse statistics for one finished round.
    pub async fn record_game_result(&self, user: UserId, wagered: u64, paid_out: u64) {
        let _ = self
            .mutate(user, |account| {
                account.stats.rounds_played += 1;
                if paid_out > 0 {
                    account.stats.rounds_won += 1;
                }
                account.stats.total_wagered = account.stats.total_wagered.saturating_add(wagered);
                account.stats.total_paid_out =
                    account.stats.total_paid_out.saturating_add(paid_out);
                Ok(())
            })
            .await;
    }

    /// Sum of all balances.
    pub async fn total_money_in_system(&self) -> u64 {
        let map = self.accounts.read().await;
        let mut total = 0u64;
        for slot in map.values() {
            total = total.saturating_add(slot.lock().await.balance);
        }
        total
    }

    /// Number of known accounts.
    pub async fn user_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Users holding a positive balance, descending by balance.
    ///
    /// Ties break on user id so the ordering is stable across calls.
    pub async fn all_users_with_money(&self, limit: Option<usize>) -> Vec<(UserId, u64)> {
        let mut rows = Vec::new();
        {
            let map = self.accounts.read().await;
            for (&user, slot) in map.iter() {
                let balance = slot.lock().await.balance;
                if balance > 0 {
                    rows.push((user, balance));
                }
            }
        }
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        rows
    }

    /// Discard in-memory state and reload from the ledger file.
    ///
    /// Serializes behind any in-flight flush, then takes the store-wide
    /// write lock: no per-account operation overlaps the swap, every save
    /// completed beforehand is part of what gets read back, and every save
    /// started afterwards snapshots the reloaded state. If the file is
    /// unparsable or has vanished, the current state stays authoritative
    /// and the error is returned.
    pub async fn reload_data(&self) -> Result<ReloadReport> {
        let _flush_guard = self.flush_lock.lock().await;
        self.reload_locked().await
    }

    /// Reload body; caller must hold `flush_lock`.
    async fn reload_locked(&self) -> Result<ReloadReport> {
        let mut map = self.accounts.write().await;

        let loaded = match self.file.load().await? {
            Some(accounts) => accounts,
            None => {
                // refusing to interpret a vanished file as "everyone is broke"
                return Err(Error::CorruptFile(format!(
                    "{:?} disappeared, keeping in-memory state",
                    self.file.path()
                )));
            }
        };

        let old_count = map.len();
        let mut old_total = 0u64;
        for slot in map.values() {
            old_total = old_total.saturating_add(slot.lock().await.balance);
        }

        let new_count = loaded.len();
        let new_total = loaded
            .values()
            .fold(0u64, |sum, account| sum.saturating_add(account.balance));

        *map = wrap_accounts(loaded);

        let marker = self.file.modified().await.unwrap_or(None);
        *self.last_synced.lock() = marker;
        self.dirty.store(false, Ordering::Release);
        drop(map);

        let report = ReloadReport {
            old_count,
            old_total,
            new_count,
            new_total,
        };
        log::info!(
            "ledger reloaded: {} accounts ({} total) -> {} accounts ({} total)",
            report.old_count,
            report.old_total,
            report.new_count,
            report.new_total
        );
        Ok(report)
    }

    /// Reload if the file on disk changed outside our own saves.
    ///
    /// Returns whether a reload happened. Called by the file watcher on
    /// every tick; our own saves update `last_synced` synchronously, so they
    /// never register as a change here.
    pub async fn sync_from_disk_if_changed(&self) -> Result<bool> {
        // cheap unlocked pre-check
        if !self.marker_mismatch().await? {
            return Ok(false);
        }

        // confirm under the flush lock, so a save that has renamed the file
        // but not yet recorded its marker does not read as external
        let _flush_guard = self.flush_lock.lock().await;
        if !self.marker_mismatch().await? {
            return Ok(false);
        }

        log::info!("{:?} changed on disk, reloading", self.file.path());
        self.reload_locked().await?;
        Ok(true)
    }

    async fn marker_mismatch(&self) -> Result<bool> {
        let on_disk = match self.file.modified().await? {
            Some(mtime) => mtime,
            None => return Ok(false),
        };
        Ok(*self.last_synced.lock() != Some(on_disk))
    }

    /// Persist the current state if there are unsaved mutations.
    ///
    /// Safe to call from any task at any time; snapshotting holds the
    /// account locks only briefly and all I/O happens outside them.
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock().await;
        self.flush_locked().await
    }

    /// Flush body; caller must hold `flush_lock`.
    async fn flush_locked(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let snapshot = self.snapshot().await;
        if let Err(e) = self.save_with_retry(&snapshot).await {
            // in-memory state stays authoritative; retry on the next flush
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    async fn snapshot(&self) -> HashMap<UserId, Account> {
        let map = self.accounts.read().await;
        let mut snapshot = HashMap::with_capacity(map.len());
        for (&user, slot) in map.iter() {
            snapshot.insert(user, slot.lock().await.clone());
        }
        snapshot
    }

    async fn save_with_retry(&self, snapshot: &HashMap<UserId, Account>) -> Result<()> {
        let mut delay = SAVE_RETRY_DELAY;
        let mut attempt = 0;
        loop {
            match self.file.save(snapshot).await {
                Ok(mtime) => {
                    *self.last_synced.lock() = Some(mtime);
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= SAVE_RETRY_LIMIT {
                        return Err(e);
                    }
                    log::warn!(
                        "ledger save failed (attempt {attempt}/{SAVE_RETRY_LIMIT}): {e}, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

fn wrap_accounts(accounts: HashMap<UserId, Account>) -> AccountMap {
    accounts
        .into_iter()
        .map(|(user, account)| (user, Arc::new(Mutex::new(account))))
        .collect()
}
