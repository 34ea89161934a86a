//! Background watcher for external edits to the ledger file
//!
//! A restore script or manual edit can replace the ledger while the process
//! is running. The watcher polls the file's modification time and asks the
//! store to reload when it no longer matches the store's sync marker. The
//! marker is refreshed inside every save, so the watcher never reacts to
//! writes this process made itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ledger::BalanceStore;

/// Watcher state reported through the administrative boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStatus {
    pub running: bool,
    pub interval: Option<Duration>,
}

struct WatcherHandle {
    stop: Arc<AtomicBool>,
    interval: Duration,
    task: JoinHandle<()>,
}

/// Polls the ledger file and triggers reloads on external change.
pub struct FileWatcher {
    store: Arc<BalanceStore>,
    handle: parking_lot::Mutex<Option<WatcherHandle>>,
}

impl FileWatcher {
    pub fn new(store: Arc<BalanceStore>) -> Self {
        Self {
            store,
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// Start polling every `poll_interval`. Returns false (and changes
    /// nothing) if the watcher is already running.
    pub fn start(&self, poll_interval: Duration) -> bool {
        if poll_interval.is_zero() {
            log::warn!("refusing to start ledger watcher with a zero interval");
            return false;
        }

        let mut handle = self.handle.lock();
        if let Some(existing) = handle.as_ref() {
            if !existing.task.is_finished() {
                log::debug!("ledger watcher already running");
                return false;
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let store = Arc::clone(&self.store);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if flag.load(Ordering::Acquire) {
                    break;
                }
                ticker.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                match store.sync_from_disk_if_changed().await {
                    Ok(true) => log::debug!("ledger watcher applied an external change"),
                    Ok(false) => {}
                    Err(e) => log::warn!("ledger watcher could not reload: {e}"),
                }
            }
            log::debug!("ledger watcher stopped");
        });

        *handle = Some(WatcherHandle {
            stop,
            interval: poll_interval,
            task,
        });
        log::info!("ledger watcher started, polling every {poll_interval:?}");
        true
    }

    /// Request the poll loop to exit. Returns false if it was not running.
    ///
    /// Only flips the cancellation flag: an in-progress reload always runs
    /// to completion, the loop exits at the next flag check.
    pub fn stop(&self) -> bool {
        let mut handle = self.handle.lock();
        match handle.take() {
            Some(existing) => {
                existing.stop.store(true, Ordering::Release);
                true
            }
            None => {
                log::debug!("ledger watcher not running");
                false
            }
        }
    }

    pub fn status(&self) -> WatcherStatus {
        let handle = self.handle.lock();
        match handle.as_ref() {
            Some(existing) if !existing.task.is_finished() => WatcherStatus {
                running: true,
                interval: Some(existing.interval),
            },
            _ => WatcherStatus {
                running: false,
                interval: None,
            },
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
