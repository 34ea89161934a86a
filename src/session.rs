//! Per-user exclusive game sessions
//!
//! All game types share one guard, so a user cannot have a coin flip and a
//! dice round open at the same time. The guard knows nothing about balances
//! or games; it is a per-user mutual-exclusion flag.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::ledger::UserId;

/// Tracks which users currently hold a game slot.
#[derive(Debug, Default)]
pub struct SessionGuard {
    active: DashMap<UserId, ()>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the user's game slot. Returns false, with no state change, if a
    /// round is already in progress for them.
    pub fn begin(&self, user: UserId) -> bool {
        match self.active.entry(user) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }

    /// Release the user's game slot. Idempotent; returns whether a slot was
    /// actually held. Also serves as the administrative force-clear for a
    /// slot leaked by a buggy handler.
    pub fn end(&self, user: UserId) -> bool {
        self.active.remove(&user).is_some()
    }

    pub fn is_active(&self, user: UserId) -> bool {
        self.active.contains_key(&user)
    }

    /// Assert that a round is in progress for `user`, for steps (payout,
    /// result recording) that only make sense mid-round.
    pub fn require_active(&self, user: UserId) -> Result<()> {
        if self.is_active(user) {
            Ok(())
        } else {
            Err(Error::NotActive(user))
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Claim the slot as an owned ticket that releases itself on drop, so
    /// every exit path of a round, including panics and early returns,
    /// gives the slot back.
    pub fn ticket(self: &Arc<Self>, user: UserId) -> Option<SessionTicket> {
        if self.begin(user) {
            Some(SessionTicket {
                guard: Arc::clone(self),
                user,
            })
        } else {
            None
        }
    }
}

/// Scoped session hold; dropping it ends the round.
#[derive(Debug)]
pub struct SessionTicket {
    guard: Arc<SessionGuard>,
    user: UserId,
}

impl SessionTicket {
    pub fn user(&self) -> UserId {
        self.user
    }
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        self.guard.end(self.user);
    }
}
