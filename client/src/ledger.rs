//! Server-granted free-round bank.
//!
//! The remaining count only ever comes from the server: it is seeded at session
//! initialization and then overwritten by `FreeRoundCountUpdated`
//! notifications. The one local mutation is [FreeRoundLedger::consume_one],
//! used for spins whose response carried no count.

use crate::bus::{Notification, NotificationBus, Subscription, Topic, WeakNotificationBus};
use serde::Serialize;
use slotfront_types::FreeRoundGrant;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FreeRoundStatus {
    pub total: u32,
    pub used: u32,
    pub remaining: u32,
    pub bet: Option<f64>,
}

#[derive(Default)]
struct LedgerState {
    status: FreeRoundStatus,
    exhausted_signaled: bool,
}

impl LedgerState {
    /// Replace `remaining` and report whether this is the first transition to
    /// empty since the ledger was last armed.
    fn set_remaining(&mut self, remaining: u32) -> bool {
        self.status.remaining = remaining;
        if remaining > 0 {
            self.exhausted_signaled = false;
            return false;
        }
        if !self.exhausted_signaled {
            self.exhausted_signaled = true;
            return true;
        }
        false
    }
}

fn lock(state: &Mutex<LedgerState>) -> MutexGuard<'_, LedgerState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("free-round ledger lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

fn apply_count(state: &Mutex<LedgerState>, bus: &WeakNotificationBus, remaining: u32) {
    let exhausted = {
        let mut state = lock(state);
        debug!(
            from = state.status.remaining,
            to = remaining,
            "free-round count from server"
        );
        state.set_remaining(remaining)
    };
    if exhausted {
        signal_exhausted(bus);
    }
}

fn signal_exhausted(bus: &WeakNotificationBus) {
    info!("free-round bank exhausted");
    if let Some(bus) = bus.upgrade() {
        bus.publish(Notification::FreeRoundsExhausted);
    }
}

pub struct FreeRoundLedger {
    state: Arc<Mutex<LedgerState>>,
    bus: WeakNotificationBus,
    _subscription: Subscription,
}

impl FreeRoundLedger {
    /// Create an empty ledger listening for server counts on `bus`.
    pub fn new(bus: &NotificationBus) -> Self {
        // Starts disarmed: an empty bank that was never seeded is not "exhausted".
        let state = Arc::new(Mutex::new(LedgerState {
            status: FreeRoundStatus::default(),
            exhausted_signaled: true,
        }));
        let weak_bus = bus.downgrade();
        let subscription = {
            let state = Arc::downgrade(&state);
            let weak_bus = weak_bus.clone();
            bus.subscribe(Topic::FreeRoundCountUpdated, move |notification| {
                let Notification::FreeRoundCountUpdated { remaining } = notification else {
                    return Ok(());
                };
                if let Some(state) = state.upgrade() {
                    apply_count(&state, &weak_bus, *remaining);
                }
                Ok(())
            })
        };
        Self {
            state,
            bus: weak_bus,
            _subscription: subscription,
        }
    }

    /// Seed from a session initialization grant.
    pub fn seed(&self, grant: &FreeRoundGrant) {
        let mut state = lock(&self.state);
        state.status = FreeRoundStatus {
            total: grant.total,
            used: grant.used,
            remaining: grant.remaining,
            bet: grant.bet,
        };
        state.exhausted_signaled = grant.remaining == 0;
        info!(
            remaining = grant.remaining,
            total = grant.total,
            bet = ?grant.bet,
            "free-round ledger seeded"
        );
    }

    /// Apply a server-reported remaining count. Replaces the local value.
    pub fn apply_server_count(&self, remaining: u32) {
        apply_count(&self.state, &self.bus, remaining);
    }

    /// Spend one round locally. Only for spins whose response omitted the
    /// server count.
    pub fn consume_one(&self) {
        let exhausted = {
            let mut state = lock(&self.state);
            if state.status.remaining == 0 {
                return;
            }
            let remaining = state.status.remaining - 1;
            state.status.used = state.status.used.saturating_add(1);
            debug!(remaining, "free-round consumed locally");
            state.set_remaining(remaining)
        };
        if exhausted {
            signal_exhausted(&self.bus);
        }
    }

    pub fn remaining(&self) -> u32 {
        lock(&self.state).status.remaining
    }

    pub fn bet(&self) -> Option<f64> {
        lock(&self.state).status.bet
    }

    pub fn is_active(&self) -> bool {
        self.remaining() > 0
    }

    pub fn status(&self) -> FreeRoundStatus {
        lock(&self.state).status
    }
}
