use crate::bus::{Notification, NotificationBus, Subscription, Topic};
use crate::spin::SpinKind;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct WinTotals {
    pub last_win: f64,
    /// Running total shown in the header: restarts on every non-bonus spin and
    /// keeps adding up through bonus spins.
    pub accumulated: f64,
    pub spins: u64,
}

fn lock(totals: &Mutex<WinTotals>) -> MutexGuard<'_, WinTotals> {
    match totals.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("win meter lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

/// Header win display fed by `SpinCompleted` notifications.
pub struct WinMeter {
    totals: Arc<Mutex<WinTotals>>,
    _subscription: Subscription,
}

impl WinMeter {
    pub fn new(bus: &NotificationBus) -> Self {
        let totals = Arc::new(Mutex::new(WinTotals::default()));
        let subscription = {
            let totals = Arc::downgrade(&totals);
            bus.subscribe(Topic::SpinCompleted, move |notification| {
                let Notification::SpinCompleted { kind, total_win } = notification else {
                    return Ok(());
                };
                let Some(totals) = totals.upgrade() else {
                    return Ok(());
                };
                let mut totals = lock(&totals);
                totals.last_win = *total_win;
                totals.accumulated = match kind {
                    SpinKind::Bonus => totals.accumulated + total_win,
                    _ => *total_win,
                };
                totals.spins += 1;
                Ok(())
            })
        };
        Self {
            totals,
            _subscription: subscription,
        }
    }

    pub fn totals(&self) -> WinTotals {
        *lock(&self.totals)
    }

    pub fn last_win(&self) -> f64 {
        self.totals().last_win
    }

    pub fn accumulated(&self) -> f64 {
        self.totals().accumulated
    }
}
