//! In-process publish/subscribe channel between the backend client and its
//! observers.
//!
//! Delivery is synchronous and fire-and-forget: handlers run on the publishing
//! thread, in subscription order, and a subscriber only sees notifications
//! published after it subscribed.

use crate::spin::SpinKind;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{error, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    FreeRoundCountUpdated,
    FreeRoundsExhausted,
    SessionExpired,
    SessionReady,
    SpinCompleted,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// Server-reported free-round bank size.
    FreeRoundCountUpdated { remaining: u32 },
    /// The free-round bank reached zero.
    FreeRoundsExhausted,
    /// The session token is missing or was rejected.
    SessionExpired,
    SessionReady { has_free_round: bool },
    SpinCompleted { kind: SpinKind, total_win: f64 },
}

impl Notification {
    pub fn topic(&self) -> Topic {
        match self {
            Notification::FreeRoundCountUpdated { .. } => Topic::FreeRoundCountUpdated,
            Notification::FreeRoundsExhausted => Topic::FreeRoundsExhausted,
            Notification::SessionExpired => Topic::SessionExpired,
            Notification::SessionReady { .. } => Topic::SessionReady,
            Notification::SpinCompleted { .. } => Topic::SpinCompleted,
        }
    }
}

type Handler = Arc<dyn Fn(&Notification) -> anyhow::Result<()> + Send + Sync>;

struct Entry {
    id: u64,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("notification registry lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

/// Cloneable handle to a shared listener list.
#[derive(Clone, Default)]
pub struct NotificationBus {
    registry: Arc<Mutex<Registry>>,
}

/// Non-owning handle, for handlers that need to publish back onto the bus.
#[derive(Clone)]
pub struct WeakNotificationBus {
    registry: Weak<Mutex<Registry>>,
}

impl WeakNotificationBus {
    pub fn upgrade(&self) -> Option<NotificationBus> {
        self.registry
            .upgrade()
            .map(|registry| NotificationBus { registry })
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakNotificationBus {
        WeakNotificationBus {
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register `handler` for `topic`. The handler stays registered until the
    /// returned [Subscription] is unsubscribed or dropped.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            topic,
            handler: Arc::new(handler),
        });
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
            topic,
            active: true,
        }
    }

    /// Deliver `notification` to every current handler of its topic.
    ///
    /// Handlers subscribed during delivery are not called for this
    /// notification. A handler unsubscribed by an earlier handler is skipped.
    /// Returns the number of handlers that completed without error.
    pub fn publish(&self, notification: Notification) -> usize {
        let topic = notification.topic();
        // Snapshot so handlers may subscribe, unsubscribe or publish.
        let handlers: Vec<(u64, Handler)> = lock(&self.registry)
            .entries
            .iter()
            .filter(|entry| entry.topic == topic)
            .map(|entry| (entry.id, entry.handler.clone()))
            .collect();
        trace!(?topic, handlers = handlers.len(), "publishing notification");

        let mut delivered = 0;
        for (id, handler) in handlers {
            if !self.is_registered(id) {
                trace!(?topic, id, "skipping handler unsubscribed during delivery");
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(&notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    warn!(?topic, error = %err, "notification handler failed");
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(?topic, %reason, "notification handler panicked");
                }
            }
        }
        delivered
    }

    fn is_registered(&self, id: u64) -> bool {
        lock(&self.registry).entries.iter().any(|entry| entry.id == id)
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        lock(&self.registry)
            .entries
            .iter()
            .filter(|entry| entry.topic == topic)
            .count()
    }
}

/// Registration handle returned by [NotificationBus::subscribe].
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
    topic: Topic,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = lock(&registry);
            registry.entries.retain(|entry| entry.id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static {
        let log = log.clone();
        move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        }
    }

    #[test]
    fn test_delivers_in_subscription_order() {
        let bus = NotificationBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = bus.subscribe(Topic::SessionExpired, recorder(&log, "a"));
        let _b = bus.subscribe(Topic::SessionExpired, recorder(&log, "b"));
        let _other = bus.subscribe(Topic::SessionReady, recorder(&log, "other"));
        let _c = bus.subscribe(Topic::SessionExpired, recorder(&log, "c"));

        assert_eq!(bus.publish(Notification::SessionExpired), 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failing_handlers_do_not_stop_delivery() {
        let bus = NotificationBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _first = bus.subscribe(Topic::FreeRoundCountUpdated, recorder(&log, "first"));
        let _err = bus.subscribe(Topic::FreeRoundCountUpdated, |_| {
            Err(anyhow::anyhow!("listener broke"))
        });
        let _panic = bus.subscribe(Topic::FreeRoundCountUpdated, |_| panic!("listener panicked"));
        let _last = bus.subscribe(Topic::FreeRoundCountUpdated, recorder(&log, "last"));

        let delivered = bus.publish(Notification::FreeRoundCountUpdated { remaining: 2 });
        assert_eq!(delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "last"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_its_handler() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = {
            let hits = hits.clone();
            move |_: &Notification| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };
        // Same closure registered twice: two independent subscriptions.
        let first = bus.subscribe(Topic::SessionExpired, handler.clone());
        let _second = bus.subscribe(Topic::SessionExpired, handler);
        assert_eq!(bus.subscriber_count(Topic::SessionExpired), 2);

        first.unsubscribe();
        assert_eq!(bus.subscriber_count(Topic::SessionExpired), 1);
        bus.publish(Notification::SessionExpired);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = NotificationBus::new();
        {
            let _sub = bus.subscribe(Topic::SessionReady, |_| Ok(()));
            assert_eq!(bus.subscriber_count(Topic::SessionReady), 1);
        }
        assert_eq!(bus.subscriber_count(Topic::SessionReady), 0);
        assert_eq!(
            bus.publish(Notification::SessionReady {
                has_free_round: false
            }),
            0
        );
    }

    #[test]
    fn test_late_subscriber_gets_nothing_retroactively() {
        let bus = NotificationBus::new();
        bus.publish(Notification::SessionExpired);
        let hits = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let hits = hits.clone();
            bus.subscribe(Topic::SessionExpired, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_publish_reentrantly() {
        let bus = NotificationBus::new();
        let expired = Arc::new(AtomicUsize::new(0));
        let weak = bus.downgrade();
        let _relay = bus.subscribe(Topic::FreeRoundCountUpdated, move |notification| {
            if let (Notification::FreeRoundCountUpdated { remaining: 0 }, Some(bus)) =
                (notification, weak.upgrade())
            {
                bus.publish(Notification::FreeRoundsExhausted);
            }
            Ok(())
        });
        let _sink = {
            let expired = expired.clone();
            bus.subscribe(Topic::FreeRoundsExhausted, move |_| {
                expired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        bus.publish(Notification::FreeRoundCountUpdated { remaining: 0 });
        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_dropped_mid_delivery_is_skipped() {
        let bus = NotificationBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let later: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let _dropper = {
            let log = log.clone();
            let later = later.clone();
            bus.subscribe(Topic::SessionExpired, move |_| {
                log.lock().unwrap().push("dropper");
                later.lock().unwrap().take();
                Ok(())
            })
        };
        *later.lock().unwrap() = Some(bus.subscribe(Topic::SessionExpired, recorder(&log, "later")));
        let _tail = bus.subscribe(Topic::SessionExpired, recorder(&log, "tail"));

        assert_eq!(bus.publish(Notification::SessionExpired), 2);
        assert_eq!(*log.lock().unwrap(), vec!["dropper", "tail"]);
        assert_eq!(bus.subscriber_count(Topic::SessionExpired), 2);
    }
}
