use std::fmt;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use crate::types::ChangeEvent;

type EventCondition = Box<dyn Fn(&[ChangeEvent]) -> bool + Send + Sync>;

struct Inner {
    events: Vec<ChangeEvent>,
    conditions: Vec<(EventCondition, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let events = &self.events;
        self.conditions.retain(|(condition, notify)| {
            let should_retain = !condition(events);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// Collects every change event emitted by the connector, in emission order.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<Inner>>,
}

impl EventLog {
    pub fn new() -> Self {
        let inner = Inner {
            events: Vec::new(),
            conditions: Vec::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub async fn record(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }

        let mut inner = self.inner.write().await;
        inner.events.extend(events);
        inner.check_conditions();
    }

    pub async fn events(&self) -> Vec<ChangeEvent> {
        self.inner.read().await.events.clone()
    }

    /// Registers `condition` and returns a [`Notify`] that fires once it holds.
    ///
    /// A condition that already holds fires immediately, so awaiting the returned notify
    /// never misses events recorded before registration.
    pub async fn notify_on_events<F>(&self, condition: F) -> Arc<Notify>
    where
        F: Fn(&[ChangeEvent]) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        inner.conditions.push((Box::new(condition), notify.clone()));
        inner.check_conditions();

        notify
    }

    /// Returns a [`Notify`] that fires once at least `count` events have been recorded.
    pub async fn wait_for_n_events(&self, count: usize) -> Arc<Notify> {
        self.notify_on_events(move |events| events.len() >= count)
            .await
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Ok(inner) => f
                .debug_struct("EventLog")
                .field("events", &inner.events.len())
                .field("conditions", &inner.conditions.len())
                .finish(),
            Err(_) => f.debug_struct("EventLog").finish_non_exhaustive(),
        }
    }
}
