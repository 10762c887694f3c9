//! Lifecycle notifications emitted by the embedded engine.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::warn;

use crate::error::HarnessResult;

/// Receives lifecycle notifications from the embedded engine.
///
/// Every notification defaults to a no-op, so implementations only override what they need.
/// Callbacks run on the engine task and should return quickly.
pub trait ConnectorCallback: Send + Sync {
    fn connector_started(&self) -> HarnessResult<()> {
        Ok(())
    }

    fn connector_stopped(&self) -> HarnessResult<()> {
        Ok(())
    }

    fn task_started(&self) -> HarnessResult<()> {
        Ok(())
    }

    fn task_stopped(&self) -> HarnessResult<()> {
        Ok(())
    }
}

/// A callback that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCallback;

impl ConnectorCallback for NoOpCallback {}

/// The notifications a [`ConnectorCallback`] can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackEvent {
    ConnectorStarted,
    ConnectorStopped,
    TaskStarted,
    TaskStopped,
}

impl CallbackEvent {
    fn deliver(self, callback: &dyn ConnectorCallback) -> HarnessResult<()> {
        match self {
            CallbackEvent::ConnectorStarted => callback.connector_started(),
            CallbackEvent::ConnectorStopped => callback.connector_stopped(),
            CallbackEvent::TaskStarted => callback.task_started(),
            CallbackEvent::TaskStopped => callback.task_stopped(),
        }
    }
}

/// Fans every notification out to a fixed list of callbacks, in order.
///
/// A callback that returns an error or panics is logged and skipped; the remaining callbacks
/// still receive the notification.
#[derive(Clone)]
pub struct ComposedCallbacks {
    callbacks: Vec<Arc<dyn ConnectorCallback>>,
}

impl ComposedCallbacks {
    pub fn new(callbacks: Vec<Arc<dyn ConnectorCallback>>) -> Self {
        Self { callbacks }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Delivers `event` to every callback.
    pub fn dispatch(&self, event: CallbackEvent) {
        for (index, callback) in self.callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| event.deliver(callback.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!("callback {} failed on {:?}: {}", index, event, err);
                }
                Err(payload) => {
                    warn!(
                        "callback {} panicked on {:?}: {}",
                        index,
                        event,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }
}

impl ConnectorCallback for ComposedCallbacks {
    fn connector_started(&self) -> HarnessResult<()> {
        self.dispatch(CallbackEvent::ConnectorStarted);
        Ok(())
    }

    fn connector_stopped(&self) -> HarnessResult<()> {
        self.dispatch(CallbackEvent::ConnectorStopped);
        Ok(())
    }

    fn task_started(&self) -> HarnessResult<()> {
        self.dispatch(CallbackEvent::TaskStarted);
        Ok(())
    }

    fn task_stopped(&self) -> HarnessResult<()> {
        self.dispatch(CallbackEvent::TaskStopped);
        Ok(())
    }
}

impl fmt::Debug for ComposedCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedCallbacks")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
