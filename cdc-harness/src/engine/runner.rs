use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::callback::{CallbackEvent, ComposedCallbacks, panic_message};
use crate::concurrency::shutdown::ShutdownRx;
use crate::connector::Connector;
use crate::engine::config::EngineConfig;
use crate::engine::events::EventLog;
use crate::engine::offsets::MemoryOffsetStore;
use crate::engine::state::EngineStateTracker;
use crate::error::{ErrorKind, HarnessError, HarnessResult};
use crate::harness_error;

/// Slot in which the engine task records the error that ended it.
pub(crate) type FailureSlot = Arc<Mutex<Option<HarnessError>>>;

/// Everything the background task needs to drive one connector.
pub(crate) struct EngineRunner {
    pub(crate) connector: Box<dyn Connector>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) callbacks: ComposedCallbacks,
    pub(crate) tracker: EngineStateTracker,
    pub(crate) events: EventLog,
    pub(crate) offsets: MemoryOffsetStore,
    pub(crate) flush_interval: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) shutdown_rx: ShutdownRx,
    pub(crate) failure: FailureSlot,
}

impl EngineRunner {
    /// Runs the connector to completion and records how it ended.
    ///
    /// The tracker always ends in `Stopped`, including when the connector panics or never
    /// manages to start.
    pub(crate) async fn run_to_completion(self) {
        let tracker = self.tracker.clone();
        let failure = self.failure.clone();

        match AssertUnwindSafe(self.run()).catch_unwind().await {
            Ok(Ok(())) => {
                info!("engine completed successfully");
            }
            Ok(Err(err)) => {
                error!("engine completed with an error: {}", err);
                *failure.lock().await = Some(err);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("engine panicked: {}", message);
                *failure.lock().await = Some(harness_error!(
                    ErrorKind::EnginePanic,
                    "Engine task panicked",
                    message
                ));
            }
        }

        tracker.mark_stopped();
    }

    async fn run(mut self) -> HarnessResult<()> {
        info!("starting connector '{}'", self.config.connector());

        let started = tokio::select! {
            biased;

            _ = self.shutdown_rx.changed() => {
                info!("shutdown requested before the connector started");
                return Ok(());
            }
            started = self.connector.start(&self.config) => started,
        };

        if let Err(err) = started {
            error!("connector failed to start: {}", err);
            return Err(err);
        }

        self.callbacks.dispatch(CallbackEvent::ConnectorStarted);
        self.callbacks.dispatch(CallbackEvent::TaskStarted);

        let poll_result = self.poll_until_shutdown().await;

        info!("stopping connector '{}'", self.config.connector());
        let stop_result = self.connector.stop().await;

        let advanced = self.offsets.flush().await;
        debug!("final offset flush advanced {} partitions", advanced);

        self.callbacks.dispatch(CallbackEvent::TaskStopped);
        self.callbacks.dispatch(CallbackEvent::ConnectorStopped);

        match (poll_result, stop_result) {
            (Err(poll_err), Err(stop_err)) => Err(vec![poll_err, stop_err].into()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    async fn poll_until_shutdown(&mut self) -> HarnessResult<()> {
        let mut flush = tokio::time::interval(self.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        flush.tick().await;

        loop {
            tokio::select! {
                biased;

                // A dropped sender means the handle is gone, which is a shutdown too.
                _ = self.shutdown_rx.changed() => {
                    info!("shutting down connector due to shutdown request");
                    return Ok(());
                }
                _ = flush.tick() => {
                    let advanced = self.offsets.flush().await;
                    if advanced > 0 {
                        debug!("offset flush advanced {} partitions", advanced);
                    }
                }
                polled = self.connector.poll() => {
                    let events = polled.map_err(|err| {
                        error!("connector failed while polling: {}", err);
                        err
                    })?;

                    if events.is_empty() {
                        tokio::select! {
                            biased;

                            _ = self.shutdown_rx.changed() => {
                                info!("shutting down idle connector due to shutdown request");
                                return Ok(());
                            }
                            _ = tokio::time::sleep(self.poll_interval) => {}
                        }
                        continue;
                    }

                    debug!("connector emitted {} change events", events.len());
                    self.offsets.track(&events).await;
                    self.events.record(events).await;
                }
            }
        }
    }
}
