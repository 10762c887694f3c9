use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::bail;
use crate::callback::{ComposedCallbacks, ConnectorCallback};
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::connector::Connector;
use crate::engine::config::EngineConfig;
use crate::engine::events::EventLog;
use crate::engine::offsets::MemoryOffsetStore;
use crate::engine::runner::{EngineRunner, FailureSlot};
use crate::engine::state::{EngineState, EngineStateTracker};
use crate::error::{ErrorKind, HarnessError, HarnessResult};
use crate::types::{ChangeEvent, Identifier};

/// How [`EngineHandle::close`] brought the engine down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The engine task finished within the close timeout, or was not running.
    Graceful,
    /// The close timeout expired and the engine task was aborted.
    Forced,
}

struct Inner {
    connector_id: Identifier,
    config: Arc<EngineConfig>,
    tracker: EngineStateTracker,
    events: EventLog,
    offsets: MemoryOffsetStore,
    failure: FailureSlot,
    shutdown_tx: ShutdownTx,
    runner: Mutex<Option<EngineRunner>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take()
            && !task.is_finished()
        {
            warn!(
                "engine for connector '{}' dropped without being closed, aborting it",
                self.connector_id
            );
            task.abort();
            self.tracker.mark_stopped();
        }
    }
}

/// Shared handle to one embedded engine.
///
/// Clones refer to the same engine. When the last clone is dropped a still running engine
/// task is aborted.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Inner>,
}

impl EngineHandle {
    /// Builds an engine for `connector` over the merged `config`.
    ///
    /// The built-in [`EngineStateTracker`] is always the first callback; `user_callback`, if
    /// any, is notified after it.
    pub fn new(
        connector_id: impl Into<Identifier>,
        connector: Box<dyn Connector>,
        config: EngineConfig,
        user_callback: Option<Arc<dyn ConnectorCallback>>,
    ) -> HarnessResult<Self> {
        let connector_id = connector_id.into();
        if config.connector() != connector_id {
            bail!(
                ErrorKind::ConfigError,
                "Engine configuration was merged for another connector",
                format!(
                    "expected '{}', found '{}'",
                    connector_id,
                    config.connector()
                )
            );
        }

        config.validate()?;
        let flush_interval = config.offset_flush_interval()?;
        let poll_interval = config.poll_interval()?;

        let config = Arc::new(config);
        let tracker = EngineStateTracker::new();
        let events = EventLog::new();
        let offsets = MemoryOffsetStore::new();
        let failure = FailureSlot::default();
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut callbacks: Vec<Arc<dyn ConnectorCallback>> = vec![Arc::new(tracker.clone())];
        callbacks.extend(user_callback);

        let runner = EngineRunner {
            connector,
            config: config.clone(),
            callbacks: ComposedCallbacks::new(callbacks),
            tracker: tracker.clone(),
            events: events.clone(),
            offsets: offsets.clone(),
            flush_interval,
            poll_interval,
            shutdown_rx,
            failure: failure.clone(),
        };

        let inner = Inner {
            connector_id,
            config,
            tracker,
            events,
            offsets,
            failure,
            shutdown_tx,
            runner: Mutex::new(Some(runner)),
            task: Mutex::new(None),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Spawns the engine on a dedicated background task and returns immediately.
    ///
    /// An engine runs at most once; a second call fails with [`ErrorKind::InvalidState`].
    pub async fn run(&self) -> HarnessResult<()> {
        let Some(runner) = self.inner.runner.lock().await.take() else {
            bail!(
                ErrorKind::InvalidState,
                "Engine was already run",
                &self.inner.connector_id
            );
        };

        if !self.inner.tracker.mark_starting() {
            bail!(
                ErrorKind::InvalidState,
                "Engine was closed before it was run",
                &self.inner.connector_id
            );
        }

        info!("running engine for connector '{}'", self.inner.connector_id);

        let engine_span = tracing::info_span!("engine", connector = %self.inner.connector_id);
        let task = tokio::spawn(runner.run_to_completion().instrument(engine_span));
        *self.inner.task.lock().await = Some(task);

        Ok(())
    }

    /// Stops the engine, waiting at most `timeout` for the background task to finish.
    ///
    /// When the wait expires the task is aborted and the engine is marked stopped. Closing
    /// an engine that never ran, or closing twice, is graceful.
    pub async fn close(&self, timeout: Duration) -> CloseOutcome {
        let task = self.inner.task.lock().await.take();
        // An engine that never ran must not be runnable afterwards.
        self.inner.runner.lock().await.take();

        self.inner.tracker.mark_stopping();

        let Some(mut task) = task else {
            self.inner.tracker.mark_stopped();
            return CloseOutcome::Graceful;
        };

        info!("closing engine for connector '{}'", self.inner.connector_id);

        if self.inner.shutdown_tx.shutdown().is_err() {
            debug!("engine task already exited before the shutdown signal");
        }

        let outcome = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => CloseOutcome::Graceful,
            Ok(Err(err)) => {
                warn!("engine task ended abnormally: {}", err);
                CloseOutcome::Graceful
            }
            Err(_) => {
                warn!(
                    "engine for connector '{}' did not stop within {:?}, aborting it",
                    self.inner.connector_id, timeout
                );
                task.abort();
                CloseOutcome::Forced
            }
        };

        self.inner.tracker.mark_stopped();

        outcome
    }

    /// Waits at most `timeout` for the engine to report running.
    ///
    /// Fails with [`ErrorKind::EngineStartTimeout`] if the engine is still starting when the
    /// wait expires and with [`ErrorKind::EngineNotRunning`] if it stopped first.
    pub async fn wait_until_running(&self, timeout: Duration) -> HarnessResult<()> {
        let mut state_rx = self.inner.tracker.subscribe();

        let settled = tokio::time::timeout(timeout, async {
            state_rx
                .wait_for(|state| state.is_settled())
                .await
                .map(|state| *state)
        })
        .await;

        let settled = match settled {
            Ok(Ok(state)) => state,
            Ok(Err(_)) => EngineState::Stopped,
            Err(_) => bail!(
                ErrorKind::EngineStartTimeout,
                "Engine did not reach the running state in time",
                format!(
                    "connector '{}' still {} after {:?}",
                    self.inner.connector_id,
                    self.state(),
                    timeout
                )
            ),
        };

        if settled == EngineState::Running {
            return Ok(());
        }

        let detail = match self.failure().await {
            Some(err) => format!(
                "connector '{}' is {}: {}",
                self.inner.connector_id, settled, err
            ),
            None => format!("connector '{}' is {}", self.inner.connector_id, settled),
        };

        bail!(ErrorKind::EngineNotRunning, "Engine is not running", detail);
    }

    /// Returns `true` only while the connector is running.
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    pub fn state(&self) -> EngineState {
        self.inner.tracker.state()
    }

    /// Returns the error that ended the engine, if any.
    pub async fn failure(&self) -> Option<HarnessError> {
        self.inner.failure.lock().await.clone()
    }

    pub fn connector_id(&self) -> &str {
        &self.inner.connector_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns the merged configuration value for `key`, if any.
    pub fn get_configuration_value(&self, key: &str) -> Option<&str> {
        self.inner.config.get(key)
    }

    /// Returns every change event emitted so far, in emission order.
    pub async fn events(&self) -> Vec<ChangeEvent> {
        self.inner.events.events().await
    }

    /// Returns a [`Notify`] that fires once `condition` holds over the emitted events.
    pub async fn notify_on_events<F>(&self, condition: F) -> Arc<Notify>
    where
        F: Fn(&[ChangeEvent]) -> bool + Send + Sync + 'static,
    {
        self.inner.events.notify_on_events(condition).await
    }

    /// Returns a [`Notify`] that fires once at least `count` events were emitted.
    pub async fn wait_for_n_events(&self, count: usize) -> Arc<Notify> {
        self.inner.events.wait_for_n_events(count).await
    }

    /// Returns the committed position of every partition.
    pub async fn committed_offsets(&self) -> BTreeMap<String, u64> {
        self.inner.offsets.committed().await
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("connector_id", &self.inner.connector_id)
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::harness_error;

    /// Emits one event per poll until `limit`, then waits forever.
    struct CountingConnector {
        emitted: u64,
        limit: u64,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn start(&mut self, _config: &EngineConfig) -> HarnessResult<()> {
            Ok(())
        }

        async fn poll(&mut self) -> HarnessResult<Vec<ChangeEvent>> {
            if self.emitted >= self.limit {
                std::future::pending::<()>().await;
            }

            self.emitted += 1;
            Ok(vec![ChangeEvent::new(
                "testing.public.users",
                json!({ "id": self.emitted }),
                "slot",
                self.emitted,
            )])
        }

        async fn stop(&mut self) -> HarnessResult<()> {
            Ok(())
        }
    }

    /// Poll count and drop flag shared with an [`IdleConnector`], which never has changes.
    #[derive(Default, Clone)]
    struct IdleStats {
        polls: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    }

    struct IdleConnector {
        stats: IdleStats,
    }

    impl Drop for IdleConnector {
        fn drop(&mut self) {
            self.stats.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Connector for IdleConnector {
        async fn start(&mut self, _config: &EngineConfig) -> HarnessResult<()> {
            Ok(())
        }

        async fn poll(&mut self) -> HarnessResult<Vec<ChangeEvent>> {
            self.stats.polls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn stop(&mut self) -> HarnessResult<()> {
            Ok(())
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn start(&mut self, _config: &EngineConfig) -> HarnessResult<()> {
            Err(harness_error!(
                ErrorKind::ConnectorFailed,
                "Connector refused to start",
                "replication slot missing"
            ))
        }

        async fn poll(&mut self) -> HarnessResult<Vec<ChangeEvent>> {
            Ok(vec![])
        }

        async fn stop(&mut self) -> HarnessResult<()> {
            Ok(())
        }
    }

    fn config(overrides: &[(&str, &str)]) -> EngineConfig {
        let overrides = overrides
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<Vec<_>>();

        EngineConfig::merge("counting", HashMap::new(), &overrides)
    }

    fn counting(limit: u64) -> Box<dyn Connector> {
        Box::new(CountingConnector { emitted: 0, limit })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn engine_runs_collects_events_and_closes_gracefully() {
        let engine = EngineHandle::new("counting", counting(3), config(&[]), None).unwrap();
        assert_eq!(engine.state(), EngineState::NotStarted);

        engine.run().await.unwrap();
        engine
            .wait_until_running(Duration::from_secs(5))
            .await
            .unwrap();
        assert!(engine.is_running());

        engine.wait_for_n_events(3).await.notified().await;

        let outcome = engine.close(Duration::from_secs(5)).await;

        assert_eq!(outcome, CloseOutcome::Graceful);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(!engine.is_running());
        assert_eq!(engine.events().await.len(), 3);
        assert_eq!(engine.committed_offsets().await.get("slot"), Some(&3));
        assert!(engine.failure().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_failure_is_recorded_and_reported() {
        let engine = EngineHandle::new(
            "counting",
            Box::new(RefusingConnector),
            config(&[]),
            None,
        )
        .unwrap();
        engine.run().await.unwrap();

        let err = engine
            .wait_until_running(Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EngineNotRunning);
        assert!(err.detail().unwrap().contains("replication slot missing"));
        assert_eq!(
            engine.failure().await.map(|e| e.kind()),
            Some(ErrorKind::ConnectorFailed)
        );
        assert_eq!(
            engine.close(Duration::from_secs(5)).await,
            CloseOutcome::Graceful
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn engine_runs_only_once() {
        let engine = EngineHandle::new("counting", counting(0), config(&[]), None).unwrap();

        engine.run().await.unwrap();
        let err = engine.run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        engine.close(Duration::from_secs(5)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closing_twice_or_before_running_is_graceful() {
        let engine = EngineHandle::new("counting", counting(0), config(&[]), None).unwrap();

        assert_eq!(
            engine.close(Duration::from_secs(1)).await,
            CloseOutcome::Graceful
        );
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(
            engine.close(Duration::from_secs(1)).await,
            CloseOutcome::Graceful
        );
        assert_eq!(engine.run().await.unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn invalid_engine_configuration_is_rejected() {
        let err = EngineHandle::new(
            "counting",
            counting(0),
            config(&[("offset.storage", "file")]),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);

        let err = EngineHandle::new("other", counting(0), config(&[]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn configuration_values_are_exposed() {
        let engine = EngineHandle::new(
            "counting",
            counting(0),
            config(&[("database.dbname", "inventory")]),
            None,
        )
        .unwrap();

        assert_eq!(engine.get_configuration_value("database.dbname"), Some("inventory"));
        assert_eq!(engine.get_configuration_value("connector.class"), Some("counting"));
        assert_eq!(engine.get_configuration_value("absent"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn idle_connector_is_polled_at_the_poll_interval() {
        let stats = IdleStats::default();
        let engine = EngineHandle::new(
            "counting",
            Box::new(IdleConnector {
                stats: stats.clone(),
            }),
            config(&[("poll.interval.ms", "50")]),
            None,
        )
        .unwrap();

        engine.run().await.unwrap();
        engine
            .wait_until_running(Duration::from_secs(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let polls = stats.polls.load(Ordering::SeqCst);
        assert!(polls >= 2, "connector was polled {polls} times");
        // Ten intervals fit into the wait; leave room for scheduling jitter.
        assert!(polls <= 15, "connector was polled {polls} times");

        assert_eq!(
            engine.close(Duration::from_secs(5)).await,
            CloseOutcome::Graceful
        );
        assert!(engine.failure().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropping_every_handle_aborts_the_running_engine() {
        let stats = IdleStats::default();
        let engine = EngineHandle::new(
            "counting",
            Box::new(IdleConnector {
                stats: stats.clone(),
            }),
            config(&[]),
            None,
        )
        .unwrap();
        let state_rx = engine.inner.tracker.subscribe();
        let clone = engine.clone();

        engine.run().await.unwrap();
        engine
            .wait_until_running(Duration::from_secs(5))
            .await
            .unwrap();

        drop(engine);
        assert_eq!(*state_rx.borrow(), EngineState::Running);
        assert!(!stats.dropped.load(Ordering::SeqCst));

        drop(clone);
        assert_eq!(*state_rx.borrow(), EngineState::Stopped);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !stats.dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("aborted engine task never released its connector");

        let polls = stats.polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stats.polls.load(Ordering::SeqCst), polls);
    }
}
