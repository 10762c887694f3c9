//! Scripted connectors, recording resources and callbacks shared by the integration tests.
//!
//! Every fixture writes to a [`CallLog`] so that tests can assert on the exact order in which
//! the orchestrator drives resources, the connector and callbacks.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cdc_harness::callback::ConnectorCallback;
use cdc_harness::connector::Connector;
use cdc_harness::engine::EngineConfig;
use cdc_harness::error::{ErrorKind, HarnessResult};
use cdc_harness::harness_error;
use cdc_harness::registry::Registry;
use cdc_harness::resource::Resource;
use cdc_harness::types::ChangeEvent;
use cdc_harness_config::shared::{HarnessConfig, Lifecycle};

/// Ordered record of every lifecycle call made on the fixtures.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the index of the first occurrence of `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn contains(&self, call: &str) -> bool {
        self.position(call).is_some()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

/// A resource that records its calls and returns a fixed configuration fragment.
pub struct RecordingResource {
    name: String,
    log: CallLog,
    values: HashMap<String, String>,
    fail_start: bool,
    fail_stop: bool,
}

impl RecordingResource {
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
            values: HashMap::new(),
            fail_start: false,
            fail_stop: false,
        }
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }
}

#[async_trait]
impl Resource for RecordingResource {
    async fn start(&mut self) -> HarnessResult<HashMap<String, String>> {
        self.log.push(format!("resource:{}:start", self.name));

        if self.fail_start {
            return Err(harness_error!(
                ErrorKind::IoError,
                "Container did not come up",
                &self.name
            ));
        }

        Ok(self.values.clone())
    }

    async fn stop(&mut self) -> HarnessResult<()> {
        self.log.push(format!("resource:{}:stop", self.name));

        if self.fail_stop {
            return Err(harness_error!(
                ErrorKind::IoError,
                "Container refused to stop",
                &self.name
            ));
        }

        Ok(())
    }
}

/// How a [`ScriptedConnector`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Emits its events and then idles until stopped.
    Emit,
    /// Fails in `start`.
    RefuseStart,
    /// Never returns from `start`.
    HangOnStart,
    /// Never returns from `stop`.
    HangOnStop,
    /// Fails on the first `poll`.
    FailPoll,
}

/// A connector that follows a [`Script`], emitting a fixed list of events.
pub struct ScriptedConnector {
    log: CallLog,
    script: Script,
    pending: VecDeque<ChangeEvent>,
}

impl ScriptedConnector {
    pub fn new(log: CallLog, script: Script, events: Vec<ChangeEvent>) -> Self {
        Self {
            log,
            script,
            pending: events.into(),
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn start(&mut self, config: &EngineConfig) -> HarnessResult<()> {
        self.log
            .push(format!("connector:start:{}", config.connector()));

        match self.script {
            Script::RefuseStart => Err(harness_error!(
                ErrorKind::ConnectorFailed,
                "Connector refused to start",
                "publication does not exist"
            )),
            Script::HangOnStart => {
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn poll(&mut self) -> HarnessResult<Vec<ChangeEvent>> {
        if self.script == Script::FailPoll {
            return Err(harness_error!(
                ErrorKind::ConnectorFailed,
                "Replication stream broke"
            ));
        }

        match self.pending.pop_front() {
            Some(event) => Ok(vec![event]),
            None => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(vec![])
            }
        }
    }

    async fn stop(&mut self) -> HarnessResult<()> {
        self.log.push("connector:stop");

        if self.script == Script::HangOnStop {
            std::future::pending::<()>().await;
        }

        Ok(())
    }
}

/// A callback that records every notification it receives.
pub struct RecordingCallback {
    log: CallLog,
}

impl ConnectorCallback for RecordingCallback {
    fn connector_started(&self) -> HarnessResult<()> {
        self.log.push("callback:connector_started");
        Ok(())
    }

    fn connector_stopped(&self) -> HarnessResult<()> {
        self.log.push("callback:connector_stopped");
        Ok(())
    }

    fn task_started(&self) -> HarnessResult<()> {
        self.log.push("callback:task_started");
        Ok(())
    }

    fn task_stopped(&self) -> HarnessResult<()> {
        self.log.push("callback:task_stopped");
        Ok(())
    }
}

/// A callback whose started notification fails.
pub struct FailingCallback;

impl ConnectorCallback for FailingCallback {
    fn connector_started(&self) -> HarnessResult<()> {
        Err(harness_error!(
            ErrorKind::CallbackFailed,
            "User callback failed"
        ))
    }
}

/// A callback whose started notification panics.
pub struct PanickingCallback;

impl ConnectorCallback for PanickingCallback {
    fn connector_started(&self) -> HarnessResult<()> {
        panic!("user callback panicked");
    }
}

pub fn user_event(position: u64) -> ChangeEvent {
    ChangeEvent::new(
        "testing.public.users",
        json!({ "id": position, "name": format!("user_{position}") }),
        "testing_slot",
        position,
    )
    .with_key(position.to_string())
}

fn connector_factory(
    log: &CallLog,
    script: Script,
    events: Vec<ChangeEvent>,
) -> impl Fn() -> HarnessResult<Box<dyn Connector>> + Send + Sync + 'static {
    let log = log.clone();
    move || -> HarnessResult<Box<dyn Connector>> {
        Ok(Box::new(ScriptedConnector::new(
            log.clone(),
            script,
            events.clone(),
        )))
    }
}

fn resource_factory(
    log: &CallLog,
    make: fn(CallLog) -> RecordingResource,
) -> impl Fn() -> HarnessResult<Box<dyn Resource>> + Send + Sync + 'static {
    let log = log.clone();
    move || -> HarnessResult<Box<dyn Resource>> { Ok(Box::new(make(log.clone()))) }
}

/// Builds a registry whose fixtures all write to `log`.
///
/// Connectors: `scripted` emits three events; `refusing`, `hanging_start`, `hanging_stop`
/// and `failing_poll` follow the matching [`Script`].
/// Resources: `a` and `b` return `hostname`/`port` fragments, `failing_start` and
/// `failing_stop` fail in the matching phase.
/// Callbacks: `recording`, `failing` and `panicking`.
pub fn registry(log: &CallLog) -> Registry {
    let recording_log = log.clone();

    Registry::new()
        .register_connector_with(
            "scripted",
            connector_factory(
                log,
                Script::Emit,
                vec![user_event(1), user_event(2), user_event(3)],
            ),
        )
        .register_connector_with(
            "refusing",
            connector_factory(log, Script::RefuseStart, vec![]),
        )
        .register_connector_with(
            "hanging_start",
            connector_factory(log, Script::HangOnStart, vec![]),
        )
        .register_connector_with(
            "hanging_stop",
            connector_factory(log, Script::HangOnStop, vec![]),
        )
        .register_connector_with(
            "failing_poll",
            connector_factory(log, Script::FailPoll, vec![]),
        )
        .register_resource_with(
            "a",
            resource_factory(log, |log| {
                RecordingResource::new("a", log)
                    .with_value("hostname", "h")
                    .with_value("port", "5432")
            }),
        )
        .register_resource_with(
            "b",
            resource_factory(log, |log| {
                RecordingResource::new("b", log).with_value("hostname", "b-host")
            }),
        )
        .register_resource_with(
            "failing_start",
            resource_factory(log, |log| {
                RecordingResource::new("failing_start", log).failing_start()
            }),
        )
        .register_resource_with(
            "failing_stop",
            resource_factory(log, |log| {
                RecordingResource::new("failing_stop", log).failing_stop()
            }),
        )
        .register_callback_with("recording", move || {
            Ok(Arc::new(RecordingCallback {
                log: recording_log.clone(),
            }))
        })
        .register_callback_with("failing", || Ok(Arc::new(FailingCallback)))
        .register_callback_with("panicking", || Ok(Arc::new(PanickingCallback)))
}

/// Harness configuration with short bounds so failing tests finish quickly.
pub fn fast_config(lifecycle: Lifecycle) -> HarnessConfig {
    HarnessConfig {
        engine_start_timeout_ms: 2_000,
        engine_close_timeout_ms: 500,
        lifecycle,
        ..HarnessConfig::default()
    }
}
