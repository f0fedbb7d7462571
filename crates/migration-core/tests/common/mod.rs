//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use migration_core::alerts::{AlertChannel, ChannelError, ChannelKind};
use migration_core::{
    Alert, AlertDispatcher, AlertType, DispatcherConfig, MigrationError, MigrationOperation,
    WorkItem,
};

/// How a scripted item behaves on each attempt.
#[derive(Debug, Clone)]
pub enum Script {
    FailTimes(u32),
    AlwaysFail,
    Panic,
    Unauthorized,
    Sleep(Duration),
}

#[derive(Default)]
pub struct ScriptedOperation {
    scripts: Mutex<HashMap<String, Script>>,
    attempts: Mutex<HashMap<String, u32>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedOperation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, id: &str, script: Script) -> Arc<Self> {
        self.scripts.lock().unwrap().insert(id.to_string(), script);
        Arc::clone(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MigrationOperation for ScriptedOperation {
    async fn migrate(&self, item: &WorkItem) -> migration_core::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(item.id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let script = self.scripts.lock().unwrap().get(&item.id).cloned();

        // Let sibling workers start before this one finishes.
        tokio::task::yield_now().await;

        let failed = |reason: &str| {
            Err(MigrationError::ItemFailed {
                item: item.id.clone(),
                reason: reason.to_string(),
            })
        };
        match script {
            None => Ok(()),
            Some(Script::FailTimes(n)) if attempt <= n => failed("transient failure"),
            Some(Script::FailTimes(_)) => Ok(()),
            Some(Script::AlwaysFail) => failed("repository is archived"),
            Some(Script::Panic) => panic!("worker exploded on {}", item.id),
            Some(Script::Unauthorized) => Err(MigrationError::Authentication(
                "remote returned HTTP 401".into(),
            )),
            Some(Script::Sleep(d)) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
        }
    }
}

pub fn items(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| {
            let id = format!("repo-{i:02}");
            WorkItem::new(id.clone(), format!("project/{id}"), id)
        })
        .collect()
}

/// Channel that remembers every alert it was asked to deliver.
pub struct RecordingChannel {
    kind: ChannelKind,
    fail: bool,
    delay: Duration,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail: false,
            delay: Duration::ZERO,
            alerts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail: true,
            delay: Duration::ZERO,
            alerts: Mutex::new(Vec::new()),
        })
    }

    /// Records the alert, then waits `delay` before acknowledging it.
    pub fn slow(kind: ChannelKind, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail: false,
            delay,
            alerts: Mutex::new(Vec::new()),
        })
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn count(&self, alert_type: &AlertType) -> usize {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| &a.alert_type == alert_type)
            .count()
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        self.alerts.lock().unwrap().push(alert.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(ChannelError::Http {
                status: 500,
                body: "internal error".into(),
            });
        }
        Ok(())
    }
}

pub fn recording_dispatcher() -> (Arc<AlertDispatcher>, Arc<RecordingChannel>) {
    let channel = RecordingChannel::new(ChannelKind::Console);
    let dispatcher = AlertDispatcher::new(
        DispatcherConfig::default(),
        vec![channel.clone() as Arc<dyn AlertChannel>],
    );
    (Arc::new(dispatcher), channel)
}
