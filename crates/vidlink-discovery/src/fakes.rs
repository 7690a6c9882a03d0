//! Test doubles for the backend seams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use vidlink_client::{
    BackendApi, DownloadAction, DownloadRequest, HealthProbe, StatusEntry, SubmitResponse,
};
use vidlink_core::{Error, HealthCheckResult, Result};

/// Simulated loopback: a set of ports where our backend answers.
pub struct FakeProbe {
    healthy: Mutex<HashSet<u16>>,
    foreign: HashSet<u16>,
    delays: HashMap<u16, Duration>,
    online: AtomicBool,
    calls: Mutex<Vec<u16>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProbe {
    pub fn healthy_on(ports: &[u16]) -> Self {
        Self {
            healthy: Mutex::new(ports.iter().copied().collect()),
            foreign: HashSet::new(),
            delays: HashMap::new(),
            online: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_foreign(mut self, ports: &[u16]) -> Self {
        self.foreign.extend(ports.iter().copied());
        self
    }

    pub fn with_delay(mut self, port: u16, delay: Duration) -> Self {
        self.delays.insert(port, delay);
        self
    }

    pub fn offline(self) -> Self {
        self.online.store(false, Ordering::SeqCst);
        self
    }

    /// Move the backend to a different set of ports.
    pub fn set_healthy(&self, ports: &[u16]) {
        *self.healthy.lock() = ports.iter().copied().collect();
    }

    pub fn calls(&self) -> Vec<u16> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn check(&self, port: u16, _timeout: Duration) -> HealthCheckResult {
        self.calls.lock().push(port);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(&port)
            .copied()
            .unwrap_or(Duration::from_millis(10));
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.healthy.lock().contains(&port) {
            HealthCheckResult::healthy()
        } else if self.foreign.contains(&port) {
            HealthCheckResult::foreign()
        } else {
            HealthCheckResult::unreachable()
        }
    }

    fn network_available(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Backend that only knows how to serve its config.
#[derive(Default)]
pub struct FakeBackend {
    pub config_fetches: AtomicUsize,
    pub fail_config: AtomicBool,
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn fetch_config(&self, _port: u16) -> Result<Value> {
        self.config_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_config.load(Ordering::SeqCst) {
            return Err(Error::Backend {
                status: 500,
                message: "config unavailable".into(),
            });
        }
        Ok(json!({"downloadDir": "/videos", "maxConcurrent": 2}))
    }

    async fn update_config(&self, _port: u16, config: &Value) -> Result<Value> {
        Ok(config.clone())
    }

    async fn fetch_status(&self, _port: u16) -> Result<Vec<StatusEntry>> {
        Ok(Vec::new())
    }

    async fn submit_download(
        &self,
        _port: u16,
        _request: &DownloadRequest,
    ) -> Result<SubmitResponse> {
        Err(Error::NotConnected)
    }

    async fn reorder_queue(&self, _port: u16, _order: &[String]) -> Result<()> {
        Ok(())
    }

    async fn remove_from_queue(&self, _port: u16, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn control(&self, _port: u16, _id: &str, _action: DownloadAction) -> Result<()> {
        Ok(())
    }
}
