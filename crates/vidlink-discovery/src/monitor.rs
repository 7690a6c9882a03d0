//! Connection state machine: owns the connected/disconnected belief.
//!
//! Transitions are driven only by health-check and discovery outcomes.
//! On every edge the monitor persists the connected flag and publishes a
//! status event; connect and disconnect edges additionally publish exactly
//! one notification each. A fresh connection refreshes the backend config.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::scanner::probe_with_timeout;
use vidlink_client::{BackendApi, HealthProbe};
use vidlink_core::{
    BridgeConfig, BridgeEvent, ConnectionStatus, EventBus, NotificationKind, Result,
};
use vidlink_store::{keys, KeyValueStore, KeyValueStoreExt};

struct MonitorState {
    status: ConnectionStatus,
    port: Option<u16>,
    backoff: Backoff,
    persisted: Option<bool>,
}

/// What a transition needs done once the lock is released.
struct Transition {
    status_changed: bool,
    connected_edge: bool,
    disconnected_edge: bool,
    persist: Option<bool>,
}

pub struct ConnectionMonitor {
    probe: Arc<dyn HealthProbe>,
    backend: Arc<dyn BackendApi>,
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
    probe_timeout: Duration,
    state: Mutex<MonitorState>,
}

impl ConnectionMonitor {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        backend: Arc<dyn BackendApi>,
        store: Arc<dyn KeyValueStore>,
        events: EventBus,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            probe,
            backend,
            store,
            events,
            probe_timeout: config.probe_timeout(),
            state: Mutex::new(MonitorState {
                status: ConnectionStatus::Disconnected,
                port: None,
                backoff: Backoff::from_config(config),
                persisted: None,
            }),
        }
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Port of the backend, only while connected.
    pub fn connected_port(&self) -> Option<u16> {
        let state = self.state.lock();
        match state.status {
            ConnectionStatus::Connected => state.port,
            _ => None,
        }
    }

    pub fn backoff_interval(&self) -> Duration {
        self.state.lock().backoff.interval()
    }

    // ---------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------

    /// One identity-verified health check against `port`.
    pub async fn check_status(&self, port: u16) -> bool {
        let result = probe_with_timeout(self.probe.as_ref(), port, self.probe_timeout).await;
        let healthy = result.is_ours();
        self.apply(healthy, Some(port)).await;
        healthy
    }

    /// Discovery is under way. Shown passively; a live connection is left as is.
    pub fn begin_discovery(&self) {
        let changed = {
            let mut state = self.state.lock();
            if state.status == ConnectionStatus::Disconnected {
                state.status = ConnectionStatus::Checking;
                true
            } else {
                false
            }
        };
        if changed {
            self.publish_status(ConnectionStatus::Checking, None);
        }
    }

    /// Discovery verified `port` already; take it without another probe.
    pub async fn attach(&self, port: u16) {
        self.apply(true, Some(port)).await;
    }

    /// Discovery came back empty.
    pub async fn mark_unreachable(&self) {
        self.apply(false, None).await;
    }

    /// Grow the retry interval after a failed discovery; returns the new interval.
    pub fn record_discovery_failure(&self) -> Duration {
        let mut state = self.state.lock();
        state.backoff.on_failure();
        state.backoff.interval()
    }

    async fn apply(&self, healthy: bool, port: Option<u16>) {
        let (transition, status, current_port) = {
            let mut state = self.state.lock();
            let previous = state.status;
            let previous_port = state.port;

            let next = if healthy {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Disconnected
            };
            state.status = next;
            state.port = if healthy { port } else { None };

            let mut transition = Transition {
                status_changed: previous != next || previous_port != state.port,
                connected_edge: healthy && !previous.is_connected(),
                disconnected_edge: !healthy && previous.is_connected(),
                persist: None,
            };
            if state.persisted != Some(healthy) {
                state.persisted = Some(healthy);
                transition.persist = Some(healthy);
            }
            if transition.connected_edge {
                state.backoff.on_success();
            }
            (transition, next, state.port)
        };

        if let Some(flag) = transition.persist {
            if let Err(e) = self.store.set_json(keys::SERVER_AVAILABLE, &flag) {
                warn!("Failed to persist connection flag: {}", e);
            }
        }
        if transition.status_changed {
            self.publish_status(status, current_port);
        }

        if transition.connected_edge {
            let port = current_port.unwrap_or_default();
            info!("Connected to backend on port {}", port);
            self.events.publish(BridgeEvent::Notification {
                kind: NotificationKind::Connected,
                message: format!("Connected to download server on port {}", port),
            });
            self.refresh_config(port).await;
        } else if transition.disconnected_edge {
            info!("Lost connection to backend");
            self.events.publish(BridgeEvent::Notification {
                kind: NotificationKind::Disconnected,
                message: "Download server is not reachable".into(),
            });
        }
    }

    fn publish_status(&self, status: ConnectionStatus, port: Option<u16>) {
        self.events
            .publish(BridgeEvent::ConnectionChanged { status, port });
    }

    /// Pull the backend config into storage. Failure keeps the previous copy.
    pub async fn refresh_config(&self, port: u16) {
        match self.backend.fetch_config(port).await {
            Ok(config) => {
                if let Err(e) = self.store.set(keys::SERVER_CONFIG, config) {
                    warn!("Failed to store backend config: {}", e);
                }
            }
            Err(e) => warn!("Config refresh from port {} failed: {}", port, e),
        }
    }

    /// Replace the backend config and mirror whatever the backend accepted.
    pub async fn push_config(&self, port: u16, config: &Value) -> Result<Value> {
        let accepted = self.backend.update_config(port, config).await?;
        self.store.set(keys::SERVER_CONFIG, accepted.clone())?;
        Ok(accepted)
    }

    /// Last config pulled from or pushed to the backend.
    pub fn cached_config(&self) -> Option<Value> {
        match self.store.get(keys::SERVER_CONFIG) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to read cached config: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeBackend, FakeProbe};
    use std::sync::atomic::Ordering;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::broadcast::Receiver;
    use vidlink_store::MemoryStore;

    struct Harness {
        monitor: ConnectionMonitor,
        probe: Arc<FakeProbe>,
        backend: Arc<FakeBackend>,
        store: Arc<MemoryStore>,
        events: Receiver<BridgeEvent>,
    }

    fn harness(healthy: &[u16]) -> Harness {
        let probe = Arc::new(FakeProbe::healthy_on(healthy));
        let backend = Arc::new(FakeBackend::default());
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new();
        let events = bus.subscribe();
        let monitor = ConnectionMonitor::new(
            probe.clone(),
            backend.clone(),
            store.clone(),
            bus,
            &BridgeConfig::default(),
        );
        Harness {
            monitor,
            probe,
            backend,
            store,
            events,
        }
    }

    fn drain(rx: &mut Receiver<BridgeEvent>) -> Vec<BridgeEvent> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }

    fn notifications(events: &[BridgeEvent]) -> Vec<NotificationKind> {
        events
            .iter()
            .filter_map(|e| match e {
                BridgeEvent::Notification { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_disconnected() {
        let h = harness(&[]);
        assert_eq!(h.monitor.status(), ConnectionStatus::Disconnected);
        assert_eq!(h.monitor.connected_port(), None);
        assert_eq!(h.monitor.backoff_interval(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_edge_persists_notifies_and_refreshes_config() {
        let mut h = harness(&[9090]);

        assert!(h.monitor.check_status(9090).await);
        assert_eq!(h.monitor.status(), ConnectionStatus::Connected);
        assert_eq!(h.monitor.connected_port(), Some(9090));
        assert_eq!(
            h.store.get_json::<bool>(keys::SERVER_AVAILABLE).unwrap(),
            Some(true)
        );
        assert_eq!(h.backend.config_fetches.load(Ordering::SeqCst), 1);
        let config = h.store.get(keys::SERVER_CONFIG).unwrap().unwrap();
        assert_eq!(config["downloadDir"], "/videos");

        let events = drain(&mut h.events);
        assert_eq!(notifications(&events), vec![NotificationKind::Connected]);
        assert!(events.iter().any(|e| matches!(
            e,
            BridgeEvent::ConnectionChanged {
                status: ConnectionStatus::Connected,
                port: Some(9090)
            }
        )));

        // steady state: no new events, no extra config fetch
        assert!(h.monitor.check_status(9090).await);
        assert!(drain(&mut h.events).is_empty());
        assert_eq!(h.backend.config_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_notifies_once() {
        let mut h = harness(&[9090]);
        h.monitor.check_status(9090).await;
        drain(&mut h.events);

        h.probe.set_healthy(&[]);
        for _ in 0..5 {
            assert!(!h.monitor.check_status(9090).await);
        }
        let events = drain(&mut h.events);
        assert_eq!(notifications(&events), vec![NotificationKind::Disconnected]);
        assert_eq!(h.monitor.connected_port(), None);
        assert_eq!(
            h.store.get_json::<bool>(keys::SERVER_AVAILABLE).unwrap(),
            Some(false)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_service_counts_as_disconnected() {
        let probe = Arc::new(FakeProbe::healthy_on(&[]).with_foreign(&[9090]));
        let monitor = ConnectionMonitor::new(
            probe,
            Arc::new(FakeBackend::default()),
            Arc::new(MemoryStore::new()),
            EventBus::new(),
            &BridgeConfig::default(),
        );
        assert!(!monitor.check_status(9090).await);
        assert_eq!(monitor.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_on_discovery_failure_and_resets_on_connect() {
        let h = harness(&[9090]);
        assert_eq!(h.monitor.record_discovery_failure(), Duration::from_millis(2000));
        assert_eq!(h.monitor.record_discovery_failure(), Duration::from_millis(4000));

        // a disconnect leaves backoff alone
        h.monitor.mark_unreachable().await;
        assert_eq!(h.monitor.backoff_interval(), Duration::from_millis(4000));

        h.monitor.check_status(9090).await;
        assert_eq!(h.monitor.backoff_interval(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checking_is_passive() {
        let mut h = harness(&[9090]);
        h.monitor.begin_discovery();
        assert_eq!(h.monitor.status(), ConnectionStatus::Checking);

        h.monitor.mark_unreachable().await;
        assert_eq!(h.monitor.status(), ConnectionStatus::Disconnected);
        let events = drain(&mut h.events);
        // never connected, so no notification
        assert!(notifications(&events).is_empty());

        h.monitor.check_status(9090).await;
        h.monitor.begin_discovery();
        assert_eq!(h.monitor.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_failure_does_not_block_connect() {
        let h = harness(&[9090]);
        h.backend.fail_config.store(true, Ordering::SeqCst);
        assert!(h.monitor.check_status(9090).await);
        assert!(h.monitor.is_connected());
        assert_eq!(h.store.get(keys::SERVER_CONFIG).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_config_mirrors_accepted_value() {
        let h = harness(&[9090]);
        h.monitor.check_status(9090).await;

        let accepted = h
            .monitor
            .push_config(9090, &serde_json::json!({"maxConcurrent": 4}))
            .await
            .unwrap();
        assert_eq!(accepted["maxConcurrent"], 4);
        assert_eq!(h.monitor.cached_config(), Some(accepted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_change_while_connected_is_published() {
        let mut h = harness(&[9090, 9093]);
        h.monitor.check_status(9090).await;
        drain(&mut h.events);

        h.monitor.check_status(9093).await;
        let events = drain(&mut h.events);
        assert!(notifications(&events).is_empty());
        assert!(events.iter().any(|e| matches!(
            e,
            BridgeEvent::ConnectionChanged {
                port: Some(9093),
                ..
            }
        )));
        assert_eq!(h.monitor.connected_port(), Some(9093));
    }
}
