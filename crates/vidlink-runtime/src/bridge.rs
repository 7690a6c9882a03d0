//! Bridge: the single context that owns every component.
//!
//! Components never reach each other through globals; the bridge wires
//! them together and runs three periodic drivers:
//! health checks on the connected port, discovery with backoff while
//! disconnected, and queue reconciliation while connected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use vidlink_client::{BackendApi, DownloadAction, DownloadRequest, HealthProbe, HttpBackend};
use vidlink_core::{
    BridgeConfig, BridgeEvent, ConnectionStatus, Error, EventBus, QueueSnapshot, Result,
};
use vidlink_discovery::{ConnectionMonitor, PortScanner};
use vidlink_queue::{QueueReconciler, RequestDeduplicator, SubmitOutcome};
use vidlink_store::KeyValueStore;

pub struct Bridge {
    config: BridgeConfig,
    events: EventBus,
    backend: Arc<dyn BackendApi>,
    scanner: PortScanner,
    monitor: ConnectionMonitor,
    dedup: RequestDeduplicator,
    reconciler: QueueReconciler,
    online: Arc<AtomicBool>,
    discovery: tokio::sync::Mutex<()>,
    wake_discovery: Notify,
}

impl Bridge {
    /// Create a bridge that talks HTTP to the local backend.
    pub fn new(config: BridgeConfig, store: Arc<dyn KeyValueStore>) -> Result<Arc<Self>> {
        config.validate()?;
        let http = Arc::new(HttpBackend::new(&config)?);
        let online = http.online_flag();
        Ok(Self::assemble(config, store, http.clone(), http, online))
    }

    /// Create a bridge over arbitrary probe and backend implementations.
    pub fn with_backend(
        config: BridgeConfig,
        store: Arc<dyn KeyValueStore>,
        probe: Arc<dyn HealthProbe>,
        backend: Arc<dyn BackendApi>,
    ) -> Arc<Self> {
        Self::assemble(config, store, probe, backend, Arc::new(AtomicBool::new(true)))
    }

    fn assemble(
        config: BridgeConfig,
        store: Arc<dyn KeyValueStore>,
        probe: Arc<dyn HealthProbe>,
        backend: Arc<dyn BackendApi>,
        online: Arc<AtomicBool>,
    ) -> Arc<Self> {
        let events = EventBus::new();
        let scanner = PortScanner::from_config(probe.clone(), store.clone(), &config);
        let monitor = ConnectionMonitor::new(
            probe,
            backend.clone(),
            store.clone(),
            events.clone(),
            &config,
        );
        let dedup = RequestDeduplicator::from_config(&config);
        let reconciler = QueueReconciler::new(backend.clone(), store, events.clone());

        info!(
            "Bridge initialized: ports {}-{}, batch={}, order={:?}",
            config.base_port,
            config.max_port(),
            config.batch_size,
            config.discovery_order
        );

        Arc::new(Self {
            config,
            events,
            backend,
            scanner,
            monitor,
            dedup,
            reconciler,
            online,
            discovery: tokio::sync::Mutex::new(()),
            wake_discovery: Notify::new(),
        })
    }

    // ---------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.monitor.status()
    }

    pub fn connected_port(&self) -> Option<u16> {
        self.monitor.connected_port()
    }

    pub fn cached_port(&self) -> Option<u16> {
        self.scanner.cached_port()
    }

    pub fn backoff_interval(&self) -> Duration {
        self.monitor.backoff_interval()
    }

    pub fn queue(&self) -> QueueSnapshot {
        self.reconciler.snapshot()
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.reconciler.last_synced()
    }

    pub fn server_config(&self) -> Option<Value> {
        self.monitor.cached_config()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Events as a `Stream`; a lagging reader sees `Err` entries and keeps going.
    pub fn event_stream(&self) -> BroadcastStream<BridgeEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    // ---------------------------------------------------------------
    // Connection
    // ---------------------------------------------------------------

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a network transition. Coming back online rediscovers at once.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return;
        }
        if online {
            info!("Network back online, rediscovering");
            self.wake_discovery.notify_one();
        } else {
            warn!("{}", Error::NetworkUnavailable);
        }
    }

    /// Run one discovery pass now. Serialized with the periodic driver.
    pub async fn rediscover(&self, force_scan: bool) -> Option<u16> {
        let _discovery = self.discovery.lock().await;

        if !self.is_online() {
            debug!("Discovery skipped while offline");
            return None;
        }

        self.monitor.begin_discovery();
        let events = self.events.clone();
        let found = self
            .scanner
            .discover(
                self.config.base_port,
                self.config.max_port(),
                force_scan,
                self.config.probe_timeout(),
                move |scanned, total| events.publish(BridgeEvent::ScanProgress { scanned, total }),
            )
            .await;

        match found {
            Some(port) => self.monitor.attach(port).await,
            None => {
                self.monitor.mark_unreachable().await;
                let retry = self.monitor.record_discovery_failure();
                info!("Backend not found, next attempt in {:?}", retry);
            }
        }
        found
    }

    /// One health check against the connected port.
    ///
    /// A failure wakes discovery instead of waiting out its interval.
    pub async fn check_health(&self) -> bool {
        let Some(port) = self.monitor.connected_port() else {
            return false;
        };
        let healthy = self.monitor.check_status(port).await;
        if !healthy {
            self.wake_discovery.notify_one();
        }
        healthy
    }

    fn require_port(&self) -> Result<u16> {
        self.monitor.connected_port().ok_or(Error::NotConnected)
    }

    // ---------------------------------------------------------------
    // Queue and downloads
    // ---------------------------------------------------------------

    /// Run one reconciliation cycle now. Returns whether the mirror changed.
    pub async fn refresh_queue(&self) -> Result<bool> {
        let port = self.require_port()?;
        self.reconciler.run_cycle(port).await
    }

    /// Submit a download through the duplicate guard.
    pub async fn submit(&self, request: DownloadRequest) -> SubmitOutcome {
        let port = match self.require_port() {
            Ok(port) => port,
            Err(e) => return SubmitOutcome::Failed(e),
        };
        let backend = self.backend.clone();
        let url = request.url.clone();
        let outcome = self
            .dedup
            .submit(&url, move || async move {
                backend.submit_download(port, &request).await
            })
            .await;
        if let SubmitOutcome::Accepted(response) = &outcome {
            info!(
                "Download accepted: {} (id={})",
                url,
                response.id.as_deref().unwrap_or("-")
            );
        }
        outcome
    }

    pub async fn cancel(&self, id: &str) -> Result<()> {
        self.control(id, DownloadAction::Cancel).await
    }

    pub async fn pause(&self, id: &str) -> Result<()> {
        self.control(id, DownloadAction::Pause).await
    }

    pub async fn resume(&self, id: &str) -> Result<()> {
        self.control(id, DownloadAction::Resume).await
    }

    async fn control(&self, id: &str, action: DownloadAction) -> Result<()> {
        let port = self.require_port()?;
        self.backend.control(port, id, action).await?;
        debug!("Sent {} for download {}", action, id);
        Ok(())
    }

    /// Reorder the queue. Applied locally even while disconnected.
    pub async fn reorder(&self, order: &[String]) -> Result<()> {
        self.reconciler
            .reorder(self.monitor.connected_port(), order)
            .await
    }

    /// Remove one id from the queue. Applied locally even while disconnected.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.reconciler
            .remove(self.monitor.connected_port(), id)
            .await
    }

    pub async fn update_config(&self, config: &Value) -> Result<Value> {
        let port = self.require_port()?;
        self.monitor.push_config(port, config).await
    }

    // ---------------------------------------------------------------
    // Drivers
    // ---------------------------------------------------------------

    /// Spawn the periodic drivers. They run until the handle shuts them down.
    pub fn start(self: &Arc<Self>) -> BridgeHandle {
        let (shutdown, rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(Arc::clone(self).discovery_loop(rx.clone())),
            tokio::spawn(Arc::clone(self).health_loop(rx.clone())),
            tokio::spawn(Arc::clone(self).queue_loop(rx)),
        ];
        info!("Bridge drivers started");
        BridgeHandle { shutdown, tasks }
    }

    async fn discovery_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if self.monitor.connected_port().is_none() {
                self.rediscover(false).await;
            }
            let wait = if self.monitor.is_connected() {
                self.config.discovery_interval()
            } else {
                self.monitor.backoff_interval()
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.wake_discovery.notified() => debug!("Discovery woken"),
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!("Discovery driver stopped");
    }

    async fn health_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.health_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.check_health().await;
                }
            }
        }
        debug!("Health driver stopped");
    }

    async fn queue_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.queue_poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Some(port) = self.monitor.connected_port() {
                        // failures are logged by the reconciler and retried next tick
                        let _ = self.reconciler.run_cycle(port).await;
                    }
                }
            }
        }
        debug!("Queue driver stopped");
    }
}

/// Running drivers. Dropping the handle without `shutdown` detaches them.
pub struct BridgeHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Stop every driver and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Bridge driver ended abnormally: {}", e);
            }
        }
        info!("Bridge drivers stopped");
    }
}
