//! Port scanner: cached-port revalidation, canonical-port probe, batched range scan.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use vidlink_client::HealthProbe;
use vidlink_core::{BridgeConfig, DiscoveryOrder, Error, HealthCheckResult};
use vidlink_store::{keys, KeyValueStore, KeyValueStoreExt};

/// Probe one port with a hard deadline; overrunning reads as unreachable.
pub(crate) async fn probe_with_timeout(
    probe: &dyn HealthProbe,
    port: u16,
    timeout: Duration,
) -> HealthCheckResult {
    match tokio::time::timeout(timeout, probe.check(port, timeout)).await {
        Ok(result) => {
            if result.reachable && !result.identity_matches {
                debug!(
                    "{}",
                    Error::IdentityMismatch {
                        port,
                        found: None
                    }
                );
            }
            result
        }
        Err(_) => {
            debug!("{}", Error::ProbeTimeout { port });
            HealthCheckResult::unreachable()
        }
    }
}

/// Locates the backend's listening port. Sole writer of the cached port.
pub struct PortScanner {
    probe: Arc<dyn HealthProbe>,
    store: Arc<dyn KeyValueStore>,
    batch_size: usize,
    order: DiscoveryOrder,
}

impl PortScanner {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        store: Arc<dyn KeyValueStore>,
        batch_size: usize,
        order: DiscoveryOrder,
    ) -> Self {
        Self {
            probe,
            store,
            batch_size: batch_size.max(1),
            order,
        }
    }

    pub fn from_config(
        probe: Arc<dyn HealthProbe>,
        store: Arc<dyn KeyValueStore>,
        config: &BridgeConfig,
    ) -> Self {
        Self::new(probe, store, config.batch_size, config.discovery_order)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Last known-good port, unvalidated.
    pub fn cached_port(&self) -> Option<u16> {
        match self.store.get_json::<u16>(keys::SERVER_PORT) {
            Ok(port) => port,
            Err(e) => {
                warn!("Failed to read cached port: {}", e);
                None
            }
        }
    }

    pub fn invalidate_cache(&self) {
        if let Err(e) = self.store.set(keys::SERVER_PORT, Value::Null) {
            warn!("Failed to clear cached port: {}", e);
        }
    }

    fn remember(&self, port: u16) {
        if let Err(e) = self.store.set_json(keys::SERVER_PORT, &port) {
            warn!("Failed to cache port {}: {}", port, e);
        }
    }

    async fn is_ours(&self, port: u16, timeout: Duration) -> bool {
        probe_with_timeout(self.probe.as_ref(), port, timeout)
            .await
            .is_ours()
    }

    /// Revalidate the cached port; a stale entry is cleared.
    async fn try_cached(&self, timeout: Duration) -> Option<u16> {
        let cached = self.cached_port()?;
        if self.is_ours(cached, timeout).await {
            debug!("Cached port {} is still valid", cached);
            return Some(cached);
        }
        info!("Cached port {} is stale, invalidating", cached);
        self.invalidate_cache();
        None
    }

    async fn try_canonical(&self, base_port: u16, timeout: Duration) -> Option<u16> {
        if self.is_ours(base_port, timeout).await {
            self.remember(base_port);
            return Some(base_port);
        }
        None
    }

    /// Find the backend in `[base_port, max_port]`.
    ///
    /// Short-circuits on the first success. `on_progress(scanned, total)`
    /// fires once per settled batch of the range scan.
    pub async fn discover<F>(
        &self,
        base_port: u16,
        max_port: u16,
        force_scan: bool,
        probe_timeout: Duration,
        mut on_progress: F,
    ) -> Option<u16>
    where
        F: FnMut(usize, usize) + Send,
    {
        if !self.probe.network_available() {
            warn!("Discovery skipped: {}", Error::NetworkUnavailable);
            return None;
        }

        match self.order {
            DiscoveryOrder::CacheFirst => {
                if !force_scan {
                    if let Some(port) = self.try_cached(probe_timeout).await {
                        return Some(port);
                    }
                }
                if let Some(port) = self.try_canonical(base_port, probe_timeout).await {
                    info!("Backend found on canonical port {}", port);
                    return Some(port);
                }
            }
            DiscoveryOrder::DefaultFirst => {
                if let Some(port) = self.try_canonical(base_port, probe_timeout).await {
                    info!("Backend found on canonical port {}", port);
                    return Some(port);
                }
                if !force_scan && self.cached_port() != Some(base_port) {
                    if let Some(port) = self.try_cached(probe_timeout).await {
                        return Some(port);
                    }
                } else if !force_scan {
                    self.invalidate_cache();
                }
            }
        }

        let found = self
            .scan_range(base_port, max_port, probe_timeout, &mut on_progress)
            .await;
        match found {
            Some(port) => {
                info!("Backend found on port {}", port);
                self.remember(port);
            }
            None => info!(
                "Backend not found in ports {}-{}",
                base_port, max_port
            ),
        }
        found
    }

    /// Scan `(base_port, max_port]` in fixed-size concurrent batches.
    async fn scan_range<F>(
        &self,
        base_port: u16,
        max_port: u16,
        timeout: Duration,
        on_progress: &mut F,
    ) -> Option<u16>
    where
        F: FnMut(usize, usize) + Send,
    {
        if max_port <= base_port {
            return None;
        }
        let ports: Vec<u16> = (base_port + 1..=max_port).collect();
        let total = ports.len();
        let mut scanned = 0;

        for batch in ports.chunks(self.batch_size) {
            debug!(
                "Probing ports {}-{}",
                batch[0],
                batch[batch.len() - 1]
            );
            let results = join_all(
                batch
                    .iter()
                    .map(|&port| probe_with_timeout(self.probe.as_ref(), port, timeout)),
            )
            .await;

            scanned += batch.len();
            on_progress(scanned, total);

            // Index order, not arrival order.
            if let Some(port) = batch
                .iter()
                .zip(results.iter())
                .find(|(_, result)| result.is_ours())
                .map(|(&port, _)| port)
            {
                return Some(port);
            }
        }
        None
    }
}
