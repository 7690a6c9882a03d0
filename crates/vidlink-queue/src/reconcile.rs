//! Queue reconciliation against the backend's authoritative status snapshot.
//!
//! Every cycle replaces the local mirror wholesale. Nothing is patched
//! incrementally, so the mirror converges to server truth on each success.
//! Cycles and local mutations share one async lock and never interleave.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use vidlink_client::{BackendApi, StatusEntry};
use vidlink_core::{
    BridgeEvent, DownloadState, DownloadStatus, EventBus, QueueSnapshot, QueuedDetail, Result,
};
use vidlink_store::{keys, KeyValueStore, KeyValueStoreExt};

/// Fold a status snapshot into a mirror. Active wins over queued for an id.
pub fn merge_snapshot(entries: Vec<StatusEntry>) -> QueueSnapshot {
    let mut active: BTreeMap<String, DownloadStatus> = BTreeMap::new();
    let mut server_queued: Vec<StatusEntry> = Vec::new();

    for entry in entries {
        if entry.status.status == DownloadState::Queued {
            server_queued.push(entry);
        } else {
            active.insert(entry.id, entry.status);
        }
    }

    let mut snapshot = QueueSnapshot {
        active,
        ..QueueSnapshot::default()
    };
    for entry in server_queued {
        if snapshot.active.contains_key(&entry.id) || snapshot.queued.contains(&entry.id) {
            continue;
        }
        let detail = QueuedDetail {
            url: entry.status.url,
            title: entry.status.title,
            filename: entry.status.filename,
        };
        snapshot.queued_details.insert(entry.id.clone(), detail);
        snapshot.queued.push(entry.id);
    }
    snapshot
}

pub struct QueueReconciler {
    backend: Arc<dyn BackendApi>,
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
    mirror: RwLock<QueueSnapshot>,
    last_synced: RwLock<Option<DateTime<Utc>>>,
    cycle: tokio::sync::Mutex<()>,
}

impl QueueReconciler {
    /// Create a new reconciler, restoring the last persisted mirror.
    pub fn new(
        backend: Arc<dyn BackendApi>,
        store: Arc<dyn KeyValueStore>,
        events: EventBus,
    ) -> Self {
        let restored = restore_mirror(store.as_ref());
        if !restored.is_empty() {
            info!(
                "Restored queue mirror: {} queued, {} active",
                restored.queued.len(),
                restored.active.len()
            );
        }
        Self {
            backend,
            store,
            events,
            mirror: RwLock::new(restored),
            last_synced: RwLock::new(None),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.mirror.read().clone()
    }

    /// When the last successful fetch was merged.
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        *self.last_synced.read()
    }

    // ---------------------------------------------------------------
    // Reconciliation
    // ---------------------------------------------------------------

    /// One fetch-and-merge pass. Returns whether the mirror changed.
    ///
    /// A failed or malformed fetch leaves the mirror untouched.
    pub async fn run_cycle(&self, port: u16) -> Result<bool> {
        let _cycle = self.cycle.lock().await;

        let entries = match self.backend.fetch_status(port).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Status fetch from port {} failed: {}", port, e);
                return Err(e);
            }
        };
        let next = merge_snapshot(entries);
        *self.last_synced.write() = Some(Utc::now());

        let changed = self.replace(next);
        if changed {
            debug!("Queue mirror changed");
        }
        Ok(changed)
    }

    // ---------------------------------------------------------------
    // Optimistic mutations
    // ---------------------------------------------------------------

    /// Reorder the queue locally, then ask the backend to do the same.
    ///
    /// Ids not currently queued are ignored; queued ids missing from
    /// `order` keep their relative order at the end.
    pub async fn reorder(&self, port: Option<u16>, order: &[String]) -> Result<()> {
        let _cycle = self.cycle.lock().await;

        let mut next = self.snapshot();
        let mut reordered: Vec<String> = Vec::with_capacity(next.queued.len());
        for id in order {
            if next.queued.contains(id) && !reordered.contains(id) {
                reordered.push(id.clone());
            }
        }
        for id in &next.queued {
            if !reordered.contains(id) {
                reordered.push(id.clone());
            }
        }
        next.queued = reordered;
        self.replace(next);

        match port {
            Some(port) => {
                let queued = self.mirror.read().queued.clone();
                self.backend
                    .reorder_queue(port, &queued)
                    .await
                    .map_err(|e| {
                        warn!("Queue reorder on backend failed: {}", e);
                        e
                    })
            }
            None => Ok(()),
        }
    }

    /// Drop one id from the queue locally, then on the backend.
    pub async fn remove(&self, port: Option<u16>, id: &str) -> Result<()> {
        let _cycle = self.cycle.lock().await;

        let mut next = self.snapshot();
        next.queued.retain(|q| q != id);
        next.queued_details.remove(id);
        self.replace(next);

        match port {
            Some(port) => self
                .backend
                .remove_from_queue(port, id)
                .await
                .map_err(|e| {
                    warn!("Queue removal of {} on backend failed: {}", id, e);
                    e
                }),
            None => Ok(()),
        }
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    /// Swap in `next`; on a structural change publish once and persist.
    fn replace(&self, next: QueueSnapshot) -> bool {
        {
            let mut mirror = self.mirror.write();
            if *mirror == next {
                return false;
            }
            *mirror = next.clone();
        }
        self.persist(&next);
        self.events.publish(BridgeEvent::QueueChanged(next));
        true
    }

    fn persist(&self, snapshot: &QueueSnapshot) {
        let writes = [
            self.store.set_json(keys::DOWNLOAD_QUEUE, &snapshot.queued),
            self.store
                .set_json(keys::QUEUED_DETAILS, &snapshot.queued_details),
            self.store.set_json(keys::ACTIVE_DOWNLOADS, &snapshot.active),
        ];
        for result in writes {
            if let Err(e) = result {
                warn!("Failed to persist queue mirror: {}", e);
            }
        }
    }
}

fn restore_mirror(store: &dyn KeyValueStore) -> QueueSnapshot {
    let mut snapshot = QueueSnapshot::default();
    match store.get_json::<Vec<String>>(keys::DOWNLOAD_QUEUE) {
        Ok(Some(queued)) => snapshot.queued = queued,
        Ok(None) => {}
        Err(e) => warn!("Failed to restore queue: {}", e),
    }
    match store.get_json(keys::QUEUED_DETAILS) {
        Ok(Some(details)) => snapshot.queued_details = details,
        Ok(None) => {}
        Err(e) => warn!("Failed to restore queued details: {}", e),
    }
    match store.get_json(keys::ACTIVE_DOWNLOADS) {
        Ok(Some(active)) => snapshot.active = active,
        Ok(None) => {}
        Err(e) => warn!("Failed to restore active downloads: {}", e),
    }
    snapshot
}
