//! Seams between the bridge components and the backend transport.
//!
//! `HealthProbe` is the only thing the port scanner and the connection
//! monitor need. `BackendApi` covers everything else the bridge asks of a
//! known-good port. [`crate::HttpBackend`] implements both.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{DownloadAction, DownloadRequest, StatusEntry, SubmitResponse};
use vidlink_core::{HealthCheckResult, Result};

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe one port. Never fails: timeouts and transport errors read as unreachable.
    async fn check(&self, port: u16, timeout: Duration) -> HealthCheckResult;

    /// Whether the transport is usable at all.
    fn network_available(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_config(&self, port: u16) -> Result<Value>;

    async fn update_config(&self, port: u16, config: &Value) -> Result<Value>;

    /// Authoritative snapshot of every known download.
    async fn fetch_status(&self, port: u16) -> Result<Vec<StatusEntry>>;

    async fn submit_download(&self, port: u16, request: &DownloadRequest)
        -> Result<SubmitResponse>;

    async fn reorder_queue(&self, port: u16, order: &[String]) -> Result<()>;

    async fn remove_from_queue(&self, port: u16, id: &str) -> Result<()>;

    async fn control(&self, port: u16, id: &str, action: DownloadAction) -> Result<()>;
}
