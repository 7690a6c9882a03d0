//! Scripted backend for reconciliation tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use vidlink_client::{BackendApi, DownloadAction, DownloadRequest, StatusEntry, SubmitResponse};
use vidlink_core::{DownloadState, DownloadStatus, Error, Result};

pub fn entry(id: &str, state: DownloadState) -> StatusEntry {
    StatusEntry {
        id: id.to_string(),
        status: DownloadStatus {
            status: state,
            progress: if state == DownloadState::Success { 100.0 } else { 0.0 },
            filename: Some(format!("{}.mp4", id)),
            url: Some(format!("https://x/{}", id)),
            title: Some(format!("Video {}", id)),
        },
    }
}

pub struct ScriptedBackend {
    snapshot: Mutex<Vec<StatusEntry>>,
    next_error: Mutex<Option<Error>>,
    fail_mutations: AtomicBool,
    reorders: Mutex<Vec<Vec<String>>>,
    removals: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn with_snapshot(entries: Vec<StatusEntry>) -> Self {
        Self {
            snapshot: Mutex::new(entries),
            next_error: Mutex::new(None),
            fail_mutations: AtomicBool::new(false),
            reorders: Mutex::new(Vec::new()),
            removals: Mutex::new(Vec::new()),
        }
    }

    pub fn set_snapshot(&self, entries: Vec<StatusEntry>) {
        *self.snapshot.lock() = entries;
    }

    /// Fail the next status fetch only.
    pub fn fail_next(&self, error: Error) {
        *self.next_error.lock() = Some(error);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn reorders(&self) -> Vec<Vec<String>> {
        self.reorders.lock().clone()
    }

    pub fn removals(&self) -> Vec<String> {
        self.removals.lock().clone()
    }

    fn mutation_result(&self) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(Error::Backend {
                status: 503,
                message: "queue locked".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BackendApi for ScriptedBackend {
    async fn fetch_config(&self, _port: u16) -> Result<Value> {
        Ok(json!({}))
    }

    async fn update_config(&self, _port: u16, config: &Value) -> Result<Value> {
        Ok(config.clone())
    }

    async fn fetch_status(&self, _port: u16) -> Result<Vec<StatusEntry>> {
        if let Some(e) = self.next_error.lock().take() {
            return Err(e);
        }
        Ok(self.snapshot.lock().clone())
    }

    async fn submit_download(
        &self,
        _port: u16,
        _request: &DownloadRequest,
    ) -> Result<SubmitResponse> {
        Err(Error::NotConnected)
    }

    async fn reorder_queue(&self, _port: u16, order: &[String]) -> Result<()> {
        self.reorders.lock().push(order.to_vec());
        self.mutation_result()
    }

    async fn remove_from_queue(&self, _port: u16, id: &str) -> Result<()> {
        self.removals.lock().push(id.to_string());
        self.mutation_result()
    }

    async fn control(&self, _port: u16, _id: &str, _action: DownloadAction) -> Result<()> {
        self.mutation_result()
    }
}
