//! `reqwest` implementation of the backend seams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::api::{BackendApi, HealthProbe};
use crate::types::{parse_status_snapshot, DownloadAction, DownloadRequest, StatusEntry, SubmitResponse};
use vidlink_core::{BridgeConfig, Error, HealthCheckResult, Result};

/// Health endpoints, newest first.
const HEALTH_PATHS: &[&[&str]] = &[&["api", "health"], &["health"]];
/// Body fields that may carry the backend's identity.
const IDENTITY_FIELDS: &[&str] = &["app", "name", "service"];

/// HTTP client for the local download backend.
pub struct HttpBackend {
    client: Client,
    host: String,
    app_identity: String,
    online: Arc<AtomicBool>,
}

impl HttpBackend {
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            host: config.host.clone(),
            app_identity: config.app_identity.clone(),
            online: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Shared online flag; clearing it makes every call fail fast.
    pub fn online_flag(&self) -> Arc<AtomicBool> {
        self.online.clone()
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn endpoint(&self, port: u16, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&format!("http://{}:{}/", self.host, port))
            .map_err(|e| Error::Config(format!("invalid backend host {}: {}", self.host, e)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::Config(format!("backend host {} cannot carry a path", self.host)))?;
            path.clear().extend(segments);
        }
        Ok(url)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.network_available() {
            Ok(())
        } else {
            Err(Error::NetworkUnavailable)
        }
    }

    fn identity_matches(&self, body: &Value) -> (bool, Option<String>) {
        let found = IDENTITY_FIELDS
            .iter()
            .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
            .map(|s| s.to_string());
        let matches = found
            .as_deref()
            .map(|f| f.eq_ignore_ascii_case(&self.app_identity))
            .unwrap_or(false);
        (matches, found)
    }

    async fn probe_once(&self, port: u16, timeout: Duration) -> HealthCheckResult {
        let mut reachable = false;

        for segments in HEALTH_PATHS {
            let url = match self.endpoint(port, segments) {
                Ok(url) => url,
                Err(e) => {
                    debug!("Health probe on port {} skipped: {}", port, e);
                    return HealthCheckResult::unreachable();
                }
            };

            let resp = match self.client.get(url).timeout(timeout).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    debug!("Health probe on port {} failed: {}", port, e);
                    if e.is_connect() || e.is_timeout() {
                        break;
                    }
                    continue;
                }
            };

            reachable = true;
            if !resp.status().is_success() {
                continue;
            }
            let body: Value = match resp.json().await {
                Ok(body) => body,
                Err(_) => continue,
            };
            let (matches, found) = self.identity_matches(&body);
            if matches {
                return HealthCheckResult::healthy();
            }
            debug!("Port {} identifies as {:?}", port, found);
        }

        if reachable {
            HealthCheckResult::foreign()
        } else {
            HealthCheckResult::unreachable()
        }
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<Response> {
        self.ensure_online()?;
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        expect_success(resp).await
    }

    async fn get(&self, url: Url) -> Result<Response> {
        self.ensure_online()?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        expect_success(resp).await
    }
}

#[async_trait]
impl HealthProbe for HttpBackend {
    async fn check(&self, port: u16, timeout: Duration) -> HealthCheckResult {
        if !self.network_available() {
            return HealthCheckResult::unreachable();
        }
        match tokio::time::timeout(timeout, self.probe_once(port, timeout)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Health probe on port {} timed out", port);
                HealthCheckResult::unreachable()
            }
        }
    }

    fn network_available(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_config(&self, port: u16) -> Result<Value> {
        let resp = self.get(self.endpoint(port, &["api", "config"])?).await?;
        read_json(resp).await
    }

    async fn update_config(&self, port: u16, config: &Value) -> Result<Value> {
        let resp = self
            .post_json(self.endpoint(port, &["api", "config"])?, config)
            .await?;
        let reply = read_json(resp).await?;
        // Some backends echo the stored config, others only acknowledge.
        match reply.get("config") {
            Some(stored) if stored.is_object() => Ok(stored.clone()),
            _ => Ok(config.clone()),
        }
    }

    async fn fetch_status(&self, port: u16) -> Result<Vec<StatusEntry>> {
        let mut url = self.endpoint(port, &["api", "status"])?;
        url.query_pairs_mut().append_pair("include_queue", "1");
        let resp = self.get(url).await?;
        let body = read_json(resp).await?;
        parse_status_snapshot(&body)
    }

    async fn submit_download(
        &self,
        port: u16,
        request: &DownloadRequest,
    ) -> Result<SubmitResponse> {
        let body = serde_json::to_value(request)?;
        let resp = self
            .post_json(self.endpoint(port, &["api", "download"])?, &body)
            .await?;
        let http_status = resp.status().as_u16();
        let reply: SubmitResponse = serde_json::from_value(read_json(resp).await?)
            .map_err(|e| Error::Malformed(format!("download reply: {}", e)))?;

        if reply.status.eq_ignore_ascii_case("error") {
            return Err(Error::Backend {
                status: http_status,
                message: reply.message.unwrap_or_else(|| "download rejected".into()),
            });
        }
        info!("Backend accepted {} ({})", request.url, reply.status);
        Ok(reply)
    }

    async fn reorder_queue(&self, port: u16, order: &[String]) -> Result<()> {
        self.post_json(
            self.endpoint(port, &["api", "queue", "reorder"])?,
            &json!({ "order": order }),
        )
        .await?;
        Ok(())
    }

    async fn remove_from_queue(&self, port: u16, id: &str) -> Result<()> {
        self.post_json(
            self.endpoint(port, &["api", "queue", id, "remove"])?,
            &json!({}),
        )
        .await?;
        Ok(())
    }

    async fn control(&self, port: u16, id: &str, action: DownloadAction) -> Result<()> {
        self.post_json(
            self.endpoint(port, &["api", "download", id, action.path_segment()])?,
            &json!({}),
        )
        .await?;
        Ok(())
    }
}

async fn expect_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or(text);
    Err(Error::Backend {
        status: status.as_u16(),
        message,
    })
}

async fn read_json(resp: Response) -> Result<Value> {
    resp.json::<Value>()
        .await
        .map_err(|e| Error::Malformed(e.to_string()))
}
