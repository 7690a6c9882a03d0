//! Duplicate-submission guard for the download entry point.
//!
//! A canonical URL may have at most one submission outstanding, and none
//! within the cooldown window after the previous one settled. Bookkeeping
//! is released by a drop guard, so an error or a cancelled caller never
//! leaves a key stuck in flight.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use vidlink_client::SubmitResponse;
use vidlink_core::{BridgeConfig, Error, Result};

const DUPLICATE_MESSAGE: &str = "duplicate";

/// Canonical dedup key for a download target.
///
/// Parsed URLs are normalized (scheme and host case, default port) and lose
/// their fragment. Anything unparsable is keyed on its trimmed text.
pub fn canonical_key(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// Result of one submission attempt.
#[derive(Debug)]
pub enum SubmitOutcome {
    Accepted(SubmitResponse),
    /// Rejected locally; nothing was sent.
    Duplicate,
    Failed(Error),
}

/// Wire-shaped reply for presentation surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitReply {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubmitOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn to_reply(&self) -> SubmitReply {
        match self {
            Self::Accepted(response) => SubmitReply {
                status: response.status.clone(),
                id: response.id.clone(),
                message: response.message.clone(),
            },
            Self::Duplicate => SubmitReply {
                status: "error".into(),
                id: None,
                message: Some(DUPLICATE_MESSAGE.into()),
            },
            Self::Failed(e) => SubmitReply {
                status: "error".into(),
                id: None,
                message: Some(e.to_string()),
            },
        }
    }

    /// Collapse into a `Result`, with a duplicate as [`Error::DuplicateRequest`].
    pub fn into_result(self, url: &str) -> Result<SubmitResponse> {
        match self {
            Self::Accepted(response) => Ok(response),
            Self::Duplicate => Err(Error::DuplicateRequest(url.to_string())),
            Self::Failed(e) => Err(e),
        }
    }
}

pub struct RequestDeduplicator {
    in_flight: Mutex<HashSet<String>>,
    recent: Mutex<HashMap<String, Instant>>,
    cooldown: Duration,
}

impl RequestDeduplicator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            recent: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.dedup_cooldown())
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Whether `url` would be rejected right now.
    pub fn is_blocked(&self, url: &str) -> bool {
        let key = canonical_key(url);
        self.in_flight.lock().contains(&key) || self.cooling_down(&key)
    }

    fn cooling_down(&self, key: &str) -> bool {
        let mut recent = self.recent.lock();
        let cooldown = self.cooldown;
        recent.retain(|_, settled| settled.elapsed() < cooldown);
        recent.contains_key(key)
    }

    /// Claim `key` unless it is in flight or cooling down.
    fn claim(&self, key: &str) -> Option<InFlightGuard<'_>> {
        if self.cooling_down(key) {
            return None;
        }
        if !self.in_flight.lock().insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            owner: self,
            key: key.to_string(),
        })
    }

    /// Run `send` for `url` unless an equivalent request is outstanding or
    /// settled within the cooldown.
    pub async fn submit<F, Fut>(&self, url: &str, send: F) -> SubmitOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SubmitResponse>>,
    {
        let key = canonical_key(url);
        let Some(_guard) = self.claim(&key) else {
            debug!("Ignoring duplicate submission for {}", key);
            return SubmitOutcome::Duplicate;
        };

        match send().await {
            Ok(response) => SubmitOutcome::Accepted(response),
            Err(e) => {
                warn!("Download submission for {} failed: {}", key, e);
                SubmitOutcome::Failed(e)
            }
        }
    }
}

/// Moves a key from in-flight into the cooldown map when dropped.
struct InFlightGuard<'a> {
    owner: &'a RequestDeduplicator,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner.in_flight.lock().remove(&self.key);
        self.owner
            .recent
            .lock()
            .insert(std::mem::take(&mut self.key), Instant::now());
    }
}
