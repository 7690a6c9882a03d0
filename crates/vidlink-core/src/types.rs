//! Domain types shared between the bridge components.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Belief about whether the download backend is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Checking,
    Connected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Checking => write!(f, "checking"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Outcome of one health probe against one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub reachable: bool,
    #[serde(rename = "identityMatches")]
    pub identity_matches: bool,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            reachable: true,
            identity_matches: true,
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Something answered, but it is not our backend.
    pub fn foreign() -> Self {
        Self {
            reachable: true,
            identity_matches: false,
        }
    }

    /// Only a reachable server with the expected identity counts.
    pub fn is_ours(&self) -> bool {
        self.reachable && self.identity_matches
    }
}

/// Lifecycle state of a single download on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Queued,
    Downloading,
    Paused,
    #[serde(alias = "completed", alias = "finished", alias = "done")]
    Success,
    #[serde(alias = "failed")]
    Error,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl DownloadState {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "queued" | "pending" => Some(Self::Queued),
            "downloading" | "processing" | "started" => Some(Self::Downloading),
            "paused" => Some(Self::Paused),
            "success" | "completed" | "finished" | "done" => Some(Self::Success),
            "error" | "failed" => Some(Self::Error),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Canceled)
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Success => "success",
            Self::Error => "error",
            Self::Canceled => "canceled",
        };
        write!(f, "{}", name)
    }
}

/// Per-download status as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub status: DownloadState,
    /// Percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Metadata kept for an id while it waits in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueuedDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Local mirror of the backend's queue and active downloads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub active: BTreeMap<String, DownloadStatus>,
    pub queued: Vec<String>,
    #[serde(rename = "queuedDetails")]
    pub queued_details: BTreeMap<String, QueuedDetail>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.queued.is_empty()
    }

    /// Position of an id in the queue, if it is queued.
    pub fn queue_position(&self, id: &str) -> Option<usize> {
        self.queued.iter().position(|q| q == id)
    }
}

/// Kind of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Connected,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_result_requires_identity() {
        assert!(HealthCheckResult::healthy().is_ours());
        assert!(!HealthCheckResult::foreign().is_ours());
        assert!(!HealthCheckResult::unreachable().is_ours());
    }

    #[test]
    fn test_download_state_aliases() {
        assert_eq!(
            DownloadState::from_name("Cancelled"),
            Some(DownloadState::Canceled)
        );
        assert_eq!(
            DownloadState::from_name("completed"),
            Some(DownloadState::Success)
        );
        assert_eq!(DownloadState::from_name("exploded"), None);

        let parsed: DownloadState = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, DownloadState::Canceled);
        assert_eq!(
            serde_json::to_string(&DownloadState::Canceled).unwrap(),
            "\"canceled\""
        );
    }

    #[test]
    fn test_connection_status_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Checking).unwrap();
        assert_eq!(json, "\"checking\"");
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_queue_snapshot_shape() {
        let mut snapshot = QueueSnapshot::default();
        snapshot.queued.push("b".into());
        snapshot
            .queued_details
            .insert("b".into(), QueuedDetail::default());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["active"].is_object());
        assert!(json["queued"].is_array());
        assert!(json["queuedDetails"].is_object());
        assert_eq!(snapshot.queue_position("b"), Some(0));
        assert_eq!(snapshot.queue_position("z"), None);
    }
}
