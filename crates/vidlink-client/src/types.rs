//! Wire types for the backend's HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use vidlink_core::{DownloadState, DownloadStatus, Error, Result};

/// Body of `POST /api/download`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub quality: String,
    pub format: String,
    pub download_playlist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            quality: "best".into(),
            format: "mp4".into(),
            download_playlist: false,
            page_title: None,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_playlist(mut self, download_playlist: bool) -> Self {
        self.download_playlist = download_playlist;
        self
    }

    pub fn with_page_title(mut self, title: impl Into<String>) -> Self {
        self.page_title = Some(title.into());
        self
    }
}

/// Reply to a download submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-item control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadAction {
    Cancel,
    Pause,
    Resume,
}

impl DownloadAction {
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }
}

impl std::fmt::Display for DownloadAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

/// One entry of a status snapshot, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub id: String,
    pub status: DownloadStatus,
}

/// Parse `GET /api/status` into entries, preserving the server's key order.
///
/// A body that is not a JSON object is malformed. Individual entries
/// without a recognizable status are skipped.
pub fn parse_status_snapshot(body: &Value) -> Result<Vec<StatusEntry>> {
    let map = body
        .as_object()
        .ok_or_else(|| Error::Malformed("status snapshot is not an object".into()))?;

    let mut entries = Vec::with_capacity(map.len());
    for (id, raw) in map {
        match parse_status_entry(raw) {
            Some(status) => entries.push(StatusEntry {
                id: id.clone(),
                status,
            }),
            None => debug!("Skipping unrecognized status entry {}", id),
        }
    }
    Ok(entries)
}

fn parse_status_entry(raw: &Value) -> Option<DownloadStatus> {
    let obj = raw.as_object()?;
    let state = DownloadState::from_name(obj.get("status")?.as_str()?)?;

    let progress = obj
        .get("progress")
        .and_then(parse_percent)
        .or_else(|| obj.get("percent").and_then(parse_percent))
        .unwrap_or(if state == DownloadState::Success { 100.0 } else { 0.0 });

    let text = |key: &str| {
        obj.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };

    Some(DownloadStatus {
        status: state,
        progress: progress.clamp(0.0, 100.0),
        filename: text("filename"),
        url: text("url"),
        title: text("title"),
    })
}

/// Accepts `42.5`, `"42.5"` and `"42.5%"`.
fn parse_percent(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|p| p.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_keeps_server_order() {
        let body = json!({
            "zeta": {"status": "queued", "url": "https://x/1"},
            "alpha": {"status": "downloading", "progress": 12.5},
            "mid": {"status": "queued"},
        });
        let entries = parse_status_snapshot(&body).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        assert_eq!(entries[1].status.progress, 12.5);
    }

    #[test]
    fn test_percent_strings_and_clamping() {
        let body = json!({
            "a": {"status": "downloading", "percent": "45.3%"},
            "b": {"status": "downloading", "progress": 140},
            "c": {"status": "success"},
        });
        let entries = parse_status_snapshot(&body).unwrap();
        assert_eq!(entries[0].status.progress, 45.3);
        assert_eq!(entries[1].status.progress, 100.0);
        assert_eq!(entries[2].status.progress, 100.0);
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let body = json!({
            "ok": {"status": "paused", "title": "Clip", "filename": ""},
            "no-status": {"progress": 3},
            "weird": {"status": "exploded"},
            "scalar": 7,
        });
        let entries = parse_status_snapshot(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status.title.as_deref(), Some("Clip"));
        assert_eq!(entries[0].status.filename, None);
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(
            parse_status_snapshot(&json!([1, 2, 3])),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_download_request_body() {
        let req = DownloadRequest::new("https://x/video")
            .with_quality("720p")
            .with_page_title("A video");
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["url"], "https://x/video");
        assert_eq!(body["quality"], "720p");
        assert_eq!(body["format"], "mp4");
        assert_eq!(body["download_playlist"], false);
        assert_eq!(body["page_title"], "A video");
    }
}
