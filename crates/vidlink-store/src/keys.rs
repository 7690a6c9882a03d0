//! Well-known storage keys.
//!
//! Each key has exactly one writer; everything else only reads it.

/// Last port that passed a health check. Written by the port scanner.
pub const SERVER_PORT: &str = "serverPort";
/// Mirror of the connected flag. Written by the connection monitor.
pub const SERVER_AVAILABLE: &str = "serverAvailable";
/// Backend configuration fetched on reconnect. Written by the connection monitor.
pub const SERVER_CONFIG: &str = "serverConfig";
/// Ordered queued ids. Written by the queue reconciler.
pub const DOWNLOAD_QUEUE: &str = "downloadQueue";
/// Per-id metadata for queued downloads. Written by the queue reconciler.
pub const QUEUED_DETAILS: &str = "queuedDetails";
/// Active download map. Written by the queue reconciler.
pub const ACTIVE_DOWNLOADS: &str = "activeDownloads";
