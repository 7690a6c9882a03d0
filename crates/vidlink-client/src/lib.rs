//! Backend client: health probing, status snapshots, submissions and queue mutations.
//!
//! The backend is a local HTTP service on a port that has to be discovered.
//! Everything here takes the port per call; finding it is the discovery
//! crate's job.

pub mod api;
pub mod http;
pub mod types;

pub use api::{BackendApi, HealthProbe};
pub use http::HttpBackend;
pub use types::*;
