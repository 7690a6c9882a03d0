//! Backend discovery: retry backoff, port scanning and the connection monitor.
//!
//! The scanner answers "where is the backend?", the monitor answers "are we
//! connected?". Neither loops on its own; the runtime drives both.

pub mod backoff;
pub mod monitor;
pub mod scanner;

#[cfg(test)]
mod fakes;

pub use backoff::Backoff;
pub use monitor::ConnectionMonitor;
pub use scanner::PortScanner;
