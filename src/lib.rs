//! Proxy Probe - concurrent proxy health checker
//!
//! Routes a probe request through each candidate HTTP or SOCKS5 proxy and
//! classifies it as working or failed, recording latency, exit IP and country.
//! Checks run concurrently under a global cap with per-proxy retries.

pub mod input;
pub mod logging;
pub mod proxy;
pub mod report;
pub mod tui;

pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
