//! Proxy probing engine
//!
//! This module provides functionality for:
//! - Resolving raw proxy strings into descriptors, inferring the scheme when missing
//! - Probing a proxy once against a JSON IP-echo endpoint
//! - Retrying failed probes with a fixed delay
//! - Checking whole lists under a global concurrency cap
//! - Aggregating outcomes into working/failed views

pub mod aggregator;
pub mod checker;
pub mod error;
pub mod executor;
pub mod geo;
pub mod models;
pub mod resolver;
pub mod retry;

pub use aggregator::{CheckSession, ResultAggregator};
pub use checker::{CheckerConfig, ProgressUpdate, ProxyChecker};
pub use error::{ProbeError, ProbeErrorKind};
pub use executor::{HttpProbeExecutor, ProbeExecutor};
pub use models::{ProbeOutcome, ProxyCredentials, ProxyDescriptor, ProxyScheme};
pub use resolver::{resolve, PortHeuristic, ProxyResolver, SchemeInference};
pub use retry::{probe_with_retry, RetryPolicy};
