//! Single-probe executor: one request through one proxy

use crate::proxy::checker::CheckerConfig;
use crate::proxy::error::ProbeError;
use crate::proxy::geo::GeoLocator;
use crate::proxy::models::{ProbeOutcome, ProxyDescriptor, ProxyScheme};
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use serde_json::Value;
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Value recorded when the endpoint does not report a field
pub const UNKNOWN: &str = "Unknown";

/// JSON keys holding the observed public IP, in lookup order
const IP_FIELDS: &[&str] = &["query", "ip", "origin"];

/// JSON keys holding the country, in lookup order
const COUNTRY_FIELDS: &[&str] = &["country", "country_name", "countryCode", "country_code"];

/// Performs exactly one probe attempt. Implementations must not retry and
/// must not panic on network errors: every failure becomes a failed outcome.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn probe(&self, descriptor: &ProxyDescriptor, raw_proxy: &str) -> ProbeOutcome;
}

/// Probes through a real proxy with `reqwest`
#[derive(Debug, Clone)]
pub struct HttpProbeExecutor {
    test_url: String,
    timeout: Duration,
    user_agent: String,
    geo_locator: Option<GeoLocator>,
}

/// What the test endpoint told us about the exit node
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExitInfo {
    ip: String,
    country: Option<String>,
}

impl HttpProbeExecutor {
    pub fn from_config(config: &CheckerConfig) -> Self {
        let geo_locator = config.mmdb_path.as_ref().and_then(|path| {
            GeoLocator::from_path(path)
                .map_err(|e| warn!("geolocation disabled, cannot open {}: {e}", path.display()))
                .ok()
        });

        Self {
            test_url: config.test_url.clone(),
            timeout: config.timeout,
            user_agent: config.user_agent.clone(),
            geo_locator,
        }
    }

    /// Fresh client routed through `descriptor`; nothing is shared between probes
    fn create_client(&self, descriptor: &ProxyDescriptor) -> Result<Client, ProbeError> {
        let proxy = match descriptor.scheme {
            ProxyScheme::Http => {
                let proxy = ReqwestProxy::all(descriptor.url())
                    .map_err(|e| ProbeError::MalformedProxy(e.to_string()))?;
                match &descriptor.credentials {
                    Some(creds) => proxy.basic_auth(&creds.username, &creds.password),
                    None => proxy,
                }
            }
            // SOCKS5 credentials travel in the URL userinfo.
            ProxyScheme::Socks5 => ReqwestProxy::all(descriptor.url_with_credentials()?)
                .map_err(|e| ProbeError::MalformedProxy(e.to_string()))?,
        };

        Client::builder()
            .proxy(proxy)
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ProbeError::Internal(format!("client build failed: {e}")))
    }

    async fn attempt(&self, descriptor: &ProxyDescriptor) -> Result<ExitInfo, ProbeError> {
        let client = self.create_client(descriptor)?;
        let scheme = descriptor.scheme;

        let request = async {
            let response = client
                .get(&self.test_url)
                .send()
                .await
                .map_err(|e| self.classify(e, scheme))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProbeError::UnexpectedStatus(status.as_u16()));
            }

            let body = response.bytes().await.map_err(|e| self.classify(e, scheme))?;
            parse_exit_info(&body)
        };

        // Hard deadline over connect, send, read and decode.
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.timeout_ms())),
        }
    }

    fn classify(&self, error: reqwest::Error, scheme: ProxyScheme) -> ProbeError {
        let message = root_cause(&error);
        if error.is_timeout() {
            return ProbeError::Timeout(self.timeout_ms());
        }
        if error.is_decode() {
            return ProbeError::ResponseDecode(message);
        }

        let chain = error_chain(&error).to_ascii_lowercase();
        let handshake = chain.contains("tunnel")
            || (scheme == ProxyScheme::Socks5 && chain.contains("socks"));
        if handshake {
            ProbeError::Handshake(message)
        } else {
            ProbeError::Connect(message)
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn resolve_country(&self, info: &ExitInfo) -> String {
        if let Some(country) = &info.country {
            return country.clone();
        }
        self.geo_locator
            .as_ref()
            .and_then(|geo| geo.country(&info.ip).ok())
            .and_then(|country| country.display())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[async_trait]
impl ProbeExecutor for HttpProbeExecutor {
    async fn probe(&self, descriptor: &ProxyDescriptor, raw_proxy: &str) -> ProbeOutcome {
        let start = Instant::now();

        match self.attempt(descriptor).await {
            Ok(info) => {
                let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let country = self.resolve_country(&info);
                debug!(proxy = %descriptor, latency_ms = elapsed, exit_ip = %info.ip, "probe succeeded");
                ProbeOutcome::working(raw_proxy, descriptor.scheme, elapsed, info.ip, country)
            }
            Err(error) => {
                debug!(proxy = %descriptor, %error, "probe failed");
                ProbeOutcome::failed(raw_proxy, Some(descriptor.scheme), &error)
            }
        }
    }
}

/// Extract the exit IP and country from the endpoint's JSON body.
///
/// Missing fields are not an error; a body that is not JSON is.
fn parse_exit_info(body: &[u8]) -> Result<ExitInfo, ProbeError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ProbeError::ResponseDecode(e.to_string()))?;

    let ip = first_string(&value, IP_FIELDS).unwrap_or_else(|| UNKNOWN.to_string());
    let country = first_string(&value, COUNTRY_FIELDS);
    Ok(ExitInfo { ip, country })
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// Innermost error message; reqwest's top level repeats the request URL
fn root_cause(error: &(dyn StdError + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut current = error.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
