//! Proxy data models

use crate::proxy::error::{ProbeError, ProbeErrorKind};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length, in characters, of an outcome's error summary
pub const MAX_ERROR_SUMMARY_CHARS: usize = 50;

/// Proxy protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Socks5,
}

impl ProxyScheme {
    /// Upper-case label used in tables and CSV exports
    pub fn label(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "HTTP",
            ProxyScheme::Socks5 => "SOCKS5",
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Http => write!(f, "http"),
            ProxyScheme::Socks5 => write!(f, "socks5"),
        }
    }
}

/// Proxy authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl ProxyCredentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

/// Structured form of one proxy entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyDescriptor {
    /// Create a descriptor without credentials
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            credentials: None,
        }
    }

    /// Attach credentials to the descriptor
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.credentials = Some(ProxyCredentials::new(username, password));
        self
    }

    /// Proxy URL without credentials
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Proxy URL carrying percent-encoded credentials in the userinfo part
    pub fn url_with_credentials(&self) -> Result<Url, ProbeError> {
        let mut url = Url::parse(&self.url())
            .map_err(|e| ProbeError::MalformedProxy(format!("invalid proxy URL: {e}")))?;
        if let Some(creds) = &self.credentials {
            // The setters encode delimiters but leave '%' alone.
            url.set_username(&creds.username.replace('%', "%25"))
                .and_then(|_| url.set_password(Some(&creds.password.replace('%', "%25"))))
                .map_err(|_| {
                    ProbeError::MalformedProxy("proxy URL cannot carry credentials".to_string())
                })?;
        }
        Ok(url)
    }

    /// `host:port`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the password.
        match &self.credentials {
            Some(creds) => write!(
                f,
                "{}://{}:***@{}:{}",
                self.scheme, creds.username, self.host, self.port
            ),
            None => write!(f, "{}", self.url()),
        }
    }
}

/// Terminal classification of one proxy after all attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub raw_proxy: String,
    pub succeeded: bool,
    pub latency_ms: Option<u64>,
    pub exit_ip: Option<String>,
    pub country: Option<String>,
    pub scheme_used: Option<ProxyScheme>,
    pub error_summary: Option<String>,
    pub error_kind: Option<ProbeErrorKind>,
    pub attempts: u32,
    pub checked_at: DateTime<Utc>,
}

impl ProbeOutcome {
    /// Successful probe through `scheme`
    pub fn working(
        raw_proxy: impl Into<String>,
        scheme: ProxyScheme,
        latency_ms: u64,
        exit_ip: String,
        country: String,
    ) -> Self {
        Self {
            raw_proxy: raw_proxy.into(),
            succeeded: true,
            latency_ms: Some(latency_ms),
            exit_ip: Some(exit_ip),
            country: Some(country),
            scheme_used: Some(scheme),
            error_summary: None,
            error_kind: None,
            attempts: 1,
            checked_at: Utc::now(),
        }
    }

    /// Failed probe; `scheme` is `None` when the raw string never resolved
    pub fn failed(raw_proxy: impl Into<String>, scheme: Option<ProxyScheme>, error: &ProbeError) -> Self {
        Self {
            raw_proxy: raw_proxy.into(),
            succeeded: false,
            latency_ms: None,
            exit_ip: None,
            country: None,
            scheme_used: scheme,
            error_summary: Some(summarize_error(error)),
            error_kind: Some(error.kind()),
            attempts: 1,
            checked_at: Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_working(&self) -> bool {
        self.succeeded
    }

    /// Whether another attempt could change this outcome
    pub fn is_retryable(&self) -> bool {
        !self.succeeded && self.error_kind.map_or(true, |kind| kind.is_retryable())
    }

    /// Presentation label for the protocol column
    pub fn type_label(&self) -> &'static str {
        self.scheme_used.map_or("Unknown", |s| s.label())
    }

    /// Presentation label for the status column
    pub fn status_label(&self) -> String {
        if self.succeeded {
            "Working".to_string()
        } else {
            format!("Failed: {}", self.error_summary.as_deref().unwrap_or("unknown error"))
        }
    }
}

/// Render an error into a non-empty summary of at most
/// [`MAX_ERROR_SUMMARY_CHARS`] characters
pub fn summarize_error(error: &ProbeError) -> String {
    let text = error.to_string();
    let text = text.trim();
    let text = if text.is_empty() { error.kind().as_str() } else { text };
    text.chars().take(MAX_ERROR_SUMMARY_CHARS).collect()
}
