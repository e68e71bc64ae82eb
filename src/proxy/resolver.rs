//! Resolves raw proxy strings into [`ProxyDescriptor`]s
//!
//! Supported inputs:
//! - `HOST:PORT`
//! - `USER:PASS@HOST:PORT` (a bare `USER@` is accepted and ignored)
//! - `http://[USER:PASS@]HOST:PORT`
//! - `socks5://[USER:PASS@]HOST:PORT`
//!
//! When no scheme is given it is inferred by a [`SchemeInference`] strategy,
//! by default [`PortHeuristic`].

use crate::proxy::error::ProbeError;
use crate::proxy::models::{ProxyDescriptor, ProxyScheme};
use once_cell::sync::Lazy;
use regex::Regex;

/// `scheme://rest`, any scheme
static SCHEME_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*)://(.*)$").expect("Invalid scheme regex")
});

/// `[user[:pass]@]host:port[/]`, host may be a bracketed IPv6 literal
static AUTHORITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([^:@/\s]+)(?::([^@/\s]*))?@)?(\[[0-9A-Fa-f:.]+\]|[^:@/\[\]\s]+):(\d{1,5})/?$")
        .expect("Invalid authority regex")
});

/// Decides the scheme of a proxy string that does not carry one
pub trait SchemeInference {
    fn infer(&self, raw: &str) -> ProxyScheme;
}

/// Ports 1080 and 1081 mean SOCKS5, anything else HTTP.
///
/// Only looks at the text after the last colon; the port is never contacted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortHeuristic;

impl SchemeInference for PortHeuristic {
    fn infer(&self, raw: &str) -> ProxyScheme {
        match raw.rsplit_once(':') {
            Some((_, "1080")) | Some((_, "1081")) => ProxyScheme::Socks5,
            _ => ProxyScheme::Http,
        }
    }
}

/// Proxy string resolver
#[derive(Debug, Clone, Default)]
pub struct ProxyResolver<I = PortHeuristic> {
    inference: I,
}

impl ProxyResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I: SchemeInference> ProxyResolver<I> {
    /// Use a custom scheme inference strategy
    pub fn with_inference(inference: I) -> Self {
        Self { inference }
    }

    /// Resolve a raw proxy string.
    ///
    /// Explicit `http://` and `socks5://` prefixes win over inference. Any
    /// other explicit scheme, or a string that cannot be split into host and
    /// port, is a [`ProbeError::MalformedProxy`].
    pub fn resolve(&self, raw: &str) -> Result<ProxyDescriptor, ProbeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ProbeError::MalformedProxy("empty proxy string".to_string()));
        }

        let (scheme, rest) = match SCHEME_PREFIX_REGEX.captures(raw) {
            Some(caps) => {
                let scheme = match caps[1].to_ascii_lowercase().as_str() {
                    "http" => ProxyScheme::Http,
                    "socks5" => ProxyScheme::Socks5,
                    other => {
                        return Err(ProbeError::MalformedProxy(format!(
                            "unsupported scheme '{other}'"
                        )))
                    }
                };
                (scheme, caps.get(2).map_or("", |m| m.as_str()))
            }
            None => (self.inference.infer(raw), raw),
        };

        parse_authority(scheme, rest)
    }
}

/// Resolve with the default port heuristic
pub fn resolve(raw: &str) -> Result<ProxyDescriptor, ProbeError> {
    ProxyResolver::new().resolve(raw)
}

fn parse_authority(scheme: ProxyScheme, rest: &str) -> Result<ProxyDescriptor, ProbeError> {
    let caps = AUTHORITY_REGEX
        .captures(rest)
        .ok_or_else(|| ProbeError::MalformedProxy("expected host:port".to_string()))?;

    let host = &caps[3];
    let port = caps[4]
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| ProbeError::MalformedProxy(format!("invalid port '{}'", &caps[4])))?;

    // Userinfo missing either half is dropped, not rejected.
    let descriptor = ProxyDescriptor::new(scheme, host, port);
    match (caps.get(1), caps.get(2)) {
        (Some(user), Some(pass)) if !pass.as_str().is_empty() => Ok(descriptor
            .with_credentials(user.as_str().to_string(), pass.as_str().to_string())),
        _ => Ok(descriptor),
    }
}
