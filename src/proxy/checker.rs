//! Proxy checker: runs retry-wrapped probes over a whole list under a
//! concurrency cap

use crate::proxy::aggregator::{CheckSession, ResultAggregator};
use crate::proxy::error::ProbeError;
use crate::proxy::executor::{HttpProbeExecutor, ProbeExecutor};
use crate::proxy::models::ProbeOutcome;
use crate::proxy::resolver::ProxyResolver;
use crate::proxy::retry::{probe_with_retry, RetryPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
use crate::Result;
use anyhow::{bail, ensure};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of probes in flight at once
const DEFAULT_MAX_CONCURRENT: usize = 50;

/// Default URL to test proxies against
const DEFAULT_TEST_URL: &str = "http://ip-api.com/json";

/// Desktop browser user agent, avoids trivial bot blocking
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Deadline for one attempt, covering connect and read
    pub timeout: Duration,
    /// Maximum retry-wrapped probes holding a slot at once
    pub max_concurrent: usize,
    /// Attempts after the first one
    pub retries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// URL to test proxies against; must answer with JSON
    pub test_url: String,
    pub user_agent: String,
    /// MMDB database used when the endpoint reports no country
    pub mmdb_path: Option<PathBuf>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            test_url: DEFAULT_TEST_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            mmdb_path: None,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_mmdb_path(mut self, path: PathBuf) -> Self {
        self.mmdb_path = Some(path);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.retry_delay)
    }

    /// Reject settings that would make the whole run meaningless
    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_concurrent > 0, "max_concurrent must be at least 1");
        ensure!(!self.timeout.is_zero(), "timeout must be greater than zero");
        ensure!(
            reqwest::header::HeaderValue::from_str(&self.user_agent).is_ok(),
            "user agent is not a valid header value"
        );
        let url = reqwest::Url::parse(&self.test_url)
            .map_err(|e| anyhow::anyhow!("invalid test URL '{}': {e}", self.test_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("test URL must be http or https, got '{}'", url.scheme());
        }
        Ok(())
    }
}

/// Progress event emitted after each recorded outcome
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate<'a> {
    /// Outcomes recorded so far, including this one
    pub completed: usize,
    /// Number of proxies in the run
    pub total: usize,
    pub outcome: &'a ProbeOutcome,
}

/// Proxy checker for validating proxies
pub struct ProxyChecker<E = HttpProbeExecutor> {
    config: CheckerConfig,
    executor: Arc<E>,
    resolver: Arc<ProxyResolver>,
}

impl ProxyChecker {
    /// Create a new proxy checker with default configuration
    pub fn new() -> Self {
        Self::with_config(CheckerConfig::default())
    }

    /// Create a new proxy checker probing through real proxies
    pub fn with_config(config: CheckerConfig) -> Self {
        let executor = HttpProbeExecutor::from_config(&config);
        Self::with_executor(config, executor)
    }
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ProbeExecutor + 'static> ProxyChecker<E> {
    /// Create a checker around a custom executor
    pub fn with_executor(config: CheckerConfig, executor: E) -> Self {
        Self {
            config,
            executor: Arc::new(executor),
            resolver: Arc::new(ProxyResolver::new()),
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check every proxy and record exactly one outcome per input into
    /// `aggregator`, in completion order.
    ///
    /// `on_progress` runs after each outcome is recorded. Dropping the
    /// returned future aborts in-flight probes; whatever was recorded until
    /// then stays consistent.
    pub async fn run_all<F>(
        &self,
        raw_proxies: Vec<String>,
        aggregator: &ResultAggregator,
        mut on_progress: F,
    ) where
        F: FnMut(ProgressUpdate<'_>),
    {
        let total = raw_proxies.len();
        let policy = self.config.retry_policy();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        info!(total, max_concurrent = self.config.max_concurrent, "starting proxy check");

        let mut tasks = JoinSet::new();
        for (index, raw) in raw_proxies.iter().enumerate() {
            let raw = raw.clone();
            let semaphore = Arc::clone(&semaphore);
            let executor = Arc::clone(&self.executor);
            let resolver = Arc::clone(&self.resolver);
            tasks.spawn(async move {
                let outcome = check_one(executor.as_ref(), &resolver, &semaphore, &raw, policy).await;
                (index, outcome)
            });
        }

        let mut recorded = vec![false; total];
        let mut completed = 0;
        let mut report = |outcome: ProbeOutcome, completed: usize| {
            aggregator.record(outcome.clone());
            on_progress(ProgressUpdate {
                completed,
                total,
                outcome: &outcome,
            });
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    recorded[index] = true;
                    completed += 1;
                    report(outcome, completed);
                }
                Err(join_error) => error!("probe task failed: {join_error}"),
            }
        }

        // A panicking task never reports back; it still owes an outcome.
        for (index, raw) in raw_proxies.iter().enumerate() {
            if !recorded[index] {
                let error = ProbeError::Internal("probe task panicked".to_string());
                completed += 1;
                report(ProbeOutcome::failed(raw.as_str(), None, &error), completed);
            }
        }

        let session = aggregator.snapshot();
        info!(
            total,
            working = session.working.len(),
            failed = session.failed.len(),
            "proxy check finished"
        );
    }

    /// Check every proxy into a fresh session
    pub async fn check_all(&self, raw_proxies: Vec<String>) -> CheckSession {
        let aggregator = ResultAggregator::new();
        self.run_all(raw_proxies, &aggregator, |_| {}).await;
        aggregator.take()
    }
}

/// Resolve, take a slot, then probe with retries. Malformed strings fail
/// without ever taking a slot.
async fn check_one<E>(
    executor: &E,
    resolver: &ProxyResolver,
    semaphore: &Arc<Semaphore>,
    raw: &str,
    policy: RetryPolicy,
) -> ProbeOutcome
where
    E: ProbeExecutor + ?Sized,
{
    let descriptor = match resolver.resolve(raw) {
        Ok(descriptor) => descriptor,
        Err(error) => {
            debug!(proxy = raw, %error, "rejecting proxy");
            return ProbeOutcome::failed(raw, None, &error);
        }
    };

    // The permit is held across retries and their delays.
    let _permit = match Arc::clone(semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            let error = ProbeError::Internal("concurrency gate closed".to_string());
            return ProbeOutcome::failed(raw, Some(descriptor.scheme), &error);
        }
    };

    probe_with_retry(executor, &descriptor, raw, policy).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::error::ProbeErrorKind;
    use crate::proxy::models::{ProxyDescriptor, ProxyScheme};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Succeeds for every proxy in `working`, fails the rest
    struct StubExecutor {
        working: HashSet<String>,
    }

    #[async_trait]
    impl ProbeExecutor for StubExecutor {
        async fn probe(&self, descriptor: &ProxyDescriptor, raw_proxy: &str) -> ProbeOutcome {
            if self.working.contains(raw_proxy) {
                ProbeOutcome::working(
                    raw_proxy,
                    descriptor.scheme,
                    42,
                    "8.8.8.8".to_string(),
                    "US".to_string(),
                )
            } else {
                ProbeOutcome::failed(
                    raw_proxy,
                    Some(descriptor.scheme),
                    &ProbeError::Connect("connection refused".to_string()),
                )
            }
        }
    }

    /// Tracks how many probes run at the same time
    #[derive(Default)]
    struct GaugeExecutor {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProbeExecutor for GaugeExecutor {
        async fn probe(&self, descriptor: &ProxyDescriptor, raw_proxy: &str) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ProbeOutcome::working(
                raw_proxy,
                descriptor.scheme,
                5,
                "1.1.1.1".to_string(),
                "US".to_string(),
            )
        }
    }

    #[derive(Debug, Clone)]
    struct Call {
        raw: String,
        scheme: ProxyScheme,
        started: Instant,
        finished: Instant,
    }

    /// Logs every call with its timing; proxies starting with "down" fail
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingExecutor {
        /// Calls ordered by start time
        fn calls(&self) -> Vec<Call> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort_by_key(|call| call.started);
            calls
        }
    }

    #[async_trait]
    impl ProbeExecutor for RecordingExecutor {
        async fn probe(&self, descriptor: &ProxyDescriptor, raw_proxy: &str) -> ProbeOutcome {
            let started = Instant::now();
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.calls.lock().unwrap().push(Call {
                raw: raw_proxy.to_string(),
                scheme: descriptor.scheme,
                started,
                finished: Instant::now(),
            });

            if raw_proxy.starts_with("down") {
                ProbeOutcome::failed(
                    raw_proxy,
                    Some(descriptor.scheme),
                    &ProbeError::Connect("connection reset".to_string()),
                )
            } else {
                ProbeOutcome::working(
                    raw_proxy,
                    descriptor.scheme,
                    100,
                    "1.1.1.1".to_string(),
                    "US".to_string(),
                )
            }
        }
    }

    struct PanickyExecutor;

    #[async_trait]
    impl ProbeExecutor for PanickyExecutor {
        async fn probe(&self, descriptor: &ProxyDescriptor, raw_proxy: &str) -> ProbeOutcome {
            if raw_proxy.starts_with("boom") {
                panic!("executor blew up");
            }
            ProbeOutcome::working(
                raw_proxy,
                descriptor.scheme,
                1,
                "1.1.1.1".to_string(),
                "US".to_string(),
            )
        }
    }

    fn fast_config() -> CheckerConfig {
        CheckerConfig::new().with_retry_delay(Duration::ZERO)
    }

    fn stub(working: &[&str]) -> StubExecutor {
        StubExecutor {
            working: working.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(config.retries, 2);
        assert_eq!(config.test_url, DEFAULT_TEST_URL);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_concurrency(20)
            .with_retries(4)
            .with_retry_delay(Duration::from_millis(250))
            .with_test_url("https://example.com/ip".to_string())
            .with_user_agent("proxy-probe/0.1".to_string());

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_concurrent, 20);
        assert_eq!(config.retry_policy(), RetryPolicy::new(4, Duration::from_millis(250)));
        assert_eq!(config.test_url, "https://example.com/ip");
        assert_eq!(config.user_agent, "proxy-probe/0.1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_checker_config_validation() {
        assert!(CheckerConfig::new().with_concurrency(0).validate().is_err());
        assert!(CheckerConfig::new().with_timeout(Duration::ZERO).validate().is_err());
        assert!(CheckerConfig::new()
            .with_test_url("ftp://example.com".to_string())
            .validate()
            .is_err());
        assert!(CheckerConfig::new()
            .with_test_url("not a url".to_string())
            .validate()
            .is_err());
        assert!(CheckerConfig::new()
            .with_user_agent("bad\nagent".to_string())
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_working_and_malformed_proxies() {
        let checker = ProxyChecker::with_executor(fast_config(), stub(&["8.8.8.8:80"]));

        let session = checker
            .check_all(vec!["8.8.8.8:80".to_string(), "bad::::proxy".to_string()])
            .await;

        assert_eq!(session.len(), 2);
        assert_eq!(session.working, vec!["8.8.8.8:80"]);
        assert_eq!(session.failed, vec!["bad::::proxy"]);

        let good = session.all_results.iter().find(|o| o.succeeded).unwrap();
        assert_eq!(good.latency_ms, Some(42));
        assert_eq!(good.exit_ip.as_deref(), Some("8.8.8.8"));
        assert_eq!(good.country.as_deref(), Some("US"));

        let bad = session.all_results.iter().find(|o| !o.succeeded).unwrap();
        assert_eq!(bad.error_kind, Some(ProbeErrorKind::MalformedProxy));
        assert_eq!(bad.scheme_used, None);
        assert_eq!(bad.attempts, 1);
    }

    #[tokio::test]
    async fn test_every_input_recorded_once() {
        let inputs: Vec<String> = (0..60)
            .map(|i| match i % 3 {
                0 => format!("10.0.0.{i}:8080"),
                1 => format!("socks5://10.0.1.{i}:1080"),
                _ => format!("garbage-{i}"),
            })
            .collect();
        let working: Vec<&str> = inputs.iter().step_by(2).map(String::as_str).collect();
        let checker = ProxyChecker::with_executor(fast_config().with_concurrency(7), stub(&working));

        let session = checker.check_all(inputs.clone()).await;

        assert_eq!(session.len(), inputs.len());
        let mut seen: Vec<&String> = session.working.iter().chain(&session.failed).collect();
        seen.sort();
        let mut expected: Vec<&String> = inputs.iter().collect();
        expected.sort();
        assert_eq!(seen, expected);

        for outcome in &session.all_results {
            if outcome.succeeded {
                assert!(outcome.latency_ms.is_some());
                assert!(!outcome.exit_ip.as_deref().unwrap_or_default().is_empty());
            } else {
                assert!(outcome.latency_ms.is_none());
                let summary = outcome.error_summary.as_deref().unwrap_or_default();
                assert!(!summary.is_empty() && summary.chars().count() <= 50);
            }
        }
    }

    #[tokio::test]
    async fn test_failing_proxy_uses_retry_budget() {
        let checker = ProxyChecker::with_executor(fast_config().with_retries(2), stub(&[]));

        let session = checker.check_all(vec!["1.2.3.4:8080".to_string()]).await;

        assert_eq!(session.failed, vec!["1.2.3.4:8080"]);
        assert_eq!(session.all_results[0].attempts, 3);
        assert_eq!(session.all_results[0].error_kind, Some(ProbeErrorKind::Connect));
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() {
        let checker =
            ProxyChecker::with_executor(fast_config().with_concurrency(5), GaugeExecutor::default());
        let inputs: Vec<String> = (0..100).map(|i| format!("10.0.0.{i}:8080")).collect();

        let session = checker.check_all(inputs).await;

        assert_eq!(session.len(), 100);
        assert_eq!(checker.executor.calls.load(Ordering::SeqCst), 100);
        let peak = checker.executor.peak.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak concurrency was {peak}");
        assert!(peak > 1, "probes never overlapped");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let checker = ProxyChecker::with_executor(fast_config(), stub(&["a:1"]));
        let aggregator = ResultAggregator::new();
        let mut seen = Vec::new();

        checker
            .run_all(
                vec!["a:1".to_string(), "b:2".to_string(), "c".to_string()],
                &aggregator,
                |update| {
                    assert_eq!(update.total, 3);
                    seen.push(update.completed);
                },
            )
            .await;

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(aggregator.completed(), 3);
    }

    #[tokio::test]
    async fn test_panicking_probe_still_yields_outcome() {
        let checker = ProxyChecker::with_executor(fast_config(), PanickyExecutor);

        let session = checker
            .check_all(vec!["boom:8080".to_string(), "fine:8080".to_string()])
            .await;

        assert_eq!(session.len(), 2);
        assert_eq!(session.working, vec!["fine:8080"]);
        assert_eq!(session.failed, vec!["boom:8080"]);
        let failed = session.all_results.iter().find(|o| !o.succeeded).unwrap();
        assert_eq!(failed.error_kind, Some(ProbeErrorKind::Internal));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let checker = ProxyChecker::with_executor(fast_config(), stub(&[]));
        let session = checker.check_all(Vec::new()).await;
        assert!(session.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_holds_the_slot() {
        let config = CheckerConfig::new()
            .with_concurrency(1)
            .with_retries(1)
            .with_retry_delay(Duration::from_secs(1));
        let checker = ProxyChecker::with_executor(config, RecordingExecutor::default());

        let session = checker
            .check_all(vec!["down:8080".to_string(), "up:8080".to_string()])
            .await;

        assert_eq!(session.working, vec!["up:8080"]);
        assert_eq!(session.failed, vec!["down:8080"]);

        let calls = checker.executor.calls();
        let order: Vec<&str> = calls.iter().map(|call| call.raw.as_str()).collect();
        // Both attempts of the failing proxy run back to back inside one slot.
        assert!(
            order == ["down:8080", "down:8080", "up:8080"]
                || order == ["up:8080", "down:8080", "down:8080"],
            "unexpected call order {order:?}"
        );
        for pair in calls.windows(2) {
            assert!(pair[1].started >= pair[0].finished, "probes overlapped: {pair:?}");
        }
        if order[0] == "down:8080" {
            assert!(calls[2].started >= calls[1].finished);
            assert!(calls[1].started - calls[0].finished >= Duration::from_secs(1));
            assert!(calls[2].started - calls[0].started >= Duration::from_millis(1200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_scheme_reaches_executor() {
        let checker = ProxyChecker::with_executor(fast_config(), RecordingExecutor::default());
        let inputs = ["1.2.3.4:1080", "1.2.3.4:8080", "socks5://1.2.3.4:9050", "http://1.2.3.4:1081"];

        let session = checker
            .check_all(inputs.iter().map(|raw| raw.to_string()).collect())
            .await;

        let received: HashMap<String, ProxyScheme> = checker
            .executor
            .calls()
            .into_iter()
            .map(|call| (call.raw, call.scheme))
            .collect();
        let expected = [
            ProxyScheme::Socks5,
            ProxyScheme::Http,
            ProxyScheme::Socks5,
            ProxyScheme::Http,
        ];
        for (raw, scheme) in inputs.iter().zip(expected) {
            assert_eq!(received.get(*raw), Some(&scheme), "scheme for {raw}");
            let outcome = session.all_results.iter().find(|o| o.raw_proxy == *raw).unwrap();
            assert_eq!(outcome.scheme_used, Some(scheme));
        }
    }
}
