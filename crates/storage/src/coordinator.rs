//! Transaction coordination with retry, backoff, and degraded mode.
//!
//! The coordinator wraps a unit of work in a storage transaction when the
//! backend supports one, retries transient conflicts with exponential
//! backoff, and otherwise falls back to a documented non-atomic execution
//! mode so the system stays available on storage configurations without
//! multi-document transaction support.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Storage capability probe.
///
/// Backends report whether they can run multi-document transactions (e.g. a
/// replica-set/multi-node deployment check). The coordinator probes once per
/// coordinator lifetime and caches the verdict.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    async fn probe_transaction_support(&self) -> Result<bool, StoreError>;
}

#[async_trait]
impl<B> TransactionBackend for std::sync::Arc<B>
where
    B: TransactionBackend + ?Sized,
{
    async fn probe_transaction_support(&self) -> Result<bool, StoreError> {
        (**self).probe_transaction_support().await
    }
}

/// Classifies unit-of-work errors for the retry loop.
///
/// Layers above storage wrap `StoreError` in their own taxonomies; this
/// keeps the coordinator usable with those types without losing the
/// transient/permanent distinction.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

/// Unit-of-work execution configuration.
#[derive(Debug, Clone)]
pub struct TxConfig {
    /// Retries after the initial attempt, for transient errors only.
    pub max_retries: u32,
    /// Base backoff; the n-th retry waits `retry_delay × 2^(n−1)`.
    pub retry_delay: Duration,
    /// Server-side bound on one execution of the unit of work.
    pub timeout: Duration,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(50),
            timeout: Duration::from_secs(5),
        }
    }
}

impl TxConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Coordinates units of work against a possibly-transactional backend.
#[derive(Debug)]
pub struct TransactionCoordinator<B> {
    backend: B,
    config: TxConfig,
    support: OnceCell<bool>,
}

impl<B> TransactionCoordinator<B>
where
    B: TransactionBackend,
{
    pub fn new(backend: B, config: TxConfig) -> Self {
        Self {
            backend,
            config,
            support: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &TxConfig {
        &self.config
    }

    /// Cached transaction-support verdict.
    ///
    /// The probe runs once; a failed probe is treated as "unsupported", not
    /// as a hard error.
    pub async fn transactions_supported(&self) -> bool {
        *self
            .support
            .get_or_init(|| async {
                match self.backend.probe_transaction_support().await {
                    Ok(supported) => supported,
                    Err(err) => {
                        warn!(error = %err, "transaction support probe failed; treating as unsupported");
                        false
                    }
                }
            })
            .await
    }

    /// Run a unit of work under the configured consistency mode.
    ///
    /// Supported backend: each execution is bounded by `timeout`; a
    /// `StoreError::Transient` is retried up to `max_retries` times with
    /// exponential backoff, after which the last error is surfaced.
    ///
    /// Unsupported backend: the work runs exactly once without atomicity
    /// guarantees between its writes. Only a degraded-mode warning marks the
    /// weaker consistency; callers that care can check
    /// `transactions_supported()`.
    pub async fn with_transaction<T, E, F, Fut>(&self, work: F) -> Result<T, E>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Retryable + From<StoreError> + std::fmt::Display + Send,
    {
        if !self.transactions_supported().await {
            warn!("storage backend lacks transaction support; running unit of work in degraded (non-atomic) mode");
            return self.run_bounded(&work).await;
        }

        let mut attempt: u32 = 1;
        loop {
            match self.run_bounded(&work).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt <= self.config.max_retries => {
                    let delay = self.config.retry_delay * 2u32.pow(attempt - 1);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient storage error; backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_bounded<T, E, F, Fut>(&self, work: &F) -> Result<T, E>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        E: From<StoreError>,
    {
        match tokio::time::timeout(self.config.timeout, work()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.timeout).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    struct StaticBackend {
        supported: bool,
        probes: AtomicU32,
    }

    impl StaticBackend {
        fn new(supported: bool) -> Self {
            Self {
                supported,
                probes: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TransactionBackend for StaticBackend {
        async fn probe_transaction_support(&self) -> Result<bool, StoreError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.supported)
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl TransactionBackend for FailingProbe {
        async fn probe_transaction_support(&self) -> Result<bool, StoreError> {
            Err(StoreError::transient("probe connection refused"))
        }
    }

    fn coordinator(max_retries: u32) -> TransactionCoordinator<StaticBackend> {
        TransactionCoordinator::new(
            StaticBackend::new(true),
            TxConfig::default()
                .with_max_retries(max_retries)
                .with_retry_delay(Duration::from_millis(50))
                .with_timeout(Duration::from_secs(10)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_doubling_delay_then_surfaces_last_error() {
        let coordinator = coordinator(2);
        let calls = Arc::new(AtomicU32::new(0));
        let instants: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

        let result: Result<(), StoreError> = coordinator
            .with_transaction(|| {
                let calls = calls.clone();
                let instants = instants.clone();
                async move {
                    instants.lock().unwrap().push(Instant::now());
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::transient("write conflict"))
                }
            })
            .await;

        // Initial attempt + exactly two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err(), StoreError::transient("write conflict"));

        let instants = instants.lock().unwrap();
        assert_eq!(instants[1] - instants[0], Duration::from_millis(50));
        assert_eq!(instants[2] - instants[1], Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let coordinator = coordinator(3);
        let calls = Arc::new(AtomicU32::new(0));

        let result = coordinator
            .with_transaction(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StoreError::transient("write conflict"))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let coordinator = coordinator(5);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), StoreError> = coordinator
            .with_transaction(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::VersionConflict {
                        expected: 3,
                        actual: 4,
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err(),
            StoreError::VersionConflict { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_failure_not_partial_success() {
        let coordinator = TransactionCoordinator::new(
            StaticBackend::new(true),
            TxConfig::default().with_timeout(Duration::from_millis(100)),
        );

        let result: Result<(), StoreError> = coordinator
            .with_transaction(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result.unwrap_err(), StoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn degraded_mode_runs_once_without_retries() {
        let coordinator = TransactionCoordinator::new(
            StaticBackend::new(false),
            TxConfig::default().with_max_retries(5),
        );
        let calls = Arc::new(AtomicU32::new(0));

        assert!(!coordinator.transactions_supported().await);

        let result: Result<(), StoreError> = coordinator
            .with_transaction(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::transient("write conflict"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn probe_runs_once_per_coordinator() {
        let coordinator = TransactionCoordinator::new(StaticBackend::new(true), TxConfig::default());

        for _ in 0..3 {
            let _ = coordinator
                .with_transaction(|| async { Ok::<_, StoreError>(()) })
                .await;
        }

        assert_eq!(coordinator.backend.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_probe_means_unsupported_not_fatal() {
        let coordinator = TransactionCoordinator::new(FailingProbe, TxConfig::default());

        assert!(!coordinator.transactions_supported().await);

        let result = coordinator
            .with_transaction(|| async { Ok::<_, StoreError>(7u32) })
            .await;
        assert_eq!(result.unwrap(), 7);
    }
}
