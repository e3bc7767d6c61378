//! Circuit breaker pattern implementation.
//!
//! The circuit breaker prevents cascading failures by stopping requests
//! to a failing provider and allowing it time to recover. It wraps a
//! [`Provider`] and is itself a `Provider`, so callers never see the
//! difference except for fast `CircuitOpen` failures.
//!
//! Every admitted call holds a [`CallPermit`]. The permit records the
//! outcome; a permit dropped without an outcome (the caller went away)
//! records nothing, so cancellations never count as failures.

use async_trait::async_trait;
use futures::StreamExt;
use gateway_core::{
    ChunkStream, CompletionRequest, CompletionResponse, GatewayError, GatewayResult, Provider,
    SharedProvider,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed = 0,
    /// Circuit is open, requests are rejected
    Open = 1,
    /// Circuit is half-open, a trial request is allowed through
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait after the last failure before a trial request
    pub reset_timeout: Duration,
    /// Upper bound for a single upstream call (or stream start)
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the cooldown before a trial request
    #[must_use]
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set or clear the per-call timeout
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
struct BreakerCore {
    provider_id: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    rejected: AtomicU64,
}

impl BreakerCore {
    fn acquire(self: &Arc<Self>) -> GatewayResult<CallPermit> {
        let mut guard = self.state.lock();
        let trial = match guard.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled_down = guard
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if !cooled_down {
                    drop(guard);
                    return Err(self.reject());
                }
                guard.state = CircuitState::HalfOpen;
                guard.trial_in_flight = true;
                info!(provider = %self.provider_id, "Circuit breaker half-open, testing");
                true
            }
            CircuitState::HalfOpen => {
                if guard.trial_in_flight {
                    drop(guard);
                    return Err(self.reject());
                }
                guard.trial_in_flight = true;
                true
            }
        };

        Ok(CallPermit {
            core: Arc::clone(self),
            trial,
            settled: false,
        })
    }

    fn reject(&self) -> GatewayError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(provider = %self.provider_id, "Circuit open, failing fast");
        GatewayError::circuit_breaker_open(&self.provider_id)
    }

    fn on_success(&self, trial: bool) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.state.lock();
        if trial {
            guard.trial_in_flight = false;
        }
        guard.failure_count = 0;
        if guard.state != CircuitState::Closed {
            guard.state = CircuitState::Closed;
            guard.trial_in_flight = false;
            info!(provider = %self.provider_id, "Circuit breaker closed");
        }
    }

    fn on_failure(&self, trial: bool) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.state.lock();
        if trial {
            guard.trial_in_flight = false;
        }
        guard.failure_count = guard.failure_count.saturating_add(1);
        guard.last_failure = Some(Instant::now());

        let reopen = trial || guard.state == CircuitState::HalfOpen;
        let tripped = guard.failure_count >= self.config.failure_threshold;
        if (reopen || tripped) && guard.state != CircuitState::Open {
            guard.state = CircuitState::Open;
            warn!(
                provider = %self.provider_id,
                failures = guard.failure_count,
                threshold = self.config.failure_threshold,
                "Circuit breaker opened"
            );
        }
    }

    fn release_trial(&self) {
        let mut guard = self.state.lock();
        guard.trial_in_flight = false;
    }

    fn force(&self, state: CircuitState) {
        let mut guard = self.state.lock();
        guard.state = state;
        guard.trial_in_flight = false;
        match state {
            CircuitState::Closed => {
                guard.failure_count = 0;
                guard.last_failure = None;
            }
            CircuitState::Open => guard.last_failure = Some(Instant::now()),
            CircuitState::HalfOpen => {}
        }
    }
}

/// Admission for one call through the breaker.
///
/// Settle it with [`CallPermit::success`] or [`CallPermit::failure`].
/// Dropping it unsettled releases a half-open trial slot without recording
/// an outcome.
#[derive(Debug)]
pub struct CallPermit {
    core: Arc<BreakerCore>,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    /// Record a successful call
    pub fn success(mut self) {
        self.settled = true;
        self.core.on_success(self.trial);
    }

    /// Record a failed call
    pub fn failure(mut self) {
        self.settled = true;
        self.core.on_failure(self.trial);
    }

    /// Whether this permit is the half-open trial
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.core.release_trial();
        }
    }
}

/// Circuit breaker decorating a single provider
pub struct CircuitBreaker {
    inner: SharedProvider,
    core: Arc<BreakerCore>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider", &self.core.provider_id)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Wrap a provider
    #[must_use]
    pub fn new(inner: SharedProvider, config: CircuitBreakerConfig) -> Self {
        let provider_id = inner.id().to_string();
        Self {
            inner,
            core: Arc::new(BreakerCore {
                provider_id,
                config,
                state: Mutex::new(BreakerState {
                    state: CircuitState::Closed,
                    failure_count: 0,
                    last_failure: None,
                    trial_in_flight: false,
                }),
                total_successes: AtomicU64::new(0),
                total_failures: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Wrap a provider with default configuration
    #[must_use]
    pub fn with_defaults(inner: SharedProvider) -> Self {
        Self::new(inner, CircuitBreakerConfig::default())
    }

    /// Get the provider ID
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.core.provider_id
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.core.state.lock().state
    }

    /// Admit a call, or fail fast with `CircuitOpen`
    pub fn acquire(&self) -> GatewayResult<CallPermit> {
        self.core.acquire()
    }

    /// Run `call` under the breaker.
    ///
    /// The call is not invoked when the circuit is open. Its error, or a
    /// timeout, counts as a failure; its success closes the circuit.
    pub async fn execute<T, F, Fut>(&self, call: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let permit = self.acquire()?;
        let result = match self.core.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call())
                .await
                .unwrap_or_else(|_| Err(GatewayError::timeout(self.provider_id(), limit))),
            None => call().await,
        };

        match &result {
            Ok(_) => permit.success(),
            Err(err) => {
                debug!(provider = %self.provider_id(), error = %err, "Provider call failed");
                permit.failure();
            }
        }
        result
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        self.core.force(CircuitState::Closed);
        info!(provider = %self.provider_id(), "Circuit breaker reset");
    }

    /// Force the circuit open (for testing or manual intervention)
    pub fn force_open(&self) {
        self.core.force(CircuitState::Open);
        warn!(provider = %self.provider_id(), "Circuit breaker forced open");
    }

    /// Get current statistics
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let guard = self.core.state.lock();
        CircuitBreakerStats {
            provider: self.core.provider_id.clone(),
            state: guard.state,
            failure_count: guard.failure_count,
            last_failure_ms_ago: guard.last_failure.map(|at| at.elapsed().as_millis() as u64),
            total_successes: self.core.total_successes.load(Ordering::Relaxed),
            total_failures: self.core.total_failures.load(Ordering::Relaxed),
            rejected: self.core.rejected.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Provider for CircuitBreaker {
    fn id(&self) -> &str {
        self.provider_id()
    }

    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        self.execute(|| self.inner.complete(request)).await
    }

    async fn stream(&self, request: &CompletionRequest) -> GatewayResult<ChunkStream> {
        let permit = self.acquire()?;
        let opened = match self.core.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.stream(request))
                .await
                .unwrap_or_else(|_| Err(GatewayError::timeout(self.provider_id(), limit))),
            None => self.inner.stream(request).await,
        };

        match opened {
            Ok(upstream) => Ok(guard_stream(upstream, permit)),
            Err(err) => {
                debug!(provider = %self.provider_id(), error = %err, "Stream failed to start");
                permit.failure();
                Err(err)
            }
        }
    }
}

/// Settle the permit when the stream reaches its terminal chunk or an error
fn guard_stream(mut upstream: ChunkStream, permit: CallPermit) -> ChunkStream {
    Box::pin(async_stream::stream! {
        let mut permit = Some(permit);
        while let Some(item) = upstream.next().await {
            let done = matches!(&item, Ok(chunk) if chunk.done);
            let failed = item.is_err();
            if done {
                if let Some(p) = permit.take() {
                    p.success();
                }
            } else if failed {
                if let Some(p) = permit.take() {
                    p.failure();
                }
            }
            yield item;
            if done || failed {
                break;
            }
        }
        // Upstream ended without a terminal chunk
        if let Some(p) = permit.take() {
            p.success();
        }
    })
}

/// Circuit breaker statistics
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    /// Provider identifier
    pub provider: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub failure_count: u32,
    /// Milliseconds since the last failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_ms_ago: Option<u64>,
    /// Calls that succeeded
    pub total_successes: u64,
    /// Calls that failed
    pub total_failures: u64,
    /// Calls rejected while open
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use gateway_core::{ChatMessage, CompletionChunk, Usage};
    use std::sync::atomic::AtomicU32;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Ok,
        Fail,
        MidStreamError,
        Slow,
    }

    struct TestProvider {
        mode: Mutex<Mode>,
        calls: AtomicU32,
    }

    impl TestProvider {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode: Mutex::new(mode),
                calls: AtomicU32::new(0),
            })
        }

        fn set_mode(&self, mode: Mode) {
            *self.mode.lock() = mode;
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for TestProvider {
        fn id(&self) -> &str {
            "test-provider"
        }

        async fn complete(&self, _request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mode = *self.mode.lock();
            match mode {
                Mode::Fail => Err(GatewayError::provider("test-provider", "boom")),
                Mode::Slow => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(CompletionResponse::new("late", "m", "test-provider", Usage::new(1, 1)))
                }
                _ => Ok(CompletionResponse::new("ok", "m", "test-provider", Usage::new(1, 1))),
            }
        }

        async fn stream(&self, _request: &CompletionRequest) -> GatewayResult<ChunkStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mode = *self.mode.lock();
            match mode {
                Mode::Fail => Err(GatewayError::provider("test-provider", "boom")),
                Mode::MidStreamError => Ok(Box::pin(stream::iter(vec![
                    Ok(CompletionChunk::delta("a")),
                    Err(GatewayError::Stream("reset".into())),
                ]))),
                _ => Ok(Box::pin(stream::iter(vec![
                    Ok(CompletionChunk::delta("a")),
                    Ok(CompletionChunk::delta("b")),
                    Ok(CompletionChunk::done()),
                ]))),
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("ada", vec![ChatMessage::user("hi")])
    }

    fn breaker(provider: &Arc<TestProvider>, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            Arc::clone(provider) as SharedProvider,
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_reset_timeout(reset),
        )
    }

    #[tokio::test]
    async fn test_initial_state_passes_through() {
        let provider = TestProvider::new(Mode::Ok);
        let cb = breaker(&provider, Duration::from_secs(60));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.complete(&request()).await.unwrap().content, "ok");
        assert_eq!(cb.id(), "test-provider");
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let provider = TestProvider::new(Mode::Fail);
        let cb = breaker(&provider, Duration::from_secs(60));

        for _ in 0..3 {
            assert!(cb.complete(&request()).await.is_err());
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(provider.calls(), 3);

        let err = cb.complete(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        assert_eq!(provider.calls(), 3);
        assert_eq!(cb.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let provider = TestProvider::new(Mode::Fail);
        let cb = breaker(&provider, Duration::from_secs(60));

        let _ = cb.complete(&request()).await;
        let _ = cb.complete(&request()).await;
        provider.set_mode(Mode::Ok);
        assert!(cb.complete(&request()).await.is_ok());
        assert_eq!(cb.stats().failure_count, 0);

        provider.set_mode(Mode::Fail);
        let _ = cb.complete(&request()).await;
        let _ = cb.complete(&request()).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_success_closes() {
        let provider = TestProvider::new(Mode::Fail);
        let cb = breaker(&provider, Duration::from_millis(20));
        for _ in 0..3 {
            let _ = cb.complete(&request()).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        provider.set_mode(Mode::Ok);
        assert!(cb.complete(&request()).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_with_fresh_cooldown() {
        let provider = TestProvider::new(Mode::Fail);
        let cb = breaker(&provider, Duration::from_millis(50));
        for _ in 0..3 {
            let _ = cb.complete(&request()).await;
        }

        tokio::time::sleep(Duration::from_millis(70)).await;
        let err = cb.complete(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Provider { .. }));
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(provider.calls(), 4);

        let err = cb.complete(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_half_open_admits_single_trial() {
        let provider = TestProvider::new(Mode::Fail);
        let cb = breaker(&provider, Duration::from_millis(10));
        for _ in 0..3 {
            let _ = cb.complete(&request()).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let trial = cb.acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.acquire().is_err());

        // Abandoned trial frees the slot without counting as a failure
        drop(trial);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.acquire().is_ok());
    }

    #[tokio::test]
    async fn test_stream_completion_records_success() {
        let provider = TestProvider::new(Mode::Ok);
        let cb = breaker(&provider, Duration::from_secs(60));

        let chunks: Vec<_> = cb.stream(&request()).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].as_ref().unwrap().done);
        assert_eq!(cb.stats().total_successes, 1);
    }

    #[tokio::test]
    async fn test_mid_stream_error_records_failure() {
        let provider = TestProvider::new(Mode::MidStreamError);
        let cb = breaker(&provider, Duration::from_secs(60));

        let chunks: Vec<_> = cb.stream(&request()).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].is_err());
        assert_eq!(cb.stats().total_failures, 1);
        assert_eq!(cb.stats().failure_count, 1);
    }

    #[tokio::test]
    async fn test_dropped_stream_is_not_a_failure() {
        let provider = TestProvider::new(Mode::Ok);
        let cb = breaker(&provider, Duration::from_secs(60));

        let mut chunks = cb.stream(&request()).await.unwrap();
        let first = chunks.next().await.unwrap().unwrap();
        assert_eq!(first.content, "a");
        drop(chunks);

        let stats = cb.stats();
        assert_eq!(stats.total_failures, 0);
        assert_eq!(stats.total_successes, 0);
        assert_eq!(stats.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stream_start_failure_counts() {
        let provider = TestProvider::new(Mode::Fail);
        let cb = breaker(&provider, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(cb.stream(&request()).await.is_err());
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let provider = TestProvider::new(Mode::Slow);
        let cb = CircuitBreaker::new(
            Arc::clone(&provider) as SharedProvider,
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_call_timeout(Some(Duration::from_millis(20))),
        );

        let err = cb.complete(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_reset_and_force_open() {
        let provider = TestProvider::new(Mode::Ok);
        let cb = breaker(&provider, Duration::from_secs(60));

        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.complete(&request()).await.is_err());
        assert_eq!(provider.calls(), 0);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.complete(&request()).await.is_ok());
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(CircuitState::from(0), CircuitState::Closed);
        assert_eq!(CircuitState::from(1), CircuitState::Open);
        assert_eq!(CircuitState::from(2), CircuitState::HalfOpen);
        assert_eq!(CircuitState::from(9), CircuitState::Closed);
    }
}
