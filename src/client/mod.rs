//! Resilient client for the messaging backend.
//!
//! # Data Flow
//! ```text
//! get_messages / get_unread_count / mark_messages_as_read
//!     → circuit breaker (key "operation:username")
//!         Open → short-circuit → fallback policy
//!     → MessagingApi call
//!         Ok  → record success → refresh cache (reads only)
//!         Err → record failure (5xx / network) → retry with backoff
//!               budget exhausted → fallback policy
//! ```
//!
//! # Fallback policy
//! - Messages: fresh cache entry, else the error
//! - Unread count: any cache entry, else zero
//! - Mark as read: never; a write is only successful when acknowledged
//!
//! # Design Decisions
//! - The client owns its breakers and caches; two clients share nothing
//! - Each attempt re-consults the breaker, so a breaker that opens
//!   mid-chain short-circuits the remaining retries
//! - Client errors (4xx) propagate untouched: no retry, no cache
//! - Register, login and send are plain pass-throughs

pub mod outcome;

use std::future::Future;
use std::time::Duration;

use crate::api::{
    ApiError, ApiResult, AuthToken, Credentials, MarkReadResponse, Message, MessagingApi,
    UnreadCount, User,
};
use crate::config::ClientConfig;
use crate::observability::metrics;
use crate::resilience::{
    Admission, Cached, CircuitBreakerRegistry, ResponseCache, RetryDecision, RetryPolicy,
};

pub use outcome::{DegradedCause, Origin, Resilient};

const FETCH_MESSAGES: &str = "messages";
const MARK_READ: &str = "mark_read";
const UNREAD_COUNT: &str = "unread_count";

/// Result of running one operation through breaker and retry.
enum Attempted<T> {
    Success(T),
    ShortCircuited { retry_after: Duration },
    Failed(ApiError),
}

/// Breaker key for an operation on a subject, e.g. `messages:alice`.
pub fn breaker_key(operation: &str, subject: &str) -> String {
    format!("{}:{}", operation, subject)
}

/// Backend client with circuit breaking, retry and degraded-mode caching.
pub struct ResilienceClient<A> {
    api: A,
    breakers: CircuitBreakerRegistry,
    messages_cache: ResponseCache<Vec<Message>>,
    unread_cache: ResponseCache<UnreadCount>,
    retry_policy: RetryPolicy,
}

impl<A: MessagingApi> ResilienceClient<A> {
    /// Build a client around `api` with policies from `config`.
    pub fn new(api: A, config: &ClientConfig) -> Self {
        Self {
            api,
            breakers: CircuitBreakerRegistry::from_config(&config.circuit_breaker),
            messages_cache: ResponseCache::from_config(&config.cache),
            unread_cache: ResponseCache::from_config(&config.cache),
            retry_policy: RetryPolicy::from_config(&config.retries),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Breaker state, for health displays and tests.
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub async fn register(&self, credentials: &Credentials) -> ApiResult<User> {
        self.api.register(credentials).await
    }

    pub async fn login(&self, credentials: &Credentials) -> ApiResult<AuthToken> {
        self.api.login(credentials).await
    }

    pub async fn send_message(&self, username: &str, content: &str) -> ApiResult<Message> {
        self.api.send_message(username, content).await
    }

    /// Messages for `username`.
    ///
    /// Degrades to a fresh cached list when the breaker is open or retries
    /// are exhausted; without one the error is returned.
    pub async fn get_messages(
        &self,
        username: &str,
        token: &AuthToken,
    ) -> ApiResult<Resilient<Vec<Message>>> {
        let key = breaker_key(FETCH_MESSAGES, username);
        tracing::debug!(username = %username, "Fetching messages");

        let attempted = self
            .execute(FETCH_MESSAGES, &key, || self.api.fetch_messages(username, token))
            .await;

        match attempted {
            Attempted::Success(messages) => {
                tracing::info!(
                    username = %username,
                    count = messages.len(),
                    "Fetched messages"
                );
                self.messages_cache.put(username, messages.clone());
                metrics::record_request(FETCH_MESSAGES, "live");
                Ok(Resilient::live(messages))
            }
            Attempted::ShortCircuited { retry_after } => {
                match self.messages_cache.get_fresh(username) {
                    Some(cached) => {
                        tracing::info!(
                            username = %username,
                            count = cached.data.len(),
                            "Returning cached messages while circuit is open"
                        );
                        Ok(serve_cached(FETCH_MESSAGES, cached, DegradedCause::CircuitOpen))
                    }
                    None => {
                        metrics::record_request(FETCH_MESSAGES, "circuit_open");
                        Err(ApiError::CircuitOpen {
                            operation: FETCH_MESSAGES,
                            retry_after,
                        })
                    }
                }
            }
            Attempted::Failed(error) if error.is_retryable() => {
                match self.messages_cache.get_fresh(username) {
                    Some(cached) => {
                        tracing::warn!(
                            username = %username,
                            error = %error,
                            "Returning cached messages after fetch error"
                        );
                        Ok(serve_cached(FETCH_MESSAGES, cached, DegradedCause::RetriesExhausted))
                    }
                    None => {
                        metrics::record_request(FETCH_MESSAGES, "error");
                        Err(error)
                    }
                }
            }
            Attempted::Failed(error) => {
                metrics::record_request(FETCH_MESSAGES, "error");
                Err(error)
            }
        }
    }

    /// Mark `message_ids` as read.
    ///
    /// Never answered from cache: callers must not apply the local read
    /// state unless this returns `Ok`.
    pub async fn mark_messages_as_read(
        &self,
        username: &str,
        message_ids: &[i64],
        token: &AuthToken,
    ) -> ApiResult<MarkReadResponse> {
        let key = breaker_key(MARK_READ, username);
        tracing::debug!(username = %username, ids = ?message_ids, "Marking messages as read");

        let attempted = self
            .execute(MARK_READ, &key, || self.api.mark_read(username, message_ids, token))
            .await;

        match attempted {
            Attempted::Success(response) => {
                tracing::info!(
                    username = %username,
                    ids = ?message_ids,
                    success = response.success,
                    "Marked messages as read"
                );
                metrics::record_request(MARK_READ, "live");
                Ok(response)
            }
            Attempted::ShortCircuited { retry_after } => {
                tracing::info!(username = %username, "Circuit open, cannot mark messages as read");
                metrics::record_request(MARK_READ, "circuit_open");
                Err(ApiError::CircuitOpen {
                    operation: MARK_READ,
                    retry_after,
                })
            }
            Attempted::Failed(error) => {
                metrics::record_request(MARK_READ, "error");
                Err(error)
            }
        }
    }

    /// Unread counter for `username`.
    ///
    /// Degrades to any cached count (fresh or stale) and then to zero; only
    /// client errors are returned.
    pub async fn get_unread_count(
        &self,
        username: &str,
        token: &AuthToken,
    ) -> ApiResult<Resilient<UnreadCount>> {
        let key = breaker_key(UNREAD_COUNT, username);
        tracing::debug!(username = %username, "Fetching unread count");

        let attempted = self
            .execute(UNREAD_COUNT, &key, || self.api.unread_count(username, token))
            .await;

        let cause = match attempted {
            Attempted::Success(count) => {
                tracing::info!(username = %username, count = count.count, "Fetched unread count");
                self.unread_cache.put(username, count);
                metrics::record_request(UNREAD_COUNT, "live");
                return Ok(Resilient::live(count));
            }
            Attempted::ShortCircuited { .. } => DegradedCause::CircuitOpen,
            Attempted::Failed(error) if error.is_retryable() => {
                tracing::warn!(username = %username, error = %error, "Unread count fetch failed");
                DegradedCause::RetriesExhausted
            }
            Attempted::Failed(error) => {
                metrics::record_request(UNREAD_COUNT, "error");
                return Err(error);
            }
        };

        match self.unread_cache.get(username) {
            Some(cached) => Ok(serve_cached(UNREAD_COUNT, cached, cause)),
            None => {
                tracing::info!(username = %username, "No cached unread count, returning 0");
                metrics::record_request(UNREAD_COUNT, "default");
                Ok(Resilient {
                    data: UnreadCount::default(),
                    origin: Origin::Default { cause },
                })
            }
        }
    }

    /// Run `call` under the breaker for `key`, retrying transient failures.
    async fn execute<T, F, Fut>(&self, operation: &'static str, key: &str, mut call: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut retries_remaining = self.retry_policy.max_retries();
        loop {
            if let Admission::Rejected { retry_after } = self.breakers.acquire(key) {
                tracing::info!(
                    operation,
                    breaker = %key,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Circuit breaker open, short-circuiting"
                );
                return Attempted::ShortCircuited { retry_after };
            }

            let error = match call().await {
                Ok(value) => {
                    self.breakers.record_success(key);
                    return Attempted::Success(value);
                }
                Err(error) => error,
            };

            if error.counts_against_breaker() {
                self.breakers.record_failure(key);
            } else {
                self.breakers.release(key);
            }

            match self.retry_policy.decide(&error, retries_remaining) {
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        operation,
                        breaker = %key,
                        retries_left = retries_remaining,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after failure"
                    );
                    metrics::record_retry(operation);
                    tokio::time::sleep(delay).await;
                    retries_remaining -= 1;
                }
                RetryDecision::Fail => return Attempted::Failed(error),
            }
        }
    }
}

fn serve_cached<T>(operation: &'static str, cached: Cached<T>, cause: DegradedCause) -> Resilient<T> {
    tracing::warn!(
        operation,
        fresh = cached.is_fresh,
        age_secs = cached.age.as_secs(),
        cause = ?cause,
        "Serving cached data"
    );
    metrics::record_cache_fallback(operation, cached.is_fresh);
    metrics::record_request(operation, "cache");
    Resilient {
        data: cached.data,
        origin: Origin::Cache {
            fresh: cached.is_fresh,
            age: cached.age,
            cause,
        },
    }
}

impl<A> std::fmt::Debug for ResilienceClient<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceClient")
            .field("breakers", &self.breakers.len())
            .field("cached_message_lists", &self.messages_cache.len())
            .field("cached_unread_counts", &self.unread_cache.len())
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}
