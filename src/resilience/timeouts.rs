//! Timeout enforcement.
//!
//! Every backend call carries a deadline. An elapsed deadline is reported
//! as a network failure, so it is retried and counted by the breaker like
//! any other missing response.

use std::future::Future;
use std::time::Duration;

use crate::api::error::{ApiError, ApiResult};

/// Run `call` with a deadline.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Network(format!(
            "request timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
