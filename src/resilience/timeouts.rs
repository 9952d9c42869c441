//! Timeout enforcement.
//!
//! Every transport call races a deadline. Timeouts are distinct from other
//! errors and are never retried at this layer.

use std::future::Future;
use std::time::Duration;

use crate::error::{SdkError, SdkResult};

/// Run `fut` under `limit`, mapping an elapsed deadline to [`SdkError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> SdkResult<T>
where
    F: Future<Output = SdkResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SdkError::Timeout(limit.as_millis() as u64)),
    }
}
