//! Single entry point for external calls: throttled dispatch wrapped in the
//! caller-side retry policy.

use std::future::Future;
use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::services::retry::RetryPolicy;
use crate::services::throttle::RequestThrottler;

#[derive(Debug, Clone)]
pub struct Upstream {
    throttler: Arc<RequestThrottler>,
    retry: RetryPolicy,
}

impl Upstream {
    pub fn new(throttler: Arc<RequestThrottler>, retry: RetryPolicy) -> Self {
        Self { throttler, retry }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            Arc::new(RequestThrottler::from_config(config)),
            RetryPolicy::with_retries(config.retry_attempts),
        )
    }

    /// Dispatch `call` through the throttler, retrying transient failures.
    /// Every attempt, retries included, takes its own throttler slot.
    pub async fn call<F, Fut, T>(
        &self,
        service: &'static str,
        operation: &str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let throttler = &self.throttler;
        self.retry
            .execute(operation, move || {
                let attempt = call();
                throttler.run(service, move || attempt)
            })
            .await
    }
}
