//! Request throttler: bounded concurrency plus minimum dispatch spacing in
//! front of rate-limited external services.
//!
//! Waiters are served FIFO: both the semaphore and the dispatch mutex are
//! fair. The throttler never retries; see [`super::retry`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::error::{Result, TrackerError};

#[derive(Debug)]
pub struct RequestThrottler {
    permits: Arc<Semaphore>,
    last_dispatch: Mutex<Option<Instant>>,
    min_interval: Duration,
    timeout: Duration,
}

impl RequestThrottler {
    pub fn new(max_concurrent: usize, min_interval: Duration, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            last_dispatch: Mutex::new(None),
            min_interval,
            timeout,
        }
    }

    pub fn from_config(config: &crate::config::TrackerConfig) -> Self {
        Self::new(
            config.max_concurrent_requests,
            config.min_request_interval,
            config.request_timeout,
        )
    }

    /// Run one external call under the concurrency and pacing limits.
    pub async fn run<F, Fut, T>(&self, service: &'static str, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TrackerError::Config("request throttler closed".to_string()))?;

        self.wait_for_slot().await;

        let result = match tokio::time::timeout(self.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(TrackerError::Timeout {
                service,
                after: self.timeout,
            }),
        };

        crate::metrics::external_call(service, &result);
        result
    }

    /// Sleep until `min_interval` has passed since the previous dispatch. The
    /// lock is held across the sleep so dispatches stay strictly ordered.
    async fn wait_for_slot(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn dispatches_are_spaced() {
        let throttler = Arc::new(RequestThrottler::new(
            4,
            Duration::from_millis(300),
            Duration::from_secs(5),
        ));
        let start = Instant::now();
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let throttler = throttler.clone();
            let stamps = stamps.clone();
            handles.push(tokio::spawn(async move {
                throttler
                    .run("test", || async {
                        stamps.lock().await.push(Instant::now());
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut stamps = stamps.lock().await.clone();
        stamps.sort();
        assert_eq!(stamps.len(), 3);
        assert!(stamps[1] - stamps[0] >= Duration::from_millis(300));
        assert!(stamps[2] - stamps[1] >= Duration::from_millis(300));
        assert!(stamps[2] - start >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let throttler = Arc::new(RequestThrottler::new(2, Duration::ZERO, Duration::from_secs(5)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let throttler = throttler.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                throttler
                    .run("test", || async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(throttler.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_without_retry() {
        let throttler = RequestThrottler::new(1, Duration::ZERO, Duration::from_millis(100));
        let calls = AtomicUsize::new(0);
        let result: Result<()> = throttler
            .run("slow", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TrackerError::Timeout { service: "slow", .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
