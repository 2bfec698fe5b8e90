//! Connection retry and the provider-side hook contract.
//!
//! Only opening a stream is retried. Once a body is flowing, failures end
//! the stream with an error item instead.

use std::future::Future;
use std::time::Duration;

use crate::{ProviderError, ProviderId};

/// How often to retry a refused or timed out connection. The delay doubles
/// after every failed attempt up to `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Delay before the attempt after `failed`, or `None` when the error is
    /// final or the attempts are used up.
    pub fn delay_after(&self, failed: u32, error: &ProviderError) -> Option<Duration> {
        if !error.retryable || failed >= self.max_attempts {
            return None;
        }
        let doublings = failed.saturating_sub(1).min(16);
        Some(
            self.initial_backoff
                .saturating_mul(1 << doublings)
                .min(self.max_backoff),
        )
    }
}

/// Injected logging surface for opening and decoding completion streams.
pub trait ProviderOperationHooks: Send + Sync {
    fn on_connect_attempt(&self, _provider: ProviderId, _attempt: u32) {}

    fn on_connect_retry(
        &self,
        _provider: ProviderId,
        _attempt: u32,
        _delay: Duration,
        _error: &ProviderError,
    ) {
    }

    fn on_connected(&self, _provider: ProviderId, _attempts: u32) {}

    fn on_connect_failed(&self, _provider: ProviderId, _attempts: u32, _error: &ProviderError) {}

    /// A body line could not be decoded and was dropped.
    fn on_stream_line_skipped(&self, _provider: ProviderId, _reason: &str) {}

    fn on_stream_completed(&self, _provider: ProviderId, _events: usize) {}

    fn on_stream_failed(&self, _provider: ProviderId, _events: usize, _error: &ProviderError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOperationHooks;

impl ProviderOperationHooks for NoopOperationHooks {}

/// Calls `connect` until it succeeds or `policy` gives up, sleeping through
/// `sleep` between attempts.
pub async fn retry_connect<T, Connect, ConnectFuture, Sleep, SleepFuture>(
    provider: ProviderId,
    policy: &RetryPolicy,
    hooks: &dyn ProviderOperationHooks,
    mut connect: Connect,
    mut sleep: Sleep,
) -> Result<T, ProviderError>
where
    Connect: FnMut() -> ConnectFuture,
    ConnectFuture: Future<Output = Result<T, ProviderError>>,
    Sleep: FnMut(Duration) -> SleepFuture,
    SleepFuture: Future<Output = ()>,
{
    let mut attempt = 1;
    loop {
        hooks.on_connect_attempt(provider, attempt);
        let error = match connect().await {
            Ok(opened) => {
                hooks.on_connected(provider, attempt);
                return Ok(opened);
            }
            Err(error) => error,
        };

        let Some(delay) = policy.delay_after(attempt, &error) else {
            hooks.on_connect_failed(provider, attempt, &error);
            return Err(error);
        };
        hooks.on_connect_retry(provider, attempt, delay, &error);
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::ProviderErrorKind;

    #[test]
    fn only_retryable_errors_get_a_delay() {
        let policy = RetryPolicy::new(2);

        assert!(policy.delay_after(1, &ProviderError::unavailable("busy")).is_some());
        assert_eq!(policy.delay_after(2, &ProviderError::unavailable("busy")), None);
        assert_eq!(policy.delay_after(1, &ProviderError::authentication("bad key")), None);
        assert_eq!(
            RetryPolicy::no_retry().delay_after(1, &ProviderError::timeout("slow")),
            None
        );
    }

    #[test]
    fn delays_double_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 40,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
        };
        let refused = ProviderError::transport("connection refused");

        assert_eq!(policy.delay_after(1, &refused), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(2, &refused), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_after(3, &refused), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_after(39, &refused), Some(Duration::from_millis(250)));
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl RecordingHooks {
        fn record(&self, event: String) {
            self.events.lock().expect("events lock").push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().expect("events lock").clone()
        }
    }

    impl ProviderOperationHooks for RecordingHooks {
        fn on_connect_attempt(&self, provider: ProviderId, attempt: u32) {
            self.record(format!("attempt:{provider}:{attempt}"));
        }

        fn on_connect_retry(
            &self,
            provider: ProviderId,
            attempt: u32,
            delay: Duration,
            _error: &ProviderError,
        ) {
            self.record(format!("retry:{provider}:{attempt}:{}ms", delay.as_millis()));
        }

        fn on_connected(&self, provider: ProviderId, attempts: u32) {
            self.record(format!("connected:{provider}:{attempts}"));
        }

        fn on_connect_failed(&self, provider: ProviderId, attempts: u32, error: &ProviderError) {
            self.record(format!("failed:{provider}:{attempts}:{:?}", error.kind));
        }
    }

    #[tokio::test]
    async fn refused_connections_are_retried_until_one_opens() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            ..RetryPolicy::new(3)
        };
        let hooks = RecordingHooks::default();
        let calls = Mutex::new(0_u32);
        let sleeps = Mutex::new(Vec::new());

        let result = retry_connect(
            ProviderId::Ollama,
            &policy,
            &hooks,
            || {
                let call = {
                    let mut calls = calls.lock().expect("calls lock");
                    *calls += 1;
                    *calls
                };
                async move {
                    if call < 3 {
                        Err(ProviderError::transport("connection refused"))
                    } else {
                        Ok(call)
                    }
                }
            },
            |delay| {
                sleeps.lock().expect("sleeps lock").push(delay);
                async {}
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(
            sleeps.lock().expect("sleeps lock").clone(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(
            hooks.events(),
            vec![
                "attempt:ollama:1",
                "retry:ollama:1:10ms",
                "attempt:ollama:2",
                "retry:ollama:2:20ms",
                "attempt:ollama:3",
                "connected:ollama:3",
            ]
        );
    }

    #[tokio::test]
    async fn exhausted_attempts_report_the_last_error() {
        let hooks = RecordingHooks::default();

        let result = retry_connect::<(), _, _, _, _>(
            ProviderId::OpenAi,
            &RetryPolicy::new(2),
            &hooks,
            || async { Err(ProviderError::timeout("connect timed out")) },
            |_| async {},
        )
        .await;

        assert_eq!(result.map_err(|error| error.kind), Err(ProviderErrorKind::Timeout));
        assert_eq!(hooks.events().last().map(String::as_str), Some("failed:openai:2:Timeout"));
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_on_the_first_attempt() {
        let hooks = RecordingHooks::default();

        let result = retry_connect::<(), _, _, _, _>(
            ProviderId::OpenAi,
            &RetryPolicy::new(5),
            &hooks,
            || async { Err(ProviderError::invalid_request("bad body")) },
            |_| async {},
        )
        .await;

        let error = result.expect_err("request should fail");
        assert_eq!(error.kind, ProviderErrorKind::InvalidRequest);
        assert_eq!(
            hooks.events(),
            vec!["attempt:openai:1", "failed:openai:1:InvalidRequest"]
        );
    }
}
