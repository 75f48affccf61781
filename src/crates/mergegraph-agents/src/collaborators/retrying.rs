//! Retry decorator for collaborators
//!
//! Wraps a [`LanguageModel`] or [`WebSearch`] so each call runs under the
//! engine's [`RetryPolicy`]. Every failure kind gets the same treatment: sleep
//! for the policy's delay, then one more attempt.

use super::{ChatMessage, CollaboratorResult, LanguageModel, LlmResponse, WebSearch};
use async_trait::async_trait;
use mergegraph_core::{with_retry, RetryPolicy};

#[derive(Debug, Clone)]
pub struct Retrying<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> Retrying<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: LanguageModel> LanguageModel for Retrying<T> {
    async fn invoke(&self, messages: &[ChatMessage]) -> CollaboratorResult<LlmResponse> {
        with_retry(&self.policy, || self.inner.invoke(messages)).await
    }
}

#[async_trait]
impl<T: WebSearch> WebSearch for Retrying<T> {
    async fn search(&self, query: &str) -> CollaboratorResult<String> {
        with_retry(&self.policy, || self.inner.search(query)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
        error: fn() -> CollaboratorError,
    }

    #[async_trait]
    impl LanguageModel for Flaky {
        async fn invoke(&self, _messages: &[ChatMessage]) -> CollaboratorResult<LlmResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err((self.error)())
            } else {
                Ok(LlmResponse {
                    text: "ok".into(),
                    ..Default::default()
                })
            }
        }
    }

    #[async_trait]
    impl WebSearch for Flaky {
        async fn search(&self, query: &str) -> CollaboratorResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err((self.error)())
            } else {
                Ok(format!("results for {query}"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_retry_after_fixed_sleep() {
        let model = Retrying::new(
            Flaky {
                calls: AtomicUsize::new(0),
                failures: 1,
                error: || CollaboratorError::RateLimitExceeded("429".into()),
            },
            RetryPolicy::fixed(Duration::from_secs(10)),
        );

        let started = tokio::time::Instant::now();
        let response = model.invoke(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(model.inner.calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_second_failure() {
        let model = Retrying::new(
            Flaky {
                calls: AtomicUsize::new(0),
                failures: 5,
                error: || CollaboratorError::Provider("503".into()),
            },
            RetryPolicy::fixed(Duration::from_secs(10)),
        );
        assert!(model.invoke(&[ChatMessage::user("hi")]).await.is_err());
        assert_eq!(model.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_failure_is_retried_once() {
        let search = Retrying::new(
            Flaky {
                calls: AtomicUsize::new(0),
                failures: 1,
                error: || CollaboratorError::Search("connection reset".into()),
            },
            RetryPolicy::fixed(Duration::from_secs(10)),
        );

        let started = tokio::time::Instant::now();
        let results = search.search("acme revenue").await.unwrap();
        assert_eq!(results, "results for acme revenue");
        assert_eq!(search.inner.calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_is_retried_once() {
        let model = Retrying::new(
            Flaky {
                calls: AtomicUsize::new(0),
                failures: 5,
                error: || CollaboratorError::Authentication("bad key".into()),
            },
            RetryPolicy::fixed(Duration::from_secs(10)),
        );
        assert!(model.invoke(&[ChatMessage::user("hi")]).await.is_err());
        assert_eq!(model.inner.calls.load(Ordering::SeqCst), 2);
    }
}
