//! HTTP language-model client.
//!
//! Production client for the completion collaborator:
//! - Connection pooling via a shared reqwest client
//! - Token-bucket rate limiting on outbound requests
//! - Exponential backoff retries for transient errors (429, 5xx,
//!   network failures); client errors are permanent
//! - Tolerates `fallback_used` responses from the provider

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::{RateLimitSettings, RetrySettings};
use crate::domain::ports::language_model::{Completion, CompletionRequest, LanguageModel};

/// HTTP client for the language-model collaborator.
pub struct HttpLanguageModel {
    http: Client,
    endpoint: String,
    limiter: Arc<DefaultDirectRateLimiter>,
    retry: RetrySettings,
}

impl HttpLanguageModel {
    pub fn new(
        endpoint: impl Into<String>,
        rate_limit: &RateLimitSettings,
        retry: RetrySettings,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()?;

        let per_second = NonZeroU32::new(rate_limit.requests_per_second.max(1))
            .expect("clamped to at least 1");
        let burst = NonZeroU32::new(rate_limit.burst_size.max(1)).expect("clamped to at least 1");
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::direct(quota)),
            retry,
        })
    }

    async fn post_once(&self, request: &CompletionRequest) -> Result<Completion, backoff::Error<DomainError>> {
        let response = self
            .http
            .post(format!("{}/complete", self.endpoint))
            .json(request)
            .send()
            .await
            .map_err(|err| {
                backoff::Error::transient(DomainError::CollaboratorUnavailable(format!(
                    "llm request failed: {err}"
                )))
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<Completion>().await.map_err(|err| {
                backoff::Error::permanent(DomainError::SerializationError(format!(
                    "invalid completion payload: {err}"
                )))
            });
        }

        let body = response.text().await.unwrap_or_default();
        let error = DomainError::CollaboratorUnavailable(format!("llm {status}: {body}"));
        if status.as_u16() == 429 || status.is_server_error() {
            Err(backoff::Error::transient(error))
        } else {
            Err(backoff::Error::permanent(DomainError::ValidationFailed(
                format!("llm rejected request ({status}): {body}"),
            )))
        }
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, request: CompletionRequest) -> DomainResult<Completion> {
        self.limiter.until_ready().await;

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_backoff_ms))
            .with_max_elapsed_time(Some(Duration::from_millis(
                self.retry.max_backoff_ms * u64::from(self.retry.max_retries.max(1)),
            )))
            .build();

        let completion = backoff::future::retry(policy, || async {
            self.post_once(&request).await
        })
        .await?;

        if completion.fallback_used {
            tracing::warn!(
                model = %completion.model_used,
                provider = %completion.provider,
                "Language model used fallback"
            );
        }
        tracing::debug!(
            model = %completion.model_used,
            tokens = completion.token_count,
            elapsed_ms = completion.processing_time_ms,
            "Completion received"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_retry() -> RetrySettings {
        RetrySettings {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 50,
        }
    }

    fn rate_limit() -> RateLimitSettings {
        RateLimitSettings {
            requests_per_second: 100,
            burst_size: 100,
        }
    }

    fn completion_body(summary: &str, fallback: bool) -> String {
        format!(
            r#"{{"summary":"{summary}","model_used":"m1","provider":"p1","token_count":7,"processing_time_ms":3,"fallback_used":{fallback}}}"#
        )
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/complete")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("generated", false))
            .create_async()
            .await;

        let client = HttpLanguageModel::new(server.url(), &rate_limit(), fast_retry()).unwrap();
        let completion = client
            .complete(CompletionRequest::new("content", "code_generation"))
            .await
            .unwrap();
        assert_eq!(completion.summary, "generated");
        assert!(!completion.fallback_used);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_retries_transient_errors() {
        let mut server = mockito::Server::new_async().await;
        let failure = server
            .mock("POST", "/complete")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let success = server
            .mock("POST", "/complete")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("after retry", true))
            .create_async()
            .await;

        let client = HttpLanguageModel::new(server.url(), &rate_limit(), fast_retry()).unwrap();
        let completion = client
            .complete(CompletionRequest::new("content", "debugging"))
            .await
            .unwrap();
        assert_eq!(completion.summary, "after retry");
        assert!(completion.fallback_used, "fallback results are tolerated");
        failure.assert_async().await;
        success.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_client_error_is_permanent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/complete")
            .with_status(400)
            .with_body("bad template")
            .expect(1)
            .create_async()
            .await;

        let client = HttpLanguageModel::new(server.url(), &rate_limit(), fast_retry()).unwrap();
        let err = client
            .complete(CompletionRequest::new("content", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
        mock.assert_async().await;
    }
}
