//! Bounded retry with jittered exponential backoff for provider calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::domain::ports::ProviderError;
use crate::domain::{AttemptFailure, PipelineStage};

use super::{RunContext, StoryPipeline, mapping};

impl StoryPipeline {
    /// Call a billable provider until it succeeds, fails permanently, or the
    /// retry budget is spent.
    ///
    /// Each call is a fresh provider invocation under the configured timeout.
    /// Cancellation is honoured between calls, never during one.
    pub(super) async fn call_with_retry<T, F, Fut>(
        &self,
        ctx: &RunContext<'_>,
        stage: PipelineStage,
        mut call: F,
    ) -> Result<T, AttemptFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.with_timeout(call()).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let base_delay = self.retry_base_delay(attempt);
                    let delay = self
                        .jitter
                        .jittered_delay(base_delay, attempt, self.clock.utc());
                    warn!(
                        request_id = %ctx.request_id,
                        attempt_id = %ctx.attempt_id,
                        %stage,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "retryable provider failure; backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    if ctx.cancellation.is_cancelled() {
                        return Err(mapping::cancelled(stage, attempt));
                    }
                    attempt += 1;
                }
                Err(error) => return Err(mapping::provider_failure(stage, &error, attempt)),
            }
        }
    }

    pub(super) async fn with_timeout<T, Fut>(&self, call: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let limit = self.config.provider_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(format!(
                "no response within {}ms",
                limit.as_millis()
            ))),
        }
    }

    pub(super) fn retry_base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.config.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.config.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}
