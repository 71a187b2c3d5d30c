//! One pipeline run over a leased attempt.
//!
//! Stages execute strictly in order. A stage whose output is already
//! checkpointed is skipped, so resumed runs never repeat a completed billable
//! call. Cancellation is checked at each stage boundary up to, but not
//! including, the commit. A run whose writes are refused because a newer run
//! took over the lease stops and reports the attempt as it is now stored.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::ports::{
    GenerationAttemptRepositoryError, GenerationOutcome, ModerationError, ProviderError,
    StoryRepositoryError,
};
use crate::domain::{
    ApprovedText, AttemptFailure, AttemptId, AttemptState, AudioResult, GeneratedText,
    GenerationAttempt, GenerationPayload, PipelineStage, RequestId, SafetyVerdict, Story,
    build_prompt,
};

use super::{StoryPipeline, mapping};

/// Identity of the run, carried into log fields.
pub(super) struct RunContext<'a> {
    pub(super) request_id: RequestId,
    pub(super) attempt_id: AttemptId,
    pub(super) run: u32,
    pub(super) cancellation: &'a CancellationToken,
}

/// Why a run stopped before committing a story.
enum StageStop {
    Unsafe(SafetyVerdict),
    Failed(AttemptFailure),
    /// A newer run holds the lease.
    Superseded,
}

impl StoryPipeline {
    pub(super) async fn run(
        &self,
        mut attempt: GenerationAttempt,
        cancellation: &CancellationToken,
    ) -> GenerationOutcome {
        let ctx = RunContext {
            request_id: attempt.request_id().clone(),
            attempt_id: attempt.id.clone(),
            run: attempt.runs,
            cancellation,
        };
        info!(
            request_id = %ctx.request_id,
            attempt_id = %ctx.attempt_id,
            run = ctx.run,
            resume_stage = %attempt.checkpoint.resume_stage(),
            "starting story generation run"
        );

        let closed = match self.advance(&mut attempt, &ctx).await {
            Ok(story) => {
                info!(
                    request_id = %ctx.request_id,
                    attempt_id = %ctx.attempt_id,
                    run = ctx.run,
                    story_id = %story.id(),
                    "story generation succeeded"
                );
                return GenerationOutcome::from_attempt(&attempt, Some(story));
            }
            Err(StageStop::Unsafe(verdict)) => {
                let reason_codes: Vec<String> = verdict.reason_codes.into_iter().collect();
                warn!(
                    request_id = %ctx.request_id,
                    attempt_id = %ctx.attempt_id,
                    run = ctx.run,
                    reason_codes = ?reason_codes,
                    "generated text rejected by moderation"
                );
                self.close_with(&mut attempt, &ctx, AttemptState::Unsafe { reason_codes })
                    .await
            }
            Err(StageStop::Failed(failure)) => {
                warn!(
                    request_id = %ctx.request_id,
                    attempt_id = %ctx.attempt_id,
                    run = ctx.run,
                    stage = %failure.stage,
                    reason = failure.reason.as_str(),
                    retryable = failure.retryable,
                    calls = failure.calls,
                    error = %failure.message,
                    "story generation run failed"
                );
                self.close_with(&mut attempt, &ctx, AttemptState::Failed(failure))
                    .await
            }
            Err(StageStop::Superseded) => Err(StageStop::Superseded),
        };

        match closed {
            Ok(()) => GenerationOutcome::from_attempt(&attempt, None),
            Err(_) => self.superseded_outcome(&attempt, &ctx).await,
        }
    }

    /// Describe the attempt as the run that took it over left it.
    async fn superseded_outcome(
        &self,
        attempt: &GenerationAttempt,
        ctx: &RunContext<'_>,
    ) -> GenerationOutcome {
        warn!(
            request_id = %ctx.request_id,
            attempt_id = %ctx.attempt_id,
            run = ctx.run,
            "attempt taken over by a newer run; abandoning this run"
        );
        let current = match self.attempts.find_by_request(&ctx.request_id).await {
            Ok(Some(current)) => current,
            Ok(None) => return GenerationOutcome::attempt_in_progress(attempt),
            Err(error) => {
                warn!(attempt_id = %ctx.attempt_id, %error, "failed to reload attempt");
                return GenerationOutcome::attempt_in_progress(attempt);
            }
        };
        if !current.state.is_terminal() {
            return GenerationOutcome::attempt_in_progress(&current);
        }
        match self.describe(&current).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(attempt_id = %ctx.attempt_id, %error, "failed to load committed story");
                GenerationOutcome::attempt_in_progress(&current)
            }
        }
    }

    async fn advance(
        &self,
        attempt: &mut GenerationAttempt,
        ctx: &RunContext<'_>,
    ) -> Result<Story, StageStop> {
        stage_boundary(ctx, PipelineStage::Building)?;
        attempt.enter(PipelineStage::Building, self.clock.utc());
        let payload = build_prompt(
            attempt.request.child_profile(),
            attempt.request.prompt_details(),
        )
        .map_err(|err| StageStop::Failed(mapping::prompt_failure(&err)))?;

        let text = match attempt.checkpoint.text.clone() {
            Some(text) => {
                debug!(attempt_id = %ctx.attempt_id, "reusing checkpointed story text");
                text
            }
            None => self.generate(attempt, ctx, &payload).await?,
        };

        let approved = match attempt.checkpoint.verdict.clone() {
            Some(verdict) => {
                debug!(attempt_id = %ctx.attempt_id, "reusing checkpointed moderation verdict");
                ApprovedText::from_verdict(text, &verdict).ok_or(StageStop::Unsafe(verdict))?
            }
            None => self.moderate(attempt, ctx, text).await?,
        };

        let audio = match attempt.checkpoint.audio.clone() {
            Some(audio) => {
                debug!(attempt_id = %ctx.attempt_id, "reusing checkpointed audio reference");
                audio
            }
            None => self.synthesize(attempt, ctx, &approved).await?,
        };

        stage_boundary(ctx, PipelineStage::Persisting)?;
        // From here on the commit runs to completion regardless of
        // cancellation.
        self.enter_stage(attempt, ctx, PipelineStage::Persisting).await?;
        self.persist(attempt, ctx, &payload, approved, audio).await
    }

    async fn generate(
        &self,
        attempt: &mut GenerationAttempt,
        ctx: &RunContext<'_>,
        payload: &GenerationPayload,
    ) -> Result<GeneratedText, StageStop> {
        stage_boundary(ctx, PipelineStage::Generating)?;
        self.enter_stage(attempt, ctx, PipelineStage::Generating).await?;

        let provider = &self.text;
        let timeout = self.config.provider_timeout;
        let text = self
            .call_with_retry(ctx, PipelineStage::Generating, move || async move {
                let text = provider.generate(payload, timeout).await?;
                if text.text.trim().is_empty() {
                    return Err(ProviderError::malformed("empty story text"));
                }
                Ok::<_, ProviderError>(text)
            })
            .await
            .map_err(StageStop::Failed)?;

        attempt.checkpoint.text = Some(text.clone());
        Ok(text)
    }

    async fn moderate(
        &self,
        attempt: &mut GenerationAttempt,
        ctx: &RunContext<'_>,
        text: GeneratedText,
    ) -> Result<ApprovedText, StageStop> {
        stage_boundary(ctx, PipelineStage::Moderating)?;
        self.enter_stage(attempt, ctx, PipelineStage::Moderating).await?;

        let timeout = self.config.provider_timeout;
        let verdict =
            match tokio::time::timeout(timeout, self.moderation.moderate(&text.text, timeout))
                .await
            {
                Ok(Ok(verdict)) => verdict,
                Ok(Err(error)) => {
                    return Err(StageStop::Failed(mapping::moderation_failure(&error)));
                }
                Err(_) => {
                    let error = ModerationError::timeout(format!(
                        "no verdict within {}ms",
                        timeout.as_millis()
                    ));
                    return Err(StageStop::Failed(mapping::moderation_failure(&error)));
                }
            };

        attempt.checkpoint.verdict = Some(verdict.clone());
        ApprovedText::from_verdict(text, &verdict).ok_or(StageStop::Unsafe(verdict))
    }

    async fn synthesize(
        &self,
        attempt: &mut GenerationAttempt,
        ctx: &RunContext<'_>,
        approved: &ApprovedText,
    ) -> Result<AudioResult, StageStop> {
        stage_boundary(ctx, PipelineStage::Synthesizing)?;
        self.enter_stage(attempt, ctx, PipelineStage::Synthesizing).await?;

        let provider = &self.audio;
        let voice = attempt.request.voice().clone();
        let voice = &voice;
        let text = approved.text();
        let timeout = self.config.provider_timeout;
        let audio = self
            .call_with_retry(ctx, PipelineStage::Synthesizing, move || {
                provider.synthesize(text, voice, timeout)
            })
            .await
            .map_err(StageStop::Failed)?;

        attempt.checkpoint.audio = Some(audio.clone());
        Ok(audio)
    }

    async fn persist(
        &self,
        attempt: &mut GenerationAttempt,
        ctx: &RunContext<'_>,
        payload: &GenerationPayload,
        approved: ApprovedText,
        audio: AudioResult,
    ) -> Result<Story, StageStop> {
        let story = Story::compose(
            &attempt.request,
            attempt.id.clone(),
            payload.title.clone(),
            approved,
            audio,
            self.clock.utc(),
        );

        let max_attempts = self.config.max_attempts.max(1);
        let mut call = 1;
        loop {
            match self.commit_once(attempt, &story).await {
                Ok(committed) => return Ok(committed),
                Err(StoryRepositoryError::LeaseLost { .. }) => return Err(StageStop::Superseded),
                Err(error) if call < max_attempts => {
                    let delay = self.jitter.jittered_delay(
                        self.retry_base_delay(call),
                        call,
                        self.clock.utc(),
                    );
                    warn!(
                        request_id = %ctx.request_id,
                        attempt_id = %ctx.attempt_id,
                        attempt = call,
                        %error,
                        "story commit failed; backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    call += 1;
                }
                Err(error) => {
                    return Err(StageStop::Failed(mapping::persistence_failure(&error, call)));
                }
            }
        }
    }

    /// Commit `story`, or adopt a story already committed for the request id.
    async fn commit_once(
        &self,
        attempt: &mut GenerationAttempt,
        story: &Story,
    ) -> Result<Story, StoryRepositoryError> {
        let existing = self.stories.find_by_request(attempt.request_id()).await?;
        let candidate = existing.as_ref().unwrap_or(story);

        let mut closing = attempt.clone();
        closing.close(
            AttemptState::Succeeded {
                story_id: candidate.id().clone(),
            },
            self.clock.utc(),
        );
        let story_id = self.stories.commit_story(candidate, &closing).await?;

        if &story_id == candidate.id() {
            *attempt = closing;
            return Ok(candidate.clone());
        }

        // A concurrent commit won the unique request id.
        let winner = self
            .stories
            .find_by_id(&story_id)
            .await?
            .ok_or_else(|| StoryRepositoryError::query(format!("story {story_id} vanished")))?;
        closing.state = AttemptState::Succeeded { story_id };
        *attempt = closing;
        Ok(winner)
    }

    /// Checkpoint entry into `stage`. Storage failures are logged and the
    /// run continues; a refused write means another run owns the attempt.
    async fn enter_stage(
        &self,
        attempt: &mut GenerationAttempt,
        ctx: &RunContext<'_>,
        stage: PipelineStage,
    ) -> Result<(), StageStop> {
        let now = self.clock.utc();
        attempt.enter(stage, now);
        info!(
            request_id = %ctx.request_id,
            attempt_id = %ctx.attempt_id,
            run = ctx.run,
            %stage,
            "entering pipeline stage"
        );
        match self
            .attempts
            .save_progress(attempt, self.lease_until(now))
            .await
        {
            Ok(()) => Ok(()),
            Err(GenerationAttemptRepositoryError::LeaseLost { .. }) => Err(StageStop::Superseded),
            Err(error) => {
                warn!(
                    attempt_id = %ctx.attempt_id,
                    %stage,
                    %error,
                    "failed to checkpoint attempt progress"
                );
                Ok(())
            }
        }
    }

    async fn close_with(
        &self,
        attempt: &mut GenerationAttempt,
        ctx: &RunContext<'_>,
        state: AttemptState,
    ) -> Result<(), StageStop> {
        attempt.close(state, self.clock.utc());
        match self.attempts.close_attempt(attempt).await {
            Ok(()) => Ok(()),
            Err(GenerationAttemptRepositoryError::LeaseLost { .. }) => Err(StageStop::Superseded),
            Err(error) => {
                error!(
                    request_id = %ctx.request_id,
                    attempt_id = %ctx.attempt_id,
                    %error,
                    "failed to record attempt outcome; lease expiry will allow resumption"
                );
                Ok(())
            }
        }
    }
}

fn stage_boundary(ctx: &RunContext<'_>, next: PipelineStage) -> Result<(), StageStop> {
    if ctx.cancellation.is_cancelled() {
        info!(
            request_id = %ctx.request_id,
            attempt_id = %ctx.attempt_id,
            stage = %next,
            "run cancelled at stage boundary"
        );
        return Err(StageStop::Failed(mapping::cancelled(next, 0)));
    }
    Ok(())
}
