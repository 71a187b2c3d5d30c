//! Behaviour tests for the story generation pipeline.
//!
//! Scenarios drive the real pipeline against in-memory storage and scripted
//! providers, counting provider calls to prove completed stages are reused.

use std::sync::Arc;

use lullaby_backend::domain::ports::{
    GenerationOutcome, ModerationError, ProviderError, StoryGenerationCommand,
    StoryGenerationQuery, SubmitStoryRequest,
};
use lullaby_backend::domain::{Error, RequestId, SafetyVerdict, StoryId};
use lullaby_backend::test_support::story_pipeline::{
    PipelineHarness, ScriptedAudioProvider, ScriptedModerationProvider,
};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, scenario, then, when};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct RuntimeHandle(Arc<Runtime>);

#[derive(Default, ScenarioState)]
struct StoryGenerationWorld {
    runtime: Slot<RuntimeHandle>,
    harness: Slot<Arc<PipelineHarness>>,
    request_id: Slot<RequestId>,
    last_result: Slot<Result<GenerationOutcome, Error>>,
    story_ids: Slot<Vec<StoryId>>,
}

impl StoryGenerationWorld {
    fn install(&self, harness: PipelineHarness) {
        let runtime = Runtime::new().expect("create runtime");
        self.runtime.set(RuntimeHandle(Arc::new(runtime)));
        self.harness.set(Arc::new(harness));
        self.request_id.set(RequestId::random());
        self.story_ids.set(Vec::new());
    }

    fn harness(&self) -> Arc<PipelineHarness> {
        self.harness.get().expect("pipeline should be set up")
    }

    fn request(&self) -> SubmitStoryRequest {
        let request_id = self.request_id.get().expect("request id should be set");
        self.harness().request(&request_id)
    }

    fn submit(&self, request: SubmitStoryRequest) {
        let RuntimeHandle(runtime) = self.runtime.get().expect("runtime should be set");
        let harness = self.harness();
        let result =
            runtime.block_on(harness.pipeline.submit(request, CancellationToken::new()));

        if let Some(story) = result.as_ref().ok().and_then(|outcome| outcome.story.as_ref()) {
            let mut ids = self.story_ids.get().unwrap_or_default();
            ids.push(story.id().clone());
            self.story_ids.set(ids);
        }
        self.last_result.set(result);
    }

    fn outcome(&self) -> GenerationOutcome {
        self.last_result
            .get()
            .expect("a submission should have run")
            .expect("submission should produce an outcome")
    }
}

#[fixture]
fn world() -> StoryGenerationWorld {
    StoryGenerationWorld::default()
}

#[given("a story pipeline with healthy providers")]
fn a_story_pipeline_with_healthy_providers(world: &StoryGenerationWorld) {
    world.install(PipelineHarness::builder().build());
}

#[given("a story pipeline whose moderator flags the text as {code}")]
fn a_story_pipeline_whose_moderator_flags_the_text(world: &StoryGenerationWorld, code: String) {
    let moderation = ScriptedModerationProvider::default()
        .then(Ok::<_, ModerationError>(SafetyVerdict::unsafe_with([code])));
    world.install(PipelineHarness::builder().moderation(moderation).build());
}

#[given("a story pipeline whose audio provider fails {failures} times")]
fn a_story_pipeline_whose_audio_provider_fails(world: &StoryGenerationWorld, failures: usize) {
    let audio = (0..failures).fold(ScriptedAudioProvider::default(), |audio, attempt| {
        audio.then(Err(ProviderError::unavailable(format!(
            "speech service returned 503 (attempt {attempt})"
        ))))
    });
    world.install(PipelineHarness::builder().audio(audio).build());
}

#[when("the parent submits a story request")]
fn the_parent_submits_a_story_request(world: &StoryGenerationWorld) {
    world.submit(world.request());
}

#[when("the parent resubmits the same request")]
fn the_parent_resubmits_the_same_request(world: &StoryGenerationWorld) {
    world.submit(world.request());
}

#[when("the parent reuses the request id with a different moral")]
fn the_parent_reuses_the_request_id_with_a_different_moral(world: &StoryGenerationWorld) {
    let mut request = world.request();
    request.prompt_details.moral = Some("patience".to_owned());
    world.submit(request);
}

#[then("the outcome status is {status}")]
fn the_outcome_status_is(world: &StoryGenerationWorld, status: String) {
    let outcome = world.outcome();
    assert_eq!(
        serde_json::to_value(outcome.status).expect("serialise status"),
        serde_json::Value::String(status),
        "unexpected outcome: {outcome:?}"
    );
}

#[then("the stored story carries the narration reference")]
fn the_stored_story_carries_the_narration_reference(world: &StoryGenerationWorld) {
    let harness = world.harness();
    let outcome = world.outcome();
    let story = outcome.story.expect("succeeded outcome carries the story");
    assert!(story.safety_verdict());
    assert_eq!(story.audio_reference(), "audio://stories/fixture.mp3");
    assert_eq!(story.estimated_duration_seconds(), 42);

    let RuntimeHandle(runtime) = world.runtime.get().expect("runtime should be set");
    let stored = runtime
        .block_on(harness.pipeline.get_story(&harness.owner, story.id()))
        .expect("owner can read the story");
    assert_eq!(stored, story);
    assert_eq!(harness.store.story_count(), 1);
}

#[then("each provider was called once")]
fn each_provider_was_called_once(world: &StoryGenerationWorld) {
    let harness = world.harness();
    assert_eq!(harness.text.calls(), 1);
    assert_eq!(harness.moderation.calls(), 1);
    assert_eq!(harness.audio.calls(), 1);
}

#[then("the outcome lists reason code {code}")]
fn the_outcome_lists_reason_code(world: &StoryGenerationWorld, code: String) {
    assert!(world.outcome().reason_codes.contains(&code));
}

#[then("the text provider was called {count} times")]
fn the_text_provider_was_called(world: &StoryGenerationWorld, count: usize) {
    assert_eq!(world.harness().text.calls(), count);
}

#[then("the audio provider was called {count} times")]
fn the_audio_provider_was_called(world: &StoryGenerationWorld, count: usize) {
    assert_eq!(world.harness().audio.calls(), count);
}

#[then("no story is stored")]
fn no_story_is_stored(world: &StoryGenerationWorld) {
    let outcome = world.outcome();
    assert!(outcome.story.is_none());
    assert_eq!(world.harness().store.story_count(), 0);
}

#[then("the outcome is retryable at stage {stage}")]
fn the_outcome_is_retryable_at_stage(world: &StoryGenerationWorld, stage: String) {
    let outcome = world.outcome();
    assert!(outcome.retryable, "unexpected outcome: {outcome:?}");
    let recorded = outcome.stage.expect("failed outcome names its stage");
    assert_eq!(recorded.as_str(), stage);
}

#[then("every outcome references the same story")]
fn every_outcome_references_the_same_story(world: &StoryGenerationWorld) {
    let ids = world.story_ids.get().unwrap_or_default();
    assert!(ids.len() >= 2, "expected at least two successful outcomes");
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(world.harness().store.story_count(), 1);
}

#[then("the submission is rejected with code {code}")]
fn the_submission_is_rejected_with_code(world: &StoryGenerationWorld, code: String) {
    let error = world
        .last_result
        .get()
        .expect("a submission should have run")
        .expect_err("submission should be rejected");
    assert_eq!(
        serde_json::to_value(error.code()).expect("serialise code"),
        serde_json::Value::String(code)
    );
}

#[scenario(path = "tests/features/story_generation.feature")]
fn story_generation_scenarios(world: StoryGenerationWorld) {
    drop(world);
}
