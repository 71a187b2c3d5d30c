//! Shared test doubles for story pipeline tests.
//!
//! Providers replay a script of responses and count every call, so tests can
//! assert that completed billable stages are never repeated.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::domain::ports::{
    AudioSynthesisProvider, ModerationError, ModerationProvider, ProviderError, StoryRepository,
    StoryRepositoryError, SubmitStoryRequest, TextGenerationProvider,
};
use crate::domain::{
    AudioResult, BackoffJitter, ChildId, ChildProfile, GeneratedText, GenerationAttempt,
    GenerationPayload, PipelineSleeper, PromptDetails, RequestId, SafetyVerdict, Story, StoryId,
    StoryPipeline, StoryPipelineConfig, StoryPipelinePorts, StoryPipelineRuntime, UserId,
    VoicePreference, count_words,
};
use crate::outbound::memory::InMemoryStoryStore;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test double mutex poisoned"),
    }
}

pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *lock(&self.0) += delta;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl PipelineSleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
pub struct RecordingSleeper(pub Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.0).clone()
    }
}

#[async_trait]
impl PipelineSleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.0).push(duration);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BackoffJitter for NoJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32, _now: DateTime<Utc>) -> Duration {
        base
    }
}

/// Queue of canned responses, falling back to a default once drained.
struct Script<T, E> {
    queued: Mutex<VecDeque<Result<T, E>>>,
    fallback: Result<T, E>,
    calls: AtomicUsize,
}

impl<T: Clone, E: Clone> Script<T, E> {
    fn new(fallback: Result<T, E>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, response: Result<T, E>) {
        lock(&self.queued).push_back(response);
    }

    fn next(&self) -> Result<T, E> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.queued)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Holds a provider call open until the test releases it.
#[derive(Default)]
pub struct StageGate {
    entered: Notify,
    release: Notify,
}

impl StageGate {
    /// Wait until the gated call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the gated call finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

pub fn story_text(text: &str) -> GeneratedText {
    GeneratedText {
        text: text.to_owned(),
        token_count: count_words(text),
    }
}

/// Text provider replaying scripted results.
pub struct ScriptedTextProvider {
    script: Script<GeneratedText, ProviderError>,
    prompts: Mutex<Vec<String>>,
    cancel_on_call: Mutex<Option<CancellationToken>>,
    gate: Mutex<Option<Arc<StageGate>>>,
}

impl Default for ScriptedTextProvider {
    fn default() -> Self {
        Self {
            script: Script::new(Ok(story_text(
                "Mira and Leo watched the stars until their eyes grew heavy. Goodnight.",
            ))),
            prompts: Mutex::new(Vec::new()),
            cancel_on_call: Mutex::new(None),
            gate: Mutex::new(None),
        }
    }
}

impl ScriptedTextProvider {
    pub fn then(self, response: Result<GeneratedText, ProviderError>) -> Self {
        self.script.push(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Cancel `token` when the provider is first called.
    pub fn cancel_when_called(&self, token: CancellationToken) {
        *lock(&self.cancel_on_call) = Some(token);
    }

    /// Block the next call until the returned gate is released.
    pub fn gate_next_call(&self) -> Arc<StageGate> {
        let gate = Arc::new(StageGate::default());
        *lock(&self.gate) = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl TextGenerationProvider for ScriptedTextProvider {
    async fn generate(
        &self,
        payload: &GenerationPayload,
        _timeout: Duration,
    ) -> Result<GeneratedText, ProviderError> {
        lock(&self.prompts).push(payload.prompt.clone());
        if let Some(token) = lock(&self.cancel_on_call).take() {
            token.cancel();
        }
        let gate = lock(&self.gate).take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.script.next()
    }
}

/// Moderator replaying scripted verdicts.
pub struct ScriptedModerationProvider {
    script: Script<SafetyVerdict, ModerationError>,
}

impl Default for ScriptedModerationProvider {
    fn default() -> Self {
        Self {
            script: Script::new(Ok(SafetyVerdict::safe())),
        }
    }
}

impl ScriptedModerationProvider {
    pub fn then(self, response: Result<SafetyVerdict, ModerationError>) -> Self {
        self.script.push(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl ModerationProvider for ScriptedModerationProvider {
    async fn moderate(
        &self,
        _text: &str,
        _timeout: Duration,
    ) -> Result<SafetyVerdict, ModerationError> {
        self.script.next()
    }
}

/// Audio provider replaying scripted results.
///
/// With [`ScriptedAudioProvider::hanging`] every call waits forever, leaving
/// the pipeline's timeout to end it.
pub struct ScriptedAudioProvider {
    script: Script<AudioResult, ProviderError>,
    texts: Mutex<Vec<String>>,
    hang: bool,
}

impl Default for ScriptedAudioProvider {
    fn default() -> Self {
        Self {
            script: Script::new(Ok(AudioResult {
                reference: "audio://stories/fixture.mp3".to_owned(),
                duration_seconds: Some(42),
            })),
            texts: Mutex::new(Vec::new()),
            hang: false,
        }
    }
}

impl ScriptedAudioProvider {
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn then(self, response: Result<AudioResult, ProviderError>) -> Self {
        self.script.push(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn texts(&self) -> Vec<String> {
        lock(&self.texts).clone()
    }
}

#[async_trait]
impl AudioSynthesisProvider for ScriptedAudioProvider {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoicePreference,
        _timeout: Duration,
    ) -> Result<AudioResult, ProviderError> {
        lock(&self.texts).push(text.to_owned());
        let response = self.script.next();
        if self.hang {
            std::future::pending::<()>().await;
        }
        response
    }
}

/// Story repository failing the first `failures` commits before delegating.
pub struct FlakyStoryRepository {
    inner: Arc<InMemoryStoryStore>,
    remaining_failures: AtomicUsize,
    commits: AtomicUsize,
}

impl FlakyStoryRepository {
    pub fn new(inner: Arc<InMemoryStoryStore>, failures: usize) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(failures),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryRepository for FlakyStoryRepository {
    async fn commit_story(
        &self,
        story: &Story,
        attempt: &GenerationAttempt,
    ) -> Result<StoryId, StoryRepositoryError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoryRepositoryError::connection("database unavailable"));
        }
        self.inner.commit_story(story, attempt).await
    }

    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Story>, StoryRepositoryError> {
        self.inner.find_by_request(request_id).await
    }

    async fn find_by_id(&self, story_id: &StoryId) -> Result<Option<Story>, StoryRepositoryError> {
        self.inner.find_by_id(story_id).await
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Story>, StoryRepositoryError> {
        self.inner.list_by_owner(owner).await
    }
}

pub fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 19, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("fixture timestamp must be valid"))
}

/// The profile used throughout the pipeline scenarios.
pub fn mira_profile() -> ChildProfile {
    ChildProfile {
        name: Some("Mira".to_owned()),
        age: Some(6),
        gender: None,
        interests: vec!["space".to_owned()],
        friends: vec!["Leo".to_owned()],
        favorite_characters: Vec::new(),
    }
}

pub fn zoo_details() -> PromptDetails {
    PromptDetails {
        daily_event: Some("went to the zoo".to_owned()),
        friend_name: Some("Leo".to_owned()),
        moral: Some("sharing".to_owned()),
        ..PromptDetails::default()
    }
}

/// A pipeline wired to the in-memory store and scripted providers.
pub struct PipelineHarness {
    pub store: Arc<InMemoryStoryStore>,
    pub stories: Arc<FlakyStoryRepository>,
    pub text: Arc<ScriptedTextProvider>,
    pub moderation: Arc<ScriptedModerationProvider>,
    pub audio: Arc<ScriptedAudioProvider>,
    pub clock: Arc<MutableClock>,
    pub sleeper: Arc<RecordingSleeper>,
    pub pipeline: Arc<StoryPipeline>,
    pub owner: UserId,
    pub child: ChildId,
}

/// Builder for [`PipelineHarness`].
pub struct PipelineHarnessBuilder {
    text: ScriptedTextProvider,
    moderation: ScriptedModerationProvider,
    audio: ScriptedAudioProvider,
    commit_failures: usize,
    profile: ChildProfile,
    config: StoryPipelineConfig,
}

impl Default for PipelineHarnessBuilder {
    fn default() -> Self {
        Self {
            text: ScriptedTextProvider::default(),
            moderation: ScriptedModerationProvider::default(),
            audio: ScriptedAudioProvider::default(),
            commit_failures: 0,
            profile: mira_profile(),
            config: StoryPipelineConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_millis(400),
                provider_timeout: Duration::from_secs(5),
                lease_duration: Duration::from_secs(60),
            },
        }
    }
}

impl PipelineHarnessBuilder {
    pub fn text(mut self, text: ScriptedTextProvider) -> Self {
        self.text = text;
        self
    }

    pub fn moderation(mut self, moderation: ScriptedModerationProvider) -> Self {
        self.moderation = moderation;
        self
    }

    pub fn audio(mut self, audio: ScriptedAudioProvider) -> Self {
        self.audio = audio;
        self
    }

    pub fn commit_failures(mut self, failures: usize) -> Self {
        self.commit_failures = failures;
        self
    }

    pub fn profile(mut self, profile: ChildProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn config(mut self, config: StoryPipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> PipelineHarness {
        let store = Arc::new(InMemoryStoryStore::new());
        let owner = UserId::random();
        let child = ChildId::random();
        store.insert_child(child.clone(), owner.clone(), self.profile);

        let stories = Arc::new(FlakyStoryRepository::new(
            Arc::clone(&store),
            self.commit_failures,
        ));
        let text = Arc::new(self.text);
        let moderation = Arc::new(self.moderation);
        let audio = Arc::new(self.audio);
        let clock = Arc::new(MutableClock::new(fixture_now()));
        let sleeper = Arc::new(RecordingSleeper::default());

        let pipeline = StoryPipeline::with_runtime(
            StoryPipelinePorts::new(
                store.clone(),
                store.clone(),
                stories.clone(),
                text.clone(),
                moderation.clone(),
                audio.clone(),
            ),
            clock.clone(),
            StoryPipelineRuntime {
                sleeper: sleeper.clone(),
                jitter: Arc::new(NoJitter),
            },
            self.config,
        );

        PipelineHarness {
            store,
            stories,
            text,
            moderation,
            audio,
            clock,
            sleeper,
            pipeline: Arc::new(pipeline),
            owner,
            child,
        }
    }
}

impl PipelineHarness {
    pub fn builder() -> PipelineHarnessBuilder {
        PipelineHarnessBuilder::default()
    }

    /// A submission for the harness child with the zoo prompt details.
    pub fn request(&self, request_id: &RequestId) -> SubmitStoryRequest {
        SubmitStoryRequest {
            request_id: request_id.clone(),
            owner_id: self.owner.clone(),
            child_id: self.child.clone(),
            prompt_details: zoo_details(),
            voice: VoicePreference {
                voice_id: Some("calm-narrator".to_owned()),
            },
        }
    }
}
