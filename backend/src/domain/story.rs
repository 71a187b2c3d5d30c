//! Generation requests and the stories they produce.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::payload_hash::{PayloadHash, PayloadHashError, canonicalize_and_hash};
use super::{
    ApprovedText, AttemptId, AudioResult, ChildId, ChildProfile, RequestId, StoryId, UserId,
};

/// Narration speed used when the audio provider reports no duration.
pub const NARRATION_WORDS_PER_MINUTE: u32 = 150;

/// Caller-supplied narrative parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "found a lost kitten")]
    pub daily_event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Theo")]
    pub friend_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "honesty")]
    pub moral: Option<String>,
    /// Additional named story hints such as a setting or favourite toy.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub free_form: BTreeMap<String, String>,
}

/// Narration voice requested by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoicePreference {
    /// Provider voice identifier; `None` selects the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

/// Inputs that identify a submission for idempotency purposes.
///
/// The child profile snapshot is excluded: it is read from the profile store
/// when the attempt is first created and later edits must not make a
/// resubmission look like a different request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFingerprint<'a> {
    pub child_id: &'a ChildId,
    pub prompt_details: &'a PromptDetails,
    pub voice: &'a VoicePreference,
}

impl SubmissionFingerprint<'_> {
    /// Hash the canonical JSON form of the submission.
    pub fn hash(&self) -> Result<PayloadHash, PayloadHashError> {
        let value =
            serde_json::to_value(self).map_err(|err| PayloadHashError::Serialization {
                message: err.to_string(),
            })?;
        canonicalize_and_hash(&value)
    }
}

/// Immutable request for one story, snapshotting the child profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[schema(value_type = String, format = Uuid)]
    request_id: RequestId,
    #[schema(value_type = String, format = Uuid)]
    owner_id: UserId,
    #[schema(value_type = String, format = Uuid)]
    child_id: ChildId,
    child_profile: ChildProfile,
    prompt_details: PromptDetails,
    #[serde(default)]
    voice: VoicePreference,
}

impl GenerationRequest {
    /// Capture a request from its parts.
    pub fn new(
        request_id: RequestId,
        owner_id: UserId,
        child_id: ChildId,
        child_profile: ChildProfile,
        prompt_details: PromptDetails,
        voice: VoicePreference,
    ) -> Self {
        Self {
            request_id,
            owner_id,
            child_id,
            child_profile,
            prompt_details,
            voice,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    pub fn child_id(&self) -> &ChildId {
        &self.child_id
    }

    pub fn child_profile(&self) -> &ChildProfile {
        &self.child_profile
    }

    pub fn prompt_details(&self) -> &PromptDetails {
        &self.prompt_details
    }

    pub fn voice(&self) -> &VoicePreference {
        &self.voice
    }

    /// Idempotency fingerprint of the caller-supplied parts.
    pub fn fingerprint(&self) -> SubmissionFingerprint<'_> {
        SubmissionFingerprint {
            child_id: &self.child_id,
            prompt_details: &self.prompt_details,
            voice: &self.voice,
        }
    }
}

/// A generated, moderated, and narrated bedtime story.
///
/// ## Invariants
/// - `safety_verdict` is always `true`; construction requires
///   [`ApprovedText`].
/// - Stories are never updated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    #[schema(value_type = String, format = Uuid)]
    id: StoryId,
    #[schema(value_type = String, format = Uuid)]
    request_id: RequestId,
    #[schema(value_type = String, format = Uuid)]
    attempt_id: AttemptId,
    #[schema(value_type = String, format = Uuid)]
    child_id: ChildId,
    #[serde(skip)]
    owner_id: UserId,
    title: String,
    story_text: String,
    #[schema(example = "audio://abc123")]
    audio_reference: String,
    safety_verdict: bool,
    word_count: u32,
    estimated_duration_seconds: u32,
    prompt_parameters_used: GenerationRequest,
    created_at: DateTime<Utc>,
}

/// Column values for rebuilding a [`Story`] from storage.
#[derive(Debug, Clone)]
pub struct StoredStory {
    pub id: StoryId,
    pub attempt_id: AttemptId,
    pub title: String,
    pub story_text: String,
    pub audio_reference: String,
    pub safety_verdict: bool,
    pub word_count: u32,
    pub estimated_duration_seconds: u32,
    pub prompt_parameters_used: GenerationRequest,
    pub created_at: DateTime<Utc>,
}

/// Rejected attempt to load a story whose stored verdict is not safe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stored story {story_id} is not marked safe")]
pub struct UnsafeStoredStory {
    pub story_id: StoryId,
}

impl Story {
    /// Compose a story from approved text and narrated audio.
    pub fn compose(
        request: &GenerationRequest,
        attempt_id: AttemptId,
        title: impl Into<String>,
        text: ApprovedText,
        audio: AudioResult,
        created_at: DateTime<Utc>,
    ) -> Self {
        let story_text = text.into_inner().text;
        let word_count = count_words(&story_text);
        let estimated_duration_seconds = audio
            .duration_seconds
            .unwrap_or_else(|| estimate_narration_seconds(word_count));
        Self {
            id: StoryId::random(),
            request_id: request.request_id.clone(),
            attempt_id,
            child_id: request.child_id.clone(),
            owner_id: request.owner_id.clone(),
            title: title.into(),
            story_text,
            audio_reference: audio.reference,
            safety_verdict: true,
            word_count,
            estimated_duration_seconds,
            prompt_parameters_used: request.clone(),
            created_at,
        }
    }

    /// Rebuild a story loaded from storage.
    pub fn restore(stored: StoredStory) -> Result<Self, UnsafeStoredStory> {
        if !stored.safety_verdict {
            return Err(UnsafeStoredStory {
                story_id: stored.id,
            });
        }
        let request = stored.prompt_parameters_used;
        Ok(Self {
            id: stored.id,
            request_id: request.request_id.clone(),
            attempt_id: stored.attempt_id,
            child_id: request.child_id.clone(),
            owner_id: request.owner_id.clone(),
            title: stored.title,
            story_text: stored.story_text,
            audio_reference: stored.audio_reference,
            safety_verdict: true,
            word_count: stored.word_count,
            estimated_duration_seconds: stored.estimated_duration_seconds,
            prompt_parameters_used: request,
            created_at: stored.created_at,
        })
    }

    pub fn id(&self) -> &StoryId {
        &self.id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    pub fn child_id(&self) -> &ChildId {
        &self.child_id
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn story_text(&self) -> &str {
        &self.story_text
    }

    pub fn audio_reference(&self) -> &str {
        &self.audio_reference
    }

    pub fn safety_verdict(&self) -> bool {
        self.safety_verdict
    }

    pub fn word_count(&self) -> u32 {
        self.word_count
    }

    pub fn estimated_duration_seconds(&self) -> u32 {
        self.estimated_duration_seconds
    }

    pub fn prompt_parameters_used(&self) -> &GenerationRequest {
        &self.prompt_parameters_used
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Count whitespace-separated words.
pub fn count_words(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

/// Estimate narration length at [`NARRATION_WORDS_PER_MINUTE`], rounding up.
pub fn estimate_narration_seconds(word_count: u32) -> u32 {
    let seconds = u64::from(word_count) * 60;
    let per_minute = u64::from(NARRATION_WORDS_PER_MINUTE);
    u32::try_from(seconds.div_ceil(per_minute)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GeneratedText, SafetyVerdict};
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn request() -> GenerationRequest {
        GenerationRequest::new(
            RequestId::random(),
            UserId::random(),
            ChildId::random(),
            ChildProfile {
                name: Some("Mira".to_owned()),
                ..ChildProfile::default()
            },
            PromptDetails {
                moral: Some("honesty".to_owned()),
                ..PromptDetails::default()
            },
            VoicePreference::default(),
        )
    }

    fn approved(text: &str) -> ApprovedText {
        ApprovedText::from_verdict(
            GeneratedText {
                text: text.to_owned(),
                token_count: 0,
            },
            &SafetyVerdict::safe(),
        )
        .expect("safe verdict approves text")
    }

    #[rstest]
    #[case("", 0)]
    #[case("one", 1)]
    #[case("  Mira  found\na kitten\t today ", 5)]
    fn counts_whitespace_separated_words(#[case] text: &str, #[case] expected: u32) {
        assert_eq!(count_words(text), expected);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(150, 60)]
    #[case(151, 61)]
    #[case(75, 30)]
    fn estimates_duration_at_narration_speed(#[case] words: u32, #[case] seconds: u32) {
        assert_eq!(estimate_narration_seconds(words), seconds);
    }

    #[rstest]
    fn compose_prefers_provider_duration(request: GenerationRequest) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 19, 0, 0).single().expect("valid");
        let story = Story::compose(
            &request,
            AttemptId::random(),
            "A Bedtime Story for Mira",
            approved("The stars came out one by one"),
            AudioResult {
                reference: "audio://abc123".to_owned(),
                duration_seconds: Some(42),
            },
            now,
        );

        assert!(story.safety_verdict());
        assert_eq!(story.word_count(), 7);
        assert_eq!(story.estimated_duration_seconds(), 42);
        assert_eq!(story.prompt_parameters_used(), &request);
        assert_eq!(story.request_id(), request.request_id());
    }

    #[rstest]
    fn restore_rejects_unsafe_rows(request: GenerationRequest) {
        let result = Story::restore(StoredStory {
            id: StoryId::random(),
            attempt_id: AttemptId::random(),
            title: "t".to_owned(),
            story_text: "text".to_owned(),
            audio_reference: "audio://x".to_owned(),
            safety_verdict: false,
            word_count: 1,
            estimated_duration_seconds: 1,
            prompt_parameters_used: request,
            created_at: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[rstest]
    fn fingerprint_ignores_profile_snapshot(request: GenerationRequest) {
        let edited = GenerationRequest::new(
            request.request_id().clone(),
            request.owner_id().clone(),
            request.child_id().clone(),
            ChildProfile {
                name: Some("Renamed".to_owned()),
                ..ChildProfile::default()
            },
            request.prompt_details().clone(),
            request.voice().clone(),
        );

        let original = request.fingerprint().hash().expect("hash");
        let after_edit = edited.fingerprint().hash().expect("hash");
        assert_eq!(original, after_edit);
    }
}
