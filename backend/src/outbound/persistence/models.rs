//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Conversions to and from domain types
//! report failures as plain messages; each repository wraps them in its own
//! query error.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use super::schema::{children, generation_attempts, stories};
use crate::domain::{
    AttemptFailure, AttemptId, AttemptState, ChildProfile, GenerationAttempt, GenerationRequest,
    PayloadHash, PipelineStage, StageCheckpoint, StageTransition, Story, StoryId, StoredStory,
};

/// Row struct for reading from the children table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = children)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ChildRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: Option<String>,
    pub age: Option<i16>,
    pub gender: Option<String>,
    pub interests: Vec<String>,
    pub friends: Vec<String>,
    pub favorite_characters: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ChildRow {
    pub(crate) fn into_profile(self) -> ChildProfile {
        ChildProfile {
            name: self.name,
            age: self.age.and_then(|age| u8::try_from(age).ok()),
            gender: self.gender,
            interests: self.interests,
            friends: self.friends,
            favorite_characters: self.favorite_characters,
        }
    }
}

/// Row struct for reading from the generation_attempts table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = generation_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AttemptRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub owner_id: Uuid,
    pub child_id: Uuid,
    pub request: Value,
    pub payload_hash: Vec<u8>,
    pub status: String,
    pub failure: Option<Value>,
    pub reason_codes: Vec<String>,
    pub story_id: Option<Uuid>,
    pub checkpoint: Value,
    pub transitions: Value,
    pub runs: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttemptRow {
    /// Rebuild the domain attempt, validating every encoded column.
    pub(crate) fn into_domain(self) -> Result<GenerationAttempt, String> {
        let request: GenerationRequest = serde_json::from_value(self.request)
            .map_err(|err| format!("invalid request snapshot: {err}"))?;
        if request.request_id().as_uuid() != &self.request_id {
            return Err(format!(
                "request snapshot does not match request id {}",
                self.request_id
            ));
        }
        let payload_hash =
            PayloadHash::try_from_bytes(&self.payload_hash).map_err(|err| err.to_string())?;
        let state = decode_state(&self.status, self.failure, self.reason_codes, self.story_id)?;
        let checkpoint: StageCheckpoint = serde_json::from_value(self.checkpoint)
            .map_err(|err| format!("invalid checkpoint: {err}"))?;
        let transitions: Vec<StageTransition> = serde_json::from_value(self.transitions)
            .map_err(|err| format!("invalid transitions: {err}"))?;
        let runs = u32::try_from(self.runs).map_err(|_| format!("negative runs {}", self.runs))?;

        Ok(GenerationAttempt {
            id: AttemptId::from_uuid(self.id),
            request,
            payload_hash,
            state,
            checkpoint,
            transitions,
            runs,
            lease_expires_at: self.lease_expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn decode_state(
    status: &str,
    failure: Option<Value>,
    reason_codes: Vec<String>,
    story_id: Option<Uuid>,
) -> Result<AttemptState, String> {
    match status {
        "succeeded" => story_id
            .map(|id| AttemptState::Succeeded {
                story_id: StoryId::from_uuid(id),
            })
            .ok_or_else(|| "succeeded attempt has no story id".to_owned()),
        "unsafe" => Ok(AttemptState::Unsafe { reason_codes }),
        "failed" => {
            let failure = failure.ok_or_else(|| "failed attempt has no failure".to_owned())?;
            serde_json::from_value::<AttemptFailure>(failure)
                .map(AttemptState::Failed)
                .map_err(|err| format!("invalid failure: {err}"))
        }
        other => PipelineStage::from_str(other)
            .map(AttemptState::Active)
            .map_err(|err| err.to_string()),
    }
}

/// State columns shared by inserts and updates.
struct EncodedState {
    status: String,
    failure: Option<Value>,
    reason_codes: Vec<String>,
    story_id: Option<Uuid>,
}

fn encode_state(state: &AttemptState) -> Result<EncodedState, String> {
    let mut encoded = EncodedState {
        status: state.status_name().to_owned(),
        failure: None,
        reason_codes: Vec::new(),
        story_id: None,
    };
    match state {
        AttemptState::Active(_) => {}
        AttemptState::Succeeded { story_id } => encoded.story_id = Some(*story_id.as_uuid()),
        AttemptState::Unsafe { reason_codes } => encoded.reason_codes = reason_codes.clone(),
        AttemptState::Failed(failure) => {
            encoded.failure =
                Some(serde_json::to_value(failure).map_err(|err| err.to_string())?);
        }
    }
    Ok(encoded)
}

/// `runs` as stored; also the fencing token for attempt writes.
pub(crate) fn runs_column(runs: u32) -> i32 {
    i32::try_from(runs).unwrap_or(i32::MAX)
}

/// Insertable struct for creating attempts.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = generation_attempts)]
pub(crate) struct NewAttemptRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub owner_id: Uuid,
    pub child_id: Uuid,
    pub request: Value,
    pub payload_hash: Vec<u8>,
    pub status: String,
    pub failure: Option<Value>,
    pub reason_codes: Vec<String>,
    pub story_id: Option<Uuid>,
    pub checkpoint: Value,
    pub transitions: Value,
    pub runs: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewAttemptRow {
    pub(crate) fn from_domain(attempt: &GenerationAttempt) -> Result<Self, String> {
        let encoded = encode_state(&attempt.state)?;
        Ok(Self {
            id: *attempt.id.as_uuid(),
            request_id: *attempt.request_id().as_uuid(),
            owner_id: *attempt.request.owner_id().as_uuid(),
            child_id: *attempt.request.child_id().as_uuid(),
            request: serde_json::to_value(&attempt.request).map_err(|err| err.to_string())?,
            payload_hash: attempt.payload_hash.as_bytes().to_vec(),
            status: encoded.status,
            failure: encoded.failure,
            reason_codes: encoded.reason_codes,
            story_id: encoded.story_id,
            checkpoint: serde_json::to_value(&attempt.checkpoint)
                .map_err(|err| err.to_string())?,
            transitions: serde_json::to_value(&attempt.transitions)
                .map_err(|err| err.to_string())?,
            runs: runs_column(attempt.runs),
            lease_expires_at: attempt.lease_expires_at,
            created_at: attempt.created_at,
            updated_at: attempt.updated_at,
        })
    }
}

/// Changeset written on checkpoint and close.
///
/// `runs` is absent: only lease acquisition increments it. Writers filter on
/// it instead, so a superseded run updates nothing.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = generation_attempts)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct AttemptChanges {
    pub status: String,
    pub failure: Option<Value>,
    pub reason_codes: Vec<String>,
    pub story_id: Option<Uuid>,
    pub checkpoint: Value,
    pub transitions: Value,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AttemptChanges {
    pub(crate) fn from_domain(attempt: &GenerationAttempt) -> Result<Self, String> {
        let encoded = encode_state(&attempt.state)?;
        Ok(Self {
            status: encoded.status,
            failure: encoded.failure,
            reason_codes: encoded.reason_codes,
            story_id: encoded.story_id,
            checkpoint: serde_json::to_value(&attempt.checkpoint)
                .map_err(|err| err.to_string())?,
            transitions: serde_json::to_value(&attempt.transitions)
                .map_err(|err| err.to_string())?,
            lease_expires_at: attempt.lease_expires_at,
            updated_at: attempt.updated_at,
        })
    }
}

/// Row struct for reading from the stories table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = stories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct StoryRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub attempt_id: Uuid,
    pub child_id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub story_text: String,
    pub audio_reference: String,
    pub safety_verdict: bool,
    pub word_count: i32,
    pub estimated_duration_seconds: i32,
    pub prompt_parameters_used: Value,
    pub created_at: DateTime<Utc>,
}

impl StoryRow {
    pub(crate) fn into_domain(self) -> Result<Story, String> {
        let prompt_parameters_used: GenerationRequest =
            serde_json::from_value(self.prompt_parameters_used)
                .map_err(|err| format!("invalid prompt parameters: {err}"))?;
        Story::restore(StoredStory {
            id: StoryId::from_uuid(self.id),
            attempt_id: AttemptId::from_uuid(self.attempt_id),
            title: self.title,
            story_text: self.story_text,
            audio_reference: self.audio_reference,
            safety_verdict: self.safety_verdict,
            word_count: u32::try_from(self.word_count).unwrap_or(0),
            estimated_duration_seconds: u32::try_from(self.estimated_duration_seconds)
                .unwrap_or(0),
            prompt_parameters_used,
            created_at: self.created_at,
        })
        .map_err(|err| err.to_string())
    }
}

/// Insertable struct for committing stories.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stories)]
pub(crate) struct NewStoryRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub attempt_id: Uuid,
    pub child_id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub story_text: String,
    pub audio_reference: String,
    pub safety_verdict: bool,
    pub word_count: i32,
    pub estimated_duration_seconds: i32,
    pub prompt_parameters_used: Value,
    pub created_at: DateTime<Utc>,
}

impl NewStoryRow {
    pub(crate) fn from_domain(story: &Story) -> Result<Self, String> {
        Ok(Self {
            id: *story.id().as_uuid(),
            request_id: *story.request_id().as_uuid(),
            attempt_id: *story.attempt_id().as_uuid(),
            child_id: *story.child_id().as_uuid(),
            owner_id: *story.owner_id().as_uuid(),
            title: story.title().to_owned(),
            story_text: story.story_text().to_owned(),
            audio_reference: story.audio_reference().to_owned(),
            safety_verdict: story.safety_verdict(),
            word_count: i32::try_from(story.word_count()).unwrap_or(i32::MAX),
            estimated_duration_seconds: i32::try_from(story.estimated_duration_seconds())
                .unwrap_or(i32::MAX),
            prompt_parameters_used: serde_json::to_value(story.prompt_parameters_used())
                .map_err(|err| err.to_string())?,
            created_at: story.created_at(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ApprovedText, AudioResult, ChildId, FailureReason, GeneratedText, PromptDetails,
        RequestId, SafetyVerdict, UserId, VoicePreference,
    };
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[fixture]
    fn attempt() -> GenerationAttempt {
        let request = GenerationRequest::new(
            RequestId::random(),
            UserId::random(),
            ChildId::random(),
            ChildProfile {
                name: Some("Mira".to_owned()),
                ..ChildProfile::default()
            },
            PromptDetails::default(),
            VoicePreference::default(),
        );
        GenerationAttempt::create(request, PayloadHash::from_bytes([7; 32]), now())
    }

    fn read_back(row: NewAttemptRow) -> AttemptRow {
        AttemptRow {
            id: row.id,
            request_id: row.request_id,
            owner_id: row.owner_id,
            child_id: row.child_id,
            request: row.request,
            payload_hash: row.payload_hash,
            status: row.status,
            failure: row.failure,
            reason_codes: row.reason_codes,
            story_id: row.story_id,
            checkpoint: row.checkpoint,
            transitions: row.transitions,
            runs: row.runs,
            lease_expires_at: row.lease_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    #[rstest]
    #[case::active(AttemptState::Active(PipelineStage::Synthesizing))]
    #[case::succeeded(AttemptState::Succeeded { story_id: StoryId::random() })]
    #[case::unsafe_verdict(AttemptState::Unsafe { reason_codes: vec!["violence".to_owned()] })]
    #[case::failed(AttemptState::Failed(AttemptFailure {
        stage: PipelineStage::Synthesizing,
        reason: FailureReason::ProviderTimeout,
        retryable: true,
        calls: 3,
        message: "no response".to_owned(),
    }))]
    fn attempt_rows_preserve_state(mut attempt: GenerationAttempt, #[case] state: AttemptState) {
        attempt.state = state.clone();
        attempt.checkpoint.text = Some(GeneratedText {
            text: "Once upon a time".to_owned(),
            token_count: 4,
        });
        attempt.runs = 2;

        let row = NewAttemptRow::from_domain(&attempt).expect("encodes");
        let restored = read_back(row).into_domain().expect("decodes");

        assert_eq!(restored.state, state);
        assert_eq!(restored, attempt);
    }

    #[rstest]
    fn unknown_status_is_rejected(attempt: GenerationAttempt) {
        let mut row = read_back(NewAttemptRow::from_domain(&attempt).expect("encodes"));
        row.status = "exploded".to_owned();

        let err = row.into_domain().expect_err("unknown status");
        assert!(err.contains("exploded"));
    }

    #[rstest]
    fn failed_status_requires_failure_payload(attempt: GenerationAttempt) {
        let mut row = read_back(NewAttemptRow::from_domain(&attempt).expect("encodes"));
        row.status = "failed".to_owned();

        assert!(row.into_domain().is_err());
    }

    #[rstest]
    fn unsafe_story_rows_are_refused(attempt: GenerationAttempt) {
        let approved = ApprovedText::from_verdict(
            GeneratedText {
                text: "Mira flew to the moon.".to_owned(),
                token_count: 5,
            },
            &SafetyVerdict::safe(),
        )
        .expect("safe text");
        let story = Story::compose(
            &attempt.request,
            attempt.id.clone(),
            "Mira and the Moon",
            approved,
            AudioResult {
                reference: "audio://moon".to_owned(),
                duration_seconds: Some(12),
            },
            now(),
        );
        let new_row = NewStoryRow::from_domain(&story).expect("encodes");
        let row = StoryRow {
            id: new_row.id,
            request_id: new_row.request_id,
            attempt_id: new_row.attempt_id,
            child_id: new_row.child_id,
            owner_id: new_row.owner_id,
            title: new_row.title,
            story_text: new_row.story_text,
            audio_reference: new_row.audio_reference,
            safety_verdict: false,
            word_count: new_row.word_count,
            estimated_duration_seconds: new_row.estimated_duration_seconds,
            prompt_parameters_used: new_row.prompt_parameters_used,
            created_at: new_row.created_at,
        };

        assert!(row.into_domain().is_err());
    }
}
