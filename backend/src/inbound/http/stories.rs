//! Story generation HTTP handlers.
//!
//! ```text
//! POST /api/v1/children/{child_id}/stories
//! GET  /api/v1/story-generations/{request_id}
//! GET  /api/v1/stories
//! GET  /api/v1/stories/{story_id}
//! ```
//!
//! Submissions run the pipeline on a detached Tokio task. The handler holds a
//! cancellation drop guard, so a client that disconnects stops the run at its
//! next stage boundary while a commit already under way still completes.

use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, get, http::header, post, web};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::domain::ports::{GenerationOutcome, StoryGenerationCommand, SubmitStoryRequest};
use crate::domain::{
    ChildId, Error, PromptDetails, RequestId, Story, StoryId, TraceId, VoicePreference,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::error::status_for_outcome;
use crate::inbound::http::idempotency::resolve_request_id;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

/// Request payload for a story submission.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitStoryBody {
    #[serde(default)]
    pub prompt_details: PromptDetails,
    /// Narration voice; omitted selects the provider default.
    #[serde(default)]
    #[schema(example = "calm-narrator")]
    pub voice_id: Option<String>,
}

fn invalid_path_id(field: &str, value: &str) -> Error {
    Error::invalid_request(format!("{field} must be a valid uuid")).with_details(json!({
        "field": field,
        "value": value,
        "code": "invalid_identifier",
    }))
}

fn parse_child_id(raw: String) -> Result<ChildId, Error> {
    ChildId::new(&raw).map_err(|_| invalid_path_id("childId", &raw))
}

fn parse_request_id(raw: String) -> Result<RequestId, Error> {
    RequestId::new(&raw).map_err(|_| invalid_path_id("requestId", &raw))
}

fn parse_story_id(raw: String) -> Result<StoryId, Error> {
    StoryId::new(&raw).map_err(|_| invalid_path_id("storyId", &raw))
}

fn no_store() -> (header::HeaderName, &'static str) {
    (header::CACHE_CONTROL, "no-store")
}

/// Run the submission on its own task, cancelling it if this future is
/// dropped before the task finishes.
async fn run_detached(
    command: Arc<dyn StoryGenerationCommand>,
    submission: SubmitStoryRequest,
) -> Result<GenerationOutcome, Error> {
    let cancellation = CancellationToken::new();
    let guard = cancellation.clone().drop_guard();
    let trace_id = TraceId::current();
    let task = tokio::spawn(TraceId::propagate(trace_id, async move {
        command.submit(submission, cancellation).await
    }));

    let joined = task.await;
    guard.disarm();
    joined.map_err(|err| {
        error!(error = %err, "story generation task did not complete");
        Error::internal("story generation task failed")
    })?
}

/// Generate a bedtime story for one of the caller's children.
#[utoipa::path(
    post,
    path = "/api/v1/children/{child_id}/stories",
    description = "Run, resume, or replay story generation for the request id in \
        `Idempotency-Key`. Resubmitting a retryable failure resumes at the stage that failed.",
    params(
        ("child_id" = String, Path, description = "Child identifier (UUID)"),
        (
            "Idempotency-Key" = Option<String>, Header,
            description = "Request id (UUID); generated when absent"
        )
    ),
    request_body = SubmitStoryBody,
    responses(
        (status = 200, description = "Story generated", body = GenerationOutcome),
        (status = 400, description = "Invalid request or empty narrative", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Child belongs to another parent", body = Error),
        (status = 404, description = "Child not found", body = Error),
        (
            status = 409,
            description = "Another run owns the request id, or the id was reused with a different payload",
            body = GenerationOutcome
        ),
        (status = 422, description = "Story withheld by safety moderation", body = GenerationOutcome),
        (status = 502, description = "A provider refused the request", body = GenerationOutcome),
        (status = 503, description = "Retryable failure; resubmit the same request id", body = GenerationOutcome)
    ),
    tags = ["stories"],
    operation_id = "submitStory"
)]
#[post("/children/{child_id}/stories")]
pub async fn submit_story(
    state: web::Data<HttpState>,
    session: SessionContext,
    request: HttpRequest,
    path: web::Path<String>,
    payload: web::Json<SubmitStoryBody>,
) -> ApiResult<HttpResponse> {
    let owner = session.require_owner()?;
    let child_id = parse_child_id(path.into_inner())?;
    let request_id = resolve_request_id(request.headers())?;
    let body = payload.into_inner();
    info!(%request_id, %child_id, "story submission received");

    let submission = SubmitStoryRequest {
        request_id,
        owner_id: owner,
        child_id,
        prompt_details: body.prompt_details,
        voice: VoicePreference {
            voice_id: body.voice_id,
        },
    };
    let outcome = run_detached(state.stories.clone(), submission).await?;

    Ok(HttpResponse::build(status_for_outcome(&outcome))
        .insert_header(no_store())
        .json(outcome))
}

/// Poll the status of a story generation request.
#[utoipa::path(
    get,
    path = "/api/v1/story-generations/{request_id}",
    params(("request_id" = String, Path, description = "Request id (UUID)")),
    responses(
        (status = 200, description = "Current generation status", body = GenerationOutcome),
        (status = 400, description = "Invalid request id", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 404, description = "No generation for this request id", body = Error)
    ),
    tags = ["stories"],
    operation_id = "getStoryGeneration"
)]
#[get("/story-generations/{request_id}")]
pub async fn get_generation_status(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let owner = session.require_owner()?;
    let request_id = parse_request_id(path.into_inner())?;
    let outcome = state
        .story_queries
        .attempt_status(&owner, &request_id)
        .await?;
    Ok(HttpResponse::Ok().insert_header(no_store()).json(outcome))
}

/// List the caller's stories, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/stories",
    responses(
        (status = 200, description = "Stories owned by the caller", body = [Story]),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["stories"],
    operation_id = "listStories"
)]
#[get("/stories")]
pub async fn list_stories(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<HttpResponse> {
    let owner = session.require_owner()?;
    let stories = state.story_queries.list_stories(&owner).await?;
    Ok(HttpResponse::Ok().insert_header(no_store()).json(stories))
}

/// Fetch a generated story.
#[utoipa::path(
    get,
    path = "/api/v1/stories/{story_id}",
    params(("story_id" = String, Path, description = "Story id (UUID)")),
    responses(
        (status = 200, description = "Story", body = Story),
        (status = 400, description = "Invalid story id", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 404, description = "Story not found", body = Error)
    ),
    tags = ["stories"],
    operation_id = "getStory"
)]
#[get("/stories/{story_id}")]
pub async fn get_story(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let owner = session.require_owner()?;
    let story_id = parse_story_id(path.into_inner())?;
    let story = state.story_queries.get_story(&owner, &story_id).await?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "private, max-age=3600"))
        .json(story))
}

#[cfg(test)]
#[path = "stories_tests.rs"]
mod tests;
