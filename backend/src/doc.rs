//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers the story endpoints, the health checks, and the
//! session cookie security scheme. The document backs Swagger UI in debug
//! builds and is exported by `cargo run --bin openapi-dump`.

use crate::domain::ports::{GenerationOutcome, GenerationStatus};
use crate::domain::{
    Error, ErrorCode, FailureReason, GenerationRequest, PipelineStage, PromptDetails, Story,
    VoicePreference,
};
use crate::inbound::http::stories::SubmitStoryBody;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Enrich the generated document with the session cookie security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "session",
                "Private session cookie carrying the signed-in parent's user id.",
            ))),
        );
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Lullaby backend API",
        description = "Bedtime story generation for signed-in parents, plus health checks.",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0.html"
        )
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("SessionCookie" = [])),
    paths(
        crate::inbound::http::stories::submit_story,
        crate::inbound::http::stories::get_generation_status,
        crate::inbound::http::stories::list_stories,
        crate::inbound::http::stories::get_story,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        GenerationOutcome,
        GenerationStatus,
        PipelineStage,
        FailureReason,
        Story,
        GenerationRequest,
        PromptDetails,
        VoicePreference,
        SubmitStoryBody,
    )),
    tags(
        (name = "stories", description = "Story generation, polling, and retrieval"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
