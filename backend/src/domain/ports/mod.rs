//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod audio_synthesis_provider;
mod child_profile_repository;
mod generation_attempt_repository;
mod moderation_provider;
mod provider_error;
mod story_generation_command;
mod story_generation_query;
mod story_repository;
mod text_generation_provider;

#[cfg(test)]
pub use audio_synthesis_provider::MockAudioSynthesisProvider;
pub use audio_synthesis_provider::{AudioSynthesisProvider, FixtureAudioSynthesisProvider};
#[cfg(test)]
pub use child_profile_repository::MockChildProfileRepository;
pub use child_profile_repository::{ChildProfileRepository, ChildProfileRepositoryError};
#[cfg(test)]
pub use generation_attempt_repository::MockGenerationAttemptRepository;
pub use generation_attempt_repository::{
    GenerationAttemptRepository, GenerationAttemptRepositoryError,
};
#[cfg(test)]
pub use moderation_provider::MockModerationProvider;
pub use moderation_provider::{FixtureModerationProvider, ModerationError, ModerationProvider};
pub use provider_error::ProviderError;
#[cfg(test)]
pub use story_generation_command::MockStoryGenerationCommand;
pub use story_generation_command::{
    FixtureStoryGenerationCommand, GenerationOutcome, GenerationStatus, StoryGenerationCommand,
    SubmitStoryRequest,
};
#[cfg(test)]
pub use story_generation_query::MockStoryGenerationQuery;
pub use story_generation_query::{FixtureStoryGenerationQuery, StoryGenerationQuery};
#[cfg(test)]
pub use story_repository::MockStoryRepository;
pub use story_repository::{StoryRepository, StoryRepositoryError};
#[cfg(test)]
pub use text_generation_provider::MockTextGenerationProvider;
pub use text_generation_provider::{FixtureTextGenerationProvider, TextGenerationProvider};
