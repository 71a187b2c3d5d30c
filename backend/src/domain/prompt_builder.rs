//! Deterministic prompt construction from a child profile and prompt details.
//!
//! Missing slots fall back to fixed neutral placeholders so incomplete
//! profiles never block generation. The only rejection is a request with no
//! narrative input at all.

use serde::{Deserialize, Serialize};

use super::{ChildProfile, PromptDetails};

/// Placeholder used when the child has no name on file.
pub const DEFAULT_CHILD_NAME: &str = "a little adventurer";
/// Placeholder used when no daily event is supplied.
pub const DEFAULT_DAILY_EVENT: &str = "had a lovely day";
/// Placeholder used when no friend is named.
pub const DEFAULT_FRIEND_NAME: &str = "their friend";
/// Placeholder used when no moral is supplied.
pub const DEFAULT_MORAL: &str = "the importance of kindness";

const SYSTEM_PROMPT: &str = "You are a gentle storyteller writing calming, age-appropriate \
bedtime stories for young children. Avoid frightening, violent, or mature content. Reply with \
the story text only.";

/// Payload handed to the text generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPayload {
    /// Story title stored alongside the generated text.
    pub title: String,
    pub system_prompt: String,
    pub prompt: String,
}

/// Prompt construction failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptBuildError {
    /// No narrative slot and no free-form hint was supplied.
    #[error("at least one of dailyEvent, friendName, moral, or a free-form hint is required")]
    InvalidInput,
}

/// Build the text generation payload.
///
/// # Examples
/// ```
/// use lullaby_backend::domain::{ChildProfile, PromptDetails, build_prompt};
///
/// let profile = ChildProfile { name: Some("Mira".into()), ..ChildProfile::default() };
/// let details = PromptDetails { moral: Some("honesty".into()), ..PromptDetails::default() };
/// let payload = build_prompt(&profile, &details).expect("moral is present");
/// assert_eq!(payload.title, "A Bedtime Story for Mira");
/// assert!(payload.prompt.contains("teach about honesty"));
/// ```
pub fn build_prompt(
    profile: &ChildProfile,
    details: &PromptDetails,
) -> Result<GenerationPayload, PromptBuildError> {
    let daily_event = present(details.daily_event.as_deref());
    let friend_name = present(details.friend_name.as_deref());
    let moral = present(details.moral.as_deref());
    let has_free_form = details
        .free_form
        .iter()
        .any(|(key, value)| present(Some(key)).is_some() && present(Some(value)).is_some());

    if daily_event.is_none() && friend_name.is_none() && moral.is_none() && !has_free_form {
        return Err(PromptBuildError::InvalidInput);
    }

    let child_name = present(profile.name.as_deref()).unwrap_or(DEFAULT_CHILD_NAME);
    let mut prompt = format!(
        "Create a calming bedtime story for {child_name} who {}. Include {} and teach about {}.",
        daily_event.unwrap_or(DEFAULT_DAILY_EVENT),
        friend_name.unwrap_or(DEFAULT_FRIEND_NAME),
        moral.unwrap_or(DEFAULT_MORAL),
    );

    if let Some(age) = profile.age {
        prompt.push_str(&format!(" The listener is {age} years old."));
    }
    if let Some(gender) = present(profile.gender.as_deref()) {
        prompt.push_str(&format!(" Refer to the child as a {gender}."));
    }
    append_list(&mut prompt, "They love", &profile.interests);
    append_list(&mut prompt, "Their friends include", &profile.friends);
    append_list(
        &mut prompt,
        "Their favourite characters are",
        &profile.favorite_characters,
    );
    for (key, value) in &details.free_form {
        if let (Some(key), Some(value)) = (present(Some(key)), present(Some(value))) {
            prompt.push_str(&format!(" {key}: {value}."));
        }
    }

    let title = match present(profile.name.as_deref()) {
        Some(name) => format!("A Bedtime Story for {name}"),
        None => "A Bedtime Story".to_owned(),
    };

    Ok(GenerationPayload {
        title,
        system_prompt: SYSTEM_PROMPT.to_owned(),
        prompt,
    })
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn append_list(prompt: &mut String, lead: &str, items: &[String]) {
    let items: Vec<&str> = items.iter().filter_map(|item| present(Some(item))).collect();
    if !items.is_empty() {
        prompt.push_str(&format!(" {lead} {}.", items.join(", ")));
    }
}
