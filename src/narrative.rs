use tracing::info;

use crate::error::NarrativeError;
use crate::llm::LlmClient;
use crate::models::RankedEntry;
use crate::prompts::{self, CallProfile};

pub const DEFAULT_TOP_N: usize = 3;

/// Free-text commentary on the leaders. The response is passed through
/// untouched; an empty answer is an error rather than placeholder text.
pub async fn narrate(client: &dyn LlmClient, top: &[RankedEntry]) -> Result<String, NarrativeError> {
    generate(client, CallProfile::Narrative, prompts::narrative_prompt(top), top).await
}

/// The spoken announcement for the winners ceremony.
pub async fn announcement_script(
    client: &dyn LlmClient,
    top: &[RankedEntry],
) -> Result<String, NarrativeError> {
    generate(client, CallProfile::Script, prompts::script_prompt(top), top).await
}

async fn generate(
    client: &dyn LlmClient,
    profile: CallProfile,
    prompt: String,
    top: &[RankedEntry],
) -> Result<String, NarrativeError> {
    if top.is_empty() {
        return Err(NarrativeError::NothingToNarrate);
    }
    let text = client.complete(profile.request(prompt)).await?;
    if text.trim().is_empty() {
        return Err(NarrativeError::Empty);
    }
    info!(?profile, teams = top.len(), chars = text.len(), "generated commentary");
    Ok(text)
}
