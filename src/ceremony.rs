use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::error::{LlmError, NarrativeError};
use crate::llm::{LlmClient, SpeechSynthesizer};
use crate::models::{RankedEntry, WinnerSummary};
use crate::narrative;

#[derive(Debug, Error)]
pub enum CeremonyError {
    #[error("no ranked submissions yet, run `score` first")]
    NoWinners,
    #[error(transparent)]
    Script(#[from] NarrativeError),
    #[error("speech synthesis failed: {0}")]
    Speech(#[from] LlmError),
}

#[derive(Debug)]
pub struct Ceremony {
    pub script: String,
    /// MP3 bytes of the spoken script.
    pub audio: Vec<u8>,
    pub winners: Vec<WinnerSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CeremonyDocument<'a> {
    script: &'a str,
    audio_url: String,
    winners: &'a [WinnerSummary],
}

impl Ceremony {
    pub fn audio_data_url(&self) -> String {
        format!("data:audio/mp3;base64,{}", STANDARD.encode(&self.audio))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&CeremonyDocument {
            script: &self.script,
            audio_url: self.audio_data_url(),
            winners: &self.winners,
        })
    }
}

/// Script and speech for already-ranked winners, best first.
pub async fn announce<C>(client: &C, winners: &[RankedEntry], voice: &str) -> Result<Ceremony, CeremonyError>
where
    C: LlmClient + SpeechSynthesizer,
{
    if winners.is_empty() {
        return Err(CeremonyError::NoWinners);
    }

    let script = narrative::announcement_script(client, winners).await?;
    let audio = client.synthesize(&script, voice).await?;
    info!(winners = winners.len(), audio_bytes = audio.len(), "ceremony ready");

    Ok(Ceremony {
        script,
        audio,
        winners: winners.iter().map(WinnerSummary::from).collect(),
    })
}
