use std::time::Duration;

use anyhow::Context;

use crate::llm::OpenAiConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let timeout_secs = match lookup("LLM_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .with_context(|| {
                    format!("LLM_TIMEOUT_SECS must be a positive whole number, got {raw:?}")
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let concurrency = match lookup("SCORING_CONCURRENCY") {
            Some(raw) => raw.trim().parse::<usize>().with_context(|| {
                format!("SCORING_CONCURRENCY must be a whole number, got {raw:?}")
            })?,
            None => DEFAULT_CONCURRENCY,
        };

        Ok(Self {
            database_url,
            api_key: lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()),
            base_url: lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs,
            concurrency: concurrency.max(1),
        })
    }

    /// Only the model-backed subcommands need a key.
    pub fn openai(&self) -> anyhow::Result<OpenAiConfig> {
        let api_key = self
            .api_key
            .clone()
            .context("OPENAI_API_KEY must be set for commands that call a model")?;
        Ok(OpenAiConfig {
            base_url: self.base_url.clone(),
            api_key,
            timeout_secs: self.timeout_secs,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
