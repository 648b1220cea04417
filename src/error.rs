use thiserror::Error;

/// A request body that must not reach the database or a model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response envelope: {0}")]
    Envelope(String),
    #[error("response contained no content")]
    EmptyContent,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LlmError::Envelope(err.to_string())
        } else {
            LlmError::Http(err.to_string())
        }
    }
}

/// Model output that could not be turned into the expected structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no JSON payload found in model response")]
    NoJson,
    #[error("JSON payload has the wrong shape: {0}")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no submission with id {0}")]
    NotFound(uuid::Uuid),
}

/// Why a single submission dropped out of a scoring run.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("invalid submission: {0}")]
    Invalid(#[from] ValidationError),
    #[error("scoring call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("unusable scoring response: {0}")]
    Parse(#[from] ParseFailure),
    #[error("could not persist evaluation: {0}")]
    Store(#[from] StoreError),
    #[error("scoring task failed: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("no ranked entries to narrate")]
    NothingToNarrate,
    #[error("narrative call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("narrative response was empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no submissions found to analyze")]
    NoSubmissions,
    #[error("{} of {total} submissions failed to score", failures.len())]
    Aborted {
        total: usize,
        failures: Vec<(String, ItemError)>,
    },
    #[error("every submission failed to score")]
    NothingRanked,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Narrative(#[from] NarrativeError),
}
