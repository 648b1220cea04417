//! Recovery of JSON payloads from free-form model output.
//!
//! Models are told to answer with bare JSON but regularly wrap it in a
//! markdown fence or surround it with chatter. [`extract_json`] tries each
//! [`Strategy`] in order and returns the first payload that parses.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseFailure;
use crate::models::EvaluationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The whole response is the payload.
    Direct,
    /// The interior of the first triple-backtick block, optionally tagged `json`.
    FencedBlock,
    /// The first balanced `{...}` or `[...]` span that parses.
    BalancedScan,
}

pub const STRATEGIES: [Strategy; 3] = [
    Strategy::Direct,
    Strategy::FencedBlock,
    Strategy::BalancedScan,
];

impl Strategy {
    pub fn attempt(self, raw: &str) -> Option<Value> {
        self.attempt_matching(raw, |_| true)
    }

    /// Like [`Strategy::attempt`], but a candidate only counts when `accept`
    /// holds for it, so the scan moves past bracketed prose such as `[1]`.
    pub fn attempt_matching(self, raw: &str, accept: impl Fn(&Value) -> bool) -> Option<Value> {
        match self {
            Strategy::Direct => parse_candidate(raw).filter(|v| accept(v)),
            Strategy::FencedBlock => fenced_block(raw)
                .and_then(parse_candidate)
                .filter(|v| accept(v)),
            Strategy::BalancedScan => balanced_candidates(raw)
                .filter_map(parse_candidate)
                .find(|v| accept(v)),
        }
    }
}

pub fn extract_json(raw: &str) -> Result<Value, ParseFailure> {
    for strategy in STRATEGIES {
        if let Some(value) = strategy.attempt(raw) {
            debug!(?strategy, "recovered JSON payload");
            return Ok(value);
        }
    }
    Err(ParseFailure::NoJson)
}

/// The first JSON object any strategy recovers.
pub fn extract_object(raw: &str) -> Result<Map<String, Value>, ParseFailure> {
    for strategy in STRATEGIES {
        if let Some(Value::Object(object)) = strategy.attempt_matching(raw, Value::is_object) {
            debug!(?strategy, "recovered JSON object");
            return Ok(object);
        }
    }
    extract_json(raw)?;
    Err(ParseFailure::Shape("expected a JSON object".to_string()))
}

/// Parses a scoring response. Never falls back to a default score.
pub fn parse_evaluation(raw: &str) -> Result<EvaluationResult, ParseFailure> {
    let object = extract_object(raw)?;

    let score = object
        .get("score")
        .and_then(Value::as_f64)
        .ok_or_else(|| ParseFailure::Shape("`score` must be a number".to_string()))?;
    if !(0.0..=100.0).contains(&score) {
        return Err(ParseFailure::Shape(format!(
            "`score` {score} is outside 0-100"
        )));
    }

    let feedback = object
        .get("feedback")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseFailure::Shape("`feedback` must be a string".to_string()))?
        .to_string();

    Ok(EvaluationResult {
        score,
        feedback,
        strengths: string_list(&object, "strengths")?,
        weaknesses: string_list(&object, "weaknesses")?,
        suggestions: string_list(&object, "suggestions")?,
    })
}

fn string_list(object: &Map<String, Value>, key: &str) -> Result<Vec<String>, ParseFailure> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ParseFailure::Shape(format!("`{key}` must contain only strings"))
                })
            })
            .collect(),
        Some(_) => Err(ParseFailure::Shape(format!("`{key}` must be an array"))),
    }
}

fn parse_candidate(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after_fence = &raw[start + 3..];
    let body = after_fence
        .strip_prefix("json")
        .or_else(|| after_fence.strip_prefix("JSON"))
        .unwrap_or(after_fence);
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Yields every balanced object or array span in order of its opening
/// bracket. Brackets inside JSON strings are ignored.
fn balanced_candidates(raw: &str) -> impl Iterator<Item = &str> {
    raw.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .filter_map(move |(start, _)| balanced_end(&raw[start..]).map(|end| &raw[start..start + end]))
}

fn balanced_end(text: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(idx + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
