use std::path::Path;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::info;

use crate::error::ParseFailure;
use crate::llm::LlmClient;
use crate::models::ProposalFields;
use crate::parse::extract_object;
use crate::prompts::{self, CallProfile};

/// Reads the proposal fields off a photographed whiteboard.
pub async fn extract_proposal(client: &dyn LlmClient, image: &Path) -> anyhow::Result<ProposalFields> {
    let data_url = image_data_url(image)?;
    let mut request = CallProfile::Extraction.request(prompts::extraction_prompt());
    request.image_url = Some(data_url);

    let raw = client
        .complete(request)
        .await
        .context("image analysis call failed")?;
    let fields = parse_fields(&raw)?;
    fields.validate().context("image did not contain a complete proposal")?;

    info!(image = %image.display(), "extracted proposal from image");
    Ok(fields)
}

pub fn parse_fields(raw: &str) -> Result<ProposalFields, ParseFailure> {
    let object = extract_object(raw)?;
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| ParseFailure::Shape(e.to_string()))
}

pub fn image_data_url(path: &Path) -> anyhow::Result<String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        other => bail!("unsupported image type {other:?} for {}", path.display()),
    };

    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}
