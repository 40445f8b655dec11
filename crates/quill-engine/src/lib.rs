use std::time::Duration;

use quill_contracts::errors::ProviderError;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use serde_json::{Map, Value};

pub mod assist;
pub mod extract;
pub mod images;
pub mod optimize;
pub mod pipeline;
pub mod prompts;
pub mod text;

pub use images::{format_to_native_size, GeneratedImage, ImageProvider};
pub use pipeline::{run_pipeline, Pipeline, PipelineOptions};
pub use text::{ChatMessage, ChatRole, Completion, CompletionRequest, TextProvider};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_http_client(provider: &str, timeout: Duration) -> Result<HttpClient, ProviderError> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ProviderError::Upstream(format!("{provider} HTTP client setup failed: {err}")))
}

pub(crate) fn send_json(provider: &str, request: RequestBuilder) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .map_err(|err| transport_error(provider, &err))?;
    response_json_or_error(provider, response)
}

fn transport_error(provider: &str, err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(format!("{provider} request timed out"))
    } else {
        ProviderError::Upstream(format!("{provider} request failed: {err}"))
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| transport_error(provider, &err))?;
    classify_response(provider, status.as_u16(), status.is_success(), &body)
}

/// Non-2xx is `Upstream` with the vendor message; a 2xx body must be JSON.
pub(crate) fn classify_response(
    provider: &str,
    code: u16,
    success: bool,
    body: &str,
) -> Result<Value, ProviderError> {
    if !success {
        return Err(ProviderError::Upstream(upstream_error_message(provider, code, body)));
    }
    serde_json::from_str(body).map_err(|_| {
        ProviderError::MalformedResponse(format!(
            "{provider} returned invalid JSON payload: {}",
            truncate_text(body, 200)
        ))
    })
}

/// `error.message` from the body when present, otherwise the status and a body excerpt.
pub(crate) fn upstream_error_message(provider: &str, code: u16, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let from_body = parsed.as_ref().and_then(|payload| {
        let error = payload.get("error")?;
        error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(str::to_string)
    });
    from_body.unwrap_or_else(|| {
        format!(
            "{provider} request failed ({code}): {}",
            truncate_text(body.trim(), 512)
        )
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
