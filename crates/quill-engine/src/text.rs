use std::time::Duration;

use quill_contracts::errors::ProviderError;
use quill_contracts::providers::{CredentialSlot, NamedProvider, ProviderRegistry};
use quill_contracts::request::TextProviderKind;
use quill_contracts::settings::{Credentials, Settings};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Map, Value};

use crate::{build_http_client, map_object, send_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub system: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        let system = system.into();
        Self {
            messages: vec![ChatMessage::user(user)],
            system: Some(system).filter(|value| !value.trim().is_empty()),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Map<String, Value>,
    pub model: String,
    pub finish_reason: Option<String>,
}

pub trait TextProvider: NamedProvider + Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct TextProviderConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct OpenAiTextProvider {
    config: TextProviderConfig,
    http: HttpClient,
}

impl OpenAiTextProvider {
    pub fn new(config: TextProviderConfig) -> Result<Self, ProviderError> {
        let http = build_http_client("OpenAI", config.timeout)?;
        Ok(Self { config, http })
    }

    fn build_payload(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = request.system.as_deref() {
            messages.push(json!({"role": "system", "content": system}));
        }
        for message in &request.messages {
            messages.push(json!({"role": message.role.as_str(), "content": message.content}));
        }
        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }

    fn parse_completion(&self, payload: &Value) -> Result<Completion, ProviderError> {
        let choice = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or_else(|| ProviderError::MalformedResponse("OpenAI returned no choices".to_string()))?;
        let content = choice
            .get("message")
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("OpenAI reply has no message content".to_string())
            })?;
        Ok(Completion {
            content: content.to_string(),
            usage: map_object(payload.get("usage").cloned().unwrap_or(Value::Null)),
            model: payload
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&self.config.model)
                .to_string(),
            finish_reason: choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

impl NamedProvider for OpenAiTextProvider {
    fn name(&self) -> &str {
        "openai"
    }
}

impl TextProvider for OpenAiTextProvider {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let endpoint = format!("{}/chat/completions", self.config.api_base);
        let payload = send_json(
            "OpenAI",
            self.http
                .post(endpoint)
                .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
                .header(CONTENT_TYPE, "application/json")
                .json(&self.build_payload(request)),
        )?;
        self.parse_completion(&payload)
    }
}

pub struct GeminiTextProvider {
    config: TextProviderConfig,
    http: HttpClient,
}

impl GeminiTextProvider {
    pub fn new(config: TextProviderConfig) -> Result<Self, ProviderError> {
        let http = build_http_client("Gemini", config.timeout)?;
        Ok(Self { config, http })
    }

    fn build_payload(&self, request: &CompletionRequest) -> Value {
        let contents = request
            .messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": message.content}]})
            })
            .collect::<Vec<Value>>();
        let mut payload = Map::new();
        payload.insert("contents".to_string(), Value::Array(contents));
        payload.insert(
            "generationConfig".to_string(),
            json!({
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            }),
        );
        if let Some(system) = request.system.as_deref() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({"parts": [{"text": system}]}),
            );
        }
        Value::Object(payload)
    }

    fn parse_completion(&self, payload: &Value) -> Result<Completion, ProviderError> {
        let candidate = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or_else(|| {
                ProviderError::MalformedResponse("Gemini returned no candidates".to_string())
            })?;
        let texts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<&str>>()
            })
            .unwrap_or_default();
        if texts.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "Gemini reply has no text parts".to_string(),
            ));
        }
        let total_tokens = payload
            .get("usageMetadata")
            .and_then(|usage| usage.get("totalTokenCount"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(Completion {
            content: texts.concat(),
            usage: map_object(json!({"total_tokens": total_tokens})),
            model: payload
                .get("modelVersion")
                .and_then(Value::as_str)
                .unwrap_or(&self.config.model)
                .to_string(),
            finish_reason: candidate
                .get("finishReason")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

impl NamedProvider for GeminiTextProvider {
    fn name(&self) -> &str {
        "gemini"
    }
}

impl TextProvider for GeminiTextProvider {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let endpoint = format!(
            "{}/{}:generateContent",
            self.config.api_base,
            model_path(&self.config.model)
        );
        let payload = send_json(
            "Gemini",
            self.http
                .post(endpoint)
                .query(&[("key", self.config.api_key.as_str())])
                .header(CONTENT_TYPE, "application/json")
                .json(&self.build_payload(request)),
        )?;
        self.parse_completion(&payload)
    }
}

pub(crate) fn model_path(model: &str) -> String {
    let trimmed = model.trim();
    if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    }
}

pub(crate) fn api_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

pub(crate) fn missing_credential(slot: CredentialSlot) -> ProviderError {
    ProviderError::NoCredential(format!(
        "No {} API key configured (set {} or store an encrypted key in settings)",
        slot.label(),
        slot.env_var()
    ))
}

/// Builds the adapter for `kind`; a missing key is `NoCredential`.
pub fn text_provider_for(
    kind: TextProviderKind,
    settings: &Settings,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<Box<dyn TextProvider>, ProviderError> {
    let slot = CredentialSlot::for_text(kind);
    let api_key = credentials
        .get(slot)
        .ok_or_else(|| missing_credential(slot))?
        .to_string();
    Ok(match kind {
        TextProviderKind::OpenAi => Box::new(OpenAiTextProvider::new(TextProviderConfig {
            api_key,
            api_base: api_base(&settings.openai_api_base),
            model: settings.openai_model.clone(),
            timeout,
        })?),
        TextProviderKind::Gemini => Box::new(GeminiTextProvider::new(TextProviderConfig {
            api_key,
            api_base: api_base(&settings.gemini_api_base),
            model: settings.gemini_text_model.clone(),
            timeout,
        })?),
    })
}

/// Every text provider that has a credential available.
pub fn text_registry(
    settings: &Settings,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<ProviderRegistry<Box<dyn TextProvider>>, ProviderError> {
    let mut registry = ProviderRegistry::default();
    for kind in TextProviderKind::ALL {
        match text_provider_for(*kind, settings, credentials, timeout) {
            Ok(provider) => registry.register(provider),
            Err(ProviderError::NoCredential(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str) -> TextProviderConfig {
        TextProviderConfig {
            api_key: "test-key".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    fn request() -> CompletionRequest {
        let mut request = CompletionRequest::new("be brief", "hello").temperature(0.3);
        request.messages.push(ChatMessage::assistant("hi"));
        request
    }

    #[test]
    fn openai_payload_prepends_system_message() {
        let provider = OpenAiTextProvider::new(config("gpt-4o-mini")).unwrap();
        let payload = provider.build_payload(&request());
        assert_eq!(payload["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(payload["messages"][2]["role"], json!("assistant"));
        assert_eq!(payload["max_tokens"], json!(4096));
        assert_eq!(payload["model"], json!("gpt-4o-mini"));
    }

    #[test]
    fn openai_reply_parsing() {
        let provider = OpenAiTextProvider::new(config("gpt-4o-mini")).unwrap();
        let completion = provider
            .parse_completion(&json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{"message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
                "usage": {"total_tokens": 12}
            }))
            .unwrap();
        assert_eq!(completion.content, "ok");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(completion.usage["total_tokens"], json!(12));
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));

        let err = provider
            .parse_completion(&json!({"choices": [{"message": {"role": "assistant"}}]}))
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "malformed_response");
    }

    #[test]
    fn gemini_payload_maps_roles_and_system_instruction() {
        let provider = GeminiTextProvider::new(config("gemini-2.5-flash")).unwrap();
        let payload = provider.build_payload(&request());
        assert_eq!(payload["contents"][1]["role"], json!("model"));
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], json!("be brief"));
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], json!(4096));
    }

    #[test]
    fn gemini_reply_concatenates_parts() {
        let provider = GeminiTextProvider::new(config("gemini-2.5-flash")).unwrap();
        let completion = provider
            .parse_completion(&json!({
                "candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}, "finishReason": "STOP"}],
                "usageMetadata": {"totalTokenCount": 7}
            }))
            .unwrap();
        assert_eq!(completion.content, "ab");
        assert_eq!(completion.model, "gemini-2.5-flash");
        assert_eq!(completion.usage["total_tokens"], json!(7));

        assert!(provider.parse_completion(&json!({"candidates": []})).is_err());
    }

    #[test]
    fn factory_reports_missing_credential() {
        let settings = Settings::default();
        let err = text_provider_for(
            TextProviderKind::Gemini,
            &settings,
            &Credentials::default(),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind().as_str(), "no_credential");
        assert!(err.message().contains("QUILL_GEMINI_API_KEY"));
    }

    #[test]
    fn registry_only_holds_configured_providers() {
        let credentials = Credentials::default().with_key(CredentialSlot::OpenAi, "sk-test");
        let registry =
            text_registry(&Settings::default(), &credentials, Duration::from_secs(1)).unwrap();
        assert_eq!(registry.list(), vec!["openai"]);
    }

    #[test]
    fn model_path_accepts_prefixed_names() {
        assert_eq!(model_path("models/gemini-2.5-flash"), "models/gemini-2.5-flash");
        assert_eq!(model_path(" gemini-2.5-flash "), "models/gemini-2.5-flash");
        assert_eq!(api_base("https://x/v1/"), "https://x/v1");
    }
}
