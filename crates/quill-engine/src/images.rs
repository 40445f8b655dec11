use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quill_contracts::errors::ProviderError;
use quill_contracts::providers::{CredentialSlot, NamedProvider, ProviderRegistry};
use quill_contracts::request::ImageProviderKind;
use quill_contracts::settings::{Credentials, Settings};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::text::{api_base, missing_credential, model_path};
use crate::{build_http_client, send_json, truncate_text};

const STYLE_LINE: &str = "Style: High-quality, modern, vibrant colors, clean composition, photorealistic, sharp focus, professional lighting, visually striking.";
const RESTRICTIONS_LINE: &str = "Restrictions: NO text, NO watermarks, NO logos, NO recognizable faces.";

/// Raw provider output. `data` is base64 and has been checked to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data: String,
    pub revised_prompt: Option<String>,
}

pub trait ImageProvider: NamedProvider + Send + Sync {
    fn generate(&self, prompt: &str, aspect_or_size: &str) -> Result<GeneratedImage, ProviderError>;
}

/// Pixel size for providers that only accept fixed dimensions.
pub fn format_to_native_size(token: &str) -> &'static str {
    match token.trim().to_ascii_lowercase().as_str() {
        "1:1" | "1024x1024" => "1024x1024",
        "16:9" | "4:3" | "1792x1024" => "1792x1024",
        "9:16" | "3:4" | "1024x1792" => "1024x1792",
        _ => "1792x1024",
    }
}

#[derive(Debug, Clone)]
pub struct ImageProviderConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct DalleProvider {
    config: ImageProviderConfig,
    http: HttpClient,
}

impl DalleProvider {
    pub fn new(config: ImageProviderConfig) -> Result<Self, ProviderError> {
        let http = build_http_client("DALL-E", config.timeout)?;
        Ok(Self { config, http })
    }

    fn envelope(prompt: &str) -> String {
        format!(
            "Professional blog thumbnail image: {prompt}.\n\
             Style: High-quality, modern digital art, vibrant colors, clean composition, professional, visually striking.\n\
             Important: NO text, NO watermarks, NO logos, NO words in the image."
        )
    }

    fn build_payload(&self, prompt: &str, aspect_or_size: &str) -> Value {
        json!({
            "model": self.config.model,
            "prompt": Self::envelope(prompt),
            "n": 1,
            "size": format_to_native_size(aspect_or_size),
            "quality": "standard",
            "response_format": "b64_json",
        })
    }

    fn parse_image(payload: &Value) -> Result<GeneratedImage, ProviderError> {
        let item = payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or_else(|| ProviderError::MalformedResponse("DALL-E returned no images".to_string()))?;
        let data = item
            .get("b64_json")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|data| !data.is_empty())
            .ok_or_else(|| {
                ProviderError::MalformedResponse("DALL-E reply has no b64_json image".to_string())
            })?;
        Ok(GeneratedImage {
            mime_type: "image/png".to_string(),
            data: checked_base64("DALL-E", data)?,
            revised_prompt: item
                .get("revised_prompt")
                .and_then(Value::as_str)
                .filter(|text| !text.trim().is_empty())
                .map(str::to_string),
        })
    }
}

impl NamedProvider for DalleProvider {
    fn name(&self) -> &str {
        "dalle"
    }
}

impl ImageProvider for DalleProvider {
    fn generate(&self, prompt: &str, aspect_or_size: &str) -> Result<GeneratedImage, ProviderError> {
        let payload = send_json(
            "DALL-E",
            self.http
                .post(format!("{}/images/generations", self.config.api_base))
                .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
                .header(CONTENT_TYPE, "application/json")
                .json(&self.build_payload(prompt, aspect_or_size)),
        )?;
        Self::parse_image(&payload)
    }
}

pub struct GeminiImageProvider {
    config: ImageProviderConfig,
    http: HttpClient,
}

impl GeminiImageProvider {
    pub fn new(config: ImageProviderConfig) -> Result<Self, ProviderError> {
        let http = build_http_client("Gemini", config.timeout)?;
        Ok(Self { config, http })
    }

    fn envelope(prompt: &str, aspect: &str) -> String {
        format!(
            "Professional blog thumbnail image: {prompt}.\n{STYLE_LINE}\n{RESTRICTIONS_LINE}\n\n\
             Generate a high-quality image in {aspect} aspect ratio."
        )
    }

    fn build_payload(prompt: &str, aspect: &str) -> Value {
        json!({
            "contents": [{"role": "user", "parts": [{"text": Self::envelope(prompt, aspect)}]}],
            "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]},
        })
    }

    fn parse_image(payload: &Value) -> Result<GeneratedImage, ProviderError> {
        let parts = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut text_parts = Vec::new();
        for part in &parts {
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
            let Some(inline) = inline.and_then(Value::as_object) else {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    text_parts.push(text.trim().to_string());
                }
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            return Ok(GeneratedImage {
                mime_type,
                data: checked_base64("Gemini", data)?,
                revised_prompt: None,
            });
        }

        let mut message = "Gemini returned no image data".to_string();
        let said = text_parts.join(" ");
        if !said.trim().is_empty() {
            message.push_str(&format!(": {}", truncate_text(said.trim(), 200)));
        }
        Err(ProviderError::MalformedResponse(message))
    }
}

impl NamedProvider for GeminiImageProvider {
    fn name(&self) -> &str {
        "gemini"
    }
}

impl ImageProvider for GeminiImageProvider {
    fn generate(&self, prompt: &str, aspect_or_size: &str) -> Result<GeneratedImage, ProviderError> {
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
                .json(&Self::build_payload(prompt, aspect_or_size.trim())),
        )?;
        Self::parse_image(&payload)
    }
}

pub struct OpenRouterImageProvider {
    config: ImageProviderConfig,
    site_url: Option<String>,
    site_name: Option<String>,
    http: HttpClient,
}

impl OpenRouterImageProvider {
    pub fn new(
        config: ImageProviderConfig,
        site_url: Option<String>,
        site_name: Option<String>,
    ) -> Result<Self, ProviderError> {
        let http = build_http_client("OpenRouter", config.timeout)?;
        Ok(Self {
            config,
            site_url,
            site_name,
            http,
        })
    }

    fn envelope(prompt: &str, aspect: &str) -> String {
        format!(
            "Generate a professional blog thumbnail image: {prompt}.\n{STYLE_LINE}\n\
             Aspect ratio: {aspect}\n{RESTRICTIONS_LINE}"
        )
    }

    fn build_payload(&self, prompt: &str, aspect: &str) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": Self::envelope(prompt, aspect)}],
            "modalities": ["image", "text"],
        });
        if self.config.model.contains("gemini") {
            payload["image_config"] = json!({"aspect_ratio": aspect});
        }
        payload
    }

    fn parse_image(payload: &Value) -> Result<GeneratedImage, ProviderError> {
        let message = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| {
                ProviderError::MalformedResponse("OpenRouter returned no message".to_string())
            })?;
        let urls = message
            .get("images")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|image| image.pointer("/image_url/url").and_then(Value::as_str))
                    .collect::<Vec<&str>>()
            })
            .unwrap_or_default();
        for url in urls {
            if let Some((mime_type, data)) = split_data_url(url) {
                return Ok(GeneratedImage {
                    mime_type,
                    data: checked_base64("OpenRouter", data)?,
                    revised_prompt: None,
                });
            }
        }
        Err(ProviderError::MalformedResponse(
            "OpenRouter reply contains no base64 image".to_string(),
        ))
    }
}

impl NamedProvider for OpenRouterImageProvider {
    fn name(&self) -> &str {
        "openrouter"
    }
}

impl ImageProvider for OpenRouterImageProvider {
    fn generate(&self, prompt: &str, aspect_or_size: &str) -> Result<GeneratedImage, ProviderError> {
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.config.api_base))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .header(CONTENT_TYPE, "application/json");
        if let Some(site_url) = self.site_url.as_deref() {
            request = request.header("HTTP-Referer", site_url);
        }
        if let Some(site_name) = self.site_name.as_deref() {
            request = request.header("X-Title", site_name);
        }
        let payload = send_json(
            "OpenRouter",
            request.json(&self.build_payload(prompt, aspect_or_size.trim())),
        )?;
        Self::parse_image(&payload)
    }
}

/// `data:image/webp;base64,AAAA` -> (`image/webp`, `AAAA`).
fn split_data_url(url: &str) -> Option<(String, &str)> {
    let trimmed = url.trim();
    if !trimmed.starts_with("data:image") {
        return None;
    }
    let (meta, data) = trimmed.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    let mime = meta
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|mime| mime.starts_with("image/") && mime.len() > "image/".len())
        .unwrap_or("image/png");
    Some((mime.to_string(), data.trim()))
}

fn checked_base64(provider: &str, data: &str) -> Result<String, ProviderError> {
    BASE64
        .decode(data.as_bytes())
        .map_err(|err| ProviderError::Decode(format!("{provider} image base64 decode failed: {err}")))?;
    Ok(data.to_string())
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn image_provider_for(
    kind: ImageProviderKind,
    settings: &Settings,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<Box<dyn ImageProvider>, ProviderError> {
    let slot = CredentialSlot::for_image(kind);
    let api_key = credentials
        .get(slot)
        .ok_or_else(|| missing_credential(slot))?
        .to_string();
    Ok(match kind {
        ImageProviderKind::Dalle => Box::new(DalleProvider::new(ImageProviderConfig {
            api_key,
            api_base: api_base(&settings.openai_api_base),
            model: settings.dalle_model.clone(),
            timeout,
        })?),
        ImageProviderKind::Gemini => Box::new(GeminiImageProvider::new(ImageProviderConfig {
            api_key,
            api_base: api_base(&settings.gemini_api_base),
            model: settings.gemini_image_model.clone(),
            timeout,
        })?),
        ImageProviderKind::OpenRouter => Box::new(OpenRouterImageProvider::new(
            ImageProviderConfig {
                api_key,
                api_base: api_base(&settings.openrouter_api_base),
                model: settings.openrouter_model.clone(),
                timeout,
            },
            non_empty(settings.site_url.as_ref()),
            non_empty(settings.site_name.as_ref()),
        )?),
    })
}

pub fn image_registry(
    settings: &Settings,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<ProviderRegistry<Box<dyn ImageProvider>>, ProviderError> {
    let mut registry = ProviderRegistry::default();
    for kind in ImageProviderKind::ALL {
        match image_provider_for(*kind, settings, credentials, timeout) {
            Ok(provider) => registry.register(provider),
            Err(ProviderError::NoCredential(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(registry)
}
