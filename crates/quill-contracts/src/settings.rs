use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cipher::CredentialCipher;
use crate::mapping::FieldMappings;
use crate::providers::CredentialSlot;
use crate::request::ImageProviderKind;

pub const ENCRYPTION_KEY_ENV: &str = "QUILL_ENCRYPTION_KEY";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";
pub const DEFAULT_OPENROUTER_MODEL: &str = "google/gemini-2.0-flash-exp:free";
pub const DEFAULT_DALLE_MODEL: &str = "dall-e-3";

/// Persisted configuration (`quill.json`). API keys are stored encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openrouter_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub openrouter_model: String,
    pub dalle_model: String,
    pub default_thumbnail_provider: ImageProviderKind,
    pub default_thumbnail_format: String,
    pub openai_api_base: String,
    pub gemini_api_base: String,
    pub openrouter_api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    /// post type -> mapping table
    pub field_mappings: IndexMap<String, FieldMappings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            encryption_key: None,
            openai_api_key: None,
            gemini_api_key: None,
            openrouter_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            gemini_text_model: DEFAULT_GEMINI_TEXT_MODEL.to_string(),
            gemini_image_model: DEFAULT_GEMINI_IMAGE_MODEL.to_string(),
            openrouter_model: DEFAULT_OPENROUTER_MODEL.to_string(),
            dalle_model: DEFAULT_DALLE_MODEL.to_string(),
            default_thumbnail_provider: ImageProviderKind::default(),
            default_thumbnail_format: "16:9".to_string(),
            openai_api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            openrouter_api_base: DEFAULT_OPENROUTER_API_BASE.to_string(),
            site_url: None,
            site_name: None,
            field_mappings: IndexMap::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings {}", path.display()))
    }

    /// Missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, format!("{raw}\n"))
            .with_context(|| format!("failed to write settings {}", path.display()))
    }

    pub fn stored_key(&self, slot: CredentialSlot) -> Option<&str> {
        let value = match slot {
            CredentialSlot::OpenAi => self.openai_api_key.as_deref(),
            CredentialSlot::Gemini => self.gemini_api_key.as_deref(),
            CredentialSlot::OpenRouter => self.openrouter_api_key.as_deref(),
        };
        value.map(str::trim).filter(|value| !value.is_empty())
    }

    /// Cipher for stored keys: `QUILL_ENCRYPTION_KEY` first, then the settings key.
    pub fn cipher(&self, env: impl Fn(&str) -> Option<String>) -> Option<CredentialCipher> {
        env(ENCRYPTION_KEY_ENV)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.encryption_key.clone())
            .and_then(|encoded| CredentialCipher::from_encoded_key(encoded.trim()).ok())
    }

    /// Encrypts `plaintext` into `slot` with the same key [`Credentials::resolve`]
    /// will read it back with. A settings key is generated only when neither
    /// the environment nor the settings provide one.
    pub fn store_key(
        &mut self,
        slot: CredentialSlot,
        plaintext: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        let from_env = env(ENCRYPTION_KEY_ENV).filter(|value| !value.trim().is_empty());
        let cipher = match (from_env, self.encryption_key.as_deref()) {
            (Some(encoded), _) => CredentialCipher::from_encoded_key(encoded.trim())
                .with_context(|| format!("{ENCRYPTION_KEY_ENV} is not a valid key"))?,
            (None, Some(encoded)) => CredentialCipher::from_encoded_key(encoded.trim())?,
            (None, None) => {
                let encoded = CredentialCipher::generate_key();
                let cipher = CredentialCipher::from_encoded_key(&encoded)?;
                self.encryption_key = Some(encoded);
                cipher
            }
        };
        let sealed = Some(cipher.encrypt(plaintext)).filter(|value| !value.is_empty());
        match slot {
            CredentialSlot::OpenAi => self.openai_api_key = sealed,
            CredentialSlot::Gemini => self.gemini_api_key = sealed,
            CredentialSlot::OpenRouter => self.openrouter_api_key = sealed,
        }
        Ok(())
    }

    pub fn mappings_for(&self, post_type: &str) -> FieldMappings {
        self.field_mappings
            .get(post_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// Plaintext API keys for one run, resolved once and then read-only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    openai: Option<String>,
    gemini: Option<String>,
    openrouter: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai", &self.openai.is_some())
            .field("gemini", &self.gemini.is_some())
            .field("openrouter", &self.openrouter.is_some())
            .finish()
    }
}

impl Credentials {
    /// Environment override first, then the decrypted settings value.
    /// A value that fails to decrypt is treated as absent.
    pub fn resolve(settings: &Settings, env: impl Fn(&str) -> Option<String>) -> Self {
        let cipher = settings.cipher(&env);

        let mut credentials = Self::default();
        for slot in CredentialSlot::ALL {
            let from_env = env(slot.env_var())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
            let resolved = from_env.or_else(|| {
                let stored = settings.stored_key(slot)?;
                let plain = cipher.as_ref()?.decrypt(stored).ok()?;
                Some(plain).filter(|value| !value.trim().is_empty())
            });
            credentials.set(slot, resolved);
        }
        credentials
    }

    pub fn from_process_env(settings: &Settings) -> Self {
        Self::resolve(settings, |name| std::env::var(name).ok())
    }

    pub fn with_key(mut self, slot: CredentialSlot, key: impl Into<String>) -> Self {
        self.set(slot, Some(key.into()));
        self
    }

    pub fn get(&self, slot: CredentialSlot) -> Option<&str> {
        match slot {
            CredentialSlot::OpenAi => self.openai.as_deref(),
            CredentialSlot::Gemini => self.gemini.as_deref(),
            CredentialSlot::OpenRouter => self.openrouter.as_deref(),
        }
    }

    fn set(&mut self, slot: CredentialSlot, value: Option<String>) {
        match slot {
            CredentialSlot::OpenAi => self.openai = value,
            CredentialSlot::Gemini => self.gemini = value,
            CredentialSlot::OpenRouter => self.openrouter = value,
        }
    }
}
