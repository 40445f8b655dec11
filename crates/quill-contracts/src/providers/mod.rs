use std::fmt;

use crate::request::{ImageProviderKind, TextProviderKind};

pub trait NamedProvider {
    fn name(&self) -> &str;
}

impl<T: NamedProvider + ?Sized> NamedProvider for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Providers keyed by their selection token, kept in registration order.
#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

impl<T: NamedProvider> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
        }
    }
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    /// Adds a provider, replacing any earlier one with the same name.
    pub fn register(&mut self, provider: T) {
        self.providers
            .retain(|existing| existing.name() != provider.name());
        self.providers.push(provider);
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Which stored API key a provider needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialSlot {
    OpenAi,
    Gemini,
    OpenRouter,
}

impl CredentialSlot {
    pub const ALL: [CredentialSlot; 3] = [Self::OpenAi, Self::Gemini, Self::OpenRouter];

    pub fn for_text(kind: TextProviderKind) -> Self {
        match kind {
            TextProviderKind::OpenAi => Self::OpenAi,
            TextProviderKind::Gemini => Self::Gemini,
        }
    }

    /// DALL-E shares the OpenAI key.
    pub fn for_image(kind: ImageProviderKind) -> Self {
        match kind {
            ImageProviderKind::Dalle => Self::OpenAi,
            ImageProviderKind::Gemini => Self::Gemini,
            ImageProviderKind::OpenRouter => Self::OpenRouter,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" | "dalle" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn env_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "QUILL_OPENAI_API_KEY",
            Self::Gemini => "QUILL_GEMINI_API_KEY",
            Self::OpenRouter => "QUILL_OPENROUTER_API_KEY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
            Self::OpenRouter => "OpenRouter",
        }
    }
}

impl fmt::Display for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{CredentialSlot, NamedProvider, ProviderRegistry};
    use crate::request::{ImageProviderKind, TextProviderKind};

    #[derive(Clone, Debug)]
    struct DummyProvider {
        name: String,
        tag: u8,
    }

    impl NamedProvider for DummyProvider {
        fn name(&self) -> &str {
            self.name.as_str()
        }
    }

    fn dummy(name: &str, tag: u8) -> DummyProvider {
        DummyProvider {
            name: name.to_string(),
            tag,
        }
    }

    #[test]
    fn registry_lists_sorted_but_keeps_registration_order() {
        let registry = ProviderRegistry::new(vec![dummy("z", 0), dummy("a", 0), dummy("m", 0)]);
        assert_eq!(registry.list(), vec!["a", "m", "z"]);
        assert_eq!(
            registry
                .providers()
                .iter()
                .map(|provider| provider.name().to_string())
                .collect::<Vec<String>>(),
            vec!["z", "a", "m"]
        );
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ProviderRegistry::default();
        assert!(registry.is_empty());
        registry.register(dummy("gemini", 1));
        registry.register(dummy("openai", 2));
        registry.register(dummy("gemini", 3));
        assert_eq!(registry.providers().len(), 2);
        assert_eq!(registry.get("gemini").map(|provider| provider.tag), Some(3));
        assert!(registry.get("dalle").is_none());
    }

    #[test]
    fn boxed_trait_objects_are_named() {
        let boxed: Box<dyn NamedProvider> = Box::new(dummy("openrouter", 0));
        let registry = ProviderRegistry::new(vec![boxed]);
        assert!(registry.get("openrouter").is_some());
    }

    #[test]
    fn dalle_uses_openai_credential() {
        assert_eq!(
            CredentialSlot::for_image(ImageProviderKind::Dalle),
            CredentialSlot::OpenAi
        );
        assert_eq!(
            CredentialSlot::for_text(TextProviderKind::Gemini),
            CredentialSlot::Gemini
        );
        assert_eq!(CredentialSlot::parse("OpenRouter"), Some(CredentialSlot::OpenRouter));
        assert_eq!(CredentialSlot::parse("claude"), None);
    }
}
