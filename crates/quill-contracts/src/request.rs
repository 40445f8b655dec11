use serde::{Deserialize, Serialize};

use crate::errors::RequestError;

pub const DEFAULT_WORD_COUNT: u32 = 1500;
pub const SUBJECT_CONTEXT_SOFT_LIMIT: usize = 500;

/// Declares a token enum that parses case-insensitively and falls back to a
/// default variant for unknown input. The phrase is the descriptive text the
/// interpreter prompt receives for that token.
macro_rules! token_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        { $( $variant:ident => $token:literal, $phrase:literal ; )+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            pub fn parse(raw: &str) -> Self {
                let normalized = fold_token(raw);
                $(
                    if normalized == $token {
                        return Self::$variant;
                    }
                )+
                Self::$default
            }

            pub fn token(&self) -> &'static str {
                match self {
                    $( Self::$variant => $token, )+
                }
            }

            pub fn phrase(&self) -> &'static str {
                match self {
                    $( Self::$variant => $phrase, )+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.token().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.token())
            }
        }
    };
}

token_enum! {
    /// Voice of the article.
    Tone, default = Neutro,
    {
        Auto => "auto", "choose the tone that best fits the context";
        Neutro => "neutro", "neutral and objective";
        Profissional => "profissional", "professional and technical";
        Informal => "informal", "informal and relaxed";
        Informativo => "informativo", "informative and educational";
        Jornalistico => "jornalistico", "journalistic, factual and impartial";
        Marketing => "marketing", "persuasive and engaging, aimed at conversion";
        Energetico => "energetico", "energetic and vibrant";
        Amigavel => "amigavel", "friendly and welcoming";
        Serio => "serio", "serious and formal";
        Otimista => "otimista", "optimistic and positive";
        Pensativo => "pensativo", "thoughtful and reflective";
        Esperancoso => "esperancoso", "hopeful and inspiring";
    }
}

token_enum! {
    /// Structural format of the article.
    WritingType, default = Artigo,
    {
        Auto => "auto", "choose the most suitable format";
        Artigo => "artigo", "an in-depth, complete blog article";
        Sumario => "sumario", "an executive summary with key points";
        Noticia => "noticia", "an up-to-date news story";
        Listicle => "listicle", "a listicle with numbered, organized items";
        Tutorial => "tutorial", "a practical step-by-step tutorial";
        Review => "review", "a detailed review with pros and cons";
        Entrevista => "entrevista", "an interview in question-and-answer format";
        Aida => "aida", "an AIDA structure (Attention, Interest, Desire, Action)";
    }
}

token_enum! {
    /// Grammatical person the article is narrated in.
    NarrativePerson, default = Third,
    {
        Auto => "auto", "choose the most suitable narrative person";
        FirstSingular => "1s", "first person singular (I, my)";
        FirstPlural => "1p", "first person plural (we, our)";
        Second => "2", "second person (you, your)";
        Third => "3", "impersonal third person (he, she, they)";
    }
}

token_enum! {
    TextProviderKind, default = OpenAi,
    {
        OpenAi => "openai", "OpenAI chat completions";
        Gemini => "gemini", "Gemini generateContent";
    }
}

token_enum! {
    ImageProviderKind, default = Gemini,
    {
        Dalle => "dalle", "DALL-E image generation";
        Gemini => "gemini", "Gemini image generation";
        OpenRouter => "openrouter", "OpenRouter chat with image modality";
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub desired_title: String,
    pub subject_context: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub writing_type: WritingType,
    #[serde(default, alias = "person_type")]
    pub narrative_person: NarrativePerson,
    #[serde(default = "default_word_count", alias = "word_count")]
    pub target_word_count: u32,
    #[serde(default)]
    pub generate_thumbnail: bool,
    #[serde(default)]
    pub thumbnail_provider: ImageProviderKind,
    #[serde(default = "default_thumbnail_format")]
    pub thumbnail_format: String,
    #[serde(default, alias = "text_ai")]
    pub text_provider: TextProviderKind,
}

impl GenerationRequest {
    pub fn new(desired_title: impl Into<String>, subject_context: impl Into<String>) -> Self {
        Self {
            desired_title: desired_title.into(),
            subject_context: subject_context.into(),
            tone: Tone::default(),
            writing_type: WritingType::default(),
            narrative_person: NarrativePerson::default(),
            target_word_count: DEFAULT_WORD_COUNT,
            generate_thumbnail: false,
            thumbnail_provider: ImageProviderKind::default(),
            thumbnail_format: default_thumbnail_format(),
            text_provider: TextProviderKind::default(),
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.desired_title.trim().is_empty() {
            return Err(RequestError::EmptyTitle);
        }
        if self.subject_context.trim().is_empty() {
            return Err(RequestError::EmptyContext);
        }
        if self.target_word_count == 0 {
            return Err(RequestError::InvalidWordCount);
        }
        Ok(())
    }

    pub fn context_exceeds_soft_limit(&self) -> bool {
        self.subject_context.chars().count() > SUBJECT_CONTEXT_SOFT_LIMIT
    }
}

fn default_word_count() -> u32 {
    DEFAULT_WORD_COUNT
}

fn default_thumbnail_format() -> String {
    "16:9".to_string()
}

/// Lowercases and strips the Portuguese accents the wizard tokens may carry.
pub(crate) fn fold_token(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'a',
            'é' | 'ê' | 'É' | 'Ê' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'o',
            'ú' | 'Ú' => 'u',
            'ç' | 'Ç' => 'c',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tokens_parse_case_and_accent_insensitively() {
        assert_eq!(Tone::parse("Jornalístico"), Tone::Jornalistico);
        assert_eq!(Tone::parse("SÉRIO"), Tone::Serio);
        assert_eq!(WritingType::parse(" Notícia "), WritingType::Noticia);
        assert_eq!(NarrativePerson::parse("1p"), NarrativePerson::FirstPlural);
    }

    #[test]
    fn unknown_tokens_fall_back_to_defaults() {
        assert_eq!(Tone::parse("sarcastic"), Tone::Neutro);
        assert_eq!(WritingType::parse("poem"), WritingType::Artigo);
        assert_eq!(NarrativePerson::parse("Terceira pessoa"), NarrativePerson::Third);
        assert_eq!(TextProviderKind::parse("claude"), TextProviderKind::OpenAi);
        assert_eq!(ImageProviderKind::parse(""), ImageProviderKind::Gemini);
    }

    #[test]
    fn auto_tokens_carry_model_choice_phrases() {
        assert!(Tone::Auto.phrase().contains("choose"));
        assert!(WritingType::Auto.phrase().contains("choose"));
        assert!(NarrativePerson::Auto.phrase().contains("choose"));
    }

    #[test]
    fn request_deserializes_with_defaults_and_aliases() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "desired_title": "Guia de SEO",
            "subject_context": "dicas de SEO para pequenas empresas",
            "tone": "neutro",
            "writing_type": "artigo",
            "word_count": 1500,
            "text_ai": "gemini"
        }))
        .unwrap();
        assert_eq!(request.target_word_count, 1500);
        assert_eq!(request.text_provider, TextProviderKind::Gemini);
        assert_eq!(request.narrative_person, NarrativePerson::Third);
        assert_eq!(request.thumbnail_format, "16:9");
        assert!(!request.generate_thumbnail);

        let round = serde_json::to_value(&request).unwrap();
        assert_eq!(round["text_provider"], json!("gemini"));
        assert_eq!(round["tone"], json!("neutro"));
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut request = GenerationRequest::new("Title", "Context");
        assert!(request.validate().is_ok());

        request.desired_title = "   ".to_string();
        assert_eq!(request.validate(), Err(RequestError::EmptyTitle));

        request.desired_title = "Title".to_string();
        request.subject_context.clear();
        assert_eq!(request.validate(), Err(RequestError::EmptyContext));

        request.subject_context = "Context".to_string();
        request.target_word_count = 0;
        assert_eq!(request.validate(), Err(RequestError::InvalidWordCount));
    }

    #[test]
    fn long_context_is_accepted_but_flagged() {
        let request = GenerationRequest::new("Title", "x".repeat(600));
        assert!(request.validate().is_ok());
        assert!(request.context_exceeds_soft_limit());
    }
}
