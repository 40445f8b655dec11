use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::LogEntry;
use crate::request::TextProviderKind;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub overall_score: f64,
    #[serde(default)]
    pub checklist: BTreeMap<String, bool>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Reviewer text exactly as returned; fed back to the writer on rewrite.
    #[serde(default)]
    pub raw: String,
}

impl ReviewVerdict {
    /// Not approved, no findings. Used whenever the reviewer output cannot be read.
    pub fn unreadable(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Self::default()
        }
    }

    /// Strict reading: only an explicit `approved` flag approves.
    pub fn from_object(object: &Map<String, Value>, raw: impl Into<String>) -> Self {
        let approved = object.get("approved").and_then(value_as_bool).unwrap_or(false);
        let scores = object
            .get("scores")
            .and_then(Value::as_object)
            .map(|rows| {
                rows.iter()
                    .filter_map(|(key, value)| value_as_f64(value).map(|score| (key.clone(), score)))
                    .collect()
            })
            .unwrap_or_default();
        let checklist = object
            .get("checklist")
            .or_else(|| object.get("rank_math_checklist"))
            .and_then(Value::as_object)
            .map(|rows| {
                rows.iter()
                    .filter_map(|(key, value)| value_as_bool(value).map(|flag| (key.clone(), flag)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            approved,
            scores,
            overall_score: object
                .get("overall_score")
                .and_then(value_as_f64)
                .unwrap_or(0.0),
            checklist,
            issues: coerce_text_list(object.get("issues")),
            suggestions: coerce_text_list(object.get("suggestions")),
            raw: raw.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub iteration: u32,
    pub verdict: ReviewVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleEntry {
    pub title: String,
    pub style_tag: String,
    pub char_count: usize,
    #[serde(default)]
    pub has_number: bool,
}

impl TitleEntry {
    pub fn new(title: impl Into<String>, style_tag: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            char_count: title.chars().count(),
            has_number: title.chars().any(|ch| ch.is_ascii_digit()),
            style_tag: style_tag.into(),
            title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleSet {
    pub titles: Vec<TitleEntry>,
    pub recommended: usize,
    #[serde(default)]
    pub focus_keyword: String,
}

impl TitleSet {
    /// Single-entry set built from the title the user asked for.
    pub fn fallback(desired_title: &str) -> Self {
        Self {
            titles: vec![TitleEntry::new(desired_title.trim(), "original")],
            recommended: 0,
            focus_keyword: String::new(),
        }
    }

    /// Returns `None` when the object holds no usable title.
    pub fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let rows = object.get("titles").and_then(Value::as_array)?;
        let mut titles = Vec::new();
        for row in rows {
            let entry = match row {
                Value::String(text) => TitleEntry::new(text.trim(), ""),
                Value::Object(fields) => {
                    let Some(text) = fields.get("title").and_then(Value::as_str) else {
                        continue;
                    };
                    let style = fields
                        .get("style")
                        .or_else(|| fields.get("style_tag"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    TitleEntry::new(text.trim(), style.trim())
                }
                _ => continue,
            };
            if !entry.title.is_empty() {
                titles.push(entry);
            }
        }
        if titles.is_empty() {
            return None;
        }
        let recommended = object
            .get("recommended")
            .and_then(value_as_f64)
            .filter(|value| *value >= 0.0)
            .map(|value| value as usize)
            .filter(|index| *index < titles.len())
            .unwrap_or(0);
        Some(Self {
            titles,
            recommended,
            focus_keyword: object
                .get("focus_keyword")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
        })
    }

    pub fn recommended_title(&self) -> Option<&TitleEntry> {
        self.titles.get(self.recommended)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeoMetadata {
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub focus_keyword: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub faq: Vec<FaqEntry>,
}

impl SeoMetadata {
    pub fn fallback(desired_title: &str) -> Self {
        Self {
            meta_title: desired_title.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let faq = object
            .get("faq")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let question = row.get("question").and_then(Value::as_str)?.trim();
                        let answer = row.get("answer").and_then(Value::as_str)?.trim();
                        if question.is_empty() || answer.is_empty() {
                            return None;
                        }
                        Some(FaqEntry {
                            question: question.to_string(),
                            answer: answer.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            meta_title: text("meta_title"),
            meta_description: text("meta_description"),
            focus_keyword: text("focus_keyword"),
            slug: text("slug"),
            secondary_keywords: coerce_text_list(object.get("secondary_keywords")),
            tags: coerce_text_list(object.get("tags")),
            faq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailAsset {
    pub mime_type: String,
    pub data: String,
    pub data_original: String,
    pub width: u32,
    pub height: u32,
}

pub const IMPROVED_MAX_CHARS: usize = 500;

/// Output of the description improver. Lengths count characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovedDescription {
    pub improved: String,
    pub original_length: usize,
    pub improved_length: usize,
}

impl ImprovedDescription {
    /// Trims the reply and cuts it to 497 characters plus `...` when it runs long.
    pub fn from_reply(original: &str, reply: &str) -> Self {
        let trimmed = reply.trim();
        let improved = if trimmed.chars().count() > IMPROVED_MAX_CHARS {
            let mut clipped: String = trimmed.chars().take(IMPROVED_MAX_CHARS - 3).collect();
            clipped.push_str("...");
            clipped
        } else {
            trimmed.to_string()
        };
        Self {
            original_length: original.chars().count(),
            improved_length: improved.chars().count(),
            improved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub text_provider: TextProviderKind,
    pub briefing: String,
    pub article: String,
    pub reviews: Vec<ReviewRecord>,
    pub iteration_count: u32,
    pub titles: TitleSet,
    pub seo: SeoMetadata,
    pub thumbnail_prompt: Option<String>,
    pub thumbnail_asset: Option<ThumbnailAsset>,
    pub execution_log: Vec<LogEntry>,
}

impl PipelineResult {
    pub fn final_verdict(&self) -> Option<&ReviewVerdict> {
        self.reviews.last().map(|record| &record.verdict)
    }

    pub fn approved(&self) -> bool {
        self.final_verdict()
            .map(|verdict| verdict.approved)
            .unwrap_or(false)
    }
}

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|raw| raw != 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts a JSON array of strings or a comma-separated string.
pub fn coerce_text_list(value: Option<&Value>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let raw_items: Vec<String> = match value {
        Value::Array(rows) => rows
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(text) => text.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    raw_items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
