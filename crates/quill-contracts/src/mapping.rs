//! Routing of generated fields onto a content repository.
//!
//! A mapping table (`generated_field -> {type, field}`) decides where each
//! flattened field lands: a native post column, a meta key, or taxonomy terms.
//! Fields without a mapping use the fixed defaults in [`resolve_write_plan`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::fold_token;
use crate::results::{PipelineResult, ThumbnailAsset};

pub const GENERATED_FIELDS: [&str; 9] = [
    "title",
    "content",
    "excerpt",
    "meta_title",
    "meta_description",
    "focus_keyword",
    "secondary_keywords",
    "tags",
    "thumbnail",
];

pub const NATIVE_KEYS: [&str; 3] = ["title", "content", "excerpt"];

pub const RANK_MATH_TITLE: &str = "rank_math_title";
pub const RANK_MATH_DESCRIPTION: &str = "rank_math_description";
pub const RANK_MATH_FOCUS_KEYWORD: &str = "rank_math_focus_keyword";
pub const DEFAULT_TAG_TAXONOMY: &str = "post_tag";
pub const CATEGORY_TAXONOMY: &str = "category";
const MAX_SECONDARY_KEYWORDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Native,
    Meta,
    Taxonomy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    #[serde(rename = "field")]
    pub target_key: String,
}

impl FieldMapping {
    pub fn new(target_type: TargetType, target_key: impl Into<String>) -> Self {
        Self {
            target_type,
            target_key: target_key.into(),
        }
    }
}

/// Mapping table for one post type, keyed by generated field name.
pub type FieldMappings = IndexMap<String, FieldMapping>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("title index {index} is out of range for {count} titles")]
    TitleIndexOutOfRange { index: usize, count: usize },
    #[error("a post title is required")]
    MissingTitle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(items) => items.iter().all(|item| item.trim().is_empty()),
        }
    }

    fn joined(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::List(items) => items.join(", "),
        }
    }

    fn terms(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::Text(text) => text.split(',').collect(),
            Self::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Logical fields of a generated article, ready for routing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedFields {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub meta_title: String,
    pub meta_description: String,
    pub focus_keyword: String,
    pub secondary_keywords: Vec<String>,
    pub tags: Vec<String>,
    pub slug: String,
    pub thumbnail: Option<ThumbnailAsset>,
}

impl FlattenedFields {
    /// `selected_title_index` defaults to the recommended title.
    pub fn from_result(
        result: &PipelineResult,
        selected_title_index: Option<usize>,
        excerpt: Option<&str>,
    ) -> Result<Self, MappingError> {
        let count = result.titles.titles.len();
        let index = selected_title_index.unwrap_or(result.titles.recommended);
        let title = result
            .titles
            .titles
            .get(index)
            .map(|entry| entry.title.clone())
            .ok_or(MappingError::TitleIndexOutOfRange { index, count })?;

        let focus_keyword = if result.seo.focus_keyword.trim().is_empty() {
            result.titles.focus_keyword.clone()
        } else {
            result.seo.focus_keyword.clone()
        };

        Ok(Self {
            title,
            content: result.article.clone(),
            excerpt: excerpt.unwrap_or_default().trim().to_string(),
            meta_title: result.seo.meta_title.clone(),
            meta_description: result.seo.meta_description.clone(),
            focus_keyword,
            secondary_keywords: result.seo.secondary_keywords.clone(),
            tags: result.seo.tags.clone(),
            slug: result.seo.slug.clone(),
            thumbnail: result.thumbnail_asset.clone(),
        })
    }

    pub fn value(&self, field: &str) -> Option<FieldValue> {
        let value = match field {
            "title" => FieldValue::Text(self.title.clone()),
            "content" => FieldValue::Text(self.content.clone()),
            "excerpt" => FieldValue::Text(self.excerpt.clone()),
            "meta_title" => FieldValue::Text(self.meta_title.clone()),
            "meta_description" => FieldValue::Text(self.meta_description.clone()),
            "focus_keyword" => FieldValue::Text(self.focus_keyword.clone()),
            "secondary_keywords" => FieldValue::List(self.secondary_keywords.clone()),
            "tags" => FieldValue::List(self.tags.clone()),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Draft,
    Publish,
}

impl PostStatus {
    pub fn parse(raw: &str) -> Self {
        match fold_token(raw).as_str() {
            "publish" | "published" | "publicado" => Self::Publish,
            _ => Self::Draft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostDraft {
    pub post_type: String,
    pub status: PostStatus,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    #[serde(default)]
    pub slug: String,
}

impl PostDraft {
    fn set_native(&mut self, key: &str, value: String) {
        match key {
            "title" => self.title = value,
            "content" => self.content = value,
            "excerpt" => self.excerpt = value,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    SetMeta { key: String, value: String },
    AddTerms { taxonomy: String, terms: Vec<String> },
    ReplaceTerms { taxonomy: String, terms: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTarget {
    Featured,
    Meta(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSeo {
    pub title: String,
    pub alt_text: String,
    pub file_stem: String,
}

impl AttachmentSeo {
    pub fn new(title: &str, focus_keyword: &str) -> Self {
        let keyword = focus_keyword.trim();
        let alt_text = if keyword.is_empty() {
            title.to_string()
        } else {
            format!("{} - {}", uppercase_first(keyword), title)
        };
        let stem_source = if keyword.is_empty() { title } else { keyword };
        let mut file_stem = slugify(stem_source);
        if file_stem.is_empty() {
            file_stem = "thumbnail".to_string();
        }
        Self {
            title: title.to_string(),
            alt_text,
            file_stem,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailPlacement {
    pub target: ImageTarget,
    pub asset: ThumbnailAsset,
    pub seo: AttachmentSeo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub draft: PostDraft,
    pub ops: Vec<WriteOp>,
    pub thumbnail: Option<ThumbnailPlacement>,
}

impl WritePlan {
    /// Assigns the post to `category` when the post is created. Runs ahead of
    /// every mapped write, so a mapping into `category` adds to it.
    pub fn with_category(mut self, category: Option<&str>) -> Self {
        if let Some(category) = category.map(str::trim).filter(|name| !name.is_empty()) {
            self.ops.insert(
                0,
                WriteOp::ReplaceTerms {
                    taxonomy: CATEGORY_TAXONOMY.to_string(),
                    terms: vec![category.to_string()],
                },
            );
        }
        self
    }
}

/// Resolves every generated field into concrete writes.
///
/// Title and content are written through their native mapping or, failing
/// that, to their own column unless a mapping already filled it. Excerpt is
/// resolved last, so a native excerpt mapping overrides earlier writes.
pub fn resolve_write_plan(
    fields: &FlattenedFields,
    mappings: &FieldMappings,
    post_type: &str,
    status: PostStatus,
) -> Result<WritePlan, MappingError> {
    let mut draft = PostDraft {
        post_type: if post_type.trim().is_empty() {
            "post".to_string()
        } else {
            post_type.trim().to_string()
        },
        status,
        slug: fields.slug.trim().to_string(),
        ..PostDraft::default()
    };

    // Title and content first, excerpt last so an excerpt redirect wins.
    let mut written: Vec<&str> = Vec::new();
    for field in ["title", "content"] {
        if let Some(target) = native_target(mappings, field) {
            if let Some(value) = fields.value(field) {
                draft.set_native(target, value.joined());
                written.push(target);
            }
        }
    }
    for field in ["title", "content"] {
        if native_target(mappings, field).is_some() || written.contains(&field) {
            continue;
        }
        if let Some(value) = fields.value(field) {
            draft.set_native(field, value.joined());
        }
    }
    if let Some(value) = fields.value("excerpt") {
        match native_target(mappings, "excerpt") {
            Some(target) => draft.set_native(target, value.joined()),
            None if !written.contains(&"excerpt") => draft.set_native("excerpt", value.joined()),
            None => {}
        }
    }
    if draft.title.trim().is_empty() {
        if fields.title.trim().is_empty() {
            return Err(MappingError::MissingTitle);
        }
        draft.title = fields.title.clone();
    }

    let mut ops = Vec::new();
    for (field, mapping) in mappings {
        if field == "thumbnail" || mapping.target_key.trim().is_empty() {
            continue;
        }
        let Some(value) = fields.value(field) else {
            continue;
        };
        match mapping.target_type {
            TargetType::Native => {}
            TargetType::Meta => ops.push(WriteOp::SetMeta {
                key: mapping.target_key.clone(),
                value: value.joined(),
            }),
            TargetType::Taxonomy => {
                let terms = value.terms();
                if !terms.is_empty() {
                    ops.push(WriteOp::AddTerms {
                        taxonomy: mapping.target_key.clone(),
                        terms,
                    });
                }
            }
        }
    }

    if !mappings.contains_key("tags") && !fields.tags.is_empty() {
        ops.push(WriteOp::ReplaceTerms {
            taxonomy: DEFAULT_TAG_TAXONOMY.to_string(),
            terms: FieldValue::List(fields.tags.clone()).terms(),
        });
    }
    ops.extend(seo_plugin_ops(fields, mappings, &draft.title));

    let thumbnail = fields.thumbnail.clone().map(|asset| {
        let target = match mappings.get("thumbnail") {
            Some(mapping)
                if mapping.target_type == TargetType::Meta
                    && !mapping.target_key.trim().is_empty() =>
            {
                ImageTarget::Meta(mapping.target_key.clone())
            }
            _ => ImageTarget::Featured,
        };
        ThumbnailPlacement {
            target,
            asset,
            seo: AttachmentSeo::new(&draft.title, &fields.focus_keyword),
        }
    });

    Ok(WritePlan {
        draft,
        ops,
        thumbnail,
    })
}

/// Target column of a valid native mapping for `field`.
fn native_target<'a>(mappings: &'a FieldMappings, field: &str) -> Option<&'a str> {
    mappings
        .get(field)
        .filter(|mapping| mapping.target_type == TargetType::Native)
        .map(|mapping| mapping.target_key.as_str())
        .filter(|target| NATIVE_KEYS.contains(target))
}

fn seo_plugin_ops(fields: &FlattenedFields, mappings: &FieldMappings, title: &str) -> Vec<WriteOp> {
    let mut ops = Vec::new();
    if !mappings.contains_key("focus_keyword") {
        let mut keywords = Vec::new();
        if !fields.focus_keyword.trim().is_empty() {
            keywords.push(fields.focus_keyword.trim().to_string());
        }
        keywords.extend(
            fields
                .secondary_keywords
                .iter()
                .map(|keyword| keyword.trim())
                .filter(|keyword| !keyword.is_empty())
                .take(MAX_SECONDARY_KEYWORDS)
                .map(str::to_string),
        );
        if !keywords.is_empty() {
            ops.push(WriteOp::SetMeta {
                key: RANK_MATH_FOCUS_KEYWORD.to_string(),
                value: keywords.join(","),
            });
        }
    }
    if !mappings.contains_key("meta_title") {
        let seo_title = if fields.meta_title.trim().is_empty() {
            title
        } else {
            fields.meta_title.trim()
        };
        ops.push(WriteOp::SetMeta {
            key: RANK_MATH_TITLE.to_string(),
            value: seo_title.to_string(),
        });
    }
    if !mappings.contains_key("meta_description") && !fields.meta_description.trim().is_empty() {
        ops.push(WriteOp::SetMeta {
            key: RANK_MATH_DESCRIPTION.to_string(),
            value: fields.meta_description.trim().to_string(),
        });
    }
    ops
}

/// Destination for resolved write plans.
pub trait ContentRepository {
    fn create_post(&mut self, draft: &PostDraft) -> anyhow::Result<String>;

    fn set_meta(&mut self, post_id: &str, key: &str, value: &str) -> anyhow::Result<()>;

    fn set_terms(
        &mut self,
        post_id: &str,
        taxonomy: &str,
        terms: &[String],
        append: bool,
    ) -> anyhow::Result<()>;

    fn attach_featured_image(
        &mut self,
        post_id: &str,
        asset: &ThumbnailAsset,
        seo: &AttachmentSeo,
    ) -> anyhow::Result<String>;

    fn set_meta_image(
        &mut self,
        post_id: &str,
        key: &str,
        asset: &ThumbnailAsset,
        seo: &AttachmentSeo,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    pub post_id: String,
    pub status: PostStatus,
    pub attachment_id: Option<String>,
    pub meta_keys: Vec<String>,
}

pub fn apply_write_plan<R: ContentRepository + ?Sized>(
    repository: &mut R,
    plan: &WritePlan,
) -> anyhow::Result<SaveReport> {
    let post_id = repository.create_post(&plan.draft)?;
    let mut meta_keys = Vec::new();
    for op in &plan.ops {
        match op {
            WriteOp::SetMeta { key, value } => {
                repository.set_meta(&post_id, key, value)?;
                meta_keys.push(key.clone());
            }
            WriteOp::AddTerms { taxonomy, terms } => {
                repository.set_terms(&post_id, taxonomy, terms, true)?;
            }
            WriteOp::ReplaceTerms { taxonomy, terms } => {
                repository.set_terms(&post_id, taxonomy, terms, false)?;
            }
        }
    }
    let attachment_id = match plan.thumbnail.as_ref() {
        Some(placement) => Some(match &placement.target {
            ImageTarget::Featured => {
                repository.attach_featured_image(&post_id, &placement.asset, &placement.seo)?
            }
            ImageTarget::Meta(key) => {
                meta_keys.push(key.clone());
                repository.set_meta_image(&post_id, key, &placement.asset, &placement.seo)?
            }
        }),
        None => None,
    };
    Ok(SaveReport {
        post_id,
        status: plan.draft.status,
        attachment_id,
        meta_keys,
    })
}

/// Lowercase ASCII slug with accents folded and runs of other characters
/// collapsed into single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in fold_token(text).chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn uppercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
