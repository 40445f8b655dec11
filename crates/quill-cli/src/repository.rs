use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use quill_contracts::mapping::{slugify, AttachmentSeo, ContentRepository, PostDraft, PostStatus};
use quill_contracts::results::ThumbnailAsset;
use quill_engine::optimize::{optimize_for_storage, StorageOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPost {
    pub id: String,
    pub post_type: String,
    pub status: PostStatus,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub terms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub featured_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMedia {
    pub id: String,
    pub post_id: String,
    pub file: String,
    pub mime_type: String,
    pub title: String,
    pub alt_text: String,
    pub width: u32,
    pub height: u32,
}

/// Content repository backed by a directory:
///
/// - `posts/<id>.json` one document per post
/// - `media/<id>.<ext>` storage-optimized image bytes
/// - `media/<id>.json` attachment metadata
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    root: PathBuf,
    storage: StorageOptions,
}

impl DirectoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            storage: StorageOptions::default(),
        }
    }

    pub fn posts_dir(&self) -> PathBuf {
        self.root.join("posts")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    pub fn load_post(&self, post_id: &str) -> Result<StoredPost> {
        let path = self.posts_dir().join(format!("{post_id}.json"));
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("post {post_id} not found at {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn load_media(&self, media_id: &str) -> Result<StoredMedia> {
        let path = self.media_dir().join(format!("{media_id}.json"));
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("attachment {media_id} not found at {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn save_post(&self, post: &StoredPost) -> Result<()> {
        write_json(&self.posts_dir().join(format!("{}.json", post.id)), post)
    }

    fn update_post(&self, post_id: &str, update: impl FnOnce(&mut StoredPost)) -> Result<()> {
        let mut post = self.load_post(post_id)?;
        update(&mut post);
        self.save_post(&post)
    }

    fn store_image(
        &self,
        post_id: &str,
        asset: &ThumbnailAsset,
        seo: &AttachmentSeo,
    ) -> Result<StoredMedia> {
        let source = if asset.data_original.trim().is_empty() {
            &asset.data
        } else {
            &asset.data_original
        };
        let stored = optimize_for_storage(source, self.storage)?;
        let media_dir = self.media_dir();
        let id = next_id(&media_dir, "json")?;
        let file = format!("{id}-{}.{}", seo.file_stem, stored.extension);
        fs::write(media_dir.join(&file), &stored.bytes)
            .with_context(|| format!("failed to write {}", media_dir.join(&file).display()))?;
        let media = StoredMedia {
            id: id.clone(),
            post_id: post_id.to_string(),
            file,
            mime_type: stored.mime_type.to_string(),
            title: seo.title.clone(),
            alt_text: seo.alt_text.clone(),
            width: stored.width,
            height: stored.height,
        };
        write_json(&media_dir.join(format!("{id}.json")), &media)?;
        Ok(media)
    }
}

impl ContentRepository for DirectoryRepository {
    fn create_post(&mut self, draft: &PostDraft) -> Result<String> {
        if draft.title.trim().is_empty() {
            bail!("refusing to create a post without a title");
        }
        let id = next_id(&self.posts_dir(), "json")?;
        let slug = if draft.slug.trim().is_empty() {
            slugify(&draft.title)
        } else {
            slugify(&draft.slug)
        };
        self.save_post(&StoredPost {
            id: id.clone(),
            post_type: draft.post_type.clone(),
            status: draft.status,
            title: draft.title.clone(),
            content: draft.content.clone(),
            excerpt: draft.excerpt.clone(),
            slug,
            meta: BTreeMap::new(),
            terms: BTreeMap::new(),
            featured_image: None,
        })?;
        Ok(id)
    }

    fn set_meta(&mut self, post_id: &str, key: &str, value: &str) -> Result<()> {
        self.update_post(post_id, |post| {
            post.meta.insert(key.to_string(), value.to_string());
        })
    }

    fn set_terms(&mut self, post_id: &str, taxonomy: &str, terms: &[String], append: bool) -> Result<()> {
        self.update_post(post_id, |post| {
            let slot = post.terms.entry(taxonomy.to_string()).or_default();
            if !append {
                slot.clear();
            }
            for term in terms {
                if !slot.iter().any(|existing| existing.eq_ignore_ascii_case(term)) {
                    slot.push(term.clone());
                }
            }
        })
    }

    fn attach_featured_image(
        &mut self,
        post_id: &str,
        asset: &ThumbnailAsset,
        seo: &AttachmentSeo,
    ) -> Result<String> {
        self.load_post(post_id)?;
        let media = self.store_image(post_id, asset, seo)?;
        self.update_post(post_id, |post| post.featured_image = Some(media.id.clone()))?;
        Ok(media.id)
    }

    fn set_meta_image(
        &mut self,
        post_id: &str,
        key: &str,
        asset: &ThumbnailAsset,
        seo: &AttachmentSeo,
    ) -> Result<String> {
        self.load_post(post_id)?;
        let media = self.store_image(post_id, asset, seo)?;
        self.update_post(post_id, |post| {
            post.meta.insert(key.to_string(), media.id.clone());
        })?;
        Ok(media.id)
    }
}

/// One past the largest numeric file stem with `extension` in `dir`.
fn next_id(dir: &Path, extension: &str) -> Result<String> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut highest = 0_u64;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|value| value.to_str()) != Some(extension) {
            continue;
        }
        if let Some(number) = path
            .file_stem()
            .and_then(|value| value.to_str())
            .and_then(|value| value.parse::<u64>().ok())
        {
            highest = highest.max(number);
        }
    }
    Ok((highest + 1).to_string())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut raw = serde_json::to_string_pretty(value)?;
    raw.push('\n');
    fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
}
