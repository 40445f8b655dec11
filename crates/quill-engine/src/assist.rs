//! One-shot text helpers that run outside the article pipeline.

use quill_contracts::errors::{AssistError, RequestError};
use quill_contracts::results::ImprovedDescription;

use crate::prompts;
use crate::text::TextProvider;

pub const IMPROVE_MIN_CHARS: usize = 10;

/// Rewrites a short description to be clearer, capped at 500 characters.
pub fn improve_description(
    provider: &dyn TextProvider,
    text: &str,
) -> Result<ImprovedDescription, AssistError> {
    let text = text.trim();
    if text.chars().count() < IMPROVE_MIN_CHARS {
        return Err(RequestError::TextTooShort {
            min: IMPROVE_MIN_CHARS,
        }
        .into());
    }
    let completion = provider.complete(&prompts::improve_description(text))?;
    Ok(ImprovedDescription::from_reply(text, &completion.content))
}
