//! Best-effort recovery of structured data from free-form model text.

use quill_contracts::results::{ReviewVerdict, SeoMetadata, TitleSet};
use serde_json::{Map, Value};

const SUMMARY_MAX_CHARS: usize = 500;

/// Removes one leading ```` ``` ````/```` ```lang ```` line and one trailing fence.
/// A language tag is only dropped when a newline follows it, so a fence that
/// opens on the same line as the text keeps every word. Text without fences is
/// returned trimmed, so applying it twice is a no-op.
pub fn strip_code_fence(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.split_once('\n') {
            Some((tag, body)) if is_fence_tag(tag.trim()) => body.trim_start(),
            _ => rest.trim_start(),
        };
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text.to_string()
}

fn is_fence_tag(tag: &str) -> bool {
    tag.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// Direct parse first, then the first-`{` to last-`}` span. Objects only.
pub fn extract_json(raw_text: &str) -> Option<Map<String, Value>> {
    let cleaned = strip_code_fence(raw_text);
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&cleaned) {
        return Some(object);
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Unreadable output is a "not approved" verdict so the loop keeps going.
pub fn parse_verdict(raw_text: &str) -> ReviewVerdict {
    match extract_json(raw_text) {
        Some(object) => ReviewVerdict::from_object(&object, raw_text),
        None => ReviewVerdict::unreadable(raw_text),
    }
}

pub fn parse_titles(raw_text: &str, desired_title: &str) -> TitleSet {
    extract_json(raw_text)
        .and_then(|object| TitleSet::from_object(&object))
        .unwrap_or_else(|| TitleSet::fallback(desired_title))
}

pub fn parse_seo(raw_text: &str, desired_title: &str) -> SeoMetadata {
    extract_json(raw_text)
        .map(|object| SeoMetadata::from_object(&object))
        .unwrap_or_else(|| SeoMetadata::fallback(desired_title))
}

/// Drops surrounding quotes and a leading `Prompt:` / `Image Prompt:` label.
pub fn clean_thumbnail_prompt(raw: &str) -> String {
    let mut text = trim_quotes(&strip_code_fence(raw)).to_string();
    for label in ["image prompt:", "prompt:"] {
        if text.len() >= label.len()
            && text.is_char_boundary(label.len())
            && text[..label.len()].eq_ignore_ascii_case(label)
        {
            text = text[label.len()..].trim().to_string();
            break;
        }
    }
    trim_quotes(&text).to_string()
}

fn trim_quotes(text: &str) -> &str {
    text.trim()
        .trim_matches(|ch| ch == '"' || ch == '\'' || ch == '“' || ch == '”')
        .trim()
}

/// Plain-text digest of an HTML article: tags removed, first 500 characters
/// cut back to the last whole word, then `...`.
pub fn article_summary(article_html: &str) -> String {
    let text = strip_html_tags(article_html);
    if text.chars().count() <= SUMMARY_MAX_CHARS {
        return format!("{text}...");
    }
    let clipped: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
    let cut = match clipped.rfind(char::is_whitespace) {
        Some(index) => clipped[..index].trim_end(),
        None => clipped.as_str(),
    };
    format!("{cut}...")
}

/// Tag stripping with `<script>`/`<style>` bodies removed and whitespace collapsed.
pub fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let lower = after
            .get(..8)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let skip_block = ["<script", "<style"]
            .into_iter()
            .find(|tag| lower.starts_with(tag))
            .map(|tag| format!("</{}", &tag[1..]));
        if let Some(closing) = skip_block {
            let lowered = after.to_ascii_lowercase();
            rest = match lowered.find(&closing) {
                Some(index) => match after[index..].find('>') {
                    Some(end) => &after[index + end + 1..],
                    None => "",
                },
                None => "",
            };
            out.push(' ');
            continue;
        }
        rest = match after.find('>') {
            Some(end) => &after[end + 1..],
            None => "",
        };
        out.push(' ');
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Clips to `max_chars` characters without a marker; used for prompt context.
pub fn clip_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_fence_and_is_idempotent() {
        let once = strip_code_fence("```html\n<p>x</p>\n```");
        assert_eq!(once, "<p>x</p>");
        assert_eq!(strip_code_fence(&once), once);
        assert_eq!(strip_code_fence("```\n<h2>a</h2>```"), "<h2>a</h2>");
        assert_eq!(strip_code_fence("  <p>plain</p> "), "<p>plain</p>");
    }

    #[test]
    fn same_line_fence_keeps_first_word() {
        assert_eq!(strip_code_fence("```Hello world```"), "Hello world");
        assert_eq!(strip_code_fence("```json \n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(
            extract_json("```json {\"approved\": true}```").unwrap()["approved"],
            Value::Bool(true)
        );
    }

    #[test]
    fn extracts_direct_fenced_and_embedded_objects() {
        assert_eq!(
            extract_json(r#"{"approved": true}"#).unwrap()["approved"],
            Value::Bool(true)
        );
        assert!(extract_json("```json\n{\"a\": 1}\n```").is_some());
        let embedded = extract_json("Here is the verdict: {\"approved\": false} hope it helps").unwrap();
        assert_eq!(embedded["approved"], Value::Bool(false));
    }

    #[test]
    fn rejects_non_objects_and_prose() {
        assert!(extract_json("[1, 2, 3]").is_none());
        assert!(extract_json("\"text\"").is_none());
        assert!(extract_json("The article looks great, approved!").is_none());
        assert!(extract_json("} backwards {").is_none());
        assert!(extract_json("").is_none());
    }

    #[test]
    fn prose_verdict_is_not_approved() {
        let verdict = parse_verdict("Aprovado! \"approved\": true, looks fine");
        assert!(!verdict.approved);
        assert!(verdict.issues.is_empty());
        assert!(verdict.raw.contains("Aprovado"));
    }

    #[test]
    fn title_and_seo_fallbacks() {
        let titles = parse_titles("not json", "Guia de SEO");
        assert_eq!(titles.titles[0].title, "Guia de SEO");
        assert_eq!(titles.recommended, 0);

        let seo = parse_seo("nope", "Guia de SEO");
        assert_eq!(seo.meta_title, "Guia de SEO");
        assert!(seo.tags.is_empty());
    }

    #[test]
    fn thumbnail_prompt_cleanup() {
        assert_eq!(
            clean_thumbnail_prompt("\"Image Prompt: A sunlit desk with a laptop\""),
            "A sunlit desk with a laptop"
        );
        assert_eq!(clean_thumbnail_prompt("Prompt: 'quiet harbor'"), "quiet harbor");
        assert_eq!(clean_thumbnail_prompt("   "), "");
    }

    #[test]
    fn summary_strips_tags_and_cuts_at_word() {
        let short = article_summary("<h2 id=\"a\">Title</h2><p>Body <b>text</b></p>");
        assert_eq!(short, "Title Body text...");

        let long_html = format!("<p>{}</p>", "palavra ".repeat(100));
        let summary = article_summary(&long_html);
        assert!(summary.ends_with("palavra..."));
        assert!(summary.chars().count() <= SUMMARY_MAX_CHARS + 3);
    }

    #[test]
    fn script_and_style_bodies_are_dropped() {
        assert_eq!(
            strip_html_tags("<style>p{color:red}</style><p>ok</p><SCRIPT>x()</SCRIPT>"),
            "ok"
        );
    }
}
