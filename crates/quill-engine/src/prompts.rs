//! Agent prompts. Structural and SEO rules below are instructions to the
//! model only; nothing downstream enforces them.

use quill_contracts::request::GenerationRequest;

use crate::extract::{article_summary, clip_chars};
use crate::text::{ChatMessage, CompletionRequest};

pub const BRIEFING_CLIP_CHARS: usize = 1000;
pub const TITLES_ARTICLE_CLIP_CHARS: usize = 1500;
pub const SEO_ARTICLE_CLIP_CHARS: usize = 2500;

pub fn interpreter(request: &GenerationRequest, language: &str) -> CompletionRequest {
    let system = format!(
        "You are the briefing analyst of an editorial team that publishes SEO content.\n\
         Turn the input into a structured briefing for an article that:\n\
         - ranks on Google by showing experience, expertise, authority and trust\n\
         - answers the reader's search intent\n\
         - follows Google's helpful content guidelines\n\
         - is original, deep and genuinely useful\n\n\
         The briefing must cover:\n\
         1. Main goal and search intent\n\
         2. Target audience and their pain points\n\
         3. Ideal outline with suggested H2/H3 headings\n\
         4. Distinctive key points to cover\n\
         5. Primary and semantically related keywords\n\
         6. Related frequently asked questions (for the FAQ)\n\
         7. Specific tone and style notes\n\
         8. What to avoid (cliches, shallow content)\n\n\
         Write the briefing in {language}, in a structured layout."
    );
    let user = format!(
        "Build a complete SEO briefing for:\n\n\
         SUGGESTED TITLE: {title}\n\
         SUBJECT / CONTEXT: {context}\n\n\
         REQUIREMENTS:\n\
         - Tone of voice: {tone}\n\
         - Content format: {format}\n\
         - Narrative person: {person}\n\
         - Length: about {words} words\n\n\
         The content must show real first-hand experience with the subject.",
        title = request.desired_title.trim(),
        context = request.subject_context.trim(),
        tone = request.tone.phrase(),
        format = request.writing_type.phrase(),
        person = request.narrative_person.phrase(),
        words = request.target_word_count,
    );
    CompletionRequest::new(system, user).temperature(0.5)
}

pub fn writer(briefing: &str, reviewer_feedback: Option<&str>, language: &str) -> CompletionRequest {
    let system = format!(
        "You are the staff writer, an SEO copywriter who writes for the Rank Math plugin.\n\n\
         MANDATORY RULES:\n\
         1. Structure\n\
         - After the first paragraph add a table of contents:\n\
           <div class=\"wp-block-rank-math-toc-block\"><h2>Contents</h2><nav><ul><li><a href=\"#section1\">Section 1</a></li></ul></nav></div>\n\
         - Give every H2/H3 an id anchor, e.g. <h2 id=\"section1\">Heading with keyword</h2>\n\
         - Keep paragraphs to 2-4 lines and use ul/ol lists for scannability\n\
         2. Keyword\n\
         - Exact keyword in the first 10% of the text\n\
         - Keyword in at least two H2/H3 headings\n\
         - Density between 0.5% and 1.5%, with natural variations\n\
         3. Links\n\
         - 2-3 external links to reliable sources: <a href=\"URL\" target=\"_blank\" rel=\"dofollow\">anchor</a>\n\
         - 1-2 internal link suggestions as [INTERNAL_LINK: suggested anchor]\n\
         4. Images\n\
         - 2-3 placeholders as [IMAGE: detailed description | alt=\"text with keyword\"]\n\
         5. Experience and authority: concrete data, examples and sources\n\
         6. Human voice: no filler openers such as \"In today's world\", vary sentence length\n\
         7. End with an FAQ block:\n\
           <div class=\"rank-math-faq-block\"><div class=\"rank-math-faq-item\"><h3 class=\"rank-math-question\">Question with keyword?</h3>\
         <div class=\"rank-math-answer\">Answer of 40-60 words.</div></div></div>\n\n\
         OUTPUT FORMAT:\n\
         - Reply with the article HTML only, compatible with the Gutenberg editor\n\
         - No markdown code fences and no commentary before or after the HTML\n\
         - Start directly with the first HTML tag\n\
         - Write the article in {language}"
    );
    let mut user = format!("SEO BRIEFING:\n{briefing}\n\n");
    if let Some(feedback) = reviewer_feedback.filter(|text| !text.trim().is_empty()) {
        user.push_str(&format!(
            "REVIEWER FEEDBACK (revise the article to address it):\n{feedback}\n\n"
        ));
    }
    user.push_str("Now write the complete SEO-optimized article following every rule.");
    CompletionRequest::new(system, user)
        .temperature(0.7)
        .max_tokens(4096)
}

pub fn reviewer(article: &str, briefing: &str) -> CompletionRequest {
    let system = "You are the reviewing editor, a Rank Math SEO specialist. Check the article against this list:\n\
         - keyword in the first 10% of the text and density between 0.5% and 1.5%\n\
         - at least 1000 words\n\
         - table of contents present, keyword in at least one H2/H3, short paragraphs\n\
         - external dofollow links and internal link suggestions present\n\
         - image placeholders with alt text containing the keyword\n\
         - FAQ section with schema markup, questions containing the keyword\n\
         - no AI cliches, natural and fluent language\n\n\
         Score each dimension from 0 to 10: seo, eeat (experience, expertise, authority), \
         humanization, engagement.\n\n\
         Reply with JSON only:\n\
         {\n\
           \"approved\": true or false (approve when the average is 8 or more),\n\
           \"scores\": {\"seo\": 0, \"eeat\": 0, \"humanization\": 0, \"engagement\": 0},\n\
           \"overall_score\": 0,\n\
           \"rank_math_checklist\": {\"keyword_in_first_10_percent\": false, \"keyword_density_ok\": false, \
         \"has_toc\": false, \"keyword_in_subheadings\": false, \"has_external_links\": false, \
         \"has_internal_links\": false, \"has_images_with_alt\": false, \"has_faq\": false},\n\
           \"issues\": [\"specific problem\"],\n\
           \"suggestions\": [\"specific improvement\"]\n\
         }";
    let user = format!("BRIEFING:\n{briefing}\n\nARTICLE:\n{article}\n\nReview it critically.");
    CompletionRequest::new(system, user).temperature(0.3)
}

pub fn thumbnail(article: &str, desired_title: &str, focus: &str) -> CompletionRequest {
    let system = "You write image-generation prompts for professional blog thumbnails.\n\n\
         Build the prompt from: a style prefix (editorial photograph, cinematic wide shot, \
         commercial photography, hyperrealistic digital art or minimalist illustration), \
         a concrete main subject that represents the topic, composition and framing, lighting, \
         a palette of 2-3 dominant colors, the mood, and technical specs \
         (8K resolution, sharp focus, depth of field, professional color grading).\n\n\
         STRICT RULES:\n\
         - NO text, letters, words or typography in the image\n\
         - NO recognizable faces or real people\n\
         - NO logos, brands or watermarks\n\
         - Prefer a symbolic representation of the topic that reads well at small sizes\n\
         - Write in English only\n\n\
         OUTPUT: a single paragraph of 80-120 words, no quotes, no bullet points.";
    let user = format!(
        "Write an image prompt for this article.\n\n\
         TITLE: {title}\n\
         MAIN TOPIC: {focus}\n\
         ARTICLE SUMMARY: {summary}\n\n\
         The image should communicate the theme at a glance and stand out as a thumbnail.",
        title = desired_title.trim(),
        focus = focus.trim(),
        summary = article_summary(article),
    );
    CompletionRequest::new(system, user)
        .temperature(0.8)
        .max_tokens(400)
}

pub fn titles(article: &str, briefing: &str, language: &str) -> CompletionRequest {
    let system = format!(
        "You write SEO titles for the Rank Math plugin.\n\n\
         RULES:\n\
         1. The keyword goes in the first 3-4 words of every title\n\
         2. At least two of the four titles contain a number (odd numbers such as 5, 7 or 15 work best)\n\
         3. At most 55 characters per title\n\
         4. Preferred shape: [Keyword]: [Number] [Benefit] [Year/Context]\n\n\
         Produce exactly 4 titles: number-led, a second number-led variant, a question, a direct benefit.\n\
         Write the titles in {language}.\n\n\
         Reply with JSON only:\n\
         {{\n\
           \"titles\": [\n\
             {{\"title\": \"Keyword: 7 Benefits...\", \"style\": \"number\", \"characters\": 0, \"has_number\": true}},\n\
             {{\"title\": \"Keyword: 10 Steps...\", \"style\": \"number\", \"characters\": 0, \"has_number\": true}},\n\
             {{\"title\": \"Keyword: How...?\", \"style\": \"question\", \"characters\": 0, \"has_number\": false}},\n\
             {{\"title\": \"Keyword: Guide...\", \"style\": \"benefit\", \"characters\": 0, \"has_number\": false}}\n\
           ],\n\
           \"recommended\": 0,\n\
           \"focus_keyword\": \"identified keyword\"\n\
         }}"
    );
    let user = format!(
        "BRIEFING:\n{}\n\nARTICLE (excerpt):\n{}\n\nGenerate 4 professional titles.",
        clip_chars(briefing, BRIEFING_CLIP_CHARS),
        clip_chars(article, TITLES_ARTICLE_CLIP_CHARS),
    );
    CompletionRequest::new(system, user).temperature(0.8)
}

pub fn seo(article: &str, briefing: &str, language: &str) -> CompletionRequest {
    let system = format!(
        "You produce Rank Math SEO metadata that passes every Rank Math test.\n\n\
         - meta_title: exact keyword first, contains a number, at most 55 characters\n\
         - meta_description: keyword first, 120-145 characters, ends with a call to action\n\
         - focus_keyword: a short real search term of 2-4 words that appears in title and description\n\
         - slug: contains the focus keyword, hyphens only, no stop words, at most 50 characters\n\
         - secondary_keywords: 4-5 variations or related terms\n\
         - tags: 5 relevant tags including the focus keyword\n\
         - faq: 3 questions with answers of 40-60 words\n\
         Write every value in {language}.\n\n\
         Reply with JSON only:\n\
         {{\n\
           \"meta_title\": \"...\",\n\
           \"meta_description\": \"...\",\n\
           \"focus_keyword\": \"...\",\n\
           \"secondary_keywords\": [\"...\"],\n\
           \"tags\": [\"...\"],\n\
           \"slug\": \"...\",\n\
           \"faq\": [{{\"question\": \"...?\", \"answer\": \"...\"}}]\n\
         }}"
    );
    let user = format!(
        "BRIEFING:\n{}\n\nARTICLE:\n{}\n\nGenerate the SEO metadata and tags.",
        clip_chars(briefing, BRIEFING_CLIP_CHARS),
        clip_chars(article, SEO_ARTICLE_CLIP_CHARS),
    );
    CompletionRequest::new(system, user).temperature(0.4)
}

/// Smallest possible call, used to verify a credential.
/// Single user turn, no system prompt.
pub fn improve_description(text: &str) -> CompletionRequest {
    let user = format!(
        "Improve and expand the following text/description to be clearer and more detailed, \
         keeping the same meaning. Max 500 characters. Reply ONLY with the improved text, \
         no explanations.\n\nOriginal text:\n{text}"
    );
    CompletionRequest::new("", user).temperature(0.7).max_tokens(300)
}

pub fn connection_check() -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::user("Say OK")],
        system: None,
        temperature: 0.0,
        max_tokens: 5,
    }
}
