use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use quill_contracts::errors::{ProviderError, RunError};
use quill_contracts::events::StepStatus;
use quill_contracts::providers::{NamedProvider, ProviderRegistry};
use quill_contracts::request::{GenerationRequest, ImageProviderKind};
use quill_contracts::results::PipelineResult;
use quill_engine::{
    Completion, CompletionRequest, GeneratedImage, ImageProvider, Pipeline, PipelineOptions,
    TextProvider,
};
use serde_json::{json, Map, Value};

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<String, ProviderError>>,
    requests: Vec<CompletionRequest>,
}

#[derive(Clone)]
struct ScriptedText {
    name: &'static str,
    script: Arc<Mutex<Script>>,
}

impl ScriptedText {
    fn new(name: &'static str, replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            name,
            script: Arc::new(Mutex::new(Script {
                replies: replies.into(),
                requests: Vec::new(),
            })),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.script.lock().unwrap().requests.clone()
    }
}

impl NamedProvider for ScriptedText {
    fn name(&self) -> &str {
        self.name
    }
}

impl TextProvider for ScriptedText {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request.clone());
        let reply = script
            .replies
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::MalformedResponse("script exhausted".to_string())))?;
        Ok(Completion {
            content: reply,
            usage: Map::new(),
            model: "scripted".to_string(),
            finish_reason: Some("stop".to_string()),
        })
    }
}

#[derive(Clone)]
struct ScriptedImage {
    name: &'static str,
    reply: Result<GeneratedImage, ProviderError>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl NamedProvider for ScriptedImage {
    fn name(&self) -> &str {
        self.name
    }
}

impl ImageProvider for ScriptedImage {
    fn generate(&self, prompt: &str, aspect_or_size: &str) -> Result<GeneratedImage, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), aspect_or_size.to_string()));
        self.reply.clone()
    }
}

fn png_base64(width: u32, height: u32) -> String {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 140, 60])))
        .write_to(&mut cursor, ImageFormat::Png)
        .unwrap();
    BASE64.encode(cursor.into_inner())
}

fn ok(text: &str) -> Result<String, ProviderError> {
    Ok(text.to_string())
}

fn verdict(approved: bool, score: f64) -> Result<String, ProviderError> {
    let issues = if approved {
        json!([])
    } else {
        json!(["keyword missing from first paragraph"])
    };
    Ok(json!({
        "approved": approved,
        "scores": {"seo": score, "eeat": score, "humanization": score, "engagement": score},
        "overall_score": score,
        "rank_math_checklist": {"has_toc": true, "has_faq": approved},
        "issues": issues,
        "suggestions": ["add a data table"],
    })
    .to_string())
}

fn titles_reply() -> Result<String, ProviderError> {
    Ok(json!({
        "titles": [
            {"title": "SEO local: 7 passos para padarias", "style": "number"},
            {"title": "SEO local: 5 erros comuns", "style": "number"},
            {"title": "SEO local funciona para padarias?", "style": "question"},
            {"title": "SEO local: guia para vender mais", "style": "benefit"}
        ],
        "recommended": 1,
        "focus_keyword": "seo local"
    })
    .to_string())
}

fn seo_reply() -> Result<String, ProviderError> {
    Ok(format!(
        "```json\n{}\n```",
        json!({
            "meta_title": "SEO local: 7 passos para padarias",
            "meta_description": "SEO local para padarias explicado passo a passo. Descubra como atrair clientes do bairro e comece hoje.",
            "focus_keyword": "seo local",
            "secondary_keywords": ["seo para padarias", "google meu negocio"],
            "tags": ["seo local", "padarias", "marketing"],
            "slug": "seo-local-padarias",
            "faq": [{"question": "O que e SEO local?", "answer": "Resposta."}]
        })
    ))
}

fn request(generate_thumbnail: bool) -> GenerationRequest {
    let mut request = GenerationRequest::new("Guia de SEO local", "SEO local para padarias de bairro");
    request.generate_thumbnail = generate_thumbnail;
    request.thumbnail_provider = ImageProviderKind::Gemini;
    request
}

fn pipeline(text: &ScriptedText, images: Vec<ScriptedImage>) -> Pipeline {
    let text: Box<dyn TextProvider> = Box::new(text.clone());
    let images = images
        .into_iter()
        .map(|provider| Box::new(provider) as Box<dyn ImageProvider>)
        .collect();
    Pipeline::new(
        ProviderRegistry::new(vec![text]),
        ProviderRegistry::new(images),
        PipelineOptions::default(),
    )
}

fn steps(result: &PipelineResult) -> Vec<(String, StepStatus)> {
    result
        .execution_log
        .iter()
        .map(|entry| (entry.step.clone(), entry.status))
        .collect()
}

#[test]
fn approved_on_first_review_stops_after_one_iteration() {
    let text = ScriptedText::new(
        "openai",
        vec![
            ok("briefing text"),
            ok("```html\n<h2 id=\"a\">Draft one</h2>\n```"),
            verdict(true, 9.0),
            titles_reply(),
            seo_reply(),
        ],
    );
    let result = pipeline(&text, Vec::new()).run(&request(false)).unwrap();

    assert_eq!(result.iteration_count, 1);
    assert!(result.approved());
    assert_eq!(result.article, "<h2 id=\"a\">Draft one</h2>");
    assert_eq!(result.briefing, "briefing text");
    assert!(result.thumbnail_prompt.is_none());
    assert!(result.thumbnail_asset.is_none());
    assert_eq!(result.titles.titles.len(), 4);
    assert_eq!(result.titles.recommended, 1);
    assert_eq!(result.seo.focus_keyword, "seo local");
    assert_eq!(result.seo.slug, "seo-local-padarias");

    let completed: Vec<String> = steps(&result)
        .into_iter()
        .filter(|(_, status)| *status == StepStatus::Completed)
        .map(|(step, _)| step)
        .collect();
    assert_eq!(
        completed,
        vec!["interpretation", "first_draft", "review", "titles", "seo", "final"]
    );

    let review = result
        .execution_log
        .iter()
        .find(|entry| entry.step == "review" && entry.status == StepStatus::Completed)
        .unwrap();
    assert_eq!(review.data["iteration"], json!(1));
    assert_eq!(review.data["approved"], json!(true));
    assert_eq!(review.data["overall_score"], json!(9.0));

    let temperatures: Vec<f64> = text.requests().iter().map(|request| request.temperature).collect();
    assert_eq!(temperatures, vec![0.5, 0.7, 0.3, 0.8, 0.4]);
}

#[test]
fn never_approved_uses_third_draft_after_three_reviews() {
    let text = ScriptedText::new(
        "openai",
        vec![
            ok("briefing"),
            ok("<p>draft 1</p>"),
            verdict(false, 5.0),
            ok("<p>draft 2</p>"),
            verdict(false, 6.0),
            ok("<p>draft 3</p>"),
            ok("I would not approve this article yet."),
            ok("no json here"),
            ok("still no json"),
        ],
    );
    let result = pipeline(&text, Vec::new()).run(&request(false)).unwrap();

    assert_eq!(result.iteration_count, 3);
    assert_eq!(result.reviews.len(), 3);
    assert_eq!(result.article, "<p>draft 3</p>");
    assert!(!result.approved());
    assert_eq!(result.reviews[2].verdict.raw, "I would not approve this article yet.");

    assert_eq!(result.titles.titles.len(), 1);
    assert_eq!(result.titles.titles[0].title, "Guia de SEO local");
    assert_eq!(result.titles.recommended, 0);
    assert_eq!(result.seo.meta_title, "Guia de SEO local");

    let rewrites = result
        .execution_log
        .iter()
        .filter(|entry| entry.step == "rewrite" && entry.status == StepStatus::Completed)
        .count();
    assert_eq!(rewrites, 2);

    let requests = text.requests();
    assert_eq!(requests.len(), 9);
    let first_rewrite = &requests[3].messages[0].content;
    assert!(first_rewrite.contains("REVIEWER FEEDBACK"));
    assert!(first_rewrite.contains("keyword missing from first paragraph"));
    assert!(!requests[1].messages[0].content.contains("REVIEWER FEEDBACK"));
}

#[test]
fn upstream_rejection_on_interpretation_is_fatal() {
    let text = ScriptedText::new(
        "openai",
        vec![Err(ProviderError::Upstream("Incorrect API key provided".to_string()))],
    );
    let err = pipeline(&text, Vec::new()).run(&request(true)).unwrap_err();
    let failure = match err {
        RunError::Pipeline(failure) => failure,
        other => panic!("unexpected error: {other}"),
    };

    assert_eq!(failure.step, "interpretation");
    assert_eq!(failure.kind().as_str(), "upstream_error");
    assert_eq!(failure.error.message(), "Incorrect API key provided");
    let errors: Vec<_> = failure
        .execution_log
        .iter()
        .filter(|entry| entry.status == StepStatus::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].step, "interpretation");
    assert_eq!(errors[0].data["message"], json!("Incorrect API key provided"));
    assert_eq!(text.requests().len(), 1);
}

#[test]
fn failure_inside_review_loop_keeps_trace() {
    let text = ScriptedText::new(
        "openai",
        vec![
            ok("briefing"),
            ok("<p>draft</p>"),
            Err(ProviderError::Timeout("openai request timed out".to_string())),
        ],
    );
    let err = pipeline(&text, Vec::new()).run(&request(false)).unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.step, "review");
    assert!(failure.error.is_retryable());
    let last = failure.execution_log.last().unwrap();
    assert_eq!((last.step.as_str(), last.status), ("review", StepStatus::Error));
}

#[test]
fn unselected_text_provider_is_no_credential() {
    let text = ScriptedText::new("gemini", vec![ok("unused")]);
    let err = pipeline(&text, Vec::new()).run(&request(false)).unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.step, "provider_selection");
    assert_eq!(failure.kind().as_str(), "no_credential");
    assert!(text.requests().is_empty());
}

#[test]
fn thumbnail_branch_generates_and_optimizes_preview() {
    let text = ScriptedText::new(
        "openai",
        vec![
            ok("briefing"),
            ok("<p>Fresh bread every morning in the neighborhood</p>"),
            verdict(true, 8.5),
            ok("Image Prompt: \"A quiet bakery counter at dawn\""),
            titles_reply(),
            seo_reply(),
        ],
    );
    let calls = Arc::new(Mutex::new(Vec::new()));
    let image = ScriptedImage {
        name: "gemini",
        reply: Ok(GeneratedImage {
            mime_type: "image/png".to_string(),
            data: png_base64(2000, 1000),
            revised_prompt: None,
        }),
        calls: calls.clone(),
    };
    let result = pipeline(&text, vec![image]).run(&request(true)).unwrap();

    assert_eq!(
        result.thumbnail_prompt.as_deref(),
        Some("A quiet bakery counter at dawn")
    );
    let asset = result.thumbnail_asset.as_ref().unwrap();
    assert_eq!(asset.mime_type, "image/jpeg");
    assert_eq!(asset.width, 800);
    assert!(asset.height.abs_diff(400) <= 1);
    assert!(!asset.data_original.is_empty());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "16:9");

    let thumbnail_request = &text.requests()[3];
    assert_eq!(thumbnail_request.max_tokens, 400);
    assert!(thumbnail_request.messages[0]
        .content
        .contains("Fresh bread every morning in the neighborhood..."));
}

#[test]
fn thumbnail_image_failure_is_degraded() {
    let text = ScriptedText::new(
        "openai",
        vec![
            ok("briefing"),
            ok("<p>draft</p>"),
            verdict(true, 9.0),
            ok("A warm kitchen with flour on a wooden table"),
            titles_reply(),
            seo_reply(),
        ],
    );
    let image = ScriptedImage {
        name: "gemini",
        reply: Err(ProviderError::Upstream("quota exceeded".to_string())),
        calls: Arc::new(Mutex::new(Vec::new())),
    };
    let result = pipeline(&text, vec![image]).run(&request(true)).unwrap();

    assert!(result.thumbnail_prompt.is_some());
    assert!(result.thumbnail_asset.is_none());
    let entry = result
        .execution_log
        .iter()
        .find(|entry| entry.step == "thumbnail_image" && entry.status == StepStatus::Error)
        .unwrap();
    assert_eq!(entry.data["message"], json!("quota exceeded"));
    assert_eq!(
        steps(&result).last().unwrap(),
        &("final".to_string(), StepStatus::Completed)
    );
}

#[test]
fn missing_image_provider_is_degraded_no_credential() {
    let text = ScriptedText::new(
        "openai",
        vec![
            ok("briefing"),
            ok("<p>draft</p>"),
            verdict(true, 9.0),
            ok("A warm kitchen"),
            titles_reply(),
            seo_reply(),
        ],
    );
    let result = pipeline(&text, Vec::new()).run(&request(true)).unwrap();
    assert!(result.thumbnail_asset.is_none());
    let entry = result
        .execution_log
        .iter()
        .find(|entry| entry.step == "thumbnail_image" && entry.status == StepStatus::Error)
        .unwrap();
    assert_eq!(entry.data["kind"], json!("no_credential"));
}

#[test]
fn thumbnail_prompt_failure_skips_image_generation() {
    let text = ScriptedText::new(
        "openai",
        vec![
            ok("briefing"),
            ok("<p>draft</p>"),
            verdict(true, 9.0),
            ok("\"\""),
            titles_reply(),
            seo_reply(),
        ],
    );
    let calls = Arc::new(Mutex::new(Vec::new()));
    let image = ScriptedImage {
        name: "gemini",
        reply: Ok(GeneratedImage {
            mime_type: "image/png".to_string(),
            data: png_base64(10, 10),
            revised_prompt: None,
        }),
        calls: calls.clone(),
    };
    let result = pipeline(&text, vec![image]).run(&request(true)).unwrap();

    assert!(result.thumbnail_prompt.is_none());
    assert!(result.thumbnail_asset.is_none());
    assert!(calls.lock().unwrap().is_empty());
    assert!(result
        .execution_log
        .iter()
        .all(|entry| entry.step != "thumbnail_image"));
    assert_eq!(result.titles.titles.len(), 4);
}

#[test]
fn events_mirror_the_execution_log() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("events.jsonl");
    let text = ScriptedText::new(
        "openai",
        vec![
            ok("briefing"),
            ok("<p>draft</p>"),
            verdict(true, 9.0),
            titles_reply(),
            seo_reply(),
        ],
    );
    let options = PipelineOptions::default().with_event_log(path.clone());
    let pipeline = Pipeline::new(
        ProviderRegistry::new(vec![Box::new(text) as Box<dyn TextProvider>]),
        ProviderRegistry::default(),
        options,
    );
    let result = pipeline.run(&request(false)).map_err(|err| anyhow::anyhow!("{err}"))?;

    let rows: Vec<Value> = std::fs::read_to_string(&path)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(rows.first().map(|row| row["type"].clone()), Some(json!("run_started")));
    assert_eq!(rows.last().map(|row| row["type"].clone()), Some(json!("run_finished")));
    assert_eq!(rows.last().map(|row| row["status"].clone()), Some(json!("completed")));

    let step_rows = rows
        .iter()
        .filter(|row| row["type"] == json!("pipeline_step"))
        .count();
    assert_eq!(step_rows, result.execution_log.len());

    let run_ids: Vec<&Value> = rows.iter().map(|row| &row["run_id"]).collect();
    assert!(run_ids.windows(2).all(|pair| pair[0] == pair[1]));
    Ok(())
}
