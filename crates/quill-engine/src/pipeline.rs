use std::path::PathBuf;
use std::time::Duration;

use quill_contracts::errors::{PipelineFailure, ProviderError, RunError};
use quill_contracts::events::{EventWriter, ExecutionLog};
use quill_contracts::providers::{CredentialSlot, NamedProvider, ProviderRegistry};
use quill_contracts::request::GenerationRequest;
use quill_contracts::results::{PipelineResult, ReviewRecord, ThumbnailAsset};
use quill_contracts::settings::{Credentials, Settings};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::extract::{clean_thumbnail_prompt, parse_seo, parse_titles, parse_verdict, strip_code_fence};
use crate::images::{image_registry, ImageProvider};
use crate::optimize::{optimize, PREVIEW_JPEG_QUALITY, PREVIEW_MAX_WIDTH};
use crate::text::{missing_credential, text_registry, CompletionRequest, TextProvider};
use crate::{map_object, prompts, DEFAULT_TIMEOUT};

pub const MAX_REVIEW_ITERATIONS: u32 = 3;
pub const DEFAULT_LANGUAGE: &str = "Brazilian Portuguese";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Output language for briefing, article, titles and SEO metadata.
    pub language: String,
    /// Clamped to `1..=MAX_REVIEW_ITERATIONS`.
    pub max_iterations: u32,
    pub preview_max_width: u32,
    pub preview_jpeg_quality: u8,
    pub timeout: Duration,
    pub events: Option<EventWriter>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            max_iterations: MAX_REVIEW_ITERATIONS,
            preview_max_width: PREVIEW_MAX_WIDTH,
            preview_jpeg_quality: PREVIEW_JPEG_QUALITY,
            timeout: DEFAULT_TIMEOUT,
            events: None,
        }
    }
}

impl PipelineOptions {
    /// Mirrors the run to a JSONL file under a fresh run id.
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.events = Some(EventWriter::new(path, Uuid::new_v4().to_string()));
        self
    }

    fn review_ceiling(&self) -> u32 {
        self.max_iterations.clamp(1, MAX_REVIEW_ITERATIONS)
    }
}

struct StepFailure {
    step: &'static str,
    error: ProviderError,
}

pub struct Pipeline {
    text: ProviderRegistry<Box<dyn TextProvider>>,
    images: ProviderRegistry<Box<dyn ImageProvider>>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        text: ProviderRegistry<Box<dyn TextProvider>>,
        images: ProviderRegistry<Box<dyn ImageProvider>>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            text,
            images,
            options,
        }
    }

    /// Registers every adapter that has a credential; missing ones surface at selection time.
    pub fn from_settings(
        settings: &Settings,
        credentials: &Credentials,
        options: PipelineOptions,
    ) -> Result<Self, ProviderError> {
        let text = text_registry(settings, credentials, options.timeout)?;
        let images = image_registry(settings, credentials, options.timeout)?;
        Ok(Self::new(text, images, options))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn run(&self, request: &GenerationRequest) -> Result<PipelineResult, RunError> {
        request.validate()?;
        let mut log = match self.options.events.clone() {
            Some(sink) => ExecutionLog::with_sink(sink),
            None => ExecutionLog::new(),
        };
        self.emit(
            "run_started",
            json!({
                "text_provider": request.text_provider.token(),
                "desired_title": request.desired_title,
                "generate_thumbnail": request.generate_thumbnail,
                "thumbnail_provider": request.thumbnail_provider.token(),
                "max_iterations": self.options.review_ceiling(),
            }),
        );

        match self.execute(request, &mut log) {
            Ok(mut result) => {
                self.emit(
                    "run_finished",
                    json!({
                        "status": "completed",
                        "iteration_count": result.iteration_count,
                        "approved": result.approved(),
                        "thumbnail": result.thumbnail_asset.is_some(),
                    }),
                );
                result.execution_log = log.into_entries();
                Ok(result)
            }
            Err(StepFailure { step, error }) => {
                self.emit(
                    "run_finished",
                    json!({
                        "status": "failed",
                        "step": step,
                        "error": error.payload(),
                    }),
                );
                Err(RunError::Pipeline(PipelineFailure {
                    step: step.to_string(),
                    error,
                    execution_log: log.into_entries(),
                }))
            }
        }
    }

    fn execute(
        &self,
        request: &GenerationRequest,
        log: &mut ExecutionLog,
    ) -> Result<PipelineResult, StepFailure> {
        let language = self.options.language.as_str();
        let text = self.select_text_provider(request, log)?;

        let briefing = call_text(
            text,
            log,
            "interpretation",
            json!({"provider": text.name()}),
            &prompts::interpreter(request, language),
        )?;
        log.completed("interpretation", json!({"chars": briefing.chars().count()}));

        let mut article = write_article(text, log, "first_draft", 1, &briefing, None, language)?;
        let ceiling = self.options.review_ceiling();
        let mut reviews = Vec::new();
        let mut iteration = 0;
        loop {
            iteration += 1;
            let raw = call_text(
                text,
                log,
                "review",
                json!({"iteration": iteration}),
                &prompts::reviewer(&article, &briefing),
            )?;
            let verdict = parse_verdict(&raw);
            log.completed(
                "review",
                json!({
                    "iteration": iteration,
                    "approved": verdict.approved,
                    "overall_score": verdict.overall_score,
                }),
            );
            let approved = verdict.approved;
            reviews.push(ReviewRecord { iteration, verdict });
            if approved || iteration >= ceiling {
                break;
            }
            article = write_article(
                text,
                log,
                "rewrite",
                iteration + 1,
                &briefing,
                Some(&raw),
                language,
            )?;
        }

        let thumbnail_prompt = if request.generate_thumbnail {
            self.thumbnail_prompt(text, log, request, &article)
        } else {
            None
        };

        let raw_titles = call_text(
            text,
            log,
            "titles",
            Value::Null,
            &prompts::titles(&article, &briefing, language),
        )?;
        let titles = parse_titles(&raw_titles, &request.desired_title);
        log.completed(
            "titles",
            json!({"count": titles.titles.len(), "recommended": titles.recommended}),
        );

        let raw_seo = call_text(
            text,
            log,
            "seo",
            Value::Null,
            &prompts::seo(&article, &briefing, language),
        )?;
        let seo = parse_seo(&raw_seo, &request.desired_title);
        log.completed(
            "seo",
            json!({"focus_keyword": seo.focus_keyword, "tags": seo.tags.len()}),
        );

        let thumbnail_asset = thumbnail_prompt
            .as_deref()
            .and_then(|prompt| self.thumbnail_image(log, request, prompt));

        log.completed(
            "final",
            json!({
                "iteration_count": iteration,
                "approved": reviews.last().map(|record: &ReviewRecord| record.verdict.approved),
            }),
        );

        Ok(PipelineResult {
            text_provider: request.text_provider,
            briefing,
            article,
            reviews,
            iteration_count: iteration,
            titles,
            seo,
            thumbnail_prompt,
            thumbnail_asset,
            execution_log: Vec::new(),
        })
    }

    fn select_text_provider(
        &self,
        request: &GenerationRequest,
        log: &mut ExecutionLog,
    ) -> Result<&dyn TextProvider, StepFailure> {
        match self.text.get(request.text_provider.token()) {
            Some(provider) => Ok(provider.as_ref()),
            None => {
                let error = missing_credential(CredentialSlot::for_text(request.text_provider));
                log.error("provider_selection", error_data(&error));
                Err(StepFailure {
                    step: "provider_selection",
                    error,
                })
            }
        }
    }

    /// Degraded step: any failure or an empty prompt yields `None`.
    fn thumbnail_prompt(
        &self,
        text: &dyn TextProvider,
        log: &mut ExecutionLog,
        request: &GenerationRequest,
        article: &str,
    ) -> Option<String> {
        let prompt = prompts::thumbnail(article, &request.desired_title, &request.desired_title);
        let raw = call_text(text, log, "thumbnail_prompt", Value::Null, &prompt).ok()?;
        let cleaned = clean_thumbnail_prompt(&raw);
        if cleaned.is_empty() {
            let error = ProviderError::MalformedResponse("thumbnail prompt came back empty".to_string());
            log.error("thumbnail_prompt", error_data(&error));
            return None;
        }
        log.completed(
            "thumbnail_prompt",
            json!({"words": cleaned.split_whitespace().count()}),
        );
        Some(cleaned)
    }

    fn thumbnail_image(
        &self,
        log: &mut ExecutionLog,
        request: &GenerationRequest,
        prompt: &str,
    ) -> Option<ThumbnailAsset> {
        let kind = request.thumbnail_provider;
        log.started(
            "thumbnail_image",
            json!({"provider": kind.token(), "format": request.thumbnail_format}),
        );
        let Some(provider) = self.images.get(kind.token()) else {
            log.error(
                "thumbnail_image",
                error_data(&missing_credential(CredentialSlot::for_image(kind))),
            );
            return None;
        };
        match provider.generate(prompt, &request.thumbnail_format) {
            Ok(image) => {
                let asset = optimize(
                    &image,
                    self.options.preview_max_width,
                    self.options.preview_jpeg_quality,
                );
                log.completed(
                    "thumbnail_image",
                    json!({
                        "provider": kind.token(),
                        "mime_type": asset.mime_type,
                        "width": asset.width,
                        "height": asset.height,
                    }),
                );
                Some(asset)
            }
            Err(error) => {
                log.error("thumbnail_image", error_data(&error));
                None
            }
        }
    }

    fn emit(&self, event_type: &str, payload: Value) {
        if let Some(events) = self.options.events.as_ref() {
            let _ = events.emit(event_type, map_object(payload));
        }
    }
}

/// Builds adapters from settings and runs one request.
pub fn run_pipeline(
    request: &GenerationRequest,
    settings: &Settings,
    credentials: &Credentials,
    options: PipelineOptions,
) -> Result<PipelineResult, RunError> {
    let events = options.events.clone();
    let pipeline = match Pipeline::from_settings(settings, credentials, options) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            let mut log = match events {
                Some(sink) => ExecutionLog::with_sink(sink),
                None => ExecutionLog::new(),
            };
            log.error("provider_selection", error_data(&error));
            return Err(RunError::Pipeline(PipelineFailure {
                step: "provider_selection".to_string(),
                error,
                execution_log: log.into_entries(),
            }));
        }
    };
    pipeline.run(request)
}

fn write_article(
    text: &dyn TextProvider,
    log: &mut ExecutionLog,
    step: &'static str,
    iteration: u32,
    briefing: &str,
    feedback: Option<&str>,
    language: &str,
) -> Result<String, StepFailure> {
    let raw = call_text(
        text,
        log,
        step,
        json!({"iteration": iteration}),
        &prompts::writer(briefing, feedback, language),
    )?;
    let article = strip_code_fence(&raw);
    log.completed(
        step,
        json!({"iteration": iteration, "chars": article.chars().count()}),
    );
    Ok(article)
}

/// Logs `started`, runs the call, and logs `error` on failure. The caller logs completion.
fn call_text(
    text: &dyn TextProvider,
    log: &mut ExecutionLog,
    step: &'static str,
    started: Value,
    request: &CompletionRequest,
) -> Result<String, StepFailure> {
    log.started(step, started);
    match text.complete(request) {
        Ok(completion) => Ok(completion.content),
        Err(error) => {
            log.error(step, error_data(&error));
            Err(StepFailure { step, error })
        }
    }
}

fn error_data(error: &ProviderError) -> Value {
    json!({"kind": error.kind().as_str(), "message": error.message()})
}
