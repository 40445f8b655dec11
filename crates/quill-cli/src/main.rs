mod repository;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quill_contracts::cipher::CredentialCipher;
use quill_contracts::errors::RunError;
use quill_contracts::mapping::{apply_write_plan, resolve_write_plan, FlattenedFields, PostStatus};
use quill_contracts::providers::CredentialSlot;
use quill_contracts::request::{GenerationRequest, ImageProviderKind, TextProviderKind};
use quill_contracts::results::PipelineResult;
use quill_contracts::settings::{Credentials, Settings, ENCRYPTION_KEY_ENV};
use quill_engine::assist::improve_description;
use quill_engine::images::image_provider_for;
use quill_engine::optimize::{optimize_for_storage, StorageFormat, StorageOptions};
use quill_engine::pipeline::DEFAULT_LANGUAGE;
use quill_engine::prompts::connection_check;
use quill_engine::text::{text_provider_for, OpenAiTextProvider, TextProviderConfig};
use quill_engine::{run_pipeline, ImageProvider, PipelineOptions, TextProvider};
use serde_json::{json, Value};

use crate::repository::DirectoryRepository;

#[derive(Debug, Parser)]
#[command(name = "quill", version, about = "Multi-agent SEO article pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Save(SaveArgs),
    Image(ImageArgs),
    Improve(ImproveArgs),
    EncryptKey(EncryptKeyArgs),
    GenerateKey,
    TestConnection(TestConnectionArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Generation request as a JSON file.
    #[arg(long)]
    request: PathBuf,
    #[arg(long, default_value = "quill.json")]
    settings: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    language: String,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

#[derive(Debug, Parser)]
struct SaveArgs {
    /// Pipeline result written by `generate`.
    #[arg(long)]
    result: PathBuf,
    #[arg(long)]
    repo: PathBuf,
    #[arg(long, default_value = "quill.json")]
    settings: PathBuf,
    #[arg(long)]
    title_index: Option<usize>,
    #[arg(long)]
    excerpt: Option<String>,
    #[arg(long, default_value = "post")]
    post_type: String,
    #[arg(long, default_value = "draft")]
    status: String,
    /// Category term assigned at creation.
    #[arg(long)]
    category: Option<String>,
}

#[derive(Debug, Parser)]
struct ImageArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "gemini")]
    provider: String,
    #[arg(long, default_value = "16:9")]
    format: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "quill.json")]
    settings: PathBuf,
    #[arg(long)]
    jpeg: bool,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

#[derive(Debug, Parser)]
struct ImproveArgs {
    /// Description to rewrite (at least 10 characters).
    #[arg(long)]
    text: String,
    #[arg(long, default_value = "openai")]
    provider: String,
    #[arg(long, default_value = "quill.json")]
    settings: PathBuf,
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[derive(Debug, Parser)]
struct EncryptKeyArgs {
    #[arg(long)]
    value: String,
    /// Store the sealed value in settings under this provider.
    #[arg(long)]
    provider: Option<String>,
    #[arg(long, default_value = "quill.json")]
    settings: PathBuf,
}

#[derive(Debug, Parser)]
struct TestConnectionArgs {
    #[arg(long)]
    provider: String,
    #[arg(long, default_value = "quill.json")]
    settings: PathBuf,
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("quill error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Save(args) => run_save(args),
        Command::Image(args) => run_image(args),
        Command::Improve(args) => run_improve(args),
        Command::EncryptKey(args) => run_encrypt_key(args),
        Command::GenerateKey => {
            println!("{}", CredentialCipher::generate_key());
            Ok(0)
        }
        Command::TestConnection(args) => run_test_connection(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let raw = fs::read_to_string(&args.request)
        .with_context(|| format!("failed to read request {}", args.request.display()))?;
    let request: GenerationRequest = serde_json::from_str(&raw)
        .with_context(|| format!("invalid request JSON in {}", args.request.display()))?;
    if request.context_exceeds_soft_limit() {
        eprintln!("quill: subject context is longer than 500 characters");
    }
    let settings = Settings::load_or_default(&args.settings)?;
    let credentials = Credentials::from_process_env(&settings);

    let mut options = PipelineOptions {
        language: args.language.clone(),
        timeout: Duration::from_secs(args.timeout_secs.max(1)),
        ..PipelineOptions::default()
    };
    if let Some(events) = args.events.clone() {
        options = options.with_event_log(events);
    }

    match run_pipeline(&request, &settings, &credentials, options) {
        Ok(result) => {
            write_output(args.out.as_deref(), &serde_json::to_value(&result)?)?;
            eprintln!(
                "quill: {} iteration(s), approved={}, thumbnail={}",
                result.iteration_count,
                result.approved(),
                result.thumbnail_asset.is_some()
            );
            Ok(0)
        }
        Err(RunError::Pipeline(failure)) => {
            let report = json!({
                "error": failure.payload(),
                "step": failure.step,
                "execution_log": failure.execution_log,
            });
            write_output(args.out.as_deref(), &report)?;
            eprintln!("quill: {failure}");
            Ok(1)
        }
        Err(err @ RunError::InvalidRequest(_)) => bail!(err),
    }
}

fn run_save(args: SaveArgs) -> Result<i32> {
    let raw = fs::read_to_string(&args.result)
        .with_context(|| format!("failed to read result {}", args.result.display()))?;
    let result: PipelineResult = serde_json::from_str(&raw)
        .with_context(|| format!("invalid pipeline result in {}", args.result.display()))?;
    let settings = Settings::load_or_default(&args.settings)?;

    let fields = FlattenedFields::from_result(&result, args.title_index, args.excerpt.as_deref())?;
    let plan = resolve_write_plan(
        &fields,
        &settings.mappings_for(&args.post_type),
        &args.post_type,
        PostStatus::parse(&args.status),
    )?
    .with_category(args.category.as_deref());
    let mut repository = DirectoryRepository::new(&args.repo);
    let report = apply_write_plan(&mut repository, &plan)?;
    let attachment = match report.attachment_id.as_deref() {
        Some(media_id) => Some(repository.load_media(media_id)?),
        None => None,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({"report": report, "attachment": attachment}))?
    );
    Ok(0)
}

fn run_image(args: ImageArgs) -> Result<i32> {
    let settings = Settings::load_or_default(&args.settings)?;
    let credentials = Credentials::from_process_env(&settings);
    let kind = ImageProviderKind::parse(&args.provider);
    let provider = image_provider_for(
        kind,
        &settings,
        &credentials,
        Duration::from_secs(args.timeout_secs.max(1)),
    )?;
    let image = provider.generate(&args.prompt, &args.format)?;
    let storage = StorageOptions {
        format: if args.jpeg {
            StorageFormat::Jpeg
        } else {
            StorageFormat::WebP
        },
        ..StorageOptions::default()
    };
    let stored = optimize_for_storage(&image.data, storage)?;
    if let Some(parent) = args.out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.out, &stored.bytes)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!(
        "{}",
        json!({
            "path": args.out.to_string_lossy(),
            "provider": kind.token(),
            "mime_type": stored.mime_type,
            "width": stored.width,
            "height": stored.height,
            "revised_prompt": image.revised_prompt,
        })
    );
    Ok(0)
}

fn run_improve(args: ImproveArgs) -> Result<i32> {
    let settings = Settings::load_or_default(&args.settings)?;
    let credentials = Credentials::from_process_env(&settings);
    let provider = text_provider_for(
        TextProviderKind::parse(&args.provider),
        &settings,
        &credentials,
        Duration::from_secs(args.timeout_secs.max(1)),
    )?;
    let improved = improve_description(provider.as_ref(), &args.text)?;
    println!("{}", serde_json::to_string_pretty(&improved)?);
    Ok(0)
}

fn run_encrypt_key(args: EncryptKeyArgs) -> Result<i32> {
    let mut settings = Settings::load_or_default(&args.settings)?;
    if let Some(provider) = args.provider.as_deref() {
        let slot = CredentialSlot::parse(provider)
            .with_context(|| format!("unknown provider {provider:?} (expected openai, gemini or openrouter)"))?;
        settings.store_key(slot, args.value.trim(), |name| std::env::var(name).ok())?;
        settings.save(&args.settings)?;
        println!("stored {} key in {}", slot.label(), args.settings.display());
        return Ok(0);
    }
    let cipher = cipher_from(&settings, |name| std::env::var(name).ok())?;
    println!("{}", cipher.encrypt(args.value.trim()));
    Ok(0)
}

fn run_test_connection(args: TestConnectionArgs) -> Result<i32> {
    let settings = Settings::load_or_default(&args.settings)?;
    let credentials = Credentials::from_process_env(&settings);
    let slot = CredentialSlot::parse(&args.provider).with_context(|| {
        format!(
            "unknown provider {:?} (expected openai, gemini or openrouter)",
            args.provider
        )
    })?;
    let timeout = Duration::from_secs(args.timeout_secs.max(1));
    let provider = connection_provider(slot, &settings, &credentials, timeout)?;
    match provider.complete(&connection_check()) {
        Ok(completion) => {
            println!(
                "{}",
                json!({"success": true, "provider": slot.as_str(), "model": completion.model})
            );
            Ok(0)
        }
        Err(err) => {
            println!(
                "{}",
                json!({"success": false, "provider": slot.as_str(), "error": err.payload()})
            );
            Ok(1)
        }
    }
}

/// OpenRouter speaks the OpenAI chat dialect, so its check reuses that adapter.
fn connection_provider(
    slot: CredentialSlot,
    settings: &Settings,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<Box<dyn TextProvider>> {
    Ok(match slot {
        CredentialSlot::OpenAi => text_provider_for(TextProviderKind::OpenAi, settings, credentials, timeout)?,
        CredentialSlot::Gemini => text_provider_for(TextProviderKind::Gemini, settings, credentials, timeout)?,
        CredentialSlot::OpenRouter => {
            let Some(api_key) = credentials.get(slot) else {
                bail!(
                    "No {} API key configured (set {} or store an encrypted key in settings)",
                    slot.label(),
                    slot.env_var()
                );
            };
            Box::new(OpenAiTextProvider::new(TextProviderConfig {
                api_key: api_key.to_string(),
                api_base: settings.openrouter_api_base.trim().trim_end_matches('/').to_string(),
                model: settings.openrouter_model.clone(),
                timeout,
            })?)
        }
    })
}

fn cipher_from(settings: &Settings, env: impl Fn(&str) -> Option<String>) -> Result<CredentialCipher> {
    let Some(encoded) = env(ENCRYPTION_KEY_ENV)
        .filter(|value| !value.trim().is_empty())
        .or_else(|| settings.encryption_key.clone())
    else {
        bail!("no encryption key: set {ENCRYPTION_KEY_ENV} or run `quill generate-key`");
    };
    Ok(CredentialCipher::from_encoded_key(encoded.trim())?)
}

fn write_output(out: Option<&Path>, value: &Value) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, format!("{raw}\n"))
                .with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            println!("{raw}");
            Ok(())
        }
    }
}
