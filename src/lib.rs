use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod error;
pub mod gateway;
pub mod library;
pub mod logging;
pub mod normalize;
pub mod probe;
pub mod providers;
pub mod rate_limit;
pub mod reconcile;
pub mod server;
pub mod settings;
#[cfg(test)]
mod test_util;
pub mod worker;

pub use error::{LibraryError, RateLimitExceeded, TranslationError};
pub use gateway::{Direction, TranslationGateway, TranslationRequest, TranslationResult};
pub use library::{Category, LibraryData, LibraryPrompt, SharedLibrary, TagLibrary};
pub use normalize::{compose, normalize};
pub use probe::ReachabilityProbe;
pub use providers::{
    BackendError, BackendFuture, BackendPair, GoogleTranslator, SharedBackend, TranslationBackend,
};
pub use rate_limit::{Clock, RateLimiter, SystemClock};
pub use reconcile::{OrderedTagEntry, PromptListReconciler, ReconcileOutcome};
pub use worker::{JobEvent, JobHandle, JobOutcome, TranslationJob, TranslationWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings_path: Option<String>,
    pub profile: Option<String>,
    pub library_path: Option<String>,
    pub format: OutputFormat,
    pub translate_missing: bool,
    pub save_to: Option<String>,
    pub show_library: bool,
    pub import_library: Option<String>,
    pub new_library: Option<String>,
}

pub async fn run(config: Config, input: Option<String>) -> Result<String> {
    let settings = load_config_settings(&config)?;
    let library_path = config
        .library_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.library_path.clone());

    if let Some(dir) = config.new_library.as_deref() {
        let path = library::create_from_template(Path::new(dir))?;
        return Ok(format!("created {}", path.display()));
    }
    if let Some(source) = config.import_library.as_deref() {
        return import_library(&library_path, Path::new(source));
    }
    if config.show_library {
        let library = TagLibrary::load(&library_path);
        return format_library(&library, config.format);
    }

    let input = input.unwrap_or_default();
    let input = input.trim();
    if input.is_empty() {
        return Err(anyhow!("stdin is empty"));
    }

    let backends = providers::build_google_backends(&settings);
    let gateway = TranslationGateway::from_settings(&settings, backends);
    let reconciler = PromptListReconciler::new(std::sync::Arc::new(gateway));
    let outcome = reconcile_prompt(&reconciler, input, config.translate_missing).await;

    let mut output = format_outcome(&outcome, config.format)?;
    if let Some(category) = config.save_to.as_deref() {
        let saved = save_entries(&library_path, category, &outcome.entries)?;
        if config.format == OutputFormat::Text {
            output.push_str(&format!("\nsaved {} tags to {}", saved, category));
        }
    }
    Ok(output)
}

fn load_config_settings(config: &Config) -> Result<settings::Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(profile) = config.profile.as_deref() {
        settings.profile = settings::Profile::parse(profile)?;
    }
    Ok(settings)
}

/// Reconciles `input`, then optionally annotates tags that are still missing
/// a translation in a second pass.
///
/// A failed second pass keeps the first-pass entries and reports its error
/// unless the first pass already carried one.
pub async fn reconcile_prompt<B: TranslationBackend>(
    reconciler: &PromptListReconciler<B>,
    input: &str,
    translate_missing: bool,
) -> ReconcileOutcome {
    let mut outcome = reconciler.reconcile_text(input).await;
    if !translate_missing {
        return outcome;
    }

    let wait = reconciler.gateway().limiter().ready_in();
    if !wait.is_zero() {
        info!(
            "waiting {:.1}s before filling missing translations",
            wait.as_secs_f64()
        );
        tokio::time::sleep(wait).await;
    }
    match reconciler.reconcile_missing_only(&mut outcome.entries).await {
        Ok(filled) => info!("filled {} missing translations", filled),
        Err(err) => {
            warn!("filling missing translations failed: {}", err);
            outcome.error.get_or_insert(err);
        }
    }
    outcome
}

#[derive(Serialize)]
struct PromptOutput<'a> {
    prompt: String,
    entries: &'a [OrderedTagEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn format_outcome(outcome: &ReconcileOutcome, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let output = PromptOutput {
                prompt: outcome.prompt(),
                entries: &outcome.entries,
                error: outcome.error.as_ref().map(ToString::to_string),
            };
            Ok(serde_json::to_string_pretty(&output)?)
        }
        OutputFormat::Text => {
            let mut lines = vec![outcome.prompt()];
            for entry in &outcome.entries {
                if entry.has_translation() {
                    lines.push(format!(
                        "{}\t{}\t{}",
                        entry.original_index, entry.text, entry.translation
                    ));
                } else {
                    lines.push(format!("{}\t{}", entry.original_index, entry.text));
                }
            }
            if let Some(err) = &outcome.error {
                lines.push(format!("warning: {}", err));
            }
            Ok(lines.join("\n"))
        }
    }
}

fn format_library(library: &TagLibrary, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(&library.export())?);
    }
    let mut lines = Vec::new();
    for (key, category) in library.categories() {
        lines.push(format!(
            "{}\t{}\t{} prompts",
            key,
            category.name,
            category.prompts.len()
        ));
        for prompt in &category.prompts {
            lines.push(format!("  {}\t{}", prompt.en, prompt.zh));
        }
    }
    Ok(lines.join("\n"))
}

fn import_library(library_path: &Path, source: &Path) -> Result<String> {
    let incoming = library::read_library(source)?;
    let count = incoming.len();
    let mut library = TagLibrary::open_or_create(library_path)?;
    library
        .merge(incoming)
        .with_context(|| format!("failed to save {}", library_path.display()))?;
    Ok(format!(
        "imported {} categories into {}",
        count,
        library_path.display()
    ))
}

fn save_entries(
    library_path: &Path,
    category: &str,
    entries: &[OrderedTagEntry],
) -> Result<usize> {
    let mut library = TagLibrary::open_or_create(library_path)?;
    if library.find_category(category).is_none() {
        library.add_category(category, "")?;
    }
    let saved = library
        .add_entries(category, entries)
        .with_context(|| format!("failed to save {}", library_path.display()))?;
    Ok(saved)
}
