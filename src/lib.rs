use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod document;
pub mod error;
pub mod languages;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod settings;
pub mod translate;

#[cfg(test)]
mod test_util;

pub use error::{BatchFailure, PipelineError, RenderError};
pub use pipeline::{FontPaths, Pipeline, PipelineConfig, PipelineSummary, default_output_path};
pub use translate::{Bhashini, TranslateBackend};

pub const API_KEY_ENV: &str = "BHASHINI_API_KEY";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub key: Option<String>,
    pub chunk_size: Option<usize>,
    pub delay_ms: Option<u64>,
    pub font: Option<PathBuf>,
    pub bold_font: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub show_languages: bool,
}

pub async fn run(config: Config) -> Result<String> {
    if config.show_languages {
        return Ok(languages::format_supported());
    }
    let settings = settings::load_settings(config.settings_path.as_deref())?;
    let input = config
        .input
        .clone()
        .ok_or_else(|| anyhow!("no input document given"))?;

    let pipeline_config = pipeline_config(&config, &settings)?;
    let key = resolve_key(config.key.as_deref())?;
    let backend = Bhashini::with_timeout(key, Duration::from_secs(settings.bhashini_timeout_secs))?
        .with_endpoint(settings.bhashini_endpoint.clone())
        .with_max_retries(settings.bhashini_max_retries);
    let pipeline = Pipeline::new(pipeline_config, backend)?;

    let output = config
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input, &pipeline.config().target_language));
    let summary = pipeline.translate_file(&input, &output).await?;
    Ok(format_summary(&output, &summary))
}

fn pipeline_config(config: &Config, settings: &settings::Settings) -> Result<PipelineConfig> {
    let normal = config
        .font
        .clone()
        .or_else(|| settings.font_normal.clone())
        .ok_or_else(|| PipelineError::Config("no normal-weight font configured".to_string()))?;
    let bold = config
        .bold_font
        .clone()
        .or_else(|| settings.font_bold.clone())
        .ok_or_else(|| PipelineError::Config("no bold font configured".to_string()))?;
    let source = non_empty(config.source_lang.as_deref()).unwrap_or(settings.source_language.as_str());
    let target = non_empty(config.target_lang.as_deref()).unwrap_or(settings.target_language.as_str());

    let mut pipeline_config = PipelineConfig::new(source, target, FontPaths { normal, bold });
    pipeline_config.chunk_size = config
        .chunk_size
        .filter(|size| *size > 0)
        .unwrap_or(settings.chunk_size);
    pipeline_config.inter_batch_delay_ms = config.delay_ms.unwrap_or(settings.inter_batch_delay_ms);
    pipeline_config.box_width_multiplier = settings.width_multiplier;
    Ok(pipeline_config)
}

fn resolve_key(explicit: Option<&str>) -> Result<String, PipelineError> {
    if let Some(key) = non_empty(explicit) {
        return Ok(key.to_string());
    }
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .map(|key| key.trim().to_string())
        .ok_or_else(|| {
            PipelineError::Config(format!("no API key: pass --key or set {}", API_KEY_ENV))
        })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn format_summary(output: &Path, summary: &PipelineSummary) -> String {
    let mut lines = vec![output.display().to_string()];
    lines.push(format!(
        "pages: {}  runs: {}  skipped items: {}",
        summary.geometry.num_pages,
        summary.runs_extracted,
        summary.extraction_diagnostics.len()
    ));
    lines.push(format!(
        "batches: {} sent, {} failed",
        summary.translation.batches_sent,
        summary.translation.failed_batches.len()
    ));
    lines.push(format!(
        "painted: {}  skipped: {}",
        summary.render.painted,
        summary.render.skipped.len()
    ));
    lines.join("\n")
}
