use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::layout::DEFAULT_BOX_WIDTH_MULTIPLIER;
use crate::translate::{DEFAULT_CHUNK_SIZE, DEFAULT_ENDPOINT, DEFAULT_INTER_BATCH_DELAY};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const HOME_DIR_NAME: &str = ".pdf-layout-translator";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source_language: String,
    pub target_language: String,
    pub chunk_size: usize,
    pub inter_batch_delay_ms: u64,
    pub bhashini_endpoint: String,
    pub bhashini_max_retries: usize,
    pub bhashini_timeout_secs: u64,
    pub font_normal: Option<PathBuf>,
    pub font_bold: Option<PathBuf>,
    pub width_multiplier: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_language: "mr".to_string(),
            target_language: "hi".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            inter_batch_delay_ms: DEFAULT_INTER_BATCH_DELAY.as_millis() as u64,
            bhashini_endpoint: DEFAULT_ENDPOINT.to_string(),
            bhashini_max_retries: 2,
            bhashini_timeout_secs: 60,
            font_normal: None,
            font_bold: None,
            width_multiplier: DEFAULT_BOX_WIDTH_MULTIPLIER,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translation: Option<TranslationSettings>,
    bhashini: Option<BhashiniSettings>,
    fonts: Option<FontSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    source_language: Option<String>,
    target_language: Option<String>,
    chunk_size: Option<usize>,
    inter_batch_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BhashiniSettings {
    endpoint: Option<String>,
    max_retries: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    normal: Option<String>,
    bold: Option<String>,
    width_multiplier: Option<f64>,
}

/// Builds settings from the embedded defaults, then every settings file
/// that exists, in increasing precedence.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML)
        .with_context(|| "failed to parse built-in settings")?;
    settings.merge(defaults);
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            settings.merge_file(&path)?;
        }
    }
    Ok(settings)
}

impl Settings {
    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translation) = incoming.translation {
            if let Some(code) = non_empty(translation.source_language) {
                self.source_language = code;
            }
            if let Some(code) = non_empty(translation.target_language) {
                self.target_language = code;
            }
            if let Some(size) = translation.chunk_size.filter(|size| *size > 0) {
                self.chunk_size = size;
            }
            if let Some(delay) = translation.inter_batch_delay_ms.filter(|delay| *delay > 0) {
                self.inter_batch_delay_ms = delay;
            }
        }
        if let Some(bhashini) = incoming.bhashini {
            if let Some(endpoint) = non_empty(bhashini.endpoint) {
                self.bhashini_endpoint = endpoint;
            }
            if let Some(retries) = bhashini.max_retries.filter(|retries| *retries > 0) {
                self.bhashini_max_retries = retries;
            }
            if let Some(timeout) = bhashini.timeout_secs.filter(|timeout| *timeout > 0) {
                self.bhashini_timeout_secs = timeout;
            }
        }
        if let Some(fonts) = incoming.fonts {
            if let Some(path) = non_empty(fonts.normal) {
                self.font_normal = Some(PathBuf::from(path));
            }
            if let Some(path) = non_empty(fonts.bold) {
                self.font_bold = Some(PathBuf::from(path));
            }
            if let Some(multiplier) = fonts
                .width_multiplier
                .filter(|value| value.is_finite() && *value > 0.0)
            {
                self.width_multiplier = multiplier;
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(HOME_DIR_NAME))
        }
    })
}
