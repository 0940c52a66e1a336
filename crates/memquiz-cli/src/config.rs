//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$MEMQUIZ_CONFIG` environment variable
//! 2. `~/.config/memquiz/config.toml`
//! 3. Built-in defaults (everything is optional)
//!
//! A few environment toggles used by build pipelines override the file;
//! see [`DataConfig::apply_env`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use memquiz_core::{DatasetVariant, DEFAULT_QUESTION_COUNT};

pub const DEFAULT_BASE_URL: &str =
    "https://huggingface.co/datasets/xiaowu0162/LongMemEval/resolve/main";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub quiz: QuizConfig,
    pub grader: GraderConfig,
}

/// Raw/canonical dataset locations and fetch policy.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub raw_dir: PathBuf,
    pub out_dir: PathBuf,
    pub base_url: String,
    /// Fetch even on hosted builds (`VERCEL=1`).
    pub allow_fetch: bool,
    /// Replace raw files that already exist locally.
    pub overwrite: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    pub default_count: usize,
    pub default_variant: DatasetVariant,
}

/// OpenAI-compatible chat completions endpoint used for free-text grading.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

// --- Defaults ---

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            out_dir: PathBuf::from("public/data"),
            base_url: DEFAULT_BASE_URL.into(),
            allow_fetch: false,
            overwrite: false,
        }
    }
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_QUESTION_COUNT,
            default_variant: DatasetVariant::S,
        }
    }
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 30,
        }
    }
}

/// `1` or `true` (any case).
pub fn env_flag(value: Option<&str>) -> bool {
    matches!(value.map(|v| v.trim().to_lowercase()).as_deref(), Some("1" | "true"))
}

impl DataConfig {
    /// Overlay `ALLOW_DATA_FETCH`, `DATA_OVERWRITE` and
    /// `LONGMEMEVAL_DATA_BASE` on top of the file settings.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if env_flag(get("ALLOW_DATA_FETCH").as_deref()) {
            self.allow_fetch = true;
        }
        if env_flag(get("DATA_OVERWRITE").as_deref()) {
            self.overwrite = true;
        }
        if let Some(base) = get("LONGMEMEVAL_DATA_BASE").filter(|b| !b.trim().is_empty()) {
            self.base_url = base;
        }
    }
}

/// Load config from disk, then apply environment overrides. Returns defaults
/// if no config file exists.
pub fn load_config() -> Result<Config> {
    load_config_with(|k| std::env::var(k).ok())
}

/// [`load_config`] with the environment supplied by `get`.
fn load_config_with(get: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let mut config = match config_path(&get) {
        Some(p) if p.exists() => {
            let content =
                std::fs::read_to_string(&p).with_context(|| format!("reading {}", p.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?
        }
        _ => Config::default(),
    };
    config.data.apply_env(get);
    Ok(config)
}

/// Resolve the config file path.
fn config_path(get: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(p) = get("MEMQUIZ_CONFIG") {
        return Some(PathBuf::from(p));
    }

    directories::BaseDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(".config")
            .join("memquiz")
            .join("config.toml")
    })
}

/// Show the active config path (for `memquiz config`).
pub fn show_config_path() -> String {
    match config_path(|k| std::env::var(k).ok()) {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
