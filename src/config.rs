//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.branch-trends.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".branch-trends.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Narrative backend settings.
    #[serde(default)]
    pub narrative: NarrativeConfig,

    /// Analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Show a spinner with the current checkpoint.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            show_progress: true,
        }
    }
}

/// Which narrative backend to use for the whole run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Anthropic Messages API
    Anthropic,
    /// No backend; every section uses its statistical fallback
    Offline,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Ollama => write!(f, "ollama"),
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::Offline => write!(f, "offline"),
        }
    }
}

/// Narrative backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Model name passed to the backend.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Anthropic API base URL.
    #[serde(default = "default_anthropic_url")]
    pub anthropic_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per section.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Retries after a transient failure.
    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// Initial backoff before a retry, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Upper bound for the backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Sections generated at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            ollama_url: default_ollama_url(),
            anthropic_url: default_anthropic_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
            max_retries: default_retries(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    4
}

/// Analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Cumulative market share that defines the concentration leaders.
    #[serde(default = "default_threshold")]
    pub concentration_threshold: f64,

    /// Banks listed per county in narrative digests.
    #[serde(default = "default_top_banks")]
    pub top_banks: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concentration_threshold: default_threshold(),
            top_banks: default_top_banks(),
        }
    }
}

fn default_threshold() -> f64 {
    0.5
}

fn default_top_banks() -> usize {
    10
}

/// Report output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory the artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// File stem shared by all artifacts.
    #[serde(default = "default_file_stem")]
    pub file_stem: String,

    /// Formats to export: document, spreadsheet, json.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    /// Report title; derived from the selection when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_stem: default_file_stem(),
            formats: default_formats(),
            title: None,
        }
    }
}

fn default_output_dir() -> String {
    "reports".to_string()
}

fn default_file_stem() -> String {
    "branch_trends".to_string()
}

fn default_formats() -> Vec<String> {
    vec!["document".to_string(), "spreadsheet".to_string()]
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(provider) = args.provider {
            self.narrative.provider = provider;
        }
        if args.offline {
            self.narrative.provider = Provider::Offline;
        }
        if let Some(ref model) = args.model {
            self.narrative.model = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.narrative.ollama_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.narrative.timeout_seconds = timeout;
        }
        if let Some(concurrency) = args.concurrency {
            self.narrative.concurrency = concurrency;
        }

        if let Some(ref dir) = args.output_dir {
            self.report.output_dir = dir.display().to_string();
        }
        if let Some(ref formats) = args.formats {
            self.report.formats = formats.clone();
        }
        if let Some(ref title) = args.title {
            self.report.title = Some(title.clone());
        }

        if args.verbose {
            self.general.verbose = true;
        }
        if args.quiet {
            self.general.show_progress = false;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
