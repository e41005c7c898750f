//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.empirica.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".empirica.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Text-generation service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Panel data provider settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Retry policy for provider calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Literature search settings.
    #[serde(default)]
    pub literature: LiteratureConfig,

    /// Cleaning thresholds.
    #[serde(default)]
    pub cleaning: CleaningConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory the run's results are written into.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Text-generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Messages API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Maximum tokens in a response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    /// API credential. Supplied per invocation, never written to disk.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_url: default_api_url(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout(),
            api_key: None,
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_llm_timeout() -> u64 {
    120
}

/// Panel data provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Base URL of the indicator API.
    #[serde(default = "default_data_url")]
    pub base_url: String,

    /// Records requested per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_data_timeout")]
    pub timeout_seconds: u64,

    /// Raw observation count below which an indicator counts as sparse.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: u64,

    /// First year used when the plan does not name one.
    #[serde(default = "default_start_year")]
    pub default_start_year: i32,

    /// Last year used when the plan does not name one.
    #[serde(default = "default_end_year")]
    pub default_end_year: i32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_url(),
            per_page: default_per_page(),
            timeout_seconds: default_data_timeout(),
            min_coverage: default_min_coverage(),
            default_start_year: default_start_year(),
            default_end_year: default_end_year(),
        }
    }
}

fn default_data_url() -> String {
    "https://api.worldbank.org/v2".to_string()
}

fn default_per_page() -> u32 {
    1000
}

fn default_data_timeout() -> u64 {
    30
}

fn default_min_coverage() -> u64 {
    200
}

fn default_start_year() -> i32 {
    2000
}

fn default_end_year() -> i32 {
    2023
}

/// Retry policy for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    2000
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Literature search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureConfig {
    /// Run the literature search at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_semantic_scholar_url")]
    pub semantic_scholar_url: String,

    #[serde(default = "default_pubmed_url")]
    pub pubmed_url: String,

    /// Results requested from Semantic Scholar.
    #[serde(default = "default_semantic_scholar_max")]
    pub semantic_scholar_max: usize,

    /// Results requested from PubMed.
    #[serde(default = "default_pubmed_max")]
    pub pubmed_max: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_literature_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            semantic_scholar_url: default_semantic_scholar_url(),
            pubmed_url: default_pubmed_url(),
            semantic_scholar_max: default_semantic_scholar_max(),
            pubmed_max: default_pubmed_max(),
            timeout_seconds: default_literature_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_semantic_scholar_url() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}

fn default_pubmed_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

fn default_semantic_scholar_max() -> usize {
    8
}

fn default_pubmed_max() -> usize {
    5
}

fn default_literature_timeout() -> u64 {
    30
}

/// Cleaning thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Rows that must survive cleaning for the run to continue.
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_rows: default_min_rows(),
        }
    }
}

fn default_min_rows() -> usize {
    10
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
        let default_path = Path::new(CONFIG_FILE_NAME);

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
        if let Some(ref model) = args.model {
            self.llm.model = model.clone();
        }
        if let Some(ref key) = args.api_key {
            self.llm.api_key = Some(key.clone());
        }
        if let Some(timeout) = args.timeout {
            self.llm.timeout_seconds = timeout;
        }
        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.clone();
        }
        if args.no_literature {
            self.literature.enabled = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.min_coverage, 200);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.cleaning.min_rows, 10);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "runs/health"
verbose = true

[llm]
model = "claude-test"
max_tokens = 2000

[data]
per_page = 500
min_coverage = 150

[retry]
max_attempts = 5
backoff_ms = 10
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, PathBuf::from("runs/health"));
        assert!(config.general.verbose);
        assert_eq!(config.llm.model, "claude-test");
        assert_eq!(config.llm.max_tokens, 2000);
        assert_eq!(config.data.per_page, 500);
        assert_eq!(config.data.min_coverage, 150);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff(), Duration::from_millis(10));
        // untouched sections keep their defaults
        assert!(config.literature.enabled);
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(!toml_str.contains("sk-secret"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[llm]"));
        assert!(toml_str.contains("[data]"));
        assert!(toml_str.contains("[retry]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[cleaning]\nmin_rows = 25\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cleaning.min_rows, 25);
    }
}
