//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Empirica - turn a hypothesis into a cross-country panel analysis
///
/// Picks World Bank indicators for the hypothesis, fetches and cleans the
/// panel, searches the literature and runs OLS, fixed-effects and
/// correlation models. Results land in a timestamped run directory.
///
/// Examples:
///   empirica "Higher health spending increases life expectancy"
///   empirica "Internet access raises GDP per capita" --no-literature
///   empirica "Education spending drives growth" --output-dir ./runs
///   empirica --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// The hypothesis to test, in plain language
    #[arg(value_name = "HYPOTHESIS", required_unless_present = "init_config")]
    pub hypothesis: Option<String>,

    /// API key for the text-generation service
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model used for planning and data review
    ///
    /// Overrides the model in .empirica.toml.
    #[arg(short, long, env = "EMPIRICA_MODEL")]
    pub model: Option<String>,

    /// Request timeout for the text-generation service, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Directory that receives one sub-directory per run
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .empirica.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Skip the literature search
    #[arg(long)]
    pub no_literature: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .empirica.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The hypothesis text, trimmed. Empty when not given.
    pub fn hypothesis_text(&self) -> &str {
        self.hypothesis.as_deref().map(str::trim).unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.hypothesis_text().is_empty() {
            return Err("Hypothesis must not be empty".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref dir) = self.output_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(format!(
                    "Output path is not a directory: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            hypothesis: Some("Higher health spending increases life expectancy".to_string()),
            api_key: None,
            model: None,
            timeout: None,
            output_dir: None,
            config: None,
            no_literature: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_positional_hypothesis() {
        let args = Args::try_parse_from(["empirica", "Trade raises growth", "--no-literature"]).unwrap();
        assert_eq!(args.hypothesis_text(), "Trade raises growth");
        assert!(args.no_literature);
    }

    #[test]
    fn test_hypothesis_required_without_init_config() {
        assert!(Args::try_parse_from(["empirica"]).is_err());
        assert!(Args::try_parse_from(["empirica", "--init-config"]).is_ok());
    }

    #[test]
    fn test_validation_blank_hypothesis() {
        let mut args = make_args();
        args.hypothesis = Some("   ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_output_dir_must_be_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut args = make_args();
        args.output_dir = Some(file.path().to_path_buf());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
