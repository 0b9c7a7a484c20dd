//! Command-line interface argument parsing.
//!
//! Flags left unset fall back to the configuration file, so most options
//! here are `Option`s rather than carrying clap defaults.

use crate::config::Provider;
use clap::Parser;
use std::path::PathBuf;

/// branch-trends - bank branch trend reports for selected counties
///
/// Reads pre-fetched branch rows, computes county and bank trends, market
/// shares and community reach, and writes a Markdown document, a
/// spreadsheet and optionally JSON, with narrative written by a local or
/// hosted language model.
///
/// Examples:
///   branch-trends --input data/ --counties "Cook County, Illinois" --years 2020,2021,2022
///   branch-trends --input rows.csv --years all --offline
///   branch-trends --input data/ --provider anthropic --formats document,json
///   branch-trends --input data/ --dry-run
///   branch-trends --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Input file (.csv or .json) or directory of input files
    #[arg(
        short,
        long,
        value_name = "PATH",
        required_unless_present = "init_config",
        env = "BRANCH_TRENDS_INPUT"
    )]
    pub input: Option<PathBuf>,

    /// Counties to report on, separated by ';'
    ///
    /// Example: --counties "Cook County, Illinois;Queens County, New York".
    /// Defaults to every county found in the input.
    #[arg(long, value_name = "COUNTIES", value_delimiter = ';')]
    pub counties: Option<Vec<String>>,

    /// Years to report on (comma-separated, or 'all' for 2017-2024)
    ///
    /// Defaults to every year found in the input.
    #[arg(long, value_name = "YEARS", value_delimiter = ',')]
    pub years: Option<Vec<String>>,

    /// Directory to write reports into
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output formats (comma-separated): document, spreadsheet, json
    #[arg(long, value_name = "FORMATS", value_delimiter = ',')]
    pub formats: Option<Vec<String>>,

    /// Report title
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Narrative provider
    #[arg(long, value_name = "PROVIDER", env = "BRANCH_TRENDS_PROVIDER")]
    pub provider: Option<Provider>,

    /// Model used for narrative generation
    #[arg(short, long, env = "BRANCH_TRENDS_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Per-request narrative timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of narrative sections requested at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Skip narrative generation and use statistical summaries
    #[arg(long, conflicts_with = "provider")]
    pub offline: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .branch-trends.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: load, normalize and aggregate the input, print counts and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .branch-trends.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref input) = self.input {
            if !input.exists() {
                return Err(format!("Input path does not exist: {}", input.display()));
            }
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref formats) = self.formats {
            if let Some(unknown) = formats
                .iter()
                .find(|f| crate::report::exporter_for(f).is_none())
            {
                return Err(format!(
                    "Unknown format '{}'. Expected one of: {}",
                    unknown,
                    crate::report::FORMATS.join(", ")
                ));
            }
        }

        if let Some(ref counties) = self.counties {
            if counties.iter().all(|c| c.trim().is_empty()) {
                return Err("At least one county must be given".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
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
    use crate::config::Config;

    fn make_args() -> Args {
        Args {
            input: None,
            counties: None,
            years: None,
            output_dir: None,
            formats: None,
            title: None,
            provider: None,
            model: None,
            ollama_url: None,
            timeout: None,
            concurrency: None,
            offline: false,
            config: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_county_and_year_lists() {
        let args = Args::try_parse_from([
            "branch-trends",
            "--input",
            "rows.csv",
            "--counties",
            "Cook County, Illinois;Queens County, New York",
            "--years",
            "2020,2021",
            "--provider",
            "anthropic",
        ])
        .unwrap();

        assert_eq!(
            args.counties,
            Some(vec![
                "Cook County, Illinois".to_string(),
                "Queens County, New York".to_string()
            ])
        );
        assert_eq!(args.years, Some(vec!["2020".to_string(), "2021".to_string()]));
        assert_eq!(args.provider, Some(Provider::Anthropic));
    }

    #[test]
    fn test_offline_conflicts_with_provider() {
        let result = Args::try_parse_from([
            "branch-trends",
            "--input",
            "rows.csv",
            "--offline",
            "--provider",
            "ollama",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_unknown_format() {
        let mut args = make_args();
        args.formats = Some(vec!["document".to_string(), "pdf".to_string()]);
        let err = args.validate().unwrap_err();
        assert!(err.contains("pdf"));
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_values() {
        let mut args = make_args();
        args.concurrency = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
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

    #[test]
    fn test_args_override_config() {
        let mut args = make_args();
        args.offline = true;
        args.model = Some("llama3.1:8b".to_string());
        args.output_dir = Some(PathBuf::from("out"));
        args.quiet = true;

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.narrative.provider, Provider::Offline);
        assert_eq!(config.narrative.model, "llama3.1:8b");
        assert_eq!(config.report.output_dir, "out");
        assert!(!config.general.show_progress);
        assert_eq!(config.narrative.timeout_seconds, 120);
    }
}
