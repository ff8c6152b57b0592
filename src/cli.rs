use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::input::parse_column_list;

#[derive(Parser, Debug)]
#[command(name = "portal-verifier")]
#[command(about = "Verify spreadsheet records against a login-gated web portal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/portal-verifier.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Configuration file (defaults to ./config/portal-verifier.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose logging (use -v for record outcomes, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify every record in a CSV file against the portal
    Verify(VerifyArgs),

    /// Report whether a browser is available, as JSON
    Health,
}

#[derive(clap::Args, Debug, Clone)]
pub struct VerifyArgs {
    /// CSV file with the records to verify
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Column holding the record identifier (overrides config)
    #[arg(short = 'k', long)]
    pub key_column: Option<String>,

    /// Comma-separated extra columns to carry into the reports (overrides config)
    #[arg(short = 'c', long)]
    pub columns: Option<String>,

    /// Records per batch (overrides config)
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Seconds to pause between batches (overrides config)
    #[arg(long)]
    pub cooldown_secs: Option<u64>,

    /// Trial run with the small test batch size
    #[arg(long)]
    pub test_variant: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Directory for the generated reports (overrides config)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Print the full report as JSON, artifacts base64-encoded
    #[arg(long)]
    pub json: bool,

    /// Also write the run log to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

impl VerifyArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == Some(0) {
            return Err("--batch-size must be at least 1".to_string());
        }
        if matches!(&self.key_column, Some(k) if k.trim().is_empty()) {
            return Err("--key-column cannot be empty".to_string());
        }
        if self.test_variant && self.batch_size.is_some() {
            return Err("--test-variant and --batch-size cannot be combined".to_string());
        }
        Ok(())
    }

    /// Apply the input and browser overrides to the loaded config.
    ///
    /// `--columns` replaces the carried columns only. The configured snapshot
    /// fields stay, and any of them no longer loaded render as "N/A".
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(key_column) = &self.key_column {
            config.input.key_column = key_column.trim().to_string();
        }
        if let Some(columns) = &self.columns {
            let columns = parse_column_list(columns);
            if config.input.snapshot_fields.is_empty() {
                // Pin the summary to the columns the config originally carried
                config.input.snapshot_fields = config.input.auxiliary_columns.clone();
            }
            config.input.auxiliary_columns = columns;
        }
        if self.headed {
            config.browser.headless = false;
        }
    }
}
