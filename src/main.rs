use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use portal_verifier::browser_pool::ChromePortal;
use portal_verifier::cli::{Cli, Commands, VerifyArgs};
use portal_verifier::config::{self, AppConfig, BrowserConfig};
use portal_verifier::engine::{run_verification, VerificationRequest};
use portal_verifier::health;
use portal_verifier::logger::{RunLogger, VerbosityLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("warn,portal_verifier={}", verbosity.tracing_directive()))
        }))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to set the portal and credentials, then run portal-verifier again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    match cli.command {
        Some(Commands::Health) => {
            let browser_config = load_config(cli.config.as_deref(), false)
                .map(|c| c.browser)
                .unwrap_or_default();
            run_health(&browser_config)
        }
        Some(Commands::Verify(args)) => {
            let app_config = match load_config(cli.config.as_deref(), true) {
                Some(cfg) => cfg,
                None => std::process::exit(1),
            };
            run_verify(args, app_config, verbosity).await
        }
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Load configuration, offering to create it interactively when missing.
/// Errors are reported to stderr when `report` is set.
fn load_config(path: Option<&Path>, report: bool) -> Option<AppConfig> {
    let result = match path {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    };

    match result {
        Ok(cfg) => Some(cfg),
        Err(_) if !report => None,
        Err(config::ConfigError::FileNotFound(path)) => {
            match AppConfig::prompt_create_config() {
                Ok(Some(created_path)) => {
                    println!("✅ Created default configuration file at: {}", created_path.display());
                    println!("   Edit this file to set the portal and credentials, then run portal-verifier again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("❌ Configuration file not found at: {}", path.display());
                    eprintln!("   Run with --init to create a default configuration file.");
                }
                Err(e) => eprintln!("❌ Failed to create configuration file: {}", e),
            }
            None
        }
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            None
        }
    }
}

fn run_health(browser_config: &BrowserConfig) -> Result<()> {
    let report = health::check(browser_config);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_verify(args: VerifyArgs, mut app_config: AppConfig, verbosity: VerbosityLevel) -> Result<()> {
    if let Err(e) = args.validate() {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    args.apply_overrides(&mut app_config);

    let mut request = if args.test_variant {
        VerificationRequest::test_variant(&app_config)
    } else {
        VerificationRequest::from_config(&app_config)
    };
    if let Some(batch_size) = args.batch_size {
        request.batch_size = batch_size;
    }
    if let Some(secs) = args.cooldown_secs {
        request.cooldown = std::time::Duration::from_secs(secs);
    }

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&app_config.report.output_dir));

    // JSON mode keeps stdout clean for the report
    let log_verbosity = if args.json { VerbosityLevel::Silent } else { verbosity };
    let logger = match &args.log_file {
        Some(path) => RunLogger::with_log_file(log_verbosity, path.clone()),
        None => RunLogger::new(log_verbosity),
    };

    let input = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read input file: {}", args.input.display()))?;
    logger.record_input_file(&args.input.display().to_string());
    logger.info(&format!("Loaded input file: {}", args.input.display()));

    let browser_config = app_config.browser.clone();
    let result = run_verification(
        &input,
        &request,
        &app_config,
        || ChromePortal::launch(&browser_config),
        &logger,
    )
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            logger.error(&format!("{} error: {}", e.kind(), e));
            if let Err(log_err) = logger.export_logs() {
                eprintln!("Failed to write log file: {}", log_err);
            }
            std::process::exit(1);
        }
    };

    for artifact in [&report.tabular, &report.browsable] {
        let path = artifact
            .write_to(&output_dir)
            .with_context(|| format!("Failed to write {}", artifact.filename))?;
        logger.record_artifact(&path.display().to_string());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        logger.print_final_summary();
    }

    if let Err(e) = logger.export_logs() {
        eprintln!("Failed to write log file: {}", e);
    }

    Ok(())
}
