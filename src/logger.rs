use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::results::{RunSummary, Verdict};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Only progress bar and final summary
    Summary = 1,  // Batches and artifacts (default)
    Detailed = 2, // Every record outcome, warnings
    Debug = 3,    // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Matching `tracing` filter directive for library logs.
    pub fn tracing_directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Silent => "error",
            VerbosityLevel::Summary => "warn",
            VerbosityLevel::Detailed => "info",
            VerbosityLevel::Debug => "debug",
        }
    }
}

/// Operator-facing run log: timestamped messages, a record progress bar and
/// the closing summary.
#[derive(Clone)]
pub struct RunLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    run_metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
}

#[derive(Default, Clone)]
struct RunMetadata {
    started: Option<Instant>,
    elapsed: Option<Duration>,
    input_file: String,
    windows: usize,
    cooldowns: usize,
    summary: Option<RunSummary>,
    artifacts: Vec<String>,
}

impl RunLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        // Errors are shown at every verbosity
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", Local::now().format("%H:%M:%S%.3f"), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Print above the progress bar when one is active
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    pub async fn start_progress(&self, total_records: u64) {
        let pb = ProgressBar::new(total_records);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");

        *self.progress_bar.write().await = Some(pb);

        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.started = Some(Instant::now());
        }
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        if let Some(pb) = self.progress_bar.write().await.take() {
            pb.finish_and_clear();
        }

        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.elapsed = metadata.started.map(|s| s.elapsed());
        }

        self.info(final_message);
    }

    pub fn record_input_file(&self, path: &str) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.input_file = path.to_string();
        }
    }

    pub fn record_summary(&self, summary: RunSummary) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.summary = Some(summary);
        }
    }

    pub fn record_artifact(&self, path: &str) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.artifacts.push(path.to_string());
        }
        self.info(&format!("Report written: {}", path));
    }

    pub fn log_run_start(&self, records: usize, windows: usize, batch_size: usize) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.windows = windows;
        }
        self.info(&format!(
            "Verifying {} records in {} batches of up to {}",
            records, windows, batch_size
        ));
    }

    pub fn log_window_start(&self, number: usize, windows: usize, len: usize) {
        self.info(&format!("Processing batch {}/{} ({} records)", number, windows, len));
    }

    pub fn log_record_outcome(&self, key: &str, verdict: &Verdict) {
        match verdict {
            Verdict::Matched => self.detail(&format!("{}: matched", key)),
            Verdict::Unmatched => self.detail(&format!("{}: no match", key)),
            Verdict::Errored { reason } => self.warn(&format!("{}: error: {}", key, reason)),
        }
    }

    /// Record-level detail, shown from `Detailed` up.
    fn detail(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("INFO", message);
        }
    }

    pub fn log_cooldown(&self, cooldown: Duration) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.cooldowns += 1;
        }
        self.debug(&format!("Cooling down for {:?} before next batch", cooldown));
    }

    pub fn print_final_summary(&self) {
        let metadata = match self.run_metadata.lock() {
            Ok(metadata) => metadata.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== VERIFICATION SUMMARY ===");
        if let Some(elapsed) = metadata.elapsed {
            println!("Run Duration: {:.2}s", elapsed.as_secs_f64());
        }
        if !metadata.input_file.is_empty() {
            println!("Input File: {}", metadata.input_file);
        }
        println!("Batches: {} ({} cooldowns)", metadata.windows, metadata.cooldowns);

        if let Some(summary) = metadata.summary {
            println!("Records Verified: {}", summary.total);
            println!("Matched: {}", summary.matched);
            println!("Unmatched: {}", summary.unmatched);
            println!("Errors: {}", summary.errored);
        }

        for artifact in &metadata.artifacts {
            println!("Report: {}", artifact);
        }
        println!("============================\n");

        if let Some(summary) = metadata.summary {
            println!("{}", summary.completion_message());
        }
    }

    /// Write buffered messages to the log file, if one was requested.
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(path) = &self.log_file_path else {
            return Ok(());
        };

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let buffer = match self.log_buffer.lock() {
            Ok(buffer) => buffer.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for line in buffer {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}
