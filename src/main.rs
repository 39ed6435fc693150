//! Binary entry point for undertone.
//!
//! This binary provides the CLI for transcript analysis and pattern review.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::broadcast::error::RecvError;
use undertone::config::UndertoneConfig;
use undertone::observability::{self, global_event_bus};
use undertone::{
    AnalysisEvent, AnalysisService, EmotionPattern, JournalEntry, PatternService, TimeRange,
};

/// Undertone - emotional analysis for voice journal transcripts.
#[derive(Parser)]
#[command(name = "undertone")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Analyze a transcript.
    Analyze {
        /// The transcript text; read from stdin when omitted.
        transcript: Option<String>,

        /// Path to a history file holding prior entries (JSON array).
        #[arg(long)]
        history: Option<PathBuf>,

        /// Append the result to the history file after analysis.
        #[arg(long)]
        record: bool,

        /// Print the raw result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Summarize emotion patterns from recorded history.
    Patterns {
        /// Path to a history file holding prior entries (JSON array).
        #[arg(long)]
        history: PathBuf,

        /// Time range: today, week, month, or all.
        #[arg(short, long, default_value = "all")]
        range: String,

        /// Print the analysis as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A .env file is optional; absence is not an error.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = observability::init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(
    cli: Cli,
    config: UndertoneConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Analyze {
            transcript,
            history,
            record,
            json,
        } => cmd_analyze(&config, transcript, history, record, json).await,

        Commands::Patterns {
            history,
            range,
            json,
        } => cmd_patterns(&history, &range, json),
    }
}

/// Loads configuration, honoring the `UNDERTONE_CONFIG_PATH` override.
fn load_config(path: Option<&str>) -> Result<UndertoneConfig, Box<dyn std::error::Error>> {
    // If a path is provided, load from that file
    if let Some(config_path) = path {
        let config = UndertoneConfig::load_from_file(Path::new(config_path))?;
        return Ok(config.with_env_overrides());
    }

    // Environment override for config path
    if let Ok(config_path) = std::env::var("UNDERTONE_CONFIG_PATH") {
        if !config_path.trim().is_empty() {
            let config = UndertoneConfig::load_from_file(Path::new(&config_path))?;
            return Ok(config.with_env_overrides());
        }
    }

    // Otherwise, load from default location
    Ok(UndertoneConfig::load_default().with_env_overrides())
}

/// Analyze command.
async fn cmd_analyze(
    config: &UndertoneConfig,
    transcript: Option<String>,
    history_path: Option<PathBuf>,
    record: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if record && history_path.is_none() {
        return Err("--record requires --history".into());
    }

    let transcript = match transcript {
        Some(text) => text,
        None => read_transcript_stdin()?,
    };

    let history = match history_path.as_deref() {
        Some(path) if path.exists() => load_history(path)?,
        Some(path) => {
            tracing::debug!(path = %path.display(), "history file not found, starting empty");
            Vec::new()
        },
        None => Vec::new(),
    };

    let service = AnalysisService::from_config(config)?;
    tracing::info!(provider = service.provider_name(), "starting analysis");

    let progress = spawn_progress_reporter();
    let outcome = service.analyze(&transcript, &history).await;
    progress.abort();

    let result = outcome?;
    let now = chrono::Utc::now();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.to_share_text(now));
        let context =
            PatternService::new().recent_emotion_context(&history, &result.primary_emotion, now);
        if let Some(line) = context {
            println!();
            println!("{line}");
        }
    }

    if record {
        if let Some(path) = history_path {
            let mut entries = history;
            entries.insert(0, JournalEntry::from_analysis(&transcript, &result, now));
            save_history(&path, &entries)?;
            eprintln!("Recorded entry to {}", path.display());
        }
    }

    Ok(())
}

/// Patterns command.
fn cmd_patterns(
    history_path: &Path,
    range: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = load_history(history_path)?;
    let analysis = PatternService::new().analyze(&entries, chrono::Utc::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    if !analysis.has_significant_patterns() {
        println!("No recurring emotions yet.");
        println!("Patterns appear once an emotion repeats within a time window.");
        return Ok(());
    }

    let range = range.to_lowercase();
    match range.as_str() {
        "today" => print_patterns(TimeRange::Today, &analysis.daily),
        "week" => print_patterns(TimeRange::ThisWeek, &analysis.weekly),
        "month" => print_patterns(TimeRange::ThisMonth, &analysis.monthly),
        _ => {
            print_patterns(TimeRange::Today, &analysis.daily);
            print_patterns(TimeRange::ThisWeek, &analysis.weekly);
            print_patterns(TimeRange::ThisMonth, &analysis.monthly);
        },
    }

    // The trajectory is computed from today's entries only.
    if range != "week" && range != "month" {
        if let Some(trajectory) = &analysis.trajectory {
            println!("Today's trajectory");
            println!("  Dominant emotion: {}", trajectory.dominant_emotion);
            for change in &trajectory.changes {
                println!(
                    "  {} to {} after {} minutes",
                    change.from_emotion,
                    change.to_emotion,
                    change.elapsed_secs / 60
                );
            }
            for insight in &trajectory.insights {
                println!("  {insight}");
            }
            println!();
        }
    }

    if let Some(emotion) = analysis.most_frequent_emotion() {
        println!("Most frequent emotion overall: {emotion}");
    }

    Ok(())
}

/// Prints one window's patterns.
fn print_patterns(range: TimeRange, patterns: &[EmotionPattern]) {
    if patterns.is_empty() {
        return;
    }

    println!("{}", range.display_name());
    for pattern in patterns {
        println!("  {} ({}x)", pattern.emotion, pattern.frequency);
        for insight in &pattern.insights {
            println!("    {insight}");
        }
        if !pattern.triggers.is_empty() {
            println!("    Possible triggers: {}", pattern.triggers.join(", "));
        }
    }
    println!();
}

/// Prints retry progress from the global event bus to stderr.
fn spawn_progress_reporter() -> tokio::task::JoinHandle<()> {
    let mut events = global_event_bus().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AnalysisEvent::RetryScheduled {
                    attempt,
                    max_attempts,
                    delay_ms,
                    reason,
                    ..
                }) => {
                    eprintln!(
                        "Attempt {attempt} of {max_attempts} failed ({reason}); retrying in {}s",
                        delay_ms / 1000
                    );
                },
                Ok(_) => {},
                Err(RecvError::Lagged(_)) => {},
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Reads the transcript from stdin when not given as an argument.
fn read_transcript_stdin() -> Result<String, Box<dyn std::error::Error>> {
    use std::io::Read;

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    Ok(input)
}

/// Reads a history file into entries, newest first.
fn load_history(path: &Path) -> Result<Vec<JournalEntry>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let mut entries: Vec<JournalEntry> = serde_json::from_str(&raw)
        .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(entries)
}

/// Writes entries back to the history file.
fn save_history(path: &Path, entries: &[JournalEntry]) -> Result<(), Box<dyn std::error::Error>> {
    let raw = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, raw).map_err(|e| format!("failed to write {}: {e}", path.display()))?;

    Ok(())
}
