extern crate clap;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::{ColoredString, Colorize};
use log::{info, warn};
use serde::Serialize;
use speed_pulse::cloudflare::requests::meta::ConnectionInfo;
use speed_pulse::errors::{exit_codes, format_error_for_display};
use speed_pulse::history::{HistoryEntry, HistoryStore};
use speed_pulse::results::LatencyConfidence;
use speed_pulse::scoring::{format_speed, RatingThresholds, SpeedRating};
use speed_pulse::{
    CancelToken, Client, ProgressCallback, ProgressEvent, SpeedTest,
    SpeedTestError, SpeedTestResult, TestConfig, TestPhase,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,

    /// Where results are stored (default: the user data directory)
    #[arg(long, global = true, value_name = "PATH")]
    history_file: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[derive(Subcommand)]
enum Command {
    /// Show or clear previously saved results
    History {
        /// Delete every saved result
        #[arg(long)]
        clear: bool,

        /// Print the history as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Print the result as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Seconds spent on each of the download and upload phases
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Number of latency probes
    #[arg(long, value_name = "N")]
    probes: Option<usize>,

    /// Upload chunk size in KiB
    #[arg(long, value_name = "KIB")]
    chunk_size: Option<usize>,

    /// Milliseconds between two throughput samples
    #[arg(long, value_name = "MS")]
    sample_interval: Option<u64>,

    /// Don't save the result
    #[arg(long)]
    no_history: bool,
}

impl RunArgs {
    fn config(&self) -> Result<TestConfig, SpeedTestError> {
        let mut config = TestConfig::default();

        if let Some(secs) = self.duration {
            config.phase_duration = Duration::from_secs(secs);
        }
        if let Some(probes) = self.probes {
            config.probe_count = probes;
        }
        if let Some(kib) = self.chunk_size {
            config.chunk_size = kib.checked_mul(1024).ok_or_else(|| {
                SpeedTestError::config(format!("chunk size of {} KiB is too large", kib))
            })?;
        }
        if let Some(ms) = self.sample_interval {
            config.sample_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    connection: &'a ConnectionInfo,
    #[serde(flatten)]
    result: &'a SpeedTestResult,
    download_rating: SpeedRating,
    upload_rating: SpeedRating,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let outcome = match &cli.command {
        Some(Command::History { clear, json }) => {
            show_history(&cli, *clear, *json)
        }
        None => run_test(&cli).await,
    };

    let code = match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_error_for_display(&e).red());
            e.exit_code()
        }
    };

    std::process::exit(code);
}

fn history_store(cli: &Cli) -> Result<HistoryStore, SpeedTestError> {
    cli.history_file
        .clone()
        .or_else(HistoryStore::default_path)
        .map(HistoryStore::new)
        .ok_or_else(|| {
            SpeedTestError::config("no data directory available for history")
                .with_suggestion("Pass --history-file <PATH>.")
        })
}

async fn run_test(cli: &Cli) -> Result<i32, SpeedTestError> {
    let args = &cli.run;
    let config = args.config()?;
    config.validate()?;

    let client = Client::new();
    let connection = client
        .connection_info(&config.meta_url, config.request_timeout)
        .await;

    if !args.json {
        println!("{} {}", "Server Location:".bold().white(), connection.server_location.bright_blue());
        println!("{} {} {}", "Your IP:".bold().white(), connection.ip.bright_blue(), format!("({})", connection.isp).bright_blue());
        println!("{} {}", "Location:".bold().white(), connection.location.bright_blue());
    }

    let thresholds = config.rating_thresholds;
    let engine = SpeedTest::new(client, config);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing with a partial result");
                cancel.cancel();
            }
        });
    }

    let printer = LivePrinter { quiet: args.json };
    let result = engine.run_with_cancel(&printer, &cancel).await?;

    if args.json {
        let report = JsonReport {
            connection: &connection,
            result: &result,
            download_rating: result.download_rating(&thresholds),
            upload_rating: result.upload_rating(&thresholds),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&result, &thresholds);
    }

    if result.cancelled {
        return Ok(exit_codes::PARTIAL_FAILURE);
    }

    if !args.no_history {
        match history_store(cli).and_then(|store| store.append(result)) {
            Ok(entry) => info!("Result saved as {}", entry.id),
            Err(e) => warn!("Result not saved: {}", e.message),
        }
    }

    Ok(exit_codes::SUCCESS)
}

fn show_history(cli: &Cli, clear: bool, json: bool) -> Result<i32, SpeedTestError> {
    let store = history_store(cli)?;

    if clear {
        store.clear()?;
        println!("History cleared ({})", store.path().display());
        return Ok(exit_codes::SUCCESS);
    }

    let entries = store.load()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No saved results in {}", store.path().display());
    } else {
        let thresholds = RatingThresholds::default();
        for entry in &entries {
            print_history_line(entry, &thresholds);
        }
    }

    Ok(exit_codes::SUCCESS)
}

fn print_history_line(entry: &HistoryEntry, thresholds: &RatingThresholds) {
    let result = &entry.result;
    println!(
        "{}  {} {}  {} {}  {} {} ms  {} {} ms",
        result.completed_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        "down".bold().white(),
        paint(&format_speed(result.download_speed_mbps), result.download_rating(thresholds)),
        "up".bold().white(),
        paint(&format_speed(result.upload_speed_mbps), result.upload_rating(thresholds)),
        "ping".bold().white(),
        result.ping_ms,
        "jitter".bold().white(),
        result.jitter_ms,
    );
}

fn print_summary(result: &SpeedTestResult, thresholds: &RatingThresholds) {
    let download = result.download_rating(thresholds);
    let upload = result.upload_rating(thresholds);

    println!();
    if result.latency_confidence == LatencyConfidence::Degraded {
        println!("{} {}", "Latency:".bold().white(), "unavailable".yellow());
    } else {
        println!("{} {} ms", "Latency:".bold().white(), result.ping_ms);
        println!("{} {} ms", "Jitter:".bold().white(), result.jitter_ms);
    }
    println!(
        "{} {} {}",
        "Download speed:".bold().white(),
        paint(&format_speed(result.download_speed_mbps), download),
        format!("({})", download.label()).dimmed()
    );
    println!(
        "{} {} {}",
        "Upload speed:".bold().white(),
        paint(&format_speed(result.upload_speed_mbps), upload),
        format!("({})", upload.label()).dimmed()
    );
    if result.cancelled {
        println!("{}", "Test cancelled, figures are partial.".yellow());
    }
}

fn paint(text: &str, rating: SpeedRating) -> ColoredString {
    let hex = rating.color_hex().trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
            .unwrap_or(255)
    };

    text.truecolor(channel(0), channel(2), channel(4)).bold()
}

/// Prints phase headers and live samples to the terminal.
struct LivePrinter {
    quiet: bool,
}

impl ProgressCallback for LivePrinter {
    fn on_progress(&self, event: ProgressEvent) {
        if self.quiet {
            return;
        }

        match event {
            ProgressEvent::PhaseChange(phase) => {
                let title = match phase {
                    TestPhase::ProbingLatency => "Measuring latency",
                    TestPhase::MeasuringDownload => "Measuring download",
                    TestPhase::MeasuringUpload => "Measuring upload",
                    TestPhase::Idle | TestPhase::Completed => return,
                };
                println!("{}", title.bold().cyan());
            }
            ProgressEvent::LatencyMeasurement { value_ms, current, total } => {
                print!("\r  probe {}/{}: {:.1} ms   ", current, total, value_ms);
                let _ = std::io::stdout().flush();
            }
            ProgressEvent::BandwidthMeasurement { speed_mbps, sample, .. } => {
                print!(
                    "\r  sample {}: {}      ",
                    sample,
                    format_speed(speed_mbps).bright_cyan()
                );
                let _ = std::io::stdout().flush();
            }
            ProgressEvent::PhaseComplete(_) => println!(),
        }
    }
}
