use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use photosort::{DuplicateFilter, ImageHasher, PipelineConfig, RejectedImage, Scanner};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Serialize, Debug)]
struct TriageRecord {
    timestamp: String,
    scanned: usize,
    retained: Vec<String>,
    rejected: Vec<RejectedImage>,
}

#[derive(Parser, Debug)]
#[command(name = "photosort", version, about = "CLI for triaging photo collections")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the images a run would process, with their capture days
    Scan {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Drop near-duplicate and blurry images, reporting every decision
    Dedup {
        /// Directory to triage
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Sharpness score at or below which an image counts as blurry
        #[arg(long, default_value_t = 100.0)]
        blur_threshold: f64,
        /// Fingerprint distance below which two images are near-duplicates
        #[arg(long, default_value_t = 20)]
        phash_threshold: u32,
        /// Write the full decision record to this JSON file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { path } => {
            let records = scan_with_spinner(&path)?;
            println!("Found {} image(s) in {}", records.len(), path.display());
            for record in &records {
                match record.taken_at {
                    Some(ts) => println!("  {} ({})", record.file_name, ts.date()),
                    None => println!("  {} (no capture date)", record.file_name),
                }
            }
        }

        Commands::Dedup {
            path,
            blur_threshold,
            phash_threshold,
            report,
        } => {
            let defaults = PipelineConfig::default();
            if blur_threshold != defaults.blur_threshold
                || phash_threshold != defaults.phash_threshold
            {
                println!(
                    "▶ Using blur_threshold={blur_threshold}, phash_threshold={phash_threshold}"
                );
            }

            let records = scan_with_spinner(&path)?;
            let scanned = records.len();
            println!("▶ Hashing and filtering {scanned} image(s)…");

            let hasher = ImageHasher::new();
            let filter = DuplicateFilter::new(&hasher, blur_threshold, phash_threshold);
            let outcome = benchmark("duplicate triage", || filter.filter(records));

            println!("\nRetained {} image(s):", outcome.retained.len());
            for kept in &outcome.retained {
                println!("   🏆 {}", kept.path.display());
            }

            if outcome.rejected.is_empty() {
                println!("\nNothing rejected.");
            } else {
                println!("\nRejected {} image(s):", outcome.rejected.len());
                for rejected in &outcome.rejected {
                    println!(
                        "   🗑  {} ({})",
                        rejected.path().display(),
                        rejected.reason.as_str()
                    );
                }
            }

            if let Some(report_path) = report {
                let record = TriageRecord {
                    timestamp: Utc::now().to_rfc3339(),
                    scanned,
                    retained: outcome
                        .retained
                        .iter()
                        .map(|r| r.path.to_string_lossy().into_owned())
                        .collect(),
                    rejected: outcome.rejected,
                };
                let json = serde_json::to_string_pretty(&record)?;
                fs::write(&report_path, json)
                    .with_context(|| format!("Failed to write report {:?}", report_path))?;
                println!("\n✅ Wrote report to {}", report_path.display());
            }
        }
    }

    Ok(())
}

fn scan_with_spinner(path: &PathBuf) -> Result<Vec<photosort::ImageRecord>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let scanner = Scanner::new();
    let records = scanner
        .scan(path)
        .with_context(|| format!("Failed to scan {:?}", path))?;

    spinner.finish_with_message("Scan complete");
    Ok(records)
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
