//! voxid - speaker registry CLI and HTTP service.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use voxid_embed::SpectralExtractor;
use voxid_registry::{BatchFailurePolicy, Enrollment, Registry, RegistryConfig};

mod api;
mod server;
mod wav;

/// Speaker registry CLI.
///
/// Enrolls speaker voice samples, identifies speakers in new audio, and
/// serves the HTTP API. All state lives in a single snapshot file,
/// created on first save.
#[derive(Parser)]
#[command(name = "voxid")]
#[command(about = "Speaker embedding registry and identification")]
#[command(version)]
struct Cli {
    /// Snapshot file backing the registry
    #[arg(long, global = true, default_value = "speakers.msgpack")]
    snapshot: PathBuf,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address; a bare ":8000" binds all interfaces
        #[arg(long, default_value = ":8000")]
        addr: String,

        /// Default similarity threshold for identification
        #[arg(long, default_value_t = 0.7)]
        threshold: f32,

        /// Accepted X-API-Key value, repeatable. Falls back to
        /// VOXID_API_KEY; with no keys at all the check is disabled
        #[arg(long = "api-key")]
        api_keys: Vec<String>,
    },
    /// Enroll one WAV sample for a speaker
    Register {
        /// Speaker id to enroll under
        #[arg(long)]
        speaker: String,

        /// Path to a 16 kHz mono WAV file
        #[arg(long)]
        audio: PathBuf,
    },
    /// Identify the speaker in a WAV sample
    Identify {
        /// Path to a 16 kHz mono WAV file
        #[arg(long)]
        audio: PathBuf,

        /// Minimum similarity to accept a match
        #[arg(long, default_value_t = 0.7)]
        threshold: f32,
    },
    /// List enrolled speakers and their sample counts
    List,
    /// Remove a speaker and persist immediately
    Delete {
        /// Speaker id to remove
        id: String,
    },
    /// Enroll samples from a JSON manifest with one save at the end
    EnrollBatch {
        /// JSON array of { "speakerId": "...", "audio": "path.wav" }
        #[arg(long)]
        manifest: PathBuf,

        /// Keep going past failing items and report them at the end
        #[arg(long)]
        keep_going: bool,
    },
}

/// One entry of the enroll-batch manifest.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    speaker_id: String,
    audio: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            addr,
            threshold,
            api_keys,
        } => {
            let (registry, sample_rate) =
                open_registry(RegistryConfig::default(), &cli.snapshot)?;
            let opts = server::ServeOptions {
                addr,
                threshold,
                api_keys: resolve_api_keys(api_keys),
                snapshot_path: cli.snapshot.display().to_string(),
                sample_rate,
            };
            server::serve(registry, opts).await
        }
        Commands::Register { speaker, audio } => {
            let (mut registry, sample_rate) =
                open_registry(RegistryConfig::default(), &cli.snapshot)?;
            let samples = load_wav(&audio, sample_rate)?;
            registry.register(&speaker, &samples, true)?;
            let count = registry.speaker(&speaker).map(|s| s.count).unwrap_or(0);
            println!("registered {} ({} sample(s) on file)", speaker, count);
            Ok(())
        }
        Commands::Identify { audio, threshold } => {
            let (registry, sample_rate) =
                open_registry(RegistryConfig::default(), &cli.snapshot)?;
            let samples = load_wav(&audio, sample_rate)?;
            let hit = registry.identify(&samples, threshold)?;
            match hit.speaker {
                Some(id) => println!("{}  (score {:.3})", id, hit.score),
                None => println!("unknown  (best score {:.3})", hit.score),
            }
            Ok(())
        }
        Commands::List => {
            let (registry, _) = open_registry(RegistryConfig::default(), &cli.snapshot)?;
            if registry.is_empty() {
                println!("no speakers enrolled");
            } else {
                for info in registry.list() {
                    println!("{}  {} sample(s)", info.id, info.count);
                }
            }
            Ok(())
        }
        Commands::Delete { id } => {
            let (mut registry, _) =
                open_registry(RegistryConfig::default(), &cli.snapshot)?;
            registry.delete(&id)?;
            println!("deleted {}", id);
            Ok(())
        }
        Commands::EnrollBatch {
            manifest,
            keep_going,
        } => {
            let mut cfg = RegistryConfig::default();
            if keep_going {
                cfg.batch_failure = BatchFailurePolicy::Collect;
            }
            let (mut registry, sample_rate) = open_registry(cfg, &cli.snapshot)?;

            let text = fs::read_to_string(&manifest)
                .with_context(|| format!("reading {}", manifest.display()))?;
            let entries: Vec<ManifestEntry> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", manifest.display()))?;

            let mut items = Vec::with_capacity(entries.len());
            let mut unreadable = 0usize;
            for (idx, entry) in entries.into_iter().enumerate() {
                match load_wav(Path::new(&entry.audio), sample_rate) {
                    Ok(samples) => items.push(Enrollment {
                        speaker_id: entry.speaker_id,
                        samples,
                    }),
                    Err(err) if keep_going => {
                        eprintln!("item {} ({}): {:#}", idx, entry.speaker_id, err);
                        unreadable += 1;
                    }
                    Err(err) => return Err(err),
                }
            }

            let report = registry.register_batch(items)?;
            println!(
                "registered {} sample(s) across {} speaker(s)",
                report.registered,
                registry.speaker_count()
            );
            for failure in &report.failures {
                eprintln!(
                    "item {} ({}): {}",
                    failure.index, failure.speaker_id, failure.error
                );
            }
            let failed = unreadable + report.failures.len();
            if failed > 0 {
                bail!("{} item(s) failed", failed);
            }
            Ok(())
        }
    }
}

/// Opens the snapshot-backed registry with the built-in extractor.
/// Returns the registry and the sample rate its audio inputs must have.
fn open_registry(cfg: RegistryConfig, snapshot: &Path) -> Result<(Registry, usize)> {
    let extractor = SpectralExtractor::default();
    let sample_rate = extractor.sample_rate();
    let registry = Registry::open(cfg, Arc::new(extractor), snapshot)
        .with_context(|| format!("opening registry at {}", snapshot.display()))?;
    Ok((registry, sample_rate))
}

fn load_wav(path: &Path, sample_rate: usize) -> Result<Vec<f32>> {
    let bytes =
        fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let wav =
        wav::decode(&bytes).with_context(|| format!("decoding {}", path.display()))?;
    if wav.sample_rate as usize != sample_rate {
        bail!(
            "{}: sample rate {} Hz not supported (want {})",
            path.display(),
            wav.sample_rate,
            sample_rate
        );
    }
    Ok(wav.samples)
}

/// CLI flags win; otherwise a single key can come from the environment.
fn resolve_api_keys(flags: Vec<String>) -> Vec<String> {
    if !flags.is_empty() {
        return flags;
    }
    match std::env::var("VOXID_API_KEY") {
        Ok(key) if !key.is_empty() => vec![key],
        _ => Vec::new(),
    }
}
