//! CLI entry point for batchburn
//!
//! Scans folders, discovers encoders, runs batches and launches previews.

use anyhow::{anyhow, Context, Result};
use batchburn::{
    check_toolkit, preview_folder, progress_channel, resolve_available, scan_folders, select_best,
    BatchContext, BatchRunner, CancellationFlag, Config, EncoderSelection, FfmpegToolkit,
    FileOutcome, RunOptions, ScanOptions, StateStore, StreamDescriptor, WorkFolder,
};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Burn subtitles into folders of videos, resumably
#[derive(Parser, Debug)]
#[command(name = "batchburn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List work folders, their state and track choices
    Scan {
        /// Directory to search for video folders
        root: PathBuf,
    },

    /// Discover usable encoders and print the selection
    Encoders,

    /// Burn every pending file under ROOT
    Run {
        /// Directory to search for video folders
        root: PathBuf,

        #[command(flatten)]
        tracks: TrackArgs,

        /// Use software encoders without trial encodes
        #[arg(long)]
        skip_discovery: bool,
    },

    /// Play the first pending file of a folder with the chosen tracks
    Preview {
        /// Folder holding the videos
        folder: PathBuf,

        #[command(flatten)]
        tracks: TrackArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct TrackArgs {
    /// Subtitle stream index to burn (overrides auto-selection)
    #[arg(long, conflicts_with = "no_subtitles")]
    subtitle_stream: Option<u32>,

    /// Audio stream index to keep (overrides auto-selection)
    #[arg(long)]
    audio_stream: Option<u32>,

    /// Encode without burning any subtitles
    #[arg(long)]
    no_subtitles: bool,
}

impl TrackArgs {
    fn apply(&self, folder: &mut WorkFolder) {
        if self.no_subtitles {
            folder.select_subtitle(None);
        } else if let Some(index) = self.subtitle_stream {
            if !folder.select_subtitle(Some(index)) {
                warn!(
                    "{}: no subtitle stream {}, keeping {:?}",
                    folder.display_name(),
                    index,
                    folder.selected_subtitle
                );
            }
        }

        if let Some(index) = self.audio_stream {
            if !folder.select_audio(Some(index)) {
                warn!(
                    "{}: no audio stream {}, keeping {:?}",
                    folder.display_name(),
                    index,
                    folder.selected_audio
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;

    match check_toolkit(&config.tools) {
        Ok(Some(major)) => info!("Using ffmpeg {}", major),
        Ok(None) => info!("Using ffmpeg (unreleased build)"),
        Err(e) => warn!("Media toolkit check failed: {}", e),
    }

    let toolkit = Arc::new(FfmpegToolkit::from_config(&config.tools));

    match cli.command {
        Command::Scan { root } => {
            let folders = scan(&config, toolkit, &root).await?;
            print_folders(&folders);
            Ok(ExitCode::SUCCESS)
        }
        Command::Encoders => {
            let encoders = discover(&config, toolkit).await;
            println!("{}", encoders);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            root,
            tracks,
            skip_discovery,
        } => {
            let mut folders = scan(&config, toolkit.clone(), &root).await?;
            for folder in folders.values_mut() {
                tracks.apply(folder);
            }

            let encoders = if skip_discovery {
                EncoderSelection::software()
            } else {
                discover(&config, toolkit.clone()).await
            };

            run_batch(&config, toolkit, encoders, folders).await
        }
        Command::Preview { folder, tracks } => {
            let folders = scan(&config, toolkit.clone(), &folder).await?;
            let canonical = folder
                .canonicalize()
                .with_context(|| format!("Cannot resolve {}", folder.display()))?;
            let mut work = folders
                .get(&canonical)
                .cloned()
                .ok_or_else(|| anyhow!("No videos directly inside {}", folder.display()))?;
            tracks.apply(&mut work);

            preview_folder(toolkit.as_ref(), &work).context("Preview failed")?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn scan(
    config: &Config,
    toolkit: Arc<FfmpegToolkit>,
    root: &Path,
) -> Result<BTreeMap<PathBuf, WorkFolder>> {
    let options = ScanOptions::from_config(config);
    let store = StateStore::new(config.scan.state_file_name.clone());
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || scan_folders(&root, &options, toolkit.as_ref(), &store))
        .await
        .context("Scan task failed")?
        .context("Scan failed")
}

async fn discover(config: &Config, toolkit: Arc<FfmpegToolkit>) -> EncoderSelection {
    let timeout = Duration::from_secs(config.encode.trial_timeout_secs);
    info!("Discovering encoders (trial timeout {:?})", timeout);
    let available = resolve_available(toolkit, timeout).await;
    let selection = select_best(&available);
    info!("Selected encoders: {}", selection);
    selection
}

async fn run_batch(
    config: &Config,
    toolkit: Arc<FfmpegToolkit>,
    encoders: EncoderSelection,
    folders: BTreeMap<PathBuf, WorkFolder>,
) -> Result<ExitCode> {
    let cancel: CancellationFlag = Arc::new(AtomicBool::new(false));
    let runner = BatchRunner::new(
        toolkit,
        StateStore::new(config.scan.state_file_name.clone()),
        encoders,
        RunOptions::from_config(config),
    )
    .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current file");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let (tx, mut rx) = progress_channel();
    let mut ctx = BatchContext::new(folders);
    info!(
        "{} file(s) pending across {} folder(s)",
        ctx.pending_total(),
        ctx.folders.len()
    );
    let batch = tokio::task::spawn_blocking(move || runner.run(&mut ctx, &tx));

    while let Some(event) = rx.recv().await {
        let folder = event
            .folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &event.outcome {
            FileOutcome::Done => info!(
                "[{:5.1}%] {}/{} done (folder {:.0}%)",
                event.global_percent, folder, event.file, event.folder_percent
            ),
            FileOutcome::Failed(reason) => warn!(
                "[{:5.1}%] {}/{} failed: {}",
                event.global_percent, folder, event.file, reason
            ),
        }
    }

    let summary = batch.await.context("Batch task failed")??;
    println!(
        "Processed {} file(s): {} succeeded, {} failed{}",
        summary.processed,
        summary.succeeded,
        summary.failed,
        if summary.cancelled { ", cancelled" } else { "" }
    );

    if summary.failed > 0 || summary.cancelled {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn describe_track(track: &StreamDescriptor, selected: Option<u32>) -> String {
    let marker = if selected == Some(track.index) { "*" } else { " " };
    format!("{} {}", marker, track)
}

fn print_folders(folders: &BTreeMap<PathBuf, WorkFolder>) {
    if folders.is_empty() {
        println!("No folders with videos found");
        return;
    }

    for folder in folders.values() {
        println!(
            "{} ({} video(s), {}, {} pending, {} finished)",
            folder.path.display(),
            folder.video_count,
            humansize::format_size(folder.total_bytes, humansize::WINDOWS),
            folder.pending.len(),
            folder.finished.len()
        );

        if folder.subtitles.is_empty() {
            println!("  subtitles: none");
        } else {
            println!("  subtitles:");
            for track in &folder.subtitles {
                println!("    {}", describe_track(track, folder.selected_subtitle));
            }
        }

        if folder.audios.is_empty() {
            println!("  audio: none");
        } else {
            println!("  audio:");
            for track in &folder.audios {
                println!("    {}", describe_track(track, folder.selected_audio));
            }
        }
    }
}
