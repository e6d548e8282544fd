//! # bdscan
//!
//! Scans a Blu-ray folder or mounted image and prints a JSON report of its
//! playlists, streams and measured bitrates.
//!
//! ## Usage
//! ```bash
//! # Scan every stream file
//! bdscan /mnt/disc
//!
//! # Only the clips behind two playlists, with a settings file
//! bdscan /mnt/disc --playlist 00800.MPLS --playlist 00801.MPLS --settings bdscan.json
//!
//! # With debug logging
//! RUST_LOG=bdscan=debug bdscan /mnt/disc
//! ```

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

use bdscan_core::{AbortHandle, Disc, NativeDirectory, ScanEvent, ScanReport, Scanner, Settings};

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Default)]
struct Args {
    disc: PathBuf,
    settings: Option<PathBuf>,
    playlists: Vec<String>,
    /// Resolve structure only, skip stream files.
    structure_only: bool,
}

const USAGE: &str = "usage: bdscan <disc-path> [--playlist NAME]... [--settings FILE] [--structure-only]";

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut disc = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--playlist" | "-p" => {
                let name = args.next().context("--playlist needs a name")?;
                parsed.playlists.push(name);
            }
            "--settings" | "-s" => {
                let path = args.next().context("--settings needs a file")?;
                parsed.settings = Some(PathBuf::from(path));
            }
            "--structure-only" => parsed.structure_only = true,
            "--help" | "-h" => bail!(USAGE),
            other if other.starts_with('-') => bail!("unknown option {}\n{}", other, USAGE),
            other => {
                if disc.replace(PathBuf::from(other)).is_some() {
                    bail!("only one disc path is accepted\n{}", USAGE);
                }
            }
        }
    }
    parsed.disc = disc.context(USAGE)?;
    Ok(parsed)
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Serialize)]
struct ScanSummary {
    scanned: Vec<String>,
    skipped: Vec<String>,
    interrupted: Option<String>,
    aborted: bool,
    file_errors: BTreeMap<String, String>,
    elapsed_seconds: f64,
}

impl From<&ScanReport> for ScanSummary {
    fn from(report: &ScanReport) -> Self {
        Self {
            scanned: report.scanned.clone(),
            skipped: report.skipped.clone(),
            interrupted: report.interrupted.clone(),
            aborted: report.aborted,
            file_errors: report
                .file_errors
                .iter()
                .map(|(file, e)| (file.clone(), e.to_string()))
                .collect(),
            elapsed_seconds: report.elapsed.as_secs_f64(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Output<'a> {
    disc: &'a Disc,
    disc_type: bdscan_core::DiscType,
    main_playlist: Option<&'a str>,
    playlist_groups: Vec<Vec<String>>,
    scan: Option<ScanSummary>,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bdscan=info".parse()?)
                .add_directive("bdscan_core=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let settings = match &args.settings {
        Some(path) => Settings::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    };
    settings.validate()?;

    info!("bdscan v{} reading {}", env!("CARGO_PKG_VERSION"), args.disc.display());
    let root = NativeDirectory::open(&args.disc)
        .with_context(|| format!("opening {}", args.disc.display()))?;

    let abort = AbortHandle::new();
    let ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current packet");
            ctrl_c.abort();
        }
    });

    let (tx, mut rx) = unbounded_channel();
    let structure_only = args.structure_only;
    let playlists = args.playlists.clone();
    let worker = tokio::task::spawn_blocking(move || -> Result<(Disc, Option<ScanReport>)> {
        let mut disc = Disc::open(root, &settings)?;
        if structure_only {
            return Ok((disc, None));
        }
        let report = Scanner::new(&mut disc, &settings)
            .with_events(tx)
            .with_abort(abort)
            .run(&playlists)?;
        Ok((disc, Some(report)))
    });

    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::Progress(p) => info!(
                "{:5.1}% {} ({}s left)",
                p.fraction() * 100.0,
                p.current_file.as_deref().unwrap_or("-"),
                p.remaining.map_or(0, |r| r.as_secs())
            ),
            ScanEvent::FileFinished { file, error: Some(e) } => error!("{}: {}", file, e),
            ScanEvent::FileFinished { file, error: None } => info!("{} done", file),
        }
    }

    let (disc, report) = worker.await??;
    let output = Output {
        disc: &disc,
        disc_type: disc.disc_type(),
        main_playlist: disc.main_playlist().map(|p| p.name.as_str()),
        playlist_groups: disc.playlist_groups(),
        scan: report.as_ref().map(ScanSummary::from),
    };

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output)?;
    writeln!(stdout)?;

    if report.is_some_and(|r| r.aborted) {
        bail!("scan aborted");
    }
    Ok(())
}
