// SCAN ORCHESTRATOR - Sequential stream file scanning with progress and abort
//
// Files are scanned one after another. Each file's statistics land on its
// clip; every playlist reading that clip is recomputed before and after.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::disc::Disc;
use crate::error::{Result, ScanError};
use crate::settings::Settings;
use crate::stream_file::scan_clip;

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ScanProgress {
    pub finished_bytes: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    /// Extrapolated from throughput so far.
    pub remaining: Option<Duration>,
    pub current_file: Option<String>,
}

impl ScanProgress {
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.finished_bytes as f64 / self.total_bytes as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Progress(ScanProgress),
    FileFinished { file: String, error: Option<String> },
}

/// Shared stop flag; clones observe the same request.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// Clips scanned to the end (possibly with a per-file error).
    pub scanned: Vec<String>,
    /// Selected clips that were never read.
    pub skipped: Vec<String>,
    /// Clip whose scan an abort cut short; its statistics were discarded.
    pub interrupted: Option<String>,
    pub aborted: bool,
    pub file_errors: BTreeMap<String, ScanError>,
    pub total_bytes: u64,
    pub finished_bytes: u64,
    pub elapsed: Duration,
}

/// Time-throttled progress reporting.
struct ProgressClock {
    started: Instant,
    interval: Duration,
    last: Option<Instant>,
    total_bytes: u64,
}

impl ProgressClock {
    fn tick(&mut self, finished_bytes: u64, file: &str, force: bool) -> Option<ScanProgress> {
        let now = Instant::now();
        if !force && self.last.is_some_and(|last| now.duration_since(last) < self.interval) {
            return None;
        }
        self.last = Some(now);

        let elapsed = now.duration_since(self.started);
        let remaining = (finished_bytes > 0).then(|| {
            let left = self.total_bytes.saturating_sub(finished_bytes) as f64;
            Duration::from_secs_f64(elapsed.as_secs_f64() * left / finished_bytes as f64)
        });
        Some(ScanProgress {
            finished_bytes,
            total_bytes: self.total_bytes,
            elapsed,
            remaining,
            current_file: Some(file.to_string()),
        })
    }
}

// ============================================================================
// Scanner
// ============================================================================

pub struct Scanner<'a> {
    disc: &'a mut Disc,
    settings: &'a Settings,
    events: Option<UnboundedSender<ScanEvent>>,
    abort: AbortHandle,
}

impl<'a> Scanner<'a> {
    pub fn new(disc: &'a mut Disc, settings: &'a Settings) -> Self {
        Self {
            disc,
            settings,
            events: None,
            abort: AbortHandle::new(),
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<ScanEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Clips to scan for `playlists` (every clip when empty), in order,
    /// without duplicates.
    pub fn select(&self, playlists: &[String]) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        if playlists.is_empty() {
            return self.disc.clips.keys().cloned().collect();
        }
        for name in playlists {
            let Some(playlist) = self.disc.playlists.get(&name.to_ascii_uppercase()) else {
                warn!("Playlist {} not found", name);
                continue;
            };
            for entry in &playlist.stream_clips {
                if !selected.contains(&entry.clip_name) {
                    selected.push(entry.clip_name.clone());
                }
            }
        }
        selected
    }

    /// Scan the clips behind `playlists` (every clip when empty).
    ///
    /// Per-file failures are collected in the report. The call itself fails
    /// only when no file could be attempted at all.
    pub fn run(self, playlists: &[String]) -> Result<ScanReport> {
        let selection = self.select(playlists);
        let Scanner {
            disc,
            settings,
            events,
            abort,
        } = self;
        let send = |event: ScanEvent| {
            if let Some(tx) = &events {
                // a dropped receiver only means nobody is listening
                let _ = tx.send(event);
            }
        };

        let mut report = ScanReport::default();
        let mut queue = Vec::with_capacity(selection.len());
        for name in selection {
            match disc.clips.get(&name) {
                Some(clip) if clip.scan_source(settings).is_some() => {
                    report.total_bytes += clip.scan_size(settings);
                    queue.push(name);
                }
                _ => {
                    debug!("{} has no container file", name);
                    report.skipped.push(name);
                }
            }
        }
        info!("Scanning {} files ({} bytes)", queue.len(), report.total_bytes);

        let mut clock = ProgressClock {
            started: Instant::now(),
            interval: Duration::from_millis(settings.progress_interval_ms),
            last: None,
            total_bytes: report.total_bytes,
        };
        let mut scan_error = Some(ScanError::NotScanned);

        for (position, name) in queue.iter().enumerate() {
            if abort.is_aborted() {
                report.aborted = true;
                report.skipped.extend(queue[position..].iter().cloned());
                break;
            }
            let Some(clip) = disc.clips.get_mut(name) else {
                continue;
            };
            scan_error = None;

            let base = report.finished_bytes;
            let size = clip.scan_size(settings);
            clip.clear_statistics();
            refresh_dependents(disc, name, settings);

            let Some(clip) = disc.clips.get_mut(name) else {
                continue;
            };
            debug!("Scanning {}", name);
            let outcome = scan_clip(clip, settings, |offset| {
                if let Some(progress) = clock.tick(base + offset.min(size), name, false) {
                    send(ScanEvent::Progress(progress));
                }
                !abort.is_aborted()
            });

            match outcome {
                Ok(stats) => {
                    debug!("{}: {} packets", name, stats.packets);
                    report.scanned.push(name.clone());
                    send(ScanEvent::FileFinished {
                        file: name.clone(),
                        error: None,
                    });
                }
                Err(e) if e.is_abort() => {
                    info!("Scan aborted during {}", name);
                    clip.clear_statistics();
                    refresh_dependents(disc, name, settings);
                    report.aborted = true;
                    report.interrupted = Some(name.clone());
                    report.skipped.extend(queue[position + 1..].iter().cloned());
                    send(ScanEvent::FileFinished {
                        file: name.clone(),
                        error: Some(e.to_string()),
                    });
                    break;
                }
                Err(e) => {
                    warn!("{}: {}", name, e);
                    report.scanned.push(name.clone());
                    send(ScanEvent::FileFinished {
                        file: name.clone(),
                        error: Some(e.to_string()),
                    });
                    report.file_errors.insert(name.clone(), e);
                }
            }

            report.finished_bytes = base + size;
            if let Some(progress) = clock.tick(report.finished_bytes, name, true) {
                send(ScanEvent::Progress(progress));
            }
            refresh_dependents(disc, name, settings);
        }

        report.elapsed = clock.started.elapsed();
        if let Some(e) = scan_error {
            return Err(e);
        }
        info!(
            "Scan finished: {} scanned, {} failed, {} skipped in {:.1}s",
            report.scanned.len(),
            report.file_errors.len(),
            report.skipped.len(),
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }
}

fn refresh_dependents(disc: &mut Disc, clip_name: &str, settings: &Settings) {
    for name in aggregate::dependents(&disc.playlists, clip_name) {
        if let Some(playlist) = disc.playlists.get_mut(&name) {
            aggregate::refresh_playlist(playlist, &disc.clips, settings);
        }
    }
}
