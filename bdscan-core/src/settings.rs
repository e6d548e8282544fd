//! Analysis settings.
//!
//! Read-only to the engine; hosts load them from a JSON file or build them in
//! code.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ScanError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Per-frame-type statistics and peak bitrate windows.
    pub extended_stream_diagnostics: bool,
    /// Scan and size interleaved (SSIF) companions when present.
    pub enable_ssif: bool,
    pub filter_looping_playlists: bool,
    pub filter_short_playlists: bool,
    /// Seconds.
    pub filter_short_playlists_value: u32,
    /// Playlist stream order instead of video/audio/graphics/text ordering.
    pub keep_stream_order: bool,
    /// Extra repetitions of one clip+in+out entry tolerated before a playlist
    /// counts as looping.
    pub loop_repeat_tolerance: u32,
    /// Consecutive failed packet resyncs before a stream file is declared corrupt.
    pub max_resync_failures: u32,
    pub progress_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extended_stream_diagnostics: true,
            enable_ssif: true,
            filter_looping_playlists: true,
            filter_short_playlists: true,
            filter_short_playlists_value: 20,
            keep_stream_order: true,
            loop_repeat_tolerance: 0,
            max_resync_failures: 64,
            progress_interval_ms: 500,
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(text).map_err(|e| ScanError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text =
            serde_json::to_string_pretty(self).map_err(|e| ScanError::Settings(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_resync_failures == 0 {
            return Err(ScanError::Settings(
                "max_resync_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum playlist length in seconds, when the short filter is on.
    pub fn min_playlist_length(&self) -> Option<f64> {
        self.filter_short_playlists
            .then_some(self.filter_short_playlists_value as f64)
    }
}
