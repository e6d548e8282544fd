//! Blu-ray disc structure
//!
//! Features:
//! - BDMV discovery (root, nested backup folders, or BDMV itself)
//! - Playlist and clip-info parsing with per-file error collection
//! - Container and interleaved (SSIF) file attachment
//! - UHD / 3D / BD-Java / BD+ / D-BOX / PSP / 50 Hz detection
//! - Disc title from the META folder

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Read};
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::clip::Clip;
use crate::clip_info::parse_clip_info;
use crate::error::{serialize_message, Result, ScanError};
use crate::playlist::{parse_playlist, Playlist};
use crate::settings::Settings;
use crate::vfs::{DirRef, FileRef};

/// How deep below the given root a `BDMV` folder is looked for.
const BDMV_SEARCH_DEPTH: usize = 3;
const UHD_INDEX_TYPE: &str = "INDX0300";

// ============================================================================
// Disc Types & Info
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum DiscType {
    BluRay,
    BluRay4K, // UHD Blu-ray
    BluRay3D,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DiscFeatures {
    pub uhd: bool,
    pub bd_java: bool,
    pub is_3d: bool,
    pub bd_plus: bool,
    pub dbox: bool,
    pub psp: bool,
    pub fifty_hz: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum FileKind {
    Index,
    Playlist,
    ClipInfo,
    StreamFile,
    Metadata,
}

/// A metadata file that could not be read or parsed.
#[derive(Debug, Serialize)]
pub struct FileError {
    pub file: String,
    pub kind: FileKind,
    #[serde(serialize_with = "serialize_message")]
    pub error: ScanError,
}

/// Caller's answer to a [`FileError`] during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Continue,
    Abort,
}

#[derive(Debug, Serialize)]
pub struct Disc {
    #[serde(skip)]
    pub root: DirRef,
    #[serde(skip)]
    pub bdmv: DirRef,
    pub volume_label: String,
    pub title: Option<String>,
    /// Bytes under the disc root.
    pub size: u64,
    pub features: DiscFeatures,
    /// Keyed by container file name, e.g. `00001.M2TS`.
    pub clips: BTreeMap<String, Clip>,
    /// Keyed by playlist file name, e.g. `00800.MPLS`.
    pub playlists: BTreeMap<String, Playlist>,
    pub file_errors: Vec<FileError>,
}

struct Folders {
    playlist: Option<DirRef>,
    clip_info: Option<DirRef>,
    stream: Option<DirRef>,
    ssif: Option<DirRef>,
}

// ============================================================================
// Resolution
// ============================================================================

impl Disc {
    /// Resolve the disc under `root`, recording unreadable metadata and moving on.
    pub fn open(root: DirRef, settings: &Settings) -> Result<Self> {
        Self::open_with(root, settings, |_| ErrorPolicy::Continue)
    }

    /// Resolve the disc under `root`; `on_error` decides whether each broken
    /// metadata file ends resolution.
    pub fn open_with<F>(root: DirRef, settings: &Settings, mut on_error: F) -> Result<Self>
    where
        F: FnMut(&FileError) -> ErrorPolicy,
    {
        let bdmv = find_bdmv(&root, BDMV_SEARCH_DEPTH)?.unwrap_or_else(|| root.clone());
        let disc_root = if bdmv.name().eq_ignore_ascii_case("BDMV") {
            bdmv.parent().unwrap_or_else(|| root.clone())
        } else {
            root.clone()
        };

        let stream = bdmv.directory("STREAM")?;
        let folders = Folders {
            playlist: bdmv.directory("PLAYLIST")?,
            clip_info: bdmv.directory("CLIPINF")?,
            ssif: match &stream {
                Some(dir) => dir.directory("SSIF")?,
                None => None,
            },
            stream,
        };

        let playlist_files = list(&folders.playlist, "*.MPLS")?;
        let clip_info_files = list(&folders.clip_info, "*.CLPI")?;
        let stream_files = list(&folders.stream, "*.M2TS")?;
        let ssif_files = list(&folders.ssif, "*.SSIF")?;
        if playlist_files.is_empty() && clip_info_files.is_empty() && stream_files.is_empty() {
            return Err(ScanError::StructureNotFound(root.full_name()));
        }
        info!(
            "Disc at {}: {} playlists, {} clip-info files, {} stream files",
            bdmv.full_name(),
            playlist_files.len(),
            clip_info_files.len(),
            stream_files.len()
        );

        let mut disc = Disc {
            volume_label: disc_root.volume_label(),
            size: disc_root.total_size()?,
            root: disc_root,
            bdmv,
            title: None,
            features: DiscFeatures::default(),
            clips: BTreeMap::new(),
            playlists: BTreeMap::new(),
            file_errors: Vec::new(),
        };

        for file in &stream_files {
            let name = clip_name(&file.name());
            disc.clips
                .entry(name.clone())
                .or_insert_with(|| Clip::new(name))
                .attach_file(file.clone());
        }
        for file in &ssif_files {
            match disc.clips.get_mut(&clip_name(&file.name())) {
                Some(clip) => clip.attach_interleaved(file.clone()),
                None => debug!("{} has no base container", file.name()),
            }
        }

        for file in &clip_info_files {
            let name = file.name().to_ascii_uppercase();
            let parsed = file
                .read_all()
                .map_err(ScanError::from)
                .and_then(|data| parse_clip_info(&name, &data));
            match parsed {
                Ok(info) => {
                    let clip = clip_name(&name);
                    disc.clips
                        .entry(clip.clone())
                        .or_insert_with(|| Clip::new(clip))
                        .attach_info(info);
                }
                Err(e) => disc.report(&mut on_error, name, FileKind::ClipInfo, e)?,
            }
        }

        for file in &playlist_files {
            let name = file.name().to_ascii_uppercase();
            let parsed = file
                .read_all()
                .map_err(ScanError::from)
                .and_then(|data| parse_playlist(&name, &data));
            match parsed {
                Ok(playlist) => {
                    disc.playlists.insert(name, playlist);
                }
                Err(e) => disc.report(&mut on_error, name, FileKind::Playlist, e)?,
            }
        }

        disc.detect_features(&folders, &mut on_error)?;
        disc.title = disc.read_title(&mut on_error)?;

        for playlist in disc.playlists.values_mut() {
            aggregate::resolve_playlist(playlist, &disc.clips, settings);
        }

        let valid = disc.valid_playlists().count();
        info!(
            "Resolved {} clips and {} playlists ({} valid, {} file errors)",
            disc.clips.len(),
            disc.playlists.len(),
            valid,
            disc.file_errors.len()
        );
        Ok(disc)
    }

    fn report<F>(&mut self, on_error: &mut F, file: String, kind: FileKind, error: ScanError) -> Result<()>
    where
        F: FnMut(&FileError) -> ErrorPolicy,
    {
        warn!("{}: {}", file, error);
        let entry = FileError { file, kind, error };
        if on_error(&entry) == ErrorPolicy::Abort {
            return Err(entry.error);
        }
        self.file_errors.push(entry);
        Ok(())
    }

    // ========================================================================
    // Disc Type Detection
    // ========================================================================

    fn detect_features<F>(&mut self, folders: &Folders, on_error: &mut F) -> Result<()>
    where
        F: FnMut(&FileError) -> ErrorPolicy,
    {
        if let Some(index) = self.bdmv.file("index.bdmv")? {
            match read_type_indicator(&index) {
                Ok(kind) => self.features.uhd = kind == UHD_INDEX_TYPE,
                Err(e) => self.report(on_error, index.name(), FileKind::Index, e.into())?,
            }
        }

        self.features.bd_java = match self.bdmv.directory("BDJO")? {
            Some(dir) => !dir.files()?.is_empty(),
            None => false,
        };
        self.features.is_3d = !list(&folders.ssif, "*.SSIF")?.is_empty();

        for vm in ["BDSVM", "SLYVM", "ANYVM"] {
            if self.root.directory(vm)?.is_some() {
                self.features.bd_plus = true;
            }
        }
        self.features.dbox = self.root.file("FilmIndex.xml")?.is_some();
        self.features.psp = match self.root.directory("SNP")? {
            Some(snp) => !snp.files_matching("*.MNV", false)?.is_empty(),
            None => false,
        };

        self.features.fifty_hz = self.clips.values().flat_map(|c| c.streams.values()).any(|s| {
            s.video().is_some_and(|v| v.frame_rate.is_50hz())
        });
        Ok(())
    }

    fn read_title<F>(&mut self, on_error: &mut F) -> Result<Option<String>>
    where
        F: FnMut(&FileError) -> ErrorPolicy,
    {
        let Some(meta) = self.bdmv.directory("META")? else {
            return Ok(None);
        };
        let Some(file) = meta.files_matching("bdmt_eng.xml", true)?.into_iter().next() else {
            return Ok(None);
        };
        let data = match file.read_all() {
            Ok(data) => data,
            Err(e) => {
                self.report(on_error, file.name(), FileKind::Metadata, e.into())?;
                return Ok(None);
            }
        };
        let Ok(pattern) = Regex::new(r"(?s)<di:name>(.*?)</di:name>") else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&data);
        Ok(pattern
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    pub fn disc_type(&self) -> DiscType {
        if self.features.uhd {
            DiscType::BluRay4K
        } else if self.features.is_3d {
            DiscType::BluRay3D
        } else {
            DiscType::BluRay
        }
    }

    // ========================================================================
    // Summary
    // ========================================================================

    pub fn valid_playlists(&self) -> impl Iterator<Item = &Playlist> {
        self.playlists.values().filter(|p| p.valid)
    }

    /// Valid playlists, longest first.
    pub fn sorted_playlists(&self) -> Vec<&Playlist> {
        let mut playlists: Vec<&Playlist> = self.valid_playlists().collect();
        playlists.sort_by(|a, b| aggregate::compare_playlists(a, b));
        playlists
    }

    /// The longest valid playlist.
    pub fn main_playlist(&self) -> Option<&Playlist> {
        self.sorted_playlists().into_iter().next()
    }

    pub fn has_hidden_tracks(&self) -> bool {
        self.valid_playlists().any(|p| p.has_hidden_tracks)
    }

    /// Valid playlists sharing clips, each group longest first.
    pub fn playlist_groups(&self) -> Vec<Vec<String>> {
        aggregate::group_playlists(self.valid_playlists())
    }

    /// Names of every playlist reading `clip_name`.
    pub fn playlists_using(&self, clip_name: &str) -> Vec<String> {
        aggregate::dependents(&self.playlists, clip_name)
    }
}

fn find_bdmv(dir: &DirRef, depth: usize) -> io::Result<Option<DirRef>> {
    if dir.name().eq_ignore_ascii_case("BDMV") {
        return Ok(Some(dir.clone()));
    }
    if depth == 0 {
        return Ok(None);
    }
    for child in dir.directories()? {
        if let Some(found) = find_bdmv(&child, depth - 1)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn list(dir: &Option<DirRef>, pattern: &str) -> io::Result<Vec<FileRef>> {
    match dir {
        Some(dir) => dir.files_matching(pattern, false),
        None => Ok(Vec::new()),
    }
}

/// `00001.CLPI` / `00001.ssif` -> `00001.M2TS`
fn clip_name(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    format!("{}.M2TS", stem.to_ascii_uppercase())
}

fn read_type_indicator(file: &FileRef) -> io::Result<String> {
    let mut magic = [0u8; 8];
    file.open_read()?.read_exact(&mut magic)?;
    Ok(String::from_utf8_lossy(&magic).into_owned())
}
