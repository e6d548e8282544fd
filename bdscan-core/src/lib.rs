//! # bdscan Core
//!
//! Blu-ray disc structure, playlist and stream bitrate analysis.
//!
//! A [`Disc`] is resolved from a directory tree, its stream files are read
//! by a [`Scanner`], and every playlist's merged streams are recomputed from
//! the scanned clips.

// ============================================================================
// Foundations
// ============================================================================
pub mod error;
pub mod reader;
pub mod settings;
pub mod vfs;

// ============================================================================
// Metadata
// ============================================================================
pub mod clip_info;
pub mod playlist;
pub mod stream;

// ============================================================================
// Stream Files
// ============================================================================
pub mod codec;
pub mod stream_file;
pub mod timeline;
pub mod ts_demux;

// ============================================================================
// Disc Model
// ============================================================================
pub mod aggregate;
pub mod clip;
pub mod disc;
pub mod scan;

#[cfg(test)]
pub(crate) mod test_support;

pub use clip::{Clip, ClipStatus};
pub use disc::{Disc, DiscFeatures, DiscType, ErrorPolicy, FileError, FileKind};
pub use error::{Result, ScanError};
pub use playlist::{InvalidReason, Playlist, StreamClip};
pub use scan::{AbortHandle, ScanEvent, ScanProgress, ScanReport, Scanner};
pub use settings::Settings;
pub use stream::{CodecKind, Stream, StreamType};
pub use vfs::{DirRef, DirectoryInfo, FileInfo, FileRef, MemoryDirectory, NativeDirectory};
