//! Playlist aggregation.
//!
//! Clips own the scanned streams. A playlist's merged streams are always
//! recomputed from those clips, restricted to each entry's in/out window,
//! so a clip shared by several playlists (or looped inside one) is scanned
//! once and never double counted.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::clip::Clip;
use crate::playlist::Playlist;
use crate::settings::Settings;
use crate::stream::{canonical_order, Stream};

// ============================================================================
// Resolution
// ============================================================================

/// Tie a freshly parsed playlist to the disc's clips: missing clips, hidden
/// tracks, angle maps, stream order, sizes and the validity verdict.
pub fn resolve_playlist(playlist: &mut Playlist, clips: &BTreeMap<String, Clip>, settings: &Settings) {
    let mut missing: Vec<String> = Vec::new();
    for entry in &mut playlist.stream_clips {
        match clips.get(&entry.clip_name) {
            Some(clip) if clip.file.is_some() => {
                entry.file_size = clip.file_size;
                entry.interleaved_file_size = clip.interleaved_file_size;
            }
            _ => {
                if !missing.contains(&entry.clip_name) {
                    missing.push(entry.clip_name.clone());
                }
            }
        }
    }
    playlist.missing_clips = missing;

    // the selection table rarely carries more than codec and language
    for entry in &playlist.stream_clips {
        let Some(clip) = clips.get(&entry.clip_name) else {
            continue;
        };
        for (pid, declared) in &clip.streams {
            if let Some(stream) = playlist.streams.get_mut(pid) {
                if stream.language.is_none() {
                    stream.language = declared.language.clone();
                }
            }
        }
    }

    add_hidden_streams(playlist, clips);

    let angle_streams: Vec<BTreeMap<u16, Stream>> = (1..=playlist.angle_count)
        .map(|angle| {
            playlist
                .streams
                .values()
                .filter(|s| !s.is_hidden)
                .map(|s| {
                    let mut stream = s.clone();
                    stream.clear_statistics();
                    stream.angle_index = angle;
                    (s.pid, stream)
                })
                .collect()
        })
        .collect();
    playlist.angle_streams = angle_streams;

    apply_stream_order(playlist, settings.keep_stream_order);

    playlist.file_size = playlist.stream_clips.iter().map(|c| c.file_size).sum();
    playlist.interleaved_file_size = playlist.stream_clips.iter().map(|c| c.interleaved_file_size).sum();
    playlist.estimated_size = playlist
        .stream_clips
        .iter()
        .filter_map(|c| clips.get(&c.clip_name))
        .map(|clip| clip.scan_size(settings))
        .sum();

    playlist.apply_verdict(settings);
    if !playlist.valid {
        debug!("{} left out: {:?}", playlist.name, playlist.invalid_reasons);
    }
}

/// Clip streams the playlist never enables.
fn add_hidden_streams(playlist: &mut Playlist, clips: &BTreeMap<String, Clip>) -> bool {
    let mut added = false;
    for entry in &playlist.stream_clips {
        if entry.angle_index != 0 {
            continue;
        }
        let Some(clip) = clips.get(&entry.clip_name) else {
            continue;
        };
        for (pid, stream) in &clip.streams {
            if playlist.streams.contains_key(pid) {
                continue;
            }
            let mut hidden = stream.clone();
            hidden.clear_statistics();
            hidden.is_hidden = true;
            playlist.streams.insert(*pid, hidden);
            added = true;
        }
    }
    playlist.has_hidden_tracks |= added;
    added
}

fn apply_stream_order(playlist: &mut Playlist, keep_declared: bool) {
    if keep_declared {
        let mut order: Vec<u16> = playlist
            .stream_order
            .iter()
            .copied()
            .filter(|pid| playlist.streams.contains_key(pid))
            .collect();
        for pid in playlist.streams.keys() {
            if !order.contains(pid) {
                order.push(*pid);
            }
        }
        playlist.stream_order = order;
    } else {
        let mut streams: Vec<&Stream> = playlist.streams.values().collect();
        streams.sort_by(|a, b| canonical_order(a, b));
        playlist.stream_order = streams.iter().map(|s| s.pid).collect();
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Recompute every merged statistic of `playlist` from its clips.
///
/// Unscanned clips contribute nothing, so calling this after clearing a
/// clip drops that clip's share.
pub fn refresh_playlist(playlist: &mut Playlist, clips: &BTreeMap<String, Clip>, settings: &Settings) {
    if add_hidden_streams(playlist, clips) {
        apply_stream_order(playlist, settings.keep_stream_order);
    }
    for stream in playlist.streams.values_mut() {
        stream.clear_statistics();
    }
    for angle in &mut playlist.angle_streams {
        for stream in angle.values_mut() {
            stream.clear_statistics();
        }
    }
    playlist.total_size = 0;
    playlist.total_angle_size = 0;

    let mut angle_lengths = vec![0.0f64; playlist.angle_streams.len()];
    let mut absorbed: BTreeSet<(u32, String)> = BTreeSet::new();

    for entry in &mut playlist.stream_clips {
        if entry.angle_index > 0 {
            if let Some(length) = angle_lengths.get_mut(entry.angle_index as usize - 1) {
                *length += entry.length;
            }
        }
        entry.packet_count = 0;
        let Some(clip) = clips.get(&entry.clip_name).filter(|c| c.is_scanned()) else {
            continue;
        };

        entry.packet_count = clip.packet_window(entry.time_in, entry.time_out).packets;
        let bytes = entry.packet_size();
        playlist.total_angle_size += bytes;
        if entry.angle_index == 0 {
            playlist.total_size += bytes;
        }

        let merged = if entry.angle_index == 0 {
            &mut playlist.streams
        } else {
            match playlist.angle_streams.get_mut(entry.angle_index as usize - 1) {
                Some(streams) => streams,
                None => continue,
            }
        };

        // frame types and captions describe the whole clip: count them once
        let first_visit = absorbed.insert((entry.angle_index, entry.clip_name.clone()));
        for (pid, stream) in merged.iter_mut() {
            let Some(scanned) = clip.streams.get(pid) else {
                continue;
            };
            let window = clip.stream_window(*pid, entry.time_in, entry.time_out);
            stream.payload_bytes += window.bytes;
            stream.packet_count += window.packets;
            if first_visit {
                stream.absorb_diagnostics(scanned);
                if let (Some(mine), Some(theirs)) = (stream.graphics_mut(), scanned.graphics()) {
                    mine.captions += theirs.captions;
                    mine.forced_captions += theirs.forced_captions;
                }
            }
        }
    }

    let length = playlist.total_length;
    for stream in playlist.streams.values_mut() {
        stream.bit_rate = bit_rate(stream.payload_bytes, length);
        stream.active_bit_rate = stream.bit_rate;
    }
    for (streams, angle_length) in playlist.angle_streams.iter_mut().zip(&angle_lengths) {
        for stream in streams.values_mut() {
            stream.bit_rate = bit_rate(stream.payload_bytes, length);
            stream.active_bit_rate = bit_rate(stream.payload_bytes, *angle_length);
        }
    }
}

fn bit_rate(bytes: u64, seconds: f64) -> u64 {
    if seconds > 0.0 {
        (bytes as f64 * 8.0 / seconds).round() as u64
    } else {
        0
    }
}

// ============================================================================
// Grouping
// ============================================================================

/// Longest first, then by name.
pub fn compare_playlists(a: &Playlist, b: &Playlist) -> Ordering {
    b.total_length
        .total_cmp(&a.total_length)
        .then_with(|| a.name.cmp(&b.name))
}

/// Names of every playlist reading `clip_name`, angles included.
pub fn dependents(playlists: &BTreeMap<String, Playlist>, clip_name: &str) -> Vec<String> {
    playlists
        .values()
        .filter(|p| p.references(clip_name))
        .map(|p| p.name.clone())
        .collect()
}

/// Partition playlists into groups that share at least one clip, directly or
/// through other members. Groups and their members come longest first.
pub fn group_playlists<'a, I>(playlists: I) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = &'a Playlist>,
{
    let playlists: Vec<&Playlist> = playlists.into_iter().collect();
    let mut parent: Vec<usize> = (0..playlists.len()).collect();
    let mut owner: HashMap<&str, usize> = HashMap::new();

    for (i, playlist) in playlists.iter().enumerate() {
        for entry in &playlist.stream_clips {
            match owner.get(entry.clip_name.as_str()) {
                Some(&j) => union(&mut parent, i, j),
                None => {
                    owner.insert(entry.clip_name.as_str(), i);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<&Playlist>> = BTreeMap::new();
    for (i, playlist) in playlists.iter().enumerate() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(playlist);
    }
    let mut groups: Vec<Vec<&Playlist>> = groups.into_values().collect();
    for group in &mut groups {
        group.sort_by(|a, b| compare_playlists(a, b));
    }
    groups.sort_by(|a, b| compare_playlists(a[0], b[0]));
    groups
        .into_iter()
        .map(|g| g.into_iter().map(|p| p.name.clone()).collect())
        .collect()
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}
