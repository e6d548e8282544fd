//! Byte/packet accounting keyed by presentation time.
//!
//! A clip's streams are bucketed by the 45 kHz tick of the PES that carried
//! them, the same clock play items use for their in and out points. A
//! playlist entry then takes exactly the buckets inside its half-open window,
//! so a clip split across adjacent items is never counted twice.

use std::collections::BTreeMap;

use crate::stream::PeakBitRates;

/// Clip and playlist clock, ticks per second.
pub const TICKS_PER_SECOND: u64 = 45_000;

/// Tick of a 90 kHz PES timestamp.
pub fn tick_of_pts(pts: u64) -> u64 {
    pts / 2
}

/// Nearest tick of a time in seconds; negative times clamp to zero.
pub fn tick_of_seconds(seconds: f64) -> u64 {
    (seconds.max(0.0) * TICKS_PER_SECOND as f64).round() as u64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bucket {
    pub bytes: u64,
    pub packets: u64,
}

impl Bucket {
    fn add(&mut self, other: Bucket) {
        self.bytes += other.bytes;
        self.packets += other.packets;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    buckets: BTreeMap<u64, Bucket>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn add(&mut self, tick: u64, bytes: u64, packets: u64) {
        self.buckets
            .entry(tick)
            .or_default()
            .add(Bucket { bytes, packets });
    }

    pub fn total(&self) -> Bucket {
        let mut total = Bucket::default();
        for b in self.buckets.values() {
            total.add(*b);
        }
        total
    }

    /// Sum of the buckets stamped inside `[start, end)` seconds.
    pub fn range(&self, start: f64, end: f64) -> Bucket {
        let mut total = Bucket::default();
        let (first, last) = (tick_of_seconds(start), tick_of_seconds(end));
        if last <= first {
            return total;
        }
        for bucket in self.buckets.range(first..last).map(|(_, b)| b) {
            total.add(*bucket);
        }
        total
    }

    fn bytes_per_second(&self) -> BTreeMap<u64, u64> {
        let mut seconds = BTreeMap::new();
        for (&tick, bucket) in &self.buckets {
            *seconds.entry(tick / TICKS_PER_SECOND).or_insert(0) += bucket.bytes;
        }
        seconds
    }

    /// Highest average rate over `window` consecutive seconds, bits/s.
    pub fn peak_rate(&self, window: u64) -> u64 {
        if window == 0 || self.buckets.is_empty() {
            return 0;
        }
        let seconds = self.bytes_per_second();
        let mut best = 0u64;
        for &start in seconds.keys() {
            let bytes: u64 = seconds.range(start..start + window).map(|(_, b)| b).sum();
            best = best.max(bytes * 8 / window);
        }
        best
    }

    pub fn peaks(&self) -> PeakBitRates {
        PeakBitRates {
            one_second: self.peak_rate(1),
            five_seconds: self.peak_rate(5),
            ten_seconds: self.peak_rate(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: u64 = TICKS_PER_SECOND;

    #[test]
    fn range_is_half_open_at_tick_precision() {
        let mut t = Timeline::new();
        t.add(10 * S, 100, 1);
        t.add(10 * S + S / 2, 150, 1);
        t.add(11 * S, 200, 2);
        t.add(12 * S, 300, 3);
        t.add(12 * S, 50, 1);

        assert_eq!(t.total(), Bucket { bytes: 800, packets: 8 });
        assert_eq!(t.range(10.5, 12.0), Bucket { bytes: 350, packets: 3 });
        assert_eq!(t.range(10.0, 10.5), Bucket { bytes: 100, packets: 1 });
        assert_eq!(t.range(10.0, 12.01).bytes, 800);
        assert_eq!(t.range(13.0, 20.0), Bucket::default());
        assert_eq!(t.range(12.0, 11.0), Bucket::default());
    }

    #[test]
    fn adjacent_windows_split_without_overlap() {
        let mut t = Timeline::new();
        // two units per second for 21 seconds
        for half in 0..42u64 {
            t.add(half * S / 2, 1000, 1);
        }
        let left = t.range(0.0, 10.5);
        let right = t.range(10.5, 21.0);
        assert_eq!(left.packets + right.packets, 42);
        assert_eq!(left.bytes + right.bytes, t.total().bytes);
        assert_eq!(left.packets, 21);
    }

    #[test]
    fn pts_and_seconds_share_the_tick_clock() {
        assert_eq!(tick_of_pts(900_000), 10 * S);
        assert_eq!(tick_of_seconds(10.0), 10 * S);
        assert_eq!(tick_of_seconds(-1.0), 0);
    }

    #[test]
    fn peak_windows() {
        let mut t = Timeline::new();
        for s in 0..10 {
            t.add(s * S, 1000, 1);
        }
        // same second, a different tick
        t.add(4 * S + 100, 9000, 1);
        assert_eq!(t.peak_rate(1), 80_000);
        assert_eq!(t.peak_rate(5), (5_000 + 9_000) * 8 / 5);
        assert_eq!(t.peak_rate(10), 19_000 * 8 / 10);
    }
}
