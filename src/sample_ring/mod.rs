//! Bounded, time-limited ring of encoded samples (components C and D).
//!
//! One generic ring type backs both the video ring and the audio ring --
//! every invariant and operation (`Add` evicts from the tail while over
//! budget, `GetDuration`/`GetCount`/`GetMemoryUsage` snapshot under the
//! lock, `Clear` frees everything, `Snapshot` hands a save a read-only,
//! independently-owned copy) is shared between them. Video packets carry
//! a keyframe flag; audio packets don't, so `is_keyframe`
//! always returns `false` for them and the eviction/snapshot logic is
//! identical either way.

mod audio_ring;
mod video_ring;

pub use audio_ring::AudioPacket;
pub use video_ring::{VideoCodec, VideoPacket};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Common shape of an owned, encoded sample.
pub trait SamplePacket: Clone {
    /// Presentation timestamp, 100-ns units, monotonic from capture start.
    fn timestamp(&self) -> i64;
    /// Sample duration, 100-ns units.
    fn duration(&self) -> i64;
    /// Whether this sample is independently decodable. Always `false` for audio.
    fn is_keyframe(&self) -> bool;
    /// Bytes retained for this sample (for `GetMemoryUsage`).
    fn memory_size(&self) -> usize;
}

struct Inner<T> {
    slots: VecDeque<T>,
    total_duration: i64,
}

/// A time-bounded FIFO of owned encoded packets with thread-safe `Add`.
pub struct SampleRing<T> {
    capacity: usize,
    max_duration: i64,
    inner: Mutex<Inner<T>>,
}

impl<T: SamplePacket> SampleRing<T> {
    pub fn new(capacity: usize, max_duration: i64) -> Self {
        Self {
            capacity,
            max_duration,
            inner: Mutex::new(Inner {
                slots: VecDeque::with_capacity(capacity.min(1024)),
                total_duration: 0,
            }),
        }
    }

    /// Evict from the tail while over budget, then emplace at the head.
    pub fn add(&self, packet: T) {
        let mut inner = self.inner.lock();
        while (inner.total_duration + packet.duration() > self.max_duration
            || inner.slots.len() >= self.capacity)
            && !inner.slots.is_empty()
        {
            let evicted = inner.slots.pop_front().expect("checked non-empty above");
            inner.total_duration -= evicted.duration();
            crate::trace!(
                "sample ring evicted packet ts={} dur={}",
                evicted.timestamp(),
                evicted.duration()
            );
        }
        inner.total_duration += packet.duration();
        inner.slots.push_back(packet);
    }

    pub fn get_duration(&self) -> i64 {
        self.inner.lock().total_duration
    }

    pub fn get_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn get_memory_usage(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .map(|p| p.memory_size())
            .sum()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.total_duration = 0;
    }

    /// Clone every occupied slot out, oldest (tail) first, releasing the
    /// lock immediately after. The returned vector is fully independent
    /// of the ring: a concurrent `add` evicting the same logical sample
    /// cannot free memory a save is still reading.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().slots.iter().cloned().collect()
    }

    /// True if the oldest retained packet would not decode on its own,
    /// i.e. a save starting here needs a warning (video only; always
    /// `false` for the audio ring since audio has no keyframe concept).
    pub fn oldest_is_non_keyframe(&self) -> bool {
        self.inner
            .lock()
            .slots
            .front()
            .map(|p| !p.is_keyframe())
            .unwrap_or(false)
    }
}

/// `ceil(duration_secs * fps * 1.5)`, clamped to a sane minimum so a very
/// short configured duration still has room for at least one GOP.
pub fn capacity_for(duration_secs: u32, fps: u32, min_capacity: usize) -> usize {
    let raw = (duration_secs as u64 * fps as u64 * 3).div_ceil(2);
    (raw as usize).max(min_capacity)
}

/// Convert a duration in seconds to the fixed 100-ns timestamp unit.
pub fn secs_to_100ns(secs: u32) -> i64 {
    secs as i64 * 10_000_000
}

pub(crate) fn arc_bytes(data: Vec<u8>) -> Arc<[u8]> {
    Arc::from(data.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct TestPacket {
        ts: i64,
        dur: i64,
        key: bool,
        size: usize,
    }

    impl SamplePacket for TestPacket {
        fn timestamp(&self) -> i64 {
            self.ts
        }
        fn duration(&self) -> i64 {
            self.dur
        }
        fn is_keyframe(&self) -> bool {
            self.key
        }
        fn memory_size(&self) -> usize {
            self.size
        }
    }

    fn pkt(ts: i64, dur: i64, key: bool) -> TestPacket {
        TestPacket { ts, dur, key, size: 100 }
    }

    #[test]
    fn add_respects_capacity() {
        let ring = SampleRing::new(3, i64::MAX);
        for i in 0..5 {
            ring.add(pkt(i, 1, i == 0));
        }
        assert_eq!(ring.get_count(), 3);
    }

    #[test]
    fn add_evicts_on_duration_budget() {
        // 10s budget at 60fps, fed 900 packets (15s worth) -- should settle near 600.
        let max_duration = secs_to_100ns(10);
        let dur = secs_to_100ns(1) / 60;
        let ring = SampleRing::new(100_000, max_duration);
        for i in 0..900 {
            ring.add(pkt(i * dur, dur, i == 0));
        }
        assert!(ring.get_count() <= 600);
        assert!(ring.get_duration() <= max_duration + dur);
        let snap = ring.snapshot();
        let earliest = snap.first().unwrap();
        assert!(earliest.timestamp() >= secs_to_100ns(5));
    }

    #[test]
    fn total_duration_matches_sum_of_slots() {
        let ring = SampleRing::new(10, i64::MAX);
        for i in 0..7 {
            ring.add(pkt(i, i + 1, false));
        }
        let snap = ring.snapshot();
        let sum: i64 = snap.iter().map(|p| p.duration()).sum();
        assert_eq!(sum, ring.get_duration());
    }

    #[test]
    fn clear_resets_everything() {
        let ring = SampleRing::new(10, i64::MAX);
        ring.add(pkt(0, 1, true));
        ring.add(pkt(1, 1, false));
        ring.clear();
        assert_eq!(ring.get_count(), 0);
        assert_eq!(ring.get_duration(), 0);
        assert!(ring.snapshot().is_empty());
    }

    #[test]
    fn drain_and_readd_is_order_and_duration_preserving() {
        let ring = SampleRing::new(10, i64::MAX);
        for i in 0..5 {
            ring.add(pkt(i, i + 1, i == 0));
        }
        let drained = ring.snapshot();
        ring.clear();
        for p in drained.iter().cloned() {
            ring.add(p);
        }
        let redone = ring.snapshot();
        assert_eq!(drained.len(), redone.len());
        assert_eq!(
            drained.iter().map(|p| p.duration()).sum::<i64>(),
            redone.iter().map(|p| p.duration()).sum::<i64>()
        );
        for (a, b) in drained.iter().zip(redone.iter()) {
            assert_eq!(a.timestamp(), b.timestamp());
        }
    }

    #[test]
    fn oldest_is_non_keyframe_flags_correctly() {
        let ring = SampleRing::new(3, i64::MAX);
        ring.add(pkt(0, 1, true));
        assert!(!ring.oldest_is_non_keyframe());
        // Evict the keyframe out the tail.
        ring.add(pkt(1, 1, false));
        ring.add(pkt(2, 1, false));
        ring.add(pkt(3, 1, false));
        assert!(ring.oldest_is_non_keyframe());
    }

    #[test]
    fn snapshot_is_independent_of_concurrent_add() {
        let ring = Arc::new(SampleRing::new(5, i64::MAX));
        for i in 0..5 {
            ring.add(pkt(i, 1, i == 0));
        }
        let snap = ring.snapshot();
        // Further adds evict/mutate the live ring but must not affect `snap`.
        for i in 5..10 {
            ring.add(pkt(i, 1, false));
        }
        assert_eq!(snap.len(), 5);
        assert_eq!(snap[0].timestamp(), 0);
    }
}
