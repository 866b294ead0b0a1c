//! Component B: combines each active source's canonical PCM into one
//! output ring, honoring per-source gain and dormancy (a dormant source
//! contributes silence rather than stale audio). Runs on its own thread
//! at `P_m` cadence on a dedicated single-consumer thread.

use super::{bytes_per_sec, MIXER_POLL_PERIOD_MS, PCM_FRAME_BYTES};
use crate::audio::convert::mix_frame;
use crate::audio::ring::PcmRing;
use crate::health::{HeartbeatBus, ThreadRole};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub struct MixerConfig {
    pub target_pcm_rate: u32,
    pub output_capacity_bytes: usize,
    pub gains: Vec<u8>,
}

pub struct MixerHandle {
    pub output: Arc<PcmRing>,
    peak_left: Arc<AtomicI32>,
    peak_right: Arc<AtomicI32>,
    stop_tx: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl MixerHandle {
    /// Peak absolute sample value observed since the last call, per
    /// channel, in `[0, i16::MAX]`. Resets on read.
    pub fn take_peak(&self) -> (i16, i16) {
        (
            self.peak_left.swap(0, Ordering::Relaxed) as i16,
            self.peak_right.swap(0, Ordering::Relaxed) as i16,
        )
    }

    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

pub struct AudioMixer;

impl AudioMixer {
    pub fn spawn(
        sources: Vec<(Arc<PcmRing>, Arc<dyn Fn() -> bool + Send + Sync>)>,
        config: MixerConfig,
        heartbeat: Arc<HeartbeatBus>,
    ) -> MixerHandle {
        let output = Arc::new(PcmRing::new(config.output_capacity_bytes));
        let output_for_thread = output.clone();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let peak_left = Arc::new(AtomicI32::new(0));
        let peak_right = Arc::new(AtomicI32::new(0));
        let peak_left_t = peak_left.clone();
        let peak_right_t = peak_right.clone();
        let gains = config.gains.clone();
        let target_rate = config.target_pcm_rate;

        let tick_bytes =
            ((bytes_per_sec(target_rate) * MIXER_POLL_PERIOD_MS) / 1000).max(PCM_FRAME_BYTES as u64) as usize;
        let tick_bytes = tick_bytes - (tick_bytes % PCM_FRAME_BYTES);
        let bytes_per_sec = bytes_per_sec(target_rate) as f64;

        let join = std::thread::Builder::new()
            .name("audio-mixer".to_string())
            .spawn(move || {
                // Wall-clock-anchored rate limiting: `bytes_written` is
                // pinned to `elapsed * bytes_per_sec` over the long run,
                // so scheduler jitter (a late wakeup, a slow tick) gets
                // absorbed by writing more on the next tick rather than
                // compounding into permanent drift -- unlike a fixed
                // tick_bytes-per-sleep loop, which just free-runs at
                // whatever rate the scheduler happens to grant it.
                let t0 = Instant::now();
                let mut bytes_written = 0u64;

                loop {
                    if stop_rx.try_recv().is_ok() {
                        break;
                    }
                    heartbeat.beat(ThreadRole::Mixer);

                    let elapsed_secs = t0.elapsed().as_secs_f64();
                    let allowed = (elapsed_secs * bytes_per_sec) as i64 - bytes_written as i64;
                    if allowed < (tick_bytes / 2) as i64 {
                        std::thread::sleep(Duration::from_millis(MIXER_POLL_PERIOD_MS));
                        continue;
                    }

                    let frame_count = tick_bytes / PCM_FRAME_BYTES;
                    // Per-source frames for this tick; a dormant or
                    // short-on-data source contributes silence (0, 0).
                    let mut per_source: Vec<Vec<(i16, i16)>> = Vec::with_capacity(sources.len());
                    for (ring, is_dormant) in &sources {
                        let mut frames = vec![(0i16, 0i16); frame_count];
                        if !is_dormant() {
                            let bytes = ring.read(tick_bytes);
                            for (i, chunk) in bytes.chunks_exact(PCM_FRAME_BYTES).enumerate() {
                                let l = i16::from_le_bytes([chunk[0], chunk[1]]);
                                let r = i16::from_le_bytes([chunk[2], chunk[3]]);
                                frames[i] = (l, r);
                            }
                        }
                        per_source.push(frames);
                    }

                    let mut out = Vec::with_capacity(frame_count * PCM_FRAME_BYTES);
                    for i in 0..frame_count {
                        let frame_inputs: Vec<(i16, i16)> = per_source.iter().map(|f| f[i]).collect();
                        let (l, r) = mix_frame(&frame_inputs, &gains);
                        peak_left_t.fetch_max(l.unsigned_abs() as i32, Ordering::Relaxed);
                        peak_right_t.fetch_max(r.unsigned_abs() as i32, Ordering::Relaxed);
                        out.extend_from_slice(&l.to_le_bytes());
                        out.extend_from_slice(&r.to_le_bytes());
                    }
                    output_for_thread.write(&out);
                    bytes_written += tick_bytes as u64;
                }
            })
            .expect("failed to spawn mixer thread");

        MixerHandle {
            output,
            peak_left,
            peak_right,
            stop_tx,
            join: Some(join),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_tracking_resets_after_take() {
        let peak_left = Arc::new(AtomicI32::new(500));
        let peak_right = Arc::new(AtomicI32::new(300));
        let (stop_tx, _rx) = mpsc::channel();
        let handle = MixerHandle {
            output: Arc::new(PcmRing::new(16)),
            peak_left: peak_left.clone(),
            peak_right: peak_right.clone(),
            stop_tx,
            join: None,
        };
        assert_eq!(handle.take_peak(), (500, 300));
        assert_eq!(handle.take_peak(), (0, 0));
    }

    #[test]
    fn output_rate_stays_capped_against_a_faster_than_realtime_producer() {
        let rate = 48_000u32;
        let source_ring = Arc::new(PcmRing::new(bytes_per_sec(rate) as usize * 4));
        // Prime the source with 2 seconds of audio up front, modeling a
        // producer that fills the ring faster than realtime; a mixer with
        // no rate limiting would drain all of it almost immediately.
        source_ring.write(&vec![0u8; bytes_per_sec(rate) as usize * 2]);

        let never_dormant: Arc<dyn Fn() -> bool + Send + Sync> = Arc::new(|| false);
        let heartbeat = Arc::new(HeartbeatBus::new());
        let handle = AudioMixer::spawn(
            vec![(source_ring, never_dormant)],
            MixerConfig {
                target_pcm_rate: rate,
                output_capacity_bytes: bytes_per_sec(rate) as usize * 4,
                gains: vec![255],
            },
            heartbeat,
        );

        std::thread::sleep(Duration::from_millis(200));
        let produced = handle.output.available();
        handle.stop();

        // Over 200ms at realtime rate that's ~38_400 bytes; allow a
        // generous multiple for scheduling slack, but nowhere near the
        // full 2-second backlog a rate-unlimited drain would produce.
        let expected_max = (bytes_per_sec(rate) as f64 * 0.2 * 3.0) as usize;
        assert!(produced > 0, "mixer produced no output");
        assert!(
            produced <= expected_max,
            "mixer drained faster than realtime: {produced} bytes (expected <= {expected_max})"
        );
    }
}
