//! Component A: one dedicated OS thread per configured audio source,
//! isolating the non-`Send` `cpal::Stream` by keeping it local to the
//! thread that created it. The thread polls its conversion channel at
//! `P_a`, converts to canonical PCM, and writes into a `PcmRing` the
//! mixer reads from -- never sharing the stream itself across a thread
//! boundary.

use super::cpal_backend::open_stream;
use super::convert::convert_chunk;
use super::device::DeviceKind;
use super::ring::PcmRing;
use super::{DEFAULT_DORMANCY_MS, MAX_CONSECUTIVE_ERRORS, SOURCE_POLL_PERIOD_MS};
use crate::health::{HeartbeatBus, ThreadRole};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub struct SourceConfig {
    pub index: u8,
    pub device_id: String,
    pub kind: DeviceKind,
    pub target_pcm_rate: u32,
    pub ring_capacity_bytes: usize,
}

/// Handle to a running source thread: the ring it feeds, a stop signal,
/// and the join handle for shutdown.
pub struct AudioSourceHandle {
    pub ring: Arc<PcmRing>,
    stop_tx: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
    last_activity_ms: Arc<AtomicU64>,
    started_at: Instant,
}

impl AudioSourceHandle {
    /// A source is dormant once it has produced at least one packet but
    /// none within `DEFAULT_DORMANCY_MS`.
    pub fn is_dormant(&self) -> bool {
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        elapsed.saturating_sub(last) >= DEFAULT_DORMANCY_MS
    }

    /// A shareable dormancy check the mixer can hold independently of the
    /// handle itself (the handle owns the stop channel and join handle,
    /// which the mixer has no business touching).
    pub fn dormancy_probe(&self) -> Arc<dyn Fn() -> bool + Send + Sync> {
        let last_activity_ms = self.last_activity_ms.clone();
        let started_at = self.started_at;
        Arc::new(move || {
            let last = last_activity_ms.load(Ordering::Relaxed);
            if last == 0 {
                return false;
            }
            let elapsed = started_at.elapsed().as_millis() as u64;
            elapsed.saturating_sub(last) >= DEFAULT_DORMANCY_MS
        })
    }

    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

pub struct AudioSourceWorker;

impl AudioSourceWorker {
    pub fn spawn(config: SourceConfig, heartbeat: Arc<HeartbeatBus>) -> Result<AudioSourceHandle, crate::error::ReplayError> {
        let (capture, rx) = open_stream(config.kind, &config.device_id)?;
        let native_format = capture.native_format;
        let device_invalidated = capture.device_invalidated.clone();
        let ring = Arc::new(PcmRing::new(config.ring_capacity_bytes));
        let ring_for_thread = ring.clone();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let last_activity_ms = Arc::new(AtomicU64::new(0));
        let last_activity_for_thread = last_activity_ms.clone();
        let role = ThreadRole::AudioSource(config.index);
        let target_rate = config.target_pcm_rate;
        let started_at = Instant::now();

        let join = std::thread::Builder::new()
            .name(format!("audio-source-{}", config.index))
            .spawn(move || {
                // Keep the stream alive for the lifetime of this thread;
                // it is dropped (and stopped) when the thread exits.
                let _capture = capture;
                let mut consecutive_errors = 0u32;

                loop {
                    if stop_rx.try_recv().is_ok() {
                        break;
                    }
                    if device_invalidated.load(Ordering::Acquire) {
                        crate::error!("audio source {} device invalidated, exiting", config.index);
                        break;
                    }
                    heartbeat.beat(role);

                    match rx.recv_timeout(Duration::from_millis(SOURCE_POLL_PERIOD_MS)) {
                        Ok(chunk) => {
                            if chunk.silent {
                                consecutive_errors += 1;
                                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                                    crate::error!("audio source {} exceeded max consecutive errors, exiting", config.index);
                                    break;
                                }
                            } else {
                                consecutive_errors = 0;
                            }
                            let pcm = convert_chunk(&chunk.samples, chunk.silent, native_format, target_rate);
                            ring_for_thread.write(&pcm);
                            let elapsed = started_at.elapsed().as_millis() as u64;
                            last_activity_for_thread.store(elapsed, Ordering::Relaxed);
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                crate::debug!("audio source {} thread exiting", config.index);
            })
            .expect("failed to spawn audio source thread");

        Ok(AudioSourceHandle {
            ring,
            stop_tx,
            join: Some(join),
            last_activity_ms,
            started_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dormancy_is_false_before_any_activity_recorded() {
        let (stop_tx, _stop_rx) = mpsc::channel();
        let handle = AudioSourceHandle {
            ring: Arc::new(PcmRing::new(1024)),
            stop_tx,
            join: None,
            last_activity_ms: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        };
        assert!(!handle.is_dormant());
    }

    #[test]
    fn dormancy_true_once_threshold_elapsed_since_last_activity() {
        let (stop_tx, _stop_rx) = mpsc::channel();
        let started_at = Instant::now() - Duration::from_millis(500);
        let handle = AudioSourceHandle {
            ring: Arc::new(PcmRing::new(1024)),
            stop_tx,
            join: None,
            last_activity_ms: Arc::new(AtomicU64::new(10)),
            started_at,
        };
        assert!(handle.is_dormant());
    }
}
