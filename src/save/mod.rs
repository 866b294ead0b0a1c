//! Component I: the save coordinator. `SaveAsync` returns immediately
//! when the pipeline is capturing and no save is already in progress; a
//! dedicated save worker then snapshots both rings, muxes them to disk,
//! and reports completion on a notification channel -- off the hot path
//! the audio/video threads run on.

use crate::encoder::CodecConfig;
use crate::error::ReplayError;
use crate::mux::{write_replay, ContainerSink};
use crate::sample_ring::{AudioRing, VideoRing};
use crate::{error, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Whether the pipeline is capturing, required before a save can start.
pub trait CaptureStateProbe: Send + Sync {
    fn is_capturing(&self) -> bool;
}

pub struct SaveRequest {
    pub path: PathBuf,
    pub notify: mpsc::Sender<bool>,
}

pub struct SaveCoordinator {
    video_ring: Arc<VideoRing>,
    audio_ring: Arc<AudioRing>,
    in_progress: Arc<AtomicBool>,
    width: u32,
    height: u32,
    fps: u32,
    average_bitrate_bps: u32,
    codec_config: Arc<CodecConfig>,
}

impl SaveCoordinator {
    pub fn new(
        video_ring: Arc<VideoRing>,
        audio_ring: Arc<AudioRing>,
        width: u32,
        height: u32,
        fps: u32,
        average_bitrate_bps: u32,
        codec_config: Arc<CodecConfig>,
    ) -> Self {
        Self {
            video_ring,
            audio_ring,
            in_progress: Arc::new(AtomicBool::new(false)),
            width,
            height,
            fps,
            average_bitrate_bps,
            codec_config,
        }
    }

    pub fn is_saving(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Returns immediately: `Ok(())` once a save worker has been spawned,
    /// `Err` if the pipeline isn't capturing or a save is already running.
    pub fn save_async(
        &self,
        path: PathBuf,
        notify: mpsc::Sender<bool>,
        capture_state: &dyn CaptureStateProbe,
        sink_factory: impl FnOnce() -> Box<dyn ContainerSink> + Send + 'static,
    ) -> Result<(), ReplayError> {
        if !capture_state.is_capturing() {
            return Err(ReplayError::NotCapturing);
        }
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReplayError::SaveAlreadyInProgress);
        }

        let video_ring = self.video_ring.clone();
        let audio_ring = self.audio_ring.clone();
        let in_progress = self.in_progress.clone();
        let codec_config = self.codec_config.clone();
        let (width, height, fps, bitrate) = (self.width, self.height, self.fps, self.average_bitrate_bps);

        std::thread::Builder::new()
            .name("save-worker".to_string())
            .spawn(move || {
                // Snapshot drops each ring's lock as soon as the clone
                // completes; the mux call below never holds a ring lock.
                let video = video_ring.snapshot();
                let audio = audio_ring.snapshot();
                let mut sink = sink_factory();
                let sequence_header = codec_config.video_sequence_header();
                let decoder_config = codec_config.audio_decoder_config();

                let result = write_replay(
                    sink.as_mut(),
                    &video,
                    &audio,
                    &path,
                    width,
                    height,
                    fps,
                    bitrate,
                    sequence_header,
                    decoder_config,
                );
                let success = match &result {
                    Ok(()) => {
                        info!("replay saved to {}", path.display());
                        true
                    }
                    Err(e) => {
                        error!("replay save failed: {e}");
                        false
                    }
                };

                in_progress.store(false, Ordering::Release);
                let _ = notify.send(success);
            })
            .expect("failed to spawn save worker thread");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_ring::{AudioPacket, VideoCodec, VideoPacket};
    use std::sync::Mutex;

    struct AlwaysCapturing;
    impl CaptureStateProbe for AlwaysCapturing {
        fn is_capturing(&self) -> bool {
            true
        }
    }

    struct NeverCapturing;
    impl CaptureStateProbe for NeverCapturing {
        fn is_capturing(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct NoopSink;
    impl ContainerSink for NoopSink {
        fn create(&mut self, _path: &std::path::Path) -> Result<(), ReplayError> {
            Ok(())
        }
        fn add_video_stream(&mut self, _c: crate::mux::VideoStreamConfig) -> Result<(), ReplayError> {
            Ok(())
        }
        fn add_audio_stream(&mut self, _c: crate::mux::AudioStreamConfig) -> Result<(), ReplayError> {
            Ok(())
        }
        fn begin_writing(&mut self) -> Result<(), ReplayError> {
            Ok(())
        }
        fn write_sample(&mut self, _s: crate::mux::MuxSample<'_>) -> Result<(), ReplayError> {
            Ok(())
        }
        fn finalize(&mut self) -> Result<bool, ReplayError> {
            Ok(true)
        }
    }

    fn coordinator_with_one_video_packet() -> SaveCoordinator {
        let video_ring = Arc::new(VideoRing::new(10, i64::MAX));
        video_ring.add(VideoPacket::new(vec![0, 1, 2], 0, 16_667, true, VideoCodec::H264));
        let audio_ring = Arc::new(AudioRing::new(10, i64::MAX));
        audio_ring.add(AudioPacket::new(vec![0, 1], 0, 20_000));
        SaveCoordinator::new(
            video_ring,
            audio_ring,
            1920,
            1080,
            60,
            8_000_000,
            Arc::new(CodecConfig::new()),
        )
    }

    #[test]
    fn save_fails_when_not_capturing() {
        let coordinator = coordinator_with_one_video_packet();
        let (tx, _rx) = mpsc::channel();
        let dir = tempfile::tempdir().unwrap();
        let result = coordinator.save_async(
            dir.path().join("x.mp4"),
            tx,
            &NeverCapturing,
            || Box::new(NoopSink),
        );
        assert!(matches!(result, Err(ReplayError::NotCapturing)));
    }

    #[test]
    fn second_concurrent_save_is_rejected() {
        let coordinator = coordinator_with_one_video_packet();
        coordinator.in_progress.store(true, Ordering::Release);
        let (tx, _rx) = mpsc::channel();
        let dir = tempfile::tempdir().unwrap();
        let result = coordinator.save_async(
            dir.path().join("x.mp4"),
            tx,
            &AlwaysCapturing,
            || Box::new(NoopSink),
        );
        assert!(matches!(result, Err(ReplayError::SaveAlreadyInProgress)));
    }

    #[test]
    fn save_forwards_codec_config_blobs_to_the_sink() {
        let video_ring = Arc::new(VideoRing::new(10, i64::MAX));
        video_ring.add(VideoPacket::new(vec![0, 1, 2], 0, 16_667, true, VideoCodec::H264));
        let audio_ring = Arc::new(AudioRing::new(10, i64::MAX));
        audio_ring.add(AudioPacket::new(vec![0, 1], 0, 20_000));

        let codec_config = Arc::new(CodecConfig::new());
        codec_config.set_video_sequence_header(Some(vec![9, 9]));
        codec_config.set_audio_decoder_config(Some(vec![7]));

        let coordinator = SaveCoordinator::new(video_ring, audio_ring, 1920, 1080, 60, 8_000_000, codec_config);

        let captured: Arc<Mutex<Option<(Option<Vec<u8>>, Option<Vec<u8>>)>>> = Arc::new(Mutex::new(None));
        let captured_for_sink = captured.clone();

        struct CapturingSink {
            captured: Arc<Mutex<Option<(Option<Vec<u8>>, Option<Vec<u8>>)>>>,
            decoder_config: Option<Vec<u8>>,
        }
        impl ContainerSink for CapturingSink {
            fn create(&mut self, _path: &std::path::Path) -> Result<(), ReplayError> {
                Ok(())
            }
            fn add_video_stream(&mut self, c: crate::mux::VideoStreamConfig) -> Result<(), ReplayError> {
                self.captured.lock().unwrap().get_or_insert((None, None)).0 = c.sequence_header;
                Ok(())
            }
            fn add_audio_stream(&mut self, c: crate::mux::AudioStreamConfig) -> Result<(), ReplayError> {
                self.decoder_config = c.decoder_config;
                Ok(())
            }
            fn begin_writing(&mut self) -> Result<(), ReplayError> {
                Ok(())
            }
            fn write_sample(&mut self, _s: crate::mux::MuxSample<'_>) -> Result<(), ReplayError> {
                Ok(())
            }
            fn finalize(&mut self) -> Result<bool, ReplayError> {
                self.captured.lock().unwrap().as_mut().unwrap().1 = self.decoder_config.clone();
                Ok(true)
            }
        }

        let (tx, rx) = mpsc::channel();
        let dir = tempfile::tempdir().unwrap();
        coordinator
            .save_async(dir.path().join("x.mp4"), tx, &AlwaysCapturing, move || {
                Box::new(CapturingSink {
                    captured: captured_for_sink,
                    decoder_config: None,
                })
            })
            .unwrap();
        assert!(rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap());

        let captured = captured.lock().unwrap().clone().unwrap();
        assert_eq!(captured.0, Some(vec![9, 9]));
        assert_eq!(captured.1, Some(vec![7]));
    }

    #[test]
    fn successful_save_notifies_true_and_clears_in_progress() {
        let coordinator = coordinator_with_one_video_packet();
        let (tx, rx) = mpsc::channel();
        let dir = tempfile::tempdir().unwrap();
        coordinator
            .save_async(dir.path().join("x.mp4"), tx, &AlwaysCapturing, || Box::new(NoopSink))
            .unwrap();
        let success = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert!(success);
        assert!(!coordinator.is_saving());
    }
}
