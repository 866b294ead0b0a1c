//! `PipelineController`: owns every component handle and drives the
//! `Start`/`Stop`/`RequestSave` lifecycle, wires the encoder callback to
//! the sample rings, and runs the health supervisor.

use super::frame_source::FrameSource;
use crate::audio::{AudioMixer, AudioSourceWorker, DeviceKind, MixerConfig, SourceConfig, DEFAULT_PCM_RATE};
use crate::config::{Quality, ReplayConfig, VideoFormat};
use crate::encoder::{
    AacAudioEncoder, AacEncoderConfig, CodecConfig, EncoderConfig, EncoderFrame, EncoderSession, FfmpegEncoderBackend,
};
use crate::error::ReplayError;
use crate::health::{HeartbeatBus, HealthSupervisor, SupervisorConfig, SupervisorEvent, ThreadRole, WorkerThreadState};
use crate::sample_ring::{capacity_for, secs_to_100ns, AudioRing, VideoCodec, VideoRing};
use crate::save::{CaptureStateProbe, SaveCoordinator};
use crate::{error, info, warn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Capturing,
    Saving,
    Stopping,
}

fn quality_to_qp(quality: Quality) -> Option<u32> {
    match quality {
        Quality::Low => Some(34),
        Quality::Medium => Some(28),
        Quality::High => Some(21),
        Quality::Lossless => None,
    }
}

fn video_codec(format: VideoFormat) -> VideoCodec {
    match format {
        VideoFormat::Mp4 => VideoCodec::H264,
        VideoFormat::Hevc => VideoCodec::Hevc,
    }
}

struct RunningPipeline {
    audio_sources: Vec<crate::audio::AudioSourceHandle>,
    mixer: crate::audio::MixerHandle,
    capture_active: Arc<AtomicBool>,
    capture_join: Option<JoinHandle<()>>,
    audio_encode_join: Option<JoinHandle<()>>,
    supervisor_join: Option<JoinHandle<()>>,
}

pub struct PipelineController {
    state: Arc<RwLock<PipelineState>>,
    video_ring: RwLock<Arc<VideoRing>>,
    audio_ring: RwLock<Arc<AudioRing>>,
    heartbeat: Arc<HeartbeatBus>,
    save: Arc<RwLock<Option<SaveCoordinator>>>,
    running: Arc<RwLock<Option<RunningPipeline>>>,
    width: u32,
    height: u32,
}

impl CaptureStateProbe for PipelineController {
    fn is_capturing(&self) -> bool {
        *self.state.read() == PipelineState::Capturing
    }
}

impl PipelineController {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(PipelineState::Uninitialized)),
            video_ring: RwLock::new(Arc::new(VideoRing::new(1, 1))),
            audio_ring: RwLock::new(Arc::new(AudioRing::new(1, 1))),
            heartbeat: Arc::new(HeartbeatBus::new()),
            save: Arc::new(RwLock::new(None)),
            running: Arc::new(RwLock::new(None)),
            width,
            height,
        }
    }

    /// `Saving` overlays `Capturing` while the save coordinator has a save
    /// in flight; it is never a state this struct's own `state` lock holds
    /// directly, since the save runs on an independent worker thread.
    pub fn state(&self) -> PipelineState {
        let base = *self.state.read();
        if base == PipelineState::Capturing && self.is_saving() {
            PipelineState::Saving
        } else {
            base
        }
    }

    pub fn is_saving(&self) -> bool {
        self.save
            .read()
            .as_ref()
            .map(|s| s.is_saving())
            .unwrap_or(false)
    }

    /// Buffered duration, sample count, RAM usage, and current state as a
    /// human-readable line, matching the `GetStatus(buf, size)` signature.
    pub fn get_status(&self) -> String {
        let video_ring = self.video_ring.read();
        let audio_ring = self.audio_ring.read();
        let duration_secs = video_ring.get_duration() as f64 / 10_000_000.0;
        format!(
            "state={:?} bufferedSeconds={:.1} videoSamples={} audioSamples={} ramBytes={}",
            self.state(),
            duration_secs,
            video_ring.get_count(),
            audio_ring.get_count(),
            video_ring.get_memory_usage() + audio_ring.get_memory_usage(),
        )
    }

    /// `health_notify` carries `ReplayError::Stalled`/`ReplayError::PermanentFailure`
    /// out to the caller the moment the supervisor thread declares them, since
    /// neither is discoverable by polling `state()` alone (a hard stall does not
    /// itself change `PipelineState`, only a permanent failure eventually does,
    /// and by then the recoveries that preceded it are already lost).
    pub fn start(
        &self,
        config: ReplayConfig,
        frame_source: Box<dyn FrameSource>,
        health_notify: mpsc::Sender<ReplayError>,
    ) -> Result<(), ReplayError> {
        config.validate()?;

        let capacity = capacity_for(config.replay_duration_seconds, config.video_fps, 32);
        let max_duration = secs_to_100ns(config.replay_duration_seconds);
        let video_ring = Arc::new(VideoRing::new(capacity, max_duration));
        let audio_ring = Arc::new(AudioRing::new(capacity * 2, max_duration));

        let mut audio_sources = Vec::new();
        let mut gains = Vec::new();
        if config.audio_enabled {
            for (i, device_id) in config.audio_sources.iter().enumerate() {
                let Some(device_id) = device_id else { continue };
                let source_cfg = SourceConfig {
                    index: i as u8,
                    device_id: device_id.clone(),
                    kind: DeviceKind::Capture,
                    target_pcm_rate: DEFAULT_PCM_RATE,
                    ring_capacity_bytes: crate::audio::bytes_per_sec(DEFAULT_PCM_RATE) as usize * 2,
                };
                match AudioSourceWorker::spawn(source_cfg, self.heartbeat.clone()) {
                    Ok(handle) => {
                        gains.push(config.audio_volumes[i]);
                        audio_sources.push(handle);
                    }
                    Err(e) => warn!("audio source {i} ({device_id}) failed to start: {e}"),
                }
            }
        }

        let dormancy_closures: Vec<(Arc<crate::audio::PcmRing>, Arc<dyn Fn() -> bool + Send + Sync>)> =
            audio_sources
                .iter()
                .map(|h| (h.ring.clone(), h.dormancy_probe()))
                .collect();

        let mixer = AudioMixer::spawn(
            dormancy_closures,
            MixerConfig {
                target_pcm_rate: DEFAULT_PCM_RATE,
                output_capacity_bytes: crate::audio::bytes_per_sec(DEFAULT_PCM_RATE) as usize * 5,
                gains,
            },
            self.heartbeat.clone(),
        );

        let encoder_config = EncoderConfig {
            width: self.width,
            height: self.height,
            fps: config.video_fps,
            codec: video_codec(config.video_format),
            gop_seconds: 2,
            constant_qp: quality_to_qp(config.video_quality),
            bitrate_bps: if quality_to_qp(config.video_quality).is_none() {
                Some(12_000_000)
            } else {
                None
            },
        };
        let mut session = EncoderSession::create(FfmpegEncoderBackend::new(), encoder_config)?;

        let codec_config = Arc::new(CodecConfig::new());
        codec_config.set_video_sequence_header(session.sequence_header());

        let capture_active = Arc::new(AtomicBool::new(true));
        let capture_active_t = capture_active.clone();
        let video_ring_t = video_ring.clone();
        let heartbeat_t = self.heartbeat.clone();
        let mut frame_source = frame_source;

        let capture_join = std::thread::Builder::new()
            .name("capture-feed".to_string())
            .spawn(move || {
                while capture_active_t.load(Ordering::Relaxed) {
                    heartbeat_t.beat(ThreadRole::CaptureFeed);
                    let Some(frame) = frame_source.next_frame() else {
                        break;
                    };
                    let result = session.submit(EncoderFrame {
                        plane_y: &frame.plane_y,
                        plane_uv: &frame.plane_uv,
                        linesize_y: frame.linesize_y,
                        linesize_uv: frame.linesize_uv,
                        timestamp: frame.timestamp,
                    });
                    match result {
                        Ok(Some(packet)) => video_ring_t.add(packet),
                        Ok(None) => {}
                        Err(e) => error!("encoder submit failed: {e}"),
                    }
                }
                let _ = session.shutdown();
            })
            .expect("failed to spawn capture-feed thread");

        let audio_active = capture_active.clone();
        let audio_ring_t = audio_ring.clone();
        let mixer_output = mixer.output.clone();
        let heartbeat_audio = self.heartbeat.clone();
        let codec_config_audio = codec_config.clone();
        let audio_encode_join = std::thread::Builder::new()
            .name("audio-encode".to_string())
            .spawn(move || {
                let mut encoder = match AacAudioEncoder::create(AacEncoderConfig {
                    sample_rate: DEFAULT_PCM_RATE,
                    channels: 2,
                    bitrate_bps: 128_000,
                }) {
                    Ok(e) => e,
                    Err(e) => {
                        error!("AAC encoder init failed: {e}");
                        return;
                    }
                };
                codec_config_audio.set_audio_decoder_config(encoder.decoder_config());
                while audio_active.load(Ordering::Relaxed) {
                    heartbeat_audio.beat(ThreadRole::Mixer);
                    let chunk = mixer_output.read(crate::audio::bytes_per_sec(DEFAULT_PCM_RATE) as usize / 50);
                    if chunk.is_empty() {
                        std::thread::sleep(Duration::from_millis(10));
                        continue;
                    }
                    match encoder.encode(&chunk) {
                        Ok(packets) => {
                            for p in packets {
                                audio_ring_t.add(p);
                            }
                        }
                        Err(e) => error!("audio encode failed: {e}"),
                    }
                }
            })
            .expect("failed to spawn audio-encode thread");

        let supervisor_state = self.state.clone();
        let supervisor_heartbeat = self.heartbeat.clone();
        let supervisor_active = capture_active.clone();
        let supervisor_config = SupervisorConfig {
            soft_threshold: Duration::from_millis(config.health_soft_threshold_ms),
            hard_threshold: Duration::from_millis(config.health_hard_threshold_ms),
            ..SupervisorConfig::default()
        };
        let check_interval = Duration::from_millis(config.health_check_interval_ms);
        let supervisor_join = std::thread::Builder::new()
            .name("supervisor".to_string())
            .spawn(move || {
                let mut supervisor = HealthSupervisor::new(supervisor_config);
                let probe = AllRunningProbe;
                while supervisor_active.load(Ordering::Relaxed) {
                    supervisor_heartbeat.beat(ThreadRole::Supervisor);
                    let events = supervisor.tick(std::time::Instant::now(), supervisor_heartbeat.as_ref(), &probe);
                    for event in events {
                        match event {
                            SupervisorEvent::SoftWarning(role) => warn!("stall warning: {role}"),
                            SupervisorEvent::Stalled { kind, .. } => {
                                error!("pipeline stalled: {kind:?}");
                                let _ = health_notify.send(ReplayError::Stalled { kind });
                            }
                            // A restart is the supervisor's own recovery action, not
                            // a failure the caller needs to react to -- it is still
                            // logged, but `health_notify` only carries events the
                            // caller cannot already infer by other means.
                            SupervisorEvent::RestartRequested => {
                                warn!("restart requested by health supervisor");
                            }
                            SupervisorEvent::PermanentFailure { recoveries, window } => {
                                error!("permanent failure after {recoveries} recoveries in {window:?}");
                                let _ = health_notify.send(ReplayError::PermanentFailure {
                                    recoveries,
                                    window_secs: window.as_secs(),
                                });
                                *supervisor_state.write() = PipelineState::Stopping;
                                break;
                            }
                        }
                    }
                    std::thread::sleep(check_interval);
                }
            })
            .expect("failed to spawn supervisor thread");

        *self.save.write() = Some(SaveCoordinator::new(
            video_ring.clone(),
            audio_ring.clone(),
            self.width,
            self.height,
            config.video_fps,
            12_000_000,
            codec_config,
        ));
        *self.running.write() = Some(RunningPipeline {
            audio_sources,
            mixer,
            capture_active,
            capture_join: Some(capture_join),
            audio_encode_join: Some(audio_encode_join),
            supervisor_join: Some(supervisor_join),
        });

        // Swap in the freshly sized rings now that start has fully succeeded.
        *self.video_ring.write() = video_ring;
        *self.audio_ring.write() = audio_ring;

        *self.state.write() = PipelineState::Capturing;
        info!("pipeline started");
        Ok(())
    }

    /// Request `Stopping`, signal every worker's active flag, and wait
    /// with timeout *T_stop* per worker.
    pub fn stop(&self) {
        *self.state.write() = PipelineState::Stopping;
        let Some(mut running) = self.running.write().take() else {
            *self.state.write() = PipelineState::Uninitialized;
            return;
        };

        running.capture_active.store(false, Ordering::Relaxed);

        let t_stop = Duration::from_secs(3);
        if let Some(j) = running.capture_join.take() {
            join_with_timeout(j, t_stop);
        }
        if let Some(j) = running.audio_encode_join.take() {
            join_with_timeout(j, t_stop);
        }
        if let Some(j) = running.supervisor_join.take() {
            join_with_timeout(j, t_stop);
        }
        for source in running.audio_sources {
            source.stop();
        }
        running.mixer.stop();

        *self.save.write() = None;
        *self.state.write() = PipelineState::Uninitialized;
        info!("pipeline stopped");
    }

    pub fn request_save(&self, path: std::path::PathBuf, notify: mpsc::Sender<bool>) -> Result<(), ReplayError> {
        let guard = self.save.read();
        let coordinator = guard.as_ref().ok_or(ReplayError::NotCapturing)?;
        coordinator.save_async(path, notify, self, || {
            Box::new(crate::mux::FfmpegContainerSink::new())
        })
    }
}

struct AllRunningProbe;
impl crate::health::ThreadStateProbe for AllRunningProbe {
    fn state(&self, _role: ThreadRole) -> WorkerThreadState {
        WorkerThreadState::Running
    }
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) {
    // `std::thread::JoinHandle` has no timed join; poll `is_finished` up
    // to the timeout, then let a still-running worker be orphaned (the
    // supervisor's recovery path accepts this same leak for a hung thread).
    let start = std::time::Instant::now();
    while !handle.is_finished() && start.elapsed() < timeout {
        std::thread::sleep(Duration::from_millis(20));
    }
    if handle.is_finished() {
        let _ = handle.join();
    }
}
