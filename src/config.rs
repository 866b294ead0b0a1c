//! Typed, validated configuration for the pipeline.
//!
//! This crate never persists configuration -- owning a settings store is
//! out of scope, mirroring the split between a settings-persistence
//! module and modules that only consume already-resolved values.
//! `ReplayConfig::from_map` takes the flat key space a host application's
//! settings layer would hand across the library boundary and either
//! returns a validated struct or the offending key wrapped in
//! `ReplayError::ConfigInvalid`.

use crate::audio::N_MAX_AUDIO_SOURCES;
use crate::error::ReplayError;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CaptureSource {
    Monitor,
    Window,
    Region,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Quality {
    Low,
    Medium,
    High,
    Lossless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VideoFormat {
    Mp4,
    Hevc,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReplayConfig {
    pub replay_enabled: bool,
    pub replay_duration_seconds: u32,
    pub replay_capture_source: CaptureSource,
    pub audio_enabled: bool,
    /// Up to `N_MAX_AUDIO_SOURCES` device ids; `None` means that slot is unused.
    pub audio_sources: [Option<String>; N_MAX_AUDIO_SOURCES],
    /// Parallel per-source gain, clamped 0..=100.
    pub audio_volumes: [u8; N_MAX_AUDIO_SOURCES],
    pub video_fps: u32,
    pub video_quality: Quality,
    pub video_format: VideoFormat,
    pub health_soft_threshold_ms: u64,
    pub health_hard_threshold_ms: u64,
    pub health_check_interval_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            replay_enabled: true,
            replay_duration_seconds: 30,
            replay_capture_source: CaptureSource::Monitor,
            audio_enabled: true,
            audio_sources: Default::default(),
            audio_volumes: [100; N_MAX_AUDIO_SOURCES],
            video_fps: 60,
            video_quality: Quality::High,
            video_format: VideoFormat::Mp4,
            health_soft_threshold_ms: 2_000,
            health_hard_threshold_ms: 5_000,
            health_check_interval_ms: 500,
        }
    }
}

impl ReplayConfig {
    /// Parse and validate the flat `replay.*`/`audio.*`/`video.*`/`health.*`
    /// key space.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ReplayError> {
        let mut cfg = ReplayConfig::default();

        if let Some(v) = map.get("replay.enabled") {
            cfg.replay_enabled = parse_bool("replay.enabled", v)?;
        }
        if let Some(v) = map.get("replay.durationSeconds") {
            let secs: u32 = v
                .parse()
                .map_err(|_| ReplayError::ConfigInvalid("replay.durationSeconds".into()))?;
            if !(1..=3600).contains(&secs) {
                return Err(ReplayError::ConfigInvalid("replay.durationSeconds".into()));
            }
            cfg.replay_duration_seconds = secs;
        }
        if let Some(v) = map.get("replay.captureSource") {
            cfg.replay_capture_source = match v.as_str() {
                "monitor" => CaptureSource::Monitor,
                "window" => CaptureSource::Window,
                "region" => CaptureSource::Region,
                _ => return Err(ReplayError::ConfigInvalid("replay.captureSource".into())),
            };
        }
        if let Some(v) = map.get("audio.enabled") {
            cfg.audio_enabled = parse_bool("audio.enabled", v)?;
        }
        for i in 0..N_MAX_AUDIO_SOURCES {
            let key = format!("audio.source{}", i + 1);
            if let Some(v) = map.get(&key) {
                cfg.audio_sources[i] = if v.is_empty() { None } else { Some(v.clone()) };
            }
            let vol_key = format!("audio.volume{}", i + 1);
            if let Some(v) = map.get(&vol_key) {
                let vol: i32 = v
                    .parse()
                    .map_err(|_| ReplayError::ConfigInvalid(vol_key.clone()))?;
                cfg.audio_volumes[i] = vol.clamp(0, 100) as u8;
            }
        }
        if let Some(v) = map.get("video.fps") {
            cfg.video_fps = v
                .parse()
                .map_err(|_| ReplayError::ConfigInvalid("video.fps".into()))?;
            if cfg.video_fps == 0 {
                return Err(ReplayError::ConfigInvalid("video.fps".into()));
            }
        }
        if let Some(v) = map.get("video.quality") {
            cfg.video_quality = match v.as_str() {
                "low" => Quality::Low,
                "medium" => Quality::Medium,
                "high" => Quality::High,
                "lossless" => Quality::Lossless,
                _ => return Err(ReplayError::ConfigInvalid("video.quality".into())),
            };
        }
        if let Some(v) = map.get("video.format") {
            cfg.video_format = match v.as_str() {
                "mp4" => VideoFormat::Mp4,
                "hevc" => VideoFormat::Hevc,
                _ => return Err(ReplayError::ConfigInvalid("video.format".into())),
            };
        }
        if let Some(v) = map.get("health.softThresholdMs") {
            cfg.health_soft_threshold_ms = v
                .parse()
                .map_err(|_| ReplayError::ConfigInvalid("health.softThresholdMs".into()))?;
        }
        if let Some(v) = map.get("health.hardThresholdMs") {
            cfg.health_hard_threshold_ms = v
                .parse()
                .map_err(|_| ReplayError::ConfigInvalid("health.hardThresholdMs".into()))?;
        }
        if let Some(v) = map.get("health.checkIntervalMs") {
            cfg.health_check_interval_ms = v
                .parse()
                .map_err(|_| ReplayError::ConfigInvalid("health.checkIntervalMs".into()))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ReplayError> {
        if !(1..=3600).contains(&self.replay_duration_seconds) {
            return Err(ReplayError::ConfigInvalid("replay.durationSeconds".into()));
        }
        if self.video_fps == 0 {
            return Err(ReplayError::ConfigInvalid("video.fps".into()));
        }
        if self.health_hard_threshold_ms <= self.health_soft_threshold_ms {
            return Err(ReplayError::ConfigInvalid(
                "health.hardThresholdMs must exceed health.softThresholdMs".into(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, v: &str) -> Result<bool, ReplayError> {
    match v {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ReplayError::ConfigInvalid(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ReplayConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_duration() {
        let mut map = HashMap::new();
        map.insert("replay.durationSeconds".to_string(), "9999".to_string());
        assert!(matches!(
            ReplayConfig::from_map(&map),
            Err(ReplayError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn clamps_volume_into_range() {
        let mut map = HashMap::new();
        map.insert("audio.volume1".to_string(), "150".to_string());
        map.insert("audio.volume2".to_string(), "-10".to_string());
        let cfg = ReplayConfig::from_map(&map).unwrap();
        assert_eq!(cfg.audio_volumes[0], 100);
        assert_eq!(cfg.audio_volumes[1], 0);
    }

    #[test]
    fn empty_source_string_means_unused() {
        let mut map = HashMap::new();
        map.insert("audio.source1".to_string(), "".to_string());
        map.insert("audio.source2".to_string(), "device-xyz".to_string());
        let cfg = ReplayConfig::from_map(&map).unwrap();
        assert_eq!(cfg.audio_sources[0], None);
        assert_eq!(cfg.audio_sources[1].as_deref(), Some("device-xyz"));
    }

    #[test]
    fn rejects_unknown_quality() {
        let mut map = HashMap::new();
        map.insert("video.quality".to_string(), "ultra".to_string());
        assert!(ReplayConfig::from_map(&map).is_err());
    }

    #[test]
    fn rejects_hard_threshold_not_above_soft() {
        let mut map = HashMap::new();
        map.insert("health.softThresholdMs".to_string(), "5000".to_string());
        map.insert("health.hardThresholdMs".to_string(), "2000".to_string());
        assert!(ReplayConfig::from_map(&map).is_err());
    }
}
