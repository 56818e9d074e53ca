// crates/seamscale-core/src/config.rs
//
// Already-validated configuration handed to the pipeline.
//
// `PipelineConfig` is serde-friendly so the CLI can load it from a JSON file
// and then layer flag overrides on top. Everything else here describes one
// batch: what size to produce, which part of a video to keep, what to write.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::interpolate::SizeSpec;

// ── Pipeline tuning ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent transform invocations.
    pub threads:            usize,
    /// Reorder buffer capacity, in frames. Producers block once this many
    /// out-of-order frames are waiting.
    pub max_pending_frames: usize,
    /// Back-off between polls of the reorder buffer head.
    pub poll_interval_ms:   u64,
    pub eta_min_samples:    usize,
    pub eta_min_elapsed_ms: u64,
    pub video_crf:          u32,
    pub video_preset:       String,
    pub audio_bitrate:      usize,
    /// Samples per audio codec frame (AAC: 1024).
    pub audio_frame_size:   usize,
    /// ImageMagick executable used for liquid rescale.
    pub magick_binary:      String,
    /// Fall back to a plain resize when the content-aware call fails.
    pub fallback_resize:    bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self {
            threads,
            max_pending_frames: threads * 4,
            poll_interval_ms:   20,
            eta_min_samples:    3,
            eta_min_elapsed_ms: 1000,
            video_crf:          18,
            video_preset:       "fast".into(),
            audio_bitrate:      128_000,
            audio_frame_size:   1024,
            magick_binary:      "magick".into(),
            fallback_resize:    true,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::Config("threads must be at least 1".into()));
        }
        if self.max_pending_frames == 0 {
            return Err(Error::Config("max_pending_frames must be at least 1".into()));
        }
        if self.audio_frame_size == 0 {
            return Err(Error::Config("audio_frame_size must be at least 1".into()));
        }
        Ok(())
    }
}

// ── Batch description ─────────────────────────────────────────────────────────

/// Target size: either one fixed size for every frame, or a linear ramp from
/// `start` to `end` across the frames of a video.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResizeRequest {
    Fixed(SizeSpec),
    Gradual { start: SizeSpec, end: SizeSpec },
}

/// Portion of a video to keep, in seconds from the start of the source.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Trim {
    pub start:    f64,
    pub end:      Option<f64>,
    pub duration: Option<f64>,
}

impl Trim {
    /// Absolute end time, if bounded. `end` wins over `duration`.
    pub fn end_secs(&self) -> Option<f64> {
        self.end.or(self.duration.map(|d| self.start + d))
    }

    /// True if `t` (source seconds) lies inside the kept window.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && self.end_secs().map_or(true, |end| t < end)
    }

    /// Kept length given the source duration.
    pub fn kept_duration(&self, source_duration: f64) -> f64 {
        let end = self.end_secs().unwrap_or(source_duration).min(source_duration);
        (end - self.start).max(0.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Same container/extension as the input.
    #[default]
    Keep,
    Png,
    Jpg,
    Mp4,
    Mkv,
}

impl OutputFormat {
    /// Output extension for an input with extension `input_ext`.
    pub fn extension<'a>(&self, input_ext: &'a str) -> &'a str {
        match self {
            Self::Keep => input_ext,
            Self::Png  => "png",
            Self::Jpg  => "jpg",
            Self::Mp4  => "mp4",
            Self::Mkv  => "mkv",
        }
    }
}
