// crates/seamscale-media/src/probe.rs
//
// In-process FFmpeg probing: display dimensions, frame rate, duration and
// which streams are present. Also used on still images (image2 demuxer) to
// learn their size before resolving a target.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type;
use tracing::debug;

use seamscale_core::codec::Rational;
use seamscale_core::config::Trim;
use seamscale_core::types::Dimensions;
use seamscale_core::{Error, Result};

/// Fallback when a stream reports no usable frame rate.
const DEFAULT_FPS: Rational = Rational::new(25, 1);

#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub dimensions:   Dimensions,
    pub fps:          Rational,
    /// Seconds; 0.0 when unknown.
    pub duration:     f64,
    /// Frame count as stored in the container, if it stores one.
    pub frame_count:  Option<u64>,
    pub has_audio:    bool,
}

impl MediaInfo {
    /// Frames expected inside `trim`. Used to size the gradual-scaling ramp
    /// before decoding; indices past the estimate clamp to the end size.
    pub fn estimated_frames(&self, trim: &Trim) -> usize {
        let fps = self.fps.as_f64();
        let untrimmed = trim.start <= 0.0 && trim.end_secs().is_none();
        match self.frame_count {
            Some(n) if untrimmed && n > 0 => n as usize,
            _ => (trim.kept_duration(self.duration) * fps).round().max(1.0) as usize,
        }
    }
}

pub fn probe(path: &Path) -> Result<MediaInfo> {
    let ictx = input(path)
        .map_err(|e| Error::decode(format!("open '{}': {e}", path.display())))?;

    let stream = ictx.streams().best(Type::Video)
        .ok_or_else(|| Error::decode(format!("no video stream in '{}'", path.display())))?;

    // Display dimensions from codec parameters, not the coded (macroblock
    // padded) size the decoder reports.
    let (w, h) = unsafe {
        let p = stream.parameters().as_ptr();
        ((*p).width as u32, (*p).height as u32)
    };
    if w == 0 || h == 0 {
        return Err(Error::decode(format!("'{}' reports zero video size", path.display())));
    }

    let fps = [stream.avg_frame_rate(), stream.rate()]
        .into_iter()
        .map(|r| Rational::new(r.numerator(), r.denominator()))
        .find(|r| r.num > 0 && r.den > 0)
        .unwrap_or(DEFAULT_FPS);

    let mut duration = ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
    if duration <= 0.0 {
        // Fall back to stream duration
        let tb = stream.time_base();
        duration = stream.duration() as f64 * tb.numerator() as f64 / tb.denominator().max(1) as f64;
    }

    let frame_count = Some(stream.frames()).filter(|n| *n > 0).map(|n| n as u64);
    let has_audio   = ictx.streams().best(Type::Audio).is_some();

    let info = MediaInfo {
        dimensions: Dimensions::new(w, h),
        fps,
        duration: duration.max(0.0),
        frame_count,
        has_audio,
    };
    debug!(
        "probe {}: {} @ {}/{} fps, {:.2}s, audio={}",
        path.display(), info.dimensions, fps.num, fps.den, info.duration, has_audio,
    );
    Ok(info)
}
