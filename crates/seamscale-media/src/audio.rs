// crates/seamscale-media/src/audio.rs
//
// Audio extraction for a video session: decode the best audio stream of the
// input, resample to 44.1 kHz stereo FLTP (what the AAC encoder takes), drop
// samples outside the trim window and hand back owned planar frames.
//
// The whole trimmed track is extracted up front, before any video work, so
// the synchronizer can interleave it against video time without running a
// second demuxer alongside the frame pipeline.
//
// Timestamps are rebased to the trim start. The first kept sample sits at its
// source time minus the trim start, so audio that starts late in the source
// stays late against video frame 0.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::format::sample::{Sample, Type as SampleType};
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::frame::audio::Audio as RawAudio;
use tracing::{debug, warn};

use seamscale_core::config::Trim;
use seamscale_core::types::AudioFrame;
use seamscale_core::{CancelToken, Error, Result};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Output sample rate for every export.
pub const AUDIO_RATE: u32 = 44_100;

const OUT_FMT: Sample = Sample::F32(SampleType::Planar);
const OUT_CHANNELS: usize = 2;

// ── Public API ────────────────────────────────────────────────────────────────

/// A decoded, resampled and trimmed audio track.
#[derive(Clone, Debug, Default)]
pub struct AudioTrack {
    pub frames:      Vec<AudioFrame>,
    pub sample_rate: u32,
}

impl AudioTrack {
    pub fn samples(&self) -> usize {
        self.frames.iter().map(AudioFrame::samples).sum()
    }

    pub fn duration(&self) -> f64 {
        self.samples() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Decode the audio of `path` inside `trim`. `Ok(None)` if the file has no
/// audio stream or nothing survives the trim.
pub fn extract_audio(path: &Path, trim: &Trim, cancel: &CancelToken) -> Result<Option<AudioTrack>> {
    let mut ictx = input(path)
        .map_err(|e| Error::decode(format!("open '{}': {e}", path.display())))?;

    let Some(stream) = ictx.streams().best(MediaType::Audio) else {
        return Ok(None);
    };
    let audio_idx = stream.index();
    let in_tb     = f64::from(stream.time_base());
    let dec_ctx   = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| Error::decode(format!("audio decoder context: {e}")))?;
    let mut decoder = dec_ctx.decoder().audio()
        .map_err(|e| Error::decode(format!("open audio decoder: {e}")))?;

    crate::helpers::seek::seek_to_secs(&mut ictx, trim.start, "audio extract");

    let mut collector = Collector::new(*trim);

    for result in ictx.packets() {
        cancel.check()?;
        let (stream, packet) = match result {
            Ok(p)  => p,
            Err(_) => continue,
        };
        if stream.index() != audio_idx { continue; }
        // Soft-fail: a bad audio packet should not abort the export.
        if decoder.send_packet(&packet).is_err() { continue; }

        let mut raw = RawAudio::empty();
        while decoder.receive_frame(&mut raw).is_ok() {
            collector.push(&raw, in_tb)?;
        }
        if collector.past_end() { break; }
    }

    // Flush decoder
    let _ = decoder.send_eof();
    let mut raw = RawAudio::empty();
    while decoder.receive_frame(&mut raw).is_ok() {
        collector.push(&raw, in_tb)?;
    }

    let track = collector.finish();
    debug!(
        "audio: {} frames, {:.2}s ← {}",
        track.frames.len(), track.duration(), path.display(),
    );
    Ok((!track.frames.is_empty()).then_some(track))
}

// ── Internal implementation ───────────────────────────────────────────────────

/// Resamples decoded frames and keeps the samples inside the trim window.
struct Collector {
    trim:      Trim,
    resampler: Option<resampling::Context>,
    /// Source-time position (seconds) of the next resampled output sample.
    cursor:    Option<f64>,
    /// Rebased time of the first kept sample.
    origin:    Option<f64>,
    frames:    Vec<AudioFrame>,
    kept:      u64,
    past_end:  bool,
}

impl Collector {
    fn new(trim: Trim) -> Self {
        Self { trim, resampler: None, cursor: None, origin: None, frames: Vec::new(), kept: 0, past_end: false }
    }

    fn past_end(&self) -> bool { self.past_end }

    fn push(&mut self, raw: &RawAudio, in_tb: f64) -> Result<()> {
        if self.past_end || raw.samples() == 0 {
            return Ok(());
        }
        if self.cursor.is_none() {
            self.cursor = Some(raw.pts().map(|p| p as f64 * in_tb).unwrap_or(0.0));
        }

        let planes = self.resample(raw)?;
        self.keep(planes)
    }

    /// Keep the part of `planes` (starting at `cursor`) inside the trim window.
    fn keep(&mut self, planes: Vec<Vec<f32>>) -> Result<()> {
        let n = planes.first().map(Vec::len).unwrap_or(0);
        if n == 0 {
            return Ok(());
        }

        let start = self.cursor.unwrap_or(0.0);
        self.cursor = Some(start + n as f64 / AUDIO_RATE as f64);

        let (lo, hi) = keep_range(start, n, &self.trim);
        if hi <= lo {
            if self.trim.end_secs().is_some_and(|end| start >= end) {
                self.past_end = true;
            }
            return Ok(());
        }

        let planes = planes.into_iter().map(|p| p[lo..hi].to_vec()).collect();
        let trim_start = self.trim.start;
        let origin = *self.origin.get_or_insert_with(|| {
            (start + lo as f64 / AUDIO_RATE as f64 - trim_start).max(0.0)
        });
        let ts = origin + self.kept as f64 / AUDIO_RATE as f64;
        self.kept += (hi - lo) as u64;
        self.frames.push(AudioFrame::new(planes, ts)?);
        Ok(())
    }

    /// Resample `raw` to stereo FLTP at AUDIO_RATE, returning owned planes.
    fn resample(&mut self, raw: &RawAudio) -> Result<Vec<Vec<f32>>> {
        let channels = raw.ch_layout().channels() as usize;
        let needs_resample = raw.format() != OUT_FMT
            || raw.rate()                 != AUDIO_RATE
            || channels                   != OUT_CHANNELS;

        if !needs_resample {
            return Ok(planes_f32(raw, OUT_CHANNELS));
        }

        let rs = match self.resampler.take() {
            Some(rs) => rs,
            None => {
                // Mono sources must be declared as MONO or swr will
                // misinterpret the channel layout.
                let src_layout = if channels >= 2 { raw.ch_layout() } else { ChannelLayout::MONO };
                resampling::Context::get2(
                    raw.format(), src_layout,            raw.rate(),
                    OUT_FMT,      ChannelLayout::STEREO, AUDIO_RATE,
                ).map_err(|e| Error::decode(format!("create audio resampler: {e}")))?
            }
        };
        let rs = self.resampler.insert(rs);

        let mut out = RawAudio::empty();
        match rs.run(raw, &mut out) {
            Ok(_) if out.samples() > 0 => Ok(planes_f32(&out, OUT_CHANNELS)),
            Ok(_) => Ok(Vec::new()),
            Err(e) => {
                warn!("audio: resample soft-fail: {e}");
                Ok(Vec::new())
            }
        }
    }

    fn finish(self) -> AudioTrack {
        AudioTrack { frames: self.frames, sample_rate: AUDIO_RATE }
    }
}

/// Copy `channels` f32 planes out of a planar frame.
fn planes_f32(frame: &RawAudio, channels: usize) -> Vec<Vec<f32>> {
    let n = frame.samples();
    (0..channels)
        .map(|ch| {
            frame.data(ch)
                .chunks_exact(4)
                .take(n)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect()
}

/// Index range `[lo, hi)` of the `n` samples starting at `start` seconds that
/// fall inside `trim`.
fn keep_range(start: f64, n: usize, trim: &Trim) -> (usize, usize) {
    let first_at_or_after = |t: f64| {
        // Tolerance so a boundary that lands exactly on a sample is not
        // pushed to the next one by float error.
        (((t - start) * AUDIO_RATE as f64) - 1e-6).ceil().clamp(0.0, n as f64) as usize
    };
    let lo = first_at_or_after(trim.start);
    let hi = trim.end_secs().map_or(n, first_at_or_after);
    (lo, hi.max(lo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_range_inside_window() {
        let trim = Trim { start: 1.0, end: Some(2.0), duration: None };
        // Frame entirely before the window.
        assert_eq!(keep_range(0.0, 1000, &trim), (1000, 1000));
        // Frame straddling the start: first 441 samples are before 1.0s.
        let (lo, hi) = keep_range(0.99, 1000, &trim);
        assert_eq!((lo, hi), (441, 1000));
        // Frame straddling the end.
        let (lo, hi) = keep_range(1.99, 1000, &trim);
        assert_eq!(lo, 0);
        assert_eq!(hi, 441);
    }

    #[test]
    fn untrimmed_keeps_everything() {
        assert_eq!(keep_range(3.0, 512, &Trim::default()), (0, 512));
    }

    #[test]
    fn late_audio_keeps_its_offset() {
        let mut c = Collector::new(Trim::default());
        c.cursor = Some(0.5);
        c.keep(vec![vec![0.0; 1024]; 2]).unwrap();
        c.keep(vec![vec![0.0; 1024]; 2]).unwrap();

        let track = c.finish();
        assert_eq!(track.frames[0].timestamp, 0.5);
        assert_eq!(track.frames[1].timestamp, 0.5 + 1024.0 / AUDIO_RATE as f64);
    }

    #[test]
    fn trimmed_audio_is_rebased_to_trim_start() {
        let trim = Trim { start: 1.0, end: None, duration: None };
        let mut c = Collector::new(trim);
        c.cursor = Some(0.99);
        c.keep(vec![vec![0.0; 1000]; 2]).unwrap();

        let track = c.finish();
        assert_eq!(track.samples(), 559);
        assert!(track.frames[0].timestamp.abs() < 1e-9);
    }
}
