// crates/seamscale-media/src/encode.rs
//
// H.264 and AAC encoders behind seamscale-core's `VideoEncoder` /
// `AudioEncoder` traits.
//
// Stream layout in the output container:
//   Stream 0: H.264 video (YUV420P, CRF from config, preset from config)
//   Stream 1: AAC audio  (FLTP stereo, 44100 Hz, bitrate from config)
//
// PTS strategy:
//   Video: monotonically increasing frame counter in 1/fps.
//   Audio: the chunk's sample offset in 1/44100.
//   Both start at zero at the trim start, so trimming never leaves a gap at
//   the head of the output.
//
// Encoder ownership:
//   Both encoders are created before the container header is written and are
//   handed to the container writer only to copy their codec parameters into
//   the output streams. Packets are returned as owned `EncodedPacket`s in the
//   encoder's time base; the writer rescales them to the stream time base.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::{Pixel, Sample};
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::software::scaling::{Context as ScaleCtx, Flags as ScaleFlags};
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as RawAudio;
use ffmpeg::util::frame::video::Video as RawVideo;
use ffmpeg::Packet;
use tracing::debug;

use seamscale_core::codec::{AudioEncoder, EncodedPacket, Rational, StreamKind, VideoEncoder};
use seamscale_core::config::PipelineConfig;
use seamscale_core::resegment::AudioChunk;
use seamscale_core::types::{Dimensions, VideoFrame};
use seamscale_core::{Error, Result};

use crate::audio::AUDIO_RATE;
use crate::helpers::color::SourceColor;

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct VideoSettings {
    /// Encoded frame size. Rounded down to even for YUV420P.
    pub size:   Dimensions,
    pub fps:    Rational,
    pub crf:    u32,
    pub preset: String,
    pub color:  Option<SourceColor>,
}

impl VideoSettings {
    pub fn new(size: Dimensions, fps: Rational, config: &PipelineConfig) -> Self {
        Self {
            size:   even_size(size),
            fps,
            crf:    config.video_crf,
            preset: config.video_preset.clone(),
            color:  None,
        }
    }

    pub fn with_color(mut self, color: SourceColor) -> Self {
        self.color = Some(color);
        self
    }
}

/// YUV420P needs even dimensions.
pub fn even_size(d: Dimensions) -> Dimensions {
    Dimensions::new((d.width & !1).max(2), (d.height & !1).max(2))
}

// ── Video ─────────────────────────────────────────────────────────────────────

pub struct H264Encoder {
    encoder:   encoder::video::Video,
    size:      Dimensions,
    time_base: Rational,
    /// RGB24 → YUV420P converter, rebuilt when the input size changes
    /// (gradual scaling feeds a different size every frame).
    scaler:    Option<(ScaleCtx, Dimensions)>,
    next_pts:  i64,
}

impl H264Encoder {
    /// `global_header`: the container wants codec extradata in its header
    /// (MP4 / MKV) rather than in-band.
    pub fn open(settings: &VideoSettings, global_header: bool) -> Result<Self> {
        let h264 = encoder::find(CodecId::H264)
            .ok_or_else(|| Error::encode("H.264 encoder not found; is libx264 available?"))?;

        let time_base = settings.fps.invert();
        let ctx = codec::context::Context::new_with_codec(h264);
        let mut enc = ctx.encoder().video()
            .map_err(|e| Error::encode(format!("create video encoder context: {e}")))?;

        enc.set_width(settings.size.width);
        enc.set_height(settings.size.height);
        enc.set_format(Pixel::YUV420P);
        enc.set_time_base(to_ff(time_base));
        enc.set_frame_rate(Some(to_ff(settings.fps)));
        enc.set_bit_rate(0); // CRF controls quality
        unsafe {
            if global_header {
                (*enc.as_mut_ptr()).flags |= ffmpeg::ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
            if let Some(color) = &settings.color {
                color.apply(enc.as_mut_ptr());
            }
        }

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("crf",    &settings.crf.to_string());
        opts.set("preset", &settings.preset);

        let mut encoder = enc.open_as_with(h264, opts)
            .map_err(|e| Error::encode(format!("open H.264 encoder: {e}")))?;

        // libavcodec resets the SAR during open; set it on the opened context
        // so avcodec_parameters_from_context picks it up.
        encoder.set_aspect_ratio(ffmpeg::Rational::new(1, 1));

        debug!(
            "h264: {} @ {}/{} crf={} preset={}",
            settings.size, settings.fps.num, settings.fps.den, settings.crf, settings.preset,
        );

        Ok(Self {
            encoder,
            size: settings.size,
            time_base,
            scaler: None,
            next_pts: 0,
        })
    }

    pub(crate) fn codec_id(&self) -> CodecId { CodecId::H264 }

    pub(crate) fn context_ptr(&self) -> *const ffmpeg::ffi::AVCodecContext {
        self.encoder.as_ptr()
    }

    pub fn time_base(&self) -> Rational { self.time_base }

    fn to_yuv(&mut self, frame: &VideoFrame) -> Result<RawVideo> {
        let input = frame.dimensions();
        let rgb   = rgb_frame(frame)?;

        let scaler = match self.scaler.take() {
            Some((s, d)) if d == input => s,
            _ => ScaleCtx::get(
                Pixel::RGB24,   input.width,     input.height,
                Pixel::YUV420P, self.size.width, self.size.height,
                ScaleFlags::BICUBIC,
            ).map_err(|e| Error::encode(format!("create swscale context: {e}")))?,
        };
        let (scaler, _) = self.scaler.insert((scaler, input));

        let mut yuv = RawVideo::empty();
        scaler.run(&rgb, &mut yuv)
            .map_err(|e| Error::encode(format!("scale video frame: {e}")))?;

        yuv.set_pts(Some(self.next_pts));
        // swscale copies the source SAR onto the output frame; force square
        // pixels so players don't letterbox.
        unsafe {
            (*yuv.as_mut_ptr()).sample_aspect_ratio = ffmpeg::ffi::AVRational { num: 1, den: 1 };
        }
        Ok(yuv)
    }

    fn drain(&mut self) -> Vec<EncodedPacket> {
        let mut out = Vec::new();
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            out.push(owned_packet(&pkt, StreamKind::Video, self.time_base));
        }
        out
    }
}

impl VideoEncoder for H264Encoder {
    fn encode(&mut self, frame: VideoFrame) -> Result<Vec<EncodedPacket>> {
        let yuv = self.to_yuv(&frame)?;
        drop(frame);
        self.encoder.send_frame(&yuv)
            .map_err(|e| Error::encode(format!("send video frame {}: {e}", self.next_pts)))?;
        self.next_pts += 1;

        let packets = self.drain();
        if packets.is_empty() {
            // x264 lookahead: frames are held until enough input has arrived.
            return Err(Error::NeedsMoreInput);
        }
        Ok(packets)
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>> {
        self.encoder.send_eof()
            .map_err(|e| Error::encode(format!("send EOF to video encoder: {e}")))?;
        Ok(self.drain())
    }
}

/// Copy a packed RGB24 `VideoFrame` into an FFmpeg frame (which has its own
/// stride alignment).
fn rgb_frame(frame: &VideoFrame) -> Result<RawVideo> {
    if frame.bytes_per_pixel != 3 {
        return Err(Error::InvalidFrame(format!(
            "expected RGB24, got {} bytes per pixel", frame.bytes_per_pixel,
        )));
    }
    let row = frame.row_bytes();
    let mut out = RawVideo::new(Pixel::RGB24, frame.width, frame.height);
    let dst_stride = out.stride(0);
    let dst = out.data_mut(0);
    for y in 0..frame.height as usize {
        let src = &frame.data[y * frame.stride..y * frame.stride + row];
        dst[y * dst_stride..y * dst_stride + row].copy_from_slice(src);
    }
    Ok(out)
}

// ── Audio ─────────────────────────────────────────────────────────────────────

pub struct AacEncoder {
    encoder:    encoder::Audio,
    frame_size: usize,
    time_base:  Rational,
}

impl AacEncoder {
    pub fn open(bit_rate: usize, fallback_frame_size: usize, global_header: bool) -> Result<Self> {
        let aac = encoder::find(CodecId::AAC)
            .ok_or_else(|| Error::encode("AAC encoder not found"))?;

        let ctx = codec::context::Context::new_with_codec(aac);
        let mut enc = ctx.encoder().audio()
            .map_err(|e| Error::encode(format!("create audio encoder context: {e}")))?;

        enc.set_rate(AUDIO_RATE as i32);
        enc.set_ch_layout(ChannelLayout::STEREO);
        enc.set_format(Sample::F32(SampleType::Planar));
        enc.set_bit_rate(bit_rate);
        if global_header {
            unsafe {
                (*enc.as_mut_ptr()).flags |= ffmpeg::ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = enc.open_as_with(aac, ffmpeg::Dictionary::new())
            .map_err(|e| Error::encode(format!("open AAC encoder: {e}")))?;

        // A codec reporting 0 accepts any size; use the configured one.
        let frame_size = match encoder.frame_size() as usize {
            0 => fallback_frame_size,
            n => n,
        };
        debug!("aac: {AUDIO_RATE} Hz stereo, {bit_rate} bps, {frame_size} samples/frame");

        Ok(Self {
            encoder,
            frame_size,
            time_base: Rational::new(1, AUDIO_RATE as i32),
        })
    }

    pub(crate) fn codec_id(&self) -> CodecId { CodecId::AAC }

    pub fn time_base(&self) -> Rational { self.time_base }

    pub(crate) fn context_ptr(&self) -> *const ffmpeg::ffi::AVCodecContext {
        self.encoder.as_ptr()
    }

    fn drain(&mut self) -> Vec<EncodedPacket> {
        let mut out = Vec::new();
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            out.push(owned_packet(&pkt, StreamKind::Audio, self.time_base));
        }
        out
    }

    /// Build one FLTP stereo frame of exactly `frame_size` samples. A short
    /// final chunk is zero-padded; mono input is duplicated to both channels.
    fn fltp_frame(&self, chunk: &AudioChunk) -> RawAudio {
        let n = self.frame_size;
        let mut frame = RawAudio::new(Sample::F32(SampleType::Planar), n, ChannelLayoutMask::STEREO);
        frame.set_rate(AUDIO_RATE);
        frame.set_pts(Some((chunk.timestamp * AUDIO_RATE as f64).round() as i64));

        for ch in 0..2 {
            let src = chunk.planes.get(ch).or_else(|| chunk.planes.first());
            let dst = frame.data_mut(ch);
            for (i, out) in dst.chunks_exact_mut(4).take(n).enumerate() {
                let v = src.and_then(|p| p.get(i)).copied().unwrap_or(0.0);
                out.copy_from_slice(&v.to_ne_bytes());
            }
        }
        frame
    }
}

impl AudioEncoder for AacEncoder {
    fn frame_size(&self) -> usize { self.frame_size }
    fn sample_rate(&self) -> u32 { AUDIO_RATE }

    fn encode(&mut self, chunk: AudioChunk) -> Result<Vec<EncodedPacket>> {
        if chunk.samples() > self.frame_size {
            return Err(Error::InvalidAudio(format!(
                "chunk of {} samples exceeds codec frame size {}", chunk.samples(), self.frame_size,
            )));
        }
        let frame = self.fltp_frame(&chunk);
        self.encoder.send_frame(&frame)
            .map_err(|e| Error::encode(format!("send audio frame: {e}")))?;
        Ok(self.drain())
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>> {
        self.encoder.send_eof()
            .map_err(|e| Error::encode(format!("send EOF to audio encoder: {e}")))?;
        Ok(self.drain())
    }
}

// ── Shared ────────────────────────────────────────────────────────────────────

pub(crate) fn to_ff(r: Rational) -> ffmpeg::Rational {
    ffmpeg::Rational::new(r.num, r.den)
}

fn owned_packet(pkt: &Packet, stream: StreamKind, time_base: Rational) -> EncodedPacket {
    EncodedPacket {
        stream,
        data:      pkt.data().map(<[u8]>::to_vec).unwrap_or_default(),
        pts:       pkt.pts(),
        dts:       pkt.dts(),
        duration:  pkt.duration(),
        time_base,
        keyframe:  pkt.is_key(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_sizes_round_down_to_even() {
        assert_eq!(even_size(Dimensions::new(641, 361)), Dimensions::new(640, 360));
        assert_eq!(even_size(Dimensions::new(1, 1)), Dimensions::new(2, 2));
    }
}
