// crates/seamscale-media/src/decode.rs
//
// VideoSource: sequential decoder for one input file, yielding owned RGB24
// frames tagged with their origin index. This is the producer side of a video
// session; the executor pulls from it on the dispatching thread, so it never
// needs to cross threads.
//
// Frames are copied out of the native buffer immediately (stride padding
// stripped), so nothing returned here borrows FFmpeg memory.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{Pixel, input};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as ScaleCtx, Flags as ScaleFlags};
use ffmpeg::util::frame::video::Video as RawFrame;
use tracing::{debug, warn};

use seamscale_core::config::Trim;
use seamscale_core::types::{Dimensions, VideoFrame};
use seamscale_core::{Error, Result};

use crate::helpers::color::SourceColor;
use crate::helpers::seek::seek_to_secs;

const BYTES_PER_PIXEL: usize = 3;

pub struct VideoSource {
    ictx:       ffmpeg::format::context::Input,
    decoder:    ffmpeg::decoder::video::Video,
    video_idx:  usize,
    /// Seconds per pts tick.
    tb:         f64,
    display:    Dimensions,
    scaler:     Option<ScaleCtx>,
    color:      SourceColor,
    trim:       Trim,
    half_frame: f64,
    next_index: usize,
    last_pts:   i64,
    eof_sent:   bool,
    done:       bool,
}

impl VideoSource {
    pub fn open(path: &Path, trim: Trim, fps: f64) -> Result<Self> {
        let mut ictx = input(path)
            .map_err(|e| Error::decode(format!("open '{}': {e}", path.display())))?;

        let (video_idx, tb, display, decoder) = {
            let stream = ictx.streams().best(Type::Video)
                .ok_or_else(|| Error::decode(format!("no video stream in '{}'", path.display())))?;
            let tb = f64::from(stream.time_base());
            let (w, h) = unsafe {
                let p = stream.parameters().as_ptr();
                ((*p).width as u32, (*p).height as u32)
            };
            let ctx = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| Error::decode(format!("video decoder context: {e}")))?;
            let decoder = ctx.decoder().video()
                .map_err(|e| Error::decode(format!("open video decoder: {e}")))?;
            (stream.index(), tb, Dimensions::new(w, h), decoder)
        };

        seek_to_secs(&mut ictx, trim.start, "video decode");

        let display = if display.width > 0 && display.height > 0 {
            display
        } else {
            Dimensions::new(decoder.width(), decoder.height())
        };
        let color = SourceColor::from_decoder(&decoder);

        Ok(Self {
            ictx,
            decoder,
            video_idx,
            tb,
            display,
            scaler: None,
            color,
            trim,
            half_frame: if fps > 0.0 { 0.5 / fps } else { 0.0 },
            next_index: 0,
            last_pts: 0,
            eof_sent: false,
            done: false,
        })
    }

    pub fn dimensions(&self) -> Dimensions { self.display }

    pub fn color(&self) -> SourceColor { self.color }

    /// Frames emitted so far.
    pub fn emitted(&self) -> usize { self.next_index }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            let mut decoded = RawFrame::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.pts().unwrap_or(self.last_pts + 1);
                self.last_pts = pts;
                let secs = pts as f64 * self.tb;

                // Pre-roll from the keyframe before the trim start.
                if secs < self.trim.start - self.half_frame {
                    continue;
                }
                if self.trim.end_secs().is_some_and(|end| secs >= end) {
                    return Ok(None);
                }
                return self.convert(&decoded, secs).map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }

            match self.ictx.packets().next() {
                Some(Ok((stream, packet))) => {
                    if stream.index() != self.video_idx { continue; }
                    self.decoder.send_packet(&packet)
                        .map_err(|e| Error::decode(format!("send video packet: {e}")))?;
                }
                Some(Err(e)) => return Err(Error::decode(format!("read packet: {e}"))),
                None => {
                    // Codecs with B-frames hold frames back; drain them.
                    let _ = self.decoder.send_eof();
                    self.eof_sent = true;
                }
            }
        }
    }

    fn convert(&mut self, decoded: &RawFrame, secs: f64) -> Result<VideoFrame> {
        // Built on the first frame so the real input format is known. Display
        // dimensions exclude macroblock padding rows.
        let display = self.display;
        let scaler = match self.scaler.take() {
            Some(s) => s,
            None => ScaleCtx::get(
                decoded.format(), display.width, display.height,
                Pixel::RGB24,     display.width, display.height,
                ScaleFlags::BILINEAR,
            ).map_err(|e| Error::decode(format!("create swscale context: {e}")))?,
        };
        let scaler = self.scaler.insert(scaler);

        let mut rgb = RawFrame::empty();
        scaler.run(decoded, &mut rgb)
            .map_err(|e| Error::decode(format!("scale video frame: {e}")))?;

        let mut frame = VideoFrame {
            data:            rgb.data(0).to_vec(),
            width:           display.width,
            height:          display.height,
            stride:          rgb.stride(0),
            bytes_per_pixel: BYTES_PER_PIXEL,
            index:           self.next_index,
            timestamp:       (secs - self.trim.start).max(0.0),
            color:           self.color.metadata(decoded.format()),
        };
        frame.normalize_stride()?;
        self.next_index += 1;
        Ok(frame)
    }
}

impl Iterator for VideoSource {
    type Item = Result<VideoFrame>;

    /// Stops after the first error; the error itself is yielded once so the
    /// session can record it at the failing index.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(Some(f)) => Some(Ok(f)),
            Ok(None) => {
                debug!("decode: end of stream after {} frames", self.next_index);
                self.done = true;
                None
            }
            Err(e) => {
                warn!("decode: stopping at frame {}: {e}", self.next_index);
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
