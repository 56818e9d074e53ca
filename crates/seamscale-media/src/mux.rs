// crates/seamscale-media/src/mux.rs
//
// FFmpeg container writer behind seamscale-core's `ContainerWriter`.
//
// Build order matters:
//   1. `FfmpegWriter::create`: output context, no streams yet
//   2. open the encoders, passing `global_header()` so they emit extradata
//   3. `add_video` / `add_audio`: streams + codec parameters
//   4. hand the writer to the synchronizer, which writes header, packets and
//      trailer through the trait.
//
// Stream time bases are read back after the header is written: the muxer is
// free to change them, and every packet is rescaled from its encoder's time
// base to whatever the stream ended up with.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::Id as CodecId;
use ffmpeg::format::output as open_output;
use ffmpeg::{Packet, encoder};
use tracing::debug;

use seamscale_core::codec::{ContainerWriter, EncodedPacket, StreamKind};
use seamscale_core::{Error, Result};

use crate::encode::{AacEncoder, H264Encoder, to_ff};

pub struct FfmpegWriter {
    octx:         ffmpeg::format::context::Output,
    path:         PathBuf,
    video_stream: Option<usize>,
    audio_stream: Option<usize>,
}

impl FfmpegWriter {
    /// Open `path` for writing. The container format follows the extension.
    pub fn create(path: &Path) -> Result<Self> {
        let octx = open_output(path)
            .map_err(|e| Error::mux(format!("could not open output '{}': {e}", path.display())))?;
        Ok(Self { octx, path: path.to_path_buf(), video_stream: None, audio_stream: None })
    }

    /// True if the container stores codec extradata globally (MP4, MKV).
    pub fn global_header(&self) -> bool {
        unsafe {
            let fmt = (*self.octx.as_ptr()).oformat;
            !fmt.is_null() && ((*fmt).flags & ffmpeg::ffi::AVFMT_GLOBALHEADER as i32) != 0
        }
    }

    pub fn add_video(&mut self, enc: &H264Encoder) -> Result<()> {
        let idx = self.add_stream(enc.codec_id(), enc.context_ptr(), "video")?;
        if let Some(mut st) = self.octx.stream_mut(idx) {
            st.set_time_base(to_ff(enc.time_base()));
        }
        self.video_stream = Some(idx);
        Ok(())
    }

    pub fn add_audio(&mut self, enc: &AacEncoder) -> Result<()> {
        let idx = self.add_stream(enc.codec_id(), enc.context_ptr(), "audio")?;
        if let Some(mut st) = self.octx.stream_mut(idx) {
            st.set_time_base(to_ff(enc.time_base()));
        }
        self.audio_stream = Some(idx);
        Ok(())
    }

    fn add_stream(
        &mut self,
        id:   CodecId,
        ctx:  *const ffmpeg::ffi::AVCodecContext,
        what: &str,
    ) -> Result<usize> {
        let codec = encoder::find(id)
            .ok_or_else(|| Error::mux(format!("{what} encoder {id:?} not found")))?;
        let idx = self.octx.add_stream(codec)
            .map_err(|e| Error::mux(format!("add {what} stream: {e}")))?
            .index();

        // Copy the opened encoder's parameters into the stream's codecpar so
        // the muxer has resolution, format and codec-private data. The encoder
        // types do not implement AsPtr<AVCodecParameters>, so go through FFI.
        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*self.octx.as_mut_ptr()).streams.add(idx)).codecpar,
                ctx as *mut ffmpeg::ffi::AVCodecContext,
            );
            if ret < 0 {
                return Err(Error::mux(format!("avcodec_parameters_from_context ({what}) failed: {ret}")));
            }
        }
        Ok(idx)
    }

    fn stream_for(&self, kind: StreamKind) -> Result<usize> {
        match kind {
            StreamKind::Video => self.video_stream,
            StreamKind::Audio => self.audio_stream,
        }
        .ok_or_else(|| Error::mux(format!("no {kind:?} stream in '{}'", self.path.display())))
    }
}

impl ContainerWriter for FfmpegWriter {
    fn write_header(&mut self) -> Result<()> {
        let mut opts = ffmpeg::Dictionary::new();
        if self.path.extension().is_some_and(|e| e.eq_ignore_ascii_case("mp4")) {
            // moov atom up front so the file is playable while downloading.
            opts.set("movflags", "faststart");
        }
        self.octx.write_header_with(opts)
            .map_err(|e| Error::mux(format!("write output header: {e}")))?;
        debug!("mux: header written → {}", self.path.display());
        Ok(())
    }

    fn write_packet(&mut self, p: EncodedPacket) -> Result<()> {
        let idx = self.stream_for(p.stream)?;
        let stream_tb = self.octx.stream(idx)
            .map(|s| s.time_base())
            .ok_or_else(|| Error::mux(format!("stream {idx} vanished")))?;

        let mut pkt = Packet::copy(&p.data);
        pkt.set_pts(p.pts);
        // Some encoders leave DTS unset; the muxer needs one.
        pkt.set_dts(p.dts.or(p.pts));
        pkt.set_duration(p.duration);
        if p.keyframe {
            pkt.set_flags(ffmpeg::packet::Flags::KEY);
        }
        pkt.set_stream(idx);
        pkt.rescale_ts(to_ff(p.time_base), stream_tb);
        pkt.write_interleaved(&mut self.octx)
            .map_err(|e| Error::mux(format!("write {:?} packet: {e}", p.stream)))
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.octx.write_trailer()
            .map_err(|e| Error::mux(format!("write trailer: {e}")))?;
        debug!("mux: trailer written → {}", self.path.display());
        Ok(())
    }
}
