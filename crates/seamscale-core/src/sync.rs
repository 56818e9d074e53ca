// crates/seamscale-core/src/sync.rs
//
// Stream synchronizer / muxer driver.
//
// Drives one container writer from two independently timed sources: the
// strictly ordered video frame stream coming off the reorder buffer, and the
// pre-extracted, already resegmented audio chunk list.
//
// Interleave rule:
//   After each video frame is encoded and written, video time is
//   `frames_written / fps`. Every pending audio chunk whose timestamp is
//   <= that time is encoded and written before the next video frame; the
//   first chunk past it waits for a later frame.
//
// End of stream:
//   flush the video encoder → write the remaining audio chunks → flush the
//   audio encoder → write the trailer. Audio longer than video is flushed,
//   never dropped, and neither stream is stretched.
//
// Cancellation stops feeding video and still flushes and finalizes, so the
// container holds a valid header and trailer and only what was processed
// before the cancel. Audio past the last written frame is not appended.
//
// This is the only single-threaded stage: container writers need a single
// writer, so every packet goes through `&mut self`.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::codec::{AudioEncoder, ContainerWriter, EncodedPacket, Rational, VideoEncoder};
use crate::error::{Error, Result};
use crate::resegment::AudioChunk;
use crate::types::VideoFrame;

/// Counters returned after the container has been finalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MuxReport {
    pub video_frames:  u64,
    pub audio_chunks:  u64,
    pub packets:       u64,
    /// Chunks still pending after video ended that were written during flush.
    pub residual_audio: u64,
    /// Chunks discarded because the run was cancelled first.
    pub dropped_audio: u64,
    pub cancelled:     bool,
}

/// Placeholder audio encoder type for video-only runs.
pub enum NoAudio {}

impl AudioEncoder for NoAudio {
    fn frame_size(&self) -> usize { match *self {} }
    fn sample_rate(&self) -> u32 { match *self {} }
    fn encode(&mut self, _: AudioChunk) -> Result<Vec<EncodedPacket>> { match *self {} }
    fn flush(&mut self) -> Result<Vec<EncodedPacket>> { match *self {} }
}

pub struct MuxDriver<V, A, W> {
    video:  V,
    audio:  Option<A>,
    writer: W,
    fps:    Rational,
    chunks: VecDeque<AudioChunk>,
    report: MuxReport,
    header_written: bool,
    done: Finalized,
}

/// Finalize steps already attempted. Each runs at most once, even when
/// `finish` fails partway and `salvage` takes over.
#[derive(Clone, Copy, Debug, Default)]
struct Finalized {
    video:   bool,
    audio:   bool,
    trailer: bool,
}

impl<V, W> MuxDriver<V, NoAudio, W>
where
    V: VideoEncoder,
    W: ContainerWriter,
{
    /// Video-only driver.
    pub fn video_only(video: V, writer: W, fps: Rational) -> Self {
        MuxDriver::new(video, None, Vec::new(), writer, fps)
    }
}

impl<V, A, W> MuxDriver<V, A, W>
where
    V: VideoEncoder,
    A: AudioEncoder,
    W: ContainerWriter,
{
    /// `chunks` must already be resegmented to the audio encoder's frame size
    /// and ordered by timestamp. With `audio == None` the chunks are ignored.
    pub fn new(video: V, audio: Option<A>, chunks: Vec<AudioChunk>, writer: W, fps: Rational) -> Self {
        let chunks = if audio.is_some() { chunks.into() } else { VecDeque::new() };
        Self {
            video,
            audio,
            writer,
            fps,
            chunks,
            report: MuxReport::default(),
            header_written: false,
            done: Finalized::default(),
        }
    }

    /// Encode every frame from `frames` in order, interleaving audio, then
    /// flush and finalize. Returns the writer so callers can inspect it.
    ///
    /// On a fatal error the trailer is still attempted before the error is
    /// returned, so whatever was written stays readable.
    pub fn run<I>(mut self, frames: I, cancel: &CancelToken) -> Result<(MuxReport, W)>
    where
        I: IntoIterator<Item = Result<VideoFrame>>,
    {
        self.writer.write_header()?;
        self.header_written = true;

        let pumped = self.pump(frames, cancel);
        self.settle(pumped)?;
        info!(
            "mux: {} video frames, {} audio chunks, {} packets{}",
            self.report.video_frames, self.report.audio_chunks, self.report.packets,
            if self.report.cancelled { " (cancelled)" } else { "" },
        );
        Ok((self.report, self.writer))
    }

    /// Finalize after pumping: the normal close on success, salvage otherwise.
    fn settle(&mut self, pumped: Result<()>) -> Result<()> {
        match pumped {
            Ok(()) => self.finish().map_err(|e| {
                warn!("mux: finalize failed: {e}");
                self.salvage();
                e
            }),
            Err(e) => {
                warn!("mux: aborting after {} frames: {e}", self.report.video_frames);
                self.salvage();
                Err(e)
            }
        }
    }

    fn pump<I>(&mut self, frames: I, cancel: &CancelToken) -> Result<()>
    where
        I: IntoIterator<Item = Result<VideoFrame>>,
    {
        let fps = self.fps.as_f64();
        if fps <= 0.0 {
            return Err(Error::Config(format!("invalid frame rate {}/{}", self.fps.num, self.fps.den)));
        }

        for item in frames {
            if cancel.is_cancelled() {
                self.report.cancelled = true;
                break;
            }
            let frame = match item {
                Ok(f)                  => f,
                Err(Error::Cancelled)  => { self.report.cancelled = true; break; }
                Err(e)                 => return Err(e),
            };

            let packets = encode_or_wait(self.video.encode(frame))?;
            self.write_all(packets)?;
            self.report.video_frames += 1;

            let video_time = self.report.video_frames as f64 / fps;
            self.write_audio_until(video_time)?;
        }
        Ok(())
    }

    fn write_audio_until(&mut self, video_time: f64) -> Result<()> {
        while self.chunks.front().is_some_and(|c| c.timestamp <= video_time) {
            if let Some(chunk) = self.chunks.pop_front() {
                self.encode_chunk(chunk)?;
            }
        }
        Ok(())
    }

    fn encode_chunk(&mut self, chunk: AudioChunk) -> Result<()> {
        let Some(audio) = self.audio.as_mut() else { return Ok(()) };
        let packets = encode_or_wait(audio.encode(chunk))?;
        self.report.audio_chunks += 1;
        self.write_all(packets)
    }

    fn write_all(&mut self, packets: Vec<EncodedPacket>) -> Result<()> {
        for p in packets {
            self.writer.write_packet(p)?;
            self.report.packets += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.done.video = true;
        let packets = self.video.flush()?;
        self.write_all(packets)?;

        if self.report.cancelled {
            self.report.dropped_audio = self.chunks.len() as u64;
            self.chunks.clear();
        } else {
            while let Some(chunk) = self.chunks.pop_front() {
                self.report.residual_audio += 1;
                self.encode_chunk(chunk)?;
            }
        }

        if let Some(audio) = self.audio.as_mut() {
            self.done.audio = true;
            let packets = audio.flush()?;
            self.write_all(packets)?;
        }

        self.done.trailer = true;
        self.writer.write_trailer()
    }

    /// Best effort after a fatal error: drain what the encoders hold and close
    /// the container. Every failure here is logged and swallowed; the
    /// original error is what gets reported.
    fn salvage(&mut self) {
        if !self.header_written {
            return;
        }
        self.chunks.clear();

        if !self.done.video {
            self.done.video = true;
            match self.video.flush() {
                Ok(packets) => {
                    if let Err(e) = self.write_all(packets) { debug!("mux salvage: video drain: {e}"); }
                }
                Err(e) => debug!("mux salvage: video flush: {e}"),
            }
        }
        if !self.done.audio {
            if let Some(audio) = self.audio.as_mut() {
                self.done.audio = true;
                match audio.flush() {
                    Ok(packets) => {
                        if let Err(e) = self.write_all(packets) { debug!("mux salvage: audio drain: {e}"); }
                    }
                    Err(e) => debug!("mux salvage: audio flush: {e}"),
                }
            }
        }
        if self.done.trailer {
            return;
        }
        self.done.trailer = true;
        if let Err(e) = self.writer.write_trailer() {
            warn!("mux salvage: write trailer: {e}");
        }
    }
}

/// `NeedsMoreInput` means "keep feeding"; it yields no packets, not an error.
fn encode_or_wait(r: Result<Vec<EncodedPacket>>) -> Result<Vec<EncodedPacket>> {
    match r {
        Err(Error::NeedsMoreInput) => Ok(Vec::new()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StreamKind;
    use crate::memory::{MemoryAudioEncoder, MemoryVideoEncoder, MemoryWriter, WriterEvent};

    const FPS_1: Rational = Rational::new(1, 1);

    fn frames(n: usize) -> Vec<Result<VideoFrame>> {
        (0..n).map(|i| VideoFrame::packed(vec![0; 3], 1, 1, 3, i, i as f64)).collect()
    }

    fn chunk_at(ts: f64) -> AudioChunk {
        AudioChunk { planes: vec![vec![0.0; 4]], sample_offset: 0, timestamp: ts }
    }

    fn order(w: &MemoryWriter) -> Vec<(StreamKind, f64)> {
        w.packets().collect()
    }

    #[test]
    fn audio_goes_before_first_later_video_frame() {
        let driver = MuxDriver::new(
            MemoryVideoEncoder::new(FPS_1),
            Some(MemoryAudioEncoder::new(4, 8)),
            vec![chunk_at(0.5), chunk_at(1.5), chunk_at(2.5)],
            MemoryWriter::new(),
            FPS_1,
        );
        let (report, w) = driver.run(frames(4), &CancelToken::new()).unwrap();

        use StreamKind::{Audio, Video};
        assert_eq!(order(&w), vec![
            (Video, 0.0), (Audio, 0.5),
            (Video, 1.0), (Audio, 1.5),
            (Video, 2.0), (Audio, 2.5),
            (Video, 3.0),
        ]);
        assert_eq!(report.video_frames, 4);
        assert_eq!(report.audio_chunks, 3);
        assert_eq!(report.residual_audio, 0);
        assert!(w.has_header() && w.has_trailer());
    }

    #[test]
    fn video_only_keeps_order() {
        let driver = MuxDriver::video_only(MemoryVideoEncoder::new(FPS_1), MemoryWriter::new(), FPS_1);
        let (report, w) = driver.run(frames(3), &CancelToken::new()).unwrap();
        let secs: Vec<f64> = w.packets().map(|(_, s)| s).collect();
        assert_eq!(secs, vec![0.0, 1.0, 2.0]);
        assert_eq!(report.audio_chunks, 0);
    }

    #[test]
    fn longer_audio_is_flushed_after_video() {
        let driver = MuxDriver::new(
            MemoryVideoEncoder::new(FPS_1),
            Some(MemoryAudioEncoder::new(4, 8)),
            vec![chunk_at(0.0), chunk_at(5.0), chunk_at(6.0)],
            MemoryWriter::new(),
            FPS_1,
        );
        let (report, w) = driver.run(frames(2), &CancelToken::new()).unwrap();
        assert_eq!(report.residual_audio, 2);
        let tail: Vec<_> = order(&w).into_iter().rev().take(2).collect();
        assert!(tail.iter().all(|(s, _)| *s == StreamKind::Audio));
    }

    #[test]
    fn lookahead_encoder_is_drained_at_flush() {
        let driver = MuxDriver::video_only(
            MemoryVideoEncoder::new(FPS_1).with_delay(2),
            MemoryWriter::new(),
            FPS_1,
        );
        let (report, w) = driver.run(frames(5), &CancelToken::new()).unwrap();
        assert_eq!(report.video_frames, 5);
        assert_eq!(w.packets().count(), 5);
    }

    #[test]
    fn cancel_still_finalizes() {
        let cancel = CancelToken::new();
        let c2     = cancel.clone();
        let src = frames(10).into_iter().enumerate().map(move |(i, f)| {
            if i == 3 { c2.cancel(); }
            f
        });
        let driver = MuxDriver::new(
            MemoryVideoEncoder::new(FPS_1),
            Some(MemoryAudioEncoder::new(4, 8)),
            (0..10).map(|i| chunk_at(i as f64 + 0.5)).collect(),
            MemoryWriter::new(),
            FPS_1,
        );
        let (report, w) = driver.run(src, &cancel).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.video_frames, 3);
        assert!(report.dropped_audio > 0);
        assert!(w.has_header() && w.has_trailer());
        assert!(w.packets().all(|(_, s)| s < 3.0));
    }

    #[test]
    fn frame_source_error_is_fatal() {
        let mut src = frames(4);
        src[2] = Err(Error::transform("carve failed"));
        let driver = MuxDriver::video_only(MemoryVideoEncoder::new(FPS_1), MemoryWriter::new(), FPS_1);
        let err = driver.run(src, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }

    #[test]
    fn writer_failure_is_fatal() {
        let mut writer = MemoryWriter::new();
        writer.fail_at = Some(1);
        let driver = MuxDriver::video_only(MemoryVideoEncoder::new(FPS_1), writer, FPS_1);
        let err = driver.run(frames(3), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::Mux(_)));
    }

    #[test]
    fn salvage_writes_trailer() {
        let mut enc = MemoryVideoEncoder::new(FPS_1);
        enc.fail_at = Some(2);
        let mut driver = MuxDriver::video_only(enc, MemoryWriter::new(), FPS_1);
        driver.writer.write_header().unwrap();
        driver.header_written = true;
        assert!(driver.pump(frames(4), &CancelToken::new()).is_err());
        driver.salvage();
        assert_eq!(driver.writer.events.last(), Some(&WriterEvent::Trailer));
        assert_eq!(driver.report.video_frames, 2);
    }

    #[test]
    fn failed_trailer_is_not_retried() {
        let mut writer = MemoryWriter::new();
        writer.fail_trailer = true;
        let mut driver = MuxDriver::video_only(MemoryVideoEncoder::new(FPS_1), writer, FPS_1);
        driver.writer.write_header().unwrap();
        driver.header_written = true;

        let pumped = driver.pump(frames(3), &CancelToken::new());
        let err = driver.settle(pumped).unwrap_err();

        assert!(matches!(err, Error::Mux(_)));
        assert_eq!(driver.writer.trailer_calls, 1);
        assert_eq!(driver.video.flushes, 1);
    }

    #[test]
    fn salvage_after_encode_error_flushes_once() {
        let mut enc = MemoryVideoEncoder::new(FPS_1);
        enc.fail_at = Some(1);
        let mut driver = MuxDriver::new(
            enc,
            Some(MemoryAudioEncoder::new(4, 8)),
            vec![chunk_at(0.5)],
            MemoryWriter::new(),
            FPS_1,
        );
        driver.writer.write_header().unwrap();
        driver.header_written = true;

        let pumped = driver.pump(frames(3), &CancelToken::new());
        assert!(driver.settle(pumped).is_err());
        driver.salvage();

        assert_eq!(driver.video.flushes, 1);
        assert_eq!(driver.writer.trailer_calls, 1);
        assert!(driver.writer.has_trailer());
    }
}
