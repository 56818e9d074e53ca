// crates/seamscale-media/src/video.rs
//
// One video file, end to end:
//
//   decode (this thread) ──► executor workers (liquid rescale, out of order)
//                                   │
//                                   ▼
//                           ReorderBuffer (bounded)
//                                   │ in order
//                                   ▼
//                 mux thread: H.264 + AAC encoders, MuxDriver, container
//
// Audio is extracted and resampled up front; it is small next to the decoded
// video and the driver needs it ahead of the frames it interleaves against.
//
// Encoders and the container are created on the mux thread and never leave
// it. The decoder stays on the dispatching thread.
//
// Failure handling: a frame that fails to transform aborts the file, since a
// hole in the video stream would desync the audio. The mux thread always
// completes the buffer on exit (a drop guard, so a panic counts too), and on
// error or panic also cancels the session token, so workers blocked on a full
// buffer and the dispatch loop both stop. The
// container is still finalized with whatever was written.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};

use seamscale_core::codec::{AudioEncoder, Rational};
use seamscale_core::config::{PipelineConfig, ResizeRequest, Trim};
use seamscale_core::interpolate::ScalePlan;
use seamscale_core::progress::ProgressSink;
use seamscale_core::resegment::resegment;
use seamscale_core::types::{Dimensions, VideoFrame, WorkItem};
use seamscale_core::{
    CancelToken, Completion, Error, Executor, ItemOutput, MuxDriver, MuxReport, Outcome, ReorderBuffer,
    Result,
};

use crate::audio::{AudioTrack, extract_audio};
use crate::decode::VideoSource;
use crate::encode::{AacEncoder, H264Encoder, VideoSettings};
use crate::mux::FfmpegWriter;
use crate::probe::probe;
use crate::transform::LiquidRescale;

#[derive(Clone, Debug)]
pub struct VideoJob {
    pub input:   PathBuf,
    pub output:  PathBuf,
    pub request: ResizeRequest,
    pub trim:    Trim,
}

#[derive(Clone, Debug)]
pub struct VideoReport {
    pub output:          PathBuf,
    pub output_size:     Dimensions,
    pub frames:          u64,
    pub audio_chunks:    u64,
    /// Frames that fell back to a plain resize.
    pub fallback_frames: usize,
    /// Audio chunks past the last written frame, dropped on cancel.
    pub dropped_audio:   u64,
    pub cancelled:       bool,
    pub elapsed:         Duration,
    pub messages:        Vec<String>,
}

impl VideoReport {
    pub fn into_item_output(self) -> ItemOutput {
        ItemOutput { output: Some(self.output), messages: self.messages }
    }
}

#[derive(Default)]
struct Fallbacks {
    count:  usize,
    reason: Option<String>,
}

pub fn process_video(
    job:      &VideoJob,
    config:   &PipelineConfig,
    rescale:  &LiquidRescale,
    progress: &dyn ProgressSink,
    cancel:   &CancelToken,
) -> Result<VideoReport> {
    let _span   = info_span!("video", path = %job.input.display()).entered();
    let started = Instant::now();
    let info    = probe(&job.input)?;
    let total   = info.estimated_frames(&job.trim);
    let plan    = ScalePlan::new(&job.request, info.dimensions, total);

    let mut source = VideoSource::open(&job.input, job.trim, info.fps.as_f64())?;
    let settings   = VideoSettings::new(plan.output_size(), info.fps, config).with_color(source.color());

    info!(
        "video: {} {} @ {:.3} fps, ~{total} frames → {}",
        job.input.display(), info.dimensions, info.fps.as_f64(), settings.size,
    );

    let mut messages = Vec::new();
    let audio = if info.has_audio {
        match extract_audio(&job.input, &job.trim, cancel) {
            Ok(track) => track,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!("video: {}: audio dropped: {e}", job.input.display());
                messages.push(format!("audio could not be read and was dropped: {e}"));
                None
            }
        }
    } else {
        None
    };

    let exec      = Executor::from_config(config)?;
    let session   = cancel.child();
    let buffer    = ReorderBuffer::<Result<VideoFrame>>::new(config.max_pending_frames);
    let fallbacks = Mutex::new(Fallbacks::default());
    let poll      = Duration::from_millis(config.poll_interval_ms);

    let mux_result: Result<MuxReport> = thread::scope(|s| {
        let buffer   = &buffer;
        let session  = &session;
        let settings = &settings;

        let mux = s.spawn(move || {
            let mut exit = MuxExit { buffer, session, failed: true };
            let frames = buffer.drain_ordered(poll, session).map(|r| r.and_then(|f| f));
            let r = mux_session(&job.output, settings, audio, config, frames, session);
            exit.failed = r.is_err();
            r
        });

        let items = (&mut source).enumerate()
            .map(|(i, frame)| WorkItem::new(i, format!("frame {i}"), frame));

        let stats = exec.execute(
            items,
            total,
            |input: Result<VideoFrame>, c: &CancelToken| {
                let frame  = input?;
                let target = plan.at(frame.index);
                let (frame, r) = rescale.rescale_frame(frame, target, c)?;
                if let Some(reason) = r.fallback {
                    let mut fb = fallbacks.lock();
                    fb.count += 1;
                    fb.reason.get_or_insert(reason);
                }
                Ok(frame)
            },
            progress,
            session,
            |c: Completion<VideoFrame>| {
                let value = match c.outcome {
                    Outcome::Done(f)   => Ok(f),
                    Outcome::Failed(e) => Err(e),
                    Outcome::Cancelled => Err(Error::Cancelled),
                };
                buffer.add(c.index, value);
            },
        );
        buffer.declare_total(stats.dispatched);
        debug!("video: dispatched {} frames (cancelled={})", stats.dispatched, stats.cancelled);

        mux.join().map_err(|_| Error::mux("mux thread panicked"))?
    });

    let report = mux_result?;
    let fallbacks = fallbacks.into_inner();
    if let Some(reason) = fallbacks.reason {
        messages.push(format!("{} frame(s) used plain resize: {reason}", fallbacks.count));
    }
    if report.dropped_audio > 0 {
        messages.push(format!("{} audio chunk(s) past the last frame were dropped", report.dropped_audio));
    }
    if report.cancelled {
        messages.push(format!("cancelled after {} frame(s); partial output kept", report.video_frames));
    }

    let elapsed = started.elapsed();
    info!(
        "video: {} done: {} frames, {} audio chunks in {:.1}s (decoded {})",
        job.output.display(), report.video_frames, report.audio_chunks, elapsed.as_secs_f64(), source.emitted(),
    );

    Ok(VideoReport {
        output:          job.output.clone(),
        output_size:     settings.size,
        frames:          report.video_frames,
        audio_chunks:    report.audio_chunks,
        fallback_frames: fallbacks.count,
        dropped_audio:   report.dropped_audio,
        cancelled:       report.cancelled,
        elapsed,
        messages,
    })
}

/// Released when the mux thread exits, by return or by unwind. Completing the
/// buffer wakes producers blocked on a full buffer; cancelling the session
/// stops dispatch.
struct MuxExit<'a, T> {
    buffer:  &'a ReorderBuffer<T>,
    session: &'a CancelToken,
    failed:  bool,
}

impl<T> Drop for MuxExit<'_, T> {
    fn drop(&mut self) {
        self.buffer.complete_early();
        if self.failed || thread::panicking() {
            self.session.cancel();
        }
    }
}

/// Runs on the mux thread: open the container and encoders, then drive
/// `frames` through the synchronizer.
fn mux_session<I>(
    output:   &Path,
    settings: &VideoSettings,
    audio:    Option<AudioTrack>,
    config:   &PipelineConfig,
    frames:   I,
    cancel:   &CancelToken,
) -> Result<MuxReport>
where
    I: Iterator<Item = Result<VideoFrame>>,
{
    let mut writer = FfmpegWriter::create(output)?;
    let global     = writer.global_header();
    let video      = H264Encoder::open(settings, global)?;
    writer.add_video(&video)?;

    let fps: Rational = settings.fps;
    let Some(track) = audio else {
        return MuxDriver::video_only(video, writer, fps).run(frames, cancel).map(|(r, _)| r);
    };

    let aac = match AacEncoder::open(config.audio_bitrate, config.audio_frame_size, global) {
        Ok(aac) => aac,
        Err(e) => {
            warn!("video: {e}; writing video only");
            return MuxDriver::video_only(video, writer, fps).run(frames, cancel).map(|(r, _)| r);
        }
    };
    writer.add_audio(&aac)?;

    debug!("video: {:.2}s of audio in {} source frames", track.duration(), track.frames.len());
    let chunks = resegment(track.frames, aac.frame_size(), aac.sample_rate())?;
    MuxDriver::new(video, Some(aac), chunks, writer, fps)
        .run(frames, cancel)
        .map(|(r, _)| r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicking_consumer_releases_blocked_producer() {
        let buffer  = ReorderBuffer::<u32>::new(1);
        let session = CancelToken::new();

        thread::scope(|s| {
            assert!(buffer.add(1, 1));
            let producer = s.spawn(|| buffer.add(2, 2));

            let consumer = s.spawn(|| {
                let _exit = MuxExit { buffer: &buffer, session: &session, failed: false };
                panic!("encoder blew up");
            });
            assert!(consumer.join().is_err());
            assert!(!producer.join().unwrap());
        });
        assert!(session.is_cancelled());
    }

    #[test]
    fn clean_exit_completes_without_cancelling() {
        let buffer  = ReorderBuffer::<u32>::new(4);
        let session = CancelToken::new();
        drop(MuxExit { buffer: &buffer, session: &session, failed: false });

        assert!(!buffer.add(0, 0));
        assert!(!session.is_cancelled());
    }
}
