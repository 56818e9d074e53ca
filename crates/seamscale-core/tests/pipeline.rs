// crates/seamscale-core/tests/pipeline.rs
//
// Executor → reorder buffer → synchronizer, wired together the same way the
// per-file video session does it, with in-memory encoders standing in for
// FFmpeg.

use std::thread;
use std::time::Duration;

use seamscale_core::codec::{AudioEncoder, EncodedPacket, Rational, StreamKind, VideoEncoder};
use seamscale_core::config::ResizeRequest;
use seamscale_core::interpolate::{ScalePlan, SizeSpec};
use seamscale_core::memory::{MemoryAudioEncoder, MemoryWriter};
use seamscale_core::progress::NoProgress;
use seamscale_core::resegment::resegment;
use seamscale_core::types::{AudioFrame, Dimensions, VideoFrame, WorkItem};
use seamscale_core::{CancelToken, Completion, Executor, MuxDriver, MuxReport, Outcome, ReorderBuffer, Result};

const FPS: Rational = Rational::new(10, 1);
const RATE: u32 = 8_000;
const CODEC_FRAME: usize = 1024;
const ORIG: Dimensions = Dimensions::new(40, 20);
const POLL: Duration = Duration::from_millis(2);

/// Records the origin index and size of every frame it is handed.
struct RecordingEncoder {
    seen:  Vec<(usize, Dimensions)>,
    inner: seamscale_core::memory::MemoryVideoEncoder,
}

impl RecordingEncoder {
    fn new() -> Self {
        Self { seen: Vec::new(), inner: seamscale_core::memory::MemoryVideoEncoder::new(FPS) }
    }
}

impl VideoEncoder for &mut RecordingEncoder {
    fn encode(&mut self, frame: VideoFrame) -> Result<Vec<EncodedPacket>> {
        self.seen.push((frame.index, frame.dimensions()));
        self.inner.encode(frame)
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>> { self.inner.flush() }
}

fn source_frames(n: usize) -> impl Iterator<Item = WorkItem<VideoFrame>> {
    (0..n).map(|i| {
        let data  = vec![i as u8; ORIG.width as usize * ORIG.height as usize * 3];
        let frame = VideoFrame::packed(data, ORIG.width, ORIG.height, 3, i, i as f64 / FPS.as_f64())
            .expect("valid frame");
        WorkItem::new(i, format!("frame {i}"), frame)
    })
}

/// 3.2 s of stereo audio delivered in uneven 1000-sample frames.
fn audio_track() -> Vec<AudioFrame> {
    let total = (RATE as usize * 32) / 10;
    (0..total).step_by(1000)
        .map(|start| {
            let len = 1000.min(total - start);
            let ts  = start as f64 / RATE as f64;
            AudioFrame::new(vec![vec![0.1; len], vec![-0.1; len]], ts).expect("valid audio")
        })
        .collect()
}

struct Run {
    report:  Result<MuxReport>,
    writer:  Option<MemoryWriter>,
    encoded: Vec<(usize, Dimensions)>,
}

fn run_session(n: usize, threads: usize, capacity: usize, plan: ScalePlan, cancel_at: Option<usize>) -> Run {
    let exec   = Executor::new(threads).expect("threads > 0");
    let buffer = ReorderBuffer::<Result<VideoFrame>>::new(capacity);
    let cancel = CancelToken::new();
    let chunks = resegment(audio_track(), CODEC_FRAME, RATE).expect("resegment");
    let mut recorder = RecordingEncoder::new();

    let report = thread::scope(|s| {
        let buffer = &buffer;
        let cancel = &cancel;
        let recorder = &mut recorder;

        let mux = s.spawn(move || {
            let driver = MuxDriver::new(
                recorder,
                Some(MemoryAudioEncoder::new(CODEC_FRAME, RATE)),
                chunks,
                MemoryWriter::new(),
                FPS,
            );
            let r = driver.run(buffer.drain_ordered(POLL, cancel).map(|r| r.and_then(|f| f)), cancel);
            buffer.complete_early();
            r
        });

        let stats = exec.execute(
            source_frames(n),
            n,
            |frame: VideoFrame, c: &CancelToken| {
                if cancel_at == Some(frame.index) {
                    c.cancel();
                }
                // Uneven work so completions arrive out of order.
                thread::sleep(Duration::from_millis((frame.index * 7 % 5) as u64));
                let target = plan.at(frame.index);
                let pixels = vec![0u8; target.width as usize * target.height as usize * 3];
                frame.with_pixels(pixels, target.width, target.height)
            },
            &NoProgress,
            cancel,
            |c: Completion<VideoFrame>| {
                let value = match c.outcome {
                    Outcome::Done(f)   => Ok(f),
                    Outcome::Failed(e) => Err(e),
                    Outcome::Cancelled => Err(seamscale_core::Error::Cancelled),
                };
                buffer.add(c.index, value);
            },
        );
        buffer.declare_total(stats.dispatched);

        mux.join().expect("mux thread panicked")
    });

    match report {
        Ok((report, writer)) => Run { report: Ok(report), writer: Some(writer), encoded: recorder.seen },
        Err(e)               => Run { report: Err(e), writer: None, encoded: recorder.seen },
    }
}

#[test]
fn no_frame_lost_or_reordered_at_any_concurrency() {
    let n    = 30;
    let plan = ScalePlan::new(&ResizeRequest::Fixed(SizeSpec::percent(50.0)), ORIG, n);

    for threads in 1..=6 {
        let run = run_session(n, threads, threads * 2, plan, None);
        let report = run.report.expect("session succeeds");

        let indices: Vec<usize> = run.encoded.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..n).collect::<Vec<_>>(), "threads = {threads}");
        assert!(run.encoded.iter().all(|(_, d)| *d == Dimensions::new(20, 10)));
        assert_eq!(report.video_frames, n as u64);
        assert!(!report.cancelled);
    }
}

#[test]
fn one_worker_per_frame_keeps_order() {
    let n    = 12;
    let plan = ScalePlan::new(&ResizeRequest::Fixed(SizeSpec::percent(50.0)), ORIG, n);

    for capacity in [1, n] {
        let run = run_session(n, n, capacity, plan, None);
        let report = run.report.expect("session succeeds");

        let indices: Vec<usize> = run.encoded.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..n).collect::<Vec<_>>(), "capacity = {capacity}");
        assert_eq!(report.video_frames, n as u64);
    }
}

#[test]
fn gradual_plan_reaches_each_frame_in_order() {
    let n    = 11;
    let plan = ScalePlan::new(
        &ResizeRequest::Gradual { start: SizeSpec::percent(100.0), end: SizeSpec::percent(50.0) },
        ORIG,
        n,
    );
    let run = run_session(n, 4, 4, plan, None);
    run.report.expect("session succeeds");

    assert_eq!(run.encoded.first().map(|e| e.1), Some(ORIG));
    assert_eq!(run.encoded.last().map(|e| e.1), Some(Dimensions::new(20, 10)));
    let widths: Vec<u32> = run.encoded.iter().map(|(_, d)| d.width).collect();
    assert!(widths.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(plan.output_size(), ORIG);
}

#[test]
fn audio_is_interleaved_against_video_time() {
    let n    = 30;
    let plan = ScalePlan::Fixed(ORIG);
    let run  = run_session(n, 3, 8, plan, None);
    let report = run.report.expect("session succeeds");
    let writer = run.writer.expect("writer returned");

    // 25600 samples / 1024 = 25 full chunks; the last one lands after the
    // final frame and comes out during flush.
    assert_eq!(report.audio_chunks, 25);
    assert_eq!(report.residual_audio, 1);

    let fps = FPS.as_f64();
    let mut videos_before = 0usize;
    let mut audio_seen    = 0usize;
    for (stream, _) in writer.packets() {
        match stream {
            StreamKind::Video => videos_before += 1,
            StreamKind::Audio => {
                let ts       = (audio_seen * CODEC_FRAME) as f64 / RATE as f64;
                let expected = ((ts * fps).ceil() as usize).max(1).min(n);
                assert_eq!(videos_before, expected, "audio chunk {audio_seen} at {ts}s");
                audio_seen += 1;
            }
        }
    }
    assert_eq!(audio_seen, 25);
    assert!(writer.has_header() && writer.has_trailer());
}

#[test]
fn cancellation_leaves_a_finalized_prefix() {
    let n    = 60;
    let plan = ScalePlan::Fixed(ORIG);
    let run  = run_session(n, 4, 4, plan, Some(10));
    let report = run.report.expect("cancel is not an error");
    let writer = run.writer.expect("writer returned");

    assert!(report.cancelled);
    assert!(report.video_frames < n as u64);

    let indices: Vec<usize> = run.encoded.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, (0..indices.len()).collect::<Vec<_>>());

    let video_end = report.video_frames as f64 / FPS.as_f64();
    let audio_max = writer.packets()
        .filter(|(s, _)| *s == StreamKind::Audio)
        .map(|(_, secs)| secs)
        .fold(0.0, f64::max);
    assert!(audio_max <= video_end + 1e-6);
    assert!(writer.has_header() && writer.has_trailer());
}

#[test]
fn audio_encoder_contract_is_respected() {
    let enc = MemoryAudioEncoder::new(CODEC_FRAME, RATE);
    let chunks = resegment(audio_track(), enc.frame_size(), enc.sample_rate()).expect("resegment");
    assert!(chunks.iter().all(|c| c.samples() == CODEC_FRAME));
}
