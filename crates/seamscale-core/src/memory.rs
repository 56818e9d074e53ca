// crates/seamscale-core/src/memory.rs
//
// In-memory encoders and container writer. They emit one packet per input
// (optionally holding frames back to imitate encoder lookahead) and record
// every write, which makes the synchronizer's packet order observable.

use crate::codec::{AudioEncoder, ContainerWriter, EncodedPacket, Rational, StreamKind, VideoEncoder};
use crate::error::{Error, Result};
use crate::resegment::AudioChunk;
use crate::types::VideoFrame;

/// What a `MemoryWriter` saw, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum WriterEvent {
    Header,
    Packet { stream: StreamKind, secs: f64 },
    Trailer,
}

#[derive(Debug, Default)]
pub struct MemoryWriter {
    pub events: Vec<WriterEvent>,
    /// Fail the n-th packet write (0-based), to exercise mux errors.
    pub fail_at: Option<usize>,
    /// Make `write_trailer` fail.
    pub fail_trailer: bool,
    pub trailer_calls: usize,
    written: usize,
}

impl MemoryWriter {
    pub fn new() -> Self { Self::default() }

    pub fn packets(&self) -> impl Iterator<Item = (StreamKind, f64)> + '_ {
        self.events.iter().filter_map(|e| match e {
            WriterEvent::Packet { stream, secs } => Some((*stream, *secs)),
            _ => None,
        })
    }

    pub fn has_header(&self) -> bool  { self.events.first() == Some(&WriterEvent::Header) }
    pub fn has_trailer(&self) -> bool { self.events.last() == Some(&WriterEvent::Trailer) }
}

impl ContainerWriter for MemoryWriter {
    fn write_header(&mut self) -> Result<()> {
        self.events.push(WriterEvent::Header);
        Ok(())
    }

    fn write_packet(&mut self, packet: EncodedPacket) -> Result<()> {
        if self.fail_at == Some(self.written) {
            return Err(Error::mux("injected write failure"));
        }
        self.written += 1;
        self.events.push(WriterEvent::Packet {
            stream: packet.stream,
            secs:   packet.pts_secs().unwrap_or(f64::NAN),
        });
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.trailer_calls += 1;
        if self.fail_trailer {
            return Err(Error::mux("injected trailer failure"));
        }
        self.events.push(WriterEvent::Trailer);
        Ok(())
    }
}

// ── Encoders ──────────────────────────────────────────────────────────────────

/// Emits one packet per frame with pts = frame count in 1/fps. With
/// `delay > 0` the first `delay` frames report `NeedsMoreInput` and are
/// released on later calls or at flush.
pub struct MemoryVideoEncoder {
    time_base: Rational,
    delay:     usize,
    held:      std::collections::VecDeque<i64>,
    next_pts:  i64,
    /// Fail hard on the n-th frame (0-based).
    pub fail_at: Option<i64>,
    pub flushes: usize,
}

impl MemoryVideoEncoder {
    pub fn new(fps: Rational) -> Self {
        Self { time_base: fps.invert(), delay: 0, held: Default::default(), next_pts: 0, fail_at: None, flushes: 0 }
    }

    pub fn with_delay(mut self, delay: usize) -> Self {
        self.delay = delay;
        self
    }

    fn packet(&self, pts: i64) -> EncodedPacket {
        EncodedPacket {
            stream:    StreamKind::Video,
            data:      Vec::new(),
            pts:       Some(pts),
            dts:       Some(pts),
            duration:  1,
            time_base: self.time_base,
            keyframe:  pts == 0,
        }
    }
}

impl VideoEncoder for MemoryVideoEncoder {
    fn encode(&mut self, frame: VideoFrame) -> Result<Vec<EncodedPacket>> {
        if self.fail_at == Some(self.next_pts) {
            return Err(Error::encode(format!("injected failure at frame {}", frame.index)));
        }
        self.held.push_back(self.next_pts);
        self.next_pts += 1;
        if self.held.len() <= self.delay {
            return Err(Error::NeedsMoreInput);
        }
        let pts = self.held.pop_front().unwrap_or_default();
        Ok(vec![self.packet(pts)])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>> {
        self.flushes += 1;
        let held: Vec<i64> = self.held.drain(..).collect();
        Ok(held.into_iter().map(|pts| self.packet(pts)).collect())
    }
}

/// Emits one packet per chunk with pts = sample offset in 1/sample_rate.
pub struct MemoryAudioEncoder {
    frame_size:  usize,
    sample_rate: u32,
}

impl MemoryAudioEncoder {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        Self { frame_size, sample_rate }
    }
}

impl AudioEncoder for MemoryAudioEncoder {
    fn frame_size(&self) -> usize { self.frame_size }
    fn sample_rate(&self) -> u32 { self.sample_rate }

    fn encode(&mut self, chunk: AudioChunk) -> Result<Vec<EncodedPacket>> {
        // Report the chunk's own timestamp so tests can see the exact value.
        let tb = Rational::new(1, 1_000_000);
        Ok(vec![EncodedPacket {
            stream:    StreamKind::Audio,
            data:      Vec::new(),
            pts:       Some((chunk.timestamp * 1_000_000.0).round() as i64),
            dts:       None,
            duration:  chunk.samples() as i64,
            time_base: tb,
            keyframe:  true,
        }])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>> { Ok(Vec::new()) }
}
