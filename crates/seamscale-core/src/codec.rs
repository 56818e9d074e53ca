// crates/seamscale-core/src/codec.rs
//
// Narrow interfaces to the external encoders and container writer.
//
// The synchronizer only ever talks to these traits, so the FFmpeg-backed
// implementations in seamscale-media and the in-memory ones in `memory` are
// interchangeable.
//
// Encoders take frames by value: once a frame is handed over it belongs to the
// encoder and is released when encoding is done.

use crate::error::Result;
use crate::resegment::AudioChunk;
use crate::types::VideoFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Rational number for time bases and frame rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self { Self { num, den } }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 { 0.0 } else { self.num as f64 / self.den as f64 }
    }

    /// Seconds represented by `ticks` units of this time base.
    pub fn ticks_to_secs(&self, ticks: i64) -> f64 {
        if self.den == 0 { 0.0 } else { ticks as f64 * self.num as f64 / self.den as f64 }
    }

    pub fn invert(&self) -> Self { Self::new(self.den, self.num) }
}

/// One encoded packet, timestamped in its encoder's time base.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedPacket {
    pub stream:    StreamKind,
    pub data:      Vec<u8>,
    pub pts:       Option<i64>,
    pub dts:       Option<i64>,
    pub duration:  i64,
    pub time_base: Rational,
    pub keyframe:  bool,
}

impl EncodedPacket {
    pub fn pts_secs(&self) -> Option<f64> {
        self.pts.map(|p| self.time_base.ticks_to_secs(p))
    }
}

/// Video encoder. `encode` may return no packets (lookahead) or
/// `Err(NeedsMoreInput)`; neither is a failure.
pub trait VideoEncoder {
    fn encode(&mut self, frame: VideoFrame) -> Result<Vec<EncodedPacket>>;
    /// End of stream: drain everything the encoder is still holding.
    fn flush(&mut self) -> Result<Vec<EncodedPacket>>;
}

/// Audio encoder fed with fixed-size chunks (a final short chunk is allowed).
pub trait AudioEncoder {
    fn frame_size(&self) -> usize;
    fn sample_rate(&self) -> u32;
    fn encode(&mut self, chunk: AudioChunk) -> Result<Vec<EncodedPacket>>;
    fn flush(&mut self) -> Result<Vec<EncodedPacket>>;
}

/// Single-writer container sink: header, packets, trailer.
pub trait ContainerWriter {
    fn write_header(&mut self) -> Result<()>;
    fn write_packet(&mut self, packet: EncodedPacket) -> Result<()>;
    fn write_trailer(&mut self) -> Result<()>;
}

impl<T: VideoEncoder + ?Sized> VideoEncoder for Box<T> {
    fn encode(&mut self, frame: VideoFrame) -> Result<Vec<EncodedPacket>> { (**self).encode(frame) }
    fn flush(&mut self) -> Result<Vec<EncodedPacket>> { (**self).flush() }
}

impl<T: AudioEncoder + ?Sized> AudioEncoder for Box<T> {
    fn frame_size(&self) -> usize { (**self).frame_size() }
    fn sample_rate(&self) -> u32 { (**self).sample_rate() }
    fn encode(&mut self, chunk: AudioChunk) -> Result<Vec<EncodedPacket>> { (**self).encode(chunk) }
    fn flush(&mut self) -> Result<Vec<EncodedPacket>> { (**self).flush() }
}

impl<T: ContainerWriter + ?Sized> ContainerWriter for Box<T> {
    fn write_header(&mut self) -> Result<()> { (**self).write_header() }
    fn write_packet(&mut self, packet: EncodedPacket) -> Result<()> { (**self).write_packet(packet) }
    fn write_trailer(&mut self) -> Result<()> { (**self).write_trailer() }
}
