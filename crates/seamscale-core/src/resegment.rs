// crates/seamscale-core/src/resegment.rs
//
// Audio resegmentation: variable-size source frames → fixed-size codec frames.
//
// AAC (and most audio codecs) require exactly `frame_size` samples per input
// frame, typically 1024. Decoded audio arrives in arbitrary chunk sizes, so
// samples are appended to a per-channel FIFO and full chunks are popped off
// the front. Nothing is dropped: the tail shorter than `frame_size` comes out
// of `finish` as a final short chunk (the encoder pads it).
//
// Timestamps:
//   Chunk k starts at `start + k * frame_size / sample_rate`, computed from
//   the running sample count. Source frame timestamps are only used for the
//   very first chunk. Propagating them for interior chunks lets rounding
//   drift accumulate over thousands of frames.

use crate::error::{Error, Result};
use crate::types::AudioFrame;

/// One codec-sized chunk of planar float audio.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    pub planes:        Vec<Vec<f32>>,
    /// Samples (per channel) emitted before this chunk.
    pub sample_offset: u64,
    /// Presentation time in seconds.
    pub timestamp:     f64,
}

impl AudioChunk {
    pub fn samples(&self) -> usize {
        self.planes.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channels(&self) -> usize { self.planes.len() }
}

/// Streaming resegmenter. Push source frames in timestamp order; collect the
/// chunks each push produces; call `finish` for the remainder.
pub struct Resegmenter {
    frame_size:  usize,
    sample_rate: u32,
    start:       Option<f64>,
    fifo:        Vec<Vec<f32>>,
    emitted:     u64,
}

impl Resegmenter {
    pub fn new(frame_size: usize, sample_rate: u32) -> Result<Self> {
        if frame_size == 0 {
            return Err(Error::InvalidAudio("codec frame size must be non-zero".into()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidAudio("sample rate must be non-zero".into()));
        }
        Ok(Self { frame_size, sample_rate, start: None, fifo: Vec::new(), emitted: 0 })
    }

    /// Samples per channel currently waiting for a full chunk.
    pub fn buffered(&self) -> usize {
        self.fifo.first().map(Vec::len).unwrap_or(0)
    }

    pub fn push(&mut self, frame: AudioFrame) -> Result<Vec<AudioChunk>> {
        frame.validate()?;

        if self.start.is_none() {
            self.start = Some(frame.timestamp);
            self.fifo  = vec![Vec::new(); frame.channels()];
        } else if frame.channels() != self.fifo.len() {
            return Err(Error::InvalidAudio(format!(
                "channel count changed from {} to {}", self.fifo.len(), frame.channels(),
            )));
        }

        for (dst, src) in self.fifo.iter_mut().zip(frame.planes) {
            dst.extend_from_slice(&src);
        }

        let mut out = Vec::with_capacity(self.buffered() / self.frame_size);
        while self.buffered() >= self.frame_size {
            out.push(self.pop(self.frame_size));
        }
        Ok(out)
    }

    /// Emit whatever is left as a final short chunk.
    pub fn finish(mut self) -> Option<AudioChunk> {
        let n = self.buffered();
        if n == 0 { None } else { Some(self.pop(n)) }
    }

    fn pop(&mut self, n: usize) -> AudioChunk {
        let planes = self.fifo.iter_mut()
            .map(|p| p.drain(..n).collect())
            .collect();
        let chunk = AudioChunk {
            planes,
            sample_offset: self.emitted,
            timestamp:     self.timestamp_at(self.emitted),
        };
        self.emitted += n as u64;
        chunk
    }

    fn timestamp_at(&self, sample_offset: u64) -> f64 {
        self.start.unwrap_or(0.0) + sample_offset as f64 / self.sample_rate as f64
    }
}

/// Resegment a whole pre-extracted audio track.
pub fn resegment(
    frames:      impl IntoIterator<Item = AudioFrame>,
    frame_size:  usize,
    sample_rate: u32,
) -> Result<Vec<AudioChunk>> {
    let mut rs  = Resegmenter::new(frame_size, sample_rate)?;
    let mut out = Vec::new();
    for f in frames {
        out.extend(rs.push(f)?);
    }
    out.extend(rs.finish());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_frame(start: usize, len: usize, ts: f64) -> AudioFrame {
        let l: Vec<f32> = (start..start + len).map(|i| i as f32).collect();
        let r: Vec<f32> = l.iter().map(|v| -v).collect();
        AudioFrame::new(vec![l, r], ts).unwrap()
    }

    #[test]
    fn mixed_sizes_cover_every_sample_once() {
        let rate  = 48_000;
        let start = 0.25;
        let frames = vec![
            ramp_frame(0, 2048, start),
            ramp_frame(2048, 2048, 99.0), // bogus source timestamp must be ignored
            ramp_frame(4096, 500, 99.0),
        ];
        let chunks = resegment(frames, 1024, rate).unwrap();

        assert_eq!(chunks.len(), 5);
        let flat: Vec<f32> = chunks.iter().flat_map(|c| c.planes[0].iter().copied()).collect();
        assert_eq!(flat.len(), 4596);
        assert!(flat.iter().enumerate().all(|(i, v)| *v == i as f32));
        assert!(chunks.iter().all(|c| c.planes[1][0] == -c.planes[0][0]));

        for (k, c) in chunks.iter().enumerate().take(4) {
            assert_eq!(c.samples(), 1024);
            assert_eq!(c.timestamp, start + (k * 1024) as f64 / rate as f64);
        }
        assert_eq!(chunks[4].samples(), 500);
    }

    #[test]
    fn small_frames_are_concatenated() {
        let mut rs = Resegmenter::new(4, 8).unwrap();
        assert!(rs.push(ramp_frame(0, 3, 0.0)).unwrap().is_empty());
        let out = rs.push(ramp_frame(3, 3, 0.0)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].planes[0], vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(rs.buffered(), 2);
        let tail = rs.finish().unwrap();
        assert_eq!(tail.sample_offset, 4);
        assert_eq!(tail.timestamp, 0.5);
    }

    #[test]
    fn channel_change_rejected() {
        let mut rs = Resegmenter::new(4, 8).unwrap();
        rs.push(ramp_frame(0, 2, 0.0)).unwrap();
        let mono = AudioFrame::new(vec![vec![0.0; 2]], 0.0).unwrap();
        assert!(matches!(rs.push(mono), Err(Error::InvalidAudio(_))));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(resegment(Vec::new(), 1024, 44_100).unwrap().is_empty());
    }
}
