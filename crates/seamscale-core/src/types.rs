// crates/seamscale-core/src/types.rs
//
// Plain data that flows between the pipeline stages.
// No ffmpeg, no process handles. Frames are owned heap buffers copied out of
// the native decoder immediately, so they can sit in the reorder buffer or the
// audio resegmenter for as long as needed.
//
// Ownership: every stage takes frames by value. A frame handed to the reorder
// buffer belongs to the buffer; a frame taken out for encoding belongs to the
// synchronizer until the encoder has consumed it, then it is dropped.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Work items and results ────────────────────────────────────────────────────

/// One unit of input plus its position in the original ordering.
///
/// `index` is assigned once by the work item source and never changes; it is
/// the only key used downstream to restore order.
#[derive(Debug)]
pub struct WorkItem<T> {
    pub index: usize,
    /// Short human-readable name for progress reporting (file name, "frame 12").
    pub label: String,
    pub input: T,
}

impl<T> WorkItem<T> {
    pub fn new(index: usize, label: impl Into<String>, input: T) -> Self {
        Self { index, label: label.into(), input }
    }
}

/// Enumerate inputs into work items with zero-based origin indices.
pub fn index_items<T>(
    inputs: impl IntoIterator<Item = T>,
    label:  impl Fn(&T) -> String,
) -> Vec<WorkItem<T>> {
    inputs.into_iter()
        .enumerate()
        .map(|(index, input)| {
            let l = label(&input);
            WorkItem::new(index, l, input)
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Succeeded,
    Failed,
    /// Never started because the batch was cancelled, or stopped by cancellation.
    Cancelled,
}

/// Outcome of one work item, aggregated into the batch summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub index:    usize,
    pub label:    String,
    pub status:   ItemStatus,
    pub error:    Option<String>,
    pub output:   Option<PathBuf>,
    /// Informational notes shown to the operator after the batch, not during it.
    pub messages: Vec<String>,
}

impl ProcessingResult {
    pub fn succeeded(index: usize, label: impl Into<String>, output: Option<PathBuf>) -> Self {
        Self {
            index,
            label: label.into(),
            status: ItemStatus::Succeeded,
            error: None,
            output,
            messages: Vec::new(),
        }
    }

    pub fn failed(index: usize, label: impl Into<String>, error: impl ToString) -> Self {
        Self {
            index,
            label: label.into(),
            status: ItemStatus::Failed,
            error: Some(error.to_string()),
            output: None,
            messages: Vec::new(),
        }
    }

    pub fn cancelled(index: usize, label: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
            status: ItemStatus::Cancelled,
            error: None,
            output: None,
            messages: Vec::new(),
        }
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.messages.push(msg.into());
        self
    }

    pub fn is_success(&self) -> bool { self.status == ItemStatus::Succeeded }
}

// ── Geometry ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width:  u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self { Self { width, height } }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── Video ─────────────────────────────────────────────────────────────────────

/// Source colour description. Carried end-to-end untouched; the core never
/// interprets these values, it only hands them back to the encoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorMetadata {
    pub primaries: Option<i32>,
    pub transfer:  Option<i32>,
    pub matrix:    Option<i32>,
    pub range:     Option<i32>,
    pub bit_depth: Option<u8>,
}

/// A decoded, owned, packed-pixel video frame.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub data:            Vec<u8>,
    pub width:           u32,
    pub height:          u32,
    /// Bytes per row in `data`. May exceed `width * bytes_per_pixel` straight
    /// out of a decoder; call `normalize_stride` before reusing the buffer.
    pub stride:          usize,
    pub bytes_per_pixel: usize,
    pub index:           usize,
    /// Presentation time in seconds, relative to the trim start.
    pub timestamp:       f64,
    pub color:           ColorMetadata,
}

impl VideoFrame {
    /// Build a tightly packed frame (`stride == width * bytes_per_pixel`).
    pub fn packed(
        data:            Vec<u8>,
        width:           u32,
        height:          u32,
        bytes_per_pixel: usize,
        index:           usize,
        timestamp:       f64,
    ) -> Result<Self> {
        let frame = Self {
            data,
            width,
            height,
            stride: width as usize * bytes_per_pixel,
            bytes_per_pixel,
            index,
            timestamp,
            color: ColorMetadata::default(),
        };
        frame.check_len()?;
        Ok(frame)
    }

    pub fn dimensions(&self) -> Dimensions { Dimensions::new(self.width, self.height) }

    pub fn row_bytes(&self) -> usize { self.width as usize * self.bytes_per_pixel }

    pub fn is_packed(&self) -> bool { self.stride == self.row_bytes() }

    fn check_len(&self) -> Result<()> {
        let need = self.stride * self.height as usize;
        if self.data.len() < need {
            return Err(Error::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} at stride {} needs {need}",
                self.data.len(), self.width, self.height, self.stride,
            )));
        }
        Ok(())
    }

    /// Strip row padding so `stride == width * bytes_per_pixel`.
    ///
    /// A stride shorter than one row of pixels is malformed and is rejected
    /// rather than partially copied.
    pub fn normalize_stride(&mut self) -> Result<()> {
        let row = self.row_bytes();
        if self.stride < row {
            return Err(Error::InvalidFrame(format!(
                "stride {} shorter than row width {row}", self.stride,
            )));
        }
        self.check_len()?;
        if self.stride == row {
            self.data.truncate(row * self.height as usize);
            return Ok(());
        }

        let mut packed = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride;
            packed.extend_from_slice(&self.data[start..start + row]);
        }
        self.data   = packed;
        self.stride = row;
        Ok(())
    }

    /// Replace the pixels with a transformed buffer, keeping origin index,
    /// timestamp and colour metadata.
    pub fn with_pixels(self, data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let mut out = Self::packed(data, width, height, self.bytes_per_pixel, self.index, self.timestamp)?;
        out.color = self.color;
        Ok(out)
    }
}

// ── Audio ─────────────────────────────────────────────────────────────────────

/// Planar float audio. Every plane holds the same number of samples.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    pub planes:    Vec<Vec<f32>>,
    /// Presentation time in seconds.
    pub timestamp: f64,
}

impl AudioFrame {
    pub fn new(planes: Vec<Vec<f32>>, timestamp: f64) -> Result<Self> {
        let frame = Self { planes, timestamp };
        frame.validate()?;
        Ok(frame)
    }

    pub fn channels(&self) -> usize { self.planes.len() }

    /// Samples per channel.
    pub fn samples(&self) -> usize {
        self.planes.first().map(Vec::len).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.planes.is_empty() {
            return Err(Error::InvalidAudio("frame has no channels".into()));
        }
        let n = self.samples();
        if let Some((ch, plane)) = self.planes.iter().enumerate().find(|(_, p)| p.len() != n) {
            return Err(Error::InvalidAudio(format!(
                "channel {ch} has {} samples, channel 0 has {n}", plane.len(),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_stride_strips_padding() {
        // 2x2 RGB with 2 bytes of padding per row.
        let data = vec![
            1, 2, 3, 4, 5, 6, 0, 0,
            7, 8, 9, 10, 11, 12, 0, 0,
        ];
        let mut f = VideoFrame {
            data, width: 2, height: 2, stride: 8, bytes_per_pixel: 3,
            index: 0, timestamp: 0.0, color: ColorMetadata::default(),
        };
        f.normalize_stride().unwrap();
        assert!(f.is_packed());
        assert_eq!(f.data, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn short_stride_is_rejected() {
        let mut f = VideoFrame {
            data: vec![0; 16], width: 2, height: 2, stride: 4, bytes_per_pixel: 3,
            index: 0, timestamp: 0.0, color: ColorMetadata::default(),
        };
        assert!(matches!(f.normalize_stride(), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn with_pixels_keeps_identity() {
        let mut f = VideoFrame::packed(vec![0; 12], 2, 2, 3, 7, 0.25).unwrap();
        f.color.primaries = Some(1);
        let g = f.with_pixels(vec![9; 3], 1, 1).unwrap();
        assert_eq!(g.index, 7);
        assert_eq!(g.timestamp, 0.25);
        assert_eq!(g.color.primaries, Some(1));
        assert_eq!(g.dimensions(), Dimensions::new(1, 1));
    }

    #[test]
    fn audio_channel_mismatch_rejected() {
        let r = AudioFrame::new(vec![vec![0.0; 4], vec![0.0; 3]], 0.0);
        assert!(matches!(r, Err(Error::InvalidAudio(_))));
    }

    #[test]
    fn index_items_assigns_origin_order() {
        let items = index_items(vec!["a.png", "b.png"], |s| s.to_string());
        assert_eq!(items[0].index, 0);
        assert_eq!(items[1].index, 1);
        assert_eq!(items[1].label, "b.png");
    }
}
