// crates/seamscale-core/src/interpolate.rs
//
// Per-frame target dimensions for fixed and gradual scaling.
//
// Gradual scaling ramps each axis linearly and independently from the start
// size to the end size over N frames: t = i / (N - 1), rounded to the nearest
// pixel, never below 1. Everything here is pure and `Copy`, so workers can
// call `ScalePlan::at` concurrently without coordination.

use crate::config::ResizeRequest;
use crate::types::Dimensions;

/// A target size relative to the original: absolute pixels per axis (missing
/// axis keeps the original), or a percentage of the original per axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SizeSpec {
    Absolute { width: Option<u32>, height: Option<u32> },
    Percent  { width: f64, height: f64 },
}

impl SizeSpec {
    pub fn percent(p: f64) -> Self { Self::Percent { width: p, height: p } }

    pub fn pixels(width: u32, height: u32) -> Self {
        Self::Absolute { width: Some(width), height: Some(height) }
    }

    /// Absolute dimensions for an original of size `original`.
    ///
    /// ```
    /// use seamscale_core::interpolate::SizeSpec;
    /// use seamscale_core::types::Dimensions;
    /// let d = SizeSpec::percent(50.0).resolve(Dimensions::new(641, 480));
    /// assert_eq!(d, Dimensions::new(321, 240));
    /// ```
    pub fn resolve(&self, original: Dimensions) -> Dimensions {
        match *self {
            Self::Absolute { width, height } => Dimensions::new(
                width.unwrap_or(original.width).max(1),
                height.unwrap_or(original.height).max(1),
            ),
            Self::Percent { width, height } => Dimensions::new(
                round_px(original.width as f64 * width / 100.0),
                round_px(original.height as f64 * height / 100.0),
            ),
        }
    }
}

#[inline]
fn round_px(v: f64) -> u32 {
    v.round().max(1.0) as u32
}

#[inline]
fn lerp_axis(a: u32, b: u32, t: f64) -> u32 {
    round_px(a as f64 + (b as f64 - a as f64) * t)
}

/// Linear ramp from `start` to `end` over `frames` frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradualScale {
    pub start:  Dimensions,
    pub end:    Dimensions,
    pub frames: usize,
}

impl GradualScale {
    pub fn new(original: Dimensions, start: SizeSpec, end: SizeSpec, frames: usize) -> Self {
        Self {
            start: start.resolve(original),
            end:   end.resolve(original),
            frames,
        }
    }

    /// Dimensions of frame `i`. A single-frame ramp lands on the end size;
    /// indices past the end clamp to the last frame.
    ///
    /// ```
    /// use seamscale_core::interpolate::GradualScale;
    /// use seamscale_core::types::Dimensions;
    /// let g = GradualScale { start: Dimensions::new(100, 50), end: Dimensions::new(200, 50), frames: 5 };
    /// let widths: Vec<u32> = (0..5).map(|i| g.at(i).width).collect();
    /// assert_eq!(widths, [100, 125, 150, 175, 200]);
    /// ```
    pub fn at(&self, i: usize) -> Dimensions {
        if self.frames <= 1 {
            return Dimensions::new(self.end.width.max(1), self.end.height.max(1));
        }
        let last = self.frames - 1;
        let t    = i.min(last) as f64 / last as f64;
        Dimensions::new(
            lerp_axis(self.start.width,  self.end.width,  t),
            lerp_axis(self.start.height, self.end.height, t),
        )
    }
}

/// Resolved scaling for one video (or one image, with `frames == 1`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalePlan {
    Fixed(Dimensions),
    Gradual { ramp: GradualScale, original: Dimensions },
}

impl ScalePlan {
    pub fn new(request: &ResizeRequest, original: Dimensions, frames: usize) -> Self {
        match *request {
            ResizeRequest::Fixed(spec) => Self::Fixed(spec.resolve(original)),
            ResizeRequest::Gradual { start, end } => Self::Gradual {
                ramp: GradualScale::new(original, start, end, frames),
                original,
            },
        }
    }

    /// Target size for frame `i`.
    pub fn at(&self, i: usize) -> Dimensions {
        match self {
            Self::Fixed(d)            => *d,
            Self::Gradual { ramp, .. } => ramp.at(i),
        }
    }

    /// Size of the encoded output. Gradual runs keep the source size so every
    /// frame of the container has the same dimensions.
    pub fn output_size(&self) -> Dimensions {
        match self {
            Self::Fixed(d)                 => *d,
            Self::Gradual { original, .. } => *original,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIG: Dimensions = Dimensions::new(400, 200);

    #[test]
    fn single_frame_is_end_size() {
        let g = GradualScale::new(ORIG, SizeSpec::percent(100.0), SizeSpec::percent(50.0), 1);
        assert_eq!(g.at(0), Dimensions::new(200, 100));
    }

    #[test]
    fn five_frame_ramp() {
        let g = GradualScale {
            start:  Dimensions::new(100, 80),
            end:    Dimensions::new(200, 80),
            frames: 5,
        };
        let got: Vec<_> = (0..5).map(|i| g.at(i)).collect();
        assert_eq!(got.iter().map(|d| d.width).collect::<Vec<_>>(), [100, 125, 150, 175, 200]);
        assert!(got.iter().all(|d| d.height == 80));
    }

    #[test]
    fn axes_interpolate_independently_and_shrink() {
        let g = GradualScale {
            start:  Dimensions::new(300, 10),
            end:    Dimensions::new(100, 30),
            frames: 3,
        };
        assert_eq!(g.at(1), Dimensions::new(200, 20));
        assert_eq!(g.at(2), Dimensions::new(100, 30));
    }

    #[test]
    fn never_below_one_pixel() {
        assert_eq!(SizeSpec::percent(0.1).resolve(ORIG), Dimensions::new(1, 1));
        let g = GradualScale { start: Dimensions::new(3, 3), end: Dimensions::new(0, 0), frames: 2 };
        assert_eq!(g.at(1), Dimensions::new(1, 1));
    }

    #[test]
    fn absolute_spec_keeps_missing_axis() {
        let s = SizeSpec::Absolute { width: Some(320), height: None };
        assert_eq!(s.resolve(ORIG), Dimensions::new(320, 200));
    }

    #[test]
    fn plan_output_size() {
        let fixed = ScalePlan::new(&ResizeRequest::Fixed(SizeSpec::percent(50.0)), ORIG, 10);
        assert_eq!(fixed.output_size(), Dimensions::new(200, 100));
        assert_eq!(fixed.at(9), Dimensions::new(200, 100));

        let gradual = ScalePlan::new(
            &ResizeRequest::Gradual { start: SizeSpec::percent(100.0), end: SizeSpec::percent(50.0) },
            ORIG, 3,
        );
        assert_eq!(gradual.output_size(), ORIG);
        assert_eq!(gradual.at(1), Dimensions::new(300, 150));
    }
}
