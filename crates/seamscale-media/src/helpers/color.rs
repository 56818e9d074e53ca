// crates/seamscale-media/src/helpers/color.rs
//
// Source colour description, carried from the decoder to the encoder so the
// output is tagged the way the input was.
//
// Pixels travel as RGB24 between the two, and swscale uses the same default
// matrix for YUV→RGB and RGB→YUV, so the round trip is consistent and the
// source's primaries / transfer / matrix tags stay correct. Range is the
// exception: swscale always writes limited-range YUV420P, so the encoder is
// tagged MPEG range regardless of the source.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::util::color;

use seamscale_core::types::ColorMetadata;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceColor {
    pub space:     color::Space,
    pub range:     color::Range,
    pub primaries: color::Primaries,
    pub transfer:  color::TransferCharacteristic,
}

impl SourceColor {
    pub fn from_decoder(dec: &ffmpeg::decoder::video::Video) -> Self {
        Self {
            space:     dec.color_space(),
            range:     dec.color_range(),
            primaries: dec.color_primaries(),
            transfer:  dec.color_transfer_characteristic(),
        }
    }

    /// Plain-data copy attached to every decoded frame.
    pub fn metadata(&self, format: Pixel) -> ColorMetadata {
        ColorMetadata {
            primaries: Some(ffmpeg::ffi::AVColorPrimaries::from(self.primaries) as i32),
            transfer:  Some(ffmpeg::ffi::AVColorTransferCharacteristic::from(self.transfer) as i32),
            matrix:    Some(ffmpeg::ffi::AVColorSpace::from(self.space) as i32),
            range:     Some(ffmpeg::ffi::AVColorRange::from(self.range) as i32),
            bit_depth: bit_depth(format),
        }
    }

    /// Tag an encoder context before it is opened.
    ///
    /// # Safety
    /// `ctx` must point to a live, not yet opened `AVCodecContext`.
    pub unsafe fn apply(&self, ctx: *mut ffmpeg::ffi::AVCodecContext) {
        (*ctx).colorspace      = self.space.into();
        (*ctx).color_range     = color::Range::MPEG.into();
        (*ctx).color_primaries = self.primaries.into();
        (*ctx).color_trc       = self.transfer.into();
    }
}

/// Bits per component of the first plane, from the pixel format descriptor.
pub fn bit_depth(format: Pixel) -> Option<u8> {
    unsafe {
        let desc = ffmpeg::ffi::av_pix_fmt_desc_get(format.into());
        if desc.is_null() { None } else { Some((*desc).comp[0].depth as u8) }
    }
}
