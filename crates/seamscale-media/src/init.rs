// crates/seamscale-media/src/init.rs
//
// Process-wide FFmpeg initialization. Safe to call from any thread, any
// number of times; the underlying init runs once.

use std::sync::OnceLock;

use ffmpeg_the_third as ffmpeg;
use seamscale_core::{Error, Result};
use tracing::debug;

static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

pub fn init() -> Result<()> {
    INIT.get_or_init(|| {
        ffmpeg::init().map_err(|e| e.to_string())?;
        // libav* prints every warning to stderr by default; route only errors.
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        debug!("ffmpeg initialized");
        Ok(())
    })
    .clone()
    .map_err(|e| Error::Config(format!("ffmpeg init: {e}")))
}
