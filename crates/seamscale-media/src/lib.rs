// crates/seamscale-media/src/lib.rs
//
// FFmpeg and ImageMagick adapters behind seamscale-core's interfaces.
// Everything that touches native handles lives here; the scheduling,
// ordering and interleaving rules stay in seamscale-core.
//
// To add a new media capability:
//   1. Create a new module file here
//   2. Add `pub mod mymodule;` below
//   3. Call it from video.rs (per-file session) or image.rs

mod helpers;

pub mod audio;
pub mod decode;
pub mod encode;
pub mod image;
pub mod init;
pub mod mux;
pub mod probe;
pub mod transform;
pub mod video;

pub use init::init;
pub use probe::{MediaInfo, probe};
pub use transform::LiquidRescale;
pub use video::{VideoJob, VideoReport, process_video};
