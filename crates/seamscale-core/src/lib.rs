// crates/seamscale-core/src/lib.rs
//
// No ffmpeg and no subprocesses. Everything here is plain Rust so the ordering,
// resegmentation and interleaving rules can be tested without media files.
// The FFmpeg-backed encoders, decoders and container writer live in
// seamscale-media and plug in through the traits in `codec`.

pub mod cancel;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod interpolate;
pub mod memory;
pub mod progress;
pub mod reorder;
pub mod resegment;
pub mod summary;
pub mod sync;
pub mod types;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use executor::{Completion, Executor, ItemOutput, Outcome};
pub use reorder::{ReorderBuffer, Take};
pub use sync::{MuxDriver, MuxReport};
