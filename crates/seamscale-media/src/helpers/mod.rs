// crates/seamscale-media/src/helpers/mod.rs
//
// Internal helper modules for seamscale-media.
// Not re-exported from lib.rs; these are decode/encode implementation details.

pub mod color;
pub mod seek;
