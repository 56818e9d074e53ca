// crates/seamscale-media/src/helpers/seek.rs
//
// Seek helper wrapping avformat seek with soft-fail behaviour.
//
// Some containers (and `avformat_seek_file` with max_ts=0 on a freshly
// opened context) refuse to seek. Every trim seek routes through here and a
// failure only costs decode time: callers filter frames by timestamp, so
// pre-roll decoded from the wrong position is discarded either way.

use ffmpeg_the_third as ffmpeg;
use tracing::warn;

/// Seek `ictx` to the keyframe at or before `target_secs`.
///
/// Returns `true` if the seek succeeded or was skipped because the target is
/// the start of the file. Returns `false` on failure; decoding then continues
/// from the current position.
///
/// Backward seek (`..=seek_ts`): a forward seek lands on the keyframe after
/// the target, and every frame between the target and that keyframe would be
/// missing from the output.
pub fn seek_to_secs(
    ictx:        &mut ffmpeg::format::context::Input,
    target_secs: f64,
    label:       &str,
) -> bool {
    if target_secs <= 0.0 {
        return true;
    }

    let seek_ts = (target_secs * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
    match ictx.seek(seek_ts, ..=seek_ts) {
        Ok(()) => true,
        Err(e) => {
            warn!("seek soft-fail in {label} at {target_secs:.3}s: {e}; timestamp filter will skip pre-roll");
            false
        }
    }
}
