// crates/seamscale-media/src/image.rs
//
// One still image: probe its size, resolve the target, hand the file to
// ImageMagick. Runs as a single work item on the batch executor.
//
// A gradual request on a still image is a one-frame ramp, which resolves to
// its end size.

use std::path::Path;

use tracing::debug;

use seamscale_core::config::ResizeRequest;
use seamscale_core::interpolate::ScalePlan;
use seamscale_core::{CancelToken, ItemOutput, Result};

use crate::probe::probe;
use crate::transform::LiquidRescale;

pub fn process_image(
    input:   &Path,
    output:  &Path,
    request: &ResizeRequest,
    rescale: &LiquidRescale,
    cancel:  &CancelToken,
) -> Result<ItemOutput> {
    cancel.check()?;
    let info   = probe(input)?;
    let target = ScalePlan::new(request, info.dimensions, 1).at(0);
    debug!("image: {} {} → {target}", input.display(), info.dimensions);

    let rescaled = rescale.rescale_file(input, output, target, cancel)?;
    Ok(ItemOutput {
        output:   Some(output.to_path_buf()),
        messages: rescaled.fallback.into_iter().collect(),
    })
}
