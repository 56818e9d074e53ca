// crates/seamscale-cli/src/main.rs
//
// seamscale: batch content-aware resize.
//
// Images run through the executor as independent work items. Videos run one
// at a time, each with its own frame-level executor, reorder buffer and mux
// thread, so a video's frames get the whole pool.

mod args;
mod source;

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use seamscale_core::config::{OutputFormat, PipelineConfig, ResizeRequest, Trim};
use seamscale_core::progress::LogProgress;
use seamscale_core::summary::BatchSummary;
use seamscale_core::types::{ProcessingResult, WorkItem};
use seamscale_core::{CancelToken, Error, Executor};
use seamscale_media::image::process_image;
use seamscale_media::{LiquidRescale, VideoJob, process_video};

use crate::args::Args;
use crate::source::{MediaKind, output_path};

/// Frames between progress log lines for videos.
const FRAME_LOG_EVERY: usize = 25;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter  = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Trip `cancel` after `after`. Work already finished is kept; running
/// transforms are killed and open containers are finalized.
fn spawn_watchdog(after: Duration, cancel: CancelToken) {
    thread::Builder::new()
        .name("seamscale-watchdog".into())
        .spawn(move || {
            thread::sleep(after);
            if !cancel.is_cancelled() {
                warn!("timeout after {}s, cancelling", after.as_secs());
                cancel.cancel();
            }
        })
        .map(drop)
        .unwrap_or_else(|e| warn!("could not start timeout watchdog: {e}"));
}

struct Batch<'a> {
    config:     &'a PipelineConfig,
    request:    ResizeRequest,
    trim:       Trim,
    format:     OutputFormat,
    output_dir: Option<PathBuf>,
    rescale:    LiquidRescale,
    cancel:     CancelToken,
}

impl Batch<'_> {
    fn run_images(&self, images: Vec<WorkItem<PathBuf>>) -> Result<Vec<ProcessingResult>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        let mut items   = Vec::with_capacity(images.len());
        for item in images {
            match output_path(&item.input, MediaKind::Image, self.output_dir.as_deref(), self.format) {
                Ok(out) => items.push(WorkItem::new(item.index, item.label, (item.input, out))),
                Err(e)  => results.push(ProcessingResult::failed(item.index, item.label, format!("{e:#}"))),
            }
        }

        let exec     = Executor::from_config(self.config)?;
        let progress = LogProgress::new("images", 1);
        results.extend(exec.run_batch(
            items,
            |(input, output): (PathBuf, PathBuf), cancel: &CancelToken| {
                let _span = info_span!("image", path = %input.display()).entered();
                process_image(&input, &output, &self.request, &self.rescale, cancel)
            },
            &progress,
            &self.cancel,
        ));
        Ok(results)
    }

    fn run_videos(&self, videos: Vec<WorkItem<PathBuf>>) -> Vec<ProcessingResult> {
        let progress = LogProgress::new("frames", FRAME_LOG_EVERY);
        videos.into_iter().map(|item| {
            if self.cancel.is_cancelled() {
                return ProcessingResult::cancelled(item.index, item.label);
            }
            let output = match output_path(&item.input, MediaKind::Video, self.output_dir.as_deref(), self.format) {
                Ok(out) => out,
                Err(e)  => return ProcessingResult::failed(item.index, item.label, format!("{e:#}")),
            };
            let job = VideoJob { input: item.input, output, request: self.request, trim: self.trim };

            match process_video(&job, self.config, &self.rescale, &progress, &self.cancel) {
                Ok(report) if report.cancelled => {
                    let mut r = ProcessingResult::cancelled(item.index, item.label);
                    r.output   = Some(report.output);
                    r.messages = report.messages;
                    r
                }
                Ok(report) => {
                    let out = report.into_item_output();
                    let mut r = ProcessingResult::succeeded(item.index, item.label, out.output);
                    r.messages = out.messages;
                    r
                }
                Err(Error::Cancelled) => ProcessingResult::cancelled(item.index, item.label),
                Err(e) => {
                    warn!("{}: {e}", job.input.display());
                    ProcessingResult::failed(item.index, item.label, e)
                }
            }
        })
        .collect()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config  = args.pipeline_config()?;
    let request = args.resize_request()?;
    let trim    = args.trim()?;

    let inputs = source::collect(&args.inputs)?;
    if inputs.is_empty() {
        bail!("no image or video files among the inputs");
    }
    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("create output directory '{}'", dir.display()))?;
    }

    seamscale_media::init().context("FFmpeg init failed")?;

    let cancel = CancelToken::new();
    if let Some(secs) = args.timeout {
        spawn_watchdog(Duration::from_secs(secs), cancel.clone());
    }

    let job_id = Uuid::new_v4();
    info!(
        %job_id,
        "{} image(s), {} video(s), {} thread(s), magick='{}'",
        inputs.images.len(), inputs.videos.len(), config.threads, config.magick_binary,
    );

    let batch = Batch {
        config:     &config,
        request,
        trim,
        format:     args.format.into(),
        output_dir: args.output_dir.clone(),
        rescale:    LiquidRescale::from_config(&config),
        cancel,
    };

    let started = Instant::now();
    let mut results = batch.run_images(inputs.images)?;
    results.extend(batch.run_videos(inputs.videos));

    let summary = BatchSummary::new(job_id, results, started.elapsed());
    print!("{}", summary.render());

    if summary.failed() > 0 {
        bail!("{} of {} item(s) failed", summary.failed(), summary.results.len());
    }
    if summary.cancelled() > 0 {
        bail!("batch cancelled; {} item(s) unfinished", summary.cancelled());
    }
    Ok(())
}
