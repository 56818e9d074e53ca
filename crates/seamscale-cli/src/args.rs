// crates/seamscale-cli/src/args.rs
//
// Command-line surface. Everything is validated here and turned into the
// plain config types seamscale-core expects; nothing past this point checks
// user input again.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};

use seamscale_core::config::{OutputFormat, PipelineConfig, ResizeRequest, Trim};
use seamscale_core::interpolate::SizeSpec;

#[derive(Parser, Debug)]
#[command(name = "seamscale")]
#[command(version)]
#[command(about = "Content-aware (seam carving) resize for batches of images and videos")]
pub struct Args {
    /// Image or video files, or directories to scan (not recursive)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Target width in pixels (height kept unless --height is given)
    #[arg(long, conflicts_with_all = ["percent", "start_percent"])]
    pub width: Option<u32>,

    /// Target height in pixels (width kept unless --width is given)
    #[arg(long, conflicts_with_all = ["percent", "start_percent"])]
    pub height: Option<u32>,

    /// Scale both axes to this percentage of the original
    #[arg(short, long, conflicts_with = "start_percent")]
    pub percent: Option<f64>,

    /// Gradual scaling: size of the first video frame, in percent
    #[arg(long, requires = "end_percent")]
    pub start_percent: Option<f64>,

    /// Gradual scaling: size of the last video frame, in percent
    #[arg(long, requires = "start_percent")]
    pub end_percent: Option<f64>,

    /// Concurrent transform processes (default: available parallelism)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Seconds to skip at the start of each video
    #[arg(long, default_value_t = 0.0)]
    pub trim_start: f64,

    /// Stop each video at this many seconds from its start
    #[arg(long, conflicts_with = "duration")]
    pub trim_end: Option<f64>,

    /// Keep this many seconds after --trim-start
    #[arg(long)]
    pub duration: Option<f64>,

    /// Output format; `keep` reuses the input's extension
    #[arg(short, long, value_enum, default_value_t = FormatArg::Keep)]
    pub format: FormatArg,

    /// Write outputs here instead of next to each input
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// JSON pipeline configuration; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// ImageMagick executable
    #[arg(long)]
    pub magick: Option<String>,

    /// Fail instead of falling back to a plain resize
    #[arg(long)]
    pub no_fallback: bool,

    /// Cancel the batch after this many seconds; finished outputs are kept
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Keep,
    Png,
    Jpg,
    Mp4,
    Mkv,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Keep => OutputFormat::Keep,
            FormatArg::Png  => OutputFormat::Png,
            FormatArg::Jpg  => OutputFormat::Jpg,
            FormatArg::Mp4  => OutputFormat::Mp4,
            FormatArg::Mkv  => OutputFormat::Mkv,
        }
    }
}

fn check_percent(flag: &str, p: f64) -> Result<f64> {
    if !p.is_finite() || p <= 0.0 {
        bail!("{flag} must be a positive percentage, got {p}");
    }
    Ok(p)
}

fn check_secs(flag: &str, s: f64) -> Result<f64> {
    if !s.is_finite() || s < 0.0 {
        bail!("{flag} must be a non-negative number of seconds, got {s}");
    }
    Ok(s)
}

impl Args {
    pub fn resize_request(&self) -> Result<ResizeRequest> {
        if let (Some(start), Some(end)) = (self.start_percent, self.end_percent) {
            return Ok(ResizeRequest::Gradual {
                start: SizeSpec::percent(check_percent("--start-percent", start)?),
                end:   SizeSpec::percent(check_percent("--end-percent", end)?),
            });
        }
        if let Some(p) = self.percent {
            return Ok(ResizeRequest::Fixed(SizeSpec::percent(check_percent("--percent", p)?)));
        }
        if self.width == Some(0) || self.height == Some(0) {
            bail!("--width and --height must be at least 1");
        }
        if self.width.is_none() && self.height.is_none() {
            bail!("no target size: use --width/--height, --percent, or --start-percent with --end-percent");
        }
        Ok(ResizeRequest::Fixed(SizeSpec::Absolute { width: self.width, height: self.height }))
    }

    pub fn trim(&self) -> Result<Trim> {
        let start = check_secs("--trim-start", self.trim_start)?;
        let end   = self.trim_end.map(|e| check_secs("--trim-end", e)).transpose()?;
        let duration = self.duration.map(|d| check_secs("--duration", d)).transpose()?;

        if end.is_some_and(|e| e <= start) {
            bail!("--trim-end must be after --trim-start");
        }
        if duration == Some(0.0) {
            bail!("--duration must be greater than zero");
        }
        Ok(Trim { start, end, duration })
    }

    /// Defaults, then the JSON file, then flags.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("load config '{}'", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(t) = self.threads {
            cfg.threads = t;
            cfg.max_pending_frames = cfg.max_pending_frames.max(t);
        }
        if let Some(m) = &self.magick {
            cfg.magick_binary = m.clone();
        }
        if self.no_fallback {
            cfg.fallback_resize = false;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("seamscale").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn percent_and_gradual_requests() {
        let a = parse(&["in.png", "--percent", "50"]);
        assert_eq!(a.resize_request().unwrap(), ResizeRequest::Fixed(SizeSpec::percent(50.0)));

        let a = parse(&["in.mp4", "--start-percent", "100", "--end-percent", "40"]);
        assert_eq!(
            a.resize_request().unwrap(),
            ResizeRequest::Gradual { start: SizeSpec::percent(100.0), end: SizeSpec::percent(40.0) },
        );
    }

    #[test]
    fn width_only_keeps_height() {
        let a = parse(&["in.png", "--width", "320"]);
        assert_eq!(
            a.resize_request().unwrap(),
            ResizeRequest::Fixed(SizeSpec::Absolute { width: Some(320), height: None }),
        );
    }

    #[test]
    fn bad_sizes_rejected() {
        assert!(parse(&["in.png"]).resize_request().is_err());
        assert!(parse(&["in.png", "--percent", "0"]).resize_request().is_err());
        assert!(parse(&["in.png", "--width", "0"]).resize_request().is_err());
        assert!(Args::try_parse_from(["seamscale", "in.png", "--percent", "50", "--width", "10"]).is_err());
        assert!(Args::try_parse_from(["seamscale", "in.mp4", "--start-percent", "50"]).is_err());
    }

    #[test]
    fn trim_validation() {
        let a = parse(&["in.mp4", "--percent", "50", "--trim-start", "2", "--duration", "3"]);
        assert_eq!(a.trim().unwrap(), Trim { start: 2.0, end: None, duration: Some(3.0) });

        let a = parse(&["in.mp4", "--percent", "50", "--trim-start", "5", "--trim-end", "4"]);
        assert!(a.trim().is_err());
        assert!(Args::try_parse_from(["seamscale", "x.mp4", "--trim-end", "4", "--duration", "1"]).is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "threads": 2, "max_pending_frames": 4, "video_crf": 28 }"#).unwrap();

        let p = path.to_str().unwrap();
        let cfg = parse(&["in.png", "--percent", "50", "-c", p, "-t", "8", "--no-fallback"])
            .pipeline_config()
            .unwrap();
        assert_eq!(cfg.threads, 8);
        assert_eq!(cfg.max_pending_frames, 8);
        assert_eq!(cfg.video_crf, 28);
        assert!(!cfg.fallback_resize);
    }

    #[test]
    fn zero_threads_flag_rejected() {
        assert!(parse(&["in.png", "--percent", "50", "-t", "0"]).pipeline_config().is_err());
    }
}
