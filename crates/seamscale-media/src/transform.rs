// crates/seamscale-media/src/transform.rs
//
// Content-aware resize via ImageMagick's `-liquid-rescale` (seam carving,
// liblqr delegate).
//
// Files are rescaled in place of a decode: magick reads the input and writes
// the output format chosen by the output extension. Video frames are handed
// over as PNG in a private temp directory and read back as packed RGB24.
//
// When the content-aware call fails (missing LQR delegate, degenerate target)
// and fallback is enabled, the same call is retried with a plain `-resize`.
// The item still succeeds but carries a message saying so.
//
// The child process is polled so a cancelled batch kills long carves instead
// of waiting for them.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use seamscale_core::config::PipelineConfig;
use seamscale_core::types::{Dimensions, VideoFrame};
use seamscale_core::{CancelToken, Error, Result};

const STDERR_TAIL: usize = 4096;
const POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Liquid,
    Plain,
}

/// Result of one rescale: whether the plain-resize fallback was used, and
/// why.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rescaled {
    pub fallback: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LiquidRescale {
    binary:   PathBuf,
    fallback: bool,
}

impl LiquidRescale {
    pub fn new(binary: impl Into<PathBuf>, fallback: bool) -> Self {
        Self { binary: binary.into(), fallback }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.magick_binary, config.fallback_resize)
    }

    /// Rescale an image file to exactly `target`.
    pub fn rescale_file(
        &self,
        input:  &Path,
        output: &Path,
        target: Dimensions,
        cancel: &CancelToken,
    ) -> Result<Rescaled> {
        self.run_with_fallback(input.as_os_str().into(), output.as_os_str().into(), target, cancel)
    }

    /// Rescale one decoded RGB24 frame. Index, timestamp and colour metadata
    /// are carried over to the result.
    pub fn rescale_frame(
        &self,
        frame:  VideoFrame,
        target: Dimensions,
        cancel: &CancelToken,
    ) -> Result<(VideoFrame, Rescaled)> {
        if frame.dimensions() == target {
            return Ok((frame, Rescaled::default()));
        }
        cancel.check()?;

        let dir = tempfile::Builder::new().prefix("seamscale-").tempdir()?;
        let src = dir.path().join("in.png");
        let dst = dir.path().join("out.png");

        write_png(&src, &frame)?;
        // PNG24: forces 8-bit RGB regardless of what magick would pick.
        let mut dst_arg = OsString::from("PNG24:");
        dst_arg.push(&dst);
        let rescaled = self.run_with_fallback(src.into_os_string(), dst_arg, target, cancel)?;

        let (data, w, h) = read_png(&dst)?;
        if Dimensions::new(w, h) != target {
            return Err(Error::transform(format!(
                "frame {}: expected {target}, magick produced {w}x{h}", frame.index,
            )));
        }
        Ok((frame.with_pixels(data, w, h)?, rescaled))
    }

    fn run_with_fallback(
        &self,
        input:  OsString,
        output: OsString,
        target: Dimensions,
        cancel: &CancelToken,
    ) -> Result<Rescaled> {
        match self.run(magick_args(&input, &output, target, Mode::Liquid), cancel) {
            Ok(()) => Ok(Rescaled::default()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) if self.fallback => {
                debug!("liquid rescale failed, retrying with plain resize: {e}");
                self.run(magick_args(&input, &output, target, Mode::Plain), cancel)?;
                Ok(Rescaled { fallback: Some(format!("content-aware resize failed ({e}); used plain resize")) })
            }
            Err(e) => Err(e),
        }
    }

    fn run(&self, args: Vec<OsString>, cancel: &CancelToken) -> Result<()> {
        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::transform(format!("spawn '{}': {e}", self.binary.display())))?;
        wait_or_kill(child, cancel)
    }
}

/// `magick <in> -liquid-rescale WxH! <out>`. The `!` forces exact dimensions
/// instead of fitting inside the box.
fn magick_args(input: &OsString, output: &OsString, target: Dimensions, mode: Mode) -> Vec<OsString> {
    let op = match mode {
        Mode::Liquid => "-liquid-rescale",
        Mode::Plain  => "-resize",
    };
    vec![
        input.clone(),
        op.into(),
        format!("{}x{}!", target.width, target.height).into(),
        output.clone(),
    ]
}

fn wait_or_kill(mut child: Child, cancel: &CancelToken) -> Result<()> {
    // Drained concurrently: a child that fills the pipe would block forever.
    let stderr = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });
    let collect = |h: Option<thread::JoinHandle<Vec<u8>>>| {
        h.and_then(|h| h.join().ok())
            .map(|buf| stderr_tail(&buf))
            .unwrap_or_default()
    };

    loop {
        if let Some(status) = child.try_wait()? {
            let stderr = collect(stderr);
            if status.success() {
                return Ok(());
            }
            return Err(Error::transform(if stderr.is_empty() {
                format!("magick exited with {status}")
            } else {
                format!("magick exited with {status}: {stderr}")
            }));
        }
        if cancel.is_cancelled() {
            if let Err(e) = child.kill() {
                warn!("transform: kill after cancel: {e}");
            }
            let _ = child.wait();
            let _ = collect(stderr);
            return Err(Error::Cancelled);
        }
        thread::sleep(POLL);
    }
}

/// Last `STDERR_TAIL` bytes of `buf`, trimmed, as lossy UTF-8.
fn stderr_tail(buf: &[u8]) -> String {
    let from = buf.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&buf[from..]).trim().to_string()
}

// ── PNG hand-off ──────────────────────────────────────────────────────────────

fn write_png(path: &Path, frame: &VideoFrame) -> Result<()> {
    if frame.bytes_per_pixel != 3 || !frame.is_packed() {
        return Err(Error::InvalidFrame("PNG hand-off needs packed RGB24".into()));
    }
    let file = File::create(path)?;
    let w = &mut BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    // Temp files live for one call; don't spend time compressing them.
    encoder.set_compression(png::Compression::Fast);
    let mut writer = encoder.write_header()
        .map_err(|e| Error::transform(format!("png header: {e}")))?;
    writer.write_image_data(&frame.data[..frame.row_bytes() * frame.height as usize])
        .map_err(|e| Error::transform(format!("png write: {e}")))?;
    Ok(())
}

/// Read a PNG back as packed RGB24, whatever colour type magick wrote.
fn read_png(path: &Path) -> Result<(Vec<u8>, u32, u32)> {
    let mut decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()
        .map_err(|e| Error::transform(format!("png header: {e}")))?;
    let size = reader.output_buffer_size()
        .ok_or_else(|| Error::transform("png too large"))?;
    let mut buf = vec![0u8; size];
    let info = reader.next_frame(&mut buf)
        .map_err(|e| Error::transform(format!("png decode: {e}")))?;
    let buf = &buf[..info.buffer_size()];

    let rgb = match info.color_type {
        png::ColorType::Rgb            => buf.to_vec(),
        png::ColorType::Rgba           => buf.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect(),
        png::ColorType::Grayscale      => buf.iter().flat_map(|&g| [g, g, g]).collect(),
        png::ColorType::GrayscaleAlpha => buf.chunks_exact(2).flat_map(|p| [p[0], p[0], p[0]]).collect(),
        other => return Err(Error::transform(format!("unsupported png colour type {other:?}"))),
    };
    Ok((rgb, info.width, info.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_force_exact_size() {
        let args = magick_args(&"a.jpg".into(), &"b.jpg".into(), Dimensions::new(320, 200), Mode::Liquid);
        assert_eq!(args, ["a.jpg", "-liquid-rescale", "320x200!", "b.jpg"].map(OsString::from));
        let args = magick_args(&"a.jpg".into(), &"b.jpg".into(), Dimensions::new(8, 9), Mode::Plain);
        assert_eq!(args[1], "-resize");
    }

    #[test]
    fn png_hand_off_preserves_pixels() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.png");
        let data: Vec<u8> = (0..5 * 3 * 3).map(|i| i as u8).collect();
        let frame = VideoFrame::packed(data.clone(), 5, 3, 3, 7, 0.25).unwrap();

        write_png(&path, &frame).unwrap();
        let (back, w, h) = read_png(&path).unwrap();
        assert_eq!((w, h), (5, 3));
        assert_eq!(back, data);
    }

    #[test]
    fn same_size_frame_skips_magick() {
        let rescale = LiquidRescale::new("/nonexistent/magick", false);
        let frame   = VideoFrame::packed(vec![1; 12], 2, 2, 3, 0, 0.0).unwrap();
        let (out, r) = rescale.rescale_frame(frame, Dimensions::new(2, 2), &CancelToken::new()).unwrap();
        assert_eq!(out.data, vec![1; 12]);
        assert_eq!(r, Rescaled::default());
    }

    // One test for everything that spawns processes, so no other test thread
    // in this binary forks while the script file is still open for writing.
    #[cfg(unix)]
    #[test]
    fn missing_binary_and_fallback() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir    = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        let input  = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, b"pixels").unwrap();

        let missing = LiquidRescale::new(dir.path().join("no-such-magick"), true);
        let err = missing.rescale_file(&input, &output, Dimensions::new(4, 4), &cancel).unwrap_err();
        assert!(matches!(err, Error::Transform(_)));

        // Fake magick: refuses liquid rescale, "resizes" by copying.
        let script = dir.path().join("fake-magick");
        {
            let mut f = File::create(&script).unwrap();
            writeln!(f, "#!/bin/sh").unwrap();
            writeln!(f, "case \"$2\" in -liquid-rescale) echo 'no LQR delegate' >&2; exit 1;; esac").unwrap();
            writeln!(f, "cp \"$1\" \"$4\"").unwrap();
        }
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let strict = LiquidRescale::new(&script, false);
        let err = strict.rescale_file(&input, &output, Dimensions::new(4, 4), &cancel).unwrap_err();
        assert!(err.to_string().contains("no LQR delegate"));

        let lenient = LiquidRescale::new(&script, true);
        let r = lenient.rescale_file(&input, &output, Dimensions::new(4, 4), &cancel).unwrap();
        assert!(r.fallback.unwrap().contains("plain resize"));
        assert_eq!(std::fs::read(&output).unwrap(), b"pixels");

        // More stderr than a pipe buffer holds must not stall the wait.
        let noisy = Command::new("sh")
            .arg("-c")
            .arg("head -c 200000 /dev/zero | tr '\\0' x >&2; exit 3")
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let msg = wait_or_kill(noisy, &cancel).unwrap_err().to_string();
        assert!(msg.contains("xxxx"));
        assert!(msg.len() < 2 * STDERR_TAIL);
    }
}
