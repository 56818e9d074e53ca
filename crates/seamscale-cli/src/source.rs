// crates/seamscale-cli/src/source.rs
//
// Work item source: turns the command-line inputs into indexed work items.
//
// Files are taken as given; directories are scanned one level deep and their
// entries sorted by name. Media kind comes from the extension alone. Origin
// indices run across images and videos together, so the summary lists items
// in command-line order.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use seamscale_core::config::OutputFormat;
use seamscale_core::types::{WorkItem, index_items};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

pub fn media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

#[derive(Debug, Default)]
pub struct Inputs {
    pub images:  Vec<WorkItem<PathBuf>>,
    pub videos:  Vec<WorkItem<PathBuf>>,
    /// Explicitly named files with an unrecognised extension.
    pub skipped: Vec<PathBuf>,
}

impl Inputs {
    pub fn len(&self) -> usize { self.images.len() + self.videos.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

pub fn collect(paths: &[PathBuf]) -> Result<Inputs> {
    let mut out   = Inputs::default();
    let mut found = Vec::new();

    for path in paths {
        let meta = fs::metadata(path)
            .with_context(|| format!("input '{}'", path.display()))?;

        let files = if meta.is_dir() {
            scan_dir(path)?
        } else {
            vec![path.clone()]
        };

        for file in files {
            match media_kind(&file) {
                Some(kind) => found.push((file, kind)),
                None => {
                    warn!("skipping '{}': unrecognised extension", file.display());
                    out.skipped.push(file);
                }
            }
        }
    }

    for item in index_items(found, |(file, _)| label_for(file)) {
        let (file, kind) = item.input;
        let item = WorkItem::new(item.index, item.label, file);
        match kind {
            MediaKind::Image => out.images.push(item),
            MediaKind::Video => out.videos.push(item),
        }
    }

    debug!("source: {} image(s), {} video(s)", out.images.len(), out.videos.len());
    Ok(out)
}

/// Recognised media files directly inside `dir`, sorted by name.
fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory '{}'", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && media_kind(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn label_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `<stem>_scaled.<ext>`, next to the input or inside `output_dir`.
pub fn output_path(
    input:      &Path,
    kind:       MediaKind,
    output_dir: Option<&Path>,
    format:     OutputFormat,
) -> Result<PathBuf> {
    let stem = input.file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("'{}' has no usable file name", input.display()))?;
    let input_ext = input.extension().and_then(|e| e.to_str()).unwrap_or_default();

    match (kind, format) {
        (MediaKind::Image, OutputFormat::Mp4 | OutputFormat::Mkv) => {
            bail!("'{}' is an image; --format {format:?} is for videos", input.display())
        }
        (MediaKind::Video, OutputFormat::Png | OutputFormat::Jpg) => {
            bail!("'{}' is a video; --format {format:?} is for images", input.display())
        }
        _ => {}
    }

    // WebM only carries VP8/VP9/AV1; the H.264 output goes into Matroska.
    let ext = match (kind, format) {
        (MediaKind::Video, OutputFormat::Keep) if input_ext.eq_ignore_ascii_case("webm") => "mkv",
        _ => format.extension(input_ext),
    };
    let name = format!("{stem}_scaled.{ext}");
    let dir  = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    Ok(dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, b"").unwrap();
        p
    }

    #[test]
    fn kind_by_extension() {
        assert_eq!(media_kind(Path::new("a/B.JPG")), Some(MediaKind::Image));
        assert_eq!(media_kind(Path::new("clip.mkv")), Some(MediaKind::Video));
        assert_eq!(media_kind(Path::new("notes.txt")), None);
        assert_eq!(media_kind(Path::new("noext")), None);
    }

    #[test]
    fn directories_are_sorted_and_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.png");
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "c.jpg");
        touch(dir.path(), "readme.txt");
        fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "deep.png");

        let inputs = collect(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(inputs.len(), 3);
        assert!(inputs.skipped.is_empty());

        let labels: Vec<(usize, &str)> = inputs.images.iter().map(|i| (i.index, i.label.as_str())).collect();
        assert_eq!(labels, vec![(1, "b.png"), (2, "c.jpg")]);
        assert_eq!(inputs.videos[0].index, 0);
        assert_eq!(inputs.videos[0].label, "a.mp4");
    }

    #[test]
    fn explicit_files_keep_command_line_order() {
        let dir = tempfile::tempdir().unwrap();
        let z = touch(dir.path(), "z.png");
        let a = touch(dir.path(), "a.png");
        let t = touch(dir.path(), "t.txt");

        let inputs = collect(&[z.clone(), t.clone(), a.clone()]).unwrap();
        assert_eq!(inputs.images[0].input, z);
        assert_eq!(inputs.images[1].input, a);
        assert_eq!(inputs.images[1].index, 1);
        assert_eq!(inputs.skipped, vec![t]);
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect(&[dir.path().join("gone.png")]).is_err());
    }

    #[test]
    fn output_naming() {
        let input = Path::new("/media/in/photo.JPG");
        assert_eq!(
            output_path(input, MediaKind::Image, None, OutputFormat::Keep).unwrap(),
            PathBuf::from("/media/in/photo_scaled.JPG"),
        );
        assert_eq!(
            output_path(input, MediaKind::Image, Some(Path::new("/out")), OutputFormat::Png).unwrap(),
            PathBuf::from("/out/photo_scaled.png"),
        );
        assert_eq!(
            output_path(Path::new("clip.mov"), MediaKind::Video, None, OutputFormat::Mp4).unwrap(),
            PathBuf::from("clip_scaled.mp4"),
        );
        assert_eq!(
            output_path(Path::new("v/talk.webm"), MediaKind::Video, None, OutputFormat::Keep).unwrap(),
            PathBuf::from("v/talk_scaled.mkv"),
        );
        assert!(output_path(input, MediaKind::Image, None, OutputFormat::Mkv).is_err());
        assert!(output_path(Path::new("clip.mov"), MediaKind::Video, None, OutputFormat::Jpg).is_err());
    }
}
