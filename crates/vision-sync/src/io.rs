//! Image encoding and the on-disk output layout.

use image::{ExtendedColorType, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::stamp::Timestamp;
use crate::{Error, Frame, PixelFormat, Result};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Bmp => "bmp",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

/// Encode `frame` to `path`. The bytes land in a sibling temp file first and are
/// renamed into place, so readers never observe a partially written image.
pub fn write_image(path: &Path, frame: &Frame, format: OutputFormat) -> Result<()> {
    match frame.pixel_format {
        PixelFormat::Rgb8 => {
            write_atomic(path, &frame.data, frame, ExtendedColorType::Rgb8, format)
        }
        PixelFormat::Bgr8 => write_bgr8(path, frame, format),
        PixelFormat::Gray8 => write_atomic(path, &frame.data, frame, ExtendedColorType::L8, format),
    }
}

fn write_bgr8(path: &Path, frame: &Frame, format: OutputFormat) -> Result<()> {
    let mut rgb = frame.data.clone();
    for px in rgb.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    write_atomic(path, &rgb, frame, ExtendedColorType::Rgb8, format)
}

fn write_atomic(
    path: &Path,
    bytes: &[u8],
    frame: &Frame,
    color: ExtendedColorType,
    format: OutputFormat,
) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io(format!("{} has no file name", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".partial");
    let tmp = path.with_file_name(tmp_name);
    let written = image::save_buffer_with_format(
        &tmp,
        bytes,
        frame.width,
        frame.height,
        color,
        format.image_format(),
    )
    .map_err(Error::from)
    .and_then(|()| fs::rename(&tmp, path).map_err(Error::from));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

/// Fixed directory names, relative to an output root.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Per-frame directory for camera 1 or 2.
    pub fn frames_dir(&self, camera: u8) -> PathBuf {
        self.root.join(format!("camera{camera}_frames"))
    }

    pub fn mosaic_dir(&self, camera: u8) -> PathBuf {
        self.root.join(format!("cam{camera}_combined"))
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.root.join("merged_images")
    }

    pub fn dirs(&self) -> [PathBuf; 5] {
        [
            self.frames_dir(1),
            self.frames_dir(2),
            self.merged_dir(),
            self.mosaic_dir(1),
            self.mosaic_dir(2),
        ]
    }
}

/// Writes per-frame images (one per timestamp) and the overwritten mosaic and
/// composite files.
#[derive(Clone, Debug)]
pub struct Persister {
    layout: OutputLayout,
    format: OutputFormat,
}

impl Persister {
    /// Create any missing output directories.
    pub fn create(layout: OutputLayout, format: OutputFormat) -> Result<Self> {
        for dir in layout.dirs() {
            fs::create_dir_all(&dir)
                .map_err(|e| Error::Io(format!("{}: {e}", dir.display())))?;
        }
        Ok(Self { layout, format })
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn frame_path(&self, camera: u8, ts: &Timestamp) -> PathBuf {
        self.layout
            .frames_dir(camera)
            .join(format!("camera{camera}_{ts}.{}", self.format.extension()))
    }

    pub fn mosaic_path(&self, camera: u8) -> PathBuf {
        self.layout
            .mosaic_dir(camera)
            .join(format!("combined_cam{camera}.{}", self.format.extension()))
    }

    pub fn composite_path(&self) -> PathBuf {
        self.layout
            .merged_dir()
            .join(format!("combined_horizontal.{}", self.format.extension()))
    }

    pub fn write_frame(&self, camera: u8, ts: &Timestamp, frame: &Frame) -> Result<PathBuf> {
        let path = self.frame_path(camera, ts);
        write_image(&path, frame, self.format)?;
        debug!(path = %path.display(), "frame written");
        Ok(path)
    }

    pub fn write_mosaic(&self, camera: u8, mosaic: &Frame) -> Result<PathBuf> {
        let path = self.mosaic_path(camera);
        write_image(&path, mosaic, self.format)?;
        Ok(path)
    }

    pub fn write_composite(&self, composite: &Frame) -> Result<PathBuf> {
        let path = self.composite_path();
        write_image(&path, composite, self.format)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn layout_paths() {
        let dir = tempfile::tempdir().unwrap();
        let p = Persister::create(OutputLayout::new(dir.path()), OutputFormat::Png).unwrap();
        for d in p.layout().dirs() {
            assert!(d.is_dir(), "{}", d.display());
        }
        let stamp = ts("2024-01-01_00-00-00.000000001");
        assert_eq!(
            p.frame_path(2, &stamp),
            dir.path()
                .join("camera2_frames")
                .join("camera2_2024-01-01_00-00-00.000000001.png")
        );
        assert_eq!(
            p.mosaic_path(1),
            dir.path().join("cam1_combined").join("combined_cam1.png")
        );
        assert_eq!(
            p.composite_path(),
            dir.path().join("merged_images").join("combined_horizontal.png")
        );
    }

    #[test]
    fn overwrite_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = Persister::create(OutputLayout::new(dir.path()), OutputFormat::Png).unwrap();
        let small = Frame::blank(4, 4, PixelFormat::Gray8);
        let large = Frame::blank(8, 16, PixelFormat::Gray8);
        p.write_mosaic(1, &small).unwrap();
        let path = p.write_mosaic(1, &large).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (8, 16));
        let names: Vec<_> = fs::read_dir(p.layout().mosaic_dir(1))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn bgr_is_saved_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("px.png");
        let frame = Frame::from_raw(1, 1, PixelFormat::Bgr8, vec![1, 2, 3]).unwrap();
        write_image(&path, &frame, OutputFormat::Png).unwrap();
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [3, 2, 1]);
    }

    #[test]
    fn frames_accumulate_under_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let p = Persister::create(OutputLayout::new(dir.path()), OutputFormat::Bmp).unwrap();
        let f = Frame::blank(2, 2, PixelFormat::Gray8);
        p.write_frame(1, &ts("a.000000001"), &f).unwrap();
        p.write_frame(1, &ts("a.000000002"), &f).unwrap();
        assert_eq!(fs::read_dir(p.layout().frames_dir(1)).unwrap().count(), 2);
    }
}
