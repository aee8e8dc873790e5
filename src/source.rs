//! Frame sources: anything that yields luminance frames in presentation order.

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{DecodeError, Error, Result};

/// One decoded frame as 8-bit luminance samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    luma: GrayImage,
}

impl Frame {
    pub fn from_luma(luma: GrayImage) -> Self {
        Self { luma }
    }

    /// Wrap a row-major gray buffer; `None` if the length is not `width * height`.
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> Option<Self> {
        GrayImage::from_raw(width, height, samples).map(Self::from_luma)
    }

    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let (w, h) = rgb.dimensions();
        let luma = GrayImage::from_fn(w, h, |x, y| Luma([luminance(*rgb.get_pixel(x, y))]));
        Self { luma }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(luma) => Self::from_luma(luma),
            other => Self::from_rgb(&other.to_rgb8()),
        }
    }

    pub fn width(&self) -> u32 {
        self.luma.width()
    }

    pub fn height(&self) -> u32 {
        self.luma.height()
    }

    pub fn luma(&self) -> &GrayImage {
        &self.luma
    }
}

/// Rec. 709 luma, rounded.
pub fn luminance(rgb: image::Rgb<u8>) -> u8 {
    let r = rgb[0] as f64;
    let g = rgb[1] as f64;
    let b = rgb[2] as f64;
    (0.2126 * r + 0.7152 * g + 0.0722 * b).round().clamp(0.0, 255.0) as u8
}

/// A lazy, ordered sequence of frames with a fixed native resolution.
pub trait FrameSource {
    /// Path the frames come from, used in error messages.
    fn path(&self) -> &Path;

    /// Native `(width, height)` of the frames.
    fn dimensions(&self) -> (u32, u32);

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError>;

    /// Expected number of frames, if the source can tell.
    fn frame_count_hint(&self) -> Option<u64> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn path(&self) -> &Path {
        (**self).path()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
        (**self).next_frame()
    }

    fn frame_count_hint(&self) -> Option<u64> {
        (**self).frame_count_hint()
    }
}

/// Frames held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    label: PathBuf,
    width: u32,
    height: u32,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(width: u32, height: u32, frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            label: PathBuf::from("<memory>"),
            width,
            height,
            frames: frames.into_iter().collect(),
        }
    }

    pub fn with_label(mut self, label: impl Into<PathBuf>) -> Self {
        self.label = label.into();
        self
    }
}

impl FrameSource for MemorySource {
    fn path(&self) -> &Path {
        &self.label
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
        Ok(self.frames.pop_front())
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// Still images decoded one per frame, in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    root: PathBuf,
    paths: VecDeque<PathBuf>,
    total: u64,
    width: u32,
    height: u32,
}

impl ImageSequenceSource {
    /// Every `png`/`jpg`/`jpeg` directly inside `dir`, sorted by name.
    pub fn open_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::source_unreadable(dir, "not a directory"));
        }
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && is_image_path(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(Error::source_unreadable(dir, "no png or jpg frames found"));
        }
        Self::from_paths(dir, paths)
    }

    /// A single image rendered as one frame.
    pub fn open_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::source_unreadable(path, "no such file"));
        }
        Self::from_paths(path, vec![path.to_path_buf()])
    }

    fn from_paths(root: &Path, paths: Vec<PathBuf>) -> Result<Self> {
        let first = &paths[0];
        let (width, height) = image::image_dimensions(first)
            .map_err(|e| Error::source_unreadable(first, e.to_string()))?;
        tracing::debug!(frames = paths.len(), root = %root.display(), "image sequence opened");
        Ok(Self {
            root: root.to_path_buf(),
            total: paths.len() as u64,
            paths: paths.into(),
            width,
            height,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn path(&self) -> &Path {
        &self.root
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)?;
        Ok(Some(Frame::from_dynamic(image)))
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.total)
    }
}

/// A source whose first frame has already been read.
///
/// Pulling one frame up front lets a caller find out whether the source
/// decodes at all before it commits to anything, such as truncating an output
/// file. The frame-count hint is taken before that first read.
pub struct Primed<'a, S: FrameSource + ?Sized> {
    inner: &'a mut S,
    first: Option<Option<Frame>>,
    hint: Option<u64>,
}

impl<'a, S: FrameSource + ?Sized> Primed<'a, S> {
    pub fn new(inner: &'a mut S) -> std::result::Result<Self, DecodeError> {
        let hint = inner.frame_count_hint();
        let first = inner.next_frame()?;
        Ok(Self {
            inner,
            first: Some(first),
            hint,
        })
    }

    /// `true` if the source ended before yielding a single frame.
    pub fn is_empty(&self) -> bool {
        matches!(self.first, Some(None))
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Primed<'_, S> {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
        match self.first.take() {
            Some(first) => Ok(first),
            None => self.inner.next_frame(),
        }
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn luminance_is_monotonic_and_hits_the_extremes() {
        assert_eq!(luminance(Rgb([0, 0, 0])), 0);
        assert_eq!(luminance(Rgb([255, 255, 255])), 255);
        let mut prev = 0;
        for v in 0..=255u8 {
            let l = luminance(Rgb([v, v, v]));
            assert!(l >= prev);
            prev = l;
        }
        assert!(luminance(Rgb([0, 255, 0])) > luminance(Rgb([255, 0, 0])));
    }

    #[test]
    fn frame_from_raw_checks_length() {
        assert!(Frame::from_raw(2, 2, vec![0; 4]).is_some());
        assert!(Frame::from_raw(2, 2, vec![0; 3]).is_none());
    }

    #[test]
    fn memory_source_yields_in_order_then_ends() {
        let frames = (0..3u8).map(|v| Frame::from_raw(1, 1, vec![v]).unwrap());
        let mut src = MemorySource::new(1, 1, frames);
        assert_eq!(src.frame_count_hint(), Some(3));
        for v in 0..3u8 {
            let f = src.next_frame().unwrap().unwrap();
            assert_eq!(f.luma().as_raw()[0], v);
        }
        assert!(src.next_frame().unwrap().is_none());
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn primed_source_replays_its_first_frame() {
        let frames = (0..2u8).map(|v| Frame::from_raw(1, 1, vec![v]).unwrap());
        let mut src = MemorySource::new(1, 1, frames);
        let mut primed = Primed::new(&mut src).unwrap();
        assert!(!primed.is_empty());
        assert_eq!(primed.frame_count_hint(), Some(2));
        assert_eq!(primed.next_frame().unwrap().unwrap().luma().as_raw()[0], 0);
        assert_eq!(primed.next_frame().unwrap().unwrap().luma().as_raw()[0], 1);
        assert!(primed.next_frame().unwrap().is_none());

        let mut empty = MemorySource::new(1, 1, Vec::new());
        let mut primed = Primed::new(&mut empty).unwrap();
        assert!(primed.is_empty());
        assert!(primed.next_frame().unwrap().is_none());
    }

    #[test]
    fn image_sequence_reads_sorted_frames() {
        let dir = tempfile::tempdir().unwrap();
        for (name, v) in [("frame_0002.png", 255u8), ("frame_0001.png", 0u8)] {
            RgbImage::from_pixel(8, 4, Rgb([v, v, v]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut src = ImageSequenceSource::open_dir(dir.path()).unwrap();
        assert_eq!(src.dimensions(), (8, 4));
        assert_eq!(src.frame_count_hint(), Some(2));
        let first = src.next_frame().unwrap().unwrap();
        let second = src.next_frame().unwrap().unwrap();
        assert_eq!(first.luma().as_raw()[0], 0);
        assert_eq!(second.luma().as_raw()[0], 255);
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_or_missing_inputs_are_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open_dir(dir.path()),
            Err(Error::SourceUnreadable { .. })
        ));
        assert!(matches!(
            ImageSequenceSource::open_file(&dir.path().join("missing.png")),
            Err(Error::SourceUnreadable { .. })
        ));
    }
}
