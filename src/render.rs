//! Frame to glyph-grid rendering.

use image::imageops::{self, FilterType};
use std::fmt;

use crate::cue::Fps;
use crate::error::{Error, Result};
use crate::source::Frame;

/// Shade blocks from lightest to darkest.
pub const DEFAULT_PALETTE: [char; 4] = ['░', '▒', '▓', '█'];

pub const DEFAULT_TARGET_WIDTH: u32 = 40;

/// Run-wide rendering parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Glyph columns per frame
    pub target_width: u32,
    /// Cue rate; every source frame lasts exactly `1 / fps`
    pub fps: Fps,
    /// Ordered glyphs, lightest first
    pub palette: Vec<char>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            fps: Fps::default(),
            palette: DEFAULT_PALETTE.to_vec(),
        }
    }
}

impl RenderConfig {
    pub fn with_target_width(mut self, target_width: u32) -> Self {
        self.target_width = target_width;
        self
    }

    pub fn with_fps(mut self, fps: Fps) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_palette(mut self, palette: impl IntoIterator<Item = char>) -> Self {
        self.palette = palette.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_width == 0 {
            return Err(Error::invalid_config("target width must be at least 1"));
        }
        if self.palette.is_empty() {
            return Err(Error::invalid_config("glyph palette is empty"));
        }
        if self.palette.iter().any(|c| c.is_control()) {
            return Err(Error::invalid_config(
                "glyph palette contains control characters",
            ));
        }
        Ok(())
    }
}

/// Glyph grid size in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rows for `target_width` columns of a `width x height` source.
///
/// `floor(target_width * height * 0.5 / width)`: character cells are about
/// twice as tall as they are wide.
pub fn target_dimensions(width: u32, height: u32, target_width: u32) -> Result<Dimensions> {
    let degenerate = |target_height| Error::DegenerateDimensions {
        width,
        height,
        target_width,
        target_height,
    };
    if width == 0 || height == 0 || target_width == 0 {
        return Err(degenerate(0));
    }

    let rows = u64::from(target_width) * u64::from(height) / (2 * u64::from(width));
    let target_height = u32::try_from(rows).map_err(|_| degenerate(u32::MAX))?;
    if target_height == 0 {
        return Err(degenerate(0));
    }
    Ok(Dimensions {
        width: target_width,
        height: target_height,
    })
}

/// Palette index for luminance `luma` in a palette of `len` glyphs.
#[inline]
pub fn glyph_index(luma: u8, len: usize) -> usize {
    let last = len.saturating_sub(1);
    (usize::from(luma) * last / 255).min(last)
}

/// A frame rendered as glyphs, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphGrid {
    width: usize,
    height: usize,
    glyphs: Vec<char>,
}

impl GlyphGrid {
    /// Build a grid from text rows; `None` unless all rows have the same
    /// non-zero length.
    pub fn from_rows(rows: &[&str]) -> Option<Self> {
        let width = rows.first()?.chars().count();
        if width == 0 {
            return None;
        }
        let mut glyphs = Vec::with_capacity(width * rows.len());
        for row in rows {
            let before = glyphs.len();
            glyphs.extend(row.chars());
            if glyphs.len() - before != width {
                return None;
            }
        }
        Some(Self {
            width,
            height: rows.len(),
            glyphs,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Glyphs of row `y`, or `None` past the last row.
    pub fn row(&self, y: usize) -> Option<&[char]> {
        if y >= self.height {
            return None;
        }
        self.glyphs.get(y * self.width..(y + 1) * self.width)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[char]> + '_ {
        self.glyphs.chunks(self.width)
    }

    /// Replace the contents of `buf` with row `y` (empty past the last row).
    pub fn fill_row(&self, y: usize, buf: &mut String) {
        buf.clear();
        if let Some(row) = self.row(y) {
            buf.extend(row.iter());
        }
    }
}

impl fmt::Display for GlyphGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (y, row) in self.rows().enumerate() {
            if y > 0 {
                f.write_str("\n")?;
            }
            for c in row {
                fmt::Write::write_char(f, *c)?;
            }
        }
        Ok(())
    }
}

/// Downsamples frames and maps every sample to a glyph.
///
/// The target size is fixed when the renderer is built and used for every
/// frame of the run.
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    palette: Vec<char>,
    dims: Dimensions,
}

impl FrameRenderer {
    pub fn new(config: &RenderConfig, source_width: u32, source_height: u32) -> Result<Self> {
        config.validate()?;
        let dims = target_dimensions(source_width, source_height, config.target_width)?;
        Ok(Self {
            palette: config.palette.clone(),
            dims,
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn render(&self, frame: &Frame) -> GlyphGrid {
        let Dimensions { width, height } = self.dims;
        let luma = frame.luma();
        let resized;
        let small = if luma.dimensions() == (width, height) {
            luma
        } else {
            resized = imageops::resize(luma, width, height, FilterType::Triangle);
            &resized
        };

        let glyphs = small
            .as_raw()
            .iter()
            .map(|&p| self.palette[glyph_index(p, self.palette.len())])
            .collect();
        GlyphGrid {
            width: width as usize,
            height: height as usize,
            glyphs,
        }
    }
}
