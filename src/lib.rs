//! # cascii-srt - text animations as subtitles
//!
//! `cascii-srt` renders every frame of a video as a grid of Unicode shade
//! blocks (`░▒▓█`) and writes the frames as SRT subtitle cues, one cue per
//! frame at a fixed frame rate. Played alongside the original video, the
//! subtitle track shows a low-resolution "ASCII" version of it.
//!
//! ## Features
//!
//! - Decode videos through `ffmpeg`, or read a directory of still frames
//! - Aspect-correct grid size from a single column count
//! - Exact, gap-free cue timing for integer and NTSC frame rates
//! - Streaming output: one frame in memory at a time
//! - Progress reporting for integration with UI applications
//!
//! ## Example
//!
//! ```no_run
//! use cascii_srt::{RenderConfig, SubtitleConverter, VideoOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = SubtitleConverter::new();
//! let render = RenderConfig::default().with_target_width(80);
//! let summary = converter.convert(
//!     Path::new("input.mp4"),
//!     Path::new("input.srt"),
//!     &render,
//!     &VideoOptions::default(),
//! )?;
//! println!("{} cues, {} glyphs per frame", summary.frames, summary.dimensions);
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom sources
//!
//! Anything implementing [`FrameSource`] can be rendered with a [`Pipeline`]:
//!
//! ```
//! use cascii_srt::{Frame, MemorySource, Pipeline, RenderConfig};
//! use std::path::Path;
//!
//! let frames = vec![Frame::from_raw(4, 2, vec![255; 8]).unwrap()];
//! let mut source = MemorySource::new(4, 2, frames);
//! let config = RenderConfig::default().with_target_width(4);
//! let pipeline = Pipeline::new(&config, &source).unwrap();
//!
//! let mut out = Vec::new();
//! pipeline.run(&mut source, &mut out, Path::new("<memory>"), |_| {}).unwrap();
//! assert_eq!(
//!     String::from_utf8(out).unwrap(),
//!     "1\n00:00:00,000 --> 00:00:00,100\n████\n\n"
//! );
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub mod config;
pub mod cue;
pub mod error;
pub mod ffmpeg;
pub mod pipeline;
pub mod render;
pub mod source;

pub use config::{AppConfig, Preset};
pub use cue::{format_timestamp, Cue, CueWriter, Fps, Timestamp};
pub use error::{DecodeError, Error, Result};
pub use ffmpeg::{FfmpegConfig, FfmpegSource, VideoOptions};
pub use pipeline::{Pipeline, Progress, ProgressPhase, RunSummary};
pub use render::{Dimensions, FrameRenderer, GlyphGrid, RenderConfig, DEFAULT_PALETTE};
pub use source::{Frame, FrameSource, ImageSequenceSource, MemorySource, Primed};

/// Converts video files, image directories and single images into subtitle
/// animations.
pub struct SubtitleConverter {
    config: AppConfig,
}

impl SubtitleConverter {
    /// Create a converter with default configuration
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Create a converter with custom configuration
    pub fn with_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Render settings for a named preset.
    pub fn options_from_preset(&self, name: &str) -> Result<RenderConfig> {
        self.config.render_config(Some(name))
    }

    /// Open the frame source for `input`.
    ///
    /// Directories are read as image sequences, `png`/`jpg` files as a single
    /// frame, and anything else is decoded with ffmpeg.
    pub fn open_source(
        &self,
        input: &Path,
        video_opts: &VideoOptions,
    ) -> Result<Box<dyn FrameSource>> {
        if input.is_dir() {
            warn_unused_video_options(video_opts);
            return Ok(Box::new(ImageSequenceSource::open_dir(input)?));
        }
        if !input.exists() {
            return Err(Error::source_unreadable(input, "no such file or directory"));
        }
        if source::is_image_path(input) {
            warn_unused_video_options(video_opts);
            return Ok(Box::new(ImageSequenceSource::open_file(input)?));
        }
        Ok(Box::new(FfmpegSource::open(input, &self.config.ffmpeg, video_opts)?))
    }

    /// Convert `input` into a subtitle file at `output`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cascii_srt::{SubtitleConverter, VideoOptions};
    /// use std::path::Path;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let converter = SubtitleConverter::new();
    /// let render = converter.options_from_preset("small")?;
    /// converter.convert(
    ///     Path::new("clip.mkv"),
    ///     Path::new("clip.srt"),
    ///     &render,
    ///     &VideoOptions::default(),
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        render: &RenderConfig,
        video_opts: &VideoOptions,
    ) -> Result<RunSummary> {
        self.convert_with_progress(input, output, render, video_opts, |_| {})
    }

    /// Convert with a callback receiving [`Progress`] after every cue.
    ///
    /// The source is opened, the grid size computed and the first frame
    /// decoded before `output` is created, so a bad input or configuration
    /// never truncates an existing file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cascii_srt::{ProgressPhase, RenderConfig, SubtitleConverter, VideoOptions};
    /// use std::path::Path;
    ///
    /// let converter = SubtitleConverter::new();
    /// converter.convert_with_progress(
    ///     Path::new("video.mp4"),
    ///     Path::new("video.srt"),
    ///     &RenderConfig::default(),
    ///     &VideoOptions::default(),
    ///     |progress| match progress.phase {
    ///         ProgressPhase::Rendering => println!("{}", progress.message),
    ///         ProgressPhase::Complete => println!("Done!"),
    ///     },
    /// ).unwrap();
    /// ```
    pub fn convert_with_progress<F>(
        &self,
        input: &Path,
        output: &Path,
        render: &RenderConfig,
        video_opts: &VideoOptions,
        on_progress: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(Progress),
    {
        let mut source = self.open_source(input, video_opts)?;
        let pipeline = Pipeline::new(render, &source)?;

        let source_path = source.path().to_path_buf();
        let mut primed = Primed::new(&mut source).map_err(|err| {
            tracing::warn!(error = %err, "first frame could not be decoded");
            Error::source_unreadable(source_path, err.to_string())
        })?;

        let file = File::create(output).map_err(|source| Error::OutputUnwritable {
            path: output.to_path_buf(),
            source,
        })?;
        pipeline.run(&mut primed, BufWriter::new(file), output, on_progress)
    }
}

impl Default for SubtitleConverter {
    fn default() -> Self {
        Self::new()
    }
}

fn warn_unused_video_options(opts: &VideoOptions) {
    if opts.start.is_some()
        || opts.end.is_some()
        || opts.resample.is_some()
        || opts.filter.is_some()
    {
        tracing::warn!("video decode options are ignored for image inputs");
    }
}
