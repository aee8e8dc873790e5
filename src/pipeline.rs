//! The frame → cue loop.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cue::{CueWriter, Fps, Timestamp};
use crate::error::{Error, Result};
use crate::render::{Dimensions, FrameRenderer, RenderConfig};
use crate::source::FrameSource;

/// Represents the current phase of a conversion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProgressPhase {
    /// Frames are being decoded, rendered and written
    Rendering,
    /// All frames written and the output flushed
    Complete,
}

/// Progress information for a conversion run
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// Cues written so far
    pub completed: u64,
    /// Expected number of cues (0 if unknown)
    pub total: u64,
    /// Percentage complete (0.0 to 100.0), 0.0 while the total is unknown
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn rendering(completed: u64, total: u64) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        let message = if total > 0 {
            format!("Rendering frame {} of {}", completed, total)
        } else {
            format!("Rendering frame {}", completed)
        };
        Self {
            phase: ProgressPhase::Rendering,
            completed,
            total,
            percentage,
            message,
        }
    }

    pub fn complete(frames: u64) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: frames,
            total: frames,
            percentage: 100.0,
            message: format!("Conversion complete: {} cues", frames),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub dimensions: Dimensions,
    /// End time of the last cue
    pub duration: Timestamp,
}

/// A renderer bound to one source's resolution.
///
/// Building a pipeline validates the config and fixes the glyph grid size, so
/// configuration errors surface before any output is opened.
#[derive(Debug, Clone)]
pub struct Pipeline {
    renderer: FrameRenderer,
    fps: Fps,
}

impl Pipeline {
    pub fn new<S: FrameSource + ?Sized>(config: &RenderConfig, source: &S) -> Result<Self> {
        let (width, height) = source.dimensions();
        let renderer = FrameRenderer::new(config, width, height)?;
        tracing::info!(width, height, "source dimensions");
        tracing::info!(
            columns = renderer.dimensions().width,
            rows = renderer.dimensions().height,
            "output dimensions"
        );
        Ok(Self {
            renderer,
            fps: config.fps,
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.renderer.dimensions()
    }

    /// Render every remaining frame of `source` as a cue on `output`.
    ///
    /// `output_path` only names the destination in errors. On a read failure
    /// the cues written so far are flushed before the error is returned.
    pub fn run<S, W, F>(
        &self,
        source: &mut S,
        output: W,
        output_path: &Path,
        mut on_progress: F,
    ) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        W: Write,
        F: FnMut(Progress),
    {
        let write_failed = |err| Error::WriteFailed {
            path: output_path.to_path_buf(),
            source: err,
        };
        let total = source.frame_count_hint().unwrap_or(0);
        let mut writer = CueWriter::new(output, self.fps);
        let mut duration = Timestamp::default();

        on_progress(Progress::rendering(0, total));
        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    let frames = writer.cues_written();
                    writer.flush().map_err(write_failed)?;
                    let path: PathBuf = source.path().to_path_buf();
                    tracing::warn!(frames, error = %err, "frame source failed");
                    return Err(if frames == 0 {
                        Error::SourceUnreadable {
                            path,
                            reason: err.to_string(),
                        }
                    } else {
                        Error::MidStreamReadFailure {
                            path,
                            frames,
                            source: err,
                        }
                    });
                }
            };

            let grid = self.renderer.render(&frame);
            duration = writer.write_grid(&grid).map_err(write_failed)?;

            let done = writer.cues_written();
            if done % 10 == 0 {
                tracing::debug!(frames = done, "processed frames");
            }
            on_progress(Progress::rendering(done, total.max(done)));
        }

        let frames = writer.cues_written();
        writer.into_inner().map_err(write_failed)?;
        on_progress(Progress::complete(frames));
        tracing::info!(frames, duration = %duration, "subtitle animation written");

        Ok(RunSummary {
            frames,
            dimensions: self.dimensions(),
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::source::{Frame, MemorySource};

    fn gray(width: u32, height: u32, v: u8) -> Frame {
        Frame::from_raw(width, height, vec![v; (width * height) as usize]).unwrap()
    }

    /// Yields `good` frames, then fails.
    struct Failing {
        good: u32,
    }

    impl FrameSource for Failing {
        fn path(&self) -> &Path {
            Path::new("broken.mp4")
        }

        fn dimensions(&self) -> (u32, u32) {
            (8, 8)
        }

        fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
            if self.good == 0 {
                return Err(DecodeError::Truncated { expected: 64, got: 10 });
            }
            self.good -= 1;
            Ok(Some(gray(8, 8, 255)))
        }
    }

    fn config() -> RenderConfig {
        RenderConfig::default().with_target_width(4)
    }

    #[test]
    fn writes_one_cue_per_frame() {
        let mut source = MemorySource::new(8, 8, (0..3).map(|_| gray(8, 8, 0)));
        let pipeline = Pipeline::new(&config(), &source).unwrap();
        let mut out = Vec::new();
        let summary = pipeline
            .run(&mut source, &mut out, Path::new("out.srt"), |_| {})
            .unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.dimensions, Dimensions { width: 4, height: 2 });
        assert_eq!(summary.duration.to_string(), "00:00:00,300");

        let text = String::from_utf8(out).unwrap();
        let expected = "1\n00:00:00,000 --> 00:00:00,100\n░░░░\n░░░░\n\n\
                        2\n00:00:00,100 --> 00:00:00,200\n░░░░\n░░░░\n\n\
                        3\n00:00:00,200 --> 00:00:00,300\n░░░░\n░░░░\n\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn empty_source_writes_nothing() {
        let mut source = MemorySource::new(8, 8, Vec::new());
        let pipeline = Pipeline::new(&config(), &source).unwrap();
        let mut out = Vec::new();
        let summary = pipeline
            .run(&mut source, &mut out, Path::new("out.srt"), |_| {})
            .unwrap();
        assert_eq!(summary.frames, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn degenerate_source_fails_before_running() {
        let source = MemorySource::new(1920, 20, Vec::new());
        let config = RenderConfig::default().with_target_width(2);
        let err = Pipeline::new(&config, &source).unwrap_err();
        assert!(matches!(err, Error::DegenerateDimensions { .. }));
    }

    #[test]
    fn mid_stream_failure_keeps_complete_cues() {
        let mut source = Failing { good: 2 };
        let pipeline = Pipeline::new(&config(), &source).unwrap();
        let mut out = Vec::new();
        let err = pipeline
            .run(&mut source, &mut out, Path::new("out.srt"), |_| {})
            .unwrap_err();

        match err {
            Error::MidStreamReadFailure { frames, path, .. } => {
                assert_eq!(frames, 2);
                assert_eq!(path, PathBuf::from("broken.mp4"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("1\n"));
        assert!(text.ends_with("00:00:00,100 --> 00:00:00,200\n████\n████\n\n"));
    }

    #[test]
    fn failure_on_first_frame_is_unreadable_source() {
        let mut source = Failing { good: 0 };
        let pipeline = Pipeline::new(&config(), &source).unwrap();
        let err = pipeline
            .run(&mut source, Vec::new(), Path::new("out.srt"), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnreadable { .. }));
    }

    #[test]
    fn reports_progress_through_completion() {
        let mut source = MemorySource::new(8, 8, (0..4).map(|_| gray(8, 8, 128)));
        let pipeline = Pipeline::new(&config(), &source).unwrap();
        let mut seen = Vec::new();
        pipeline
            .run(&mut source, Vec::new(), Path::new("out.srt"), |p| seen.push(p))
            .unwrap();

        assert_eq!(seen.first().map(|p| p.completed), Some(0));
        assert_eq!(seen.first().map(|p| p.total), Some(4));
        let last = seen.last().unwrap();
        assert_eq!(last.phase, ProgressPhase::Complete);
        assert_eq!(last.completed, 4);
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn progress_percentage_handles_unknown_totals() {
        assert_eq!(Progress::rendering(5, 0).percentage, 0.0);
        assert_eq!(Progress::rendering(5, 10).percentage, 50.0);
        assert!(Progress::rendering(3, 0).message.ends_with("frame 3"));
    }
}
