//! Video decoding through the `ffprobe` and `ffmpeg` command line tools.
//!
//! Frames are streamed from ffmpeg's stdout as raw 8-bit gray pixels, one
//! frame at a time, so memory use does not depend on the video's length.

use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command as ProcCommand, Stdio};
use std::thread::JoinHandle;

use crate::cue::Fps;
use crate::error::{DecodeError, Error, Result};
use crate::source::{Frame, FrameSource};

/// Names or paths of the ffmpeg binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &str {
        &self.ffmpeg
    }

    pub fn ffprobe_cmd(&self) -> &str {
        &self.ffprobe
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FilterPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub filter: &'static str,
}

/// ffmpeg filter chains applied before frames are converted to gray.
pub const FILTER_PRESETS: &[FilterPreset] = &[
    FilterPreset {
        name: "contours",
        description: "Edge detection; shapes become outlines of dark blocks.",
        filter: "format=gray,edgedetect=mode=wires:high=0.2:low=0.05",
    },
    FilterPreset {
        name: "high-contrast",
        description: "Stretch contrast so mid tones spread over all four shades.",
        filter: "format=gray,eq=contrast=1.8:brightness=-0.05",
    },
    FilterPreset {
        name: "invert",
        description: "Swap light and dark, for players that draw on a light background.",
        filter: "format=gray,negate",
    },
    FilterPreset {
        name: "smooth",
        description: "Light blur to calm flicker between frames.",
        filter: "format=gray,gblur=sigma=1.5",
    },
];

pub fn find_filter_preset(name: &str) -> Option<&'static FilterPreset> {
    FILTER_PRESETS
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
}

/// Pick the raw filter if given, otherwise the named preset's filter.
pub fn resolve_filter(filter: Option<&str>, preset: Option<&str>) -> Result<Option<String>> {
    if let Some(filter) = filter {
        let filter = filter.trim();
        if filter.is_empty() {
            return Err(Error::invalid_config("--filter cannot be empty"));
        }
        return Ok(Some(filter.to_string()));
    }

    if let Some(name) = preset {
        let preset = find_filter_preset(name.trim()).ok_or_else(|| {
            let available = FILTER_PRESETS
                .iter()
                .map(|p| p.name)
                .collect::<Vec<_>>()
                .join(", ");
            Error::invalid_config(format!(
                "unknown filter preset '{}'. Available presets: {}",
                name, available
            ))
        })?;
        return Ok(Some(preset.filter.to_string()));
    }

    Ok(None)
}

/// Decode-side options for video inputs.
#[derive(Debug, Clone, Default)]
pub struct VideoOptions {
    /// Start of the decoded window (e.g. `"00:01:23.456"` or `"83.456"`)
    pub start: Option<String>,
    /// End of the decoded window, same formats as `start`
    pub end: Option<String>,
    /// Have ffmpeg drop or duplicate frames to emit exactly this rate
    pub resample: Option<Fps>,
    /// Extra ffmpeg filter chain run before gray conversion
    pub filter: Option<String>,
}

impl VideoOptions {
    fn has_window(&self) -> bool {
        self.start.as_deref().is_some_and(|s| !s.trim().is_empty())
            || self.end.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Seconds from `SS[.fff]`, `MM:SS[.fff]` or `HH:MM:SS[.fff]`.
pub fn parse_timestamp(s: &str) -> Result<f64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::invalid_config("empty timestamp"));
    }
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return Err(Error::invalid_config(format!("invalid timestamp '{}'", s)));
    }
    parts.iter().rev().enumerate().try_fold(0.0, |acc, (i, v)| -> Result<f64> {
        let v: f64 = v
            .trim()
            .parse()
            .map_err(|_| Error::invalid_config(format!("invalid timestamp '{}'", s)))?;
        if !v.is_finite() || v < 0.0 {
            return Err(Error::invalid_config(format!("invalid timestamp '{}'", s)));
        }
        Ok(acc + v * 60f64.powi(i as i32))
    })
}

pub(crate) fn build_video_filter(filter: Option<&str>, resample: Option<Fps>) -> Option<String> {
    let filter = filter
        .map(str::trim)
        .map(|s| s.trim_end_matches(','))
        .filter(|s| !s.is_empty());
    let rate = resample.map(|fps| format!("fps={}", fps));
    match (filter, rate) {
        (Some(f), Some(r)) => Some(format!("{},{}", f, r)),
        (Some(f), None) => Some(f.to_string()),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

/// ffmpeg arguments (without the binary) that stream `input` as raw gray frames.
pub(crate) fn build_decode_args(input: &Path, opts: &VideoOptions) -> Result<Vec<String>> {
    let mut args: Vec<String> = vec!["-v".into(), "error".into(), "-nostdin".into()];

    let start = opts
        .start
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_timestamp)
        .transpose()?
        .filter(|s| *s > 0.0);
    let end = opts
        .end
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_timestamp)
        .transpose()?;

    if let Some(s) = start {
        args.push("-ss".into());
        args.push(s.to_string());
    }

    args.push("-i".into());
    args.push(input.to_string_lossy().into_owned());

    if let Some(e) = end {
        let duration = e - start.unwrap_or(0.0);
        if duration <= 0.0 {
            return Err(Error::invalid_config(format!(
                "end time {} is not after start time {}",
                e,
                start.unwrap_or(0.0)
            )));
        }
        args.push("-t".into());
        args.push(duration.to_string());
    }

    if let Some(vf) = build_video_filter(opts.filter.as_deref(), opts.resample) {
        args.push("-vf".into());
        args.push(vf);
    }

    for a in ["-an", "-sn", "-f", "rawvideo", "-pix_fmt", "gray", "pipe:1"] {
        args.push(a.into());
    }
    Ok(args)
}

/// What `ffprobe` reports about the first video stream.
///
/// `width` and `height` are the displayed size: ffmpeg auto-rotates on decode,
/// so a stream tagged with a quarter-turn rotation has its coded size swapped.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Display rotation in degrees, normalised to `0..360`
    pub rotation: u32,
    pub frame_rate: Option<Fps>,
    pub frame_count: Option<u64>,
    pub duration_sec: Option<f64>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    tags: Option<ProbeTags>,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

impl ProbeStream {
    /// Display-matrix rotation, falling back to the older `rotate` tag.
    fn rotation(&self) -> u32 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|sd| sd.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .filter(|r| r.is_finite())
            .unwrap_or(0.0);
        ((degrees / 90.0).round() as i64 * 90).rem_euclid(360) as u32
    }
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

pub(crate) fn parse_probe_output(path: &Path, json: &[u8]) -> Result<VideoInfo> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| Error::source_unreadable(path, format!("ffprobe json parse failed: {}", e)))?;
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| Error::source_unreadable(path, "no video stream found"))?;
    let width = stream
        .width
        .ok_or_else(|| Error::source_unreadable(path, "ffprobe reported no width"))?;
    let height = stream
        .height
        .ok_or_else(|| Error::source_unreadable(path, "ffprobe reported no height"))?;
    let rotation = stream.rotation();
    let (width, height) = if rotation % 180 == 90 {
        (height, width)
    } else {
        (width, height)
    };

    Ok(VideoInfo {
        width,
        height,
        rotation,
        frame_rate: stream
            .r_frame_rate
            .as_deref()
            .and_then(|r| r.parse::<Fps>().ok()),
        frame_count: stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n > 0),
        duration_sec: parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0),
    })
}

pub fn probe_video(path: &Path, config: &FfmpegConfig) -> Result<VideoInfo> {
    if !path.is_file() {
        return Err(Error::source_unreadable(path, "no such file"));
    }

    tracing::debug!(ffprobe = config.ffprobe_cmd(), path = %path.display(), "probing video");
    let out = ProcCommand::new(config.ffprobe_cmd())
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::source_unreadable(path, format!("failed to run ffprobe: {}", e)))?;

    if !out.status.success() {
        return Err(Error::source_unreadable(
            path,
            format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        ));
    }

    parse_probe_output(path, &out.stdout)
}

/// Frames decoded by an ffmpeg child process.
///
/// Dropping the source before it is exhausted kills the child.
pub struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    hint: Option<u64>,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path, config: &FfmpegConfig, opts: &VideoOptions) -> Result<Self> {
        let info = probe_video(path, config)?;
        let args = build_decode_args(path, opts)?;
        let frame_len = info.width as usize * info.height as usize;

        let hint = if opts.has_window() {
            None
        } else if let Some(fps) = opts.resample {
            info.duration_sec
                .map(|d| (d * fps.as_f64()).round() as u64)
        } else {
            info.frame_count
        };

        tracing::debug!(ffmpeg = config.ffmpeg_cmd(), args = ?args, "spawning decoder");
        let mut child = ProcCommand::new(config.ffmpeg_cmd())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::source_unreadable(path, format!("failed to run ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::source_unreadable(path, "ffmpeg stdout unavailable"))?;
        // Drained on its own thread so a chatty ffmpeg never blocks on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        Ok(Self {
            path: path.to_path_buf(),
            info,
            hint,
            child,
            stdout: BufReader::new(stdout),
            stderr,
            frame_len,
            finished: false,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Reap the child and turn a failed exit into an error.
    fn finish(&mut self) -> std::result::Result<(), DecodeError> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(DecodeError::Process {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Fill `buf` from `reader`, returning how many bytes were read before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl FrameSource for FfmpegSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
        if self.finished {
            return Ok(None);
        }
        if self.frame_len == 0 {
            self.finish()?;
            return Err(DecodeError::Other("video reports a zero-sized frame".into()));
        }

        let mut buf = vec![0u8; self.frame_len];
        let got = read_full(&mut self.stdout, &mut buf)?;
        if got == 0 {
            self.finish()?;
            return Ok(None);
        }
        if got < self.frame_len {
            // A failed exit explains a short frame better than the byte count.
            self.finish()?;
            return Err(DecodeError::Truncated {
                expected: self.frame_len,
                got,
            });
        }

        Frame::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| DecodeError::Other("frame buffer size mismatch".into()))
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.hint
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}
