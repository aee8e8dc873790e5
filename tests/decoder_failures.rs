//! ffmpeg decoding failures, driven by stand-in `ffprobe`/`ffmpeg` shell scripts
//! so they run without the real tools installed.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::OnceLock;

use cascii_srt::{
    AppConfig, DecodeError, Error, FfmpegConfig, RenderConfig, SubtitleConverter, VideoOptions,
};

/// 8x4 gray frames, 32 bytes each.
const PROBE_JSON: &str = r#"{
  "streams": [{"width": 8, "height": 4, "r_frame_rate": "10/1", "nb_frames": "3"}],
  "format": {"duration": "0.3"}
}"#;

const DECODERS: &[(&str, &str)] = &[
    ("three-frames", "head -c 96 /dev/zero\nexit 0\n"),
    ("frame-and-a-half", "head -c 48 /dev/zero\nexit 0\n"),
    (
        "two-frames-then-fail",
        "head -c 64 /dev/zero\necho 'corrupt packet' >&2\nexit 1\n",
    ),
    (
        "fail-immediately",
        "echo 'Invalid data found when processing input' >&2\nexit 1\n",
    ),
];

/// All scripts are written once, before any test spawns a process, so no
/// script is still open for writing when another thread execs it.
fn tools() -> &'static Path {
    static TOOLS: OnceLock<tempfile::TempDir> = OnceLock::new();
    TOOLS
        .get_or_init(|| {
            let dir = tempfile::tempdir().unwrap();
            write_script(&dir.path().join("ffprobe"), &format!("echo '{}'\n", PROBE_JSON));
            for (name, body) in DECODERS {
                write_script(&dir.path().join(name), body);
            }
            fs::write(dir.path().join("clip.mp4"), b"not really a video").unwrap();
            dir
        })
        .path()
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn converter(decoder: &str) -> SubtitleConverter {
    let tools = tools();
    let config = AppConfig {
        ffmpeg: FfmpegConfig {
            ffmpeg: tools.join(decoder).to_string_lossy().into_owned(),
            ffprobe: tools.join("ffprobe").to_string_lossy().into_owned(),
        },
        ..AppConfig::default()
    };
    SubtitleConverter::with_config(config).unwrap()
}

fn convert(decoder: &str, out: &Path) -> cascii_srt::Result<cascii_srt::RunSummary> {
    converter(decoder).convert(
        &tools().join("clip.mp4"),
        out,
        &RenderConfig::default().with_target_width(8),
        &VideoOptions::default(),
    )
}

fn cue_count(path: &Path) -> usize {
    fs::read_to_string(path)
        .unwrap()
        .split_terminator("\n\n")
        .count()
}

#[test]
fn clean_exit_at_a_frame_boundary_ends_the_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("ok.srt");

    let summary = convert("three-frames", &out).unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!((summary.dimensions.width, summary.dimensions.height), (8, 2));
    assert_eq!(summary.duration.to_string(), "00:00:00,300");
    assert_eq!(cue_count(&out), 3);
}

#[test]
fn short_last_frame_is_a_truncation_after_earlier_cues() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("short.srt");

    match convert("frame-and-a-half", &out).unwrap_err() {
        Error::MidStreamReadFailure {
            frames,
            source: DecodeError::Truncated { expected, got },
            ..
        } => {
            assert_eq!(frames, 1);
            assert_eq!((expected, got), (32, 16));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cue_count(&out), 1);
}

#[test]
fn failed_exit_after_whole_frames_keeps_them() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("partial.srt");

    match convert("two-frames-then-fail", &out).unwrap_err() {
        Error::MidStreamReadFailure {
            frames,
            source: DecodeError::Process { stderr, .. },
            ..
        } => {
            assert_eq!(frames, 2);
            assert!(stderr.contains("corrupt packet"), "stderr was {stderr:?}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cue_count(&out), 2);
}

#[test]
fn undecodable_video_leaves_existing_output_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("keep.srt");
    let previous = "1\n00:00:00,000 --> 00:00:00,100\n████\n\n";
    fs::write(&out, previous).unwrap();

    match convert("fail-immediately", &out).unwrap_err() {
        Error::SourceUnreadable { reason, .. } => {
            assert!(reason.contains("Invalid data"), "reason was {reason:?}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fs::read_to_string(&out).unwrap(), previous);
}

#[test]
fn undecodable_video_does_not_create_the_output() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("never.srt");

    let err = convert("fail-immediately", &out).unwrap_err();
    assert!(matches!(err, Error::SourceUnreadable { .. }));
    assert!(!out.exists());
}
