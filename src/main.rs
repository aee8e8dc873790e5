use anyhow::{bail, Context, Result};
use cascii_srt::ffmpeg::{resolve_filter, FILTER_PRESETS};
use cascii_srt::{AppConfig, Fps, Progress, ProgressPhase, SubtitleConverter, VideoOptions};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::Level;

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(p) = explicit {
        return AppConfig::from_path(p).with_context(|| format!("loading config {}", p.display()));
    }

    // Look in the user config dir, then the working directory, then fall back to built-ins
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(d) = dirs::config_dir() {
        let d = d.join("cascii-srt");
        tried.push(d.join("config.toml"));
        tried.push(d.join("config.json"));
    }
    tried.push(PathBuf::from("cascii-srt.toml"));
    tried.push(PathBuf::from("cascii-srt.json"));

    for p in &tried {
        if p.exists() {
            tracing::debug!(path = %p.display(), "using config file");
            return AppConfig::from_path(p)
                .with_context(|| format!("loading config {}", p.display()));
        }
    }

    Ok(AppConfig::default())
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Render a video as a Unicode block animation inside an SRT subtitle file."
)]
struct Args {
    /// Input video file, directory of frames, or single image
    #[arg(required_unless_present = "list_filter_presets")]
    input: Option<PathBuf>,

    /// Output subtitle file (overwritten if it exists)
    #[arg(required_unless_present = "list_filter_presets")]
    output: Option<PathBuf>,

    /// Glyph columns per frame (default 40)
    #[arg(long, short = 'w')]
    width: Option<u32>,

    /// Cue rate, e.g. 10, 23.976 or 30000/1001 (default 10)
    #[arg(long)]
    fps: Option<Fps>,

    /// Named width/fps preset from the config file
    #[arg(long)]
    preset: Option<String>,

    /// Start time for video conversion (e.g., 00:01:23.456 or 83.456)
    #[arg(long)]
    start: Option<String>,

    /// End time for video conversion (e.g., 00:01:23.456 or 83.456)
    #[arg(long)]
    end: Option<String>,

    /// Have ffmpeg resample the video to the cue rate so cues track real time
    #[arg(long, default_value_t = false)]
    resample: bool,

    /// Raw ffmpeg filter chain applied before rendering
    #[arg(long, conflicts_with = "filter_preset")]
    filter: Option<String>,

    /// Named ffmpeg filter preset (see --list-filter-presets)
    #[arg(long)]
    filter_preset: Option<String>,

    /// Print the available filter presets and exit
    #[arg(long, default_value_t = false)]
    list_filter_presets: bool,

    /// Config file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only print errors
    #[arg(long, short, default_value_t = false)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} cues")
            .unwrap(),
    );
    Some(pb)
}

fn update_progress(pb: &ProgressBar, progress: &Progress) {
    match progress.phase {
        ProgressPhase::Rendering => {
            if progress.total > 0 && pb.length() != Some(progress.total) {
                pb.set_length(progress.total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
                        .unwrap()
                        .progress_chars("#>-"),
                );
            }
            pb.set_position(progress.completed);
        }
        ProgressPhase::Complete => pb.finish_with_message(progress.message.clone()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_filter_presets {
        for preset in FILTER_PRESETS {
            println!("{:<14} {}", preset.name, preset.description);
        }
        return Ok(());
    }

    init_logging(args.verbose, args.quiet);

    let (Some(input), Some(output)) = (args.input.as_deref(), args.output.as_deref()) else {
        bail!("both an input and an output path are required");
    };

    let cfg = load_config(args.config.as_deref())?;
    let converter = SubtitleConverter::with_config(cfg.clone())?;

    let mut render = cfg.render_config(args.preset.as_deref())?;
    if let Some(width) = args.width {
        render = render.with_target_width(width);
    }
    if let Some(fps) = args.fps {
        render = render.with_fps(fps);
    }

    let video_opts = VideoOptions {
        start: args.start.clone(),
        end: args.end.clone(),
        resample: args.resample.then_some(render.fps),
        filter: resolve_filter(args.filter.as_deref(), args.filter_preset.as_deref())?,
    };

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        columns = render.target_width,
        fps = %render.fps,
        "converting"
    );

    let pb = progress_bar(args.quiet);
    let summary = converter
        .convert_with_progress(input, output, &render, &video_opts, |progress| {
            if let Some(pb) = &pb {
                update_progress(pb, &progress);
            }
        })
        .with_context(|| format!("converting {}", input.display()))?;

    if !args.quiet {
        println!(
            "Done! Wrote {} cues ({} glyphs, {}) to {}",
            summary.frames,
            summary.dimensions,
            summary.duration,
            output.display()
        );
    }
    Ok(())
}
