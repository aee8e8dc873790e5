//! Application configuration: presets and ffmpeg tool locations.
//!
//! Config files are JSON or TOML, chosen by extension. Every field is
//! optional; missing ones fall back to the built-in defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::cue::Fps;
use crate::error::{Error, Result};
use crate::ffmpeg::FfmpegConfig;
use crate::render::{RenderConfig, DEFAULT_TARGET_WIDTH};

/// A named width/frame-rate pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub target_width: u32,
    #[serde(default)]
    pub fps: Fps,
}

fn default_presets() -> BTreeMap<String, Preset> {
    let fps = Fps::default();
    BTreeMap::from([
        (
            "default".to_string(),
            Preset {
                target_width: DEFAULT_TARGET_WIDTH,
                fps,
            },
        ),
        (
            "small".to_string(),
            Preset {
                target_width: 24,
                fps,
            },
        ),
        (
            "large".to_string(),
            Preset {
                target_width: 80,
                fps,
            },
        ),
    ])
}

fn default_preset_name() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_presets")]
    pub presets: BTreeMap<String, Preset>,
    #[serde(default = "default_preset_name")]
    pub default_preset: String,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            presets: default_presets(),
            default_preset: default_preset_name(),
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: AppConfig = serde_json::from_str(text)
            .map_err(|e| Error::invalid_config(format!("parsing config json: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(text)
            .map_err(|e| Error::invalid_config(format!("parsing config toml: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a `.json` or `.toml` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("reading config {}: {}", path.display(), e))
        })?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            Self::from_toml(&text)
        } else {
            Self::from_json(&text)
        };
        parsed.map_err(|e| match e {
            Error::InvalidConfig(msg) => {
                Error::InvalidConfig(format!("{} (in {})", msg, path.display()))
            }
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((name, _)) = self.presets.iter().find(|(_, p)| p.target_width == 0) {
            return Err(Error::invalid_config(format!(
                "preset '{}' has a target width of 0",
                name
            )));
        }
        if !self.presets.contains_key(&self.default_preset) {
            return Err(Error::invalid_config(format!(
                "default preset '{}' is not defined",
                self.default_preset
            )));
        }
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Result<&Preset> {
        self.presets.get(name).ok_or_else(|| {
            let available = self.presets.keys().cloned().collect::<Vec<_>>().join(", ");
            Error::invalid_config(format!(
                "preset '{}' not found. Available presets: {}",
                name, available
            ))
        })
    }

    /// Render settings for a preset, or the default preset when `name` is `None`.
    pub fn render_config(&self, name: Option<&str>) -> Result<RenderConfig> {
        let preset = self.preset(name.unwrap_or(&self.default_preset))?;
        Ok(RenderConfig::default()
            .with_target_width(preset.target_width)
            .with_fps(preset.fps))
    }
}
