use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::ramp::{CharacterRamp, DEFAULT_RAMP};

/// Name used for the config directory and file stem.
pub const CONFIG_NAME: &str = "chromascii";

/// Weights applied to R, G and B before dividing by 255.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LuminanceWeights {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Default for LuminanceWeights {
    fn default() -> Self {
        Self {
            r: 0.299,
            g: 0.587,
            b: 0.114,
        }
    }
}

/// Locations of the ffmpeg executables; `None` means "look up on PATH".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FfmpegConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &Path {
        self.ffmpeg_path.as_deref().unwrap_or(Path::new("ffmpeg"))
    }

    pub fn ffprobe_cmd(&self) -> &Path {
        self.ffprobe_path.as_deref().unwrap_or(Path::new("ffprobe"))
    }
}

fn default_ramp() -> String {
    DEFAULT_RAMP.to_string()
}
fn default_cell_width() -> u32 {
    6
}
fn default_cell_height() -> u32 {
    12
}
fn default_font_scale() -> f32 {
    0.8
}
fn default_vertical_trim() -> u32 {
    2
}
fn default_codecs() -> Vec<String> {
    vec!["mpeg4".to_string(), "libx264".to_string()]
}
fn default_progress_interval() -> u64 {
    30
}
fn default_sample_columns() -> u32 {
    3
}
fn default_sample_rows() -> u32 {
    2
}

/// Rendering constants for one conversion run.
///
/// Every field has a default, so config files only need to name the values
/// they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Glyphs ordered from sparsest to densest
    #[serde(default = "default_ramp")]
    pub ramp: String,
    /// Output pixels per grid cell, horizontally
    #[serde(default = "default_cell_width")]
    pub cell_width: u32,
    /// Output pixels per grid cell, vertically
    #[serde(default = "default_cell_height")]
    pub cell_height: u32,
    /// Glyph pixel height as a fraction of `cell_height`. Monospace fonts
    /// advance about 0.5 of their pixel height, so at 0.8 a glyph in the
    /// default 6x12 cell stays inside it; larger values let neighbors overlap.
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
    /// Pixels the glyph baseline sits above the bottom of its cell
    #[serde(default = "default_vertical_trim")]
    pub vertical_trim: u32,
    #[serde(default)]
    pub luminance_weights: LuminanceWeights,
    /// ffmpeg encoder names, tried in order
    #[serde(default = "default_codecs")]
    pub codecs: Vec<String>,
    /// Report progress every this many frames
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Font file to draw glyphs with; system fonts are searched when unset
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    /// Columns and rows of the first frame reported to the sampling hook
    #[serde(default = "default_sample_columns")]
    pub sample_columns: u32,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: u32,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ramp: default_ramp(),
            cell_width: default_cell_width(),
            cell_height: default_cell_height(),
            font_scale: default_font_scale(),
            vertical_trim: default_vertical_trim(),
            luminance_weights: LuminanceWeights::default(),
            codecs: default_codecs(),
            progress_interval: default_progress_interval(),
            font_path: None,
            sample_columns: default_sample_columns(),
            sample_rows: default_sample_rows(),
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl RenderConfig {
    pub fn with_ramp(mut self, ramp: impl Into<String>) -> Self {
        self.ramp = ramp.into();
        self
    }

    pub fn with_cell_size(mut self, width: u32, height: u32) -> Self {
        self.cell_width = width;
        self.cell_height = height;
        self
    }

    pub fn with_font_scale(mut self, font_scale: f32) -> Self {
        self.font_scale = font_scale;
        self
    }

    pub fn with_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codecs = codecs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn with_progress_interval(mut self, frames: u64) -> Self {
        self.progress_interval = frames;
        self
    }

    /// Build the glyph ramp described by this config.
    pub fn character_ramp(&self) -> Result<CharacterRamp> {
        CharacterRamp::new(&self.ramp)
    }

    pub fn validate(&self) -> Result<()> {
        self.character_ramp()?;
        if self.cell_width == 0 || self.cell_height == 0 {
            return Err(ConvertError::Config(format!(
                "cell size must be non-zero, got {}x{}",
                self.cell_width, self.cell_height
            )));
        }
        if self.vertical_trim >= self.cell_height {
            return Err(ConvertError::Config(format!(
                "vertical trim {} must be smaller than cell height {}",
                self.vertical_trim, self.cell_height
            )));
        }
        if !(self.font_scale.is_finite() && self.font_scale > 0.0) {
            return Err(ConvertError::Config(format!(
                "font scale must be positive, got {}",
                self.font_scale
            )));
        }
        let w = self.luminance_weights;
        if [w.r, w.g, w.b].iter().any(|v| !v.is_finite()) {
            return Err(ConvertError::Config(
                "luminance weights must be finite".to_string(),
            ));
        }
        if self.codecs.iter().all(|c| c.trim().is_empty()) {
            return Err(ConvertError::Config(
                "at least one output codec is required".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(ConvertError::Config(
                "progress interval must be at least 1 frame".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a config file; `.toml` files are read as TOML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("reading config {}: {}", path.display(), e))
        })?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let config: RenderConfig = if is_toml {
            toml::from_str(&text).map_err(|e| {
                ConvertError::Config(format!("parsing config {}: {}", path.display(), e))
            })?
        } else {
            serde_json::from_str(&text).map_err(|e| {
                ConvertError::Config(format!("parsing config {}: {}", path.display(), e))
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Look for a config in the app data dir, then the current dir, then fall
    /// back to built-in defaults.
    pub fn discover() -> Result<Self> {
        for path in config_candidates() {
            if path.exists() {
                log::debug!("using config {}", path.display());
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }
}

fn config_candidates() -> Vec<PathBuf> {
    let mut dirs_to_try: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push(CONFIG_NAME);
        dirs_to_try.push(d);
    }
    dirs_to_try.push(PathBuf::from("."));

    let mut tried = Vec::new();
    for dir in dirs_to_try {
        for ext in ["json", "toml"] {
            tried.push(dir.join(format!("{}.{}", CONFIG_NAME, ext)));
        }
    }
    tried
}

/// Grid width in characters, always within `MIN..=MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AsciiWidth(u32);

impl AsciiWidth {
    pub const MIN: u32 = 20;
    pub const MAX: u32 = 300;
    pub const DEFAULT: AsciiWidth = AsciiWidth(80);

    pub fn new(columns: u32) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&columns) {
            return Err(ConvertError::Arg(format!(
                "ASCII width must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                columns
            )));
        }
        Ok(Self(columns))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for AsciiWidth {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for AsciiWidth {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        let columns = s
            .trim()
            .parse::<u32>()
            .map_err(|_| ConvertError::Arg(format!("ASCII width must be a number, got '{}'", s)))?;
        Self::new(columns)
    }
}

impl fmt::Display for AsciiWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
