//! # chromascii - Color ASCII Video Renderer
//!
//! `chromascii` turns a video into an ASCII-art video that keeps the colors of
//! the original.
//!
//! ## Features
//!
//! - Area-averaged, aspect-corrected downsampling to a character grid
//! - Linear luminance quantization onto a density-ordered glyph ramp
//! - Anti-aliased glyphs drawn in each cell's original color on black
//! - Output codec negotiation with an ordered fallback list
//! - Progress reporting for integration with UI applications
//!
//! Decoding and encoding go through the `ffmpeg` and `ffprobe` executables,
//! which must be installed.
//!
//! ## Example
//!
//! ```no_run
//! use chromascii::{AsciiWidth, VideoConverter};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = VideoConverter::new();
//! let summary = converter.convert_video(
//!     Path::new("input.mp4"),
//!     Path::new("ascii.mp4"),
//!     AsciiWidth::new(120)?,
//! )?;
//! println!("{} frames encoded with {}", summary.frames_written, summary.codec);
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use chromascii::{AsciiWidth, ProgressPhase, VideoConverter};
//! use std::path::Path;
//!
//! let converter = VideoConverter::new();
//! converter
//!     .convert_video_with_progress(
//!         Path::new("input.mp4"),
//!         Path::new("ascii.mp4"),
//!         AsciiWidth::default(),
//!         |progress| match progress.phase {
//!             ProgressPhase::ConvertingFrames => {
//!                 println!("Converting: {}/{} ({:.1}%)",
//!                     progress.completed, progress.total, progress.percentage);
//!             }
//!             ProgressPhase::Complete => println!("Done!"),
//!         },
//!     )
//!     .unwrap();
//! ```

pub mod config;
pub mod downsample;
pub mod error;
pub mod font;
pub mod glyph;
pub mod pipeline;
pub mod ramp;
pub mod raster;
pub mod scratch;
pub mod sink;
pub mod source;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use config::{AsciiWidth, FfmpegConfig, LuminanceWeights, RenderConfig};
pub use error::{CodecFailures, ConvertError, Result};
pub use glyph::{AsciiGrid, Cell};
pub use pipeline::{
    FrameSample, NoopObserver, PipelineDriver, PipelineObserver, PipelineState, RunSummary,
    SampledCell, SinkRequest,
};
pub use ramp::CharacterRamp;
pub use raster::{CellLayout, GlyphPainter};
pub use sink::{FfmpegSink, FrameSink};
pub use source::{FfmpegSource, FrameRate, FrameSource, VideoInfo};

/// Represents the current phase of a conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Frames are being rendered and encoded
    ConvertingFrames,
    /// Conversion completed successfully
    Complete,
}

/// Progress information for conversion operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Current phase of the conversion
    pub phase: ProgressPhase,
    /// Number of frames written so far
    pub completed: u64,
    /// Total number of frames (0 if unknown)
    pub total: u64,
    /// Percentage complete (0.0 to 100.0 when the total is known)
    pub percentage: f64,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    /// Create a progress update for frame conversion
    pub fn converting_frames(completed: u64, total: u64) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::ConvertingFrames,
            completed,
            total,
            percentage,
            message: format!("Progress: {}/{} frames ({:.1}%)", completed, total, percentage),
        }
    }

    /// Create a completion progress update
    pub fn complete(total_frames: u64) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total_frames,
            total: total_frames,
            percentage: 100.0,
            message: format!("Conversion complete: {} frames", total_frames),
        }
    }
}

/// Forwards progress updates to a closure.
struct ProgressCallback<F>(F);

impl<F: FnMut(Progress)> PipelineObserver for ProgressCallback<F> {
    fn on_progress(&mut self, progress: &Progress) {
        (self.0)(progress.clone())
    }
}

/// Main entry point for rendering videos as color ASCII art
pub struct VideoConverter {
    config: RenderConfig,
}

impl VideoConverter {
    /// Create a converter with the built-in configuration
    pub fn new() -> Self {
        Self {
            config: RenderConfig::default(),
        }
    }

    /// Create a converter with a custom configuration
    pub fn with_config(config: RenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load configuration from a JSON or TOML file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self {
            config: RenderConfig::from_file(path)?,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `input` into `output` with a grid `width` characters wide
    pub fn convert_video(&self, input: &Path, output: &Path, width: AsciiWidth) -> Result<RunSummary> {
        convert_video(input, output, width, &self.config, &mut NoopObserver)
    }

    /// Like [`VideoConverter::convert_video`], calling `progress_callback`
    /// every `progress_interval` frames and on completion
    pub fn convert_video_with_progress<F>(&self, input: &Path, output: &Path, width: AsciiWidth, progress_callback: F) -> Result<RunSummary>
    where
        F: FnMut(Progress),
    {
        convert_video(input, output, width, &self.config, &mut ProgressCallback(progress_callback))
    }

    /// Full control: any [`PipelineObserver`] receives state changes,
    /// progress, and the first-frame sample
    pub fn convert_video_observed(&self, input: &Path, output: &Path, width: AsciiWidth, observer: &mut dyn PipelineObserver) -> Result<RunSummary> {
        convert_video(input, output, width, &self.config, observer)
    }
}

impl Default for VideoConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire the ffmpeg-backed source and sink and a font painter into a
/// [`PipelineDriver`] and run it.
///
/// The font is resolved before the input is touched, so a missing font fails
/// without any video I/O.
pub fn convert_video(input: &Path, output: &Path, width: AsciiWidth, config: &RenderConfig, observer: &mut dyn PipelineObserver) -> Result<RunSummary> {
    config.validate()?;
    let font_path = font::resolve_font_path(config.font_path.as_deref())?;
    log::debug!("drawing glyphs with {}", font_path.display());
    let painter = font::FontPainter::from_file(&font_path, config.cell_height as f32 * config.font_scale)?;
    let widest = painter.max_advance(config.character_ramp()?.glyphs());
    if widest > config.cell_width as f32 {
        log::warn!(
            "glyphs up to {:.1} px wide overflow {} px cells; lower font_scale to keep them apart",
            widest,
            config.cell_width
        );
    }

    let mut driver = PipelineDriver::new(config, painter)?;
    driver.run(
        width,
        || FfmpegSource::open(input, &config.ffmpeg),
        |request| {
            FfmpegSink::open(
                output,
                &config.codecs,
                request.frame_rate,
                request.frame_size,
                &config.ffmpeg,
            )
        },
        observer,
    )
}
