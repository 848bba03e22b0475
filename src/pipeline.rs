//! Per-frame orchestration: decode, downsample, map, rasterize, encode.
//!
//! The driver owns the source and the sink for the whole run. Both are plain
//! locals of [`PipelineDriver::run`], so every exit path, including `?`,
//! drops them before the result reaches the caller.

use image::Rgb;

use crate::config::{AsciiWidth, RenderConfig};
use crate::downsample::{downsample, grid_height};
use crate::error::Result;
use crate::glyph::{clamp_unit, map_frame, AsciiGrid};
use crate::ramp::CharacterRamp;
use crate::raster::{rasterize, CellLayout, GlyphPainter};
use crate::sink::FrameSink;
use crate::source::{FrameRate, FrameSource};
use crate::Progress;

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    SourceOpened,
    GridComputed,
    SinkOpened,
    Streaming,
    Finished,
    Failed,
}

/// What the sink must be opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkRequest {
    pub frame_rate: FrameRate,
    pub frame_size: (u32, u32),
}

/// One cell of the first frame, as reported to the sampling hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledCell {
    pub x: u32,
    pub y: u32,
    pub brightness: f64,
    pub glyph: char,
    pub color: Rgb<u8>,
}

/// The top-left corner of the first rendered grid.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub grid_size: (u32, u32),
    pub cells: Vec<SampledCell>,
}

/// Hooks for watching a run. All methods default to doing nothing.
pub trait PipelineObserver {
    fn on_state(&mut self, _state: PipelineState) {}

    /// Called every `progress_interval` frames, and once more on completion.
    fn on_progress(&mut self, _progress: &Progress) {}

    /// Called exactly once, after the first frame has been written.
    fn on_first_frame(&mut self, _sample: &FrameSample) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_written: u64,
    pub grid_size: (u32, u32),
    pub output_size: (u32, u32),
    pub codec: String,
}

pub struct PipelineDriver<'a, P> {
    config: &'a RenderConfig,
    ramp: CharacterRamp,
    layout: CellLayout,
    painter: P,
    state: PipelineState,
    frames: u64,
}

impl<'a, P: GlyphPainter> PipelineDriver<'a, P> {
    pub fn new(config: &'a RenderConfig, painter: P) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ramp: config.character_ramp()?,
            layout: CellLayout {
                cell_width: config.cell_width,
                cell_height: config.cell_height,
                vertical_trim: config.vertical_trim,
            },
            painter,
            state: PipelineState::Idle,
            frames: 0,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Frames fully written during the current or last run.
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn ramp(&self) -> &CharacterRamp {
        &self.ramp
    }

    /// Run the pipeline once.
    ///
    /// `open_source` and `open_sink` are called at most once each; the sink
    /// is only opened after the grid size is known.
    pub fn run<S, K, OS, OK>(&mut self, width: AsciiWidth, open_source: OS, open_sink: OK, observer: &mut dyn PipelineObserver) -> Result<RunSummary>
    where
        S: FrameSource,
        K: FrameSink,
        OS: FnOnce() -> Result<S>,
        OK: FnOnce(&SinkRequest) -> Result<K>,
    {
        self.frames = 0;
        self.state = PipelineState::Idle;
        observer.on_state(PipelineState::Idle);

        match self.stream(width, open_source, open_sink, observer) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                log::error!("conversion failed after {} frames: {}", self.frames, e);
                self.transition(PipelineState::Failed, observer);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: PipelineState, observer: &mut dyn PipelineObserver) {
        log::debug!("pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
        observer.on_state(next);
    }

    fn stream<S, K, OS, OK>(&mut self, width: AsciiWidth, open_source: OS, open_sink: OK, observer: &mut dyn PipelineObserver) -> Result<RunSummary>
    where
        S: FrameSource,
        K: FrameSink,
        OS: FnOnce() -> Result<S>,
        OK: FnOnce(&SinkRequest) -> Result<K>,
    {
        let mut source = open_source()?;
        let info = source.info().clone();
        self.transition(PipelineState::SourceOpened, observer);
        log::info!(
            "input: {}x{}, {:.3} fps ({}), {} frames",
            info.width,
            info.height,
            info.frame_rate.as_f64(),
            info.frame_rate,
            info.total_frames
        );

        let columns = width.get();
        let rows = grid_height(columns, info.width, info.height);
        let output_size = self.layout.canvas_size(columns, rows);
        self.transition(PipelineState::GridComputed, observer);
        log::info!("ASCII grid: {}x{} cells, output {}x{} px", columns, rows, output_size.0, output_size.1);
        log_ramp(&self.ramp);

        let mut sink = open_sink(&SinkRequest {
            frame_rate: info.frame_rate,
            frame_size: output_size,
        })?;
        self.transition(PipelineState::SinkOpened, observer);

        self.transition(PipelineState::Streaming, observer);
        let total = info.total_frames;
        let interval = self.config.progress_interval;
        let weights = self.config.luminance_weights;

        while let Some(frame) = source.next_frame()? {
            let small = downsample(&frame, columns, rows);
            drop(frame);
            let grid = map_frame(&small, &self.ramp, &weights);
            let canvas = rasterize(&grid, &self.layout, &mut self.painter);
            sink.write_frame(&canvas)?;
            self.frames += 1;

            if self.frames == 1 {
                observer.on_first_frame(&self.sample(&grid));
            }
            if self.frames % interval == 0 {
                let progress = Progress::converting_frames(self.frames, total);
                log::debug!("{}", progress.message);
                observer.on_progress(&progress);
            }
        }

        sink.finish()?;
        let codec = sink.codec().to_string();
        drop(sink);
        drop(source);
        self.transition(PipelineState::Finished, observer);
        log::info!("conversion complete: {} frames", self.frames);
        observer.on_progress(&Progress::complete(self.frames));

        Ok(RunSummary {
            frames_written: self.frames,
            grid_size: (columns, rows),
            output_size,
            codec,
        })
    }

    fn sample(&self, grid: &AsciiGrid) -> FrameSample {
        let weights = self.config.luminance_weights;
        let columns = self.config.sample_columns.min(grid.width());
        let rows = self.config.sample_rows.min(grid.height());
        let mut cells = Vec::with_capacity((columns * rows) as usize);
        for y in 0..rows {
            for x in 0..columns {
                let cell = grid.cell(x, y);
                cells.push(SampledCell {
                    x,
                    y,
                    brightness: clamp_unit(weights.luminance_of(cell.color)),
                    glyph: cell.glyph,
                    color: cell.color,
                });
            }
        }
        FrameSample {
            grid_size: (grid.width(), grid.height()),
            cells,
        }
    }
}

fn log_ramp(ramp: &CharacterRamp) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    log::debug!("character ramp: {} glyphs", ramp.len());
    for row in ramp.brightness_table().chunks(8) {
        let line = row
            .iter()
            .map(|(c, b)| format!("'{}' -> {:.2}", c, b))
            .collect::<Vec<_>>()
            .join(" | ");
        log::debug!("{}", line);
    }
}
