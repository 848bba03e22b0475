use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

use chromascii::sink::negotiate;
use chromascii::{
    AsciiWidth, ConvertError, FrameRate, FrameSample, FrameSink, FrameSource, GlyphPainter,
    PipelineDriver, PipelineObserver, PipelineState, Progress, ProgressPhase, RenderConfig,
    Result, VideoInfo,
};
use image::{Rgb, RgbImage};

struct MemorySource {
    info: VideoInfo,
    frames: VecDeque<RgbImage>,
    fail_after: Option<usize>,
    read: usize,
    released: Rc<Cell<bool>>,
}

impl FrameSource for MemorySource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.fail_after == Some(self.read) {
            return Err(ConvertError::Stream("decoder crashed".to_string()));
        }
        self.read += 1;
        Ok(self.frames.pop_front())
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        self.released.set(true);
    }
}

#[derive(Default, Clone)]
struct SinkLog {
    frames: Rc<RefCell<Vec<RgbImage>>>,
    finished: Rc<Cell<bool>>,
    released: Rc<Cell<bool>>,
}

struct MemorySink {
    codec: String,
    log: SinkLog,
    reject_writes: bool,
}

impl FrameSink for MemorySink {
    fn codec(&self) -> &str {
        &self.codec
    }

    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if self.reject_writes {
            return Err(ConvertError::Stream("encoder closed its input".to_string()));
        }
        self.log.frames.borrow_mut().push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.log.finished.set(true);
        Ok(())
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        self.log.released.set(true);
    }
}

/// Paints the pixel just above the baseline origin.
struct DotPainter;

impl GlyphPainter for DotPainter {
    fn paint(&mut self, canvas: &mut RgbImage, glyph: char, origin: (i32, i32), color: Rgb<u8>) {
        if glyph == ' ' {
            return;
        }
        let (x, y) = (origin.0, origin.1 - 1);
        if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    }
}

#[derive(Default)]
struct Recorder {
    states: Vec<PipelineState>,
    progress: Vec<Progress>,
    samples: Vec<FrameSample>,
}

impl PipelineObserver for Recorder {
    fn on_state(&mut self, state: PipelineState) {
        self.states.push(state);
    }

    fn on_progress(&mut self, progress: &Progress) {
        self.progress.push(progress.clone());
    }

    fn on_first_frame(&mut self, sample: &FrameSample) {
        self.samples.push(sample.clone());
    }
}

fn gradient(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 255) / width.max(1)) as u8,
            ((y * 255) / height.max(1)) as u8,
            ((seed * 37 + x + y) % 256) as u8,
        ])
    })
}

fn source(width: u32, height: u32, count: usize, released: &Rc<Cell<bool>>) -> MemorySource {
    MemorySource {
        info: VideoInfo {
            width,
            height,
            frame_rate: FrameRate::new(30000, 1001).unwrap(),
            total_frames: count as u64,
        },
        frames: (0..count).map(|i| gradient(width, height, i as u32)).collect(),
        fail_after: None,
        read: 0,
        released: Rc::clone(released),
    }
}

fn sink(codec: &str, log: &SinkLog) -> MemorySink {
    MemorySink {
        codec: codec.to_string(),
        log: log.clone(),
        reject_writes: false,
    }
}

#[test]
fn every_input_frame_is_written_once_in_order() {
    let config = RenderConfig::default();
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();
    let mut recorder = Recorder::default();
    let mut requested = None;

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    let summary = driver
        .run(
            AsciiWidth::new(20).unwrap(),
            || Ok(source(64, 36, 75, &released)),
            |request| {
                requested = Some(*request);
                Ok(sink("mpeg4", &log))
            },
            &mut recorder,
        )
        .unwrap();

    assert_eq!(summary.frames_written, 75);
    assert_eq!(log.frames.borrow().len(), 75);
    // 20 * 36 / 64 = 11, halved -> 5 rows
    assert_eq!(summary.grid_size, (20, 5));
    assert_eq!(summary.output_size, (120, 60));
    assert!(log.frames.borrow().iter().all(|f| f.dimensions() == (120, 60)));

    let request = requested.unwrap();
    assert_eq!(request.frame_rate, FrameRate::new(30000, 1001).unwrap());
    assert_eq!(request.frame_size, (120, 60));

    assert!(log.finished.get());
    assert!(log.released.get());
    assert!(released.get());
    assert_eq!(driver.state(), PipelineState::Finished);
    assert_eq!(driver.frames_processed(), 75);
    assert_eq!(
        recorder.states,
        vec![
            PipelineState::Idle,
            PipelineState::SourceOpened,
            PipelineState::GridComputed,
            PipelineState::SinkOpened,
            PipelineState::Streaming,
            PipelineState::Finished,
        ]
    );
}

#[test]
fn progress_is_reported_every_interval_and_on_completion() {
    let config = RenderConfig::default();
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();
    let mut recorder = Recorder::default();

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    driver
        .run(
            AsciiWidth::new(20).unwrap(),
            || Ok(source(32, 32, 95, &released)),
            |_| Ok(sink("mpeg4", &log)),
            &mut recorder,
        )
        .unwrap();

    let converting: Vec<u64> = recorder
        .progress
        .iter()
        .filter(|p| p.phase == ProgressPhase::ConvertingFrames)
        .map(|p| p.completed)
        .collect();
    assert_eq!(converting, vec![30, 60, 90]);

    let sixty = recorder.progress.iter().find(|p| p.completed == 60).unwrap();
    assert!((sixty.percentage - 60.0 / 95.0 * 100.0).abs() < 1e-9);

    let last = recorder.progress.last().unwrap();
    assert_eq!(last.phase, ProgressPhase::Complete);
    assert_eq!(last.completed, 95);
}

#[test]
fn run_shorter_than_interval_only_reports_completion() {
    let config = RenderConfig::default();
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();
    let mut recorder = Recorder::default();

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    driver
        .run(
            AsciiWidth::new(20).unwrap(),
            || Ok(source(32, 32, 29, &released)),
            |_| Ok(sink("mpeg4", &log)),
            &mut recorder,
        )
        .unwrap();

    assert_eq!(recorder.progress.len(), 1);
    assert_eq!(recorder.progress[0].phase, ProgressPhase::Complete);
    assert_eq!(recorder.progress[0].completed, 29);
}

#[test]
fn first_frame_is_sampled_exactly_once() {
    let config = RenderConfig::default();
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();
    let mut recorder = Recorder::default();

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    driver
        .run(
            AsciiWidth::new(40).unwrap(),
            || Ok(source(80, 80, 5, &released)),
            |_| Ok(sink("mpeg4", &log)),
            &mut recorder,
        )
        .unwrap();

    assert_eq!(recorder.samples.len(), 1);
    let sample = &recorder.samples[0];
    assert_eq!(sample.grid_size, (40, 20));
    assert_eq!(sample.cells.len(), 6);
    assert_eq!((sample.cells[4].x, sample.cells[4].y), (1, 1));
    assert!(sample.cells.iter().all(|c| (0.0..=1.0).contains(&c.brightness)));
}

#[test]
fn full_hd_input_gets_a_42_row_grid() {
    let config = RenderConfig::default();
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    let summary = driver
        .run(
            AsciiWidth::new(150).unwrap(),
            || Ok(source(1920, 1080, 1, &released)),
            |_| Ok(sink("mpeg4", &log)),
            &mut chromascii::NoopObserver,
        )
        .unwrap();

    assert_eq!(summary.grid_size, (150, 42));
    assert_eq!(summary.output_size, (900, 504));
}

#[test]
fn later_codec_is_used_when_first_is_unavailable() {
    let config = RenderConfig::default().with_codecs(["mpeg4", "libx264"]);
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();
    let mut tried = Vec::new();

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    let summary = driver
        .run(
            AsciiWidth::default(),
            || Ok(source(64, 48, 12, &released)),
            |_| {
                let (codec, ()) = negotiate(Path::new("out.mp4"), &config.codecs, |codec| {
                    tried.push(codec.to_string());
                    if codec == "libx264" {
                        Ok(())
                    } else {
                        Err("encoder not found".to_string())
                    }
                })?;
                Ok(sink(&codec, &log))
            },
            &mut chromascii::NoopObserver,
        )
        .unwrap();

    assert_eq!(tried, vec!["mpeg4", "libx264"]);
    assert_eq!(summary.codec, "libx264");
    assert_eq!(summary.frames_written, 12);
    assert_eq!(log.frames.borrow().len(), 12);
}

#[test]
fn exhausted_codec_list_fails_and_releases_the_source() {
    let config = RenderConfig::default();
    let released = Rc::new(Cell::new(false));
    let mut recorder = Recorder::default();

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    let err = driver
        .run(
            AsciiWidth::default(),
            || Ok(source(64, 48, 3, &released)),
            |_| -> Result<MemorySink> {
                let (_codec, sink) = negotiate(Path::new("out.mp4"), &config.codecs, |_| {
                    Err::<MemorySink, _>("unavailable".to_string())
                })?;
                Ok(sink)
            },
            &mut recorder,
        )
        .unwrap_err();

    match err {
        ConvertError::Encode { failures, .. } => {
            assert_eq!(failures.tried().collect::<Vec<_>>(), vec!["mpeg4", "libx264"]);
        }
        other => panic!("expected Encode, got {:?}", other),
    }
    assert!(released.get());
    assert_eq!(driver.state(), PipelineState::Failed);
    assert_eq!(recorder.states.last(), Some(&PipelineState::Failed));
    assert!(!recorder.states.contains(&PipelineState::SinkOpened));
}

#[test]
fn open_failure_never_opens_the_sink() {
    let config = RenderConfig::default();
    let mut sink_opened = false;

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    let err = driver
        .run(
            AsciiWidth::default(),
            || -> Result<MemorySource> {
                Err(ConvertError::Open {
                    path: "missing.mp4".into(),
                    reason: "file does not exist".to_string(),
                })
            },
            |_| -> Result<MemorySink> {
                sink_opened = true;
                unreachable!()
            },
            &mut chromascii::NoopObserver,
        )
        .unwrap_err();

    assert!(matches!(err, ConvertError::Open { .. }));
    assert!(!sink_opened);
    assert_eq!(driver.state(), PipelineState::Failed);
}

#[test]
fn mid_stream_failure_releases_source_and_sink_unfinished() {
    let config = RenderConfig::default();
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    let err = driver
        .run(
            AsciiWidth::default(),
            || {
                let mut s = source(64, 48, 10, &released);
                s.fail_after = Some(4);
                Ok(s)
            },
            |_| Ok(sink("mpeg4", &log)),
            &mut chromascii::NoopObserver,
        )
        .unwrap_err();

    assert!(matches!(err, ConvertError::Stream(_)));
    assert_eq!(log.frames.borrow().len(), 4);
    assert!(!log.finished.get());
    assert!(log.released.get());
    assert!(released.get());
    assert_eq!(driver.state(), PipelineState::Failed);
    assert_eq!(driver.frames_processed(), 4);
}

#[test]
fn write_failure_aborts_the_run() {
    let config = RenderConfig::default();
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();

    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    let err = driver
        .run(
            AsciiWidth::default(),
            || Ok(source(64, 48, 10, &released)),
            |_| {
                let mut s = sink("mpeg4", &log);
                s.reject_writes = true;
                Ok(s)
            },
            &mut chromascii::NoopObserver,
        )
        .unwrap_err();

    assert!(matches!(err, ConvertError::Stream(_)));
    assert!(released.get());
    assert!(log.released.get());
    assert_eq!(driver.frames_processed(), 0);
}

#[test]
fn repeated_runs_produce_identical_output() {
    let config = RenderConfig::default();

    let render = || {
        let released = Rc::new(Cell::new(false));
        let log = SinkLog::default();
        let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
        let summary = driver
            .run(
                AsciiWidth::new(32).unwrap(),
                || Ok(source(96, 54, 4, &released)),
                |_| Ok(sink("mpeg4", &log)),
                &mut chromascii::NoopObserver,
            )
            .unwrap();
        let frames = log.frames.borrow().clone();
        (summary, frames)
    };

    let (first_summary, first_frames) = render();
    let (second_summary, second_frames) = render();
    assert_eq!(first_summary, second_summary);
    assert_eq!(first_frames, second_frames);
}

#[test]
fn width_bounds_are_checked_before_anything_runs() {
    for bad in [0u32, 19, 301, 1000] {
        assert!(matches!(AsciiWidth::new(bad), Err(ConvertError::Arg(_))));
    }
    for good in [20u32, 80, 300] {
        assert_eq!(AsciiWidth::new(good).unwrap().get(), good);
    }
}

#[test]
fn invalid_config_is_rejected_by_the_driver() {
    let config = RenderConfig::default().with_ramp("#");
    assert!(matches!(
        PipelineDriver::new(&config, DotPainter).err(),
        Some(ConvertError::Config(_))
    ));
}

#[test]
fn alternate_ramp_and_cell_size_are_honored() {
    let config = RenderConfig::default().with_ramp(" @").with_cell_size(4, 8);
    let released = Rc::new(Cell::new(false));
    let log = SinkLog::default();

    let white = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
    let mut driver = PipelineDriver::new(&config, DotPainter).unwrap();
    let summary = driver
        .run(
            AsciiWidth::new(20).unwrap(),
            || {
                let mut s = source(40, 40, 0, &released);
                s.frames.push_back(white.clone());
                Ok(s)
            },
            |_| Ok(sink("mpeg4", &log)),
            &mut chromascii::NoopObserver,
        )
        .unwrap();

    assert_eq!(summary.grid_size, (20, 10));
    assert_eq!(summary.output_size, (80, 80));
    let frames = log.frames.borrow();
    // densest glyph everywhere: one white dot per cell, just above the baseline
    assert_eq!(*frames[0].get_pixel(0, 5), Rgb([255, 255, 255]));
    assert_eq!(*frames[0].get_pixel(4, 13), Rgb([255, 255, 255]));
    assert_eq!(*frames[0].get_pixel(1, 5), Rgb([0, 0, 0]));
}
