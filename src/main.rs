use anyhow::{Context, Result};
use chromascii::{AsciiWidth, FrameSample, PipelineObserver, Progress, ProgressPhase, RenderConfig, VideoConverter};
use clap::error::ErrorKind;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Render a video as a color-preserving ASCII-art video.")]
struct Args {
    /// Input video file
    input: PathBuf,

    /// Output video file; the extension picks the container
    output: PathBuf,

    /// Grid width in characters (20-300)
    #[arg(default_value_t = AsciiWidth::DEFAULT, value_parser = parse_width)]
    ascii_width: AsciiWidth,

    /// Render configuration file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Font file used to draw the glyphs
    #[arg(long)]
    font: Option<PathBuf>,

    /// Do not show a progress bar
    #[arg(long, short, default_value_t = false)]
    quiet: bool,
}

fn parse_width(s: &str) -> std::result::Result<AsciiWidth, String> {
    s.parse::<AsciiWidth>().map_err(|e| e.to_string())
}

/// Drives an indicatif bar from pipeline progress and logs the first-frame
/// sample.
struct TerminalObserver {
    quiet: bool,
    bar: Option<ProgressBar>,
}

impl TerminalObserver {
    fn bar_for(total: u64) -> ProgressBar {
        if total > 0 {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {pos} frames")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        }
    }
}

impl PipelineObserver for TerminalObserver {
    fn on_progress(&mut self, progress: &Progress) {
        if self.quiet {
            log::info!("{}", progress.message);
            return;
        }
        match progress.phase {
            ProgressPhase::ConvertingFrames => {
                let bar = self.bar.get_or_insert_with(|| Self::bar_for(progress.total));
                bar.set_position(progress.completed);
            }
            ProgressPhase::Complete => {
                if let Some(bar) = self.bar.take() {
                    bar.set_position(progress.completed);
                    bar.finish_with_message("Done");
                }
            }
        }
    }

    fn on_first_frame(&mut self, sample: &FrameSample) {
        let report = || {
            for cell in &sample.cells {
                log::info!(
                    "pixel ({},{}): brightness={:.3}, glyph='{}'",
                    cell.x,
                    cell.y,
                    cell.brightness,
                    cell.glyph
                );
            }
        };
        match &self.bar {
            Some(bar) => bar.suspend(report),
            None => report(),
        }
    }
}

fn load_config(args: &Args) -> Result<RenderConfig> {
    let mut config = match &args.config {
        Some(path) => RenderConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RenderConfig::discover().context("loading config")?,
    };
    if let Some(font) = &args.font {
        config.font_path = Some(font.clone());
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Usage errors exit with 1 like every other failure.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let config = load_config(&args)?;
    let converter = VideoConverter::with_config(config).context("invalid configuration")?;

    println!("Converting {} -> {}", args.input.display(), args.output.display());
    let mut observer = TerminalObserver {
        quiet: args.quiet,
        bar: None,
    };
    let summary = converter
        .convert_video_observed(&args.input, &args.output, args.ascii_width, &mut observer)
        .with_context(|| format!("converting {}", args.input.display()))?;

    println!(
        "\nASCII video complete: {} frames, {}x{} grid, {}x{} px, codec {}",
        summary.frames_written,
        summary.grid_size.0,
        summary.grid_size.1,
        summary.output_size.0,
        summary.output_size.1,
        summary.codec
    );
    println!("Output file: {}", args.output.display());
    Ok(())
}
