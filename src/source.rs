use std::fmt;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;
use serde::Deserialize;

use crate::config::FfmpegConfig;
use crate::error::{ConvertError, Result};
use crate::scratch::ScratchFile;

/// Exact frame rate as a rational number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Option<Self> {
        (num > 0 && den > 0).then_some(Self { num, den })
    }

    /// Parse `"30000/1001"` or `"25"` as printed by ffprobe; `0/0` is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((num, den)) => Self::new(num.trim().parse().ok()?, den.trim().parse().ok()?),
            None => Self::new(s.parse().ok()?, 1),
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Geometry and timing of a video stream, read once when it is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Frame count reported or estimated by the container; 0 when unknown
    pub total_frames: u64,
}

/// A finite, forward-only sequence of decoded frames.
///
/// Dropping the source releases everything it holds.
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// The next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe(json: &str) -> std::result::Result<VideoInfo, String> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| format!("unreadable ffprobe output: {}", e))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(format!("invalid frame size {}x{}", width, height));
    }

    let frame_rate = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|s| FrameRate::parse(s))
        .ok_or_else(|| "unknown frame rate".to_string())?;

    let total_frames = stream
        .nb_frames
        .as_deref()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .or_else(|| {
            let duration = stream
                .duration
                .as_deref()
                .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))?
                .trim()
                .parse::<f64>()
                .ok()?;
            (duration.is_finite() && duration > 0.0)
                .then(|| (duration * frame_rate.as_f64()).round() as u64)
        })
        .unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        total_frames,
    })
}

/// Query stream geometry, rate and frame count with ffprobe.
pub fn probe_video(path: &Path, tools: &FfmpegConfig) -> Result<VideoInfo> {
    let open_error = |reason: String| ConvertError::Open {
        path: path.to_path_buf(),
        reason,
    };
    if !path.is_file() {
        return Err(open_error("file does not exist".to_string()));
    }

    let output = Command::new(tools.ffprobe_cmd())
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                open_error(format!(
                    "ffprobe executable not found ({}); install ffmpeg",
                    tools.ffprobe_cmd().display()
                ))
            } else {
                open_error(format!("failed to run ffprobe: {}", e))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(open_error(format!(
            "ffprobe failed with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout)).map_err(open_error)
}

/// Frames decoded by an ffmpeg child process as raw RGB24.
pub struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_log: ScratchFile,
    frame_bytes: usize,
}

impl FfmpegSource {
    pub fn open(path: &Path, tools: &FfmpegConfig) -> Result<Self> {
        let info = probe_video(path, tools)?;
        let open_error = |reason: String| ConvertError::Open {
            path: path.to_path_buf(),
            reason,
        };

        let stderr_log = ScratchFile::new("decode", Some("log"));
        let stderr = File::create(stderr_log.path())
            .map_err(|e| open_error(format!("cannot create decoder log: {}", e)))?;

        let mut child = Command::new(tools.ffmpeg_cmd())
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args([
                "-map", "0:v:0", "-an", "-sn", "-fps_mode", "passthrough", "-f", "rawvideo",
                "-pix_fmt", "rgb24", "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    open_error(format!(
                        "ffmpeg executable not found ({}); install ffmpeg",
                        tools.ffmpeg_cmd().display()
                    ))
                } else {
                    open_error(format!("failed to spawn ffmpeg decoder: {}", e))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| open_error("failed to capture ffmpeg stdout".to_string()))?;
        let frame_bytes = info.width as usize * info.height as usize * 3;

        log::debug!(
            "decoding {} as {}x{} rgb24 ({} bytes per frame)",
            path.display(),
            info.width,
            info.height,
            frame_bytes
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            child,
            stdout: Some(BufReader::new(stdout)),
            stderr_log,
            frame_bytes,
        })
    }

    fn end_of_stream(&mut self) -> Result<Option<RgbImage>> {
        drop(self.stdout.take());
        let status = self
            .child
            .wait()
            .map_err(|e| ConvertError::Stream(format!("waiting for ffmpeg decoder: {}", e)))?;
        if !status.success() {
            return Err(ConvertError::Stream(format!(
                "ffmpeg decoder for {} failed with {}: {}",
                self.path.display(),
                status,
                self.stderr_log.tail(500)
            )));
        }
        Ok(None)
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let mut buffer = vec![0u8; self.frame_bytes];
        match stdout.read_exact(&mut buffer) {
            Ok(()) => RgbImage::from_raw(self.info.width, self.info.height, buffer)
                .map(Some)
                .ok_or_else(|| ConvertError::Stream("decoded frame has the wrong size".to_string())),
            // A short final read means the decoder is done.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => self.end_of_stream(),
            Err(e) => {
                drop(self.stdout.take());
                Err(ConvertError::Stream(format!("reading from ffmpeg decoder: {}", e)))
            }
        }
    }
}

impl Iterator for FfmpegSource {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        drop(self.stdout.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
