use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use image::RgbImage;

use crate::config::FfmpegConfig;
use crate::error::{CodecFailures, ConvertError, Result};
use crate::scratch::ScratchFile;
use crate::source::FrameRate;

/// Where encoded frames go, in the order they are written.
///
/// Dropping a sink without calling [`FrameSink::finish`] abandons the output.
pub trait FrameSink {
    /// Codec the sink negotiated.
    fn codec(&self) -> &str;

    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close the output; the file is complete only after this.
    fn finish(&mut self) -> Result<()>;
}

/// Try `candidates` in order and keep the first one `open` accepts.
///
/// Returns the winning candidate with whatever `open` produced, or every
/// candidate paired with its failure when none succeeds.
pub fn first_success<C, T, E, F>(candidates: impl IntoIterator<Item = C>, mut open: F) -> std::result::Result<(C, T), Vec<(C, E)>>
where
    F: FnMut(&C) -> std::result::Result<T, E>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        match open(&candidate) {
            Ok(opened) => return Ok((candidate, opened)),
            Err(e) => failures.push((candidate, e)),
        }
    }
    Err(failures)
}

/// Negotiate a codec from `codecs` with `open`, turning exhaustion into
/// [`ConvertError::Encode`].
pub fn negotiate<T, F>(path: &Path, codecs: &[String], mut open: F) -> Result<(String, T)>
where
    F: FnMut(&str) -> std::result::Result<T, String>,
{
    let candidates = codecs.iter().map(|c| c.trim()).filter(|c| !c.is_empty());
    first_success(candidates, |codec: &&str| {
        let codec = *codec;
        let result = open(codec);
        if let Err(reason) = &result {
            log::warn!("codec {} unavailable: {}", codec, reason);
        }
        result
    })
    .map(|(codec, opened)| (codec.to_string(), opened))
    .map_err(|failures| ConvertError::Encode {
        path: path.to_path_buf(),
        failures: CodecFailures(
            failures
                .into_iter()
                .map(|(codec, reason)| (codec.to_string(), reason))
                .collect(),
        ),
    })
}

fn rawvideo_input_args(size: (u32, u32), rate: FrameRate) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgb24".to_owned(),
        "-s:v".to_owned(),
        format!("{}x{}", size.0, size.1),
        "-r".to_owned(),
        rate.to_string(),
        "-i".to_owned(),
        "-".to_owned(),
    ]
}

fn codec_output_args(codec: &str) -> Vec<String> {
    vec![
        "-an".to_owned(),
        "-c:v".to_owned(),
        codec.to_owned(),
        "-pix_fmt".to_owned(),
        "yuv420p".to_owned(),
    ]
}

fn container_output_args(output_path: &Path) -> Vec<String> {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(ext.as_str(), "mov" | "mp4" | "m4v") {
        vec!["-movflags".to_owned(), "+faststart".to_owned()]
    } else {
        Vec::new()
    }
}

/// Directory the output file will be created in.
fn output_dir(output_path: &Path) -> &Path {
    output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

/// Encode one black frame with `codec` into a scratch file next to
/// `output_path`, with the same container type.
///
/// Writing beside the output means an unwritable or missing output directory
/// fails every candidate here instead of failing the first real frame.
fn probe_encoder(tools: &FfmpegConfig, codec: &str, rate: FrameRate, size: (u32, u32), output_path: &Path) -> std::result::Result<(), String> {
    let dir = output_dir(output_path);
    if !dir.is_dir() {
        return Err(format!("output directory {} does not exist", dir.display()));
    }
    let ext = output_path.extension().and_then(|e| e.to_str());
    let scratch = ScratchFile::new_in(dir, "probe", ext);
    let source = format!("color=c=black:s={}x{}:r={}", size.0, size.1, rate);

    let output = Command::new(tools.ffmpeg_cmd())
        .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-f", "lavfi", "-i"])
        .arg(&source)
        .args(["-frames:v", "1"])
        .args(codec_output_args(codec))
        .args(container_output_args(output_path))
        .arg(scratch.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                format!("ffmpeg executable not found ({})", tools.ffmpeg_cmd().display())
            } else {
                format!("failed to run ffmpeg: {}", e)
            }
        })?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.lines().last().unwrap_or("").trim();
        Err(format!("{} ({})", output.status, reason))
    }
}

/// Encoder writing raw RGB24 frames into an ffmpeg child process.
pub struct FfmpegSink {
    path: PathBuf,
    codec: String,
    size: (u32, u32),
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr_log: ScratchFile,
    frames: u64,
    finished: bool,
}

impl FfmpegSink {
    /// Open `path` with the first codec in `codecs` that ffmpeg can use for
    /// frames of `size` at `rate`.
    pub fn open(path: &Path, codecs: &[String], rate: FrameRate, size: (u32, u32), tools: &FfmpegConfig) -> Result<Self> {
        let (codec, ()) = negotiate(path, codecs, |codec| probe_encoder(tools, codec, rate, size, path))?;
        log::info!("encoding {} with {}", path.display(), codec);

        let encode_error = |reason: String| ConvertError::Encode {
            path: path.to_path_buf(),
            failures: CodecFailures(vec![(codec.clone(), reason)]),
        };

        let stderr_log = ScratchFile::new("encode", Some("log"));
        let stderr = File::create(stderr_log.path())
            .map_err(|e| encode_error(format!("cannot create encoder log: {}", e)))?;

        let mut child = Command::new(tools.ffmpeg_cmd())
            .args(rawvideo_input_args(size, rate))
            .args(codec_output_args(&codec))
            .args(container_output_args(path))
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| encode_error(format!("failed to spawn ffmpeg encoder: {}", e)))?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(encode_error("failed to capture ffmpeg stdin".to_string()));
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            codec,
            size,
            child,
            stdin: Some(BufWriter::new(stdin)),
            stderr_log,
            frames: 0,
            finished: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    fn failure(&self, what: &str) -> ConvertError {
        ConvertError::Stream(format!(
            "ffmpeg encoder for {} {}: {}",
            self.path.display(),
            what,
            self.stderr_log.tail(500)
        ))
    }
}

impl FrameSink for FfmpegSink {
    fn codec(&self) -> &str {
        &self.codec
    }

    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != self.size {
            return Err(ConvertError::Stream(format!(
                "frame is {}x{} but the encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.size.0,
                self.size.1
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ConvertError::Stream("encoder has already been finalized".to_string()))?;
        if let Err(e) = stdin.write_all(frame.as_raw()) {
            return Err(self.failure(&format!("rejected frame {} ({})", self.frames, e)));
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };
        let status = self
            .child
            .wait()
            .map_err(|e| ConvertError::Stream(format!("waiting for ffmpeg encoder: {}", e)))?;
        if let Err(e) = flushed {
            return Err(self.failure(&format!("failed to flush ({})", e)));
        }
        if !status.success() {
            return Err(self.failure(&format!("failed with {}", status)));
        }
        self.finished = true;
        log::debug!("encoder finished after {} frames", self.frames);
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        if fs::remove_file(&self.path).is_ok() {
            log::debug!("removed incomplete output {}", self.path.display());
        }
    }
}
