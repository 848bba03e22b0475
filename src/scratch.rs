use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A uniquely named file in the system temp dir, removed on drop.
///
/// Used for ffmpeg stderr logs and codec probe outputs.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(label: &str, extension: Option<&str>) -> Self {
        Self::new_in(&std::env::temp_dir(), label, extension)
    }

    /// Like [`ScratchFile::new`], but inside `dir`. The name starts with a dot
    /// so it stays out of casual directory listings.
    pub fn new_in(dir: &Path, label: &str, extension: Option<&str>) -> Self {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = format!(".chromascii_{}_{}_{}_{}", label, std::process::id(), stamp, seq);
        if let Some(ext) = extension.filter(|e| !e.is_empty()) {
            name.push('.');
            name.push_str(ext);
        }
        Self {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last `max_chars` characters of the file, trimmed; empty if unreadable.
    pub fn tail(&self, max_chars: usize) -> String {
        let bytes = fs::read(&self.path).unwrap_or_default();
        last_n_chars(&String::from_utf8_lossy(&bytes), max_chars)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    s.chars()
        .skip(count.saturating_sub(max_chars))
        .collect::<String>()
        .trim()
        .to_owned()
}
