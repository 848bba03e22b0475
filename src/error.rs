use std::fmt;
use std::path::PathBuf;

/// Errors raised by the conversion pipeline.
///
/// Every variant is fatal for a run: the driver releases whatever it has
/// opened and hands the error back to the caller.
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    /// Invalid user arguments, detected before any file is touched.
    #[error("invalid argument: {0}")]
    Arg(String),

    /// Invalid render configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No usable font could be loaded.
    #[error("font error: {0}")]
    Font(String),

    /// The input container could not be probed or opened.
    #[error("cannot open input {}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    /// Every candidate codec failed to open the output container.
    #[error("cannot encode {}: no candidate codec could be opened ({failures})", .path.display())]
    Encode { path: PathBuf, failures: CodecFailures },

    /// The decoder or encoder failed after the run started.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Per-candidate failure reasons collected during codec negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecFailures(pub Vec<(String, String)>);

impl CodecFailures {
    pub fn tried(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(codec, _)| codec.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CodecFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "candidate list is empty");
        }
        for (i, (codec, reason)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", codec, reason)?;
        }
        Ok(())
    }
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, ConvertError>;
