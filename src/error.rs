use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch target path is empty")]
    EmptyPath,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("native watch on {path} failed: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("elevated execution is not available")]
    ElevationUnavailable,

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no watch utility for {arch}: {reason}")]
    Provision { arch: String, reason: String },

    #[error("shell session is terminated")]
    SessionTerminated,

    #[error("malformed line ({fields} fields): {line:?}")]
    Parse { line: String, fields: usize },

    #[error("null line")]
    NullLine,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
