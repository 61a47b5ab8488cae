//! The two raw event sources behind a [`Watcher`](crate::Watcher).

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::native::NativeSource;
use crate::protocol::ObservedEvent;
use crate::shell::{SessionState, ShellSource};

/// Receives raw occurrences from a source, on the source's own thread.
pub type RawSink = Arc<dyn Fn(ObservedEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Native,
    Shell,
}

/// Which source a watcher may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePreference {
    /// Native when the path is readable, the shell when it is not and
    /// elevation is available, native otherwise.
    #[default]
    Auto,
    Native,
    Shell,
}

impl SourcePreference {
    pub fn select(self, path: &Path, elevation_available: impl FnOnce() -> bool) -> SourceKind {
        match self {
            SourcePreference::Native => SourceKind::Native,
            SourcePreference::Shell => SourceKind::Shell,
            SourcePreference::Auto => {
                if !can_read(path) && elevation_available() {
                    SourceKind::Shell
                } else {
                    SourceKind::Native
                }
            }
        }
    }
}

/// Whether this process can read `path` directly: list it if it is a
/// directory, open it otherwise.
pub fn can_read(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => fs::read_dir(path).is_ok(),
        Ok(_) => fs::File::open(path).is_ok(),
        Err(_) => false,
    }
}

pub enum Source {
    Native(NativeSource),
    Shell(ShellSource),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Native(_) => SourceKind::Native,
            Source::Shell(_) => SourceKind::Shell,
        }
    }

    pub fn start(&mut self, sink: RawSink) -> Result<()> {
        match self {
            Source::Native(native) => native.start(sink),
            Source::Shell(shell) => shell.start(sink),
        }
    }

    pub fn stop(&mut self) {
        match self {
            Source::Native(native) => native.stop(),
            Source::Shell(shell) => shell.stop(),
        }
    }

    /// Session state of the shell source; `None` for the native source.
    pub fn session_state(&self) -> Option<SessionState> {
        match self {
            Source::Native(_) => None,
            Source::Shell(shell) => Some(shell.state()),
        }
    }
}
