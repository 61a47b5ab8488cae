use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, trace};

use crate::binary::{BinaryProvider, SystemBinary};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, WatchError};
use crate::mask::EventMask;
use crate::native::NativeSource;
use crate::protocol::ObservedEvent;
use crate::shell::{ElevatedShell, SessionState, ShellSource, SuShell};
use crate::source::{RawSink, Source, SourceKind, SourcePreference};

/// A normalized event as handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchEvent {
    #[serde(serialize_with = "serialize_mask")]
    pub mask: EventMask,
    pub path: PathBuf,
}

fn serialize_mask<S>(mask: &EventMask, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.collect_seq(mask.names())
}

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Kinds of interest; events are filtered down to these.
    pub mask: EventMask,
    pub recursive: bool,
    pub source: SourcePreference,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            mask: EventMask::ALL,
            recursive: true,
            source: SourcePreference::Auto,
        }
    }
}

pub struct WatcherBuilder {
    path: PathBuf,
    options: WatchOptions,
    shell: Arc<dyn ElevatedShell>,
    binary: Arc<dyn BinaryProvider>,
}

impl WatcherBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: WatchOptions::default(),
            shell: Arc::new(SuShell::default()),
            binary: Arc::new(SystemBinary),
        }
    }

    pub fn options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn mask(mut self, mask: EventMask) -> Self {
        self.options.mask = mask;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.options.recursive = recursive;
        self
    }

    pub fn source(mut self, source: SourcePreference) -> Self {
        self.options.source = source;
        self
    }

    pub fn shell(mut self, shell: impl ElevatedShell + 'static) -> Self {
        self.shell = Arc::new(shell);
        self
    }

    pub fn binary(mut self, binary: impl BinaryProvider + 'static) -> Self {
        self.binary = Arc::new(binary);
        self
    }

    pub fn binary_arc(mut self, binary: Arc<dyn BinaryProvider>) -> Self {
        self.binary = binary;
        self
    }

    /// Builds a watcher that calls `handler` on a dedicated dispatch thread.
    pub fn build<F>(self, mut handler: F) -> Result<Watcher>
    where
        F: FnMut(EventMask, PathBuf) + Send + 'static,
    {
        let (tx, rx) = unbounded::<WatchEvent>();
        thread::Builder::new()
            .name("rootwatch-dispatch".into())
            .spawn(move || {
                for event in rx {
                    handler(event.mask, event.path);
                }
            })?;
        self.build_channel(tx)
    }

    /// Builds a watcher that pushes events into `tx`. The caller drains the
    /// receiving end on whatever thread it chooses.
    pub fn build_channel(self, tx: Sender<WatchEvent>) -> Result<Watcher> {
        let path = absolute(&self.path)?;
        let diagnostics = Arc::new(Diagnostics::default());

        let shell = Arc::clone(&self.shell);
        let kind = self
            .options
            .source
            .select(&path, move || shell.is_available());

        let source = match kind {
            SourceKind::Native => Source::Native(NativeSource::new(
                path.clone(),
                self.options.recursive,
            )),
            SourceKind::Shell => Source::Shell(ShellSource::new(
                path.clone(),
                self.options.mask,
                self.options.recursive,
                self.shell,
                self.binary,
                Arc::clone(&diagnostics),
            )),
        };
        info!("Watching {} with the {:?} source", path.display(), kind);

        let sink = dispatch_sink(self.options.mask, tx, Arc::clone(&diagnostics));

        Ok(Watcher {
            path,
            mask: self.options.mask,
            watching: AtomicBool::new(false),
            source: Mutex::new(source),
            sink,
            diagnostics,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(WatchError::EmptyPath);
    }
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Filters raw events down to the kinds of interest and forwards them in
/// arrival order.
fn dispatch_sink(
    interest: EventMask,
    tx: Sender<WatchEvent>,
    diagnostics: Arc<Diagnostics>,
) -> RawSink {
    Arc::new(move |event: ObservedEvent| {
        let mask = event.mask & interest;
        let path = event.path();
        if mask.is_empty() || path.as_os_str().is_empty() {
            trace!("Dropping {:?}", event);
            diagnostics.record_dropped_event();
            return;
        }
        if tx.send(WatchEvent { mask, path }).is_err() {
            diagnostics.record_dropped_event();
        }
    })
}

/// Struct representing a watch on one file or directory
pub struct Watcher {
    path: PathBuf,
    mask: EventMask,
    watching: AtomicBool,
    source: Mutex<Source>,
    sink: RawSink,
    diagnostics: Arc<Diagnostics>,
}

impl Watcher {
    /// Creates a watcher with default options
    ///
    /// # Arguments
    /// - `path`: The file or directory to watch
    /// - `mask`: The event kinds to report
    /// - `handler`: Called with `(mask, resolved path)` for every event
    ///
    /// # Returns
    /// - `Result<Self>`: The constructed `Watcher`, or an error for an empty path
    pub fn new<F>(path: impl Into<PathBuf>, mask: EventMask, handler: F) -> Result<Self>
    where
        F: FnMut(EventMask, PathBuf) + Send + 'static,
    {
        WatcherBuilder::new(path).mask(mask).build(handler)
    }

    pub fn builder(path: impl Into<PathBuf>) -> WatcherBuilder {
        WatcherBuilder::new(path)
    }

    /// Starts watching the path
    ///
    /// Does nothing if already watching. The path must exist now; a path
    /// created later is never picked up.
    ///
    /// # Returns
    /// - `Result<()>`: `Ok` if the source is active, otherwise the start error
    pub fn start_watching(&self) -> Result<()> {
        // The flag only changes under the source lock, so it always matches
        // the source once the lock is released.
        let mut source = self.source.lock();
        if self.watching.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = source.start(Arc::clone(&self.sink));
        if let Err(e) = &result {
            self.watching.store(false, Ordering::SeqCst);
            info!("Failed to start watching {}: {}", self.path.display(), e);
        }
        result
    }

    /// Stops watching the path
    ///
    /// Does nothing if not watching. Events already in flight may still
    /// reach the handler after this returns.
    pub fn stop_watching(&self) {
        let mut source = self.source.lock();
        if !self.watching.swap(false, Ordering::SeqCst) {
            return;
        }
        source.stop();
    }

    /// Last intent set by `start_watching` / `stop_watching`.
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mask(&self) -> EventMask {
        self.mask
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source.lock().kind()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.source.lock().session_state()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
