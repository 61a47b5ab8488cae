use std::path::{Path, PathBuf};

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::{Result, WatchError};
use crate::mask::EventMask;
use crate::protocol::ObservedEvent;
use crate::source::RawSink;

/// Struct representing the kernel-backed watch on a readable path
pub struct NativeSource {
    target: PathBuf,
    recursive: bool,
    watcher: Option<RecommendedWatcher>,
}

impl NativeSource {
    pub fn new(target: PathBuf, recursive: bool) -> Self {
        Self {
            target,
            recursive,
            watcher: None,
        }
    }

    /// Starts delivering events for the target to `sink`
    ///
    /// # Arguments
    /// - `sink`: Receives one `ObservedEvent` per path of every notify event
    ///
    /// # Returns
    /// - `Ok` when the watch is established, or when the target does not
    ///   exist (nothing will ever be reported then). An error if the kernel
    ///   watch could not be created.
    pub fn start(&mut self, sink: RawSink) -> Result<()> {
        if !self.target.exists() {
            warn!(
                "{} does not exist, no events will be reported",
                self.target.display()
            );
            return Ok(());
        }

        let root = self.target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for observed in translate(&root, &event) {
                        sink(observed);
                    }
                }
                Err(e) => warn!("Native watch error: {}", e),
            }
        })
        .map_err(|source| WatchError::Notify {
            path: self.target.clone(),
            source,
        })?;

        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&self.target, mode)
            .map_err(|source| WatchError::Notify {
                path: self.target.clone(),
                source,
            })?;

        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.target) {
                debug!("Failed to unwatch {}: {}", self.target.display(), e);
            }
        }
    }
}

/// Splits a notify event into one observed event per path.
fn translate(root: &Path, event: &Event) -> Vec<ObservedEvent> {
    event
        .paths
        .iter()
        .enumerate()
        .filter_map(|(index, path)| {
            let is_root = path == root;
            let mask = kind_mask(&event.kind, index, is_root);
            if mask.is_empty() {
                return None;
            }
            Some(observed(root, path, mask, is_root))
        })
        .collect()
}

fn observed(root: &Path, path: &Path, mask: EventMask, is_root: bool) -> ObservedEvent {
    match (is_root, path.parent(), path.file_name()) {
        (false, Some(parent), Some(name)) => {
            ObservedEvent::new(mask, parent, Some(name.to_string_lossy().into_owned()))
        }
        _ => ObservedEvent::new(mask, root, None),
    }
}

fn kind_mask(kind: &EventKind, index: usize, is_root: bool) -> EventMask {
    match kind {
        EventKind::Access(AccessKind::Open(_)) => EventMask::OPEN,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => EventMask::CLOSE_WRITE,
        EventKind::Access(AccessKind::Close(_)) => EventMask::CLOSE_NOWRITE,
        EventKind::Access(_) => EventMask::ACCESS,
        EventKind::Create(_) => EventMask::CREATE,
        EventKind::Modify(ModifyKind::Metadata(_)) => EventMask::ATTRIB,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => EventMask::MOVED_FROM,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => EventMask::MOVED_TO,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if index == 0 => {
            EventMask::MOVED_FROM
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => EventMask::MOVED_TO,
        EventKind::Modify(ModifyKind::Name(_)) if is_root => EventMask::MOVE_SELF,
        EventKind::Modify(ModifyKind::Name(_)) => EventMask::MOVED_FROM | EventMask::MOVED_TO,
        EventKind::Modify(_) => EventMask::MODIFY,
        EventKind::Remove(_) if is_root => EventMask::DELETE_SELF,
        EventKind::Remove(_) => EventMask::DELETE,
        EventKind::Any | EventKind::Other => EventMask::empty(),
    }
}
