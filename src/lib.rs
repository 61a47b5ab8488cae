//! Watch a file or directory for inotify events, even without permission
//! to read it.
//!
//! A [`Watcher`] probes the target when it is built. Readable paths are
//! watched through the kernel directly (via `notify`); unreadable ones,
//! when elevation is available, through `inotifywait` running in an
//! elevated shell whose CSV output is parsed line by line. Either way the
//! handler receives `(EventMask, PathBuf)` pairs on a single dispatch
//! thread, in the order the source produced them.
//!
//! ```no_run
//! use rootwatch::{EventMask, Watcher};
//!
//! let watcher = Watcher::new("/data/app", EventMask::CREATE | EventMask::DELETE, |mask, path| {
//!     println!("{mask} {}", path.display());
//! })?;
//! watcher.start_watching()?;
//! # Ok::<(), rootwatch::WatchError>(())
//! ```

pub mod binary;
pub mod config;
mod diagnostics;
mod error;
pub mod mask;
pub mod native;
pub mod protocol;
pub mod shell;
pub mod source;
mod watcher;

pub use binary::{BinaryProvider, BundledBinary, FixedBinary, SystemBinary};
pub use diagnostics::Diagnostics;
pub use error::{Result, WatchError};
pub use mask::EventMask;
pub use protocol::ObservedEvent;
pub use shell::{ElevatedShell, PlainShell, SessionState, SuShell};
pub use source::{SourceKind, SourcePreference};
pub use watcher::{WatchEvent, WatchOptions, Watcher, WatcherBuilder};
