use colored::*;
use rootwatch::{EventMask, WatchEvent};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Debug output only when verbose;
/// `RUST_LOG` overrides either way.
pub fn init(verbose: bool) {
    let default = if verbose { "rootwatch=debug" } else { "rootwatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints one event to stdout
pub fn event(event: &WatchEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to encode event: {}", e),
        }
        return;
    }
    println!("{} {}", paint(event.mask), event.path.display());
}

fn paint(mask: EventMask) -> ColoredString {
    let label = format!("[{}]", mask);
    let label = label.as_str();
    if mask.intersects(EventMask::CREATE | EventMask::MOVED_TO) {
        label.green()
    } else if mask.intersects(EventMask::DELETE | EventMask::DELETE_SELF | EventMask::MOVED_FROM) {
        label.red()
    } else if mask.intersects(EventMask::MODIFY | EventMask::CLOSE_WRITE | EventMask::ATTRIB) {
        label.yellow()
    } else {
        label.dimmed()
    }
}
