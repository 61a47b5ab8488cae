//! Common utilities for integration tests

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// What a fake `inotifywait` does after printing its lines.
#[allow(dead_code)]
pub enum Tail {
    /// Keep running like `-m` does.
    Hold,
    /// Exit, letting the shell run the next queued command.
    Exit,
    /// Print one CREATE line for the watched path, then exit.
    EchoTarget,
    /// Kill the shell that launched it.
    KillShell,
}

/// A stand-in for `inotifywait` that logs its arguments and prints canned
/// CSV lines.
pub struct FakeUtility {
    pub binary: PathBuf,
    pub log: PathBuf,
}

impl FakeUtility {
    pub fn new(dir: &Path, lines: &[&str], tail: Tail) -> Self {
        let tail = match tail {
            Tail::Hold => "exec sleep 30",
            Tail::Exit => "",
            Tail::EchoTarget => "printf '%s,CREATE,marker\\n' \"$last\"",
            Tail::KillShell => "kill -9 $PPID",
        };
        let body = if lines.is_empty() {
            String::new()
        } else {
            format!("cat <<'LINES'\n{}\nLINES\n", lines.join("\n"))
        };
        Self::with_body(dir, &format!("{}{}", body, tail))
    }

    /// A utility running `body` after logging its arguments.
    pub fn with_body(dir: &Path, body: &str) -> Self {
        let binary = dir.join("inotifywait");
        let log = dir.join("invocations.log");
        let script = format!(
            "#!/bin/sh\nfor last; do :; done\necho \"$*\" >> '{}'\n{}\n",
            log.display(),
            body
        );
        fs::write(&binary, script).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        Self { binary, log }
    }

    /// Argument lines the utility was invoked with so far.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Polls `check` until it holds or `TIMEOUT` passes.
pub fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    check()
}

/// Whether `pid` names a live, non-zombie process.
#[allow(dead_code)]
#[cfg(target_os = "linux")]
pub fn alive(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        Err(_) => false,
    }
}
