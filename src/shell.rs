//! Watching through `inotifywait` running in an elevated shell.
//!
//! The shell is a long lived subprocess. Watch commands are written to its
//! stdin one per line, so a second target queues behind the first instead of
//! spawning another process. A reader thread turns stdout lines into
//! [`ObservedEvent`](crate::ObservedEvent)s.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::binary::BinaryProvider;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, WatchError};
use crate::mask::EventMask;
use crate::protocol;
use crate::source::RawSink;

/// Runs shell command lines with elevated privileges.
pub trait ElevatedShell: Send + Sync {
    /// Whether commands can actually be elevated on this system.
    fn is_available(&self) -> bool;

    /// An interactive shell reading commands from stdin.
    fn command(&self) -> Command;

    /// A one-shot `-c` invocation of the shell.
    fn run(&self, script: &str) -> Command {
        let mut command = self.command();
        command.args(["-c", script]);
        command
    }
}

/// Elevation through a `su` binary.
#[derive(Debug, Clone)]
pub struct SuShell {
    program: String,
}

impl SuShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SuShell {
    fn default() -> Self {
        Self::new("su")
    }
}

impl ElevatedShell for SuShell {
    fn is_available(&self) -> bool {
        match self
            .run("id")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains("uid=0"),
            Err(e) => {
                debug!("{} is not usable: {}", self.program, e);
                false
            }
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }
}

/// A plain `sh` with the caller's own privileges.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainShell;

impl ElevatedShell for PlainShell {
    fn is_available(&self) -> bool {
        true
    }

    fn command(&self) -> Command {
        Command::new("sh")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launching,
    Running,
    Terminated,
}

/// Prefix of the line a tracked command prints before the utility starts.
const PID_MARKER: &str = "rootwatch:pid:";

/// How long termination waits for commands that have not reported a pid yet.
const MARKER_GRACE: Duration = Duration::from_millis(500);

/// Utilities started by a session, as reported on stdout.
#[derive(Default)]
struct Pids {
    list: Mutex<Vec<u32>>,
    reported: Condvar,
}

impl Pids {
    fn record(&self, pid: &str) {
        match pid.trim().parse() {
            Ok(pid) => {
                self.list.lock().push(pid);
                self.reported.notify_all();
            }
            Err(e) => debug!("Bad pid {:?}: {}", pid, e),
        }
    }

    /// Takes the recorded pids once `expected` have arrived or `grace` ran out.
    fn collect(&self, expected: usize, grace: Duration) -> Vec<u32> {
        let deadline = Instant::now() + grace;
        let mut list = self.list.lock();
        while list.len() < expected {
            if self.reported.wait_until(&mut list, deadline).timed_out() {
                break;
            }
        }
        std::mem::take(&mut *list)
    }
}

/// One elevated subprocess, its command queue and its stdout reader.
pub struct ShellSession {
    shell: Arc<dyn ElevatedShell>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    state: Arc<Mutex<SessionState>>,
    pids: Arc<Pids>,
    /// Commands written to the shell whose pid has not been collected.
    issued: usize,
}

impl ShellSession {
    /// Spawns the shell and starts the stdout reader.
    pub fn open(
        shell: Arc<dyn ElevatedShell>,
        state: Arc<Mutex<SessionState>>,
        sink: RawSink,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self> {
        let mut command = shell.command();
        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| WatchError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let Some(stdout) = child.stdout.take() else {
            abandon(child);
            return Err(WatchError::Spawn {
                program,
                source: std::io::Error::other("stdout was not captured"),
            });
        };

        if let Some(stderr) = child.stderr.take() {
            let spawned = thread::Builder::new()
                .name("rootwatch-stderr".into())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                        warn!("{}", line);
                    }
                });
            if let Err(e) = spawned {
                abandon(child);
                return Err(e.into());
            }
        }

        *state.lock() = SessionState::Running;

        let pids = Arc::new(Pids::default());
        let reader = Reader {
            state: Arc::clone(&state),
            pids: Arc::clone(&pids),
            sink,
            diagnostics,
        };
        let spawned = thread::Builder::new()
            .name("rootwatch-shell".into())
            .spawn(move || reader.run(stdout));
        if let Err(e) = spawned {
            abandon(child);
            *state.lock() = SessionState::Terminated;
            return Err(e.into());
        }

        info!("Opened shell session `{}` (pid {})", program, child.id());

        Ok(Self {
            shell,
            child: Some(child),
            stdin,
            state,
            pids,
            issued: 0,
        })
    }

    /// Queues a command line behind any command already running.
    pub fn add_command(&mut self, command: &str) -> Result<()> {
        if self.state() != SessionState::Running {
            return Err(WatchError::SessionTerminated);
        }
        let stdin = self.stdin.as_mut().ok_or(WatchError::SessionTerminated)?;
        let line = tracked_command(command);
        debug!("shell <- {}", line);
        writeln!(stdin, "{}", line)?;
        stdin.flush()?;
        self.issued += 1;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Kills every utility the session started, then the shell itself.
    pub fn terminate(&mut self) {
        // A command written just before this call may not have reported its
        // pid yet. A dead shell reports nothing more.
        let grace = if self.state() == SessionState::Running {
            MARKER_GRACE
        } else {
            Duration::ZERO
        };
        let pids = self.pids.collect(self.issued, grace);
        self.issued = 0;
        *self.state.lock() = SessionState::Terminated;

        if !pids.is_empty() {
            kill_utilities(self.shell.as_ref(), &pids);
        }

        self.stdin.take();
        if let Some(child) = self.child.take() {
            abandon(child);
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Runs `command` in the background after printing its pid, then waits for
/// it, so later commands still queue behind it.
fn tracked_command(command: &str) -> String {
    format!(
        "sh -c 'echo {}$$; exec \"$0\" \"$@\"' {} & wait $!",
        PID_MARKER, command
    )
}

/// Utilities may run with elevated rights, so the kill goes through the
/// same shell.
fn kill_utilities(shell: &dyn ElevatedShell, pids: &[u32]) {
    let pids = pids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let status = shell
        .run(&format!("kill -9 {}", pids))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => debug!("Killed {} {}", crate::binary::UTILITY, pids),
        Ok(status) => debug!("kill {} exited with {}", pids, status),
        Err(e) => warn!("Failed to kill {} {}: {}", crate::binary::UTILITY, pids, e),
    }
}

/// Kills a shell that will not be used and reaps it off-thread.
fn abandon(mut child: Child) {
    if let Err(e) = child.kill() {
        debug!("kill of shell pid {} failed: {}", child.id(), e);
    }
    // Reaping may block while a privileged child ignores the kill.
    let _ = thread::Builder::new()
        .name("rootwatch-reaper".into())
        .spawn(move || {
            let _ = child.wait();
        });
}

struct Reader {
    state: Arc<Mutex<SessionState>>,
    pids: Arc<Pids>,
    sink: RawSink,
    diagnostics: Arc<Diagnostics>,
}

impl Reader {
    /// Consumes stdout until EOF or a read error. Bad lines are skipped.
    fn run(self, stdout: impl Read) {
        let mut stdout = BufReader::new(stdout);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match stdout.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Failed reading shell output: {}", e);
                    break;
                }
            }

            if !self.line(&buf) {
                break;
            }
        }

        let mut state = self.state.lock();
        if *state == SessionState::Running {
            warn!("Shell session exited unexpectedly");
            self.diagnostics.record_unexpected_exit();
        }
        *state = SessionState::Terminated;
    }

    /// Handles one raw line. Returns false once the session stopped running.
    fn line(&self, raw: &[u8]) -> bool {
        let line = std::str::from_utf8(raw).map(|l| l.trim_end_matches(['\r', '\n']));

        // Pids are still needed while the session is being torn down.
        if let Some(pid) = line.ok().and_then(|l| l.strip_prefix(PID_MARKER)) {
            self.pids.record(pid);
            return true;
        }
        if *self.state.lock() != SessionState::Running {
            return false;
        }

        match line {
            Ok(line) => match protocol::parse(Some(line)) {
                Ok(event) => (self.sink)(event),
                Err(e) => {
                    self.diagnostics.record_parse_failure();
                    debug!("Failed parsing output from {}: {}", crate::binary::UTILITY, e);
                }
            },
            Err(e) => {
                self.diagnostics.record_parse_failure();
                debug!("Skipping non UTF-8 output from {}: {}", crate::binary::UTILITY, e);
            }
        }
        true
    }
}

/// Fallback source: the watch utility inside an [`ElevatedShell`].
pub struct ShellSource {
    target: PathBuf,
    mask: EventMask,
    recursive: bool,
    shell: Arc<dyn ElevatedShell>,
    binary: Arc<dyn BinaryProvider>,
    diagnostics: Arc<Diagnostics>,
    state: Arc<Mutex<SessionState>>,
    session: Option<ShellSession>,
}

impl ShellSource {
    pub fn new(
        target: PathBuf,
        mask: EventMask,
        recursive: bool,
        shell: Arc<dyn ElevatedShell>,
        binary: Arc<dyn BinaryProvider>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            target,
            mask,
            recursive,
            shell,
            binary,
            diagnostics,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Resolves the utility, opens a session if none is running and issues
    /// the watch command for the configured target.
    pub fn start(&mut self, sink: RawSink) -> Result<()> {
        let target = self.target.clone();
        self.add_watch(&target, sink)
    }

    /// Watches another path through the running session, opening one if
    /// needed. `sink` is only used when a new session is opened.
    pub fn add_watch(&mut self, target: &Path, sink: RawSink) -> Result<()> {
        let running = self
            .session
            .as_ref()
            .is_some_and(|s| s.state() == SessionState::Running);

        if !running {
            *self.state.lock() = SessionState::Launching;
        }

        let binary = match self.binary.resolve() {
            Ok(binary) => binary,
            Err(e) => {
                if !running {
                    *self.state.lock() = SessionState::Terminated;
                }
                return Err(e);
            }
        };
        let command = watch_command(&binary, target, self.mask, self.recursive);

        if !running {
            self.session = None;
            // A fresh state cell keeps a lingering reader of an earlier
            // session from touching this one.
            self.state = Arc::new(Mutex::new(SessionState::Launching));
            let session = ShellSession::open(
                Arc::clone(&self.shell),
                Arc::clone(&self.state),
                sink,
                Arc::clone(&self.diagnostics),
            );
            match session {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    *self.state.lock() = SessionState::Terminated;
                    return Err(e);
                }
            }
        }

        match self.session.as_mut() {
            Some(session) => session.add_command(&command),
            None => Err(WatchError::SessionTerminated),
        }
    }

    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.terminate();
        }
        let mut state = self.state.lock();
        if *state != SessionState::Idle {
            *state = SessionState::Terminated;
        }
    }
}

/// Quiet, monitoring, CSV output. Kind names are passed with `-e` unless
/// every kind is wanted.
pub fn watch_command(binary: &Path, target: &Path, mask: EventMask, recursive: bool) -> String {
    let mut command = format!("{} -q -m", shell_quote(&binary.to_string_lossy()));
    if recursive {
        command.push_str(" -r");
    }
    command.push_str(" -c");
    if mask != EventMask::ALL {
        for name in mask.names() {
            command.push_str(" -e ");
            command.push_str(&name.to_ascii_lowercase());
        }
    }
    command.push(' ');
    command.push_str(&shell_quote(&target.to_string_lossy()));
    command
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ObservedEvent;

    #[test]
    fn command_requests_quiet_monitor_recursive_csv() {
        let command = watch_command(
            Path::new("/data/bin/inotifywait"),
            Path::new("/data/app"),
            EventMask::ALL,
            true,
        );
        assert_eq!(command, "'/data/bin/inotifywait' -q -m -r -c '/data/app'");
    }

    #[test]
    fn command_lists_kinds_for_partial_masks() {
        let command = watch_command(
            Path::new("iw"),
            Path::new("/x"),
            EventMask::CREATE | EventMask::DELETE,
            false,
        );
        assert_eq!(command, "'iw' -q -m -c -e create -e delete '/x'");
    }

    #[test]
    fn quotes_single_quotes_in_paths() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn tracked_command_reports_pid_then_waits() {
        assert_eq!(
            tracked_command("'iw' -q -m -c '/x'"),
            r#"sh -c 'echo rootwatch:pid:$$; exec "$0" "$@"' 'iw' -q -m -c '/x' & wait $!"#
        );
    }

    #[test]
    fn reader_records_pids_and_skips_bad_lines() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let diagnostics = Arc::new(Diagnostics::default());
        let reader = Reader {
            state: Arc::new(Mutex::new(SessionState::Running)),
            pids: Arc::default(),
            sink: Arc::new(move |event: ObservedEvent| {
                let _ = tx.send(event);
            }),
            diagnostics: Arc::clone(&diagnostics),
        };
        let pids = Arc::clone(&reader.pids);
        let state = Arc::clone(&reader.state);

        let output: &[u8] = b"rootwatch:pid:4242\n/d,CREATE,bad\xffname\n/d,CREATE,ok\n";
        reader.run(output);

        assert_eq!(*pids.list.lock(), vec![4242]);
        assert_eq!(rx.try_recv().unwrap().path(), PathBuf::from("/d/ok"));
        assert!(rx.try_recv().is_err());
        assert_eq!(diagnostics.parse_failures(), 1);
        assert_eq!(diagnostics.unexpected_exits(), 1);
        assert_eq!(*state.lock(), SessionState::Terminated);
    }

    #[test]
    fn reader_keeps_recording_pids_after_termination() {
        let diagnostics = Arc::new(Diagnostics::default());
        let reader = Reader {
            state: Arc::new(Mutex::new(SessionState::Terminated)),
            pids: Arc::default(),
            sink: Arc::new(|_: ObservedEvent| panic!("event after termination")),
            diagnostics: Arc::clone(&diagnostics),
        };
        let pids = Arc::clone(&reader.pids);

        let output: &[u8] = b"rootwatch:pid:9\n/d,CREATE,a\n";
        reader.run(output);

        assert_eq!(*pids.list.lock(), vec![9]);
        assert_eq!(diagnostics.unexpected_exits(), 0);
    }

    #[test]
    fn collect_waits_for_late_pids() {
        let pids = Arc::new(Pids::default());
        let late = Arc::clone(&pids);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            late.record("7");
        });

        assert_eq!(pids.collect(1, Duration::from_secs(5)), vec![7]);
        handle.join().unwrap();
        assert!(pids.collect(1, Duration::ZERO).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn abandoned_shell_is_killed_and_reaped() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let proc_dir = PathBuf::from(format!("/proc/{}", child.id()));
        abandon(child);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while proc_dir.exists() && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(!proc_dir.exists());
    }

    #[test]
    fn source_starts_idle() {
        let source = ShellSource::new(
            PathBuf::from("/x"),
            EventMask::ALL,
            true,
            Arc::new(PlainShell),
            Arc::new(crate::binary::FixedBinary(PathBuf::from("/nonexistent"))),
            Arc::default(),
        );
        assert_eq!(source.state(), SessionState::Idle);
    }

    #[test]
    fn provisioning_failure_fails_start() {
        let mut source = ShellSource::new(
            PathBuf::from("/x"),
            EventMask::ALL,
            true,
            Arc::new(PlainShell),
            Arc::new(crate::binary::FixedBinary(PathBuf::from("/nonexistent/iw"))),
            Arc::default(),
        );
        let result = source.start(Arc::new(|_: ObservedEvent| {}));
        assert!(matches!(result, Err(WatchError::Provision { .. })));
        assert_eq!(source.state(), SessionState::Terminated);
    }
}
