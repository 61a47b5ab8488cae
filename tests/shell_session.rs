//! `ShellSource` driven directly, without a `Watcher` on top.
#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{wait_until, FakeUtility, Tail, TIMEOUT};
use crossbeam_channel::unbounded;
use rootwatch::shell::ShellSource;
use rootwatch::source::RawSink;
use rootwatch::{Diagnostics, EventMask, FixedBinary, ObservedEvent, PlainShell, SessionState};

fn source(utility: &FakeUtility, target: PathBuf) -> ShellSource {
    ShellSource::new(
        target,
        EventMask::ALL,
        false,
        Arc::new(PlainShell),
        Arc::new(FixedBinary(utility.binary.clone())),
        Arc::new(Diagnostics::default()),
    )
}

#[test]
fn additional_watches_share_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let utility = FakeUtility::new(dir.path(), &[], Tail::EchoTarget);
    let (tx, rx) = unbounded::<ObservedEvent>();
    let sink: RawSink = Arc::new(move |event| {
        let _ = tx.send(event);
    });

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let mut shell = source(&utility, first.clone());

    shell.start(Arc::clone(&sink)).unwrap();
    shell.add_watch(&second, Arc::clone(&sink)).unwrap();

    let a = rx.recv_timeout(TIMEOUT).unwrap();
    let b = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(a.path(), first.join("marker"));
    assert_eq!(b.path(), second.join("marker"));
    assert_eq!(shell.state(), SessionState::Running);

    let invocations = utility.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations.iter().all(|args| args.starts_with("-q -m -c ")));
    shell.stop();
    assert_eq!(shell.state(), SessionState::Terminated);
}

#[test]
fn finished_commands_leave_the_session_running() {
    let dir = tempfile::tempdir().unwrap();
    let utility = FakeUtility::new(dir.path(), &["/d,\"DELETE_SELF\","], Tail::Exit);
    let (tx, rx) = unbounded::<ObservedEvent>();
    let mut shell = source(&utility, dir.path().join("t"));

    shell
        .start(Arc::new(move |event| {
            let _ = tx.send(event);
        }))
        .unwrap();

    let event = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(event.mask, EventMask::DELETE_SELF);
    assert_eq!(event.name, None);
    assert!(wait_until(|| utility.invocations().len() == 1));
    assert_eq!(shell.state(), SessionState::Running);
    shell.stop();
}
