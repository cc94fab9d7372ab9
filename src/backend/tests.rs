// src/backend/tests.rs

use super::*;
use crate::channel::{write_token, ChannelSet, ReadEnds, WriteEnds};

fn prepared(
    kind: BackendKind,
    channels: usize,
) -> (Box<dyn ReadinessBackend>, ReadEnds, WriteEnds) {
    let (reads, writes) = ChannelSet::open(channels).expect("open channels").split();
    let mut backend = kind.create().expect("create backend");
    backend.prepare(&reads.raw_fds()).expect("prepare backend");
    (backend, reads, writes)
}

#[test_log::test]
fn test_every_backend_reports_the_single_ready_channel() {
    for kind in BackendKind::available() {
        let (mut backend, _reads, writes) = prepared(kind, 4);
        for index in [3u32, 0, 2] {
            write_token(writes.get(index as usize).unwrap(), index).unwrap();
            let outcome = backend.wait_for_ready(index).expect("wait");
            assert_eq!(
                outcome,
                WaitOutcome {
                    ready: 1,
                    mismatches: 0
                },
                "{} round {}",
                kind,
                index
            );
        }
    }
}

#[test_log::test]
fn test_wrong_token_is_counted_not_fatal() {
    for kind in BackendKind::available() {
        let (mut backend, _reads, writes) = prepared(kind, 2);
        write_token(writes.get(1).unwrap(), 7).unwrap();
        let outcome = backend.wait_for_ready(1).expect("mismatch must not fail the wait");
        assert_eq!(outcome.ready, 1, "{}", kind);
        assert_eq!(outcome.mismatches, 1, "{}", kind);

        // The next round is unaffected.
        write_token(writes.get(0).unwrap(), 0).unwrap();
        assert_eq!(backend.wait_for_ready(0).unwrap().mismatches, 0, "{}", kind);
    }
}

#[test_log::test]
fn test_one_shot_source_is_rearmed_after_delivery() {
    let (mut backend, _reads, writes) = prepared(BackendKind::PlatformEventQueue, 2);
    for _ in 0..3 {
        write_token(writes.get(1).unwrap(), 1).unwrap();
        let outcome = backend.wait_for_ready(1).expect("re-armed source must fire again");
        assert_eq!(outcome.ready, 1);
        assert_eq!(outcome.mismatches, 0);
    }
}

#[test_log::test]
fn test_level_registration_survives_across_rounds() {
    let (mut backend, _reads, writes) = prepared(BackendKind::EdgeQueue, 1);
    for _ in 0..3 {
        write_token(writes.get(0).unwrap(), 0).unwrap();
        assert_eq!(backend.wait_for_ready(0).unwrap().ready, 1);
    }
}

#[test_log::test]
fn test_bitmask_reports_every_hung_up_channel() {
    let (mut backend, _reads, writes) = prepared(BackendKind::ReadinessBitmask, 3);
    drop(writes);
    let outcome = backend.wait_for_ready(0).unwrap();
    assert_eq!(outcome.ready, 3);
    assert_eq!(outcome.mismatches, 3);
}

#[test_log::test]
fn test_bitmask_rejects_descriptors_beyond_fd_setsize() {
    let mut backend = ReadinessBitmask::new();
    let err = backend
        .prepare(&[libc::FD_SETSIZE as RawFd])
        .expect_err("fd outside the bitmask must be refused");
    assert!(err.is_setup());
}

#[test_log::test]
fn test_queue_wait_before_prepare_fails() {
    let mut backend = QueueBackend::platform();
    assert!(matches!(backend.wait_for_ready(0), Err(BenchError::Wait { .. })));
}

#[test_log::test]
fn test_backend_names_round_trip_through_from_str() {
    for kind in BackendKind::available() {
        assert_eq!(kind.name().parse::<BackendKind>().unwrap(), kind);
    }
    assert!(matches!(
        "devpoll".parse::<BackendKind>(),
        Err(BenchError::UnknownBackend(name)) if name == "devpoll"
    ));
}

#[cfg(target_os = "linux")]
#[test_log::test]
fn test_kqueue_is_refused_on_linux() {
    assert!(matches!("kqueue".parse::<BackendKind>(), Err(BenchError::Unsupported(_))));
    assert_eq!(BackendKind::EdgeQueue.name(), "epoll");
}

#[test_log::test]
fn test_eof_drain_is_a_single_mismatch() {
    let (reads, writes) = ChannelSet::open(1).expect("open channels").split();
    drop(writes);
    let fd = reads.raw_fds()[0];

    let message = mismatch(fd, 4, read_token(reads.get(0).unwrap())).expect("EOF is a mismatch");
    assert_eq!(message, format!("Reached EOF at fd {} (expected 4)", fd));
    assert!(!message.contains('\n'));
    assert!(!drain(fd, 4));
}

#[test_log::test]
fn test_matching_token_is_not_a_mismatch() {
    assert_eq!(mismatch(7, 3, Ok(TokenRead::Value(3))), None);
    let short = mismatch(7, 3, Ok(TokenRead::Short(2))).unwrap();
    assert_eq!(short, "Could not drain pipe [7]: read 2, expected 4");
}
