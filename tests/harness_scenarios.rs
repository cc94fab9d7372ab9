// tests/harness_scenarios.rs
//
// Drives the harness in-process, with the producer on a thread instead of a
// forked process. Pipes behave the same either way.

use pollbench::backend::BackendKind;
use pollbench::channel::{
    write_token, ChannelSet, ControlChannel, ControlReader, TokenRead, WriteEnds,
};
use pollbench::harness::Harness;
use pollbench::producer::{Producer, ProducerExit};
use pollbench::{BenchError, RoundOrder};
use std::thread::{self, JoinHandle};

struct Rig {
    harness: Harness,
    producer: JoinHandle<ProducerExit>,
}

fn rig_with<F>(channels: usize, order: RoundOrder, producer: F) -> Rig
where
    F: FnOnce(ControlReader, WriteEnds) -> ProducerExit + Send + 'static,
{
    let (reads, writes) = ChannelSet::open(channels).expect("open channels").split();
    let (control_rx, control_tx) = ControlChannel::open().expect("open control").split();
    let producer = thread::spawn(move || producer(control_rx, writes));
    Rig {
        harness: Harness::new(control_tx, reads, order),
        producer,
    }
}

fn rig(channels: usize, order: RoundOrder) -> Rig {
    rig_with(channels, order, |control, writes| {
        Producer::new(control, writes).run()
    })
}

/// Echoes every request to the right channel but with the wrong payload.
fn rigged_producer(control: ControlReader, writes: WriteEnds) -> ProducerExit {
    loop {
        match control.recv().expect("control read") {
            TokenRead::Value(index) => {
                write_token(writes.get(index as usize).unwrap(), index + 1000).unwrap()
            }
            _ => return ProducerExit::Shutdown,
        }
    }
}

#[test_log::test]
fn test_descriptor_poll_runs_four_rounds_in_descending_order() {
    let Rig {
        mut harness,
        producer,
    } = rig(4, RoundOrder::Descending);
    let mut backend = BackendKind::DescriptorPoll.create().unwrap();
    harness.prepare(backend.as_mut()).unwrap();

    let mut seen = Vec::new();
    let report = harness
        .run_with(backend.as_mut(), |round| {
            assert_eq!(round.outcome.ready, 1);
            assert_eq!(round.outcome.mismatches, 0);
            seen.push(round.index);
        })
        .unwrap();

    assert_eq!(seen, vec![3, 2, 1, 0]);
    assert_eq!(report.rounds, 4);
    assert_eq!(report.channels, 4);
    assert_eq!(report.backend, "poll");
    assert_eq!(report.mismatches, 0);
    assert_eq!(report.mean_us, report.total_us / 4);

    drop(harness.finish());
    assert_eq!(producer.join().unwrap(), ProducerExit::Shutdown);
}

#[test_log::test]
fn test_every_backend_completes_a_full_run() {
    for kind in BackendKind::available() {
        for order in [RoundOrder::Descending, RoundOrder::Ascending] {
            let Rig {
                mut harness,
                producer,
            } = rig(6, order);
            let mut backend = kind.create().unwrap();
            harness.prepare(backend.as_mut()).unwrap();

            let report = harness.run(backend.as_mut()).unwrap();
            assert_eq!(report.rounds, 6, "{} {:?}", kind, order);
            assert_eq!(report.mismatches, 0, "{} {:?}", kind, order);
            assert_eq!(report.multi_ready_rounds, 0, "{} {:?}", kind, order);
            assert_eq!(report.backend, kind.name());

            drop(harness.finish());
            assert_eq!(producer.join().unwrap(), ProducerExit::Shutdown);
        }
    }
}

#[test_log::test]
fn test_wrong_payload_is_reported_once_per_round_without_aborting() {
    for kind in BackendKind::available() {
        let Rig {
            mut harness,
            producer,
        } = rig_with(3, RoundOrder::Descending, rigged_producer);
        let mut backend = kind.create().unwrap();
        harness.prepare(backend.as_mut()).unwrap();

        let mut per_round = Vec::new();
        let report = harness
            .run_with(backend.as_mut(), |round| per_round.push(round.outcome.mismatches))
            .unwrap();

        assert_eq!(per_round, vec![1, 1, 1], "{}", kind);
        assert_eq!(report.rounds, 3);
        assert_eq!(report.mismatches, 3);

        drop(harness.finish());
        producer.join().unwrap();
    }
}

#[test_log::test]
fn test_platform_queue_delivers_again_on_a_second_pass() {
    let Rig {
        mut harness,
        producer,
    } = rig(2, RoundOrder::Descending);
    let mut backend = BackendKind::PlatformEventQueue.create().unwrap();
    harness.prepare(backend.as_mut()).unwrap();

    for _ in 0..2 {
        let report = harness.run(backend.as_mut()).unwrap();
        assert_eq!(report.rounds, 2);
        assert_eq!(report.mismatches, 0);
    }

    drop(harness.finish());
    assert_eq!(producer.join().unwrap(), ProducerExit::Shutdown);
}

#[test_log::test]
fn test_zero_channels_shut_the_producer_down_cleanly() {
    let Rig {
        mut harness,
        producer,
    } = rig(0, RoundOrder::Descending);
    let mut backend = BackendKind::ReadinessBitmask.create().unwrap();
    harness.prepare(backend.as_mut()).unwrap();

    let report = harness.run(backend.as_mut()).unwrap();
    assert_eq!(report.rounds, 0);
    assert_eq!(report.mean_us, 0);

    drop(harness.finish());
    let exit = producer.join().unwrap();
    assert_eq!(exit, ProducerExit::Shutdown);
    assert_eq!(exit.status(), 0);
}

#[test_log::test]
fn test_vanished_producer_aborts_the_loop() {
    // Serves one request, then hangs up on everything.
    let Rig {
        mut harness,
        producer,
    } = rig_with(3, RoundOrder::Descending, |control, writes| {
        let mut producer = Producer::new(control, writes);
        producer.step();
        ProducerExit::Shutdown
    });
    let mut backend = BackendKind::DescriptorPoll.create().unwrap();
    harness.prepare(backend.as_mut()).unwrap();

    let err = harness.run(backend.as_mut()).expect_err("control pipe is gone");
    assert!(matches!(err, BenchError::ControlWrite { .. }), "{:?}", err);
    producer.join().unwrap();
}
