//! Concurrency Tests
//!
//! Tests for:
//! - A shared warden used from several threads at once
//! - Completions delivered from a driver thread while others submit

mod common;

use std::sync::Arc;
use std::thread;

use common::{device, warden, MockDriver};
use gpu_warden::{BufferDescriptor, BufferUsages, DriverEvent, ResourceKind, Warden};

const THREADS: usize = 4;
const ROUNDS: usize = 50;

#[test]
fn create_and_destroy_churn_from_many_threads() {
    let w: Arc<Warden<MockDriver>> = Arc::new(warden());
    let d = device(&w);

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let w = Arc::clone(&w);
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let b = w
                        .create_buffer(
                            d,
                            &BufferDescriptor {
                                size: 64,
                                usage: BufferUsages::COPY_DST,
                                ..Default::default()
                            },
                        )
                        .unwrap();
                    if round % 2 == 0 {
                        assert_eq!(w.destroy(b).unwrap(), 1);
                        assert!(!w.is_alive(b));
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let stats = w.stats();
    assert_eq!(stats.count(ResourceKind::Buffer), THREADS * ROUNDS / 2);
    assert_eq!(stats.tombstones, THREADS * ROUNDS / 2);

    assert_eq!(w.destroy(d).unwrap(), 1 + THREADS * ROUNDS / 2);
    assert_eq!(w.driver().live_count(), 0);
}

#[test]
fn completions_from_driver_thread_interleave_with_submits() {
    let w: Arc<Warden<MockDriver>> = Arc::new(warden());
    let d = device(&w);
    let queue = w.device_queue(d).unwrap();
    let (done_tx, done_rx) = flume::unbounded();

    let driver_thread = {
        let sender = w.event_sender();
        thread::spawn(move || {
            for id in done_rx.iter() {
                sender.send(DriverEvent::WorkDone(id));
            }
        })
    };

    let submitters: Vec<_> = (0..THREADS)
        .map(|_| {
            let w = Arc::clone(&w);
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let encoder = w.create_command_encoder(d, None).unwrap();
                    w.finish(encoder).unwrap();
                    let id = w.submit(queue, &[encoder]).unwrap().unwrap();
                    done_tx.send(id).unwrap();
                    w.poll_completions();
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }
    drop(done_tx);
    driver_thread.join().unwrap();

    w.poll_completions();
    let stats = w.stats();
    assert_eq!(stats.pending_submissions, 0);
    assert_eq!(stats.count(ResourceKind::CommandEncoder), 0);
}
