//! Fan-out task submission for joined/striped sync.
//!
//! A bounded channel plus a fixed pool of background threads.
//! `JoinedPageArray::sync` and `StripedPageArray::sync` submit
//! every sub-array's sync but the last to this pool and run the last one
//! on the calling thread, so the caller never sits idle.

use crossbeam_channel::{bounded, Sender};
use std::sync::OnceLock;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct WorkerPool {
    tx: Sender<Job>,
}

impl WorkerPool {
    fn new(threads: usize) -> Self {
        let (tx, rx) = bounded::<Job>(256);
        for i in 0..threads.max(1) {
            let rx = rx.clone();
            thread::Builder::new()
                .name(format!("pagedio-sync-{i}"))
                .spawn(move || {
                    for job in rx {
                        job();
                    }
                })
                .expect("failed to spawn sync worker thread");
        }
        Self { tx }
    }
}

fn pool() -> &'static WorkerPool {
    static POOL: OnceLock<WorkerPool> = OnceLock::new();
    POOL.get_or_init(|| {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(8);
        WorkerPool::new(threads)
    })
}

/// Submits `f` to the shared pool, returning a handle that yields its
/// result when joined. Used for every sub-array sync except the last,
/// which runs synchronously on the caller's thread.
pub(crate) fn submit<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> JoinHandle<T> {
    let (result_tx, result_rx) = crossbeam_channel::bounded(1);
    let job: Job = Box::new(move || {
        let _ = result_tx.send(f());
    });
    pool().tx.send(job).expect("sync worker pool is alive for the process lifetime");
    JoinHandle { result_rx }
}

pub(crate) struct JoinHandle<T> {
    result_rx: crossbeam_channel::Receiver<T>,
}

impl<T> JoinHandle<T> {
    /// Blocks until the submitted task completes.
    pub(crate) fn join(self) -> T {
        self.result_rx
            .recv()
            .expect("worker thread dropped the result sender without sending")
    }
}
