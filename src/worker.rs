//! The worker executor: a fixed-size thread pool that processes content
//! blocks out of a bounded queue and commits results to a shared sink in
//! strict block-index order, regardless of which worker finishes a batch first.
//!
//! This has no direct precedent elsewhere in this codebase's lineage — it's
//! new machinery this crate needed for parallel, order-preserving content
//! encryption — but it's built from the same primitives (`std::sync::{Mutex,
//! Condvar}`, plain `std::thread`) the rest of the crate's concurrency-aware
//! code (see [`crate::crypto::thread_safety`]) already uses, plus
//! `crossbeam-channel` for the bounded work queue.

use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, SendTimeoutError};
use thiserror::Error;

/// How long a producer blocks trying to enqueue a batch before giving up and
/// aborting the whole pipeline. A bounded queue under sustained backpressure
/// (a slow sink, or workers falling behind) is a correctness hazard if
/// treated as silent end-of-input, so this surfaces as an explicit error
/// instead (see `SPEC_FULL.md` §5/§9).
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on how many blocks one batch carries. Batches start at a
/// single block and grow geometrically up to this, trading off queue/lock
/// contention against per-batch memory.
pub const MAX_BATCH_BLOCKS: usize = 64;

/// One unit of work: a contiguous run of blocks starting at `first_block_index`.
pub struct Batch {
    pub first_block_index: u64,
    /// Per-block input, in order: plaintext when encrypting, on-disk `ciphertext ‖ mac` when decrypting.
    pub blocks: Vec<Vec<u8>>,
}

/// The result of processing one [`Batch`]: output bytes ready to commit to
/// the sink, concatenated in block order.
pub struct ProcessedBatch {
    pub first_block_index: u64,
    pub block_count: u64,
    pub output: Vec<u8>,
}

/// Failure modes from running the worker executor.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A worker's transform step failed on a specific block (e.g. a content MAC mismatch).
    #[error("block {block_index} failed: {message}")]
    Processing { block_index: u64, message: String },
    /// The producer couldn't enqueue a batch within [`ENQUEUE_TIMEOUT`]; the pipeline aborted.
    #[error("enqueueing work timed out after {0:?}: sink or workers are not keeping up")]
    Backpressure(Duration),
    /// An I/O error occurred reading input or committing output.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for WorkerError {
    fn from(err: io::Error) -> Self {
        WorkerError::Io(err.to_string())
    }
}

/// Growing batch-size sequence used by producers: 1, 2, 4, ... up to
/// [`MAX_BATCH_BLOCKS`], then constant.
pub fn next_batch_size(previous: usize) -> usize {
    if previous == 0 {
        1
    } else {
        (previous * 2).min(MAX_BATCH_BLOCKS)
    }
}

struct CommitState {
    current_block: u64,
    error: Option<WorkerError>,
}

/// Run `transform` over batches produced by `next_batch` using a pool of
/// `worker_count` threads, committing each batch's output via `commit`
/// strictly in block-index order.
///
/// `next_batch` is called from a single producer thread and should return
/// `Ok(None)` at end of input. `commit` is invoked from whichever worker
/// currently owns the next block index, while holding the internal commit
/// lock — it should not block for long, since every other worker waiting to
/// commit is blocked behind it.
///
/// On any processing error, the pipeline stops accepting new commits and
/// `run` returns the first error encountered; work already committed before
/// the failure is not rolled back.
pub fn run<S, T, C>(
    worker_count: usize,
    mut next_batch: S,
    transform: T,
    commit: C,
) -> Result<(), WorkerError>
where
    S: FnMut() -> Result<Option<Batch>, WorkerError> + Send + 'static,
    T: Fn(&Batch) -> Result<ProcessedBatch, WorkerError> + Send + Sync + 'static,
    C: Fn(u64, &[u8]) -> io::Result<()> + Send + Sync + 'static,
{
    let worker_count = worker_count.max(1);
    let (batch_tx, batch_rx) = bounded::<Batch>(worker_count * 2);

    let transform = Arc::new(transform);
    let commit = Arc::new(commit);
    let commit_state = Arc::new((Mutex::new(CommitState { current_block: 0, error: None }), Condvar::new()));

    let mut worker_handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let batch_rx = batch_rx.clone();
        let transform = Arc::clone(&transform);
        let commit = Arc::clone(&commit);
        let commit_state = Arc::clone(&commit_state);

        worker_handles.push(std::thread::spawn(move || {
            while let Ok(batch) = batch_rx.recv() {
                let first_block_index = batch.first_block_index;
                let processed = transform(&batch);

                let (lock, condvar) = &*commit_state;
                let mut state = lock.lock().unwrap_or_else(|e| e.into_inner());

                match processed {
                    Ok(processed) => {
                        state = condvar
                            .wait_while(state, |s| {
                                s.error.is_none() && s.current_block != first_block_index
                            })
                            .unwrap_or_else(|e| e.into_inner());

                        if state.error.is_none() {
                            if let Err(e) = commit(processed.first_block_index, &processed.output) {
                                state.error.get_or_insert(WorkerError::from(e));
                            } else {
                                state.current_block += processed.block_count;
                            }
                        }
                    }
                    Err(e) => {
                        state.error.get_or_insert(e);
                    }
                }
                condvar.notify_all();
            }
        }));
    }
    drop(batch_rx);

    let producer = std::thread::spawn(move || -> Result<(), WorkerError> {
        loop {
            let batch = match next_batch()? {
                Some(batch) => batch,
                None => break,
            };
            if let Err(SendTimeoutError::Timeout(_)) =
                batch_tx.send_timeout(batch, ENQUEUE_TIMEOUT)
            {
                return Err(WorkerError::Backpressure(ENQUEUE_TIMEOUT));
            }
        }
        Ok(())
    });
    let producer_result = producer.join().expect("producer thread panicked");

    for handle in worker_handles {
        handle.join().expect("worker thread panicked");
    }

    if let Err(e) = producer_result {
        let (lock, condvar) = &*commit_state;
        let mut state = lock.lock().unwrap_or_else(|e| e.into_inner());
        state.error.get_or_insert_with(|| match &e {
            WorkerError::Backpressure(d) => WorkerError::Backpressure(*d),
            other => WorkerError::Io(other.to_string()),
        });
        drop(state);
        condvar.notify_all();
        return Err(e);
    }

    let (lock, _) = &*commit_state;
    let state = lock.lock().unwrap_or_else(|e| e.into_inner());
    match &state.error {
        Some(WorkerError::Processing { block_index, message }) => {
            Err(WorkerError::Processing { block_index: *block_index, message: message.clone() })
        }
        Some(WorkerError::Backpressure(d)) => Err(WorkerError::Backpressure(*d)),
        Some(WorkerError::Io(msg)) => Err(WorkerError::Io(msg.clone())),
        None => Ok(()),
    }
}
