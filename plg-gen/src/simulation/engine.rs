use std::any::Any;
use std::panic::{
    self,
    AssertUnwindSafe,
};
use std::sync::atomic::{
    AtomicBool,
    AtomicUsize,
    Ordering,
};
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use crossbeam::channel::{
    self,
    Receiver,
    Sender,
};
use indicatif::ProgressBar;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

/// Receives one tick per finished job, whether it succeeded or not.
pub trait Progress: Sync {
    /// Record one finished job.
    fn inc(&self);
}

impl Progress for ProgressBar {
    fn inc(&self) {
        Self::inc(self, 1);
    }
}

impl Progress for AtomicUsize {
    fn inc(&self) {
        self.fetch_add(1, Ordering::Relaxed);
    }
}

impl Progress for () {
    fn inc(&self) {}
}

/// Shared flag asking the engine to stop handing out work.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Token that is not cancelled yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`Self::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one job, tagged with its submission index.
#[derive(Debug)]
pub struct JobOutcome<T> {
    /// Submission index.
    pub index: usize,
    /// Label the job was submitted with.
    pub label: String,
    /// What the job returned. A panic becomes an error.
    pub result: anyhow::Result<T>,
}

/// Everything a batch produced, ordered by submission index.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Outcomes of the jobs that ran.
    pub outcomes: Vec<JobOutcome<T>>,
    /// Jobs handed to the queue.
    pub submitted: usize,
    /// Whether the batch was cut short.
    pub cancelled: bool,
}

impl<T> BatchReport<T> {
    /// Values of the jobs that succeeded.
    pub fn successes(&self) -> impl Iterator<Item = &T> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Outcomes of the jobs that failed.
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome<T>> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Index, label and job as they sit in the queue.
type Queued<F> = (usize, String, F);

/// Fixed-size pool of OS worker threads fed through a bounded queue.
///
/// The producer blocks once `queue_capacity` jobs are waiting, so memory stays bounded regardless
/// of the batch size. A job that fails or panics only affects its own outcome.
#[derive(Clone, Debug)]
pub struct SimulationEngine {
    /// Worker threads.
    workers: usize,
    /// Jobs buffered ahead of the workers.
    queue_capacity: usize,
    /// Stop flag checked before each job.
    cancel: CancellationToken,
}

impl SimulationEngine {
    /// Engine with at least one worker and a queue slot.
    #[must_use]
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Share `token` with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this engine.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every `(label, job)` pair and wait for the pool to drain.
    ///
    /// After cancellation no new job is dispatched and queued jobs are discarded; jobs already
    /// running finish normally.
    #[instrument(skip_all, fields(workers = self.workers, queue_capacity = self.queue_capacity))]
    pub fn run<T, F, I>(&self, jobs: I, progress: &dyn Progress) -> BatchReport<T>
    where
        I: IntoIterator<Item = (String, F)>,
        F: FnOnce() -> anyhow::Result<T> + Send,
        T: Send,
    {
        let (job_tx, job_rx) = channel::bounded::<Queued<F>>(self.queue_capacity);
        let (out_tx, out_rx) = channel::unbounded::<JobOutcome<T>>();
        let mut submitted = 0;

        thread::scope(|s| {
            for worker in 0..self.workers {
                let queue = job_rx.clone();
                let outcomes = out_tx.clone();
                let cancel = &self.cancel;
                s.spawn(move || work(worker, &queue, &outcomes, cancel, progress));
            }
            drop(job_rx);
            drop(out_tx);

            for (index, (label, job)) in jobs.into_iter().enumerate() {
                if self.cancel.is_cancelled() {
                    debug!(index, "cancelled, no more jobs dispatched");
                    break;
                }
                if job_tx.send((index, label, job)).is_err() {
                    break;
                }
                submitted += 1;
            }
            drop(job_tx);
        });

        let mut outcomes: Vec<_> = out_rx.try_iter().collect();
        outcomes.sort_unstable_by_key(|o| o.index);
        let cancelled = self.cancel.is_cancelled();
        info!(submitted, completed = outcomes.len(), cancelled, "batch finished");
        BatchReport { outcomes, submitted, cancelled }
    }
}

/// Worker loop: run queued jobs until the queue closes or the batch is cancelled.
fn work<T, F>(
    worker: usize,
    jobs: &Receiver<Queued<F>>,
    outcomes: &Sender<JobOutcome<T>>,
    cancel: &CancellationToken,
    progress: &dyn Progress,
) where
    F: FnOnce() -> anyhow::Result<T>,
{
    while let Ok((index, label, job)) = jobs.recv() {
        if cancel.is_cancelled() {
            break;
        }
        let result = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(result) => result,
            Err(payload) => Err(anyhow!("job panicked: {}", panic_message(payload.as_ref()))),
        };
        if let Err(e) = &result {
            warn!(worker, job = %label, "job failed: {e:#}");
        }
        progress.inc();
        if outcomes.send(JobOutcome { index, label, result }).is_err() {
            break;
        }
    }
    debug!(worker, "worker exiting");
}

/// Text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
