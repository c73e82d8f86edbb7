//! Serialized upload queue.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cosmicboard_shared::JobId;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, watch};

use super::error::UploadError;
use super::journal::{Marker, UploadJournal};

type TaskFuture = BoxFuture<'static, Result<(), UploadError>>;
type TaskFactory = Box<dyn Fn() -> TaskFuture + Send + Sync>;

/// Observable state of an enqueued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Waiting in the queue.
    Queued,
    /// Currently executing.
    Running,
    /// Failed and still owned by the queue; it will run again.
    Retrying {
        /// Attempts made so far.
        attempts: u32,
        /// Failure message of the last attempt.
        last_error: String,
    },
    /// Completed successfully. Terminal.
    Succeeded,
    /// Given up by the queue's policy. Terminal.
    Failed {
        /// Attempts made in total.
        attempts: u32,
        /// Failure message of the last attempt.
        error: String,
    },
}

impl JobState {
    /// Whether this state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

/// Queue-level failure handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Re-append the failed job to the tail and stop draining until the
    /// next enqueue or kick. Jobs queued behind the failure wait.
    HaltOnFailure,
    /// Mark the failed job terminal and continue with the next one.
    SkipAndContinue,
    /// Retry in place with exponential backoff, then give up and continue.
    RetryWithBackoff {
        /// Total attempts before giving up (including the first).
        max_attempts: u32,
        /// Delay before the second attempt; doubles per attempt.
        base_delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::HaltOnFailure
    }
}

/// Handle returned by [`UploadQueue::enqueue`].
///
/// The handle is observational only: a job cannot be cancelled or
/// withdrawn through it.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    /// Id of the enqueued job.
    #[must_use]
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Current state of the job.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Wait for the first terminal state.
    ///
    /// Under [`RetryPolicy::HaltOnFailure`] a perpetually failing job
    /// never reaches a terminal state, so this future may never resolve
    /// for it.
    pub async fn wait(mut self) -> JobState {
        loop {
            let current = self.state.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }
}

struct Job {
    id: JobId,
    task: TaskFactory,
    attempts: u32,
    state_tx: watch::Sender<JobState>,
}

struct QueueInner {
    jobs: VecDeque<Job>,
    draining: bool,
    in_flight: Option<JobId>,
}

enum DrainStep {
    Continue,
    Halt(Job),
}

/// FIFO queue executing upload tasks one at a time.
///
/// Cloning is cheap and clones share the same queue.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<Mutex<QueueInner>>,
    journal: Arc<dyn UploadJournal>,
    policy: RetryPolicy,
}

impl UploadQueue {
    /// Create a queue with the default halt-on-failure policy.
    #[must_use]
    pub fn new(journal: Arc<dyn UploadJournal>) -> Self {
        Self::with_policy(journal, RetryPolicy::default())
    }

    /// Create a queue with an explicit failure policy.
    #[must_use]
    pub fn with_policy(journal: Arc<dyn UploadJournal>, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                jobs: VecDeque::new(),
                draining: false,
                in_flight: None,
            })),
            journal,
            policy,
        }
    }

    /// Enqueue an upload task and trigger a drain.
    ///
    /// The task is a factory so a failed job can be re-executed. Any task
    /// is accepted; results are reported through the returned handle, not
    /// to the caller of `enqueue`.
    ///
    /// # Errors
    ///
    /// Returns a journal error if the durability marker cannot be
    /// recorded; in that case nothing is enqueued.
    pub async fn enqueue<F, Fut>(&self, task: F) -> Result<JobHandle, UploadError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), UploadError>> + Send + 'static,
    {
        let id = JobId::new();
        self.journal.record(&Marker::new(id.clone())).await?;

        let (state_tx, state_rx) = watch::channel(JobState::Queued);
        let job = Job {
            id: id.clone(),
            task: Box::new(move || -> TaskFuture { Box::pin(task()) }),
            attempts: 0,
            state_tx,
        };

        {
            let mut inner = self.inner.lock().await;
            inner.jobs.push_back(job);
        }
        tracing::debug!(job_id = %id, "enqueued upload job");

        self.kick();
        Ok(JobHandle {
            id,
            state: state_rx,
        })
    }

    /// Trigger a drain attempt. A no-op when a drain is already running.
    pub fn kick(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            queue.drain().await;
        });
    }

    /// Number of jobs currently queued (excluding one in flight).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    /// Whether the queue holds no jobs.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.jobs.is_empty()
    }

    /// Whether a drain loop is currently running.
    pub async fn is_draining(&self) -> bool {
        self.inner.lock().await.draining
    }

    /// Journal markers with no corresponding in-memory job.
    ///
    /// These are the residue of earlier process lifetimes (or of jobs
    /// given up by the policy). The queue never resubmits them itself -
    /// task payloads are closures and cannot be persisted - so sweeping
    /// and resubmitting is the application's decision.
    ///
    /// # Errors
    ///
    /// Returns a journal error if markers cannot be read.
    pub async fn orphaned(&self) -> Result<Vec<Marker>, UploadError> {
        let pending = self.journal.pending().await?;
        let inner = self.inner.lock().await;
        let live: HashSet<&JobId> = inner
            .jobs
            .iter()
            .map(|job| &job.id)
            .chain(inner.in_flight.as_ref())
            .collect();

        Ok(pending
            .into_iter()
            .filter(|marker| !live.contains(&marker.id))
            .collect())
    }

    async fn drain(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.draining {
                return;
            }
            inner.draining = true;
        }

        loop {
            let job = {
                let mut inner = self.inner.lock().await;
                match inner.jobs.pop_front() {
                    Some(job) => {
                        inner.in_flight = Some(job.id.clone());
                        job
                    }
                    None => {
                        inner.draining = false;
                        return;
                    }
                }
            };

            match self.run_job(job).await {
                DrainStep::Continue => {
                    let mut inner = self.inner.lock().await;
                    inner.in_flight = None;
                }
                DrainStep::Halt(job) => {
                    let mut inner = self.inner.lock().await;
                    inner.in_flight = None;
                    inner.jobs.push_back(job);
                    inner.draining = false;
                    return;
                }
            }
        }
    }

    async fn run_job(&self, mut job: Job) -> DrainStep {
        loop {
            job.attempts += 1;
            job.state_tx.send_replace(JobState::Running);

            match (job.task)().await {
                Ok(()) => {
                    if let Err(e) = self.journal.ack(&job.id).await {
                        tracing::error!(job_id = %job.id, error = %e, "failed to ack marker");
                    }
                    tracing::info!(job_id = %job.id, attempts = job.attempts, "upload job completed");
                    job.state_tx.send_replace(JobState::Succeeded);
                    return DrainStep::Continue;
                }
                Err(e) => match self.policy {
                    RetryPolicy::HaltOnFailure => {
                        tracing::warn!(
                            job_id = %job.id,
                            attempts = job.attempts,
                            error = %e,
                            "upload job failed, halting queue drain"
                        );
                        job.state_tx.send_replace(JobState::Retrying {
                            attempts: job.attempts,
                            last_error: e.to_string(),
                        });
                        return DrainStep::Halt(job);
                    }
                    RetryPolicy::SkipAndContinue => {
                        tracing::error!(
                            job_id = %job.id,
                            attempts = job.attempts,
                            error = %e,
                            "upload job failed, skipping"
                        );
                        // Marker retained: only success proves the work
                        // happened, and the failure stays visible via
                        // `orphaned`.
                        job.state_tx.send_replace(JobState::Failed {
                            attempts: job.attempts,
                            error: e.to_string(),
                        });
                        return DrainStep::Continue;
                    }
                    RetryPolicy::RetryWithBackoff {
                        max_attempts,
                        base_delay,
                    } => {
                        if job.attempts >= max_attempts {
                            tracing::error!(
                                job_id = %job.id,
                                attempts = job.attempts,
                                error = %e,
                                "upload job failed, giving up after max attempts"
                            );
                            job.state_tx.send_replace(JobState::Failed {
                                attempts: job.attempts,
                                error: e.to_string(),
                            });
                            return DrainStep::Continue;
                        }

                        let delay = base_delay
                            .saturating_mul(2u32.saturating_pow(job.attempts.saturating_sub(1)));
                        tracing::warn!(
                            job_id = %job.id,
                            attempts = job.attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %e,
                            "upload job failed, retrying after backoff"
                        );
                        job.state_tx.send_replace(JobState::Retrying {
                            attempts: job.attempts,
                            last_error: e.to_string(),
                        });
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use tokio::sync::Notify;
    use tokio::time::sleep;

    use super::super::journal::MemoryJournal;
    use super::*;

    fn queue_with_policy(policy: RetryPolicy) -> (UploadQueue, Arc<MemoryJournal>) {
        let journal = Arc::new(MemoryJournal::new());
        (UploadQueue::with_policy(journal.clone(), policy), journal)
    }

    fn queue() -> (UploadQueue, Arc<MemoryJournal>) {
        queue_with_policy(RetryPolicy::HaltOnFailure)
    }

    async fn wait_for<F>(handle: &JobHandle, predicate: F)
    where
        F: Fn(&JobState) -> bool,
    {
        for _ in 0..200 {
            if predicate(&handle.state()) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for state, last seen: {:?}", handle.state());
    }

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order() {
        let (queue, _journal) = queue();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3u32 {
            let order = Arc::clone(&order);
            let handle = queue
                .enqueue(move || {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().await.push(i);
                        Ok::<(), UploadError>(())
                    }
                })
                .await
                .expect("enqueue");
            handles.push(handle);
        }

        for handle in handles {
            assert_eq!(handle.wait().await, JobState::Succeeded);
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_enqueue_returns_before_completion() {
        let (queue, _journal) = queue();
        let gate = Arc::new(Notify::new());

        let task_gate = Arc::clone(&gate);
        let handle = queue
            .enqueue(move || {
                let gate = Arc::clone(&task_gate);
                async move {
                    gate.notified().await;
                    Ok::<(), UploadError>(())
                }
            })
            .await
            .expect("enqueue");

        assert!(!handle.state().is_terminal());
        gate.notify_one();
        assert_eq!(handle.wait().await, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_halt_on_failure_blocks_jobs_behind_it() {
        let (queue, journal) = queue();
        let gate = Arc::new(Notify::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        // Job A: waits for the gate, fails on the first attempt only.
        let a_attempts = Arc::new(AtomicU32::new(0));
        let a_handle = {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            let attempts = Arc::clone(&a_attempts);
            queue
                .enqueue(move || {
                    let gate = Arc::clone(&gate);
                    let order = Arc::clone(&order);
                    let attempts = Arc::clone(&attempts);
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            gate.notified().await;
                            order.lock().await.push("a:fail");
                            Err(UploadError::task("transient"))
                        } else {
                            order.lock().await.push("a:ok");
                            Ok(())
                        }
                    }
                })
                .await
                .expect("enqueue a")
        };

        // Job B: enqueued behind A while A is still gated.
        let b_handle = {
            let order = Arc::clone(&order);
            queue
                .enqueue(move || {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().await.push("b");
                        Ok::<(), UploadError>(())
                    }
                })
                .await
                .expect("enqueue b")
        };

        // Let every pending drain trigger settle (all but one no-op on the
        // single-flight guard) before releasing A.
        sleep(Duration::from_millis(50)).await;
        gate.notify_one();
        wait_for(&a_handle, |s| matches!(s, JobState::Retrying { .. })).await;

        // The drain halted: B stays queued even though it would succeed.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(b_handle.state(), JobState::Queued);
        assert_eq!(queue.len().await, 2);
        assert!(!queue.is_draining().await);
        assert_eq!(*order.lock().await, vec!["a:fail"]);

        // Markers: nothing acked yet.
        assert_eq!(journal.pending().await.expect("pending").len(), 2);

        // A re-trigger drains B first (A moved to the tail), then A.
        queue.kick();
        assert_eq!(b_handle.wait().await, JobState::Succeeded);
        assert_eq!(a_handle.wait().await, JobState::Succeeded);
        assert_eq!(*order.lock().await, vec!["a:fail", "b", "a:ok"]);
        assert_eq!(a_attempts.load(Ordering::SeqCst), 2);

        assert!(journal.pending().await.expect("pending").is_empty());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_single_flight_under_rapid_enqueues() {
        let (queue, _journal) = queue();
        let current = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let current = Arc::clone(&current);
            let max_seen = Arc::clone(&max_seen);
            let handle = queue
                .enqueue(move || {
                    let current = Arc::clone(&current);
                    let max_seen = Arc::clone(&max_seen);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), UploadError>(())
                    }
                })
                .await
                .expect("enqueue");
            handles.push(handle);
            // Competing drain triggers must all no-op into the running one.
            queue.kick();
        }

        for handle in handles {
            assert_eq!(handle.wait().await, JobState::Succeeded);
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_and_continue_marks_failed_and_moves_on() {
        let (queue, journal) = queue_with_policy(RetryPolicy::SkipAndContinue);

        let failing = queue
            .enqueue(|| async { Err(UploadError::task("permanent")) })
            .await
            .expect("enqueue");
        let failing_id = failing.id().clone();
        let succeeding = queue
            .enqueue(|| async { Ok::<(), UploadError>(()) })
            .await
            .expect("enqueue");

        assert_eq!(
            failing.wait().await,
            JobState::Failed {
                attempts: 1,
                error: "upload task failed: permanent".to_string(),
            }
        );
        assert_eq!(succeeding.wait().await, JobState::Succeeded);

        // The skipped job's marker is retained; the successful one acked.
        let pending = journal.pending().await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(&pending[0].id, &failing_id);
    }

    #[tokio::test]
    async fn test_backoff_retries_until_success() {
        let (queue, journal) = queue_with_policy(RetryPolicy::RetryWithBackoff {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        });

        let attempts = Arc::new(AtomicU32::new(0));
        let task_attempts = Arc::clone(&attempts);
        let handle = queue
            .enqueue(move || {
                let attempts = Arc::clone(&task_attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(UploadError::task("flaky"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .expect("enqueue");

        assert_eq!(handle.wait().await, JobState::Succeeded);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(journal.pending().await.expect("pending").is_empty());
    }

    #[tokio::test]
    async fn test_backoff_gives_up_after_max_attempts() {
        let (queue, _journal) = queue_with_policy(RetryPolicy::RetryWithBackoff {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        });

        let failing = queue
            .enqueue(|| async { Err(UploadError::task("permanent")) })
            .await
            .expect("enqueue");
        let succeeding = queue
            .enqueue(|| async { Ok::<(), UploadError>(()) })
            .await
            .expect("enqueue");

        match failing.wait().await {
            JobState::Failed { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected failed, got {other:?}"),
        }
        assert_eq!(succeeding.wait().await, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_orphaned_reports_markers_without_jobs() {
        let journal = Arc::new(MemoryJournal::new());
        let stale = Marker::new(JobId::from("prior-process-1"));
        journal.record(&stale).await.expect("record");

        let queue = UploadQueue::new(Arc::clone(&journal) as Arc<dyn UploadJournal>);
        assert_eq!(queue.orphaned().await.expect("orphaned"), vec![stale.clone()]);

        // A live job is not reported, even while running.
        let gate = Arc::new(Notify::new());
        let task_gate = Arc::clone(&gate);
        let handle = queue
            .enqueue(move || {
                let gate = Arc::clone(&task_gate);
                async move {
                    gate.notified().await;
                    Ok::<(), UploadError>(())
                }
            })
            .await
            .expect("enqueue");

        wait_for(&handle, |s| *s == JobState::Running).await;
        assert_eq!(queue.orphaned().await.expect("orphaned"), vec![stale.clone()]);

        gate.notify_one();
        assert_eq!(handle.wait().await, JobState::Succeeded);
        assert_eq!(queue.orphaned().await.expect("orphaned"), vec![stale]);
    }

    #[tokio::test]
    async fn test_journal_failure_rejects_enqueue() {
        struct FailingJournal;

        #[async_trait::async_trait]
        impl UploadJournal for FailingJournal {
            async fn record(&self, _marker: &Marker) -> Result<(), UploadError> {
                Err(UploadError::from(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )))
            }

            async fn ack(&self, _id: &JobId) -> Result<(), UploadError> {
                Ok(())
            }

            async fn pending(&self) -> Result<Vec<Marker>, UploadError> {
                Ok(Vec::new())
            }
        }

        let queue = UploadQueue::new(Arc::new(FailingJournal));
        let err = queue
            .enqueue(|| async { Ok::<(), UploadError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Journal { .. }));
        assert!(queue.is_empty().await);
    }
}
