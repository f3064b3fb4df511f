//! Client-side polling of a generation job until it settles.
//!
//! One fetch is issued immediately and the next one only after the previous
//! result has been handled, so a job never has two status requests in flight.
//! Polling ends on terminal success, on failure, or when the returned
//! [`PollHandle`] is cancelled. Once [`PollHandle::cancel`] has returned no
//! handler method runs again.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ps_core::JobStatus;
use crate::error::AppError;
use crate::generator::backend::StorefrontApi;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Receives the outcome of a polling loop.
pub trait PollHandler: Send + 'static {
    /// Every successfully fetched status, terminal or not.
    fn on_update(&mut self, status: &JobStatus);

    fn on_complete(&mut self, status: JobStatus);

    fn on_error(&mut self, error: AppError);
}

/// [`PollHandler`] built from three closures.
pub struct CallbackHandler<U, C, E> {
    on_update: U,
    on_complete: C,
    on_error: E,
}

pub fn callbacks<U, C, E>(on_update: U, on_complete: C, on_error: E) -> CallbackHandler<U, C, E>
where
    U: FnMut(&JobStatus) + Send + 'static,
    C: FnMut(JobStatus) + Send + 'static,
    E: FnMut(AppError) + Send + 'static,
{
    CallbackHandler {
        on_update,
        on_complete,
        on_error,
    }
}

impl<U, C, E> PollHandler for CallbackHandler<U, C, E>
where
    U: FnMut(&JobStatus) + Send + 'static,
    C: FnMut(JobStatus) + Send + 'static,
    E: FnMut(AppError) + Send + 'static,
{
    fn on_update(&mut self, status: &JobStatus) {
        (self.on_update)(status)
    }

    fn on_complete(&mut self, status: JobStatus) {
        (self.on_complete)(status)
    }

    fn on_error(&mut self, error: AppError) {
        (self.on_error)(error)
    }
}

/// Backoff for transport failures while polling. The default never retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// Next backoff delay, clamped to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOptions {
    pub interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::none(),
        }
    }
}

pub struct JobPoller {
    api: Arc<dyn StorefrontApi>,
    options: PollOptions,
}

impl JobPoller {
    pub fn new(api: Arc<dyn StorefrontApi>, options: PollOptions) -> Self {
        Self { api, options }
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Start polling `job_id` on the current tokio runtime.
    ///
    /// Input problems are reported here; everything that happens after the
    /// first fetch is reported through `handler`.
    pub fn start<H: PollHandler>(&self, job_id: &str, handler: H) -> Result<PollHandle, AppError> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(AppError::Validation("job id must not be empty".into()));
        }
        if self.options.interval.is_zero() {
            return Err(AppError::Validation("poll interval must be greater than 0".into()));
        }

        let token = CancellationToken::new();
        let gate = Arc::new(Gate::default());

        let task = tokio::spawn(run(
            self.api.clone(),
            job_id.to_string(),
            self.options.clone(),
            Dispatcher {
                token: token.clone(),
                gate: gate.clone(),
                handler,
            },
        ));

        Ok(PollHandle { token, gate, task })
    }
}

pub struct PollHandle {
    token: CancellationToken,
    gate: Arc<Gate>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop polling. An in-flight request is abandoned and its result
    /// dropped; no handler method fires after this returns.
    ///
    /// May be called from inside a handler method of this same poll.
    pub fn cancel(&self) {
        self.token.cancel();
        if self.gate.held_by_current_thread() {
            return;
        }
        // Wait out a handler call that started before the token flipped.
        drop(self.gate.enter());
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the polling loop to end.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Polling task ended abnormally");
        }
    }
}

/// Serialises handler calls against [`PollHandle::cancel`], and remembers
/// which thread is inside a handler so a handler can cancel its own poll.
#[derive(Default)]
struct Gate {
    lock: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

impl Gate {
    fn enter(&self) -> MutexGuard<'_, ()> {
        lock_or_recover(&self.lock)
    }

    /// Marks the current thread as inside a handler until the guard drops,
    /// including when the handler panics.
    fn inside(&self) -> Inside<'_> {
        *lock_or_recover(&self.owner) = Some(thread::current().id());
        Inside(self)
    }

    fn held_by_current_thread(&self) -> bool {
        *lock_or_recover(&self.owner) == Some(thread::current().id())
    }
}

struct Inside<'a>(&'a Gate);

impl Drop for Inside<'_> {
    fn drop(&mut self) {
        *lock_or_recover(&self.0.owner) = None;
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("A poll handler panicked while holding the dispatch gate");
        poisoned.into_inner()
    })
}

/// Runs handler methods under the gate so they cannot interleave with
/// [`PollHandle::cancel`].
struct Dispatcher<H> {
    token: CancellationToken,
    gate: Arc<Gate>,
    handler: H,
}

impl<H: PollHandler> Dispatcher<H> {
    fn dispatch(&mut self, f: impl FnOnce(&mut H)) -> bool {
        let _guard = self.gate.enter();
        if self.token.is_cancelled() {
            return false;
        }
        let _inside = self.gate.inside();
        f(&mut self.handler);
        true
    }
}

async fn run<H: PollHandler>(
    api: Arc<dyn StorefrontApi>,
    job_id: String,
    options: PollOptions,
    mut dispatcher: Dispatcher<H>,
) {
    let token = dispatcher.token.clone();
    let mut retries = 0u32;
    let mut backoff = options.retry.initial_delay;
    let mut polls = 0u32;

    loop {
        if token.is_cancelled() {
            debug!(job_id = %job_id, "Polling cancelled");
            return;
        }

        polls += 1;
        let fetched = tokio::select! {
            _ = token.cancelled() => {
                debug!(job_id = %job_id, "Polling cancelled while a request was in flight");
                return;
            }
            result = api.job_status(&job_id) => result,
        };

        let delay = match fetched {
            Ok(status) => {
                retries = 0;
                backoff = options.retry.initial_delay;
                debug!(job_id = %job_id, polls, state = %status.state, progress = status.progress, "Job status");

                if !dispatcher.dispatch(|h| h.on_update(&status)) {
                    return;
                }

                if status.is_terminal_success() {
                    info!(job_id = %job_id, polls, state = %status.state, "Job finished");
                    dispatcher.dispatch(|h| h.on_complete(status));
                    return;
                }

                if status.is_failed() {
                    let message = status.failure_message();
                    warn!(job_id = %job_id, polls, error = %message, "Job failed");
                    dispatcher.dispatch(|h| h.on_error(AppError::JobFailed(message)));
                    return;
                }

                options.interval
            }
            Err(e) if e.is_transient() && retries < options.retry.max_retries => {
                retries += 1;
                warn!(
                    job_id = %job_id,
                    attempt = retries,
                    delay_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Job status request failed, retrying",
                );
                let delay = backoff;
                backoff = options.retry.next_delay(backoff);
                delay
            }
            Err(e) => {
                warn!(job_id = %job_id, polls, error = %e, "Job status request failed");
                dispatcher.dispatch(|h| h.on_error(e));
                return;
            }
        };

        tokio::select! {
            _ = token.cancelled() => {
                debug!(job_id = %job_id, "Polling cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use assert_matches::assert_matches;
    use ps_core::JobState;
    use tokio::sync::mpsc;

    use crate::events::JobEvent;
    use crate::testing::{FakeBackend, job};

    #[derive(Default)]
    struct Record {
        updates: Vec<JobState>,
        completed: Vec<JobStatus>,
        errors: Vec<String>,
    }

    fn recorder() -> (Arc<StdMutex<Record>>, impl PollHandler) {
        let record = Arc::new(StdMutex::new(Record::default()));
        let (r1, r2, r3) = (record.clone(), record.clone(), record.clone());
        let handler = callbacks(
            move |s: &JobStatus| r1.lock().unwrap().updates.push(s.state),
            move |s: JobStatus| r2.lock().unwrap().completed.push(s),
            move |e: AppError| r3.lock().unwrap().errors.push(e.to_string()),
        );
        (record, handler)
    }

    fn poller(api: &Arc<FakeBackend>, options: PollOptions) -> JobPoller {
        JobPoller::new(api.clone(), options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_generation_sequence() {
        let api = Arc::new(FakeBackend::default());
        let mut done = job("job_1", JobState::Completed, 100);
        done.mesh_path = Some("/m/1.glb".into());
        api.script_statuses(vec![
            Ok(job("job_1", JobState::Pending, 10)),
            Ok(job("job_1", JobState::GeneratingImage, 40)),
            Ok(job("job_1", JobState::Converting3d, 70)),
            Ok(done),
        ]);

        let (record, handler) = recorder();
        let handle = poller(&api, PollOptions::default()).start("job_1", handler).unwrap();
        handle.finished().await;

        let record = record.lock().unwrap();
        assert_eq!(
            record.updates,
            [JobState::Pending, JobState::GeneratingImage, JobState::Converting3d, JobState::Completed]
        );
        assert_eq!(record.completed.len(), 1);
        assert_eq!(record.completed[0].mesh_path.as_deref(), Some("/m/1.glb"));
        assert!(record.errors.is_empty());

        let offsets = api.status_call_offsets();
        assert_eq!(
            offsets,
            [0, 2000, 4000, 6000].map(Duration::from_millis).to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_follows_configured_interval() {
        let api = Arc::new(FakeBackend::default());
        let mut script: Vec<_> = (0..5).map(|_| Ok(job("job_2", JobState::GeneratingImage, 40))).collect();
        script.push(Ok(job("job_2", JobState::Completed, 100)));
        api.script_statuses(script);

        let options = PollOptions {
            interval: Duration::from_millis(750),
            ..Default::default()
        };
        let (record, handler) = recorder();
        poller(&api, options).start("job_2", handler).unwrap().finished().await;

        let offsets = api.status_call_offsets();
        assert_eq!(offsets.len(), 6);
        for (i, offset) in offsets.iter().enumerate() {
            assert_eq!(*offset, Duration::from_millis(750 * i as u64));
        }
        assert_eq!(record.lock().unwrap().completed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concept_only_job_completes_at_concept_ready() {
        let api = Arc::new(FakeBackend::default());
        let mut concept = job("job_3", JobState::ConceptReady, 60);
        concept.concept_only = true;
        api.script_statuses(vec![Ok(job("job_3", JobState::GeneratingImage, 40)), Ok(concept)]);

        let (record, handler) = recorder();
        poller(&api, PollOptions::default()).start("job_3", handler).unwrap().finished().await;

        let record = record.lock().unwrap();
        assert_eq!(record.completed.len(), 1);
        assert_eq!(record.completed[0].state, JobState::ConceptReady);
        assert_eq!(api.status_call_offsets().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concept_ready_keeps_polling_for_full_jobs() {
        let api = Arc::new(FakeBackend::default());
        api.script_statuses(vec![
            Ok(job("job_4", JobState::ConceptReady, 60)),
            Ok(job("job_4", JobState::Completed, 100)),
        ]);

        let (record, handler) = recorder();
        poller(&api, PollOptions::default()).start("job_4", handler).unwrap().finished().await;

        assert_eq!(record.lock().unwrap().completed[0].state, JobState::Completed);
        assert_eq!(api.status_call_offsets().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_reports_its_message() {
        let api = Arc::new(FakeBackend::default());
        let mut failed = job("job_5", JobState::Failed, 0);
        failed.error_message = Some("Image model timed out".into());
        api.script_statuses(vec![Ok(job("job_5", JobState::Pending, 10)), Ok(failed)]);

        let (record, handler) = recorder();
        poller(&api, PollOptions::default()).start("job_5", handler).unwrap().finished().await;

        let record = record.lock().unwrap();
        assert_eq!(record.errors, ["Image model timed out"]);
        assert!(record.completed.is_empty());
        assert_eq!(record.updates.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_without_message_uses_fallback() {
        let api = Arc::new(FakeBackend::default());
        api.script_statuses(vec![Ok(job("job_6", JobState::Failed, 0))]);

        let (record, handler) = recorder();
        poller(&api, PollOptions::default()).start("job_6", handler).unwrap().finished().await;

        assert_eq!(record.lock().unwrap().errors, ["Job failed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_fails_fast_by_default() {
        let api = Arc::new(FakeBackend::default());
        api.script_statuses(vec![
            Ok(job("job_7", JobState::Pending, 10)),
            Err(AppError::Network("connection reset".into())),
            Ok(job("job_7", JobState::Completed, 100)),
        ]);

        let (record, handler) = recorder();
        poller(&api, PollOptions::default()).start("job_7", handler).unwrap().finished().await;

        let record = record.lock().unwrap();
        assert_eq!(record.errors, ["Network error: connection reset"]);
        assert!(record.completed.is_empty());
        assert_eq!(api.status_call_offsets().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_backs_off_on_network_errors() {
        let api = Arc::new(FakeBackend::default());
        api.script_statuses(vec![
            Err(AppError::Network("connection refused".into())),
            Err(AppError::Network("connection refused".into())),
            Ok(job("job_8", JobState::Completed, 100)),
        ]);

        let options = PollOptions {
            retry: RetryPolicy::with_retries(3),
            ..Default::default()
        };
        let (record, handler) = recorder();
        poller(&api, options).start("job_8", handler).unwrap().finished().await;

        assert_eq!(record.lock().unwrap().completed.len(), 1);
        assert_eq!(
            api.status_call_offsets(),
            [0, 1000, 3000].map(Duration::from_millis).to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_gives_up_and_skips_http_errors() {
        let api = Arc::new(FakeBackend::default());
        api.script_statuses(vec![
            Err(AppError::Network("connection refused".into())),
            Err(AppError::Backend { status: 404, message: "Job not found".into() }),
        ]);

        let options = PollOptions {
            retry: RetryPolicy::with_retries(5),
            ..Default::default()
        };
        let (record, handler) = recorder();
        poller(&api, options).start("job_9", handler).unwrap().finished().await;

        assert_eq!(record.lock().unwrap().errors, ["Job not found"]);
        assert_eq!(api.status_call_offsets().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_callbacks_are_exclusive() {
        let scripts: Vec<Vec<Result<JobStatus, AppError>>> = vec![
            vec![Ok(job("j", JobState::Completed, 100))],
            vec![Ok(job("j", JobState::Pending, 10)), Ok(job("j", JobState::Failed, 0))],
            vec![Err(AppError::Network("down".into()))],
            vec![
                Ok(job("j", JobState::Converting3d, 70)),
                Ok(job("j", JobState::Completed, 100)),
                Ok(job("j", JobState::Failed, 0)),
            ],
            vec![
                Ok(job("j", JobState::Unknown, 0)),
                Err(AppError::Backend { status: 500, message: "boom".into() }),
                Ok(job("j", JobState::Completed, 100)),
            ],
        ];

        for script in scripts {
            let api = Arc::new(FakeBackend::default());
            api.script_statuses(script);

            let (record, handler) = recorder();
            poller(&api, PollOptions::default()).start("j", handler).unwrap().finished().await;

            let record = record.lock().unwrap();
            assert_eq!(record.completed.len() + record.errors.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_cancel_during_request() {
        let api = Arc::new(FakeBackend::default());
        api.set_status_delay(Duration::from_millis(500));
        api.script_statuses(vec![Ok(job("job_10", JobState::Completed, 100))]);

        let (record, handler) = recorder();
        let handle = poller(&api, PollOptions::default()).start("job_10", handler).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(api.status_call_offsets().len(), 1);
        handle.cancel();
        assert!(handle.is_cancelled());
        handle.finished().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let record = record.lock().unwrap();
        assert!(record.updates.is_empty());
        assert!(record.completed.is_empty());
        assert!(record.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_cancel_between_polls() {
        let api = Arc::new(FakeBackend::default());
        api.script_statuses(vec![
            Ok(job("job_11", JobState::Pending, 10)),
            Ok(job("job_11", JobState::GeneratingImage, 40)),
            Ok(job("job_11", JobState::Converting3d, 70)),
            Ok(job("job_11", JobState::Completed, 100)),
        ]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = poller(&api, PollOptions::default()).start("job_11", tx).unwrap();

        let mut updates = 0;
        while let Some(event) = rx.recv().await {
            assert_matches!(event, JobEvent::Update(_));
            updates += 1;
            if updates == 2 {
                handle.cancel();
                break;
            }
        }
        handle.finished().await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(api.status_call_offsets().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_fetch() {
        let api = Arc::new(FakeBackend::default());
        api.script_statuses(vec![Ok(job("job_12", JobState::Completed, 100))]);

        let (record, handler) = recorder();
        let handle = poller(&api, PollOptions::default()).start("job_12", handler).unwrap();
        handle.cancel();
        handle.finished().await;

        assert!(api.status_call_offsets().is_empty());
        assert!(record.lock().unwrap().updates.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handler_can_cancel_its_own_poll() {
        let api = Arc::new(FakeBackend::default());
        api.set_status_delay(Duration::from_millis(20));
        api.script_statuses(vec![
            Ok(job("job_13", JobState::Pending, 10)),
            Ok(job("job_13", JobState::GeneratingImage, 40)),
            Ok(job("job_13", JobState::Converting3d, 70)),
            Ok(job("job_13", JobState::Completed, 100)),
        ]);

        let slot: Arc<StdMutex<Option<PollHandle>>> = Arc::new(StdMutex::new(None));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let completed = Arc::new(StdMutex::new(0));

        let handler = {
            let slot = slot.clone();
            let completed = completed.clone();
            let mut seen = 0;
            callbacks(
                move |_: &JobStatus| {
                    seen += 1;
                    if seen == 2 {
                        if let Some(handle) = slot.lock().unwrap().as_ref() {
                            handle.cancel();
                        }
                        done_tx.send(()).unwrap();
                    }
                },
                move |_: JobStatus| *completed.lock().unwrap() += 1,
                |_: AppError| {},
            )
        };

        let options = PollOptions {
            interval: Duration::from_millis(20),
            ..Default::default()
        };
        let handle = poller(&api, options).start("job_13", handler).unwrap();
        *slot.lock().unwrap() = Some(handle);

        tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
            .await
            .expect("handler returned after cancelling");

        let handle = slot.lock().unwrap().take().unwrap();
        assert!(handle.is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .unwrap();

        assert_eq!(api.status_call_offsets().len(), 2);
        assert_eq!(*completed.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_recovers_after_handler_panic() {
        let api = Arc::new(FakeBackend::default());
        api.script_statuses(vec![Ok(job("job_14", JobState::Pending, 10))]);

        let handler = callbacks(
            |_: &JobStatus| panic!("handler bug"),
            |_: JobStatus| {},
            |_: AppError| {},
        );
        let handle = poller(&api, PollOptions::default()).start("job_14", handler).unwrap();
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }

        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let api = Arc::new(FakeBackend::default());

        let (_, handler) = recorder();
        let err = poller(&api, PollOptions::default()).start("  ", handler).err().unwrap();
        assert_matches!(err, AppError::Validation(_));

        let options = PollOptions {
            interval: Duration::ZERO,
            ..Default::default()
        };
        let (_, handler) = recorder();
        let err = poller(&api, options).start("job_1", handler).err().unwrap();
        assert_matches!(err, AppError::Validation(_));
    }

    #[test]
    fn test_backoff_sequence() {
        let policy = RetryPolicy::with_retries(10);
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_secs());
            delay = policy.next_delay(delay);
        }
        assert_eq!(seen, [1, 2, 4, 8, 16, 30, 30]);
    }
}
