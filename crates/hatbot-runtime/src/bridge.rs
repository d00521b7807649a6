//! Producer/consumer bridge between one unit of LLM work and a streaming consumer.
//!
//! `StreamingBridge::start` spawns the work on its own task and hands it a
//! `TokenSink`. Every fragment the work reports goes onto an unbounded
//! per-job channel, followed by exactly one `Fragment::End` once the work
//! returns, fails or panics. The consumer drains the channel through a
//! `FragmentSequence`, which yields `(fragment, accumulated_text)` pairs and
//! closes on `End`.
//!
//! Work failures never cross the channel as errors: the producer logs them
//! and enqueues `WORK_FAILURE_MESSAGE` instead, so the consumer always sees a
//! normal close.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{FutureExt, Stream};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::types::{Fragment, JobInfo, JobState};
use hatbot_core::{Error, Result};

/// How long a consumer pull waits before polling again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Text shown to the user in place of generated content when work fails.
pub const WORK_FAILURE_MESSAGE: &str = "Error executing request. Contact the administrator.";

/// Text shown to the user when a job exceeds its deadline.
pub const TIMEOUT_MESSAGE: &str = "Request timed out. Contact the administrator.";

/// Callback through which work reports incremental text.
pub trait TokenSink: Send + Sync {
    fn on_token(&self, text: &str);

    /// Whether the consumer has gone away. Work should stop between emissions.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Bridge settings.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub poll_interval: Duration,
    /// End-to-end limit per job, measured from `start`. `None` disables it.
    pub deadline: Option<Duration>,
    /// Admit at most one unit of work at a time across every job of this bridge.
    pub serialize_work: bool,
    pub failure_message: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
            serialize_work: true,
            failure_message: WORK_FAILURE_MESSAGE.to_string(),
        }
    }
}

type JobHandle = Arc<Mutex<JobInfo>>;

/// `TokenSink` feeding one job's channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Fragment>,
    cancel: CancellationToken,
    job: JobHandle,
}

impl ChannelSink {
    pub fn job_id(&self) -> u64 {
        self.job.lock().id
    }

    fn mark_running(&self) {
        let mut job = self.job.lock();
        job.state = JobState::Running;
        job.started_at = Some(Instant::now());
    }

    fn mark_finished(&self) {
        self.job.lock().finished_at = Some(Instant::now());
    }

    /// Enqueue the terminal marker after an optional failure fragment.
    fn finish(&self, outcome: std::result::Result<Result<()>, Box<dyn Any + Send>>, failure: &str) {
        let id = self.job_id();
        let failed = match outcome {
            Ok(Ok(())) => {
                let elapsed = self.job.lock().duration().unwrap_or_default();
                info!("Job {} completed in {:.3}s", id, elapsed.as_secs_f64());
                false
            }
            Ok(Err(Error::Cancelled)) => {
                info!("Job {} stopped after cancellation", id);
                self.job.lock().cancelled = true;
                false
            }
            Ok(Err(e)) => {
                error!("Job {} failed: {}", id, e);
                true
            }
            Err(panic) => {
                error!("Job {} panicked: {}", id, panic_message(panic.as_ref()));
                true
            }
        };

        if failed {
            self.job.lock().failed = true;
            let _ = self.tx.send(Fragment::Text(failure.to_string()));
        }

        self.job.lock().state = JobState::Done;
        if self.tx.send(Fragment::End).is_err() {
            debug!("Job {} finished after its consumer went away", id);
        }
    }

    fn finish_cancelled(&self) {
        let id = self.job_id();
        info!("Job {} cancelled before admission", id);
        {
            let mut job = self.job.lock();
            job.cancelled = true;
            job.state = JobState::Done;
        }
        let _ = self.tx.send(Fragment::End);
    }
}

impl TokenSink for ChannelSink {
    fn on_token(&self, text: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        {
            let mut job = self.job.lock();
            if job.state == JobState::Running {
                job.state = JobState::Streaming;
            }
        }
        if self.tx.send(Fragment::Text(text.to_string())).is_err() {
            debug!("Dropping fragment: consumer gone");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawns one producer per job and returns its consumer side.
pub struct StreamingBridge {
    options: BridgeOptions,
    admission: Option<Arc<AsyncMutex<()>>>,
    next_id: AtomicU64,
}

impl Default for StreamingBridge {
    fn default() -> Self {
        Self::new(BridgeOptions::default())
    }
}

impl StreamingBridge {
    pub fn new(options: BridgeOptions) -> Self {
        let admission = options
            .serialize_work
            .then(|| Arc::new(AsyncMutex::new(())));
        Self {
            options,
            admission,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    fn create_job(&self) -> (FragmentSequence, ChannelSink) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let job = Arc::new(Mutex::new(JobInfo {
            id,
            state: JobState::Created,
            started_at: None,
            finished_at: None,
            failed: false,
            cancelled: false,
        }));

        let started = Instant::now();
        let sequence = FragmentSequence {
            rx,
            accumulated: String::new(),
            poll_interval: self.options.poll_interval,
            deadline: self.options.deadline.map(|d| started + d),
            cancel: cancel.clone(),
            job: job.clone(),
            closed: false,
        };
        let sink = ChannelSink { tx, cancel, job };
        debug!("Created job {}", id);
        (sequence, sink)
    }

    /// Run asynchronous `work` on a new task and stream what it reports.
    pub fn start<F, Fut>(&self, work: F) -> FragmentSequence
    where
        F: FnOnce(ChannelSink) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (sequence, sink) = self.create_job();
        let admission = self.admission.clone();
        let failure = self.options.failure_message.clone();

        tokio::spawn(async move {
            let Some(_guard) = admit(admission, &sink).await else {
                return;
            };

            sink.mark_running();
            let work_sink = sink.clone();
            let outcome = tokio::select! {
                biased;
                _ = sink.cancel.cancelled() => Ok(Err(Error::Cancelled)),
                outcome = AssertUnwindSafe(async move { work(work_sink).await }).catch_unwind() => outcome,
            };
            sink.mark_finished();
            sink.finish(outcome, &failure);
        });

        sequence
    }

    /// Run synchronous `work` on the blocking pool and stream what it reports.
    pub fn start_blocking<F>(&self, work: F) -> FragmentSequence
    where
        F: FnOnce(&dyn TokenSink) -> Result<()> + Send + 'static,
    {
        let (sequence, sink) = self.create_job();
        let admission = self.admission.clone();
        let failure = self.options.failure_message.clone();

        tokio::spawn(async move {
            let Some(guard) = admit(admission, &sink).await else {
                return;
            };

            sink.mark_running();
            let work_sink = sink.clone();
            let handle = tokio::task::spawn_blocking(move || {
                std::panic::catch_unwind(AssertUnwindSafe(|| work(&work_sink)))
            });
            // A cancelled blocking job keeps running detached; its sink drops what it reports
            let outcome = tokio::select! {
                biased;
                _ = sink.cancel.cancelled() => Ok(Err(Error::Cancelled)),
                joined = handle => joined.unwrap_or_else(|e| {
                    Err(Box::new(format!("blocking task failed: {}", e)) as Box<dyn Any + Send>)
                }),
            };
            sink.mark_finished();
            drop(guard);
            sink.finish(outcome, &failure);
        });

        sequence
    }
}

/// Wait for admission under the serialization lock, if any. Returns `None`
/// when the job was cancelled first; the job is closed in that case.
async fn admit(
    admission: Option<Arc<AsyncMutex<()>>>,
    sink: &ChannelSink,
) -> Option<Option<OwnedMutexGuard<()>>> {
    let guard = match admission {
        Some(lock) => tokio::select! {
            biased;
            _ = sink.cancel.cancelled() => None,
            guard = lock.lock_owned() => Some(guard),
        },
        None => None,
    };
    if sink.cancel.is_cancelled() {
        sink.finish_cancelled();
        return None;
    }
    Some(guard)
}

/// Consumer side of one job: a finite, non-restartable sequence of
/// `(fragment, accumulated_text)` pairs.
pub struct FragmentSequence {
    rx: mpsc::UnboundedReceiver<Fragment>,
    accumulated: String,
    poll_interval: Duration,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    job: JobHandle,
    closed: bool,
}

impl FragmentSequence {
    /// Pull the next fragment, or `None` once the terminal marker arrives.
    pub async fn next_fragment(&mut self) -> Option<(String, String)> {
        if self.closed {
            return None;
        }

        loop {
            let wait = match self.deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Some(self.expire());
                    }
                    remaining.min(self.poll_interval)
                }
                None => self.poll_interval,
            };

            match tokio::time::timeout(wait, self.rx.recv()).await {
                Ok(Some(Fragment::Text(text))) => {
                    self.accumulated.push_str(&text);
                    return Some((text, self.accumulated.clone()));
                }
                Ok(Some(Fragment::End)) => {
                    self.closed = true;
                    return None;
                }
                Ok(None) => {
                    warn!("Job {} channel closed without a terminal marker", self.job_id());
                    self.closed = true;
                    return None;
                }
                Err(_) => {
                    debug!("Job {}: no fragment yet, polling again", self.job_id());
                }
            }
        }
    }

    fn expire(&mut self) -> (String, String) {
        warn!("Job {} exceeded its deadline", self.job_id());
        self.cancel.cancel();
        self.job.lock().cancelled = true;
        self.closed = true;
        let text = TIMEOUT_MESSAGE.to_string();
        self.accumulated.push_str(&text);
        (text, self.accumulated.clone())
    }

    /// Drain the sequence and return the full accumulated text.
    pub async fn collect_text(mut self) -> String {
        while self.next_fragment().await.is_some() {}
        std::mem::take(&mut self.accumulated)
    }

    /// Adapt into a `Stream` of `(fragment, accumulated_text)` pairs.
    pub fn into_stream(self) -> impl Stream<Item = (String, String)> + Send + 'static {
        async_stream::stream! {
            let mut sequence = self;
            while let Some(item) = sequence.next_fragment().await {
                yield item;
            }
        }
    }

    /// Ask the producer to stop. Fragments reported afterwards are dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn job_id(&self) -> u64 {
        self.job.lock().id
    }

    /// Snapshot of the job's state and timing.
    pub fn job(&self) -> JobInfo {
        self.job.lock().clone()
    }
}

impl Drop for FragmentSequence {
    fn drop(&mut self) {
        if !self.closed {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use tokio_stream::StreamExt;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(f, a)| (f.to_string(), a.to_string()))
            .collect()
    }

    async fn drain(mut seq: FragmentSequence) -> Vec<(String, String)> {
        let mut out = Vec::new();
        while let Some(item) = seq.next_fragment().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_fragments_accumulate_in_order() {
        let bridge = StreamingBridge::default();
        let seq = bridge.start(|sink| async move {
            for t in ["a", "b", "c"] {
                sink.on_token(t);
            }
            Ok(())
        });

        let items = drain(seq).await;
        assert_eq!(items, pairs(&[("a", "a"), ("b", "ab"), ("c", "abc")]));
    }

    #[tokio::test]
    async fn test_failure_before_any_fragment() {
        let bridge = StreamingBridge::new(BridgeOptions {
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        });
        let seq = bridge.start(|_sink| async move {
            Err(Error::WorkFailure("upstream exploded".into()))
        });

        let items = tokio::time::timeout(Duration::from_secs(2), drain(seq))
            .await
            .expect("consumer must not block");
        assert_eq!(
            items,
            pairs(&[(WORK_FAILURE_MESSAGE, WORK_FAILURE_MESSAGE)])
        );
    }

    #[tokio::test]
    async fn test_failure_after_partial_output() {
        let bridge = StreamingBridge::default();
        let mut seq = bridge.start(|sink| async move {
            sink.on_token("partial ");
            Err(Error::Http("connection reset".into()))
        });

        assert_eq!(seq.next_fragment().await.unwrap().0, "partial ");
        let (fragment, accumulated) = seq.next_fragment().await.unwrap();
        assert_eq!(fragment, WORK_FAILURE_MESSAGE);
        assert_eq!(accumulated, format!("partial {}", WORK_FAILURE_MESSAGE));
        assert!(seq.next_fragment().await.is_none());
        assert!(seq.is_closed());
        assert!(seq.job().failed);
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_failure() {
        let bridge = StreamingBridge::default();
        let seq = bridge.start(|_sink| async move {
            if true {
                panic!("boom");
            }
            Ok(())
        });

        let items = drain(seq).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, WORK_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_sequence_is_not_restartable() {
        let bridge = StreamingBridge::default();
        let mut seq = bridge.start(|sink| async move {
            sink.on_token("only");
            Ok(())
        });
        assert!(seq.next_fragment().await.is_some());
        assert!(seq.next_fragment().await.is_none());
        assert!(seq.next_fragment().await.is_none());
        assert_eq!(seq.accumulated(), "only");
    }

    #[tokio::test]
    async fn test_consumer_repolls_until_fragment_arrives() {
        let bridge = StreamingBridge::new(BridgeOptions {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        });
        let seq = bridge.start(|sink| async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            sink.on_token("late");
            Ok(())
        });

        assert_eq!(drain(seq).await, pairs(&[("late", "late")]));
    }

    #[tokio::test]
    async fn test_job_state_and_timing() {
        let bridge = StreamingBridge::default();
        let mut seq = bridge.start(|sink| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sink.on_token("x");
            Ok(())
        });
        assert!(seq.next_fragment().await.is_some());
        assert!(seq.next_fragment().await.is_none());

        let job = seq.job();
        assert_eq!(job.state, JobState::Done);
        assert!(!job.failed);
        assert!(job.duration().unwrap() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_stream_adapter() {
        let bridge = StreamingBridge::default();
        let seq = bridge.start(|sink| async move {
            sink.on_token("he");
            sink.on_token("llo");
            Ok(())
        });

        let items: Vec<_> = seq.into_stream().collect().await;
        assert_eq!(items, pairs(&[("he", "he"), ("llo", "hello")]));
    }

    #[tokio::test]
    async fn test_blocking_work() {
        let bridge = StreamingBridge::default();
        let seq = bridge.start_blocking(|sink| {
            for t in ["x", "y"] {
                std::thread::sleep(Duration::from_millis(5));
                sink.on_token(t);
            }
            Ok(())
        });
        assert_eq!(seq.collect_text().await, "xy");

        let seq = bridge.start_blocking(|_sink| Err(Error::WorkFailure("nope".into())));
        assert_eq!(seq.collect_text().await, WORK_FAILURE_MESSAGE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_serialized_work_never_overlaps() {
        let bridge = StreamingBridge::default();
        let work = |sink: ChannelSink| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            sink.on_token("done");
            Ok::<(), Error>(())
        };

        let first = bridge.start(work);
        let second = bridge.start(work);
        let (first_info, second_info) = tokio::join!(
            async {
                let mut seq = first;
                while seq.next_fragment().await.is_some() {}
                seq.job()
            },
            async {
                let mut seq = second;
                while seq.next_fragment().await.is_some() {}
                seq.job()
            }
        );

        let (a_start, a_end) = (first_info.started_at.unwrap(), first_info.finished_at.unwrap());
        let (b_start, b_end) = (second_info.started_at.unwrap(), second_info.finished_at.unwrap());
        assert!(a_end <= b_start || b_end <= a_start, "work regions overlap");

        let span = a_end.max(b_end) - a_start.min(b_start);
        let total = first_info.duration().unwrap() + second_info.duration().unwrap();
        assert!(span >= total);
        assert!(total >= Duration::from_millis(100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unserialized_work_runs_concurrently() {
        let bridge = StreamingBridge::new(BridgeOptions {
            serialize_work: false,
            ..Default::default()
        });
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        // First job waits for a signal that only the second job sends
        let first = bridge.start(|sink| async move {
            rx.await.map_err(|e| Error::Internal(e.to_string()))?;
            sink.on_token("first");
            Ok::<(), Error>(())
        });
        let second = bridge.start(|sink| async move {
            sink.on_token("second");
            let _ = tx.send(());
            Ok(())
        });

        let (a, b) = tokio::time::timeout(
            Duration::from_secs(2),
            async { tokio::join!(first.collect_text(), second.collect_text()) },
        )
        .await
        .expect("jobs must not wait on each other");
        assert_eq!(a, "first");
        assert_eq!(b, "second");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_sequence_cancels_work() {
        let bridge = StreamingBridge::default();
        let emitted = Arc::new(AtomicUsize::new(0));
        let (dropped_tx, dropped_rx) = tokio::sync::oneshot::channel::<()>();

        let counter = emitted.clone();
        let mut seq = bridge.start(move |sink| async move {
            // Held by the work future; dropping the future closes the channel
            let _dropped = dropped_tx;
            while counter.fetch_add(1, Ordering::SeqCst) < usize::MAX {
                sink.on_token("tick ");
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        });

        assert!(seq.next_fragment().await.is_some());
        assert!(seq.next_fragment().await.is_some());
        drop(seq);

        assert!(tokio::time::timeout(Duration::from_secs(2), dropped_rx)
            .await
            .expect("work future must be dropped")
            .is_err());
        let seen = emitted.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(emitted.load(Ordering::SeqCst), seen);
        assert!(seen >= 2);
    }

    #[tokio::test]
    async fn test_timed_out_job_releases_admission() {
        let bridge = StreamingBridge::new(BridgeOptions {
            poll_interval: Duration::from_millis(10),
            deadline: Some(Duration::from_millis(100)),
            ..Default::default()
        });

        let stalled = bridge.start(|sink| async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            sink.on_token("stalled");
            Ok(())
        });
        assert_eq!(stalled.collect_text().await, TIMEOUT_MESSAGE);

        let fresh = bridge.start(|sink| async move {
            sink.on_token("ok");
            Ok(())
        });
        assert_eq!(fresh.collect_text().await, "ok");
    }

    #[tokio::test]
    async fn test_cancelled_job_releases_admission() {
        let bridge = StreamingBridge::default();
        let mut stuck = bridge.start(|sink| async move {
            sink.on_token("started");
            futures::future::pending::<()>().await;
            Ok(())
        });
        assert_eq!(stuck.next_fragment().await.unwrap().0, "started");
        stuck.cancel();
        assert!(stuck.next_fragment().await.is_none());
        assert!(stuck.job().cancelled);

        let next = bridge.start(|sink| async move {
            sink.on_token("next");
            Ok(())
        });
        let text = tokio::time::timeout(Duration::from_secs(2), next.collect_text())
            .await
            .expect("admission must be free");
        assert_eq!(text, "next");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_admission_wait_is_cancellable() {
        let bridge = StreamingBridge::default();
        let ran = Arc::new(AtomicBool::new(false));

        let blocker = bridge.start(|sink| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sink.on_token("blocker");
            Ok(())
        });

        let flag = ran.clone();
        let mut queued = bridge.start_blocking(move |_sink| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queued.cancel();

        assert!(tokio::time::timeout(Duration::from_secs(2), queued.next_fragment())
            .await
            .expect("queued blocking job must close")
            .is_none());
        assert!(queued.job().cancelled);
        assert_eq!(blocker.collect_text().await, "blocker");
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_before_admission_never_runs() {
        let bridge = StreamingBridge::default();
        let ran = Arc::new(AtomicBool::new(false));

        let blocker = bridge.start(|sink| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sink.on_token("blocker");
            Ok(())
        });

        let flag = ran.clone();
        let queued = bridge.start(move |_sink| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queued.cancel();

        assert_eq!(blocker.collect_text().await, "blocker");
        let mut queued = queued;
        assert!(queued.next_fragment().await.is_none());
        assert!(queued.job().cancelled);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout_message() {
        let bridge = StreamingBridge::new(BridgeOptions {
            poll_interval: Duration::from_millis(10),
            deadline: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let mut seq = bridge.start(|sink| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            sink.on_token("too late");
            Ok(())
        });

        let (fragment, _) = seq.next_fragment().await.unwrap();
        assert_eq!(fragment, TIMEOUT_MESSAGE);
        assert!(seq.next_fragment().await.is_none());
        assert!(seq.job().cancelled);
    }
}
