//! Background execution of long-running analysis runs
//!
//! Each run owns one worker thread, one cancellation flag and one event
//! channel. The worker reports [`TaskEvent::Progress`] while it runs and
//! exactly one [`TaskEvent::Finished`] at the end. Results are only ever
//! delivered whole, inside [`TaskOutcome::Completed`].
//!
//! Cancellation is cooperative: computations poll [`RunControl::is_cancelled`]
//! and stop with [`AnalysisError::Cancelled`]. Once [`TaskHandle::cancel`] has
//! been called, the handle never yields a completed outcome, even when the
//! worker finished its last feature concurrently with the request.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tracing::{debug, info, warn};

use crate::AnalysisError;

/// Hooks a computation uses to cooperate with whoever started it.
pub trait RunControl {
    /// Whether the run should stop as soon as possible.
    fn is_cancelled(&self) -> bool;

    /// Reports the fraction of work done, in `0.0..=1.0`.
    fn report_progress(&self, fraction: f64);
}

/// [`RunControl`] for synchronous callers: never cancelled, progress dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unattended;

impl RunControl for Unattended {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn report_progress(&self, _fraction: f64) {}
}

/// Shared cancellation flag of a single run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal state of a background run.
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// The run stopped because cancellation was requested. Not a failure.
    Cancelled,
    /// The run aborted; no partial results are kept.
    Failed(String),
}

impl<T> TaskOutcome<T> {
    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled | Self::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent<T> {
    Progress(f64),
    Finished(TaskOutcome<T>),
}

struct WorkerControl<T> {
    token: CancelToken,
    events: Sender<TaskEvent<T>>,
}

impl<T> RunControl for WorkerControl<T> {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn report_progress(&self, fraction: f64) {
        // The receiver may already be gone; progress is best effort.
        let _ = self.events.send(TaskEvent::Progress(fraction.clamp(0.0, 1.0)));
    }
}

/// Caller side of a background run.
///
/// Dropping the handle cancels the run.
#[derive(Debug)]
pub struct TaskHandle<T> {
    label: String,
    token: CancelToken,
    events: Receiver<TaskEvent<T>>,
    thread: Option<JoinHandle<()>>,
    finished: bool,
}

impl<T> TaskHandle<T> {
    /// Name of the run, as given to [`spawn_task`].
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Requests cancellation. Work not yet started is skipped, and the run
    /// finishes with [`TaskOutcome::Cancelled`].
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            info!(task = %self.label, "cancel_requested");
        }
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Blocks until the next event. Returns `None` after the terminal event
    /// has been delivered.
    pub fn recv(&mut self) -> Option<TaskEvent<T>> {
        if self.finished {
            return None;
        }
        let event = self
            .events
            .recv()
            .unwrap_or_else(|_| TaskEvent::Finished(self.lost_worker()));
        Some(self.filter(event))
    }

    /// Returns the next event if one is pending.
    pub fn try_recv(&mut self) -> Option<TaskEvent<T>> {
        if self.finished {
            return None;
        }
        let event = match self.events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => TaskEvent::Finished(self.lost_worker()),
        };
        Some(self.filter(event))
    }

    /// Blocks until the run finishes, passing every progress report to
    /// `on_progress`.
    pub fn wait(mut self, mut on_progress: impl FnMut(f64)) -> TaskOutcome<T> {
        loop {
            match self.recv() {
                Some(TaskEvent::Progress(fraction)) => on_progress(fraction),
                Some(TaskEvent::Finished(outcome)) => {
                    if let Some(thread) = self.thread.take() {
                        let _ = thread.join();
                    }
                    return outcome;
                }
                None => return TaskOutcome::Failed("outcome already received".to_owned()),
            }
        }
    }

    fn filter(&mut self, event: TaskEvent<T>) -> TaskEvent<T> {
        match event {
            TaskEvent::Finished(outcome) => {
                self.finished = true;
                if outcome.is_completed() && self.token.is_cancelled() {
                    TaskEvent::Finished(TaskOutcome::Cancelled)
                } else {
                    TaskEvent::Finished(outcome)
                }
            }
            progress @ TaskEvent::Progress(_) => progress,
        }
    }

    fn lost_worker(&self) -> TaskOutcome<T> {
        warn!(task = %self.label, "worker_exited_without_outcome");
        TaskOutcome::Failed("worker exited without reporting an outcome".to_owned())
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.token.cancel();
        }
    }
}

/// Runs `work` on a dedicated thread.
///
/// `work` returning [`AnalysisError::Cancelled`] or finishing after
/// cancellation was requested yields [`TaskOutcome::Cancelled`]; any other
/// error, or a panic, yields a single [`TaskOutcome::Failed`].
///
/// # Errors
///
/// Returns [`AnalysisError::Spawn`] if the worker thread cannot be started.
///
/// # Examples
///
/// ```
/// use dosescan_analysis::task::{self, TaskOutcome};
///
/// let handle = task::spawn_task("sum", "example", |control| {
///     control.report_progress(1.0);
///     Ok(1 + 1)
/// })?;
/// assert_eq!(handle.wait(|_| {}), TaskOutcome::Completed(2));
/// # Ok::<(), dosescan_analysis::AnalysisError>(())
/// ```
pub fn spawn_task<T, F>(
    kind: &'static str,
    label: impl Into<String>,
    work: F,
) -> Result<TaskHandle<T>, AnalysisError>
where
    T: Send + 'static,
    F: FnOnce(&dyn RunControl) -> Result<T, AnalysisError> + Send + 'static,
{
    let label = label.into();
    let token = CancelToken::new();
    let (events_tx, events_rx) = channel::unbounded();
    let control = WorkerControl {
        token: token.clone(),
        events: events_tx,
    };

    let thread = thread::Builder::new()
        .name(format!("dosescan-{kind}"))
        .spawn({
            let label = label.clone();
            move || {
                debug!(task = %label, kind, "task_started");
                let result = panic::catch_unwind(AssertUnwindSafe(|| work(&control)));
                let outcome = match result {
                    Ok(Ok(_)) if control.token.is_cancelled() => TaskOutcome::Cancelled,
                    Ok(Ok(value)) => TaskOutcome::Completed(value),
                    Ok(Err(AnalysisError::Cancelled)) => TaskOutcome::Cancelled,
                    Ok(Err(err)) => {
                        warn!(task = %label, error = %err, "task_failed");
                        TaskOutcome::Failed(err.to_string())
                    }
                    Err(payload) => {
                        let message = panic_message(&*payload);
                        warn!(task = %label, %message, "task_panicked");
                        TaskOutcome::Failed(message)
                    }
                };
                if outcome.is_cancelled() {
                    info!(task = %label, "task_cancelled");
                }
                let _ = control.events.send(TaskEvent::Finished(outcome));
            }
        })
        .map_err(AnalysisError::Spawn)?;

    Ok(TaskHandle {
        label,
        token,
        events: events_rx,
        thread: Some(thread),
        finished: false,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_progress_then_outcome() {
        let mut handle = spawn_task("test", "progress", |control| {
            control.report_progress(0.5);
            control.report_progress(1.0);
            Ok("done")
        })
        .unwrap();

        assert_eq!(handle.recv(), Some(TaskEvent::Progress(0.5)));
        assert_eq!(handle.recv(), Some(TaskEvent::Progress(1.0)));
        assert_eq!(
            handle.recv(),
            Some(TaskEvent::Finished(TaskOutcome::Completed("done")))
        );
        assert_eq!(handle.recv(), None);
    }

    #[test]
    fn test_try_recv_does_not_block() {
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let (reported_tx, reported_rx) = channel::bounded::<()>(0);
        let mut handle = spawn_task("test", "gated", move |control| {
            let _ = gate_rx.recv();
            control.report_progress(0.5);
            let _ = reported_tx.send(());
            Ok(1)
        })
        .unwrap();

        assert_eq!(handle.try_recv(), None);
        gate_tx.send(()).unwrap();
        reported_rx.recv().unwrap();
        assert_eq!(handle.try_recv(), Some(TaskEvent::Progress(0.5)));
        assert_eq!(
            handle.recv(),
            Some(TaskEvent::Finished(TaskOutcome::Completed(1)))
        );
        assert_eq!(handle.try_recv(), None);
    }

    #[test]
    fn test_wait_collects_progress() {
        let handle = spawn_task("test", "wait", |control| {
            for i in 1..=4 {
                control.report_progress(f64::from(i) / 4.0);
            }
            Ok(())
        })
        .unwrap();

        let mut seen = vec![];
        let outcome = handle.wait(|p| seen.push(p));
        assert!(outcome.is_completed());
        assert_eq!(seen, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_cancel_stops_cooperative_work() {
        let handle = spawn_task("test", "spin", |control| {
            while !control.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Err::<(), _>(AnalysisError::Cancelled)
        })
        .unwrap();

        handle.cancel();
        assert_eq!(handle.wait(|_| {}), TaskOutcome::Cancelled);
    }

    #[test]
    fn test_no_completion_after_cancel() {
        let (release_tx, release_rx) = channel::bounded::<()>(0);
        let handle = spawn_task("test", "late", move |_| {
            let _ = release_rx.recv();
            Ok(42)
        })
        .unwrap();

        handle.cancel();
        release_tx.send(()).unwrap();
        assert_eq!(handle.wait(|_| {}), TaskOutcome::Cancelled);
    }

    #[test]
    fn test_errors_and_panics_fail_the_run() {
        let handle = spawn_task("test", "error", |_| {
            Err::<(), _>(AnalysisError::InsufficientGroups {
                feature_id: "f".to_owned(),
            })
        })
        .unwrap();
        let outcome = handle.wait(|_| {});
        assert!(matches!(outcome, TaskOutcome::Failed(msg) if msg.contains("fewer than 2")));

        let handle = spawn_task("test", "panic", |_| -> Result<(), AnalysisError> {
            panic!("boom")
        })
        .unwrap();
        let outcome = handle.wait(|_| {});
        assert!(matches!(outcome, TaskOutcome::Failed(msg) if msg.contains("boom")));
    }

    #[test]
    fn test_runs_do_not_share_cancellation() {
        let first = spawn_task("test", "first", |control| {
            while !control.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Err::<(), _>(AnalysisError::Cancelled)
        })
        .unwrap();
        let second = spawn_task("test", "second", |_| Ok(7)).unwrap();

        first.cancel();
        assert!(!second.is_cancelled());
        assert_eq!(second.wait(|_| {}), TaskOutcome::Completed(7));
        assert_eq!(first.wait(|_| {}), TaskOutcome::Cancelled);
    }
}
