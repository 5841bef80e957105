//! Execution plumbing for blocking and background operations
//!
//! A background operation runs on its own named worker thread. The caller gets
//! an [`OperationHandle`] it may ignore (fire-and-forget: dropping the handle
//! detaches the worker, it does not cancel it), block on with
//! [`OperationHandle::wait`], or await through
//! [`OperationHandle::completion`]. Cancellation is cooperative: the copy loop
//! checks the [`CancelToken`] between files.

use crate::collaborators::TargetProbe;
use crate::error::{Result, SaveTimeError};
use crate::journal::OperationKind;
use crate::phase::{PhaseGuard, PhaseTracker};
use crate::types::{ExecutionMode, SkipReason};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Shared flag requesting that an operation stop at the next safe point
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail with [`SaveTimeError::Cancelled`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SaveTimeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Optional observer of a background operation
///
/// Dropping the handle leaves the operation running to completion.
#[derive(Debug)]
pub struct OperationHandle<T> {
    id: Uuid,
    cancel: CancelToken,
    receiver: oneshot::Receiver<Result<T>>,
    worker: thread::JoinHandle<()>,
}

impl<T: Send + 'static> OperationHandle<T> {
    /// Run `job` on a new worker thread inside the caller's tracing span
    pub(crate) fn spawn<F>(id: Uuid, cancel: CancelToken, job: F) -> Result<Self>
    where
        F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let span = Span::current();
        let token = cancel.clone();
        let worker = thread::Builder::new()
            .name(format!("savetime-{}", &id.to_string()[..8]))
            .spawn(move || {
                let _entered = span.enter();
                let result = job(&token);
                if sender.send(result).is_err() {
                    debug!("Operation finished with no observer");
                }
            })?;

        Ok(Self {
            id,
            cancel,
            receiver,
            worker,
        })
    }

    /// Operation id, also recorded in logs and the progress journal
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the operation to stop between file copies
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block the calling thread until the operation completes
    pub fn wait(self) -> Result<T> {
        let Self {
            mut receiver,
            worker,
            ..
        } = self;
        if worker.join().is_err() {
            return Err(SaveTimeError::internal("operation worker panicked"));
        }
        receiver
            .try_recv()
            .map_err(|_| SaveTimeError::internal("operation worker exited without a result"))?
    }

    /// A future resolving to the operation's result
    pub fn completion(self) -> impl Future<Output = Result<T>> + Send {
        let span = Span::current();
        let receiver = self.receiver;
        async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(SaveTimeError::internal(
                    "operation worker exited without a result",
                )),
            }
        }
        .instrument(span)
    }
}

/// What happened to a backup or restore request
#[derive(Debug)]
pub enum Dispatch<T> {
    /// Ran on the calling thread
    Finished(Result<T>),
    /// Running on a worker thread
    Detached(OperationHandle<T>),
    /// Dropped before touching the filesystem
    Skipped(SkipReason),
}

impl<T: Send + 'static> Dispatch<T> {
    /// Why the request was dropped, if it was
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Dispatch::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Whether the request was dropped
    pub fn is_skipped(&self) -> bool {
        self.skip_reason().is_some()
    }

    /// Block until done; `None` if the request was skipped
    pub fn wait(self) -> Option<Result<T>> {
        match self {
            Dispatch::Finished(result) => Some(result),
            Dispatch::Detached(handle) => Some(handle.wait()),
            Dispatch::Skipped(_) => None,
        }
    }

    /// Await completion; `None` if the request was skipped
    pub async fn completion(self) -> Option<Result<T>> {
        match self {
            Dispatch::Finished(result) => Some(result),
            Dispatch::Detached(handle) => Some(handle.completion().await),
            Dispatch::Skipped(_) => None,
        }
    }
}

/// Shared front half of every orchestrated operation
///
/// Checks the target probe, then the phase, then takes the phase guard and
/// runs `job` on the calling thread or a worker thread. `job` owns the guard
/// and may release it before its trailing side effects. A request that finds
/// the phase already `Started` is dropped, not queued.
pub(crate) fn dispatch<T, F>(
    kind: OperationKind,
    mode: ExecutionMode,
    phase: &Arc<PhaseTracker>,
    probe: &dyn TargetProbe,
    job: F,
) -> Dispatch<T>
where
    T: Send + 'static,
    F: FnOnce(PhaseGuard, Uuid, &CancelToken) -> Result<T> + Send + 'static,
{
    if probe.is_running() {
        warn!("cannot {} while running", kind);
        return Dispatch::Skipped(SkipReason::TargetRunning);
    }
    if !phase.is_stopped() {
        debug!("Dropping {} request, another operation is in progress", kind);
        return Dispatch::Skipped(SkipReason::Busy);
    }
    let Some(guard) = PhaseTracker::acquire(phase) else {
        debug!("Dropping {} request, lost the race for the phase guard", kind);
        return Dispatch::Skipped(SkipReason::Busy);
    };

    let id = Uuid::new_v4();
    let span = info_span!("operation", kind = %kind, op = %id);
    let _entered = span.enter();
    let cancel = CancelToken::new();
    match mode {
        ExecutionMode::Blocking => Dispatch::Finished(job(guard, id, &cancel)),
        ExecutionMode::Background => {
            match OperationHandle::spawn(id, cancel, move |token| job(guard, id, token)) {
                Ok(handle) => Dispatch::Detached(handle),
                Err(e) => {
                    error!("Failed to start background {}: {}", kind, e);
                    Dispatch::Finished(Err(e))
                }
            }
        }
    }
}
