//! Process-wide guard against overlapping operations
//!
//! [`PhaseTracker`] is a single atomic cell with two states. A caller enters
//! `Started` only through a compare-and-swap from `Stopped`, so two threads
//! racing on [`PhaseTracker::try_begin`] can never both win. The raw state is
//! never exposed for direct mutation.
//!
//! Orchestrators hold the guard through a [`PhaseGuard`], which returns the
//! phase to `Stopped` when dropped. That covers every exit path: success,
//! handled failure, and unwinding.
//!
//! ```rust
//! use savetime::phase::PhaseTracker;
//! use savetime::types::Phase;
//! use std::sync::Arc;
//!
//! let tracker = Arc::new(PhaseTracker::new());
//! let guard = PhaseTracker::acquire(&tracker).expect("free");
//! assert_eq!(tracker.phase(), Phase::Started);
//! assert!(PhaseTracker::acquire(&tracker).is_none());
//! drop(guard);
//! assert_eq!(tracker.phase(), Phase::Stopped);
//! ```

use crate::types::Phase;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::trace;

static GLOBAL: OnceLock<Arc<PhaseTracker>> = OnceLock::new();

/// Two-state guard (`Stopped`/`Started`) shared by all orchestrators
#[derive(Debug)]
pub struct PhaseTracker {
    state: AtomicU8,
}

impl PhaseTracker {
    /// Create a tracker in the `Stopped` phase
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(Phase::Stopped.as_u8()),
        }
    }

    /// The process-wide tracker used when no other is injected
    pub fn global() -> Arc<PhaseTracker> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(PhaseTracker::new())))
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether no operation currently holds the guard
    pub fn is_stopped(&self) -> bool {
        self.phase() == Phase::Stopped
    }

    /// Transition `Stopped` -> `Started`
    ///
    /// Returns `true` if this call performed the transition and `false`,
    /// without mutating anything, if the phase was already `Started`.
    pub fn try_begin(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                Phase::Stopped.as_u8(),
                Phase::Started.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        trace!(won, "phase try_begin");
        won
    }

    /// Unconditionally return to `Stopped`
    pub fn complete(&self) {
        self.state.store(Phase::Stopped.as_u8(), Ordering::Release);
        trace!("phase complete");
    }

    /// Begin and wrap the started phase in a guard that completes on drop
    pub fn acquire(tracker: &Arc<PhaseTracker>) -> Option<PhaseGuard> {
        if tracker.try_begin() {
            Some(PhaseGuard {
                tracker: Arc::clone(tracker),
            })
        } else {
            None
        }
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of the `Started` phase
///
/// The guard is `Send`, so a blocking caller can acquire it and hand it to
/// the worker thread that runs a background operation.
#[derive(Debug)]
#[must_use = "dropping the guard immediately returns the phase to Stopped"]
pub struct PhaseGuard {
    tracker: Arc<PhaseTracker>,
}

impl PhaseGuard {
    /// Release the phase now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.tracker.complete();
    }
}
