//! Cooperative cancellation and time limits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Why a computation was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Interrupt {
    #[error("shutdown requested")]
    Requested,
    /// Time limit of the current partition; the run as a whole may continue.
    #[error("inner time limit exceeded")]
    InnerTimeout,
    /// Time limit of the whole run.
    #[error("outer time limit exceeded")]
    OuterTimeout,
}

#[derive(Debug)]
struct Inner {
    requested: AtomicBool,
    deadline: Option<(Instant, Interrupt)>,
    parent: Option<ShutdownNotifier>,
}

/// Cloneable handle polled at worklist pops and solver calls.
///
/// A child notifier fires whenever its parent fires; a request on the child
/// does not propagate upwards.
#[derive(Debug, Clone)]
pub struct ShutdownNotifier {
    inner: Arc<Inner>,
}

impl Default for ShutdownNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// A root notifier that fires [`Interrupt::OuterTimeout`] after `limit`.
    pub fn with_time_limit(limit: Duration) -> Self {
        Self::build(Some((Instant::now() + limit, Interrupt::OuterTimeout)), None)
    }

    pub fn child(&self) -> Self {
        Self::build(None, Some(self.clone()))
    }

    /// A child that additionally fires [`Interrupt::InnerTimeout`] after `limit`.
    pub fn child_with_time_limit(&self, limit: Duration) -> Self {
        Self::build(Some((Instant::now() + limit, Interrupt::InnerTimeout)), Some(self.clone()))
    }

    fn build(deadline: Option<(Instant, Interrupt)>, parent: Option<ShutdownNotifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                deadline,
                parent,
            }),
        }
    }

    pub fn request_shutdown(&self) {
        log::debug!("Shutdown requested");
        self.inner.requested.store(true, Ordering::SeqCst);
    }

    /// Returns the reason to stop, if any. Parent interrupts take precedence.
    pub fn check(&self) -> Result<(), Interrupt> {
        if let Some(parent) = &self.inner.parent {
            parent.check()?;
        }
        if self.inner.requested.load(Ordering::SeqCst) {
            return Err(Interrupt::Requested);
        }
        match self.inner.deadline {
            Some((deadline, kind)) if Instant::now() >= deadline => Err(kind),
            _ => Ok(()),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.check().is_err()
    }
}
