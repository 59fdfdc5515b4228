//! Process shutdown hooks.
//!
//! Components register cleanup closures with a shared [`Shutdown`]; the
//! binary triggers it once on Ctrl-C. Long-running work checks
//! [`Shutdown::is_done`] before acting on late results, or races
//! [`Shutdown::wait`] against a pending request.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

type Hook = Box<dyn FnOnce() + Send>;

/// Registry of shutdown hooks plus the "shutdown has begun" flag.
#[derive(Default)]
pub struct Shutdown {
    done: AtomicBool,
    hooks: Mutex<Vec<Hook>>,
    notify: Notify,
}

impl fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutdown")
            .field("done", &self.is_done())
            .field("hooks", &self.hooks().len())
            .finish()
    }
}

impl Shutdown {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn hooks(&self) -> std::sync::MutexGuard<'_, Vec<Hook>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a hook. Runs it immediately if shutdown already happened.
    pub fn add(&self, hook: impl FnOnce() + Send + 'static) {
        if self.is_done() {
            hook();
            return;
        }
        self.hooks().push(Box::new(hook));
    }

    /// Marks shutdown as begun and runs every registered hook once.
    pub fn trigger(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();
        let hooks = std::mem::take(&mut *self.hooks());
        debug!(hooks = hooks.len(), "running shutdown hooks");
        for hook in hooks {
            hook();
        }
    }

    /// Resolves once shutdown has begun.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    /// Returns true once [`trigger`](Self::trigger) was called.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}
