//! Reader admission.
//!
//! Every stream holds a [`ReaderPermit`] for its whole life. The permit is
//! returned to its [`ReaderConcurrencySemaphore`] when the last clone is
//! dropped, whichever way the stream ends.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

struct SemaphoreState {
    active: usize,
}

struct SemaphoreInner {
    name: String,
    limit: Option<usize>,
    state: Mutex<SemaphoreState>,
    released: Condvar,
}

impl SemaphoreInner {
    fn lock(&self) -> MutexGuard<'_, SemaphoreState> {
        // The state is a plain counter, valid even after a panic elsewhere.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounds the number of concurrently admitted readers. `None` means no
/// limit.
#[derive(Clone)]
pub struct ReaderConcurrencySemaphore {
    inner: Arc<SemaphoreInner>,
}

impl ReaderConcurrencySemaphore {
    pub fn new(name: impl Into<String>, limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                name: name.into(),
                limit: limit.map(|l| l.max(1)),
                state: Mutex::new(SemaphoreState { active: 0 }),
                released: Condvar::new(),
            }),
        }
    }

    /// Blocks until a slot is free.
    pub fn obtain_permit(&self, description: &str) -> ReaderPermit {
        let mut state = self.inner.lock();
        if let Some(limit) = self.inner.limit {
            while state.active >= limit {
                debug!(
                    semaphore = %self.inner.name,
                    reader = description,
                    "waiting for reader permit"
                );
                state = self
                    .inner
                    .released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        state.active += 1;
        trace!(semaphore = %self.inner.name, reader = description, active = state.active, "permit obtained");
        self.permit(description)
    }

    /// Like [`obtain_permit`](Self::obtain_permit) but gives up instead of
    /// waiting.
    pub fn try_obtain_permit(&self, description: &str) -> Option<ReaderPermit> {
        let mut state = self.inner.lock();
        if self.inner.limit.is_some_and(|limit| state.active >= limit) {
            return None;
        }
        state.active += 1;
        Some(self.permit(description))
    }

    #[must_use]
    pub fn active_permits(&self) -> usize {
        self.inner.lock().active
    }

    fn permit(&self, description: &str) -> ReaderPermit {
        ReaderPermit {
            inner: Arc::new(PermitInner {
                semaphore: Arc::clone(&self.inner),
                description: description.to_string(),
            }),
        }
    }
}

struct PermitInner {
    semaphore: Arc<SemaphoreInner>,
    description: String,
}

impl Drop for PermitInner {
    fn drop(&mut self) {
        let mut state = self.semaphore.lock();
        state.active = state.active.saturating_sub(1);
        trace!(
            semaphore = %self.semaphore.name,
            reader = %self.description,
            active = state.active,
            "permit released"
        );
        drop(state);
        self.semaphore.released.notify_one();
    }
}

/// Admission token shared by a stream and all readers it opens.
#[derive(Clone)]
pub struct ReaderPermit {
    inner: Arc<PermitInner>,
}

impl ReaderPermit {
    #[must_use]
    pub fn description(&self) -> &str {
        &self.inner.description
    }
}

impl std::fmt::Debug for ReaderPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderPermit")
            .field("semaphore", &self.inner.semaphore.name)
            .field("description", &self.inner.description)
            .finish()
    }
}
