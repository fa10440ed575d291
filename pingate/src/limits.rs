//! Upload admission control.
//!
//! Uploads hold the whole file in memory while it is added and pinned, so the number of uploads in
//! flight is bounded by a semaphore with a bounded waiting queue. Requests that cannot get a slot
//! are answered with HTTP 429.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::config::LimitsConfig;
use crate::errors::{Error, Result};

/// All limiters used by the request handlers.
#[derive(Debug, Default, Clone)]
pub struct Limiters {
    /// Limiter for upload requests. None means unlimited.
    pub uploads: Option<Arc<UploadLimiter>>,
}

impl Limiters {
    pub fn new(config: &LimitsConfig) -> Self {
        Self {
            uploads: UploadLimiter::new(config).map(Arc::new),
        }
    }

    /// Acquire an upload slot, or `None` when uploads are unlimited.
    pub async fn acquire_upload(&self) -> Result<Option<UploadPermit>> {
        match &self.uploads {
            Some(limiter) => limiter.acquire().await.map(Some),
            None => Ok(None),
        }
    }
}

/// Bounded queue in front of a fixed number of upload slots.
#[derive(Debug)]
pub struct UploadLimiter {
    semaphore: Arc<Semaphore>,
    /// Requests currently waiting for a slot
    waiting: AtomicUsize,
    /// None = unlimited waiting
    max_waiting: Option<usize>,
    max_wait: Duration,
}

fn too_many(message: &str) -> Error {
    Error::TooManyRequests {
        message: message.to_string(),
    }
}

impl UploadLimiter {
    /// Returns `None` when `max_concurrent_uploads` is 0 (unlimited).
    pub fn new(config: &LimitsConfig) -> Option<Self> {
        if config.max_concurrent_uploads == 0 {
            return None;
        }

        Some(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_uploads)),
            waiting: AtomicUsize::new(0),
            max_waiting: (config.max_waiting_uploads != 0).then_some(config.max_waiting_uploads),
            max_wait: config.max_upload_wait,
        })
    }

    /// Wait for an upload slot.
    ///
    /// Fails with [`Error::TooManyRequests`] when the waiting queue is full or no slot frees up
    /// within `max_upload_wait`.
    pub async fn acquire(&self) -> Result<UploadPermit> {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(UploadPermit { _permit: permit });
        }

        let already_waiting = self.waiting.fetch_add(1, Ordering::SeqCst);
        if let Some(max_waiting) = self.max_waiting
            && already_waiting >= max_waiting
        {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            debug!(already_waiting, "Upload queue full");
            return Err(too_many("Too many uploads in progress. Please retry later."));
        }

        // A slot may have been released while joining the queue.
        let result = if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            Ok(UploadPermit { _permit: permit })
        } else if self.max_wait.is_zero() {
            Err(too_many("Too many uploads in progress. Please retry later."))
        } else {
            match tokio::time::timeout(self.max_wait, self.semaphore.clone().acquire_owned()).await {
                Ok(Ok(permit)) => Ok(UploadPermit { _permit: permit }),
                Ok(Err(_)) => Err(too_many("Upload service temporarily unavailable.")),
                Err(_) => Err(too_many("Timed out waiting for upload slot. Please retry later.")),
            }
        };

        self.waiting.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Releases the upload slot when dropped.
#[must_use]
pub struct UploadPermit {
    _permit: OwnedSemaphorePermit,
}
