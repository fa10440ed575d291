//! Pin reliability protocol.
//!
//! After content is added to the store it is only retained if it is pinned. Pin calls against a
//! busy node fail transiently, so [`Pinner::ensure_pinned`] probes the current pin state first and
//! then retries `pin_add` with a configurable [`Backoff`] between attempts.
//!
//! Pinning never fails an upload: the caller receives a [`PinOutcome`] and reports `pinned: false`
//! to the client when every attempt failed.

pub mod backoff;

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PinningConfig;
use crate::store::ContentStore;
use crate::types::{Cid, PinOutcome};

pub use backoff::{Backoff, ExponentialBackoff, LinearBackoff};

/// Retry ceiling plus the delay strategy between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of `pin_add` calls. 0 means probe only.
    pub max_retries: u32,
    pub backoff: Arc<dyn Backoff>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Arc<dyn Backoff>) -> Self {
        Self { max_retries, backoff }
    }

    pub fn from_config(config: &PinningConfig) -> Self {
        Self::new(config.retries, backoff::from_config(config))
    }
}

/// Drives the probe-then-retry pin protocol against a shared store.
#[derive(Clone)]
pub struct Pinner {
    store: Arc<dyn ContentStore>,
}

impl Pinner {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Make sure `cid` is pinned, retrying according to `policy`.
    ///
    /// A CID the probe reports as pinned never receives a `pin_add`. Probe errors are logged and
    /// treated as "not pinned".
    #[instrument(skip(self, policy), fields(cid = %cid, max_retries = policy.max_retries))]
    pub async fn ensure_pinned(&self, cid: &Cid, policy: &RetryPolicy) -> PinOutcome {
        match self.store.pin_exists(cid).await {
            Ok(true) => {
                debug!("Content already pinned");
                counter!("pingate_pin_outcomes_total", "outcome" => "already_pinned").increment(1);
                return PinOutcome {
                    cid: cid.clone(),
                    attempts: 0,
                    pinned: true,
                };
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Pin probe failed, attempting to pin anyway"),
        }

        for attempt in 1..=policy.max_retries {
            counter!("pingate_pin_attempts_total").increment(1);

            match self.store.pin_add(cid).await {
                Ok(()) => {
                    info!(attempt, "Pinned content");
                    counter!("pingate_pin_outcomes_total", "outcome" => "pinned").increment(1);
                    return PinOutcome {
                        cid: cid.clone(),
                        attempts: attempt,
                        pinned: true,
                    };
                }
                Err(e) if attempt == policy.max_retries => {
                    error!(attempt, error = %e, "Failed to pin content after all attempts");
                }
                Err(e) => {
                    let delay = policy.backoff.delay(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Pin attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        counter!("pingate_pin_outcomes_total", "outcome" => "failed").increment(1);
        PinOutcome {
            cid: cid.clone(),
            attempts: policy.max_retries,
            pinned: false,
        }
    }
}
