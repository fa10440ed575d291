//! Upload orchestration: validate, add, pin.

use futures::{FutureExt, future::join_all};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::pinning::{Pinner, RetryPolicy};
use crate::store::{ContentStore, StoreError};
use crate::types::{BatchItem, UploadRequest, UploadResult};
use crate::validation::FileValidator;

/// Message reported for a batch item whose content could not be stored.
const STORE_FAILED: &str = "Failed to store file";

/// Validates uploads, stores them and makes sure they are pinned.
#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn ContentStore>,
    validator: Arc<FileValidator>,
    pinner: Pinner,
    policy: RetryPolicy,
}

impl UploadService {
    pub fn new(store: Arc<dyn ContentStore>, validator: FileValidator, policy: RetryPolicy) -> Self {
        Self {
            pinner: Pinner::new(store.clone()),
            store,
            validator: Arc::new(validator),
            policy,
        }
    }

    pub fn from_config(store: Arc<dyn ContentStore>, config: &Config) -> Self {
        Self::new(
            store,
            FileValidator::from_config(&config.upload),
            RetryPolicy::from_config(&config.pinning),
        )
    }

    /// Upload a single file.
    ///
    /// A rejected file never reaches the store. A failed `add` is returned as an error; failed
    /// pinning is not, it shows up as `pinned: false` on the result.
    #[instrument(skip(self, request), fields(name = %request.original_name, size = request.size()), err)]
    pub async fn upload_one(&self, request: UploadRequest) -> Result<UploadResult> {
        let verdict = self.validator.validate(&request.original_name, &request.media_type);
        if let Some(rejection) = verdict.rejection {
            debug!(reason = %rejection.reason, "Rejected upload");
            return Err(Error::InvalidFileType {
                allowed_types: rejection.allowed_extensions,
            });
        }

        Ok(self.store_and_pin(request).await?)
    }

    /// Upload several files at once.
    ///
    /// All files are validated before anything is stored; one invalid file rejects the whole
    /// batch. Valid batches are processed concurrently and the returned items follow input order.
    /// A file whose `add` fails is reported as [`BatchItem::Failed`] without affecting the rest.
    ///
    /// Items run concurrently within the calling task, so dropping the returned future (a client
    /// disconnecting, say) cancels every item along with the caller's upload permit.
    #[instrument(skip_all, fields(count = requests.len()), err)]
    pub async fn upload_batch(&self, requests: Vec<UploadRequest>) -> Result<Vec<BatchItem>> {
        if requests.is_empty() {
            return Err(Error::BadRequest {
                message: "No files uploaded".to_string(),
            });
        }

        let invalid_files: Vec<String> = requests
            .iter()
            .filter(|request| {
                !self
                    .validator
                    .validate(&request.original_name, &request.media_type)
                    .is_accepted()
            })
            .map(|request| request.original_name.clone())
            .collect();

        if !invalid_files.is_empty() {
            debug!(?invalid_files, "Rejected batch upload");
            return Err(Error::InvalidFiles {
                allowed_types: self.validator.allowed_extensions().to_vec(),
                invalid_files,
            });
        }

        let uploads = requests.into_iter().map(|request| {
            let name = request.original_name.clone();
            let size = request.size();
            AssertUnwindSafe(self.store_and_pin(request))
                .catch_unwind()
                .map(move |outcome| (name, size, outcome))
                .boxed()
        });

        let items: Vec<BatchItem> = join_all(uploads)
            .await
            .into_iter()
            .map(|(name, size, outcome)| match outcome {
                Ok(Ok(result)) => BatchItem::Uploaded(result),
                Ok(Err(e)) => {
                    error!(name = %name, error = %e, "Failed to store batch item");
                    store_failed(name, size)
                }
                Err(_) => {
                    error!(name = %name, "Batch upload item panicked");
                    store_failed(name, size)
                }
            })
            .collect();

        info!(
            uploaded = items.iter().filter(|item| item.is_uploaded()).count(),
            total = items.len(),
            "Batch upload complete"
        );
        Ok(items)
    }

    async fn store_and_pin(&self, request: UploadRequest) -> std::result::Result<UploadResult, StoreError> {
        let size = request.size();
        let cid = self.store.add(request.bytes, &request.original_name).await?;
        debug!(cid = %cid, "Added content");

        let outcome = self.pinner.ensure_pinned(&cid, &self.policy).await;

        Ok(UploadResult {
            cid,
            name: request.original_name,
            size,
            pinned: outcome.pinned,
        })
    }
}

fn store_failed(name: String, size: u64) -> BatchItem {
    BatchItem::Failed {
        name,
        size,
        error: STORE_FAILED.to_string(),
    }
}
