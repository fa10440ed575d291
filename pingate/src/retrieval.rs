//! Serving stored files back by content identifier.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::{debug, instrument};

use crate::errors::{Error, Result};
use crate::store::{ContentStore, EntryKind, StoreError};
use crate::types::Cid;
use crate::validation::{DEFAULT_MEDIA_TYPE, extension_of};

/// Extension used for lookups when the file name has none.
const FALLBACK_EXTENSION: &str = "bin";

/// A file read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedFile {
    pub bytes: Bytes,
    pub filename: String,
    pub media_type: String,
}

/// Media type for a file name, from the extension.
pub fn media_type_for(filename: &str) -> String {
    let extension = extension_of(filename).unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
    mime_guess::from_ext(&extension)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string())
}

/// Upper bound on the buffer reserved up front from the size the node reports.
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

fn initial_capacity(reported_size: Option<u64>) -> usize {
    reported_size.map_or(0, |size| size.min(MAX_PREALLOCATION) as usize)
}

fn map_store_error(cid: &Cid, error: StoreError) -> Error {
    match error {
        StoreError::NotFound(_) => Error::NotFound {
            resource: "File".to_string(),
            id: cid.to_string(),
        },
        other => Error::Store(other),
    }
}

/// Read the full content of `cid`, which must resolve to a file.
#[instrument(skip(store), fields(cid = %cid), err)]
pub async fn retrieve(store: &dyn ContentStore, cid: &Cid) -> Result<RetrievedFile> {
    let stat = store.stat(cid).await.map_err(|e| map_store_error(cid, e))?;
    if stat.kind != EntryKind::File {
        return Err(Error::NotAFile { cid: cid.to_string() });
    }

    let filename = stat.name.unwrap_or_else(|| format!("file_{cid}"));
    let media_type = media_type_for(&filename);

    let mut stream = store.cat(cid).await.map_err(|e| map_store_error(cid, e))?;
    let mut buffer = BytesMut::with_capacity(initial_capacity(stat.size));
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk.map_err(|e| map_store_error(cid, e))?);
    }

    debug!(size = buffer.len(), filename = %filename, "Retrieved file");

    Ok(RetrievedFile {
        bytes: buffer.freeze(),
        filename,
        media_type,
    })
}
