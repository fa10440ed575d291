//! Core value types shared by the upload, pinning and retrieval flows.
//!
//! - [`Cid`]: content identifier returned by the store
//! - [`UploadRequest`]: one decoded file from a multipart upload
//! - [`PinOutcome`]: result of [`crate::pinning::Pinner::ensure_pinned`]
//! - [`UploadResult`]: per-file response record
//! - [`BatchItem`]: per-file outcome of a batch upload

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Longest identifier accepted from a request path. CIDv1 base32 strings for
/// sha2-256 are 59 characters; this leaves room for larger hash functions.
const MAX_CID_LEN: usize = 128;

/// Opaque content identifier.
///
/// The gateway never interprets the value; it only checks that identifiers
/// coming from clients look like a single path segment of base-encoded text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy")]
pub struct Cid(String);

impl Cid {
    /// Wrap an identifier produced by the store. No validation is applied.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a client-supplied identifier is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content identifier '{0}'")]
pub struct InvalidCid(pub String);

impl FromStr for Cid {
    type Err = InvalidCid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_CID_LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(InvalidCid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

/// A decoded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Bytes,
    pub original_name: String,
    pub media_type: String,
}

impl UploadRequest {
    pub fn new(bytes: impl Into<Bytes>, original_name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            original_name: original_name.into(),
            media_type: media_type.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Outcome of a pinning attempt. Terminal once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinOutcome {
    pub cid: Cid,
    /// Number of `pin_add` calls made. Zero when the probe found an existing pin.
    pub attempts: u32,
    pub pinned: bool,
}

/// Stored file record returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadResult {
    pub cid: Cid,
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// False when the content was stored but every pin attempt failed
    pub pinned: bool,
}

/// Per-file outcome of a batch upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum BatchItem {
    Uploaded(UploadResult),
    /// The store rejected this file; other files in the batch are unaffected.
    Failed { name: String, size: u64, error: String },
}

impl BatchItem {
    pub fn name(&self) -> &str {
        match self {
            BatchItem::Uploaded(result) => &result.name,
            BatchItem::Failed { name, .. } => name,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, BatchItem::Uploaded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_parse_accepts_base_encoded_identifiers() {
        let v0 = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        let v1 = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy";

        assert_eq!(v0.parse::<Cid>().unwrap().as_str(), v0);
        assert_eq!(v1.parse::<Cid>().unwrap().to_string(), v1);
    }

    #[test]
    fn test_cid_parse_rejects_paths_and_empty_values() {
        assert!("".parse::<Cid>().is_err());
        assert!("../etc/passwd".parse::<Cid>().is_err());
        assert!("Qm abc".parse::<Cid>().is_err());
        assert!("a".repeat(MAX_CID_LEN + 1).parse::<Cid>().is_err());
    }

    #[test]
    fn test_batch_item_serializes_flat() {
        let uploaded = BatchItem::Uploaded(UploadResult {
            cid: Cid::new("bafy1"),
            name: "a.png".to_string(),
            size: 3,
            pinned: true,
        });
        assert_eq!(
            serde_json::to_value(&uploaded).unwrap(),
            serde_json::json!({"cid": "bafy1", "name": "a.png", "size": 3, "pinned": true})
        );

        let failed = BatchItem::Failed {
            name: "b.png".to_string(),
            size: 5,
            error: "Failed to store file".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"name": "b.png", "size": 5, "error": "Failed to store file"})
        );
    }
}
