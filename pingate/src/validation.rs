//! Upload allow-list checks.
//!
//! A file is accepted when both its extension and its declared media type are on the configured
//! allow-lists. The check is pure and runs before any store call.

use mime_guess::mime::Mime;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::config::UploadConfig;

/// Media type assumed for multipart parts that do not declare one.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// The name has no `.` or nothing after the last one
    MissingExtension,
    ExtensionNotAllowed(String),
    MediaTypeNotAllowed(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MissingExtension => write!(f, "file name has no extension"),
            RejectionReason::ExtensionNotAllowed(ext) => write!(f, "extension '{ext}' is not allowed"),
            RejectionReason::MediaTypeNotAllowed(media_type) => write!(f, "media type '{media_type}' is not allowed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    pub rejection: Option<Rejection>,
}

impl Verdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            rejection: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }
}

/// Extension and media type allow-list built from [`UploadConfig`].
#[derive(Debug, Clone)]
pub struct FileValidator {
    allowed_extensions: Vec<String>,
    extension_set: HashSet<String>,
    allowed_media_types: HashSet<String>,
}

impl FileValidator {
    pub fn new(allowed_extensions: &[String], allowed_mime_types: &BTreeMap<String, bool>) -> Self {
        Self {
            allowed_extensions: allowed_extensions.to_vec(),
            extension_set: allowed_extensions.iter().map(|ext| ext.to_lowercase()).collect(),
            allowed_media_types: allowed_mime_types
                .iter()
                .filter(|(_, enabled)| **enabled)
                .map(|(media_type, _)| normalize_media_type(media_type))
                .collect(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(&config.allowed_extensions, &config.allowed_mime_types)
    }

    /// Extensions as configured, for client diagnostics.
    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    pub fn validate(&self, name: &str, media_type: &str) -> Verdict {
        let reason = match extension_of(name) {
            None => Some(RejectionReason::MissingExtension),
            Some(ext) if !self.extension_set.contains(&ext) => Some(RejectionReason::ExtensionNotAllowed(ext)),
            Some(_) => {
                let media_type = normalize_media_type(media_type);
                if self.allowed_media_types.contains(&media_type) {
                    None
                } else {
                    Some(RejectionReason::MediaTypeNotAllowed(media_type))
                }
            }
        };

        match reason {
            None => Verdict::accept(),
            Some(reason) => Verdict {
                accepted: false,
                rejection: Some(Rejection {
                    reason,
                    allowed_extensions: self.allowed_extensions.clone(),
                }),
            },
        }
    }
}

/// Lowercase text after the last `.`, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Lowercased essence of a media type (`"Text/Plain; charset=UTF-8"` -> `"text/plain"`).
fn normalize_media_type(media_type: &str) -> String {
    let media_type = media_type.trim();
    if media_type.is_empty() {
        return DEFAULT_MEDIA_TYPE.to_string();
    }
    match media_type.parse::<Mime>() {
        Ok(mime) => mime.essence_str().to_lowercase(),
        Err(_) => media_type.split(';').next().unwrap_or_default().trim().to_lowercase(),
    }
}
