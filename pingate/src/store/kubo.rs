//! Kubo RPC backed content store.
//!
//! Speaks the HTTP RPC API exposed by a Kubo (go-ipfs) node on port 5001. Every call is a
//! `POST` to `/api/v0/<command>` with arguments in the query string; failures come back as a
//! JSON body of the form `{"Message": "...", "Code": 0, "Type": "error"}`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::{ChunkStream, ContentStore, EntryKind, Stat, StoreError};
use crate::config::IpfsConfig;
use crate::types::Cid;

/// Fragments of Kubo error messages that mean "this path does not exist".
const NOT_FOUND_MARKERS: &[&str] = &[
    "no link named",
    "no such file",
    "not found",
    "could not resolve",
    "failed to resolve",
];

/// `add` response (one JSON object per added entry)
#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// `pin/ls` response
#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: HashMap<String, serde_json::Value>,
}

/// `files/stat` response
#[derive(Debug, Deserialize)]
struct FilesStatResponse {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Size", default)]
    size: Option<u64>,
}

/// Kubo RPC error body
#[derive(Debug, Deserialize)]
struct KuboErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

/// Content store backed by a Kubo node.
#[derive(Clone)]
pub struct KuboStore {
    client: reqwest::Client,
    base_url: String,
}

impl KuboStore {
    /// Create a client for the node at `config.url`. No connection is made until the first call.
    pub fn new(config: &IpfsConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.base_url, command)
    }

    async fn post(&self, command: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, StoreError> {
        let url = self.endpoint(command);
        debug!(url = %url, "Calling Kubo RPC");

        let response = self.client.post(&url).query(query).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string())
    } else if e.is_decode() {
        StoreError::Decode(e.to_string())
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

fn is_not_found(message: &str) -> bool {
    let message = message.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| message.contains(marker))
}

async fn error_from_response(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<KuboErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body);

    if is_not_found(&message) {
        StoreError::NotFound(message)
    } else {
        StoreError::Api { status, message }
    }
}

#[async_trait]
impl ContentStore for KuboStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()), err)]
    async fn add(&self, bytes: Bytes, name: &str) -> Result<Cid, StoreError> {
        let part = reqwest::multipart::Part::stream(bytes).file_name(name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        // Pinning is done explicitly afterwards so that failures can be retried.
        let response = self
            .client
            .post(self.endpoint("add"))
            .query(&[("pin", "false")])
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response.text().await.map_err(transport_error)?;
        // Kubo emits newline-delimited JSON; the last entry is the root of what was added.
        let last = body
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| StoreError::Decode("empty add response".to_string()))?;
        let added: AddResponse = serde_json::from_str(last).map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(Cid::new(added.hash))
    }

    #[instrument(skip(self), fields(cid = %cid))]
    async fn pin_exists(&self, cid: &Cid) -> Result<bool, StoreError> {
        let response = match self.post("pin/ls", &[("arg", cid.as_str()), ("type", "all")]).await {
            Ok(response) => response,
            Err(StoreError::Api { message, .. }) if message.contains("not pinned") => return Ok(false),
            Err(e) => return Err(e),
        };

        let pins: PinLsResponse = response.json().await.map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(!pins.keys.is_empty())
    }

    #[instrument(skip(self), fields(cid = %cid))]
    async fn pin_add(&self, cid: &Cid) -> Result<(), StoreError> {
        self.post("pin/add", &[("arg", cid.as_str())]).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cid = %cid))]
    async fn stat(&self, cid: &Cid) -> Result<Stat, StoreError> {
        let path = format!("/ipfs/{cid}");
        let response = self.post("files/stat", &[("arg", path.as_str())]).await?;
        let stat: FilesStatResponse = response.json().await.map_err(|e| StoreError::Decode(e.to_string()))?;

        let kind = match stat.kind.as_str() {
            "file" => EntryKind::File,
            "directory" => EntryKind::Directory,
            _ => EntryKind::Other,
        };

        // files/stat does not report names for raw /ipfs paths.
        Ok(Stat {
            kind,
            name: None,
            size: stat.size,
        })
    }

    #[instrument(skip(self), fields(cid = %cid))]
    async fn cat(&self, cid: &Cid) -> Result<ChunkStream, StoreError> {
        let response = self.post("cat", &[("arg", cid.as_str())]).await?;
        Ok(response.bytes_stream().map(|chunk| chunk.map_err(transport_error)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> KuboStore {
        KuboStore::new(&IpfsConfig {
            url: Url::parse(&server.uri()).unwrap(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn kubo_error(message: &str) -> ResponseTemplate {
        ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "Message": message,
            "Code": 0,
            "Type": "error"
        }))
    }

    #[tokio::test]
    async fn test_add_returns_hash_without_pinning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/add"))
            .and(query_param("pin", "false"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("{\"Name\":\"logo.png\",\"Hash\":\"bafylogo\",\"Size\":\"12\"}\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cid = store_for(&server).add(Bytes::from_static(b"not a png"), "logo.png").await.unwrap();
        assert_eq!(cid, Cid::new("bafylogo"));
    }

    #[tokio::test]
    async fn test_add_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/add"))
            .respond_with(kubo_error("repo is locked"))
            .mount(&server)
            .await;

        let err = store_for(&server).add(Bytes::from_static(b"x"), "x.json").await.unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 500, ref message } if message == "repo is locked"));
    }

    #[tokio::test]
    async fn test_pin_exists_reports_existing_pin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/ls"))
            .and(query_param("arg", "bafypinned"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Keys": {"bafypinned": {"Type": "recursive"}}
            })))
            .mount(&server)
            .await;

        assert!(store_for(&server).pin_exists(&Cid::new("bafypinned")).await.unwrap());
    }

    #[tokio::test]
    async fn test_pin_exists_treats_not_pinned_as_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/ls"))
            .respond_with(kubo_error("path '/ipfs/bafyloose' is not pinned"))
            .mount(&server)
            .await;

        assert!(!store_for(&server).pin_exists(&Cid::new("bafyloose")).await.unwrap());
    }

    #[tokio::test]
    async fn test_pin_add_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/add"))
            .and(query_param("arg", "bafyx"))
            .respond_with(kubo_error("context deadline exceeded"))
            .mount(&server)
            .await;

        assert!(store_for(&server).pin_add(&Cid::new("bafyx")).await.is_err());
    }

    #[tokio::test]
    async fn test_stat_distinguishes_files_and_directories() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/files/stat"))
            .and(query_param("arg", "/ipfs/bafyfile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Hash": "bafyfile", "Size": 42, "CumulativeSize": 50, "Blocks": 0, "Type": "file"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/files/stat"))
            .and(query_param("arg", "/ipfs/bafydir"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Hash": "bafydir", "Size": 0, "CumulativeSize": 500, "Blocks": 3, "Type": "directory"
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let file = store.stat(&Cid::new("bafyfile")).await.unwrap();
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size, Some(42));
        assert_eq!(file.name, None);

        let dir = store.stat(&Cid::new("bafydir")).await.unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
    }

    #[tokio::test]
    async fn test_stat_maps_missing_paths_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/files/stat"))
            .respond_with(kubo_error("no link named \"missing\" under bafyroot"))
            .mount(&server)
            .await;

        let err = store_for(&server).stat(&Cid::new("bafymissing")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cat_streams_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/cat"))
            .and(query_param("arg", "bafyfile"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello ipfs".to_vec()))
            .mount(&server)
            .await;

        let mut stream = store_for(&server).cat(&Cid::new("bafyfile")).await.unwrap();
        let mut content = Vec::new();
        while let Some(chunk) = stream.next().await {
            content.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(content, b"hello ipfs");
    }

    #[tokio::test]
    async fn test_slow_node_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/add"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let store = KuboStore::new(&IpfsConfig {
            url: Url::parse(&server.uri()).unwrap(),
            timeout: Duration::from_millis(100),
        })
        .unwrap();

        let err = store.pin_add(&Cid::new("bafyslow")).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_unavailable() {
        let store = KuboStore::new(&IpfsConfig {
            url: Url::parse("http://127.0.0.1:1").unwrap(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let err = store.pin_exists(&Cid::new("bafyx")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_) | StoreError::Timeout(_)));
    }
}
