// # HTTP Document Store
//
// This crate provides a RemoteStateStore for a JSON document reachable by
// plain HTTP GET and PUT (a JSON bin, an object-store URL, a small key-value
// service).
//
// ## Document Shape
//
// The document is a flat JSON object mapping identifier to address string.
// Services that wrap the payload (e.g. `{"record": {...}, "metadata": {...}}`)
// are supported with a JSON pointer such as `/record`: reads select the
// object under the pointer, writes put the document back under it. The
// wrapper seen by the last read is kept, so its sibling fields (`metadata`
// above) are sent back unchanged; before any read, `set` sends a wrapper
// holding only the pointer path.
//
// ## Consistency
//
// `set` overwrites the whole document. There is no compare-and-swap, so two
// connectors publishing at the same instant can lose one update until the
// loser's next change.
//
// ## Security Requirements
//
// - The bearer token NEVER appears in logs or error messages
// - `Debug` redacts the token
//
// ## Status Mapping
//
// | Status                     | Error              |
// |----------------------------|--------------------|
// | 401, 403                   | `StoreRejected`    |
// | 404, 429, 5xx, transport   | `StoreUnavailable` |
// | other 4xx on `set`         | `StoreRejected`    |
// | other 4xx on `get`         | `StoreUnavailable` |

use allowsync_core::ComponentRegistry;
use allowsync_core::config::StoreConfig;
use allowsync_core::model::Document;
use allowsync_core::traits::{RemoteStateStore, RemoteStateStoreFactory};
use allowsync_core::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Which request a status code answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Get,
    Put,
}

/// Remote document behind an HTTP endpoint
pub struct HttpStore {
    url: String,

    /// Bearer token
    /// ⚠️ NEVER log this value
    token: Option<String>,

    /// JSON pointer to the mapping inside a wrapper object
    document_pointer: Option<String>,

    /// Wrapper object from the last successful read (pointer mode only)
    envelope: Mutex<Option<Value>>,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for HttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStore")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .field("document_pointer", &self.document_pointer)
            .finish()
    }
}

impl HttpStore {
    /// Create a new HTTP store
    ///
    /// # Parameters
    ///
    /// - `url`: Document URL used for both GET and PUT
    /// - `token`: Optional bearer token
    /// - `document_pointer`: Optional JSON pointer (e.g. `/record`)
    /// - `timeout`: Per-request timeout
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        document_pointer: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(url, token, document_pointer, client))
    }

    /// Create a store around an existing client
    pub fn with_client(
        url: impl Into<String>,
        token: Option<String>,
        document_pointer: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            url: url.into(),
            token,
            document_pointer,
            envelope: Mutex::new(None),
            client,
        }
    }

    fn remember_envelope(&self, body: &Value) {
        let mut envelope = self.envelope.lock().unwrap_or_else(|e| e.into_inner());
        *envelope = Some(body.clone());
    }

    fn last_envelope(&self) -> Option<Value> {
        self.envelope
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStateStore for HttpStore {
    async fn get(&self) -> Result<Document> {
        tracing::debug!("Fetching shared document from {}", self.url);

        let response = self
            .authorize(self.client.get(&self.url))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::store_unavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify(status, &detail, Request::Get));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::store_malformed(format!("response is not JSON: {}", e)))?;

        let mapping = match &self.document_pointer {
            Some(pointer) => body.pointer(pointer).cloned().ok_or_else(|| {
                Error::store_malformed(format!("response has no value at '{}'", pointer))
            })?,
            None => body.clone(),
        };

        let document = Document::from_json(mapping)?;
        if self.document_pointer.is_some() {
            self.remember_envelope(&body);
        }
        Ok(document)
    }

    async fn set(&self, document: &Document) -> Result<()> {
        let mut body = serde_json::to_value(document)?;
        if let Some(pointer) = &self.document_pointer {
            body = embed_under_pointer(self.last_envelope(), pointer, body);
        }

        tracing::debug!(
            "Writing shared document with {} identifier(s) to {}",
            document.len(),
            self.url
        );

        let response = self
            .authorize(self.client.put(&self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::store_unavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify(status, &detail, Request::Put));
        }

        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "http"
    }
}

/// Map a non-success status to the store error taxonomy
fn classify(status: StatusCode, detail: &str, request: Request) -> Error {
    let message = if detail.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail.trim())
    };

    match status.as_u16() {
        401 | 403 => Error::store_rejected(message),
        404 | 429 => Error::store_unavailable(message),
        s if s >= 500 => Error::store_unavailable(message),
        _ if request == Request::Put => Error::store_rejected(message),
        _ => Error::store_unavailable(message),
    }
}

/// Replace the value at `pointer` inside `envelope`
///
/// Falls back to a fresh wrapper when there is no envelope or it lacks the
/// pointer path.
fn embed_under_pointer(envelope: Option<Value>, pointer: &str, value: Value) -> Value {
    if let Some(mut envelope) = envelope {
        if let Some(slot) = envelope.pointer_mut(pointer) {
            *slot = value;
            return envelope;
        }
    }
    wrap_under_pointer(pointer, value)
}

/// Nest `value` under the object path named by a JSON pointer
fn wrap_under_pointer(pointer: &str, value: Value) -> Value {
    let tokens: Vec<&str> = pointer.split('/').skip(1).collect();
    tokens.into_iter().rev().fold(value, |inner, token| {
        let key = token.replace("~1", "/").replace("~0", "~");
        let mut object = serde_json::Map::new();
        object.insert(key, inner);
        Value::Object(object)
    })
}

/// Factory for creating HTTP stores
pub struct HttpStoreFactory;

impl RemoteStateStoreFactory for HttpStoreFactory {
    fn create(&self, config: &StoreConfig) -> Result<Box<dyn RemoteStateStore>> {
        match config {
            StoreConfig::Http {
                url,
                token,
                document_pointer,
                timeout_secs,
            } => {
                if token.as_ref().is_some_and(|t| t.is_empty()) {
                    return Err(Error::config("HTTP store token cannot be empty when set"));
                }
                Ok(Box::new(HttpStore::new(
                    url.clone(),
                    token.clone(),
                    document_pointer.clone(),
                    Duration::from_secs(*timeout_secs),
                )?))
            }
            _ => Err(Error::config("Invalid config for HTTP store")),
        }
    }
}

/// Register the HTTP store with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_store("http", Box::new(HttpStoreFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use allowsync_core::model::{Address, Identifier};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one request with `status` + `body`; the handle yields the raw request
    async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
        let (url, requests) = serve_sequence(vec![(status, body)]).await;
        let handle = tokio::spawn(async move { requests.await.unwrap().remove(0) });
        (url, handle)
    }

    /// Answer one request per `(status, body)` in turn; the handle yields the raw requests
    async fn serve_sequence(
        responses: Vec<(&'static str, String)>,
    ) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/doc", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
            }
            requests
        });

        (url, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    fn request_body(request: &str) -> Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn store(url: String, token: Option<&str>, pointer: Option<&str>) -> HttpStore {
        // Loopback servers must not be routed through an ambient proxy
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        HttpStore::with_client(
            url,
            token.map(str::to_string),
            pointer.map(str::to_string),
            client,
        )
    }

    fn sample() -> Document {
        [
            (Identifier::new("desk").unwrap(), Address::new("198.51.100.1")),
            (Identifier::new("laptop").unwrap(), Address::new("203.0.113.5")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn status_mapping() {
        let status = |s: u16| StatusCode::from_u16(s).unwrap();
        let rejected =
            |s: u16, r: Request| matches!(classify(status(s), "", r), Error::StoreRejected(_));
        let unavailable =
            |s: u16, r: Request| matches!(classify(status(s), "", r), Error::StoreUnavailable(_));

        assert!(rejected(401, Request::Get));
        assert!(rejected(403, Request::Put));
        assert!(unavailable(404, Request::Get));
        assert!(unavailable(429, Request::Put));
        assert!(unavailable(502, Request::Get));
        assert!(rejected(400, Request::Put));
        assert!(rejected(413, Request::Put));
        assert!(unavailable(400, Request::Get));
    }

    #[test]
    fn wrap_nests_under_each_pointer_segment() {
        assert_eq!(
            wrap_under_pointer("/record", json!({"a": "1.1.1.1"})),
            json!({"record": {"a": "1.1.1.1"}})
        );
        assert_eq!(
            wrap_under_pointer("/data/hosts~1v1", json!({})),
            json!({"data": {"hosts/v1": {}}})
        );
    }

    #[test]
    fn embed_replaces_only_the_pointer_target() {
        let envelope = json!({"record": {"old": "192.0.2.1"}, "metadata": {"id": "bin-1"}});
        assert_eq!(
            embed_under_pointer(Some(envelope), "/record", json!({"a": "1.1.1.1"})),
            json!({"record": {"a": "1.1.1.1"}, "metadata": {"id": "bin-1"}})
        );
        assert_eq!(
            embed_under_pointer(Some(json!({"other": 1})), "/record", json!({})),
            json!({"record": {}})
        );
        assert_eq!(
            embed_under_pointer(None, "/record", json!({})),
            json!({"record": {}})
        );
    }

    #[test]
    fn debug_redacts_token() {
        let store = HttpStore::new(
            "https://example.invalid/doc",
            Some("s3cret-token".to_string()),
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        let rendered = format!("{:?}", store);
        assert!(!rendered.contains("s3cret-token"));
        assert!(rendered.contains("<REDACTED>"));
    }

    #[test]
    fn test_factory_creation() {
        let factory = HttpStoreFactory;
        let config = StoreConfig::Http {
            url: "https://example.invalid/doc".to_string(),
            token: Some("t".to_string()),
            document_pointer: None,
            timeout_secs: 10,
        };
        assert!(factory.create(&config).is_ok());

        let empty_token = StoreConfig::Http {
            url: "https://example.invalid/doc".to_string(),
            token: Some(String::new()),
            document_pointer: None,
            timeout_secs: 10,
        };
        assert!(matches!(factory.create(&empty_token), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn get_parses_flat_document_with_bearer_token() {
        let body = json!({"desk": "198.51.100.1", "laptop": "203.0.113.5"});
        let (url, server) = serve_once("200 OK", body.to_string()).await;

        let document = tokio_test::assert_ok!(store(url, Some("s3cret"), None).get().await);
        assert_eq!(document, sample());

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /doc"));
        assert!(request.contains("authorization: bearer s3cret"));
    }

    #[tokio::test]
    async fn get_selects_document_under_pointer() {
        let body = json!({
            "record": {"desk": "198.51.100.1", "laptop": "203.0.113.5"},
            "metadata": {"private": true}
        });
        let (url, _server) = serve_once("200 OK", body.to_string()).await;

        let document = store(url, None, Some("/record")).get().await.unwrap();
        assert_eq!(document, sample());
    }

    #[tokio::test]
    async fn get_rejects_malformed_documents() {
        let (url, _server) = serve_once("200 OK", json!({"desk": 42}).to_string()).await;
        let err = tokio_test::assert_err!(store(url, None, None).get().await);
        assert!(matches!(err, Error::StoreMalformed(_)));

        let (url, _server) = serve_once("200 OK", "not json".to_string()).await;
        let err = tokio_test::assert_err!(store(url, None, None).get().await);
        assert!(matches!(err, Error::StoreMalformed(_)));

        let (url, _server) = serve_once("200 OK", json!({"other": {}}).to_string()).await;
        let err = tokio_test::assert_err!(store(url, None, Some("/record")).get().await);
        assert!(matches!(err, Error::StoreMalformed(_)));
    }

    #[tokio::test]
    async fn get_maps_auth_failure_to_rejected() {
        let (url, _server) = serve_once("401 Unauthorized", "{}".to_string()).await;
        let err = tokio_test::assert_err!(store(url, Some("wrong"), None).get().await);
        assert!(matches!(err, Error::StoreRejected(_)));
        assert!(!err.to_string().contains("wrong"));
    }

    #[tokio::test]
    async fn missing_document_is_unavailable_not_empty() {
        let (url, _server) = serve_once("404 Not Found", String::new()).await;
        let err = tokio_test::assert_err!(store(url, None, None).get().await);
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn set_puts_whole_document_wrapped_under_pointer() {
        let (url, server) = serve_once("200 OK", "{}".to_string()).await;

        tokio_test::assert_ok!(store(url, Some("s3cret"), Some("/record")).set(&sample()).await);

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /doc"));
        assert_eq!(
            request_body(&request),
            json!({"record": {"desk": "198.51.100.1", "laptop": "203.0.113.5"}})
        );
    }

    #[tokio::test]
    async fn set_after_get_keeps_wrapper_siblings() {
        let read = json!({
            "record": {"desk": "198.51.100.1"},
            "metadata": {"private": true, "name": "allowlist"}
        });
        let (url, server) = serve_sequence(vec![
            ("200 OK", read.to_string()),
            ("200 OK", "{}".to_string()),
        ])
        .await;

        let http = store(url, None, Some("/record"));
        tokio_test::assert_ok!(http.get().await);
        tokio_test::assert_ok!(http.set(&sample()).await);

        let requests = server.await.unwrap();
        assert!(requests[1].starts_with("PUT /doc"));
        assert_eq!(
            request_body(&requests[1]),
            json!({
                "record": {"desk": "198.51.100.1", "laptop": "203.0.113.5"},
                "metadata": {"private": true, "name": "allowlist"}
            })
        );
    }

    #[tokio::test]
    async fn set_maps_server_errors_to_unavailable() {
        let (url, _server) = serve_once("503 Service Unavailable", String::new()).await;
        let err = tokio_test::assert_err!(store(url, None, None).set(&sample()).await);
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }
}
