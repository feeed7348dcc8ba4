use base64::{engine::general_purpose::STANDARD, Engine as _};
use cdnsync_dl::http_client::ClientConfig;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use ureq::{http::Response, Agent, Body};

use crate::{
    backend::{KvBackend, KvRecord},
    error::{KvError, Result},
    namespace::Namespace,
};

/// Largest value Workers KV stores.
const MAX_VALUE_BYTES: u64 = 25 * 1024 * 1024;

/// Namespace identifiers of one Cloudflare account.
#[derive(Debug, Clone, Default)]
pub struct NamespaceIds {
    pub packages: String,
    pub versions: String,
    pub files: String,
    pub aggregated: String,
    pub sri: String,
}

impl NamespaceIds {
    fn get(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::Packages => &self.packages,
            Namespace::Versions => &self.versions,
            Namespace::Files => &self.files,
            Namespace::Aggregated => &self.aggregated,
            Namespace::Sri => &self.sri,
        }
    }
}

#[derive(Serialize)]
struct BulkItem<'a> {
    key: &'a str,
    value: String,
    base64: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Value>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct BulkResult {
    #[serde(default)]
    unsuccessful_keys: Vec<String>,
}

#[derive(Deserialize)]
struct KeyInfo {
    name: String,
}

/// Workers KV over the Cloudflare REST API.
pub struct CloudflareBackend {
    agent: Agent,
    base_url: String,
    token: String,
    namespaces: NamespaceIds,
    chunk_size: usize,
}

impl CloudflareBackend {
    pub fn new(
        api_url: &str,
        account_id: &str,
        token: String,
        namespaces: NamespaceIds,
        chunk_size: usize,
    ) -> Self {
        Self {
            agent: ClientConfig::default().build(),
            base_url: format!(
                "{}/accounts/{account_id}/storage/kv/namespaces",
                api_url.trim_end_matches('/')
            ),
            token,
            namespaces,
            chunk_size: chunk_size.max(1),
        }
    }

    fn url(&self, namespace: Namespace, tail: &str) -> String {
        format!("{}/{}/{tail}", self.base_url, self.namespaces.get(namespace))
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Maps transport errors and non-success statuses onto the error taxonomy.
    fn check(
        namespace: Namespace,
        key: &str,
        response: std::result::Result<Response<Body>, ureq::Error>,
    ) -> Result<Response<Body>> {
        let response = response.map_err(|err| {
            KvError::ServiceFailure {
                namespace,
                reason: err.to_string(),
            }
        })?;
        match response.status().as_u16() {
            200..=299 => Ok(response),
            404 => {
                Err(KvError::KeyNotFound {
                    namespace,
                    key: key.to_string(),
                })
            }
            status @ (401 | 403) => Err(KvError::Auth { namespace, status }),
            status => {
                Err(KvError::ServiceFailure {
                    namespace,
                    reason: format!("HTTP {status}"),
                })
            }
        }
    }

    fn read_envelope<T: serde::de::DeserializeOwned>(
        namespace: Namespace,
        key: &str,
        mut response: Response<Body>,
    ) -> Result<Envelope<T>> {
        let envelope: Envelope<T> = response.body_mut().read_json().map_err(|err| {
            KvError::ServiceFailure {
                namespace,
                reason: format!("unreadable response: {err}"),
            }
        })?;
        if !envelope.success {
            let reason = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(KvError::ServiceFailure {
                namespace,
                reason: if reason.is_empty() {
                    format!("request for {key} was not successful")
                } else {
                    reason
                },
            });
        }
        Ok(envelope)
    }
}

fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, NON_ALPHANUMERIC).to_string()
}

impl KvBackend for CloudflareBackend {
    fn read(&self, namespace: Namespace, key: &str) -> Result<Vec<u8>> {
        let url = self.url(namespace, &format!("values/{}", encode_key(key)));
        trace!("GET {url}");
        let response = self
            .agent
            .get(&url)
            .header("Authorization", &self.auth())
            .call();
        let mut response = Self::check(namespace, key, response)?;
        response
            .body_mut()
            .with_config()
            .limit(MAX_VALUE_BYTES)
            .read_to_vec()
            .map_err(|err| {
                KvError::ServiceFailure {
                    namespace,
                    reason: err.to_string(),
                }
            })
    }

    fn read_metadata(&self, namespace: Namespace, key: &str) -> Result<Option<Value>> {
        let url = self.url(namespace, &format!("metadata/{}", encode_key(key)));
        trace!("GET {url}");
        let response = self
            .agent
            .get(&url)
            .header("Authorization", &self.auth())
            .call();
        let response = Self::check(namespace, key, response)?;
        let envelope: Envelope<Value> = Self::read_envelope(namespace, key, response)?;
        Ok(envelope.result.filter(|v| !v.is_null()))
    }

    fn bulk_write(&self, namespace: Namespace, records: Vec<KvRecord>) -> Result<Vec<String>> {
        let url = self.url(namespace, "bulk");
        let mut written = Vec::with_capacity(records.len());

        for chunk in records.chunks(self.chunk_size) {
            let items: Vec<BulkItem> = chunk
                .iter()
                .map(|r| {
                    BulkItem {
                        key: &r.key,
                        value: STANDARD.encode(&r.value),
                        base64: true,
                        metadata: r.metadata.as_ref(),
                    }
                })
                .collect();
            debug!("PUT {} record(s) to {namespace}", items.len());

            let response = self
                .agent
                .put(&url)
                .header("Authorization", &self.auth())
                .send_json(&items);
            let first = chunk.first().map(|r| r.key.as_str()).unwrap_or_default();
            let response = Self::check(namespace, first, response)?;
            let envelope: Envelope<BulkResult> = Self::read_envelope(namespace, first, response)?;
            let failed = envelope
                .result
                .map(|r| r.unsuccessful_keys)
                .unwrap_or_default();

            written.extend(
                chunk
                    .iter()
                    .filter(|r| !failed.contains(&r.key))
                    .map(|r| r.key.clone()),
            );
        }

        Ok(written)
    }

    fn list_keys(&self, namespace: Namespace, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = self.url(
                namespace,
                &format!("keys?limit=1000&prefix={}", encode_key(prefix)),
            );
            if let Some(c) = &cursor {
                url.push_str(&format!("&cursor={}", encode_key(c)));
            }
            trace!("GET {url}");
            let response = self
                .agent
                .get(&url)
                .header("Authorization", &self.auth())
                .call();
            let response = Self::check(namespace, prefix, response)?;
            let envelope: Envelope<Vec<KeyInfo>> =
                Self::read_envelope(namespace, prefix, response)?;

            keys.extend(envelope.result.unwrap_or_default().into_iter().map(|k| k.name));
            cursor = envelope
                .result_info
                .and_then(|info| info.cursor)
                .filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    /// Serves `body` to the first connection on a loopback port and returns
    /// the base URL.
    fn serve_once(body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(&body).unwrap();
        });
        format!("http://{addr}")
    }

    fn backend() -> CloudflareBackend {
        CloudflareBackend::new(
            "https://api.cloudflare.com/client/v4/",
            "acc",
            "token".into(),
            NamespaceIds {
                packages: "p-id".into(),
                versions: "v-id".into(),
                files: "f-id".into(),
                aggregated: "a-id".into(),
                sri: "s-id".into(),
            },
            0,
        )
    }

    #[test]
    fn test_urls() {
        let cf = backend();
        assert_eq!(
            cf.url(Namespace::Files, "bulk"),
            "https://api.cloudflare.com/client/v4/accounts/acc/storage/kv/namespaces/f-id/bulk"
        );
        assert_eq!(cf.chunk_size, 1);
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("vue/3.4.0/vue.js"), "vue%2F3%2E4%2E0%2Fvue%2Ejs");
    }

    #[test]
    fn test_bulk_item_serialization() {
        let metadata = serde_json::json!({"etag": "1-2"});
        let item = BulkItem {
            key: "a/1/a.js",
            value: STANDARD.encode(b"hi"),
            base64: true,
            metadata: Some(&metadata),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["value"], "aGk=");
        assert_eq!(json["metadata"]["etag"], "1-2");
    }

    #[test]
    fn test_envelope_failure_is_service_error() {
        let body: Envelope<Value> = serde_json::from_str(
            r#"{"success": false, "errors": [{"code": 10001, "message": "boom"}], "result": null}"#,
        )
        .unwrap();
        assert!(!body.success);
        assert_eq!(body.errors[0].message, "boom");
    }

    #[test]
    fn test_read_value_above_default_body_limit() {
        let value = vec![b'a'; 12 * 1024 * 1024];
        let mut cf = CloudflareBackend::new(
            &serve_once(value.clone()),
            "acc",
            "token".into(),
            NamespaceIds::default(),
            10,
        );
        cf.agent = Agent::config_builder()
            .http_status_as_error(false)
            .proxy(None)
            .build()
            .into();

        let read = cf.read(Namespace::Aggregated, "big").unwrap();
        assert_eq!(read.len(), value.len());
    }
}
