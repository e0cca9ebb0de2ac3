//! HTTP storage backend with timeouts and retry for transient failures.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

use super::traits::{BackendError, StorageBackend, StorageRoot, StoredObject};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: usize = 3;

/// Storage backend speaking a hub's HTTP object API.
///
/// Objects live at `{hub}/store/{address}/{path}`. Writes answer with an
/// optional JSON body naming the object's public URL. Transient failures
/// (429, 5xx, connect errors, timeouts) are retried with exponential backoff;
/// a timeout that survives the retries surfaces as [`BackendError::Timeout`].
pub struct HttpBackend {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpBackend {
    /// Backend with the default 30 second per-request deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Backend with a caller-chosen per-request deadline.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Builds `{hub}/store/{address}/{path}`, percent-encoding each path
    /// segment so paths with spaces or reserved characters stay addressable.
    fn object_url(root: &StorageRoot, path: &str) -> Result<String, BackendError> {
        let mut url = Url::parse(&root.hub_url).map_err(|err| {
            BackendError::Unavailable(format!(
                "hub url `{}` is not valid: {err}",
                root.hub_url
            ))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                BackendError::Unavailable(format!(
                    "hub url `{}` cannot carry a path",
                    root.hub_url
                ))
            })?;
            segments.pop_if_empty();
            segments.push("store");
            segments.push(&root.address);
            segments.extend(path.trim_start_matches('/').split('/'));
        }
        Ok(url.to_string())
    }

    fn apply_defaults(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.timeout(self.timeout).header(
            "User-Agent",
            format!("authkit-core/{}", env!("CARGO_PKG_VERSION")),
        )
    }

    /// Sends `template`, retrying attempts that failed transiently.
    async fn execute(&self, template: RequestBuilder) -> Result<Response, BackendError> {
        let Some(retryable_template) = template.try_clone() else {
            // non-replayable bodies get a single attempt
            return send_once(template).await.map_err(Attempt::into_backend_error);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(MAX_RETRIES);

        (|| async {
            let builder = retryable_template.try_clone().ok_or_else(|| {
                Attempt::permanent("request body cannot be replayed".to_string())
            })?;
            send_once(builder).await
        })
        .retry(backoff)
        .when(Attempt::is_retryable)
        .await
        .map_err(Attempt::into_backend_error)
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct PutResponseBody {
    #[serde(rename = "publicURL")]
    public_url: Option<String>,
}

#[async_trait]
impl StorageBackend for HttpBackend {
    async fn put_object(
        &self,
        root: &StorageRoot,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let url = Self::object_url(root, path)?;
        let request = self
            .apply_defaults(self.client.put(&url))
            .header("Content-Type", content_type)
            .body(bytes);
        let response = self.execute(request).await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Unavailable(format!(
                "write to `{url}` failed with status {status}: {message}"
            )));
        }

        // hubs may answer with the object's public URL; fall back to the
        // write URL itself
        let public_url = response
            .json::<PutResponseBody>()
            .await
            .ok()
            .and_then(|body| body.public_url)
            .unwrap_or_else(|| url.clone());
        Ok(public_url)
    }

    async fn get_object(
        &self,
        root: &StorageRoot,
        path: &str,
    ) -> Result<Option<StoredObject>, BackendError> {
        let url = Self::object_url(root, path)?;
        let request = self.apply_defaults(self.client.get(&url));
        let response = self.execute(request).await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "read from `{url}` failed with status {status}"
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let bytes = response.bytes().await.map_err(|err| {
            BackendError::Unavailable(format!("reading response body failed: {err}"))
        })?;
        Ok(Some(StoredObject {
            bytes: bytes.to_vec(),
            content_type,
        }))
    }
}

/// Outcome classification for one request attempt.
#[derive(Debug)]
struct Attempt {
    message: String,
    retryable: bool,
    timed_out: bool,
}

impl Attempt {
    const fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn permanent(message: String) -> Self {
        Self {
            message,
            retryable: false,
            timed_out: false,
        }
    }

    fn transient(message: String, timed_out: bool) -> Self {
        Self {
            message,
            retryable: true,
            timed_out,
        }
    }

    fn into_backend_error(self) -> BackendError {
        if self.timed_out {
            BackendError::Timeout(self.message)
        } else {
            BackendError::Unavailable(self.message)
        }
    }
}

async fn send_once(builder: RequestBuilder) -> Result<Response, Attempt> {
    match builder.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(Attempt::transient(
                    format!("transient status {status}"),
                    false,
                ));
            }
            Ok(response)
        }
        Err(err) if err.is_timeout() => Err(Attempt::transient(
            format!("request timed out: {err}"),
            true,
        )),
        Err(err) if err.is_connect() => Err(Attempt::transient(
            format!("connection failed: {err}"),
            false,
        )),
        Err(err) => Err(Attempt::permanent(format!("request failed: {err}"))),
    }
}
