use std::env;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use crate::error::{Error, Result};
use crate::feed::process_changes;
use crate::observability::{
    FEED_SUBSCRIBES, INSERT_ERRORS, INSERT_REQUESTS, QUERY_DURATION, QUERY_ERRORS, QUERY_REQUESTS,
    UPLOAD_BYTES, UPLOAD_ERRORS, UPLOAD_REQUESTS,
};
use crate::types::{Session, SessionState};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A change feed of typed rows pushed by the backend.
pub type ChangeFeed<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Holds the current session and publishes lifecycle transitions.
pub(crate) struct SessionCell {
    inner: RwLock<Option<Session>>,
    tx: watch::Sender<SessionState>,
}

impl SessionCell {
    fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::SignedOut);
        Self {
            inner: RwLock::new(None),
            tx,
        }
    }

    pub(crate) fn set(&self, session: Session) {
        let state = SessionState::of(Some(&session));
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.tx.send_replace(state);
    }

    pub(crate) fn clear(&self) {
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.tx.send_replace(SessionState::SignedOut);
    }

    pub(crate) fn snapshot(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

impl fmt::Debug for SessionCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCell")
            .field("state", &SessionState::of(self.snapshot().as_ref()))
            .finish()
    }
}

/// Client handle for the hosted chat backend.
///
/// One handle is created at startup and shared (by clone) with every
/// controller; its configuration never changes after construction. The
/// only mutable state behind it is the session cell, which auth
/// operations update and everything else reads.
#[derive(Clone, Debug)]
pub struct Backend {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    session: Arc<SessionCell>,
}

impl Backend {
    /// Create a new backend handle.
    ///
    /// The base URL and project API key can be provided directly or read
    /// from the PARLOR_URL and PARLOR_API_KEY environment variables.
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Result<Self> {
        Self::with_options(base_url, api_key, None)
    }

    /// Create a new backend handle with custom settings.
    pub fn with_options(
        base_url: Option<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = match base_url {
            Some(url) => url,
            None => env::var("PARLOR_URL").map_err(|_| {
                Error::validation(
                    "backend URL not provided and PARLOR_URL environment variable not set",
                    Some("url".to_string()),
                )
            })?,
        };
        let api_key = match api_key {
            Some(key) => key,
            None => env::var("PARLOR_API_KEY").map_err(|_| {
                Error::authentication(
                    "API key not provided and PARLOR_API_KEY environment variable not set",
                )
            })?,
        };

        // reqwest::Url::join drops the last path segment without this.
        let base_url = if base_url.ends_with('/') {
            base_url
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        // No client-wide timeout: change feeds stay open indefinitely.
        // Request timeouts are applied per call instead.
        let client = ReqwestClient::builder().build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            session: Arc::new(SessionCell::new()),
        })
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn client(&self) -> &ReqwestClient {
        &self.client
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns a snapshot of the stored session, if any.
    pub fn session(&self) -> Option<Session> {
        self.session.snapshot()
    }

    /// Returns a receiver that observes session lifecycle transitions.
    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    pub(crate) fn store_session(&self, session: Session) {
        self.session.set(session);
    }

    pub(crate) fn clear_session(&self) {
        self.session.clear();
    }

    /// Returns the bearer token for authenticated requests.
    ///
    /// A valid user session wins; otherwise requests ride on the project
    /// API key alone and the backend's policies decide what is visible.
    pub(crate) fn bearer_token(&self) -> String {
        match self.session.snapshot() {
            Some(session) if session.is_valid() => session.access_token,
            _ => self.api_key.clone(),
        }
    }

    /// Create and return default headers for API requests.
    pub(crate) fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key).expect("API key should be a valid header value"),
        );
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.bearer_token()))
                .expect("bearer token should be a valid header value"),
        );
        headers
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Convert a transport-level reqwest failure into our Error type.
    pub(crate) fn map_request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type.
    pub(crate) async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        // The backend is not consistent about its error body shape.
        #[derive(Deserialize)]
        struct ErrorBody {
            message: Option<String>,
            msg: Option<String>,
            error_description: Option<String>,
            error: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let message = serde_json::from_str::<ErrorBody>(&error_body)
            .ok()
            .and_then(|b| b.message.or(b.msg).or(b.error_description).or(b.error))
            .unwrap_or_else(|| error_body.clone());

        // Row-level security rejections arrive as 4xx with a telltale
        // message; they are policy failures, not bad requests.
        if message.contains("row-level security") {
            return Error::permission(message);
        }

        match status_code {
            401 => Error::authentication(message),
            403 => Error::permission(message),
            404 => Error::not_found(message),
            408 => Error::timeout(message),
            _ => Error::api(status_code, message),
        }
    }

    /// Read all rows of a table, ordered.
    ///
    /// `order` is a `column.direction` pair, e.g. `updated_at.desc`.
    pub async fn select_all<T: DeserializeOwned>(
        &self,
        table: &str,
        order: &str,
    ) -> Result<Vec<T>> {
        self.select(table, &[("select", "*"), ("order", order)])
            .await
    }

    /// Read rows of a table matching an equality filter, ordered.
    pub async fn select_eq<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: &str,
        order: &str,
    ) -> Result<Vec<T>> {
        let filter = format!("eq.{value}");
        self.select(
            table,
            &[("select", "*"), (column, &filter), ("order", order)],
        )
        .await
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        QUERY_REQUESTS.click();
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .headers(self.default_headers())
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                QUERY_ERRORS.click();
                self.map_request_error(e)
            })?;

        if !response.status().is_success() {
            QUERY_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let rows = response.json::<Vec<T>>().await.map_err(|e| {
            QUERY_ERRORS.click();
            Error::decode(
                format!("row failed schema validation: {e}"),
                Some(table.to_string()),
            )
        })?;
        QUERY_DURATION.add(start.elapsed().as_secs_f64());
        Ok(rows)
    }

    /// Insert one row and return the created row as the backend stored it.
    pub async fn insert_returning<T: DeserializeOwned, R: Serialize>(
        &self,
        table: &str,
        row: &R,
    ) -> Result<T> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        INSERT_REQUESTS.click();

        let mut headers = self.default_headers();
        headers.insert(
            "prefer",
            HeaderValue::from_static("return=representation"),
        );

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(row)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                INSERT_ERRORS.click();
                self.map_request_error(e)
            })?;

        if !response.status().is_success() {
            INSERT_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        // return=representation answers with an array of created rows.
        let mut rows = response.json::<Vec<T>>().await.map_err(|e| {
            INSERT_ERRORS.click();
            Error::decode(
                format!("row failed schema validation: {e}"),
                Some(table.to_string()),
            )
        })?;
        rows.pop().ok_or_else(|| {
            Error::decode(
                "insert returned no representation".to_string(),
                Some(table.to_string()),
            )
        })
    }

    /// Open a change feed of rows inserted into a table, filtered by an
    /// equality condition evaluated server-side.
    ///
    /// The feed stays open until dropped or until the server closes the
    /// connection; there is no reconnection logic.
    pub async fn subscribe_inserts<T: DeserializeOwned + 'static>(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<ChangeFeed<T>> {
        let url = self.endpoint("realtime/v1/changes")?;
        FEED_SUBSCRIBES.click();

        let mut headers = self.default_headers();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        let response = self
            .client
            .get(url)
            .headers(headers)
            .query(&[
                ("table", table),
                ("event", "INSERT"),
                ("filter", &format!("{column}=eq.{value}")),
            ])
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let stream = response.bytes_stream();
        Ok(Box::pin(process_changes(stream, table.to_string())))
    }

    /// Upload an object to a storage bucket with no-overwrite semantics.
    pub async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        cache_max_age: u32,
        body: Bytes,
    ) -> Result<()> {
        let url = self.endpoint(&format!("storage/v1/object/{bucket}/{path}"))?;
        UPLOAD_REQUESTS.click();
        UPLOAD_BYTES.count(body.len() as u64);

        let mut headers = self.default_headers();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).map_err(|e| {
                Error::validation(
                    format!("content type is not a valid header value: {e}"),
                    Some("content_type".to_string()),
                )
            })?,
        );
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_str(&format!("max-age={cache_max_age}"))
                .expect("cache-control should be a valid header value"),
        );
        headers.insert("x-upsert", HeaderValue::from_static("false"));

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                UPLOAD_ERRORS.click();
                self.map_request_error(e)
            })?;

        if !response.status().is_success() {
            UPLOAD_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(())
    }

    /// Resolve the publicly retrievable URL of a stored object.
    ///
    /// Purely local URL construction; the object's actual visibility is
    /// governed by the bucket's policy.
    pub fn public_url(&self, bucket: &str, path: &str) -> Result<Url> {
        self.endpoint(&format!("storage/v1/object/public/{bucket}/{path}"))
    }
}
