// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared HTTP transport for the REST-speaking connectors (RavenDB,
// Couchbase query service, ArangoDB).
//
// Owns the base URL, the lazily built `reqwest` client and the credentials.
// Paths are built from segments so keys are percent-encoded. Non-2xx
// answers become `ConnectorError::Http`; a 404 is left to the caller,
// which usually reads it as "absent".

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::ConnectorKind;
use crate::error::{ConnectorError, ConnectorResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Credentials attached to every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// No authentication (local development, trusted networks).
    None,
    /// HTTP Basic authentication.
    Basic { username: String, password: String },
}

impl Auth {
    /// Basic auth when a username is configured, otherwise none.
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Self {
        match username {
            Some(username) => Auth::Basic {
                username: username.to_string(),
                password: password.unwrap_or_default().to_string(),
            },
            None => Auth::None,
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// RestTransport
// ---------------------------------------------------------------------------

/// HTTP plumbing for one backend endpoint.
pub struct RestTransport {
    kind: ConnectorKind,
    base_url: Url,
    auth: Auth,
    timeout: Duration,
    http: OnceCell<reqwest::Client>,
}

impl RestTransport {
    /// Parse `base_url` and prepare a transport. No client is built yet.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Config`] if `base_url` is not an absolute
    /// http(s) URL.
    pub fn new(kind: ConnectorKind, base_url: &str, auth: Auth) -> ConnectorResult<Self> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| ConnectorError::Config(format!("{kind}: invalid URL '{base_url}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ConnectorError::Config(format!(
                "{kind}: URL must be http(s), got '{base_url}'"
            )));
        }
        Ok(Self {
            kind,
            base_url,
            auth,
            timeout: DEFAULT_TIMEOUT,
            http: OnceCell::new(),
        })
    }

    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set a custom per-request timeout. Only effective before first use.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_connected(&self) -> bool {
        self.http.initialized()
    }

    async fn client(&self) -> ConnectorResult<&reqwest::Client> {
        self.http
            .get_or_try_init(|| async {
                debug!(backend = %self.kind, url = %self.base_url, "building http client");
                reqwest::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| ConnectorError::driver(self.kind, e))
            })
            .await
    }

    /// Base URL with `segments` appended, each percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> ConnectorResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConnectorError::Config(format!("{}: URL cannot be a base", self.kind)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// A request builder with credentials attached.
    pub async fn request(&self, method: Method, url: Url) -> ConnectorResult<RequestBuilder> {
        let builder = self.client().await?.request(method, url);
        Ok(match &self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        })
    }

    /// Send a prepared request.
    pub async fn send(&self, builder: RequestBuilder) -> ConnectorResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| ConnectorError::driver(self.kind, e))
    }

    /// Deserialize a successful response or turn it into an error.
    pub async fn json<T: DeserializeOwned>(&self, response: Response) -> ConnectorResult<T> {
        if !response.status().is_success() {
            return Err(self.error(response).await);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| ConnectorError::driver(self.kind, e))?;
        serde_json::from_slice(&body).map_err(|e| {
            ConnectorError::CorruptedData(format!("{}: unexpected response body: {e}", self.kind))
        })
    }

    /// Ok for 2xx, error otherwise.
    pub async fn expect_success(&self, response: Response) -> ConnectorResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.error(response).await)
        }
    }

    /// Turn a non-2xx response into [`ConnectorError::Http`].
    pub async fn error(&self, response: Response) -> ConnectorError {
        let status = response.status();
        let message = match response.text().await {
            Ok(body) if !body.trim().is_empty() => body,
            _ => status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string(),
        };
        ConnectorError::Http {
            backend: self.kind,
            status: status.as_u16(),
            message,
        }
    }
}

impl std::fmt::Debug for RestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTransport")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// True for 404 Not Found.
pub fn is_not_found(response: &Response) -> bool {
    response.status() == StatusCode::NOT_FOUND
}
