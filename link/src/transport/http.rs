//! Stateless HTTP transport.
//!
//! Each query is a `POST <base>/sql` carrying the batch as the body, the
//! selected namespace/database as headers and the current authorization.
//! Sign-in and sign-up go through `POST <base>/signin` and `/signup`; the
//! returned token authorizes every later request. GraphQL requests are a
//! JSON `POST <base>/graphql` with the same headers. Live queries need a
//! persistent channel and are not available over HTTP.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::mpsc;

use super::{OpenOptions, Transport, TransportEvents};
use crate::auth::Credentials;
use crate::error::{Result, StudioLinkError};
use crate::models::{GraphqlRequest, LiveNotification, RawStatementResult};
use crate::timeouts::StudioLinkTimeouts;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    information: Option<String>,
}

impl ErrorBody {
    fn message(self) -> Option<String> {
        self.information.or(self.description).or(self.details)
    }
}

#[derive(Debug, Default)]
struct HttpSession {
    base_url: Option<String>,
    scope: OpenOptions,
    auth: Option<Credentials>,
}

/// HTTP transport for `http`/`https` connections.
pub struct HttpTransport {
    http_client: reqwest::Client,
    session: RwLock<HttpSession>,
}

impl HttpTransport {
    pub fn new(timeouts: &StudioLinkTimeouts) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if !StudioLinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
            builder = builder.connect_timeout(timeouts.connection_timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| StudioLinkError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            http_client,
            session: RwLock::new(HttpSession::default()),
        })
    }

    fn url(&self, path: &str) -> Result<String> {
        let session = self.session.read();
        let base = session
            .base_url
            .as_deref()
            .ok_or_else(|| StudioLinkError::NetworkError("Transport is not open".to_string()))?;
        Ok(format!("{}/{}", base, path))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session.read().auth {
            Some(credentials) => credentials.apply_to_request(request),
            None => request,
        }
    }

    fn apply_scope(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let session = self.session.read();
        if !session.scope.namespace.is_empty() {
            request = request.header("NS", session.scope.namespace.as_str());
        }
        if !session.scope.database.is_empty() {
            request = request.header("DB", session.scope.database.as_str());
        }
        request
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(ErrorBody::message)
            .unwrap_or_else(|| {
                if text.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    text
                }
            });
        Err(StudioLinkError::ServerError(message))
    }

    async fn request_token(&self, path: &str, credentials: &Credentials) -> Result<Option<String>> {
        let params = credentials.to_signin_params().ok_or_else(|| {
            StudioLinkError::InternalError(format!("{:?} cannot be used for {}", credentials, path))
        })?;

        let request = self
            .http_client
            .post(self.url(path)?)
            .header("Accept", "application/json")
            .json(&params);
        let response = Self::check_status(request.send().await?).await?;
        let body: TokenResponse = response.json().await?;

        match &body.token {
            Some(token) => self.session.write().auth = Some(Credentials::Token(token.clone())),
            None => self.session.write().auth = Some(credentials.clone()),
        }
        Ok(body.token)
    }
}

/// Derive the HTTP base URL from an RPC endpoint.
fn base_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/rpc").unwrap_or(trimmed);
    if let Some(rest) = trimmed.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        trimmed.to_string()
    }
}

/// Render query variables as URL query parameters.
fn variable_pairs(variables: &Map<String, JsonValue>) -> Vec<(String, String)> {
    variables
        .iter()
        .map(|(name, value)| {
            let value = match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
        .collect()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, endpoint: &str, _events: TransportEvents) -> Result<()> {
        let base = base_url(endpoint);
        log::debug!("[HTTP] Using base url {}", base);
        *self.session.write() = HttpSession {
            base_url: Some(base),
            ..HttpSession::default()
        };
        Ok(())
    }

    async fn signin(&self, credentials: &Credentials) -> Result<Option<String>> {
        self.request_token("signin", credentials).await
    }

    async fn signup(&self, credentials: &Credentials) -> Result<Option<String>> {
        self.request_token("signup", credentials).await
    }

    async fn authenticate(&self, token: &str) -> Result<()> {
        self.session.write().auth = Some(Credentials::Token(token.to_string()));
        Ok(())
    }

    async fn invalidate(&self) -> Result<()> {
        self.session.write().auth = None;
        Ok(())
    }

    async fn use_scope(&self, options: &OpenOptions) -> Result<()> {
        self.session.write().scope = options.clone();
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        variables: Option<Map<String, JsonValue>>,
    ) -> Result<Vec<RawStatementResult>> {
        let mut request = self
            .http_client
            .post(self.url("sql")?)
            .header("Accept", "application/json")
            .body(text.to_string());
        if let Some(variables) = &variables {
            request = request.query(&variable_pairs(variables));
        }
        let request = self.authorize(self.apply_scope(request));

        let start = std::time::Instant::now();
        let response = Self::check_status(request.send().await?).await?;
        log::debug!("[HTTP] /sql answered in {:?}", start.elapsed());

        Ok(response.json::<Vec<RawStatementResult>>().await?)
    }

    async fn graphql(&self, request: &GraphqlRequest) -> Result<JsonValue> {
        let request = self
            .http_client
            .post(self.url("graphql")?)
            .header("Accept", "application/json")
            .json(request);
        let request = self.authorize(self.apply_scope(request));

        let response = Self::check_status(request.send().await?).await?;
        Ok(response.json::<JsonValue>().await?)
    }

    async fn subscribe_live(&self, _id: &str) -> Result<mpsc::Receiver<LiveNotification>> {
        Err(StudioLinkError::UnsupportedProtocol(
            "live queries are not supported over HTTP".to_string(),
        ))
    }

    async fn kill(&self, _id: &str) -> Result<()> {
        Err(StudioLinkError::UnsupportedProtocol(
            "live queries are not supported over HTTP".to_string(),
        ))
    }

    async fn close(&self) -> Result<()> {
        *self.session.write() = HttpSession::default();
        Ok(())
    }
}
