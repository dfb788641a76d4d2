//! Client layer: orchestrates transport calls and maps transport ↔ domain.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::{ApiKey, Credentials, HttpStatus, SendMessage, ValidationError};

const DEFAULT_SEND_ENDPOINT: &str = "https://api.sms.to/sms/send";
const DEFAULT_BALANCE_ENDPOINT: &str = "https://auth.sms.to/api/balance";
const DEFAULT_MESSAGES_ENDPOINT: &str = "https://api.sms.to/v2/messages";

/// Per-request timeout applied to every gateway call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
struct HttpRequest {
    method: HttpMethod,
    url: String,
    bearer: ApiKey,
    body: Option<Value>,
}

#[derive(Debug, Clone)]
struct HttpResponse {
    status: u16,
    body: String,
}

trait HttpTransport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, Box<dyn StdError + Send + Sync>>>;
}

#[derive(Debug, Clone)]
struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, Box<dyn StdError + Send + Sync>>> {
        Box::pin(async move {
            let builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };
            let mut builder = builder
                .bearer_auth(request.bearer.expose())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .timeout(self.timeout);
            if let Some(body) = request.body.as_ref() {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(HttpResponse { status, body })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The three gateway URLs used by a session.
pub struct Endpoints {
    pub send: String,
    pub balance: String,
    pub messages: String,
}

#[derive(Debug, thiserror::Error)]
/// Errors returned by [`SmsToClient`].
///
/// The three request-time variants mirror what a caller can act on:
/// - bad input caught before any network call,
/// - the gateway answered with a non-200 status,
/// - the request never produced a status (DNS, TLS, refused, timeout).
pub enum SmsToError {
    /// One of the domain constructors rejected an invalid value.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Non-200 status returned by the gateway.
    #[error("{reason} (status {status})")]
    Gateway {
        status: HttpStatus,
        reason: &'static str,
        body: Option<String>,
    },

    /// HTTP client / transport failure (DNS, TLS, timeouts, etc).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    /// A configured endpoint is not an absolute URL.
    #[error("invalid endpoint {url:?}: {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl SmsToError {
    /// Status code of a [`SmsToError::Gateway`] failure.
    pub fn status(&self) -> Option<HttpStatus> {
        match self {
            Self::Gateway { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Clone)]
/// Shared HTTP state: one connection pool plus the endpoint set.
///
/// Cloning is cheap. The setup flow, the coordinator and the notify action all
/// hold clones of the same session.
pub struct ClientSession {
    endpoints: Arc<Endpoints>,
    http: Arc<dyn HttpTransport>,
}

impl ClientSession {
    /// Session with the production endpoints and [`DEFAULT_TIMEOUT`].
    pub fn new() -> Self {
        Self {
            endpoints: Arc::new(default_endpoints()),
            http: Arc::new(ReqwestTransport {
                client: reqwest::Client::new(),
                timeout: DEFAULT_TIMEOUT,
            }),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

fn default_endpoints() -> Endpoints {
    Endpoints {
        send: DEFAULT_SEND_ENDPOINT.to_owned(),
        balance: DEFAULT_BALANCE_ENDPOINT.to_owned(),
        messages: DEFAULT_MESSAGES_ENDPOINT.to_owned(),
    }
}

/// Endpoints must be absolute URLs; they are stored in normalized form.
fn parse_endpoint(url: String) -> Result<String, SmsToError> {
    match Url::parse(&url) {
        Ok(parsed) => Ok(parsed.into()),
        Err(source) => Err(SmsToError::InvalidEndpoint { url, source }),
    }
}

#[derive(Debug, Clone)]
/// Builder for [`SmsToClient`].
///
/// Use this when you need to customize the endpoints or user-agent. The
/// per-request timeout is always [`DEFAULT_TIMEOUT`].
pub struct SmsToClientBuilder {
    credentials: Credentials,
    send_endpoint: String,
    balance_endpoint: String,
    messages_endpoint: String,
    user_agent: Option<String>,
}

impl SmsToClientBuilder {
    /// Create a builder with the default endpoints.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            send_endpoint: DEFAULT_SEND_ENDPOINT.to_owned(),
            balance_endpoint: DEFAULT_BALANCE_ENDPOINT.to_owned(),
            messages_endpoint: DEFAULT_MESSAGES_ENDPOINT.to_owned(),
            user_agent: None,
        }
    }

    /// Override the endpoint URL for `sms/send`.
    pub fn send_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.send_endpoint = endpoint.into();
        self
    }

    /// Override the endpoint URL for `api/balance`.
    pub fn balance_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.balance_endpoint = endpoint.into();
        self
    }

    /// Override the endpoint URL for `v2/messages`.
    pub fn messages_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.messages_endpoint = endpoint.into();
        self
    }

    /// Override the HTTP `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build a [`SmsToClient`] backed by a fresh [`ClientSession`].
    pub fn build(self) -> Result<SmsToClient, SmsToError> {
        let endpoints = Endpoints {
            send: parse_endpoint(self.send_endpoint)?,
            balance: parse_endpoint(self.balance_endpoint)?,
            messages: parse_endpoint(self.messages_endpoint)?,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let client = builder
            .build()
            .map_err(|err| SmsToError::Transport(Box::new(err)))?;

        let session = ClientSession {
            endpoints: Arc::new(endpoints),
            http: Arc::new(ReqwestTransport {
                client,
                timeout: DEFAULT_TIMEOUT,
            }),
        };
        Ok(SmsToClient::with_session(session, self.credentials))
    }
}

#[derive(Clone)]
/// High-level SMS.to client.
///
/// Every call carries `Authorization: Bearer <api_key>` and a JSON content
/// type, and is attempted exactly once. By default it uses:
/// - `https://api.sms.to/sms/send` for sending messages
/// - `https://auth.sms.to/api/balance` for the account balance
/// - `https://api.sms.to/v2/messages` for the sent-message count
pub struct SmsToClient {
    credentials: Credentials,
    session: ClientSession,
}

impl SmsToClient {
    /// Create a client using the default session.
    ///
    /// For more customization, use [`SmsToClient::builder`].
    pub fn new(credentials: Credentials) -> Self {
        Self::with_session(ClientSession::new(), credentials)
    }

    /// Start building a client with custom settings.
    pub fn builder(credentials: Credentials) -> SmsToClientBuilder {
        SmsToClientBuilder::new(credentials)
    }

    /// Create a client that shares an existing session's connection pool.
    pub fn with_session(session: ClientSession, credentials: Credentials) -> Self {
        debug!(
            api_key = %credentials.api_key().masked(),
            sender_id = %credentials.sender_id(),
            "SMS.to client initialized"
        );
        Self {
            credentials,
            session,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Send an SMS to every target of `request`.
    ///
    /// Errors:
    /// - [`SmsToError::Gateway`] for any status other than 200, with the mapped reason and raw body,
    /// - [`SmsToError::Transport`] when no response was received.
    pub async fn send(&self, request: SendMessage) -> Result<(), SmsToError> {
        let payload =
            crate::transport::encode_send_sms_json(&request, self.credentials.sender_id());
        let targets: Vec<&str> = request.targets().iter().map(|to| to.raw()).collect();
        debug!(?targets, "sending SMS");

        self.execute(
            "send SMS",
            HttpMethod::Post,
            &self.session.endpoints.send,
            Some(payload),
        )
        .await?;

        info!(?targets, "SMS sent successfully");
        Ok(())
    }

    /// Fetch the account balance. A 200 response without a usable `balance` yields `None`.
    pub async fn get_balance(&self) -> Result<Option<f64>, SmsToError> {
        debug!("fetching balance");
        let body = self
            .execute(
                "fetch balance",
                HttpMethod::Get,
                &self.session.endpoints.balance,
                None,
            )
            .await?;

        let balance = crate::transport::decode_balance_json_response(&body).unwrap_or_else(|err| {
            warn!(error = %err, "balance response is not JSON; treating balance as absent");
            None
        });
        debug!(?balance, "balance fetched");
        Ok(balance)
    }

    /// Fetch the total number of sent messages. Unexpected payloads degrade to `0`.
    pub async fn get_total_messages(&self) -> Result<u64, SmsToError> {
        debug!("fetching total messages");
        let body = self
            .execute(
                "fetch total messages",
                HttpMethod::Get,
                &self.session.endpoints.messages,
                None,
            )
            .await?;

        let total = match crate::transport::decode_total_messages_json_response(&body) {
            Ok(Some(total)) => total,
            Ok(None) => {
                warn!("messages response has no usable `total`; defaulting to 0");
                0
            }
            Err(err) => {
                warn!(error = %err, "messages response is not JSON; defaulting to 0");
                0
            }
        };
        debug!(total, "total messages fetched");
        Ok(total)
    }

    async fn execute(
        &self,
        operation: &'static str,
        method: HttpMethod,
        url: &str,
        body: Option<Value>,
    ) -> Result<String, SmsToError> {
        let request = HttpRequest {
            method,
            url: url.to_owned(),
            bearer: self.credentials.api_key().clone(),
            body,
        };

        let response = self.session.http.execute(request).await.map_err(|err| {
            error!(operation, error = %err, "transport failure");
            SmsToError::Transport(err)
        })?;

        let status = HttpStatus::new(response.status);
        if !status.is_success() {
            let reason = status.reason();
            error!(
                operation,
                status = status.as_u16(),
                reason,
                response = %response.body,
                "gateway returned an error"
            );
            let body = if response.body.trim().is_empty() {
                None
            } else {
                Some(response.body)
            };
            return Err(SmsToError::Gateway {
                status,
                reason,
                body,
            });
        }

        Ok(response.body)
    }
}

impl std::fmt::Debug for SmsToClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsToClient")
            .field("credentials", &self.credentials)
            .field("session", &self.session)
            .finish()
    }
}
