//! Generic wrapper applied to every inbound entry point: payload parse,
//! shared-token gate, response shaping, and the single place operational
//! failure notifications are emitted from.

use crate::errors::HandlerError;
use crate::mailer::Notifier;
use crate::metrics_defs::{NOTIFY_FAILURES, REQUESTS_FAILED, REQUESTS_HANDLED, REQUESTS_REJECTED};
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::header::{HeaderMap, HeaderValue};
use http::StatusCode;
use serde_json::{Value, json};
use shared::cors::apply_cors_headers;
use std::sync::Arc;

/// Response produced by a wrapped handler: status, JSON body, and any
/// handler-specific headers. The dispatcher merges the fixed cross-origin
/// headers on top before the response leaves the service.
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
    pub headers: HeaderMap,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        ApiResponse {
            status,
            body,
            headers: HeaderMap::new(),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, Json(self.body)).into_response()
    }
}

enum Rejection {
    WrongToken,
    Failed(HandlerError),
}

/// Wraps handler bodies with the shared request-handling policy.
pub struct Dispatcher {
    token: String,
    origin: HeaderValue,
    notifier: Arc<Notifier>,
}

impl Dispatcher {
    pub fn new(token: String, origin: HeaderValue, notifier: Arc<Notifier>) -> Self {
        Dispatcher {
            token,
            origin,
            notifier,
        }
    }

    /// Runs one inbound request through parse, authorization, the handler,
    /// and response shaping.
    ///
    /// The token gate resolves fully before the handler is invoked. A wrong
    /// or missing token is an expected outcome (bot traffic): it returns 400
    /// without a notification. A parse failure or handler error is logged
    /// with the raw event, triggers one operational notification, and
    /// becomes a generic 500. A failure of the notification itself is
    /// swallowed so the caller still gets the 500. Every response, on every
    /// path, carries the fixed cross-origin headers.
    pub async fn dispatch<H, Fut>(&self, raw_body: String, handler: H) -> ApiResponse
    where
        H: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<ApiResponse, HandlerError>>,
    {
        let mut response = match self.run(&raw_body, handler).await {
            Ok(response) => {
                metrics::counter!(REQUESTS_HANDLED).increment(1);
                response
            }
            Err(Rejection::WrongToken) => {
                metrics::counter!(REQUESTS_REJECTED).increment(1);
                ApiResponse::new(
                    StatusCode::BAD_REQUEST,
                    json!({"success": false, "error": "Wrong token"}),
                )
            }
            Err(Rejection::Failed(err)) => {
                metrics::counter!(REQUESTS_FAILED).increment(1);
                tracing::error!(error = %err, event = %raw_body, "request handler failed");

                let text = format!("{err}\n\nRaw event:\n{raw_body}");
                if let Err(notify_err) = self.notifier.notify("Request handler failure", &text).await
                {
                    metrics::counter!(NOTIFY_FAILURES).increment(1);
                    tracing::warn!(error = %notify_err, "could not deliver failure notification");
                }

                ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, json!({"success": false}))
            }
        };

        apply_cors_headers(&mut response.headers, &self.origin);
        response
    }

    async fn run<H, Fut>(&self, raw_body: &str, handler: H) -> Result<ApiResponse, Rejection>
    where
        H: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<ApiResponse, HandlerError>>,
    {
        let body: Value = serde_json::from_str(raw_body)
            .map_err(|err| Rejection::Failed(HandlerError::Payload(err)))?;

        let token = body.get("token").and_then(Value::as_str);
        if token != Some(self.token.as_str()) {
            return Err(Rejection::WrongToken);
        }

        handler(body).await.map_err(Rejection::Failed)
    }
}
