//! HTTP surface: the dispatcher-wrapped entry points and the server loop.

use crate::audience::AudienceProvider;
use crate::config::Listener as ListenerConfig;
use crate::dispatch::{ApiResponse, Dispatcher};
use crate::mailer::Notifier;
use crate::registration;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Singleton collaborators shared by every entry point. Constructed once by
/// the process entry point and injected here; there is no module-level
/// state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub audience: Arc<AudienceProvider>,
    pub notifier: Arc<Notifier>,
}

#[derive(Deserialize)]
struct SubscribeRequest {
    email: String,
}

#[derive(Deserialize)]
struct ContactRequest {
    email: String,
    name: String,
    message: String,
}

async fn subscribe(State(state): State<AppState>, body: String) -> ApiResponse {
    let dispatcher = state.dispatcher.clone();
    dispatcher
        .dispatch(body, move |payload| async move {
            let request: SubscribeRequest = serde_json::from_value(payload)?;

            let audience = state.audience.get().await?;
            let outcome = registration::resolve(&audience, &request.email).await?;

            let (subject, text) = outcome.notification(&request.email);
            state.notifier.notify(&subject, &text).await?;

            Ok(outcome.response())
        })
        .await
}

async fn contact(State(state): State<AppState>, body: String) -> ApiResponse {
    let dispatcher = state.dispatcher.clone();
    dispatcher
        .dispatch(body, move |payload| async move {
            let request: ContactRequest = serde_json::from_value(payload)?;

            let subject = format!("Contact form message from {}", request.name);
            let text = format!(
                "From: {} <{}>\n\n{}",
                request.name, request.email, request.message
            );
            state
                .notifier
                .forward_message(&request.email, &subject, &text)
                .await?;

            Ok(ApiResponse::ok(json!({"success": true})))
        })
        .await
}

async fn health() -> StatusCode {
    StatusCode::OK
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/subscribe", post(subscribe))
        .route("/contact", post(contact))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(listener: &ListenerConfig, state: AppState) -> Result<(), ApiError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let tcp = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(tcp, router(state)).await?;
    Ok(())
}
