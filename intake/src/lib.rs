//! Backend request-handling core for the marketing site.
//!
//! Every entry point is a dispatcher-wrapped handler: shared-token gate,
//! fixed cross-origin headers on every response, uniform error-to-500
//! mapping with an operational notification. One-time setup (secret fetch,
//! mailing-list client configuration) is amortized across requests with
//! single-flight caches.

pub mod api;
pub mod audience;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod mailer;
pub mod metrics_defs;
pub mod registration;
pub mod secrets;
