//! Metric definitions for the intake service.

/// Requests rejected by the shared-token check (expected bot traffic).
pub const REQUESTS_REJECTED: &str = "intake.requests.rejected";

/// Requests that completed with a handler-shaped response.
pub const REQUESTS_HANDLED: &str = "intake.requests.handled";

/// Requests that took the generic failure path.
pub const REQUESTS_FAILED: &str = "intake.requests.failed";

/// Registration outcomes, tagged by outcome.
pub const REGISTRATION_OUTCOME: &str = "intake.registration.outcome";

/// Failure notifications that themselves could not be delivered.
pub const NOTIFY_FAILURES: &str = "intake.notify.failures";
