//! Decides the domain outcome of adding an address to the audience list.

use crate::audience::{AddMemberOutcome, Audience, AudienceError, SubscriptionStatus};
use crate::dispatch::ApiResponse;
use crate::metrics_defs::REGISTRATION_OUTCOME;
use http::StatusCode;
use serde_json::json;

/// Terminal outcomes of a registration attempt. Anything the provider
/// reports that does not map onto one of these propagates as an error and
/// becomes the dispatcher's generic 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The address was newly added to the list.
    Registered,
    /// The address is already subscribed. Reported to the caller exactly
    /// like `Registered` so a prober cannot tell the two apart by status
    /// code (enumeration protection).
    AlreadySubscribed,
    /// The address existed in a non-subscribed state and was re-submitted
    /// as pending opt-in.
    Resubscribed,
    /// The provider rejected the address as malformed.
    InvalidEmail,
    /// The address was permanently erased by the provider and cannot be
    /// re-subscribed through the API.
    PreviouslyUnsubscribed,
}

impl RegistrationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationOutcome::Registered => "registered",
            RegistrationOutcome::AlreadySubscribed => "already_subscribed",
            RegistrationOutcome::Resubscribed => "resubscribed",
            RegistrationOutcome::InvalidEmail => "invalid_email",
            RegistrationOutcome::PreviouslyUnsubscribed => "previously_unsubscribed",
        }
    }

    /// The response returned to the caller for this outcome.
    pub fn response(&self) -> ApiResponse {
        match self {
            RegistrationOutcome::Registered
            | RegistrationOutcome::AlreadySubscribed
            | RegistrationOutcome::Resubscribed => {
                ApiResponse::new(StatusCode::OK, json!({"success": true}))
            }
            RegistrationOutcome::InvalidEmail => ApiResponse::new(
                StatusCode::BAD_REQUEST,
                json!({"success": false, "error": "invalid-email"}),
            ),
            RegistrationOutcome::PreviouslyUnsubscribed => ApiResponse::new(
                StatusCode::BAD_REQUEST,
                json!({"success": false, "error": "unsubscribed"}),
            ),
        }
    }

    /// Subject and body of the internal notification for this outcome.
    pub fn notification(&self, email: &str) -> (String, String) {
        match self {
            RegistrationOutcome::Registered => (
                "New interested user".to_string(),
                format!("{email} signed up for the newsletter."),
            ),
            RegistrationOutcome::AlreadySubscribed => (
                "Not adding - already exists".to_string(),
                format!("{email} tried to sign up but is already subscribed."),
            ),
            RegistrationOutcome::Resubscribed => (
                "Resubscribe".to_string(),
                format!("{email} was re-submitted as pending opt-in."),
            ),
            RegistrationOutcome::InvalidEmail => (
                "Invalid email".to_string(),
                format!("{email} was rejected by the audience provider as invalid."),
            ),
            RegistrationOutcome::PreviouslyUnsubscribed => (
                "Previously unsubscribed".to_string(),
                format!("{email} was previously erased and cannot be re-added."),
            ),
        }
    }
}

/// Attempts to add `email` to the audience list and classifies the result.
///
/// On "member exists" the existing record is looked up (strictly after the
/// failed add, never speculatively) and a non-subscribed member is
/// re-submitted as pending opt-in. A failed lookup or re-submit propagates
/// as a plain error; it gets no special handling.
pub async fn resolve(
    audience: &Audience,
    email: &str,
) -> Result<RegistrationOutcome, AudienceError> {
    let outcome = match audience
        .add_member(email, SubscriptionStatus::Subscribed)
        .await?
    {
        AddMemberOutcome::Added => RegistrationOutcome::Registered,
        AddMemberOutcome::MemberExists => {
            let member = audience.get_member(email).await?;
            if member.status == SubscriptionStatus::Subscribed {
                RegistrationOutcome::AlreadySubscribed
            } else {
                audience
                    .update_member(email, SubscriptionStatus::Pending)
                    .await?;
                RegistrationOutcome::Resubscribed
            }
        }
        AddMemberOutcome::InvalidAddress => RegistrationOutcome::InvalidEmail,
        AddMemberOutcome::Forgotten => RegistrationOutcome::PreviouslyUnsubscribed,
    };

    metrics::counter!(REGISTRATION_OUTCOME, "outcome" => outcome.as_str()).increment(1);

    Ok(outcome)
}
