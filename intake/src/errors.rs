use thiserror::Error;

/// Anything a wrapped handler can fail with. Every variant takes the
/// dispatcher's generic failure path: a 500 response plus one operational
/// notification carrying the error text and the raw event.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Secret(#[from] crate::secrets::SecretError),

    #[error(transparent)]
    Audience(#[from] crate::audience::AudienceError),

    #[error(transparent)]
    Mailer(#[from] crate::mailer::MailerError),
}
