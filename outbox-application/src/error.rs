use outbox_domain::error::DomainError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    #[error("config: {key}={value}: {reason}")]
    Config {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("sink rejected: status={status}, reason={reason}")]
    Sink { status: u16, reason: String },

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}
