use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("conversation api configuration error")]
    Config(#[source] anyhow::Error),
    #[error("conversation api transport error")]
    Transport(#[source] reqwest::Error),
    #[error("conversation api remote error (status {status})")]
    Remote { status: StatusCode, message: String },
    #[error("conversation api response decode error")]
    Decode(#[source] anyhow::Error),
}

impl ApiError {
    /// Short label used for the `kind` metric dimension and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Config(_) => "config",
            ApiError::Transport(_) => "transport",
            ApiError::Remote { .. } => "remote",
            ApiError::Decode(_) => "decode",
        }
    }
}
