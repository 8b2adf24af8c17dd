/// Result alias used across the client.
pub type MandrillResult<T, E = MandrillError> = std::result::Result<T, E>;

/// Everything that can go wrong while binding configuration or sending a message.
///
/// Configuration and validation failures are detected before any network
/// traffic and are fixable by the caller; the remaining variants come from
/// the network and may be transient.
#[derive(thiserror::Error, Debug)]
pub enum MandrillError {
    #[error("invalid host configuration: {0}")]
    Configuration(String),
    #[error("No Mandrill API key has been configured")]
    MissingCredential,
    #[error("No from email was specified and no default was configured")]
    MissingSender,
    #[error("`{key}` must be {expected}")]
    InvalidControlKey { key: String, expected: &'static str },
    #[error("failed to fetch attachment from {url}")]
    AttachmentFetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to reach the Mandrill API")]
    Transport(#[from] reqwest::Error),
    #[error("Mandrill API responded with {status}: {body}")]
    Remote { status: u16, body: String },
}

impl MandrillError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Configuration(_)
            | Self::MissingCredential
            | Self::MissingSender
            | Self::InvalidControlKey { .. } => false,
            Self::AttachmentFetch { .. } | Self::Transport(_) | Self::Remote { .. } => true,
        }
    }
}

impl From<config::ConfigError> for MandrillError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
