use crate::config::RaceMode;

/// Configuration problems, reported before any attempt is issued.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An endpoint address is blank.
    #[error("{0} endpoint is empty")]
    EmptyEndpoint(&'static str),

    /// The race mode needs a secondary endpoint but none was given.
    #[error("{0} race requires a secondary endpoint")]
    MissingSecondary(RaceMode),

    /// The race mode text is not one of `standard`, `tied`, `hedged`.
    #[error("unknown race mode {0:?}")]
    UnknownMode(String),
}

/// Why a single attempt did not produce a payload.
///
/// These never escape a dispatch; they are logged and folded into the
/// absence signal when no attempt succeeds.
#[derive(thiserror::Error, Debug)]
pub enum CallError {
    /// The backend answered with a non-success status code.
    #[error("call failed with status code: {0}")]
    Status(u16),

    /// Connection, timeout or other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("invalid payload: {0}")]
    Decode(String),

    /// The attempt's cancellation token fired before it completed.
    #[error("call cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            CallError::Status(status.as_u16())
        } else if err.is_decode() {
            CallError::Decode(err.to_string())
        } else {
            CallError::Transport(err.to_string())
        }
    }
}

/// Failures that stop a server process from starting or keep it from serving.
#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("server i/o: {0}")]
    Io(#[from] std::io::Error),
}
