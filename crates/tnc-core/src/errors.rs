/// Signals raised by the platform transport.
///
/// Adapters map their library errors into this type so the auth flow and the
/// prober can react to the distinguishable cases (two-factor prompt, flood
/// limit, remote logout) without knowing which client library is underneath.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("the platform no longer recognizes this session as logged in")]
    Unauthorized,

    #[error("two-factor password required")]
    PasswordRequired,

    #[error("invalid phone number")]
    InvalidPhoneNumber,

    #[error("flood limit hit, wait {seconds}s")]
    FloodWait { seconds: u32 },

    #[error("transport error: {0}")]
    Other(String),
}

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the service
/// can handle failures consistently (user-facing message vs retryable).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("no active sessions available")]
    NoSessionsAvailable,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
