use thiserror::Error;

/// Classified outcome of a failed call to a Steam endpoint.
///
/// Expected API-level failures never panic; they come back as one of these
/// so the reconciler can decide between retrying, skipping and aborting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by Steam")]
    RateLimited,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl FetchError {
    /// Whether waiting and asking again could produce a different answer.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no Steam API key found (use --api-key, STEAM_API_KEY or the config file)")]
    CredentialMissing,

    #[error("app {0} is not in the cache; run the full library refresh first")]
    NotCached(u32),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file {path} is unreadable: {reason}")]
    CacheFormat { path: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid Steam ID {0:?}: expected 17 digits")]
    InvalidSteamId(String),

    #[error("interrupted; progress so far has been saved")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_and_transient_failures_retry() {
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::Transient("timeout".into()).is_retryable());
        assert!(!FetchError::NotFound("440".into()).is_retryable());
        assert!(!FetchError::Unauthorized("bad key".into()).is_retryable());
    }

    #[test]
    fn fetch_errors_convert_into_app_errors() {
        let err: AppError = FetchError::RateLimited.into();
        assert!(matches!(err, AppError::Fetch(FetchError::RateLimited)));
        assert_eq!(err.to_string(), "rate limited by Steam");
    }
}
