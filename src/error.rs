//! Errors surfaced by the [`crate::service::PushService`] facade.
//!
//! Permission denial is never an error; it is a `false` outcome. Background
//! paths (health, heartbeat, recovery) log instead of returning errors.

use crate::authority::AuthorityError;
use crate::platform::PlatformError;

/// Errors from user-initiated facade calls.
#[derive(Debug)]
pub enum PushError {
    /// Neither provider can run on this platform. Permanent for the session.
    UnsupportedPlatform,
    /// Authority call failed.
    Authority(AuthorityError),
    /// A push runtime failed.
    Provider(PlatformError),
    /// The service could not be assembled.
    Config(String),
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedPlatform => write!(f, "Push notifications are not supported here"),
            Self::Authority(e) => write!(f, "{e}"),
            Self::Provider(e) => write!(f, "Push runtime error: {e}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Authority(e) => Some(e),
            Self::Provider(e) => Some(e),
            Self::UnsupportedPlatform | Self::Config(_) => None,
        }
    }
}

impl From<AuthorityError> for PushError {
    fn from(e: AuthorityError) -> Self {
        Self::Authority(e)
    }
}

impl From<PlatformError> for PushError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::Unsupported(_) => Self::UnsupportedPlatform,
            other => Self::Provider(other),
        }
    }
}

impl From<anyhow::Error> for PushError {
    fn from(e: anyhow::Error) -> Self {
        Self::Config(format!("{e:#}"))
    }
}
