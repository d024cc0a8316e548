//! Authority service: the backend holding the durable truth about which
//! devices are subscribed.
//!
//! - [`Authority`] - the seam the engine depends on
//! - [`client::AuthorityClient`] - reqwest implementation over REST/JSON
//! - [`types`] - request/response bodies
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | GET | `/subscription-status` | remote truth for this device |
//! | POST | `/subscribe` | register a provider handle |
//! | POST | `/unsubscribe` | drop this device's subscriptions |
//! | POST | `/heartbeat` | refresh last-seen |
//! | GET | `/vapid/public-key` | application server key |
//! | POST | `/send-test`, `/send-to-user`, `/send-to-role`, `/broadcast` | delivery |
//! | GET | `/stats` | aggregate counts |

pub mod client;
pub mod types;

use async_trait::async_trait;

pub use client::AuthorityClient;
pub use types::{
    AckResponse, DeliveryReport, HeartbeatRequest, NotificationRequest, ProviderFlags, PushStats,
    SubscribeRequest, SubscriptionDetails, SubscriptionStatusResponse, UnsubscribeRequest,
    VapidKeyResponse,
};

/// Errors from authority calls.
#[derive(Debug)]
pub enum AuthorityError {
    /// Could not reach the authority.
    Transport(String),
    /// The request exceeded its timeout.
    Timeout,
    /// Non-2xx response.
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// 2xx with `success: false`.
    Rejected(String),
    /// Body did not match the expected shape.
    Decode(String),
}

impl AuthorityError {
    /// Whether a later retry may succeed.
    ///
    /// Every authority failure is treated as transient by the background
    /// paths; this distinguishes the ones worth retrying immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Rejected(_) | Self::Decode(_) => false,
        }
    }
}

impl std::fmt::Display for AuthorityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Authority unreachable: {msg}"),
            Self::Timeout => write!(f, "Authority request timed out"),
            Self::Status { status, body } if body.is_empty() => {
                write!(f, "Authority returned HTTP {status}")
            }
            Self::Status { status, body } => write!(f, "Authority returned HTTP {status}: {body}"),
            Self::Rejected(msg) => write!(f, "Authority rejected request: {msg}"),
            Self::Decode(msg) => write!(f, "Malformed authority response: {msg}"),
        }
    }
}

impl std::error::Error for AuthorityError {}

/// Operations offered by the authority service.
#[async_trait]
pub trait Authority: Send + Sync {
    /// `GET /subscription-status`.
    async fn subscription_status(&self) -> Result<SubscriptionStatusResponse, AuthorityError>;

    /// `POST /subscribe`.
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<AckResponse, AuthorityError>;

    /// `POST /unsubscribe`.
    async fn unsubscribe(&self, request: &UnsubscribeRequest)
        -> Result<AckResponse, AuthorityError>;

    /// `POST /heartbeat`.
    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<AckResponse, AuthorityError>;

    /// `GET /vapid/public-key`, returning the base64url key.
    async fn vapid_public_key(&self) -> Result<String, AuthorityError>;

    /// `POST /send-test` to the current user.
    async fn send_test(&self) -> Result<DeliveryReport, AuthorityError>;

    /// `POST /send-to-user`.
    async fn send_to_user(
        &self,
        request: &NotificationRequest,
    ) -> Result<DeliveryReport, AuthorityError>;

    /// `POST /send-to-role`.
    async fn send_to_role(
        &self,
        request: &NotificationRequest,
    ) -> Result<DeliveryReport, AuthorityError>;

    /// `POST /broadcast`.
    async fn broadcast(&self, request: &NotificationRequest)
        -> Result<DeliveryReport, AuthorityError>;

    /// `GET /stats`.
    async fn stats(&self) -> Result<PushStats, AuthorityError>;
}
