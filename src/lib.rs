//! Push Lifecycle - push-notification subscription engine.
//!
//! Coordinates two independent push delivery mechanisms (a third-party push
//! SDK and raw Web Push with VAPID) with local runtime state and a remote
//! authority service that holds the durable truth about subscriptions.
//!
//! # Architecture
//!
//! - **Device** - stable per-profile device id from a fingerprint
//! - **Providers** - one adapter per delivery mechanism behind [`provider::PushProvider`]
//! - **Registrar** - tells the authority about local subscriptions
//! - **Reconciler** - merges local caches with the authority (remote wins)
//! - **Health** - liveness checks and heartbeats on two timers
//! - **Recovery** - re-entrancy guarded repair after a failed check
//! - **Service** - session-scoped facade tying it together
//!
//! # Modules
//!
//! - [`service`] - [`PushService`] and its builder
//! - [`authority`] - authority REST client
//! - [`platform`] - browser/SDK runtime seams and in-memory runtimes
//! - [`config`] - configuration loading/saving

// Library modules
pub mod authority;
pub mod commands;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod health;
pub mod platform;
pub mod provider;
pub mod reconcile;
pub mod recovery;
pub mod registrar;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use authority::{Authority, AuthorityClient, AuthorityError};
pub use config::Config;
pub use device::DeviceRegistry;
pub use error::PushError;
pub use provider::{ProviderKind, PushProvider};
pub use reconcile::SubscriptionStatus;
pub use registrar::{SubscribeOutcome, UnsubscribeOutcome};
pub use service::{PushService, PushServiceBuilder};

/// Lock a std mutex, recovering the data if a holder panicked.
///
/// Guarded state here is plain data that stays consistent between
/// statements, so a poisoned lock is still safe to read.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
