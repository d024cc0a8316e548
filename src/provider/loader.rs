//! Single-flight loader for an externally hosted runtime script.
//!
//! The SDK provider's runtime arrives via a `<script>` tag. Several callers
//! may try to initialize at once (page boot, a subscribe click, the health
//! monitor); all of them must converge on one injection.
//!
//! ```text
//! Unloaded ──ensure_ready──► Loading ──global appeared──► Ready
//!                              │
//!                              └──inject error / timeout──► Failed ──ensure_ready──► Loading
//! ```
//!
//! Callers that arrive while a load is in flight subscribe to the state
//! channel and wait for the outcome instead of injecting again.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::platform::{PlatformError, SdkRuntime};

/// Load state of the external runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing attempted yet.
    Unloaded,
    /// A load is in flight.
    Loading,
    /// The runtime is available.
    Ready,
    /// The last load failed; a later call may retry.
    Failed(String),
}

/// Coordinates loading of one external runtime.
#[derive(Debug)]
pub struct ExternalRuntimeLoader {
    state: watch::Sender<LoadState>,
}

impl Default for ExternalRuntimeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalRuntimeLoader {
    /// Create a loader in the `Unloaded` state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(LoadState::Unloaded);
        Self { state }
    }

    /// Current state.
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Ensure the runtime is loaded, running `load` at most once at a time.
    ///
    /// Exactly one caller transitions the loader to `Loading` and runs
    /// `load`; concurrent callers wait for that attempt's outcome.
    pub async fn ensure_ready<F, Fut>(&self, load: F) -> Result<(), PlatformError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), PlatformError>>,
    {
        let mut claimed = false;
        self.state.send_if_modified(|state| match state {
            LoadState::Unloaded | LoadState::Failed(_) => {
                *state = LoadState::Loading;
                claimed = true;
                true
            }
            LoadState::Loading | LoadState::Ready => false,
        });

        if claimed {
            // A dropped claimant must not leave waiters parked on `Loading`.
            let pending = scopeguard::guard(&self.state, |state| {
                log::warn!("[Sdk] Runtime load cancelled before it settled");
                state.send_replace(LoadState::Failed("load cancelled".to_string()));
            });
            let outcome = load().await;
            let state = scopeguard::ScopeGuard::into_inner(pending);
            let next = match &outcome {
                Ok(()) => LoadState::Ready,
                Err(e) => LoadState::Failed(e.to_string()),
            };
            state.send_replace(next);
            return outcome;
        }

        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|state| !matches!(state, LoadState::Loading))
            .await
            .map_err(|e| PlatformError::Runtime(format!("loader dropped: {e}")))?;
        match &*settled {
            LoadState::Ready => Ok(()),
            LoadState::Failed(msg) => Err(PlatformError::Runtime(msg.clone())),
            LoadState::Unloaded | LoadState::Loading => Err(PlatformError::Runtime(
                "runtime load did not settle".to_string(),
            )),
        }
    }

    /// Forget a `Ready` runtime so the next call loads it again.
    pub fn reset(&self) {
        self.state.send_replace(LoadState::Unloaded);
    }
}

/// Inject the SDK script (unless the global is already present) and wait for
/// the global to appear.
pub async fn load_sdk_script(
    runtime: &dyn SdkRuntime,
    url: &str,
    poll: Duration,
    timeout: Duration,
) -> Result<(), PlatformError> {
    if runtime.is_available() {
        log::debug!("[Sdk] Runtime already present, skipping script injection");
        return Ok(());
    }

    log::info!("[Sdk] Injecting runtime script {url}");
    runtime.inject_script(url).await?;

    let wait = async {
        while !runtime.is_available() {
            tokio::time::sleep(poll).await;
        }
    };
    tokio::time::timeout(timeout, wait).await.map_err(|_elapsed| {
        PlatformError::Runtime(format!(
            "runtime did not become available within {}ms",
            timeout.as_millis()
        ))
    })
}
