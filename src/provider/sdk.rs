//! Third-party push SDK adapter.
//!
//! The SDK runtime is fetched from an external script. Loading goes through
//! [`ExternalRuntimeLoader`] so concurrent initializers share one injection.
//! After loading, the SDK's version probe yields an [`SdkCapabilities`]
//! descriptor that is cached and consulted by every later call.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::loader::{load_sdk_script, ExternalRuntimeLoader};
use super::{ProviderKind, ProviderState, PushProvider, SubscriptionHandle};
use crate::constants;
use crate::lock;
use crate::platform::{Permission, SdkCapabilities, SdkRuntime};

/// Adapter over an [`SdkRuntime`].
pub struct SdkProvider {
    runtime: Arc<dyn SdkRuntime>,
    loader: ExternalRuntimeLoader,
    app_id: String,
    script_url: String,
    load_poll: Duration,
    load_timeout: Duration,
    capabilities: Mutex<Option<SdkCapabilities>>,
    state: Mutex<ProviderState>,
    init_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SdkProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkProvider")
            .field("app_id", &self.app_id)
            .field("script_url", &self.script_url)
            .field("loader", &self.loader.state())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SdkProvider {
    /// Create an adapter. An empty `app_id` means the SDK is not configured
    /// for this deployment and the provider never initializes.
    pub fn new(runtime: Arc<dyn SdkRuntime>, app_id: &str, script_url: &str) -> Self {
        Self {
            runtime,
            loader: ExternalRuntimeLoader::new(),
            app_id: app_id.trim().to_string(),
            script_url: script_url.to_string(),
            load_poll: constants::SDK_AVAILABILITY_POLL,
            load_timeout: constants::SDK_LOAD_TIMEOUT,
            capabilities: Mutex::new(None),
            state: Mutex::new(ProviderState::pending()),
            init_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Override how the script load waits for the SDK global.
    #[must_use]
    pub fn with_load_timing(mut self, poll: Duration, timeout: Duration) -> Self {
        self.load_poll = poll;
        self.load_timeout = timeout;
        self
    }

    /// Cached capability descriptor, once probed.
    pub fn capabilities(&self) -> Option<SdkCapabilities> {
        lock(&self.capabilities).clone()
    }

    /// Whether an app id is configured.
    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty()
    }

    fn mark_unsupported(&self) {
        let mut state = lock(&self.state);
        if state.supported {
            log::warn!("[Sdk] Platform lacks service worker/push support; provider disabled");
        }
        state.supported = false;
        state.initialized = false;
        state.clear_subscription();
    }

    fn probe_ok(&self) -> bool {
        self.runtime.probe().is_some()
    }

    fn sync_from_runtime(&self) -> ProviderState {
        let permission = self.runtime.permission();
        let handle = self
            .runtime
            .subscription_id()
            .filter(|_| self.runtime.opted_in())
            .map(|subscription_id| SubscriptionHandle::Sdk { subscription_id });

        let mut state = lock(&self.state);
        state.permission = permission;
        state.subscribed = handle.is_some();
        state.handle = handle;
        state.clone()
    }

    async fn boot(&self) -> bool {
        let runtime = Arc::clone(&self.runtime);
        let url = self.script_url.clone();
        let (poll, timeout) = (self.load_poll, self.load_timeout);
        let loaded = self
            .loader
            .ensure_ready(|| async move {
                load_sdk_script(runtime.as_ref(), &url, poll, timeout).await
            })
            .await;
        if let Err(e) = loaded {
            log::warn!("[Sdk] Runtime failed to load: {e}");
            return false;
        }

        let _gate = self.init_gate.lock().await;
        if lock(&self.state).initialized && self.probe_ok() {
            return true;
        }

        let Some(capabilities) = self.runtime.probe() else {
            log::warn!("[Sdk] Runtime present but version probe failed");
            self.loader.reset();
            return false;
        };
        log::debug!(
            "[Sdk] Detected version {} (push api: {}, permission api: {})",
            capabilities.version,
            capabilities.push_subscription_api,
            capabilities.permission_api
        );
        *lock(&self.capabilities) = Some(capabilities);

        if let Err(e) = self.runtime.init(&self.app_id).await {
            log::warn!("[Sdk] Init failed: {e}");
            return false;
        }

        lock(&self.state).initialized = true;
        let state = self.sync_from_runtime();
        log::info!(
            "[Sdk] Initialized (permission={}, subscribed={})",
            state.permission,
            state.subscribed
        );
        true
    }

    async fn ensure_permission(&self, capabilities: &SdkCapabilities) -> bool {
        match self.runtime.permission() {
            Permission::Granted => true,
            Permission::Denied => {
                log::info!("[Sdk] Notifications blocked by user");
                false
            }
            // Without a permission API the SDK prompts as part of opt-in.
            Permission::Default if !capabilities.permission_api => true,
            Permission::Default => match self.runtime.request_permission().await {
                Ok(Permission::Granted) => true,
                Ok(answer) => {
                    log::info!("[Sdk] Permission prompt answered {answer}");
                    lock(&self.state).permission = answer;
                    false
                }
                Err(e) => {
                    log::warn!("[Sdk] Permission request failed: {e}");
                    false
                }
            },
        }
    }
}

#[async_trait]
impl PushProvider for SdkProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sdk
    }

    async fn initialize(&self) -> bool {
        if !lock(&self.state).supported {
            return false;
        }
        if !self.runtime.capabilities().supports_push() {
            self.mark_unsupported();
            return false;
        }
        if !self.is_configured() {
            log::debug!("[Sdk] No app id configured; provider inactive");
            return false;
        }
        if lock(&self.state).initialized && self.probe_ok() {
            return true;
        }
        self.boot().await
    }

    fn permission_state(&self) -> Permission {
        if lock(&self.state).initialized {
            self.runtime.permission()
        } else {
            lock(&self.state).permission
        }
    }

    async fn subscribe(&self) -> bool {
        if !self.initialize().await {
            return false;
        }
        let Some(capabilities) = self.capabilities() else {
            return false;
        };
        if !capabilities.push_subscription_api {
            log::warn!("[Sdk] Version {} has no push subscription API", capabilities.version);
            return false;
        }

        if self.runtime.permission().is_granted() && self.runtime.opted_in() {
            return self.sync_from_runtime().subscribed;
        }

        if !self.ensure_permission(&capabilities).await {
            return false;
        }

        if let Err(e) = self.runtime.opt_in().await {
            log::warn!("[Sdk] Opt-in failed: {e}");
            self.sync_from_runtime();
            return false;
        }

        let state = self.sync_from_runtime();
        if !state.subscribed {
            log::warn!("[Sdk] Opted in but no subscription id was assigned");
        }
        state.subscribed
    }

    async fn unsubscribe(&self) -> bool {
        let initialized = lock(&self.state).initialized;
        let ok = if initialized {
            match self.runtime.opt_out().await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("[Sdk] Opt-out failed: {e}");
                    false
                }
            }
        } else {
            true
        };
        lock(&self.state).clear_subscription();
        ok
    }

    fn subscription_handle(&self) -> Option<SubscriptionHandle> {
        lock(&self.state).handle.clone()
    }

    fn state(&self) -> ProviderState {
        lock(&self.state).clone()
    }

    async fn refresh(&self) -> ProviderState {
        if !lock(&self.state).initialized {
            return self.state();
        }
        self.sync_from_runtime()
    }
}
