//! Scripted in-process push runtimes.
//!
//! [`MemoryPushPlatform`] and [`MemorySdkRuntime`] behave like a browser that
//! answers every prompt the way it was told to. They count calls so tests can
//! assert on side effects (script loads, worker registrations, prompts), and
//! expose knobs for failure injection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::lock;

use super::{
    Permission, PlatformCapabilities, PlatformError, PushPlatform, PushSubscription,
    SdkCapabilities, SdkRuntime, SubscriptionKeys, WorkerRegistration, WorkerState,
};

/// In-memory raw Web Push runtime.
#[derive(Debug)]
pub struct MemoryPushPlatform {
    capabilities: Mutex<PlatformCapabilities>,
    permission: Mutex<Permission>,
    prompt_answer: Mutex<Permission>,
    registration: Mutex<Option<WorkerRegistration>>,
    new_worker_state: Mutex<WorkerState>,
    subscription: Mutex<Option<PushSubscription>>,
    new_subscription_expiry: Mutex<Option<DateTime<Utc>>>,
    subscribe_gate: Mutex<Option<Arc<Notify>>>,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
    fail_registration: AtomicBool,
    register_calls: AtomicUsize,
    permission_requests: AtomicUsize,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    endpoint_counter: AtomicUsize,
}

impl Default for MemoryPushPlatform {
    fn default() -> Self {
        Self {
            capabilities: Mutex::new(PlatformCapabilities::full()),
            permission: Mutex::new(Permission::Default),
            prompt_answer: Mutex::new(Permission::Granted),
            registration: Mutex::new(None),
            new_worker_state: Mutex::new(WorkerState::Active),
            subscription: Mutex::new(None),
            new_subscription_expiry: Mutex::new(None),
            subscribe_gate: Mutex::new(None),
            fail_subscribe: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            fail_registration: AtomicBool::new(false),
            register_calls: AtomicUsize::new(0),
            permission_requests: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            endpoint_counter: AtomicUsize::new(0),
        }
    }
}

impl MemoryPushPlatform {
    /// A fully capable platform whose prompt answers "granted".
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform without service worker or push support.
    pub fn unsupported() -> Self {
        let platform = Self::default();
        platform.set_capabilities(PlatformCapabilities::default());
        platform
    }

    /// Replace the capability set.
    pub fn set_capabilities(&self, capabilities: PlatformCapabilities) {
        *lock(&self.capabilities) = capabilities;
    }

    /// Set the current permission without prompting.
    pub fn set_permission(&self, permission: Permission) {
        *lock(&self.permission) = permission;
    }

    /// Choose how the next prompts are answered.
    pub fn set_prompt_answer(&self, answer: Permission) {
        *lock(&self.prompt_answer) = answer;
    }

    /// State given to newly registered workers.
    pub fn set_new_worker_state(&self, state: WorkerState) {
        *lock(&self.new_worker_state) = state;
    }

    /// Overwrite the current registration (or remove it with `None`).
    pub fn set_registration(&self, registration: Option<WorkerRegistration>) {
        *lock(&self.registration) = registration;
    }

    /// Overwrite the current subscription (or remove it with `None`).
    pub fn set_subscription(&self, subscription: Option<PushSubscription>) {
        *lock(&self.subscription) = subscription;
    }

    /// Expiration stamped on newly created subscriptions.
    pub fn set_new_subscription_expiry(&self, expiry: Option<DateTime<Utc>>) {
        *lock(&self.new_subscription_expiry) = expiry;
    }

    /// Make `subscribe` fail until reset.
    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make `unsubscribe` fail until reset.
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    /// Make `register_service_worker` fail until reset.
    pub fn fail_registration(&self, fail: bool) {
        self.fail_registration.store(fail, Ordering::SeqCst);
    }

    /// Hold every `subscribe` call until the returned gate is notified.
    pub fn hold_subscribe(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.subscribe_gate) = Some(Arc::clone(&gate));
        gate
    }

    /// Stop holding `subscribe` calls.
    pub fn release_subscribe(&self) {
        if let Some(gate) = lock(&self.subscribe_gate).take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    /// Number of worker registrations performed.
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    /// Number of permission prompts shown.
    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    /// Number of `subscribe` calls received.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of `unsubscribe` calls received.
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// Current subscription without going through the trait.
    pub fn current_subscription(&self) -> Option<PushSubscription> {
        lock(&self.subscription).clone()
    }
}

#[async_trait]
impl PushPlatform for MemoryPushPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        *lock(&self.capabilities)
    }

    fn permission(&self) -> Permission {
        *lock(&self.permission)
    }

    async fn request_permission(&self) -> Result<Permission, PlatformError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let current = *lock(&self.permission);
        // Browsers never re-prompt once the user decided.
        if current != Permission::Default {
            return Ok(current);
        }
        let answer = *lock(&self.prompt_answer);
        *lock(&self.permission) = answer;
        Ok(answer)
    }

    async fn register_service_worker(
        &self,
        script_url: &str,
        scope: &str,
    ) -> Result<WorkerRegistration, PlatformError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if !self.capabilities().service_worker {
            return Err(PlatformError::Unsupported("serviceWorker".to_string()));
        }
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(PlatformError::Runtime("service worker registration failed".to_string()));
        }
        let registration = WorkerRegistration {
            scope: scope.to_string(),
            script_url: script_url.to_string(),
            state: *lock(&self.new_worker_state),
        };
        *lock(&self.registration) = Some(registration.clone());
        Ok(registration)
    }

    async fn registration(&self) -> Result<Option<WorkerRegistration>, PlatformError> {
        Ok(lock(&self.registration).clone())
    }

    async fn subscription(&self) -> Result<Option<PushSubscription>, PlatformError> {
        Ok(lock(&self.subscription).clone())
    }

    async fn subscribe(
        &self,
        application_server_key: &[u8],
    ) -> Result<PushSubscription, PlatformError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let gate = lock(&self.subscribe_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(PlatformError::Runtime("push service unavailable".to_string()));
        }
        if !self.permission().is_granted() {
            return Err(PlatformError::PermissionDenied);
        }
        if application_server_key.is_empty() {
            return Err(PlatformError::Runtime("missing applicationServerKey".to_string()));
        }
        if lock(&self.registration).is_none() {
            return Err(PlatformError::Runtime("no active service worker".to_string()));
        }

        let n = self.endpoint_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let subscription = PushSubscription {
            endpoint: format!("https://push.example.invalid/send/{n}"),
            expiration_time: *lock(&self.new_subscription_expiry),
            keys: SubscriptionKeys {
                p256dh: format!("p256dh-{n}"),
                auth: format!("auth-{n}"),
            },
        };
        *lock(&self.subscription) = Some(subscription.clone());
        Ok(subscription)
    }

    async fn unsubscribe(&self) -> Result<bool, PlatformError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(PlatformError::Runtime("unsubscribe rejected".to_string()));
        }
        Ok(lock(&self.subscription).take().is_some())
    }
}

/// In-memory third-party SDK runtime.
#[derive(Debug)]
pub struct MemorySdkRuntime {
    capabilities: Mutex<PlatformCapabilities>,
    available: Arc<AtomicBool>,
    load_delay: Mutex<Option<Duration>>,
    inject_fails: AtomicBool,
    probe: Mutex<Option<SdkCapabilities>>,
    fail_init: AtomicBool,
    permission: Mutex<Permission>,
    prompt_answer: Mutex<Permission>,
    opted_in: AtomicBool,
    subscription_id: Mutex<Option<String>>,
    fail_opt_in: AtomicBool,
    fail_opt_out: AtomicBool,
    script_loads: AtomicUsize,
    init_calls: AtomicUsize,
    permission_requests: AtomicUsize,
    opt_in_calls: AtomicUsize,
}

impl Default for MemorySdkRuntime {
    fn default() -> Self {
        Self {
            capabilities: Mutex::new(PlatformCapabilities::full()),
            available: Arc::new(AtomicBool::new(false)),
            load_delay: Mutex::new(None),
            inject_fails: AtomicBool::new(false),
            probe: Mutex::new(Some(SdkCapabilities {
                version: "160000".to_string(),
                push_subscription_api: true,
                permission_api: true,
            })),
            fail_init: AtomicBool::new(false),
            permission: Mutex::new(Permission::Default),
            prompt_answer: Mutex::new(Permission::Granted),
            opted_in: AtomicBool::new(false),
            subscription_id: Mutex::new(None),
            fail_opt_in: AtomicBool::new(false),
            fail_opt_out: AtomicBool::new(false),
            script_loads: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            permission_requests: AtomicUsize::new(0),
            opt_in_calls: AtomicUsize::new(0),
        }
    }
}

impl MemorySdkRuntime {
    /// A capable SDK whose prompt answers "granted".
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the capability set.
    pub fn set_capabilities(&self, capabilities: PlatformCapabilities) {
        *lock(&self.capabilities) = capabilities;
    }

    /// Delay between script injection and the global appearing.
    pub fn set_load_delay(&self, delay: Duration) {
        *lock(&self.load_delay) = Some(delay);
    }

    /// Make script injection fail until reset.
    pub fn fail_inject(&self, fail: bool) {
        self.inject_fails.store(fail, Ordering::SeqCst);
    }

    /// Replace the version probe result.
    pub fn set_probe(&self, probe: Option<SdkCapabilities>) {
        *lock(&self.probe) = probe;
    }

    /// Make `init` fail until reset.
    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    /// Set the current permission without prompting.
    pub fn set_permission(&self, permission: Permission) {
        *lock(&self.permission) = permission;
    }

    /// Choose how the next prompts are answered.
    pub fn set_prompt_answer(&self, answer: Permission) {
        *lock(&self.prompt_answer) = answer;
    }

    /// Make `opt_in` fail until reset.
    pub fn fail_opt_in(&self, fail: bool) {
        self.fail_opt_in.store(fail, Ordering::SeqCst);
    }

    /// Make `opt_out` fail until reset.
    pub fn fail_opt_out(&self, fail: bool) {
        self.fail_opt_out.store(fail, Ordering::SeqCst);
    }

    /// Number of script injections.
    pub fn script_loads(&self) -> usize {
        self.script_loads.load(Ordering::SeqCst)
    }

    /// Number of `init` calls.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Number of permission prompts shown.
    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    /// Number of `opt_in` calls.
    pub fn opt_in_calls(&self) -> usize {
        self.opt_in_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SdkRuntime for MemorySdkRuntime {
    fn capabilities(&self) -> PlatformCapabilities {
        *lock(&self.capabilities)
    }

    async fn inject_script(&self, url: &str) -> Result<(), PlatformError> {
        self.script_loads.fetch_add(1, Ordering::SeqCst);
        if self.inject_fails.load(Ordering::SeqCst) {
            return Err(PlatformError::Runtime(format!("failed to load {url}")));
        }

        let delay = *lock(&self.load_delay);
        match delay {
            Some(delay) if !delay.is_zero() => {
                let available = Arc::clone(&self.available);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    available.store(true, Ordering::SeqCst);
                });
            }
            _ => self.available.store(true, Ordering::SeqCst),
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn probe(&self) -> Option<SdkCapabilities> {
        if !self.is_available() {
            return None;
        }
        lock(&self.probe).clone()
    }

    async fn init(&self, app_id: &str) -> Result<(), PlatformError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(PlatformError::Runtime(format!("init rejected app id {app_id}")));
        }
        Ok(())
    }

    fn permission(&self) -> Permission {
        *lock(&self.permission)
    }

    async fn request_permission(&self) -> Result<Permission, PlatformError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let current = *lock(&self.permission);
        if current != Permission::Default {
            return Ok(current);
        }
        let answer = *lock(&self.prompt_answer);
        *lock(&self.permission) = answer;
        Ok(answer)
    }

    async fn opt_in(&self) -> Result<(), PlatformError> {
        self.opt_in_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_opt_in.load(Ordering::SeqCst) {
            return Err(PlatformError::Runtime("opt-in failed".to_string()));
        }
        if !self.permission().is_granted() {
            return Err(PlatformError::PermissionDenied);
        }
        self.opted_in.store(true, Ordering::SeqCst);
        let mut id = lock(&self.subscription_id);
        if id.is_none() {
            *id = Some(uuid::Uuid::new_v4().to_string());
        }
        Ok(())
    }

    async fn opt_out(&self) -> Result<(), PlatformError> {
        if self.fail_opt_out.load(Ordering::SeqCst) {
            return Err(PlatformError::Runtime("opt-out failed".to_string()));
        }
        self.opted_in.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscription_id(&self) -> Option<String> {
        lock(&self.subscription_id).clone()
    }

    fn opted_in(&self) -> bool {
        self.opted_in.load(Ordering::SeqCst)
    }
}
