//! Run the whole engine once against the configured authority.
//!
//! Browser runtimes are replaced by the scripted in-memory ones, so this
//! exercises the authority contract end to end: status, VAPID key,
//! registration, heartbeat and (optionally) unsubscribe.

use anyhow::Result;
use std::sync::Arc;

use super::print_json;
use crate::config::Config;
use crate::platform::memory::{MemoryPushPlatform, MemorySdkRuntime};
use crate::platform::Permission;
use crate::service::PushService;
use crate::storage::FileStore;

/// Options for [`run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulateOptions {
    /// Answer the permission prompt with "denied".
    pub deny: bool,
    /// Unsubscribe again before exiting.
    pub unsubscribe: bool,
}

/// Initialize, subscribe, check health, beat once and print the status.
pub async fn run(config: Config, options: SimulateOptions) -> Result<()> {
    let answer = if options.deny {
        Permission::Denied
    } else {
        Permission::Granted
    };
    let platform = Arc::new(MemoryPushPlatform::new());
    platform.set_prompt_answer(answer);
    let sdk = Arc::new(MemorySdkRuntime::new());
    sdk.set_prompt_answer(answer);

    let service = PushService::builder()
        .config(config)
        .store(Arc::new(FileStore::in_config_dir()?))
        .push_platform(platform)
        .sdk_runtime(sdk)
        .build()?;

    println!("Device: {}", service.device_id());
    let usable = service.initialize().await?;
    println!("Initialized (providers usable: {usable})");

    let outcome = service.subscribe().await;
    println!("{}", outcome.summary());
    print_json(&outcome)?;

    let health = service.monitor().check_liveness().await;
    match &health.reason {
        Some(reason) => println!("Health: unhealthy ({reason})"),
        None => println!("Health: healthy"),
    }
    let beat = service.monitor().heartbeat().await;
    println!("Heartbeat acknowledged: {beat}");

    if options.unsubscribe {
        println!("{}", service.unsubscribe().await.summary());
    }

    print_json(&service.subscription_status())?;
    service.dispose();
    Ok(())
}
