//! Device id inspection.

use anyhow::Result;
use std::sync::Arc;

use super::print_json;
use crate::device::{DeviceRegistry, NativeFingerprint};
use crate::storage::FileStore;

fn registry() -> Result<DeviceRegistry> {
    let store = FileStore::in_config_dir()?;
    Ok(DeviceRegistry::new(Arc::new(store), Box::new(NativeFingerprint)))
}

/// Print the device id (creating it on first use) and the fingerprint.
pub fn show() -> Result<()> {
    print_json(&registry()?.identity())
}

/// Forget the stored device id; the next run derives a new one.
pub fn reset() -> Result<()> {
    let registry = registry()?;
    registry.forget();
    println!("Device id cleared. New id: {}", registry.get_device_id());
    Ok(())
}
