//! CLI subcommand implementations for push-lifecycle.
//!
//! Commands are organized into submodules by domain:
//!
//! - [`authority`] - operator calls against the authority (status, sends, stats)
//! - [`device`] - device id inspection and reset
//! - [`simulate`] - full engine run against the in-memory runtimes
//!
//! # Usage
//!
//! ```ignore
//! use push_lifecycle::commands;
//!
//! commands::authority::status(&config).await?;
//! commands::device::show()?;
//! ```

pub mod authority;
pub mod device;
pub mod simulate;

/// Version string reported by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
