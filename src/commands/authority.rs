//! Operator commands against the authority service.
//!
//! Each command builds an [`AuthorityClient`] from the configuration, makes
//! one call and prints the JSON result to stdout.

use anyhow::{Context, Result};

use super::print_json;
use crate::authority::{Authority, AuthorityClient, NotificationRequest};
use crate::config::Config;
use crate::provider::vapid::decode_application_server_key;

/// Notification content shared by the send commands.
#[derive(Debug, Clone)]
pub struct Message {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Raw JSON payload, `{}` when absent.
    pub data: Option<String>,
}

impl Message {
    fn request(&self) -> Result<NotificationRequest> {
        let data = match &self.data {
            Some(raw) => serde_json::from_str(raw).context("--data must be valid JSON")?,
            None => serde_json::json!({}),
        };
        Ok(NotificationRequest::new(&self.title, &self.body, data))
    }
}

fn client(config: &Config) -> Result<AuthorityClient> {
    if !config.has_token() {
        log::warn!("No bearer token configured; set PUSH_AUTHORITY_TOKEN");
    }
    AuthorityClient::from_config(config).context("Failed to create authority client")
}

/// Print the authority's subscription status for the configured token.
pub async fn status(config: &Config) -> Result<()> {
    let status = client(config)?.subscription_status().await?;
    print_json(&status)
}

/// Fetch, validate and print the VAPID public key.
pub async fn vapid_key(config: &Config) -> Result<()> {
    let key = client(config)?.vapid_public_key().await?;
    let bytes = decode_application_server_key(&key)?;
    println!("{key}");
    println!("valid P-256 point ({} bytes)", bytes.len());
    Ok(())
}

/// Print aggregate subscription counts.
pub async fn stats(config: &Config) -> Result<()> {
    let stats = client(config)?.stats().await?;
    print_json(&stats)
}

/// Send a test notification to the current user.
pub async fn send_test(config: &Config) -> Result<()> {
    let report = client(config)?.send_test().await?;
    print_json(&report)
}

/// Send a notification to one user.
pub async fn send_to_user(config: &Config, user_id: &str, message: &Message) -> Result<()> {
    let mut request = message.request()?;
    request.user_id = Some(user_id.to_string());
    let report = client(config)?.send_to_user(&request).await?;
    print_json(&report)
}

/// Send a notification to every holder of a role.
pub async fn send_to_role(config: &Config, role: &str, message: &Message) -> Result<()> {
    let mut request = message.request()?;
    request.role = Some(role.to_string());
    let report = client(config)?.send_to_role(&request).await?;
    print_json(&report)
}

/// Send a notification to everyone.
pub async fn broadcast(config: &Config, message: &Message) -> Result<()> {
    let request = message.request()?;
    let report = client(config)?.broadcast(&request).await?;
    print_json(&report)
}
