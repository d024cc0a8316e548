//! push-lifecycle CLI - operator tool for the push subscription engine.
//!
//! This is the main binary entry point. See the `push_lifecycle` library
//! for the core functionality.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use push_lifecycle::commands::{self, authority::Message, simulate::SimulateOptions, VERSION};
use push_lifecycle::storage::FileStore;
use push_lifecycle::Config;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "push-lifecycle")]
#[command(version = VERSION)]
#[command(about = "Push notification subscription lifecycle tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the authority's subscription status for this token
    Status,
    /// Fetch and validate the VAPID public key
    VapidKey,
    /// Show aggregate subscription counts
    Stats,
    /// Send a test notification to yourself
    Test,
    /// Send a notification to one user
    SendUser {
        /// Target user id
        user_id: String,
        #[command(flatten)]
        message: MessageArgs,
    },
    /// Send a notification to every user with a role
    SendRole {
        /// Target role
        role: String,
        #[command(flatten)]
        message: MessageArgs,
    },
    /// Send a notification to everyone
    Broadcast {
        #[command(flatten)]
        message: MessageArgs,
    },
    /// Show this machine's device id and fingerprint
    DeviceId {
        /// Forget the stored id and derive a new one
        #[arg(long)]
        reset: bool,
    },
    /// Run initialize, subscribe, health check and heartbeat once
    Simulate {
        /// Answer the permission prompt with "denied"
        #[arg(long)]
        deny: bool,
        /// Unsubscribe again before exiting
        #[arg(long)]
        unsubscribe: bool,
    },
}

#[derive(clap::Args)]
struct MessageArgs {
    /// Notification title
    #[arg(long)]
    title: String,
    /// Notification body
    #[arg(long)]
    body: String,
    /// JSON payload delivered with the notification
    #[arg(long)]
    data: Option<String>,
}

impl From<MessageArgs> for Message {
    fn from(args: MessageArgs) -> Self {
        Self {
            title: args.title,
            body: args.body,
            data: args.data,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    if let Commands::DeviceId { reset } = cli.command {
        return if reset {
            commands::device::reset()
        } else {
            commands::device::show()
        };
    }

    let mut config = Config::load()?;
    config.resolve_token(&FileStore::in_config_dir()?);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Status => commands::authority::status(&config).await,
            Commands::VapidKey => commands::authority::vapid_key(&config).await,
            Commands::Stats => commands::authority::stats(&config).await,
            Commands::Test => commands::authority::send_test(&config).await,
            Commands::SendUser { user_id, message } => {
                commands::authority::send_to_user(&config, &user_id, &message.into()).await
            }
            Commands::SendRole { role, message } => {
                commands::authority::send_to_role(&config, &role, &message.into()).await
            }
            Commands::Broadcast { message } => {
                commands::authority::broadcast(&config, &message.into()).await
            }
            Commands::Simulate { deny, unsubscribe } => {
                commands::simulate::run(config, SimulateOptions { deny, unsubscribe }).await
            }
            Commands::DeviceId { .. } => Ok(()),
        }
    })
}
