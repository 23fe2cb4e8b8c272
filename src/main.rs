//! SocialCache maintenance binary
//!
//! Inspects and maintains the cache database configured through
//! `config/*.toml` and `SOCIALCACHE__*` environment variables. Every command
//! runs one pass on the worker and prints JSON to stdout.

use clap::{Parser, Subcommand};
use serde_json::json;
use socialcache::config::{AppConfig, LoggingConfig};
use socialcache::data::AccountId;
use socialcache::{ImagesCache, NotificationsCache, PassStatus};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "socialcache", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List an account's cached images, newest first
    Images { account: AccountId },
    /// List cached notifications, optionally for one account
    Notifications { account: Option<AccountId> },
    /// Remove an account's images (and their files) and notifications
    Purge { account: AccountId },
    /// Drop and recreate both cache tables
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = AppConfig::load()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);
    socialcache::metrics::init_metrics();
    tracing::debug!(
        database = %config.database.path.display(),
        command = ?cli.command,
        "Configuration loaded"
    );

    // 3. Run the command
    let output = match cli.command {
        Command::Images { account } => {
            let images = ImagesCache::open(&config).await?;
            images.query_images(account);
            images.wait().await;
            ensure_finished("images query", images.read_status())?;
            let rows = images.images();
            let output = json!({ "account": account, "images": rows.as_slice() });
            images.close().await?;
            output
        }
        Command::Notifications { account } => {
            let notifications = NotificationsCache::open(&config).await?;
            let rows = notifications.fetch_notifications(account).await?;
            notifications.close().await?;
            json!({ "account": account, "notifications": rows })
        }
        Command::Purge { account } => {
            let images = ImagesCache::open(&config).await?;
            let notifications = NotificationsCache::open(&config).await?;

            // Only key removals delete side-resource files, and group removals
            // run first within a pass, so the files go in a pass of their own.
            let urls = images.image_urls(account).await?;
            images.remove_images(urls.iter().cloned());
            images.commit();
            images.purge_account(account);
            images.commit();
            notifications.remove_notifications(account);
            notifications.sync();

            images.wait().await;
            notifications.wait().await;
            let output = json!({
                "account": account,
                "images_removed": urls.len(),
                "images": images.write_status(),
                "notifications": notifications.write_status(),
            });
            ensure_finished("image purge", images.write_status())?;
            ensure_finished("notification purge", notifications.write_status())?;

            images.close().await?;
            notifications.close().await?;
            output
        }
        Command::Reset => {
            let images = ImagesCache::open(&config).await?;
            let notifications = NotificationsCache::open(&config).await?;
            images.reset().await?;
            notifications.reset().await?;
            images.close().await?;
            notifications.close().await?;
            json!({ "reset": [config.images.table.table, config.notifications.table] })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    // Logs go to stderr so stdout stays valid JSON
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("socialcache={}", logging.level).into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

fn ensure_finished(what: &str, status: PassStatus) -> anyhow::Result<()> {
    if status == PassStatus::Finished {
        Ok(())
    } else {
        anyhow::bail!("{what} ended with status {}", status.as_str())
    }
}
