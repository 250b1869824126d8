use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::startup;

#[derive(Parser)]
#[command(name = "pesa-goals")]
#[command(about = "Pesa Goals - mobile-money savings goal reconciliation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,

    /// Expire stale pending payment requests once and exit
    Sweep,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let Some(database_url) = &config.database_url else {
        anyhow::bail!("DATABASE_URL is not set; nothing to migrate");
    };

    let pool = startup::create_pool(database_url).await?;
    tracing::info!("Running database migrations...");
    startup::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!(
        "  Database URL: {}",
        config
            .database_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(in-memory)".to_string())
    );
    println!("  Base URL: {}", config.base_url);
    println!("  M-Pesa API URL: {}", config.mpesa_api_url);
    println!("  Short Code: {}", config.mpesa_short_code);
    println!("  Collaborator Timeout: {} ms", config.collaborator_timeout_ms);
    println!("  Payment Request TTL: {} s", config.payment_request_ttl_secs);

    let report = startup::validate_environment(config).await;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }

    println!("✓ Configuration is valid");
    Ok(())
}

pub async fn handle_sweep(config: &Config) -> anyhow::Result<()> {
    if config.database_url.is_none() {
        tracing::warn!("DATABASE_URL not set; an in-memory store has nothing to expire");
    }

    let state = startup::build_state(config).await?;
    let expired =
        crate::services::expiry::sweep_once(&state.tracker, config.payment_request_ttl()).await?;
    println!("✓ Expired {} payment request(s)", expired);

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
