//! Service assembly and start-up checks.

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::{InMemoryLedger, InMemoryPaymentRequests, PostgresStore};
use crate::ai::{DisabledCollaborator, HttpTextCollaborator};
use crate::config::Config;
use crate::mpesa::MpesaClient;
use crate::ports::TextCollaborator;
use crate::{AppState, Collaborators};

const MAX_DB_CONNECTIONS: u32 = 5;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(MAX_DB_CONNECTIONS)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

pub fn collaborators(config: &Config) -> Collaborators {
    let timeout = config.collaborator_timeout();
    Collaborators {
        gateway: Arc::new(MpesaClient::new(
            config.mpesa_api_url.clone(),
            config.mpesa_short_code.clone(),
            timeout,
        )),
        classifier: text_collaborator(config.classifier_url.as_deref(), config),
        text_generator: text_collaborator(config.text_generator_url.as_deref(), config),
        timeout,
    }
}

fn text_collaborator(url: Option<&str>, config: &Config) -> Arc<dyn TextCollaborator> {
    match url {
        Some(url) => Arc::new(HttpTextCollaborator::new(url.to_string(), config.collaborator_timeout())),
        None => Arc::new(DisabledCollaborator),
    }
}

/// Wires services onto Postgres when `DATABASE_URL` is set, otherwise onto
/// the in-memory store. Migrations run before the state is returned.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let collaborators = collaborators(config);

    match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url)
                .await
                .context("Failed to connect to database")?;
            run_migrations(&pool).await?;
            let store = Arc::new(PostgresStore::new(pool));
            tracing::info!("Using Postgres store");
            Ok(AppState::new(store.clone(), store, collaborators, config.base_url.clone()))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            Ok(AppState::new(
                Arc::new(InMemoryPaymentRequests::new()),
                Arc::new(InMemoryLedger::new()),
                collaborators,
                config.base_url.clone(),
            ))
        }
    }
}

pub struct ValidationReport {
    pub environment: bool,
    /// `None` when no database is configured.
    pub database: Option<bool>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database.unwrap_or(true)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(Some(self.environment)));
        println!("Database Connectivity: {}", status(self.database));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: Option<bool>) -> &'static str {
    match ok {
        Some(true) => "✅ OK",
        Some(false) => "❌ FAIL",
        None => "➖ in-memory",
    }
}

pub async fn validate_environment(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: None,
        errors: Vec::new(),
    };

    if let Err(e) = config.validate() {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if let Some(database_url) = &config.database_url {
        match validate_database(database_url).await {
            Ok(()) => report.database = Some(true),
            Err(e) => {
                report.database = Some(false);
                report.errors.push(format!("Database: {:#}", e));
            }
        }
    }

    report
}

async fn validate_database(database_url: &str) -> Result<()> {
    let pool = create_pool(database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .context("Failed to query database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(&pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}
