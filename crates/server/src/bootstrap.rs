use claimdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use claimdesk_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::executor::{ActionExecutor, Repositories};
use crate::outbox::{mailer_from_config, MailError, OutboxDispatcher};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub executor: ActionExecutor,
    pub dispatcher: OutboxDispatcher,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("email delivery setup failed: {0}")]
    Mailer(#[from] MailError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repos = Repositories::sql(db_pool.clone());
    let mailer = mailer_from_config(&config.email)?;
    info!(
        event_name = "system.bootstrap.mailer_ready",
        correlation_id = "bootstrap",
        email_enabled = config.email.enabled,
        "email delivery configured"
    );

    Ok(Application {
        dispatcher: OutboxDispatcher::new(
            repos.outbox.clone(),
            mailer,
            config.workflow.outbox_max_attempts,
        ),
        executor: ActionExecutor::new(repos, config.workflow.sla_days),
        db_pool,
        config,
    })
}
