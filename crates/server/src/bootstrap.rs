use std::sync::Arc;

use mooai_agent::{AgentInvoker, ContextStore, LlmError, OpenAiResponsesClient};
use mooai_core::config::{AppConfig, ConfigError};
use mooai_db::{connect_with_settings, migrations, DbPool, SqlContinuationRepository};
use mooai_slack::{
    attachments::AttachmentExtractor, conversation_dispatcher, AssistantService,
    AssistantSettings, ReconnectPolicy, SlackSinks, SlackWebClient, SocketModeRunner,
    WebSocketTransport,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub invoker: Arc<AgentInvoker>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model client setup failed: {0}")]
    Llm(#[from] LlmError),
}

#[cfg(test)]
pub async fn bootstrap(
    options: mooai_core::config::LoadOptions,
) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects storage, applies migrations and wires the Slack runner. Nothing talks
/// to Slack or the model until the runner is started.
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

    let context = Arc::new(ContextStore::new(
        Arc::new(SqlContinuationRepository::new(db_pool.clone())),
        config.context.ttl_days,
    ));
    let llm = OpenAiResponsesClient::from_config(&config.llm)?;
    let invoker = Arc::new(AgentInvoker::new(Arc::new(llm), context));

    let web = Arc::new(SlackWebClient::from_config(&config.slack));
    let service = Arc::new(AssistantService::new(
        invoker.clone(),
        Arc::new(SlackSinks::new(web.clone())),
        web.clone(),
        AttachmentExtractor::new(web.clone(), config.attachments),
        AssistantSettings::from_config(&config.llm),
    ));
    let transport = Arc::new(WebSocketTransport::new(web, config.slack.app_token.clone()));
    let slack_runner = SocketModeRunner::new(
        transport,
        conversation_dispatcher(service),
        ReconnectPolicy::default(),
    );

    info!(
        event_name = "system.bootstrap.wired",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        continuation_mode = ?config.llm.continuation_mode,
        structured_output = config.llm.structured_output,
        "assistant pipeline wired"
    );

    Ok(Application { config, db_pool, invoker, slack_runner })
}

#[cfg(test)]
mod tests {
    use mooai_core::config::{ConfigOverrides, LoadOptions};
    use mooai_core::domain::conversation::ConversationKey;

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                llm_api_key: Some("sk-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_tokens() {
        let mut options = valid_overrides("sqlite::memory:");
        options.overrides.slack_app_token = Some("invalid-token".to_string());

        let result = bootstrap(options).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_a_persistent_context_store() {
        let app = bootstrap(valid_overrides("sqlite::memory:"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name = 'agent_response_map'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected response map table after bootstrap");
        assert_eq!(table_count, 1);

        let key = ConversationKey::new("U1", "D1", "1700.1");
        let context = app.invoker.context();
        context.put(&key, "resp_abc").await.expect("put");
        assert_eq!(context.get(&key).await.expect("get"), Some("resp_abc".to_owned()));

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agent_response_map")
            .fetch_one(&app.db_pool)
            .await
            .expect("count rows");
        assert_eq!(rows, 1);

        app.db_pool.close().await;
    }
}
