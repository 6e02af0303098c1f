use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use receipt_ledger::classification::CategoryClassifier;
use receipt_ledger::config::AppConfig;
use receipt_ledger::db::{self, PgExpenseStore};
use receipt_ledger::errors::error_logging;
use receipt_ledger::extraction::Extractor;
use receipt_ledger::model_client::{LanguageModel, OpenAiChatClient};
use receipt_ledger::observability;
use receipt_ledger::ocr::TesseractRecognizer;
use receipt_ledger::pipeline::ReceiptPipeline;
use receipt_ledger::server::{self, AppState};
use receipt_ledger::storage::ReceiptStorage;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    config.validate().inspect_err(|e| {
        error_logging::log_config_error(e, "startup", "validate_configuration");
    })?;

    let metrics_handle = observability::init_observability_with_config(&config.observability)?;
    info!("{}", config.summary());

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    db::init_expense_schema(&pool).await?;

    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiChatClient::new(config.model.clone())?);
    let classifier = if config.model.is_configured() {
        Some(CategoryClassifier::new(Arc::clone(&model)))
    } else {
        info!("OPENAI_API_KEY not set, category classification disabled");
        None
    };

    let pipeline = ReceiptPipeline::new(
        ReceiptStorage::new(&config.storage),
        Arc::new(TesseractRecognizer::new(config.ocr.clone())),
        Arc::new(Extractor::from_config(&config.pipeline, Arc::clone(&model))),
        classifier,
        Arc::new(PgExpenseStore::new(pool.clone())),
        config.pipeline.clone(),
    );

    let state = Arc::new(AppState {
        pipeline,
        metrics: metrics_handle,
        pool: Some(pool),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.http_port));
    let listener = TcpListener::bind(addr).await?;
    server::serve(listener, state).await
}
