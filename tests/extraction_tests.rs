//! Extraction strategies as selected from configuration

mod common;

use std::sync::Arc;

use common::ScriptedModel;
use receipt_ledger::config::{ExtractionStrategy, PipelineConfig};
use receipt_ledger::errors::ReceiptError;
use receipt_ledger::expense::Category;
use receipt_ledger::extraction::{Extractor, LineItemExtractor};
use receipt_ledger::model_client::{LanguageModel, ModelError};

fn config(strategy: ExtractionStrategy, currency: &str) -> PipelineConfig {
    PipelineConfig {
        extraction_strategy: strategy,
        default_currency: currency.to_string(),
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_pattern_strategy_never_calls_the_model() {
    let model = Arc::new(ScriptedModel::new());
    let shared: Arc<dyn LanguageModel> = model.clone();
    let extractor = Extractor::from_config(&config(ExtractionStrategy::Pattern, "EUR"), shared);
    assert_eq!(extractor.strategy(), ExtractionStrategy::Pattern);

    let items = extractor
        .extract("3 Croissant 1,20\nTHANK YOU\n1 Espresso 2.10")
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].description, "Croissant");
    assert_eq!(items[0].amount, 1.2);
    assert_eq!(items[1].description, "Espresso");
    assert!(items.iter().all(|i| i.currency == "EUR"));
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn test_model_strategy_parses_fenced_answer() {
    let model = Arc::new(ScriptedModel::replying(&[
        "```json\n[{\"amount\": 18.25, \"currency\": \"USD\", \"description\": \"Taxi\", \
         \"category\": \"TRANSPORT\", \"expense_date\": \"2024-02-10\"}]\n```",
    ]));
    let shared: Arc<dyn LanguageModel> = model.clone();
    let extractor = Extractor::from_config(&config(ExtractionStrategy::Model, "CAD"), shared);
    assert_eq!(extractor.strategy(), ExtractionStrategy::Model);

    let items = extractor.extract("CITY CAB\nFARE 18.25").await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].amount, 18.25);
    assert_eq!(items[0].currency, "USD");
    assert_eq!(items[0].category, Category::Transport);
    assert_eq!(
        items[0].expense_date,
        chrono::NaiveDate::from_ymd_opt(2024, 2, 10)
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].user.contains("CITY CAB\nFARE 18.25"));
    assert!(requests[0].user.contains("\"CAD\""));
}

#[tokio::test]
async fn test_model_strategy_fills_missing_currency() {
    let model = Arc::new(ScriptedModel::replying(&[
        r#"[{"amount": 3, "description": "Bagel", "category": "FOOD", "expense_date": null}]"#,
    ]));
    let extractor = Extractor::from_config(&config(ExtractionStrategy::Model, "GBP"), model);

    let items = extractor.extract("BAGEL 3.00").await.unwrap();

    assert_eq!(items[0].currency, "GBP");
}

#[tokio::test]
async fn test_model_strategy_null_answer_is_empty() {
    let model = Arc::new(ScriptedModel::replying(&["null"]));
    let extractor = Extractor::from_config(&config(ExtractionStrategy::Model, "CAD"), model);

    assert!(extractor.extract("nothing here").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_model_strategy_rejects_object_answer() {
    let model = Arc::new(ScriptedModel::replying(&[
        r#"{"amount": 3, "description": "Bagel"}"#,
    ]));
    let extractor = Extractor::from_config(&config(ExtractionStrategy::Model, "CAD"), model);

    let err = extractor.extract("BAGEL 3.00").await.unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedModelOutput(_)));
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn test_model_strategy_without_credentials_is_unavailable() {
    let model = Arc::new(ScriptedModel::new());
    model.push(Err(ModelError::NotConfigured));
    let extractor = Extractor::from_config(&config(ExtractionStrategy::Model, "CAD"), model);

    let err = extractor.extract("BAGEL 3.00").await.unwrap_err();
    assert!(matches!(err, ReceiptError::ServiceUnavailable(_)));
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn test_model_transport_failure_is_upstream_failure() {
    let model = Arc::new(ScriptedModel::new());
    model.push(Err(ModelError::Status {
        status: 500,
        body: "internal".to_string(),
    }));
    let extractor = Extractor::from_config(&config(ExtractionStrategy::Model, "CAD"), model);

    let err = extractor.extract("BAGEL 3.00").await.unwrap_err();
    assert!(matches!(err, ReceiptError::UpstreamFailure(_)));
    assert_eq!(err.status_code(), 502);
}
