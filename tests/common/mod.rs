//! # Test Helper Library
//!
//! Fakes for the pipeline's seams (language model, text recognizer, expense
//! store) and small builders shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use parking_lot::Mutex;
use receipt_ledger::classification::CategoryClassifier;
use receipt_ledger::config::{PipelineConfig, StorageConfig};
use receipt_ledger::db::{ExpenseStore, StoreError};
use receipt_ledger::expense::{Expense, NewExpense};
use receipt_ledger::extraction::{LineItemExtractor, PatternExtractor};
use receipt_ledger::model_client::{CompletionRequest, LanguageModel, ModelError};
use receipt_ledger::ocr::TextRecognizer;
use receipt_ledger::ocr_errors::OcrError;
use receipt_ledger::pipeline::ReceiptPipeline;
use receipt_ledger::storage::ReceiptStorage;

/// Language model that replays queued answers and records every request
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(responses: &[&str]) -> Self {
        let model = Self::new();
        for response in responses {
            model.push(Ok(response.to_string()));
        }
        model
    }

    pub fn push(&self, response: Result<String, ModelError>) {
        self.responses.lock().push_back(response);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or(Err(ModelError::EmptyResponse))
    }
}

/// Recognizer returning fixed text, or a fixed error
pub struct FixedTextRecognizer {
    result: Result<String, OcrError>,
    calls: AtomicU32,
}

impl FixedTextRecognizer {
    pub fn new(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(error: OcrError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRecognizer for FixedTextRecognizer {
    async fn recognize(&self, _raster: &GrayImage) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// In-memory store that fails the first `busy_failures` batches with contention
#[derive(Default)]
pub struct InMemoryExpenseStore {
    busy_failures: Mutex<u32>,
    permanent_failure: Option<String>,
    rows: Mutex<Vec<Expense>>,
    attempts: AtomicU32,
}

impl InMemoryExpenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_busy_failures(count: u32) -> Self {
        Self {
            busy_failures: Mutex::new(count),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            permanent_failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<Expense> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn insert_batch(&self, expenses: &[NewExpense]) -> Result<Vec<Expense>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        {
            let mut busy = self.busy_failures.lock();
            if *busy > 0 {
                *busy -= 1;
                return Err(StoreError::Busy("could not serialize access".to_string()));
            }
        }
        if let Some(message) = &self.permanent_failure {
            return Err(StoreError::Failed(message.clone()));
        }

        let now = Utc::now();
        let created: Vec<Expense> = expenses
            .iter()
            .map(|new| Expense {
                id: new.id,
                user_id: new.user_id,
                amount: new.amount,
                currency: new.currency.clone(),
                description: new.description.clone(),
                category: new.category,
                expense_date: new.expense_date,
                receipt_path: new.receipt_path.clone(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            })
            .collect();
        self.rows.lock().extend(created.iter().cloned());
        Ok(created)
    }
}

/// PNG of a light page with a few dark "text" bars
pub fn receipt_png(width: u32, height: u32) -> Vec<u8> {
    let image = GrayImage::from_fn(width, height, |x, y| {
        let in_line = (y % 16) >= 6 && (y % 16) < 10;
        let in_margin = x < width / 10 || x > width - width / 10;
        if in_line && !in_margin {
            Luma([20u8])
        } else {
            Luma([235u8])
        }
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("PNG encoding succeeds");
    buffer.into_inner()
}

pub fn storage_config(root: &Path) -> StorageConfig {
    StorageConfig {
        root: root.to_path_buf(),
        ..StorageConfig::default()
    }
}

/// Pipeline config with near-zero commit backoff
pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        commit_backoff_ms: 1,
        ..PipelineConfig::default()
    }
}

/// Seams a test pipeline is built from
pub struct Harness {
    pub recognizer: Arc<FixedTextRecognizer>,
    pub model: Arc<ScriptedModel>,
    pub store: Arc<InMemoryExpenseStore>,
    pub config: PipelineConfig,
}

impl Harness {
    pub fn new(text: &str) -> Self {
        Self {
            recognizer: Arc::new(FixedTextRecognizer::new(text)),
            model: Arc::new(ScriptedModel::new()),
            store: Arc::new(InMemoryExpenseStore::new()),
            config: fast_pipeline_config(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: InMemoryExpenseStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn with_recognizer(mut self, recognizer: FixedTextRecognizer) -> Self {
        self.recognizer = Arc::new(recognizer);
        self
    }

    pub fn with_model(mut self, model: ScriptedModel) -> Self {
        self.model = Arc::new(model);
        self
    }

    /// Pattern extraction, no classifier
    pub fn pipeline(&self, storage: StorageConfig) -> ReceiptPipeline {
        self.build(storage, Arc::new(PatternExtractor::new("CAD")), false)
    }

    /// Pattern extraction plus model classification
    pub fn classifying_pipeline(&self, storage: StorageConfig) -> ReceiptPipeline {
        self.build(storage, Arc::new(PatternExtractor::new("CAD")), true)
    }

    pub fn build(
        &self,
        storage: StorageConfig,
        extractor: Arc<dyn LineItemExtractor>,
        classify: bool,
    ) -> ReceiptPipeline {
        let model: Arc<dyn LanguageModel> = self.model.clone();
        ReceiptPipeline::new(
            ReceiptStorage::new(&storage),
            self.recognizer.clone(),
            extractor,
            classify.then(|| CategoryClassifier::new(model)),
            self.store.clone(),
            self.config.clone(),
        )
    }
}

/// Files currently stored under `<root>/<owner>/`
pub fn stored_files(root: &Path, owner: &uuid::Uuid) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(root.join(owner.to_string())) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
