//! # Receipt Pipeline Module
//!
//! Orchestrates a receipt from upload to persisted expenses.
//!
//! ```text
//! process:  Uploaded -> Normalized -> Recognized -> Extracted -> Classified -> Previewed
//! confirm:  Previewed (supplied back by the caller) -> Confirmed | Rejected
//! ```
//!
//! `process` writes the uploaded artifact and nothing else. The preview it
//! returns is a plain value; `confirm` re-validates whatever the caller sends
//! back and keeps no state between the two calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::classification::CategoryClassifier;
use crate::config::PipelineConfig;
use crate::db::{ExpenseStore, StoreError};
use crate::errors::{error_logging, InputViolation, ReceiptError, ReceiptResult};
use crate::expense::{CandidateExpenseItem, Category, Expense, NewExpense};
use crate::extraction::LineItemExtractor;
use crate::observability;
use crate::ocr::TextRecognizer;
use crate::preprocessing;
use crate::storage::{ReceiptStorage, UploadPolicy};

/// Characters of OCR text included in debug logs
const OCR_PREVIEW_CHARS: usize = 600;

/// Result of `process`: the stored artifact and the extracted preview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub receipt_path: String,
    pub ocr_text: String,
    pub expenses_preview: Vec<CandidateExpenseItem>,
    /// UTC day the preview was produced
    pub processed_on: NaiveDate,
}

/// Body of a confirm call
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfirmRequest {
    pub receipt_path: String,
    #[serde(default)]
    pub expenses: Vec<CandidateExpenseItem>,
}

/// Result of `confirm`
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub receipt_path: String,
    pub expenses_created: Vec<Expense>,
}

/// Linear backoff before commit attempt `attempt + 1`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use receipt_ledger::pipeline::commit_backoff;
///
/// assert_eq!(commit_backoff(1, 250), Duration::from_millis(250));
/// assert_eq!(commit_backoff(2, 250), Duration::from_millis(500));
/// ```
pub fn commit_backoff(attempt: u32, base_ms: u64) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(attempt as u64))
}

pub struct ReceiptPipeline {
    storage: ReceiptStorage,
    recognizer: Arc<dyn TextRecognizer>,
    extractor: Arc<dyn LineItemExtractor>,
    classifier: Option<CategoryClassifier>,
    store: Arc<dyn ExpenseStore>,
    config: PipelineConfig,
}

impl ReceiptPipeline {
    pub fn new(
        storage: ReceiptStorage,
        recognizer: Arc<dyn TextRecognizer>,
        extractor: Arc<dyn LineItemExtractor>,
        classifier: Option<CategoryClassifier>,
        store: Arc<dyn ExpenseStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            storage,
            recognizer,
            extractor,
            classifier,
            store,
            config,
        }
    }

    pub fn storage(&self) -> &ReceiptStorage {
        &self.storage
    }

    /// Store an upload and build a preview of the expenses it contains.
    ///
    /// Stages run strictly in order and the first failure aborts the run.
    /// No database writes happen here.
    pub async fn process(
        &self,
        owner_id: Uuid,
        content_type: &str,
        bytes: &[u8],
    ) -> ReceiptResult<ProcessOutcome> {
        self.run_process(owner_id, content_type, bytes)
            .instrument(observability::pipeline_span("process", owner_id))
            .await
    }

    async fn run_process(
        &self,
        owner_id: Uuid,
        content_type: &str,
        bytes: &[u8],
    ) -> ReceiptResult<ProcessOutcome> {
        let started = Instant::now();
        let artifact = finish_stage(
            "uploaded",
            started,
            self.storage
                .store(owner_id, UploadPolicy::ReceiptImage, content_type, bytes)
                .await,
            owner_id,
            None,
        )?;
        let receipt_path = artifact.path.clone();
        let path = Some(receipt_path.as_str());

        let started = Instant::now();
        let image_bytes = bytes.to_vec();
        let normalized = tokio::task::spawn_blocking(move || {
            preprocessing::normalize_receipt_image(&image_bytes)
        })
        .await
        .map_err(|e| ReceiptError::Internal(format!("normalization task failed: {}", e)))
        .and_then(|result| result.map_err(ReceiptError::from));
        let raster = finish_stage("normalized", started, normalized, owner_id, path)?;
        debug!(
            width = raster.image.width(),
            height = raster.image.height(),
            skew_angle = raster.skew_angle_degrees,
            "Receipt image normalized"
        );

        let started = Instant::now();
        let recognized = self
            .recognizer
            .recognize(&raster.image)
            .await
            .map_err(ReceiptError::from);
        let ocr_text = finish_stage("recognized", started, recognized, owner_id, path)?;
        log_text_statistics(&ocr_text);

        let started = Instant::now();
        let extracted = self.extractor.extract(&ocr_text).await;
        let mut items = finish_stage("extracted", started, extracted, owner_id, path)?;

        if let Some(classifier) = &self.classifier {
            let started = Instant::now();
            let descriptions: Vec<String> =
                items.iter().map(|item| item.description.clone()).collect();
            let classified = classifier.classify(&descriptions).await;
            let categories = finish_stage("classified", started, classified, owner_id, path)?;
            for item in &mut items {
                item.category = categories
                    .get(&item.description)
                    .copied()
                    .unwrap_or(Category::Other);
            }
        }

        info!(
            receipt_path = %receipt_path,
            items = items.len(),
            "Receipt preview ready"
        );
        observability::record_stage_metrics("previewed", "success", Duration::ZERO);

        Ok(ProcessOutcome {
            receipt_path,
            ocr_text,
            expenses_preview: items,
            processed_on: Utc::now().date_naive(),
        })
    }

    /// Persist caller-approved items against a receipt the caller owns.
    ///
    /// Items without a date are dated with the UTC day of the commit. The whole
    /// batch is retried on transient contention.
    pub async fn confirm(
        &self,
        owner_id: Uuid,
        receipt_path: &str,
        items: Vec<CandidateExpenseItem>,
    ) -> ReceiptResult<ConfirmOutcome> {
        self.run_confirm(owner_id, receipt_path, items)
            .instrument(observability::pipeline_span("confirm", owner_id))
            .await
    }

    async fn run_confirm(
        &self,
        owner_id: Uuid,
        receipt_path: &str,
        items: Vec<CandidateExpenseItem>,
    ) -> ReceiptResult<ConfirmOutcome> {
        let started = Instant::now();
        let checked = self.check_confirmation(owner_id, receipt_path, &items).await;
        let today = finish_stage("validated", started, checked, owner_id, Some(receipt_path))?;

        if items.is_empty() {
            debug!(receipt_path = %receipt_path, "Nothing to confirm");
            return Ok(ConfirmOutcome {
                receipt_path: receipt_path.to_string(),
                expenses_created: Vec::new(),
            });
        }

        let new_expenses: Vec<NewExpense> = items
            .iter()
            .map(|item| NewExpense::from_candidate(owner_id, item, receipt_path, today))
            .collect();

        let started = Instant::now();
        let committed = self.commit_with_retry(owner_id, &new_expenses).await;
        let expenses_created =
            finish_stage("confirmed", started, committed, owner_id, Some(receipt_path))?;

        info!(
            receipt_path = %receipt_path,
            expenses = expenses_created.len(),
            "Receipt expenses confirmed"
        );
        Ok(ConfirmOutcome {
            receipt_path: receipt_path.to_string(),
            expenses_created,
        })
    }

    /// Path and item checks; returns the commit day
    async fn check_confirmation(
        &self,
        owner_id: Uuid,
        receipt_path: &str,
        items: &[CandidateExpenseItem],
    ) -> ReceiptResult<NaiveDate> {
        self.storage.resolve_owned(owner_id, receipt_path).await?;

        let today = Utc::now().date_naive();
        for (index, item) in items.iter().enumerate() {
            item.validate()
                .map_err(|violation| InputViolation::InvalidItem { index, violation })?;
        }
        Ok(today)
    }

    async fn commit_with_retry(
        &self,
        owner_id: Uuid,
        expenses: &[NewExpense],
    ) -> ReceiptResult<Vec<Expense>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.store.insert_batch(expenses).await {
                Ok(created) => {
                    observability::record_commit_attempt("success");
                    return Ok(created);
                }
                Err(StoreError::Busy(reason)) if attempt <= self.config.commit_max_retries => {
                    observability::record_commit_attempt("busy");
                    let delay = commit_backoff(attempt, self.config.commit_backoff_ms);
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Expense commit hit contention, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    observability::record_commit_attempt("failure");
                    error_logging::log_database_error(
                        &err,
                        "insert_batch",
                        Some(owner_id),
                        Some(attempt),
                    );
                    return Err(err.into());
                }
            }
        }
    }
}

/// Time a stage, count its outcome and log a failure
fn finish_stage<T>(
    stage: &'static str,
    started: Instant,
    result: ReceiptResult<T>,
    owner_id: Uuid,
    receipt_path: Option<&str>,
) -> ReceiptResult<T> {
    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => {
            error_logging::log_pipeline_error(err, stage, Some(owner_id), receipt_path);
            err.kind()
        }
    };
    observability::record_stage_metrics(stage, outcome, started.elapsed());
    result
}

fn log_text_statistics(text: &str) {
    let lines = text.lines().filter(|line| !line.trim().is_empty()).count();
    info!(characters = text.chars().count(), lines = lines, "OCR text recognized");
    let preview: String = text.chars().take(OCR_PREVIEW_CHARS).collect();
    debug!(preview = %preview, "OCR text preview");
}
