//! # Line-Item Extraction Module
//!
//! Turns raw OCR text into candidate expense items.
//!
//! - `pattern`: deterministic regular-expression extraction, no external calls
//! - `model`: structured extraction through the language model
//!
//! The strategy is chosen once from configuration through [`Extractor`].

pub mod model;
pub mod pattern;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ExtractionStrategy, PipelineConfig};
use crate::errors::ReceiptResult;
use crate::expense::CandidateExpenseItem;
use crate::model_client::LanguageModel;

pub use model::{parse_line_items, ModelExtractor};
pub use pattern::PatternExtractor;

/// Extracts candidate items from OCR text
#[async_trait]
pub trait LineItemExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> ReceiptResult<Vec<CandidateExpenseItem>>;
}

/// Configured extraction strategy
pub enum Extractor {
    Pattern(PatternExtractor),
    Model(ModelExtractor),
}

impl Extractor {
    /// Select the strategy named by `config.extraction_strategy`
    pub fn from_config(config: &PipelineConfig, model: Arc<dyn LanguageModel>) -> Self {
        match config.extraction_strategy {
            ExtractionStrategy::Pattern => {
                Extractor::Pattern(PatternExtractor::new(&config.default_currency))
            }
            ExtractionStrategy::Model => {
                Extractor::Model(ModelExtractor::new(model, &config.default_currency))
            }
        }
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        match self {
            Extractor::Pattern(_) => ExtractionStrategy::Pattern,
            Extractor::Model(_) => ExtractionStrategy::Model,
        }
    }
}

#[async_trait]
impl LineItemExtractor for Extractor {
    async fn extract(&self, text: &str) -> ReceiptResult<Vec<CandidateExpenseItem>> {
        match self {
            Extractor::Pattern(extractor) => extractor.extract(text).await,
            Extractor::Model(extractor) => extractor.extract(text).await,
        }
    }
}
