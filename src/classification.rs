//! # Category Classification Module
//!
//! Assigns categories to line-item descriptions with one batched language model
//! call per receipt.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{ReceiptError, ReceiptResult};
use crate::expense::Category;
use crate::extraction::model::strip_code_fence;
use crate::model_client::{CompletionRequest, LanguageModel};

/// Batch classifier backed by the language model
pub struct CategoryClassifier {
    model: Arc<dyn LanguageModel>,
}

impl CategoryClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Map each distinct description to a category.
    ///
    /// Descriptions the model leaves out, or maps to an unknown label, are
    /// absent from the result.
    pub async fn classify(&self, descriptions: &[String]) -> ReceiptResult<HashMap<String, Category>> {
        let unique = unique_descriptions(descriptions);
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let request = build_request(&unique)?;
        let content = self.model.complete(&request).await?;
        let categories = parse_category_map(&content)?;

        info!(
            descriptions = unique.len(),
            classified = categories.len(),
            "Category classification finished"
        );
        Ok(categories)
    }
}

/// Distinct descriptions in first-seen order
pub fn unique_descriptions(descriptions: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    descriptions
        .iter()
        .filter(|d| seen.insert(d.as_str()))
        .cloned()
        .collect()
}

fn build_request(descriptions: &[String]) -> ReceiptResult<CompletionRequest> {
    let encoded = serde_json::to_string(descriptions)
        .map_err(|e| ReceiptError::Internal(format!("failed to encode descriptions: {}", e)))?;

    let system = format!(
        "You classify expense descriptions into exactly one of these categories: {}. \
         Return only valid JSON, no markdown.",
        Category::label_list()
    );
    let user = format!(
        "Classify each description. Respond with a JSON object mapping every \
         description, unchanged, to its category.\n\nDescriptions: {}",
        encoded
    );
    Ok(CompletionRequest::new(system, user))
}

/// Parse the model's description -> category object.
///
/// Values that are not strings exactly naming a category are dropped.
pub fn parse_category_map(content: &str) -> ReceiptResult<HashMap<String, Category>> {
    let body = strip_code_fence(content);
    if body.is_empty() {
        return Err(ReceiptError::UpstreamFailure(
            "language model returned an empty response".to_string(),
        ));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| ReceiptError::MalformedModelOutput(format!("not valid JSON: {}", e)))?;
    let Value::Object(entries) = value else {
        return Err(ReceiptError::MalformedModelOutput(
            "must be a JSON object".to_string(),
        ));
    };

    let mut categories = HashMap::with_capacity(entries.len());
    for (description, label) in entries {
        match label.as_str().and_then(Category::from_exact) {
            Some(category) => {
                categories.insert(description, category);
            }
            None => debug!(description = %description, label = %label, "Discarding unknown category"),
        }
    }
    Ok(categories)
}
