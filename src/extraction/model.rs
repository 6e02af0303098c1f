//! Structured line-item extraction through the language model.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::LineItemExtractor;
use crate::errors::{ReceiptError, ReceiptResult};
use crate::expense::{CandidateExpenseItem, Category, ItemViolation};
use crate::model_client::{CompletionRequest, LanguageModel};
use crate::validation;

const SYSTEM_PROMPT: &str = "You extract expense line items from receipt text. \
Return only valid JSON, no markdown, no explanations.";

/// Extractor that asks the language model for a JSON array of items
pub struct ModelExtractor {
    model: Arc<dyn LanguageModel>,
    default_currency: String,
}

impl ModelExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, default_currency: &str) -> Self {
        Self {
            model,
            default_currency: default_currency.to_string(),
        }
    }

    /// Build the completion request for `text`
    pub fn build_request(&self, text: &str) -> CompletionRequest {
        let user = format!(
            "Extract every purchased item from the receipt text below.\n\
             Respond with a JSON array of objects with exactly these fields:\n\
             - \"amount\": positive number, the line total\n\
             - \"currency\": 3-letter uppercase ISO code; use \"{currency}\" if the receipt does not show one\n\
             - \"description\": short item description\n\
             - \"category\": one of {categories}\n\
             - \"expense_date\": \"YYYY-MM-DD\" if printed on the receipt, otherwise null\n\
             Return [] if no items are found.\n\n\
             Receipt text:\n{text}",
            currency = self.default_currency,
            categories = Category::label_list(),
            text = text,
        );
        CompletionRequest::new(SYSTEM_PROMPT, user)
    }
}

#[async_trait]
impl LineItemExtractor for ModelExtractor {
    async fn extract(&self, text: &str) -> ReceiptResult<Vec<CandidateExpenseItem>> {
        let request = self.build_request(text);
        let content = self.model.complete(&request).await?;
        debug!(characters = content.len(), "Model extraction response received");

        let items = parse_line_items(&content, &self.default_currency, Utc::now().date_naive())?;
        info!(items = items.len(), "Model extraction finished");
        Ok(items)
    }
}

/// Remove a surrounding markdown code fence, if any
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the opening line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and validate the model's answer.
///
/// `null` means no items. Anything that is not a JSON array of valid items is
/// rejected as a whole. A `null` or missing currency falls back to
/// `default_currency`. A printed date may be at most one day past `today`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use receipt_ledger::extraction::parse_line_items;
///
/// let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
/// let items = parse_line_items(
///     r#"[{"amount": 4.5, "currency": "CAD", "description": "Coffee", "category": "FOOD", "expense_date": null}]"#,
///     "CAD",
///     today,
/// ).unwrap();
/// assert_eq!(items[0].description, "Coffee");
/// ```
pub fn parse_line_items(
    content: &str,
    default_currency: &str,
    today: NaiveDate,
) -> ReceiptResult<Vec<CandidateExpenseItem>> {
    let body = strip_code_fence(content);
    if body.is_empty() {
        return Err(ReceiptError::UpstreamFailure(
            "language model returned an empty response".to_string(),
        ));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| ReceiptError::MalformedModelOutput(format!("not valid JSON: {}", e)))?;

    let elements = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(elements) => elements,
        Value::Object(_) => {
            return Err(ReceiptError::MalformedModelOutput(
                "must be a JSON array, got object".to_string(),
            ))
        }
        other => {
            return Err(ReceiptError::MalformedModelOutput(format!(
                "must be a JSON array, got {}",
                json_type_name(&other)
            )))
        }
    };

    // Receipts printed east of UTC may already carry tomorrow's UTC date
    let latest_date = today.succ_opt().unwrap_or(today);
    elements
        .into_iter()
        .enumerate()
        .map(|(index, mut element)| {
            if let Some(object) = element.as_object_mut() {
                if object.get("currency").map_or(true, Value::is_null) {
                    object.insert(
                        "currency".to_string(),
                        Value::String(default_currency.to_string()),
                    );
                }
            }
            let item: CandidateExpenseItem = serde_json::from_value(element).map_err(|e| {
                ReceiptError::MalformedModelOutput(format!("item {}: {}", index, e))
            })?;
            item.validate()
                .and_then(|()| check_printed_date(&item, latest_date))
                .map_err(|violation| {
                    ReceiptError::MalformedModelOutput(format!("item {}: {}", index, violation))
                })?;
            Ok(item)
        })
        .collect()
}

fn check_printed_date(item: &CandidateExpenseItem, latest: NaiveDate) -> Result<(), ItemViolation> {
    match item.expense_date {
        Some(date) => validation::validate_expense_date(date, latest)
            .map(|_| ())
            .map_err(|_| ItemViolation::FutureDate(date)),
        None => Ok(()),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
