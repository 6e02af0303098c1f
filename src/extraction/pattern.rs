//! Regular-expression line-item extraction.
//!
//! Receipt lines look like `<quantity> <description> <amount>`, where the
//! amount uses either `.` or `,` as decimal separator, e.g. `2 Coffee 4.50`
//! or `1 Bus 2,75`.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::LineItemExtractor;
use crate::errors::ReceiptResult;
use crate::expense::{CandidateExpenseItem, Category};
use crate::validation;

lazy_static! {
    // quantity, description (lazy, >= 3 chars), integer part, separator, two-digit fraction
    static ref LINE_ITEM_PATTERN: Regex = Regex::new(
        r"\b(\d+)\s+([A-Za-z0-9_ -]{3,}?)\s*(\d{1,4})\s*[,.\s]\s*(\d{2})\b"
    )
    .expect("Invalid line item regex pattern");
}

/// Deterministic extractor; never calls out and never fails
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    default_currency: String,
}

impl PatternExtractor {
    pub fn new(default_currency: &str) -> Self {
        Self {
            default_currency: default_currency.to_string(),
        }
    }

    /// Scan `text` for line items
    ///
    /// # Examples
    ///
    /// ```
    /// use receipt_ledger::extraction::PatternExtractor;
    ///
    /// let items = PatternExtractor::new("CAD").extract_items("2 Coffee 4.50\n1 Bus 2,75");
    /// assert_eq!(items.len(), 2);
    /// assert_eq!(items[1].description, "Bus");
    /// assert_eq!(items[1].amount, 2.75);
    /// ```
    pub fn extract_items(&self, text: &str) -> Vec<CandidateExpenseItem> {
        let text = text.replace('\u{00A0}', " ");

        let items: Vec<CandidateExpenseItem> = LINE_ITEM_PATTERN
            .captures_iter(&text)
            .filter_map(|caps| {
                let description = validation::normalize_whitespace(&caps[2]);
                if validation::validate_description(&description).is_err() {
                    return None;
                }
                let amount: f64 = format!("{}.{}", &caps[3], &caps[4]).parse().ok()?;
                if amount <= 0.0 {
                    return None;
                }
                Some(CandidateExpenseItem {
                    amount,
                    currency: self.default_currency.clone(),
                    description,
                    category: Category::Other,
                    expense_date: None,
                })
            })
            .collect();

        debug!(
            characters = text.len(),
            items = items.len(),
            "Pattern extraction finished"
        );
        items
    }
}

#[async_trait]
impl LineItemExtractor for PatternExtractor {
    async fn extract(&self, text: &str) -> ReceiptResult<Vec<CandidateExpenseItem>> {
        Ok(self.extract_items(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<CandidateExpenseItem> {
        PatternExtractor::new("CAD").extract_items(text)
    }

    #[test]
    fn test_dot_and_comma_separators() {
        let items = extract("2 Coffee 4.50\n1 Bus 2,75");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Coffee");
        assert_eq!(items[0].amount, 4.5);
        assert_eq!(items[1].description, "Bus");
        assert_eq!(items[1].amount, 2.75);
        for item in &items {
            assert_eq!(item.currency, "CAD");
            assert_eq!(item.category, Category::Other);
            assert_eq!(item.expense_date, None);
        }
    }

    #[test]
    fn test_non_breaking_space_and_inner_whitespace() {
        let items = extract("1\u{00A0}Pan   integral 3.20");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Pan integral");
        assert_eq!(items[0].amount, 3.2);
    }

    #[test]
    fn test_overlong_description_is_skipped() {
        let long_line = format!("1 {} 4.50", "a".repeat(300));
        assert!(extract(&long_line).is_empty());

        let text = format!("{}\n2 Coffee 4.50", long_line);
        let items = extract(&text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Coffee");

        let at_limit = format!("1 {} 4.50", "b".repeat(validation::MAX_DESCRIPTION_LENGTH));
        assert_eq!(extract(&at_limit)[0].description.len(), 255);
    }

    #[test]
    fn test_zero_amount_is_skipped() {
        assert!(extract("1 Free sample 0.00").is_empty());
    }

    #[test]
    fn test_no_matches_is_empty() {
        assert!(extract("THANK YOU FOR SHOPPING").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_line_without_quantity_is_ignored() {
        assert!(extract("Coffee 4.50").is_empty());
    }

    #[test]
    fn test_uses_configured_currency() {
        let items = PatternExtractor::new("EUR").extract_items("3 Apples 1.99");
        assert_eq!(items[0].currency, "EUR");
    }
}
