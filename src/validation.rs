//! Validation module for expense item fields
//!
//! Reusable validation functions shared by the extractors, the confirm step
//! and configuration loading:
//!
//! - Amounts
//! - Currency codes
//! - Descriptions
//! - Expense dates
//! - Whitespace normalization

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CURRENCY_PATTERN: Regex =
        Regex::new(r"^[A-Z]{3}$").expect("Invalid currency regex pattern");
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("Invalid whitespace regex pattern");
}

/// Currency assigned when none is known
pub const DEFAULT_CURRENCY: &str = "CAD";

/// Maximum description length in characters
pub const MAX_DESCRIPTION_LENGTH: usize = 255;

/// Validates an expense amount
///
/// # Returns
/// * `Ok(f64)` - The amount if valid
/// * `Err(&str)` - Error type: "not_finite" or "not_positive"
///
/// # Examples
/// ```
/// use receipt_ledger::validation::validate_amount;
///
/// assert_eq!(validate_amount(4.5), Ok(4.5));
/// assert_eq!(validate_amount(0.0), Err("not_positive"));
/// assert_eq!(validate_amount(f64::NAN), Err("not_finite"));
/// ```
pub fn validate_amount(amount: f64) -> Result<f64, &'static str> {
    if !amount.is_finite() {
        return Err("not_finite");
    }
    if amount <= 0.0 {
        return Err("not_positive");
    }
    Ok(amount)
}

/// Validates a three-letter uppercase currency code
///
/// # Examples
/// ```
/// use receipt_ledger::validation::validate_currency;
///
/// assert!(validate_currency("CAD").is_ok());
/// assert_eq!(validate_currency("cad"), Err("invalid_format"));
/// assert_eq!(validate_currency("EURO"), Err("invalid_format"));
/// ```
pub fn validate_currency(code: &str) -> Result<&str, &'static str> {
    if CURRENCY_PATTERN.is_match(code) {
        Ok(code)
    } else {
        Err("invalid_format")
    }
}

/// Validates an expense description
///
/// # Returns
/// * `Ok(&str)` - The description unchanged if valid
/// * `Err(&str)` - Error type: "empty" or "too_long"
///
/// # Examples
/// ```
/// use receipt_ledger::validation::validate_description;
///
/// assert!(validate_description("Coffee").is_ok());
/// assert_eq!(validate_description("   "), Err("empty"));
/// assert_eq!(validate_description(&"a".repeat(256)), Err("too_long"));
/// ```
pub fn validate_description(description: &str) -> Result<&str, &'static str> {
    if description.trim().is_empty() {
        return Err("empty");
    }
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err("too_long");
    }
    Ok(description)
}

/// Validates that an expense date is not after `today`
pub fn validate_expense_date(date: NaiveDate, today: NaiveDate) -> Result<NaiveDate, &'static str> {
    if date > today {
        return Err("in_future");
    }
    Ok(date)
}

/// Trims and collapses internal whitespace runs to single spaces
///
/// # Examples
/// ```
/// use receipt_ledger::validation::normalize_whitespace;
///
/// assert_eq!(normalize_whitespace("  Bus \t fare  "), "Bus fare");
/// ```
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(0.01).is_ok());
        assert_eq!(validate_amount(-3.0), Err("not_positive"));
        assert_eq!(validate_amount(f64::INFINITY), Err("not_finite"));
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency("").is_err());
        assert!(validate_currency("US").is_err());
        assert!(validate_currency("U5D").is_err());
    }

    #[test]
    fn test_validate_description_counts_characters() {
        // 255 multi-byte characters are still within the limit
        let accented = "é".repeat(255);
        assert!(validate_description(&accented).is_ok());
        assert_eq!(validate_description(&"é".repeat(256)), Err("too_long"));
        assert_eq!(validate_description(""), Err("empty"));
    }

    #[test]
    fn test_validate_expense_date() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date");
        let yesterday = NaiveDate::from_ymd_opt(2024, 3, 9).expect("valid date");
        let tomorrow = NaiveDate::from_ymd_opt(2024, 3, 11).expect("valid date");

        assert_eq!(validate_expense_date(today, today), Ok(today));
        assert_eq!(validate_expense_date(yesterday, today), Ok(yesterday));
        assert_eq!(validate_expense_date(tomorrow, today), Err("in_future"));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("Coffee"), "Coffee");
        assert_eq!(normalize_whitespace("Big   Mac\nMeal"), "Big Mac Meal");
        assert_eq!(normalize_whitespace("   "), "");
    }
}
