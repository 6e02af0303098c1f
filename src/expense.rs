//! # Expense Domain Types
//!
//! Categories, candidate line items produced by extraction, and the persisted
//! expense records created on confirmation.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::validation;

/// Closed set of expense categories.
///
/// Labels outside the set are coerced to `Other` when parsed leniently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub enum Category {
    Food,
    Groceries,
    Transport,
    Entertainment,
    Health,
    Utilities,
    Rent,
    #[default]
    Other,
}

impl Category {
    /// Every category, in wire order
    pub const ALL: [Category; 8] = [
        Category::Food,
        Category::Groceries,
        Category::Transport,
        Category::Entertainment,
        Category::Health,
        Category::Utilities,
        Category::Rent,
        Category::Other,
    ];

    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "FOOD",
            Category::Groceries => "GROCERIES",
            Category::Transport => "TRANSPORT",
            Category::Entertainment => "ENTERTAINMENT",
            Category::Health => "HEALTH",
            Category::Utilities => "UTILITIES",
            Category::Rent => "RENT",
            Category::Other => "OTHER",
        }
    }

    /// Strict lookup of an exact wire label
    pub fn from_exact(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == label)
    }

    /// Lenient lookup: case-insensitive, unknown labels become `Other`
    pub fn from_label(label: &str) -> Self {
        let upper = label.trim().to_ascii_uppercase();
        Self::from_exact(&upper).unwrap_or(Category::Other)
    }

    /// Comma-separated label list for prompts
    pub fn label_list() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Option<String>> for Category {
    fn from(label: Option<String>) -> Self {
        label
            .as_deref()
            .map(Category::from_label)
            .unwrap_or_default()
    }
}

impl From<String> for Category {
    fn from(label: String) -> Self {
        Category::from_label(&label)
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Why a candidate item was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum ItemViolation {
    NonPositiveAmount,
    InvalidCurrency(String),
    EmptyDescription,
    DescriptionTooLong(usize),
    FutureDate(NaiveDate),
}

impl fmt::Display for ItemViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemViolation::NonPositiveAmount => write!(f, "amount must be a positive number"),
            ItemViolation::InvalidCurrency(code) => {
                write!(f, "currency '{}' is not a 3-letter uppercase code", code)
            }
            ItemViolation::EmptyDescription => write!(f, "description cannot be empty"),
            ItemViolation::DescriptionTooLong(len) => write!(
                f,
                "description is {} characters (max {})",
                len,
                validation::MAX_DESCRIPTION_LENGTH
            ),
            ItemViolation::FutureDate(date) => write!(f, "expense date {} is in the future", date),
        }
    }
}

fn default_currency() -> String {
    validation::DEFAULT_CURRENCY.to_string()
}

/// An extracted, not yet persisted expense guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateExpenseItem {
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub description: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
}

impl CandidateExpenseItem {
    /// Check amount, currency and description invariants
    pub fn validate(&self) -> Result<(), ItemViolation> {
        validation::validate_amount(self.amount).map_err(|_| ItemViolation::NonPositiveAmount)?;
        validation::validate_currency(&self.currency)
            .map_err(|_| ItemViolation::InvalidCurrency(self.currency.clone()))?;
        match validation::validate_description(&self.description) {
            Ok(_) => {}
            Err("too_long") => {
                return Err(ItemViolation::DescriptionTooLong(
                    self.description.chars().count(),
                ))
            }
            Err(_) => return Err(ItemViolation::EmptyDescription),
        }
        Ok(())
    }
}

/// A persisted expense record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expense {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub category: Category,
    pub expense_date: NaiveDate,
    pub receipt_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert payload for a confirmed expense
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub category: Category,
    pub expense_date: NaiveDate,
    pub receipt_path: Option<String>,
}

impl NewExpense {
    /// Build an insert payload, defaulting a missing date to `default_date`
    pub fn from_candidate(
        user_id: Uuid,
        item: &CandidateExpenseItem,
        receipt_path: &str,
        default_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount: item.amount,
            currency: item.currency.clone(),
            description: item.description.clone(),
            category: item.category,
            expense_date: item.expense_date.unwrap_or(default_date),
            receipt_path: Some(receipt_path.to_string()),
        }
    }
}
