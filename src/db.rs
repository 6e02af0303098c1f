use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::expense::{Category, Expense, NewExpense};
use crate::observability;

/// Failure of a batch insert
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Transient contention; the whole batch may be retried
    Busy(String),
    /// Permanent failure
    Failed(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Busy(msg) => write!(f, "Database busy: {}", msg),
            StoreError::Failed(msg) => write!(f, "Database operation failed: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence seam used by the confirm step
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Insert every expense in one transaction, or none of them
    async fn insert_batch(&self, expenses: &[NewExpense]) -> Result<Vec<Expense>, StoreError>;
}

/// PostgreSQL-backed expense store
#[derive(Clone)]
pub struct PgExpenseStore {
    pool: PgPool,
}

impl PgExpenseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ExpenseStore for PgExpenseStore {
    async fn insert_batch(&self, expenses: &[NewExpense]) -> Result<Vec<Expense>, StoreError> {
        insert_expenses(&self.pool, expenses)
            .instrument(observability::db_span("insert_batch", "expenses"))
            .await
            .map_err(classify_sqlx_error)
    }
}

const EXPENSE_COLUMNS: &str = "id, user_id, amount, currency, description, category, expense_date, \
     receipt_path, created_at, updated_at, deleted_at";

async fn insert_expenses(pool: &PgPool, expenses: &[NewExpense]) -> sqlx::Result<Vec<Expense>> {
    let mut tx = pool.begin().await?;
    let mut created = Vec::with_capacity(expenses.len());

    for expense in expenses {
        let row = sqlx::query(&format!(
            "INSERT INTO expenses (id, user_id, amount, currency, description, category, expense_date, receipt_path)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            EXPENSE_COLUMNS
        ))
        .bind(expense.id)
        .bind(expense.user_id)
        .bind(expense.amount)
        .bind(&expense.currency)
        .bind(&expense.description)
        .bind(expense.category.as_str())
        .bind(expense.expense_date)
        .bind(&expense.receipt_path)
        .fetch_one(&mut *tx)
        .await?;

        created.push(expense_from_row(&row)?);
    }

    tx.commit().await?;
    debug!(count = created.len(), "Expense batch committed");
    Ok(created)
}

fn expense_from_row(row: &PgRow) -> sqlx::Result<Expense> {
    let category: String = row.try_get("category")?;
    Ok(Expense {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        description: row.try_get("description")?,
        category: Category::from_label(&category),
        expense_date: row.try_get("expense_date")?,
        receipt_path: row.try_get("receipt_path")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// SQLSTATE codes treated as transient contention
const TRANSIENT_SQLSTATES: [&str; 4] = [
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "53300", // too_many_connections
];

/// Split sqlx errors into retryable contention and permanent failures
pub fn classify_sqlx_error(error: sqlx::Error) -> StoreError {
    let transient = match &error {
        sqlx::Error::Database(db_error) => db_error
            .code()
            .map(|code| TRANSIENT_SQLSTATES.iter().any(|transient| code == *transient))
            .unwrap_or(false),
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        _ => false,
    };

    if transient {
        StoreError::Busy(error.to_string())
    } else {
        StoreError::Failed(error.to_string())
    }
}

/// Initialize the expenses schema
pub async fn init_expense_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS expenses (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            amount DOUBLE PRECISION NOT NULL CHECK (amount > 0),
            currency VARCHAR(3) NOT NULL,
            description VARCHAR(255) NOT NULL,
            category VARCHAR(50) NOT NULL DEFAULT 'OTHER',
            expense_date DATE NOT NULL,
            receipt_path TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            deleted_at TIMESTAMPTZ
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create expenses table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS expenses_user_id_idx ON expenses(user_id)")
        .execute(pool)
        .await
        .context("Failed to create expenses user_id index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS expenses_receipt_path_idx ON expenses(receipt_path)")
        .execute(pool)
        .await
        .context("Failed to create expenses receipt_path index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// List the owner's non-deleted expenses created from one receipt
pub async fn list_expenses_by_receipt(
    pool: &PgPool,
    user_id: Uuid,
    receipt_path: &str,
) -> Result<Vec<Expense>> {
    debug!(user_id = %user_id, receipt_path = %receipt_path, "Listing expenses by receipt");

    let rows = sqlx::query(&format!(
        "SELECT {} FROM expenses
         WHERE user_id = $1 AND receipt_path = $2 AND deleted_at IS NULL
         ORDER BY created_at, id",
        EXPENSE_COLUMNS
    ))
    .bind(user_id)
    .bind(receipt_path)
    .fetch_all(pool)
    .await
    .context("Failed to list expenses by receipt")?;

    let expenses = rows
        .iter()
        .map(expense_from_row)
        .collect::<sqlx::Result<Vec<_>>>()
        .context("Failed to decode expense row")?;

    debug!(count = expenses.len(), "Expenses listed");
    Ok(expenses)
}
