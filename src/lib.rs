//! # Receipt Ledger
//!
//! Turns photographed receipts into expense records: the image is stored,
//! normalized, read with OCR, split into line items and categorized into a
//! preview, which the owner confirms to persist.

pub mod circuit_breaker;
pub mod classification;
pub mod config;
pub mod db;
pub mod errors;
pub mod expense;
pub mod extraction;
pub mod instance_manager;
pub mod model_client;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod path_validation;
pub mod pipeline;
pub mod preprocessing;
pub mod server;
pub mod storage;
pub mod validation;

// Re-export types for easier access
pub use errors::{ReceiptError, ReceiptResult};
pub use expense::{CandidateExpenseItem, Category, Expense};
pub use pipeline::{ConfirmOutcome, ProcessOutcome, ReceiptPipeline};
