//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all application settings into a single, structured configuration object.
//! It supports loading from environment variables, validation, and provides
//! a clean interface for accessing configuration throughout the application.

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::{OcrConfig, PageSegMode};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default upload limit (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Database configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Minimum number of idle connections
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            connect_timeout_secs: 30,
            min_connections: 1,
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.url.trim().is_empty() {
            return Err(AppError::Config("Database URL cannot be empty".to_string()));
        }

        // Basic PostgreSQL URL validation
        if !self.url.starts_with("postgresql://") && !self.url.starts_with("postgres://") {
            return Err(AppError::Config(
                "Database URL must start with 'postgresql://' or 'postgres://'".to_string(),
            ));
        }

        let connection_part = match self.url.split_once("://") {
            Some((_, rest)) => rest,
            None => {
                return Err(AppError::Config(
                    "Database URL format is invalid".to_string(),
                ))
            }
        };
        if !connection_part.contains('@') {
            return Err(AppError::Config(
                "Database URL must contain authentication information".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(AppError::Config("Max connections cannot be 0".to_string()));
        }

        if self.max_connections > 100 {
            return Err(AppError::Config(
                "Max connections cannot be greater than 100".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(AppError::Config("Connect timeout cannot be 0".to_string()));
        }

        if self.connect_timeout_secs > 300 {
            return Err(AppError::Config(
                "Connect timeout cannot be greater than 300 seconds".to_string(),
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(AppError::Config(
                "Min connections cannot be greater than max connections".to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for the receipt API, health checks and metrics
    pub http_port: u16,
    /// Whether to allow privileged ports (< 1024)
    pub allow_privileged_ports: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8000,
            allow_privileged_ports: false,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.http_port == 0 {
            return Err(AppError::Config("HTTP port cannot be 0".to_string()));
        }
        if !self.allow_privileged_ports && self.http_port < 1024 {
            return Err(AppError::Config(format!(
                "HTTP port {} is privileged. Set allow_privileged_ports=true or use port >= 1024",
                self.http_port
            )));
        }
        Ok(())
    }
}

/// Receipt storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory holding one namespace directory per user
    pub root: PathBuf,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(AppError::Config("Storage root cannot be empty".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "Max upload size must be greater than 0".to_string(),
            ));
        }
        if self.max_upload_bytes > 100 * 1024 * 1024 {
            return Err(AppError::Config(
                "Max upload size cannot be greater than 100 MiB".to_string(),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds for outbound calls
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Seconds before an open circuit lets a request through again
    pub reset_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate circuit breaker configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.failure_threshold == 0 {
            return Err(AppError::Config(
                "circuit breaker failure threshold must be greater than 0".to_string(),
            ));
        }
        if self.reset_secs == 0 {
            return Err(AppError::Config(
                "circuit breaker reset must be greater than 0 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

/// Language model (chat completions) configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// API key; model features are unavailable when unset
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// Base URL of the chat completions API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Circuit breaker for the model endpoint
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 30,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ModelConfig {
    /// True when an API key is present
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }

    /// Validate model configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.model.trim().is_empty() {
            return Err(AppError::Config("Model name cannot be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "Model base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(AppError::Config(
                "Model timeout must be between 1 and 300 seconds".to_string(),
            ));
        }
        self.circuit_breaker.validate()
    }
}

/// Which line-item extractor the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionStrategy {
    /// Deterministic regular-expression extraction
    #[default]
    Pattern,
    /// Structured extraction through the language model
    Model,
}

impl FromStr for ExtractionStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pattern" | "regex" | "local" => Ok(ExtractionStrategy::Pattern),
            "model" | "llm" => Ok(ExtractionStrategy::Model),
            other => Err(AppError::Config(format!(
                "EXTRACTION_STRATEGY must be 'pattern' or 'model', got '{}'",
                other
            ))),
        }
    }
}

/// Pipeline behaviour configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Line-item extraction strategy
    pub extraction_strategy: ExtractionStrategy,
    /// Currency assigned when the receipt text does not name one
    pub default_currency: String,
    /// Extra commit attempts after the first on transient contention
    pub commit_max_retries: u32,
    /// Linear backoff unit between commit attempts
    pub commit_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction_strategy: ExtractionStrategy::default(),
            default_currency: validation::DEFAULT_CURRENCY.to_string(),
            commit_max_retries: 2,
            commit_backoff_ms: 250,
        }
    }
}

impl PipelineConfig {
    /// Validate pipeline configuration
    pub fn validate(&self) -> AppResult<()> {
        validation::validate_currency(&self.default_currency).map_err(|_| {
            AppError::Config(format!(
                "Default currency must be a 3-letter uppercase code, got '{}'",
                self.default_currency
            ))
        })?;
        if self.commit_max_retries > 10 {
            return Err(AppError::Config(
                "Commit retries cannot be greater than 10".to_string(),
            ));
        }
        if self.commit_backoff_ms > 10_000 {
            return Err(AppError::Config(
                "Commit backoff cannot be greater than 10000ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Server configuration
    pub server: ServerConfig,
    /// Receipt storage configuration
    pub storage: StorageConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Language model configuration
    pub model: ModelConfig,
    /// Pipeline configuration
    pub pipeline: PipelineConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

/// Read an environment variable, parsing it or falling back to a default
fn env_or<T: FromStr>(key: &str, default: &str) -> AppResult<T> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a valid value", key)))
}

/// Read an optional, non-blank environment variable
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Load database configuration
        config.database.url = env::var("DATABASE_URL").map_err(|_| {
            AppError::Config("DATABASE_URL environment variable is required".to_string())
        })?;
        config.database.max_connections = env_or("DATABASE_MAX_CONNECTIONS", "10")?;
        config.database.connect_timeout_secs = env_or("DATABASE_CONNECT_TIMEOUT_SECS", "30")?;
        config.database.min_connections = env_or("DATABASE_MIN_CONNECTIONS", "1")?;

        // Load server configuration
        config.server.http_port = env::var("HTTP_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| AppError::Config("HTTP_PORT must be a valid port number".to_string()))?;
        config.server.allow_privileged_ports = env::var("ALLOW_PRIVILEGED_PORTS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        // Load storage configuration
        config.storage.root = PathBuf::from(
            env::var("STORAGE_ROOT").unwrap_or_else(|_| "uploads".to_string()),
        );
        config.storage.max_upload_bytes =
            env_or("STORAGE_MAX_UPLOAD_BYTES", &DEFAULT_MAX_UPLOAD_BYTES.to_string())?;

        // Load OCR configuration
        if let Some(languages) = env_opt("OCR_PRIMARY_LANGUAGES") {
            config.ocr.primary_languages = languages;
        }
        if let Some(languages) = env_opt("OCR_FALLBACK_LANGUAGES") {
            config.ocr.fallback_languages = languages;
        }
        if let Some(psm) = env_opt("OCR_PAGE_SEG_MODE") {
            config.ocr.psm_mode = PageSegMode::from_number(&psm).ok_or_else(|| {
                AppError::Config(format!("OCR_PAGE_SEG_MODE '{}' is not supported", psm))
            })?;
        }
        config.ocr.tessdata_path = env_opt("TESSDATA_PATH");
        config.ocr.operation_timeout_secs = env_or("OCR_TIMEOUT_SECS", "30")?;

        // Load language model configuration
        config.model.api_key = env_opt("OPENAI_API_KEY");
        if let Some(model) = env_opt("OPENAI_MODEL") {
            config.model.model = model;
        }
        if let Some(base_url) = env_opt("OPENAI_BASE_URL") {
            config.model.base_url = base_url.trim_end_matches('/').to_string();
        }
        config.model.timeout_secs = env_or("MODEL_TIMEOUT_SECS", "30")?;
        config.model.circuit_breaker.failure_threshold =
            env_or("MODEL_CIRCUIT_BREAKER_THRESHOLD", "5")?;
        config.model.circuit_breaker.reset_secs = env_or("MODEL_CIRCUIT_BREAKER_RESET_SECS", "60")?;

        // Load pipeline configuration
        config.pipeline.extraction_strategy = env_or("EXTRACTION_STRATEGY", "pattern")?;
        if let Some(currency) = env_opt("DEFAULT_CURRENCY") {
            config.pipeline.default_currency = currency;
        }
        config.pipeline.commit_max_retries = env_or("COMMIT_MAX_RETRIES", "2")?;
        config.pipeline.commit_backoff_ms = env_or("COMMIT_BACKOFF_MS", "250")?;

        // Load observability configuration
        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.database.validate()?;
        self.server.validate()?;
        self.storage.validate()?;
        self.ocr.validate()?;
        self.model.validate()?;
        self.pipeline.validate()?;
        self.observability
            .validate()
            .map_err(|e| AppError::Config(format!("Invalid observability configuration: {}", e)))?;

        if self.pipeline.extraction_strategy == ExtractionStrategy::Model
            && !self.model.is_configured()
        {
            return Err(AppError::Config(
                "EXTRACTION_STRATEGY=model requires OPENAI_API_KEY".to_string(),
            ));
        }
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: db_url=[REDACTED], api_key={}, http_port={}, storage_root={}, max_upload_bytes={}, ocr_languages={}->{}, model={}, extraction={:?}, default_currency={}",
            if self.model.is_configured() { "[REDACTED]" } else { "[UNSET]" },
            self.server.http_port,
            self.storage.root.display(),
            self.storage.max_upload_bytes,
            self.ocr.primary_languages,
            self.ocr.fallback_languages,
            self.model.model,
            self.pipeline.extraction_strategy,
            self.pipeline.default_currency
        )
    }
}
