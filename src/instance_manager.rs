//! # OCR Instance Manager Module
//!
//! This module provides thread-safe OCR instance management for reusing Tesseract instances.
//! Reusing instances avoids paying engine initialization on every receipt.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;

/// Thread-safe OCR instance manager for reusing Tesseract instances
///
/// Instances are keyed by language combination and tessdata directory, so the
/// primary (`spa+eng`) and fallback (`eng`) configurations each keep their own
/// engine. An instance is created on first request and reused afterwards.
/// A configuration that fails to initialise is not cached, so the next request
/// tries again.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl OcrInstanceManager {
    /// Create a new OCR instance manager
    ///
    /// # Examples
    ///
    /// ```rust
    /// use receipt_ledger::instance_manager::OcrInstanceManager;
    ///
    /// let manager = OcrInstanceManager::new();
    /// assert_eq!(manager.instance_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn instance_key(languages: &str, config: &OcrConfig) -> String {
        format!(
            "{}:{}",
            languages,
            config.tessdata_path.as_deref().unwrap_or("default")
        )
    }

    /// Get or create an OCR instance for `languages`.
    ///
    /// # Errors
    ///
    /// Returns `OcrError::Initialization` if the engine cannot be created for the
    /// language combination or rejects the page segmentation mode.
    pub fn get_instance(
        &self,
        languages: &str,
        config: &OcrConfig,
    ) -> Result<Arc<Mutex<LepTess>>, OcrError> {
        let key = Self::instance_key(languages, config);

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            languages = %languages,
            tessdata = ?config.tessdata_path,
            "Creating new OCR instance"
        );

        let mut tess = LepTess::new(config.tessdata_path.as_deref(), languages).map_err(|e| {
            OcrError::Initialization(format!(
                "Failed to initialize Tesseract for '{}': {}",
                languages, e
            ))
        })?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| OcrError::Initialization(format!("Failed to set PSM mode: {}", e)))?;

        let instance = Arc::new(Mutex::new(tess));
        self.instances.lock().insert(key, Arc::clone(&instance));

        Ok(instance)
    }

    /// Get the number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
