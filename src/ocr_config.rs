//! # OCR Configuration Module
//!
//! This module defines configuration structures for OCR processing:
//! language selection with a fallback, page segmentation and operation timeouts.

use crate::errors::{AppError, AppResult};

// Constants for OCR configuration
pub const DEFAULT_PRIMARY_LANGUAGES: &str = "spa+eng";
pub const DEFAULT_FALLBACK_LANGUAGES: &str = "eng";
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    Auto = 3,
    /// Assume a single column of text
    SingleColumn = 4,
    /// Assume a single uniform block of text
    #[default]
    SingleBlock = 6,
    /// Treat the image as a single text line
    SingleLine = 7,
    /// Find as much text as possible in no particular order
    SparseText = 11,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SparseText => "11",
        }
    }

    /// Parse the numeric Tesseract value
    pub fn from_number(value: &str) -> Option<Self> {
        match value.trim() {
            "3" => Some(PageSegMode::Auto),
            "4" => Some(PageSegMode::SingleColumn),
            "6" => Some(PageSegMode::SingleBlock),
            "7" => Some(PageSegMode::SingleLine),
            "11" => Some(PageSegMode::SparseText),
            _ => None,
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Language codes tried first (e.g. "spa+eng")
    pub primary_languages: String,
    /// Language codes used when the primary configuration cannot be initialised
    pub fallback_languages: String,
    /// Page segmentation mode passed to the engine
    pub psm_mode: PageSegMode,
    /// Optional tessdata directory; the engine default is used when unset
    pub tessdata_path: Option<String>,
    /// Timeout for a single recognition in seconds
    pub operation_timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            primary_languages: DEFAULT_PRIMARY_LANGUAGES.to_string(),
            fallback_languages: DEFAULT_FALLBACK_LANGUAGES.to_string(),
            psm_mode: PageSegMode::default(),
            tessdata_path: None,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.primary_languages.trim().is_empty() {
            return Err(AppError::Config(
                "primary OCR languages cannot be empty".to_string(),
            ));
        }
        if self.fallback_languages.trim().is_empty() {
            return Err(AppError::Config(
                "fallback OCR languages cannot be empty".to_string(),
            ));
        }
        for code in self
            .primary_languages
            .split('+')
            .chain(self.fallback_languages.split('+'))
        {
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(AppError::Config(format!(
                    "invalid OCR language code '{}'",
                    code
                )));
            }
        }
        if self.operation_timeout_secs == 0 {
            return Err(AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout_secs > 300 {
            return Err(AppError::Config(
                "operation_timeout_secs cannot be greater than 300 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_bilingual_with_english_fallback() {
        let config = OcrConfig::default();
        assert_eq!(config.primary_languages, "spa+eng");
        assert_eq!(config.fallback_languages, "eng");
        assert_eq!(config.psm_mode, PageSegMode::SingleBlock);
        assert_eq!(config.psm_mode.as_str(), "6");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[allow(unused_assignments)]
    fn test_ocr_config_validation() {
        let mut config = OcrConfig::default();

        config.primary_languages = "  ".to_string();
        assert!(config.validate().is_err());
        config.primary_languages = "spa+eng".to_string();

        config.fallback_languages = "eng+".to_string();
        assert!(config.validate().is_err());
        config.fallback_languages = "eng".to_string();

        config.primary_languages = "spa;rm -rf".to_string();
        assert!(config.validate().is_err());
        config.primary_languages = "spa+eng".to_string();

        config.operation_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.operation_timeout_secs = 30;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_page_seg_mode_parsing() {
        assert_eq!(PageSegMode::from_number("6"), Some(PageSegMode::SingleBlock));
        assert_eq!(PageSegMode::from_number(" 11 "), Some(PageSegMode::SparseText));
        assert_eq!(PageSegMode::from_number("42"), None);
    }
}
