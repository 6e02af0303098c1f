//! # OCR Processing Module
//!
//! This module turns a normalized receipt raster into raw text using the
//! Tesseract OCR engine.
//!
//! ## Features
//!
//! - Bilingual primary configuration (`spa+eng`) with an English-only fallback
//! - Cached Tesseract instances per language combination
//! - Blocking engine calls run on `spawn_blocking` under an operation timeout
//!
//! The recognizer returns the engine output verbatim. Empty text is a valid
//! result and the output is never truncated.
//!
//! ## Dependencies
//!
//! - `leptess`: Rust bindings for Tesseract OCR and Leptonica
//! - `image`: PNG encoding of the raster handed to the engine

use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat};
use tracing::{debug, info, warn, Instrument};

use crate::errors::error_logging;
use crate::instance_manager::OcrInstanceManager;
use crate::observability;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;

/// Anything that can read text from a normalized receipt raster
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, raster: &GrayImage) -> Result<String, OcrError>;
}

/// Tesseract-backed recognizer
pub struct TesseractRecognizer {
    config: OcrConfig,
    instances: Arc<OcrInstanceManager>,
}

impl TesseractRecognizer {
    pub fn new(config: OcrConfig) -> Self {
        Self::with_instance_manager(config, Arc::new(OcrInstanceManager::new()))
    }

    /// Share an existing instance cache between recognizers
    pub fn with_instance_manager(config: OcrConfig, instances: Arc<OcrInstanceManager>) -> Self {
        Self { config, instances }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, raster: &GrayImage) -> Result<String, OcrError> {
        let start_time = Instant::now();

        let png = Arc::new(encode_png(raster)?);
        let result = recognize_with_fallback(&self.config, |languages| {
            run_engine(
                Arc::clone(&self.instances),
                self.config.clone(),
                languages,
                Arc::clone(&png),
            )
        })
        .instrument(observability::ocr_span("recognize"))
        .await;

        match &result {
            Ok(text) => info!(
                characters = text.len(),
                duration_ms = start_time.elapsed().as_millis() as u64,
                "OCR extraction completed"
            ),
            Err(err) => error_logging::log_ocr_error(
                err,
                "recognize",
                &self.config.primary_languages,
                Some(raster.dimensions()),
                Some(start_time.elapsed()),
            ),
        }
        result
    }
}

/// Encode a raster as PNG bytes for the engine
pub fn encode_png(raster: &GrayImage) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(raster.clone())
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncode(format!("Failed to encode raster as PNG: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Run `attempt` with the primary languages, retrying once with the fallback.
///
/// Only an `Initialization` error triggers the fallback. If the fallback cannot
/// be initialised either, the engine is reported as unavailable. Every other
/// error is returned as is.
pub async fn recognize_with_fallback<F, Fut>(
    config: &OcrConfig,
    mut attempt: F,
) -> Result<String, OcrError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, OcrError>>,
{
    match attempt(config.primary_languages.clone()).await {
        Err(OcrError::Initialization(primary_msg)) => {
            warn!(
                primary = %config.primary_languages,
                fallback = %config.fallback_languages,
                error = %primary_msg,
                "Primary OCR languages unavailable, retrying with fallback"
            );
            observability::record_ocr_fallback(
                &config.primary_languages,
                &config.fallback_languages,
            );

            match attempt(config.fallback_languages.clone()).await {
                Err(OcrError::Initialization(fallback_msg)) => {
                    Err(OcrError::EngineUnavailable(format!(
                        "primary '{}': {}; fallback '{}': {}",
                        config.primary_languages,
                        primary_msg,
                        config.fallback_languages,
                        fallback_msg
                    )))
                }
                other => other,
            }
        }
        other => other,
    }
}

async fn run_engine(
    instances: Arc<OcrInstanceManager>,
    config: OcrConfig,
    languages: String,
    png: Arc<Vec<u8>>,
) -> Result<String, OcrError> {
    let timeout_secs = config.operation_timeout_secs;
    let ocr_start_time = Instant::now();

    let task = tokio::task::spawn_blocking(move || {
        let instance = instances.get_instance(&languages, &config)?;
        let mut tess = instance.lock();

        tess.set_image_from_mem(&png).map_err(|e| {
            OcrError::ImageLoad(format!("Failed to load image for OCR: {}", e))
        })?;

        tess.get_utf8_text().map_err(|e| {
            OcrError::Extraction(format!("Failed to extract text from image: {}", e))
        })
    });

    match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
        Ok(Ok(result)) => {
            debug!(
                duration_ms = ocr_start_time.elapsed().as_millis() as u64,
                success = result.is_ok(),
                "Tesseract call finished"
            );
            result
        }
        Ok(Err(join_error)) => Err(OcrError::Extraction(format!(
            "OCR worker task failed: {}",
            join_error
        ))),
        Err(_) => {
            warn!(
                "OCR processing timed out after {}ms (limit: {}s)",
                ocr_start_time.elapsed().as_millis(),
                timeout_secs
            );
            Err(OcrError::Timeout(format!(
                "OCR operation timed out after {} seconds",
                timeout_secs
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::sync::Mutex;

    fn config() -> OcrConfig {
        OcrConfig::default()
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let calls = Mutex::new(Vec::new());
        let result = recognize_with_fallback(&config(), |languages| {
            calls.lock().unwrap().push(languages);
            async { Ok("2 Coffee 4.50".to_string()) }
        })
        .await;

        assert_eq!(result.unwrap(), "2 Coffee 4.50");
        assert_eq!(*calls.lock().unwrap(), vec!["spa+eng".to_string()]);
    }

    #[tokio::test]
    async fn test_initialization_error_retries_with_fallback() {
        let calls = Mutex::new(Vec::new());
        let result = recognize_with_fallback(&config(), |languages| {
            let primary = languages == "spa+eng";
            calls.lock().unwrap().push(languages);
            async move {
                if primary {
                    Err(OcrError::Initialization("spa.traineddata missing".into()))
                } else {
                    Ok("text".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "text");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["spa+eng".to_string(), "eng".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fallback_initialization_failure_is_engine_unavailable() {
        let result = recognize_with_fallback(&config(), |_| async {
            Err(OcrError::Initialization("no tessdata".into()))
        })
        .await;

        assert!(matches!(result, Err(OcrError::EngineUnavailable(_))));
    }

    #[tokio::test]
    async fn test_recognition_error_is_not_retried() {
        let calls = Mutex::new(0u32);
        let result = recognize_with_fallback(&config(), |_| {
            *calls.lock().unwrap() += 1;
            async { Err(OcrError::Extraction("engine crashed".into())) }
        })
        .await;

        assert!(matches!(result, Err(OcrError::Extraction(_))));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_valid() {
        let result = recognize_with_fallback(&config(), |_| async { Ok(String::new()) }).await;
        assert_eq!(result.unwrap(), "");
    }

    #[test]
    fn test_encode_png_produces_png_signature() {
        let raster = GrayImage::from_pixel(8, 4, Luma([255u8]));
        let bytes = encode_png(&raster).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }
}
