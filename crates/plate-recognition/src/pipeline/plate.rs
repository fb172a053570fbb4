use super::preprocess::plate_variants;
use crate::error::RecognitionError;
use crate::model::{RecognitionOptions, TextCandidate, TextRecognizer};
use image::DynamicImage;
use std::sync::Arc;
use telemetry::metrics::RECOGNITION_PLATES;

/// Default minimum confidence a plate reading must strictly exceed
pub const DEFAULT_PLATE_THRESHOLD: f32 = 0.5;

/// An accepted plate reading
#[derive(Debug, Clone, PartialEq)]
pub struct PlateReading {
    pub text: String,
    pub confidence: f32,
}

/// Keep ASCII alphanumerics and `-`, drop everything else
pub fn sanitize_plate_text(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// Pick the winning candidate across variants.
///
/// Within a variant the highest confidence wins; across variants a later
/// variant only wins with a strictly higher confidence, so ties go to the
/// earlier variant.
pub fn select_best(per_variant: &[Vec<TextCandidate>]) -> Option<&TextCandidate> {
    let mut best: Option<&TextCandidate> = None;
    for candidates in per_variant {
        let mut variant_best: Option<&TextCandidate> = None;
        for candidate in candidates {
            if variant_best.map_or(true, |b| candidate.confidence > b.confidence) {
                variant_best = Some(candidate);
            }
        }
        if let Some(candidate) = variant_best {
            if best.map_or(true, |b| candidate.confidence > b.confidence) {
                best = Some(candidate);
            }
        }
    }
    best
}

/// Apply the acceptance threshold and sanitization to a winning candidate
pub fn accept(candidate: &TextCandidate, threshold: f32) -> Option<PlateReading> {
    if !(candidate.confidence > threshold) {
        return None;
    }
    let text = sanitize_plate_text(&candidate.text);
    if text.is_empty() {
        return None;
    }
    Some(PlateReading {
        text,
        confidence: candidate.confidence,
    })
}

/// Reads plate text from a vehicle crop using several preprocessed variants
#[derive(Clone)]
pub struct PlateTextExtractor {
    recognizer: Arc<dyn TextRecognizer>,
    options: RecognitionOptions,
    threshold: f32,
}

impl PlateTextExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, threshold: f32) -> Self {
        Self {
            recognizer,
            options: RecognitionOptions::plate(),
            threshold,
        }
    }

    pub fn with_options(mut self, options: RecognitionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Best plate reading above the threshold, or `None`
    pub fn extract(&self, crop: &DynamicImage) -> Result<Option<PlateReading>, RecognitionError> {
        let mut per_variant = Vec::with_capacity(4);
        for (kind, variant) in plate_variants(crop) {
            let candidates = self
                .recognizer
                .read_text(&variant, &self.options)
                .map_err(|e| {
                    RecognitionError::model(
                        format!("{} failed on {} variant", self.recognizer.name(), kind.as_str()),
                        e,
                    )
                })?;
            tracing::trace!(variant = kind.as_str(), candidates = candidates.len(), "recognizer output");
            per_variant.push(candidates);
        }
        let Some(best) = select_best(&per_variant) else {
            RECOGNITION_PLATES.with_label_values(&["rejected"]).inc();
            return Ok(None);
        };

        match accept(best, self.threshold) {
            Some(reading) => {
                RECOGNITION_PLATES.with_label_values(&["accepted"]).inc();
                tracing::debug!(plate = %reading.text, confidence = reading.confidence, "plate accepted");
                Ok(Some(reading))
            }
            None => {
                RECOGNITION_PLATES.with_label_values(&["rejected"]).inc();
                tracing::debug!(
                    confidence = best.confidence,
                    threshold = self.threshold,
                    "plate reading rejected"
                );
                Ok(None)
            }
        }
    }
}
