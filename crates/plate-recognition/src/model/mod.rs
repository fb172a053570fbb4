pub mod crnn;
pub mod mock;
pub mod session;
pub mod yolov8;

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Unclipped box as reported by a localizer, in source-pixel coordinates.
/// Coordinates may fall outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// One object found by an [`ObjectLocalizer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Localization {
    pub label: String,
    pub confidence: f32,
    pub bbox: RawBox,
}

/// One hypothesis returned by a [`TextRecognizer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCandidate {
    pub text: String,
    pub confidence: f32,
}

impl TextCandidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Sequence decoding strategy for CTC-style recognizers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Decoder {
    Greedy,
    BeamSearch { width: usize },
}

/// Options passed with every recognition call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    /// Characters the recognizer may emit; everything else is masked out
    pub allowed_charset: String,
    pub decoder: Decoder,
}

/// Characters that appear on plates
pub const PLATE_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-";

impl RecognitionOptions {
    /// Options used for plate reading: plate charset, beam search over short strings
    pub fn plate() -> Self {
        Self {
            allowed_charset: PLATE_CHARSET.to_string(),
            decoder: Decoder::BeamSearch { width: 5 },
        }
    }
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self::plate()
    }
}

/// Object localization capability (one invocation per image).
///
/// Implementations hold frozen model weights, are created once per process
/// and shared read-only behind an `Arc`.
pub trait ObjectLocalizer: Send + Sync {
    /// Short identifier used in logs and readiness output
    fn name(&self) -> &str;

    fn localize(&self, image: &DynamicImage) -> Result<Vec<Localization>>;
}

/// Text recognition capability. Processes one image per call (batch size 1)
/// and may return zero or more competing hypotheses.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn read_text(
        &self,
        image: &DynamicImage,
        options: &RecognitionOptions,
    ) -> Result<Vec<TextCandidate>>;
}
