use super::color::ColorClassifier;
use super::plate::{PlateTextExtractor, DEFAULT_PLATE_THRESHOLD};
use super::region::RegionSelector;
use crate::error::RecognitionError;
use crate::model::{ObjectLocalizer, TextRecognizer};
use common::vehicles::VehicleDetection;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics::{RECOGNITION_INFERENCE_TIME, RECOGNITION_REQUESTS};
use tokio::task::JoinHandle;
use tokio::time::timeout_at;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Plate readings must strictly exceed this confidence
    #[serde(default = "default_plate_threshold")]
    pub plate_threshold: f32,

    /// Seed for color clustering
    #[serde(default = "default_color_seed")]
    pub color_seed: u64,

    /// Budget for each inference stage
    #[serde(default = "default_inference_timeout", with = "duration_secs")]
    pub inference_timeout: Duration,

    /// Report `NoDetection` unless at least one vehicle has a readable plate
    #[serde(default)]
    pub require_plate: bool,
}

fn default_plate_threshold() -> f32 {
    DEFAULT_PLATE_THRESHOLD
}

fn default_color_seed() -> u64 {
    42
}

fn default_inference_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plate_threshold: default_plate_threshold(),
            color_seed: default_color_seed(),
            inference_timeout: default_inference_timeout(),
            require_plate: false,
        }
    }
}

/// Image in, vehicle detections out.
///
/// Holds the model handles for the lifetime of the process; cloning is cheap
/// and shares them.
#[derive(Clone)]
pub struct RecognitionPipeline {
    localizer: Arc<dyn ObjectLocalizer>,
    selector: RegionSelector,
    color: ColorClassifier,
    plate: PlateTextExtractor,
    config: PipelineConfig,
}

impl RecognitionPipeline {
    pub fn new(
        localizer: Arc<dyn ObjectLocalizer>,
        recognizer: Arc<dyn TextRecognizer>,
        config: PipelineConfig,
    ) -> Self {
        tracing::info!(
            localizer = localizer.name(),
            recognizer = recognizer.name(),
            plate_threshold = config.plate_threshold,
            timeout_secs = config.inference_timeout.as_secs_f64(),
            "recognition pipeline ready"
        );
        Self {
            localizer,
            selector: RegionSelector::new(),
            color: ColorClassifier::new(config.color_seed),
            plate: PlateTextExtractor::new(recognizer, config.plate_threshold),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn localizer_name(&self) -> &str {
        self.localizer.name()
    }

    /// Decode uploaded bytes and recognize every vehicle in them.
    ///
    /// An empty result is reported as [`RecognitionError::NoDetection`].
    pub async fn detect_vehicles(
        &self,
        image_bytes: &[u8],
    ) -> Result<Vec<VehicleDetection>, RecognitionError> {
        let result = self.detect_inner(image_bytes).await;
        let outcome = match &result {
            Ok(_) => "detected",
            Err(e) => e.outcome(),
        };
        RECOGNITION_REQUESTS.with_label_values(&[outcome]).inc();
        result
    }

    async fn detect_inner(
        &self,
        image_bytes: &[u8],
    ) -> Result<Vec<VehicleDetection>, RecognitionError> {
        if image_bytes.is_empty() {
            return Err(RecognitionError::invalid_image("image is empty"));
        }
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| RecognitionError::invalid_image(format!("cannot decode image: {}", e)))?;

        let mut detections = self.recognize(image).await?;
        if self.config.require_plate {
            detections.retain(VehicleDetection::has_plate);
        }
        if detections.is_empty() {
            return Err(RecognitionError::NoDetection);
        }
        Ok(detections)
    }

    /// Run the full pipeline on a decoded image. Detections follow the
    /// localizer's order; an empty list is not an error here.
    pub async fn recognize(
        &self,
        image: DynamicImage,
    ) -> Result<Vec<VehicleDetection>, RecognitionError> {
        let image = Arc::new(image);

        let start = Instant::now();
        let localizer = self.localizer.clone();
        let input = image.clone();
        let localize: JoinHandle<Result<_, RecognitionError>> =
            tokio::task::spawn_blocking(move || {
                localizer.localize(&input).map_err(|e| {
                    RecognitionError::model(format!("{} localization failed", localizer.name()), e)
                })
            });
        let localizations = self
            .await_stage(localize, Instant::now() + self.config.inference_timeout)
            .await?;
        RECOGNITION_INFERENCE_TIME
            .with_label_values(&["localize"])
            .observe(start.elapsed().as_secs_f64());

        let crops = self.selector.select(&image, &localizations);
        tracing::debug!(
            localized = localizations.len(),
            vehicles = crops.len(),
            "regions selected"
        );

        // Fan crops out onto the blocking pool; handles keep crop order
        let deadline = Instant::now() + self.config.inference_timeout;
        let handles: Vec<_> = crops
            .into_iter()
            .map(|crop| {
                let color = self.color.clone();
                let plate = self.plate.clone();
                tokio::task::spawn_blocking(move || -> Result<_, RecognitionError> {
                    let crop_start = Instant::now();
                    let color_name = color.classify(&crop.image);
                    let reading = plate.extract(&crop.image)?;
                    RECOGNITION_INFERENCE_TIME
                        .with_label_values(&["crop"])
                        .observe(crop_start.elapsed().as_secs_f64());
                    Ok(VehicleDetection {
                        bounding_box: crop.bbox,
                        vehicle_label: crop.class,
                        detection_confidence: crop.confidence,
                        color_name: color_name.to_string(),
                        plate_confidence: reading.as_ref().map(|r| r.confidence),
                        plate_text: reading.map(|r| r.text),
                    })
                })
            })
            .collect();

        let mut detections = Vec::with_capacity(handles.len());
        for handle in handles {
            detections.push(self.await_stage(handle, deadline).await?);
        }

        tracing::info!(
            vehicles = detections.len(),
            plates = detections.iter().filter(|d| d.has_plate()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "image recognized"
        );
        Ok(detections)
    }

    async fn await_stage<T>(
        &self,
        handle: JoinHandle<Result<T, RecognitionError>>,
        deadline: Instant,
    ) -> Result<T, RecognitionError> {
        match timeout_at(deadline.into(), handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(RecognitionError::model(
                "inference worker failed",
                anyhow::Error::new(join_error),
            )),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.inference_timeout.as_secs_f64(),
                    "inference timed out"
                );
                Err(RecognitionError::Timeout(self.config.inference_timeout))
            }
        }
    }
}
