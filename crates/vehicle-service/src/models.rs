//! Process-wide model handles, loaded once at startup
use crate::config::{ModelBackend, ServiceConfig};
use anyhow::{Context, Result};
use plate_recognition::model::crnn::{CrnnConfig, CrnnRecognizer};
use plate_recognition::model::mock::{ScriptedRecognizer, StaticLocalizer};
use plate_recognition::model::session::RuntimeConfig;
use plate_recognition::model::yolov8::{YoloV8Config, YoloV8Localizer};
use plate_recognition::{ObjectLocalizer, TextRecognizer};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ModelHandles {
    pub localizer: Arc<dyn ObjectLocalizer>,
    pub recognizer: Arc<dyn TextRecognizer>,
}

pub fn load_models(config: &ServiceConfig) -> Result<ModelHandles> {
    match config.model_backend {
        ModelBackend::Onnx => {
            let runtime = RuntimeConfig {
                execution_provider: config.execution_provider,
                device_id: config.device_id,
                ..RuntimeConfig::default()
            };

            let localizer = YoloV8Localizer::load(YoloV8Config {
                model_path: config.detector_model_path.clone(),
                runtime: runtime.clone(),
                ..YoloV8Config::default()
            })
            .context("failed to load vehicle detector")?;

            let recognizer = CrnnRecognizer::load(CrnnConfig {
                model_path: config.ocr_model_path.clone(),
                runtime,
                ..CrnnConfig::default()
            })
            .context("failed to load plate OCR model")?;

            info!(
                detector_provider = %localizer.provider(),
                ocr_provider = %recognizer.provider(),
                "ONNX models loaded"
            );
            Ok(ModelHandles {
                localizer: Arc::new(localizer),
                recognizer: Arc::new(recognizer),
            })
        }
        ModelBackend::Mock => {
            warn!("MODEL_BACKEND=mock: every image is reported as one car without a readable plate");
            Ok(ModelHandles {
                localizer: Arc::new(StaticLocalizer::whole_image("car", 1.0)),
                recognizer: Arc::new(ScriptedRecognizer::silent()),
            })
        }
    }
}
