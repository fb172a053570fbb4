use anyhow::{anyhow, Context, Result};
use common::validation::validate_range;
use plate_recognition::model::session::ExecutionProvider;
use plate_recognition::PipelineConfig;
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where model capabilities come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    /// YOLOv8 + CRNN exported to ONNX
    Onnx,
    /// Built-in stand-ins for demos and tests: every image is one car, no plate is read
    Mock,
}

impl FromStr for ModelBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "mock" => Ok(Self::Mock),
            other => Err(anyhow!("unknown model backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,

    /// PostgreSQL URL; without it records live in memory
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    /// Directory holding driver photos and QR codes, served under `/static`
    pub storage_root: PathBuf,

    /// Origins allowed to call `/api/*`
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,

    pub model_backend: ModelBackend,
    pub detector_model_path: String,
    pub ocr_model_path: String,
    pub execution_provider: ExecutionProvider,
    pub device_id: i32,

    pub pipeline: PipelineConfig,
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_string("VEHICLE_SERVICE_ADDR", "127.0.0.1:5002")
            .parse()
            .context("invalid VEHICLE_SERVICE_ADDR")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        if database_url.is_none() {
            tracing::warn!("DATABASE_URL not set, vehicle records will be kept in memory only");
        }

        let cors_origins = env_string("CORS_ORIGINS", "http://localhost:5000,http://localhost:5001")
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let plate_threshold: f32 = env_parse("PLATE_CONFIDENCE_THRESHOLD", 0.5)?;
        validate_range(plate_threshold, 0.0, 1.0, "PLATE_CONFIDENCE_THRESHOLD")?;

        let timeout_secs: u64 = env_parse("INFERENCE_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(anyhow!("INFERENCE_TIMEOUT_SECS must be positive"));
        }

        Ok(Self {
            bind_addr,
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10)?,
            storage_root: PathBuf::from(env_string("STORAGE_ROOT", "static")),
            cors_origins,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 16 * 1024 * 1024)?,
            model_backend: env_parse("MODEL_BACKEND", ModelBackend::Onnx)?,
            detector_model_path: env_string("DETECTOR_MODEL_PATH", "models/yolov8n.onnx"),
            ocr_model_path: env_string("OCR_MODEL_PATH", "models/plate_ocr.onnx"),
            execution_provider: env_parse("EXECUTION_PROVIDER", ExecutionProvider::Cpu)?,
            device_id: env_parse("DEVICE_ID", 0)?,
            pipeline: PipelineConfig {
                plate_threshold,
                color_seed: env_parse("COLOR_SEED", 42)?,
                inference_timeout: Duration::from_secs(timeout_secs),
                require_plate: env_parse("DETECT_REQUIRE_PLATE", false)?,
            },
        })
    }
}
