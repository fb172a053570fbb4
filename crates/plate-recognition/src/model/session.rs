//! ONNX Runtime session construction shared by the model adapters

use anyhow::{Context, Result};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    #[default]
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "CUDA")]
    Cuda,
    #[serde(rename = "TensorRT")]
    TensorRt,
}

impl FromStr for ExecutionProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "CPU" => Ok(Self::Cpu),
            "CUDA" => Ok(Self::Cuda),
            "TENSORRT" => Ok(Self::TensorRt),
            other => anyhow::bail!("unknown execution provider '{}'", other),
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "CPU",
            Self::Cuda => "CUDA",
            Self::TensorRt => "TensorRT",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Preferred execution provider; falls back towards CPU
    #[serde(default)]
    pub execution_provider: ExecutionProvider,

    /// GPU device ID (0, 1, 2, etc.)
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Number of inter-operation threads
    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

/// Load a model, returning the session and the provider it actually runs on
pub fn create_session(model_path: &str, config: &RuntimeConfig) -> Result<(Session, ExecutionProvider)> {
    if !std::path::Path::new(model_path).is_file() {
        anyhow::bail!("model file not found: {}", model_path);
    }

    match config.execution_provider {
        ExecutionProvider::TensorRt => {
            tracing::info!("Attempting TensorRT for {}", model_path);
            let result = Session::builder()
                .context("Failed to create session builder")?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .context("Failed to set optimization level")?
                .with_intra_threads(config.intra_threads)
                .context("Failed to set intra threads")?
                .with_inter_threads(config.inter_threads)
                .context("Failed to set inter threads")?
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(config.device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(config.device_id)
                        .build(),
                    CPUExecutionProvider::default().build(),
                ])
                .context("Failed to set execution providers")?
                .commit_from_file(model_path);

            match result {
                Ok(session) => Ok((session, ExecutionProvider::TensorRt)),
                Err(e) => {
                    tracing::warn!("TensorRT failed, trying CUDA: {}", e);
                    try_cuda(model_path, config)
                }
            }
        }
        ExecutionProvider::Cuda => try_cuda(model_path, config),
        ExecutionProvider::Cpu => try_cpu(model_path, config),
    }
}

fn try_cuda(model_path: &str, config: &RuntimeConfig) -> Result<(Session, ExecutionProvider)> {
    tracing::info!("Attempting CUDA for {}", model_path);
    let result = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(config.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(config.inter_threads)
        .context("Failed to set inter threads")?
        .with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])
        .context("Failed to set execution providers")?
        .commit_from_file(model_path);

    match result {
        Ok(session) => Ok((session, ExecutionProvider::Cuda)),
        Err(e) => {
            tracing::warn!("CUDA failed, using CPU: {}", e);
            try_cpu(model_path, config)
        }
    }
}

fn try_cpu(model_path: &str, config: &RuntimeConfig) -> Result<(Session, ExecutionProvider)> {
    tracing::info!("Using CPU for {}", model_path);
    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(config.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(config.inter_threads)
        .context("Failed to set inter threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load model from {}", model_path))?;
    Ok((session, ExecutionProvider::Cpu))
}
