//! YOLOv8 object localizer using ONNX Runtime

use super::session::{create_session, ExecutionProvider, RuntimeConfig};
use super::{Localization, ObjectLocalizer, RawBox};
use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloV8Config {
    /// Path to the ONNX model file
    pub model_path: String,

    /// Confidence threshold for detections (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU threshold for per-class NMS
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of detections per image
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Model input size (width and height)
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Class names indexed by model class id (default: COCO 80 classes)
    #[serde(default = "default_coco_classes")]
    pub class_names: Vec<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_confidence() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_max_detections() -> usize {
    300
}

fn default_input_size() -> u32 {
    640
}

fn default_coco_classes() -> Vec<String> {
    [
        "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
        "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
        "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
        "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
        "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
        "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
        "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
        "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
        "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
        "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
        "toothbrush",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for YoloV8Config {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            input_size: default_input_size(),
            class_names: default_coco_classes(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Candidate box before NMS: (box, score, class index)
type Candidate = (RawBox, f32, usize);

/// YOLOv8 localizer. The session is loaded once and reused for every image.
pub struct YoloV8Localizer {
    config: YoloV8Config,
    session: Mutex<Session>,
    provider: ExecutionProvider,
}

impl YoloV8Localizer {
    pub fn load(config: YoloV8Config) -> Result<Self> {
        let (session, provider) = create_session(&config.model_path, &config.runtime)?;
        tracing::info!(
            "Initialized YOLOv8 localizer - path: {}, provider: {}, device: {}",
            config.model_path,
            provider,
            config.runtime.device_id
        );
        Ok(Self {
            config,
            session: Mutex::new(session),
            provider,
        })
    }

    pub fn provider(&self) -> ExecutionProvider {
        self.provider
    }

    /// Resize to the model input and convert to NCHW floats in [0, 1]
    fn preprocess_image(&self, img: &DynamicImage) -> Array<f32, IxDyn> {
        let size = self.config.input_size;
        let resized = img.resize_exact(size, size, image::imageops::FilterType::Triangle);
        let rgb_img = resized.to_rgb8();

        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
        for (x, y, pixel) in rgb_img.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }
        input
    }
}

impl ObjectLocalizer for YoloV8Localizer {
    fn name(&self) -> &str {
        "yolov8"
    }

    fn localize(&self, image: &DynamicImage) -> Result<Vec<Localization>> {
        let input_tensor = Value::from_array(self.preprocess_image(image))?;

        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| anyhow!("Failed to lock detection session: {}", e))?;
            let outputs = session.run(ort::inputs![input_tensor])?;

            // Exports differ in output naming
            let output_value = outputs
                .get("output0")
                .or_else(|| outputs.get("output"))
                .context("No detection output tensor found (tried: output0, output)")?;
            let (shape, data) = output_value.try_extract_tensor::<f32>()?;
            let shape_usize: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?
        };

        decode_predictions(&output, &self.config, image.width(), image.height())
    }
}

/// Turn a `[1, 4 + classes, N]` YOLOv8 output into localizations ordered by
/// confidence, highest first.
fn decode_predictions(
    output: &Array<f32, IxDyn>,
    config: &YoloV8Config,
    original_width: u32,
    original_height: u32,
) -> Result<Vec<Localization>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] <= 4 {
        return Err(anyhow!("unexpected YOLOv8 output shape {:?}", shape));
    }

    let scale_x = original_width as f32 / config.input_size as f32;
    let scale_y = original_height as f32 / config.input_size as f32;
    let num_classes = shape[1] - 4;
    let num_predictions = shape[2];

    let mut candidates: Vec<Candidate> = Vec::new();
    for i in 0..num_predictions {
        let mut max_class_score = 0.0f32;
        let mut max_class_idx = 0;
        for class_idx in 0..num_classes {
            let score = output[[0, 4 + class_idx, i]];
            if score > max_class_score {
                max_class_score = score;
                max_class_idx = class_idx;
            }
        }

        if max_class_score < config.confidence_threshold {
            continue;
        }

        // (cx, cy, w, h) in model space
        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        candidates.push((
            RawBox {
                x1: (cx - w / 2.0) * scale_x,
                y1: (cy - h / 2.0) * scale_y,
                x2: (cx + w / 2.0) * scale_x,
                y2: (cy + h / 2.0) * scale_y,
            },
            max_class_score,
            max_class_idx,
        ));
    }

    let kept = nms(candidates, config.iou_threshold);

    Ok(kept
        .into_iter()
        .take(config.max_detections)
        .map(|(bbox, confidence, class_idx)| Localization {
            label: config
                .class_names
                .get(class_idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", class_idx)),
            confidence,
            bbox,
        })
        .collect())
}

/// Per-class Non-Maximum Suppression; output is sorted by score descending
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = keep
            .iter()
            .any(|k| k.2 == candidate.2 && iou(&k.0, &candidate.0) >= iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection over Union
fn iou(a: &RawBox, b: &RawBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
