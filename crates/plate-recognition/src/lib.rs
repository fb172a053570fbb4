//! Vehicle and license plate recognition.
//!
//! An image flows through the [`pipeline::RegionSelector`], then every vehicle
//! crop goes through the [`pipeline::ColorClassifier`] and the
//! [`pipeline::PlateTextExtractor`]. [`RecognitionPipeline`] drives the whole
//! thing and owns the shared model handles.

pub mod error;
pub mod model;
pub mod pipeline;

pub use error::RecognitionError;
pub use model::{ObjectLocalizer, TextRecognizer};
pub use pipeline::orchestrator::{PipelineConfig, RecognitionPipeline};
