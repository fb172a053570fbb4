pub mod color;
pub mod orchestrator;
pub mod plate;
pub mod preprocess;
pub mod region;

pub use color::{ColorClassifier, NamedColor, PALETTE};
pub use plate::{
    accept, sanitize_plate_text, select_best, PlateReading, PlateTextExtractor,
    DEFAULT_PLATE_THRESHOLD,
};
pub use preprocess::VariantKind;
pub use region::{RegionCrop, RegionSelector};
