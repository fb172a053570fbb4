use crate::model::{Localization, RawBox};
use common::vehicles::{BoundingBox, VehicleClass};
use image::DynamicImage;

/// A vehicle-class region cut out of the source image
#[derive(Debug, Clone)]
pub struct RegionCrop {
    /// Position in the localizer's output, counting only vehicle regions
    pub index: usize,
    pub class: VehicleClass,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub image: DynamicImage,
}

/// Turns localizer output into vehicle crops.
///
/// Only labels that map onto a [`VehicleClass`] survive. Boxes are clipped to
/// the image and order follows the localizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegionSelector;

impl RegionSelector {
    pub fn new() -> Self {
        Self
    }

    pub fn select(&self, image: &DynamicImage, localizations: &[Localization]) -> Vec<RegionCrop> {
        let mut crops = Vec::new();

        for localization in localizations {
            let Some(class) = VehicleClass::from_label(&localization.label) else {
                tracing::trace!(label = %localization.label, "ignoring non-vehicle region");
                continue;
            };

            let Some(bbox) = clip_to_image(&localization.bbox, image.width(), image.height())
            else {
                tracing::debug!(
                    label = %localization.label,
                    "skipping region with no area inside the image"
                );
                continue;
            };

            crops.push(RegionCrop {
                index: crops.len(),
                class,
                confidence: localization.confidence.clamp(0.0, 1.0),
                bbox,
                image: image.crop_imm(bbox.x1, bbox.y1, bbox.width(), bbox.height()),
            });
        }

        crops
    }
}

/// Truncate to integer pixels and clamp to `[0, width] x [0, height]`.
/// Returns `None` when nothing of the box remains.
fn clip_to_image(raw: &RawBox, width: u32, height: u32) -> Option<BoundingBox> {
    let clamp = |v: f32, max: u32| -> u32 {
        if v.is_nan() || v <= 0.0 {
            0
        } else {
            (v as u32).min(max)
        }
    };

    let bbox = BoundingBox {
        x1: clamp(raw.x1, width),
        y1: clamp(raw.y1, height),
        x2: clamp(raw.x2, width),
        y2: clamp(raw.y2, height),
    };

    if bbox.is_empty() {
        None
    } else {
        Some(bbox)
    }
}
