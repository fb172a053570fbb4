//! Mock model capabilities for tests, demos and model-less deployments

use super::{Localization, ObjectLocalizer, RawBox, RecognitionOptions, TextCandidate, TextRecognizer};
use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Localizer that reports a fixed set of objects for every image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticLocalizer {
    #[serde(default)]
    localizations: Vec<Localization>,
}

impl StaticLocalizer {
    pub fn new(localizations: Vec<Localization>) -> Self {
        Self { localizations }
    }

    /// Localizer that never finds anything
    pub fn empty() -> Self {
        Self::default()
    }

    /// Convenience for a single object
    pub fn single(label: &str, confidence: f32, bbox: (f32, f32, f32, f32)) -> Self {
        Self::new(vec![Localization {
            label: label.to_string(),
            confidence,
            bbox: RawBox {
                x1: bbox.0,
                y1: bbox.1,
                x2: bbox.2,
                y2: bbox.3,
            },
        }])
    }

    /// One object covering the whole image, sized at call time
    pub fn whole_image(label: &str, confidence: f32) -> WholeImageLocalizer {
        WholeImageLocalizer {
            label: label.to_string(),
            confidence,
        }
    }
}

impl ObjectLocalizer for StaticLocalizer {
    fn name(&self) -> &str {
        "mock_static"
    }

    fn localize(&self, _image: &DynamicImage) -> Result<Vec<Localization>> {
        Ok(self.localizations.clone())
    }
}

/// Localizer reporting one object spanning the full input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WholeImageLocalizer {
    label: String,
    confidence: f32,
}

impl ObjectLocalizer for WholeImageLocalizer {
    fn name(&self) -> &str {
        "mock_whole_image"
    }

    fn localize(&self, image: &DynamicImage) -> Result<Vec<Localization>> {
        Ok(vec![Localization {
            label: self.label.clone(),
            confidence: self.confidence,
            bbox: RawBox {
                x1: 0.0,
                y1: 0.0,
                x2: image.width() as f32,
                y2: image.height() as f32,
            },
        }])
    }
}

type RecognizeFn = dyn Fn(&DynamicImage) -> Result<Vec<TextCandidate>> + Send + Sync;

/// Recognizer returning scripted hypotheses
pub struct ScriptedRecognizer {
    script: Box<RecognizeFn>,
}

impl ScriptedRecognizer {
    /// Same candidates for every call
    pub fn fixed(candidates: Vec<TextCandidate>) -> Self {
        Self {
            script: Box::new(move |_| Ok(candidates.clone())),
        }
    }

    /// Recognizer that never reads anything
    pub fn silent() -> Self {
        Self::fixed(Vec::new())
    }

    /// Candidates computed from the image handed to the recognizer
    pub fn from_fn<F>(script: F) -> Self
    where
        F: Fn(&DynamicImage) -> Result<Vec<TextCandidate>> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
        }
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "mock_scripted"
    }

    fn read_text(
        &self,
        image: &DynamicImage,
        _options: &RecognitionOptions,
    ) -> Result<Vec<TextCandidate>> {
        (self.script)(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(40, 20))
    }

    #[test]
    fn test_static_localizer() {
        let localizer = StaticLocalizer::single("car", 0.9, (1.0, 2.0, 30.0, 15.0));
        let found = localizer.localize(&image()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "car");
        assert!(StaticLocalizer::empty().localize(&image()).unwrap().is_empty());
    }

    #[test]
    fn test_whole_image_localizer() {
        let found = StaticLocalizer::whole_image("bus", 0.8)
            .localize(&image())
            .unwrap();
        assert_eq!(found[0].bbox.x2, 40.0);
        assert_eq!(found[0].bbox.y2, 20.0);
    }

    #[test]
    fn test_scripted_recognizer() {
        let recognizer = ScriptedRecognizer::fixed(vec![TextCandidate::new("AB-12", 0.7)]);
        let options = RecognitionOptions::plate();
        assert_eq!(recognizer.read_text(&image(), &options).unwrap()[0].text, "AB-12");

        let by_size = ScriptedRecognizer::from_fn(|img| {
            Ok(vec![TextCandidate::new(img.width().to_string(), 0.9)])
        });
        assert_eq!(by_size.read_text(&image(), &options).unwrap()[0].text, "40");

        let failing = ScriptedRecognizer::from_fn(|_| Err(anyhow::anyhow!("runtime fault")));
        assert!(failing.read_text(&image(), &options).is_err());
    }
}
