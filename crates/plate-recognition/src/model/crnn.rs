//! CRNN plate text recognizer with CTC decoding using ONNX Runtime

use super::session::{create_session, ExecutionProvider, RuntimeConfig};
use super::{Decoder, RecognitionOptions, TextCandidate, TextRecognizer};
use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrnnConfig {
    /// Path to the OCR ONNX model file
    pub model_path: String,

    /// Input width for the OCR model
    #[serde(default = "default_input_width")]
    pub input_width: u32,

    /// Input height for the OCR model
    #[serde(default = "default_input_height")]
    pub input_height: u32,

    /// Character vocabulary; model class `i + 1` maps to `char_vocab[i]`, class 0 is the CTC blank
    #[serde(default = "default_char_vocab")]
    pub char_vocab: String,

    /// Set when the model emits raw logits instead of probabilities
    #[serde(default)]
    pub output_is_logits: bool,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_input_width() -> u32 {
    200
}

fn default_input_height() -> u32 {
    64
}

fn default_char_vocab() -> String {
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-".to_string()
}

impl Default for CrnnConfig {
    fn default() -> Self {
        Self {
            model_path: "models/plate_ocr.onnx".to_string(),
            input_width: default_input_width(),
            input_height: default_input_height(),
            char_vocab: default_char_vocab(),
            output_is_logits: false,
            runtime: RuntimeConfig::default(),
        }
    }
}

pub struct CrnnRecognizer {
    config: CrnnConfig,
    vocab: Vec<char>,
    session: Mutex<Session>,
    provider: ExecutionProvider,
}

impl CrnnRecognizer {
    pub fn load(config: CrnnConfig) -> Result<Self> {
        let (session, provider) = create_session(&config.model_path, &config.runtime)?;
        tracing::info!(
            "Initialized CRNN recognizer - path: {}, provider: {}, vocab size: {}",
            config.model_path,
            provider,
            config.char_vocab.chars().count()
        );
        Ok(Self {
            vocab: config.char_vocab.chars().collect(),
            config,
            session: Mutex::new(session),
            provider,
        })
    }

    pub fn provider(&self) -> ExecutionProvider {
        self.provider
    }

    /// Grayscale, resize and normalize to a `[1, 1, H, W]` tensor
    fn preprocess(&self, img: &DynamicImage) -> Array<f32, IxDyn> {
        let width = self.config.input_width;
        let height = self.config.input_height;
        let resized = img.resize_exact(width, height, image::imageops::FilterType::Triangle);
        let gray_img = resized.to_luma8();

        let mut input = Array::zeros(IxDyn(&[1, 1, height as usize, width as usize]));
        for (x, y, pixel) in gray_img.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        }
        input
    }
}

impl TextRecognizer for CrnnRecognizer {
    fn name(&self) -> &str {
        "crnn"
    }

    fn read_text(
        &self,
        image: &DynamicImage,
        options: &RecognitionOptions,
    ) -> Result<Vec<TextCandidate>> {
        let input_tensor = Value::from_array(self.preprocess(image))?;

        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| anyhow!("Failed to lock OCR session: {}", e))?;
            let outputs = session.run(ort::inputs![input_tensor])?;

            // Expected shape: [batch, sequence_length, vocab_size + 1]
            let output_value = outputs
                .get("output")
                .or_else(|| outputs.get("output0"))
                .or_else(|| outputs.get("logits"))
                .context("No OCR output tensor found (tried: output, output0, logits)")?;
            let (shape, data) = output_value.try_extract_tensor::<f32>()?;
            let shape_usize: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?
        };

        let log_probs = timestep_log_probs(
            &output,
            &self.vocab,
            &options.allowed_charset,
            self.config.output_is_logits,
        )?;

        Ok(match options.decoder {
            Decoder::Greedy => greedy_decode(&log_probs, &self.vocab).into_iter().collect(),
            Decoder::BeamSearch { width } => beam_search_decode(&log_probs, &self.vocab, width),
        })
    }
}

/// Convert a `[1, T, 1 + V]` output into per-timestep log probabilities.
///
/// Characters outside `allowed_charset` are masked and the remaining mass is
/// renormalized. The blank (index 0) is never masked.
fn timestep_log_probs(
    output: &Array<f32, IxDyn>,
    vocab: &[char],
    allowed_charset: &str,
    is_logits: bool,
) -> Result<Vec<Vec<f64>>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[2] != vocab.len() + 1 {
        return Err(anyhow!(
            "unexpected OCR output shape {:?} for vocabulary of {} characters",
            shape,
            vocab.len()
        ));
    }

    let allowed: Vec<bool> = std::iter::once(true)
        .chain(vocab.iter().map(|c| allowed_charset.contains(*c)))
        .collect();

    let mut steps = Vec::with_capacity(shape[1]);
    for t in 0..shape[1] {
        let mut row: Vec<f64> = (0..shape[2]).map(|c| output[[0, t, c]] as f64).collect();

        if is_logits {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.iter_mut().for_each(|v| *v = (*v - max).exp());
        }

        for (p, keep) in row.iter_mut().zip(&allowed) {
            if !keep || *p < 0.0 {
                *p = 0.0;
            }
        }

        let total: f64 = row.iter().sum();
        if total <= 0.0 {
            // Nothing usable at this step; treat as certain blank
            row.iter_mut().for_each(|p| *p = 0.0);
            row[0] = 1.0;
        } else {
            row.iter_mut().for_each(|p| *p /= total);
        }

        steps.push(row.into_iter().map(f64::ln).collect());
    }
    Ok(steps)
}

/// Length-normalized confidence: geometric mean of per-step probability
fn normalized_confidence(log_prob: f64, steps: usize) -> f32 {
    if steps == 0 {
        return 0.0;
    }
    (log_prob / steps as f64).exp() as f32
}

fn indices_to_text(indices: &[usize], vocab: &[char]) -> String {
    indices
        .iter()
        .filter_map(|&idx| vocab.get(idx - 1))
        .collect()
}

/// Best-path decoding: argmax per step, collapse repeats, drop blanks
fn greedy_decode(log_probs: &[Vec<f64>], vocab: &[char]) -> Option<TextCandidate> {
    let mut indices = Vec::new();
    let mut path_log_prob = 0.0;
    let mut prev_idx = 0; // CTC blank is index 0

    for step in log_probs {
        let mut max_idx = 0;
        for (c, lp) in step.iter().enumerate().skip(1) {
            if *lp > step[max_idx] {
                max_idx = c;
            }
        }
        path_log_prob += step[max_idx];

        if max_idx > 0 && max_idx != prev_idx {
            indices.push(max_idx);
        }
        prev_idx = max_idx;
    }

    let text = indices_to_text(&indices, vocab);
    if text.is_empty() {
        return None;
    }
    Some(TextCandidate::new(
        text,
        normalized_confidence(path_log_prob, log_probs.len()),
    ))
}

fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Prefix beam search keeping `width` prefixes, scored by the total
/// probability of every alignment that collapses to them.
fn beam_search_decode(log_probs: &[Vec<f64>], vocab: &[char], width: usize) -> Vec<TextCandidate> {
    let width = width.max(1);
    // prefix -> (log P ending in blank, log P ending in non-blank)
    let mut beams: Vec<(Vec<usize>, f64, f64)> = vec![(Vec::new(), 0.0, f64::NEG_INFINITY)];

    for step in log_probs {
        let mut next: HashMap<Vec<usize>, (f64, f64)> = HashMap::new();

        for (prefix, p_blank, p_non_blank) in &beams {
            let total = log_add(*p_blank, *p_non_blank);

            let entry = next
                .entry(prefix.clone())
                .or_insert((f64::NEG_INFINITY, f64::NEG_INFINITY));
            entry.0 = log_add(entry.0, total + step[0]);

            for (c, lp) in step.iter().enumerate().skip(1) {
                if *lp == f64::NEG_INFINITY {
                    continue;
                }

                let mut extended = prefix.clone();
                extended.push(c);

                if prefix.last() == Some(&c) {
                    // Repeat only extends across a blank; otherwise it collapses
                    let ext = next
                        .entry(extended)
                        .or_insert((f64::NEG_INFINITY, f64::NEG_INFINITY));
                    ext.1 = log_add(ext.1, p_blank + lp);

                    let same = next
                        .entry(prefix.clone())
                        .or_insert((f64::NEG_INFINITY, f64::NEG_INFINITY));
                    same.1 = log_add(same.1, p_non_blank + lp);
                } else {
                    let ext = next
                        .entry(extended)
                        .or_insert((f64::NEG_INFINITY, f64::NEG_INFINITY));
                    ext.1 = log_add(ext.1, total + lp);
                }
            }
        }

        let mut ranked: Vec<(Vec<usize>, f64, f64)> = next
            .into_iter()
            .map(|(prefix, (pb, pnb))| (prefix, pb, pnb))
            .collect();
        ranked.sort_by(|a, b| {
            log_add(b.1, b.2)
                .total_cmp(&log_add(a.1, a.2))
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(width);
        beams = ranked;
    }

    beams
        .into_iter()
        .filter(|(prefix, _, _)| !prefix.is_empty())
        .map(|(prefix, pb, pnb)| {
            TextCandidate::new(
                indices_to_text(&prefix, vocab),
                normalized_confidence(log_add(pb, pnb), log_probs.len()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vec<char> {
        default_char_vocab().chars().collect()
    }

    fn class_of(c: char) -> usize {
        vocab().iter().position(|v| *v == c).unwrap() + 1
    }

    /// Build a `[1, T, V + 1]` probability tensor where each step puts `peak`
    /// on the given class and spreads the rest evenly.
    fn probabilities(path: &[usize], peak: f32) -> Array<f32, IxDyn> {
        let classes = vocab().len() + 1;
        let rest = (1.0 - peak) / (classes - 1) as f32;
        let mut output = Array::from_elem(IxDyn(&[1, path.len(), classes]), rest);
        for (t, &class) in path.iter().enumerate() {
            output[[0, t, class]] = peak;
        }
        output
    }

    fn abc_path() -> Vec<usize> {
        vec![0, class_of('A'), class_of('B'), 0, class_of('C'), 0]
    }

    #[test]
    fn test_config_defaults() {
        let config = CrnnConfig::default();
        assert_eq!(config.input_width, 200);
        assert_eq!(config.input_height, 64);
        assert_eq!(config.char_vocab.len(), 37);
        assert!(!config.output_is_logits);
    }

    #[test]
    fn test_greedy_decode() {
        let output = probabilities(&abc_path(), 0.9);
        let log_probs = timestep_log_probs(&output, &vocab(), &default_char_vocab(), false).unwrap();

        let candidate = greedy_decode(&log_probs, &vocab()).unwrap();
        assert_eq!(candidate.text, "ABC");
        assert!((candidate.confidence - 0.9).abs() < 1e-3);
    }

    #[test]
    fn test_greedy_collapses_repeats_but_not_across_blank() {
        let a = class_of('A');
        let output = probabilities(&[a, a, 0, a, class_of('1')], 0.9);
        let log_probs = timestep_log_probs(&output, &vocab(), &default_char_vocab(), false).unwrap();

        assert_eq!(greedy_decode(&log_probs, &vocab()).unwrap().text, "AA1");
    }

    #[test]
    fn test_all_blank_yields_nothing() {
        let output = probabilities(&[0, 0, 0], 0.95);
        let log_probs = timestep_log_probs(&output, &vocab(), &default_char_vocab(), false).unwrap();

        assert!(greedy_decode(&log_probs, &vocab()).is_none());
        assert!(beam_search_decode(&log_probs, &vocab(), 5).is_empty());
    }

    #[test]
    fn test_beam_search_ranks_candidates() {
        let output = probabilities(&abc_path(), 0.8);
        let log_probs = timestep_log_probs(&output, &vocab(), &default_char_vocab(), false).unwrap();

        let candidates = beam_search_decode(&log_probs, &vocab(), 5);
        assert!(!candidates.is_empty());
        assert!(candidates.len() <= 5);
        assert_eq!(candidates[0].text, "ABC");
        for pair in candidates.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_beam_search_sums_alignments() {
        // Two steps: blank 0.4, 'A' 0.35, 'B' 0.25 at each.
        // Best path is blank-blank (empty), but "A" collects
        // A-A, A-blank and blank-A: 0.1225 + 0.14 + 0.14 > 0.16.
        let classes = vocab().len() + 1;
        let mut output = Array::zeros(IxDyn(&[1, 2, classes]));
        for t in 0..2 {
            output[[0, t, 0]] = 0.4;
            output[[0, t, class_of('A')]] = 0.35;
            output[[0, t, class_of('B')]] = 0.25;
        }
        let log_probs = timestep_log_probs(&output, &vocab(), &default_char_vocab(), false).unwrap();

        assert!(greedy_decode(&log_probs, &vocab()).is_none());
        let candidates = beam_search_decode(&log_probs, &vocab(), 5);
        assert_eq!(candidates[0].text, "A");
    }

    #[test]
    fn test_charset_mask_renormalizes() {
        // 'Z' dominates, but only digits are allowed
        let classes = vocab().len() + 1;
        let mut output = Array::zeros(IxDyn(&[1, 1, classes]));
        output[[0, 0, class_of('Z')]] = 0.7;
        output[[0, 0, class_of('7')]] = 0.2;
        output[[0, 0, 0]] = 0.1;

        let log_probs = timestep_log_probs(&output, &vocab(), "0123456789", false).unwrap();
        let candidate = greedy_decode(&log_probs, &vocab()).unwrap();
        assert_eq!(candidate.text, "7");
        assert!((candidate.confidence - 2.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let classes = vocab().len() + 1;
        let mut output = Array::from_elem(IxDyn(&[1, 1, classes]), -5.0f32);
        output[[0, 0, class_of('Q')]] = 5.0;

        let log_probs = timestep_log_probs(&output, &vocab(), &default_char_vocab(), true).unwrap();
        let total: f64 = log_probs[0].iter().map(|lp| lp.exp()).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(greedy_decode(&log_probs, &vocab()).unwrap().text, "Q");
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let output = Array::zeros(IxDyn(&[1, 4, 10]));
        assert!(timestep_log_probs(&output, &vocab(), &default_char_vocab(), false).is_err());
    }
}
