//! Dominant color naming for vehicle crops.
//!
//! Pixels of a downscaled crop are clustered with seeded k-means. The most
//! populous cluster wins (ties go to the lowest cluster index) and its
//! centroid is mapped to the nearest entry of [`PALETTE`].

use image::{imageops::FilterType, DynamicImage};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedColor {
    pub name: &'static str,
    pub rgb: [u8; 3],
}

const fn named(name: &'static str, r: u8, g: u8, b: u8) -> NamedColor {
    NamedColor {
        name,
        rgb: [r, g, b],
    }
}

/// Reference palette. Declaration order breaks distance ties.
pub const PALETTE: [NamedColor; 12] = [
    named("black", 0, 0, 0),
    named("gray", 128, 128, 128),
    named("white", 255, 255, 255),
    named("red", 255, 0, 0),
    named("green", 0, 128, 0),
    named("blue", 0, 0, 255),
    named("yellow", 255, 255, 0),
    named("cyan", 0, 255, 255),
    named("magenta", 255, 0, 255),
    named("orange", 255, 165, 0),
    named("purple", 128, 0, 128),
    named("brown", 165, 42, 42),
];

type Sample = [f64; 3];

fn distance_sq(a: &Sample, b: &Sample) -> f64 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

/// Index of the closest centroid; first one wins on equal distance
fn nearest(sample: &Sample, centroids: &[Sample]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = distance_sq(sample, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// Result of one k-means run
struct Clustering {
    centroids: Vec<Sample>,
    counts: Vec<usize>,
    inertia: f64,
}

#[derive(Debug, Clone)]
pub struct ColorClassifier {
    seed: u64,
    canonical_size: u32,
    clusters: usize,
    restarts: usize,
    max_iterations: usize,
}

impl ColorClassifier {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            canonical_size: 50,
            clusters: 3,
            restarts: 10,
            max_iterations: 300,
        }
    }

    /// Name of the dominant color of `crop`
    pub fn classify(&self, crop: &DynamicImage) -> &'static str {
        Self::nearest_palette(self.dominant_rgb(crop)).name
    }

    /// Rounded centroid of the most populous cluster
    pub fn dominant_rgb(&self, crop: &DynamicImage) -> [u8; 3] {
        let size = self.canonical_size;
        let resized = crop.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        let samples: Vec<Sample> = resized
            .pixels()
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<Clustering> = None;
        for _ in 0..self.restarts {
            let run = self.kmeans(&samples, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        let Some(best) = best else {
            return [0, 0, 0];
        };

        let mut winner = 0;
        for (i, count) in best.counts.iter().enumerate() {
            if *count > best.counts[winner] {
                winner = i;
            }
        }

        let c = best.centroids[winner];
        [
            c[0].round().clamp(0.0, 255.0) as u8,
            c[1].round().clamp(0.0, 255.0) as u8,
            c[2].round().clamp(0.0, 255.0) as u8,
        ]
    }

    /// Closest palette entry by Euclidean distance in RGB
    pub fn nearest_palette(rgb: [u8; 3]) -> &'static NamedColor {
        let sample = [rgb[0] as f64, rgb[1] as f64, rgb[2] as f64];
        let mut best = &PALETTE[0];
        let mut best_distance = f64::INFINITY;
        for entry in PALETTE.iter() {
            let reference = [entry.rgb[0] as f64, entry.rgb[1] as f64, entry.rgb[2] as f64];
            let d = distance_sq(&sample, &reference);
            if d < best_distance {
                best = entry;
                best_distance = d;
            }
        }
        best
    }

    fn kmeans(&self, samples: &[Sample], rng: &mut StdRng) -> Clustering {
        let mut centroids = kmeans_plus_plus(samples, self.clusters, rng);
        let k = centroids.len();
        let mut assignments = vec![usize::MAX; samples.len()];

        for _ in 0..self.max_iterations {
            let mut changed = false;
            for (slot, sample) in assignments.iter_mut().zip(samples) {
                let (cluster, _) = nearest(sample, &centroids);
                if *slot != cluster {
                    *slot = cluster;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = vec![[0.0f64; 3]; k];
            let mut counts = vec![0usize; k];
            for (cluster, sample) in assignments.iter().zip(samples) {
                sums[*cluster][0] += sample[0];
                sums[*cluster][1] += sample[1];
                sums[*cluster][2] += sample[2];
                counts[*cluster] += 1;
            }
            // Empty clusters keep their previous centroid
            for (i, centroid) in centroids.iter_mut().enumerate() {
                if counts[i] > 0 {
                    let n = counts[i] as f64;
                    *centroid = [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n];
                }
            }
        }

        let mut counts = vec![0usize; k];
        let mut inertia = 0.0;
        for sample in samples {
            let (cluster, d) = nearest(sample, &centroids);
            counts[cluster] += 1;
            inertia += d;
        }

        Clustering {
            centroids,
            counts,
            inertia,
        }
    }
}

impl Default for ColorClassifier {
    fn default() -> Self {
        Self::new(42)
    }
}

/// k-means++ seeding: first centroid uniform, the rest sampled with
/// probability proportional to squared distance from the nearest chosen one.
fn kmeans_plus_plus(samples: &[Sample], k: usize, rng: &mut StdRng) -> Vec<Sample> {
    if samples.is_empty() {
        return vec![[0.0; 3]; k];
    }

    let mut centroids = Vec::with_capacity(k);
    centroids.push(samples[rng.gen_range(0..samples.len())]);

    let mut min_distances: Vec<f64> = samples
        .iter()
        .map(|s| distance_sq(s, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = min_distances.iter().sum();
        let chosen = if total <= 0.0 {
            // All samples coincide with existing centroids
            rng.gen_range(0..samples.len())
        } else {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = samples.len() - 1;
            for (i, d) in min_distances.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        };

        let centroid = samples[chosen];
        for (slot, sample) in min_distances.iter_mut().zip(samples) {
            *slot = slot.min(distance_sq(sample, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}
