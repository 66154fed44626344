// THEORY:
// The `TeamClassifier` turns anonymous "player" detections into members of one of
// two teams. It knows nothing about football rules; it only knows that the two
// teams wear different shirts.
//
// Key architectural principles:
// 1.  **Colour fingerprint**: Every player crop is reduced to a `ColorSample`, the
//     mean CIELAB colour of the crop's centre (see `crop`).
// 2.  **Fit once, then freeze**: All samples from the whole video are clustered in a
//     single 2-means fit. The resulting `TeamModel` is immutable. Classifying frames
//     against a model that was still moving would label the same shirt differently
//     at different points in the match.
// 3.  **Reproducibility**: Initialisation is k-means++ driven by a seeded ChaCha
//     generator, with several restarts keeping the lowest inertia. The same samples
//     and seed always give the same centroids in the same order.
// 4.  **Arbitrary but stable labels**: Cluster 0 is `Team1` and cluster 1 is `Team2`.
//     Which real team that is depends on the clustering, not on who appeared first.
//     Ties (including the all-identical-shirts degenerate case) go to cluster 0.

use crate::config::ClusteringConfig;
use crate::core_modules::crop::crop::PlayerCrop;
use crate::core_modules::detection::{Detection, Team};
use crate::core_modules::pixel::pixel::Lab;
use crate::error::{PossessionError, Result};
use image::RgbImage;
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

const CLUSTER_COUNT: usize = 2;

/// The colour fingerprint of one player crop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorSample(pub Lab);

impl ColorSample {
    pub fn new(l: f64, a: f64, b: f64) -> Self {
        Self(Lab::new(l, a, b))
    }

    pub fn lab(&self) -> &Lab {
        &self.0
    }

    fn distance_squared(&self, other: &ColorSample) -> f64 {
        self.0.distance_squared(&other.0)
    }
}

/// Two jersey-colour centroids. Index 0 is `Team1`, index 1 is `Team2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamModel {
    pub centroids: [ColorSample; CLUSTER_COUNT],
}

impl TeamModel {
    pub fn new(centroids: [ColorSample; CLUSTER_COUNT]) -> Self {
        Self { centroids }
    }

    /// Index of the nearest centroid; the lower index wins a tie.
    pub fn nearest_cluster(&self, sample: &ColorSample) -> usize {
        nearest(&self.centroids, sample).0
    }

    pub fn predict(&self, sample: &ColorSample) -> Team {
        Team::from_cluster_index(self.nearest_cluster(sample))
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Owns the clustering parameters and, once fitted, the `TeamModel`.
#[derive(Debug, Clone)]
pub struct TeamClassifier {
    config: ClusteringConfig,
    model: Option<TeamModel>,
}

impl TeamClassifier {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// A classifier around a previously fitted (e.g. reloaded) model.
    pub fn with_model(config: ClusteringConfig, model: TeamModel) -> Self {
        Self {
            config,
            model: Some(model),
        }
    }

    pub fn model(&self) -> Option<&TeamModel> {
        self.model.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Mean Lab colour of the central 50% × 50% of the crop.
    /// `None` when the crop is too small to have a centre.
    pub fn collect_sample(crop: &PlayerCrop) -> Option<ColorSample> {
        crop.central_region()?.average_lab().map(ColorSample)
    }

    /// Cuts the detection out of the frame and fingerprints it.
    pub fn sample_detection(frame: &RgbImage, detection: &Detection) -> Option<ColorSample> {
        let pixel_box = detection.to_pixel_box(frame.width(), frame.height());
        let crop = PlayerCrop::from_frame(frame, &pixel_box)?;
        Self::collect_sample(&crop)
    }

    /// Runs the one-time 2-means fit. A classifier that already holds a model,
    /// fitted or reloaded, refuses to fit again.
    pub fn fit(&mut self, samples: &[ColorSample]) -> Result<&TeamModel> {
        if self.model.is_some() {
            return Err(PossessionError::AlreadyFitted);
        }
        if samples.len() < CLUSTER_COUNT {
            return Err(PossessionError::InsufficientData {
                samples: samples.len(),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut best: Option<(TeamModel, f64)> = None;

        for restart in 0..self.config.restarts.max(1) {
            let initial = kmeans_plus_plus(samples, &mut rng);
            let (centroids, inertia, iterations) = lloyd(samples, initial, &self.config);
            debug!("Clustering restart {restart}: inertia {inertia:.3} after {iterations} iterations");

            let improved = match &best {
                Some((_, best_inertia)) => inertia < *best_inertia,
                None => true,
            };
            if improved {
                best = Some((TeamModel::new(centroids), inertia));
            }
        }

        let (model, inertia) = best.ok_or(PossessionError::InsufficientData {
            samples: samples.len(),
        })?;
        info!(
            "Fitted team model from {} samples (inertia {:.3}): Team1 {:?}, Team2 {:?}",
            samples.len(),
            inertia,
            model.centroids[0].lab(),
            model.centroids[1].lab()
        );
        let model = self.model.insert(model);
        Ok(&*model)
    }

    pub fn classify_sample(&self, sample: &ColorSample) -> Result<Team> {
        let model = self.model.as_ref().ok_or(PossessionError::NotFitted)?;
        Ok(model.predict(sample))
    }

    /// Team of the player in `crop`; `Ok(None)` when the crop is too small to sample.
    pub fn classify(&self, crop: &PlayerCrop) -> Result<Option<Team>> {
        let model = self.model.as_ref().ok_or(PossessionError::NotFitted)?;
        Ok(Self::collect_sample(crop).map(|sample| model.predict(&sample)))
    }
}

fn nearest(centroids: &[ColorSample; CLUSTER_COUNT], sample: &ColorSample) -> (usize, f64) {
    let mut best_index = 0;
    let mut best_distance = centroids[0].distance_squared(sample);
    for (index, centroid) in centroids.iter().enumerate().skip(1) {
        let distance = centroid.distance_squared(sample);
        if distance < best_distance {
            best_distance = distance;
            best_index = index;
        }
    }
    (best_index, best_distance)
}

/// k-means++ seeding for two clusters.
fn kmeans_plus_plus(samples: &[ColorSample], rng: &mut ChaCha8Rng) -> [ColorSample; CLUSTER_COUNT] {
    let first = samples[rng.gen_range(0..samples.len())];

    let weights: Vec<f64> = samples.iter().map(|s| s.distance_squared(&first)).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        // Every sample is identical; the clusters coincide.
        return [first, first];
    }

    let target = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    let mut second = first;
    for (sample, weight) in samples.iter().zip(&weights) {
        if *weight <= 0.0 {
            continue;
        }
        second = *sample;
        cumulative += weight;
        if cumulative > target {
            break;
        }
    }
    [first, second]
}

/// Lloyd iterations. Returns the centroids, their inertia and the iteration count.
fn lloyd(
    samples: &[ColorSample],
    mut centroids: [ColorSample; CLUSTER_COUNT],
    config: &ClusteringConfig,
) -> ([ColorSample; CLUSTER_COUNT], f64, usize) {
    let tolerance_sq = config.tolerance * config.tolerance;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;

        let mut sums = [[0.0f64; 3]; CLUSTER_COUNT];
        let mut counts = [0usize; CLUSTER_COUNT];
        for sample in samples {
            let (cluster, _) = nearest(&centroids, sample);
            let lab = sample.lab();
            sums[cluster][0] += lab.l;
            sums[cluster][1] += lab.a;
            sums[cluster][2] += lab.b;
            counts[cluster] += 1;
        }

        let mut max_shift_sq = 0.0f64;
        for cluster in 0..CLUSTER_COUNT {
            // An empty cluster keeps its previous centroid.
            if counts[cluster] == 0 {
                continue;
            }
            let n = counts[cluster] as f64;
            let updated = ColorSample::new(sums[cluster][0] / n, sums[cluster][1] / n, sums[cluster][2] / n);
            max_shift_sq = max_shift_sq.max(updated.distance_squared(&centroids[cluster]));
            centroids[cluster] = updated;
        }

        if max_shift_sq <= tolerance_sq {
            break;
        }
    }

    let inertia = samples.iter().map(|s| nearest(&centroids, s).1).sum();
    (centroids, inertia, iterations)
}
