use crate::error::{Result, SegmentationError};
use crate::{Labels, Matrix, Vector};
use ndarray::ArrayView1;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Centroid initialization method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Init {
    /// Seeded k-means++: first centroid uniform, the rest weighted by squared
    /// distance to the nearest chosen centroid.
    #[default]
    #[serde(rename = "k-means++")]
    KMeansPlusPlus,
    /// k distinct points sampled uniformly without replacement.
    #[serde(rename = "random")]
    Random,
}

impl fmt::Display for Init {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Init::KMeansPlusPlus => write!(f, "k-means++"),
            Init::Random => write!(f, "random"),
        }
    }
}

impl FromStr for Init {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "k-means++" => Ok(Init::KMeansPlusPlus),
            "random" => Ok(Init::Random),
            _ => Err(format!("Invalid init method: {s}. Must be 'k-means++' or 'random'")),
        }
    }
}

/// Lloyd's K-Means with deterministic seeding.
///
/// Points are assigned to the nearest centroid (ties go to the lowest
/// centroid index), centroids move to the mean of their points, and the loop
/// stops once no label changes or `max_iter` iterations have run. Empty
/// clusters are reseeded with the point farthest from its nearest centroid.
///
/// Identical input order, `n_clusters`, `random_state`, `max_iter` and
/// `n_init` always produce bit-identical output.
#[derive(Clone, Debug)]
pub struct KMeans {
    n_clusters: usize,
    max_iter: usize,
    n_init: usize,
    random_state: u64,
    init: Init,
}

/// Result of a K-Means fit.
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansFit {
    /// Cluster label of each input row, in `[0, k)`
    pub labels: Labels,
    /// Final centroids, one row per cluster
    pub centroids: Matrix,
    /// Within-cluster sum of squared distances
    pub inertia: f64,
    /// Lloyd iterations run by the winning restart
    pub iterations: usize,
    /// False when the iteration cap was hit before labels stabilized
    pub converged: bool,
    /// Seed of the winning restart
    pub seed: u64,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            n_init: 10,
            random_state: 42,
            init: Init::KMeansPlusPlus,
        }
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Number of seeded restarts; the lowest-inertia fit is kept.
    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn fit(&self, x: &Matrix) -> Result<KMeansFit> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(SegmentationError::validation(
                "Input matrix must have at least one sample and one feature",
            ));
        }
        if self.max_iter == 0 {
            return Err(SegmentationError::Config("max_iter must be > 0".to_string()));
        }
        if self.n_init == 0 {
            return Err(SegmentationError::Config("n_init must be > 0".to_string()));
        }

        let distinct = distinct_rows(x);
        if self.n_clusters == 0 || self.n_clusters > distinct.len() {
            return Err(SegmentationError::InvalidClusterCount {
                k: self.n_clusters,
                distinct: distinct.len(),
            });
        }

        let mut best: Option<KMeansFit> = None;
        for restart in 0..self.n_init {
            let seed = self.random_state.wrapping_add(restart as u64);
            let fit = self.fit_single(x, &distinct, seed);
            debug!(
                restart,
                seed,
                inertia = fit.inertia,
                iterations = fit.iterations,
                converged = fit.converged,
                "k-means restart finished"
            );
            if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        best.ok_or_else(|| SegmentationError::Config("n_init must be > 0".to_string()))
    }

    fn fit_single(&self, x: &Matrix, distinct: &[usize], seed: u64) -> KMeansFit {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut centroids = match self.init {
            Init::KMeansPlusPlus => kmeans_plus_plus(x, self.n_clusters, &mut rng),
            Init::Random => random_points(x, distinct, self.n_clusters, &mut rng),
        };

        // Initial centroids are distinct input points, so no cluster starts empty.
        let mut labels = assign_labels(x, &centroids);
        let mut iterations = 0;
        let mut converged = false;

        for iteration in 1..=self.max_iter {
            iterations = iteration;
            update_centroids(x, &mut labels, &mut centroids);

            let new_labels = assign_labels(x, &centroids);
            let changed = labels
                .iter()
                .zip(new_labels.iter())
                .filter(|(old, new)| old != new)
                .count();
            debug!(iteration, changed, "lloyd iteration");

            if changed == 0 {
                converged = true;
                break;
            }
            labels = new_labels;
        }

        if !converged {
            // Leave the last labeling with every cluster populated.
            update_centroids(x, &mut labels, &mut centroids);
        }

        let inertia = compute_inertia(x, &labels, &centroids);

        KMeansFit {
            labels,
            centroids,
            inertia,
            iterations,
            converged,
            seed,
        }
    }
}

impl KMeansFit {
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    pub fn predict(&self, x: &Matrix) -> Result<Labels> {
        self.check_width(x)?;
        Ok(assign_labels(x, &self.centroids))
    }

    pub fn predict_one(&self, point: &Vector) -> Result<usize> {
        if point.len() != self.centroids.ncols() {
            return Err(SegmentationError::Shape(format!(
                "Point has {} features, model was fitted on {}",
                point.len(),
                self.centroids.ncols()
            )));
        }
        Ok(nearest_centroid(&point.view(), &self.centroids).0)
    }

    /// Euclidean distance from every row of `x` to every centroid.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        self.check_width(x)?;

        let mut distances = Matrix::zeros((x.nrows(), self.n_clusters()));
        for i in 0..x.nrows() {
            for k in 0..self.n_clusters() {
                distances[[i, k]] = euclidean_distance(&x.row(i), &self.centroids.row(k));
            }
        }

        Ok(distances)
    }

    fn check_width(&self, x: &Matrix) -> Result<()> {
        if x.ncols() != self.centroids.ncols() {
            return Err(SegmentationError::Shape(format!(
                "Number of features in X ({}) doesn't match training data ({})",
                x.ncols(),
                self.centroids.ncols()
            )));
        }
        Ok(())
    }
}

pub(crate) fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f64>()
}

pub(crate) fn euclidean_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Index of the first row of each group of identical rows, in input order.
fn distinct_rows(x: &Matrix) -> Vec<usize> {
    let mut seen = HashSet::with_capacity(x.nrows());
    x.rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| {
            // -0.0 and 0.0 are the same point
            let key: Vec<u64> = row.iter().map(|&v| (v + 0.0).to_bits()).collect();
            seen.insert(key)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Nearest centroid and its squared distance; ties go to the lowest index.
fn nearest_centroid(point: &ArrayView1<f64>, centroids: &Matrix) -> (usize, f64) {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (k, centroid) in centroids.rows().into_iter().enumerate() {
        let distance = squared_distance(point, &centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = k;
        }
    }

    (closest_cluster, min_distance)
}

/// Assignment phase. Rows are independent; `collect` is the barrier before
/// the update phase.
fn assign_labels(x: &Matrix, centroids: &Matrix) -> Labels {
    let labels: Vec<usize> = (0..x.nrows())
        .into_par_iter()
        .map(|i| nearest_centroid(&x.row(i), centroids).0)
        .collect();
    Labels::from(labels)
}

/// Update phase: move each centroid to the mean of its points, then reseed
/// empty clusters in ascending order.
fn update_centroids(x: &Matrix, labels: &mut Labels, centroids: &mut Matrix) {
    let k = centroids.nrows();
    let mut sums = Matrix::zeros((k, x.ncols()));
    let mut counts = vec![0usize; k];

    for (row, &label) in x.rows().into_iter().zip(labels.iter()) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    for c in 0..k {
        if counts[c] > 0 {
            let mean = sums.row(c).mapv(|v| v / counts[c] as f64);
            centroids.row_mut(c).assign(&mean);
        }
    }

    let empty: Vec<usize> = (0..k).filter(|&c| counts[c] == 0).collect();
    for c in empty {
        // Farthest point from its nearest populated centroid, taken from a
        // cluster that keeps at least one member. Ties: lowest index.
        let mut farthest: Option<(usize, f64)> = None;
        for (i, row) in x.rows().into_iter().enumerate() {
            if counts[labels[i]] < 2 {
                continue;
            }
            let distance = (0..k)
                .filter(|&j| counts[j] > 0)
                .map(|j| squared_distance(&row, &centroids.row(j)))
                .fold(f64::INFINITY, f64::min);
            if farthest.is_none_or(|(_, best)| distance > best) {
                farthest = Some((i, distance));
            }
        }

        if let Some((i, distance)) = farthest {
            debug!(cluster = c, point = i, distance = distance.sqrt(), "reseeding empty cluster");
            counts[labels[i]] -= 1;
            labels[i] = c;
            counts[c] = 1;
            centroids.row_mut(c).assign(&x.row(i));
        }
    }
}

fn compute_inertia(x: &Matrix, labels: &Labels, centroids: &Matrix) -> f64 {
    x.rows()
        .into_iter()
        .zip(labels.iter())
        .map(|(row, &label)| squared_distance(&row, &centroids.row(label)))
        .sum()
}

fn kmeans_plus_plus(x: &Matrix, k: usize, rng: &mut ChaCha8Rng) -> Matrix {
    let n = x.nrows();
    let mut centroids = Matrix::zeros((k, x.ncols()));

    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&x.row(first));

    // Squared distance of each point to its nearest chosen centroid
    let mut closest: Vec<f64> = x
        .rows()
        .into_iter()
        .map(|row| squared_distance(&row, &x.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let target = rng.r#gen::<f64>() * total;

        // Points already chosen (or duplicates of them) carry zero weight,
        // so every pick is a new distinct point.
        let mut cumulative = 0.0;
        let mut chosen = None;
        for (i, &d) in closest.iter().enumerate() {
            if d == 0.0 {
                continue;
            }
            cumulative += d;
            if cumulative > target {
                chosen = Some(i);
                break;
            }
        }
        let chosen = chosen
            .or_else(|| closest.iter().rposition(|&d| d > 0.0))
            .unwrap_or(first);

        centroids.row_mut(c).assign(&x.row(chosen));
        for (i, d) in closest.iter_mut().enumerate() {
            *d = d.min(squared_distance(&x.row(i), &x.row(chosen)));
        }
    }

    centroids
}

fn random_points(x: &Matrix, distinct: &[usize], k: usize, rng: &mut ChaCha8Rng) -> Matrix {
    let mut centroids = Matrix::zeros((k, x.ncols()));
    for (c, pick) in index::sample(rng, distinct.len(), k).into_iter().enumerate() {
        centroids.row_mut(c).assign(&x.row(distinct[pick]));
    }
    centroids
}
