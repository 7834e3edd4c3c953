//! Unsupervised cluster quality metrics.
//!
//! Both scores are undefined when the labeling has a single cluster or puts
//! every point in its own cluster; they return `None` in that case instead
//! of failing.

use crate::cluster::{KMeansFit, euclidean_distance};
use crate::error::{Result, SegmentationError};
use crate::{Labels, Matrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quality scores of one clustering run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterQuality {
    /// Mean silhouette in [-1, 1], higher is better
    pub silhouette: Option<f64>,
    /// Davies–Bouldin index, >= 0, lower is better
    pub davies_bouldin: Option<f64>,
    /// Within-cluster sum of squared distances
    pub inertia: f64,
}

impl ClusterQuality {
    pub fn evaluate(x: &Matrix, fit: &KMeansFit) -> Result<Self> {
        Ok(Self {
            silhouette: silhouette_score(x, &fit.labels)?,
            davies_bouldin: davies_bouldin_score(x, &fit.labels)?,
            inertia: fit.inertia,
        })
    }
}

/// Members of each label, keyed by label value. Labels need not be dense.
fn group_by_label(x: &Matrix, labels: &Labels) -> Result<BTreeMap<usize, Vec<usize>>> {
    if x.nrows() != labels.len() {
        return Err(SegmentationError::Shape(format!(
            "{} samples but {} labels",
            x.nrows(),
            labels.len()
        )));
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(i);
    }
    Ok(groups)
}

fn is_defined(groups: &BTreeMap<usize, Vec<usize>>, n_samples: usize) -> bool {
    groups.len() >= 2 && groups.len() < n_samples
}

/// Mean silhouette coefficient over all points.
///
/// For point i, `a` is the mean distance to the rest of its cluster and `b`
/// the smallest mean distance to another cluster; `s = (b - a) / max(a, b)`.
/// Points in singleton clusters score 0.
pub fn silhouette_score(x: &Matrix, labels: &Labels) -> Result<Option<f64>> {
    let groups = group_by_label(x, labels)?;
    if !is_defined(&groups, x.nrows()) {
        return Ok(None);
    }

    let scores: Vec<f64> = (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            let own_label = labels[i];
            let own = &groups[&own_label];
            if own.len() == 1 {
                return 0.0;
            }

            let summed_distance = |members: &[usize]| {
                members
                    .iter()
                    .map(|&j| euclidean_distance(&x.row(i), &x.row(j)))
                    .sum::<f64>()
            };

            let a = summed_distance(own.as_slice()) / (own.len() - 1) as f64;
            let b = groups
                .iter()
                .filter(|&(&label, _)| label != own_label)
                .map(|(_, members)| summed_distance(members.as_slice()) / members.len() as f64)
                .fold(f64::INFINITY, f64::min);

            let denominator = a.max(b);
            if denominator == 0.0 {
                0.0
            } else {
                (b - a) / denominator
            }
        })
        .collect();

    Ok(Some(scores.iter().sum::<f64>() / scores.len() as f64))
}

/// Davies–Bouldin index.
///
/// Scatter of a cluster is the mean distance of its points to the cluster
/// mean. For each cluster the worst ratio `(S_i + S_j) / d(c_i, c_j)` against
/// any other cluster is taken, and the index is the mean of those maxima.
/// Coincident centroids are treated as infinitely separated.
pub fn davies_bouldin_score(x: &Matrix, labels: &Labels) -> Result<Option<f64>> {
    let groups = group_by_label(x, labels)?;
    if !is_defined(&groups, x.nrows()) {
        return Ok(None);
    }

    let clusters: Vec<&Vec<usize>> = groups.values().collect();
    let k = clusters.len();

    let mut centroids = Matrix::zeros((k, x.ncols()));
    let mut scatter = vec![0.0; k];
    for (c, members) in clusters.iter().enumerate() {
        for &i in members.iter() {
            let mut centroid = centroids.row_mut(c);
            centroid += &x.row(i);
        }
        centroids.row_mut(c).mapv_inplace(|v| v / members.len() as f64);

        scatter[c] = members
            .iter()
            .map(|&i| euclidean_distance(&x.row(i), &centroids.row(c)))
            .sum::<f64>()
            / members.len() as f64;
    }

    let mut separation = Matrix::zeros((k, k));
    for i in 0..k {
        for j in (i + 1)..k {
            let d = euclidean_distance(&centroids.row(i), &centroids.row(j));
            separation[[i, j]] = d;
            separation[[j, i]] = d;
        }
    }

    const EPS: f64 = 1e-12;
    if scatter.iter().all(|s| s.abs() < EPS) || separation.iter().all(|d| d.abs() < EPS) {
        return Ok(Some(0.0));
    }

    let total: f64 = (0..k)
        .map(|i| {
            (0..k)
                .filter(|&j| j != i && separation[[i, j]] > 0.0)
                .map(|j| (scatter[i] + scatter[j]) / separation[[i, j]])
                .fold(0.0, f64::max)
        })
        .sum();

    Ok(Some(total / k as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::KMeans;
    use ndarray::array;

    fn two_tight_clusters() -> (Matrix, Labels) {
        let x = array![
            [0.00, 0.00],
            [0.02, 0.01],
            [0.01, 0.03],
            [1.00, 1.00],
            [0.98, 0.99],
            [0.99, 0.97]
        ];
        (x, Labels::from(vec![0, 0, 0, 1, 1, 1]))
    }

    #[test]
    fn test_silhouette_well_separated() {
        let (x, labels) = two_tight_clusters();
        let score = silhouette_score(&x, &labels).unwrap().unwrap();
        assert!(score > 0.95, "silhouette was {score}");
        assert!(score <= 1.0);
    }

    #[test]
    fn test_silhouette_singleton_scores_zero() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [5.0, 0.0]];
        let labels = Labels::from(vec![0, 0, 1]);

        let score = silhouette_score(&x, &labels).unwrap().unwrap();
        let expected = (0.8 + (1.0 - 1.0 / 26.0f64.sqrt())) / 3.0;
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_davies_bouldin_known_value() {
        let x = array![[0.0, 0.0], [2.0, 0.0], [10.0, 0.0], [12.0, 0.0]];
        let labels = Labels::from(vec![0, 0, 1, 1]);

        let score = davies_bouldin_score(&x, &labels).unwrap().unwrap();
        assert!((score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_davies_bouldin_well_separated() {
        let (x, labels) = two_tight_clusters();
        let score = davies_bouldin_score(&x, &labels).unwrap().unwrap();
        assert!(score >= 0.0);
        assert!(score < 0.1, "davies-bouldin was {score}");
    }

    #[test]
    fn test_undefined_for_one_or_n_clusters() {
        let (x, _) = two_tight_clusters();

        let one = Labels::zeros(6);
        assert_eq!(silhouette_score(&x, &one).unwrap(), None);
        assert_eq!(davies_bouldin_score(&x, &one).unwrap(), None);

        let each = Labels::from(vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(silhouette_score(&x, &each).unwrap(), None);
        assert_eq!(davies_bouldin_score(&x, &each).unwrap(), None);
    }

    #[test]
    fn test_sparse_labels() {
        let (x, _) = two_tight_clusters();
        let dense = Labels::from(vec![0, 0, 0, 1, 1, 1]);
        let sparse = Labels::from(vec![0, 0, 0, 4, 4, 4]);

        assert_eq!(
            silhouette_score(&x, &dense).unwrap(),
            silhouette_score(&x, &sparse).unwrap()
        );
        assert_eq!(
            davies_bouldin_score(&x, &dense).unwrap(),
            davies_bouldin_score(&x, &sparse).unwrap()
        );

        let extreme = Labels::from(vec![7, 7, 7, usize::MAX, usize::MAX, usize::MAX]);
        assert_eq!(
            silhouette_score(&x, &dense).unwrap(),
            silhouette_score(&x, &extreme).unwrap()
        );
        assert_eq!(
            davies_bouldin_score(&x, &dense).unwrap(),
            davies_bouldin_score(&x, &extreme).unwrap()
        );
    }

    #[test]
    fn test_length_mismatch() {
        let (x, _) = two_tight_clusters();
        let labels = Labels::from(vec![0, 1]);
        assert!(silhouette_score(&x, &labels).is_err());
        assert!(davies_bouldin_score(&x, &labels).is_err());
    }

    #[test]
    fn test_evaluate_fit() {
        let (x, _) = two_tight_clusters();
        let fit = KMeans::new(2).fit(&x).unwrap();

        let quality = ClusterQuality::evaluate(&x, &fit).unwrap();
        assert!(quality.silhouette.unwrap() > 0.95);
        assert!(quality.davies_bouldin.unwrap() < 0.1);
        assert_eq!(quality.inertia, fit.inertia);

        let single = KMeans::new(1).fit(&x).unwrap();
        let quality = ClusterQuality::evaluate(&x, &single).unwrap();
        assert!(quality.silhouette.is_none());
        assert!(quality.davies_bouldin.is_none());
    }
}
