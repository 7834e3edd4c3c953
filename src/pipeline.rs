//! Pipeline orchestration.
//!
//! A [`PipelineContext`] owns one dataset snapshot and the run parameters.
//! Stages run in order (normalize, cluster, evaluate, summarize, recommend)
//! and the first hard error stops the run. Non-convergence and undefined
//! metrics are collected as [`Notice`]s in the report instead.
//!
//! Nothing is written to a store until every stage has succeeded; the run's
//! features and assignments (and, on import, the customers) are then
//! replaced in a single store call.

use crate::cluster::{KMeans, KMeansFit};
use crate::config::PipelineConfig;
use crate::dataset::{CustomerRecord, Dataset};
use crate::error::{Result, SegmentationError};
use crate::metrics::ClusterQuality;
use crate::preprocessing::{FeatureNormalizer, FeatureVector, NormalizedFeatures};
use crate::segment::{self, ClusterStatistics, SegmentRecommendation};
use crate::store::SegmentStore;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    #[serde(rename = "CustomerID")]
    pub customer_id: u64,
    #[serde(rename = "Cluster")]
    pub cluster_id: usize,
}

/// Non-fatal conditions raised during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Notice {
    /// K-Means hit the iteration cap before labels stabilized; the last
    /// labeling is still reported.
    NonConvergence { iterations: usize, max_iter: usize },
    /// A quality metric is undefined for this labeling.
    MetricUndefined {
        metric: String,
        clusters: usize,
        samples: usize,
    },
}

/// A customer joined with its cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledCustomer {
    #[serde(flatten)]
    pub customer: CustomerRecord,
    #[serde(rename = "Cluster")]
    pub cluster_id: usize,
}

/// Results bundle handed to the presentation layer. Plain data only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub config: PipelineConfig,
    pub n_customers: usize,
    pub quality: ClusterQuality,
    pub converged: bool,
    pub iterations: usize,
    /// Centroids in normalized feature space, indexed by cluster id
    pub centroids: Vec<[f64; 2]>,
    pub cluster_stats: Vec<ClusterStatistics>,
    /// First `sample_size` labeled customers in CustomerID order
    pub sample: Vec<LabeledCustomer>,
    pub recommendations: Vec<SegmentRecommendation>,
    pub notices: Vec<Notice>,
}

/// Everything one run produced.
#[derive(Clone, Debug)]
pub struct RunOutput {
    pub report: RunReport,
    pub features: Vec<FeatureVector>,
    pub assignments: Vec<ClusterAssignment>,
    pub normalizer: FeatureNormalizer,
    pub fit: KMeansFit,
}

impl RunOutput {
    /// Cluster and segment of a hypothetical customer under this run's
    /// scaling and centroids.
    pub fn predict(&self, annual_income: f64, spending_score: f64) -> Result<(usize, &SegmentRecommendation)> {
        let point = self.normalizer.scale_point(annual_income, spending_score)?;
        let cluster_id = self.fit.predict_one(&point)?;
        let recommendation = self
            .report
            .recommendations
            .iter()
            .find(|r| r.cluster_id == cluster_id)
            .ok_or_else(|| {
                SegmentationError::Store(format!("no recommendation for cluster {cluster_id}"))
            })?;
        Ok((cluster_id, recommendation))
    }
}

/// Current dataset plus run parameters, passed explicitly through every
/// stage.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    dataset: Dataset,
    config: PipelineConfig,
}

impl PipelineContext {
    pub fn new(dataset: Dataset, config: PipelineConfig) -> Self {
        Self { dataset, config }
    }

    /// Context over the customers currently held by `store`.
    pub fn from_store(store: &dyn SegmentStore, config: PipelineConfig) -> Result<Self> {
        let dataset = Dataset::new(store.snapshot()?.customers)?;
        Ok(Self::new(dataset, config))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn normalize(&self) -> Result<(FeatureNormalizer, NormalizedFeatures)> {
        let mut normalizer = FeatureNormalizer::new(self.config.normalization);
        let features = normalizer.fit_transform(&self.dataset)?;
        Ok((normalizer, features))
    }

    pub fn cluster(&self, features: &NormalizedFeatures) -> Result<KMeansFit> {
        KMeans::new(self.config.n_clusters)
            .init(self.config.init)
            .random_state(self.config.seed)
            .max_iter(self.config.max_iter)
            .n_init(self.config.n_init)
            .fit(&features.matrix)
    }

    pub fn evaluate(&self, features: &NormalizedFeatures, fit: &KMeansFit) -> Result<ClusterQuality> {
        ClusterQuality::evaluate(&features.matrix, fit)
    }

    pub fn summarize(&self, fit: &KMeansFit) -> Result<Vec<ClusterStatistics>> {
        segment::cluster_statistics(self.dataset.records(), &fit.labels)
    }

    pub fn run(&self) -> Result<RunOutput> {
        self.config.validate()?;
        let started = Instant::now();

        let (normalizer, features) = self.normalize()?;
        info!(
            customers = features.n_samples(),
            normalization = %self.config.normalization,
            "features normalized"
        );

        let fit = self.cluster(&features)?;
        info!(
            k = self.config.n_clusters,
            iterations = fit.iterations,
            converged = fit.converged,
            inertia = fit.inertia,
            "k-means fitted"
        );

        let quality = self.evaluate(&features, &fit)?;
        let cluster_stats = self.summarize(&fit)?;
        let recommendations = segment::recommend(&cluster_stats);

        let mut notices = Vec::new();
        if !fit.converged {
            warn!(iterations = fit.iterations, "k-means stopped at the iteration cap");
            notices.push(Notice::NonConvergence {
                iterations: fit.iterations,
                max_iter: self.config.max_iter,
            });
        }
        let (silhouette_missing, davies_bouldin_missing) =
            (quality.silhouette.is_none(), quality.davies_bouldin.is_none());
        for (metric, missing) in [
            ("silhouette", silhouette_missing),
            ("davies-bouldin", davies_bouldin_missing),
        ] {
            if missing {
                warn!(metric, clusters = cluster_stats.len(), "metric undefined");
                notices.push(Notice::MetricUndefined {
                    metric: metric.to_string(),
                    clusters: cluster_stats.len(),
                    samples: features.n_samples(),
                });
            }
        }

        let assignments: Vec<ClusterAssignment> = features
            .customer_ids
            .iter()
            .zip(fit.labels.iter())
            .map(|(&customer_id, &cluster_id)| ClusterAssignment {
                customer_id,
                cluster_id,
            })
            .collect();

        let report = RunReport {
            config: self.config.clone(),
            n_customers: self.dataset.n_samples(),
            quality,
            converged: fit.converged,
            iterations: fit.iterations,
            centroids: fit.centroids.rows().into_iter().map(|c| [c[0], c[1]]).collect(),
            cluster_stats,
            sample: self.sample(&fit),
            recommendations,
            notices,
        };

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            clusters = report.cluster_stats.len(),
            "pipeline run complete"
        );

        Ok(RunOutput {
            report,
            features: features.vectors(),
            assignments,
            normalizer,
            fit,
        })
    }

    /// Runs the pipeline and, only if every stage succeeded, replaces the
    /// stored features and assignments with this run's. The store rejects
    /// the write if its customers are no longer this context's dataset.
    pub fn run_and_store(&self, store: &dyn SegmentStore) -> Result<RunOutput> {
        let output = self.run()?;
        store.replace_results(
            self.dataset.records(),
            output.features.clone(),
            output.assignments.clone(),
        )?;
        Ok(output)
    }

    /// Runs the pipeline on this context's dataset, then replaces the stored
    /// customers, features and assignments in one store call. A failed run
    /// leaves the store as it was.
    pub fn run_and_import(&self, store: &dyn SegmentStore) -> Result<RunOutput> {
        let output = self.run()?;
        store.replace_all(
            self.dataset.records().to_vec(),
            output.features.clone(),
            output.assignments.clone(),
        )?;
        Ok(output)
    }

    fn sample(&self, fit: &KMeansFit) -> Vec<LabeledCustomer> {
        let mut labeled: Vec<LabeledCustomer> = self
            .dataset
            .records()
            .iter()
            .zip(fit.labels.iter())
            .map(|(customer, &cluster_id)| LabeledCustomer {
                customer: customer.clone(),
                cluster_id,
            })
            .collect();
        labeled.sort_by_key(|l| l.customer.customer_id);
        labeled.truncate(self.config.sample_size);
        labeled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use crate::store::InMemoryStore;
    use crate::Matrix;
    use ndarray_rand::RandomExt;
    use ndarray_rand::rand_distr::Uniform;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn mall_dataset() -> Dataset {
        let income = [15.0, 16.0, 17.0, 75.0, 76.0, 77.0];
        let score = [39.0, 81.0, 6.0, 17.0, 44.0, 76.0];
        let records = income
            .iter()
            .zip(score.iter())
            .enumerate()
            .map(|(i, (&inc, &sc))| CustomerRecord::new(i as u64 + 1, "Male", 25, inc, sc))
            .collect();
        Dataset::new(records).unwrap()
    }

    #[test]
    fn test_run_two_clusters() {
        let context = PipelineContext::new(mall_dataset(), PipelineConfig::default().n_clusters(2));
        let output = context.run().unwrap();
        let report = &output.report;

        assert_eq!(report.n_customers, 6);
        assert!(report.converged);
        assert!(report.notices.is_empty());
        assert_eq!(report.centroids.len(), 2);
        assert_eq!(report.cluster_stats.len(), 2);
        assert_eq!(report.cluster_stats.iter().map(|s| s.count).sum::<usize>(), 6);
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.quality.silhouette.is_some());
        assert!(report.quality.davies_bouldin.is_some());

        let low = &output.assignments[0..3];
        let high = &output.assignments[3..6];
        assert!(low.iter().all(|a| a.cluster_id == low[0].cluster_id));
        assert!(high.iter().all(|a| a.cluster_id == high[0].cluster_id));
        assert_ne!(low[0].cluster_id, high[0].cluster_id);

        let low_stats = &report.cluster_stats[low[0].cluster_id];
        assert_eq!(low_stats.avg_income, 16.0);
        assert_eq!(low_stats.avg_score, 42.0);
    }

    #[test]
    fn test_single_cluster_reports_undefined_metrics() {
        let context = PipelineContext::new(mall_dataset(), PipelineConfig::default().n_clusters(1));
        let report = context.run().unwrap().report;

        assert_eq!(report.iterations, 1);
        assert!(report.quality.silhouette.is_none());
        assert!(report.quality.davies_bouldin.is_none());
        assert_eq!(report.notices.len(), 2);
        assert!(report.notices.iter().all(|n| matches!(n, Notice::MetricUndefined { .. })));
        assert_eq!(report.recommendations[0].segment, Segment::Standard);
    }

    #[test]
    fn test_sample_is_bounded_and_ordered() {
        let mut records = mall_dataset().into_records();
        records.reverse();
        let dataset = Dataset::new(records).unwrap();

        let config = PipelineConfig::default().n_clusters(2).sample_size(4);
        let report = PipelineContext::new(dataset, config).run().unwrap().report;

        let ids: Vec<u64> = report.sample.iter().map(|l| l.customer.customer_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_predict_hypothetical_customer() {
        let context = PipelineContext::new(mall_dataset(), PipelineConfig::default().n_clusters(2));
        let output = context.run().unwrap();

        let (cluster_id, recommendation) = output.predict(76.0, 50.0).unwrap();
        assert_eq!(cluster_id, output.assignments[4].cluster_id);
        assert_eq!(recommendation.cluster_id, cluster_id);
    }

    #[test]
    fn test_hard_errors_abort_before_store_write() {
        let store = InMemoryStore::new();
        store.replace_customers(mall_dataset().into_records()).unwrap();

        let context = PipelineContext::from_store(&store, PipelineConfig::default().n_clusters(2)).unwrap();
        context.run_and_store(&store).unwrap();
        let before = store.snapshot().unwrap();
        assert_eq!(before.clustering_results.len(), 6);

        let context = PipelineContext::from_store(&store, PipelineConfig::default().n_clusters(7)).unwrap();
        assert!(matches!(
            context.run_and_store(&store),
            Err(SegmentationError::InvalidClusterCount { k: 7, distinct: 6 })
        ));
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let points = Matrix::random_using((200, 2), Uniform::new(1.0, 100.0), &mut rng);
        let records = points
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, p)| CustomerRecord::new(i as u64 + 1, "Female", 40, p[0], p[1]))
            .collect();

        let config = PipelineConfig::default().n_clusters(6).max_iter(1).n_init(1);
        let report = PipelineContext::new(Dataset::new(records).unwrap(), config)
            .run()
            .unwrap()
            .report;

        assert!(!report.converged);
        assert_eq!(report.iterations, 1);
        assert!(report.notices.contains(&Notice::NonConvergence {
            iterations: 1,
            max_iter: 1
        }));
        // The capped labeling is still complete.
        assert_eq!(report.cluster_stats.len(), 6);
        assert_eq!(report.cluster_stats.iter().map(|s| s.count).sum::<usize>(), 200);
    }

    #[test]
    fn test_stale_context_is_rejected() {
        let store = InMemoryStore::new();
        store.replace_customers(mall_dataset().into_records()).unwrap();
        let context = PipelineContext::from_store(&store, PipelineConfig::default().n_clusters(2)).unwrap();

        let mut reimported = mall_dataset().into_records();
        for record in &mut reimported {
            record.annual_income *= 10.0;
        }
        store.replace_customers(reimported.clone()).unwrap();

        assert!(matches!(
            context.run_and_store(&store),
            Err(SegmentationError::Store(_))
        ));
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.customers, reimported);
        assert!(snapshot.clustering_results.is_empty());
    }

    #[test]
    fn test_failed_import_keeps_previous_run() {
        let store = InMemoryStore::new();
        PipelineContext::new(mall_dataset(), PipelineConfig::default().n_clusters(2))
            .run_and_import(&store)
            .unwrap();
        let before = store.snapshot().unwrap();
        assert_eq!(before.customers.len(), 6);
        assert_eq!(before.preprocessing_data.len(), 6);
        assert_eq!(before.clustering_results.len(), 6);

        let three_points = (1..=3)
            .map(|id| CustomerRecord::new(id, "Male", 30, id as f64 * 20.0, 50.0 + id as f64))
            .collect();
        let context = PipelineContext::new(
            Dataset::new(three_points).unwrap(),
            PipelineConfig::default().n_clusters(5),
        );
        assert!(matches!(
            context.run_and_import(&store),
            Err(SegmentationError::InvalidClusterCount { k: 5, distinct: 3 })
        ));
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_degenerate_feature_aborts() {
        let records = (1..=4)
            .map(|id| CustomerRecord::new(id, "Female", 30, 50.0, id as f64 * 10.0))
            .collect();
        let context = PipelineContext::new(Dataset::new(records).unwrap(), PipelineConfig::default());
        assert!(matches!(
            context.run(),
            Err(SegmentationError::DegenerateFeature { .. })
        ));
    }

    #[test]
    fn test_rerun_with_new_k_replaces_results() {
        let store = InMemoryStore::new();
        store.replace_customers(mall_dataset().into_records()).unwrap();

        let three = PipelineContext::from_store(&store, PipelineConfig::default().n_clusters(3)).unwrap();
        three.run_and_store(&store).unwrap();
        assert!(store.snapshot().unwrap().clustering_results.iter().any(|a| a.cluster_id == 2));

        let two = PipelineContext::from_store(&store, PipelineConfig::default().n_clusters(2)).unwrap();
        let output = two.run_and_store(&store).unwrap();

        let stored = store.snapshot().unwrap().clustering_results;
        assert_eq!(stored.len(), 6);
        assert!(stored.iter().all(|a| a.cluster_id < 2));
        assert_eq!(stored, output.assignments);
        assert_eq!(output.report.recommendations.len(), 2);
    }

    #[test]
    fn test_report_serializes() {
        let context = PipelineContext::new(mall_dataset(), PipelineConfig::default().n_clusters(1));
        let report = context.run().unwrap().report;

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["quality"]["silhouette"].is_null());
        assert_eq!(json["notices"][0]["kind"], "metric-undefined");
        assert_eq!(json["sample"][0]["CustomerID"], 1);
        assert_eq!(json["sample"][0]["Cluster"], 0);
    }
}
