//! Customer segmentation on (annual income, spending score).
//!
//! The analytics core is a chain of pure stages over in-memory data:
//! feature normalization, K-Means partitioning, unsupervised quality scoring
//! and a rule engine mapping cluster statistics to marketing segments.
//! Ingestion, persistence and the CLI sit around it.
//!
//! # Example
//! ```rust
//! use customer_segments::{CustomerRecord, Dataset, PipelineConfig, PipelineContext};
//!
//! let records = vec![
//!     CustomerRecord::new(1, "Male", 19, 15.0, 39.0),
//!     CustomerRecord::new(2, "Male", 21, 16.0, 81.0),
//!     CustomerRecord::new(3, "Female", 20, 17.0, 6.0),
//!     CustomerRecord::new(4, "Female", 23, 75.0, 17.0),
//!     CustomerRecord::new(5, "Female", 31, 76.0, 44.0),
//!     CustomerRecord::new(6, "Male", 22, 77.0, 76.0),
//! ];
//!
//! let dataset = Dataset::new(records).unwrap();
//! let context = PipelineContext::new(dataset, PipelineConfig::default().n_clusters(2));
//! let report = context.run().unwrap().report;
//!
//! assert_eq!(report.cluster_stats.len(), 2);
//! assert_eq!(report.recommendations.len(), 2);
//! ```

pub use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

pub mod cluster;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod preprocessing;
pub mod segment;
pub mod store;

pub use cluster::{Init, KMeans, KMeansFit};
pub use config::PipelineConfig;
pub use dataset::{CustomerRecord, Dataset};
pub use error::{Result, SegmentationError};
pub use metrics::ClusterQuality;
pub use pipeline::{ClusterAssignment, LabeledCustomer, Notice, PipelineContext, RunOutput, RunReport};
pub use preprocessing::{FeatureNormalizer, FeatureVector, MinMaxScaler, Normalization, StandardScaler};
pub use segment::{ClusterStatistics, Segment, SegmentRecommendation};
pub use store::{InMemoryStore, JsonFileStore, SegmentStore, StoreSnapshot};

pub type Vector = Array1<f64>;
pub type Matrix = Array2<f64>;
pub type Labels = Array1<usize>;
