//! Clustering of normalized feature vectors.
//!
//! `KMeans` partitions rows into k clusters with Lloyd's iteration and
//! deterministic seeding.
//!
//! # Examples
//!
//! ```rust
//! use customer_segments::{KMeans, Init};
//! use ndarray::array;
//!
//! let x = array![
//!     [0.00, 0.44],
//!     [0.02, 1.00],
//!     [0.03, 0.00],
//!     [0.97, 0.15],
//!     [0.98, 0.51],
//!     [1.00, 0.93]
//! ];
//!
//! let fit = KMeans::new(2)
//!     .init(Init::KMeansPlusPlus)
//!     .random_state(42)
//!     .max_iter(300)
//!     .fit(&x)
//!     .unwrap();
//!
//! assert_eq!(fit.labels.len(), 6);
//! assert_eq!(fit.cluster_sizes().iter().sum::<usize>(), 6);
//! println!("Centroids: {:?}", fit.centroids);
//! println!("Converged after {} iterations: {}", fit.iterations, fit.converged);
//! ```

mod kmeans;

pub use kmeans::{Init, KMeans, KMeansFit};
pub(crate) use kmeans::euclidean_distance;
