//! Feature normalization.
//!
//! Two scalers are provided, both fitted over the full current dataset and
//! never updated incrementally:
//! - `MinMaxScaler`: `(x - min) / (max - min)`, range exactly [0, 1]
//! - `StandardScaler`: `(x - mean) / std` with the population std
//!
//! A column with no spread makes the scale factor undefined; fitting then
//! fails with [`SegmentationError::DegenerateFeature`] before any output is
//! produced.

use crate::dataset::{Dataset, FEATURE_NAMES};
use crate::error::{Result, SegmentationError};
use crate::{Matrix, Vector};
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalization strategy applied to both features.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    #[default]
    MinMax,
    ZScore,
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalization::MinMax => write!(f, "min-max"),
            Normalization::ZScore => write!(f, "z-score"),
        }
    }
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "min-max" | "minmax" => Ok(Normalization::MinMax),
            "z-score" | "zscore" | "standard" => Ok(Normalization::ZScore),
            _ => Err(format!(
                "Invalid normalization: {s}. Must be 'min-max' or 'z-score'"
            )),
        }
    }
}

/// Scaled features of one customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "CustomerID")]
    pub customer_id: u64,
    #[serde(rename = "AnnualIncome_Scaled")]
    pub annual_income_scaled: f64,
    #[serde(rename = "SpendingScore_Scaled")]
    pub spending_score_scaled: f64,
}

fn column_name(j: usize) -> String {
    FEATURE_NAMES
        .get(j)
        .map_or_else(|| format!("column {j}"), |name| (*name).to_string())
}

fn check_fitted_width(data: &Matrix, width: usize) -> Result<()> {
    if data.ncols() != width {
        return Err(SegmentationError::Shape(format!(
            "Number of features in X ({}) doesn't match training data ({})",
            data.ncols(),
            width
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct StandardScaler {
    mean: Option<Vector>,
    std: Option<Vector>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, data: &Matrix) -> Result<()> {
        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| SegmentationError::validation("cannot scale an empty matrix"))?;
        let std = data.std_axis(Axis(0), 0.0);

        if let Some(j) = std.iter().position(|&s| s == 0.0 || !s.is_finite()) {
            return Err(SegmentationError::DegenerateFeature {
                feature: column_name(j),
                reason: "standard deviation is zero".to_string(),
            });
        }

        self.mean = Some(mean);
        self.std = Some(std);
        Ok(())
    }

    pub fn transform(&self, data: &Matrix) -> Result<Matrix> {
        let mean = self.mean.as_ref().ok_or(SegmentationError::NotFitted("StandardScaler"))?;
        let std = self.std.as_ref().ok_or(SegmentationError::NotFitted("StandardScaler"))?;
        check_fitted_width(data, mean.len())?;

        let mut result = data.clone();
        for mut row in result.axis_iter_mut(Axis(0)) {
            row -= mean;
            row /= std;
        }

        Ok(result)
    }

    pub fn fit_transform(&mut self, data: &Matrix) -> Result<Matrix> {
        self.fit(data)?;
        self.transform(data)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MinMaxScaler {
    data_min: Option<Vector>,
    data_range: Option<Vector>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, data: &Matrix) -> Result<()> {
        if data.nrows() == 0 {
            return Err(SegmentationError::validation("cannot scale an empty matrix"));
        }

        let data_min = data.fold_axis(Axis(0), f64::INFINITY, |&acc, &x| acc.min(x));
        let data_max = data.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &x| acc.max(x));
        let data_range = &data_max - &data_min;

        if let Some(j) = data_range.iter().position(|&r| r == 0.0 || !r.is_finite()) {
            return Err(SegmentationError::DegenerateFeature {
                feature: column_name(j),
                reason: format!("max equals min ({})", data_min[j]),
            });
        }

        self.data_min = Some(data_min);
        self.data_range = Some(data_range);
        Ok(())
    }

    pub fn transform(&self, data: &Matrix) -> Result<Matrix> {
        let data_min = self.data_min.as_ref().ok_or(SegmentationError::NotFitted("MinMaxScaler"))?;
        let data_range = self.data_range.as_ref().ok_or(SegmentationError::NotFitted("MinMaxScaler"))?;
        check_fitted_width(data, data_min.len())?;

        let mut result = data.clone();
        for mut row in result.axis_iter_mut(Axis(0)) {
            row -= data_min;
            row /= data_range;
        }

        Ok(result)
    }

    pub fn fit_transform(&mut self, data: &Matrix) -> Result<Matrix> {
        self.fit(data)?;
        self.transform(data)
    }
}

#[derive(Clone, Debug)]
enum Scaler {
    MinMax(MinMaxScaler),
    ZScore(StandardScaler),
}

impl Scaler {
    fn for_strategy(strategy: Normalization) -> Self {
        match strategy {
            Normalization::MinMax => Scaler::MinMax(MinMaxScaler::new()),
            Normalization::ZScore => Scaler::ZScore(StandardScaler::new()),
        }
    }

    fn fit(&mut self, data: &Matrix) -> Result<()> {
        match self {
            Scaler::MinMax(scaler) => scaler.fit(data),
            Scaler::ZScore(scaler) => scaler.fit(data),
        }
    }

    fn transform(&self, data: &Matrix) -> Result<Matrix> {
        match self {
            Scaler::MinMax(scaler) => scaler.transform(data),
            Scaler::ZScore(scaler) => scaler.transform(data),
        }
    }
}

/// Normalized feature matrix with the CustomerID of each row.
#[derive(Clone, Debug)]
pub struct NormalizedFeatures {
    pub customer_ids: Vec<u64>,
    pub matrix: Matrix,
}

impl NormalizedFeatures {
    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn vectors(&self) -> Vec<FeatureVector> {
        self.customer_ids
            .iter()
            .zip(self.matrix.rows())
            .map(|(&customer_id, row)| FeatureVector {
                customer_id,
                annual_income_scaled: row[0],
                spending_score_scaled: row[1],
            })
            .collect()
    }
}

/// Rescales raw (income, score) pairs into the clustering feature space.
#[derive(Clone, Debug)]
pub struct FeatureNormalizer {
    strategy: Normalization,
    scaler: Scaler,
    fitted: bool,
}

impl FeatureNormalizer {
    pub fn new(strategy: Normalization) -> Self {
        Self {
            strategy,
            scaler: Scaler::for_strategy(strategy),
            fitted: false,
        }
    }

    pub fn strategy(&self) -> Normalization {
        self.strategy
    }

    pub fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        self.scaler.fit(&dataset.raw_features())?;
        self.fitted = true;
        Ok(())
    }

    pub fn transform(&self, dataset: &Dataset) -> Result<NormalizedFeatures> {
        if !self.fitted {
            return Err(SegmentationError::NotFitted("FeatureNormalizer"));
        }
        let matrix = self.scaler.transform(&dataset.raw_features())?;
        Ok(NormalizedFeatures {
            customer_ids: dataset.customer_ids(),
            matrix,
        })
    }

    pub fn fit_transform(&mut self, dataset: &Dataset) -> Result<NormalizedFeatures> {
        self.fit(dataset)?;
        self.transform(dataset)
    }

    /// Scale one raw (income, score) pair with the fitted parameters.
    /// Values outside the fitted range fall outside [0, 1] under min-max.
    pub fn scale_point(&self, annual_income: f64, spending_score: f64) -> Result<Vector> {
        if !self.fitted {
            return Err(SegmentationError::NotFitted("FeatureNormalizer"));
        }
        let input = Matrix::from_shape_vec((1, 2), vec![annual_income, spending_score])
            .map_err(|e| SegmentationError::Shape(e.to_string()))?;
        let scaled = self.scaler.transform(&input)?;
        Ok(scaled.row(0).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CustomerRecord;
    use ndarray::array;

    fn mall_dataset() -> Dataset {
        let income = [15.0, 16.0, 17.0, 75.0, 76.0, 77.0];
        let score = [39.0, 81.0, 6.0, 17.0, 44.0, 76.0];
        let records = income
            .iter()
            .zip(score.iter())
            .enumerate()
            .map(|(i, (&inc, &sc))| CustomerRecord::new(i as u64 + 1, "Female", 30, inc, sc))
            .collect();
        Dataset::new(records).unwrap()
    }

    #[test]
    fn test_standard_scaler() {
        let data = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let mut scaler = StandardScaler::new();

        let scaled = scaler.fit_transform(&data).unwrap();
        assert_eq!(scaled.shape(), data.shape());

        // population std of [1, 3, 5] is sqrt(8/3)
        let expected = -2.0 / (8.0f64 / 3.0).sqrt();
        assert!((scaled[[0, 0]] - expected).abs() < 1e-12);
        assert!(scaled[[1, 0]].abs() < 1e-12);
    }

    #[test]
    fn test_min_max_scaler_bounds() {
        let data = array![[15.0, 39.0], [16.0, 81.0], [17.0, 6.0], [77.0, 76.0]];
        let mut scaler = MinMaxScaler::new();
        let scaled = scaler.fit_transform(&data).unwrap();

        assert!(scaled.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[3, 0]], 1.0);
        assert_eq!(scaled[[2, 1]], 0.0);
        assert_eq!(scaled[[1, 1]], 1.0);
    }

    #[test]
    fn test_degenerate_feature_fails() {
        let data = array![[10.0, 1.0], [10.0, 2.0], [10.0, 3.0]];

        let err = MinMaxScaler::new().fit(&data).unwrap_err();
        match err {
            SegmentationError::DegenerateFeature { feature, .. } => {
                assert_eq!(feature, "AnnualIncome");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            StandardScaler::new().fit(&data),
            Err(SegmentationError::DegenerateFeature { .. })
        ));
    }

    #[test]
    fn test_degenerate_leaves_scaler_unfitted() {
        let mut scaler = MinMaxScaler::new();
        let data = array![[1.0, 5.0], [2.0, 5.0]];
        assert!(scaler.fit(&data).is_err());
        assert!(matches!(
            scaler.transform(&data),
            Err(SegmentationError::NotFitted(_))
        ));
    }

    #[test]
    fn test_transform_without_fit() {
        let data = array![[1.0, 2.0]];
        assert!(StandardScaler::new().transform(&data).is_err());
        assert!(FeatureNormalizer::new(Normalization::MinMax)
            .scale_point(1.0, 2.0)
            .is_err());
    }

    #[test]
    fn test_feature_normalizer_vectors() {
        let dataset = mall_dataset();
        let mut normalizer = FeatureNormalizer::new(Normalization::MinMax);
        let features = normalizer.fit_transform(&dataset).unwrap();

        let vectors = features.vectors();
        assert_eq!(vectors.len(), 6);
        assert_eq!(vectors[0].customer_id, 1);
        assert_eq!(vectors[0].annual_income_scaled, 0.0);
        assert_eq!(vectors[5].annual_income_scaled, 1.0);
        assert_eq!(vectors[2].spending_score_scaled, 0.0);
        assert_eq!(vectors[1].spending_score_scaled, 1.0);
    }

    #[test]
    fn test_scale_point_uses_fitted_range() {
        let dataset = mall_dataset();
        let mut normalizer = FeatureNormalizer::new(Normalization::MinMax);
        normalizer.fit(&dataset).unwrap();

        let point = normalizer.scale_point(46.0, 43.5).unwrap();
        assert!((point[0] - 0.5).abs() < 1e-12);
        assert!((point[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_z_score_has_zero_mean() {
        let dataset = mall_dataset();
        let mut normalizer = FeatureNormalizer::new(Normalization::ZScore);
        let features = normalizer.fit_transform(&dataset).unwrap();

        let mean = features.matrix.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-12));
        let std = features.matrix.std_axis(Axis(0), 0.0);
        assert!(std.iter().all(|s| (s - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_normalization_parse() {
        assert_eq!("min-max".parse::<Normalization>().unwrap(), Normalization::MinMax);
        assert_eq!("z-score".parse::<Normalization>().unwrap(), Normalization::ZScore);
        assert!("log".parse::<Normalization>().is_err());
        assert_eq!(Normalization::ZScore.to_string(), "z-score");
    }
}
