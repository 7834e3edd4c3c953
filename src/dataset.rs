use crate::error::{Result, SegmentationError};
use crate::Matrix;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Column names of the two clustering features, in matrix column order.
pub const FEATURE_NAMES: [&str; 2] = ["AnnualIncome", "SpendingScore"];

/// One imported customer. Gender and Age travel with the record but are
/// never used by the analytics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(rename = "CustomerID")]
    pub customer_id: u64,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Age")]
    pub age: String,
    #[serde(rename = "AnnualIncome", alias = "Annual Income (k$)")]
    pub annual_income: f64,
    #[serde(rename = "SpendingScore", alias = "Spending Score (1-100)")]
    pub spending_score: f64,
}

impl CustomerRecord {
    pub fn new(
        customer_id: u64,
        gender: &str,
        age: impl ToString,
        annual_income: f64,
        spending_score: f64,
    ) -> Self {
        Self {
            customer_id,
            gender: gender.to_string(),
            age: age.to_string(),
            annual_income,
            spending_score,
        }
    }
}

/// A validated snapshot of the customer table.
///
/// Row order is preserved from the input; it feeds K-Means tie-breaking, so
/// two datasets with the same rows in a different order may cluster
/// differently.
#[derive(Clone, Debug)]
pub struct Dataset {
    records: Vec<CustomerRecord>,
}

impl Dataset {
    pub fn new(records: Vec<CustomerRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(SegmentationError::validation("dataset contains no customers"));
        }

        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if record.customer_id == 0 {
                return Err(SegmentationError::validation(
                    "CustomerID must be a positive integer, got 0",
                ));
            }
            if !seen.insert(record.customer_id) {
                return Err(SegmentationError::validation(format!(
                    "duplicate CustomerID {}",
                    record.customer_id
                )));
            }
            if !record.annual_income.is_finite() || !record.spending_score.is_finite() {
                return Err(SegmentationError::validation(format!(
                    "CustomerID {} has a non-finite AnnualIncome or SpendingScore",
                    record.customer_id
                )));
            }
        }

        Ok(Self { records })
    }

    pub fn n_samples(&self) -> usize {
        self.records.len()
    }

    pub fn n_features(&self) -> usize {
        FEATURE_NAMES.len()
    }

    pub fn records(&self) -> &[CustomerRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CustomerRecord> {
        self.records
    }

    pub fn customer_ids(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.customer_id).collect()
    }

    /// Raw (income, score) matrix, one row per record.
    pub fn raw_features(&self) -> Matrix {
        let mut features = Matrix::zeros((self.n_samples(), self.n_features()));
        for (mut row, record) in features.rows_mut().into_iter().zip(&self.records) {
            row[0] = record.annual_income;
            row[1] = record.spending_score;
        }
        features
    }
}
