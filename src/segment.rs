//! Marketing segments derived from per-cluster averages.
//!
//! Income and score are each bucketed as high (`> 70`), low (`< 40`) or mid.
//! Only the four high/low corners get a dedicated segment; any mid value
//! lands in `Standard`. The rule is total over the reals.

use crate::dataset::CustomerRecord;
use crate::error::{Result, SegmentationError};
use crate::Labels;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const HIGH_THRESHOLD: f64 = 70.0;
pub const LOW_THRESHOLD: f64 = 40.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Level {
    Low,
    Mid,
    High,
}

impl Level {
    fn of(value: f64) -> Self {
        if value > HIGH_THRESHOLD {
            Level::High
        } else if value < LOW_THRESHOLD {
            Level::Low
        } else {
            Level::Mid
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Segment {
    /// High income, high spending
    Vip,
    /// High income, low spending
    Economical,
    /// Low income, high spending
    Impulsive,
    /// Low income, low spending
    PriceSensitive,
    /// Anything with a mid value
    Standard,
}

impl Segment {
    pub fn classify(avg_income: f64, avg_score: f64) -> Self {
        match (Level::of(avg_income), Level::of(avg_score)) {
            (Level::High, Level::High) => Segment::Vip,
            (Level::High, Level::Low) => Segment::Economical,
            (Level::Low, Level::High) => Segment::Impulsive,
            (Level::Low, Level::Low) => Segment::PriceSensitive,
            _ => Segment::Standard,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Vip => "VIP",
            Segment::Economical => "Economical",
            Segment::Impulsive => "Impulsive",
            Segment::PriceSensitive => "Price-sensitive",
            Segment::Standard => "Standard",
        }
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            Segment::Vip => {
                "Premium customers: offer a loyalty program, exclusive launches and personal service."
            }
            Segment::Economical => {
                "Able to spend but cautious: push bundles and value-for-money promotions."
            }
            Segment::Impulsive => {
                "Spend beyond their income: target flash sales, but apply credit-risk caution."
            }
            Segment::PriceSensitive => {
                "Budget-driven: use discount coupons and low-cost bundles."
            }
            Segment::Standard => {
                "Average profile: focus on retention and seasonal promotions."
            }
        }
    }

    /// CSS classes the presentation layer uses for the segment card.
    pub fn display_class(&self) -> &'static str {
        match self {
            Segment::Vip => "bg-purple-100 border-purple-400 text-purple-700",
            Segment::Economical => "bg-green-100 border-green-400 text-green-700",
            Segment::Impulsive => "bg-red-100 border-red-400 text-red-700",
            Segment::PriceSensitive => "bg-yellow-100 border-yellow-400 text-yellow-700",
            Segment::Standard => "bg-blue-100 border-blue-400 text-blue-700",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregates of one cluster over the raw customer values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatistics {
    pub cluster_id: usize,
    pub count: usize,
    pub avg_income: f64,
    pub avg_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecommendation {
    pub cluster_id: usize,
    pub segment: Segment,
    pub label: String,
    pub strategy: String,
    pub display_class: String,
    pub avg_income: f64,
    pub avg_score: f64,
    pub count: usize,
}

impl SegmentRecommendation {
    pub fn for_cluster(stats: &ClusterStatistics) -> Self {
        let segment = Segment::classify(stats.avg_income, stats.avg_score);
        Self {
            cluster_id: stats.cluster_id,
            segment,
            label: segment.label().to_string(),
            strategy: segment.strategy().to_string(),
            display_class: segment.display_class().to_string(),
            avg_income: stats.avg_income,
            avg_score: stats.avg_score,
            count: stats.count,
        }
    }
}

/// Joins records with their labels and averages each cluster, ordered by
/// cluster id. Clusters without members are omitted.
pub fn cluster_statistics(
    records: &[CustomerRecord],
    labels: &Labels,
) -> Result<Vec<ClusterStatistics>> {
    if records.len() != labels.len() {
        return Err(SegmentationError::Shape(format!(
            "{} customers but {} cluster labels",
            records.len(),
            labels.len()
        )));
    }

    let mut sums: BTreeMap<usize, (usize, f64, f64)> = BTreeMap::new();
    for (record, &label) in records.iter().zip(labels.iter()) {
        let entry = sums.entry(label).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += record.annual_income;
        entry.2 += record.spending_score;
    }

    Ok(sums
        .into_iter()
        .map(|(cluster_id, (count, income, score))| ClusterStatistics {
            cluster_id,
            count,
            avg_income: income / count as f64,
            avg_score: score / count as f64,
        })
        .collect())
}

pub fn recommend(stats: &[ClusterStatistics]) -> Vec<SegmentRecommendation> {
    stats.iter().map(SegmentRecommendation::for_cluster).collect()
}
