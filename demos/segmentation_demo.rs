use customer_segments::{
    CustomerRecord, Dataset, Matrix, PipelineConfig, PipelineContext, SegmentationError,
};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// (annual income k$, spending score) centers of the synthetic shoppers
const GROUP_CENTERS: [(f64, f64); 5] = [
    (25.0, 20.0),
    (25.0, 80.0),
    (55.0, 50.0),
    (88.0, 17.0),
    (88.0, 82.0),
];
const PER_GROUP: usize = 40;

fn main() -> Result<(), SegmentationError> {
    println!("=== Customer Segmentation Demo ===\n");

    let dataset = synthetic_mall(7)?;
    println!(
        "Dataset: {} customers, {} features",
        dataset.n_samples(),
        dataset.n_features()
    );
    println!("Expected: {} shopper groups\n", GROUP_CENTERS.len());

    println!("=== Choosing k ===");
    for k in 2..=8 {
        let config = PipelineConfig::default().n_clusters(k);
        let report = PipelineContext::new(dataset.clone(), config).run()?.report;
        println!(
            "k={}: inertia {:.4}, silhouette {}, Davies-Bouldin {}",
            k,
            report.quality.inertia,
            format_metric(report.quality.silhouette),
            format_metric(report.quality.davies_bouldin),
        );
    }

    println!("\n=== Segments (k=5) ===");
    let output = PipelineContext::new(dataset, PipelineConfig::default()).run()?;
    for recommendation in &output.report.recommendations {
        println!(
            "Cluster {}: {} customers, income {:.1} k$, score {:.1} -> {}",
            recommendation.cluster_id,
            recommendation.count,
            recommendation.avg_income,
            recommendation.avg_score,
            recommendation.label
        );
        println!("  {}", recommendation.strategy);
    }

    println!("\n=== New customers ===");
    for (income, score) in [(20.0, 90.0), (95.0, 10.0), (60.0, 45.0)] {
        let (cluster_id, recommendation) = output.predict(income, score)?;
        println!(
            "income {income:.0} k$, score {score:.0} -> cluster {cluster_id} ({})",
            recommendation.label
        );
    }

    Ok(())
}

fn synthetic_mall(seed: u64) -> Result<Dataset, SegmentationError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = GROUP_CENTERS.len() * PER_GROUP;
    let noise = Matrix::random_using((n, 2), Uniform::new(-9.0, 9.0), &mut rng);

    let records = noise
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, offset)| {
            let (income, score) = GROUP_CENTERS[i / PER_GROUP];
            let gender = if i % 2 == 0 { "Female" } else { "Male" };
            CustomerRecord::new(
                i as u64 + 1,
                gender,
                18 + (i % 50) as u32,
                (income + offset[0]).max(1.0).round(),
                (score + offset[1]).clamp(1.0, 100.0).round(),
            )
        })
        .collect();

    Dataset::new(records)
}

fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{v:.4}"))
}
