//! `segments`: customer segmentation CLI.
//!
//! Logs go to stderr; reports and summaries go to stdout.

use anyhow::{Context, Result, bail};
use clap::Parser;
use customer_segments::ingest::load_customers;
use customer_segments::{
    JsonFileStore, PipelineContext, RunReport, Segment, SegmentStore,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

mod cli;

use cli::{Cli, Command, RunParams};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Run {
            input,
            store,
            output,
            params,
        } => run_pipeline(input.as_deref(), store.as_deref(), output, &params),
        Command::Predict {
            input,
            income,
            score,
            params,
        } => run_prediction(&input, income, score, &params),
        Command::Classify { income, score } => {
            let segment = Segment::classify(income, score);
            println!("{segment}");
            println!("  {}", segment.strategy());
            Ok(())
        }
        Command::Show { store } => show_store(&store),
    }
}

fn run_pipeline(
    input: Option<&Path>,
    store_path: Option<&Path>,
    output: Option<PathBuf>,
    params: &RunParams,
) -> Result<()> {
    let config = params.to_config()?;
    let store = store_path.map(JsonFileStore::new);

    let output_data = match (input, &store) {
        (Some(input), store) => {
            let dataset = load_customers(input)
                .with_context(|| format!("failed to import {}", input.display()))?;
            let context = PipelineContext::new(dataset, config);
            match store {
                Some(store) => context.run_and_import(store)?,
                None => context.run()?,
            }
        }
        (None, Some(store)) => PipelineContext::from_store(store, config)
            .with_context(|| format!("no usable customers in {}", store.path().display()))?
            .run_and_store(store)?,
        (None, None) => bail!("nothing to cluster: pass --input, --store or both"),
    };

    write_report(&output_data.report, output.as_deref())
}

fn run_prediction(input: &Path, income: f64, score: f64, params: &RunParams) -> Result<()> {
    let dataset = load_customers(input)
        .with_context(|| format!("failed to import {}", input.display()))?;
    let context = PipelineContext::new(dataset, params.to_config()?);
    let output = context.run()?;

    let (cluster_id, recommendation) = output.predict(income, score)?;
    let size = output.fit.cluster_sizes()[cluster_id];
    info!(cluster_id, size, "customer placed");

    println!("Predicted cluster: {cluster_id}");
    println!(
        "  Size: {} customers ({:.1}% of total)",
        size,
        size as f64 / output.report.n_customers as f64 * 100.0
    );
    println!(
        "  Averages: income {:.1} k$, spending score {:.1}",
        recommendation.avg_income, recommendation.avg_score
    );
    println!("  Segment: {}", recommendation.label);
    println!("  {}", recommendation.strategy);
    Ok(())
}

fn write_report(report: &RunReport, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.flush()?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, report)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn show_store(path: &Path) -> Result<()> {
    let snapshot = JsonFileStore::new(path)
        .snapshot()
        .with_context(|| format!("failed to read {}", path.display()))?;

    println!("Store: {}", path.display());
    println!("  customers:          {}", snapshot.customers.len());
    println!("  preprocessing_data: {}", snapshot.preprocessing_data.len());
    println!("  clustering_results: {}", snapshot.clustering_results.len());

    let mut sizes = std::collections::BTreeMap::new();
    for assignment in &snapshot.clustering_results {
        *sizes.entry(assignment.cluster_id).or_insert(0usize) += 1;
    }
    for (cluster_id, count) in sizes {
        println!("  cluster {cluster_id}: {count} customers");
    }
    Ok(())
}
