//! Command-line interface definitions and argument parsing

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use customer_segments::{Init, Normalization, PipelineConfig};
use std::path::PathBuf;

/// Customer segmentation on annual income and spending score
#[derive(Parser, Debug)]
#[command(name = "segments", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Normalize, cluster, score and label the customers; prints the report as JSON
    Run {
        /// Customer CSV to import. Without it the customers already in --store are used
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// JSON store that receives the imported customers and the run results
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        params: RunParams,
    },

    /// Cluster the customers, then place one hypothetical customer
    Predict {
        /// Customer CSV the model is fitted on
        #[arg(short, long)]
        input: PathBuf,

        /// Annual income in k$
        #[arg(long)]
        income: f64,

        /// Spending score (1-100)
        #[arg(long)]
        score: f64,

        #[command(flatten)]
        params: RunParams,
    },

    /// Segment for a given pair of average income and spending score
    Classify {
        /// Average annual income in k$
        #[arg(long)]
        income: f64,

        /// Average spending score (1-100)
        #[arg(long)]
        score: f64,
    },

    /// Summarize the contents of a JSON store
    Show {
        #[arg(short, long)]
        store: PathBuf,
    },
}

/// Run parameters. Flags override the config file, which overrides defaults.
#[derive(Args, Debug, Default)]
pub struct RunParams {
    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of clusters
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Feature scaling: min-max or z-score
    #[arg(short, long)]
    pub normalization: Option<Normalization>,

    /// Centroid initialization: k-means++ or random
    #[arg(long)]
    pub init: Option<Init>,

    /// Seed of the first restart
    #[arg(long)]
    pub seed: Option<u64>,

    /// Iteration cap per restart
    #[arg(long)]
    pub max_iters: Option<usize>,

    /// Number of restarts
    #[arg(long)]
    pub n_init: Option<usize>,

    /// Labeled customers included in the report
    #[arg(long)]
    pub sample_size: Option<usize>,
}

impl RunParams {
    pub fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(k) = self.clusters {
            config = config.n_clusters(k);
        }
        if let Some(normalization) = self.normalization {
            config = config.normalization(normalization);
        }
        if let Some(init) = self.init {
            config = config.init(init);
        }
        if let Some(seed) = self.seed {
            config = config.seed(seed);
        }
        if let Some(max_iter) = self.max_iters {
            config = config.max_iter(max_iter);
        }
        if let Some(n_init) = self.n_init {
            config = config.n_init(n_init);
        }
        if let Some(sample_size) = self.sample_size {
            config = config.sample_size(sample_size);
        }

        config.validate()?;
        Ok(config)
    }
}
