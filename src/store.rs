//! Result stores.
//!
//! A store holds three record sets: `customers`, `preprocessing_data` and
//! `clustering_results`. Every write replaces whole sets at once, and a
//! reader sees either the complete old snapshot or the complete new one.
//! Writes are validated before anything is swapped in, so a rejected write
//! leaves the store untouched.

use crate::dataset::{CustomerRecord, Dataset};
use crate::error::{Result, SegmentationError};
use crate::pipeline::ClusterAssignment;
use crate::preprocessing::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub customers: Vec<CustomerRecord>,
    pub preprocessing_data: Vec<FeatureVector>,
    pub clustering_results: Vec<ClusterAssignment>,
}

impl StoreSnapshot {
    /// New customer set; derived sets are cleared because they no longer
    /// describe the stored customers.
    fn with_customers(customers: Vec<CustomerRecord>) -> Result<Self> {
        let customers = Dataset::new(customers)?.into_records();
        Ok(Self {
            customers,
            preprocessing_data: Vec::new(),
            clustering_results: Vec::new(),
        })
    }

    /// Same customers with a new run's features and assignments. The run
    /// must have been computed from exactly the stored customers, and each
    /// set must cover every one of them once.
    fn with_results(
        &self,
        source: &[CustomerRecord],
        features: Vec<FeatureVector>,
        assignments: Vec<ClusterAssignment>,
    ) -> Result<Self> {
        if self.customers.as_slice() != source {
            return Err(SegmentationError::Store(
                "run was computed from a customer set the store no longer holds".to_string(),
            ));
        }

        let live: HashSet<u64> = self.customers.iter().map(|c| c.customer_id).collect();
        check_covers(&live, features.iter().map(|f| f.customer_id), "preprocessing_data")?;
        check_covers(&live, assignments.iter().map(|a| a.customer_id), "clustering_results")?;

        Ok(Self {
            customers: self.customers.clone(),
            preprocessing_data: features,
            clustering_results: assignments,
        })
    }

    /// New customers together with the run computed from them.
    fn with_run(
        customers: Vec<CustomerRecord>,
        features: Vec<FeatureVector>,
        assignments: Vec<ClusterAssignment>,
    ) -> Result<Self> {
        let imported = Self::with_customers(customers)?;
        imported.with_results(&imported.customers, features, assignments)
    }
}

fn check_covers(
    live: &HashSet<u64>,
    ids: impl Iterator<Item = u64>,
    set_name: &str,
) -> Result<()> {
    let mut seen = HashSet::with_capacity(live.len());
    for id in ids {
        if !live.contains(&id) {
            return Err(SegmentationError::validation(format!(
                "{set_name} references unknown CustomerID {id}"
            )));
        }
        if !seen.insert(id) {
            return Err(SegmentationError::validation(format!(
                "{set_name} has more than one row for CustomerID {id}"
            )));
        }
    }
    if seen.len() != live.len() {
        return Err(SegmentationError::validation(format!(
            "{set_name} covers {} of {} customers",
            seen.len(),
            live.len()
        )));
    }
    Ok(())
}

/// Persistence collaborator of the pipeline.
pub trait SegmentStore {
    fn snapshot(&self) -> Result<StoreSnapshot>;

    /// Replaces the customer set and clears the derived sets.
    fn replace_customers(&self, customers: Vec<CustomerRecord>) -> Result<()>;

    /// Replaces `preprocessing_data` and `clustering_results` together.
    /// Rejected unless the stored customers equal `source`, the customers
    /// the run was computed from.
    fn replace_results(
        &self,
        source: &[CustomerRecord],
        features: Vec<FeatureVector>,
        assignments: Vec<ClusterAssignment>,
    ) -> Result<()>;

    /// Replaces all three sets at once with an import and its run.
    fn replace_all(
        &self,
        customers: Vec<CustomerRecord>,
        features: Vec<FeatureVector>,
        assignments: Vec<ClusterAssignment>,
    ) -> Result<()>;
}

/// Store kept in memory; replacing swaps the shared snapshot under a write
/// lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    current: RwLock<Arc<StoreSnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap handle on the current snapshot.
    pub fn current(&self) -> Result<Arc<StoreSnapshot>> {
        let guard = self.current.read().map_err(|e| SegmentationError::Store(e.to_string()))?;
        Ok(Arc::clone(&guard))
    }

    fn replace_with(&self, build: impl FnOnce(&StoreSnapshot) -> Result<StoreSnapshot>) -> Result<()> {
        let mut guard = self.current.write().map_err(|e| SegmentationError::Store(e.to_string()))?;
        let next = build(&guard)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

impl SegmentStore for InMemoryStore {
    fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(self.current()?.as_ref().clone())
    }

    fn replace_customers(&self, customers: Vec<CustomerRecord>) -> Result<()> {
        let count = customers.len();
        self.replace_with(|_| StoreSnapshot::with_customers(customers))?;
        debug!(customers = count, "in-memory store: customers replaced");
        Ok(())
    }

    fn replace_results(
        &self,
        source: &[CustomerRecord],
        features: Vec<FeatureVector>,
        assignments: Vec<ClusterAssignment>,
    ) -> Result<()> {
        self.replace_with(|current| current.with_results(source, features, assignments))?;
        debug!("in-memory store: run results replaced");
        Ok(())
    }

    fn replace_all(
        &self,
        customers: Vec<CustomerRecord>,
        features: Vec<FeatureVector>,
        assignments: Vec<ClusterAssignment>,
    ) -> Result<()> {
        let count = customers.len();
        self.replace_with(|_| StoreSnapshot::with_run(customers, features, assignments))?;
        debug!(customers = count, "in-memory store: customers and run results replaced");
        Ok(())
    }
}

/// Store persisted as one JSON document. Each replace writes a temporary
/// file next to the target and renames it over the old one.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreSnapshot> {
        match File::open(&self.path) {
            Ok(file) => Ok(serde_json::from_reader(BufReader::new(file))?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreSnapshot::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomically(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| SegmentationError::Io(e.error))?;
        Ok(())
    }

    fn replace_with(&self, build: impl FnOnce(&StoreSnapshot) -> Result<StoreSnapshot>) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|e| SegmentationError::Store(e.to_string()))?;
        let current = self.load()?;
        let next = build(&current)?;
        self.write_atomically(&next)
    }
}

impl SegmentStore for JsonFileStore {
    fn snapshot(&self) -> Result<StoreSnapshot> {
        self.load()
    }

    fn replace_customers(&self, customers: Vec<CustomerRecord>) -> Result<()> {
        let count = customers.len();
        self.replace_with(|_| StoreSnapshot::with_customers(customers))?;
        info!(path = %self.path.display(), customers = count, "customers replaced");
        Ok(())
    }

    fn replace_results(
        &self,
        source: &[CustomerRecord],
        features: Vec<FeatureVector>,
        assignments: Vec<ClusterAssignment>,
    ) -> Result<()> {
        let rows = assignments.len();
        self.replace_with(|current| current.with_results(source, features, assignments))?;
        info!(path = %self.path.display(), rows, "run results replaced");
        Ok(())
    }

    fn replace_all(
        &self,
        customers: Vec<CustomerRecord>,
        features: Vec<FeatureVector>,
        assignments: Vec<ClusterAssignment>,
    ) -> Result<()> {
        let count = customers.len();
        self.replace_with(|_| StoreSnapshot::with_run(customers, features, assignments))?;
        info!(path = %self.path.display(), customers = count, "customers and run results replaced");
        Ok(())
    }
}
