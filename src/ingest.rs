//! CSV ingestion of customer records.
//!
//! Accepts both the original export headers (`Annual Income (k$)`,
//! `Spending Score (1-100)`) and the short names (`AnnualIncome`,
//! `SpendingScore`). Extra columns are ignored.

use crate::dataset::{CustomerRecord, Dataset};
use crate::error::{Result, SegmentationError};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Required columns, each with its accepted spellings.
const REQUIRED_COLUMNS: [&[&str]; 5] = [
    &["CustomerID"],
    &["Gender"],
    &["Age"],
    &["AnnualIncome", "Annual Income (k$)"],
    &["SpendingScore", "Spending Score (1-100)"],
];

pub fn read_customers<R: Read>(reader: R) -> Result<Vec<CustomerRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|names| !names.iter().any(|name| headers.iter().any(|h| h == *name)))
        .map(|names| names[0])
        .collect();
    if !missing.is_empty() {
        return Err(SegmentationError::validation(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    let records = csv_reader
        .deserialize()
        .collect::<std::result::Result<Vec<CustomerRecord>, csv::Error>>()?;
    Ok(records)
}

/// Reads and validates a customer CSV file.
pub fn load_customers(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let records = read_customers(File::open(path)?)?;
    let dataset = Dataset::new(records)?;
    info!(path = %path.display(), customers = dataset.n_samples(), "customers loaded");
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MALL_CSV: &str = "\
CustomerID,Gender,Age,Annual Income (k$),Spending Score (1-100)
1,Male,19,15,39
2,Male,21,15,81
3,Female,20,16,6
4,Female,23,16,77
";

    #[test]
    fn test_reads_original_headers() {
        let records = read_customers(MALL_CSV.as_bytes()).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[1], CustomerRecord::new(2, "Male", 21, 15.0, 81.0));
    }

    #[test]
    fn test_reads_short_headers_and_extra_columns() {
        let csv = "CustomerID, Gender, Age, AnnualIncome, SpendingScore, Region\n\
                   7, Female, 35, 70.5, 42, North\n";
        let records = read_customers(csv.as_bytes()).unwrap();
        assert_eq!(records, vec![CustomerRecord::new(7, "Female", 35, 70.5, 42.0)]);
    }

    #[test]
    fn test_age_is_kept_as_text() {
        let csv = "CustomerID,Gender,Age,AnnualIncome,SpendingScore\n\
                   1,Male,23.0,15,39\n\
                   2,Female,,16,81\n";
        let records = read_customers(csv.as_bytes()).unwrap();
        assert_eq!(records[0].age, "23.0");
        assert_eq!(records[1].age, "");
        assert!(Dataset::new(records).is_ok());
    }

    #[test]
    fn test_missing_columns_rejected() {
        let csv = "CustomerID,Gender,Age,AnnualIncome\n1,Male,19,15\n";
        let err = read_customers(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, SegmentationError::Validation { .. }));
        assert!(err.to_string().contains("SpendingScore"));
    }

    #[test]
    fn test_bad_value_is_csv_error() {
        let csv = "CustomerID,Gender,Age,AnnualIncome,SpendingScore\n1,Male,19,lots,50\n";
        assert!(matches!(
            read_customers(csv.as_bytes()),
            Err(SegmentationError::Csv(_))
        ));
    }

    #[test]
    fn test_load_customers_validates() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{MALL_CSV}").unwrap();
        writeln!(file, "4,Male,40,60,60").unwrap();

        let err = load_customers(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate CustomerID 4"));
    }

    #[test]
    fn test_load_customers() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{MALL_CSV}").unwrap();

        let dataset = load_customers(file.path()).unwrap();
        assert_eq!(dataset.customer_ids(), vec![1, 2, 3, 4]);
    }
}
