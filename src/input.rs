use crate::error::EvalError;
use crate::models::{Dataset, InputRecord};
use std::io::Read;

/// Read a JSON array of records and build the dataset
pub fn read_dataset<R: Read>(mut reader: R) -> Result<Dataset, EvalError> {
    let mut raw = String::new();
    reader
        .read_to_string(&mut raw)
        .map_err(|e| EvalError::Input(format!("failed to read input: {}", e)))?;

    let records: Vec<InputRecord> =
        serde_json::from_str(&raw).map_err(|e| EvalError::Input(e.to_string()))?;

    tracing::info!(records = records.len(), "Loaded dataset");
    Ok(Dataset::from_records(records))
}
