//! Result writers: address tables (TSV or Parquet), cluster tables,
//! threshold maps, and per-run metadata.
//!
//! Everything here runs after the pipeline has finished successfully, which
//! is what gives the run its all-or-nothing output behavior: a failed stream
//! never reaches these functions.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::StringArray;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;

use crate::cluster::MultiLevelClustering;
use crate::error::GasError;
use crate::membership::MembershipStore;
use crate::types::ThresholdMap;

/// Output format for the final address table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Parquet,
}

impl OutputFormat {
    pub const ACCEPTED: [&'static str; 2] = ["text", "parquet"];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = GasError;

    fn from_str(s: &str) -> std::result::Result<Self, GasError> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "parquet" => Ok(OutputFormat::Parquet),
            other => Err(GasError::config(format!(
                "'{}' is not one of the accepted output formats {:?}",
                other,
                Self::ACCEPTED
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Write the final address table, one row per sample in insertion order.
pub fn write_assignments(
    path: &Path,
    store: &MembershipStore,
    format: OutputFormat,
    sample_col: &str,
    address_col: &str,
) -> Result<()> {
    match format {
        OutputFormat::Text => write_assignments_text(path, store, sample_col, address_col),
        OutputFormat::Parquet => write_assignments_parquet(path, store, sample_col, address_col),
    }
}

fn write_assignments_text(
    path: &Path,
    store: &MembershipStore,
    sample_col: &str,
    address_col: &str,
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create result file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}\t{}", sample_col, address_col)?;
    for (id, address) in store.iter_ordered() {
        writeln!(writer, "{}\t{}", id, address)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_assignments_parquet(
    path: &Path,
    store: &MembershipStore,
    sample_col: &str,
    address_col: &str,
) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(sample_col, DataType::Utf8, false),
        Field::new(address_col, DataType::Utf8, false),
    ]));

    let mut ids = Vec::with_capacity(store.len());
    let mut addresses = Vec::with_capacity(store.len());
    for (id, address) in store.iter_ordered() {
        ids.push(id.to_string());
        addresses.push(address);
    }

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(addresses)),
        ],
    )
    .context("failed to build result record batch")?;

    let file = File::create(path)
        .with_context(|| format!("failed to create result file {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .context("failed to open parquet writer")?;
    writer.write(&batch).context("failed to write result batch")?;
    writer.close().context("failed to finalize parquet file")?;
    Ok(())
}

/// Write the de novo cluster table: id, joined address, one column per level.
pub fn write_clusters(
    path: &Path,
    clustering: &MultiLevelClustering,
    thresholds: &ThresholdMap,
    delimiter: char,
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create cluster file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let mut header = vec!["id".to_string(), "address".to_string()];
    header.extend(thresholds.level_names());
    writeln!(writer, "{}", header.join("\t"))?;

    let mut delim_buf = [0u8; 4];
    let delim = delimiter.encode_utf8(&mut delim_buf);
    for (label, ids) in clustering.memberships() {
        let segments: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let address = segments.join(delim);
        writeln!(writer, "{}\t{}\t{}", label, address, segments.join("\t"))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the threshold map as a JSON object, preserving level order.
pub fn write_threshold_map(path: &Path, thresholds: &ThresholdMap) -> Result<()> {
    let mut map = serde_json::Map::new();
    for level in thresholds.levels() {
        map.insert(level.name.clone(), serde_json::json!(level.threshold));
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &map)
        .context("failed to serialize threshold map")?;
    Ok(())
}

/// Per-run metadata mirrored into `run.json`.
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    pub program: String,
    pub version: String,
    pub analysis_start_time: String,
    pub analysis_end_time: String,
    pub parameters: serde_json::Value,
    pub threshold_map: serde_json::Value,
    pub result_file: String,
}

const TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

impl RunMetadata {
    pub fn new(program: &str, parameters: serde_json::Value) -> Self {
        RunMetadata {
            program: program.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            analysis_start_time: chrono::Local::now().format(TIME_FORMAT).to_string(),
            analysis_end_time: String::new(),
            parameters,
            threshold_map: serde_json::Value::Null,
            result_file: String::new(),
        }
    }

    pub fn set_thresholds(&mut self, thresholds: &ThresholdMap) {
        let mut map = serde_json::Map::new();
        for level in thresholds.levels() {
            map.insert(level.name.clone(), serde_json::json!(level.threshold));
        }
        self.threshold_map = serde_json::Value::Object(map);
    }

    /// Stamp the end time and write the metadata file.
    pub fn finish(mut self, path: &Path) -> Result<()> {
        self.analysis_end_time = chrono::Local::now().format(TIME_FORMAT).to_string();
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self)
            .context("failed to serialize run metadata")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThresholdMap;
    use std::fs;
    use tempfile::tempdir;

    fn sample_store() -> MembershipStore {
        let mut store = MembershipStore::empty('.', 2);
        store.add("A".to_string(), vec![1, 1]);
        store.add("B".to_string(), vec![1, 2]);
        store
    }

    #[test]
    fn test_write_assignments_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.text");
        write_assignments(&path, &sample_store(), OutputFormat::Text, "id", "address").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id\taddress\nA\t1.1\nB\t1.2\n");
    }

    #[test]
    fn test_write_assignments_parquet_round_trip() {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let dir = tempdir().unwrap();
        let path = dir.path().join("results.parquet");
        write_assignments(
            &path,
            &sample_store(),
            OutputFormat::Parquet,
            "id",
            "address",
        )
        .unwrap();

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).name(), "id");
        let addresses = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(addresses.value(0), "1.1");
        assert_eq!(addresses.value(1), "1.2");
    }

    #[test]
    fn test_write_threshold_map_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        let thresholds = ThresholdMap::from_values(&[10.0, 5.0, 1.0]).unwrap();
        write_threshold_map(&path, &thresholds).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let l1 = content.find("level_1").unwrap();
        let l2 = content.find("level_2").unwrap();
        let l3 = content.find("level_3").unwrap();
        assert!(l1 < l2 && l2 < l3);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!(
            "parquet".parse::<OutputFormat>().unwrap(),
            OutputFormat::Parquet
        );
        assert!("csv".parse::<OutputFormat>().is_err());
    }
}
