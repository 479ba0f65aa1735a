//! Parquet-backed record store.
//!
//! Each record kind lives in its own file, `<dir>/<table>.parquet`, sharing
//! one Arrow schema: provenance columns plus the kind-specific fields as a
//! JSON string. Opening a store loads the ids already on disk so duplicates
//! are rejected across runs; new records are staged in memory until
//! [`ParquetStore::flush`] rewrites the affected files atomically.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use arrow_array::{Array, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use commit_protocol::EventKind;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::StoreError;
use crate::record::{Record, RecordBody, RecordId};
use crate::store::{RecordStore, WriteOutcome};

/// Arrow schema shared by every record table.
static RECORD_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("block_number", DataType::UInt64, false),
        Field::new("block_timestamp", DataType::UInt64, false),
        Field::new("transaction_hash", DataType::Utf8, false),
        Field::new("log_index", DataType::UInt32, false),
        Field::new("commitment_id", DataType::Utf8, true),
        Field::new("fields", DataType::Utf8, false),
    ]))
});

/// A record staged for the next flush, with its fields pre-serialized.
#[derive(Debug)]
struct Staged {
    record: Record,
    fields: String,
}

/// On-disk batches plus staged rows for one record kind.
#[derive(Debug, Default)]
struct Table {
    batches: Vec<RecordBatch>,
    ids: HashSet<RecordId>,
    staged: Vec<Staged>,
}

/// Record store writing one Parquet file per event kind.
#[derive(Debug)]
pub struct ParquetStore {
    dir: PathBuf,
    tables: BTreeMap<EventKind, Table>,
}

impl ParquetStore {
    /// Open (or prepare) a store rooted at `dir`.
    ///
    /// Missing files are treated as empty tables.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or its id column
    /// is malformed.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let mut tables = BTreeMap::new();
        for &kind in EventKind::ALL {
            let path = table_path(dir, kind);
            let batches = read(&path)?;
            let mut ids = HashSet::new();
            for batch in &batches {
                let column = string_column(batch, "id", &path)?;
                for value in column.iter().flatten() {
                    ids.insert(parse_id(value, &path)?);
                }
            }
            if !batches.is_empty() {
                tracing::debug!(%kind, records = ids.len(), path = %path.display(), "table loaded");
            }
            tables.insert(
                kind,
                Table {
                    batches,
                    ids,
                    staged: Vec::new(),
                },
            );
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            tables,
        })
    }

    /// Number of records staged but not yet flushed.
    #[must_use]
    pub fn staged(&self) -> usize {
        self.tables.values().map(|t| t.staged.len()).sum()
    }

    /// Write every table with staged records to disk.
    ///
    /// Each file is replaced atomically (temp file + rename), so a crash
    /// leaves either the old or the new table, never a torn one.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if Arrow/Parquet reject the data.
    /// Staged records of tables that were not yet written remain staged.
    pub fn flush(&mut self) -> Result<usize, StoreError> {
        let mut written = 0;
        for (&kind, table) in &mut self.tables {
            if table.staged.is_empty() {
                continue;
            }
            let batch = staged_to_batch(&table.staged)?;
            let path = table_path(&self.dir, kind);
            let mut batches = table.batches.clone();
            batches.push(batch);
            write(&path, &batches)?;

            written += table.staged.len();
            tracing::info!(
                %kind,
                new_records = table.staged.len(),
                total_records = table.ids.len(),
                "table written"
            );
            table.batches = batches;
            table.staged.clear();
        }
        Ok(written)
    }

    /// Read back every record of `kind`, flushed ones first, in write order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if a stored row cannot be decoded.
    pub fn load(&self, kind: EventKind) -> Result<Vec<Record>, StoreError> {
        let Some(table) = self.tables.get(&kind) else {
            return Ok(Vec::new());
        };
        let path = table_path(&self.dir, kind);
        let mut records = Vec::with_capacity(table.ids.len());
        for batch in &table.batches {
            records.extend(batch_to_records(batch, kind, &path)?);
        }
        records.extend(table.staged.iter().map(|s| s.record.clone()));
        Ok(records)
    }
}

impl RecordStore for ParquetStore {
    fn create(&mut self, record: Record) -> Result<WriteOutcome, StoreError> {
        let table = self.tables.entry(record.kind()).or_default();
        if table.ids.contains(&record.id) {
            return Ok(WriteOutcome::Duplicate);
        }
        let fields = record.body.fields_json()?;
        table.ids.insert(record.id);
        table.staged.push(Staged { record, fields });
        Ok(WriteOutcome::Created)
    }

    fn contains(&self, kind: EventKind, id: &RecordId) -> bool {
        self.tables.get(&kind).is_some_and(|t| t.ids.contains(id))
    }

    fn count(&self, kind: EventKind) -> usize {
        self.tables.get(&kind).map_or(0, |t| t.ids.len())
    }
}

/// Path of the table file for `kind` under `dir`.
fn table_path(dir: &Path, kind: EventKind) -> PathBuf {
    dir.join(format!("{}.parquet", kind.table()))
}

/// Convert staged records into a columnar [`RecordBatch`].
fn staged_to_batch(staged: &[Staged]) -> Result<RecordBatch, StoreError> {
    let cap = staged.len();
    let mut ids = Vec::with_capacity(cap);
    let mut block_numbers = Vec::with_capacity(cap);
    let mut block_timestamps = Vec::with_capacity(cap);
    let mut tx_hashes = Vec::with_capacity(cap);
    let mut log_indices = Vec::with_capacity(cap);
    let mut commitment_ids: Vec<Option<String>> = Vec::with_capacity(cap);
    let mut fields = Vec::with_capacity(cap);

    for Staged {
        record,
        fields: json,
    } in staged
    {
        ids.push(record.id.to_string());
        block_numbers.push(record.block_number);
        block_timestamps.push(record.block_timestamp);
        tx_hashes.push(format!("{:#x}", record.transaction_hash));
        log_indices.push(record.id.log_index());
        commitment_ids.push(record.commitment_id().map(|id| id.to_string()));
        fields.push(json.as_str());
    }

    Ok(RecordBatch::try_new(
        Arc::clone(&RECORD_SCHEMA),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(UInt64Array::from(block_numbers)),
            Arc::new(UInt64Array::from(block_timestamps)),
            Arc::new(StringArray::from(tx_hashes)),
            Arc::new(UInt32Array::from(log_indices)),
            Arc::new(StringArray::from(commitment_ids)),
            Arc::new(StringArray::from(fields)),
        ],
    )?)
}

/// Decode the rows of a stored batch back into records.
fn batch_to_records(
    batch: &RecordBatch,
    kind: EventKind,
    path: &Path,
) -> Result<Vec<Record>, StoreError> {
    let ids = string_column(batch, "id", path)?;
    let block_numbers = u64_column(batch, "block_number", path)?;
    let block_timestamps = u64_column(batch, "block_timestamp", path)?;
    let tx_hashes = string_column(batch, "transaction_hash", path)?;
    let fields = string_column(batch, "fields", path)?;

    (0..batch.num_rows())
        .map(|row| {
            let body = RecordBody::from_fields_json(kind, fields.value(row))
                .map_err(|e| corrupt(path, format!("row {row}: {e}")))?;
            Ok(Record {
                id: parse_id(ids.value(row), path)?,
                block_number: block_numbers.value(row),
                block_timestamp: block_timestamps.value(row),
                transaction_hash: tx_hashes
                    .value(row)
                    .parse()
                    .map_err(|e| corrupt(path, format!("row {row}: transaction hash: {e}")))?,
                body,
            })
        })
        .collect()
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| corrupt(path, format!("missing utf8 column `{name}`")))
}

fn u64_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a UInt64Array, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
        .ok_or_else(|| corrupt(path, format!("missing u64 column `{name}`")))
}

fn parse_id(value: &str, path: &Path) -> Result<RecordId, StoreError> {
    value
        .parse()
        .map_err(|e| corrupt(path, format!("bad record id {value}: {e}")))
}

fn corrupt(path: &Path, reason: String) -> StoreError {
    StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    }
}

/// Read all existing record batches from a Parquet file.
///
/// Returns an empty vec if the file does not exist.
fn read(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let batches = ParquetRecordBatchReaderBuilder::try_new(file)?
        .build()?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(batches)
}

/// Write record batches to a Parquet file using Zstd compression.
///
/// Uses atomic write (temp file + rename) to prevent corruption.
fn write(path: &Path, batches: &[RecordBatch]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("parquet.tmp");
    let file = std::fs::File::create(&tmp)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(3)?))
        .build();

    let mut writer = ArrowWriter::try_new(file, Arc::clone(&RECORD_SCHEMA), Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;

    std::fs::rename(&tmp, path)?;
    Ok(())
}
