//! Parquet-backed ntuples.
//!
//! One Parquet file holds one tree. The tree is named by the `tree_name`
//! key-value metadata entry when present, otherwise by the file stem. Numeric
//! and boolean columns become flat columns; `List`/`LargeList` columns of
//! numbers become ragged columns. Nulls read as NaN.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray, OffsetSizeTrait};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use crate::chunk::Chunk;
use crate::column::{Column, Jagged};
use crate::error::{NtupleError, Result};
use crate::source::{ChunkIter, EventTree, NtupleFile, check_step_size, filter_accepts};

/// Key-value metadata entry naming the tree stored in a Parquet file.
pub const TREE_NAME_KEY: &str = "tree_name";

/// An opened Parquet ntuple.
///
/// Opening reads the footer only; each iteration reopens the file and closes it
/// when the chunk iterator is dropped.
#[derive(Debug, Clone)]
pub struct ParquetFile {
    path: PathBuf,
    tree: ParquetTree,
}

impl ParquetFile {
    /// Open `path` and read its schema and entry count.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
        let file_meta = builder.metadata().file_metadata();
        let num_entries = file_meta.num_rows().max(0) as u64;
        let stored_name = file_meta.key_value_metadata().and_then(|kvs| {
            kvs.iter().find(|kv| kv.key == TREE_NAME_KEY).and_then(|kv| kv.value.clone())
        });
        let name = stored_name.unwrap_or_else(|| {
            path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        });
        tracing::debug!(path = %path.display(), tree = %name, num_entries, "opened parquet ntuple");
        let tree =
            ParquetTree { path: path.clone(), name, num_entries, schema: builder.schema().clone() };
        Ok(Self { path, tree })
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The single tree stored in this file.
    pub fn tree(&self) -> &ParquetTree {
        &self.tree
    }
}

impl NtupleFile for ParquetFile {
    fn get_tree(&self, name: &str) -> Result<Option<Box<dyn EventTree + '_>>> {
        if self.tree.name == name {
            Ok(Some(Box::new(&self.tree)))
        } else {
            Ok(None)
        }
    }
}

/// The tree of a [`ParquetFile`].
#[derive(Debug, Clone)]
pub struct ParquetTree {
    path: PathBuf,
    name: String,
    num_entries: u64,
    schema: SchemaRef,
}

impl ParquetTree {
    /// Names of all top-level columns.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }
}

impl EventTree for ParquetTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_entries(&self) -> u64 {
        self.num_entries
    }

    fn iterate(&self, step_size: usize, filter_name: &BTreeSet<String>) -> Result<ChunkIter<'_>> {
        check_step_size(step_size)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&self.path)?)?;
        let roots: Vec<usize> = builder
            .schema()
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| filter_accepts(filter_name, f.name()))
            .map(|(i, _)| i)
            .collect();
        let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
        let reader = builder.with_projection(mask).with_batch_size(step_size).build()?;
        Ok(Box::new(ParquetChunks { reader, next_entry: 0 }))
    }
}

struct ParquetChunks {
    reader: ParquetRecordBatchReader,
    next_entry: u64,
}

impl Iterator for ParquetChunks {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = match self.reader.next()? {
            Ok(b) => b,
            Err(e) => return Some(Err(e.into())),
        };
        let start = self.next_entry;
        self.next_entry += batch.num_rows() as u64;
        Some(batch_to_chunk(&batch, start))
    }
}

/// Convert one record batch into a chunk starting at `entry_start`.
pub fn batch_to_chunk(batch: &RecordBatch, entry_start: u64) -> Result<Chunk> {
    let schema = batch.schema();
    let mut columns = HashMap::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        columns.insert(field.name().clone(), array_to_column(field.name(), array)?);
    }
    Chunk::new(entry_start, batch.num_rows(), columns)
}

fn array_to_column(name: &str, array: &ArrayRef) -> Result<Column> {
    match array.data_type() {
        DataType::List(_) => list_to_column::<i32>(name, array),
        DataType::LargeList(_) => list_to_column::<i64>(name, array),
        dt if dt.is_numeric() || *dt == DataType::Boolean => {
            Ok(Column::Flat(to_f64_values(array)?))
        }
        other => Err(NtupleError::UnsupportedType {
            name: name.to_string(),
            data_type: other.to_string(),
        }),
    }
}

fn list_to_column<O: OffsetSizeTrait>(name: &str, array: &ArrayRef) -> Result<Column> {
    let list = array.as_list::<O>();
    let raw = list.value_offsets();
    let first = raw.first().map(|o| o.as_usize()).unwrap_or(0);
    let last = raw.last().map(|o| o.as_usize()).unwrap_or(0);
    let inner = list.values();
    if !(inner.data_type().is_numeric() || *inner.data_type() == DataType::Boolean) {
        return Err(NtupleError::UnsupportedType {
            name: name.to_string(),
            data_type: array.data_type().to_string(),
        });
    }
    let values = to_f64_values(&inner.slice(first, last - first))?;
    // Null rows carry empty value ranges, so offsets alone describe them.
    let offsets = raw.iter().map(|o| o.as_usize() - first).collect();
    Ok(Column::Ragged(Jagged::new(values, offsets)?))
}

fn to_f64_values(array: &ArrayRef) -> Result<Vec<f64>> {
    let converted = cast(array, &DataType::Float64)?;
    let floats = converted.as_primitive::<Float64Type>();
    Ok(floats.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use arrow::array::{Float32Array, Int32Array, ListArray, StringArray};
    use arrow::datatypes::{Field, Schema};
    use parquet::arrow::ArrowWriter;
    use parquet::file::metadata::KeyValue;
    use parquet::file::properties::WriterProperties;

    fn tmp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("ssrl_ntuple_{}_{}_{}.parquet", std::process::id(), nanos, name));
        p
    }

    fn write_fixture(path: &Path, tree_name: Option<&str>) {
        let hits = ListArray::from_iter_primitive::<Float64Type, _, _>(vec![
            Some(vec![Some(1.0), Some(2.0)]),
            Some(vec![]),
            None,
            Some(vec![Some(3.0), None]),
            Some(vec![Some(4.0)]),
        ]);
        let schema = Arc::new(Schema::new(vec![
            Field::new("x", DataType::Float32, false),
            Field::new("n", DataType::Int32, true),
            Field::new("hits", hits.data_type().clone(), true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Float32Array::from(vec![0.5, 1.5, 2.5, 3.5, 4.5])),
                Arc::new(Int32Array::from(vec![Some(2), Some(0), None, Some(2), Some(1)])),
                Arc::new(hits),
            ],
        )
        .unwrap();
        let props = tree_name.map(|n| {
            WriterProperties::builder()
                .set_key_value_metadata(Some(vec![KeyValue::new(
                    TREE_NAME_KEY.to_string(),
                    n.to_string(),
                )]))
                .build()
        });
        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, props).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn reads_flat_and_ragged_columns_in_chunks() {
        let path = tmp_path("chunks");
        write_fixture(&path, Some("events"));

        let file = ParquetFile::open(&path).unwrap();
        assert!(file.get_tree("other").unwrap().is_none());
        let tree = file.get_tree("events").unwrap().unwrap();
        assert_eq!(tree.num_entries(), 5);

        let chunks: Vec<Chunk> =
            tree.iterate(2, &BTreeSet::new()).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(chunks.iter().map(Chunk::n_events).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(chunks[1].report().tree_entry_start, 2);

        let x = chunks[0].column("x").unwrap();
        assert_eq!(x, &Column::Flat(vec![0.5, 1.5]));

        let hits = chunks[1].column("hits").unwrap();
        assert!(hits.is_ragged());
        assert_eq!(hits.n_events(), 2);
        assert_eq!(hits.event(0).len(), 0);
        assert_eq!(hits.event(1)[0], 3.0);
        assert!(hits.event(1)[1].is_nan());

        assert!(chunks[1].column("n").unwrap().event(0)[0].is_nan());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn projection_and_default_tree_name() {
        let path = tmp_path("projection");
        write_fixture(&path, None);

        let file = ParquetFile::open(&path).unwrap();
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        assert_eq!(file.tree().name(), stem);
        assert_eq!(file.tree().column_names(), vec!["x", "n", "hits"]);

        let filter: BTreeSet<String> = ["hits".to_string()].into();
        let chunk = file.tree().iterate(10, &filter).unwrap().next().unwrap().unwrap();
        assert!(chunk.contains("hits"));
        assert!(!chunk.contains("x"));
        assert_eq!(chunk.column("hits").unwrap().flatten().len(), 5);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn string_columns_are_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new("s", DataType::Utf8, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["a"]))]).unwrap();
        assert!(matches!(batch_to_chunk(&batch, 0), Err(NtupleError::UnsupportedType { .. })));
    }
}
