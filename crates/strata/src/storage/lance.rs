//! LanceDB-backed tier index
//!
//! One table per tier. `session_id` and `entry_type` are promoted out of the
//! metadata into their own columns so filters can run inside the query; the
//! full metadata map is kept as a JSON string.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::memory::types::TierEntry;
use crate::storage::VectorIndex;
use crate::storage::filter::IndexFilter;

/// LanceDB-backed tier index. One table per tier.
pub struct LanceIndex {
    table: Table,
    name: String,
    dimension: i32,
}

impl LanceIndex {
    /// Connect to the database at `path` and open `table_name`, creating an
    /// empty table with an `dimension`-wide embedding column if missing.
    pub async fn open(path: &Path, table_name: &str, dimension: usize) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| StrataError::Storage("Invalid path encoding".to_string()))?;
        let dimension = i32::try_from(dimension).map_err(|_| {
            StrataError::Config(format!("Embedding dimension {dimension} is too large"))
        })?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to list tables: {e}")))?;

        let table = if names.iter().any(|n| n == table_name) {
            debug!("Opening LanceDB table {}", table_name);
            connection
                .open_table(table_name)
                .execute()
                .await
                .map_err(|e| {
                    StrataError::Storage(format!("Failed to open table {table_name}: {e}"))
                })?
        } else {
            info!("Creating LanceDB table {} ({} dims)", table_name, dimension);
            let schema = Self::schema(dimension);
            let batch = Self::entries_to_batch(&[], schema.clone(), dimension)?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            connection
                .create_table(table_name, Box::new(batches))
                .execute()
                .await
                .map_err(|e| {
                    StrataError::Storage(format!("Failed to create table {table_name}: {e}"))
                })?
        };

        Ok(Self {
            table,
            name: table_name.to_string(),
            dimension,
        })
    }

    fn schema(dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
            // Promoted out of metadata so filters can push down
            Field::new("session_id", DataType::Utf8, true),
            Field::new("entry_type", DataType::Utf8, true),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ]))
    }

    fn entries_to_batch(
        entries: &[TierEntry],
        schema: Arc<Schema>,
        dimension: i32,
    ) -> Result<RecordBatch> {
        let ids: Vec<String> = entries.iter().map(|e| e.id.to_string()).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();

        let embeddings: Vec<Option<Vec<Option<f32>>>> = entries
            .iter()
            .map(|e| Some(e.embedding.iter().map(|&v| Some(v)).collect()))
            .collect();

        let session_ids: Vec<Option<&str>> = entries.iter().map(TierEntry::session_id).collect();
        let entry_types: Vec<Option<&str>> = entries.iter().map(TierEntry::entry_type).collect();

        let metadata: Vec<String> = entries
            .iter()
            .map(|e| serde_json::to_string(&e.metadata))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| StrataError::Serialization(format!("Failed to encode metadata: {e}")))?;
        let metadata_refs: Vec<&str> = metadata.iter().map(String::as_str).collect();

        let created_at: Vec<i64> = entries
            .iter()
            .map(|e| e.timestamp.timestamp_micros())
            .collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(id_refs)),
                Arc::new(StringArray::from(contents)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embeddings, dimension)),
                Arc::new(StringArray::from(session_ids)),
                Arc::new(StringArray::from(entry_types)),
                Arc::new(StringArray::from(metadata_refs)),
                Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
            ],
        )
        .map_err(|e| StrataError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    fn batch_to_entries(batch: &RecordBatch) -> Result<Vec<TierEntry>> {
        let ids = string_column(batch, "id")?;
        let contents = string_column(batch, "content")?;
        let metadata = string_column(batch, "metadata")?;

        let embeddings = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| StrataError::Storage("Failed to get embedding column".to_string()))?;

        let created_at = batch
            .column_by_name("created_at")
            .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
            .ok_or_else(|| StrataError::Storage("Failed to get created_at column".to_string()))?;

        let mut entries = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let id = Uuid::parse_str(ids.value(row))
                .map_err(|e| StrataError::Storage(format!("Failed to parse UUID: {e}")))?;

            let embedding_list = embeddings.value(row);
            let embedding_values = embedding_list
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| {
                    StrataError::Storage("Failed to get embedding values".to_string())
                })?;
            let embedding: Vec<f32> = embedding_values.values().to_vec();

            let metadata: Map<String, Value> = serde_json::from_str(metadata.value(row))
                .map_err(|e| {
                    StrataError::Serialization(format!("Failed to decode metadata: {e}"))
                })?;

            let timestamp = Utc
                .timestamp_micros(created_at.value(row))
                .single()
                .ok_or_else(|| {
                    StrataError::Storage("Failed to parse created_at timestamp".to_string())
                })?;

            entries.push(TierEntry {
                id,
                content: contents.value(row).to_string(),
                embedding,
                metadata,
                timestamp,
            });
        }
        Ok(entries)
    }

    /// Number of rows in the table
    pub async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to count rows: {e}")))
    }

    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StrataError::Storage(format!("Failed to get {name} column")))
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<TierEntry>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let mut query = self
            .table
            .query()
            .nearest_to(vector)
            .map_err(|e| StrataError::Storage(format!("Failed to create vector query: {e}")))?
            .limit(k);

        if let Some(sql_filter) = filter.to_sql_clause() {
            query = query.only_if(sql_filter);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to execute search: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to collect search results: {e}")))?;

        let mut entries = Vec::new();
        for batch in &batches {
            entries.extend(Self::batch_to_entries(batch)?);
        }
        entries.truncate(k);

        debug!(table = %self.name, "Search returned {} entries", entries.len());
        Ok(entries)
    }

    async fn upsert(&self, entry: &TierEntry) -> Result<()> {
        if entry.embedding.len() != self.dimension() {
            return Err(StrataError::Embedding(format!(
                "Embedding has {} dimensions, table {} expects {}",
                entry.embedding.len(),
                self.name,
                self.dimension
            )));
        }

        let schema = Self::schema(self.dimension);
        let batch = Self::entries_to_batch(std::slice::from_ref(entry), schema.clone(), self.dimension)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to insert entry: {e}")))?;

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
