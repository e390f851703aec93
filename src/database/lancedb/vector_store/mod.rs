
use super::{ChunkMetadata, ChunkRecord, SearchResult};
use crate::config::StoreSettings;
use crate::database::ChunkStore;
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::index::Index;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Rows needed before an IVF-PQ index can be trained
pub const INDEX_MIN_ROWS: u64 = 256;

/// Vector store backed by a LanceDB table
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    /// Serializes table creation and upserts from this handle
    write_lock: Mutex<()>,
}

#[inline]
fn store_error(context: &str, error: impl std::fmt::Display) -> RagError {
    RagError::StoreUnavailable(format!("{}: {}", context, error))
}

impl VectorStore {
    /// Connect to the database at `settings.uri`. The table is created lazily
    /// on the first upsert, using the dimension of the incoming vectors.
    #[inline]
    pub async fn open(settings: &StoreSettings) -> Result<Self> {
        debug!("Connecting to LanceDB at {}", settings.uri);

        // local paths have no scheme; make sure the directory exists
        if !settings.uri.contains("://") {
            std::fs::create_dir_all(&settings.uri).map_err(|e| {
                store_error("Failed to create vector database directory", e)
            })?;
        }

        let connection = lancedb::connect(&settings.uri)
            .execute()
            .await
            .map_err(|e| store_error("Failed to connect to LanceDB", e))?;

        info!(
            "Vector store opened (table: {})",
            settings.table_name
        );
        Ok(Self {
            connection,
            table_name: settings.table_name.clone(),
            write_lock: Mutex::new(()),
        })
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Release the connection
    #[inline]
    pub fn close(self) {
        debug!("Closing vector store (table: {})", self.table_name);
        drop(self.connection);
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| store_error("Failed to list tables", e))?;
        Ok(names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map(Some)
            .map_err(|e| store_error("Failed to open table", e))
    }

    /// Vector dimension of the existing table, if there is one
    #[inline]
    pub async fn vector_dimension(&self) -> Result<Option<usize>> {
        let Some(table) = self.open_table().await? else {
            return Ok(None);
        };

        let schema = table
            .schema()
            .await
            .map_err(|e| store_error("Failed to get table schema", e))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(Some(*size as usize));
                }
            }
        }

        Err(RagError::StoreUnavailable(format!(
            "Table {} has no fixed-size vector column",
            self.table_name
        )))
    }

    /// Open the table, creating it for `vector_dim` when missing. An existing
    /// table with another dimension is an error; it is never dropped.
    async fn table_for_dimension(&self, vector_dim: usize) -> Result<Table> {
        if self.vector_dimension().await?.is_none() {
            self.create_table(vector_dim).await?;
        }

        match self.vector_dimension().await? {
            Some(existing) if existing != vector_dim => Err(RagError::StoreUnavailable(format!(
                "Table {} stores {}-dimensional vectors but the batch has {}",
                self.table_name, existing, vector_dim
            ))),
            _ => self.open_table().await?.ok_or_else(|| {
                RagError::StoreUnavailable(format!("Table {} disappeared", self.table_name))
            }),
        }
    }

    /// Create the table, accepting one that another writer created first
    async fn create_table(&self, vector_dim: usize) -> Result<()> {
        info!(
            "Creating table {} with {} dimensions",
            self.table_name, vector_dim
        );

        let created = self
            .connection
            .create_empty_table(&self.table_name, create_schema(vector_dim))
            .execute()
            .await;

        match created {
            Ok(_) => Ok(()),
            Err(lancedb::Error::TableAlreadyExists { .. }) => {
                debug!("Table {} was created concurrently", self.table_name);
                Ok(())
            }
            Err(e) => {
                if self.table_exists().await? {
                    warn!(
                        "Creating {} failed but the table now exists, reusing it: {}",
                        self.table_name, e
                    );
                    Ok(())
                } else {
                    Err(store_error("Failed to create table", e))
                }
            }
        }
    }

    /// Build or replace the cosine IVF-PQ index once enough rows exist.
    /// Returns whether an index was built.
    #[inline]
    pub async fn create_vector_index(&self) -> Result<bool> {
        let count = self.count_rows().await?;
        if count < INDEX_MIN_ROWS {
            debug!(
                "Skipping vector index: {} rows, need {}",
                count, INDEX_MIN_ROWS
            );
            return Ok(false);
        }

        let Some(table) = self.open_table().await? else {
            return Ok(false);
        };

        let index = IvfPqIndexBuilder::default().distance_type(DistanceType::Cosine);
        table
            .create_index(&["vector"], Index::IvfPq(index))
            .replace(true)
            .execute()
            .await
            .map_err(|e| store_error("Failed to create vector index", e))?;

        info!("Vector index built over {} rows", count);
        Ok(true)
    }

    async fn count_rows(&self) -> Result<u64> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| store_error("Failed to count rows", e))?;
        Ok(count as u64)
    }

    async fn upsert_records(&self, records: &[ChunkRecord]) -> Result<usize> {
        let Some(first) = records.first() else {
            debug!("No records to upsert");
            return Ok(0);
        };

        let vector_dim = first.vector.len();
        if vector_dim == 0 {
            return Err(RagError::StoreUnavailable(
                "Refusing to store empty vectors".to_string(),
            ));
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RagError::StoreUnavailable(format!(
                "Record {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        let _guard = self.write_lock.lock().await;
        let table = self.table_for_dimension(vector_dim).await?;
        let batch = create_record_batch(records, vector_dim)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| store_error("Failed to upsert chunks", e))?;

        debug!("Upserted {} chunks into {}", records.len(), self.table_name);
        Ok(records.len())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let Some(table) = self.open_table().await? else {
            warn!(
                "Table {} does not exist yet, nothing to search",
                self.table_name
            );
            return Ok(Vec::new());
        };

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut stream = table
            .vector_search(query)
            .map_err(|e| store_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| store_error("Failed to execute search", e))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| store_error("Failed to read result stream", e))?
        {
            results.extend(parse_search_batch(&batch)?);
        }

        // the store ranks results, keep its order but never exceed k
        results.truncate(k);
        debug!("Search returned {} results", results.len());
        Ok(results)
    }
}

#[async_trait]
impl ChunkStore for VectorStore {
    #[inline]
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<usize> {
        self.upsert_records(&records).await
    }

    #[inline]
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.search(query, k).await
    }

    #[inline]
    async fn count(&self) -> Result<u64> {
        self.count_rows().await
    }

    #[inline]
    async fn build_index(&self) -> Result<bool> {
        self.create_vector_index().await
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(records: &[ChunkRecord], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut texts = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut pages = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);

    for record in records {
        ids.push(record.id.as_str());
        flat_values.extend_from_slice(&record.vector);
        texts.push(record.metadata.text.as_str());
        sources.push(record.metadata.source.as_str());
        pages.push(record.metadata.page);
        chunk_indices.push(record.metadata.chunk_index);
        created_ats.push(record.metadata.created_at.as_str());
    }

    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array = FixedSizeListArray::try_new(
        field,
        vector_dim as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| store_error("Failed to create vector array", e))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(pages)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| store_error("Failed to create record batch", e))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StoreUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::StoreUnavailable(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let texts = column::<StringArray>(batch, "text")?;
    let sources = column::<StringArray>(batch, "source")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
    let created_ats = column::<StringArray>(batch, "created_at")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let results = (0..batch.num_rows())
        .map(|row| SearchResult {
            metadata: ChunkMetadata {
                text: texts.value(row).to_string(),
                source: sources.value(row).to_string(),
                page: pages.value(row),
                chunk_index: chunk_indices.value(row),
                created_at: created_ats.value(row).to_string(),
            },
            distance: distances
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
        })
        .collect();

    Ok(results)
}
