#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Integration tests for the LanceDB chunk store with realistic data volumes
use curriculum_mcp::config::StoreSettings;
use curriculum_mcp::database::lancedb::{ChunkMetadata, ChunkRecord, INDEX_MIN_ROWS, chunk_id};
use curriculum_mcp::database::{ChunkStore, VectorStore};
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 32;

fn settings_in(temp_dir: &TempDir) -> StoreSettings {
    StoreSettings {
        uri: temp_dir.path().join("vectors").to_string_lossy().into_owned(),
        table_name: "curriculum_vectors".to_string(),
    }
}

async fn create_test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&settings_in(&temp_dir))
        .await
        .expect("should open vector store");
    (store, temp_dir)
}

/// Smoothly varying vector; nearby seeds give nearby directions
fn seeded_vector(seed: f32) -> Vec<f32> {
    (0..DIMENSION)
        .map(|i| (seed * 0.37 + i as f32 * 0.11).sin() + 0.01 * i as f32)
        .collect()
}

fn create_record(source: &str, page: u32, text: &str, seed: f32) -> ChunkRecord {
    ChunkRecord {
        id: chunk_id(source, page, 0),
        vector: seeded_vector(seed),
        metadata: ChunkMetadata {
            text: text.to_string(),
            source: source.to_string(),
            page,
            chunk_index: 0,
            created_at: "2024-09-01T08:00:00+00:00".to_string(),
        },
    }
}

fn create_curriculum_dataset(pages: u32) -> Vec<ChunkRecord> {
    (0..pages)
        .map(|page| {
            let source = if page % 2 == 0 {
                "curricula/history_bachillerato.pdf"
            } else {
                "curricula/literature_eso.pdf"
            };
            create_record(
                source,
                page,
                &format!(
                    "Learning standard {}: students analyse the sources of unit {}.",
                    page,
                    page % 12
                ),
                page as f32,
            )
        })
        .collect()
}

#[tokio::test]
async fn large_batch_processing() {
    let (store, _temp_dir) = create_test_store().await;
    let dataset = create_curriculum_dataset(120);

    let start_time = std::time::Instant::now();
    let written = store
        .upsert(dataset.clone())
        .await
        .expect("should store batch");
    let storage_duration = start_time.elapsed();

    assert_eq!(written, dataset.len());
    assert!(
        storage_duration.as_secs() < 30,
        "Storage should complete within 30 seconds"
    );
    assert_eq!(
        store.count().await.expect("count"),
        dataset.len() as u64
    );

    let results = store
        .similarity_search(&dataset[7].vector, 20)
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 20, "Should respect search limit");
    assert_eq!(results[0].metadata, dataset[7].metadata);
    assert!(
        results.windows(2).all(|w| w[0].distance <= w[1].distance),
        "results come back in ascending distance"
    );
}

#[tokio::test]
async fn metadata_round_trips_through_the_table() {
    let (store, _temp_dir) = create_test_store().await;
    let record = create_record(
        "curricula/historia de España.pdf",
        41,
        "Los Reyes Católicos: unión dinástica y expansión atlántica.",
        3.5,
    );

    store
        .upsert(vec![record.clone()])
        .await
        .expect("should store record");

    let results = store
        .similarity_search(&record.vector, 1)
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata, record.metadata);
    assert!(results[0].distance.abs() < 1e-4);
}

#[tokio::test]
async fn vector_index_creation() {
    let (store, _temp_dir) = create_test_store().await;

    // PQ training needs at least INDEX_MIN_ROWS rows
    let dataset = create_curriculum_dataset(300);
    assert!(dataset.len() as u64 >= INDEX_MIN_ROWS);
    store
        .upsert(dataset.clone())
        .await
        .expect("should store records");

    let query_vector = &dataset[0].vector;
    let start = std::time::Instant::now();
    let before = store
        .similarity_search(query_vector, 10)
        .await
        .expect("search should succeed");
    let time_before_index = start.elapsed();

    let built = store.build_index().await;
    assert!(
        matches!(built, Ok(true)),
        "Failed to create vector index: {:?}",
        built
    );

    let start = std::time::Instant::now();
    let after = store
        .similarity_search(query_vector, 10)
        .await
        .expect("search should succeed");
    let time_after_index = start.elapsed();

    assert_eq!(before.len(), 10);
    assert!(!after.is_empty(), "Search should still work after indexing");
    assert!(after.len() <= 10, "Should respect limit after indexing");

    // rebuilding replaces the index
    assert!(matches!(store.build_index().await, Ok(true)));

    eprintln!("Search time before index: {:?}", time_before_index);
    eprintln!("Search time after index: {:?}", time_after_index);
}

#[tokio::test]
async fn data_survives_reconnect() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dataset = create_curriculum_dataset(10);

    {
        let store = VectorStore::open(&settings_in(&temp_dir))
            .await
            .expect("should open vector store");
        store
            .upsert(dataset.clone())
            .await
            .expect("should store records");
        store.close();
    }

    let reopened = VectorStore::open(&settings_in(&temp_dir))
        .await
        .expect("should reopen vector store");

    assert_eq!(reopened.count().await.expect("count"), 10);
    assert_eq!(
        reopened.vector_dimension().await.expect("dimension"),
        Some(DIMENSION)
    );

    let results = reopened
        .similarity_search(&dataset[4].vector, 1)
        .await
        .expect("search should succeed");
    assert_eq!(results[0].metadata.text, dataset[4].metadata.text);
}

#[tokio::test]
async fn separate_tables_are_isolated() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let history = VectorStore::open(&settings_in(&temp_dir))
        .await
        .expect("should open vector store");
    let literature = VectorStore::open(&StoreSettings {
        table_name: "literature_vectors".to_string(),
        ..settings_in(&temp_dir)
    })
    .await
    .expect("should open second table");

    history
        .upsert(create_curriculum_dataset(6))
        .await
        .expect("should store records");

    assert_eq!(history.count().await.expect("count"), 6);
    assert_eq!(literature.count().await.expect("count"), 0);
    assert!(
        literature
            .similarity_search(&seeded_vector(1.0), 3)
            .await
            .expect("search")
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_searches_and_writes() {
    let (store, _temp_dir) = create_test_store().await;
    let store = Arc::new(store);
    let dataset = create_curriculum_dataset(40);
    store
        .upsert(dataset.clone())
        .await
        .expect("should store records");

    let additions: Vec<ChunkRecord> = (0..5)
        .map(|page| {
            create_record(
                "curricula/geography_eso.pdf",
                page,
                "Physical geography of the Iberian Peninsula.",
                500.0 + page as f32 * 40.0,
            )
        })
        .collect();

    let mut searches = Vec::new();
    let mut writes = Vec::new();
    for (i, addition) in additions.iter().enumerate() {
        let reader = Arc::clone(&store);
        let query = dataset[i * 3].vector.clone();
        searches.push(tokio::spawn(async move {
            reader.similarity_search(&query, 3).await
        }));

        let writer = Arc::clone(&store);
        let record = addition.clone();
        writes.push(tokio::spawn(async move { writer.upsert(vec![record]).await }));
    }

    for handle in searches {
        let results = handle
            .await
            .expect("task completes")
            .expect("search should succeed");
        assert_eq!(results.len(), 3);
    }
    for handle in writes {
        let written = handle
            .await
            .expect("task completes")
            .expect("write should succeed");
        assert_eq!(written, 1);
    }

    assert_eq!(
        store.count().await.expect("count"),
        (dataset.len() + additions.len()) as u64
    );
    let results = store
        .similarity_search(&additions[0].vector, 1)
        .await
        .expect("search should succeed");
    assert_eq!(results[0].metadata.source, "curricula/geography_eso.pdf");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_upserts_share_one_table() {
    let (store, _temp_dir) = create_test_store().await;
    let store = Arc::new(store);
    let dataset = create_curriculum_dataset(8);

    let handles: Vec<_> = dataset
        .chunks(2)
        .map(|pair| {
            let store = Arc::clone(&store);
            let records = pair.to_vec();
            tokio::spawn(async move { store.upsert(records).await })
        })
        .collect();

    for handle in handles {
        let written = handle
            .await
            .expect("task completes")
            .expect("first upserts must not race on table creation");
        assert_eq!(written, 2);
    }

    assert_eq!(store.count().await.expect("count"), 8);
    assert_eq!(
        store.vector_dimension().await.expect("schema"),
        Some(DIMENSION)
    );
}
