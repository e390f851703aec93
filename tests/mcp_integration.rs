#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! MCP Server Integration Tests
//!
//! Full sessions against a real LanceDB store and SQLite history, with a
//! deterministic embedder standing in for Ollama.

use curriculum_mcp::config::StoreSettings;
use curriculum_mcp::database::{ChunkRecord, ChunkStore, VectorStore, WorksheetHistory};
use curriculum_mcp::embeddings::{ContentChunk, Embedder};
use curriculum_mcp::mcp::protocol::{CallToolParams, MCP_VERSION, ToolContent};
use curriculum_mcp::mcp::tools::SaveWorksheetHandler;
use curriculum_mcp::mcp::{ConnectionState, McpServer, ToolHandler, register_curriculum_tools};
use curriculum_mcp::retrieval::RetrievalTool;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Maps known phrases onto fixed axes, anything else onto the last axis
struct AxisEmbedder;

const AXES: &[&str] = &["Cid", "Celestina", "Quixote"];

impl Embedder for AxisEmbedder {
    fn model(&self) -> &str {
        "axis"
    }

    fn embed_documents(&self, texts: &[String]) -> curriculum_mcp::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.05_f32; AXES.len() + 1];
                let axis = AXES
                    .iter()
                    .position(|word| text.contains(word))
                    .unwrap_or(AXES.len());
                vector[axis] = 1.0;
                vector
            })
            .collect())
    }
}

struct TestEnvironment {
    temp_dir: TempDir,
    store: Arc<VectorStore>,
    history: Arc<WorksheetHistory>,
    server: Arc<McpServer>,
}

async fn setup_test_environment() -> TestEnvironment {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let store = Arc::new(
        VectorStore::open(&StoreSettings {
            uri: temp_dir.path().join("vectors").to_string_lossy().into_owned(),
            table_name: "curriculum_vectors".to_string(),
        })
        .await
        .expect("Failed to open vector store"),
    );
    let history = Arc::new(
        WorksheetHistory::open(temp_dir.path().join("history.db"))
            .await
            .expect("Failed to open history"),
    );

    let retrieval = Arc::new(RetrievalTool::new(
        Arc::new(AxisEmbedder),
        Some(Arc::clone(&store) as Arc<dyn ChunkStore>),
        3,
    ));
    let server = McpServer::new("curriculum-mcp".to_string(), "1.0.0".to_string());
    register_curriculum_tools(&server, retrieval, Arc::clone(&history)).await;

    TestEnvironment {
        temp_dir,
        store,
        history,
        server: Arc::new(server),
    }
}

async fn seed_store(store: &VectorStore, texts: &[&str]) {
    let strings: Vec<String> = texts.iter().map(ToString::to_string).collect();
    let vectors = AxisEmbedder.embed_documents(&strings).expect("embed");
    let records = strings
        .iter()
        .zip(vectors)
        .zip(0_u32..)
        .map(|((text, vector), page)| {
            let chunk = ContentChunk {
                content: text.clone(),
                source: "curricula/literature.pdf".to_string(),
                page,
                chunk_index: 0,
                char_count: text.chars().count(),
            };
            ChunkRecord::from_chunk(&chunk, vector)
        })
        .collect();
    store.upsert(records).await.expect("seed store");
}

fn session(lines: &[Value]) -> String {
    lines
        .iter()
        .map(|line| format!("{}\n", line))
        .collect::<String>()
}

async fn run_session(server: &Arc<McpServer>, lines: &[Value]) -> Vec<Value> {
    let input = session(lines);
    let mut output = Vec::new();
    Arc::clone(server)
        .serve(tokio::io::BufReader::new(input.as_bytes()), &mut output)
        .await
        .expect("serve succeeds");

    String::from_utf8(output)
        .expect("utf8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("one JSON message per line"))
        .collect()
}

fn initialize_lines() -> Vec<Value> {
    vec![
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "orchestrator", "version": "0.1"}
            }
        }),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    ]
}

fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

fn text_of(reply: &Value) -> &str {
    reply["result"]["content"][0]["text"]
        .as_str()
        .expect("text content")
}

/// A full orchestrator session: search, save the worksheet, list it back
#[tokio::test]
async fn search_save_and_list_session() {
    let env = setup_test_environment().await;
    seed_store(
        &env.store,
        &[
            "The Cantar de mio Cid is the oldest preserved Castilian epic poem.",
            "La Celestina is a work attributed to Fernando de Rojas.",
            "Don Quixote was published in two parts, in 1605 and 1615.",
            "The Generation of '98 reflected on the national crisis.",
        ],
    )
    .await;

    let mut lines = initialize_lines();
    lines.push(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}));
    lines.push(tool_call(3, "curriculum_search", json!({"query": "Who wrote La Celestina?"})));
    lines.push(tool_call(
        4,
        "save_worksheet",
        json!({
            "topic": "La Celestina",
            "subject": "Literature",
            "student_profile": "Year 10, reading support",
            "content": "1. Who wrote La Celestina?"
        }),
    ));
    lines.push(tool_call(5, "list_worksheets", json!({})));

    let replies = run_session(&env.server, &lines).await;
    assert_eq!(replies.len(), 5, "notifications get no reply");

    assert_eq!(replies[0]["result"]["protocolVersion"], MCP_VERSION);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "curriculum-mcp");

    let tool_names: Vec<&str> = replies[1]["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(
        tool_names,
        vec!["curriculum_search", "list_worksheets", "save_worksheet"]
    );

    let search = text_of(&replies[2]);
    let chunks: Vec<&str> = search.split("\n\n").collect();
    assert_eq!(chunks.len(), 3);
    assert_eq!(
        chunks[0],
        "La Celestina is a work attributed to Fernando de Rojas."
    );
    assert_eq!(replies[2]["result"]["isError"], false);

    assert_eq!(replies[3]["result"]["isError"], false);
    let saved: Value = serde_json::from_str(text_of(&replies[3])).expect("save response json");
    assert_eq!(saved["status"], "saved");

    let listed: Value = serde_json::from_str(text_of(&replies[4])).expect("list json");
    let worksheets = listed["worksheets"].as_array().expect("worksheets array");
    assert_eq!(worksheets.len(), 1);
    assert_eq!(worksheets[0]["topic"], "La Celestina");
    assert_eq!(worksheets[0]["id"], saved["id"]);

    assert_eq!(env.server.connection_state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn search_on_empty_store_returns_fixed_message() {
    let env = setup_test_environment().await;

    let mut lines = initialize_lines();
    lines.push(tool_call(2, "curriculum_search", json!({"query": "Cid"})));

    let replies = run_session(&env.server, &lines).await;

    assert_eq!(
        text_of(&replies[1]),
        "No relevant information was found in the documents."
    );
    assert_eq!(replies[1]["result"]["isError"], false);
}

#[tokio::test]
async fn tools_require_initialization() {
    let env = setup_test_environment().await;

    let replies = run_session(
        &env.server,
        &[tool_call(1, "curriculum_search", json!({"query": "Cid"}))],
    )
    .await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["error"]["code"], -32002);
}

#[tokio::test]
async fn invalid_worksheet_echoes_content() {
    let env = setup_test_environment().await;

    let mut lines = initialize_lines();
    lines.push(tool_call(
        2,
        "save_worksheet",
        json!({
            "topic": "   ",
            "subject": "History",
            "student_profile": "Year 8",
            "content": "Timeline of the Reconquista"
        }),
    ));

    let replies = run_session(&env.server, &lines).await;

    assert_eq!(replies[1]["result"]["isError"], true);
    let message = text_of(&replies[1]);
    assert!(message.contains("topic"));
    assert!(message.contains("Timeline of the Reconquista"));
    assert!(env.history.list_recent(10).await.expect("list").is_empty());
}

/// Saves issued concurrently all land in the history
#[tokio::test]
async fn concurrent_worksheet_saves() {
    let env = setup_test_environment().await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let handler = SaveWorksheetHandler::new(Arc::clone(&env.history));
        handles.push(tokio::spawn(async move {
            let arguments = HashMap::from([
                ("topic".to_string(), json!(format!("Topic {}", i))),
                ("subject".to_string(), json!("History")),
                ("student_profile".to_string(), json!("Year 9")),
                ("content".to_string(), json!(format!("Worksheet body {}", i))),
            ]);
            handler
                .handle(CallToolParams {
                    name: "save_worksheet".to_string(),
                    arguments: Some(arguments),
                })
                .await
        }));
    }

    for handle in handles {
        let result = handle
            .await
            .expect("task completes")
            .expect("tool call succeeds");
        assert_eq!(result.is_error, Some(false));
        assert!(matches!(&result.content[0], ToolContent::Text { .. }));
    }

    assert_eq!(env.history.list_recent(10).await.expect("list").len(), 5);
}

#[tokio::test]
async fn history_survives_reopen() {
    let env = setup_test_environment().await;

    let mut lines = initialize_lines();
    lines.push(tool_call(
        2,
        "save_worksheet",
        json!({
            "topic": "Al-Andalus",
            "subject": "History",
            "student_profile": "Year 8",
            "content": "Map the taifa kingdoms."
        }),
    ));
    run_session(&env.server, &lines).await;
    env.history.close().await;

    let reopened = WorksheetHistory::open(env.temp_dir.path().join("history.db"))
        .await
        .expect("reopen history");
    let worksheets = reopened.list_recent(10).await.expect("list");

    assert_eq!(worksheets.len(), 1);
    assert_eq!(worksheets[0].topic, "Al-Andalus");
    assert_eq!(worksheets[0].content, "Map the taifa kingdoms.");
}
