use super::*;
use crate::config::OllamaConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, dimension: u32, batch_size: u32) -> OllamaConfig {
    let url = Url::parse(&server.uri()).expect("mock server uri");
    OllamaConfig {
        protocol: url.scheme().to_string(),
        host: url.host_str().unwrap_or("127.0.0.1").to_string(),
        port: url.port().unwrap_or(80),
        model: "all-minilm:l6-v2".to_string(),
        batch_size,
        embedding_dimension: dimension,
    }
}

fn fast_client(config: &OllamaConfig) -> OllamaClient {
    OllamaClient::new(config)
        .expect("client builds")
        .with_backoff_unit(Duration::from_millis(1))
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 8,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.embedding_dimension, 8);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, 1);
    assert_eq!(Embedder::model(&client), "test-model");
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);
    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn empty_batch_makes_no_request() {
    // nothing listens on this port, any request would fail
    let config = OllamaConfig {
        port: 9,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config)
        .expect("client builds")
        .with_retry_attempts(1);

    let vectors = client.generate_embeddings_batch(&[]).expect("no request needed");
    assert!(vectors.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn embeds_texts_in_batches() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "all-minilm:l6-v2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "all-minilm:l6-v2",
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = fast_client(&config_for(&server, 3, 2));
    let texts: Vec<String> = ["alpha", "beta", "gamma", "delta"]
        .iter()
        .map(ToString::to_string)
        .collect();

    let vectors = tokio::task::spawn_blocking(move || client.embed_documents(&texts))
        .await
        .expect("join")
        .expect("embeddings");

    assert_eq!(vectors.len(), 4);
    assert_eq!(vectors[2], vec![0.1, 0.2, 0.3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_query_returns_single_vector() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["who wrote Don Quixote?"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = fast_client(&config_for(&server, 2, 16));
    let vector = tokio::task::spawn_blocking(move || client.embed_query("who wrote Don Quixote?"))
        .await
        .expect("join")
        .expect("query vector");

    assert_eq!(vector, vec![1.0, 0.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn dimension_mismatch_is_an_embedding_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let client = fast_client(&config_for(&server, 384, 16));
    let result = tokio::task::spawn_blocking(move || client.embed_query("text"))
        .await
        .expect("join");

    match result {
        Err(RagError::EmbeddingFailure(message)) => {
            assert!(message.contains("returned 2 dimensions, expected 384"));
        }
        other => panic!("expected embedding failure, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn single_server_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2, 0.3]]
        })))
        .expect(0)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 3, 16)).expect("client builds");
    let texts = vec!["x".to_string()];
    let result = tokio::task::spawn_blocking(move || client.embed_documents(&texts))
        .await
        .expect("join");

    match result {
        Err(RagError::EmbeddingFailure(message)) => assert!(message.contains("HTTP 503")),
        other => panic!("expected embedding failure, got {other:?}"),
    }
}

#[test]
fn backoff_saturates_for_large_attempt_counts() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("client builds")
        .with_backoff_unit(Duration::from_millis(10));

    assert_eq!(client.backoff_delay(1), Duration::from_millis(10));
    assert_eq!(client.backoff_delay(3), Duration::from_millis(40));
    assert_eq!(
        client.backoff_delay(40),
        Duration::from_millis(10).saturating_mul(u32::MAX)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn opted_in_retries_repeat_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = fast_client(&config_for(&server, 3, 16)).with_retry_attempts(3);
    let result = tokio::task::spawn_blocking(move || client.embed_query("text"))
        .await
        .expect("join");

    assert!(matches!(result, Err(RagError::EmbeddingFailure(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&config_for(&server, 3, 16));
    let result = tokio::task::spawn_blocking(move || client.embed_query("text"))
        .await
        .expect("join");

    match result {
        Err(RagError::EmbeddingFailure(message)) => assert!(message.contains("HTTP 404")),
        other => panic!("expected embedding failure, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_model_checks_tags() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "all-minilm:l6-v2", "size": 45_960_996_u64, "digest": "1b226e2802db"},
                {"name": "llama3:8b"}
            ]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server, 384, 16);
    let client = fast_client(&config);
    let other = fast_client(&OllamaConfig {
        model: "nomic-embed-text".to_string(),
        ..config
    });

    let (present, missing) = tokio::task::spawn_blocking(move || {
        (client.health_check(), other.validate_model())
    })
    .await
    .expect("join");

    assert!(present.is_ok());
    let message = missing.expect_err("model is not listed").to_string();
    assert!(message.contains("nomic-embed-text"));
}
