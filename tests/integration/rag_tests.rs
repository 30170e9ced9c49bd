//! Retrieval and generation tests against mocked HTTP providers

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use telerag::config::{EmbeddingConfig, EmbeddingProvider, LlmConfig, RagConfig};
use telerag::models::{RagRequest, ScrapedMessage};
use telerag::services::embedding::{Embedder, HashingEmbedder, OpenAiEmbedder};
use telerag::services::llm::{ChatModel, LlmClient};
use telerag::services::rag::{RagClient, GENERATION_FAILED_ANSWER};
use telerag::services::vector_store::LocalVectorStore;

use crate::common::ids;

fn llm_config(server: &MockServer) -> LlmConfig {
    LlmConfig {
        base_url: server.uri(),
        api_key: "sk-test".to_string(),
        model: "test-model".to_string(),
        ..LlmConfig::default()
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "cmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    }))
}

fn rag_client(llm: LlmClient) -> RagClient {
    RagClient::new(
        Arc::new(LocalVectorStore::in_memory()),
        Arc::new(HashingEmbedder::new(128)),
        Arc::new(llm),
        RagConfig::default(),
    )
}

fn post(channel_id: i64, channel_name: &str, text: &str) -> ScrapedMessage {
    ScrapedMessage {
        channel_id,
        channel_name: channel_name.to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn test_llm_client_sends_system_and_user_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ]
        })))
        .respond_with(completion("Hi there"))
        .expect(1)
        .mount(&server)
        .await;

    let client = LlmClient::new(&llm_config(&server)).unwrap();
    let answer = client.complete("be brief", "hello").await.unwrap();
    assert_eq!(answer, "Hi there");
}

#[tokio::test]
async fn test_llm_client_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let client = LlmClient::new(&llm_config(&server)).unwrap();
    let err = client.complete("s", "u").await.unwrap_err();
    assert!(format!("{:#}", err).contains("429"));
}

#[tokio::test]
async fn test_llm_client_empty_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("   "))
        .mount(&server)
        .await;

    let client = LlmClient::new(&llm_config(&server)).unwrap();
    assert!(client.complete("s", "u").await.is_err());
}

#[tokio::test]
async fn test_answer_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("Ставка выросла до 12%."))
        .expect(1)
        .mount(&server)
        .await;

    let rag = rag_client(LlmClient::new(&llm_config(&server)).unwrap());
    rag.ingest(&post(
        ids::NEWS_CHANNEL,
        "World News",
        "The central bank raised the key rate to 12 percent. Analysts expected it.",
    ))
    .await
    .unwrap();

    let request = RagRequest::new(ids::ALICE, "What is the key rate?", vec![ids::NEWS_CHANNEL]);
    let response = rag.answer(&request).await;

    assert_eq!(response.request_id, request.id);
    assert_eq!(response.user_id, ids::ALICE);
    assert_eq!(response.text, "Ставка выросла до 12%.");

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("World News: "));
    assert!(prompt.contains("key rate to 12 percent"));
}

#[tokio::test]
async fn test_answer_when_provider_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let rag = rag_client(LlmClient::new(&llm_config(&server)).unwrap());
    rag.ingest(&post(ids::NEWS_CHANNEL, "World News", "Some fact."))
        .await
        .unwrap();

    let response = rag
        .answer(&RagRequest::new(ids::ALICE, "fact?", vec![ids::NEWS_CHANNEL]))
        .await;
    assert_eq!(response.text, GENERATION_FAILED_ANSWER);
}

#[tokio::test]
async fn test_retrieve_scopes_to_requested_channels() {
    let server = MockServer::start().await;
    let rag = rag_client(LlmClient::new(&llm_config(&server)).unwrap());

    rag.ingest(&post(ids::NEWS_CHANNEL, "World News", "Elections are held in spring."))
        .await
        .unwrap();
    rag.ingest(&post(ids::TECH_CHANNEL, "Tech Daily", "A new phone was released."))
        .await
        .unwrap();

    let contexts = rag
        .retrieve("phone release", &[ids::TECH_CHANNEL])
        .await
        .unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].channel_name, "Tech Daily");
    assert_eq!(contexts[0].documents, vec!["A new phone was released.".to_string()]);

    // Channels without a collection are skipped
    let contexts = rag.retrieve("anything", &[-1, ids::NEWS_CHANNEL]).await.unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].channel_name, "World News");
}

#[tokio::test]
async fn test_openai_embedder_orders_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer emb-key"))
        .and(body_partial_json(json!({"model": "embed-small", "input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        })))
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(&EmbeddingConfig {
        provider: EmbeddingProvider::Openai,
        model: "embed-small".to_string(),
        base_url: server.uri(),
        api_key: Some("emb-key".to_string()),
        ..EmbeddingConfig::default()
    })
    .unwrap();

    let vectors = embedder
        .embed(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn test_openai_embedder_count_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        })))
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(&EmbeddingConfig {
        provider: EmbeddingProvider::Openai,
        base_url: server.uri(),
        api_key: Some("emb-key".to_string()),
        ..EmbeddingConfig::default()
    })
    .unwrap();

    assert!(embedder
        .embed(&["a".to_string(), "b".to_string()])
        .await
        .is_err());
}
