//! API integration tests
//!
//! Tests the API endpoints with real HTTP requests against a test server.

use telerag::db::{ChannelRepository, UserRepository};
use telerag::models::NewChannel;
use telerag::services::vector_store::VectorRecord;

use crate::common::{ids, TestApp};

async fn seed(app: &TestApp) {
    let users = UserRepository::new(&app.state.db);
    let channels = ChannelRepository::new(&app.state.db);

    channels
        .create_channel(&NewChannel::new(ids::NEWS_CHANNEL, "World News", Some("worldnews".into())))
        .await
        .unwrap();
    channels
        .create_channel(&NewChannel::new(ids::TECH_CHANNEL, "Tech Daily", Some("techdaily".into())))
        .await
        .unwrap();
    users.create_user(ids::ALICE, "Alice").await.unwrap();
    users
        .update_user_channels(ids::ALICE, &[ids::TECH_CHANNEL, ids::NEWS_CHANNEL], &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health").await;

    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_detailed_health_endpoint() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health/detailed").await;

    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["components"]["database"]["status"], "healthy");
    assert_eq!(json["components"]["vector_store"]["status"], "healthy");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new().await;
    app.get("/api/v1/health/live").await.assert_ok();
}

#[tokio::test]
async fn test_readiness_probe() {
    let app = TestApp::new().await;
    app.get("/api/v1/health/ready").await.assert_ok();
}

#[tokio::test]
async fn test_channels_empty() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/channels").await;

    response.assert_ok();
    let json: Vec<serde_json::Value> = response.json();
    assert!(json.is_empty());
}

#[tokio::test]
async fn test_channels_list_subscriber_counts() {
    let app = TestApp::new().await;
    seed(&app).await;

    let response = app.get("/api/v1/channels").await;
    response.assert_ok();

    let json: Vec<serde_json::Value> = response.json();
    assert_eq!(json.len(), 2);
    // Ordered by name
    assert_eq!(json[0]["name"], "Tech Daily");
    assert_eq!(json[0]["username"], "techdaily");
    assert_eq!(json[0]["subscribers"], 1);
    assert_eq!(json[1]["name"], "World News");
}

#[tokio::test]
async fn test_user_channels() {
    let app = TestApp::new().await;
    seed(&app).await;

    let response = app.get(&format!("/api/v1/users/{}/channels", ids::ALICE)).await;
    response.assert_ok();

    let json: Vec<serde_json::Value> = response.json();
    let names: Vec<&str> = json.iter().filter_map(|c| c["name"].as_str()).collect();
    assert_eq!(names, vec!["Tech Daily", "World News"]);
    assert_eq!(json[0]["id"], ids::TECH_CHANNEL);
}

#[tokio::test]
async fn test_unknown_user_channels_not_found() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/users/424242/channels").await;

    response.assert_not_found();
}

#[tokio::test]
async fn test_stats() {
    let app = TestApp::new().await;
    seed(&app).await;

    app.state
        .vector_store
        .add(
            &ids::NEWS_CHANNEL.to_string(),
            vec![VectorRecord {
                id: "c1".into(),
                document: "doc".into(),
                embedding: vec![1.0, 0.0],
                channel_name: "World News".into(),
            }],
        )
        .await
        .unwrap();

    let response = app.get("/api/v1/stats").await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["users"], 1);
    assert_eq!(json["channels"], 2);
    assert_eq!(json["collections"], 1);
    assert_eq!(json["vector_backend"], "local");
}

#[tokio::test]
async fn test_unknown_route_not_found() {
    let app = TestApp::new().await;
    app.get("/api/v1/nodes").await.assert_not_found();
}
