//! Channel preview feed tests against a mocked preview site

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use telerag::config::ScraperConfig;
use telerag::models::ScrapedMessage;
use telerag::services::channel_feed::{ChannelFeed, FeedError, WebPreviewFeed};
use telerag::services::scraper::start_scraper;

fn post(id: i64, text: Option<&str>) -> String {
    let body = match text {
        Some(text) => format!(
            r#"<div class="tgme_widget_message_text js-message_text" dir="auto">{}</div>"#,
            text
        ),
        None => r#"<a class="tgme_widget_message_photo_wrap"></a>"#.to_string(),
    };
    format!(
        r#"<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message text_not_supported_wrap js-widget_message" data-post="worldnews/{}" data-view="abc"><div class="tgme_widget_message_bubble">{}<div class="tgme_widget_message_footer compact js-message_footer"></div></div></div></div>"#,
        id, body
    )
}

fn page(posts: &[String]) -> String {
    format!(
        r#"<!DOCTYPE html><html><body><div class="tgme_channel_info"><div class="tgme_channel_info_header_title"><span dir="auto">World News</span></div></div><section class="tgme_channel_history js-message_history">{}</section></body></html>"#,
        posts.join("\n")
    )
}

fn config(server: &MockServer) -> ScraperConfig {
    ScraperConfig {
        feed_url: server.uri(),
        history_limit: 3,
        poll_interval_secs: 3600,
        ..ScraperConfig::default()
    }
}

async fn mount_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/s/worldnews"))
        .and(query_param_is_missing("before"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&[
            post(3, Some("Third &amp; latest")),
            post(4, None),
            post(5, Some("Fifth<br>post")),
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/s/worldnews"))
        .and(query_param("before", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&[
            post(1, Some("First")),
            post(2, Some("Second")),
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_latest_page() {
    let server = MockServer::start().await;
    mount_pages(&server).await;

    let feed = WebPreviewFeed::new(&config(&server)).unwrap();
    let page = feed.latest("worldnews").await.unwrap();

    let texts: Vec<&str> = page.posts.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, vec!["Third & latest", "Fifth\npost"]);
    assert_eq!(page.oldest_id, Some(3));
    assert_eq!(page.newest_id, Some(5));
}

#[tokio::test]
async fn test_before_page() {
    let server = MockServer::start().await;
    mount_pages(&server).await;

    let feed = WebPreviewFeed::new(&config(&server)).unwrap();
    let page = feed.before("worldnews", 3).await.unwrap();

    let ids: Vec<i64> = page.posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_channel_without_preview() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/private_chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><div class=\"tgme_page\">Contact</div></body></html>"),
        )
        .mount(&server)
        .await;

    let feed = WebPreviewFeed::new(&config(&server)).unwrap();
    let err = feed.latest("private_chat").await.unwrap_err();
    assert!(matches!(err, FeedError::NotReadable(name) if name == "private_chat"));
}

#[tokio::test]
async fn test_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let feed = WebPreviewFeed::new(&config(&server)).unwrap();
    assert!(matches!(
        feed.latest("worldnews").await,
        Err(FeedError::Http(_))
    ));
}

#[tokio::test]
async fn test_scraper_reads_history_from_preview() {
    let server = MockServer::start().await;
    mount_pages(&server).await;

    let feed = Arc::new(WebPreviewFeed::new(&config(&server)).unwrap());
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let (scraper, task) = start_scraper(feed, config(&server), tx, cancel.clone());

    scraper
        .subscribe(-100, "World News", Some("worldnews".to_string()))
        .await
        .unwrap();

    let mut received: Vec<ScrapedMessage> = Vec::new();
    while let Ok(Some(message)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        received.push(message);
    }

    // history_limit keeps the three newest text posts, oldest first
    let texts: Vec<&str> = received.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["Second", "Third & latest", "Fifth\npost"]);
    assert!(received
        .iter()
        .all(|m| m.channel_id == -100 && m.channel_name == "World News"));

    cancel.cancel();
    task.await.unwrap();
}
