//! Repository integration tests
//!
//! Exercises users, channels and subscriptions against a real SQLite file,
//! including the subscriber counter kept on each channel.

use telerag::db::{self, ChannelRepository, DbPool, RepositoryError, UserRepository};
use telerag::models::NewChannel;

use crate::common::{ids, test_config};

async fn pool() -> DbPool {
    db::init_pool(&test_config().database)
        .await
        .expect("Failed to initialize test database")
}

async fn create_channels(pool: &DbPool, channel_ids: &[i64]) {
    let channels = ChannelRepository::new(pool);
    for (n, id) in channel_ids.iter().enumerate() {
        channels
            .create_channel(&NewChannel::new(*id, format!("Channel {}", n), Some(format!("chan{}", n))))
            .await
            .unwrap();
    }
}

async fn subscribers(pool: &DbPool, channel_id: i64) -> i64 {
    ChannelRepository::new(pool)
        .get_channel(channel_id)
        .await
        .unwrap()
        .subscribers
}

/// Every channel's counter equals its number of subscription rows
async fn assert_counters_consistent(pool: &DbPool) {
    let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT c.id, c.subscribers, COUNT(uc.user_id)
        FROM channels c
        LEFT JOIN user_channels uc ON uc.channel_id = c.id
        GROUP BY c.id
        "#,
    )
    .fetch_all(pool)
    .await
    .unwrap();

    for (id, counter, actual) in rows {
        assert_eq!(counter, actual, "subscriber counter of channel {} drifted", id);
    }
}

#[tokio::test]
async fn test_create_and_get_user() {
    let pool = pool().await;
    let users = UserRepository::new(&pool);

    let user = users.create_user(ids::ALICE, "Alice").await.unwrap();
    assert_eq!(user.id, ids::ALICE);
    assert_eq!(user.name, "Alice");

    let fetched = users.get_user(ids::ALICE).await.unwrap();
    assert_eq!(fetched.name, "Alice");
    assert_eq!(users.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_user_is_rejected() {
    let pool = pool().await;
    let users = UserRepository::new(&pool);

    users.create_user(ids::ALICE, "Alice").await.unwrap();
    let err = users.create_user(ids::ALICE, "Alice again").await.unwrap_err();
    assert!(matches!(err, RepositoryError::UserExists(id) if id == ids::ALICE));
}

#[tokio::test]
async fn test_duplicate_channel_is_rejected() {
    let pool = pool().await;
    create_channels(&pool, &[ids::NEWS_CHANNEL]).await;

    let err = ChannelRepository::new(&pool)
        .create_channel(&NewChannel::new(ids::NEWS_CHANNEL, "Again", None))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ChannelExists(_)));
}

#[tokio::test]
async fn test_unknown_user_operations() {
    let pool = pool().await;
    let users = UserRepository::new(&pool);

    assert!(users.find_user(42).await.unwrap().is_none());
    assert!(matches!(users.get_user(42).await, Err(RepositoryError::UserNotFound(42))));
    assert!(matches!(users.delete_user(42).await, Err(RepositoryError::UserNotFound(42))));
    assert!(matches!(
        users.update_user_channels(42, &[], &[]).await,
        Err(RepositoryError::UserNotFound(42))
    ));
    assert!(matches!(
        users.get_user_channels(42).await,
        Err(RepositoryError::UserNotFound(42))
    ));
}

#[tokio::test]
async fn test_subscribe_updates_counters() {
    let pool = pool().await;
    create_channels(&pool, &[ids::NEWS_CHANNEL, ids::TECH_CHANNEL]).await;
    let users = UserRepository::new(&pool);
    users.create_user(ids::ALICE, "Alice").await.unwrap();
    users.create_user(ids::BOB, "Bob").await.unwrap();

    let changes = users
        .update_user_channels(ids::ALICE, &[ids::NEWS_CHANNEL, ids::TECH_CHANNEL], &[])
        .await
        .unwrap();
    assert_eq!(changes.added, vec![ids::NEWS_CHANNEL, ids::TECH_CHANNEL]);
    assert_eq!(changes.activated, vec![ids::NEWS_CHANNEL, ids::TECH_CHANNEL]);

    let changes = users
        .update_user_channels(ids::BOB, &[ids::NEWS_CHANNEL], &[])
        .await
        .unwrap();
    assert_eq!(changes.added, vec![ids::NEWS_CHANNEL]);
    assert!(changes.activated.is_empty());

    assert_eq!(subscribers(&pool, ids::NEWS_CHANNEL).await, 2);
    assert_eq!(subscribers(&pool, ids::TECH_CHANNEL).await, 1);
    assert_counters_consistent(&pool).await;
}

#[tokio::test]
async fn test_subscribe_twice_is_noop() {
    let pool = pool().await;
    create_channels(&pool, &[ids::NEWS_CHANNEL]).await;
    let users = UserRepository::new(&pool);
    users.create_user(ids::ALICE, "Alice").await.unwrap();

    users
        .update_user_channels(ids::ALICE, &[ids::NEWS_CHANNEL], &[])
        .await
        .unwrap();
    let changes = users
        .update_user_channels(ids::ALICE, &[ids::NEWS_CHANNEL], &[])
        .await
        .unwrap();

    assert!(changes.added.is_empty());
    assert_eq!(subscribers(&pool, ids::NEWS_CHANNEL).await, 1);
    assert_eq!(users.get_user_channels(ids::ALICE).await.unwrap(), vec![ids::NEWS_CHANNEL]);
}

#[tokio::test]
async fn test_unsubscribe_reports_orphans() {
    let pool = pool().await;
    create_channels(&pool, &[ids::NEWS_CHANNEL, ids::TECH_CHANNEL]).await;
    let users = UserRepository::new(&pool);
    users.create_user(ids::ALICE, "Alice").await.unwrap();
    users.create_user(ids::BOB, "Bob").await.unwrap();
    users
        .update_user_channels(ids::ALICE, &[ids::NEWS_CHANNEL, ids::TECH_CHANNEL], &[])
        .await
        .unwrap();
    users
        .update_user_channels(ids::BOB, &[ids::NEWS_CHANNEL], &[])
        .await
        .unwrap();

    let changes = users
        .update_user_channels(ids::ALICE, &[], &[ids::NEWS_CHANNEL, ids::TECH_CHANNEL])
        .await
        .unwrap();
    assert_eq!(changes.removed, vec![ids::NEWS_CHANNEL, ids::TECH_CHANNEL]);
    assert_eq!(changes.orphaned, vec![ids::TECH_CHANNEL]);

    // Removing a channel the user does not have changes nothing
    let changes = users
        .update_user_channels(ids::ALICE, &[], &[ids::NEWS_CHANNEL])
        .await
        .unwrap();
    assert!(changes.removed.is_empty());
    assert!(changes.orphaned.is_empty());

    assert_eq!(subscribers(&pool, ids::NEWS_CHANNEL).await, 1);
    assert_eq!(subscribers(&pool, ids::TECH_CHANNEL).await, 0);
    assert_counters_consistent(&pool).await;
}

#[tokio::test]
async fn test_unknown_channel_rolls_back_whole_update() {
    let pool = pool().await;
    create_channels(&pool, &[ids::NEWS_CHANNEL]).await;
    let users = UserRepository::new(&pool);
    users.create_user(ids::ALICE, "Alice").await.unwrap();

    let err = users
        .update_user_channels(ids::ALICE, &[ids::NEWS_CHANNEL, -999], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ChannelNotFound(-999)));

    assert!(users.get_user_channels(ids::ALICE).await.unwrap().is_empty());
    assert_eq!(subscribers(&pool, ids::NEWS_CHANNEL).await, 0);
}

#[tokio::test]
async fn test_delete_user_decrements_counters() {
    let pool = pool().await;
    create_channels(&pool, &[ids::NEWS_CHANNEL, ids::TECH_CHANNEL]).await;
    let users = UserRepository::new(&pool);
    users.create_user(ids::ALICE, "Alice").await.unwrap();
    users.create_user(ids::BOB, "Bob").await.unwrap();
    users
        .update_user_channels(ids::ALICE, &[ids::NEWS_CHANNEL, ids::TECH_CHANNEL], &[])
        .await
        .unwrap();
    users
        .update_user_channels(ids::BOB, &[ids::NEWS_CHANNEL], &[])
        .await
        .unwrap();

    let orphaned = users.delete_user(ids::ALICE).await.unwrap();
    assert_eq!(orphaned, vec![ids::TECH_CHANNEL]);
    assert!(users.find_user(ids::ALICE).await.unwrap().is_none());
    assert_eq!(subscribers(&pool, ids::NEWS_CHANNEL).await, 1);
    assert_eq!(subscribers(&pool, ids::TECH_CHANNEL).await, 0);
    assert_counters_consistent(&pool).await;
}

#[tokio::test]
async fn test_delete_channel_requires_no_subscribers() {
    let pool = pool().await;
    create_channels(&pool, &[ids::NEWS_CHANNEL]).await;
    let users = UserRepository::new(&pool);
    let channels = ChannelRepository::new(&pool);
    users.create_user(ids::ALICE, "Alice").await.unwrap();
    users
        .update_user_channels(ids::ALICE, &[ids::NEWS_CHANNEL], &[])
        .await
        .unwrap();

    let err = channels.delete_channel(ids::NEWS_CHANNEL).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ChannelHasSubscribers(_)));

    users
        .update_user_channels(ids::ALICE, &[], &[ids::NEWS_CHANNEL])
        .await
        .unwrap();
    channels.delete_channel(ids::NEWS_CHANNEL).await.unwrap();
    assert!(channels.find_channel(ids::NEWS_CHANNEL).await.unwrap().is_none());

    let err = channels.delete_channel(ids::NEWS_CHANNEL).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ChannelNotFound(_)));
}

#[tokio::test]
async fn test_active_channels() {
    let pool = pool().await;
    create_channels(&pool, &[ids::NEWS_CHANNEL, ids::TECH_CHANNEL]).await;
    let users = UserRepository::new(&pool);
    users.create_user(ids::ALICE, "Alice").await.unwrap();
    users
        .update_user_channels(ids::ALICE, &[ids::TECH_CHANNEL], &[])
        .await
        .unwrap();

    let active = ChannelRepository::new(&pool).list_active_channels().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, ids::TECH_CHANNEL);
    assert_eq!(active[0].username.as_deref(), Some("chan1"));
}
