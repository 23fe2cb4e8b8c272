//! E2E tests for the notification cache

mod common;

use common::{TestCaches, notification};
use socialcache::PassStatus;

#[tokio::test]
async fn test_notification_round_trip() {
    let caches = TestCaches::new().await;
    let original = notification("n1", 7, 3);

    caches.notifications.add_notification(original.clone());
    caches.notifications.sync();
    caches.notifications.query_notifications(7);
    caches.notifications.wait().await;

    assert_eq!(caches.notifications.notifications().as_slice(), &[original]);
}

#[tokio::test]
async fn test_upsert_replaces_the_whole_record() {
    let caches = TestCaches::new().await;
    caches.notifications.add_notification(notification("n1", 7, 0));
    caches.notifications.sync();

    let mut edited = notification("n1", 7, 45);
    edited.title = "Alice also liked your photo".to_string();
    caches.notifications.add_notification(edited.clone());
    caches.notifications.sync();
    caches.notifications.wait().await;

    let stored = caches.notifications.fetch_notifications(Some(7)).await.unwrap();
    assert_eq!(stored, vec![edited]);
}

#[tokio::test]
async fn test_remove_notification() {
    let caches = TestCaches::new().await;
    caches.notifications.add_notification(notification("keep", 1, 0));
    caches.notifications.add_notification(notification("drop", 1, 1));
    caches.notifications.sync();
    caches.notifications.remove_notification("drop");
    caches.notifications.sync();
    caches.notifications.wait().await;

    let ids: Vec<_> = caches
        .notifications
        .fetch_notifications(Some(1))
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.facebook_id)
        .collect();
    assert_eq!(ids, vec!["keep"]);
}

#[tokio::test]
async fn test_remove_notifications_purges_one_account() {
    let caches = TestCaches::new().await;
    for n in 0..4 {
        caches.notifications.add_notification(notification(&format!("a{n}"), 1, n));
    }
    for n in 0..3 {
        caches.notifications.add_notification(notification(&format!("b{n}"), 2, n));
    }
    caches.notifications.sync();

    caches.notifications.remove_notifications(1);
    caches.notifications.sync();
    caches.notifications.wait().await;

    assert!(caches.notifications.fetch_notifications(Some(1)).await.unwrap().is_empty());
    assert_eq!(caches.notifications.fetch_notifications(Some(2)).await.unwrap().len(), 3);
    assert_eq!(caches.notifications.fetch_notifications(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_insert_after_purge_in_the_same_pass_survives() {
    let caches = TestCaches::new().await;
    caches.notifications.add_notification(notification("old", 1, 0));
    caches.notifications.sync();

    caches.notifications.remove_notifications(1);
    caches.notifications.add_notification(notification("new", 1, 5));
    caches.notifications.sync();
    caches.notifications.query_notifications(1);
    caches.notifications.wait().await;

    let ids: Vec<_> = caches
        .notifications
        .notifications()
        .iter()
        .map(|n| n.facebook_id.clone())
        .collect();
    assert_eq!(ids, vec!["new"]);
}

#[tokio::test]
async fn test_query_all_notifications_is_newest_first() {
    let caches = TestCaches::new().await;
    caches.notifications.add_notification(notification("mid", 1, 10));
    caches.notifications.add_notification(notification("late", 2, 20));
    caches.notifications.add_notification(notification("early", 3, 0));
    caches.notifications.sync();
    caches.notifications.query_all_notifications();
    caches.notifications.wait().await;

    let ids: Vec<_> = caches
        .notifications
        .notifications()
        .iter()
        .map(|n| n.facebook_id.clone())
        .collect();
    assert_eq!(ids, vec!["late", "mid", "early"]);
    assert_eq!(caches.notifications.read_status(), PassStatus::Finished);
}

#[tokio::test]
async fn test_caches_share_a_database_without_interfering() {
    let caches = TestCaches::new().await;
    caches.notifications.add_notification(notification("n", 1, 0));
    caches.images.add_image(common::image("i", 1, 0));
    caches.notifications.sync();
    caches.images.commit();

    caches.images.purge_account(1);
    caches.images.commit();
    caches.notifications.wait().await;
    caches.images.wait().await;

    assert_eq!(caches.notifications.fetch_notifications(Some(1)).await.unwrap().len(), 1);
    assert!(caches.images.image_urls(1).await.unwrap().is_empty());
}
