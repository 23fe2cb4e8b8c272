//! E2E tests for the image cache

mod common;

use common::{TestCaches, image};
use socialcache::PassStatus;

#[tokio::test]
async fn test_insert_round_trips_every_field() {
    let caches = TestCaches::new().await;
    let original = image("https://example.com/a.jpg", 1, 10);

    caches.images.add_image(original.clone());
    caches.images.commit();
    caches.images.query_images(1);
    caches.images.wait().await;

    assert_eq!(caches.images.write_status(), PassStatus::Finished);
    assert_eq!(caches.images.read_status(), PassStatus::Finished);
    assert_eq!(caches.images.images().as_slice(), &[original]);
}

#[tokio::test]
async fn test_upsert_keeps_newest_values() {
    let caches = TestCaches::new().await;

    caches.images.add_image(image("u", 1, 0));
    caches.images.commit();
    let mut newer = image("u", 1, 30);
    newer.image_name = "renamed".to_string();
    newer.width = 10;
    caches.images.add_image(newer.clone());
    caches.images.commit();
    caches.images.wait().await;

    let stored = caches.images.image(1, "u").await.unwrap();
    assert_eq!(stored, Some(newer));
    assert_eq!(caches.images.image_urls(1).await.unwrap(), vec!["u"]);
}

#[tokio::test]
async fn test_duplicate_key_in_one_pass_later_wins() {
    let caches = TestCaches::new().await;
    let mut later = image("u", 1, 0);
    later.image_name = "later".to_string();

    caches.images.add_image(image("u", 1, 0));
    caches.images.add_image(later.clone());
    caches.images.commit();
    caches.images.wait().await;

    assert_eq!(caches.images.image(1, "u").await.unwrap(), Some(later));
}

#[tokio::test]
async fn test_seven_records_across_two_accounts() {
    let caches = TestCaches::new().await;
    for n in 0..4 {
        caches.images.add_image(image(&format!("a{n}"), 100, n));
    }
    for n in 0..3 {
        caches.images.add_image(image(&format!("b{n}"), 200, n));
    }
    caches.images.commit();

    caches.images.query_images(100);
    caches.images.wait().await;
    let urls: Vec<_> = caches.images.images().iter().map(|i| i.image_url.clone()).collect();
    assert_eq!(urls, vec!["a3", "a2", "a1", "a0"]);

    caches.images.purge_account(100);
    caches.images.commit();
    caches.images.query_images(100);
    caches.images.wait().await;
    assert!(caches.images.images().is_empty());

    caches.images.query_images(200);
    caches.images.wait().await;
    assert_eq!(caches.images.images().len(), 3);
}

#[tokio::test]
async fn test_remove_image_and_remove_images_remove_exactly_those_keys() {
    let caches = TestCaches::new().await;
    for url in ["a", "b", "c", "d", "e"] {
        caches.images.add_image(image(url, 1, 0));
    }
    caches.images.commit();

    caches.images.remove_image("a");
    caches.images.remove_images(["c", "e", "not-cached"]);
    caches.images.commit();
    caches.images.wait().await;

    let mut urls = caches.images.image_urls(1).await.unwrap();
    urls.sort();
    assert_eq!(urls, vec!["b", "d"]);
    assert_eq!(caches.images.write_status(), PassStatus::Finished);
}

#[tokio::test]
async fn test_field_update_changes_only_the_file_path() {
    let caches = TestCaches::new().await;
    let original = image("k", 1, 0);
    caches.images.add_image(original.clone());
    caches.images.commit();

    caches.images.update_image_file("k", "full/k.jpg");
    caches.images.commit();
    caches.images.wait().await;

    let stored = caches.images.image(1, "k").await.unwrap().unwrap();
    assert_eq!(stored.image_file.as_deref(), Some("full/k.jpg"));
    assert_eq!(stored.thumbnail_file, None);
    assert_eq!(
        stored,
        socialcache::data::Image {
            image_file: Some("full/k.jpg".to_string()),
            ..original
        }
    );
}

#[tokio::test]
async fn test_insert_and_file_update_in_the_same_pass() {
    let caches = TestCaches::new().await;
    caches.images.add_image(image("k", 1, 0));
    caches.images.update_image_thumbnail("k", "thumbs/k.jpg");
    caches.images.commit();
    caches.images.wait().await;

    let stored = caches.images.image(1, "k").await.unwrap().unwrap();
    assert_eq!(stored.thumbnail_file.as_deref(), Some("thumbs/k.jpg"));
}

#[tokio::test]
async fn test_removing_an_image_deletes_its_files() {
    let caches = TestCaches::new().await;
    let thumb = caches.write_file("k-thumb.jpg");
    let full = caches.write_file("k.jpg");
    let unrelated = caches.write_file("other.jpg");

    caches.images.add_image(image("k", 1, 0));
    caches.images.update_image_thumbnail("k", &thumb);
    caches.images.update_image_file("k", "k.jpg");
    caches.images.commit();
    caches.images.wait().await;

    caches.images.remove_image("k");
    caches.images.commit();
    caches.images.wait().await;

    assert_eq!(caches.images.write_status(), PassStatus::Finished);
    assert!(!thumb.exists());
    assert!(!full.exists());
    assert!(unrelated.exists());
}

#[tokio::test]
async fn test_missing_files_do_not_fail_removal() {
    let caches = TestCaches::new().await;
    caches.images.add_image(image("k", 1, 0));
    caches.images.update_image_file("k", "already-gone.jpg");
    caches.images.commit();

    caches.images.remove_image("k");
    caches.images.commit();
    caches.images.wait().await;

    assert_eq!(caches.images.write_status(), PassStatus::Finished);
    assert!(caches.images.image(1, "k").await.unwrap().is_none());
}

#[tokio::test]
async fn test_image_urls_are_newest_first() {
    let caches = TestCaches::new().await;
    caches.images.add_image(image("old", 9, 1));
    caches.images.add_image(image("newest", 9, 50));
    caches.images.add_image(image("middle", 9, 20));
    caches.images.add_image(image("elsewhere", 8, 99));
    caches.images.commit();
    caches.images.wait().await;

    assert_eq!(
        caches.images.image_urls(9).await.unwrap(),
        vec!["newest", "middle", "old"]
    );
}

#[tokio::test]
async fn test_rows_survive_reopen() {
    let caches = TestCaches::new().await;
    caches.images.add_image(image("persisted", 1, 0));
    caches.images.commit();

    let caches = caches.reopen().await;
    assert_eq!(caches.images.image_urls(1).await.unwrap(), vec!["persisted"]);
}

#[tokio::test]
async fn test_reinserting_a_removed_image_releases_its_old_files() {
    let caches = TestCaches::new().await;
    let thumb = caches.write_file("r-thumb.jpg");
    let full = caches.write_file("r.jpg");

    caches.images.add_image(image("r", 1, 0));
    caches.images.update_image_thumbnail("r", &thumb);
    caches.images.update_image_file("r", &full);
    caches.images.commit();

    caches.images.remove_image("r");
    caches.images.add_image(image("r", 1, 10));
    caches.images.update_image_file("r", &full);
    caches.images.commit();
    caches.images.wait().await;

    assert_eq!(caches.images.write_status(), PassStatus::Finished);
    assert!(!thumb.exists());
    assert!(full.exists());
    let stored = caches.images.image(1, "r").await.unwrap().unwrap();
    assert_eq!(stored.thumbnail_file, None);
    assert_eq!(stored.image_file, Some(full.to_string_lossy().into_owned()));
}
