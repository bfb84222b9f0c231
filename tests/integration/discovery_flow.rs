//! Integration tests for startup discovery

use super::common::fixtures::{config_for, harness, settle};
use ibe::backup::mock::{MockBackup, MockProvider};
use ibe::{ItemId, LoadStatus, Phase};

fn ready(state: &ibe::AppState) -> bool {
    *state.phase() != Phase::Enumerating
}

/// Unencrypted backups come up loaded with stats for the selected app
#[tokio::test(flavor = "multi_thread")]
async fn test_unencrypted_backup_is_loaded_at_startup() {
    let provider = MockProvider::new(vec![MockBackup::new("iPhone", "iPhone")
        .with_file("AppDomain-com.foo", "a.txt", b"0123456789".to_vec())
        .with_file("AppDomain-com.bar", "b.txt", b"abcde".to_vec())]);
    let mut h = harness(provider, config_for("com.foo"));

    h.app.start();
    assert_eq!(h.app.state().phase(), &Phase::Enumerating);
    settle(&mut h.app, ready).await;

    let state = h.app.state();
    assert_eq!(state.phase(), &Phase::Ready);
    let item = state.item(ItemId(0)).unwrap();
    assert_eq!(item.load_status(), &LoadStatus::Loaded);
    assert!(!item.is_encrypted());
    assert_eq!(item.file_count(), 1);
    assert_eq!(item.total_bytes(), 10);
}

/// The whole list arrives in one batch, never partially populated
#[tokio::test(flavor = "multi_thread")]
async fn test_discovery_is_delivered_as_one_batch() {
    let provider = MockProvider::new(vec![
        MockBackup::new("A", "a"),
        MockBackup::new("B", "b"),
        MockBackup::new("C", "c").encrypted("pw"),
    ]);
    let mut h = harness(provider, config_for("com.foo"));

    h.app.start();
    let applied = h.app.next_batch().await;

    assert!(applied >= 1);
    assert_eq!(h.app.state().phase(), &Phase::Ready);
    assert_eq!(h.app.state().items().len(), 3);
}

/// Open and load failures stay scoped to their own backup
#[tokio::test(flavor = "multi_thread")]
async fn test_item_failures_do_not_affect_others() {
    let provider = MockProvider::new(vec![
        MockBackup::new("Broken", "broken").failing_open("permission denied"),
        MockBackup::new("Corrupt", "corrupt").failing_load("bad manifest"),
        MockBackup::new("Good", "good").with_file("AppDomain-com.foo", "x", vec![1, 2]),
        MockBackup::new("Locked", "locked").encrypted("pw"),
    ]);
    let mut h = harness(provider, config_for("com.foo"));

    h.app.start();
    settle(&mut h.app, ready).await;

    let items = h.app.state().items();
    assert_eq!(items.len(), 4);

    match items[0].load_status() {
        LoadStatus::LoadFailed(msg) => assert!(msg.contains("permission denied"), "{msg}"),
        other => panic!("unexpected status {other:?}"),
    }
    match items[1].load_status() {
        LoadStatus::LoadFailed(msg) => assert!(msg.contains("bad manifest"), "{msg}"),
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(items[2].load_status(), &LoadStatus::Loaded);
    assert_eq!(items[2].file_count(), 1);
    assert!(items[3].is_awaiting_password());
    assert_eq!(items[3].load_status(), &LoadStatus::NotLoaded);
}

/// Enumeration failure is reported once, with no partial list
#[tokio::test(flavor = "multi_thread")]
async fn test_enumeration_failure_is_global() {
    let mut h = harness(MockProvider::failing("no backup folder"), config_for("com.foo"));

    h.app.start();
    settle(&mut h.app, ready).await;

    match h.app.state().phase() {
        Phase::Failed(msg) => assert!(msg.contains("no backup folder"), "{msg}"),
        other => panic!("unexpected phase {other:?}"),
    }
    assert!(h.app.state().items().is_empty());
}

/// Zero backups is a normal, ready state
#[tokio::test(flavor = "multi_thread")]
async fn test_no_backups_found() {
    let mut h = harness(MockProvider::new(Vec::new()), config_for("com.foo"));

    h.app.start();
    settle(&mut h.app, ready).await;

    assert_eq!(h.app.state().phase(), &Phase::Ready);
    assert!(h.app.state().items().is_empty());
}

/// Changing the app recomputes stats of loaded backups immediately
#[tokio::test(flavor = "multi_thread")]
async fn test_filter_change_recomputes_stats() {
    let provider = MockProvider::new(vec![MockBackup::new("iPhone", "iPhone")
        .with_file("AppDomain-com.foo", "a", vec![0; 10])
        .with_file("AppDomain-com.bar", "b", vec![0; 5])
        .with_file("AppDomain-com.bar", "c", vec![0; 7])]);
    let mut h = harness(provider, config_for("com.foo"));

    h.app.start();
    settle(&mut h.app, ready).await;

    let state = h.app.state_mut();
    assert_eq!(state.set_filter("com.bar"), Ok(true));
    let item = state.item(ItemId(0)).unwrap();
    assert_eq!((item.file_count(), item.total_bytes()), (2, 12));

    assert_eq!(state.set_filter("com.bar"), Ok(false));
    assert_eq!(state.set_filter(""), Err(ibe::ActionError::EmptyFilter));
    assert_eq!(state.filter(), "com.bar");

    // Prefix matches are not matches
    state.set_filter("com.ba").unwrap();
    assert_eq!(state.item(ItemId(0)).unwrap().file_count(), 0);
}
