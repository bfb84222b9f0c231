//! Integration tests for exporting an app's files into a zip archive

use std::cell::RefCell;
use std::time::Duration;

use super::common::fixtures::{
    config_for, drain_until_quiet, harness, is_done_exporting, read_archive, settle, today,
};
use ibe::backup::mock::{MockBackup, MockProvider};
use ibe::{ActionError, ExportStatus, ItemId, Phase};

const ID: ItemId = ItemId(0);
const FOO: &str = "AppDomain-com.foo";

fn ready(state: &ibe::AppState) -> bool {
    *state.phase() == Phase::Ready
}

fn done(state: &ibe::AppState) -> bool {
    is_done_exporting(state.item(ID).unwrap().export_status())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_writes_only_the_selected_app() {
    let provider = MockProvider::new(vec![MockBackup::new("iPhone", "iPhone")
        .with_file(FOO, "a.txt", b"0123456789".to_vec())
        .with_file("AppDomain-com.bar", "b.txt", b"abcde".to_vec())
        .with_directory(FOO, "Library")]);
    let mut h = harness(provider, config_for("com.foo"));
    h.app.start();
    settle(&mut h.app, ready).await;

    h.app.state_mut().export(ID).unwrap();
    assert_eq!(
        h.app.state().item(ID).unwrap().export_status(),
        &ExportStatus::Exporting { percent: 0 }
    );
    settle(&mut h.app, done).await;

    let ExportStatus::Exported(summary) = h.app.state().item(ID).unwrap().export_status() else {
        panic!("export did not succeed");
    };
    assert_eq!(summary.files_written, 1);
    assert_eq!(summary.bytes_written, 10);
    assert_eq!(summary.skipped, 0);

    let created = h.picker.created();
    assert_eq!(created.len(), 1);
    let folder = format!("iPhone-{}", today());
    assert_eq!(created[0], h.dir.path().join(format!("{folder}.zip")));
    assert_eq!(
        read_archive(&created[0]),
        vec![(format!("{folder}/a.txt"), b"0123456789".to_vec())]
    );
}

/// A second request while the first is running is refused and opens no file
#[tokio::test(flavor = "multi_thread")]
async fn test_second_export_is_rejected_while_running() {
    let provider = MockProvider::new(vec![
        MockBackup::new("iPhone", "iPhone").with_file(FOO, "a.txt", vec![7; 64])
    ]);
    let mut h = harness(provider, config_for("com.foo"));
    h.app.start();
    settle(&mut h.app, ready).await;

    let state = h.app.state_mut();
    state.export(ID).unwrap();
    assert_eq!(state.export(ID), Err(ActionError::ExportAlreadyRunning));

    settle(&mut h.app, done).await;
    assert_eq!(h.picker.created().len(), 1);

    // Finished exports can be repeated
    h.app.state_mut().export(ID).unwrap();
    settle(&mut h.app, done).await;
    assert!(matches!(
        h.app.state().item(ID).unwrap().export_status(),
        ExportStatus::Exported(_)
    ));
}

/// Unreadable records are skipped and the export still succeeds
#[tokio::test(flavor = "multi_thread")]
async fn test_unreadable_records_are_skipped() {
    let backup = (1..=6)
        .fold(MockBackup::new("iPhone", "iPhone"), |b, i| {
            b.with_file(FOO, &format!("f{i}"), vec![i as u8; i])
        })
        .failing_every_nth_read(3);
    let mut h = harness(MockProvider::new(vec![backup]), config_for("com.foo"));
    h.app.start();
    settle(&mut h.app, ready).await;

    h.app.state_mut().export(ID).unwrap();
    settle(&mut h.app, done).await;

    let ExportStatus::Exported(summary) = h.app.state().item(ID).unwrap().export_status() else {
        panic!("export did not succeed");
    };
    assert_eq!(summary.files_written, 4);
    assert_eq!(summary.skipped, 2);
    assert_eq!(h.provider.content_opens().len(), 6);

    let names: Vec<String> = read_archive(&h.picker.created()[0])
        .into_iter()
        .map(|(name, _)| name.rsplit('/').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["f1", "f2", "f4", "f5"]);
}

/// Observed progress never goes backwards and never passes 100
#[tokio::test(flavor = "multi_thread")]
async fn test_progress_is_monotonic() {
    let backup = (0..40).fold(MockBackup::new("iPhone", "iPhone"), |b, i| {
        b.with_file(FOO, &format!("f{i}"), vec![0; 16])
    });
    let config = config_for("com.foo").with_progress_interval(1);
    let mut h = harness(MockProvider::new(vec![backup]), config);
    h.app.start();
    settle(&mut h.app, ready).await;

    h.app.state_mut().export(ID).unwrap();
    let seen = RefCell::new(Vec::new());
    settle(&mut h.app, |s| {
        if let ExportStatus::Exporting { percent } = s.item(ID).unwrap().export_status() {
            seen.borrow_mut().push(*percent);
        }
        done(s)
    })
    .await;

    let seen = seen.into_inner();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert!(seen.iter().all(|p| *p <= 100));
}

/// A dismissed picker fails the export instead of leaving it running
#[tokio::test(flavor = "multi_thread")]
async fn test_picker_failure_fails_export() {
    let provider = MockProvider::new(vec![
        MockBackup::new("iPhone", "iPhone").with_file(FOO, "a.txt", vec![1; 4])
    ]);
    let mut h = harness(provider.clone(), config_for("com.foo"));
    let picker = ibe::backup::mock::MockPicker::new(h.dir.path()).failing();
    h.app = ibe::App::new(
        config_for("com.foo"),
        std::sync::Arc::new(provider),
        Some(std::sync::Arc::new(picker)),
    );
    h.app.start();
    settle(&mut h.app, ready).await;

    h.app.state_mut().export(ID).unwrap();
    settle(&mut h.app, done).await;

    let ExportStatus::ExportFailed(message) = h.app.state().item(ID).unwrap().export_status()
    else {
        panic!("export should have failed");
    };
    assert!(message.contains("picker dismissed"), "{message}");
    assert!(h.provider.content_opens().is_empty());
}

/// Exporting straight into a caller-supplied file
#[tokio::test(flavor = "multi_thread")]
async fn test_export_to_sink() {
    let provider = MockProvider::new(vec![MockBackup::new("iPhone", "00008030-001A")
        .with_file(FOO, "Documents/db.sqlite", vec![3; 100])]);
    let mut h = harness(provider, config_for("com.foo"));
    h.app.start();
    settle(&mut h.app, ready).await;

    let path = h.dir.path().join("out.zip");
    let file = std::fs::File::create(&path).unwrap();
    h.app.state_mut().export_to(ID, Box::new(file)).unwrap();
    settle(&mut h.app, done).await;

    assert!(h.picker.created().is_empty());
    let entries = read_archive(&path);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, format!("00008030-{}/Documents/db.sqlite", today()));
    assert_eq!(entries[0].1, vec![3; 100]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_preconditions() {
    let provider = MockProvider::new(vec![
        MockBackup::new("iPhone", "iPhone").with_file(FOO, "a.txt", vec![1; 4]),
        MockBackup::new("iPad", "iPad").encrypted("pw").with_file(FOO, "a.txt", vec![1; 4]),
    ]);
    let mut h = harness(provider, config_for("com.other"));
    h.app.start();
    settle(&mut h.app, ready).await;

    let state = h.app.state_mut();
    assert_eq!(state.export(ID), Err(ActionError::NothingToExport));
    assert_eq!(state.export(ItemId(1)), Err(ActionError::NotLoaded));
    assert_eq!(state.export(ItemId(9)), Err(ActionError::UnknownItem(9)));
    assert_eq!(
        state.item(ItemId(1)).unwrap().export_status(),
        &ExportStatus::Idle
    );

    state.set_filter("com.foo").unwrap();
    assert_eq!(state.export(ID), Ok(()));
    settle(&mut h.app, done).await;
    assert!(h.picker.created().len() == 1);
}

/// Changing the selected app while an export runs changes neither the files
/// written nor the progress denominator
#[tokio::test(flavor = "multi_thread")]
async fn test_filter_change_does_not_affect_running_export() {
    let backup = (0..300).fold(MockBackup::new("iPhone", "iPhone"), |b, i| {
        let b = b.with_file(FOO, &format!("foo/{i}"), vec![1; 32]);
        if i % 10 == 0 {
            b.with_file("AppDomain-com.bar", &format!("bar/{i}"), vec![2; 8])
        } else {
            b
        }
    });
    let config = config_for("com.foo").with_progress_interval(7);
    let mut h = harness(MockProvider::new(vec![backup]), config);
    h.app.start();
    settle(&mut h.app, ready).await;

    let state = h.app.state_mut();
    state.export(ID).unwrap();
    assert_eq!(state.set_filter("com.bar"), Ok(true));
    assert_eq!(state.item(ID).unwrap().file_count(), 30);

    let seen = RefCell::new(Vec::new());
    settle(&mut h.app, |s| {
        if let ExportStatus::Exporting { percent } = s.item(ID).unwrap().export_status() {
            seen.borrow_mut().push(*percent);
        }
        done(s)
    })
    .await;

    // Last report is at 294 of 300 records; a denominator of 30 would hit 100
    let seen = seen.into_inner();
    assert!(seen.iter().all(|p| *p < 100), "{seen:?}");
    let ExportStatus::Exported(summary) = h.app.state().item(ID).unwrap().export_status() else {
        panic!("export did not succeed");
    };
    assert_eq!(summary.files_written, 300);
    assert_eq!(summary.bytes_written, 300 * 32);

    let entries = read_archive(&h.picker.created()[0]);
    assert_eq!(entries.len(), 300);
    assert!(entries
        .iter()
        .all(|(name, content)| name.contains("/foo/") && content == &vec![1u8; 32]));
}

/// An export that outlives its backup list still writes its archive, but its
/// reports do not touch the backup now listed at the same index
#[tokio::test(flavor = "multi_thread")]
async fn test_stale_export_reports_are_dropped() {
    let backup = (0..50).fold(MockBackup::new("iPhone", "aaaa"), |b, i| {
        b.with_file(FOO, &format!("f{i}"), vec![5; 64])
    });
    let provider = MockProvider::new(vec![backup]);
    let mut h = harness(provider, config_for("com.foo").with_progress_interval(1));
    h.app.start();
    settle(&mut h.app, ready).await;

    h.app.state_mut().export(ID).unwrap();
    h.provider.set_backups(vec![MockBackup::new("iPhone", "bbbb")
        .with_file(FOO, "only", vec![9; 3])]);
    h.app.state_mut().start_enumeration();
    settle(&mut h.app, ready).await;
    drain_until_quiet(&mut h.app, Duration::from_secs(1)).await;

    let item = h.app.state().item(ID).unwrap();
    assert_eq!(item.source().file_name, "bbbb");
    assert_eq!(item.export_status(), &ExportStatus::Idle);
    assert_eq!(item.file_count(), 1);

    let created = h.picker.created();
    assert_eq!(created.len(), 1);
    let entries = read_archive(&created[0]);
    assert_eq!(entries.len(), 50);
    assert!(entries.iter().all(|(name, _)| name.starts_with("aaaa-")));
}
