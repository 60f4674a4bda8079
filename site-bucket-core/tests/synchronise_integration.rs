use site_bucket_core::config::SyncConfig;
use site_bucket_core::contract::{
    DeletionChoice, ListPage, MockDecisionSource, MockRemoteStore, RemoteObject,
};
use site_bucket_core::deletion::DeletionDecision;
use site_bucket_core::inventory::{file_digest, InventoryError};
use site_bucket_core::memory::{InMemoryStore, RecordingSink};
use site_bucket_core::retry::RetryPolicy;
use site_bucket_core::synchronise::{ensure_bucket, synchronise, Operation, SyncError};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn site_with(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
    dir
}

fn config_for(site: &Path) -> SyncConfig {
    SyncConfig::new(site)
}

fn single_page(objects: Vec<(&'static str, String)>) -> ListPage {
    ListPage {
        objects: objects
            .into_iter()
            .map(|(key, etag)| RemoteObject {
                key: key.to_string(),
                etag: Some(format!("\"{etag}\"")),
            })
            .collect(),
        next_continuation: None,
    }
}

struct TestCase {
    name: &'static str,
    local: Vec<(&'static str, &'static str)>,
    /// Remote etag per key; `None` means "same digest as the local file".
    remote: Vec<(&'static str, Option<&'static str>)>,
    delete_policy: DeletionDecision,
    expected_uploads: Vec<&'static str>,
    expected_deletes: Vec<&'static str>,
}

#[tokio::test]
async fn test_synchronise_scenarios_table_driven() {
    let test_cases = vec![
        TestCase {
            name: "new local file is uploaded once",
            local: vec![("index.html", "<h1>hi</h1>")],
            remote: vec![],
            delete_policy: DeletionDecision::Undecided,
            expected_uploads: vec!["index.html"],
            expected_deletes: vec![],
        },
        TestCase {
            name: "remote-only file is kept under keep-all",
            local: vec![],
            remote: vec![("index.html", Some("abcd"))],
            delete_policy: DeletionDecision::KeepAll,
            expected_uploads: vec![],
            expected_deletes: vec![],
        },
        TestCase {
            name: "changed file is re-uploaded, not deleted",
            local: vec![("index.html", "<h1>new</h1>")],
            remote: vec![("index.html", Some("abcd"))],
            delete_policy: DeletionDecision::Undecided,
            expected_uploads: vec!["index.html"],
            expected_deletes: vec![],
        },
        TestCase {
            name: "unchanged file is left alone",
            local: vec![("index.html", "<h1>same</h1>")],
            remote: vec![("index.html", None)],
            delete_policy: DeletionDecision::Undecided,
            expected_uploads: vec![],
            expected_deletes: vec![],
        },
        TestCase {
            name: "remote-only file is deleted under delete-all",
            local: vec![("index.html", "<h1>same</h1>")],
            remote: vec![("index.html", None), ("old.html", Some("ffff"))],
            delete_policy: DeletionDecision::DeleteAll,
            expected_uploads: vec![],
            expected_deletes: vec!["old.html"],
        },
    ];

    for case in test_cases {
        let site = site_with(&case.local);
        let mut config = config_for(site.path());
        config.delete_policy = case.delete_policy;

        let listing: Vec<(&'static str, String)> = case
            .remote
            .iter()
            .map(|(key, etag)| {
                let etag = match etag {
                    Some(etag) => etag.to_string(),
                    None => file_digest(&site.path().join(key)).unwrap(),
                };
                (*key, etag)
            })
            .collect();

        let mut store = MockRemoteStore::new();
        store.expect_bucket().return_const("my.blog.bucket".to_string());
        store
            .expect_list_page()
            .times(1)
            .return_once(move |_| Ok(single_page(listing)));
        for key in &case.expected_uploads {
            let key = key.to_string();
            store
                .expect_store_object()
                .withf(move |k, _| k == key)
                .times(1)
                .returning(|_, _| Ok(()));
        }
        if case.expected_uploads.is_empty() {
            store.expect_store_object().never();
        }
        for key in &case.expected_deletes {
            let key = key.to_string();
            store
                .expect_delete_object()
                .withf(move |k| k == key)
                .times(1)
                .returning(|_| Ok(()));
        }
        if case.expected_deletes.is_empty() {
            store.expect_delete_object().never();
        }

        let mut decisions = MockDecisionSource::new();
        decisions.expect_choose().never();

        let sink = RecordingSink::new();
        let report = synchronise(&config, &store, &decisions, &sink)
            .await
            .unwrap_or_else(|e| panic!("{}: synchronise failed: {e}", case.name));

        assert_eq!(
            report.uploads.len(),
            case.expected_uploads.len(),
            "{}",
            case.name
        );
        assert_eq!(
            report.deletions.len(),
            case.expected_deletes.len(),
            "{}",
            case.name
        );
        assert_eq!(report.failure_count(), 0, "{}", case.name);
        assert!(
            sink.lines().last().unwrap().starts_with("Done!"),
            "{}: expected completion summary, got {:?}",
            case.name,
            sink.lines()
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_upload_error_is_retried_once() {
    let site = site_with(&[("a.html", "a")]);
    let store = InMemoryStore::new("site");
    store.time_out_for("a.html", 1);
    let decisions = MockDecisionSource::new();
    let sink = RecordingSink::new();

    let report = synchronise(&config_for(site.path()), &store, &decisions, &sink)
        .await
        .unwrap();

    assert_eq!(store.store_calls(), vec!["a.html", "a.html"]);
    assert_eq!(store.content("a.html"), Some(b"a".to_vec()));
    assert_eq!(report.failure_count(), 0);
    assert_eq!(sink.count_containing("Retrying in 5 seconds"), 1);
    assert_eq!(sink.count_containing("Upload New a.html: Success!"), 1);
}

#[tokio::test]
async fn test_permanent_failure_does_not_stop_the_batch() {
    let site = site_with(&[("a.html", "a"), ("b.html", "b"), ("c.html", "c")]);
    let store = InMemoryStore::new("site");
    store.put("b.html", "old b");
    store.put("gone.html", "gone");
    store.put("stale.html", "stale");
    store.fail_for("a.html");
    store.fail_for("gone.html");

    let mut config = config_for(site.path());
    config.delete_policy = DeletionDecision::DeleteAll;
    let decisions = MockDecisionSource::new();
    let sink = RecordingSink::new();

    let report = synchronise(&config, &store, &decisions, &sink).await.unwrap();

    // creates (a, c) before updates (b), then deletes
    assert_eq!(store.store_calls(), vec!["a.html", "c.html", "b.html"]);
    assert_eq!(store.delete_calls(), vec!["gone.html", "stale.html"]);
    assert_eq!(report.failure_count(), 2);
    assert_eq!(store.content("b.html"), Some(b"b".to_vec()));
    assert_eq!(store.content("c.html"), Some(b"c".to_vec()));
    assert!(store.content("stale.html").is_none());
    assert!(store.content("gone.html").is_some());

    let failed: Vec<_> = report.failures().map(|o| (o.key.as_str(), o.operation)).collect();
    assert_eq!(
        failed,
        vec![("a.html", Operation::Create), ("gone.html", Operation::Delete)]
    );
    assert_eq!(sink.count_containing("FAILURE!"), 2);
    assert!(sink.lines().last().unwrap().contains("2 failed"));
}

#[tokio::test]
async fn test_listing_is_drained_across_pages() {
    let files: Vec<(String, String)> = (0..7)
        .map(|i| (format!("page{i}.html"), format!("content {i}")))
        .collect();
    let local: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    let site = site_with(&local);

    let store = InMemoryStore::new("site");
    for (path, content) in &files {
        store.put(path.clone(), content.clone());
    }
    store.put("zz-orphan.html", "orphan");
    store.set_page_size(2);

    let mut config = config_for(site.path());
    config.delete_policy = DeletionDecision::DeleteAll;
    let decisions = MockDecisionSource::new();
    let sink = RecordingSink::new();

    let report = synchronise(&config, &store, &decisions, &sink).await.unwrap();

    assert_eq!(store.list_calls(), 4);
    assert!(store.store_calls().is_empty(), "all pages must be seen, nothing re-uploaded");
    assert_eq!(store.delete_calls(), vec!["zz-orphan.html"]);
    assert_eq!(report.unchanged, 7);
}

#[tokio::test(start_paused = true)]
async fn test_listing_failure_aborts_before_any_upload() {
    let site = site_with(&[("index.html", "hi")]);
    let store = InMemoryStore::new("site");
    store.time_out_listing(5);

    let mut config = config_for(site.path());
    config.retry = RetryPolicy {
        delay_secs: 5,
        max_retries: Some(2),
    };
    let decisions = MockDecisionSource::new();
    let sink = RecordingSink::new();

    let err = synchronise(&config, &store, &decisions, &sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Inventory(InventoryError::RemoteUnavailable(_))
    ));
    assert_eq!(store.list_calls(), 3);
    assert!(store.store_calls().is_empty());
}

#[tokio::test]
async fn test_missing_site_directory_is_fatal() {
    let dir = tempdir().unwrap();
    let store = InMemoryStore::new("site");
    let decisions = MockDecisionSource::new();
    let sink = RecordingSink::new();

    let err = synchronise(&config_for(&dir.path().join("_site")), &store, &decisions, &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Inventory(InventoryError::MissingRoot(_))));
    assert_eq!(store.list_calls(), 0);
}

#[tokio::test]
async fn test_prompted_decisions_follow_the_session() {
    let site = site_with(&[]);
    let store = InMemoryStore::new("site");
    for key in ["x.html", "y.html", "z.html"] {
        store.put(key, key);
    }

    let mut decisions = MockDecisionSource::new();
    let mut answers = vec![DeletionChoice::KeepOne, DeletionChoice::DeleteAll].into_iter();
    decisions
        .expect_choose()
        .times(2)
        .returning(move |_| Ok(answers.next().unwrap()));
    let sink = RecordingSink::new();

    let report = synchronise(&config_for(site.path()), &store, &decisions, &sink)
        .await
        .unwrap();

    assert_eq!(report.kept, vec!["x.html"]);
    assert_eq!(store.delete_calls(), vec!["y.html", "z.html"]);
    assert_eq!(store.keys(), vec!["x.html"]);
}

#[tokio::test]
async fn test_concurrent_uploads_report_in_order() {
    let files: Vec<(String, String)> = (0..10)
        .map(|i| (format!("f{i:02}.html"), format!("body {i}")))
        .collect();
    let local: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    let site = site_with(&local);
    let store = InMemoryStore::new("site");

    let mut config = config_for(site.path());
    config.upload_concurrency = 4;
    let decisions = MockDecisionSource::new();
    let sink = RecordingSink::new();

    let report = synchronise(&config, &store, &decisions, &sink).await.unwrap();

    assert_eq!(report.uploads.len(), 10);
    let reported: Vec<_> = report.uploads.iter().map(|o| o.key.clone()).collect();
    let expected: Vec<_> = files.iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(reported, expected);
    assert_eq!(store.keys(), expected);
}

#[tokio::test]
async fn test_zero_concurrency_is_rejected() {
    let site = site_with(&[]);
    let store = InMemoryStore::new("site");
    let mut config = config_for(site.path());
    config.upload_concurrency = 0;

    let err = synchronise(&config, &store, &MockDecisionSource::new(), &RecordingSink::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[tokio::test]
async fn test_ensure_bucket_creates_missing_bucket() {
    let store = InMemoryStore::new("my.blog.bucket");
    store.set_bucket_exists(false);
    let sink = RecordingSink::new();

    ensure_bucket(&store, &sink).await.unwrap();

    assert_eq!(sink.lines(), vec!["Creating bucket my.blog.bucket"]);
    ensure_bucket(&store, &sink).await.unwrap();
    assert_eq!(sink.lines().len(), 1, "existing bucket is not recreated");
}

#[tokio::test]
async fn test_unreadable_file_and_missing_etag_are_per_file_outcomes() {
    let site = site_with(&[("a.html", "a"), ("b.html", "b")]);
    let vanishing = site.path().join("a.html");

    let mut store = MockRemoteStore::new();
    store.expect_bucket().return_const("my.blog.bucket".to_string());
    // a.html disappears between the local scan and the upload; b.html has no etag remotely
    store.expect_list_page().times(1).return_once(move |_| {
        fs::remove_file(&vanishing).unwrap();
        Ok(ListPage {
            objects: vec![RemoteObject {
                key: "b.html".to_string(),
                etag: None,
            }],
            next_continuation: None,
        })
    });
    store
        .expect_store_object()
        .withf(|k, body| k == "b.html" && body.as_slice() == b"b")
        .times(1)
        .returning(|_, _| Ok(()));
    store.expect_delete_object().never();

    let mut decisions = MockDecisionSource::new();
    decisions.expect_choose().never();
    let sink = RecordingSink::new();

    let report = synchronise(&config_for(site.path()), &store, &decisions, &sink)
        .await
        .unwrap();

    let uploads: Vec<_> = report
        .uploads
        .iter()
        .map(|o| (o.key.as_str(), o.operation, o.succeeded()))
        .collect();
    assert_eq!(
        uploads,
        vec![
            ("a.html", Operation::Create, false),
            ("b.html", Operation::Update, true),
        ]
    );
    assert_eq!(sink.count_containing("Upload New a.html: FAILURE!"), 1);
    assert_eq!(sink.count_containing("Upload Changed b.html: Success!"), 1);
    assert!(sink.lines().last().unwrap().contains("1 failed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_share_the_runtime() {
    let first_site = site_with(&[("index.html", "one"), ("css/site.css", "body {}")]);
    let second_site = site_with(&[("index.html", "two")]);
    let first_store = InMemoryStore::new("first");
    let second_store = InMemoryStore::new("second");
    let decisions = MockDecisionSource::new();
    let first_sink = RecordingSink::new();
    let second_sink = RecordingSink::new();

    let first_config = config_for(first_site.path());
    let second_config = config_for(second_site.path());
    let (first, second) = tokio::join!(
        synchronise(&first_config, &first_store, &decisions, &first_sink),
        synchronise(&second_config, &second_store, &decisions, &second_sink),
    );

    assert_eq!(first.unwrap().uploads.len(), 2);
    assert_eq!(second.unwrap().uploads.len(), 1);
    assert_eq!(first_store.content("index.html"), Some(b"one".to_vec()));
    assert_eq!(second_store.content("index.html"), Some(b"two".to_vec()));
}
