//! Capture scope integration tests.
//!
//! - Reconciliation per mode: once, none, all, overwrite
//! - Record naming: derived, numbered, explicit
//! - Record paths: next to the test, directories
//! - Observation: fan-out, filters, tracebacks, composite cache verbs
//! - Failure handling: body errors, nested scopes

mod common;

use perf_capture::{CaptureError, RecordOptions, SourceRegistry, current_test};
use perf_capture::memory::MemoryCache;
use perf_config::{Mode, RecordingConfig};
use perf_core::{Operation, Query, RecordEntry};
use perf_store::KvFile;
use pretty_assertions::assert_eq;
use serde_json::Value;

use common::{FakeDatabase, Fixture, read};

fn stored(fixture: &Fixture, name: &str) -> Option<Vec<RecordEntry>> {
    KvFile::open(fixture.perf_file()).unwrap().get(name)
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

#[test]
fn once_creates_then_compares() {
    let fixture = Fixture::new();

    fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT a, b FROM users WHERE id = 1")?;
            Ok(())
        })
        .unwrap();

    assert_eq!(
        stored(&fixture, "ApiTests.test_listing"),
        Some(vec![RecordEntry::new("db", "SELECT ... FROM users WHERE id = #")])
    );

    // Same shape, different literal: still matches.
    fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT a, b FROM users WHERE id = 99")?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn once_reports_mismatch_with_diff() {
    let fixture = Fixture::new();
    fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT a FROM users")?;
            Ok(())
        })
        .unwrap();

    let err = fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT a FROM users")?;
            fixture.db.execute("SELECT a FROM groups")?;
            Ok(())
        })
        .unwrap_err();

    let CaptureError::RecordMismatch { record_name, diff } = &err else {
        panic!("expected mismatch, got {err}");
    };
    assert_eq!(record_name, "ApiTests.test_listing");
    assert_eq!(
        diff.as_deref(),
        Some("  db: SELECT a FROM users\n+ db: SELECT a FROM groups")
    );
    assert!(
        err.to_string()
            .starts_with("Performance record did not match for ApiTests.test_listing\n"),
        "{err}"
    );
}

#[test]
fn once_reports_changed_query_and_keeps_file() {
    let fixture = Fixture::new();
    fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT a FROM users WHERE id = 1")?;
            Ok(())
        })
        .unwrap();
    let before = read(&fixture.perf_file());

    let err = fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT b FROM users WHERE id = 1")?;
            Ok(())
        })
        .unwrap_err();

    let CaptureError::RecordMismatch { diff, .. } = &err else {
        panic!("expected mismatch, got {err}");
    };
    assert_eq!(
        diff.as_deref(),
        Some("- db: SELECT a FROM users WHERE id = #\n+ db: SELECT b FROM users WHERE id = #")
    );
    assert_eq!(read(&fixture.perf_file()), before);
    assert_eq!(
        stored(&fixture, "ApiTests.test_listing"),
        Some(vec![RecordEntry::new("db", "SELECT a FROM users WHERE id = #")])
    );
}

#[test]
fn mismatch_without_diff_when_disabled() {
    let fixture = Fixture::new();
    fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || Ok(()))
        .unwrap();

    let err = fixture
        .context_with(RecordingConfig {
            show_diff: false,
            ..RecordingConfig::default()
        })
        .record(RecordOptions::new(), || {
            fixture.cache.get("session")?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, CaptureError::RecordMismatch { diff: None, .. }));
    assert_eq!(
        err.to_string(),
        "Performance record did not match for ApiTests.test_listing"
    );
}

#[test]
fn none_requires_existing_record() {
    let fixture = Fixture::new();
    let err = fixture
        .context(Mode::None)
        .record(RecordOptions::new(), || Ok(()))
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Original performance record does not exist for ApiTests.test_listing"
    );
    assert!(!fixture.perf_file().exists());
}

#[test]
fn none_accepts_matching_record() {
    let fixture = Fixture::new();
    fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || Ok(()))
        .unwrap();
    fixture
        .context(Mode::None)
        .record(RecordOptions::new(), || Ok(()))
        .unwrap();
}

#[test]
fn all_creates_and_still_fails() {
    let fixture = Fixture::new();
    let err = fixture
        .context(Mode::All)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT 1")?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, CaptureError::MissingRecord { .. }));
    assert_eq!(
        stored(&fixture, "ApiTests.test_listing"),
        Some(vec![RecordEntry::new("db", "SELECT #")])
    );

    // Second run finds it.
    fixture
        .context(Mode::All)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT 2")?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn overwrite_replaces_differing_record() {
    let fixture = Fixture::new();
    fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT a FROM users")?;
            Ok(())
        })
        .unwrap();

    fixture
        .context(Mode::Overwrite)
        .record(RecordOptions::new(), || {
            fixture.cache.delete("users")?;
            Ok(())
        })
        .unwrap();

    assert_eq!(
        stored(&fixture, "ApiTests.test_listing"),
        Some(vec![RecordEntry::new("cache|delete", "users")])
    );
}

// ---------------------------------------------------------------------------
// Naming and paths
// ---------------------------------------------------------------------------

#[test]
fn repeated_scopes_are_numbered() {
    let fixture = Fixture::new();
    let context = fixture.context(Mode::Once);

    for _ in 0..3 {
        context.record(RecordOptions::new(), || Ok(())).unwrap();
    }

    let file = KvFile::open(fixture.perf_file()).unwrap();
    for name in [
        "ApiTests.test_listing",
        "ApiTests.test_listing.2",
        "ApiTests.test_listing.3",
    ] {
        assert_eq!(file.get(name), Some(vec![]), "{name}");
    }
    assert_eq!(file.len(), 3);
}

#[test]
fn explicit_name_leaves_numbering_alone() {
    let fixture = Fixture::new();
    let context = fixture.context(Mode::Once);

    context.record(RecordOptions::new(), || Ok(())).unwrap();
    context
        .record(RecordOptions::new().record_name("custom"), || Ok(()))
        .unwrap();
    context.record(RecordOptions::new(), || Ok(())).unwrap();

    let file = KvFile::open(fixture.perf_file()).unwrap();
    assert!(file.get("custom").is_some());
    assert!(file.get("ApiTests.test_listing.2").is_some());
    assert!(file.get("ApiTests.test_listing.3").is_none());
}

#[test]
fn explicit_file_needs_no_test() {
    let fixture = Fixture::new();
    let file = fixture.dir.path().join("explicit.perf.yml");
    let context = perf_capture::CaptureContext::new(fixture.registry.clone());

    context
        .record(
            RecordOptions::new()
                .record_name("named")
                .path(file.display().to_string()),
            || Ok(()),
        )
        .unwrap();

    assert_eq!(read(&file), "named: []\n");
}

#[test]
fn unknown_test_is_an_error() {
    let fixture = Fixture::new();
    let context = perf_capture::CaptureContext::new(fixture.registry.clone());
    let err = context.record(RecordOptions::new(), || Ok(())).unwrap_err();
    assert!(matches!(err, CaptureError::TestIdentity(_)), "{err}");
}

#[test]
fn directory_path_is_created_next_to_test() {
    let fixture = Fixture::new();
    fixture
        .context(Mode::Once)
        .record(RecordOptions::new().path("perf_files/"), || Ok(()))
        .unwrap();

    let expected = fixture.dir.path().join("perf_files").join("test_api.perf.yml");
    assert_eq!(read(&expected), "ApiTests.test_listing: []\n");
}

#[test]
fn option_test_overrides_provider() {
    let fixture = Fixture::new();
    fixture
        .context(Mode::Once)
        .record(
            RecordOptions::new().test(fixture.test(None, "test_other")),
            || Ok(()),
        )
        .unwrap();

    assert!(stored(&fixture, "test_other").is_some());
}

#[test]
fn current_test_macro_names_the_record() {
    let fixture = Fixture::new();
    let file = fixture.dir.path().join("macro.perf.yml");
    let context = perf_capture::CaptureContext::new(fixture.registry.clone())
        .with_current_test(|| current_test!());

    context
        .record(RecordOptions::new().path(file.display().to_string()), || Ok(()))
        .unwrap();

    assert_eq!(read(&file), "current_test_macro_names_the_record: []\n");
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

#[test]
fn every_alias_is_observed() {
    let fixture = Fixture::new();
    let mut registry = SourceRegistry::new();
    let default = registry.add_database("default", FakeDatabase::default());
    let second = registry.add_database("second", FakeDatabase::default());
    let replica = registry.add_database("replica", FakeDatabase::default());
    let sessions = registry.add_cache("sessions", MemoryCache::new());

    perf_capture::CaptureContext::new(registry)
        .with_current_test(fixture.test(None, "test_aliases"))
        .record(RecordOptions::new(), || {
            second.execute("SELECT 1")?;
            default.execute("SELECT 2")?;
            replica.execute("SELECT 3")?;
            sessions.set("sid", Value::from("x"))?;
            Ok(())
        })
        .unwrap();

    let names: Vec<String> = stored(&fixture, "test_aliases")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, ["db|second", "db", "db|replica", "cache|sessions|set"]);
}

#[test]
fn cache_verbs_are_recorded_once_with_clean_keys() {
    let fixture = Fixture::new();
    let mut recorder = fixture
        .context(Mode::Once)
        .recorder(RecordOptions::new())
        .unwrap();
    recorder.start().unwrap();

    fixture.cache.set("user:1", Value::from(10)).unwrap();
    fixture.cache.get_many(&["user:2", "profile:3"]).unwrap();
    fixture
        .cache
        .get_or_set("token:4", || Value::from("t"))
        .unwrap();
    fixture.cache.incr("user:1", 2).unwrap();
    fixture.cache.delete_many(&["user:1", "token:4"]).unwrap();

    assert_eq!(
        recorder.record(),
        vec![
            RecordEntry::new("cache|set", "user:#"),
            RecordEntry::new(
                "cache|get_many",
                Query::Many(vec!["profile:#".to_string(), "user:#".to_string()])
            ),
            RecordEntry::new("cache|get_or_set", "token:#"),
            RecordEntry::new("cache|incr", "user:#"),
            RecordEntry::new(
                "cache|delete_many",
                Query::Many(vec!["token:#".to_string(), "user:#".to_string()])
            ),
        ]
    );
    recorder.finish().unwrap();
}

#[test]
fn capture_operation_filters() {
    let fixture = Fixture::new();
    fixture
        .context(Mode::Once)
        .record(
            RecordOptions::new().capture_operation(|op| matches!(op, Operation::Db(_))),
            || {
                fixture.cache.get("ignored")?;
                fixture.db.execute("SELECT 1")?;
                Ok(())
            },
        )
        .unwrap();

    assert_eq!(
        stored(&fixture, "ApiTests.test_listing"),
        Some(vec![RecordEntry::new("db", "SELECT #")])
    );
}

#[test]
fn capture_traceback_attaches_frames() {
    let fixture = Fixture::new();
    let mut recorder = fixture
        .context(Mode::Once)
        .recorder(
            RecordOptions::new().capture_traceback(|op| op.name().starts_with("db")),
        )
        .unwrap();
    recorder.start().unwrap();
    fixture.db.execute("SELECT 1").unwrap();
    fixture.cache.get("k").unwrap();

    let record = recorder.record();
    assert!(record[0].traceback.as_ref().is_some_and(|tb| !tb.frames().is_empty()));
    assert_eq!(record[1].traceback, None);
    recorder.finish().unwrap();

    assert!(read(&fixture.perf_file()).contains("traceback:"));
}

#[test]
fn failing_backend_call_is_still_recorded() {
    let fixture = Fixture::new();
    let mut recorder = fixture
        .context(Mode::Once)
        .recorder(RecordOptions::new())
        .unwrap();
    recorder.start().unwrap();

    let err = fixture.db.execute("SELECT BROKEN").unwrap_err();
    assert!(matches!(err, CaptureError::Backend(_)));
    assert_eq!(recorder.record().len(), 1);
    recorder.fail();
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[test]
fn failed_body_saves_nothing() {
    let fixture = Fixture::new();
    let err = fixture
        .context(Mode::Once)
        .record(RecordOptions::new(), || {
            fixture.db.execute("SELECT 1")?;
            fixture.db.execute("SELECT BROKEN")?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, CaptureError::Body(_)), "{err}");
    assert!(!fixture.perf_file().exists());
    assert!(!fixture.db.is_observed());
    assert!(!fixture.cache.is_observed());
}

#[test]
fn nested_scope_is_rejected() {
    let fixture = Fixture::new();
    let context = fixture.context(Mode::Once);

    context
        .record(RecordOptions::new(), || {
            let inner = context.record(RecordOptions::new().record_name("inner"), || Ok(()));
            assert!(
                matches!(inner, Err(CaptureError::AlreadyCapturing { .. })),
                "{inner:?}"
            );
            fixture.db.execute("SELECT 1")?;
            Ok(())
        })
        .unwrap();

    assert_eq!(
        stored(&fixture, "ApiTests.test_listing"),
        Some(vec![RecordEntry::new("db", "SELECT #")])
    );
    assert_eq!(stored(&fixture, "inner"), None);
}
