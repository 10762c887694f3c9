mod common;

use cdc_harness::declaration::TestDeclaration;
use cdc_harness::error::ErrorKind;
use cdc_harness::harness_error;
use cdc_harness::suite::{TestOutcome, TestSuite};
use cdc_harness_config::shared::Lifecycle;
use cdc_harness_telemetry::init_test_tracing;

use crate::common::{CallLog, fast_config, registry};

#[tokio::test(flavor = "multi_thread")]
async fn per_suite_lifecycle_shares_one_engine() {
    init_test_tracing();
    let log = CallLog::new();

    let report = TestSuite::new("per_suite", registry(&log))
        .declare(TestDeclaration::builder("scripted").resource("a").build())
        .config(fast_config(Lifecycle::PerSuite))
        .test("sees_running_engine", |engine| async move {
            assert!(engine.is_running());
            Ok(())
        })
        .test("sees_merged_configuration", |engine| async move {
            assert_eq!(engine.get_configuration_value("port"), Some("5432"));
            Ok(())
        })
        .run()
        .await
        .unwrap();

    report.assert_success();
    assert_eq!(report.passed(), 2);
    assert_eq!(log.count("resource:a:start"), 1);
    assert_eq!(log.count("connector:start:scripted"), 1);
    assert_eq!(log.count("resource:a:stop"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn per_test_lifecycle_sets_up_around_every_test() {
    init_test_tracing();
    let log = CallLog::new();

    let report = TestSuite::new("per_test", registry(&log))
        .declare(TestDeclaration::builder("scripted").resource("a").build())
        .config(fast_config(Lifecycle::PerTest))
        .test("first", |engine| async move {
            engine.wait_for_n_events(3).await.notified().await;
            Ok(())
        })
        .test("second", |engine| async move {
            // A fresh connector replays its events from the start.
            engine.wait_for_n_events(3).await.notified().await;
            assert_eq!(engine.events().await[0].position, 1);
            Ok(())
        })
        .run()
        .await
        .unwrap();

    report.assert_success();
    assert_eq!(log.count("resource:a:start"), 2);
    assert_eq!(log.count("connector:start:scripted"), 2);
    assert_eq!(log.count("connector:stop"), 2);
    assert_eq!(log.count("resource:a:stop"), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_and_panicking_bodies_fail_only_their_test() {
    init_test_tracing();
    let log = CallLog::new();

    let report = TestSuite::new("mixed", registry(&log))
        .declare(TestDeclaration::builder("scripted").resource("a").build())
        .config(fast_config(Lifecycle::PerSuite))
        .test("returns_error", |_| async {
            Err(harness_error!(ErrorKind::Unknown, "row count mismatch"))
        })
        .test("panics", |_| async {
            panic!("assertion inside the body");
        })
        .test("passes", |engine| async move {
            assert!(engine.is_running());
            Ok(())
        })
        .run()
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed(), 2);
    assert_eq!(report.outcome("passes"), Some(&TestOutcome::Passed));

    match report.outcome("returns_error") {
        Some(TestOutcome::Failed(err)) => {
            assert_eq!(err.kind(), ErrorKind::TestFailed);
            assert!(err.detail().unwrap().contains("row count mismatch"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    match report.outcome("panics") {
        Some(TestOutcome::Failed(err)) => {
            assert_eq!(err.kind(), ErrorKind::TestPanic);
            assert_eq!(err.detail(), Some("assertion inside the body"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // Teardown still ran after the failures.
    assert_eq!(log.count("resource:a:stop"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn resolution_failures_fail_the_test_and_still_tear_down() {
    init_test_tracing();
    let log = CallLog::new();

    let report = TestSuite::new("refusing", registry(&log))
        .declare(TestDeclaration::builder("refusing").resource("a").build())
        .config(fast_config(Lifecycle::PerSuite))
        .test("never_runs", |_| async { Ok(()) })
        .run()
        .await
        .unwrap();

    match report.outcome("never_runs") {
        Some(TestOutcome::Failed(err)) => assert_eq!(err.kind(), ErrorKind::EngineNotRunning),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(log.contains("resource:a:stop"));
}

#[tokio::test(flavor = "multi_thread")]
async fn setup_errors_abort_the_suite() {
    init_test_tracing();
    let log = CallLog::new();

    let err = TestSuite::new("broken", registry(&log))
        .declare(
            TestDeclaration::builder("scripted")
                .resource("failing_start")
                .build(),
        )
        .config(fast_config(Lifecycle::PerSuite))
        .test("never_runs", |_| async { Ok(()) })
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ResourceStartFailed);
    assert!(!log.contains("connector:start:scripted"));
}

#[tokio::test(flavor = "multi_thread")]
async fn undeclared_suites_are_inert() {
    init_test_tracing();
    let log = CallLog::new();

    let report = TestSuite::new("undeclared", registry(&log))
        .test("skipped", |_| async { Ok(()) })
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        report.outcome("skipped"),
        Some(&TestOutcome::Skipped("no connector declared".to_owned()))
    );
    assert!(log.calls().is_empty());
}
