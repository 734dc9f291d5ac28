mod common;

use arcfetch_url::{ChangeDetector, LastModified, PollingResult, Run, Source};
use common::{APRIL, Artifact, MARCH, MARCH_MILLIS, TestHttpServer, client, engine, zip_archive};
use tempfile::tempdir;

fn completed_run(records: &[(&str, i64)]) -> Run {
    let mut run = Run::new(1);
    for (identity, millis) in records {
        run.attach_last_modified(*identity, LastModified::from_millis(*millis));
    }
    run.finished_at = Some(chrono::Utc::now());
    run
}

#[tokio::test]
async fn poll_without_previous_run_triggers_build() {
    let server = TestHttpServer::spawn().await;
    let source = Source::direct(server.url("/files/app.zip").as_str()).unwrap();

    let result = ChangeDetector::new(client())
        .compare_remote(&[source], None, None)
        .await;
    assert_eq!(result, PollingResult::TriggerBuild);
}

#[tokio::test]
async fn poll_with_missing_destination_triggers_build() {
    let server = TestHttpServer::spawn().await;
    server.put("/files/app.zip", Artifact::new(zip_archive(&[]), Some(MARCH)));
    let source = Source::direct(server.url("/files/app.zip").as_str()).unwrap();
    let previous = completed_run(&[(source.identity(), MARCH_MILLIS)]);

    let workspace = tempdir().unwrap();
    let result = ChangeDetector::new(client())
        .compare_remote(
            &[source],
            Some(&previous),
            Some(&workspace.path().join("missing")),
        )
        .await;
    assert_eq!(result, PollingResult::TriggerBuild);
}

#[tokio::test]
async fn poll_without_record_is_significant() {
    let server = TestHttpServer::spawn().await;
    let source = Source::direct(server.url("/files/app.zip").as_str()).unwrap();
    let previous = completed_run(&[]);

    let result = ChangeDetector::new(client())
        .compare_remote(&[source], Some(&previous), None)
        .await;
    assert_eq!(result, PollingResult::SignificantChange);
}

#[tokio::test]
async fn poll_after_fetch_reports_no_changes_until_remote_changes() {
    let server = TestHttpServer::spawn().await;
    server.put(
        "/files/app.zip",
        Artifact::new(zip_archive(&[("app/README", "v1")]), Some(MARCH)),
    );
    let source = Source::direct(server.url("/files/app.zip").as_str()).unwrap();

    let workspace = tempdir().unwrap();
    let destination = workspace.path().join("ws");
    let mut run = Run::new(1);
    engine(&destination)
        .run(&[source.clone()], &mut run)
        .await
        .unwrap();
    run.finished_at = Some(chrono::Utc::now());

    let detector = ChangeDetector::new(client());
    let result = detector
        .compare_remote(&[source.clone()], Some(&run), Some(&destination))
        .await;
    assert_eq!(result, PollingResult::NoChanges);

    server.put(
        "/files/app.zip",
        Artifact::new(zip_archive(&[("app/README", "v2")]), Some(APRIL)),
    );
    let result = detector
        .compare_remote(&[source], Some(&run), Some(&destination))
        .await;
    assert_eq!(result, PollingResult::SignificantChange);
    assert_eq!(server.downloads(), 1);
}

#[tokio::test]
async fn poll_with_unknown_remote_time_is_significant() {
    let server = TestHttpServer::spawn().await;
    server.put("/files/app.zip", Artifact::new(zip_archive(&[]), None));
    let source = Source::direct(server.url("/files/app.zip").as_str()).unwrap();
    let previous = completed_run(&[(source.identity(), 0)]);

    let result = ChangeDetector::new(client())
        .compare_remote(&[source], Some(&previous), None)
        .await;
    assert_eq!(result, PollingResult::SignificantChange);
}

#[tokio::test]
async fn poll_with_source_missing_from_record_is_significant() {
    let server = TestHttpServer::spawn().await;
    server.put("/files/a.zip", Artifact::new(zip_archive(&[]), Some(MARCH)));
    server.put("/files/b.zip", Artifact::new(zip_archive(&[]), Some(MARCH)));
    let a = Source::direct(server.url("/files/a.zip").as_str()).unwrap();
    let b = Source::direct(server.url("/files/b.zip").as_str()).unwrap();
    let previous = completed_run(&[(a.identity(), MARCH_MILLIS)]);

    let result = ChangeDetector::new(client())
        .compare_remote(&[a, b], Some(&previous), None)
        .await;
    assert_eq!(result, PollingResult::SignificantChange);
}

#[tokio::test]
async fn poll_skips_sources_that_cannot_be_probed() {
    let server = TestHttpServer::spawn().await;
    server.put("/files/app.zip", Artifact::new(zip_archive(&[]), Some(MARCH)));
    let gone = Source::direct(server.url("/files/gone.zip").as_str()).unwrap();
    let present = Source::direct(server.url("/files/app.zip").as_str()).unwrap();
    let previous = completed_run(&[
        (gone.identity(), MARCH_MILLIS),
        (present.identity(), MARCH_MILLIS),
    ]);

    let result = ChangeDetector::new(client())
        .compare_remote(&[gone, present], Some(&previous), None)
        .await;
    assert_eq!(result, PollingResult::NoChanges);
}

#[tokio::test]
async fn poll_resolves_artifactory_sources_again() {
    let server = TestHttpServer::spawn().await;
    server.set_search_response(
        r#"{"results":[{"repo":"libs-release","path":"app","name":"app-11.zip"}]}"#,
    );
    server.put(
        "/artifactory/libs-release/app/app-11.zip",
        Artifact::new(zip_archive(&[]), Some(APRIL)),
    );
    let source =
        Source::artifactory(&server.artifactory_folder("libs-release", "app"), None).unwrap();
    let previous = completed_run(&[(source.identity(), MARCH_MILLIS)]);

    let result = ChangeDetector::new(client())
        .compare_remote(&[source], Some(&previous), None)
        .await;
    assert_eq!(result, PollingResult::SignificantChange);
    assert_eq!(server.queries().len(), 1);
}
