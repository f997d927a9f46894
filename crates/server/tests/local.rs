use pretty_assertions::assert_eq;
use std::time::Duration;
use tailsearch_protocol::SearchRequest;
use tailsearch_server::{SearchOrchestrator, ServerConfig, ServerError};
use tempfile::TempDir;

fn setup(read_dir: &TempDir, temp_dir: &TempDir) -> SearchOrchestrator {
    SearchOrchestrator::new(
        ServerConfig::default()
            .with_read_dir(read_dir.path())
            .with_temp_dir(temp_dir.path())
            .with_deadline(Duration::from_secs(5)),
    )
}

#[tokio::test]
async fn local_search_returns_two_newest_error_lines() {
    let read_dir = TempDir::new().expect("read dir");
    let temp_dir = TempDir::new().expect("temp dir");
    tokio::fs::write(
        read_dir.path().join("app.log"),
        "1000;error boot failed\n\
         1010;info started\n\
         1020;error disk full\n\
         1030;info retry\n\
         1040;error timeout\n",
    )
    .await
    .expect("write log");

    let orchestrator = setup(&read_dir, &temp_dir);
    let request = SearchRequest::new("app.log").with_keyword("error").with_last(2);

    let mut out = Vec::new();
    orchestrator
        .search_local(&request, &mut out)
        .await
        .expect("search");

    assert_eq!(
        String::from_utf8(out).expect("utf8"),
        "1040;error timeout\n1020;error disk full\n"
    );

    // merged temp file must be gone after the transfer
    let mut entries = tokio::fs::read_dir(temp_dir.path()).await.expect("read_dir");
    assert!(entries.next_entry().await.expect("entry").is_none());
}

#[tokio::test]
async fn local_search_of_missing_file_is_not_found() {
    let read_dir = TempDir::new().expect("read dir");
    let temp_dir = TempDir::new().expect("temp dir");
    let orchestrator = setup(&read_dir, &temp_dir);

    let mut out = Vec::new();
    let err = orchestrator
        .search_local(&SearchRequest::new("absent.log"), &mut out)
        .await
        .expect_err("missing file");
    assert!(matches!(err, ServerError::NotFound), "got {err:?}");
    assert!(out.is_empty());
}

#[tokio::test]
async fn local_search_without_constraints_orders_whole_file() {
    let read_dir = TempDir::new().expect("read dir");
    let temp_dir = TempDir::new().expect("temp dir");
    tokio::fs::write(read_dir.path().join("app.log"), "2;b\n3;c\n1;a\n")
        .await
        .expect("write log");

    let orchestrator = setup(&read_dir, &temp_dir);
    let mut out = Vec::new();
    orchestrator
        .search_local(&SearchRequest::new("app.log"), &mut out)
        .await
        .expect("search");

    assert_eq!(String::from_utf8(out).expect("utf8"), "3;c\n2;b\n1;a\n");
}
