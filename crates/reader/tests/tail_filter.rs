use pretty_assertions::assert_eq;
use std::io::Write;
use tailsearch_reader::{BackwardLineReader, FilterStage, LineFilter};
use tempfile::NamedTempFile;

#[tokio::test]
async fn tail_search_returns_newest_matches_first() {
    let mut file = NamedTempFile::new().expect("tempfile");
    for i in 0..100 {
        let tag = if i % 10 == 0 { "error" } else { "info" };
        writeln!(file, "{};{} message {}", 1_420_000_000 + i, tag, i).expect("write");
    }

    let reader = BackwardLineReader::with_buffer_size(file.path(), 64)
        .await
        .expect("open");
    let mut stage = FilterStage::new(reader, LineFilter::new(Some("error".into()), Some(3)));

    let mut lines = Vec::new();
    while let Some(line) = stage.next_line().await.expect("pull") {
        lines.push(line);
    }

    assert_eq!(
        lines,
        vec![
            "1420000090;error message 90",
            "1420000080;error message 80",
            "1420000070;error message 70",
        ]
    );
}
