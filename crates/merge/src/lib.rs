//! Combines partial result files into one ordered output.
//!
//! The heavy ordering work is delegated to the external `sort(1)` utility,
//! invoked with an argument vector (never through a shell); keyword
//! filtering and line capping are applied natively over the child's stdout
//! in a single ordering → filtering → capping pipeline.

pub mod error;

pub use error::{MergeError, Result};

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tailsearch_protocol::RequestId;
use tailsearch_reader::{FilterStage, ForwardLines, LineFilter};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::{Child, Command};

pub const DEFAULT_DELIMITER: char = ';';
pub const DEFAULT_SORT_PROGRAM: &str = "sort";

/// Keyword/cap constraints applied after ordering.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub keyword: Option<String>,
    pub last: Option<u64>,
}

impl MergeOptions {
    pub fn new(keyword: Option<String>, last: Option<u64>) -> Self {
        Self { keyword, last }
    }
}

/// Merges files whose lines start with a sortable key (an epoch-time
/// prefix) followed by a delimiter, producing one file ordered by
/// descending key.
#[derive(Debug, Clone)]
pub struct ResultMerger {
    temp_dir: PathBuf,
    delimiter: char,
    sort_program: String,
}

impl ResultMerger {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            delimiter: DEFAULT_DELIMITER,
            sort_program: DEFAULT_SORT_PROGRAM.to_string(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_sort_program(mut self, program: impl Into<String>) -> Self {
        self.sort_program = program.into();
        self
    }

    /// Merge `inputs` into a freshly named file under the temp dir.
    ///
    /// On [`MergeError::MergeFailed`] the returned path was never produced:
    /// any partially written output is unlinked before the error surfaces,
    /// so callers must not read or unlink it.
    pub async fn merge(&self, inputs: &[PathBuf], options: &MergeOptions) -> Result<PathBuf> {
        if inputs.is_empty() {
            return Err(MergeError::NoInput);
        }

        let output_path = self
            .temp_dir
            .join(format!("{}.merged", RequestId::generate()));
        log::debug!(
            "merging {} file(s) into {}",
            inputs.len(),
            output_path.display()
        );

        let mut child = self.spawn_sort(inputs)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MergeError::Spawn(std::io::Error::other("sort stdout not captured")))?;

        let mut stage = FilterStage::new(
            ForwardLines::new(stdout),
            LineFilter::new(
                options.keyword.clone(),
                options.last.map(|last| last as usize),
            ),
        );

        if let Err(err) = write_lines(&mut stage, &output_path).await {
            discard_output(&output_path).await;
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(err);
        }

        if stage.capped() {
            // The cap stopped the read early; the child may still be
            // blocked writing into the pipe.
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Ok(output_path);
        }

        let status = child.wait().await?;
        if !status.success() {
            discard_output(&output_path).await;
            return Err(MergeError::MergeFailed { status });
        }
        Ok(output_path)
    }

    fn spawn_sort(&self, inputs: &[PathBuf]) -> Result<Child> {
        let mut cmd = Command::new(&self.sort_program);
        cmd.arg("--temporary-directory")
            .arg(&self.temp_dir)
            .arg("-t")
            .arg(self.delimiter.to_string())
            .arg("-k1,1")
            .arg("-n")
            .arg("-r")
            .arg("--");
        for input in inputs {
            cmd.arg(input);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd.spawn().map_err(MergeError::Spawn)
    }
}

async fn write_lines<S: tailsearch_reader::LineSource>(
    stage: &mut FilterStage<S>,
    output_path: &Path,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(output_path).await?);
    while let Some(line) = stage.next_line().await? {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    Ok(())
}

async fn discard_output(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::warn!("could not remove abandoned merge output {}: {err}", path.display());
        }
    }
}
