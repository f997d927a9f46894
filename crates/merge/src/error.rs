use std::process::ExitStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MergeError>;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reader error: {0}")]
    Reader(#[from] tailsearch_reader::ReaderError),

    #[error("failed to spawn external sort: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("no input files to merge")]
    NoInput,

    #[error("external sort exited with {status}")]
    MergeFailed { status: ExitStatus },
}
