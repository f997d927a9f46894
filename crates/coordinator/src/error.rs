use tailsearch_protocol::RequestId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("unknown or already resolved request: {0}")]
    UnknownRequest(RequestId),

    #[error("Merge error: {0}")]
    Merge(#[from] tailsearch_merge::MergeError),
}
