use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] tailsearch_protocol::ProtocolError),

    #[error("file not found on any node")]
    NotFound,

    #[error("no agents to broadcast to")]
    NoAgents,

    #[error("aggregation was abandoned before completing")]
    Abandoned,

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] tailsearch_coordinator::CoordinatorError),

    #[error("Merge error: {0}")]
    Merge(#[from] tailsearch_merge::MergeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
