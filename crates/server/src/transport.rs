use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tailsearch_coordinator::{AggregationCoordinator, PartialFile};
use tailsearch_protocol::{AgentError, AgentId, ErrorCode, FileRequest, RequestId};
use tokio::io::AsyncRead;

/// Outbound half of the agent channel: how the primary addresses one
/// agent. The concrete wire (socket, in-process duplex) lives behind this.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    fn agent_id(&self) -> AgentId;

    /// Deliver one broadcast payload. A send failure is reported to the
    /// caller so the response count can be kept exact.
    async fn send_request(&self, request: FileRequest) -> std::io::Result<()>;
}

/// Inbound half: where agent responses land, keyed by correlation id.
///
/// Success streams are spooled to `temp_dir/{request_id}.{agent_id}.{filename}`
/// and recorded with the coordinator; error replies are recorded directly.
/// Either way the response is counted, so aggregation always advances.
pub struct ResponseInbox {
    coordinator: Arc<AggregationCoordinator>,
    temp_dir: PathBuf,
}

impl ResponseInbox {
    pub fn new(coordinator: Arc<AggregationCoordinator>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            coordinator,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn partial_path(&self, request_id: &RequestId, agent_id: &AgentId, filename: &str) -> PathBuf {
        self.temp_dir
            .join(format!("{request_id}.{agent_id}.{filename}"))
    }

    /// Spool one agent's success stream to disk, then record it.
    pub async fn accept_stream<R: AsyncRead + Unpin + Send>(
        &self,
        request_id: &RequestId,
        agent_id: &AgentId,
        filename: &str,
        mut stream: R,
    ) {
        let path = self.partial_path(request_id, agent_id, filename);
        let spooled = async {
            let mut file = tokio::fs::File::create(&path).await?;
            tokio::io::copy(&mut stream, &mut file).await
        }
        .await;

        match spooled {
            Ok(bytes) => {
                log::info!(
                    "request {request_id}: received {bytes} byte(s) from agent {agent_id}"
                );
                self.coordinator.record_success(
                    request_id,
                    PartialFile {
                        path,
                        agent_id: agent_id.clone(),
                    },
                );
            }
            Err(err) => {
                log::error!(
                    "request {request_id}: failed to spool stream from agent {agent_id}: {err}"
                );
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("could not remove partial {}: {err}", path.display());
                    }
                }
                self.coordinator
                    .record_error(request_id, agent_id, ErrorCode::Internal);
            }
        }
    }

    /// Record one agent's error reply.
    pub fn accept_error(&self, error: &AgentError, agent_id: &AgentId) {
        self.coordinator
            .record_error(&error.request_id, agent_id, error.code);
    }
}
