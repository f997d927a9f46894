use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::transport::{AgentTransport, ResponseInbox};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tailsearch_coordinator::{AggregationCoordinator, Outcome};
use tailsearch_merge::{MergeOptions, ResultMerger};
use tailsearch_protocol::{ErrorCode, FileRequest, RequestId, SearchRequest};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Primary-side lifecycle: broadcast, await aggregation, merge, stream,
/// clean up.
pub struct SearchOrchestrator {
    config: ServerConfig,
    coordinator: Arc<AggregationCoordinator>,
    merger: ResultMerger,
    inbox: Arc<ResponseInbox>,
    transports: Vec<Arc<dyn AgentTransport>>,
}

impl SearchOrchestrator {
    pub fn new(config: ServerConfig) -> Self {
        let coordinator = Arc::new(AggregationCoordinator::new());
        let merger = ResultMerger::new(&config.temp_dir).with_delimiter(config.delimiter);
        let inbox = Arc::new(ResponseInbox::new(
            Arc::clone(&coordinator),
            &config.temp_dir,
        ));
        Self {
            config,
            coordinator,
            merger,
            inbox,
            transports: Vec::new(),
        }
    }

    /// Fan-in entry point handed to transport implementations.
    pub fn inbox(&self) -> Arc<ResponseInbox> {
        Arc::clone(&self.inbox)
    }

    pub fn add_transport(&mut self, transport: Arc<dyn AgentTransport>) {
        self.transports.push(transport);
    }

    pub fn agent_count(&self) -> usize {
        self.transports.len()
    }

    /// Distributed search: broadcast to every known agent, await the
    /// aggregation under the configured deadline, merge, and stream the
    /// ordered result into `sink`.
    pub async fn search<W: AsyncWrite + Unpin>(
        &self,
        request: &SearchRequest,
        sink: &mut W,
    ) -> Result<()> {
        request.validate()?;
        if self.transports.is_empty() {
            return Err(ServerError::NoAgents);
        }

        let request_id = RequestId::generate();
        log::info!(
            "request {request_id}: broadcasting {} to {} agent(s)",
            request.filename,
            self.transports.len()
        );

        // expected is frozen to the agents addressed right now
        let mut outcome_rx = self
            .coordinator
            .register(request_id.clone(), self.transports.len());
        let broadcast = FileRequest::from_search(request_id.clone(), request);
        for transport in &self.transports {
            if let Err(err) = transport.send_request(broadcast.clone()).await {
                let agent_id = transport.agent_id();
                log::warn!("request {request_id}: send to agent {agent_id} failed: {err}");
                self.coordinator
                    .record_error(&request_id, &agent_id, ErrorCode::Internal);
            }
        }

        let outcome = match tokio::time::timeout(self.config.deadline, &mut outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                self.coordinator.remove(&request_id);
                return Err(ServerError::Abandoned);
            }
            Err(_elapsed) => {
                self.coordinator.force_complete(&request_id);
                match outcome_rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        self.coordinator.remove(&request_id);
                        return Err(ServerError::Abandoned);
                    }
                }
            }
        };

        match outcome {
            Outcome::NotFound => {
                log::info!("request {request_id}: every agent reported absence or error");
                self.coordinator.remove(&request_id);
                Err(ServerError::NotFound)
            }
            Outcome::Complete { partials } => {
                log::info!("request {request_id}: merging {partials} partial file(s)");
                let options = MergeOptions::new(request.keyword.clone(), request.last);
                let merged = self
                    .coordinator
                    .resolve(&request_id, &self.merger, &options)
                    .await?;
                self.stream_and_cleanup(&merged, sink).await
            }
        }
    }

    /// Single-node path: sort/filter/cap a local file directly, no agents
    /// involved. Keyword and cap are applied by the merger here since no
    /// pushdown happened.
    pub async fn search_local<W: AsyncWrite + Unpin>(
        &self,
        request: &SearchRequest,
        sink: &mut W,
    ) -> Result<()> {
        request.validate()?;
        let path = self.config.read_dir.join(&request.filename);
        log::info!("local search of {}", path.display());

        if let Err(err) = tokio::fs::metadata(&path).await {
            return Err(match err.kind() {
                ErrorKind::NotFound => ServerError::NotFound,
                _ => ServerError::Io(err),
            });
        }

        let options = MergeOptions::new(request.keyword.clone(), request.last);
        let merged = self.merger.merge(&[path], &options).await?;
        self.stream_and_cleanup(&merged, sink).await
    }

    /// Stream the merged file to the caller, then delete it whether the
    /// transfer finished or failed. Cleanup failures are logged, never
    /// surfaced: a leaked temp file beats corrupting a finished response.
    async fn stream_and_cleanup<W: AsyncWrite + Unpin>(
        &self,
        merged: &Path,
        sink: &mut W,
    ) -> Result<()> {
        let transfer = async {
            let mut file = tokio::fs::File::open(merged).await?;
            tokio::io::copy(&mut file, sink).await?;
            sink.flush().await
        }
        .await;

        if let Err(err) = tokio::fs::remove_file(merged).await {
            log::warn!("could not remove merged file {}: {err}", merged.display());
        }

        transfer?;
        Ok(())
    }
}
