use crate::agent::SearchAgent;
use crate::config::ServerConfig;
use crate::orchestrator::SearchOrchestrator;
use crate::transport::{AgentTransport, ResponseInbox};
use async_trait::async_trait;
use std::sync::Arc;
use tailsearch_protocol::{AgentError, AgentId, FileRequest};
use tokio::io::AsyncWriteExt;

/// In-process agent channel over `tokio::io::duplex`.
///
/// Gives a single binary the full distributed lifecycle, one agent per
/// shard directory: broadcast, per-agent filtering, partial spooling,
/// aggregation, merge. Also the transport the integration tests run on.
pub struct LoopbackTransport {
    agent: Arc<SearchAgent>,
    inbox: Arc<ResponseInbox>,
}

impl LoopbackTransport {
    pub fn new(agent: SearchAgent, inbox: Arc<ResponseInbox>) -> Self {
        Self {
            agent: Arc::new(agent),
            inbox,
        }
    }
}

#[async_trait]
impl AgentTransport for LoopbackTransport {
    fn agent_id(&self) -> AgentId {
        self.agent.id().clone()
    }

    async fn send_request(&self, request: FileRequest) -> std::io::Result<()> {
        let agent = Arc::clone(&self.agent);
        let inbox = Arc::clone(&self.inbox);
        tokio::spawn(async move {
            deliver(agent, inbox, request).await;
        });
        Ok(())
    }
}

async fn deliver(agent: Arc<SearchAgent>, inbox: Arc<ResponseInbox>, request: FileRequest) {
    match agent.open_stream(&request).await {
        Err(code) => {
            let error = AgentError {
                request_id: request.request_id.clone(),
                filename: request.filename.clone(),
                code,
            };
            inbox.accept_error(&error, agent.id());
        }
        Ok(mut stream) => {
            let (mut agent_end, primary_end) = tokio::io::duplex(16 * 1024);
            let write = async {
                let result = stream.write_to(&mut agent_end).await;
                // shutdown is the end-of-stream signal
                let _ = agent_end.shutdown().await;
                result
            };
            let accept = inbox.accept_stream(
                &request.request_id,
                agent.id(),
                &request.filename,
                primary_end,
            );
            let (written, ()) = tokio::join!(write, accept);
            if let Err(err) = written {
                log::warn!(
                    "agent {}: stream for request {} aborted: {err}",
                    agent.id(),
                    request.request_id
                );
            }
        }
    }
}

/// Wire one orchestrator to a set of agents entirely in-process.
pub fn loopback_cluster(
    config: ServerConfig,
    agents: impl IntoIterator<Item = SearchAgent>,
) -> SearchOrchestrator {
    let mut orchestrator = SearchOrchestrator::new(config);
    let inbox = orchestrator.inbox();
    for agent in agents {
        orchestrator.add_transport(Arc::new(LoopbackTransport::new(agent, Arc::clone(&inbox))));
    }
    orchestrator
}
