//! Primary- and agent-side request lifecycle.
//!
//! [`SearchOrchestrator`] receives a validated [`SearchRequest`], broadcasts
//! it to every known agent transport, waits for the aggregation to
//! complete, merges the collected partials, and streams the final output to
//! the caller. [`SearchAgent`] is the other side: it resolves the file in
//! its local shard and streams back a filtered, capped partial result.
//!
//! The concrete wire between the two is abstracted as [`AgentTransport`]
//! plus the [`ResponseInbox`] fan-in entry points; [`loopback`] wires both
//! in-process for single-binary clusters and tests.
//!
//! [`SearchRequest`]: tailsearch_protocol::SearchRequest

pub mod agent;
pub mod config;
pub mod error;
pub mod loopback;
pub mod orchestrator;
pub mod transport;

pub use agent::{AgentStream, SearchAgent};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use loopback::{loopback_cluster, LoopbackTransport};
pub use orchestrator::SearchOrchestrator;
pub use transport::{AgentTransport, ResponseInbox};
