//! Fan-in bookkeeping for distributed search requests.
//!
//! One [`AggregationCoordinator`] owns the request-id → aggregation-state
//! registry. A request is registered at broadcast time with the number of
//! agents addressed at that instant; every agent response (success or
//! error) is counted, and completion fires exactly once per request id no
//! matter how arrivals interleave. Once complete, [`resolve`] merges the
//! collected partial files and tears the request down.
//!
//! [`resolve`]: AggregationCoordinator::resolve

pub mod error;

pub use error::{CoordinatorError, Result};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tailsearch_merge::{MergeOptions, ResultMerger};
use tailsearch_protocol::{AgentId, ErrorCode, RequestId};
use tokio::sync::oneshot;

/// One agent's locally filtered search output, held until the merge
/// consumes it.
#[derive(Debug, Clone)]
pub struct PartialFile {
    pub path: PathBuf,
    pub agent_id: AgentId,
}

/// How an aggregation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// At least one agent produced a partial file.
    Complete { partials: usize },
    /// Every agent reported absence or an error.
    NotFound,
}

struct AggregationState {
    expected: usize,
    received: usize,
    partials: Vec<PartialFile>,
    completed: bool,
    notify: Option<oneshot::Sender<Outcome>>,
}

impl AggregationState {
    /// Flip to completed and hand back the notifier. Must only be called
    /// while holding the registry lock; returns `None` if already fired.
    fn complete(&mut self) -> Option<(oneshot::Sender<Outcome>, Outcome)> {
        if self.completed {
            return None;
        }
        self.completed = true;
        let outcome = if self.partials.is_empty() {
            Outcome::NotFound
        } else {
            Outcome::Complete {
                partials: self.partials.len(),
            }
        };
        self.notify.take().map(|sender| (sender, outcome))
    }
}

/// Registry of in-flight distributed requests.
///
/// Response counting and the completion check run as one uninterrupted
/// step under a plain mutex that is never held across an await point, so
/// two back-to-back responses can never both observe the completion
/// threshold.
#[derive(Default)]
pub struct AggregationCoordinator {
    requests: Mutex<HashMap<RequestId, AggregationState>>,
}

impl AggregationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request at broadcast time. `expected` is fixed to the
    /// number of agents addressed at this instant and never re-read from
    /// any live connection set.
    pub fn register(&self, request_id: RequestId, expected: usize) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let state = AggregationState {
            expected,
            received: 0,
            partials: Vec::new(),
            completed: false,
            notify: Some(tx),
        };
        let mut requests = lock(&self.requests);
        if requests.insert(request_id.clone(), state).is_some() {
            log::warn!("request {request_id} registered twice, dropping previous state");
        }
        rx
    }

    /// Record one agent's partial file.
    pub fn record_success(&self, request_id: &RequestId, partial: PartialFile) {
        log::debug!(
            "request {request_id}: partial from agent {} at {}",
            partial.agent_id,
            partial.path.display()
        );
        self.record(request_id, Some(partial));
    }

    /// Record one agent's error reply. Errors count toward completion but
    /// never contribute merge input, and never fail a request that has at
    /// least one successful agent.
    pub fn record_error(&self, request_id: &RequestId, agent_id: &AgentId, code: ErrorCode) {
        log::warn!("request {request_id}: agent {agent_id} reported {code}");
        self.record(request_id, None);
    }

    fn record(&self, request_id: &RequestId, partial: Option<PartialFile>) {
        let fired = {
            let mut requests = lock(&self.requests);
            let Some(state) = requests.get_mut(request_id) else {
                log::warn!("response for unknown request {request_id}, dropping");
                discard_partial(partial);
                return;
            };
            if state.completed {
                log::debug!("late response for completed request {request_id}, dropping");
                discard_partial(partial);
                return;
            }
            state.received += 1;
            if let Some(partial) = partial {
                state.partials.push(partial);
            }
            if state.received == state.expected {
                state.complete()
            } else {
                None
            }
        };
        if let Some((sender, outcome)) = fired {
            // receiver may have been dropped by a caller that gave up
            let _ = sender.send(outcome);
        }
    }

    /// Deadline path: complete now with whatever partials have arrived,
    /// guaranteeing termination even if an agent never answers.
    pub fn force_complete(&self, request_id: &RequestId) {
        let fired = {
            let mut requests = lock(&self.requests);
            match requests.get_mut(request_id) {
                Some(state) if !state.completed => {
                    let missing = state.expected - state.received;
                    if missing > 0 {
                        log::warn!(
                            "request {request_id}: forcing completion with {missing} agent(s) unanswered"
                        );
                    }
                    state.complete()
                }
                _ => None,
            }
        };
        if let Some((sender, outcome)) = fired {
            let _ = sender.send(outcome);
        }
    }

    /// Merge the collected partials into one ordered output, delete the
    /// consumed partial files, and remove the registry entry.
    ///
    /// Taking the state out of the registry first makes a second resolve
    /// for the same id fail with `UnknownRequest`, so the merger runs at
    /// most once per request. Partial files are deleted on this one code
    /// path whether or not the merge succeeded; deletion failures are
    /// logged, never surfaced.
    pub async fn resolve(
        &self,
        request_id: &RequestId,
        merger: &ResultMerger,
        options: &MergeOptions,
    ) -> Result<PathBuf> {
        let partials = {
            let mut requests = lock(&self.requests);
            let state = requests
                .remove(request_id)
                .ok_or_else(|| CoordinatorError::UnknownRequest(request_id.clone()))?;
            state.partials
        };

        let inputs: Vec<PathBuf> = partials.iter().map(|p| p.path.clone()).collect();
        let merged = merger.merge(&inputs, options).await;

        for partial in &partials {
            if let Err(err) = tokio::fs::remove_file(&partial.path).await {
                log::warn!(
                    "could not remove partial file {}: {err}",
                    partial.path.display()
                );
            }
        }

        Ok(merged?)
    }

    /// Drop a request that will not be resolved (not-found or abandoned).
    pub fn remove(&self, request_id: &RequestId) {
        lock(&self.requests).remove(request_id);
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.requests).len()
    }
}

/// A dropped response still owns a spooled file; unlink it so every
/// partial is deleted exactly once, dropped or consumed.
fn discard_partial(partial: Option<PartialFile>) {
    let Some(partial) = partial else {
        return;
    };
    if let Err(err) = std::fs::remove_file(&partial.path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::warn!(
                "could not remove dropped partial {}: {err}",
                partial.path.display()
            );
        }
    }
}

fn lock(
    requests: &Mutex<HashMap<RequestId, AggregationState>>,
) -> std::sync::MutexGuard<'_, HashMap<RequestId, AggregationState>> {
    requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(agent: &str) -> PartialFile {
        PartialFile {
            path: PathBuf::from(format!("/tmp/{agent}.part")),
            agent_id: AgentId::new(agent),
        }
    }

    #[tokio::test]
    async fn completes_once_all_agents_answer() {
        let coordinator = AggregationCoordinator::new();
        let id = RequestId::generate();
        let rx = coordinator.register(id.clone(), 2);

        coordinator.record_success(&id, partial("a"));
        coordinator.record_success(&id, partial("b"));

        assert_eq!(rx.await.expect("outcome"), Outcome::Complete { partials: 2 });
    }

    #[tokio::test]
    async fn errors_count_toward_completion_but_not_merge_input() {
        let coordinator = AggregationCoordinator::new();
        let id = RequestId::generate();
        let rx = coordinator.register(id.clone(), 3);

        coordinator.record_error(&id, &AgentId::new("a"), ErrorCode::NotFound);
        coordinator.record_success(&id, partial("b"));
        coordinator.record_error(&id, &AgentId::new("c"), ErrorCode::Internal);

        assert_eq!(rx.await.expect("outcome"), Outcome::Complete { partials: 1 });
    }

    #[tokio::test]
    async fn not_found_fires_iff_no_agent_succeeded() {
        let coordinator = AggregationCoordinator::new();
        let id = RequestId::generate();
        let rx = coordinator.register(id.clone(), 2);

        coordinator.record_error(&id, &AgentId::new("a"), ErrorCode::NotFound);
        coordinator.record_error(&id, &AgentId::new("b"), ErrorCode::NotFound);

        assert_eq!(rx.await.expect("outcome"), Outcome::NotFound);
    }

    #[tokio::test]
    async fn completion_fires_exactly_once_under_interleaving() {
        // Fan many concurrent responses at one request; the oneshot would
        // panic the sender side if completion tried to fire twice, and the
        // outcome must count every successful agent exactly once.
        let coordinator = std::sync::Arc::new(AggregationCoordinator::new());
        let id = RequestId::generate();
        let rx = coordinator.register(id.clone(), 16);

        let mut handles = Vec::new();
        for i in 0..16 {
            let coordinator = std::sync::Arc::clone(&coordinator);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                coordinator.record_success(&id, partial(&format!("agent-{i}")));
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        assert_eq!(
            rx.await.expect("outcome"),
            Outcome::Complete { partials: 16 }
        );
    }

    #[tokio::test]
    async fn late_responses_after_completion_are_dropped() {
        let coordinator = AggregationCoordinator::new();
        let id = RequestId::generate();
        let rx = coordinator.register(id.clone(), 1);

        coordinator.record_success(&id, partial("a"));
        // arrives after the threshold; must not disturb completed state
        coordinator.record_success(&id, partial("straggler"));

        assert_eq!(rx.await.expect("outcome"), Outcome::Complete { partials: 1 });
    }

    #[tokio::test]
    async fn force_complete_terminates_a_stalled_request() {
        let coordinator = AggregationCoordinator::new();
        let id = RequestId::generate();
        let rx = coordinator.register(id.clone(), 3);

        coordinator.record_success(&id, partial("a"));
        coordinator.force_complete(&id);

        assert_eq!(rx.await.expect("outcome"), Outcome::Complete { partials: 1 });
    }

    #[tokio::test]
    async fn force_complete_with_nothing_received_is_not_found() {
        let coordinator = AggregationCoordinator::new();
        let id = RequestId::generate();
        let rx = coordinator.register(id.clone(), 2);

        coordinator.force_complete(&id);

        assert_eq!(rx.await.expect("outcome"), Outcome::NotFound);
    }

    #[tokio::test]
    async fn unknown_request_responses_are_ignored() {
        let coordinator = AggregationCoordinator::new();
        let id = RequestId::generate();
        coordinator.record_success(&id, partial("a"));
        assert_eq!(coordinator.in_flight(), 0);
    }
}
