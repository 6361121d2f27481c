//! Plan executor.
//!
//! One worker per chain, chains in parallel. A worker submits its queue
//! strictly in order and stops at the first terminal failure; the rest of
//! that chain's queue is skipped while other chains carry on.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::adapter::{AdapterError, Adapters};
use crate::graph::{ChainId, EdgeId, Endpoint};
use crate::plan::{Action, ChainPlan, Operation, Plan};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// The `from` node's configuration could not be read.
    Unobserved,
    /// The run was cancelled before the operation started.
    Cancelled,
    /// An earlier operation on the same chain failed.
    ChainAborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::Unobserved => "node could not be observed",
            SkipReason::Cancelled => "run cancelled",
            SkipReason::ChainAborted => "earlier operation on this chain failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum Outcome {
    Converged,
    Failed(AdapterError),
    Skipped(SkipReason),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Converged => f.write_str("converged"),
            Outcome::Failed(err) => write!(f, "failed: {err}"),
            Outcome::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

/// What happened to one planned operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub chain: ChainId,
    pub from: Endpoint,
    pub to: Endpoint,
    pub action: Action,
    pub outcome: Outcome,
    pub timestamp_ms: u64,
    pub retries: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub outcomes: BTreeMap<EdgeId, Outcome>,
    pub records: Vec<OperationRecord>,
}

impl Execution {
    fn absorb(&mut self, other: Execution) {
        self.outcomes.extend(other.outcomes);
        self.records.extend(other.records);
    }

    fn finish(&mut self, op: &Operation, outcome: Outcome, retries: u32) {
        let record = OperationRecord {
            chain: op.chain(),
            from: op.local,
            to: op.peer,
            action: op.action.clone(),
            outcome: outcome.clone(),
            timestamp_ms: now_ms(),
            retries,
        };
        match &record.outcome {
            Outcome::Converged => info!(
                chain = %record.chain,
                from = %record.from,
                to = %record.to,
                action = %record.action,
                retries,
                "pathway converged"
            ),
            other => warn!(
                chain = %record.chain,
                from = %record.from,
                to = %record.to,
                action = %record.action,
                outcome = %other,
                retries,
                "pathway not converged"
            ),
        }
        for edge in &op.edges {
            self.outcomes.insert(*edge, outcome.clone());
        }
        self.records.push(record);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct Executor<'a> {
    adapters: &'a Adapters,
    cancel: watch::Receiver<bool>,
    retry: RetryPolicy,
    call_timeout: Duration,
    max_concurrency: usize,
}

impl<'a> Executor<'a> {
    pub fn new(adapters: &'a Adapters, cancel: watch::Receiver<bool>) -> Self {
        Self {
            adapters,
            cancel,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
            max_concurrency: 8,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub async fn execute(&self, plan: Plan) -> Execution {
        let runs: Vec<Execution> = stream::iter(plan.into_chains())
            .map(|chain_plan| self.run_chain(chain_plan))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut execution = Execution::default();
        for run in runs {
            execution.absorb(run);
        }
        execution
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn run_chain(&self, chain_plan: ChainPlan) -> Execution {
        debug!(
            chain = %chain_plan.chain,
            operations = chain_plan.operations.len(),
            "chain worker started"
        );
        let mut run = Execution::default();
        let mut halted = None;

        for op in &chain_plan.operations {
            if halted.is_none() && self.is_cancelled() {
                halted = Some(SkipReason::Cancelled);
            }
            if let Some(reason) = halted {
                run.finish(op, Outcome::Skipped(reason), 0);
                continue;
            }

            let (outcome, retries) = self.apply(op).await;
            halted = match &outcome {
                Outcome::Converged => None,
                Outcome::Failed(_) => Some(SkipReason::ChainAborted),
                Outcome::Skipped(reason) => Some(*reason),
            };
            run.finish(op, outcome, retries);
        }
        run
    }

    /// Submits one operation, retrying transient errors within budget.
    async fn apply(&self, op: &Operation) -> (Outcome, u32) {
        let adapter = match self.adapters.get(op.chain()) {
            Ok(adapter) => adapter,
            Err(err) => return (Outcome::Failed(err), 0),
        };

        let mut retries = 0;
        loop {
            let result = timeout(
                self.call_timeout,
                adapter.submit_config_change(&op.local, &op.peer, &op.settings),
            )
            .await
            .unwrap_or(Err(AdapterError::Timeout));

            match result {
                Ok(tx) => {
                    debug!(from = %op.local, to = %op.peer, tx = ?tx.tx_hash, "change accepted");
                    return (Outcome::Converged, retries);
                }
                Err(err) if err.is_transient() && self.retry.should_retry(retries) => {
                    let delay = self.retry.delay(retries);
                    retries += 1;
                    warn!(
                        from = %op.local,
                        to = %op.peer,
                        error = %err,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "transient submit failure, backing off"
                    );
                    if self.backoff(delay).await {
                        return (Outcome::Skipped(SkipReason::Cancelled), retries);
                    }
                }
                Err(err) => return (Outcome::Failed(err), retries),
            }
        }
    }

    /// Sleeps for `delay`; returns `true` if cancelled first.
    async fn backoff(&self, delay: Duration) -> bool {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            _ = sleep(delay) => false,
            Ok(_) = cancel.wait_for(|stop| *stop) => true,
        }
    }
}
