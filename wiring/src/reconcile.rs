//! One reconciliation pass: observe, diff, plan, execute, report.
//!
//! Nothing is carried between passes. Live chain state is the only durable
//! record, so a second pass over a converged graph plans nothing.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapter::Adapters;
use crate::diff::{diff, DiffResult};
use crate::execute::{Executor, Outcome, SkipReason};
use crate::graph::{BuildOptions, EdgeDecl, Graph, Node, ValidationError};
use crate::observe::{PartialObserveFailure, StateReader};
use crate::plan::{plan, Plan, PlanError};
use crate::report::{summarize, MissingOutcome, Report};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Chains read or written at the same time.
    pub max_concurrent_chains: usize,
    /// Deadline for each individual adapter call.
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub allow_self_pathways: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_chains: 8,
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            allow_self_pathways: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid topology: {0}")]
    Validation(#[from] ValidationError),
    #[error("planner invariant violated: {0}")]
    Planning(#[from] PlanError),
    #[error("incomplete pass: {0}")]
    Incomplete(#[from] MissingOutcome),
}

/// Result of observing and planning without submitting anything.
#[derive(Debug, Clone)]
pub struct PlannedPass {
    pub diff: DiffResult,
    pub plan: Plan,
    pub unobserved: Option<PartialObserveFailure>,
}

impl PlannedPass {
    /// Every edge was observed and none needs an operation.
    pub fn is_converged(&self) -> bool {
        self.plan.is_empty() && self.unobserved.is_none()
    }
}

pub struct Reconciler {
    adapters: Adapters,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(adapters: Adapters, config: ReconcilerConfig) -> Self {
        Self { adapters, config }
    }

    pub fn build_graph(
        &self,
        nodes: Vec<Node>,
        edges: Vec<EdgeDecl>,
    ) -> Result<Graph, ReconcileError> {
        let options = BuildOptions {
            allow_self_pathways: self.config.allow_self_pathways,
        };
        Ok(Graph::build(nodes, edges, options)?)
    }

    pub async fn plan_only(&self, graph: &Graph) -> Result<PlannedPass, ReconcileError> {
        let reader = StateReader::new(
            &self.adapters,
            self.config.call_timeout,
            self.config.max_concurrent_chains,
        );
        let observed = reader.observe(graph).await;
        let unobserved = observed.partial_failure();
        if let Some(failure) = &unobserved {
            warn!(nodes = failure.nodes.len(), "continuing with partial observation");
        }

        let diff = diff(graph, &observed);
        let plan = plan(graph, diff.pending())?;
        info!(
            edges = graph.edges().len(),
            pending = plan.len(),
            unobserved_edges = diff.unobserved.len(),
            "planned reconciliation pass"
        );
        Ok(PlannedPass {
            diff,
            plan,
            unobserved,
        })
    }

    /// Runs a full pass. `cancel` flipping to `true` stops further
    /// submissions; in-flight ones are awaited.
    pub async fn reconcile(
        &self,
        graph: &Graph,
        cancel: watch::Receiver<bool>,
    ) -> Result<Report, ReconcileError> {
        let planned = self.plan_only(graph).await?;

        let mut outcomes = BTreeMap::new();
        for delta in &planned.diff.deltas {
            if delta.delta.is_satisfied() {
                outcomes.insert(delta.edge, Outcome::Converged);
            }
        }
        for edge in &planned.diff.unobserved {
            outcomes.insert(*edge, Outcome::Skipped(SkipReason::Unobserved));
        }

        let execution = Executor::new(&self.adapters, cancel)
            .with_retry(self.config.retry.clone())
            .with_call_timeout(self.config.call_timeout)
            .with_max_concurrency(self.config.max_concurrent_chains)
            .execute(planned.plan)
            .await;
        outcomes.extend(execution.outcomes);

        let report = summarize(graph, &outcomes, execution.records)?;
        info!(
            total = report.total_edges,
            converged = report.converged,
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "reconciliation pass finished"
        );
        Ok(report)
    }
}
