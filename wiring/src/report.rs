use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::adapter::AdapterError;
use crate::execute::{OperationRecord, Outcome, SkipReason};
use crate::graph::{EdgeId, Endpoint, Graph};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeReport {
    pub edge: EdgeId,
    pub from: Endpoint,
    pub to: Endpoint,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEdge {
    pub edge: EdgeId,
    pub from: Endpoint,
    pub to: Endpoint,
    pub reason: AdapterError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEdge {
    pub edge: EdgeId,
    pub from: Endpoint,
    pub to: Endpoint,
    pub reason: SkipReason,
}

/// Final disposition of every declared edge after one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub total_edges: usize,
    pub converged: usize,
    pub failed: Vec<FailedEdge>,
    pub skipped: Vec<SkippedEdge>,
    pub edges: Vec<EdgeReport>,
    pub operations: Vec<OperationRecord>,
}

impl Report {
    /// Nothing failed. Skipped edges do not count as failures.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_converged(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// A declared edge reached the report with no outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no outcome recorded for edge {0}")]
pub struct MissingOutcome(pub EdgeId);

/// Builds the report in declaration order. Every edge of `graph` needs an
/// entry in `outcomes`, satisfied ones included.
pub fn summarize(
    graph: &Graph,
    outcomes: &BTreeMap<EdgeId, Outcome>,
    operations: Vec<OperationRecord>,
) -> Result<Report, MissingOutcome> {
    let mut report = Report {
        total_edges: graph.edges().len(),
        operations,
        ..Report::default()
    };
    for edge in graph.edges() {
        let outcome = outcomes
            .get(&edge.id)
            .cloned()
            .ok_or(MissingOutcome(edge.id))?;
        match &outcome {
            Outcome::Converged => report.converged += 1,
            Outcome::Failed(reason) => report.failed.push(FailedEdge {
                edge: edge.id,
                from: edge.from,
                to: edge.to,
                reason: reason.clone(),
            }),
            Outcome::Skipped(reason) => report.skipped.push(SkippedEdge {
                edge: edge.id,
                from: edge.from,
                to: edge.to,
                reason: *reason,
            }),
        }
        report.edges.push(EdgeReport {
            edge: edge.id,
            from: edge.from,
            to: edge.to,
            outcome,
        });
    }
    Ok(report)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_converged() {
            "converged"
        } else if self.is_success() {
            "partial"
        } else {
            "failed"
        };
        writeln!(
            f,
            "{status}: {}/{} pathways converged, {} failed, {} skipped",
            self.converged,
            self.total_edges,
            self.failed.len(),
            self.skipped.len()
        )?;
        for edge in &self.edges {
            writeln!(f, "  {} {} -> {}: {}", edge.edge, edge.from, edge.to, edge.outcome)?;
        }
        Ok(())
    }
}
