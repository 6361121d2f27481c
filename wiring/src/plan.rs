//! Turns pending deltas into per-chain operation queues.
//!
//! Registering a peer on one chain never depends on the peer's own
//! registration, so chains carry no ordering between each other. Within a
//! chain, operations keep declaration order.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::diff::{Delta, EdgeDelta};
use crate::graph::{ChainId, EdgeId, Endpoint, Graph};
use crate::settings::{PathwaySettings, SettingField};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "fields", rename_all = "camelCase")]
pub enum Action {
    Register,
    Update(Vec<SettingField>),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Register => f.write_str("register"),
            Action::Update(fields) => {
                f.write_str("update(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// One configuration change on one chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub local: Endpoint,
    pub peer: Endpoint,
    pub settings: PathwaySettings,
    pub action: Action,
    /// Declared edges this operation converges.
    pub edges: Vec<EdgeId>,
}

impl Operation {
    pub fn chain(&self) -> ChainId {
        self.local.chain
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainPlan {
    pub chain: ChainId,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    chains: Vec<ChainPlan>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Total number of operations across chains.
    pub fn len(&self) -> usize {
        self.chains.iter().map(|c| c.operations.len()).sum()
    }

    pub fn chains(&self) -> &[ChainPlan] {
        &self.chains
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.chains.iter().flat_map(|c| c.operations.iter())
    }

    pub fn into_chains(self) -> Vec<ChainPlan> {
        self.chains
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("delta refers to edge {0} which is not in the graph")]
    UnknownEdge(EdgeId),
}

pub fn plan<'a>(
    graph: &Graph,
    deltas: impl IntoIterator<Item = &'a EdgeDelta>,
) -> Result<Plan, PlanError> {
    let mut groups: BTreeMap<ChainId, Vec<Operation>> = BTreeMap::new();

    for delta in deltas {
        let action = match &delta.delta {
            Delta::Satisfied => continue,
            Delta::Missing => Action::Register,
            Delta::Mismatched(fields) => Action::Update(fields.clone()),
        };
        let edge = graph
            .edge(delta.edge)
            .ok_or(PlanError::UnknownEdge(delta.edge))?;

        let queue = groups.entry(edge.from.chain).or_default();
        match queue
            .iter_mut()
            .find(|op| op.local == edge.from && op.peer == edge.to)
        {
            // repeated declaration: the later one wins
            Some(op) => {
                op.settings = delta.desired.clone();
                op.action = action;
                op.edges.push(edge.id);
            }
            None => queue.push(Operation {
                local: edge.from,
                peer: edge.to,
                settings: delta.desired.clone(),
                action,
                edges: vec![edge.id],
            }),
        }
    }

    Ok(Plan {
        chains: groups
            .into_iter()
            .map(|(chain, operations)| ChainPlan { chain, operations })
            .collect(),
    })
}
