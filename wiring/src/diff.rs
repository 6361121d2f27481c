use serde::Serialize;

use crate::graph::{EdgeId, Graph};
use crate::observe::ObservedState;
use crate::settings::{PathwaySettings, SettingField};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "fields", rename_all = "camelCase")]
pub enum Delta {
    /// The peer is not registered at all.
    Missing,
    /// Registered, but these declared fields differ.
    Mismatched(Vec<SettingField>),
    Satisfied,
}

impl Delta {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Delta::Satisfied)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDelta {
    pub edge: EdgeId,
    pub delta: Delta,
    pub desired: PathwaySettings,
}

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    /// One entry per observed edge, in declaration order.
    pub deltas: Vec<EdgeDelta>,
    /// Edges whose `from` node could not be observed.
    pub unobserved: Vec<EdgeId>,
}

impl DiffResult {
    pub fn pending(&self) -> impl Iterator<Item = &EdgeDelta> {
        self.deltas.iter().filter(|d| !d.delta.is_satisfied())
    }
}

/// Classifies every edge against the observed peers of its `from` node.
pub fn diff(graph: &Graph, observed: &ObservedState) -> DiffResult {
    let mut result = DiffResult::default();
    for edge in graph.edges() {
        let Some(peers) = observed.peers_of(&edge.from) else {
            result.unobserved.push(edge.id);
            continue;
        };
        let delta = match peers.get(&edge.to) {
            None => Delta::Missing,
            Some(current) => {
                let fields = edge.settings.drift(current);
                if fields.is_empty() {
                    Delta::Satisfied
                } else {
                    Delta::Mismatched(fields)
                }
            }
        };
        result.deltas.push(EdgeDelta {
            edge: edge.id,
            delta,
            desired: edge.settings.clone(),
        });
    }
    result
}
