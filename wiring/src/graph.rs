//! Desired pathway topology: endpoints, nodes and directed edges.
//!
//! A [`Graph`] is built once per run from already-loaded declarations and is
//! read-only afterwards. Every later stage refers to edges by [`EdgeId`], the
//! edge's position in declaration order.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::PathwaySettings;

/// Messaging endpoint id of a chain (LayerZero `eid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u32);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deployed messaging contract on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub chain: ChainId,
    pub address: Address,
}

impl Endpoint {
    pub const fn new(chain: ChainId, address: Address) -> Self {
        Self { chain, address }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub endpoint: Endpoint,
    pub contract_name: String,
    /// Constructor / initializer parameters, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<serde_json::Value>,
}

impl Node {
    pub fn new(endpoint: Endpoint, contract_name: impl Into<String>) -> Self {
        Self {
            endpoint,
            contract_name: contract_name.into(),
            init: None,
        }
    }
}

/// An edge as declared, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDecl {
    pub from: Endpoint,
    pub to: Endpoint,
    pub settings: PathwaySettings,
}

impl EdgeDecl {
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self {
            from,
            to,
            settings: PathwaySettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PathwaySettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Position of an edge in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub usize);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: Endpoint,
    pub to: Endpoint,
    pub settings: PathwaySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("endpoint {0} is declared by more than one node")]
    DuplicateNode(Endpoint),
    #[error("edge {edge} references undeclared endpoint {endpoint}")]
    UnknownEndpoint { edge: EdgeId, endpoint: Endpoint },
    #[error("pathway {from} -> {to} is declared more than once")]
    DuplicateEdge { from: Endpoint, to: Endpoint },
    #[error("pathway from {0} to itself is not permitted")]
    SelfLoop(Endpoint),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub allow_self_pathways: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<Endpoint, Node>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Validates the declarations and builds the graph.
    ///
    /// Rules are applied one at a time over the whole input, so the first
    /// rule that fails determines the error: duplicate nodes, unknown
    /// endpoints, duplicate edges, then self-loops.
    pub fn build(
        nodes: Vec<Node>,
        edges: Vec<EdgeDecl>,
        options: BuildOptions,
    ) -> Result<Self, ValidationError> {
        let mut node_map = BTreeMap::new();
        for node in nodes {
            let endpoint = node.endpoint;
            if node_map.insert(endpoint, node).is_some() {
                return Err(ValidationError::DuplicateNode(endpoint));
            }
        }

        for (idx, decl) in edges.iter().enumerate() {
            for endpoint in [decl.from, decl.to] {
                if !node_map.contains_key(&endpoint) {
                    return Err(ValidationError::UnknownEndpoint {
                        edge: EdgeId(idx),
                        endpoint,
                    });
                }
            }
        }

        let mut seen = HashSet::with_capacity(edges.len());
        for decl in &edges {
            if !seen.insert((decl.from, decl.to)) {
                return Err(ValidationError::DuplicateEdge {
                    from: decl.from,
                    to: decl.to,
                });
            }
        }

        if !options.allow_self_pathways {
            if let Some(decl) = edges.iter().find(|d| d.from == d.to) {
                return Err(ValidationError::SelfLoop(decl.from));
            }
        }

        let edges = edges
            .into_iter()
            .enumerate()
            .map(|(idx, decl)| Edge {
                id: EdgeId(idx),
                from: decl.from,
                to: decl.to,
                settings: decl.settings,
            })
            .collect();

        Ok(Self {
            nodes: node_map,
            edges,
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edges in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0)
    }

    pub fn outbound<'a>(&'a self, local: &'a Endpoint) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == *local)
    }

    /// Endpoints that are the `from` side of at least one edge.
    pub fn sources(&self) -> BTreeSet<Endpoint> {
        self.edges.iter().map(|e| e.from).collect()
    }
}
