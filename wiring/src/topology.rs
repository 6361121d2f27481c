//! Topology document loader.
//!
//! The document mirrors an OApp omni-graph: a list of `contracts` (one per
//! chain) and a list of directed `connections` between them. Connection
//! points name a contract by `eid` and `contractName`; they are resolved
//! against the declared contracts to produce graph declarations.
//!
//! ```json
//! {
//!   "contracts": [
//!     { "contract": { "eid": "BASESEP_V2_TESTNET", "contractName": "MultiCall",
//!                     "address": "0x..." } }
//!   ],
//!   "connections": [
//!     { "from": { "eid": 40245, "contractName": "MultiCall" },
//!       "to":   { "eid": 40161, "contractName": "MultiCall" },
//!       "config": { "enforcedGas": 200000, "confirmations": 1 } }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use alloy::primitives::Address;
use serde::Deserialize;
use thiserror::Error;

use crate::graph::{ChainId, EdgeDecl, Endpoint, Node};
use crate::settings::PathwaySettings;

// ============================================================================
// Well-known endpoint ids
// ============================================================================

pub const SEPOLIA_V2_TESTNET: ChainId = ChainId(40161);
pub const ARBITRUM_V2_TESTNET: ChainId = ChainId(40143);
pub const ARBSEP_V2_TESTNET: ChainId = ChainId(40231);
pub const BASESEP_V2_TESTNET: ChainId = ChainId(40245);

const KNOWN_EIDS: &[(&str, ChainId)] = &[
    ("SEPOLIA_V2_TESTNET", SEPOLIA_V2_TESTNET),
    ("ARBITRUM_V2_TESTNET", ARBITRUM_V2_TESTNET),
    ("ARBSEP_V2_TESTNET", ARBSEP_V2_TESTNET),
    ("BASESEP_V2_TESTNET", BASESEP_V2_TESTNET),
];

pub fn eid_by_name(name: &str) -> Option<ChainId> {
    KNOWN_EIDS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, eid)| *eid)
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("reading topology: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing topology: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown endpoint id name {0:?}")]
    UnknownEid(String),
    #[error("no contract {contract_name:?} declared on chain {eid}")]
    UnresolvedPoint { eid: ChainId, contract_name: String },
    #[error("contract {contract_name:?} on chain {eid} is ambiguous; give its address")]
    AmbiguousPoint { eid: ChainId, contract_name: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EidRef {
    Id(u32),
    Name(String),
}

impl EidRef {
    fn resolve(&self) -> Result<ChainId, TopologyError> {
        match self {
            EidRef::Id(id) => Ok(ChainId(*id)),
            EidRef::Name(name) => {
                eid_by_name(name).ok_or_else(|| TopologyError::UnknownEid(name.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Point {
    eid: EidRef,
    contract_name: String,
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContractEntry {
    contract: Point,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Connection {
    from: Point,
    to: Point,
    #[serde(default)]
    config: PathwaySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    contracts: Vec<ContractEntry>,
    #[serde(default)]
    connections: Vec<Connection>,
}

impl Topology {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, TopologyError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Resolves every connection point and returns graph declarations in
    /// document order. Validation of the result is left to `Graph::build`.
    pub fn into_declarations(self) -> Result<(Vec<Node>, Vec<EdgeDecl>), TopologyError> {
        let mut nodes = Vec::with_capacity(self.contracts.len());
        for entry in self.contracts {
            let eid = entry.contract.eid.resolve()?;
            let address = entry.contract.address.ok_or_else(|| TopologyError::UnresolvedPoint {
                eid,
                contract_name: entry.contract.contract_name.clone(),
            })?;
            nodes.push(Node {
                endpoint: Endpoint::new(eid, address),
                contract_name: entry.contract.contract_name,
                init: entry.config,
            });
        }

        let mut edges = Vec::with_capacity(self.connections.len());
        for connection in self.connections {
            let from = resolve(&nodes, &connection.from)?;
            let to = resolve(&nodes, &connection.to)?;
            edges.push(EdgeDecl::new(from, to).with_settings(connection.config));
        }
        Ok((nodes, edges))
    }
}

fn resolve(nodes: &[Node], point: &Point) -> Result<Endpoint, TopologyError> {
    let eid = point.eid.resolve()?;
    let mut matches = nodes.iter().filter(|node| {
        node.endpoint.chain == eid
            && node.contract_name == point.contract_name
            && point.address.map_or(true, |a| a == node.endpoint.address)
    });
    let found = matches.next().ok_or_else(|| TopologyError::UnresolvedPoint {
        eid,
        contract_name: point.contract_name.clone(),
    })?;
    if matches.next().is_some() {
        return Err(TopologyError::AmbiguousPoint {
            eid,
            contract_name: point.contract_name.clone(),
        });
    }
    Ok(found.endpoint)
}
