//! Declarative cross-chain pathway wiring.
//!
//! A topology of OApp endpoints and directed pathways is converged onto live
//! chains by a plain control loop:
//!
//! ```text
//! Graph::build -> StateReader::observe -> diff -> plan -> Executor::execute -> summarize
//! ```
//!
//! Each chain is reached only through a [`adapter::ChainAdapter`]; retry,
//! timeout and cancellation policy live in the executor.

pub mod adapter;
pub mod bindings;
pub mod chain;
pub mod diff;
pub mod evm;
pub mod execute;
pub mod fake;
pub mod graph;
pub mod observe;
pub mod options;
pub mod plan;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod settings;
pub mod topology;

pub use adapter::{AdapterError, Adapters, ChainAdapter};
pub use graph::{ChainId, Edge, EdgeDecl, EdgeId, Endpoint, Graph, Node, ValidationError};
pub use reconcile::{Reconciler, ReconcilerConfig};
pub use report::Report;
pub use settings::PathwaySettings;
