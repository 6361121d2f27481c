use std::time::Duration;

use alloy::primitives::Address;
use tokio::sync::watch;

use wiring::adapter::AdapterError;
use wiring::diff::{diff, Delta};
use wiring::execute::{Outcome, SkipReason};
use wiring::fake::FakeChain;
use wiring::graph::BuildOptions;
use wiring::observe::ObservedState;
use wiring::plan::plan;
use wiring::retry::RetryPolicy;
use wiring::topology::{Topology, ARBSEP_V2_TESTNET, BASESEP_V2_TESTNET, SEPOLIA_V2_TESTNET};
use wiring::{
    EdgeDecl, EdgeId, Endpoint, Graph, Node, PathwaySettings, Reconciler,
    ReconcilerConfig, ValidationError,
};

const MESH: &str = r#"{
    "contracts": [
        { "contract": { "eid": "BASESEP_V2_TESTNET", "contractName": "MultiCall",
                        "address": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb" } },
        { "contract": { "eid": "SEPOLIA_V2_TESTNET", "contractName": "MultiCall",
                        "address": "0x5555555555555555555555555555555555555555" } },
        { "contract": { "eid": "ARBSEP_V2_TESTNET", "contractName": "MultiCall",
                        "address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" } }
    ],
    "connections": [
        { "from": { "eid": "BASESEP_V2_TESTNET", "contractName": "MultiCall" },
          "to":   { "eid": "SEPOLIA_V2_TESTNET", "contractName": "MultiCall" } },
        { "from": { "eid": "SEPOLIA_V2_TESTNET", "contractName": "MultiCall" },
          "to":   { "eid": "BASESEP_V2_TESTNET", "contractName": "MultiCall" } },
        { "from": { "eid": "SEPOLIA_V2_TESTNET", "contractName": "MultiCall" },
          "to":   { "eid": "ARBSEP_V2_TESTNET", "contractName": "MultiCall" } },
        { "from": { "eid": "ARBSEP_V2_TESTNET", "contractName": "MultiCall" },
          "to":   { "eid": "SEPOLIA_V2_TESTNET", "contractName": "MultiCall" } },
        { "from": { "eid": "BASESEP_V2_TESTNET", "contractName": "MultiCall" },
          "to":   { "eid": "ARBSEP_V2_TESTNET", "contractName": "MultiCall" } },
        { "from": { "eid": "ARBSEP_V2_TESTNET", "contractName": "MultiCall" },
          "to":   { "eid": "BASESEP_V2_TESTNET", "contractName": "MultiCall" } }
    ]
}"#;

struct Mesh {
    base: Endpoint,
    sepolia: Endpoint,
    arb: Endpoint,
}

fn mesh() -> Mesh {
    Mesh {
        base: Endpoint::new(BASESEP_V2_TESTNET, Address::repeat_byte(0xbb)),
        sepolia: Endpoint::new(SEPOLIA_V2_TESTNET, Address::repeat_byte(0x55)),
        arb: Endpoint::new(ARBSEP_V2_TESTNET, Address::repeat_byte(0xaa)),
    }
}

fn config() -> ReconcilerConfig {
    ReconcilerConfig {
        max_concurrent_chains: 4,
        call_timeout: Duration::from_secs(1),
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
        allow_self_pathways: false,
    }
}

fn reconciler(fake: &FakeChain) -> Reconciler {
    let adapters = fake.adapters([BASESEP_V2_TESTNET, SEPOLIA_V2_TESTNET, ARBSEP_V2_TESTNET]);
    Reconciler::new(adapters, config())
}

fn mesh_graph(reconciler: &Reconciler) -> Graph {
    let (nodes, edges) = Topology::from_json(MESH)
        .unwrap()
        .into_declarations()
        .unwrap();
    reconciler.build_graph(nodes, edges).unwrap()
}

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn half_wired_mesh_plans_only_the_missing_pathways() {
    let m = mesh();
    let fake = FakeChain::new();
    fake.set_peer(m.sepolia, m.base, PathwaySettings::default());
    fake.set_peer(m.sepolia, m.arb, PathwaySettings::default());
    let reconciler = reconciler(&fake);
    let graph = mesh_graph(&reconciler);

    let planned = reconciler.plan_only(&graph).await.unwrap();

    let mut pairs: Vec<_> = planned.plan.operations().map(|op| (op.local, op.peer)).collect();
    pairs.sort();
    let mut expected = vec![
        (m.base, m.sepolia),
        (m.base, m.arb),
        (m.arb, m.sepolia),
        (m.arb, m.base),
    ];
    expected.sort();
    assert_eq!(pairs, expected);
    assert!(planned
        .plan
        .operations()
        .all(|op| op.local.chain != SEPOLIA_V2_TESTNET));
    assert!(fake.submissions().is_empty());
}

#[tokio::test]
async fn converged_mesh_stays_converged() {
    let m = mesh();
    let fake = FakeChain::new();
    let reconciler = reconciler(&fake);
    let graph = mesh_graph(&reconciler);

    let first = reconciler.reconcile(&graph, no_cancel()).await.unwrap();
    assert!(first.is_converged());
    assert_eq!(first.converged, 6);
    assert_eq!(first.operations.len(), 6);
    assert!(fake.peer(&m.arb, &m.base).is_some());

    let second = reconciler.plan_only(&graph).await.unwrap();
    assert!(second.plan.is_empty());
    assert!(second.is_converged());

    let third = reconciler.reconcile(&graph, no_cancel()).await.unwrap();
    assert!(third.is_converged());
    assert!(third.operations.is_empty());
    assert_eq!(fake.submissions().len(), 6);
}

#[tokio::test]
async fn unreadable_chain_skips_only_its_outbound_edges() {
    let m = mesh();
    let fake = FakeChain::new();
    fake.fail_reads(m.sepolia, AdapterError::ChainUnavailable("rpc down".into()));
    let reconciler = reconciler(&fake);
    let graph = mesh_graph(&reconciler);

    let report = reconciler.reconcile(&graph, no_cancel()).await.unwrap();

    assert_eq!(report.total_edges, 6);
    assert_eq!(report.edges.len(), 6);
    assert_eq!(report.converged, 4);
    assert!(report.failed.is_empty());
    assert!(report.is_success());
    assert!(!report.is_converged());
    let skipped: Vec<_> = report.skipped.iter().map(|s| (s.from, s.to, s.reason)).collect();
    assert_eq!(
        skipped,
        vec![
            (m.sepolia, m.base, SkipReason::Unobserved),
            (m.sepolia, m.arb, SkipReason::Unobserved),
        ]
    );
}

#[tokio::test]
async fn underpriced_beyond_budget_fails_only_that_chain() {
    let m = mesh();
    let fake = FakeChain::new();
    fake.script_submit(
        m.base,
        m.sepolia,
        vec![AdapterError::Underpriced("fee".into()); 3],
    );
    let reconciler = reconciler(&fake);
    let graph = mesh_graph(&reconciler);

    let report = reconciler.reconcile(&graph, no_cancel()).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].edge, EdgeId(0));
    assert!(matches!(report.failed[0].reason, AdapterError::Underpriced(_)));
    // base -> arb queued behind the failure on the same chain
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].edge, EdgeId(4));
    assert_eq!(report.skipped[0].reason, SkipReason::ChainAborted);
    assert_eq!(report.converged, 4);

    let record = report
        .operations
        .iter()
        .find(|r| r.from == m.base && r.to == m.sepolia)
        .unwrap();
    assert_eq!(record.retries, 2);
}

#[tokio::test]
async fn mismatched_settings_are_updated() {
    let m = mesh();
    let fake = FakeChain::new();
    let desired = PathwaySettings {
        enforced_gas: Some(200_000),
        confirmations: Some(2),
        ..Default::default()
    };
    fake.set_peer(
        m.base,
        m.sepolia,
        PathwaySettings {
            enforced_gas: Some(80_000),
            confirmations: Some(2),
            ..Default::default()
        },
    );
    let adapters = fake.adapters([BASESEP_V2_TESTNET]);
    let reconciler = Reconciler::new(adapters, config());
    let graph = reconciler
        .build_graph(
            vec![Node::new(m.base, "MultiCall"), Node::new(m.sepolia, "MultiCall")],
            vec![EdgeDecl::new(m.base, m.sepolia).with_settings(desired.clone())],
        )
        .unwrap();

    let report = reconciler.reconcile(&graph, no_cancel()).await.unwrap();

    assert!(report.is_converged());
    assert_eq!(report.operations[0].action.to_string(), "update(enforcedGas)");
    assert_eq!(fake.peer(&m.base, &m.sepolia), Some(desired));
}

#[tokio::test]
async fn cancelled_before_start_submits_nothing() {
    let fake = FakeChain::new();
    let reconciler = reconciler(&fake);
    let graph = mesh_graph(&reconciler);
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = reconciler.reconcile(&graph, rx).await.unwrap();

    assert!(fake.submissions().is_empty());
    assert_eq!(report.skipped.len(), 6);
    assert!(report
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::Cancelled));
    assert!(report.is_success());
}

#[test]
fn converged_observation_plans_nothing() {
    let m = mesh();
    let reconciler = reconciler(&FakeChain::new());
    let graph = mesh_graph(&reconciler);

    let mut observed = ObservedState::default();
    for node in [m.base, m.sepolia, m.arb] {
        observed.record(
            node,
            graph
                .outbound(&node)
                .map(|e| (e.to, e.settings.clone()))
                .collect(),
        );
    }

    let result = diff(&graph, &observed);
    assert!(result.deltas.iter().all(|d| d.delta == Delta::Satisfied));
    assert!(plan(&graph, result.pending()).unwrap().is_empty());
}

#[test]
fn repeated_connection_is_rejected() {
    let m = mesh();
    let err = Graph::build(
        vec![Node::new(m.base, "MultiCall"), Node::new(m.arb, "MultiCall")],
        vec![EdgeDecl::new(m.base, m.arb), EdgeDecl::new(m.base, m.arb)],
        BuildOptions::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ValidationError::DuplicateEdge {
            from: m.base,
            to: m.arb
        }
    );
}

#[tokio::test]
async fn chain_without_adapter_is_skipped_not_failed() {
    let m = mesh();
    let fake = FakeChain::new();
    let adapters = fake.adapters([BASESEP_V2_TESTNET, SEPOLIA_V2_TESTNET]);
    let reconciler = Reconciler::new(adapters, config());
    let graph = mesh_graph(&reconciler);

    let report = reconciler.reconcile(&graph, no_cancel()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().all(|s| s.from == m.arb));
    assert!(report
        .edges
        .iter()
        .filter(|e| e.from.chain != ARBSEP_V2_TESTNET)
        .all(|e| e.outcome == Outcome::Converged));
}

#[tokio::test(start_paused = true)]
async fn slow_chain_times_out_without_holding_back_the_rest() {
    let m = mesh();
    let fake = FakeChain::new();
    fake.set_read_delay(m.arb, Duration::from_secs(60));
    let reconciler = reconciler(&fake);
    let graph = mesh_graph(&reconciler);

    let report = reconciler.reconcile(&graph, no_cancel()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.converged, 4);
    let skipped: Vec<_> = report.skipped.iter().map(|s| (s.edge, s.reason)).collect();
    assert_eq!(
        skipped,
        vec![
            (EdgeId(3), SkipReason::Unobserved),
            (EdgeId(5), SkipReason::Unobserved),
        ]
    );
    assert!(fake.submissions().iter().all(|(from, _)| *from != m.arb));
}

#[tokio::test]
async fn recovered_chain_converges_on_the_next_pass() {
    let m = mesh();
    let fake = FakeChain::new();
    fake.fail_reads(m.sepolia, AdapterError::ChainUnavailable("rpc down".into()));
    let reconciler = reconciler(&fake);
    let graph = mesh_graph(&reconciler);

    let first = reconciler.reconcile(&graph, no_cancel()).await.unwrap();
    assert_eq!(first.skipped.len(), 2);

    fake.clear_read_failures();
    let second = reconciler.reconcile(&graph, no_cancel()).await.unwrap();

    assert!(second.is_converged());
    assert_eq!(second.operations.len(), 2);
    assert!(second.operations.iter().all(|r| r.from == m.sepolia));
}
