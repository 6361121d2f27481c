//! `ChainAdapter` for EVM chains running LayerZero-V2-style OApps.

use std::marker::PhantomData;

use alloy::{
    contract::Error as ContractError,
    network::Ethereum,
    primitives::{Address, Bytes, FixedBytes},
    providers::{PendingTransactionError, Provider},
    sol_types::SolValue,
    transports::{RpcError, Transport, TransportError},
};
use async_trait::async_trait;

use crate::adapter::{AdapterError, ChainAdapter, PeerSnapshot, TxResult};
use crate::bindings::{
    ILayerZeroEndpointV2, IOApp, UlnConfig, MSG_TYPE_SEND, NIL_DVN_COUNT, ULN_CONFIG_TYPE,
};
use crate::graph::{ChainId, Endpoint};
use crate::options;
use crate::settings::{PathwaySettings, SettingField};

pub struct EvmAdapter<P, T> {
    provider: P,
    _phantom: PhantomData<fn() -> T>,
}

impl<P, T> EvmAdapter<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    /// `provider` must be able to sign for the OApp owner / delegate.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            _phantom: PhantomData,
        }
    }

    async fn read_snapshot(
        &self,
        local: &Endpoint,
        remotes: &[ChainId],
    ) -> eyre::Result<PeerSnapshot> {
        let oapp = IOApp::new(local.address, &self.provider);
        let mut snapshot = PeerSnapshot::new();
        for remote in remotes {
            let peer = oapp.peers(remote.0).call().await?._0;
            if peer == FixedBytes::ZERO {
                continue;
            }
            let (raw_options, _, uln) = self.read_pathway(local, *remote).await?;
            snapshot.insert(
                Endpoint::new(*remote, Address::from_word(peer)),
                current_settings(&raw_options, &uln)?,
            );
        }
        Ok(snapshot)
    }

    /// Enforced options, send library and effective ULN config for
    /// `local -> remote`.
    async fn read_pathway(
        &self,
        local: &Endpoint,
        remote: ChainId,
    ) -> eyre::Result<(Bytes, Address, UlnConfig)> {
        let oapp = IOApp::new(local.address, &self.provider);
        let raw_options = oapp.enforcedOptions(remote.0, MSG_TYPE_SEND).call().await?._0;

        let endpoint_address = oapp.endpoint().call().await?._0;
        let endpoint = ILayerZeroEndpointV2::new(endpoint_address, &self.provider);
        let lib = endpoint
            .getSendLibrary(local.address, remote.0)
            .call()
            .await?
            .lib;
        let raw = endpoint
            .getConfig(local.address, lib, remote.0, ULN_CONFIG_TYPE)
            .call()
            .await?
            .config;
        let uln = <UlnConfig as SolValue>::abi_decode(&raw, true)?;
        Ok((raw_options, lib, uln))
    }

    async fn apply(
        &self,
        local: &Endpoint,
        peer: &Endpoint,
        desired: &PathwaySettings,
    ) -> eyre::Result<Option<FixedBytes<32>>> {
        let oapp = IOApp::new(local.address, &self.provider);
        let peer_word = peer.address.into_word();
        let registered = oapp.peers(peer.chain.0).call().await?._0 == peer_word;
        let (raw_options, lib, uln) = self.read_pathway(local, peer.chain).await?;
        let writes = Writes::needed(registered, &current_settings(&raw_options, &uln)?, desired);

        let mut last_tx = None;
        if writes.peer {
            let pending = oapp.setPeer(peer.chain.0, peer_word).send().await?;
            last_tx = Some(*pending.tx_hash());
        }

        if let Some(gas) = writes.enforced_gas {
            let params = vec![IOApp::EnforcedOptionParam {
                eid: peer.chain.0,
                msgType: MSG_TYPE_SEND,
                options: options::lz_receive(gas),
            }];
            let pending = oapp.setEnforcedOptions(params).send().await?;
            last_tx = Some(*pending.tx_hash());
        }

        if writes.uln {
            let uln = overlay_uln(uln, desired)?;
            let oapp_endpoint = oapp.endpoint().call().await?._0;
            let endpoint = ILayerZeroEndpointV2::new(oapp_endpoint, &self.provider);
            let params = vec![ILayerZeroEndpointV2::SetConfigParam {
                eid: peer.chain.0,
                configType: ULN_CONFIG_TYPE,
                config: uln.abi_encode().into(),
            }];
            let pending = endpoint.setConfig(local.address, lib, params).send().await?;
            last_tx = Some(*pending.tx_hash());
        }

        Ok(last_tx)
    }
}

#[async_trait]
impl<P, T> ChainAdapter for EvmAdapter<P, T>
where
    P: Provider<T, Ethereum> + Send + Sync + 'static,
    T: Transport + Clone + 'static,
{
    async fn read_peer_config(
        &self,
        local: &Endpoint,
        remote_chains: &[ChainId],
    ) -> Result<PeerSnapshot, AdapterError> {
        self.read_snapshot(local, remote_chains).await.map_err(classify)
    }

    async fn submit_config_change(
        &self,
        local: &Endpoint,
        peer: &Endpoint,
        desired: &PathwaySettings,
    ) -> Result<TxResult, AdapterError> {
        let tx_hash = self.apply(local, peer, desired).await.map_err(classify)?;
        Ok(TxResult { tx_hash })
    }
}

fn current_settings(raw_options: &[u8], uln: &UlnConfig) -> eyre::Result<PathwaySettings> {
    Ok(PathwaySettings {
        enforced_gas: options::lz_receive_gas(raw_options)?,
        confirmations: Some(uln.confirmations),
        required_dvns: Some(uln.requiredDVNs.clone()),
    })
}

/// Transactions one pathway needs. Each is sent only when what it writes
/// differs on chain, so a retry after partial acceptance resends only the
/// remainder.
#[derive(Debug, Default, PartialEq, Eq)]
struct Writes {
    peer: bool,
    enforced_gas: Option<u128>,
    uln: bool,
}

impl Writes {
    fn needed(registered: bool, current: &PathwaySettings, desired: &PathwaySettings) -> Self {
        let drift = desired.drift(current);
        Writes {
            peer: !registered,
            enforced_gas: desired
                .enforced_gas
                .filter(|_| drift.contains(&SettingField::EnforcedGas)),
            uln: drift
                .iter()
                .any(|f| matches!(f, SettingField::Confirmations | SettingField::RequiredDvns)),
        }
    }
}

/// Lays the declared fields over the effective config read from the library.
fn overlay_uln(mut uln: UlnConfig, desired: &PathwaySettings) -> eyre::Result<UlnConfig> {
    if let Some(confirmations) = desired.confirmations {
        uln.confirmations = confirmations;
    }
    if let Some(dvns) = &desired.required_dvns {
        // the library expects a sorted, duplicate-free set
        let mut dvns = dvns.clone();
        dvns.sort();
        dvns.dedup();
        uln.requiredDVNs = dvns;
    }
    // a zero count would fall back to the default verifiers
    uln.requiredDVNCount = if uln.requiredDVNs.is_empty() {
        NIL_DVN_COUNT
    } else {
        u8::try_from(uln.requiredDVNs.len())?
    };
    Ok(uln)
}

/// JSON-RPC code for a reverted call or gas estimate.
const EXECUTION_REVERTED: i64 = 3;
/// JSON-RPC code for a rate-limited request.
const LIMIT_EXCEEDED: i64 = -32005;

/// Maps a provider / contract error onto the adapter taxonomy.
///
/// Anything that is not an RPC error (ABI decoding, malformed options) is
/// `Unknown`.
pub fn classify(err: eyre::Report) -> AdapterError {
    let message = err
        .chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ");

    match rpc_error(&err) {
        Some(RpcError::ErrorResp(payload)) => {
            // nodes report underpricing as a generic -32000 with a message
            let reason = payload.message.to_lowercase();
            if ["underpriced", "fee too low", "less than block base fee"]
                .iter()
                .any(|needle| reason.contains(needle))
            {
                AdapterError::Underpriced(message)
            } else if payload.code == EXECUTION_REVERTED || reason.contains("revert") {
                AdapterError::Rejected(message)
            } else if payload.code == LIMIT_EXCEEDED {
                AdapterError::ChainUnavailable(message)
            } else {
                AdapterError::Unknown(message)
            }
        }
        Some(RpcError::Transport(_)) | Some(RpcError::NullResp) => {
            AdapterError::ChainUnavailable(message)
        }
        _ => AdapterError::Unknown(message),
    }
}

fn rpc_error(err: &eyre::Report) -> Option<&TransportError> {
    err.chain().find_map(|cause| {
        if let Some(rpc) = cause.downcast_ref::<TransportError>() {
            return Some(rpc);
        }
        match cause.downcast_ref::<ContractError>()? {
            ContractError::TransportError(rpc)
            | ContractError::PendingTransactionError(PendingTransactionError::TransportError(rpc)) => {
                Some(rpc)
            }
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::TransportErrorKind;
    use eyre::eyre;

    fn node_error(code: i64, message: &'static str) -> eyre::Report {
        let payload = ErrorPayload {
            code,
            message: message.into(),
            data: None,
        };
        eyre::Report::new(ContractError::TransportError(TransportError::ErrorResp(payload)))
    }

    fn uln(confirmations: u64, dvns: Vec<Address>) -> UlnConfig {
        UlnConfig {
            confirmations,
            requiredDVNCount: dvns.len() as u8,
            optionalDVNCount: 0,
            optionalDVNThreshold: 0,
            requiredDVNs: dvns,
            optionalDVNs: Vec::new(),
        }
    }

    #[test]
    fn classifies_node_responses() {
        assert!(matches!(
            classify(node_error(-32000, "replacement transaction underpriced")),
            AdapterError::Underpriced(_)
        ));
        assert!(matches!(
            classify(node_error(-32000, "max fee per gas less than block base fee")),
            AdapterError::Underpriced(_)
        ));
        assert!(matches!(
            classify(node_error(EXECUTION_REVERTED, "execution reverted: OnlyOwner")),
            AdapterError::Rejected(_)
        ));
        assert!(matches!(
            classify(node_error(LIMIT_EXCEEDED, "rate limited")),
            AdapterError::ChainUnavailable(_)
        ));
        assert!(matches!(
            classify(node_error(-32000, "nonce too high")),
            AdapterError::Unknown(_)
        ));
    }

    #[test]
    fn transport_failures_are_unavailable() {
        let err = eyre::Report::new::<TransportError>(TransportError::Transport(TransportErrorKind::BackendGone));
        assert!(matches!(classify(err), AdapterError::ChainUnavailable(_)));
    }

    #[test]
    fn untyped_errors_are_unknown() {
        // the words alone do not make it an rpc error
        assert!(matches!(
            classify(eyre!("execution reverted, connection reset")),
            AdapterError::Unknown(_)
        ));
    }

    #[test]
    fn keeps_the_whole_cause_chain() {
        let err = node_error(EXECUTION_REVERTED, "execution reverted").wrap_err("setPeer");
        match classify(err) {
            AdapterError::Rejected(message) => {
                assert!(message.starts_with("setPeer: "));
                assert!(message.contains("execution reverted"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_drifted_fields_are_written() {
        let current = PathwaySettings {
            enforced_gas: Some(200_000),
            confirmations: Some(1),
            required_dvns: Some(vec![Address::repeat_byte(1)]),
        };
        let desired = PathwaySettings {
            enforced_gas: Some(200_000),
            confirmations: Some(2),
            ..Default::default()
        };

        assert_eq!(
            Writes::needed(true, &current, &desired),
            Writes {
                peer: false,
                enforced_gas: None,
                uln: true,
            }
        );
    }

    #[test]
    fn unregistered_peer_with_matching_settings_needs_only_set_peer() {
        let current = PathwaySettings {
            enforced_gas: Some(80_000),
            confirmations: Some(15),
            required_dvns: Some(Vec::new()),
        };
        let desired = PathwaySettings {
            enforced_gas: Some(80_000),
            ..Default::default()
        };

        assert_eq!(
            Writes::needed(false, &current, &desired),
            Writes {
                peer: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn drifted_gas_is_rewritten() {
        let current = PathwaySettings {
            enforced_gas: None,
            ..Default::default()
        };
        let desired = PathwaySettings {
            enforced_gas: Some(120_000),
            ..Default::default()
        };

        let writes = Writes::needed(true, &current, &desired);
        assert_eq!(writes.enforced_gas, Some(120_000));
        assert!(!writes.uln);
    }

    #[test]
    fn declared_fields_overlay_the_effective_config() {
        let (x, y) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let desired = PathwaySettings {
            required_dvns: Some(vec![y, x, y]),
            ..Default::default()
        };

        let written = overlay_uln(uln(15, vec![x]), &desired).unwrap();

        assert_eq!(written.confirmations, 15);
        assert_eq!(written.requiredDVNs, vec![x, y]);
        assert_eq!(written.requiredDVNCount, 2);
    }

    #[test]
    fn empty_verifier_set_is_written_as_nil() {
        let desired = PathwaySettings {
            required_dvns: Some(Vec::new()),
            ..Default::default()
        };

        let written = overlay_uln(uln(15, vec![Address::repeat_byte(1)]), &desired).unwrap();

        assert!(written.requiredDVNs.is_empty());
        assert_eq!(written.requiredDVNCount, NIL_DVN_COUNT);
    }
}
