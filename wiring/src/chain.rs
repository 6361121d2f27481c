use std::str::FromStr;
use std::sync::Arc;

use alloy::{
    network::EthereumWallet,
    providers::ProviderBuilder,
    signers::local::PrivateKeySigner,
    transports::http::{reqwest::Url, Client, Http},
};
use eyre::{eyre, WrapErr};
use tracing::info;

use crate::adapter::{Adapters, ChainAdapter};
use crate::evm::EvmAdapter;
use crate::graph::ChainId;
use crate::topology::eid_by_name;

/// RPC endpoint for one chain, given on the command line as `EID=URL`,
/// where `EID` is numeric or a well-known name.
#[derive(Debug, Clone)]
pub struct ChainRpc {
    pub chain: ChainId,
    pub url: Url,
}

impl FromStr for ChainRpc {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (eid, url) = s
            .split_once('=')
            .ok_or_else(|| eyre!("expected EID=URL, got {s:?}"))?;
        let chain = match eid.parse::<u32>() {
            Ok(id) => ChainId(id),
            Err(_) => eid_by_name(eid).ok_or_else(|| eyre!("unknown endpoint id {eid:?}"))?,
        };
        let url = url.parse().wrap_err_with(|| format!("invalid rpc url for {eid}"))?;
        Ok(Self { chain, url })
    }
}

/// One EVM adapter per configured chain. Without a signer the adapters can
/// read but every submission is rejected by the node.
pub fn connect(rpcs: &[ChainRpc], signer: Option<PrivateKeySigner>) -> Adapters {
    let mut adapters = Adapters::new();
    for rpc in rpcs {
        let adapter: Arc<dyn ChainAdapter> = match &signer {
            Some(signer) => {
                let wallet = EthereumWallet::from(signer.clone());
                let provider = ProviderBuilder::new()
                    .with_recommended_fillers()
                    .wallet(wallet)
                    .on_http(rpc.url.clone());
                Arc::new(EvmAdapter::<_, Http<Client>>::new(provider))
            }
            None => {
                let provider = ProviderBuilder::new().on_http(rpc.url.clone());
                Arc::new(EvmAdapter::<_, Http<Client>>::new(provider))
            }
        };
        info!(chain = %rpc.chain, url = %rpc.url, signing = signer.is_some(), "connected chain");
        adapters.insert(rpc.chain, adapter);
    }
    adapters
}
