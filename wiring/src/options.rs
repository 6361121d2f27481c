//! Type-3 executor options codec.
//!
//! Layout: `u16 type (=3)` followed by options, each
//! `u8 worker | u16 size | u8 option_type | payload`, where `size` counts the
//! option type byte plus the payload. Only the executor's `lzReceive` option
//! is interpreted here.

use alloy::primitives::Bytes;
use eyre::{bail, ensure};

const TYPE_3: u16 = 3;
const EXECUTOR_WORKER_ID: u8 = 1;
const OPTION_TYPE_LZRECEIVE: u8 = 1;

/// Options carrying a single `lzReceive` gas limit.
pub fn lz_receive(gas: u128) -> Bytes {
    let mut out = Vec::with_capacity(22);
    out.extend_from_slice(&TYPE_3.to_be_bytes());
    out.push(EXECUTOR_WORKER_ID);
    out.extend_from_slice(&17u16.to_be_bytes());
    out.push(OPTION_TYPE_LZRECEIVE);
    out.extend_from_slice(&gas.to_be_bytes());
    out.into()
}

/// Gas of the first executor `lzReceive` option, `None` if there is none.
pub fn lz_receive_gas(options: &[u8]) -> eyre::Result<Option<u128>> {
    if options.is_empty() {
        return Ok(None);
    }
    ensure!(options.len() >= 2, "options truncated");
    let kind = u16::from_be_bytes([options[0], options[1]]);
    ensure!(kind == TYPE_3, "unsupported options type {kind}");

    let mut rest = &options[2..];
    while !rest.is_empty() {
        if rest.len() < 4 {
            bail!("option header truncated");
        }
        let worker = rest[0];
        let size = u16::from_be_bytes([rest[1], rest[2]]) as usize;
        ensure!(size >= 1 && rest.len() >= 3 + size, "option body truncated");
        let option_type = rest[3];
        let payload = &rest[4..3 + size];

        if worker == EXECUTOR_WORKER_ID && option_type == OPTION_TYPE_LZRECEIVE {
            ensure!(payload.len() >= 16, "lzReceive option too short");
            let mut gas = [0u8; 16];
            gas.copy_from_slice(&payload[..16]);
            return Ok(Some(u128::from_be_bytes(gas)));
        }
        rest = &rest[3 + size..];
    }
    Ok(None)
}
