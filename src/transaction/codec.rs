//! RLP wire format of sharded transactions.
//!
//! ```text
//! unsigned:        [nonce, gasPrice, gasLimit, shardID, toShardID, to, value, data]
//! unsigned 155:    [... , chainId, 0, 0]
//! signed:          [... , v, r, s]          v = chainId * 2 + 35 + parity
//! ```
//!
//! Integers are big-endian with no leading zeros; zero is the empty string.
//! An empty `to` means contract creation.

use alloy::primitives::{Address, Bytes, U256};
use alloy_rlp::{Encodable, Header};

use crate::error::{SdkError, SdkResult};

/// The eight core fields of a sharded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxFields {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub shard_id: u32,
    pub to_shard_id: u32,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

/// What follows the core fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailer {
    None,
    /// EIP-155 signing payload: `[chainId, 0, 0]`.
    ChainId(u64),
    Signature { v: u64, r: U256, s: U256 },
}

impl Trailer {
    /// Chain id carried by the trailer, if any.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Trailer::None => None,
            Trailer::ChainId(id) => Some(*id),
            Trailer::Signature { v, .. } if *v >= 35 => Some((v - 35) / 2),
            Trailer::Signature { .. } => None,
        }
    }
}

/// EIP-155 `v` for a recovery parity.
pub fn eip155_v(chain_id: u64, parity: bool) -> SdkResult<u64> {
    chain_id
        .checked_mul(2)
        .and_then(|v| v.checked_add(35 + u64::from(parity)))
        .ok_or_else(|| SdkError::Malformed(format!("chain id {} is too large for EIP-155", chain_id)))
}

/// Recovery parity from `v` (EIP-155 or legacy 27/28).
pub fn parity_from_v(v: u64) -> SdkResult<bool> {
    match v {
        27 | 28 => Ok(v == 28),
        v if v >= 35 => Ok((v - 35) % 2 == 1),
        v => Err(SdkError::InvalidRawTransaction(format!("invalid v {}", v))),
    }
}

pub fn encode(fields: &TxFields, trailer: Trailer) -> Vec<u8> {
    let mut payload = Vec::new();
    encode_uint(U256::from(fields.nonce), &mut payload);
    encode_uint(fields.gas_price, &mut payload);
    encode_uint(fields.gas_limit, &mut payload);
    encode_uint(U256::from(fields.shard_id), &mut payload);
    encode_uint(U256::from(fields.to_shard_id), &mut payload);
    match &fields.to {
        Some(to) => to.as_slice().encode(&mut payload),
        None => (&[] as &[u8]).encode(&mut payload),
    }
    encode_uint(fields.value, &mut payload);
    fields.data.as_ref().encode(&mut payload);

    match trailer {
        Trailer::None => {}
        Trailer::ChainId(chain_id) => {
            encode_uint(U256::from(chain_id), &mut payload);
            encode_uint(U256::ZERO, &mut payload);
            encode_uint(U256::ZERO, &mut payload);
        }
        Trailer::Signature { v, r, s } => {
            encode_uint(U256::from(v), &mut payload);
            encode_uint(r, &mut payload);
            encode_uint(s, &mut payload);
        }
    }

    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

pub fn decode(raw: &[u8]) -> SdkResult<(TxFields, Trailer)> {
    let mut buf = raw;
    let header = Header::decode(&mut buf).map_err(invalid)?;
    if !header.list {
        return Err(SdkError::InvalidRawTransaction("not an RLP list".into()));
    }
    if buf.len() != header.payload_length {
        return Err(SdkError::InvalidRawTransaction("length mismatch".into()));
    }

    let mut items: Vec<&[u8]> = Vec::with_capacity(11);
    while !buf.is_empty() {
        items.push(Header::decode_bytes(&mut buf, false).map_err(invalid)?);
    }
    if items.len() != 8 && items.len() != 11 {
        return Err(SdkError::InvalidRawTransaction(format!(
            "expected 8 or 11 fields, got {}",
            items.len()
        )));
    }

    let to = match items[5].len() {
        0 => None,
        20 => Some(Address::from_slice(items[5])),
        n => {
            return Err(SdkError::InvalidRawTransaction(format!(
                "recipient must be 20 bytes, got {}",
                n
            )))
        }
    };

    let fields = TxFields {
        nonce: decode_u64(items[0])?,
        gas_price: decode_uint(items[1])?,
        gas_limit: decode_uint(items[2])?,
        shard_id: u32::try_from(decode_u64(items[3])?).map_err(|_| too_large("shardID"))?,
        to_shard_id: u32::try_from(decode_u64(items[4])?).map_err(|_| too_large("toShardID"))?,
        to,
        value: decode_uint(items[6])?,
        data: Bytes::copy_from_slice(items[7]),
    };

    if items.len() == 8 {
        return Ok((fields, Trailer::None));
    }

    let v = decode_u64(items[8])?;
    let r = decode_uint(items[9])?;
    let s = decode_uint(items[10])?;
    let trailer = if r.is_zero() && s.is_zero() {
        Trailer::ChainId(v)
    } else {
        Trailer::Signature { v, r, s }
    };
    Ok((fields, trailer))
}

fn encode_uint(value: U256, out: &mut Vec<u8>) {
    let bytes = value.to_be_bytes::<32>();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].encode(out);
}

fn decode_uint(bytes: &[u8]) -> SdkResult<U256> {
    if bytes.len() > 32 {
        return Err(too_large("integer"));
    }
    if bytes.first() == Some(&0) {
        return Err(SdkError::InvalidRawTransaction("integer has leading zero".into()));
    }
    Ok(U256::from_be_slice(bytes))
}

fn decode_u64(bytes: &[u8]) -> SdkResult<u64> {
    u64::try_from(decode_uint(bytes)?).map_err(|_| too_large("integer"))
}

fn invalid(e: alloy_rlp::Error) -> SdkError {
    SdkError::InvalidRawTransaction(e.to_string())
}

fn too_large(what: &str) -> SdkError {
    SdkError::InvalidRawTransaction(format!("{} out of range", what))
}
