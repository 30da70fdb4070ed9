//! Transaction types and serialization.
//!
//! Transactions carry a timestamp in addition to the usual fields; the
//! proof-of-stake kernel depends on it, so it is part of the txid preimage.

use ember_consensus::money::Amount;
use ember_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

pub const TX_CURRENT_VERSION: i32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            prevout: OutPoint::consensus_decode(decoder)?,
            script_sig: decoder.read_var_bytes()?,
            sequence: decoder.read_u32_le()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// A pruned output: marked unspendable in place, as the legacy daemon
    /// does with `SetNull` (value -1, empty script).
    pub fn null() -> Self {
        Self {
            value: -1,
            script_pubkey: Vec::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.value == -1
    }

    /// Coinstake marker output: zero value, empty script, first in `vout`.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            value: decoder.read_i64_le()?,
            script_pubkey: decoder.read_var_bytes()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub time: u32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn txid(&self) -> Hash256 {
        sha256d(&crate::encoding::encode(self))
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    pub fn is_coinstake(&self) -> bool {
        self.vin.first().is_some_and(|input| !input.prevout.is_null())
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_u32_le(self.time);
        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.consensus_encode(encoder);
        }
        encoder.write_varint(self.vout.len() as u64);
        for output in &self.vout {
            output.consensus_encode(encoder);
        }
        encoder.write_u32_le(self.lock_time);
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let time = decoder.read_u32_le()?;

        let vin_len = decoder.read_varint()? as usize;
        let mut vin = Vec::with_capacity(vin_len);
        for _ in 0..vin_len {
            vin.push(TxIn::consensus_decode(decoder)?);
        }

        let vout_len = decoder.read_varint()? as usize;
        let mut vout = Vec::with_capacity(vout_len);
        for _ in 0..vout_len {
            vout.push(TxOut::consensus_decode(decoder)?);
        }

        let lock_time = decoder.read_u32_le()?;
        Ok(Self {
            version,
            time,
            vin,
            vout,
            lock_time,
        })
    }
}
