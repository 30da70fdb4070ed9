//! Synchronized checkpoints.
//!
//! A sync checkpoint is a block hash signed by the network's checkpoint
//! key. Depending on the configured mode it either hard-excludes chains
//! that do not pass through it (strict) or is merely recorded (advisory,
//! permissive). Checkpoints only ever move forward in height.

use std::fmt;

use ember_consensus::{hash256_to_hex, CheckpointMode, ConsensusParams, Hash256};
use ember_primitives::encoding::{
    decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder,
};
use ember_primitives::hash::sha256d;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::entry::EntryId;
use crate::index::ChainIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    /// Signature does not verify against the trusted checkpoint key.
    BadSignature,
    /// The message payload is not a valid checkpoint message.
    BadMessage(DecodeError),
    /// Checkpoints only move forward; the named block is below the current
    /// checkpoint height.
    CheckpointTooOld,
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::BadSignature => write!(f, "checkpoint signature invalid"),
            CheckpointError::BadMessage(err) => write!(f, "malformed checkpoint message: {err}"),
            CheckpointError::CheckpointTooOld => {
                write!(f, "checkpoint older than the current checkpoint")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

pub const CHECKPOINT_MESSAGE_VERSION: i32 = 1;

/// Payload of a signed checkpoint broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckpointMessage {
    pub version: i32,
    pub hash: Hash256,
}

impl Encodable for CheckpointMessage {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_hash_le(&self.hash);
    }
}

impl Decodable for CheckpointMessage {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            hash: decoder.read_hash_le()?,
        })
    }
}

/// Serialized checkpoint message plus a DER signature over its sha256d.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedCheckpoint {
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Sign a checkpoint message; the checkpoint-master path.
pub fn sign_checkpoint(
    message: &CheckpointMessage,
    secret_key: &SecretKey,
) -> SignedCheckpoint {
    let secp = Secp256k1::signing_only();
    let data = encode(message);
    let digest = Message::from_digest(sha256d(&data));
    let signature = secp.sign_ecdsa(&digest, secret_key);
    SignedCheckpoint {
        data,
        signature: signature.serialize_der().to_vec(),
    }
}

/// Whether a verified checkpoint took effect immediately or is waiting for
/// its block to be registered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckpointApplied {
    Accepted,
    Pending,
}

pub struct CheckpointPolicy {
    mode: CheckpointMode,
    trusted_key: Option<PublicKey>,
    sync_checkpoint: Option<Hash256>,
    /// Verified checkpoint whose block the index has not seen yet.
    pending: Option<Hash256>,
}

impl CheckpointPolicy {
    pub fn from_params(params: &ConsensusParams) -> Self {
        let trusted_key = decode_hex(params.checkpoint_public_key)
            .and_then(|bytes| PublicKey::from_slice(&bytes).ok());
        if trusted_key.is_none() {
            ember_log::log_error!(
                "checkpoint public key is not a valid secp256k1 key; all checkpoints will be rejected"
            );
        }
        Self {
            mode: params.checkpoint_mode,
            trusted_key,
            sync_checkpoint: None,
            pending: None,
        }
    }

    pub fn mode(&self) -> CheckpointMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CheckpointMode) {
        self.mode = mode;
    }

    pub fn sync_checkpoint(&self) -> Option<Hash256> {
        self.sync_checkpoint
    }

    pub fn pending(&self) -> Option<Hash256> {
        self.pending
    }

    /// Verify and apply a signed checkpoint. A verified checkpoint for a
    /// block the index does not hold yet is parked and promoted when the
    /// block registers. Failure leaves prior state untouched.
    pub fn apply(
        &mut self,
        msg: &SignedCheckpoint,
        index: &ChainIndex,
    ) -> Result<CheckpointApplied, CheckpointError> {
        let Some(trusted_key) = self.trusted_key.as_ref() else {
            return Err(CheckpointError::BadSignature);
        };

        let secp = Secp256k1::verification_only();
        let digest = Message::from_digest(sha256d(&msg.data));
        let signature =
            Signature::from_der(&msg.signature).map_err(|_| CheckpointError::BadSignature)?;
        secp.verify_ecdsa(&digest, &signature, trusted_key)
            .map_err(|_| CheckpointError::BadSignature)?;

        let message: CheckpointMessage =
            decode(&msg.data).map_err(CheckpointError::BadMessage)?;

        let Some(id) = index.find_by_hash(&message.hash) else {
            ember_log::log_info!(
                "sync checkpoint {} not yet indexed, holding as pending",
                hash256_to_hex(&message.hash)
            );
            self.pending = Some(message.hash);
            return Ok(CheckpointApplied::Pending);
        };

        self.accept(index, id, message.hash)?;
        Ok(CheckpointApplied::Accepted)
    }

    /// Called after every registration; promotes a pending checkpoint once
    /// its block shows up.
    pub fn notice_registered(&mut self, index: &ChainIndex, hash: &Hash256) {
        if self.pending != Some(*hash) {
            return;
        }
        let Some(id) = index.find_by_hash(hash) else {
            return;
        };
        self.pending = None;
        if let Err(err) = self.accept(index, id, *hash) {
            ember_log::log_warn!(
                "dropping pending sync checkpoint {}: {err}",
                hash256_to_hex(hash)
            );
        }
    }

    fn accept(
        &mut self,
        index: &ChainIndex,
        id: EntryId,
        hash: Hash256,
    ) -> Result<(), CheckpointError> {
        if let Some(current) = self.sync_checkpoint {
            if let Some(current_id) = index.find_by_hash(&current) {
                if index.entry(id).height < index.entry(current_id).height {
                    return Err(CheckpointError::CheckpointTooOld);
                }
            }
        }
        self.sync_checkpoint = Some(hash);
        ember_log::log_info!(
            "sync checkpoint accepted: {} height={}",
            hash256_to_hex(&hash),
            index.entry(id).height
        );
        Ok(())
    }

    /// Whether an entry's chain passes through the sync checkpoint.
    ///
    /// With no checkpoint (bootstrap) everything is compliant. Above the
    /// checkpoint height the entry's ancestor at that height must be the
    /// checkpoint; at or below, the entry itself must lie on the
    /// checkpoint's ancestry.
    pub fn is_compliant(&self, index: &ChainIndex, id: EntryId) -> bool {
        let Some(checkpoint_hash) = self.sync_checkpoint else {
            return true;
        };
        let Some(checkpoint_id) = index.find_by_hash(&checkpoint_hash) else {
            return true;
        };

        let entry_height = index.entry(id).height;
        let checkpoint_height = index.entry(checkpoint_id).height;
        if entry_height >= checkpoint_height {
            index.ancestor_at_height(id, checkpoint_height) == Some(checkpoint_id)
        } else {
            index.ancestor_at_height(checkpoint_id, entry_height) == Some(id)
        }
    }

    /// Display-only verification-progress estimate in [0, 1], derived from
    /// tip time against the wall clock. Never used for consensus decisions.
    pub fn verification_progress(
        &self,
        index: &ChainIndex,
        genesis_time: u32,
        now_unix: i64,
    ) -> f64 {
        let Some(tip) = index.best_entry() else {
            return 0.0;
        };
        let span = now_unix - genesis_time as i64;
        if span <= 0 {
            return 1.0;
        }
        let covered = tip.time as i64 - genesis_time as i64;
        (covered as f64 / span as f64).clamp(0.0, 1.0)
    }
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(input.len() / 2);
    for i in (0..input.len()).step_by(2) {
        out.push(u8::from_str_radix(input.get(i..i + 2)?, 16).ok()?);
    }
    Some(out)
}
