//! Block index and best-chain selection.

use std::collections::HashMap;
use std::fmt;

use ember_consensus::{hash256_to_hex, CheckpointMode, Hash256};
use ember_primitives::block::{BlockHeader, BlockKind};

use crate::checkpoints::CheckpointPolicy;
use crate::entry::{BlockIndexEntry, EntryId, EntryScore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The parent hash is not indexed; the caller must register ancestors
    /// first.
    OrphanBlock(Hash256),
    /// The hash is already indexed.
    DuplicateBlock(Hash256),
    /// A second genesis (zero parent hash) was offered.
    UnexpectedGenesis(Hash256),
    /// `score` was called twice on the same entry.
    AlreadyScored(Hash256),
    /// A scored field was requested from, or a child scored on top of, an
    /// unscored entry.
    NotScored(Hash256),
    /// No entry with this hash.
    UnknownBlock(Hash256),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::OrphanBlock(hash) => {
                write!(f, "orphan block, unknown parent {}", hash256_to_hex(hash))
            }
            ChainError::DuplicateBlock(hash) => {
                write!(f, "block {} already indexed", hash256_to_hex(hash))
            }
            ChainError::UnexpectedGenesis(hash) => {
                write!(f, "second genesis block {}", hash256_to_hex(hash))
            }
            ChainError::AlreadyScored(hash) => {
                write!(f, "block {} already scored", hash256_to_hex(hash))
            }
            ChainError::NotScored(hash) => {
                write!(f, "block {} not yet scored", hash256_to_hex(hash))
            }
            ChainError::UnknownBlock(hash) => {
                write!(f, "unknown block {}", hash256_to_hex(hash))
            }
        }
    }
}

impl std::error::Error for ChainError {}

/// Entries that left and entered the main chain during a reorganization,
/// ordered tip-down (disconnected) and fork-out (connected).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReorgOutcome {
    pub disconnected: Vec<Hash256>,
    pub connected: Vec<Hash256>,
}

impl ReorgOutcome {
    pub fn is_noop(&self) -> bool {
        self.disconnected.is_empty() && self.connected.is_empty()
    }
}

/// Arena of every known block header, main-chain bookkeeping included.
///
/// All entries are owned here; side-chain entries stay indexed forever and
/// become reachable again if checkpoint state or trust ordering changes.
#[derive(Default)]
pub struct ChainIndex {
    entries: Vec<BlockIndexEntry>,
    by_hash: HashMap<Hash256, EntryId>,
    /// Main-chain entry at each height; `main_chain[h].height == h`.
    main_chain: Vec<EntryId>,
    best: Option<EntryId>,
}

impl ChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> &BlockIndexEntry {
        &self.entries[id]
    }

    pub fn get(&self, id: EntryId) -> Option<&BlockIndexEntry> {
        self.entries.get(id)
    }

    pub fn best(&self) -> Option<EntryId> {
        self.best
    }

    pub fn best_entry(&self) -> Option<&BlockIndexEntry> {
        self.best.map(|id| &self.entries[id])
    }

    /// Height of the best chain, -1 while the index is empty.
    pub fn height(&self) -> i64 {
        self.main_chain.len() as i64 - 1
    }

    pub fn find_by_hash(&self, hash: &Hash256) -> Option<EntryId> {
        self.by_hash.get(hash).copied()
    }

    /// Main-chain lookup only; side-chain entries are not height-addressable.
    pub fn find_by_height(&self, height: i64) -> Option<EntryId> {
        if height < 0 {
            return None;
        }
        self.main_chain.get(height as usize).copied()
    }

    pub fn is_in_main_chain(&self, id: EntryId) -> bool {
        let entry = &self.entries[id];
        if entry.height < 0 {
            return false;
        }
        self.main_chain.get(entry.height as usize) == Some(&id)
    }

    /// Walk parent links down to `height`.
    pub fn ancestor_at_height(&self, id: EntryId, height: i64) -> Option<EntryId> {
        let mut cursor = id;
        loop {
            let entry = &self.entries[cursor];
            if entry.height == height {
                return Some(cursor);
            }
            if entry.height < height {
                return None;
            }
            cursor = entry.parent?;
        }
    }

    /// Most recent entry of `kind` at or below `from`, following parents.
    pub fn last_of_kind(&self, from: EntryId, kind: BlockKind) -> Option<EntryId> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let entry = &self.entries[id];
            if entry.kind == kind {
                return Some(id);
            }
            cursor = entry.parent;
        }
        None
    }

    /// Index a validated header. The entry starts unscored; trust and stake
    /// fields arrive via [`ChainIndex::score`].
    pub fn register(&mut self, header: &BlockHeader, kind: BlockKind) -> Result<EntryId, ChainError> {
        let hash = header.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(ChainError::DuplicateBlock(hash));
        }

        let (parent, height) = if header.prev_block == [0u8; 32] {
            if self.entries.iter().any(|entry| entry.height == 0) {
                return Err(ChainError::UnexpectedGenesis(hash));
            }
            (None, 0)
        } else {
            let parent = self
                .by_hash
                .get(&header.prev_block)
                .copied()
                .ok_or(ChainError::OrphanBlock(header.prev_block))?;
            (Some(parent), self.entries[parent].height + 1)
        };

        let id = self.entries.len();
        self.entries
            .push(BlockIndexEntry::from_header(header, hash, height, parent, kind));
        self.by_hash.insert(hash, id);
        ember_log::log_debug!(
            "indexed block {} height={} kind={}",
            hash256_to_hex(&hash),
            height,
            kind.as_str()
        );
        Ok(id)
    }

    /// Attach trust and stake fields to an entry. Exactly once per entry;
    /// a second call is caller misuse and is surfaced, not ignored.
    pub fn score(&mut self, id: EntryId, score: EntryScore) -> Result<(), ChainError> {
        let entry = &mut self.entries[id];
        if entry.score.is_some() {
            return Err(ChainError::AlreadyScored(entry.hash));
        }
        entry.score = Some(score);
        Ok(())
    }

    /// Re-evaluate best-chain selection.
    ///
    /// Candidates are scanned in registration order and only a strictly
    /// greater chain trust displaces the running winner, so exactly-equal
    /// trust can never flip the tip and the earliest-seen entry wins among
    /// equals. Under strict checkpointing, non-compliant entries are
    /// excluded from the comparison entirely; they stay indexed and become
    /// eligible again when checkpoint state changes.
    pub fn reconsider_best_chain(
        &mut self,
        policy: &CheckpointPolicy,
        max_reorg_depth: i64,
    ) -> ReorgOutcome {
        let strict = policy.mode() == CheckpointMode::Strict;

        let mut winner: Option<EntryId> = None;
        for id in 0..self.entries.len() {
            let Some(score) = self.entries[id].score.as_ref() else {
                continue;
            };
            let trust = score.chain_trust;
            if strict && !policy.is_compliant(self, id) {
                continue;
            }
            match winner {
                Some(current)
                    if trust
                        <= self.entries[current]
                            .score
                            .as_ref()
                            .map(|s| s.chain_trust)
                            .unwrap_or_default() => {}
                _ => winner = Some(id),
            }
        }

        let Some(winner) = winner else {
            return ReorgOutcome::default();
        };

        let current_best_eligible = match self.best {
            Some(best) => !strict || policy.is_compliant(self, best),
            None => false,
        };

        let switch = match self.best {
            None => true,
            Some(best) if best == winner => false,
            Some(_) if !current_best_eligible => true,
            Some(best) => {
                let best_trust = self.entries[best]
                    .score
                    .as_ref()
                    .map(|s| s.chain_trust)
                    .unwrap_or_default();
                let winner_trust = self.entries[winner]
                    .score
                    .as_ref()
                    .map(|s| s.chain_trust)
                    .unwrap_or_default();
                winner_trust > best_trust
            }
        };
        if !switch {
            return ReorgOutcome::default();
        }

        if !strict && !policy.is_compliant(self, winner) {
            ember_log::log_warn!(
                "new best block {} does not descend from the sync checkpoint ({} mode)",
                hash256_to_hex(&self.entries[winner].hash),
                policy.mode().as_str()
            );
        }

        self.reorganize(winner, max_reorg_depth, current_best_eligible)
    }

    fn reorganize(
        &mut self,
        new_tip: EntryId,
        max_reorg_depth: i64,
        refuse_deep: bool,
    ) -> ReorgOutcome {
        // Walk back from the new tip to the first entry already on the main
        // chain; everything on the way joins the chain.
        let mut joining: Vec<EntryId> = Vec::new();
        let mut cursor = Some(new_tip);
        let mut fork: Option<EntryId> = None;
        while let Some(id) = cursor {
            if self.is_in_main_chain(id) {
                fork = Some(id);
                break;
            }
            joining.push(id);
            cursor = self.entries[id].parent;
        }

        let fork_height = fork.map(|id| self.entries[id].height).unwrap_or(-1);
        if let Some(best) = self.best {
            let depth = self.entries[best].height - fork_height;
            if refuse_deep && depth > max_reorg_depth {
                ember_log::log_warn!(
                    "refusing reorganization {} blocks deep (limit {})",
                    depth,
                    max_reorg_depth
                );
                return ReorgOutcome::default();
            }
        }

        // Disconnect the stale branch, old tip first.
        let mut disconnected = Vec::new();
        for height in ((fork_height + 1).max(0) as usize..self.main_chain.len()).rev() {
            let id = self.main_chain[height];
            self.entries[id].successor = None;
            disconnected.push(self.entries[id].hash);
        }
        self.main_chain.truncate((fork_height + 1).max(0) as usize);

        // Connect the new branch from the fork point out to the tip.
        let mut connected = Vec::new();
        for id in joining.iter().rev().copied() {
            if let Some(parent) = self.entries[id].parent {
                self.entries[parent].successor = Some(id);
            }
            self.entries[id].successor = None;
            self.main_chain.push(id);
            connected.push(self.entries[id].hash);
        }

        self.best = Some(new_tip);
        let tip = &self.entries[new_tip];
        if disconnected.is_empty() {
            ember_log::log_info!(
                "new best block {} height={}",
                hash256_to_hex(&tip.hash),
                tip.height
            );
        } else {
            ember_log::log_info!(
                "reorganized to {} height={} (-{} / +{} blocks)",
                hash256_to_hex(&tip.hash),
                tip.height,
                disconnected.len(),
                connected.len()
            );
        }

        ReorgOutcome {
            disconnected,
            connected,
        }
    }
}
