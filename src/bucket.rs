//! Bucket Map.
//!
//! Maps a canonical hand on a given street to an abstraction bucket id.
//! Bucket *construction* (k-means over equity histograms, earth-mover's
//! distance, and the rest of the abstraction-learning literature) is an
//! external collaborator — this module only owns the lookup interface
//! the trainer and resolver read through, plus two concrete backends:
//! identity ("none") and a precomputed table loaded from disk.

use crate::board_tree::{BoardTree, Street};
use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Maps `(street, global board index, hole-card-pair index)` to a bucket id,
/// with `num_buckets(street)` buckets total on that street.
pub trait BucketMap: Send + Sync {
    fn bucket(&self, st: Street, gbd: u32, hcp: usize) -> u32;
    fn num_buckets(&self, st: Street) -> u32;
}

/// No abstraction: every canonical hand is its own bucket, keyed by its
/// position in `BoardTree::canonical_cards`. Used for streets small enough
/// to solve exactly (preflop, and any street under the Kuhn-sized scenario).
pub struct IdentityBucketMap {
    num_hands_per_board: Vec<u32>,
}

impl IdentityBucketMap {
    pub fn build(tree: &BoardTree) -> Self {
        let num_streets = tree.num_streets();
        let mut num_hands_per_board = Vec::with_capacity(num_streets);
        for st in 0..num_streets {
            let st = st as Street;
            // all boards on a street share the same canonical-hand count only
            // when the abstraction is identity over a fixed hole-card count;
            // store the max and rely on callers keeping hcp < that count.
            let max_hands = (0..tree.num_boards(st))
                .map(|gbd| tree.num_hole_card_pairs(st, gbd) as u32)
                .max()
                .unwrap_or(0);
            num_hands_per_board.push(max_hands);
        }
        Self { num_hands_per_board }
    }
}

impl BucketMap for IdentityBucketMap {
    fn bucket(&self, _st: Street, _gbd: u32, hcp: usize) -> u32 {
        hcp as u32
    }

    fn num_buckets(&self, st: Street) -> u32 {
        self.num_hands_per_board[st as usize]
    }
}

/// A precomputed bucket table, one `u32` per `(board, hole-card-pair)`,
/// loaded from a flat binary file: `num_buckets: u32` followed by
/// `bucket_id: u32` per hole-card-pair index, laid out board-major in the
/// same board order as `BoardTree`.
pub struct FileBucketMap {
    num_buckets: u32,
    /// `table[gbd]` holds one bucket id per hole-card-pair index on that
    /// board.
    table: Vec<Vec<u32>>,
}

impl FileBucketMap {
    pub fn load(path: &Path, tree: &BoardTree, st: Street) -> Result<Self> {
        let bytes = fs::read(path).map_err(|source| SolverError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.len() < 4 {
            return Err(SolverError::InvariantViolation(format!(
                "bucket file {} too short",
                path.display()
            )));
        }
        let num_buckets = u32::from_le_bytes(bytes[0..4].try_into().unwrap());

        let num_boards = tree.num_boards(st);
        let mut table = Vec::with_capacity(num_boards as usize);
        let mut offset = 4usize;
        for gbd in 0..num_boards {
            let n = tree.num_hole_card_pairs(st, gbd);
            let needed = n * 4;
            if offset + needed > bytes.len() {
                return Err(SolverError::InvariantViolation(format!(
                    "bucket file {} truncated at board {gbd}",
                    path.display()
                )));
            }
            let mut row = Vec::with_capacity(n);
            for i in 0..n {
                let start = offset + i * 4;
                row.push(u32::from_le_bytes(bytes[start..start + 4].try_into().unwrap()));
            }
            table.push(row);
            offset += needed;
        }

        Ok(Self { num_buckets, table })
    }
}

impl BucketMap for FileBucketMap {
    fn bucket(&self, _st: Street, gbd: u32, hcp: usize) -> u32 {
        self.table[gbd as usize][hcp]
    }

    fn num_buckets(&self, _st: Street) -> u32 {
        self.num_buckets
    }
}

/// Where a street's precomputed bucket table lives, when it has one.
/// `Computed` names a source this crate does not generate (the
/// equity-histogram/k-means abstraction-learning pipeline is a teacher-owned
/// external collaborator); loading one that was produced elsewhere is in
/// scope, generating it is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BucketSource {
    Array(PathBuf),
    Computed,
}

/// Per-street card-abstraction choice in a config file: either no
/// abstraction (`None`) or a learned one with `count` buckets backed by
/// `source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StreetAbstraction {
    None,
    Buckets { count: u32, source: BucketSource },
}

/// Deserialised shape of a card-abstraction config file: one
/// [`StreetAbstraction`] per street, in street order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardAbstractionConfig {
    pub streets: Vec<StreetAbstraction>,
}

impl CardAbstractionConfig {
    /// Resolves every street's choice into a concrete backend, building
    /// [`StreetBuckets`] ready for the trainer/resolver to read through.
    /// `StreetAbstraction::Buckets { source: Computed, .. }` is rejected:
    /// this crate loads a precomputed table, it does not build one.
    pub fn build(&self, board_tree: &BoardTree) -> Result<StreetBuckets> {
        let mut backends: Vec<Box<dyn BucketMap>> = Vec::with_capacity(self.streets.len());
        let mut bucketed = Vec::with_capacity(self.streets.len());
        for (st, choice) in self.streets.iter().enumerate() {
            let st = st as Street;
            match choice {
                StreetAbstraction::None => {
                    backends.push(Box::new(IdentityBucketMap::build(board_tree)));
                    bucketed.push(false);
                }
                StreetAbstraction::Buckets { source: BucketSource::Array(path), .. } => {
                    backends.push(Box::new(FileBucketMap::load(path, board_tree, st)?));
                    bucketed.push(true);
                }
                StreetAbstraction::Buckets { source: BucketSource::Computed, .. } => {
                    return Err(SolverError::InvariantViolation(format!(
                        "street {st} card abstraction has no loadable source (bucket computation is out of scope)"
                    )));
                }
            }
        }
        Ok(StreetBuckets::new_with_bucketed(backends, bucketed))
    }
}

/// Per-street choice of backend, resolved once at trainer startup and
/// shared read-only across worker threads thereafter.
pub struct StreetBuckets {
    backends: Vec<Box<dyn BucketMap>>,
    /// Whether each street's backend collapses boards into a board-independent
    /// bucket space (`true`, e.g. a learned abstraction) or is keyed 1:1 by
    /// `(board, hole-card-pair)` (`false`, the identity backend). Defaults to
    /// `false` for every street when built via [`StreetBuckets::new`];
    /// [`StreetBuckets::new_with_bucketed`] lets a caller mark streets with a
    /// real learned abstraction.
    bucketed: Vec<bool>,
}

impl StreetBuckets {
    pub fn new(backends: Vec<Box<dyn BucketMap>>) -> Self {
        let bucketed = vec![false; backends.len()];
        Self { backends, bucketed }
    }

    pub fn new_with_bucketed(backends: Vec<Box<dyn BucketMap>>, bucketed: Vec<bool>) -> Self {
        Self { backends, bucketed }
    }

    pub fn bucket(&self, st: Street, gbd: u32, hcp: usize) -> u32 {
        self.backends[st as usize].bucket(st, gbd, hcp)
    }

    pub fn num_buckets(&self, st: Street) -> u32 {
        self.backends[st as usize].num_buckets(st)
    }

    pub fn is_bucketed(&self, st: Street) -> bool {
        self.bucketed.get(st as usize).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_config::GameParams;

    #[test]
    fn identity_bucket_is_hcp_index() {
        let params = GameParams::kuhn();
        let tree = BoardTree::build(&params);
        let buckets = IdentityBucketMap::build(&tree);
        assert_eq!(buckets.bucket(0, 0, 2), 2);
        assert!(buckets.num_buckets(0) > 0);
    }

    #[test]
    fn card_abstraction_config_none_is_identity() {
        let params = GameParams::kuhn();
        let tree = BoardTree::build(&params);
        let config = CardAbstractionConfig { streets: vec![StreetAbstraction::None] };
        let buckets = config.build(&tree).unwrap();
        assert!(!buckets.is_bucketed(0));
        assert_eq!(buckets.bucket(0, 0, 1), 1);
    }

    #[test]
    fn card_abstraction_config_computed_source_is_rejected() {
        let params = GameParams::kuhn();
        let tree = BoardTree::build(&params);
        let config = CardAbstractionConfig {
            streets: vec![StreetAbstraction::Buckets { count: 8, source: BucketSource::Computed }],
        };
        assert!(config.build(&tree).is_err());
    }

    #[test]
    fn card_abstraction_config_round_trips_through_json() {
        let config = CardAbstractionConfig {
            streets: vec![StreetAbstraction::None, StreetAbstraction::Buckets { count: 200, source: BucketSource::Array("buckets.1".into()) }],
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: CardAbstractionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.streets.len(), 2);
    }
}
