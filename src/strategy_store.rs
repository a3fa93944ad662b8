//! Strategy Store (`CFRValues`).
//!
//! Per (player, street, nonterminal-id) arrays of regrets or sumprobs,
//! stored as integers or doubles, possibly zstd-compressed, indexed by
//! either (board, hole-card-pair, succ) or (bucket, succ).

use crate::betting_tree::{BettingTree, Street};
use crate::board_tree::BoardTree;
use crate::bucket::StreetBuckets;
use crate::cfr_config::CfrConfig;
use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Which numeric representation backs a (player, street) slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Storage {
    Ints(Vec<i32>),
    Doubles(Vec<f32>),
}

impl Storage {
    pub fn len(&self) -> usize {
        match self {
            Storage::Ints(v) => v.len(),
            Storage::Doubles(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_f32(&self, scale: f32) -> Vec<f32> {
        match self {
            Storage::Ints(v) => v.iter().map(|&x| x as f32 * scale / i32::MAX as f32).collect(),
            Storage::Doubles(v) => v.clone(),
        }
    }
}

/// Layout for one (player, street) slot: whether it is bucketed, whether it
/// is compressed on disk, and the number of succs per holding (needed to
/// decode the flat array).
#[derive(Debug, Clone, Copy)]
pub struct SlotLayout {
    pub bucketed: bool,
    pub compressed: bool,
    pub as_int: bool,
    pub num_succs_hint: u32,
}

/// Per-(street, nonterminal id) storage, one entry per player.
#[derive(Clone)]
struct NodeValues {
    storage: [Option<Storage>; 2],
    scale: [f32; 2],
}

/// The root of the view this store is built against — either the full tree
/// (`root_bd_st == 0, root_bd == 0`) or a subgame rooted deeper in the tree.
#[derive(Debug, Clone, Copy)]
pub struct StoreRoot {
    pub root_bd_st: Street,
    pub root_bd: u32,
}

#[derive(Clone)]
pub struct CFRValues {
    pub is_sumprobs: bool,
    pub player_mask: [bool; 2],
    pub root: StoreRoot,
    layouts: HashMap<(u8, Street), SlotLayout>,
    nodes: HashMap<(Street, u32), NodeValues>,
}

impl CFRValues {
    pub fn new(is_sumprobs: bool, player_mask: [bool; 2], root: StoreRoot, layouts: HashMap<(u8, Street), SlotLayout>) -> Self {
        Self {
            is_sumprobs,
            player_mask,
            root,
            layouts,
            nodes: HashMap::new(),
        }
    }

    /// Builds the `(player, street) -> SlotLayout` table for every street up
    /// to `num_streets`, deriving `bucketed` from `buckets` and `compressed`
    /// from `cfg` rather than requiring the caller to hand-assemble one.
    pub fn infer_layouts(tree: &BettingTree, cfg: &CfrConfig, buckets: &StreetBuckets, num_streets: usize, as_int: bool) -> HashMap<(u8, Street), SlotLayout> {
        let mut layouts = HashMap::new();
        for player in 0..2u8 {
            for st in 0..num_streets {
                let st = st as Street;
                layouts.insert(
                    (player, st),
                    SlotLayout {
                        bucketed: buckets.is_bucketed(st),
                        compressed: cfg.is_compressed(st),
                        as_int,
                        num_succs_hint: tree.num_nonterminals(player, st).max(1),
                    },
                );
            }
        }
        layouts
    }

    fn num_holdings(&self, player: u8, st: Street, gbd_count: u32, num_hole_card_pairs_total: u32, buckets: &StreetBuckets) -> u32 {
        let layout = self.layouts.get(&(player, st)).copied().unwrap_or(SlotLayout {
            bucketed: false,
            compressed: false,
            as_int: false,
            num_succs_hint: 1,
        });
        if layout.bucketed {
            buckets.num_buckets(st)
        } else {
            gbd_count * num_hole_card_pairs_total
        }
    }

    /// Lazily materialises storage for every node reachable from `root` in
    /// `tree` whose (player, street) is within `player_mask`, as integers.
    pub fn allocate_and_clear_ints(&mut self, tree: &BettingTree, board_tree: &BoardTree, buckets: &StreetBuckets, only_player: Option<u8>) {
        self.allocate_and_clear(tree, board_tree, buckets, only_player, true);
    }

    /// As [`allocate_and_clear_ints`](Self::allocate_and_clear_ints), but
    /// with double-precision storage.
    pub fn allocate_and_clear_doubles(&mut self, tree: &BettingTree, board_tree: &BoardTree, buckets: &StreetBuckets, only_player: Option<u8>) {
        self.allocate_and_clear(tree, board_tree, buckets, only_player, false);
    }

    fn allocate_and_clear(&mut self, tree: &BettingTree, board_tree: &BoardTree, buckets: &StreetBuckets, only_player: Option<u8>, as_ints: bool) {
        self.walk_allocate(tree, tree.root(), board_tree, buckets, only_player, as_ints);
    }

    fn walk_allocate(&mut self, tree: &BettingTree, node_idx: u32, board_tree: &BoardTree, buckets: &StreetBuckets, only_player: Option<u8>, as_ints: bool) {
        let node = tree.node(node_idx);
        if node.is_terminal() {
            return;
        }
        let player = node.player_acting;
        let include = self.player_mask[player as usize] && only_player.map(|p| p == player).unwrap_or(true);
        if include {
            let gbd_begin = board_tree.global_index(self.root.root_bd_st, self.root.root_bd, node.street, 0);
            let _ = gbd_begin;
            let num_boards = board_tree.num_boards(node.street);
            let hcp_total: u32 = (0..num_boards)
                .map(|gbd| board_tree.num_hole_card_pairs(node.street, gbd) as u32)
                .max()
                .unwrap_or(0);
            let holdings = self.num_holdings(player, node.street, num_boards, hcp_total, buckets);
            let size = (holdings * node.num_succs) as usize;
            let key = (node.street, node.nonterminal_id);
            let entry = self.nodes.entry(key).or_insert_with(|| NodeValues {
                storage: [None, None],
                scale: [1.0, 1.0],
            });
            entry.storage[player as usize] = Some(if as_ints {
                Storage::Ints(vec![0; size])
            } else {
                Storage::Doubles(vec![0.0; size])
            });
        }
        for &child in tree.succs(node_idx) {
            self.walk_allocate(tree, child, board_tree, buckets, only_player, as_ints);
        }
    }

    /// Raw backing values for a node, as a flat slice interpretable by the
    /// caller according to the slot's bucketed/board-keyed layout.
    pub fn values(&self, player: u8, st: Street, nt: u32) -> Option<&Storage> {
        self.nodes.get(&(st, nt)).and_then(|n| n.storage[player as usize].as_ref())
    }

    pub fn values_mut(&mut self, player: u8, st: Street, nt: u32) -> Option<&mut Storage> {
        self.nodes.get_mut(&(st, nt)).and_then(|n| n.storage[player as usize].as_mut())
    }

    /// Whether `(player, st)` is stored keyed by bucket id (board-independent)
    /// rather than by `(board, hole-card-pair)`. Lets callers outside this
    /// module (the recursive CFR walk) compute the right flat offset without
    /// duplicating the layout table.
    pub fn is_bucketed(&self, player: u8, st: Street) -> bool {
        self.layouts.get(&(player, st)).map(|l| l.bucketed).unwrap_or(false)
    }

    /// Reads the entry at `(player, st, nt, offset, s)` as a non-negative
    /// current-strategy weight, normalised against the sum across succs;
    /// falls back to a pure play of `default_succ_index` if the sum is zero.
    pub fn prob(&self, player: u8, st: Street, nt: u32, offset: usize, s: usize, num_succs: usize, default_succ_index: usize) -> f32 {
        let Some(entry) = self.nodes.get(&(st, nt)) else {
            return if s == default_succ_index { 1.0 } else { 0.0 };
        };
        let scale = entry.scale[player as usize];
        let Some(storage) = &entry.storage[player as usize] else {
            return if s == default_succ_index { 1.0 } else { 0.0 };
        };
        let values = storage.as_f32(scale);
        let mut sum = 0.0f32;
        for succ in 0..num_succs {
            sum += values[offset * num_succs + succ].max(0.0);
        }
        if sum <= 0.0 {
            return if s == default_succ_index { 1.0 } else { 0.0 };
        }
        values[offset * num_succs + s].max(0.0) / sum
    }

    /// Serialises one node's per-player storage as a flat fixed-width byte
    /// sequence in host byte order, zstd-compressing when the slot layout
    /// requests it. Matches the "flat sequence of fixed-width integers or
    /// doubles" filesystem contract directly, rather than through a
    /// self-describing framing a generic serializer would add.
    pub fn write_node(&self, player: u8, st: Street, nt: u32) -> Result<Vec<u8>> {
        let storage = self
            .values(player, st, nt)
            .ok_or_else(|| SolverError::InvariantViolation(format!("no values at ({player}, {st}, {nt})")))?;
        let bytes = flat_encode(storage);
        let layout = self.layouts.get(&(player, st)).copied();
        if layout.map(|l| l.compressed).unwrap_or(false) {
            zstd_compress(&bytes)
        } else {
            Ok(bytes)
        }
    }

    pub fn read_node(&mut self, player: u8, st: Street, nt: u32, bytes: &[u8]) -> Result<()> {
        let layout = self.layouts.get(&(player, st)).copied().unwrap_or(SlotLayout {
            bucketed: false,
            compressed: false,
            as_int: false,
            num_succs_hint: 1,
        });
        let decoded = if layout.compressed { zstd_decompress(bytes)? } else { bytes.to_vec() };
        let storage = flat_decode(&decoded, layout.as_int)?;
        let entry = self.nodes.entry((st, nt)).or_insert_with(|| NodeValues {
            storage: [None, None],
            scale: [1.0, 1.0],
        });
        entry.storage[player as usize] = Some(storage);
        Ok(())
    }

    /// Depth-first walk over the subtree under `root`, writing one file per
    /// (street, nonterminal-id) under `dir`.
    pub fn write(&self, dir: &Path, tree: &BettingTree, it: u32, only_player: Option<u8>) -> Result<()> {
        fs::create_dir_all(dir).map_err(|source| SolverError::Io { path: dir.to_path_buf(), source })?;
        self.write_walk(dir, tree, tree.root(), it, only_player)
    }

    fn write_walk(&self, dir: &Path, tree: &BettingTree, node_idx: u32, it: u32, only_player: Option<u8>) -> Result<()> {
        let node = tree.node(node_idx);
        if node.is_terminal() {
            return Ok(());
        }
        let player = node.player_acting;
        if only_player.map(|p| p == player).unwrap_or(true) && self.values(player, node.street, node.nonterminal_id).is_some() {
            let bytes = self.write_node(player, node.street, node.nonterminal_id)?;
            let name = node_file_name(self.is_sumprobs, node.street, node.nonterminal_id, player, it);
            let path = dir.join(name);
            fs::write(&path, bytes).map_err(|source| SolverError::Io { path, source })?;
        }
        for &child in tree.succs(node_idx) {
            self.write_walk(dir, tree, child, it, only_player)?;
        }
        Ok(())
    }

    pub fn read(&mut self, dir: &Path, tree: &BettingTree, it: u32, only_player: Option<u8>) -> Result<()> {
        self.read_walk(dir, tree, tree.root(), it, only_player)
    }

    fn read_walk(&mut self, dir: &Path, tree: &BettingTree, node_idx: u32, it: u32, only_player: Option<u8>) -> Result<()> {
        let node = tree.node(node_idx);
        if node.is_terminal() {
            return Ok(());
        }
        let player = node.player_acting;
        if only_player.map(|p| p == player).unwrap_or(true) {
            let name = node_file_name(self.is_sumprobs, node.street, node.nonterminal_id, player, it);
            let path = dir.join(&name);
            if path.exists() {
                let bytes = fs::read(&path).map_err(|source| SolverError::Io { path: path.clone(), source })?;
                self.read_node(player, node.street, node.nonterminal_id, &bytes)?;
            }
        }
        for &child in tree.succs(node_idx) {
            self.read_walk(dir, tree, child, it, only_player)?;
        }
        Ok(())
    }

    /// Copies out only the portion of a larger on-disk strategy rooted at an
    /// internal node, remapping nonterminal ids onto the subtree's dense ids.
    pub fn read_subtree_from_full(
        full: &CFRValues,
        full_root_idx: u32,
        full_tree: &BettingTree,
        subtree: &BettingTree,
        subtree_root_idx: u32,
        only_player: Option<u8>,
    ) -> Result<CFRValues> {
        let mut out = CFRValues::new(full.is_sumprobs, full.player_mask, full.root, full.layouts.clone());
        Self::copy_walk(full, full_tree, full_root_idx, subtree, subtree_root_idx, only_player, &mut out)?;
        Ok(out)
    }

    fn copy_walk(
        full: &CFRValues,
        full_tree: &BettingTree,
        full_idx: u32,
        subtree: &BettingTree,
        sub_idx: u32,
        only_player: Option<u8>,
        out: &mut CFRValues,
    ) -> Result<()> {
        let full_node = full_tree.node(full_idx);
        let sub_node = subtree.node(sub_idx);
        if full_node.is_terminal() || sub_node.is_terminal() {
            if full_node.num_succs != sub_node.num_succs {
                return Err(SolverError::InvariantViolation(
                    "mismatched num_succs between full tree and subtree".to_string(),
                ));
            }
            return Ok(());
        }
        if full_node.num_succs != sub_node.num_succs {
            return Err(SolverError::InvariantViolation(
                "mismatched num_succs between full tree and subtree".to_string(),
            ));
        }

        let player = full_node.player_acting;
        if only_player.map(|p| p == player).unwrap_or(true) {
            if let Some(storage) = full.values(player, full_node.street, full_node.nonterminal_id) {
                let entry = out.nodes.entry((sub_node.street, sub_node.nonterminal_id)).or_insert_with(|| NodeValues {
                    storage: [None, None],
                    scale: [1.0, 1.0],
                });
                entry.storage[player as usize] = Some(storage.clone());
            }
        }

        for (&fc, &sc) in full_tree.succs(full_idx).iter().zip(subtree.succs(sub_idx)) {
            Self::copy_walk(full, full_tree, fc, subtree, sc, only_player, out)?;
        }
        Ok(())
    }

    /// Owned copy of this store for use as the fixed base-strategy read
    /// source during counterfactual-value extraction. `vcfr::process` takes
    /// `&mut CFRValues` for its `regrets` argument even in `CfValue` mode
    /// (the signature is shared with training) but never writes through it
    /// there, so handing each of the two per-player passes its own clone
    /// avoids aliasing the caller's base store.
    pub fn clone_for_cv(&self) -> CFRValues {
        self.clone()
    }

    /// Splices a subgame's values into a larger store at a given board,
    /// preserving storage-type and layout of each side.
    pub fn merge_into(&mut self, subgame: &CFRValues, root_bd: u32, full_tree: &BettingTree, full_root_idx: u32, subtree: &BettingTree, subtree_root_idx: u32) -> Result<()> {
        self.merge_walk(subgame, root_bd, full_tree, full_root_idx, subtree, subtree_root_idx)
    }

    fn merge_walk(&mut self, subgame: &CFRValues, root_bd: u32, full_tree: &BettingTree, full_idx: u32, subtree: &BettingTree, sub_idx: u32) -> Result<()> {
        let full_node = full_tree.node(full_idx);
        let sub_node = subtree.node(sub_idx);
        if full_node.is_terminal() || sub_node.is_terminal() {
            return Ok(());
        }
        let player = full_node.player_acting;
        if let Some(sub_storage) = subgame.values(player, sub_node.street, sub_node.nonterminal_id) {
            let layout = self.layouts.get(&(player, full_node.street)).copied().unwrap_or(SlotLayout {
                bucketed: false,
                compressed: false,
                as_int: false,
                num_succs_hint: full_node.num_succs,
            });
            if layout.bucketed {
                // bucketed targets are board-independent: merge overwrites directly.
                let entry = self.nodes.entry((full_node.street, full_node.nonterminal_id)).or_insert_with(|| NodeValues {
                    storage: [None, None],
                    scale: [1.0, 1.0],
                });
                entry.storage[player as usize] = Some(sub_storage.clone());
            } else {
                let holdings_per_board = sub_storage.len() as u32 / full_node.num_succs.max(1);
                let entry = self.nodes.entry((full_node.street, full_node.nonterminal_id)).or_insert_with(|| NodeValues {
                    storage: [None, None],
                    scale: [1.0, 1.0],
                });
                let dest = entry.storage[player as usize].get_or_insert_with(|| match sub_storage {
                    Storage::Ints(_) => Storage::Ints(Vec::new()),
                    Storage::Doubles(_) => Storage::Doubles(Vec::new()),
                });
                splice_board(dest, sub_storage, root_bd, holdings_per_board);
            }
        }
        for (&fc, &sc) in full_tree.succs(full_idx).iter().zip(subtree.succs(sub_idx)) {
            self.merge_walk(subgame, root_bd, full_tree, fc, subtree, sc)?;
        }
        Ok(())
    }
}

fn splice_board(dest: &mut Storage, src: &Storage, root_bd: u32, holdings_per_board: u32) {
    let start = (root_bd * holdings_per_board) as usize;
    match (dest, src) {
        (Storage::Ints(d), Storage::Ints(s)) => {
            if d.len() < start + s.len() {
                d.resize(start + s.len(), 0);
            }
            d[start..start + s.len()].copy_from_slice(s);
        }
        (Storage::Doubles(d), Storage::Doubles(s)) => {
            if d.len() < start + s.len() {
                d.resize(start + s.len(), 0.0);
            }
            d[start..start + s.len()].copy_from_slice(s);
        }
        _ => {}
    }
}

fn node_file_name(is_sumprobs: bool, st: Street, nt: u32, player: u8, it: u32) -> String {
    let kind = if is_sumprobs { "sumprobs" } else { "regrets" };
    format!("{kind}.{st}.{nt}.p{player}.i{it}")
}

/// Public entry point for `flat_encode`, used by the resolver to serialise a
/// subgame's per-node sumprob vector without going through the full
/// `write_node`/on-disk-layout machinery (endgame leaf files are one flat
/// array per file, not per-player-masked like the trainer's own output).
pub fn flat_encode_pub(storage: &Storage) -> Vec<u8> {
    flat_encode(storage)
}

fn flat_encode(storage: &Storage) -> Vec<u8> {
    match storage {
        Storage::Ints(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        Storage::Doubles(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
    }
}

fn flat_decode(bytes: &[u8], as_int: bool) -> Result<Storage> {
    if as_int {
        if bytes.len() % 4 != 0 {
            return Err(SolverError::InvariantViolation("truncated int stream".to_string()));
        }
        let v = bytes.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        Ok(Storage::Ints(v))
    } else {
        if bytes.len() % 4 != 0 {
            return Err(SolverError::InvariantViolation("truncated double stream".to_string()));
        }
        let v = bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        Ok(Storage::Doubles(v))
    }
}

#[cfg(feature = "zstd")]
fn zstd_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(bytes, 0).map_err(|source| SolverError::Io { path: PathBuf::from("<zstd>"), source })
}

#[cfg(not(feature = "zstd"))]
fn zstd_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(bytes.to_vec())
}

#[cfg(feature = "zstd")]
fn zstd_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(bytes).map_err(|source| SolverError::Io { path: PathBuf::from("<zstd>"), source })
}

#[cfg(not(feature = "zstd"))]
fn zstd_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layouts() -> HashMap<(u8, Street), SlotLayout> {
        let mut m = HashMap::new();
        m.insert(
            (0, 0),
            SlotLayout {
                bucketed: false,
                compressed: false,
                as_int: false,
                num_succs_hint: 2,
            },
        );
        m.insert(
            (1, 0),
            SlotLayout {
                bucketed: false,
                compressed: false,
                as_int: false,
                num_succs_hint: 2,
            },
        );
        m
    }

    #[test]
    fn prob_falls_back_to_default_when_sum_zero() {
        let mut values = CFRValues::new(
            false,
            [true, true],
            StoreRoot { root_bd_st: 0, root_bd: 0 },
            layouts(),
        );
        values.nodes.insert(
            (0, 0),
            NodeValues {
                storage: [Some(Storage::Doubles(vec![0.0, 0.0])), None],
                scale: [1.0, 1.0],
            },
        );
        let p = values.prob(0, 0, 0, 0, 1, 2, 1);
        assert_eq!(p, 1.0);
        let p0 = values.prob(0, 0, 0, 0, 0, 2, 1);
        assert_eq!(p0, 0.0);
    }

    #[test]
    fn prob_normalizes_positive_regrets() {
        let mut values = CFRValues::new(
            false,
            [true, true],
            StoreRoot { root_bd_st: 0, root_bd: 0 },
            layouts(),
        );
        values.nodes.insert(
            (0, 0),
            NodeValues {
                storage: [Some(Storage::Doubles(vec![1.0, 3.0])), None],
                scale: [1.0, 1.0],
            },
        );
        let p0 = values.prob(0, 0, 0, 0, 0, 2, 1);
        let p1 = values.prob(0, 0, 0, 0, 1, 2, 1);
        assert!((p0 - 0.25).abs() < 1e-6);
        assert!((p1 - 0.75).abs() < 1e-6);
    }
}
