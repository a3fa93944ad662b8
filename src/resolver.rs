//! Endgame Resolver.
//!
//! Walks the base betting tree from the trunk root, propagating both
//! players' reach probabilities through the base average strategy
//! (`CFRValues`), and at every node on `cfr_config.subgame_street`
//! re-solves the subtree rooted there against one of four seeding methods:
//! UNSAFE (reach taken as-is), CFR-D (an implicit "enter or take the trunk
//! CV" meta-choice for the non-target player), MAXMARGIN (a margin-style
//! regret on the same choice), and COMBINED (a capped blend of the two plus
//! a uniform floor). This is the hardest and most distinctive piece of
//! engineering in the crate.

use crate::betting_tree::{BettingNode, BettingTree, Street, NO_SUCC};
use crate::board_tree::{encode_hole_pair, BoardTree, CanonicalHand};
use crate::bucket::StreetBuckets;
use crate::cfr_config::CfrConfig;
use crate::error::{Result, SolverError};
use crate::game_config::GameParams;
use crate::strategy_store::{CFRValues, StoreRoot};
use crate::vcfr::{self, dense_from_hand_values, holding_offset_in, recompute_total_card_probs, DiscountParams, VcfrContext, VcfrMode, VcfrState};
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMethod {
    Unsafe,
    CfrD,
    MaxMargin,
    Combined,
}

impl ResolveMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolveMethod::Unsafe => "UNSAFE",
            ResolveMethod::CfrD => "CFRD",
            ResolveMethod::MaxMargin => "MAXMARGIN",
            ResolveMethod::Combined => "COMBINED",
        }
    }
}

impl std::str::FromStr for ResolveMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UNSAFE" => Ok(ResolveMethod::Unsafe),
            "CFRD" | "CFR-D" => Ok(ResolveMethod::CfrD),
            "MAXMARGIN" => Ok(ResolveMethod::MaxMargin),
            "COMBINED" => Ok(ResolveMethod::Combined),
            other => Err(format!("unknown resolve method {other:?} (expected one of UNSAFE, CFRD, MAXMARGIN, COMBINED)")),
        }
    }
}

/// Per-run knobs that are not already carried by `CfrConfig` (which holds
/// the numeric constants shared with training).
#[derive(Debug, Clone, Copy)]
pub struct ResolverRunConfig {
    pub method: ResolveMethod,
    /// The player the local betting abstraction (if richer than the base
    /// one) is built for; also the player whose strategy is being produced.
    pub solve_player: u8,
    /// Whether an asymmetric betting tree was used upstream; `asym_p` names
    /// which player it favoured (mirrors `paths::endgame_dir`'s `p<asym_p>`
    /// component). Equal to `solve_player` for the common case.
    pub asym_player: u8,
    /// Re-resolve recursively at every subgame-street boundary beneath the
    /// first one reached, rather than stopping at the first.
    pub nested: bool,
    /// Additionally resolve at interior (non-street-boundary) choice nodes
    /// belonging to `solve_player` at or past `subgame_street`.
    pub internal: bool,
    pub num_endgame_iterations: u32,
}

/// Drives the trunk walk and, at each qualifying node, the subgame solve.
pub struct EndgameResolver<'a> {
    pub game_params: &'a GameParams,
    pub board_tree: &'a BoardTree,
    pub base_tree: &'a BettingTree,
    pub buckets: &'a StreetBuckets,
    pub cfr_config: &'a CfrConfig,
}

/// Reach state threaded down the trunk: each player's dense reach vector
/// (ignoring card removal against the other's hand, in the engine's usual
/// convention — blockers are accounted for separately via
/// `total_card_probs`), plus the textual action sequence taken to get here.
#[derive(Clone)]
struct TrunkState {
    reach: [Vec<f32>; 2],
    action_sequence: String,
}

/// One independently-resolvable subgame: a node reached while walking the
/// trunk, plus the reach state that was live there. Collected up front (in
/// the common `nested = false` case) so the actual CFR-D/MAXMARGIN/COMBINED
/// solves can run on a worker pool: each job writes to its own disjoint
/// file path and shares no mutable state with any other job, so no
/// synchronisation is needed beyond the pool joining before the caller
/// proceeds.
struct SubgameJob {
    node_idx: u32,
    gbd: u32,
    state: TrunkState,
}

impl<'a> EndgameResolver<'a> {
    pub fn new(game_params: &'a GameParams, board_tree: &'a BoardTree, base_tree: &'a BettingTree, buckets: &'a StreetBuckets, cfr_config: &'a CfrConfig) -> Self {
        Self {
            game_params,
            board_tree,
            base_tree,
            buckets,
            cfr_config,
        }
    }

    fn max_card1(&self) -> u32 {
        self.game_params.deck_size as u32
    }

    /// Walks the whole trunk, re-solving every subgame found, and writes
    /// each one's average strategy under `out_dir` via `write_endgame`.
    ///
    /// `nested` re-enters the just-resolved subtree as the new base, which
    /// is inherently sequential, so it keeps using the single recursive
    /// `walk`. Otherwise
    /// every subgame root is independent of every other (disjoint output
    /// paths, no shared mutable state), so they are collected up front and
    /// handed to the worker pool in `run_jobs`.
    pub fn run(&self, base_sumprobs: &CFRValues, run_cfg: &ResolverRunConfig, out_dir: &Path) -> Result<()> {
        let deck = self.game_params.deck_size;
        let max_card1 = self.max_card1();
        let full = VcfrState::initial(deck, max_card1, &[]).opp_probs;
        let state = TrunkState {
            reach: [full.clone(), full],
            action_sequence: String::new(),
        };

        if run_cfg.nested {
            return self.walk(base_sumprobs, self.base_tree.root(), 0, 0, &state, run_cfg, out_dir);
        }

        let mut jobs = Vec::new();
        self.collect_jobs(base_sumprobs, self.base_tree.root(), 0, 0, &state, run_cfg, &mut jobs)?;
        info!("collected {} independent subgame(s) for the worker pool", jobs.len());
        self.run_jobs(base_sumprobs, &jobs, run_cfg, out_dir)
    }

    /// Mirrors `walk`'s trunk traversal but, instead of resolving inline,
    /// records each subgame root found (plus the propagated reach state that
    /// was live there) into `jobs`. Only used when `!run_cfg.nested`: nested
    /// resolving depends on a prior subgame's *result*, which this
    /// collect-then-solve split cannot express.
    #[allow(clippy::too_many_arguments)]
    fn collect_jobs(&self, base_sumprobs: &CFRValues, node_idx: u32, local_bd: u32, last_st: Street, state: &TrunkState, run_cfg: &ResolverRunConfig, jobs: &mut Vec<SubgameJob>) -> Result<()> {
        let node = self.base_tree.node(node_idx).clone();
        if node.is_terminal() {
            return Ok(());
        }

        if node.street > last_st {
            let prev_gbd = self.board_tree.global_index(0, 0, last_st, local_bd);
            let (begin, end) = self.board_tree.succ_board_range(last_st, prev_gbd, node.street);
            for gbd in begin..end {
                let lbd = self.board_tree.local_index(0, 0, node.street, gbd);
                if node.street == self.cfr_config.subgame_street {
                    jobs.push(SubgameJob {
                        node_idx,
                        gbd,
                        state: state.clone(),
                    });
                    continue;
                }
                self.collect_jobs(base_sumprobs, node_idx, lbd, node.street, state, run_cfg, jobs)?;
            }
            return Ok(());
        }

        let player = node.player_acting;
        let gbd = self.board_tree.global_index(0, 0, node.street, local_bd);

        if run_cfg.internal && player == run_cfg.solve_player && node.street >= self.cfr_config.subgame_street {
            jobs.push(SubgameJob {
                node_idx,
                gbd,
                state: state.clone(),
            });
        }

        let children = self.base_tree.succs(node_idx).to_vec();
        let num_actions = children.len();
        if num_actions == 1 {
            return self.collect_jobs(base_sumprobs, children[0], local_bd, node.street, state, run_cfg, jobs);
        }

        let hands = self.board_tree.canonical_cards(node.street, gbd).to_vec();
        for (a, &child) in children.iter().enumerate() {
            let mut reach = state.reach.clone();
            for (h, hand) in hands.iter().enumerate() {
                let (hi, lo) = hand.cards;
                let enc = encode_hole_pair(hi.max(lo), hi.min(lo), self.max_card1());
                let offset = holding_offset_in(self.buckets, base_sumprobs, player, node.street, gbd, h);
                let prob = base_sumprobs.prob(player, node.street, node.nonterminal_id, offset, a, num_actions, node.default_succ_index as usize);
                reach[player as usize][enc] *= prob;
            }
            let new_state = TrunkState {
                reach,
                action_sequence: format!("{}{}", state.action_sequence, action_char(&node, a)),
            };
            self.collect_jobs(base_sumprobs, child, local_bd, node.street, &new_state, run_cfg, jobs)?;
        }
        Ok(())
    }

    fn solve_job(&self, base_sumprobs: &CFRValues, job: &SubgameJob, run_cfg: &ResolverRunConfig, out_dir: &Path) -> Result<()> {
        let node = self.base_tree.node(job.node_idx).clone();
        self.resolve_subgame(base_sumprobs, job.node_idx, &node, job.gbd, &job.state, run_cfg, out_dir)
    }

    /// Runs every collected subgame to completion and writes its result.
    /// `EndgameResolver` holds only shared (`&'a`) references and
    /// `base_sumprobs`/each job are read-only inputs, so distributing jobs
    /// over a rayon thread pool needs no interior mutability: the only
    /// mutable state (each job's freshly-allocated regret/sumprob store) is
    /// local to its own call and never crosses a thread boundary.
    #[cfg(feature = "rayon")]
    fn run_jobs(&self, base_sumprobs: &CFRValues, jobs: &[SubgameJob], run_cfg: &ResolverRunConfig, out_dir: &Path) -> Result<()> {
        use rayon::prelude::*;
        jobs.par_iter()
            .map(|job| self.solve_job(base_sumprobs, job, run_cfg, out_dir))
            .collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    #[cfg(not(feature = "rayon"))]
    fn run_jobs(&self, base_sumprobs: &CFRValues, jobs: &[SubgameJob], run_cfg: &ResolverRunConfig, out_dir: &Path) -> Result<()> {
        for job in jobs {
            self.solve_job(base_sumprobs, job, run_cfg, out_dir)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(&self, base_sumprobs: &CFRValues, node_idx: u32, local_bd: u32, last_st: Street, state: &TrunkState, run_cfg: &ResolverRunConfig, out_dir: &Path) -> Result<()> {
        let node = self.base_tree.node(node_idx).clone();
        if node.is_terminal() {
            return Ok(());
        }

        if node.street > last_st {
            let prev_gbd = self.board_tree.global_index(0, 0, last_st, local_bd);
            let (begin, end) = self.board_tree.succ_board_range(last_st, prev_gbd, node.street);
            for gbd in begin..end {
                let lbd = self.board_tree.local_index(0, 0, node.street, gbd);
                if node.street == self.cfr_config.subgame_street {
                    self.resolve_subgame(base_sumprobs, node_idx, &node, gbd, state, run_cfg, out_dir)?;
                    if !run_cfg.nested {
                        continue;
                    }
                }
                self.walk(base_sumprobs, node_idx, lbd, node.street, state, run_cfg, out_dir)?;
            }
            return Ok(());
        }

        let player = node.player_acting;
        let gbd = self.board_tree.global_index(0, 0, node.street, local_bd);

        if run_cfg.internal && player == run_cfg.solve_player && node.street >= self.cfr_config.subgame_street {
            self.resolve_subgame(base_sumprobs, node_idx, &node, gbd, state, run_cfg, out_dir)?;
        }

        let children = self.base_tree.succs(node_idx).to_vec();
        let num_actions = children.len();
        if num_actions == 1 {
            return self.walk(base_sumprobs, children[0], local_bd, node.street, state, run_cfg, out_dir);
        }

        let hands = self.board_tree.canonical_cards(node.street, gbd).to_vec();
        for (a, &child) in children.iter().enumerate() {
            let mut reach = state.reach.clone();
            for (h, hand) in hands.iter().enumerate() {
                let (hi, lo) = hand.cards;
                let enc = encode_hole_pair(hi.max(lo), hi.min(lo), self.max_card1());
                let offset = holding_offset_in(self.buckets, base_sumprobs, player, node.street, gbd, h);
                let prob = base_sumprobs.prob(player, node.street, node.nonterminal_id, offset, a, num_actions, node.default_succ_index as usize);
                reach[player as usize][enc] *= prob;
            }
            let new_state = TrunkState {
                reach,
                action_sequence: format!("{}{}", state.action_sequence, action_char(&node, a)),
            };
            self.walk(base_sumprobs, child, local_bd, node.street, &new_state, run_cfg, out_dir)?;
        }
        Ok(())
    }

    /// Re-solves the subtree rooted at `node_idx` (the first node on
    /// `gbd`), writing its resulting average strategy to disk.
    #[allow(clippy::too_many_arguments)]
    fn resolve_subgame(&self, base_sumprobs: &CFRValues, node_idx: u32, node: &BettingNode, gbd: u32, state: &TrunkState, run_cfg: &ResolverRunConfig, out_dir: &Path) -> Result<()> {
        let st = node.street;
        info!(
            "resolving subgame street={st} board={gbd} seq={:?} method={:?}",
            state.action_sequence,
            run_cfg.method
        );

        let subtree = self.base_tree.build_subtree(node_idx);
        let mut base_restricted = CFRValues::read_subtree_from_full(base_sumprobs, node_idx, self.base_tree, &subtree, subtree.root(), None)?;
        let store_root = StoreRoot { root_bd_st: st, root_bd: gbd };

        let hands = self.board_tree.canonical_cards(st, gbd).to_vec();
        let own_reach = |p: u8| -> Vec<f32> {
            hands
                .iter()
                .map(|hand| {
                    let (hi, lo) = hand.cards;
                    state.reach[p as usize][encode_hole_pair(hi.max(lo), hi.min(lo), self.max_card1())]
                })
                .collect()
        };
        let p0_reach = own_reach(0);
        let p1_reach = own_reach(1);
        if p0_reach.iter().all(|&x| x == 0.0) || p1_reach.iter().all(|&x| x == 0.0) {
            warn!("{}", SolverError::ZeroOppReach { street: st, board: gbd });
            return self.write_uniform_checkdown(&subtree, out_dir, &state.action_sequence, gbd, run_cfg);
        }

        let (mut p0_cvs, mut p1_cvs) = self.compute_cvs(&subtree, &mut base_restricted, store_root, st, &hands, &p0_reach, &p1_reach)?;
        self.zero_sum_adjust(&mut p0_cvs, &mut p1_cvs, &hands, &p0_reach, &p1_reach, &state.reach[0], &state.reach[1], node.pot_size as f64);
        self.floor_cvs(&mut p0_cvs, &hands, node.last_bet_to as f32, &state.reach[1]);
        self.floor_cvs(&mut p1_cvs, &hands, node.last_bet_to as f32, &state.reach[0]);

        let target = run_cfg.solve_player;
        let villain = 1 - target;
        let (target_reach, villain_reach) = if target == 0 { (&p0_reach, &p1_reach) } else { (&p1_reach, &p0_reach) };
        let villain_cvs = if villain == 0 { &p0_cvs } else { &p1_cvs };

        let (regrets, sumprobs) = match run_cfg.method {
            ResolveMethod::Unsafe => self.run_unsafe(&subtree, store_root, &hands, st, target, villain, target_reach, villain_reach, run_cfg.num_endgame_iterations),
            ResolveMethod::CfrD => self.run_cfrd(&subtree, store_root, &hands, st, target, villain, target_reach, villain_reach, villain_cvs, run_cfg.num_endgame_iterations),
            ResolveMethod::MaxMargin => self.run_maxmargin(&subtree, store_root, &hands, st, target, villain, target_reach, villain_reach, villain_cvs, run_cfg.num_endgame_iterations),
            ResolveMethod::Combined => {
                self.run_combined(&subtree, store_root, &hands, st, target, villain, target_reach, villain_reach, villain_cvs, run_cfg.num_endgame_iterations)
            }
        };
        let _ = regrets;

        self.write_endgame(&sumprobs, &subtree, out_dir, &state.action_sequence, store_root, run_cfg)
    }

    /// Computes each player's counterfactual value at the subgame root under
    /// the base strategy, given the propagated trunk reach as the
    /// opponent's initial distribution. Must agree with the same computation
    /// run directly through `vcfr::process` at the same node with the same
    /// reach.
    #[allow(clippy::too_many_arguments)]
    fn compute_cvs(&self, subtree: &BettingTree, base: &CFRValues, store_root: StoreRoot, st: Street, hands: &[CanonicalHand], p0_reach: &[f32], p1_reach: &[f32]) -> Result<(Vec<f32>, Vec<f32>)> {
        let max_card1 = self.max_card1();
        let mut scratch = CFRValues::new(true, [true, true], store_root, HashMap::new());

        let p0_cvs = {
            let dense = dense_from_hand_values(hands, p1_reach, max_card1);
            let state = self.opp_state_from_dense(dense);
            let ctx = self.cv_ctx(0, store_root);
            vcfr::process(&ctx, &mut base.clone_for_cv(), &mut scratch, subtree.root(), 0, &state, st)
        };
        let p1_cvs = {
            let dense = dense_from_hand_values(hands, p0_reach, max_card1);
            let state = self.opp_state_from_dense(dense);
            let ctx = self.cv_ctx(1, store_root);
            vcfr::process(&ctx, &mut base.clone_for_cv(), &mut scratch, subtree.root(), 0, &state, st)
        };
        Ok((p0_cvs, p1_cvs))
    }

    /// Computes, without seeding or running any resolve, each player's
    /// counterfactual value at every subgame root reachable from the trunk
    /// (steps 3a-3b of `resolve_subgame`, skipping the seed-and-run step).
    /// Backs the standalone `compute_cv` driver, whose whole job is this
    /// dynamic-CV extraction — the same computation `resolve_subgame` does
    /// internally, exposed on its own so it can be inspected or diffed
    /// against a subsequent re-solve without paying for one.
    pub fn compute_root_cvs(&self, base_sumprobs: &CFRValues, zero_sum: bool, it: u32, kind: &str, out_dir: &Path) -> Result<()> {
        let deck = self.game_params.deck_size;
        let max_card1 = self.max_card1();
        let full = VcfrState::initial(deck, max_card1, &[]).opp_probs;
        let state = TrunkState {
            reach: [full.clone(), full],
            action_sequence: String::new(),
        };
        let collect_cfg = ResolverRunConfig {
            method: ResolveMethod::Unsafe,
            solve_player: 0,
            asym_player: 0,
            nested: false,
            internal: false,
            num_endgame_iterations: 0,
        };
        let mut jobs = Vec::new();
        self.collect_jobs(base_sumprobs, self.base_tree.root(), 0, 0, &state, &collect_cfg, &mut jobs)?;
        info!("computing CVs at {} subgame root(s)", jobs.len());

        for job in &jobs {
            let node = self.base_tree.node(job.node_idx).clone();
            let st = node.street;
            let hands = self.board_tree.canonical_cards(st, job.gbd).to_vec();
            let own_reach = |p: u8| -> Vec<f32> {
                hands
                    .iter()
                    .map(|hand| {
                        let (hi, lo) = hand.cards;
                        job.state.reach[p as usize][encode_hole_pair(hi.max(lo), hi.min(lo), max_card1)]
                    })
                    .collect()
            };
            let p0_reach = own_reach(0);
            let p1_reach = own_reach(1);
            if p0_reach.iter().all(|&x| x == 0.0) || p1_reach.iter().all(|&x| x == 0.0) {
                warn!("{}", SolverError::ZeroOppReach { street: st, board: job.gbd });
                continue;
            }

            let subtree = self.base_tree.build_subtree(job.node_idx);
            let base_restricted = CFRValues::read_subtree_from_full(base_sumprobs, job.node_idx, self.base_tree, &subtree, subtree.root(), None)?;
            let store_root = StoreRoot { root_bd_st: st, root_bd: job.gbd };
            let (mut p0_cvs, mut p1_cvs) = self.compute_cvs(&subtree, &base_restricted, store_root, st, &hands, &p0_reach, &p1_reach)?;
            if zero_sum {
                self.zero_sum_adjust(&mut p0_cvs, &mut p1_cvs, &hands, &p0_reach, &p1_reach, &job.state.reach[0], &job.state.reach[1], node.pot_size as f64);
            }

            for (player, cvs) in [(0u8, &p0_cvs), (1u8, &p1_cvs)] {
                let dir = crate::paths::cv_dir(&out_dir.to_path_buf(), kind, it, player);
                let path = crate::paths::cv_path(&dir, &job.state.action_sequence, job.gbd);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|source| SolverError::Io { path: parent.to_path_buf(), source })?;
                }
                let bytes: Vec<u8> = cvs.iter().flat_map(|v| v.to_le_bytes()).collect();
                fs::write(&path, bytes).map_err(|source| SolverError::Io { path: path.clone(), source })?;
            }
        }
        Ok(())
    }

    fn opp_state_from_dense(&self, opp_probs: Vec<f32>) -> VcfrState {
        let deck_size = self.game_params.deck_size;
        let total_card_probs = recompute_total_card_probs(&opp_probs, deck_size, self.max_card1());
        let sum_opp_probs: f32 = total_card_probs.iter().sum::<f32>() / 2.0;
        VcfrState {
            opp_probs,
            sum_opp_probs,
            total_card_probs,
            action_sequence: String::new(),
        }
    }

    fn cv_ctx(&self, target_player: u8, store_root: StoreRoot) -> VcfrContext {
        VcfrContext {
            mode: VcfrMode::CfValue,
            target_player,
            board_tree: self.board_tree,
            betting_tree: self.base_tree,
            buckets: self.buckets,
            config: self.cfr_config,
            discount: DiscountParams::unit(),
            max_card1: self.max_card1(),
            root_bd_st: store_root.root_bd_st,
            root_bd: store_root.root_bd,
            warmup: false,
            prune: false,
        }
    }

    /// For each canonical hand, the opponent reach mass held by hands that
    /// do not share either of its two cards (inclusion-exclusion over the
    /// per-card marginals `recompute_total_card_probs` produces).
    fn blocked_reach(&self, hands: &[CanonicalHand], opp_dense_reach: &[f32]) -> Vec<f32> {
        let deck_size = self.game_params.deck_size;
        let totals = recompute_total_card_probs(opp_dense_reach, deck_size, self.max_card1());
        let sum_opp: f32 = totals.iter().sum::<f32>() / 2.0;
        hands
            .iter()
            .map(|hand| {
                let (hi, lo) = hand.cards;
                let enc = encode_hole_pair(hi.max(lo), hi.min(lo), self.max_card1());
                sum_opp - totals[hi as usize] - totals[lo as usize] + opp_dense_reach[enc]
            })
            .collect()
    }

    /// Subtracts a per-hand share of the joint-weighted mean CV from both
    /// arrays, so the pair sums to ~0 as a real zero-sum subgame must. Each
    /// hand's share is scaled by the *opponent's* blocked reach mass against
    /// that hand's own cards (own-reach-weighted means share one
    /// blocked-joint-probability denominator) rather than by a flat
    /// constant, since the CVs are reach-weighted EV contributions and a
    /// bare subtraction would be dimensionally inconsistent. Logs rather
    /// than fails if a residual survives.
    #[allow(clippy::too_many_arguments)]
    fn zero_sum_adjust(&self, p0_cvs: &mut [f32], p1_cvs: &mut [f32], hands: &[CanonicalHand], p0_reach: &[f32], p1_reach: &[f32], p0_dense_reach: &[f32], p1_dense_reach: &[f32], pot: f64) {
        let blocked_p0 = self.blocked_reach(hands, p0_dense_reach);
        let blocked_p1 = self.blocked_reach(hands, p1_dense_reach);

        let mean_cvs = |cvs: &[f32], own_reach: &[f32]| -> f64 { cvs.iter().zip(own_reach).map(|(&c, &r)| c as f64 * r as f64).sum() };
        let sum_p0_cvs = mean_cvs(p0_cvs, p0_reach);
        let sum_p1_cvs = mean_cvs(p1_cvs, p1_reach);
        let sum_joint_probs: f64 = p1_reach.iter().zip(blocked_p0.iter()).map(|(&r, &b)| r as f64 * b as f64).sum();

        if sum_joint_probs.abs() < 1e-12 {
            return;
        }

        let mean0 = sum_p0_cvs / sum_joint_probs;
        let mean1 = sum_p1_cvs / sum_joint_probs;
        let adj = -((mean0 + mean1) / 2.0) as f32;

        for i in 0..p0_cvs.len() {
            p0_cvs[i] += adj * blocked_p1[i];
        }
        for i in 0..p1_cvs.len() {
            p1_cvs[i] += adj * blocked_p0[i];
        }

        let adj_sum_p0_cvs = mean_cvs(p0_cvs, p0_reach);
        let adj_sum_p1_cvs = mean_cvs(p1_cvs, p1_reach);
        let residual = (adj_sum_p0_cvs + adj_sum_p1_cvs) / sum_joint_probs;
        if residual.abs() > 1e-3 * pot.max(1.0) {
            warn!("{}", SolverError::ZeroSumResidual { residual, pot });
        }
    }

    /// Floors each CV at `-last_bet_to * (blocked opponent reach mass)`: a
    /// hand cannot lose more than what is still in front of it.
    fn floor_cvs(&self, cvs: &mut [f32], hands: &[CanonicalHand], last_bet_to: f32, opp_dense_reach: &[f32]) {
        let blocked = self.blocked_reach(hands, opp_dense_reach);
        for (i, &b) in blocked.iter().enumerate() {
            let floor = -last_bet_to * b;
            if cvs[i] < floor {
                cvs[i] = floor;
            }
        }
    }

    fn fresh_store(&self, subtree: &BettingTree, store_root: StoreRoot, is_sumprobs: bool) -> CFRValues {
        let num_streets = self.game_params.num_streets();
        let layouts = CFRValues::infer_layouts(subtree, self.cfr_config, self.buckets, num_streets, false);
        let mut store = CFRValues::new(is_sumprobs, [true, true], store_root, layouts);
        store.allocate_and_clear_doubles(subtree, self.board_tree, self.buckets, None);
        store
    }

    #[allow(clippy::too_many_arguments)]
    fn run_half_iteration(&self, subtree: &BettingTree, store_root: StoreRoot, regrets: &mut CFRValues, sumprobs: &mut CFRValues, target: u8, opp_reach_dense: Vec<f32>, discount: DiscountParams) -> Vec<f32> {
        let state = self.opp_state_from_dense(opp_reach_dense);
        let ctx = VcfrContext {
            mode: VcfrMode::ResolverCfr,
            target_player: target,
            board_tree: self.board_tree,
            betting_tree: subtree,
            buckets: self.buckets,
            config: self.cfr_config,
            discount,
            max_card1: self.max_card1(),
            root_bd_st: store_root.root_bd_st,
            root_bd: store_root.root_bd,
            warmup: false,
            prune: false,
        };
        vcfr::process(&ctx, regrets, sumprobs, subtree.root(), 0, &state, store_root.root_bd_st)
    }

    /// UNSAFE: the propagated trunk reach is used as-is, for both players,
    /// for the entire resolve. Cheapest and least theoretically sound of the
    /// four (can hand a fixed-strategy opponent an arbitrarily large gain).
    #[allow(clippy::too_many_arguments)]
    fn run_unsafe(&self, subtree: &BettingTree, store_root: StoreRoot, hands: &[CanonicalHand], st: Street, target: u8, villain: u8, target_reach: &[f32], villain_reach: &[f32], num_its: u32) -> (CFRValues, CFRValues) {
        let mut regrets = self.fresh_store(subtree, store_root, false);
        let mut sumprobs = self.fresh_store(subtree, store_root, true);
        let max_card1 = self.max_card1();
        let villain_dense = dense_from_hand_values(hands, villain_reach, max_card1);
        let target_dense = dense_from_hand_values(hands, target_reach, max_card1);

        for t in 0..num_its {
            let discount = DiscountParams::new(t);
            let _ = self.run_half_iteration(subtree, store_root, &mut regrets, &mut sumprobs, target, villain_dense.clone(), discount);
            let _ = self.run_half_iteration(subtree, store_root, &mut regrets, &mut sumprobs, villain, target_dense.clone(), discount);
        }
        (regrets, sumprobs)
    }

    /// CFR-D: villain's reach at the subgame root is mixed each iteration
    /// between "enter" and an implicit "take the trunk CV" leaf, via a
    /// per-hand meta-regret over that binary choice.
    #[allow(clippy::too_many_arguments)]
    fn run_cfrd(&self, subtree: &BettingTree, store_root: StoreRoot, hands: &[CanonicalHand], st: Street, target: u8, villain: u8, target_reach: &[f32], villain_reach: &[f32], villain_cvs: &[f32], num_its: u32) -> (CFRValues, CFRValues) {
        let mut regrets = self.fresh_store(subtree, store_root, false);
        let mut sumprobs = self.fresh_store(subtree, store_root, true);
        let max_card1 = self.max_card1();
        let target_dense = dense_from_hand_values(hands, target_reach, max_card1);

        let mut meta_reg = vec![[0.0f32; 2]; hands.len()]; // [enter, take]
        for t in 0..num_its {
            let discount = DiscountParams::new(t);
            let mix: Vec<f32> = meta_reg
                .iter()
                .map(|r| {
                    let enter = r[0].max(0.0);
                    let take = r[1].max(0.0);
                    let sum = enter + take;
                    if sum > 0.0 {
                        enter / sum
                    } else {
                        0.5
                    }
                })
                .collect();
            let villain_mixed: Vec<f32> = villain_reach.iter().zip(&mix).map(|(r, m)| r * m).collect();
            let villain_dense = dense_from_hand_values(hands, &villain_mixed, max_card1);

            let _ = self.run_half_iteration(subtree, store_root, &mut regrets, &mut sumprobs, target, villain_dense, discount);
            let villain_vals = self.run_half_iteration(subtree, store_root, &mut regrets, &mut sumprobs, villain, target_dense.clone(), discount);

            for i in 0..hands.len() {
                let mixed_val = mix[i] * villain_vals[i] + (1.0 - mix[i]) * villain_cvs[i];
                meta_reg[i][0] += villain_vals[i] - mixed_val;
                meta_reg[i][1] += villain_cvs[i] - mixed_val;
            }
        }
        (regrets, sumprobs)
    }

    /// MAXMARGIN: a simpler single-valued per-hand margin regret (rather
    /// than CFR-D's explicit two-option meta-CFR) directly sets how much of
    /// the trunk reach the villain brings into the subgame.
    #[allow(clippy::too_many_arguments)]
    fn run_maxmargin(&self, subtree: &BettingTree, store_root: StoreRoot, hands: &[CanonicalHand], st: Street, target: u8, villain: u8, target_reach: &[f32], villain_reach: &[f32], villain_cvs: &[f32], num_its: u32) -> (CFRValues, CFRValues) {
        let mut regrets = self.fresh_store(subtree, store_root, false);
        let mut sumprobs = self.fresh_store(subtree, store_root, true);
        let max_card1 = self.max_card1();
        let target_dense = dense_from_hand_values(hands, target_reach, max_card1);

        let mut margin_reg = vec![0.0f32; hands.len()];
        for t in 0..num_its {
            let discount = DiscountParams::new(t);
            let reach_mult: Vec<f32> = margin_reg.iter().map(|&r| r.clamp(0.0, 1.0)).collect();
            let villain_mixed: Vec<f32> = villain_reach.iter().zip(&reach_mult).map(|(r, m)| r * m).collect();
            let villain_dense = dense_from_hand_values(hands, &villain_mixed, max_card1);

            let _ = self.run_half_iteration(subtree, store_root, &mut regrets, &mut sumprobs, target, villain_dense, discount);
            let villain_vals = self.run_half_iteration(subtree, store_root, &mut regrets, &mut sumprobs, villain, target_dense.clone(), discount);

            let margins: Vec<f32> = villain_vals.iter().zip(villain_cvs).map(|(v, cv)| v - cv).collect();
            let avg_margin = crate::utility::weighted_mean(&margins, villain_reach);
            for i in 0..hands.len() {
                margin_reg[i] += margins[i] - avg_margin;
            }
        }
        (regrets, sumprobs)
    }

    /// COMBINED: blends UNSAFE's always-enter reach with CFR-D's per-hand
    /// mix, the CFR-D contribution capped at `cfg.cfrd_cap`, plus a uniform
    /// floor of `cfg.uniform_add` so no hand's reach collapses to exactly 0.
    /// The three constants are exposed as configuration fields with
    /// documented defaults; see `DESIGN.md` for the exact blend formula
    /// chosen here.
    #[allow(clippy::too_many_arguments)]
    fn run_combined(&self, subtree: &BettingTree, store_root: StoreRoot, hands: &[CanonicalHand], st: Street, target: u8, villain: u8, target_reach: &[f32], villain_reach: &[f32], villain_cvs: &[f32], num_its: u32) -> (CFRValues, CFRValues) {
        let mut regrets = self.fresh_store(subtree, store_root, false);
        let mut sumprobs = self.fresh_store(subtree, store_root, true);
        let max_card1 = self.max_card1();
        let target_dense = dense_from_hand_values(hands, target_reach, max_card1);
        let cap = self.cfr_config.cfrd_cap;
        let floor = self.cfr_config.uniform_add;

        let mut meta_reg = vec![[0.0f32; 2]; hands.len()];
        for t in 0..num_its {
            let discount = DiscountParams::new(t);
            let mix: Vec<f32> = meta_reg
                .iter()
                .map(|r| {
                    let enter = r[0].max(0.0);
                    let take = r[1].max(0.0);
                    let sum = enter + take;
                    if sum > 0.0 {
                        enter / sum
                    } else {
                        1.0
                    }
                })
                .collect();
            let combined_mult: Vec<f32> = mix.iter().map(|&m| ((1.0 - cap) + cap * m).max(floor)).collect();
            let villain_mixed: Vec<f32> = villain_reach.iter().zip(&combined_mult).map(|(r, m)| r * m).collect();
            let villain_dense = dense_from_hand_values(hands, &villain_mixed, max_card1);

            let _ = self.run_half_iteration(subtree, store_root, &mut regrets, &mut sumprobs, target, villain_dense, discount);
            let villain_vals = self.run_half_iteration(subtree, store_root, &mut regrets, &mut sumprobs, villain, target_dense.clone(), discount);

            for i in 0..hands.len() {
                let mixed_val = mix[i] * villain_vals[i] + (1.0 - mix[i]) * villain_cvs[i];
                meta_reg[i][0] += villain_vals[i] - mixed_val;
                meta_reg[i][1] += villain_cvs[i] - mixed_val;
            }
        }
        (regrets, sumprobs)
    }

    /// `ZeroOppReach` fallback: never propagated as an error, instead
    /// writes a store whose current-strategy probe falls back to
    /// `default_succ_index` everywhere, i.e. an empty store yielding a
    /// uniform check/call strategy.
    fn write_uniform_checkdown(&self, subtree: &BettingTree, out_dir: &Path, action_sequence: &str, gbd: u32, run_cfg: &ResolverRunConfig) -> Result<()> {
        let store_root = StoreRoot {
            root_bd_st: self.cfr_config.subgame_street,
            root_bd: gbd,
        };
        let sumprobs = self.fresh_store(subtree, store_root, true);
        self.write_endgame(&sumprobs, subtree, out_dir, action_sequence, store_root, run_cfg)
    }

    /// Depth-first walk over `subtree`, writing the solve player's per-hand
    /// sumprob vector at every choice node of theirs to
    /// `<out_dir>/<method>.../<action_sequence>/<gbd>` (`paths::endgame_dir`
    /// / `paths::endgame_leaf_path`).
    fn write_endgame(&self, sumprobs: &CFRValues, subtree: &BettingTree, out_dir: &Path, trunk_action_sequence: &str, store_root: StoreRoot, run_cfg: &ResolverRunConfig) -> Result<()> {
        self.write_walk(sumprobs, subtree, subtree.root(), 0, store_root.root_bd_st, out_dir, trunk_action_sequence, run_cfg)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_walk(&self, sumprobs: &CFRValues, subtree: &BettingTree, node_idx: u32, local_bd: u32, last_st: Street, out_dir: &Path, action_sequence: &str, run_cfg: &ResolverRunConfig) -> Result<()> {
        let node = subtree.node(node_idx).clone();
        if node.is_terminal() {
            return Ok(());
        }

        if node.street > last_st {
            let prev_gbd = self.board_tree.global_index(0, 0, last_st, local_bd);
            let (begin, end) = self.board_tree.succ_board_range(last_st, prev_gbd, node.street);
            for gbd in begin..end {
                let lbd = self.board_tree.local_index(0, 0, node.street, gbd);
                self.write_walk(sumprobs, subtree, node_idx, lbd, node.street, out_dir, action_sequence, run_cfg)?;
            }
            return Ok(());
        }

        let gbd = self.board_tree.global_index(0, 0, node.street, local_bd);
        if node.player_acting == run_cfg.solve_player {
            if let Some(storage) = sumprobs.values(run_cfg.solve_player, node.street, node.nonterminal_id) {
                let path = crate::paths::endgame_leaf_path(&out_dir.to_path_buf(), action_sequence, gbd);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|source| SolverError::Io { path: parent.to_path_buf(), source })?;
                }
                let bytes = crate::strategy_store::flat_encode_pub(storage);
                std::fs::write(&path, bytes).map_err(|source| SolverError::Io { path, source })?;
            }
        }

        let children = subtree.succs(node_idx).to_vec();
        for (a, &child) in children.iter().enumerate() {
            let child_seq = format!("{}{}", action_sequence, action_char(&node, a));
            self.write_walk(sumprobs, subtree, child, local_bd, node.street, out_dir, &child_seq, run_cfg)?;
        }
        Ok(())
    }
}

fn action_char(node: &BettingNode, index: usize) -> char {
    if node.fold_succ_index != NO_SUCC && index == node.fold_succ_index as usize {
        'f'
    } else if node.call_succ_index != NO_SUCC && index == node.call_succ_index as usize {
        'c'
    } else {
        // Bet/raise actions: distinguished by ordinal position among the
        // node's non-fold/non-call succs rather than by size, matching the
        // trunk's own `BettingNode::succ_begin`-relative addressing.
        std::char::from_digit((index % 10) as u32, 10).unwrap_or('b')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet_size::{BetSize, BetSizeOptions};
    use crate::betting_tree::BettingAbstraction;
    use crate::bucket::IdentityBucketMap;
    use crate::game_config::GameParams;
    use crate::trainer::Trainer;

    fn kuhn_fixture() -> (GameParams, BoardTree, BettingTree, StreetBuckets, CfrConfig) {
        let params = GameParams::kuhn();
        let board_tree = BoardTree::build(&params);
        let opts = BetSizeOptions::try_from_sizes(vec![BetSize::PotRelative(1.0)], vec![]).unwrap();
        let abstraction = BettingAbstraction::uniform(params.num_streets(), opts, 1);
        let betting_tree = BettingTree::build(&abstraction, &params);
        let buckets = StreetBuckets::new(vec![Box::new(IdentityBucketMap::build(&board_tree))]);
        let cfg = CfrConfig {
            sumprob_streets: vec![0],
            subgame_street: 0,
            num_endgame_iterations: 20,
            ..CfrConfig::default()
        };
        (params, board_tree, betting_tree, buckets, cfg)
    }

    #[test]
    fn unsafe_resolve_runs_to_completion_and_writes_files() {
        let (_params, board_tree, betting_tree, buckets, cfg) = kuhn_fixture();
        let trainer = Trainer::new(&board_tree, &betting_tree, &buckets, &cfg, 4);
        let (mut regrets, mut sumprobs) = trainer.new_values();
        let _ = trainer.train(&mut regrets, &mut sumprobs, 50, 0.0);

        let params = GameParams::kuhn();
        let resolver = EndgameResolver::new(&params, &board_tree, &betting_tree, &buckets, &cfg);
        let run_cfg = ResolverRunConfig {
            method: ResolveMethod::Unsafe,
            solve_player: 0,
            asym_player: 0,
            nested: false,
            internal: false,
            num_endgame_iterations: 20,
        };
        let dir = std::env::temp_dir().join(format!("resolver-test-{}", std::process::id()));
        let result = resolver.run(&sumprobs, &run_cfg, &dir);
        assert!(result.is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn zero_sum_adjust_drives_pair_mean_to_zero() {
        let (_params, board_tree, betting_tree, buckets, cfg) = kuhn_fixture();
        let params = GameParams::kuhn();
        let resolver = EndgameResolver::new(&params, &board_tree, &betting_tree, &buckets, &cfg);
        let max_card1 = resolver.max_card1();
        let hands = board_tree.canonical_cards(0, 0).to_vec();

        let mut p0 = vec![3.0, -1.0];
        let mut p1 = vec![2.0, 0.5];
        let reach = vec![1.0, 1.0];
        let dense = dense_from_hand_values(&hands, &reach, max_card1);
        resolver.zero_sum_adjust(&mut p0, &mut p1, &hands, &reach, &reach, &dense, &dense, 10.0);

        let blocked = resolver.blocked_reach(&hands, &dense);
        let sum_joint: f64 = reach.iter().zip(blocked.iter()).map(|(&r, &b)| r as f64 * b as f64).sum();
        let mean0: f64 = p0.iter().zip(&reach).map(|(&c, &r)| c as f64 * r as f64).sum::<f64>() / sum_joint;
        let mean1: f64 = p1.iter().zip(&reach).map(|(&c, &r)| c as f64 * r as f64).sum::<f64>() / sum_joint;
        assert!((mean0 + mean1).abs() < 1e-4);
    }
}
