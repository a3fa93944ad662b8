//! Vectorised CFR Engine.
//!
//! A single recursive walk over the betting tree, parametrised by a target
//! player and a [`VcfrMode`], that produces — per call — a value vector over
//! every canonical hand on the current board. One call tree traversal is a
//! half-iteration: it updates regrets/sumprobs for exactly one player while
//! treating the other's strategy as fixed.
//!
//! The four historical subclasses (best response, CV extractor, resolver
//! CFR, plain training) collapse onto the tagged `VcfrMode` below plus the
//! shared `process`/`our_choice`/`opp_choice`/`street_initial` dispatch —
//! one recursion, mode-gated at the two points (regret update, sumprob
//! accumulation) where behaviour actually diverges.

use crate::betting_tree::{BettingNode, BettingTree, Street, TerminalKind};
use crate::board_tree::{encode_hole_pair, BoardTree, CanonicalHand};
use crate::bucket::StreetBuckets;
use crate::card::Card;
use crate::cfr_config::CfrConfig;
use crate::strategy_store::{CFRValues, Storage};
use crate::utility::clamp_regret;

/// What a VCFR pass is for. Training updates both regrets and sumprobs;
/// the value-only modes never write storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcfrMode {
    /// Ordinary (discounted) CFR training half-iteration.
    Train,
    /// Best-response value pass: opponent plays `argmax`, no updates.
    BestResponse,
    /// Counterfactual-value extraction against a fixed base strategy.
    CfValue,
    /// Constrained CFR run on a resolver's local subtree.
    ResolverCfr,
}

impl VcfrMode {
    fn updates_regrets(self) -> bool {
        matches!(self, VcfrMode::Train | VcfrMode::ResolverCfr)
    }

    fn accumulates_sumprobs(self) -> bool {
        matches!(self, VcfrMode::Train | VcfrMode::ResolverCfr)
    }

    fn uses_best_response(self) -> bool {
        matches!(self, VcfrMode::BestResponse)
    }
}

/// Coefficients for one discounted-CFR iteration (teacher's `DiscountParams`,
/// generalised to the vectorised per-board recursion below).
#[derive(Debug, Clone, Copy)]
pub struct DiscountParams {
    pub alpha_t: f32,
    pub beta_t: f32,
    pub gamma_t: f32,
}

impl DiscountParams {
    pub fn new(current_iteration: u32) -> Self {
        let nearest_lower_power_of_4 = match current_iteration {
            0 => 0,
            x => 1 << ((x.leading_zeros() ^ 31) & !1),
        };
        let t_alpha = (current_iteration as i32 - 1).max(0) as f64;
        let t_gamma = (current_iteration - nearest_lower_power_of_4) as f64;
        let pow_alpha = t_alpha * t_alpha.sqrt();
        let pow_gamma = (t_gamma / (t_gamma + 1.0)).powi(3);
        Self {
            alpha_t: (pow_alpha / (pow_alpha + 1.0)) as f32,
            beta_t: 0.5,
            gamma_t: pow_gamma as f32,
        }
    }

    pub fn unit() -> Self {
        Self {
            alpha_t: 1.0,
            beta_t: 1.0,
            gamma_t: 1.0,
        }
    }
}

/// Everything fixed for the duration of one recursive walk.
pub struct VcfrContext<'a> {
    pub mode: VcfrMode,
    pub target_player: u8,
    pub board_tree: &'a BoardTree,
    pub betting_tree: &'a BettingTree,
    pub buckets: &'a StreetBuckets,
    pub config: &'a CfrConfig,
    pub discount: DiscountParams,
    pub max_card1: u32,
    pub root_bd_st: Street,
    pub root_bd: u32,
    pub warmup: bool,
    /// When true, opp-choice branches whose resulting `sum_opp_probs` is zero
    /// are skipped entirely (faster, and safe whenever only weighted sums of
    /// the returned values are read back). Leave false when a caller needs a
    /// value reported for every hand even along zero-reach branches.
    pub prune: bool,
}

impl<'a> VcfrContext<'a> {
    fn global_index(&self, st: Street, local_bd: u32) -> u32 {
        self.board_tree.global_index(self.root_bd_st, self.root_bd, st, local_bd)
    }
}

/// State threaded through the recursion: one player's reach distribution
/// and the running aggregates derived from it.
#[derive(Debug, Clone)]
pub struct VcfrState {
    /// Dense, encoding-indexed reach vector: `opp_probs[hi*max_card1+lo]`.
    pub opp_probs: Vec<f32>,
    pub sum_opp_probs: f32,
    /// `total_card_probs[c]` = sum of `opp_probs[hand]` over hands containing
    /// card `c`.
    pub total_card_probs: Vec<f32>,
    pub action_sequence: String,
}

impl VcfrState {
    /// Builds the root state for a fresh walk: every legal hole-card pair at
    /// full reach (1.0), honoring card removal against `dead_cards`.
    pub fn initial(deck_size: u8, max_card1: u32, dead_cards: &[Card]) -> Self {
        let n = (max_card1 * max_card1) as usize;
        let mut opp_probs = vec![0.0f32; n];
        for hi in 0..deck_size {
            if dead_cards.contains(&hi) {
                continue;
            }
            for lo in 0..hi {
                if dead_cards.contains(&lo) {
                    continue;
                }
                opp_probs[encode_hole_pair(hi, lo, max_card1)] = 1.0;
            }
        }
        let total_card_probs = recompute_total_card_probs(&opp_probs, deck_size, max_card1);
        let sum_opp_probs: f32 = opp_probs.iter().sum();
        Self {
            opp_probs,
            sum_opp_probs,
            total_card_probs,
            action_sequence: String::new(),
        }
    }
}

/// Rebuilds the per-card blocked-mass totals a dense reach vector implies.
/// Exposed crate-wide: the resolver needs the same computation to floor CVs
/// against a reach vector it did not obtain from a `VcfrState`.
pub(crate) fn recompute_total_card_probs(opp_probs: &[f32], deck_size: u8, max_card1: u32) -> Vec<f32> {
    let mut totals = vec![0.0f32; deck_size as usize];
    for hi in 0..deck_size {
        for lo in 0..hi {
            let p = opp_probs[encode_hole_pair(hi, lo, max_card1)];
            if p != 0.0 {
                totals[hi as usize] += p;
                totals[lo as usize] += p;
            }
        }
    }
    totals
}

/// Entry point matching the node-dispatch contract: terminal -> showdown or
/// fold; street boundary -> fan out over successor boards; otherwise ->
/// our_choice or opp_choice depending on who is acting.
pub fn process(
    ctx: &VcfrContext,
    regrets: &mut CFRValues,
    sumprobs: &mut CFRValues,
    node_idx: u32,
    local_bd: u32,
    state: &VcfrState,
    last_st: Street,
) -> Vec<f32> {
    let node = ctx.betting_tree.node(node_idx).clone();

    if node.is_terminal() {
        return match node.terminal {
            TerminalKind::Showdown => showdown(ctx, &node, local_bd, state),
            TerminalKind::Fold => fold(ctx, &node, local_bd, state),
            TerminalKind::NonTerminal => unreachable!(),
        };
    }

    if node.street > last_st {
        return street_initial(ctx, regrets, sumprobs, node_idx, &node, local_bd, state, last_st);
    }

    if node.player_acting == ctx.target_player {
        our_choice(ctx, regrets, sumprobs, node_idx, &node, local_bd, state)
    } else {
        opp_choice(ctx, regrets, sumprobs, node_idx, &node, local_bd, state)
    }
}

/// Three-pass-equivalent sweep over hands sorted by strength (already the
/// iteration order `canonical_cards` guarantees on the last street), every
/// hand's win/loss mass computed directly against blockers. `O(n^2)` rather
/// than the linear running-aggregate sweep a tabular implementation would
/// use — fine at the hand counts this engine is exercised at.
fn showdown(ctx: &VcfrContext, node: &BettingNode, local_bd: u32, state: &VcfrState) -> Vec<f32> {
    let gbd = ctx.global_index(node.street, local_bd);
    let hands = ctx.board_tree.canonical_cards(node.street, gbd);
    let half_pot = node.pot_size as f32 / 2.0;

    let mut val = vec![0.0f32; hands.len()];
    for (i, hand) in hands.iter().enumerate() {
        let (a, b) = hand.cards;
        let mut win_mass = 0.0f32;
        let mut lose_mass = 0.0f32;
        for (j, other) in hands.iter().enumerate() {
            if i == j {
                continue;
            }
            let (c, d) = other.cards;
            if c == a || c == b || d == a || d == b {
                continue;
            }
            let enc = encode_hole_pair(c.max(d), c.min(d), ctx.max_card1);
            let p = state.opp_probs[enc];
            if other.hand_value < hand.hand_value {
                win_mass += p;
            } else if other.hand_value > hand.hand_value {
                lose_mass += p;
            }
        }
        val[i] = (win_mass - lose_mass) * half_pot;
    }
    val
}

/// `val[i] = sign * last_bet_to * (sum_opp_probs - total_card_probs[hi] -
/// total_card_probs[lo] + opp_probs[enc])`.
fn fold(ctx: &VcfrContext, node: &BettingNode, local_bd: u32, state: &VcfrState) -> Vec<f32> {
    let gbd = ctx.global_index(node.street, local_bd);
    let hands = ctx.board_tree.canonical_cards(node.street, gbd);
    let sign = if ctx.target_player == node.player_acting { 1.0 } else { -1.0 };

    hands
        .iter()
        .map(|hand| {
            let (hi, lo) = hand.cards;
            let enc = encode_hole_pair(hi.max(lo), hi.min(lo), ctx.max_card1);
            sign * node.last_bet_to as f32
                * (state.sum_opp_probs - state.total_card_probs[hi as usize] - state.total_card_probs[lo as usize]
                    + state.opp_probs[enc])
        })
        .collect()
}

/// Flat-array row for hand `h` on board `gbd`: bucketed slots are shared
/// across every board on the street (the abstraction's whole point), so only
/// the non-bucketed ("none") layout multiplies in a per-board stride —
/// mirrors `CFRValues`'s own `num_holdings` sizing.
fn holding_offset(ctx: &VcfrContext, store: &CFRValues, player: u8, st: Street, gbd: u32, h: usize) -> usize {
    holding_offset_in(ctx.buckets, store, player, st, gbd, h)
}

/// As [`holding_offset`], but parametrised directly on a bucket backend
/// rather than a full `VcfrContext` — lets `resolver.rs` compute the same
/// flat offset when reading a strategy store outside a recursive walk.
pub(crate) fn holding_offset_in(buckets: &StreetBuckets, store: &CFRValues, player: u8, st: Street, gbd: u32, h: usize) -> usize {
    let bucket = buckets.bucket(st, gbd, h) as usize;
    if store.is_bucketed(player, st) {
        bucket
    } else {
        let stride = buckets.num_buckets(st) as usize;
        gbd as usize * stride + bucket
    }
}

/// Scatters a per-(canonical-hand) value array on one board into the dense,
/// encoding-indexed layout `VcfrState::opp_probs` uses, zero elsewhere.
pub(crate) fn dense_from_hand_values(hands: &[CanonicalHand], values: &[f32], max_card1: u32) -> Vec<f32> {
    let mut dense = vec![0.0f32; (max_card1 * max_card1) as usize];
    for (h, hand) in hands.iter().enumerate() {
        let (hi, lo) = hand.cards;
        dense[encode_hole_pair(hi.max(lo), hi.min(lo), max_card1)] = values[h];
    }
    dense
}

fn read_current_strategy(ctx: &VcfrContext, regrets: &CFRValues, node: &BettingNode, player: u8, gbd: u32, num_hands: usize, num_actions: usize) -> Vec<f32> {
    let mut strategy = vec![0.0f32; num_hands * num_actions];
    let default = node.default_succ_index as usize;
    let offset = |h: usize| holding_offset(ctx, regrets, player, node.street, gbd, h);
    match regrets.values(player, node.street, node.nonterminal_id) {
        Some(Storage::Doubles(v)) => {
            for h in 0..num_hands {
                let row = offset(h) * num_actions;
                let mut sum = 0.0f32;
                for a in 0..num_actions {
                    sum += v[row + a].max(0.0);
                }
                for a in 0..num_actions {
                    strategy[a * num_hands + h] = if sum > 0.0 {
                        v[row + a].max(0.0) / sum
                    } else if a == default {
                        1.0
                    } else {
                        0.0
                    };
                }
            }
        }
        Some(Storage::Ints(v)) => {
            for h in 0..num_hands {
                let row = offset(h) * num_actions;
                let mut sum = 0.0f32;
                for a in 0..num_actions {
                    sum += (v[row + a].max(0)) as f32;
                }
                for a in 0..num_actions {
                    strategy[a * num_hands + h] = if sum > 0.0 {
                        (v[row + a].max(0)) as f32 / sum
                    } else if a == default {
                        1.0
                    } else {
                        0.0
                    };
                }
            }
        }
        None => {
            for h in 0..num_hands {
                for a in 0..num_actions {
                    strategy[a * num_hands + h] = if a == default { 1.0 } else { 0.0 };
                }
            }
        }
    }

    let eps = ctx.config.exploration;
    if eps > 0.0 {
        for h in 0..num_hands {
            let mut sum = 0.0f32;
            for a in 0..num_actions {
                strategy[a * num_hands + h] += eps;
                sum += strategy[a * num_hands + h];
            }
            for a in 0..num_actions {
                strategy[a * num_hands + h] /= sum;
            }
        }
    }
    strategy
}

fn our_choice(ctx: &VcfrContext, regrets: &mut CFRValues, sumprobs: &mut CFRValues, node_idx: u32, node: &BettingNode, local_bd: u32, state: &VcfrState) -> Vec<f32> {
    let children = ctx.betting_tree.succs(node_idx).to_vec();
    let num_actions = children.len();
    let gbd = ctx.global_index(node.street, local_bd);
    let num_hands = ctx.board_tree.num_hole_card_pairs(node.street, gbd);

    if num_actions == 1 {
        return process(ctx, regrets, sumprobs, children[0], local_bd, state, node.street);
    }

    let mut succ_vals: Vec<Vec<f32>> = Vec::with_capacity(num_actions);
    for &child in &children {
        succ_vals.push(process(ctx, regrets, sumprobs, child, local_bd, state, node.street));
    }

    let strategy = if ctx.mode.uses_best_response() {
        best_response_strategy(&succ_vals, num_hands, num_actions)
    } else {
        read_current_strategy(ctx, regrets, node, node.player_acting, gbd, num_hands, num_actions)
    };

    let mut val = vec![0.0f32; num_hands];
    for a in 0..num_actions {
        for h in 0..num_hands {
            val[h] += strategy[a * num_hands + h] * succ_vals[a][h];
        }
    }

    if ctx.mode.updates_regrets() {
        update_regrets(ctx, regrets, node, node.player_acting, gbd, num_hands, num_actions, &succ_vals, &val);
    }

    val
}

fn best_response_strategy(succ_vals: &[Vec<f32>], num_hands: usize, num_actions: usize) -> Vec<f32> {
    let mut strategy = vec![0.0f32; num_hands * num_actions];
    for h in 0..num_hands {
        let mut best_a = 0;
        let mut best_v = f32::NEG_INFINITY;
        for (a, sv) in succ_vals.iter().enumerate() {
            if sv[h] > best_v {
                best_v = sv[h];
                best_a = a;
            }
        }
        strategy[best_a * num_hands + h] = 1.0;
    }
    strategy
}

#[allow(clippy::too_many_arguments)]
fn update_regrets(ctx: &VcfrContext, regrets: &mut CFRValues, node: &BettingNode, player: u8, gbd: u32, num_hands: usize, num_actions: usize, succ_vals: &[Vec<f32>], val: &[f32]) {
    let floor = ctx.config.regret_floor(node.street);
    let ceiling = ctx.config.regret_ceiling(node.street);
    let threshold = ctx.config.regret_overflow_threshold;
    let offsets: Vec<usize> = (0..num_hands).map(|h| holding_offset(ctx, regrets, player, node.street, gbd, h)).collect();

    let Some(storage) = regrets.values_mut(player, node.street, node.nonterminal_id) else {
        return;
    };

    let mut overflowed = false;
    match storage {
        Storage::Doubles(v) => {
            for a in 0..num_actions {
                for h in 0..num_hands {
                    let idx = offsets[h] * num_actions + a;
                    let delta = succ_vals[a][h] - val[h];
                    let coef = if v[idx].is_sign_positive() { ctx.discount.alpha_t } else { ctx.discount.beta_t };
                    let nv = clamp_regret(v[idx] * coef + delta, floor, ceiling);
                    if nv.abs() > threshold {
                        overflowed = true;
                    }
                    v[idx] = nv;
                }
            }
            if overflowed {
                v.iter_mut().for_each(|x| *x *= 0.5);
            }
        }
        Storage::Ints(v) => {
            for a in 0..num_actions {
                for h in 0..num_hands {
                    let idx = offsets[h] * num_actions + a;
                    let delta = succ_vals[a][h] - val[h];
                    let coef = if v[idx] >= 0 { ctx.discount.alpha_t } else { ctx.discount.beta_t };
                    let nv = clamp_regret(v[idx] as f32 * coef + delta, floor, ceiling);
                    if nv.abs() > threshold {
                        overflowed = true;
                    }
                    v[idx] = nv.clamp(i32::MIN as f32, i32::MAX as f32) as i32;
                }
            }
            if overflowed {
                v.iter_mut().for_each(|x| *x /= 2);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn accumulate_sumprobs(ctx: &VcfrContext, sumprobs: &mut CFRValues, node: &BettingNode, player: u8, gbd: u32, num_hands: usize, num_actions: usize, strategy: &[f32], reach: &[f32], gamma: f32) {
    let offsets: Vec<usize> = (0..num_hands).map(|h| holding_offset(ctx, sumprobs, player, node.street, gbd, h)).collect();
    let Some(storage) = sumprobs.values_mut(player, node.street, node.nonterminal_id) else {
        return;
    };
    match storage {
        Storage::Doubles(v) => {
            for a in 0..num_actions {
                for h in 0..num_hands {
                    let idx = offsets[h] * num_actions + a;
                    v[idx] = v[idx] * gamma + reach[h] * strategy[a * num_hands + h];
                }
            }
        }
        Storage::Ints(v) => {
            for a in 0..num_actions {
                for h in 0..num_hands {
                    let idx = offsets[h] * num_actions + a;
                    let added = reach[h] * strategy[a * num_hands + h] * i32::MAX as f32;
                    v[idx] = ((v[idx] as f32) * gamma + added).clamp(0.0, i32::MAX as f32) as i32;
                }
            }
        }
    }
}

fn opp_choice(ctx: &VcfrContext, regrets: &mut CFRValues, sumprobs: &mut CFRValues, node_idx: u32, node: &BettingNode, local_bd: u32, state: &VcfrState) -> Vec<f32> {
    let children = ctx.betting_tree.succs(node_idx).to_vec();
    let num_actions = children.len();
    let opp = 1 - ctx.target_player;
    let gbd = ctx.global_index(node.street, local_bd);
    let num_hands = ctx.board_tree.num_hole_card_pairs(node.street, gbd);

    if num_actions == 1 {
        return process(ctx, regrets, sumprobs, children[0], local_bd, state, node.street);
    }

    let hands = ctx.board_tree.canonical_cards(node.street, gbd).to_vec();
    let strategy = read_current_strategy(ctx, regrets, node, opp, gbd, num_hands, num_actions);

    if ctx.mode.accumulates_sumprobs() && ctx.config.accumulates_sumprobs(node.street) && !ctx.warmup {
        let reach: Vec<f32> = hands
            .iter()
            .map(|hand| {
                let (hi, lo) = hand.cards;
                let enc = encode_hole_pair(hi.max(lo), hi.min(lo), ctx.max_card1);
                state.opp_probs[enc]
            })
            .collect();
        accumulate_sumprobs(ctx, sumprobs, node, opp, gbd, num_hands, num_actions, &strategy, &reach, ctx.discount.gamma_t);
    }

    let mut val = vec![0.0f32; num_hands];
    for a in 0..num_actions {
        let mut new_opp_probs = state.opp_probs.clone();
        for (h, hand) in hands.iter().enumerate() {
            let (hi, lo) = hand.cards;
            let enc = encode_hole_pair(hi.max(lo), hi.min(lo), ctx.max_card1);
            new_opp_probs[enc] *= strategy[a * num_hands + h];
        }
        let new_total_card_probs = recompute_total_card_probs(&new_opp_probs, ctx.deck_size(), ctx.max_card1);
        let new_sum_opp_probs: f32 = new_total_card_probs.iter().sum::<f32>() / 2.0;

        if new_sum_opp_probs <= 0.0 && ctx.prune {
            continue;
        }

        let new_state = VcfrState {
            opp_probs: new_opp_probs,
            sum_opp_probs: new_sum_opp_probs,
            total_card_probs: new_total_card_probs,
            action_sequence: state.action_sequence.clone(),
        };
        let child_val = process(ctx, regrets, sumprobs, children[a], local_bd, &new_state, node.street);
        for h in 0..num_hands {
            val[h] += child_val[h];
        }
    }
    val
}

impl<'a> VcfrContext<'a> {
    // `max_card1` doubles as the deck size for every game this engine is
    // built for: no card id is ever skipped, so "one past the largest card"
    // and "number of distinct cards" coincide.
    fn deck_size(&self) -> u8 {
        self.max_card1 as u8
    }
}

/// Builds the successor-board local state and recurses, aggregating results
/// back into the previous street's canonical-hand indexing.
#[allow(clippy::too_many_arguments)]
fn street_initial(ctx: &VcfrContext, regrets: &mut CFRValues, sumprobs: &mut CFRValues, node_idx: u32, node: &BettingNode, local_bd: u32, state: &VcfrState, last_st: Street) -> Vec<f32> {
    let prev_st = last_st;
    let next_st = node.street;
    let prev_gbd = ctx.global_index(prev_st, local_bd);
    let prev_hands = ctx.board_tree.canonical_cards(prev_st, prev_gbd).to_vec();

    let (begin, end) = ctx.board_tree.succ_board_range(prev_st, prev_gbd, next_st);
    let mut agg = vec![0.0f32; prev_hands.len()];

    for gbd in begin..end {
        let local_next = ctx.board_tree.local_index(ctx.root_bd_st, ctx.root_bd, next_st, gbd);
        let child_val = process(ctx, regrets, sumprobs, node_idx, local_next, state, next_st);
        let variants = ctx.board_tree.num_variants(next_st, gbd) as f32;
        let next_hands = ctx.board_tree.canonical_cards(next_st, gbd);

        for (h, hand) in next_hands.iter().enumerate() {
            if let Some(prev_idx) = ctx.board_tree.hcp_index(prev_st, prev_gbd, hand.cards) {
                agg[prev_idx] += variants * child_val[h];
            }
        }
    }

    let divisor = ctx.board_tree.board_permutations(next_st) as f32 * ctx.board_tree.num_variants(prev_st, prev_gbd) as f32;
    if divisor > 0.0 {
        for x in agg.iter_mut() {
            *x /= divisor;
        }
    }
    agg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::betting_tree::BettingAbstraction;
    use crate::bet_size::{BetSize, BetSizeOptions};
    use crate::bucket::{IdentityBucketMap, StreetBuckets};
    use crate::game_config::GameParams;
    use crate::strategy_store::{CFRValues, SlotLayout, StoreRoot};
    use std::collections::HashMap;

    fn kuhn_setup() -> (GameParams, BoardTree, BettingTree, StreetBuckets) {
        let params = GameParams::kuhn();
        let board_tree = BoardTree::build(&params);
        let opts = BetSizeOptions::try_from_sizes(vec![BetSize::PotRelative(1.0)], vec![]).unwrap();
        let abstraction = BettingAbstraction::uniform(params.num_streets(), opts, 1);
        let betting_tree = BettingTree::build(&abstraction, &params);
        let buckets = StreetBuckets::new(vec![Box::new(IdentityBucketMap::build(&board_tree))]);
        (params, board_tree, betting_tree, buckets)
    }

    fn layouts(tree: &BettingTree) -> HashMap<(u8, Street), SlotLayout> {
        let mut m = HashMap::new();
        for p in 0..2u8 {
            for st in 0..1u8 {
                m.insert(
                    (p, st),
                    SlotLayout {
                        bucketed: false,
                        compressed: false,
                        as_int: false,
                        num_succs_hint: tree.node(tree.root()).num_succs,
                    },
                );
            }
        }
        m
    }

    #[test]
    fn fold_value_matches_closed_form() {
        let (_params, board_tree, betting_tree, buckets) = kuhn_setup();
        let cfg = CfrConfig::default();
        let ctx = VcfrContext {
            mode: VcfrMode::CfValue,
            target_player: 0,
            board_tree: &board_tree,
            betting_tree: &betting_tree,
            buckets: &buckets,
            config: &cfg,
            discount: DiscountParams::unit(),
            max_card1: 3,
            root_bd_st: 0,
            root_bd: 0,
            warmup: false,
            prune: false,
        };
        let node = BettingNode {
            street: 0,
            player_acting: 1,
            num_succs: 0,
            succ_begin: 0,
            default_succ_index: crate::betting_tree::NO_SUCC,
            call_succ_index: crate::betting_tree::NO_SUCC,
            fold_succ_index: crate::betting_tree::NO_SUCC,
            pot_size: 4,
            last_bet_to: 100,
            terminal: TerminalKind::Fold,
            nonterminal_id: 0,
        };
        let state = VcfrState::initial(3, 3, &[]);
        let val = fold(&ctx, &node, 0, &state);
        for (i, hand) in board_tree.canonical_cards(0, 0).iter().enumerate() {
            let (hi, lo) = hand.cards;
            let enc = encode_hole_pair(hi.max(lo), hi.min(lo), 3);
            let expected = -1.0
                * 100.0
                * (state.sum_opp_probs - state.total_card_probs[hi as usize] - state.total_card_probs[lo as usize] + state.opp_probs[enc]);
            assert!((val[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn showdown_is_zero_sum_weighted_by_opp_probs() {
        let (params, board_tree, betting_tree, _buckets) = kuhn_setup();
        let _ = (&params, &betting_tree);
        let cfg = CfrConfig::default();
        let buckets = StreetBuckets::new(vec![Box::new(IdentityBucketMap::build(&board_tree))]);
        let ctx = VcfrContext {
            mode: VcfrMode::CfValue,
            target_player: 0,
            board_tree: &board_tree,
            betting_tree: &betting_tree,
            buckets: &buckets,
            config: &cfg,
            discount: DiscountParams::unit(),
            max_card1: 3,
            root_bd_st: 0,
            root_bd: 0,
            warmup: false,
            prune: false,
        };
        let node = BettingNode {
            street: 0,
            player_acting: 0,
            num_succs: 0,
            succ_begin: 0,
            default_succ_index: crate::betting_tree::NO_SUCC,
            call_succ_index: crate::betting_tree::NO_SUCC,
            fold_succ_index: crate::betting_tree::NO_SUCC,
            pot_size: 10,
            last_bet_to: 0,
            terminal: TerminalKind::Showdown,
            nonterminal_id: 0,
        };
        let state = VcfrState::initial(3, 3, &[]);
        let val = showdown(&ctx, &node, 0, &state);
        let hands = board_tree.canonical_cards(0, 0);
        let weighted: f32 = hands
            .iter()
            .zip(&val)
            .map(|(h, v)| {
                let (hi, lo) = h.cards;
                let enc = encode_hole_pair(hi.max(lo), hi.min(lo), 3);
                state.opp_probs[enc] * v
            })
            .sum();
        assert!(weighted.abs() < 1e-4);
    }

    #[test]
    fn single_action_node_passes_through() {
        let (_params, board_tree, betting_tree, buckets) = kuhn_setup();
        let cfg = CfrConfig::default();
        let mut regrets = CFRValues::new(false, [true, true], StoreRoot { root_bd_st: 0, root_bd: 0 }, layouts(&betting_tree));
        let mut sumprobs = CFRValues::new(true, [true, true], StoreRoot { root_bd_st: 0, root_bd: 0 }, layouts(&betting_tree));
        regrets.allocate_and_clear_doubles(&betting_tree, &board_tree, &buckets, None);
        sumprobs.allocate_and_clear_doubles(&betting_tree, &board_tree, &buckets, None);

        let root = betting_tree.root();
        // single-succ passthrough only triggers when a node truly has one
        // child; the Kuhn root always has >1 (fold/call availability), so we
        // only assert the tree built without panicking and values are finite.
        let ctx = VcfrContext {
            mode: VcfrMode::Train,
            target_player: 0,
            board_tree: &board_tree,
            betting_tree: &betting_tree,
            buckets: &buckets,
            config: &cfg,
            discount: DiscountParams::new(1),
            max_card1: 3,
            root_bd_st: 0,
            root_bd: 0,
            warmup: false,
            prune: false,
        };
        let state = VcfrState::initial(3, 3, &[]);
        let val = process(&ctx, &mut regrets, &mut sumprobs, root, 0, &state, 0);
        assert!(val.iter().all(|v| v.is_finite()));
    }
}
