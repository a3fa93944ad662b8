//! Betting Tree.
//!
//! An arena of [`BettingNode`]s, referenced by 32-bit indices rather than
//! pointers, avoiding deep pointer graphs in a tree that can run tens of
//! thousands of nodes deep for a fine no-limit bet-size grid. Construction
//! is a pure function of a [`BettingAbstraction`] and the [`GameParams`]
//! the tree is built for.

use crate::bet_size::{BetSize, BetSizeOptions};
use crate::error::{Result, SolverError};
use crate::game_config::GameParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Street = u8;

/// Sentinel for "this succ does not exist" (e.g. fold when no bet is faced).
pub const NO_SUCC: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    NonTerminal,
    Showdown,
    Fold,
}

/// One node of the arena. `succ_begin..succ_begin + num_succs` indexes into
/// [`BettingTree::succs`] for this node's children.
#[derive(Debug, Clone)]
pub struct BettingNode {
    pub street: Street,
    pub player_acting: u8,
    pub num_succs: u32,
    pub succ_begin: u32,
    pub default_succ_index: u32,
    pub call_succ_index: u32,
    pub fold_succ_index: u32,
    pub pot_size: i32,
    pub last_bet_to: i32,
    pub terminal: TerminalKind,
    pub nonterminal_id: u32,
}

impl BettingNode {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.num_succs == 0
    }
}

/// Per (street, num-bets-so-far, acting-side) configuration of allowed bet
/// sizes, plus the always-available call/fold. One abstraction per target
/// player in the asymmetric case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingAbstraction {
    /// `bet_sizes[st]` options for a player's first bet of that street.
    pub bet_sizes: Vec<BetSizeOptions>,
    /// Minimum legal bet/raise increment, in chips.
    pub min_bet: i32,
    /// Maximum number of bets/raises allowed per street (cap on tree depth).
    pub max_bets_per_street: u32,
}

impl BettingAbstraction {
    pub fn uniform(num_streets: usize, bets: BetSizeOptions, min_bet: i32) -> Self {
        Self {
            bet_sizes: vec![bets; num_streets],
            min_bet,
            max_bets_per_street: 4,
        }
    }
}

struct BuildState {
    street: Street,
    pot: i32,
    to_call: i32,
    stacks_behind: [i32; 2],
    num_bets_this_street: u32,
    player_acting: u8,
}

pub struct BettingTree {
    nodes: Vec<BettingNode>,
    succs: Vec<u32>,
    root: u32,
    /// `(player, street) -> count`: `nonterminal_id` is assigned densely
    /// per (player, street) as nodes are built.
    num_nonterminals: HashMap<(u8, Street), u32>,
    num_terminals: u32,
}

impl BettingTree {
    /// One tree shared by both players.
    pub fn build(abstraction: &BettingAbstraction, params: &GameParams) -> Self {
        Self::build_inner(abstraction, params, None)
    }

    /// One tree per target player: `target_p` gets richer bet-sizing options
    /// on their own action nodes (the abstraction is otherwise the base one
    /// passed in for the opponent's nodes).
    pub fn build_asymmetric(
        abstraction: &BettingAbstraction,
        params: &GameParams,
        target_p: u8,
    ) -> Self {
        Self::build_inner(abstraction, params, Some(target_p))
    }

    fn build_inner(
        abstraction: &BettingAbstraction,
        params: &GameParams,
        target_p: Option<u8>,
    ) -> Self {
        let mut nodes = Vec::new();
        let mut succs = Vec::new();
        let mut nonterminal_counters: HashMap<(u8, Street), u32> = HashMap::new();
        let mut num_terminals = 0u32;

        let initial = BuildState {
            street: 0,
            pot: params.small_blind + params.big_blind,
            to_call: params.big_blind - params.small_blind,
            stacks_behind: [
                params.initial_stacks[0] - params.small_blind,
                params.initial_stacks[1] - params.big_blind,
            ],
            num_bets_this_street: 0,
            // heads-up convention: small blind acts first preflop.
            player_acting: 0,
        };

        let root = build_node(
            &mut nodes,
            &mut succs,
            &mut nonterminal_counters,
            &mut num_terminals,
            abstraction,
            params,
            target_p,
            initial,
        );

        Self {
            nodes,
            succs,
            root,
            num_nonterminals: nonterminal_counters,
            num_terminals,
        }
    }

    /// Builds a new tree whose root corresponds to `node` (from `self`) with
    /// re-assigned contiguous nonterminal ids but identical action shape.
    pub fn build_subtree(&self, node: u32) -> Self {
        let mut nodes = Vec::new();
        let mut succs = Vec::new();
        let mut nonterminal_counters: HashMap<(u8, Street), u32> = HashMap::new();
        let mut num_terminals = 0u32;

        let root = self.clone_subtree(
            node,
            &mut nodes,
            &mut succs,
            &mut nonterminal_counters,
            &mut num_terminals,
        );

        Self {
            nodes,
            succs,
            root,
            num_nonterminals: nonterminal_counters,
            num_terminals,
        }
    }

    fn clone_subtree(
        &self,
        src: u32,
        nodes: &mut Vec<BettingNode>,
        succs: &mut Vec<u32>,
        counters: &mut HashMap<(u8, Street), u32>,
        num_terminals: &mut u32,
    ) -> u32 {
        let src_node = &self.nodes[src as usize];
        let idx = nodes.len() as u32;

        if src_node.is_terminal() {
            nodes.push(BettingNode {
                nonterminal_id: 0,
                ..src_node.clone()
            });
            *num_terminals += 1;
            return idx;
        }

        nodes.push(src_node.clone());
        let begin = src_node.succ_begin;
        let end = begin + src_node.num_succs;
        let child_srcs: Vec<u32> = self.succs[begin as usize..end as usize].to_vec();

        let succ_begin = succs.len() as u32;
        succs.resize(succs.len() + child_srcs.len(), 0);
        for (i, &child_src) in child_srcs.iter().enumerate() {
            let child_idx = self.clone_subtree(child_src, nodes, succs, counters, num_terminals);
            succs[succ_begin as usize + i] = child_idx;
        }

        let nt_id = {
            let key = (src_node.player_acting, src_node.street);
            let counter = counters.entry(key).or_insert(0);
            let id = *counter;
            *counter += 1;
            id
        };

        let n = &mut nodes[idx as usize];
        n.succ_begin = succ_begin;
        n.nonterminal_id = nt_id;
        idx
    }

    /// Builds a fresh subtree with the given betting state (mirroring an
    /// existing node's state) but future bet-sizing taken from `abstraction`
    /// rather than whatever abstraction the base tree used.
    pub fn create_no_limit_subtree(
        abstraction: &BettingAbstraction,
        params: &GameParams,
        street: Street,
        last_bet_to: i32,
        pot_before_bet: i32,
        num_street_bets: u32,
        player_acting: u8,
        target_p: Option<u8>,
        stacks_behind: [i32; 2],
    ) -> Self {
        let mut nodes = Vec::new();
        let mut succs = Vec::new();
        let mut nonterminal_counters: HashMap<(u8, Street), u32> = HashMap::new();
        let mut num_terminals = 0u32;

        let state = BuildState {
            street,
            pot: pot_before_bet + last_bet_to,
            to_call: last_bet_to,
            stacks_behind,
            num_bets_this_street: num_street_bets,
            player_acting,
        };

        let root = build_node(
            &mut nodes,
            &mut succs,
            &mut nonterminal_counters,
            &mut num_terminals,
            abstraction,
            params,
            target_p,
            state,
        );

        Self {
            nodes,
            succs,
            root,
            num_nonterminals: nonterminal_counters,
            num_terminals,
        }
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn node(&self, idx: u32) -> &BettingNode {
        &self.nodes[idx as usize]
    }

    pub fn succ(&self, node: u32, action: usize) -> u32 {
        let n = &self.nodes[node as usize];
        self.succs[(n.succ_begin as usize) + action]
    }

    pub fn succs(&self, node: u32) -> &[u32] {
        let n = &self.nodes[node as usize];
        &self.succs[n.succ_begin as usize..(n.succ_begin + n.num_succs) as usize]
    }

    /// Looks up a node by (street, acting player, dense nonterminal id).
    /// `O(n)`; fine for construction-time / test use, not the hot path.
    pub fn find_node(&self, st: Street, pa: u8, nt: u32) -> Result<u32> {
        self.nodes
            .iter()
            .position(|n| !n.is_terminal() && n.street == st && n.player_acting == pa && n.nonterminal_id == nt)
            .map(|i| i as u32)
            .ok_or_else(|| {
                SolverError::InvariantViolation(format!(
                    "no node for (street={st}, player={pa}, nonterminal_id={nt})"
                ))
            })
    }

    pub fn num_nonterminals(&self, player: u8, st: Street) -> u32 {
        *self.num_nonterminals.get(&(player, st)).unwrap_or(&0)
    }

    pub fn num_terminals(&self) -> u32 {
        self.num_terminals
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn push_terminal(nodes: &mut Vec<BettingNode>, num_terminals: &mut u32, st: BuildState, kind: TerminalKind) -> u32 {
    let idx = nodes.len() as u32;
    nodes.push(BettingNode {
        street: st.street,
        player_acting: st.player_acting,
        num_succs: 0,
        succ_begin: 0,
        default_succ_index: NO_SUCC,
        call_succ_index: NO_SUCC,
        fold_succ_index: NO_SUCC,
        pot_size: st.pot,
        last_bet_to: st.to_call,
        terminal: kind,
        nonterminal_id: 0,
    });
    *num_terminals += 1;
    idx
}

/// Candidate bet sizes (pot-relative / additive / geometric / all-in),
/// converted to absolute chip amounts and capped to the acting player's
/// remaining stack, deduplicated (an overshoot that caps to all-in collapses
/// with an explicit "a" entry).
fn candidate_bet_sizes(options: &BetSizeOptions, is_raise: bool, pot: i32, to_call: i32, stack: i32) -> Vec<i32> {
    let sizes = if is_raise { options.raises() } else { options.bets() };
    let mut amounts: Vec<i32> = Vec::new();
    for bs in sizes {
        let amt = match *bs {
            BetSize::PotRelative(frac) => ((pot + 2 * to_call) as f64 * frac).round() as i32,
            BetSize::PrevBetRelative(mult) => (to_call as f64 * mult).round() as i32,
            BetSize::Additive(c, _) => c,
            BetSize::Geometric(_, max_pot_rel) => {
                let frac = if max_pot_rel.is_finite() { max_pot_rel } else { 1.0 };
                ((pot + 2 * to_call) as f64 * frac).round() as i32
            }
            BetSize::AllIn => stack,
        };
        let capped = amt.clamp(1, stack.max(1)).min(stack);
        amounts.push(capped);
    }
    amounts.push(stack); // always include all-in as a candidate
    amounts.sort_unstable();
    amounts.dedup();
    amounts.retain(|&a| a > 0);
    amounts
}

#[allow(clippy::too_many_arguments)]
fn build_node(
    nodes: &mut Vec<BettingNode>,
    succs: &mut Vec<u32>,
    counters: &mut HashMap<(u8, Street), u32>,
    num_terminals: &mut u32,
    abstraction: &BettingAbstraction,
    params: &GameParams,
    target_p: Option<u8>,
    state: BuildState,
) -> u32 {
    let last_street = (params.num_streets() - 1) as Street;
    let opp = 1 - state.player_acting;
    let my_stack = state.stacks_behind[state.player_acting as usize];

    // facing an all-in with nothing left to do: auto-advance.
    if my_stack == 0 && state.to_call == 0 {
        return advance_street_or_showdown(nodes, succs, counters, num_terminals, abstraction, params, target_p, state);
    }

    let mut actions: Vec<Option<i32>> = Vec::new(); // None = fold, Some(0) = check/call, Some(n) = bet/raise to n
    let has_fold = state.to_call > 0;
    if has_fold {
        actions.push(None);
    }
    actions.push(Some(0)); // check or call

    let can_bet = my_stack > state.to_call
        && state.num_bets_this_street < abstraction.max_bets_per_street
        && state.stacks_behind[opp as usize] > 0;
    if can_bet {
        let options_street = abstraction
            .bet_sizes
            .get(state.street as usize)
            .cloned()
            .unwrap_or_default();
        let amounts = candidate_bet_sizes(
            &options_street,
            state.num_bets_this_street > 0,
            state.pot,
            state.to_call,
            my_stack - state.to_call,
        );
        for amt in amounts {
            actions.push(Some(state.to_call + amt));
        }
    }

    let num_succs = actions.len() as u32;
    let fold_succ_index = if has_fold { 0 } else { NO_SUCC };
    let call_succ_index = if has_fold { 1 } else { 0 };
    let default_succ_index = call_succ_index;

    let idx = nodes.len() as u32;
    nodes.push(BettingNode {
        street: state.street,
        player_acting: state.player_acting,
        num_succs,
        succ_begin: 0,
        default_succ_index,
        call_succ_index,
        fold_succ_index,
        pot_size: state.pot,
        last_bet_to: state.to_call,
        terminal: TerminalKind::NonTerminal,
        nonterminal_id: 0,
    });

    let succ_begin = succs.len() as u32;
    succs.resize(succs.len() + actions.len(), 0);

    for (i, action) in actions.into_iter().enumerate() {
        let child = match action {
            None => {
                let fold_state = BuildState { player_acting: state.player_acting, ..copy_state(&state) };
                push_terminal(nodes, num_terminals, fold_state, TerminalKind::Fold)
            }
            Some(0) => {
                let mut next_stacks = state.stacks_behind;
                next_stacks[state.player_acting as usize] -= state.to_call;
                let next_state = BuildState {
                    street: state.street,
                    pot: state.pot + state.to_call,
                    to_call: 0,
                    stacks_behind: next_stacks,
                    num_bets_this_street: state.num_bets_this_street,
                    player_acting: opp,
                };
                if state.to_call > 0 || state.num_bets_this_street > 0 {
                    advance_street_or_showdown(nodes, succs, counters, num_terminals, abstraction, params, target_p, next_state)
                } else {
                    // both players checked with nothing wagered yet this street
                    advance_street_or_showdown(nodes, succs, counters, num_terminals, abstraction, params, target_p, next_state)
                }
            }
            Some(bet_to) => {
                let mut next_stacks = state.stacks_behind;
                next_stacks[state.player_acting as usize] -= bet_to;
                let next_state = BuildState {
                    street: state.street,
                    pot: state.pot,
                    to_call: bet_to,
                    stacks_behind: next_stacks,
                    num_bets_this_street: state.num_bets_this_street + 1,
                    player_acting: opp,
                };
                build_node(nodes, succs, counters, num_terminals, abstraction, params, target_p, next_state)
            }
        };
        succs[succ_begin as usize + i] = child;
    }

    nodes[idx as usize].succ_begin = succ_begin;

    let key = (state.player_acting, state.street);
    let counter = counters.entry(key).or_insert(0);
    let nt_id = *counter;
    *counter += 1;
    nodes[idx as usize].nonterminal_id = nt_id;

    let _ = last_street;
    idx
}

fn copy_state(s: &BuildState) -> BuildState {
    BuildState {
        street: s.street,
        pot: s.pot,
        to_call: s.to_call,
        stacks_behind: s.stacks_behind,
        num_bets_this_street: s.num_bets_this_street,
        player_acting: s.player_acting,
    }
}

#[allow(clippy::too_many_arguments)]
fn advance_street_or_showdown(
    nodes: &mut Vec<BettingNode>,
    succs: &mut Vec<u32>,
    counters: &mut HashMap<(u8, Street), u32>,
    num_terminals: &mut u32,
    abstraction: &BettingAbstraction,
    params: &GameParams,
    target_p: Option<u8>,
    state: BuildState,
) -> u32 {
    let last_street = (params.num_streets() - 1) as Street;
    if state.street == last_street {
        return push_terminal(nodes, num_terminals, state, TerminalKind::Showdown);
    }
    let next_state = BuildState {
        street: state.street + 1,
        pot: state.pot,
        to_call: 0,
        stacks_behind: state.stacks_behind,
        num_bets_this_street: 0,
        // out-of-position (player 1, the big blind) acts first postflop.
        player_acting: 1,
    };
    build_node(nodes, succs, counters, num_terminals, abstraction, params, target_p, next_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet_size::BetSizeOptions;

    fn toy_abstraction(num_streets: usize) -> BettingAbstraction {
        let opts = BetSizeOptions::try_from_sizes(vec![BetSize::PotRelative(1.0)], vec![]).unwrap();
        BettingAbstraction::uniform(num_streets, opts, 1)
    }

    #[test]
    fn kuhn_sized_tree_has_fold_and_call_terminals() {
        let params = GameParams::kuhn();
        let abstraction = toy_abstraction(params.num_streets());
        let tree = BettingTree::build(&abstraction, &params);
        assert!(tree.num_terminals() > 0);
        let root = tree.node(tree.root());
        assert!(!root.is_terminal());
    }

    #[test]
    fn nonterminal_ids_are_dense_per_player_street() {
        let params = GameParams::kuhn();
        let abstraction = toy_abstraction(params.num_streets());
        let tree = BettingTree::build(&abstraction, &params);
        for ((p, st), &count) in &tree.num_nonterminals {
            for nt in 0..count {
                assert!(tree.find_node(*st, *p, nt).is_ok());
            }
        }
    }

    #[test]
    fn build_subtree_preserves_shape() {
        let params = GameParams::kuhn();
        let abstraction = toy_abstraction(params.num_streets());
        let tree = BettingTree::build(&abstraction, &params);
        let root = tree.root();
        let sub = tree.build_subtree(root);
        assert_eq!(sub.node(sub.root()).num_succs, tree.node(root).num_succs);
        assert_eq!(sub.num_terminals(), tree.num_terminals());
    }
}
