//! Game-definition parameters.
//!
//! Parameter parsing proper — CLI flags, file formats — is an external
//! collaborator; this module only defines the shape those records are
//! deserialised into and the invariants `BoardTree`/`BettingTree` rely on.

use serde::{Deserialize, Serialize};

/// Definition of the game being solved: deck size, street structure, and
/// starting stacks/blinds. Consumed by `BoardTree::build` and
/// `BettingTree::build`, which must agree on `num_streets` and
/// `board_cards_per_street`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameParams {
    /// Number of distinct cards in the deck (52 for a standard deck; a
    /// Kuhn-sized toy scenario uses 3).
    pub deck_size: u8,

    /// Number of hole cards dealt to each player.
    pub hole_cards: u8,

    /// Community cards newly dealt on each street, in street order. Street 0
    /// (preflop) is conventionally `0`.
    pub board_cards_per_street: Vec<u8>,

    /// Small and big blind sizes.
    pub small_blind: i32,
    pub big_blind: i32,

    /// Each player's starting stack.
    pub initial_stacks: [i32; 2],
}

impl GameParams {
    /// Number of streets (including preflop).
    #[inline]
    pub fn num_streets(&self) -> usize {
        self.board_cards_per_street.len()
    }

    /// Total community cards dealt by the end of street `st` (inclusive).
    pub fn cumulative_board_cards(&self, st: usize) -> usize {
        self.board_cards_per_street[..=st]
            .iter()
            .map(|&c| c as usize)
            .sum()
    }

    /// A tiny 4-card, 1-street, 2-hole-card game used as the smallest
    /// exhaustively-solvable end-to-end training/exploitability scenario.
    pub fn kuhn() -> Self {
        Self {
            deck_size: 4,
            hole_cards: 2,
            board_cards_per_street: vec![0],
            small_blind: 1,
            big_blind: 2,
            initial_stacks: [4, 4],
        }
    }

    /// Heads-up no-limit hold'em with the standard 52-card deck and four
    /// streets (preflop/flop/turn/river).
    pub fn heads_up_holdem(big_blind: i32, stack: i32) -> Self {
        Self {
            deck_size: 52,
            hole_cards: 2,
            board_cards_per_street: vec![0, 3, 1, 1],
            small_blind: big_blind / 2,
            big_blind,
            initial_stacks: [stack, stack],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_board_cards_holdem() {
        let g = GameParams::heads_up_holdem(100, 20000);
        assert_eq!(g.cumulative_board_cards(0), 0);
        assert_eq!(g.cumulative_board_cards(1), 3);
        assert_eq!(g.cumulative_board_cards(2), 4);
        assert_eq!(g.cumulative_board_cards(3), 5);
    }
}
