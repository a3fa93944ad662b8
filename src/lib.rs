//! Vectorised CFR training, counterfactual-value extraction, and
//! asymmetric subgame re-solving for heads-up poker.
//!
//! The crate is organised by component:
//!
//! - [`board_tree`] (C1): canonical board/hand indexing under suit isomorphism.
//! - [`bucket`] (C2): the abstraction lookup a trainer/resolver reads through.
//! - [`bet_size`], [`betting_tree`] (C3): the action-abstraction betting tree.
//! - [`strategy_store`] (C4): `CFRValues`, the on-disk/in-memory regret and
//!   sumprob store.
//! - [`vcfr`] (C5): the single recursive walk all four historical solver
//!   passes (training, best response, CV extraction, resolver CFR) collapse
//!   onto.
//! - [`resolver`] (C6): endgame re-solving (UNSAFE / CFR-D / MAXMARGIN /
//!   COMBINED) built on top of [`vcfr`] and [`strategy_store`].
//! - [`trainer`]: the thin driving loop over [`vcfr`] that produces a base
//!   strategy.

pub mod bet_size;
pub mod betting_tree;
pub mod board_tree;
pub mod bucket;
pub mod card;
pub mod cfr_config;
pub mod error;
pub mod game_config;
pub mod hand;
pub mod paths;
pub mod resolver;
pub mod strategy_store;
pub mod trainer;
mod utility;
pub mod vcfr;

pub use bet_size::{BetSize, BetSizeOptions, DonkSizeOptions};
pub use card::{card_from_str, card_to_string, cards_from_str, flop_from_str, hole_to_string, Card, DECK_SIZE, NOT_DEALT};
pub use error::{Result, SolverError};
