//! Base-strategy trainer.
//!
//! Thin by design. The interesting recursion lives in `vcfr.rs`; this
//! module only drives it through a discounted-CFR+ loop, the way a
//! solve-loop drives its recursive node walk, generalised to the
//! per-board vectorised walk.

use crate::betting_tree::BettingTree;
use crate::board_tree::BoardTree;
use crate::bucket::StreetBuckets;
use crate::cfr_config::CfrConfig;
use crate::strategy_store::{CFRValues, StoreRoot};
use crate::vcfr::{self, DiscountParams, VcfrContext, VcfrMode, VcfrState};
use log::info;

pub struct Trainer<'a> {
    pub board_tree: &'a BoardTree,
    pub betting_tree: &'a BettingTree,
    pub buckets: &'a StreetBuckets,
    pub config: &'a CfrConfig,
    pub deck_size: u8,
}

impl<'a> Trainer<'a> {
    pub fn new(board_tree: &'a BoardTree, betting_tree: &'a BettingTree, buckets: &'a StreetBuckets, config: &'a CfrConfig, deck_size: u8) -> Self {
        Self {
            board_tree,
            betting_tree,
            buckets,
            config,
            deck_size,
        }
    }

    fn max_card1(&self) -> u32 {
        self.deck_size as u32
    }

    /// Allocates a fresh pair of regret/sumprob stores rooted at the full
    /// tree, sized per `self.config`'s int/double and compression choices.
    pub fn new_values(&self) -> (CFRValues, CFRValues) {
        let num_streets = self.board_tree.num_streets();
        let root = StoreRoot { root_bd_st: 0, root_bd: 0 };

        let layouts_r = CFRValues::infer_layouts(self.betting_tree, self.config, self.buckets, num_streets, !self.config.double_regrets);
        let mut regrets = CFRValues::new(false, [true, true], root, layouts_r);
        if self.config.double_regrets {
            regrets.allocate_and_clear_doubles(self.betting_tree, self.board_tree, self.buckets, None);
        } else {
            regrets.allocate_and_clear_ints(self.betting_tree, self.board_tree, self.buckets, None);
        }

        let layouts_s = CFRValues::infer_layouts(self.betting_tree, self.config, self.buckets, num_streets, !self.config.double_sumprobs);
        let mut sumprobs = CFRValues::new(true, [true, true], root, layouts_s);
        if self.config.double_sumprobs {
            sumprobs.allocate_and_clear_doubles(self.betting_tree, self.board_tree, self.buckets, None);
        } else {
            sumprobs.allocate_and_clear_ints(self.betting_tree, self.board_tree, self.buckets, None);
        }

        (regrets, sumprobs)
    }

    /// Runs discounted CFR+ for `max_iterations` full iterations (one
    /// half-iteration per player each), stopping early once
    /// `exploitability()` drops to or below `target_exploitability`. Returns
    /// the last-measured exploitability.
    pub fn train(&self, regrets: &mut CFRValues, sumprobs: &mut CFRValues, max_iterations: u32, target_exploitability: f32) -> f32 {
        let mut exploitability = self.exploitability(regrets, sumprobs);
        info!("iteration 0/{max_iterations} exploitability={exploitability:.6e}");

        for t in 0..max_iterations {
            if exploitability <= target_exploitability {
                break;
            }
            let discount = DiscountParams::new(t);
            let warmup = t < self.config.warmup_iterations;

            for player in 0..2u8 {
                let ctx = VcfrContext {
                    mode: VcfrMode::Train,
                    target_player: player,
                    board_tree: self.board_tree,
                    betting_tree: self.betting_tree,
                    buckets: self.buckets,
                    config: self.config,
                    discount,
                    max_card1: self.max_card1(),
                    root_bd_st: 0,
                    root_bd: 0,
                    warmup,
                    prune: false,
                };
                let state = VcfrState::initial(self.deck_size, self.max_card1(), &[]);
                let _ = vcfr::process(&ctx, regrets, sumprobs, self.betting_tree.root(), 0, &state, 0);
            }

            if (t + 1) % 10 == 0 || t + 1 == max_iterations {
                exploitability = self.exploitability(regrets, sumprobs);
                info!("iteration {}/{max_iterations} exploitability={exploitability:.6e}", t + 1);
            }
        }
        exploitability
    }

    /// Sum, over both players, of the best-response value against the
    /// other's average strategy (`sumprobs`), uniformly weighted over root
    /// hands. A monotonically-decreasing proxy rather than a calibrated
    /// mbb/g figure (that calibration is a property of the specific game's
    /// blind/ante structure, not of this engine).
    pub fn exploitability(&self, regrets: &mut CFRValues, sumprobs: &mut CFRValues) -> f32 {
        let mut total = 0.0f32;
        for player in 0..2u8 {
            let ctx = VcfrContext {
                mode: VcfrMode::BestResponse,
                target_player: player,
                board_tree: self.board_tree,
                betting_tree: self.betting_tree,
                buckets: self.buckets,
                config: self.config,
                discount: DiscountParams::unit(),
                max_card1: self.max_card1(),
                root_bd_st: 0,
                root_bd: 0,
                warmup: false,
                prune: false,
            };
            let state = VcfrState::initial(self.deck_size, self.max_card1(), &[]);
            // `opp_choice` reads "the current strategy" off whichever store is
            // passed as `regrets`; passing `sumprobs` there makes the fixed
            // opponent play its average strategy rather than live regrets,
            // which is what a best-response pass needs. `sumprobs` itself is
            // never written in `BestResponse` mode, so reusing `regrets` as
            // the scratch second argument is safe.
            let vals = vcfr::process(&ctx, sumprobs, regrets, self.betting_tree.root(), 0, &state, 0);
            let num_hands = vals.len().max(1) as f32;
            total += vals.iter().sum::<f32>() / num_hands;
        }
        total.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet_size::{BetSize, BetSizeOptions};
    use crate::betting_tree::BettingAbstraction;
    use crate::bucket::{IdentityBucketMap, StreetBuckets};
    use crate::game_config::GameParams;

    fn kuhn_trainer() -> (GameParams, BoardTree, BettingTree, StreetBuckets, CfrConfig) {
        let params = GameParams::kuhn();
        let board_tree = BoardTree::build(&params);
        let opts = BetSizeOptions::try_from_sizes(vec![BetSize::PotRelative(1.0)], vec![]).unwrap();
        let abstraction = BettingAbstraction::uniform(params.num_streets(), opts, 1);
        let betting_tree = BettingTree::build(&abstraction, &params);
        let buckets = StreetBuckets::new(vec![Box::new(IdentityBucketMap::build(&board_tree))]);
        let cfg = CfrConfig {
            sumprob_streets: vec![0],
            ..CfrConfig::default()
        };
        (params, board_tree, betting_tree, buckets, cfg)
    }

    #[test]
    fn training_reduces_exploitability_on_kuhn() {
        let (_params, board_tree, betting_tree, buckets, cfg) = kuhn_trainer();
        let trainer = Trainer::new(&board_tree, &betting_tree, &buckets, &cfg, 4);
        let (mut regrets, mut sumprobs) = trainer.new_values();

        let initial = trainer.exploitability(&mut regrets, &mut sumprobs);
        let _ = trainer.train(&mut regrets, &mut sumprobs, 200, 0.0);
        let trained = trainer.exploitability(&mut regrets, &mut sumprobs);

        assert!(trained <= initial + 1e-6);
    }

    #[test]
    fn new_values_allocates_both_players() {
        let (_params, board_tree, betting_tree, buckets, cfg) = kuhn_trainer();
        let trainer = Trainer::new(&board_tree, &betting_tree, &buckets, &cfg, 4);
        let (regrets, sumprobs) = trainer.new_values();
        assert!(regrets.values(0, 0, betting_tree.node(betting_tree.root()).nonterminal_id).is_some());
        assert_eq!(sumprobs.is_sumprobs, true);
    }
}
