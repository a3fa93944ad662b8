//! Training/resolving knobs, loaded from a keyed JSON file the way
//! game/card/betting params are.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfrConfig {
    pub algorithm: String,

    /// Per-street regret floor/ceiling (CFR+-style non-negative flooring by
    /// default).
    pub regret_floor: Vec<f32>,
    pub regret_ceiling: Vec<f32>,

    /// Iterations before sumprob accumulation begins.
    pub warmup_iterations: u32,

    /// Street at which the endgame resolver begins operating.
    pub subgame_street: u8,

    /// Streets whose (player, street) slots accumulate sumprobs at all.
    pub sumprob_streets: Vec<u8>,

    /// Streets stored compressed on disk.
    pub compressed_streets: Vec<u8>,

    /// Exploration floor added to the regret-matched strategy before
    /// normalising, applied per street.
    pub exploration: f32,

    /// Reach-probability threshold below which a hand is treated as "closed"
    /// for bucketed current-strategy prefetch.
    pub close_threshold: f32,

    pub double_regrets: bool,
    pub double_sumprobs: bool,

    /// Overflow threshold: halve both regret arrays at a node if any |regret|
    /// exceeds this.
    pub regret_overflow_threshold: f32,

    pub num_endgame_iterations: u32,

    /// COMBINED-method blend constants, exposed as configuration rather
    /// than hardcoded so the documented defaults can be tuned per game.
    pub cfrd_cap: f32,
    pub uniform_add: f32,
    pub gap_factor: f32,
}

impl Default for CfrConfig {
    fn default() -> Self {
        Self {
            algorithm: "discounted_cfr".to_string(),
            regret_floor: vec![0.0; 4],
            regret_ceiling: vec![f32::INFINITY; 4],
            warmup_iterations: 0,
            subgame_street: 1,
            sumprob_streets: vec![0, 1, 2, 3],
            compressed_streets: vec![],
            exploration: 0.0,
            close_threshold: 1e-6,
            double_regrets: true,
            double_sumprobs: true,
            regret_overflow_threshold: 2.0e9,
            num_endgame_iterations: 1000,
            cfrd_cap: 0.2,
            uniform_add: 0.1,
            gap_factor: 0.1,
        }
    }
}

impl CfrConfig {
    pub fn regret_floor(&self, st: u8) -> f32 {
        self.regret_floor.get(st as usize).copied().unwrap_or(0.0)
    }

    pub fn regret_ceiling(&self, st: u8) -> f32 {
        self.regret_ceiling.get(st as usize).copied().unwrap_or(f32::INFINITY)
    }

    pub fn accumulates_sumprobs(&self, st: u8) -> bool {
        self.sumprob_streets.contains(&st)
    }

    pub fn is_compressed(&self, st: u8) -> bool {
        self.compressed_streets.contains(&st)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_combined_constants_match_documented_defaults() {
        let cfg = CfrConfig::default();
        assert_eq!(cfg.cfrd_cap, 0.2);
        assert_eq!(cfg.uniform_add, 0.1);
    }

    #[test]
    fn sumprob_streets_membership() {
        let mut cfg = CfrConfig::default();
        cfg.sumprob_streets = vec![0, 2];
        assert!(cfg.accumulates_sumprobs(0));
        assert!(!cfg.accumulates_sumprobs(1));
    }
}
