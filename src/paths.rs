//! Filesystem path templates: every artefact path is a pure function of a
//! [`StoreRoot`] base directory and a handful of keys, never assembled ad
//! hoc at call sites.

use std::path::PathBuf;

/// The two base directories a run is parameterised by: "old" (read) and
/// "new" (write) CFR store roots.
#[derive(Debug, Clone)]
pub struct StoreRoots {
    pub old: PathBuf,
    pub new: PathBuf,
}

/// `<cfr_base>/<game>.<num_players>.<card_abs>.<ranks>.<suits>.<max_st>.<bet_abs>.<cfr_cfg>[.p<asym_p>]/`
#[allow(clippy::too_many_arguments)]
pub fn cfr_dir(base: &PathBuf, game: &str, num_players: u8, card_abs: &str, ranks: u8, suits: u8, max_st: u8, bet_abs: &str, cfr_cfg: &str, asym_p: Option<u8>) -> PathBuf {
    let mut name = format!("{game}.{num_players}.{card_abs}.{ranks}.{suits}.{max_st}.{bet_abs}.{cfr_cfg}");
    if let Some(p) = asym_p {
        name.push_str(&format!(".p{p}"));
    }
    base.join(name)
}

#[allow(clippy::too_many_arguments)]
pub fn regrets_path(dir: &PathBuf, subtree_st: u8, subtree_nt: u32, root_bd_st: u8, root_bd: u32, st: u8, it: u32, player: u8) -> PathBuf {
    dir.join(format!("regrets.{subtree_st}.{subtree_nt}.{root_bd_st}.{root_bd}.{st}.{it}.p{player}.i"))
}

#[allow(clippy::too_many_arguments)]
pub fn sumprobs_path(dir: &PathBuf, subtree_st: u8, subtree_nt: u32, root_bd_st: u8, root_bd: u32, st: u8, it: u32, player: u8) -> PathBuf {
    dir.join(format!("sumprobs.{subtree_st}.{subtree_nt}.{root_bd_st}.{root_bd}.{st}.{it}.p{player}.i"))
}

pub fn endgame_dir(dir: &PathBuf, endgame_card_abs: &str, endgame_bet_abs: &str, endgame_cfr_cfg: &str, method: &str, asym_p: u8, solve_p: u8) -> PathBuf {
    dir.join(format!(
        "endgames.{endgame_card_abs}.{endgame_bet_abs}.{endgame_cfr_cfg}.{method}.p{asym_p}.p{solve_p}"
    ))
}

pub fn endgame_leaf_path(endgame_dir: &PathBuf, action_sequence: &str, gbd: u32) -> PathBuf {
    endgame_dir.join(action_sequence).join(gbd.to_string())
}

pub fn cv_dir(dir: &PathBuf, kind: &str, it: u32, player: u8) -> PathBuf {
    dir.join(format!("{kind}.{it}.p{player}"))
}

pub fn cv_path(cv_dir: &PathBuf, action_sequence: &str, gbd: u32) -> PathBuf {
    cv_dir.join(action_sequence).join(format!("vals.{gbd}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endgame_leaf_path_nests_action_sequence_under_gbd() {
        let root = PathBuf::from("/tmp/store");
        let dir = endgame_dir(&root, "cabs", "babs", "cfg", "COMBINED", 0, 1);
        let path = endgame_leaf_path(&dir, "b50c", 42);
        assert_eq!(
            path,
            PathBuf::from("/tmp/store/endgames.cabs.babs.cfg.COMBINED.p0.p1/b50c/42")
        );
    }

    #[test]
    fn cv_path_contains_action_sequence_and_board() {
        let root = PathBuf::from("/tmp/store");
        let dir = cv_dir(&root, "cbrs", 100, 0);
        let path = cv_path(&dir, "f-c", 7);
        assert_eq!(path, PathBuf::from("/tmp/store/cbrs.100.p0/f-c/vals.7"));
    }
}
