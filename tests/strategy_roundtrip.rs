//! Round-trip invariant (§8): for any `CFRValues` built by allocate+populate,
//! `write(dir, it); read_back(dir, it)` yields values equal to what was
//! written, both uncompressed and with zstd compression enabled on a street.

use endgame_resolver::bet_size::{BetSize, BetSizeOptions};
use endgame_resolver::betting_tree::{BettingAbstraction, BettingTree};
use endgame_resolver::board_tree::BoardTree;
use endgame_resolver::bucket::{IdentityBucketMap, StreetBuckets};
use endgame_resolver::cfr_config::CfrConfig;
use endgame_resolver::game_config::GameParams;
use endgame_resolver::strategy_store::{CFRValues, Storage, StoreRoot};
use endgame_resolver::trainer::Trainer;

fn fixture(compressed_streets: Vec<u8>) -> (GameParams, BoardTree, BettingTree, StreetBuckets, CfrConfig) {
    let params = GameParams::kuhn();
    let board_tree = BoardTree::build(&params);
    let opts = BetSizeOptions::try_from_sizes(vec![BetSize::PotRelative(1.0)], vec![]).unwrap();
    let abstraction = BettingAbstraction::uniform(params.num_streets(), opts, 1);
    let betting_tree = BettingTree::build(&abstraction, &params);
    let buckets = StreetBuckets::new(vec![Box::new(IdentityBucketMap::build(&board_tree))]);
    let cfg = CfrConfig {
        sumprob_streets: vec![0],
        compressed_streets,
        ..CfrConfig::default()
    };
    (params, board_tree, betting_tree, buckets, cfg)
}

fn assert_same_values(a: &CFRValues, b: &CFRValues, betting_tree: &BettingTree) {
    for player in 0..2u8 {
        for st in 0..1u8 {
            let node = betting_tree.node(betting_tree.root());
            let left = a.values(player, st, node.nonterminal_id);
            let right = b.values(player, st, node.nonterminal_id);
            match (left, right) {
                (Some(Storage::Doubles(l)), Some(Storage::Doubles(r))) => assert_eq!(l, r),
                (Some(Storage::Ints(l)), Some(Storage::Ints(r))) => assert_eq!(l, r),
                (None, None) => {}
                other => panic!("mismatched storage kinds after round-trip: {other:?}"),
            }
        }
    }
}

#[test]
fn uncompressed_round_trip_is_exact() {
    let (params, board_tree, betting_tree, buckets, cfg) = fixture(vec![]);
    let trainer = Trainer::new(&board_tree, &betting_tree, &buckets, &cfg, params.deck_size);
    let (mut regrets, mut sumprobs) = trainer.new_values();
    let _ = trainer.train(&mut regrets, &mut sumprobs, 30, 0.0);

    let dir = std::env::temp_dir().join(format!("roundtrip-plain-{}", std::process::id()));
    sumprobs.write(&dir, &betting_tree, 30, None).unwrap();

    let layouts = CFRValues::infer_layouts(&betting_tree, &cfg, &buckets, 1, false);
    let mut reloaded = CFRValues::new(true, [true, true], StoreRoot { root_bd_st: 0, root_bd: 0 }, layouts);
    reloaded.allocate_and_clear_doubles(&betting_tree, &board_tree, &buckets, None);
    reloaded.read(&dir, &betting_tree, 30, None).unwrap();

    assert_same_values(&sumprobs, &reloaded, &betting_tree);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn compressed_round_trip_is_lossless() {
    let (params, board_tree, betting_tree, buckets, cfg) = fixture(vec![0]);
    let trainer = Trainer::new(&board_tree, &betting_tree, &buckets, &cfg, params.deck_size);
    let (mut regrets, mut sumprobs) = trainer.new_values();
    let _ = trainer.train(&mut regrets, &mut sumprobs, 30, 0.0);

    let dir = std::env::temp_dir().join(format!("roundtrip-compressed-{}", std::process::id()));
    sumprobs.write(&dir, &betting_tree, 30, None).unwrap();

    let layouts = CFRValues::infer_layouts(&betting_tree, &cfg, &buckets, 1, false);
    let mut reloaded = CFRValues::new(true, [true, true], StoreRoot { root_bd_st: 0, root_bd: 0 }, layouts);
    reloaded.allocate_and_clear_doubles(&betting_tree, &board_tree, &buckets, None);
    reloaded.read(&dir, &betting_tree, 30, None).unwrap();

    assert_same_values(&sumprobs, &reloaded, &betting_tree);
    let _ = std::fs::remove_dir_all(&dir);
}
