//! Driver binary for the endgame resolver (`resolver.rs`). Loads a base
//! strategy, rebuilds the betting/board/bucket context, and runs one of
//! the four seeding methods over every subgame on the configured resolve
//! street.

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use endgame_resolver::betting_tree::{BettingAbstraction, BettingTree};
use endgame_resolver::board_tree::BoardTree;
use endgame_resolver::bucket::CardAbstractionConfig;
use endgame_resolver::cfr_config::CfrConfig;
use endgame_resolver::game_config::GameParams;
use endgame_resolver::resolver::{EndgameResolver, ResolveMethod, ResolverRunConfig};
use endgame_resolver::strategy_store::{CFRValues, StoreRoot};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Re-solve endgames against a base strategy", long_about = None)]
struct Args {
    #[arg(long)]
    game_params: PathBuf,

    #[arg(long)]
    card_abstraction: PathBuf,

    #[arg(long)]
    betting_abstraction: PathBuf,

    #[arg(long)]
    cfr_config: PathBuf,

    /// Directory the base (trunk) sumprobs were written to by `train`.
    #[arg(long)]
    base_dir: PathBuf,

    /// Iteration number of the base sumprobs to read.
    #[arg(long)]
    base_iteration: u32,

    /// Directory to write resolved endgame strategies under.
    #[arg(long)]
    out_dir: PathBuf,

    /// One of UNSAFE, CFRD, MAXMARGIN, COMBINED.
    #[arg(long, default_value = "COMBINED")]
    method: String,

    /// Player whose subgame strategy is being produced.
    #[arg(long, default_value = "0")]
    solve_player: u8,

    /// Player the betting abstraction was built asymmetrically for. Equal
    /// to `solve_player` unless an asymmetric tree favoured someone else.
    #[arg(long)]
    asym_player: Option<u8>,

    #[arg(long, default_value = "false")]
    nested: bool,

    #[arg(long, default_value = "false")]
    internal: bool,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
}

fn run(args: Args) -> Result<(), String> {
    let game_params: GameParams = load_json(&args.game_params)?;
    let card_abstraction: CardAbstractionConfig = load_json(&args.card_abstraction)?;
    let betting_abstraction: BettingAbstraction = load_json(&args.betting_abstraction)?;
    let cfr_config: CfrConfig = load_json(&args.cfr_config)?;

    let method: ResolveMethod = args.method.parse()?;

    let board_tree = BoardTree::build(&game_params);
    let betting_tree = BettingTree::build(&betting_abstraction, &game_params);
    let buckets = card_abstraction.build(&board_tree).map_err(|e| e.to_string())?;

    let num_streets = game_params.num_streets();
    let layouts = CFRValues::infer_layouts(&betting_tree, &cfr_config, &buckets, num_streets, !cfr_config.double_sumprobs);
    let mut base_sumprobs = CFRValues::new(true, [true, true], StoreRoot { root_bd_st: 0, root_bd: 0 }, layouts);
    if cfr_config.double_sumprobs {
        base_sumprobs.allocate_and_clear_doubles(&betting_tree, &board_tree, &buckets, None);
    } else {
        base_sumprobs.allocate_and_clear_ints(&betting_tree, &board_tree, &buckets, None);
    }
    base_sumprobs.read(&args.base_dir, &betting_tree, args.base_iteration, None).map_err(|e| e.to_string())?;
    info!("loaded base sumprobs from {} (iteration {})", args.base_dir.display(), args.base_iteration);

    let run_cfg = ResolverRunConfig {
        method,
        solve_player: args.solve_player,
        asym_player: args.asym_player.unwrap_or(args.solve_player),
        nested: args.nested,
        internal: args.internal,
        num_endgame_iterations: cfr_config.num_endgame_iterations,
    };

    let resolver = EndgameResolver::new(&game_params, &board_tree, &betting_tree, &buckets, &cfr_config);
    resolver.run(&base_sumprobs, &run_cfg, &args.out_dir).map_err(|e| e.to_string())?;
    info!("wrote resolved endgames to {}", args.out_dir.display());
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(msg) = run(args) {
        error!("{msg}");
        eprintln!("usage error: {msg}");
        exit(1);
    }
}
