//! Driver binary for the base-strategy trainer (`trainer.rs`). Parses a
//! handful of config-file paths plus the iteration/exploitability knobs,
//! calls into the library, and writes the resulting regrets/sumprobs under
//! the "new" store root.

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use endgame_resolver::betting_tree::{BettingAbstraction, BettingTree};
use endgame_resolver::board_tree::BoardTree;
use endgame_resolver::bucket::CardAbstractionConfig;
use endgame_resolver::cfr_config::CfrConfig;
use endgame_resolver::game_config::GameParams;
use endgame_resolver::trainer::Trainer;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Train a base CFR strategy", long_about = None)]
struct Args {
    /// Path to a GameParams JSON file.
    #[arg(long)]
    game_params: PathBuf,

    /// Path to a CardAbstractionConfig JSON file.
    #[arg(long)]
    card_abstraction: PathBuf,

    /// Path to a BettingAbstraction JSON file.
    #[arg(long)]
    betting_abstraction: PathBuf,

    /// Path to a CfrConfig JSON file.
    #[arg(long)]
    cfr_config: PathBuf,

    /// Store root to write the trained regrets/sumprobs under.
    #[arg(long)]
    out_dir: PathBuf,

    /// Maximum number of full (both-player) iterations to run.
    #[arg(short = 'n', long, default_value = "1000")]
    max_iterations: u32,

    /// Stop early once `exploitability()` drops to or below this value.
    #[arg(short = 'e', long, default_value = "0.0")]
    target_exploitability: f32,
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

    let board_tree = BoardTree::build(&game_params);
    let betting_tree = BettingTree::build(&betting_abstraction, &game_params);
    let buckets = card_abstraction.build(&board_tree).map_err(|e| e.to_string())?;

    let trainer = Trainer::new(&board_tree, &betting_tree, &buckets, &cfr_config, game_params.deck_size);
    let (mut regrets, mut sumprobs) = trainer.new_values();

    info!("training: max_iterations={} target_exploitability={}", args.max_iterations, args.target_exploitability);
    let final_exploitability = trainer.train(&mut regrets, &mut sumprobs, args.max_iterations, args.target_exploitability);
    info!("training done: exploitability={final_exploitability:.6e}");

    regrets.write(&args.out_dir, &betting_tree, args.max_iterations, None).map_err(|e| e.to_string())?;
    sumprobs.write(&args.out_dir, &betting_tree, args.max_iterations, None).map_err(|e| e.to_string())?;
    info!("wrote regrets/sumprobs to {}", args.out_dir.display());
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
