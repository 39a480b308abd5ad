use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chess::board::Board;
use chess::config::{clamp_depth, AiConfig};
use chess::dispatch::{Coordinator, Source};
use chess::engine::Strategy;
use chess::piece::Color;

/// Play one AI-vs-AI game through the background search coordinator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Strategy for White (random, greedy, minimax)
    #[arg(long)]
    white: Option<Strategy>,

    /// Strategy for Black (random, greedy, minimax)
    #[arg(long)]
    black: Option<Strategy>,

    /// Minimax depth in plies, clamped to 1..=4
    #[arg(long)]
    depth: Option<u32>,

    /// Milliseconds to wait for the worker before searching in the foreground
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// JSON file with default strategy, depth and timeout
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting position
    #[arg(long)]
    fen: Option<String>,

    /// Stop after this many plies
    #[arg(long, default_value_t = 120)]
    max_moves: u32,
}

fn main() -> chess::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let base = match &args.config {
        Some(path) => AiConfig::load(path)?,
        None => AiConfig::default(),
    };
    let white = args.white.unwrap_or(base.strategy);
    let black = args.black.unwrap_or(base.strategy);
    let depth = clamp_depth(args.depth.unwrap_or(base.depth));
    let timeout = AiConfig {
        timeout_ms: args.timeout_ms.unwrap_or(base.timeout_ms),
        ..base
    }
    .timeout();

    let mut board = match &args.fen {
        Some(fen) => Board::from_fen(fen)?,
        None => Board::new(),
    };
    let mut coordinator = Coordinator::new(timeout);
    info!(%white, %black, depth, ?timeout, "starting self-play");

    let mut plies = 0;
    let mut fallbacks = 0;
    while plies < args.max_moves && board.result().is_none() {
        let side = board.current_turn;
        let strategy = match side {
            Color::White => white,
            Color::Black => black,
        };
        coordinator.request(&board, strategy, depth, side);
        let Some(resolution) = coordinator.wait(&mut board) else {
            break;
        };
        let Some(mv) = resolution.mv else {
            break;
        };
        if matches!(resolution.source, Source::Fallback(_)) {
            fallbacks += 1;
        }
        plies += 1;
        println!("{:>3}. {:?} {mv}", board.fullmove_number, side);
    }

    let outcome = board.result().map(|r| r.describe()).unwrap_or("unfinished");
    println!("{outcome} after {plies} plies ({fallbacks} foreground searches)");
    println!("{}", board.to_fen());
    Ok(())
}
