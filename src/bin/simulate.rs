use std::io::Write;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chess::board::{Board, GameResult};
use chess::config::clamp_depth;
use chess::engine::{pick_move, Strategy};
use chess::piece::Color;

/// Round-robin matchups between the move-selection strategies.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Games per pairing, split evenly between colours
    #[arg(long, default_value_t = 10)]
    games: usize,

    /// Minimax depth in plies, clamped to 1..=4
    #[arg(long, default_value_t = 2)]
    depth: u32,

    /// Unfinished games are scored as draws after this many plies
    #[arg(long, default_value_t = 150)]
    max_moves: u32,
}

#[derive(Debug, Default)]
struct MatchResult {
    a_wins: u32,
    b_wins: u32,
    draws: u32,
}

fn play_game(white: Strategy, black: Strategy, depth: u32, max_moves: u32) -> Option<GameResult> {
    let mut board = Board::new();
    for _ in 0..max_moves {
        if board.result().is_some() {
            break;
        }
        let side = board.current_turn;
        let strategy = if side == Color::White { white } else { black };
        match pick_move(&mut board, strategy, depth, side) {
            Some(result) => {
                if !board.apply_move(&result.mv) {
                    break;
                }
            }
            None => break,
        }
    }
    let result = board.result();
    debug!(%white, %black, ?result, plies = board.position_history.len() - 1, "game finished");
    result
}

fn run_matchup(a: Strategy, b: Strategy, args: &Args, depth: u32) -> MatchResult {
    let mut result = MatchResult::default();
    let half = args.games / 2;

    for (white, black, a_is_white) in [(a, b, true), (b, a, false)] {
        for _ in 0..half {
            match (play_game(white, black, depth, args.max_moves), a_is_white) {
                (Some(GameResult::WhiteWins), true) | (Some(GameResult::BlackWins), false) => result.a_wins += 1,
                (Some(GameResult::WhiteWins), false) | (Some(GameResult::BlackWins), true) => result.b_wins += 1,
                _ => result.draws += 1,
            }
        }
    }

    println!(
        "  {a} vs {b}: {a} wins {}, {b} wins {}, draws {} (out of {})",
        result.a_wins,
        result.b_wins,
        result.draws,
        half * 2
    );
    std::io::stdout().flush().ok();
    result
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let depth = clamp_depth(args.depth);

    println!("=== Strategy matchups (minimax depth {depth}) ===");
    println!("Games per matchup: {}, max plies per game: {}\n", args.games, args.max_moves);

    let mut points = [0.0f64; 3];
    for (i, &a) in Strategy::ALL.iter().enumerate() {
        for (j, &b) in Strategy::ALL.iter().enumerate().skip(i + 1) {
            let r = run_matchup(a, b, &args, depth);
            points[i] += r.a_wins as f64 + r.draws as f64 / 2.0;
            points[j] += r.b_wins as f64 + r.draws as f64 / 2.0;
        }
    }

    println!("\n--- Standings ---\n");
    let mut standings: Vec<(Strategy, f64)> = Strategy::ALL.into_iter().zip(points).collect();
    standings.sort_by(|x, y| y.1.total_cmp(&x.1));
    for (strategy, score) in standings {
        println!("  {score:>5.1}  {strategy}");
    }
}
