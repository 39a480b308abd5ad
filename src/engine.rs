// =============================================================================
// Chess AI Engine
//
// Three interchangeable move-selection strategies share one static
// evaluator: uniform random, one-ply greedy (captures and checks), and
// depth-limited minimax with alpha-beta pruning. Moves are visited in the
// rules engine's enumeration order and ties go to the first move found, so
// for a fixed position every strategy except Random is deterministic.
//
// All scores are from White's perspective (positive = good for White).
// Searches take the position by `&mut` and leave it exactly as they found
// it: every apply_move is paired with an undo_move before returning.
//
// `run_request` is the only entry point used by the dispatch coordinator,
// both on the worker thread and for the synchronous fallback.
// =============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::board::Board;
use crate::error::Result;
use crate::moves::Move;
use crate::piece::Color;
use crate::rules::Rules;

/// Uniform pick from `items`.
/// Uses js_sys::Math::random() in WASM builds, rand crate natively.
fn choose_uniform<T: Clone>(items: &[T]) -> Option<T> {
    #[cfg(target_arch = "wasm32")]
    {
        if items.is_empty() {
            return None;
        }
        let index = (js_sys::Math::random() * items.len() as f64) as usize;
        Some(items[index.min(items.len() - 1)].clone())
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        use rand::seq::SliceRandom;
        items.choose(&mut rand::thread_rng()).cloned()
    }
}

// =============================================================================
// Constants
// =============================================================================

pub type Score = i64;

/// Checkmate. `+MATE_SCORE` means White has mated, `-MATE_SCORE` Black.
pub const MATE_SCORE: Score = 1_000_000_000;

/// Mobility never counts for more than this many moves.
const MOBILITY_CAP: usize = 30;

/// Penalty for the side to move being in check.
const CHECK_PENALTY: Score = 15;

/// Greedy bonus for a checking move.
const GREEDY_CHECK_BONUS: Score = 5;

// =============================================================================
// Strategies and results
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Random,
    Greedy,
    #[default]
    Minimax,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Random, Strategy::Greedy, Strategy::Minimax];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Random => "random",
            Strategy::Greedy => "greedy",
            Strategy::Minimax => "minimax",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Strategy::Random),
            "greedy" => Ok(Strategy::Greedy),
            "minimax" => Ok(Strategy::Minimax),
            other => Err(format!("unknown strategy '{other}' (expected random, greedy or minimax)")),
        }
    }
}

/// The result of a move search: the chosen move, the score the strategy
/// gave it, and the number of static evaluations performed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PickResult {
    pub mv: Move,
    pub score: Score,
    pub evals: u64,
}

/// A move request as it crosses into the search context. The position is a
/// FEN snapshot, so the search always works on its own private board.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct SearchRequest {
    pub id: u64,
    pub position: String,
    pub strategy: Strategy,
    pub depth: u32,
    pub ai_color: Color,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct SearchResponse {
    pub id: u64,
    pub mv: Option<Move>,
}

// =============================================================================
// Evaluation
// =============================================================================

/// Static score of `pos` from White's perspective.
///
/// Terminal positions short-circuit: the side to move being mated scores
/// `∓MATE_SCORE`, any draw scores exactly 0. Otherwise the score is material
/// (P=100, N=320, B=330, R=500, Q=900) plus the side to move's capped
/// mobility, minus a small penalty if that side is in check.
pub fn evaluate<R: Rules>(pos: &R) -> Score {
    let side = pos.side_to_move().sign();
    let in_check = pos.is_check();
    let mobility = pos.legal_moves().len();

    if mobility == 0 {
        // Checkmate: the side to move has lost. Otherwise stalemate.
        return if in_check { -side * MATE_SCORE } else { 0 };
    }
    if pos.is_draw() {
        return 0;
    }

    let mut score = 0;
    for row in 0..8 {
        for col in 0..8 {
            if let Some(p) = pos.piece_at((row, col)) {
                score += p.color.sign() * p.piece_type.value();
            }
        }
    }

    score += side * mobility.min(MOBILITY_CAP) as Score;
    if in_check {
        score -= side * CHECK_PENALTY;
    }
    score
}

fn play<R: Rules>(pos: &mut R, mv: &Move) {
    let applied = pos.apply_move(mv);
    assert!(applied, "rules engine rejected its own legal move {mv}");
}

// =============================================================================
// Random
// =============================================================================

pub fn random_move<R: Rules>(pos: &R) -> Option<Move> {
    if pos.is_game_over() {
        return None;
    }
    choose_uniform(&pos.legal_moves())
}

// =============================================================================
// Greedy: one ply, captures and checks
// =============================================================================

/// Pick the move with the best immediate payoff: a capture scores the
/// victim's value minus the attacker's plus one, a mate scores
/// `MATE_SCORE`, a check scores 5. The first move with the highest score wins.
pub fn greedy_move<R: Rules>(pos: &R) -> Option<PickResult> {
    if pos.is_game_over() {
        return None;
    }
    let moves = pos.legal_moves_verbose();
    if moves.is_empty() {
        return None;
    }

    let mut best_score = Score::MIN;
    let mut best: Option<Move> = None;
    for vm in &moves {
        let mut score = 0;
        if let Some(captured) = vm.captured {
            score += captured.value() - vm.piece.value() + 1;
        }
        if vm.is_mate() {
            score += MATE_SCORE;
        } else if vm.is_check() {
            score += GREEDY_CHECK_BONUS;
        }
        if score > best_score {
            best_score = score;
            best = Some(vm.mv);
        }
    }

    let evals = moves.len() as u64;
    match best {
        Some(mv) => Some(PickResult { mv, score: best_score, evals }),
        // Nothing beat the sentinel: fall back to any legal move.
        None => choose_uniform(&moves).map(|vm| PickResult { mv: vm.mv, score: 0, evals }),
    }
}

// =============================================================================
// Minimax with alpha-beta pruning
// =============================================================================

/// Alpha-beta minimax. White maximizes, Black minimizes, and a branch is
/// abandoned as soon as `alpha >= beta`. The position is restored before
/// returning.
fn search<R: Rules>(pos: &mut R, depth: u32, mut alpha: Score, mut beta: Score, evals: &mut u64) -> Score {
    if depth == 0 || pos.is_game_over() {
        *evals += 1;
        return evaluate(pos);
    }

    let moves = pos.legal_moves();
    if moves.is_empty() {
        *evals += 1;
        return evaluate(pos);
    }

    if pos.side_to_move() == Color::White {
        let mut val = Score::MIN;
        for mv in &moves {
            play(pos, mv);
            let child = search(pos, depth - 1, alpha, beta, evals);
            pos.undo_move();
            val = val.max(child);
            alpha = alpha.max(val);
            if alpha >= beta {
                break;
            }
        }
        val
    } else {
        let mut val = Score::MAX;
        for mv in &moves {
            play(pos, mv);
            let child = search(pos, depth - 1, alpha, beta, evals);
            pos.undo_move();
            val = val.min(child);
            beta = beta.min(val);
            if alpha >= beta {
                break;
            }
        }
        val
    }
}

/// Pick the best move for `ai_color` searching `depth` plies (at least 1).
///
/// Every root move gets a full window, so its score is exact; the first
/// move with the strictly best score for `ai_color` is returned.
pub fn minimax_move<R: Rules>(pos: &mut R, depth: u32, ai_color: Color) -> Option<PickResult> {
    if pos.is_game_over() {
        return None;
    }
    let depth = depth.max(1);
    let moves = pos.legal_moves();

    let mut evals = 0;
    let mut best_score = match ai_color {
        Color::White => Score::MIN,
        Color::Black => Score::MAX,
    };
    let mut best: Option<Move> = None;

    for mv in &moves {
        play(pos, mv);
        let score = search(pos, depth - 1, Score::MIN, Score::MAX, &mut evals);
        pos.undo_move();

        let improves = match ai_color {
            Color::White => score > best_score,
            Color::Black => score < best_score,
        };
        if improves {
            best_score = score;
            best = Some(*mv);
        }
    }

    best.map(|mv| PickResult { mv, score: best_score, evals })
}

// =============================================================================
// Strategy dispatch
// =============================================================================

/// Run `strategy` on `pos`. `None` means the game is over.
pub fn pick_move<R: Rules>(pos: &mut R, strategy: Strategy, depth: u32, ai_color: Color) -> Option<PickResult> {
    match strategy {
        Strategy::Random => random_move(pos).map(|mv| PickResult { mv, score: 0, evals: 0 }),
        Strategy::Greedy => greedy_move(pos),
        Strategy::Minimax => minimax_move(pos, depth, ai_color),
    }
}

/// Serve one search request: rebuild the snapshot, run the strategy, and
/// answer with the request's id. Both the worker thread and the synchronous
/// fallback go through here.
pub fn run_request(request: &SearchRequest) -> Result<SearchResponse> {
    let mut board = <Board as Rules>::deserialize(&request.position)?;
    let result = pick_move(&mut board, request.strategy, request.depth, request.ai_color);

    match &result {
        Some(r) => debug!(
            id = request.id,
            strategy = %request.strategy,
            depth = request.depth,
            mv = %r.mv,
            score = r.score,
            evals = r.evals,
            "search finished"
        ),
        None => debug!(id = request.id, "search found no move"),
    }

    Ok(SearchResponse {
        id: request.id,
        mv: result.map(|r| r.mv),
    })
}
