//! The boundary between the move-selection engine and a rules engine.
//!
//! The engine never looks inside a position except through this trait. A
//! search owns one position exclusively and mutates it only through matched
//! `apply_move` / `undo_move` pairs.

use crate::error::Result;
use crate::moves::{Move, VerboseMove};
use crate::piece::{Color, Piece};

pub trait Rules {
    /// Legal moves for the side to move. The enumeration order is part of the
    /// contract: strategies break score ties in favour of the earliest move.
    fn legal_moves(&self) -> Vec<Move>;

    /// Same moves, same order, annotated with moving/captured piece and SAN.
    fn legal_moves_verbose(&self) -> Vec<VerboseMove>;

    /// Play `mv` in place. Returns `false` and leaves the position untouched
    /// when `mv` is not legal.
    fn apply_move(&mut self, mv: &Move) -> bool;

    /// Exact inverse of the most recent successful `apply_move`.
    fn undo_move(&mut self);

    fn side_to_move(&self) -> Color;

    fn piece_at(&self, square: (usize, usize)) -> Option<Piece>;

    fn is_check(&self) -> bool;

    fn is_checkmate(&self) -> bool;

    fn is_stalemate(&self) -> bool;

    /// Threefold repetition, insufficient material or the fifty-move rule.
    /// Stalemate is reported separately by `is_stalemate`.
    fn is_draw(&self) -> bool;

    fn is_game_over(&self) -> bool {
        self.is_checkmate() || self.is_stalemate() || self.is_draw()
    }

    /// Round-trippable snapshot of the position.
    fn serialize(&self) -> String;

    fn deserialize(snapshot: &str) -> Result<Self>
    where
        Self: Sized;
}
