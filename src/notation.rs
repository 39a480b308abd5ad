//! Standard algebraic notation for legal moves.

use crate::board::Board;
use crate::moves::{square_name, Move, VerboseMove};
use crate::piece::PieceType;

impl Board {
    /// Annotate a legal move with its moving piece, captured piece and SAN.
    /// `legal` is the full legal move list of the current position, used for
    /// disambiguation. The board is restored before returning.
    pub(crate) fn describe_move(&mut self, m: &Move, legal: &[Move]) -> VerboseMove {
        let (fr, fc) = m.from;
        let (tr, tc) = m.to;
        let piece = self.squares[fr][fc]
            .map(|p| p.piece_type)
            .unwrap_or(PieceType::Pawn);

        let captured = match self.squares[tr][tc] {
            Some(p) => Some(p.piece_type),
            None if piece == PieceType::Pawn && fc != tc => Some(PieceType::Pawn),
            None => None,
        };

        let mut san = String::new();
        let col_diff = tc as i32 - fc as i32;
        if piece == PieceType::King && col_diff.abs() == 2 {
            san.push_str(if col_diff > 0 { "O-O" } else { "O-O-O" });
        } else {
            if piece == PieceType::Pawn {
                if captured.is_some() {
                    san.push((b'a' + fc as u8) as char);
                }
            } else {
                san.push(piece.letter());
                san.push_str(&self.disambiguation(m, piece, legal));
            }
            if captured.is_some() {
                san.push('x');
            }
            san.push_str(&square_name(m.to));
            if let Some(promo) = m.promotion {
                san.push('=');
                san.push(promo.letter());
            }
        }

        let mover = self.current_turn;
        if self.apply_move(m) {
            if self.is_in_check(mover.opposite()) {
                san.push(if self.has_legal_move() { '+' } else { '#' });
            }
            self.undo_move();
        }

        VerboseMove { mv: *m, piece, captured, san }
    }

    /// File, rank or full origin square when another piece of the same kind
    /// can reach the same destination.
    fn disambiguation(&self, m: &Move, piece: PieceType, legal: &[Move]) -> String {
        let rivals: Vec<&Move> = legal
            .iter()
            .filter(|other| {
                other.to == m.to
                    && other.from != m.from
                    && self.squares[other.from.0][other.from.1].map(|p| p.piece_type) == Some(piece)
            })
            .collect();

        if rivals.is_empty() {
            return String::new();
        }
        let origin = square_name(m.from);
        if rivals.iter().all(|r| r.from.1 != m.from.1) {
            origin[..1].to_string()
        } else if rivals.iter().all(|r| r.from.0 != m.from.0) {
            origin[1..].to_string()
        } else {
            origin
        }
    }
}
