use std::fmt;

use serde::{Deserialize, Serialize};

use crate::piece::PieceType;

/// A move on the board. Squares are `(row, col)` with row 0 = rank 1 and
/// col 0 = file a. `promotion` is only set when the move is a promotion.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct Move {
    pub from: (usize, usize),
    pub to: (usize, usize),
    pub promotion: Option<PieceType>,
}

impl Move {
    pub fn new(from: (usize, usize), to: (usize, usize)) -> Self {
        Move { from, to, promotion: None }
    }

    /// Convert to UCI notation, e.g. "e2e4", "a7a8q"
    pub fn to_uci(&self) -> String {
        let promo = match self.promotion {
            Some(PieceType::Queen) => "q",
            Some(PieceType::Rook) => "r",
            Some(PieceType::Bishop) => "b",
            Some(PieceType::Knight) => "n",
            _ => "",
        };
        format!("{}{}{promo}", square_name(self.from), square_name(self.to))
    }

    /// Parse from UCI notation. Returns `None` for anything off the board.
    pub fn from_uci(s: &str) -> Option<Move> {
        let bytes = s.as_bytes();
        if bytes.len() < 4 || bytes.len() > 5 {
            return None;
        }
        let from = parse_square(&bytes[0..2])?;
        let to = parse_square(&bytes[2..4])?;
        let promotion = match bytes.get(4) {
            None => None,
            Some(b'q') => Some(PieceType::Queen),
            Some(b'r') => Some(PieceType::Rook),
            Some(b'b') => Some(PieceType::Bishop),
            Some(b'n') => Some(PieceType::Knight),
            Some(_) => return None,
        };
        Some(Move { from, to, promotion })
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

/// A legal move annotated by the rules engine: the moving piece, the piece it
/// captures (en passant included) and its SAN, which carries `+` for check
/// and `#` for mate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct VerboseMove {
    pub mv: Move,
    pub piece: PieceType,
    pub captured: Option<PieceType>,
    pub san: String,
}

impl VerboseMove {
    pub fn is_mate(&self) -> bool {
        self.san.ends_with('#')
    }

    pub fn is_check(&self) -> bool {
        self.san.contains('+')
    }
}

/// Algebraic name of a square, e.g. (0, 4) -> "e1".
pub fn square_name((row, col): (usize, usize)) -> String {
    if row > 7 || col > 7 {
        return format!("({row},{col})");
    }
    let file = (b'a' + col as u8) as char;
    let rank = (b'1' + row as u8) as char;
    format!("{file}{rank}")
}

pub(crate) fn parse_square(bytes: &[u8]) -> Option<(usize, usize)> {
    match bytes {
        [f @ b'a'..=b'h', r @ b'1'..=b'8'] => Some(((r - b'1') as usize, (f - b'a') as usize)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uci_text_for_promotion() {
        let mv = Move { from: (6, 0), to: (7, 0), promotion: Some(PieceType::Queen) };
        assert_eq!(mv.to_uci(), "a7a8q");
        assert_eq!(Move::from_uci("a7a8q"), Some(mv));
    }

    #[test]
    fn from_uci_rejects_off_board_squares() {
        assert_eq!(Move::from_uci("i2i4"), None);
        assert_eq!(Move::from_uci("e9e4"), None);
        assert_eq!(Move::from_uci("e2"), None);
        assert_eq!(Move::from_uci("e7e8k"), None);
    }

    #[test]
    fn square_names() {
        assert_eq!(square_name((0, 4)), "e1");
        assert_eq!(square_name((7, 7)), "h8");
        assert_eq!(square_name((0, 8)), "(0,8)");
        assert_eq!(square_name((usize::MAX, 0)), format!("({},0)", usize::MAX));
    }
}
