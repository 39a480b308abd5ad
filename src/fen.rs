//! FEN import/export for [`Board`]. FEN is the snapshot format that crosses
//! from the foreground to the search worker.

use crate::board::{Board, CastlingRights};
use crate::error::{ChessError, Result};
use crate::moves::{parse_square, square_name};
use crate::piece::{Color, Piece, PieceType};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl Board {
    pub fn to_fen(&self) -> String {
        let mut placement = String::new();
        for row in (0..8).rev() {
            let mut gap = 0;
            for col in 0..8 {
                match self.squares[row][col] {
                    Some(p) => {
                        if gap > 0 {
                            placement.push_str(&gap.to_string());
                            gap = 0;
                        }
                        placement.push(p.fen_char());
                    }
                    None => gap += 1,
                }
            }
            if gap > 0 {
                placement.push_str(&gap.to_string());
            }
            if row > 0 {
                placement.push('/');
            }
        }

        let turn = match self.current_turn {
            Color::White => "w",
            Color::Black => "b",
        };

        let rights = self.castling_rights;
        let mut castling: String = [
            (rights.white_kingside, 'K'),
            (rights.white_queenside, 'Q'),
            (rights.black_kingside, 'k'),
            (rights.black_queenside, 'q'),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, c)| *c)
        .collect();
        if castling.is_empty() {
            castling.push('-');
        }

        let ep = self
            .en_passant_target
            .map(square_name)
            .unwrap_or_else(|| "-".to_string());

        format!(
            "{placement} {turn} {castling} {ep} {} {}",
            self.halfmove_clock, self.fullmove_number
        )
    }

    /// Parse a FEN string. The halfmove and fullmove fields may be omitted.
    /// The returned board's repetition history starts at this position.
    pub fn from_fen(fen: &str) -> Result<Board> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 || fields.len() > 6 {
            return Err(ChessError::invalid_fen(fen, "expected 4 to 6 fields"));
        }

        let mut board = Board::empty();

        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(ChessError::invalid_fen(fen, "expected 8 ranks"));
        }
        for (i, rank) in ranks.iter().enumerate() {
            let row = 7 - i;
            let mut col = 0usize;
            for c in rank.chars() {
                if let Some(skip) = c.to_digit(10) {
                    col += skip as usize;
                } else {
                    let piece = Piece::from_fen_char(c)
                        .ok_or_else(|| ChessError::invalid_fen(fen, format!("bad piece '{c}'")))?;
                    if col >= 8 {
                        return Err(ChessError::invalid_fen(fen, format!("rank {} overflows", 8 - i)));
                    }
                    board.squares[row][col] = Some(piece);
                    col += 1;
                }
            }
            if col != 8 {
                return Err(ChessError::invalid_fen(fen, format!("rank {} is not 8 squares", 8 - i)));
            }
        }

        for color in [Color::White, Color::Black] {
            if board.find_king(color).is_none() {
                return Err(ChessError::invalid_fen(fen, format!("missing {color:?} king")));
            }
        }

        board.current_turn = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(ChessError::invalid_fen(fen, format!("bad side to move '{other}'"))),
        };

        let mut rights = CastlingRights::none();
        if fields[2] != "-" {
            for c in fields[2].chars() {
                match c {
                    'K' => rights.white_kingside = true,
                    'Q' => rights.white_queenside = true,
                    'k' => rights.black_kingside = true,
                    'q' => rights.black_queenside = true,
                    _ => return Err(ChessError::invalid_fen(fen, format!("bad castling flag '{c}'"))),
                }
            }
        }
        board.castling_rights = rights;

        board.en_passant_target = match fields[3] {
            "-" => None,
            sq => {
                let bad = || ChessError::invalid_fen(fen, format!("bad en passant square '{sq}'"));
                let (row, col) = parse_square(sq.as_bytes()).ok_or_else(bad)?;
                // The pawn that just double-stepped sits one rank past the target
                let (ep_row, pawn_row) = match board.current_turn {
                    Color::White => (5, 4),
                    Color::Black => (2, 3),
                };
                let pawn = Piece::new(PieceType::Pawn, board.current_turn.opposite());
                if row != ep_row || board.squares[row][col].is_some() || board.squares[pawn_row][col] != Some(pawn) {
                    return Err(bad());
                }
                Some((row, col))
            }
        };

        let counter = |idx: usize, default: u32| -> Result<u32> {
            match fields.get(idx) {
                None => Ok(default),
                Some(s) => s
                    .parse()
                    .map_err(|_| ChessError::invalid_fen(fen, format!("bad move counter '{s}'"))),
            }
        };
        board.halfmove_clock = counter(4, 0)?;
        board.fullmove_number = counter(5, 1)?.max(1);

        board.position_history.push(board.position_hash());
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_position_matches_new_board() {
        assert_eq!(Board::new().to_fen(), START_FEN);
        assert_eq!(Board::from_fen(START_FEN).unwrap().to_fen(), START_FEN);
    }

    #[test]
    fn round_trips_representative_positions() {
        for fen in [
            "r3k2r/pppq1ppp/8/3pP3/8/8/PPPQ1PPP/R3K2R w KQkq d6 0 10",
            "8/8/8/8/8/1q6/2k5/K7 w - - 12 57",
            "4k3/P7/8/8/8/8/8/4K3 b - - 0 1",
        ] {
            assert_eq!(Board::from_fen(fen).unwrap().to_fen(), fen);
        }
    }

    #[test]
    fn en_passant_square_needs_a_pawn_behind_it() {
        let fen = "rnbqkbnr/ppp2ppp/8/3pp3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq d6 0 3";
        let board = Board::from_fen(fen).unwrap();
        assert_eq!(board.en_passant_target, Some((5, 3)));

        let black = Board::from_fen("4k3/8/8/8/3Pp3/8/8/4K3 b - d3 0 1").unwrap();
        assert_eq!(black.en_passant_target, Some((2, 3)));
        assert!(Board::from_fen("4k3/8/8/8/4p3/8/8/4K3 b - d3 0 1").is_err());
    }

    #[test]
    fn counters_are_optional() {
        let err = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w -").unwrap_err();
        assert!(matches!(err, ChessError::InvalidFen { .. }));

        let board = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - -").unwrap();
        assert_eq!(board.halfmove_clock, 0);
        assert_eq!(board.fullmove_number, 1);
    }

    #[test]
    fn rejects_malformed_fen() {
        for bad in [
            "",
            "8/8/8/8/8/8/8/8 w - - 0 1",                       // no kings
            "4k3/8/8/8/8/8/8/4K2 w - - 0 1",                    // short rank
            "4k3/8/8/8/8/8/8/4K4 w - - 0 1",                    // long rank
            "4k3/8/8/8/8/8/8/8K w - - 0 1",                     // piece past the h-file
            "4k3/8/8/8/8/8/8/4X3 w - - 0 1",                    // bad piece
            "4k3/8/8/8/8/8/8/4K3 x - - 0 1",                    // bad turn
            "4k3/8/8/8/8/8/8/4K3 w Z - 0 1",                    // bad castling
            "4k3/8/8/8/8/8/8/4K3 w - e9 0 1",                   // bad ep square
            "4k3/8/8/8/8/8/3PK3/8 w - e3 0 1",                  // ep rank for the wrong side
            "4k3/8/8/8/8/8/8/4K3 w - e6 0 1",                   // ep with no pawn to take
            "4k3/8/4p3/4p3/8/8/8/4K3 w - e6 0 1",               // ep square occupied
            "4k3/8/8/8/8/8/8/4K3 w - - x 1",                    // bad clock
        ] {
            assert!(Board::from_fen(bad).is_err(), "accepted {bad:?}");
        }
    }
}
