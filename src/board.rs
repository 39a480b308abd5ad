use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::moves::{Move, VerboseMove};
use crate::piece::{Color, Piece, PieceType};
use crate::rules::Rules;

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    pub fn none() -> Self {
        CastlingRights {
            white_kingside: false,
            white_queenside: false,
            black_kingside: false,
            black_queenside: false,
        }
    }

    pub fn all() -> Self {
        CastlingRights {
            white_kingside: true,
            white_queenside: true,
            black_kingside: true,
            black_queenside: true,
        }
    }
}

/// Why a finished game was drawn.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum DrawReason {
    Stalemate,
    FiftyMoveRule,
    Repetition,
    InsufficientMaterial,
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw(DrawReason),
}

impl GameResult {
    pub fn describe(self) -> &'static str {
        match self {
            GameResult::WhiteWins => "White wins",
            GameResult::BlackWins => "Black wins",
            GameResult::Draw(DrawReason::Stalemate) => "Draw",
            GameResult::Draw(DrawReason::FiftyMoveRule) => "Draw — 50 move rule",
            GameResult::Draw(DrawReason::Repetition) => "Draw by repetition",
            GameResult::Draw(DrawReason::InsufficientMaterial) => "Draw — insufficient material",
        }
    }
}

/// Everything `apply_unchecked` overwrites, so `undo_move` can put it back.
#[derive(Clone, Debug)]
struct Undo {
    mv: Move,
    moved: Piece,
    captured: Option<(Piece, (usize, usize))>,
    castling_rights: CastlingRights,
    en_passant_target: Option<(usize, usize)>,
    halfmove_clock: u32,
    fullmove_number: u32,
    last_move: Option<((usize, usize), (usize, usize))>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Board {
    pub squares: [[Option<Piece>; 8]; 8],
    pub current_turn: Color,
    pub castling_rights: CastlingRights,
    pub en_passant_target: Option<(usize, usize)>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
    pub captured_white: Vec<PieceType>,
    pub captured_black: Vec<PieceType>,
    pub last_move: Option<((usize, usize), (usize, usize))>,
    pub position_history: Vec<u64>,
    #[serde(skip)]
    undo_stack: Vec<Undo>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

const KNIGHT_OFFSETS: [(i32, i32); 8] = [
    (-2, -1), (-2, 1), (-1, -2), (-1, 2),
    (1, -2), (1, 2), (2, -1), (2, 1),
];
const STRAIGHT_DIRS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
const DIAGONAL_DIRS: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const PROMOTION_PIECES: [PieceType; 4] =
    [PieceType::Queen, PieceType::Rook, PieceType::Bishop, PieceType::Knight];

impl Board {
    /// Create an empty board with no pieces. Useful for setting up test positions.
    pub fn empty() -> Self {
        Board {
            squares: [[None; 8]; 8],
            current_turn: Color::White,
            castling_rights: CastlingRights::none(),
            en_passant_target: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            captured_white: Vec::new(),
            captured_black: Vec::new(),
            last_move: None,
            position_history: Vec::new(),
            undo_stack: Vec::new(),
        }
    }

    pub fn new() -> Self {
        let mut board = Board::empty();
        let back_rank = [
            PieceType::Rook,
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Queen,
            PieceType::King,
            PieceType::Bishop,
            PieceType::Knight,
            PieceType::Rook,
        ];
        for (col, &pt) in back_rank.iter().enumerate() {
            board.squares[0][col] = Some(Piece::new(pt, Color::White));
            board.squares[1][col] = Some(Piece::new(PieceType::Pawn, Color::White));
            board.squares[6][col] = Some(Piece::new(PieceType::Pawn, Color::Black));
            board.squares[7][col] = Some(Piece::new(pt, Color::Black));
        }
        board.castling_rights = CastlingRights::all();
        board.position_history.push(board.position_hash());
        board
    }

    fn in_bounds(row: i32, col: i32) -> bool {
        (0..8).contains(&row) && (0..8).contains(&col)
    }

    pub fn find_king(&self, color: Color) -> Option<(usize, usize)> {
        for r in 0..8 {
            for c in 0..8 {
                if let Some(p) = self.squares[r][c] {
                    if p.piece_type == PieceType::King && p.color == color {
                        return Some((r, c));
                    }
                }
            }
        }
        None
    }

    pub fn is_square_attacked_by(&self, row: usize, col: usize, attacker: Color) -> bool {
        let holds = |r: i32, c: i32, kinds: &[PieceType]| -> Option<bool> {
            if !Self::in_bounds(r, c) {
                return None;
            }
            self.squares[r as usize][c as usize]
                .map(|p| p.color == attacker && kinds.contains(&p.piece_type))
        };

        for (dr, dc) in &KNIGHT_OFFSETS {
            if holds(row as i32 + dr, col as i32 + dc, &[PieceType::Knight]) == Some(true) {
                return true;
            }
        }

        for dr in -1..=1 {
            for dc in -1..=1 {
                if (dr, dc) != (0, 0)
                    && holds(row as i32 + dr, col as i32 + dc, &[PieceType::King]) == Some(true)
                {
                    return true;
                }
            }
        }

        // A pawn on (row - pawn_dir, col ± 1) attacks (row, col)
        let pawn_dir: i32 = if attacker == Color::White { 1 } else { -1 };
        for dc in [-1i32, 1] {
            if holds(row as i32 - pawn_dir, col as i32 + dc, &[PieceType::Pawn]) == Some(true) {
                return true;
            }
        }

        let rays = [
            (&STRAIGHT_DIRS, [PieceType::Rook, PieceType::Queen]),
            (&DIAGONAL_DIRS, [PieceType::Bishop, PieceType::Queen]),
        ];
        for (dirs, kinds) in rays {
            for (dr, dc) in dirs {
                let mut r = row as i32 + dr;
                let mut c = col as i32 + dc;
                while Self::in_bounds(r, c) {
                    if let Some(hit) = holds(r, c, &kinds) {
                        if hit {
                            return true;
                        }
                        break;
                    }
                    r += dr;
                    c += dc;
                }
            }
        }

        false
    }

    pub fn is_in_check(&self, color: Color) -> bool {
        if let Some((kr, kc)) = self.find_king(color) {
            self.is_square_attacked_by(kr, kc, color.opposite())
        } else {
            false
        }
    }

    pub fn position_hash(&self) -> u64 {
        let mut hash: u64 = 0;
        for r in 0..8 {
            for c in 0..8 {
                if let Some(p) = self.squares[r][c] {
                    let piece_val = match p.piece_type {
                        PieceType::Pawn => 1u64,
                        PieceType::Knight => 2,
                        PieceType::Bishop => 3,
                        PieceType::Rook => 4,
                        PieceType::Queen => 5,
                        PieceType::King => 6,
                    };
                    let color_val = if p.color == Color::White { 0u64 } else { 7u64 };
                    let sq_val = piece_val + color_val;
                    hash ^= sq_val.wrapping_mul(0x9e3779b97f4a7c15u64.wrapping_add(((r * 8 + c) as u64).wrapping_mul(0x517cc1b727220a95)));
                }
            }
        }
        if self.current_turn == Color::Black { hash ^= 0xdeadbeefcafe1234; }
        if self.castling_rights.white_kingside { hash ^= 0x1; }
        if self.castling_rights.white_queenside { hash ^= 0x2; }
        if self.castling_rights.black_kingside { hash ^= 0x4; }
        if self.castling_rights.black_queenside { hash ^= 0x8; }
        if let Some((r, c)) = self.en_passant_target {
            hash ^= (r as u64 * 8 + c as u64).wrapping_mul(0xabcdef0123456789);
        }
        hash
    }

    pub fn is_threefold_repetition(&self) -> bool {
        if self.position_history.len() < 5 {
            return false;
        }
        let current = self.position_hash();
        let count = self.position_history.iter().filter(|&&h| h == current).count();
        count >= 3 // current position is already in history, so 3 entries = 3 occurrences
    }

    pub fn has_insufficient_material(&self) -> bool {
        let mut white_pieces = Vec::new();
        let mut black_pieces = Vec::new();
        for r in 0..8 {
            for c in 0..8 {
                if let Some(p) = self.squares[r][c] {
                    if p.piece_type == PieceType::King {
                        continue;
                    }
                    match p.color {
                        Color::White => white_pieces.push((p.piece_type, (r + c) % 2)),
                        Color::Black => black_pieces.push((p.piece_type, (r + c) % 2)),
                    }
                }
            }
        }
        let is_minor = |pt: PieceType| pt == PieceType::Bishop || pt == PieceType::Knight;
        match (white_pieces.as_slice(), black_pieces.as_slice()) {
            // King vs King
            ([], []) => true,
            // King+minor vs King
            ([(pt, _)], []) | ([], [(pt, _)]) => is_minor(*pt),
            // King+bishop vs King+bishop, bishops on the same colour
            ([(PieceType::Bishop, w)], [(PieceType::Bishop, b)]) => w == b,
            _ => false,
        }
    }

    pub fn is_fifty_move_draw(&self) -> bool {
        self.halfmove_clock >= 100
    }

    /// Pseudo-legal moves: every move obeying piece movement rules, including
    /// ones that leave the mover's own king in check.
    pub fn generate_moves(&self, color: Color) -> Vec<Move> {
        let mut moves = Vec::new();

        for row in 0..8usize {
            for col in 0..8usize {
                if let Some(piece) = self.squares[row][col] {
                    if piece.color == color {
                        self.generate_piece_moves(row, col, piece, &mut moves);
                    }
                }
            }
        }

        moves
    }

    fn generate_piece_moves(&self, row: usize, col: usize, piece: Piece, moves: &mut Vec<Move>) {
        let color = piece.color;
        match piece.piece_type {
            PieceType::Pawn => self.generate_pawn_moves(row, col, color, moves),
            PieceType::Knight => self.generate_knight_moves(row, col, color, moves),
            PieceType::Bishop => self.generate_sliding_moves(row, col, color, &DIAGONAL_DIRS, moves),
            PieceType::Rook => self.generate_sliding_moves(row, col, color, &STRAIGHT_DIRS, moves),
            PieceType::Queen => {
                let dirs = [STRAIGHT_DIRS, DIAGONAL_DIRS].concat();
                self.generate_sliding_moves(row, col, color, &dirs, moves)
            }
            PieceType::King => self.generate_king_moves(row, col, color, moves),
        }
    }

    fn push_pawn_move(from: (usize, usize), to: (usize, usize), promo_row: usize, moves: &mut Vec<Move>) {
        if to.0 == promo_row {
            for pt in PROMOTION_PIECES {
                moves.push(Move { from, to, promotion: Some(pt) });
            }
        } else {
            moves.push(Move::new(from, to));
        }
    }

    fn generate_pawn_moves(&self, row: usize, col: usize, color: Color, moves: &mut Vec<Move>) {
        let (dir, start_row, promo_row): (i32, usize, usize) = match color {
            Color::White => (1, 1, 7),
            Color::Black => (-1, 6, 0),
        };

        let forward = row as i32 + dir;

        // Single push
        if Self::in_bounds(forward, col as i32) && self.squares[forward as usize][col].is_none() {
            Self::push_pawn_move((row, col), (forward as usize, col), promo_row, moves);

            // Double push
            if row == start_row {
                let double = forward + dir;
                if Self::in_bounds(double, col as i32)
                    && self.squares[double as usize][col].is_none()
                {
                    moves.push(Move::new((row, col), (double as usize, col)));
                }
            }
        }

        // Captures (including en passant)
        for dc in [-1i32, 1] {
            let nc = col as i32 + dc;
            if !Self::in_bounds(forward, nc) {
                continue;
            }
            let target = (forward as usize, nc as usize);

            let is_capture = self.squares[target.0][target.1]
                .map(|p| p.color != color)
                .unwrap_or(false);
            let is_en_passant = self.en_passant_target == Some(target)
                && self.squares[target.0][target.1].is_none()
                && self.squares[row][target.1] == Some(Piece::new(PieceType::Pawn, color.opposite()));

            if is_capture || is_en_passant {
                Self::push_pawn_move((row, col), target, promo_row, moves);
            }
        }
    }

    fn generate_knight_moves(&self, row: usize, col: usize, color: Color, moves: &mut Vec<Move>) {
        for (dr, dc) in &KNIGHT_OFFSETS {
            let r = row as i32 + dr;
            let c = col as i32 + dc;
            if !Self::in_bounds(r, c) {
                continue;
            }
            let (tr, tc) = (r as usize, c as usize);
            if self.squares[tr][tc].map(|p| p.color == color).unwrap_or(false) {
                continue;
            }
            moves.push(Move::new((row, col), (tr, tc)));
        }
    }

    fn generate_sliding_moves(
        &self,
        row: usize,
        col: usize,
        color: Color,
        directions: &[(i32, i32)],
        moves: &mut Vec<Move>,
    ) {
        for (dr, dc) in directions {
            let mut r = row as i32 + dr;
            let mut c = col as i32 + dc;
            while Self::in_bounds(r, c) {
                let (tr, tc) = (r as usize, c as usize);
                if let Some(p) = self.squares[tr][tc] {
                    if p.color != color {
                        moves.push(Move::new((row, col), (tr, tc)));
                    }
                    break;
                }
                moves.push(Move::new((row, col), (tr, tc)));
                r += dr;
                c += dc;
            }
        }
    }

    fn generate_king_moves(&self, row: usize, col: usize, color: Color, moves: &mut Vec<Move>) {
        for dr in -1..=1i32 {
            for dc in -1..=1i32 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let r = row as i32 + dr;
                let c = col as i32 + dc;
                if !Self::in_bounds(r, c) {
                    continue;
                }
                let (tr, tc) = (r as usize, c as usize);
                if self.squares[tr][tc].map(|p| p.color == color).unwrap_or(false) {
                    continue;
                }
                moves.push(Move::new((row, col), (tr, tc)));
            }
        }

        // Castling
        let back_rank = match color {
            Color::White => 0,
            Color::Black => 7,
        };

        if row != back_rank || col != 4 || self.is_in_check(color) {
            return;
        }

        let rook_at = |c: usize| {
            self.squares[back_rank][c]
                .map(|p| p.piece_type == PieceType::Rook && p.color == color)
                .unwrap_or(false)
        };
        let empty = |cols: &[usize]| cols.iter().all(|&c| self.squares[back_rank][c].is_none());
        let safe = |cols: &[usize]| {
            cols.iter()
                .all(|&c| !self.is_square_attacked_by(back_rank, c, color.opposite()))
        };

        let (can_kingside, can_queenside) = match color {
            Color::White => (self.castling_rights.white_kingside, self.castling_rights.white_queenside),
            Color::Black => (self.castling_rights.black_kingside, self.castling_rights.black_queenside),
        };

        // King must not pass through check (col 5) or land in check (col 6)
        if can_kingside && rook_at(7) && empty(&[5, 6]) && safe(&[5, 6]) {
            moves.push(Move::new((row, col), (back_rank, 6)));
        }

        // Queenside: b-file must be empty, only d and c files must be safe
        if can_queenside && rook_at(0) && empty(&[1, 2, 3]) && safe(&[3, 2]) {
            moves.push(Move::new((row, col), (back_rank, 2)));
        }
    }

    /// Legal moves for `color`, in generation order.
    pub fn generate_legal_moves(&self, color: Color) -> Vec<Move> {
        let mut scratch = self.clone();
        scratch.current_turn = color;
        self.generate_moves(color)
            .into_iter()
            .filter(|m| scratch.leaves_king_safe(m))
            .collect()
    }

    /// Apply, test own king safety, undo. `self` is unchanged afterwards.
    fn leaves_king_safe(&mut self, m: &Move) -> bool {
        let mover = self.current_turn;
        if !self.apply_unchecked(m) {
            return false;
        }
        let safe = !self.is_in_check(mover);
        self.undo_move();
        safe
    }

    pub fn has_legal_move(&self) -> bool {
        let mut scratch = self.clone();
        self.generate_moves(self.current_turn)
            .iter()
            .any(|m| scratch.leaves_king_safe(m))
    }

    /// Apply a move that is at least pseudo-legal. Returns `false` without
    /// touching the board when there is no piece on the origin square.
    fn apply_unchecked(&mut self, m: &Move) -> bool {
        let (fr, fc) = m.from;
        let (tr, tc) = m.to;

        let piece = match self.squares[fr][fc] {
            Some(p) => p,
            None => return false,
        };

        let is_pawn_move = piece.piece_type == PieceType::Pawn;

        let captured = if is_pawn_move && fc != tc && self.squares[tr][tc].is_none() {
            // En passant: the captured pawn sits beside the origin square
            self.squares[fr][tc].map(|p| (p, (fr, tc)))
        } else {
            self.squares[tr][tc].map(|p| (p, (tr, tc)))
        };

        self.undo_stack.push(Undo {
            mv: *m,
            moved: piece,
            captured,
            castling_rights: self.castling_rights,
            en_passant_target: self.en_passant_target,
            halfmove_clock: self.halfmove_clock,
            fullmove_number: self.fullmove_number,
            last_move: self.last_move,
        });

        if let Some((cap, (cr, cc))) = captured {
            match cap.color {
                Color::White => self.captured_white.push(cap.piece_type),
                Color::Black => self.captured_black.push(cap.piece_type),
            }
            self.squares[cr][cc] = None;
        }

        // Move the piece, promoting if requested
        self.squares[fr][fc] = None;
        self.squares[tr][tc] = Some(match m.promotion {
            Some(promo_type) => Piece::new(promo_type, piece.color),
            None => piece,
        });

        // Handle castling (move the rook)
        if piece.piece_type == PieceType::King {
            let col_diff = tc as i32 - fc as i32;
            if col_diff == 2 {
                self.squares[fr][5] = self.squares[fr][7].take();
            } else if col_diff == -2 {
                self.squares[fr][3] = self.squares[fr][0].take();
            }
        }

        // Update castling rights
        if piece.piece_type == PieceType::King {
            match piece.color {
                Color::White => {
                    self.castling_rights.white_kingside = false;
                    self.castling_rights.white_queenside = false;
                }
                Color::Black => {
                    self.castling_rights.black_kingside = false;
                    self.castling_rights.black_queenside = false;
                }
            }
        }
        // A rook leaving or being captured on its home square
        for square in [(fr, fc), (tr, tc)] {
            match square {
                (0, 0) => self.castling_rights.white_queenside = false,
                (0, 7) => self.castling_rights.white_kingside = false,
                (7, 0) => self.castling_rights.black_queenside = false,
                (7, 7) => self.castling_rights.black_kingside = false,
                _ => {}
            }
        }

        // Update en passant target
        if is_pawn_move && ((fr as i32 - tr as i32).abs() == 2) {
            self.en_passant_target = Some(((fr + tr) / 2, fc));
        } else {
            self.en_passant_target = None;
        }

        if is_pawn_move || captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock = self.halfmove_clock.saturating_add(1);
        }

        if self.current_turn == Color::Black {
            self.fullmove_number = self.fullmove_number.saturating_add(1);
        }
        self.current_turn = self.current_turn.opposite();
        self.last_move = Some(((fr, fc), (tr, tc)));
        self.position_history.push(self.position_hash());
        true
    }

    /// Apply `m` if it is legal for the side to move.
    pub fn apply_move(&mut self, m: &Move) -> bool {
        if [m.from.0, m.from.1, m.to.0, m.to.1].iter().any(|&i| i > 7) {
            return false;
        }
        let mover = self.current_turn;
        let Some(piece) = self.squares[m.from.0][m.from.1] else {
            return false;
        };
        if piece.color != mover {
            return false;
        }

        let mut candidates = Vec::new();
        self.generate_piece_moves(m.from.0, m.from.1, piece, &mut candidates);
        if !candidates.contains(m) || !self.apply_unchecked(m) {
            return false;
        }
        if self.is_in_check(mover) {
            self.undo_move();
            return false;
        }
        true
    }

    /// Revert the most recent applied move. A no-op on a fresh board.
    pub fn undo_move(&mut self) {
        let Some(undo) = self.undo_stack.pop() else {
            return;
        };
        let (fr, fc) = undo.mv.from;
        let (tr, tc) = undo.mv.to;

        self.position_history.pop();
        self.current_turn = self.current_turn.opposite();
        self.fullmove_number = undo.fullmove_number;

        self.squares[tr][tc] = None;
        self.squares[fr][fc] = Some(undo.moved);

        if undo.moved.piece_type == PieceType::King {
            let col_diff = tc as i32 - fc as i32;
            if col_diff == 2 {
                self.squares[fr][7] = self.squares[fr][5].take();
            } else if col_diff == -2 {
                self.squares[fr][0] = self.squares[fr][3].take();
            }
        }

        if let Some((cap, (cr, cc))) = undo.captured {
            self.squares[cr][cc] = Some(cap);
            match cap.color {
                Color::White => self.captured_white.pop(),
                Color::Black => self.captured_black.pop(),
            };
        }

        self.castling_rights = undo.castling_rights;
        self.en_passant_target = undo.en_passant_target;
        self.halfmove_clock = undo.halfmove_clock;
        self.last_move = undo.last_move;
    }

    /// Number of moves that can currently be undone.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn result(&self) -> Option<GameResult> {
        if !self.has_legal_move() {
            return Some(if self.is_in_check(self.current_turn) {
                match self.current_turn {
                    Color::White => GameResult::BlackWins,
                    Color::Black => GameResult::WhiteWins,
                }
            } else {
                GameResult::Draw(DrawReason::Stalemate)
            });
        }
        if self.is_fifty_move_draw() {
            return Some(GameResult::Draw(DrawReason::FiftyMoveRule));
        }
        if self.is_threefold_repetition() {
            return Some(GameResult::Draw(DrawReason::Repetition));
        }
        if self.has_insufficient_material() {
            return Some(GameResult::Draw(DrawReason::InsufficientMaterial));
        }
        None
    }
}

impl Rules for Board {
    fn legal_moves(&self) -> Vec<Move> {
        self.generate_legal_moves(self.current_turn)
    }

    fn legal_moves_verbose(&self) -> Vec<VerboseMove> {
        let legal = self.legal_moves();
        let mut scratch = self.clone();
        legal
            .iter()
            .map(|m| scratch.describe_move(m, &legal))
            .collect()
    }

    fn apply_move(&mut self, mv: &Move) -> bool {
        Board::apply_move(self, mv)
    }

    fn undo_move(&mut self) {
        Board::undo_move(self)
    }

    fn side_to_move(&self) -> Color {
        self.current_turn
    }

    fn piece_at(&self, (row, col): (usize, usize)) -> Option<Piece> {
        self.squares.get(row)?.get(col).copied().flatten()
    }

    fn is_check(&self) -> bool {
        self.is_in_check(self.current_turn)
    }

    fn is_checkmate(&self) -> bool {
        self.is_check() && !self.has_legal_move()
    }

    fn is_stalemate(&self) -> bool {
        !self.is_check() && !self.has_legal_move()
    }

    fn is_draw(&self) -> bool {
        self.is_fifty_move_draw() || self.has_insufficient_material() || self.is_threefold_repetition()
    }

    fn is_game_over(&self) -> bool {
        self.result().is_some()
    }

    fn serialize(&self) -> String {
        self.to_fen()
    }

    fn deserialize(snapshot: &str) -> Result<Self> {
        Board::from_fen(snapshot)
    }
}
