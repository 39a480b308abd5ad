use crate::board::Board;
use crate::config::AiConfig;
use crate::engine::Strategy;
use crate::moves::Move;
use crate::piece::{Color, PieceType};
use crate::rules::Rules;
use crate::session::Session;
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct SquarePiece {
    piece_type: String,
    color: String,
}

#[derive(Serialize)]
struct MoveJson {
    from: [usize; 2],
    to: [usize; 2],
    promotion: Option<String>,
    san: String,
}

#[derive(Serialize)]
struct BoardState {
    squares: Vec<Vec<Option<SquarePiece>>>,
    current_turn: String,
    fen: String,
    game_over: bool,
    result: Option<String>,
    is_in_check: bool,
    legal_moves: Vec<MoveJson>,
    captured_white: Vec<String>,
    captured_black: Vec<String>,
    last_move: Option<[[usize; 2]; 2]>,
}

#[derive(Serialize)]
struct MoveResult {
    #[serde(flatten)]
    board_state: Option<BoardState>,
    error: Option<String>,
}

#[derive(Serialize)]
struct SquareMoveJson {
    to: [usize; 2],
    promotion: Option<String>,
}

fn piece_type_to_string(pt: PieceType) -> String {
    format!("{pt:?}")
}

fn color_to_string(c: Color) -> String {
    format!("{c:?}")
}

fn string_to_piece_type(s: &str) -> Option<PieceType> {
    match s {
        "Queen" => Some(PieceType::Queen),
        "Rook" => Some(PieceType::Rook),
        "Bishop" => Some(PieceType::Bishop),
        "Knight" => Some(PieceType::Knight),
        _ => None,
    }
}

fn move_json(m: &Move, san: String) -> MoveJson {
    MoveJson {
        from: [m.from.0, m.from.1],
        to: [m.to.0, m.to.1],
        promotion: m.promotion.map(piece_type_to_string),
        san,
    }
}

fn build_board_state(board: &Board) -> BoardState {
    let squares: Vec<Vec<Option<SquarePiece>>> = (0..8)
        .map(|r| {
            (0..8)
                .map(|c| {
                    board.squares[r][c].map(|p| SquarePiece {
                        piece_type: piece_type_to_string(p.piece_type),
                        color: color_to_string(p.color),
                    })
                })
                .collect()
        })
        .collect();

    let result = board.result();
    BoardState {
        squares,
        current_turn: color_to_string(board.current_turn),
        fen: board.to_fen(),
        game_over: result.is_some(),
        result: result.map(|r| r.describe().to_string()),
        is_in_check: board.is_check(),
        legal_moves: board
            .legal_moves_verbose()
            .into_iter()
            .map(|vm| move_json(&vm.mv, vm.san))
            .collect(),
        captured_white: board.captured_white.iter().map(|pt| piece_type_to_string(*pt)).collect(),
        captured_black: board.captured_black.iter().map(|pt| piece_type_to_string(*pt)).collect(),
        last_move: board.last_move.map(|((fr, fc), (tr, tc))| [[fr, fc], [tr, tc]]),
    }
}

fn to_js<T: Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

/// Human plays White, the AI plays Black.
#[wasm_bindgen]
pub struct Game {
    session: Session,
}

#[wasm_bindgen]
impl Game {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Game {
        Game {
            session: Session::new(AiConfig::default(), Color::Black),
        }
    }

    /// Returns false for an unknown strategy name.
    pub fn set_strategy(&mut self, name: &str) -> bool {
        match name.parse::<Strategy>() {
            Ok(strategy) => {
                self.session.set_strategy(strategy);
                true
            }
            Err(_) => false,
        }
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.session.set_depth(depth);
    }

    pub fn get_board_state(&self) -> JsValue {
        to_js(&build_board_state(self.session.board()))
    }

    pub fn make_move(
        &mut self,
        from_row: usize,
        from_col: usize,
        to_row: usize,
        to_col: usize,
        promotion: Option<String>,
    ) -> JsValue {
        if from_row > 7 || from_col > 7 || to_row > 7 || to_col > 7 {
            return to_js(&MoveResult {
                board_state: None,
                error: Some("Square off the board".to_string()),
            });
        }
        let mv = Move {
            from: (from_row, from_col),
            to: (to_row, to_col),
            promotion: promotion.as_deref().and_then(string_to_piece_type),
        };
        match self.session.make_move(&mv) {
            Ok(()) => to_js(&build_board_state(self.session.board())),
            Err(e) => to_js(&MoveResult {
                board_state: None,
                error: Some(e.to_string()),
            }),
        }
    }

    /// Search in the page's thread and play the reply.
    pub fn make_ai_move(&mut self) -> JsValue {
        if let Err(e) = self.session.play_ai_turn() {
            return to_js(&MoveResult {
                board_state: Some(build_board_state(self.session.board())),
                error: Some(e.to_string()),
            });
        }
        to_js(&build_board_state(self.session.board()))
    }

    pub fn get_hint(&self, depth: u32) -> JsValue {
        let Some(mv) = self.session.hint(depth) else {
            return JsValue::NULL;
        };
        let san = self
            .session
            .board()
            .legal_moves_verbose()
            .into_iter()
            .find(|vm| vm.mv == mv)
            .map(|vm| vm.san)
            .unwrap_or_else(|| mv.to_uci());
        to_js(&move_json(&mv, san))
    }

    pub fn get_legal_moves_for_square(&self, row: usize, col: usize) -> JsValue {
        let square_moves: Vec<SquareMoveJson> = self
            .session
            .board()
            .legal_moves()
            .iter()
            .filter(|m| m.from == (row, col))
            .map(|m| SquareMoveJson {
                to: [m.to.0, m.to.1],
                promotion: m.promotion.map(piece_type_to_string),
            })
            .collect();
        to_js(&square_moves)
    }

    /// Static evaluation in centipawns, White's perspective.
    pub fn get_evaluation(&self) -> f64 {
        self.session.evaluation() as f64
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}
