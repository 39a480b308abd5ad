//! A game between a human and the AI.
//!
//! [`Session`] owns the authoritative [`Board`]. Human moves are applied
//! directly; AI moves go through the dispatch [`Coordinator`] and land on the
//! board only once their request resolves. At most one AI request is in
//! flight, and the human cannot move while it is.

use tracing::{debug, info};

use crate::board::{Board, GameResult};
use crate::config::{clamp_depth, AiConfig};
use crate::dispatch::{Coordinator, Poll, Resolution};
use crate::engine::{self, Score, Strategy};
use crate::error::{ChessError, Result};
use crate::moves::Move;
use crate::piece::Color;
use crate::rules::Rules;

pub struct Session {
    board: Board,
    config: AiConfig,
    ai_color: Color,
    coordinator: Coordinator,
    last_resolution: Option<Resolution>,
}

impl Session {
    pub fn new(config: AiConfig, ai_color: Color) -> Session {
        Session::with_board(Board::new(), config, ai_color)
    }

    pub fn with_board(board: Board, mut config: AiConfig, ai_color: Color) -> Session {
        config.depth = clamp_depth(config.depth);
        let coordinator = Coordinator::new(config.timeout());
        Session {
            board,
            config,
            ai_color,
            coordinator,
            last_resolution: None,
        }
    }

    pub fn from_fen(fen: &str, config: AiConfig, ai_color: Color) -> Result<Session> {
        Ok(Session::with_board(Board::from_fen(fen)?, config, ai_color))
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn ai_color(&self) -> Color {
        self.ai_color
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.config.strategy = strategy;
    }

    /// Clamped to `1..=MAX_DEPTH`.
    pub fn set_depth(&mut self, depth: u32) {
        self.config.depth = clamp_depth(depth);
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.config.timeout_ms = timeout_ms;
        self.coordinator.set_timeout(self.config.timeout());
    }

    pub fn result(&self) -> Option<GameResult> {
        self.board.result()
    }

    pub fn is_ai_turn(&self) -> bool {
        self.board.current_turn == self.ai_color
    }

    pub fn is_ai_thinking(&self) -> bool {
        self.coordinator.outstanding().is_some()
    }

    /// The most recent settled AI request.
    pub fn last_resolution(&self) -> Option<Resolution> {
        self.last_resolution
    }

    /// Static evaluation of the current position, White's perspective.
    pub fn evaluation(&self) -> Score {
        engine::evaluate(&self.board)
    }

    /// Play a move for the side to move.
    pub fn make_move(&mut self, mv: &Move) -> Result<()> {
        if self.board.result().is_some() {
            return Err(ChessError::GameOver);
        }
        if self.is_ai_thinking() {
            return Err(ChessError::AiThinking);
        }
        if !self.board.apply_move(mv) {
            return Err(ChessError::IllegalMove(mv.to_uci()));
        }
        debug!(mv = %mv, "human move applied");
        Ok(())
    }

    /// Start an AI search for the current position. Returns the request id.
    pub fn request_ai_move(&mut self) -> Result<u64> {
        if self.is_ai_thinking() {
            return Err(ChessError::AiThinking);
        }
        if self.board.result().is_some() {
            return Err(ChessError::GameOver);
        }
        if !self.is_ai_turn() {
            return Err(ChessError::NotAiTurn);
        }
        let id = self.coordinator.request(
            &self.board,
            self.config.strategy,
            self.config.depth,
            self.ai_color,
        );
        info!(id, strategy = %self.config.strategy, depth = self.config.depth, "AI thinking");
        Ok(id)
    }

    pub fn poll_ai(&mut self) -> Poll {
        let poll = self.coordinator.poll(&mut self.board);
        if let Poll::Ready(resolution) = poll {
            self.last_resolution = Some(resolution);
        }
        poll
    }

    pub fn wait_ai(&mut self) -> Option<Resolution> {
        let resolution = self.coordinator.wait(&mut self.board);
        if resolution.is_some() {
            self.last_resolution = resolution;
        }
        resolution
    }

    /// Request an AI move and block until it is on the board.
    pub fn play_ai_turn(&mut self) -> Result<Option<Move>> {
        self.request_ai_move()?;
        Ok(self.wait_ai().and_then(|r| r.mv))
    }

    /// Suggest a move for the side to move. Searches a copy of the board.
    pub fn hint(&self, depth: u32) -> Option<Move> {
        let mut snapshot = self.board.clone();
        let side = snapshot.side_to_move();
        engine::minimax_move(&mut snapshot, clamp_depth(depth), side).map(|r| r.mv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::DrawReason;
    use crate::config::MAX_DEPTH;
    use crate::dispatch::Source;

    fn greedy() -> AiConfig {
        AiConfig {
            strategy: Strategy::Greedy,
            depth: 1,
            timeout_ms: 60_000,
        }
    }

    fn e4() -> Move {
        Move::new((1, 4), (3, 4))
    }

    #[test]
    fn ai_answers_a_human_move() {
        let mut session = Session::new(greedy(), Color::Black);
        assert!(!session.is_ai_turn());
        session.make_move(&e4()).unwrap();
        assert!(session.is_ai_turn());

        let mv = session.play_ai_turn().unwrap().expect("black has replies");
        assert_eq!(session.board().current_turn, Color::White);
        assert_eq!(session.board().last_move, Some((mv.from, mv.to)));
        assert_eq!(session.last_resolution().map(|r| r.source), Some(Source::Background));
    }

    #[test]
    fn single_flight_blocks_both_sides() {
        let mut session = Session::new(greedy(), Color::Black);
        session.make_move(&e4()).unwrap();

        session.request_ai_move().unwrap();
        assert!(session.is_ai_thinking());
        assert!(matches!(session.request_ai_move(), Err(ChessError::AiThinking)));
        assert!(matches!(
            session.make_move(&Move::new((6, 4), (4, 4))),
            Err(ChessError::AiThinking)
        ));

        assert!(session.wait_ai().is_some());
        assert!(!session.is_ai_thinking());
        assert_eq!(session.wait_ai(), None);
        assert!(!session.is_ai_turn());
    }

    #[test]
    fn refuses_to_move_on_the_humans_turn() {
        let mut session = Session::new(greedy(), Color::Black);
        assert!(matches!(session.request_ai_move(), Err(ChessError::NotAiTurn)));
        assert!(!session.is_ai_thinking());
    }

    #[test]
    fn finished_game_rejects_everything() {
        let mut session =
            Session::from_fen("R6k/6pp/8/8/8/8/8/K7 b - - 0 1", greedy(), Color::Black).unwrap();
        assert_eq!(session.result(), Some(GameResult::WhiteWins));
        assert!(matches!(session.request_ai_move(), Err(ChessError::GameOver)));
        assert!(matches!(
            session.make_move(&Move::new((6, 7), (5, 7))),
            Err(ChessError::GameOver)
        ));
        assert_eq!(session.hint(2), None);
    }

    #[test]
    fn drawn_game_is_over() {
        let session =
            Session::from_fen("4k3/8/8/8/8/8/8/2B1K3 w - - 0 1", greedy(), Color::White).unwrap();
        assert_eq!(
            session.result(),
            Some(GameResult::Draw(DrawReason::InsufficientMaterial))
        );
    }

    #[test]
    fn illegal_human_move_is_reported_in_uci() {
        let mut session = Session::new(greedy(), Color::Black);
        let err = session.make_move(&Move::new((1, 4), (4, 4))).unwrap_err();
        match err {
            ChessError::IllegalMove(text) => assert_eq!(text, "e2e5"),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(session.board().to_fen(), crate::fen::START_FEN);
    }

    #[test]
    fn off_board_human_move_is_illegal() {
        let mut session = Session::new(greedy(), Color::Black);
        let err = session.make_move(&Move::new((0, 4), (0, 8))).unwrap_err();
        assert!(matches!(err, ChessError::IllegalMove(ref text) if text == "e1(0,8)"));
        assert!(matches!(
            session.make_move(&Move::new((9, 9), (1, 4))),
            Err(ChessError::IllegalMove(_))
        ));
        assert_eq!(session.board().to_fen(), crate::fen::START_FEN);
    }

    #[test]
    fn depth_is_clamped() {
        let mut session = Session::new(AiConfig { depth: 10, ..greedy() }, Color::White);
        assert_eq!(session.config().depth, MAX_DEPTH);
        session.set_depth(0);
        assert_eq!(session.config().depth, 1);
        session.set_depth(2);
        assert_eq!(session.config().depth, 2);
    }

    #[test]
    fn hint_finds_mate_without_touching_the_board() {
        let fen = "6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 0 1";
        let session = Session::from_fen(fen, greedy(), Color::Black).unwrap();
        assert_eq!(session.hint(2), Some(Move::new((0, 3), (7, 3))));
        assert_eq!(session.board().to_fen(), fen);
    }

    #[test]
    fn minimax_session_delivers_mate() {
        let config = AiConfig {
            strategy: Strategy::Minimax,
            depth: 2,
            timeout_ms: 60_000,
        };
        let mut session =
            Session::from_fen("6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 0 1", config, Color::White).unwrap();
        assert_eq!(session.play_ai_turn().unwrap(), Some(Move::new((0, 3), (7, 3))));
        assert_eq!(session.result(), Some(GameResult::WhiteWins));
    }

    #[test]
    fn strategy_switch_applies_to_next_request() {
        let mut session = Session::new(greedy(), Color::White);
        session.set_strategy(Strategy::Random);
        assert_eq!(session.config().strategy, Strategy::Random);
        assert!(session.play_ai_turn().unwrap().is_some());
        assert_eq!(session.board().current_turn, Color::Black);
    }

    #[test]
    fn poll_eventually_resolves() {
        let mut session = Session::new(greedy(), Color::White);
        let id = session.request_ai_move().unwrap();
        let resolution = loop {
            match session.poll_ai() {
                Poll::Ready(r) => break r,
                Poll::Pending => std::thread::sleep(std::time::Duration::from_millis(1)),
                Poll::Idle => panic!("request vanished"),
            }
        };
        assert_eq!(resolution.id, id);
        assert_eq!(session.poll_ai(), Poll::Idle);
    }

    #[test]
    fn evaluation_tracks_the_board() {
        let mut session = Session::new(greedy(), Color::Black);
        assert_eq!(session.evaluation(), 20);
        session.make_move(&e4()).unwrap();
        assert_eq!(session.evaluation(), -20);
    }
}
