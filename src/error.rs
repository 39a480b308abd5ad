//! Error types for the chess crate
//!
//! Covers position parsing, controller-level move rejections and
//! configuration loading. Failures of the background search worker are not
//! errors here: the dispatch coordinator recovers from them locally.

use thiserror::Error;

/// Errors surfaced to callers of the board, session and config APIs
#[derive(Error, Debug)]
pub enum ChessError {
    /// A FEN snapshot could not be parsed
    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    /// A submitted move is not legal in the current position
    #[error("Illegal move: {0}")]
    IllegalMove(String),

    /// The game has already ended
    #[error("Game is already over")]
    GameOver,

    /// A move request is already outstanding
    #[error("AI is thinking")]
    AiThinking,

    /// The AI was asked to move on the human's turn
    #[error("It is not the AI's turn")]
    NotAiTurn,

    /// Configuration file did not parse
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for chess operations
pub type Result<T> = std::result::Result<T, ChessError>;

impl ChessError {
    pub(crate) fn invalid_fen(fen: &str, reason: impl Into<String>) -> Self {
        ChessError::InvalidFen {
            fen: fen.to_string(),
            reason: reason.into(),
        }
    }
}
