pub mod board;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fen;
pub mod moves;
mod notation;
pub mod piece;
pub mod rules;
pub mod session;

#[cfg(target_arch = "wasm32")]
mod wasm_api;
