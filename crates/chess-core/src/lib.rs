//! Core chess vocabulary shared by the round engine.
//!
//! This crate provides the wire-level types exchanged with the game server:
//! - [`Color`] for the two sides
//! - [`Square`], [`File`], and [`Rank`] for board coordinates
//! - [`Role`] for promotions and crazyhouse drops
//! - [`UciMove`] for coordinate move notation
//! - [`Fen`] for validated FEN text
//!
//! No chess rules live here: legality is decided by the server.

mod color;
mod fen;
mod mov;
mod piece;
mod square;

pub use color::Color;
pub use fen::{Fen, FenError};
pub use mov::{UciMove, UciMoveError};
pub use piece::Role;
pub use square::{File, Rank, Square, SquareError};
