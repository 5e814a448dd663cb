//! FEN (Forsyth-Edwards Notation) as received from the server.
//!
//! Situations carry the board either as a full FEN or as the bare piece
//! placement, and variants extend it (crazyhouse pockets `[Qn]`, promoted
//! markers `~`, three-check counters `3+3`). [`Fen`] accepts all of these,
//! validates the piece placement, and keeps the original text.

use crate::Color;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing FEN strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FenError {
    #[error("invalid FEN: expected 1 to 7 parts, got {0}")]
    InvalidPartCount(usize),

    #[error("invalid piece placement: {0}")]
    InvalidPiecePlacement(String),

    #[error("invalid active color: expected 'w' or 'b', got '{0}'")]
    InvalidActiveColor(String),
}

/// A validated FEN string.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fen(String);

impl Fen {
    /// The standard starting position FEN.
    pub const STARTPOS: &'static str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// Parses and validates a FEN string.
    pub fn parse(fen: &str) -> Result<Self, FenError> {
        let parts: Vec<&str> = fen.split_whitespace().collect();
        if parts.is_empty() || parts.len() > 7 {
            return Err(FenError::InvalidPartCount(parts.len()));
        }

        validate_piece_placement(parts[0])?;

        if let Some(color) = parts.get(1) {
            if *color != "w" && *color != "b" {
                return Err(FenError::InvalidActiveColor(color.to_string()));
            }
        }

        Ok(Fen(parts.join(" ")))
    }

    /// The piece placement field, without any crazyhouse pocket.
    pub fn board(&self) -> &str {
        let placement = self.0.split(' ').next().unwrap_or_default();
        match placement.find('[') {
            Some(pocket) => &placement[..pocket],
            None => placement,
        }
    }

    /// The active color, when the FEN carries one.
    pub fn side_to_move(&self) -> Option<Color> {
        self.0
            .split(' ')
            .nth(1)
            .and_then(|c| c.chars().next())
            .and_then(Color::from_fen_char)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_piece_placement(placement: &str) -> Result<(), FenError> {
    let (board, pocket) = match placement.find('[') {
        Some(i) => (&placement[..i], Some(&placement[i..])),
        None => (placement, None),
    };

    if let Some(pocket) = pocket {
        let valid = pocket.ends_with(']')
            && pocket[1..pocket.len() - 1]
                .chars()
                .all(|c| "pnbrqPNBRQ".contains(c));
        if !valid {
            return Err(FenError::InvalidPiecePlacement(format!(
                "invalid pocket '{}'",
                pocket
            )));
        }
    }

    let ranks: Vec<&str> = board.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::InvalidPiecePlacement(format!(
            "expected 8 ranks, got {}",
            ranks.len()
        )));
    }

    for (i, rank) in ranks.iter().enumerate() {
        let mut squares = 0;
        for c in rank.chars() {
            if let Some(empty) = c.to_digit(10) {
                squares += empty;
            } else if "pnbrqkPNBRQK".contains(c) {
                squares += 1;
            } else if c != '~' {
                return Err(FenError::InvalidPiecePlacement(format!(
                    "invalid character '{}' in rank {}",
                    c,
                    8 - i
                )));
            }
        }
        if squares != 8 {
            return Err(FenError::InvalidPiecePlacement(format!(
                "rank {} has {} squares, expected 8",
                8 - i,
                squares
            )));
        }
    }

    Ok(())
}

impl Default for Fen {
    fn default() -> Self {
        Fen(Self::STARTPOS.to_string())
    }
}

impl FromStr for Fen {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fen::parse(s)
    }
}

impl fmt::Debug for Fen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fen({})", self.0)
    }
}

impl fmt::Display for Fen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Fen {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Fen {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Fen::parse(&s).map_err(de::Error::custom)
    }
}
