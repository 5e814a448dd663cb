//! Per-ply game situations and destination maps.

use chess_core::{Color, Fen, Square, SquareError, UciMove};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::game::GameStatus;

/// Legal destinations by origin square, as computed by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dests(BTreeMap<Square, Vec<Square>>);

impl Dests {
    pub fn new(map: BTreeMap<Square, Vec<Square>>) -> Self {
        Dests(map)
    }

    /// Decodes the compact `possibleMoves` form, where each value is a run
    /// of concatenated square keys (`{"e2": "e3e4"}`).
    pub fn from_compact(compact: &BTreeMap<Square, String>) -> Result<Self, SquareError> {
        let mut map = BTreeMap::new();
        for (from, run) in compact {
            if run.len() % 2 != 0 || !run.is_ascii() {
                return Err(SquareError(run.clone()));
            }
            let targets = (0..run.len())
                .step_by(2)
                .map(|i| {
                    let key = &run[i..i + 2];
                    Square::from_algebraic(key).ok_or_else(|| SquareError(key.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            map.insert(*from, targets);
        }
        Ok(Dests(map))
    }

    pub fn to_compact(&self) -> BTreeMap<Square, String> {
        self.0
            .iter()
            .map(|(from, targets)| (*from, targets.iter().map(Square::to_string).collect()))
            .collect()
    }

    pub fn contains(&self, from: Square, to: Square) -> bool {
        self.0.get(&from).is_some_and(|targets| targets.contains(&to))
    }

    pub fn destinations(&self, from: Square) -> &[Square] {
        self.0.get(&from).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCount {
    pub white: u8,
    pub black: u8,
}

/// The board and legality snapshot after one ply.
///
/// Situations are immutable once appended to a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSituation {
    pub ply: u32,
    pub variant: String,
    pub fen: Fen,
    /// Side to move.
    pub player: Color,
    #[serde(default)]
    pub dests: Dests,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drops: Option<Vec<Square>>,
    #[serde(default)]
    pub end: bool,
    #[serde(default)]
    pub playable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Color>,
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub check_count: CheckCount,
    #[serde(default)]
    pub pgn_moves: Vec<String>,
    #[serde(default)]
    pub uci_moves: Vec<UciMove>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crazyhouse: Option<String>,
}

impl GameSituation {
    /// The move that produced this situation, if any.
    pub fn last_move(&self) -> Option<UciMove> {
        self.uci_moves.last().copied()
    }

    /// Whether the server lists `mv` as legal here.
    pub fn allows(&self, mv: UciMove) -> bool {
        match mv {
            UciMove::Normal { from, to, .. } => self.dests.contains(from, to),
            UciMove::Drop { to, .. } => self
                .drops
                .as_ref()
                .is_some_and(|targets| targets.contains(&to)),
        }
    }
}
