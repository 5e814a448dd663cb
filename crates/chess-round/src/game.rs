//! Game metadata exchanged with the server.
//!
//! These mirror the server's JSON shapes. Fields the server leaves
//! free-form are modeled as tagged variants with an explicit fallback
//! ([`GameStatus::Unknown`], [`Perf::Unparsed`]), and the optional
//! `clock`/`correspondence` and `tv`/`userTV` pairs are folded into
//! [`GameMode`] and [`Watching`] so that only one of each can be present.

use chess_core::{Color, Fen, Square, UciMove};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::clock::{Clock, CorrespondenceClock};
use crate::situation::{Dests, GameSituation};

/// Game status as an `{id, name}` pair.
///
/// Statuses progress from `created`/`started` toward a terminal value.
/// Every id from 25 (`aborted`) upward is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StatusWire", into = "StatusWire")]
pub enum GameStatus {
    Created,
    Started,
    Aborted,
    Mate,
    Resign,
    Stalemate,
    Timeout,
    Draw,
    OutOfTime,
    Cheat,
    NoStart,
    UnknownFinish,
    VariantEnd,
    Unknown { id: u16, name: String },
}

const KNOWN_STATUSES: [(GameStatus, u16, &str); 13] = [
    (GameStatus::Created, 10, "created"),
    (GameStatus::Started, 20, "started"),
    (GameStatus::Aborted, 25, "aborted"),
    (GameStatus::Mate, 30, "mate"),
    (GameStatus::Resign, 31, "resign"),
    (GameStatus::Stalemate, 32, "stalemate"),
    (GameStatus::Timeout, 33, "timeout"),
    (GameStatus::Draw, 34, "draw"),
    (GameStatus::OutOfTime, 35, "outoftime"),
    (GameStatus::Cheat, 36, "cheat"),
    (GameStatus::NoStart, 37, "noStart"),
    (GameStatus::UnknownFinish, 38, "unknownFinish"),
    (GameStatus::VariantEnd, 60, "variantEnd"),
];

impl GameStatus {
    pub fn id(&self) -> u16 {
        match self {
            GameStatus::Unknown { id, .. } => *id,
            known => KNOWN_STATUSES
                .iter()
                .find(|(status, _, _)| status == known)
                .map(|(_, id, _)| *id)
                .unwrap_or_default(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GameStatus::Unknown { name, .. } => name,
            known => KNOWN_STATUSES
                .iter()
                .find(|(status, _, _)| status == known)
                .map(|(_, _, name)| *name)
                .unwrap_or_default(),
        }
    }

    /// Returns true once the game can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.id() >= 25
    }
}

#[derive(Serialize, Deserialize)]
struct StatusWire {
    id: u16,
    name: String,
}

impl From<StatusWire> for GameStatus {
    fn from(wire: StatusWire) -> Self {
        KNOWN_STATUSES
            .iter()
            .find(|(_, id, _)| *id == wire.id)
            .map(|(status, _, _)| status.clone())
            .unwrap_or(GameStatus::Unknown {
                id: wire.id,
                name: wire.name,
            })
    }
}

impl From<GameStatus> for StatusWire {
    fn from(status: GameStatus) -> Self {
        StatusWire {
            id: status.id(),
            name: status.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub key: String,
    pub name: String,
    pub short: String,
    pub title: String,
}

/// Identity, immutable descriptors, and the server-confirmed summary of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub variant: Variant,
    pub initial_fen: Fen,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
    /// The color this client plays.
    pub player: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_turn: Option<u32>,

    pub fen: Fen,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub last_move: Option<UciMove>,
    pub turns: u32,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Color>,
}

// The server sends `"lastMove": ""` before the first move.
fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<UciMove>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(uci) => uci.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayTime {
    pub total: u64,
    pub tv: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatedPerf {
    pub games: u32,
    pub rating: u32,
    pub rd: u32,
    pub prog: i32,
    #[serde(default)]
    pub prov: bool,
}

/// One entry of a user's perf map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Perf {
    Rated(RatedPerf),
    Unparsed(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default)]
    pub booster: bool,
    #[serde(default)]
    pub engine: bool,
    #[serde(default)]
    pub patron: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub seen_at: DateTime<Utc>,
    #[serde(default)]
    pub perfs: BTreeMap<String, Perf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_time: Option<PlayTime>,
}

/// One side of the board as seen by this client.
///
/// The `on_game`, `is_gone`, `offering_draw` and `proposing_takeback` flags
/// are the only fields changed after the snapshot, and only by server pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(default)]
    pub id: String,
    pub color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u32>,
    #[serde(default)]
    pub provisional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_name: Option<String>,
    #[serde(default)]
    pub on_game: bool,
    #[serde(default)]
    pub is_gone: bool,
    #[serde(default)]
    pub offering_draw: bool,
    #[serde(default)]
    pub proposing_takeback: bool,
    #[serde(default)]
    pub spectator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: String,
    pub berserkable: bool,
}

/// Which clock, if any, governs the game.
#[derive(Debug, Clone, PartialEq)]
pub enum GameMode {
    Live(Clock),
    Correspondence(CorrespondenceClock),
    Unlimited,
}

/// How this client is attached to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watching {
    Player,
    Tv(String),
    UserTv(String),
}

#[derive(Debug, Error)]
pub enum GameDataError {
    #[error("game data carries both a live and a correspondence clock")]
    ConflictingClocks,
    #[error("game data carries both tv and userTV channels")]
    ConflictingTv,
    #[error("invalid possibleMoves: {0}")]
    PossibleMoves(String),
}

/// A full game snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GameDataWire", into = "GameDataWire")]
pub struct GameData {
    pub game: Game,
    pub player: Player,
    pub opponent: Player,
    pub mode: GameMode,
    pub steps: Vec<GameSituation>,
    pub tournament: Option<Tournament>,
    pub takebackable: bool,
    pub note: Option<String>,
    pub chat: Vec<String>,
    pub possible_moves: Option<Dests>,
    pub watching: Watching,
}

impl GameData {
    /// Mutable access to whichever side has `color`.
    pub fn player_mut(&mut self, color: Color) -> &mut Player {
        if self.player.color == color {
            &mut self.player
        } else {
            &mut self.opponent
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameDataWire {
    game: Game,
    player: Player,
    opponent: Player,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clock: Option<Clock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correspondence: Option<CorrespondenceClock>,
    #[serde(default)]
    steps: Vec<GameSituation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tournament: Option<Tournament>,
    #[serde(default)]
    takebackable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(default)]
    chat: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    possible_moves: Option<BTreeMap<Square, String>>,
    #[serde(default, rename = "userTV", skip_serializing_if = "Option::is_none")]
    user_tv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tv: Option<String>,
}

impl TryFrom<GameDataWire> for GameData {
    type Error = GameDataError;

    fn try_from(wire: GameDataWire) -> Result<Self, Self::Error> {
        let mode = match (wire.clock, wire.correspondence) {
            (Some(_), Some(_)) => return Err(GameDataError::ConflictingClocks),
            (Some(clock), None) => GameMode::Live(clock),
            (None, Some(corres)) => GameMode::Correspondence(corres),
            (None, None) => GameMode::Unlimited,
        };
        let watching = match (wire.tv, wire.user_tv) {
            (Some(_), Some(_)) => return Err(GameDataError::ConflictingTv),
            (Some(channel), None) => Watching::Tv(channel),
            (None, Some(user)) => Watching::UserTv(user),
            (None, None) => Watching::Player,
        };
        let possible_moves = wire
            .possible_moves
            .map(|compact| Dests::from_compact(&compact))
            .transpose()
            .map_err(|e| GameDataError::PossibleMoves(e.to_string()))?;

        Ok(GameData {
            game: wire.game,
            player: wire.player,
            opponent: wire.opponent,
            mode,
            steps: wire.steps,
            tournament: wire.tournament,
            takebackable: wire.takebackable,
            note: wire.note,
            chat: wire.chat,
            possible_moves,
            watching,
        })
    }
}

impl From<GameData> for GameDataWire {
    fn from(data: GameData) -> Self {
        let (clock, correspondence) = match data.mode {
            GameMode::Live(clock) => (Some(clock), None),
            GameMode::Correspondence(corres) => (None, Some(corres)),
            GameMode::Unlimited => (None, None),
        };
        let (tv, user_tv) = match data.watching {
            Watching::Player => (None, None),
            Watching::Tv(channel) => (Some(channel), None),
            Watching::UserTv(user) => (None, Some(user)),
        };
        GameDataWire {
            game: data.game,
            player: data.player,
            opponent: data.opponent,
            clock,
            correspondence,
            steps: data.steps,
            tournament: data.tournament,
            takebackable: data.takebackable,
            note: data.note,
            chat: data.chat,
            possible_moves: data.possible_moves.map(|dests| dests.to_compact()),
            user_tv,
            tv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const GAME_JSON: &str = r#"{
        "id": "abcd1234",
        "variant": {"key": "standard", "name": "Standard", "short": "Std", "title": "Standard rules"},
        "initialFen": "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "fen": "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "source": "lobby",
        "speed": "blitz",
        "createdAt": 1700000000000,
        "player": "white",
        "lastMove": "",
        "turns": 0,
        "status": {"id": 20, "name": "started"}
    }"#;

    fn data_json(extra: &str) -> String {
        format!(
            r#"{{"game": {}, "player": {{"id": "me", "color": "white"}},
                "opponent": {{"id": "them", "color": "black"}}{}}}"#,
            GAME_JSON, extra
        )
    }

    #[test]
    fn status_known_and_unknown() {
        let mate: GameStatus = serde_json::from_str(r#"{"id":30,"name":"mate"}"#).unwrap();
        assert_eq!(mate, GameStatus::Mate);
        assert!(mate.is_terminal());

        let started: GameStatus = serde_json::from_str(r#"{"id":20,"name":"started"}"#).unwrap();
        assert!(!started.is_terminal());

        let odd: GameStatus = serde_json::from_str(r#"{"id":70,"name":"future"}"#).unwrap();
        assert_eq!(
            odd,
            GameStatus::Unknown {
                id: 70,
                name: "future".to_string()
            }
        );
        assert!(odd.is_terminal());
        assert_eq!(
            serde_json::to_string(&GameStatus::OutOfTime).unwrap(),
            r#"{"id":35,"name":"outoftime"}"#
        );
    }

    #[test]
    fn game_parses_empty_last_move() {
        let game: Game = serde_json::from_str(GAME_JSON).unwrap();
        assert_eq!(game.last_move, None);
        assert_eq!(game.player, Color::White);
        assert_eq!(
            game.created_at.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn live_mode_from_clock_field() {
        let json = data_json(
            r#", "clock": {"white": 180, "black": 179.5, "emerg": 30, "running": true,
                          "initial": 180, "increment": 2}"#,
        );
        let data: GameData = serde_json::from_str(&json).unwrap();
        match &data.mode {
            GameMode::Live(clock) => {
                assert_eq!(clock.black, Duration::from_millis(179_500));
                assert!(clock.running);
            }
            other => panic!("expected live mode, got {:?}", other),
        }
        assert_eq!(data.watching, Watching::Player);
    }

    #[test]
    fn unlimited_mode_without_clocks() {
        let data: GameData = serde_json::from_str(&data_json("")).unwrap();
        assert_eq!(data.mode, GameMode::Unlimited);
        assert!(data.steps.is_empty());
    }

    #[test]
    fn both_clocks_is_rejected() {
        let json = data_json(
            r#", "clock": {"white": 1, "black": 1, "emerg": 1, "running": false, "initial": 1, "increment": 0},
                "correspondence": {"white": 1, "black": 1, "emerg": 1, "increment": 0,
                                   "daysPerTurn": 1, "barTime": 0}"#,
        );
        let err = serde_json::from_str::<GameData>(&json).unwrap_err();
        assert!(err.to_string().contains("both a live and a correspondence"));
    }

    #[test]
    fn tv_channel_and_possible_moves() {
        let json = data_json(r#", "tv": "blitz", "possibleMoves": {"e2": "e3e4", "g1": "f3h3"}"#);
        let data: GameData = serde_json::from_str(&json).unwrap();
        assert_eq!(data.watching, Watching::Tv("blitz".to_string()));
        let dests = data.possible_moves.as_ref().expect("possible moves");
        assert!(dests.contains("e2".parse().unwrap(), "e4".parse().unwrap()));

        let back = serde_json::to_value(&data).unwrap();
        assert_eq!(back["possibleMoves"]["g1"], "f3h3");
        assert_eq!(back["tv"], "blitz");
    }

    #[test]
    fn perfs_keep_unknown_shapes() {
        let json = r#"{"id":"u","username":"U","createdAt":1,"seenAt":2,
            "perfs": {"blitz": {"games": 10, "rating": 1500, "rd": 60, "prog": -12},
                      "puzzle": {"runs": 3}}}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert!(matches!(user.perfs["blitz"], Perf::Rated(RatedPerf { rating: 1500, .. })));
        assert!(matches!(user.perfs["puzzle"], Perf::Unparsed(_)));
    }
}
