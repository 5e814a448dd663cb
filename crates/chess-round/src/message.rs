//! Inbound socket frames.
//!
//! Every frame is `{"t": type, "d": payload}`; heartbeat replies also carry
//! a top-level `r`.

use chess_core::Color;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::clock::ClockTimes;
use crate::game::{GameData, GameStatus};
use crate::situation::GameSituation;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame {0:?} has no payload")]
    MissingPayload(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub t: String,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
}

/// A situation pushed after each ply, optionally with fresh clock times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationDelta {
    #[serde(flatten)]
    pub situation: GameSituation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockTimes>,
}

/// Heartbeat reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongMessage {
    pub server_time: Option<DateTime<Utc>>,
    /// Round trip measured for this heartbeat.
    pub round_trip: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndData {
    pub status: GameStatus,
    #[serde(default)]
    pub winner: Option<Color>,
}

/// Which players are connected to the game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crowd {
    #[serde(default)]
    pub white: bool,
    #[serde(default)]
    pub black: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakebackOffers {
    #[serde(default)]
    pub white: bool,
    #[serde(default)]
    pub black: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Full(Box<GameData>),
    Move(Box<SituationDelta>),
    Clock(ClockTimes),
    Pong(PongMessage),
    EndData(EndData),
    /// The opponent left, or came back.
    Gone(bool),
    Crowd(Crowd),
    /// Color currently offering a draw.
    DrawOffer(Option<Color>),
    TakebackOffers(TakebackOffers),
    Resync,
    Unparsed { t: String, d: Value },
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let frame: Frame = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: Frame) -> Result<Self, MessageError> {
        let Frame { t, d, r } = frame;
        let message = match t.as_str() {
            "full" => ServerMessage::Full(Box::new(payload(&t, d)?)),
            "move" => ServerMessage::Move(Box::new(payload(&t, d)?)),
            "clock" => ServerMessage::Clock(payload(&t, d)?),
            "n" => ServerMessage::Pong(PongMessage {
                server_time: d
                    .as_i64()
                    .and_then(DateTime::<Utc>::from_timestamp_millis),
                round_trip: r
                    .filter(|ms| ms.is_finite() && *ms >= 0.0)
                    .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok()),
            }),
            "endData" => ServerMessage::EndData(payload(&t, d)?),
            "gone" => ServerMessage::Gone(payload(&t, d)?),
            "crowd" => ServerMessage::Crowd(payload(&t, d)?),
            "drawOffer" => ServerMessage::DrawOffer(serde_json::from_value(d)?),
            "takebackOffers" => ServerMessage::TakebackOffers(if d.is_null() {
                TakebackOffers::default()
            } else {
                serde_json::from_value(d)?
            }),
            "resync" => ServerMessage::Resync,
            _ => ServerMessage::Unparsed { t, d },
        };
        Ok(message)
    }
}

fn payload<T: serde::de::DeserializeOwned>(t: &str, d: Value) -> Result<T, MessageError> {
    if d.is_null() {
        return Err(MessageError::MissingPayload(t.to_string()));
    }
    Ok(serde_json::from_value(d)?)
}
