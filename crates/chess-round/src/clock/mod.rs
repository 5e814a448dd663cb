//! Game clocks: wire shapes, the live sync engine, and the correspondence model.
//!
//! The server sends clock values in (fractional) seconds; internally every
//! span is a [`Duration`].

mod correspondence;
mod lag;
mod live;

pub use correspondence::CorrespondenceClockModel;
pub use lag::LagTracker;
pub use live::ClockSyncEngine;

use chess_core::Color;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::GameMode;

/// Live clock as sent in a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    #[serde(with = "secs")]
    pub white: Duration,
    #[serde(with = "secs")]
    pub black: Duration,
    /// Remaining time under which the UI warns the player.
    #[serde(with = "secs")]
    pub emerg: Duration,
    pub running: bool,
    #[serde(with = "secs")]
    pub initial: Duration,
    #[serde(with = "secs")]
    pub increment: Duration,
}

impl Clock {
    pub fn remaining(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }
}

/// Correspondence clock as sent in a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrespondenceClock {
    #[serde(with = "secs")]
    pub white: Duration,
    #[serde(with = "secs")]
    pub black: Duration,
    pub days_per_turn: u32,
    /// Grace period after a move before the next mover's time decreases.
    #[serde(with = "secs")]
    pub bar_time: Duration,
    #[serde(with = "secs")]
    pub emerg: Duration,
    #[serde(with = "secs")]
    pub increment: Duration,
}

/// Remaining times carried by move and clock pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTimes {
    #[serde(with = "secs")]
    pub white: Duration,
    #[serde(with = "secs")]
    pub black: Duration,
}

impl ClockTimes {
    pub fn get(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }
}

/// Notifications raised by clock decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "color", rename_all = "snake_case")]
pub enum ClockEvent {
    /// Remaining time crossed below the emergency threshold.
    Emergency(Color),
    /// Remaining time reached zero while running.
    Flagged(Color),
}

/// The clock governing one session.
#[derive(Debug, Clone)]
pub enum GameClock {
    Live(ClockSyncEngine),
    Correspondence(CorrespondenceClockModel),
    Unlimited,
}

impl GameClock {
    /// Builds a clock from a full snapshot and reconciles it immediately, so
    /// the running side is compensated for transit delay.
    pub fn from_snapshot(
        mode: &GameMode,
        turn: Color,
        round_trip: Duration,
        now: DateTime<Utc>,
    ) -> (Self, Vec<ClockEvent>) {
        match mode {
            GameMode::Live(clock) => {
                let mut engine = ClockSyncEngine::start(clock);
                let events = engine.reconcile(clock, turn, round_trip);
                (GameClock::Live(engine), events)
            }
            GameMode::Correspondence(corres) => {
                let mut model = CorrespondenceClockModel::start(corres, now);
                let events = model.reconcile(corres, Some(turn), round_trip, now);
                (GameClock::Correspondence(model), events)
            }
            GameMode::Unlimited => (GameClock::Unlimited, Vec::new()),
        }
    }

    /// Advances local decay. Correspondence clocks ignore `elapsed` and
    /// recompute from `now`.
    pub fn tick(&mut self, elapsed: Duration, now: DateTime<Utc>) -> Vec<ClockEvent> {
        match self {
            GameClock::Live(engine) => engine.tick(elapsed),
            GameClock::Correspondence(model) => model.poll(now),
            GameClock::Unlimited => Vec::new(),
        }
    }

    pub fn on_move_applied(&mut self, mover: Color, now: DateTime<Utc>) {
        match self {
            GameClock::Live(engine) => engine.on_move_applied(mover),
            GameClock::Correspondence(model) => model.on_move_applied(mover, now),
            GameClock::Unlimited => {}
        }
    }

    /// Applies the remaining times from a move or clock push.
    pub fn reconcile_times(
        &mut self,
        times: &ClockTimes,
        running: Option<Color>,
        round_trip: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ClockEvent> {
        match self {
            GameClock::Live(engine) => engine.reconcile_times(times, running, round_trip),
            GameClock::Correspondence(model) => {
                model.reconcile_times(times, running, round_trip, now)
            }
            GameClock::Unlimited => Vec::new(),
        }
    }

    /// Stops all decay; used once the game is over.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        match self {
            GameClock::Live(engine) => engine.pause(),
            GameClock::Correspondence(model) => model.pause(now),
            GameClock::Unlimited => {}
        }
    }

    pub fn times(&self, now: DateTime<Utc>) -> Option<ClockTimes> {
        match self {
            GameClock::Live(engine) => Some(ClockTimes {
                white: engine.remaining(Color::White),
                black: engine.remaining(Color::Black),
            }),
            GameClock::Correspondence(model) => Some(ClockTimes {
                white: model.remaining_at(Color::White, now),
                black: model.remaining_at(Color::Black, now),
            }),
            GameClock::Unlimited => None,
        }
    }

    /// Writes the current clock state back into `mode` for persistence.
    pub fn write_back(&self, mode: &mut GameMode, now: DateTime<Utc>) {
        match (self, mode) {
            (GameClock::Live(engine), GameMode::Live(clock)) => *clock = engine.snapshot(),
            (GameClock::Correspondence(model), GameMode::Correspondence(corres)) => {
                *corres = model.snapshot(now)
            }
            _ => {}
        }
    }
}

/// Serde adapter for durations sent as fractional seconds.
///
/// Negative values (an expired clock) are clamped to zero.
pub(crate) mod secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() {
            return Err(de::Error::custom(format!("invalid duration: {}", secs)));
        }
        Duration::try_from_secs_f64(secs.max(0.0)).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(white_ms: u64, black_ms: u64, running: bool) -> Clock {
        Clock {
            white: Duration::from_millis(white_ms),
            black: Duration::from_millis(black_ms),
            emerg: Duration::from_secs(10),
            running,
            initial: Duration::from_secs(60),
            increment: Duration::from_secs(1),
        }
    }

    #[test]
    fn clock_wire_in_seconds() {
        let clock: Clock = serde_json::from_str(
            r#"{"white": 12.5, "black": -0.3, "emerg": 10, "running": true, "initial": 60, "increment": 0}"#,
        )
        .unwrap();
        assert_eq!(clock.white, Duration::from_millis(12_500));
        assert_eq!(clock.black, Duration::ZERO);
        assert_eq!(
            serde_json::to_value(&clock).unwrap()["white"],
            serde_json::json!(12.5)
        );
    }

    #[test]
    fn correspondence_wire_is_camel_case() {
        let corres: CorrespondenceClock = serde_json::from_str(
            r#"{"white": 172800, "black": 86400, "daysPerTurn": 2, "barTime": 3600,
                "emerg": 21600, "increment": 0}"#,
        )
        .unwrap();
        assert_eq!(corres.days_per_turn, 2);
        assert_eq!(corres.bar_time, Duration::from_secs(3600));
    }

    #[test]
    fn clock_event_shape() {
        let json = serde_json::to_string(&ClockEvent::Flagged(Color::Black)).unwrap();
        assert_eq!(json, r#"{"type":"flagged","color":"black"}"#);
    }

    #[test]
    fn live_snapshot_compensates_running_side() {
        let mode = GameMode::Live(live(60_000, 60_000, true));
        let (clock, events) =
            GameClock::from_snapshot(&mode, Color::Black, Duration::from_millis(200), Utc::now());
        assert!(events.is_empty());
        let times = clock.times(Utc::now()).unwrap();
        assert_eq!(times.white, Duration::from_millis(60_000));
        assert_eq!(times.black, Duration::from_millis(59_900));
    }

    #[test]
    fn unlimited_has_no_times() {
        let (mut clock, _) =
            GameClock::from_snapshot(&GameMode::Unlimited, Color::White, Duration::ZERO, Utc::now());
        assert!(clock.tick(Duration::from_secs(1), Utc::now()).is_empty());
        assert_eq!(clock.times(Utc::now()), None);
    }

    #[test]
    fn write_back_persists_live_state() {
        let mut mode = GameMode::Live(live(30_000, 30_000, false));
        let (mut clock, _) = GameClock::from_snapshot(&mode, Color::White, Duration::ZERO, Utc::now());
        clock.on_move_applied(Color::White, Utc::now());
        clock.write_back(&mut mode, Utc::now());
        match mode {
            GameMode::Live(c) => {
                assert_eq!(c.white, Duration::from_millis(31_000));
                assert!(c.running);
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }
}
