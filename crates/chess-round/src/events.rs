//! Notifications sent from a session to its observers.

use chess_core::Color;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::clock::{ClockEvent, ClockTimes};
use crate::game::{Game, GameStatus};
use crate::situation::GameSituation;

/// What a UI needs to redraw the round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub game: Game,
    pub situation: Option<GameSituation>,
    /// Remaining times, absent for unlimited games.
    pub clock: Option<ClockTimes>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    Changed(Box<RoundView>),
    Emergency { color: Color },
    Flagged { color: Color },
    Finished {
        status: GameStatus,
        winner: Option<Color>,
    },
    ResyncRequested,
}

impl From<ClockEvent> for RoundEvent {
    fn from(event: ClockEvent) -> Self {
        match event {
            ClockEvent::Emergency(color) => RoundEvent::Emergency { color },
            ClockEvent::Flagged(color) => RoundEvent::Flagged { color },
        }
    }
}

/// Receives round events. Injected into a session at construction.
pub trait RoundObserver {
    fn notify(&mut self, event: RoundEvent);
}

impl RoundObserver for Vec<RoundEvent> {
    fn notify(&mut self, event: RoundEvent) {
        self.push(event);
    }
}

impl RoundObserver for UnboundedSender<RoundEvent> {
    fn notify(&mut self, event: RoundEvent) {
        if self.send(event).is_err() {
            debug!("round observer channel closed");
        }
    }
}

impl<O: RoundObserver + ?Sized> RoundObserver for Box<O> {
    fn notify(&mut self, event: RoundEvent) {
        (**self).notify(event);
    }
}

impl<O: RoundObserver + ?Sized> RoundObserver for &mut O {
    fn notify(&mut self, event: RoundEvent) {
        (**self).notify(event);
    }
}
