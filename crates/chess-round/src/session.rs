//! One player's view of one game.
//!
//! [`GameSessionController`] composes a [`SituationLedger`] and a
//! [`GameClock`], applies server pushes to them, and reports changes to an
//! injected [`RoundObserver`]. Suspended sessions are persisted through an
//! injected [`OfflineGameStore`].
//!
//! ```text
//! Created --full--> Live --suspend--> Suspended --resume--> Live
//!                    |                                       |
//!                    +------ end / terminal status ----------+--> Terminal
//! ```

use chess_core::{Color, UciMove};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{ClockEvent, ClockTimes, GameClock, LagTracker};
use crate::events::{RoundEvent, RoundObserver, RoundView};
use crate::game::{Game, GameData, GameStatus, Watching};
use crate::ledger::{LedgerError, SituationLedger};
use crate::message::{ServerMessage, SituationDelta};
use crate::situation::GameSituation;
use crate::store::{OfflineGameStore, StoreError, StoredOfflineGame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Live,
    Suspended,
    Terminal,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("game {0} is finished")]
    GameFinished(String),
    #[error("server history diverges from stored history at ply {0}")]
    DesyncDetected(u32),
    #[error("session is {0:?}, not live")]
    NotLive(SessionState),
    #[error("session is {0:?}, not suspended")]
    NotSuspended(SessionState),
    #[error("snapshot is for game {actual}, session holds {expected}")]
    GameMismatch { expected: String, actual: String },
    #[error("not this player's move")]
    NotPlayable,
    #[error("illegal move {0}")]
    IllegalMove(UciMove),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a resume reconciled local history with the server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Local history is a prefix of the server's.
    Continued,
    /// Local history was discarded from `ply` onward.
    Diverged { ply: u32 },
}

pub struct GameSessionController<S, O> {
    state: SessionState,
    data: Option<GameData>,
    ledger: SituationLedger,
    clock: GameClock,
    lag: LagTracker,
    awaiting_resync: bool,
    store: S,
    observer: O,
}

impl<S: OfflineGameStore, O: RoundObserver> GameSessionController<S, O> {
    pub fn new(store: S, observer: O) -> Self {
        GameSessionController {
            state: SessionState::Created,
            data: None,
            ledger: SituationLedger::new(),
            clock: GameClock::Unlimited,
            lag: LagTracker::default(),
            awaiting_resync: false,
            store,
            observer,
        }
    }

    pub fn with_lag_samples(mut self, samples: usize) -> Self {
        self.lag = LagTracker::new(samples);
        self
    }

    /// Loads a suspended game from `store`. The session stays suspended
    /// until [`resume`](Self::resume) is given a fresh snapshot.
    pub fn restore(game_id: &str, store: S, observer: O) -> Result<Self, SessionError> {
        let stored = store.load(game_id)?;
        let mut ledger = SituationLedger::replay(stored.situations)?;
        if let Some(next) = stored.ply.checked_add(1) {
            ledger.truncate_from(next);
        }
        info!(game_id, ply = stored.ply, "restored offline game");

        let mut session = Self::new(store, observer);
        session.state = SessionState::Suspended;
        session.data = Some(stored.data);
        session.ledger = ledger;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == SessionState::Live
    }

    pub fn game_id(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.game.id.as_str())
    }

    pub fn game(&self) -> Option<&Game> {
        self.data.as_ref().map(|d| &d.game)
    }

    pub fn data(&self) -> Option<&GameData> {
        self.data.as_ref()
    }

    pub fn ledger(&self) -> &SituationLedger {
        &self.ledger
    }

    pub fn current(&self) -> Option<&GameSituation> {
        self.ledger.current()
    }

    pub fn clock_times(&self, now: DateTime<Utc>) -> Option<ClockTimes> {
        self.clock.times(now)
    }

    /// Round trip currently used for clock compensation.
    pub fn round_trip(&self) -> Duration {
        self.lag.estimate()
    }

    pub fn is_awaiting_resync(&self) -> bool {
        self.awaiting_resync
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn view(&self, now: DateTime<Utc>) -> Option<RoundView> {
        let data = self.data.as_ref()?;
        Some(RoundView {
            game: data.game.clone(),
            situation: self.ledger.current().cloned(),
            clock: self.clock.times(now),
        })
    }

    /// Applies one server push.
    ///
    /// Once the game is over every push is rejected with
    /// [`SessionError::GameFinished`] and has no effect. Otherwise late,
    /// malformed or out-of-order pushes are logged and absorbed.
    pub fn apply_update(&mut self, message: ServerMessage, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.state == SessionState::Terminal {
            return Err(self.finished());
        }

        match message {
            ServerMessage::Full(data) => {
                if self.state == SessionState::Suspended {
                    self.resume(*data, now)?;
                } else if let Err(e) = self.load_snapshot(*data, now) {
                    warn!(error = %e, "rejected full snapshot");
                    self.request_resync();
                }
            }
            ServerMessage::Move(delta) => {
                if let Err(e) = self.apply_delta(*delta, now) {
                    warn!(error = %e, "move out of sequence");
                    self.request_resync();
                }
            }
            ServerMessage::Clock(times) => self.apply_clock(times, now),
            ServerMessage::Pong(pong) => {
                if let Some(round_trip) = pong.round_trip {
                    self.lag.record(round_trip);
                    debug!(
                        round_trip_ms = round_trip.as_millis() as u64,
                        estimate_ms = self.lag.estimate().as_millis() as u64,
                        "lag sample"
                    );
                }
            }
            ServerMessage::EndData(end) => {
                if self.state != SessionState::Live {
                    debug!(state = ?self.state, "end data outside a live session");
                    return Ok(());
                }
                if let Some(data) = self.data.as_mut() {
                    update_status(&mut data.game, end.status);
                    data.game.winner = end.winner.or(data.game.winner);
                }
                self.finish(now);
            }
            ServerMessage::Gone(gone) => self.update_players(now, |data| data.opponent.is_gone = gone),
            ServerMessage::Crowd(crowd) => self.update_players(now, |data| {
                data.player_mut(Color::White).on_game = crowd.white;
                data.player_mut(Color::Black).on_game = crowd.black;
            }),
            ServerMessage::DrawOffer(by) => self.update_players(now, |data| {
                for color in Color::BOTH {
                    data.player_mut(color).offering_draw = by == Some(color);
                }
            }),
            ServerMessage::TakebackOffers(offers) => self.update_players(now, |data| {
                data.player_mut(Color::White).proposing_takeback = offers.white;
                data.player_mut(Color::Black).proposing_takeback = offers.black;
            }),
            ServerMessage::Resync => self.request_resync(),
            ServerMessage::Unparsed { t, .. } => debug!(t = %t, "ignored frame"),
        }
        Ok(())
    }

    /// Advances the local clock. Does nothing unless live.
    pub fn tick(&mut self, elapsed: Duration, now: DateTime<Utc>) {
        if self.state != SessionState::Live {
            return;
        }
        let events = self.clock.tick(elapsed, now);
        self.emit_clock_events(events);
    }

    /// Checks a move by this player against the server's legal moves for
    /// the current position. Nothing is applied locally; the confirmed
    /// situation arrives as a push.
    pub fn attempt_move(&self, mv: UciMove) -> Result<(), SessionError> {
        match self.state {
            SessionState::Terminal => return Err(self.finished()),
            SessionState::Live => {}
            other => return Err(SessionError::NotLive(other)),
        }
        let data = self.data.as_ref().ok_or(SessionError::NotLive(self.state))?;
        if data.watching != Watching::Player || data.player.spectator {
            return Err(SessionError::NotPlayable);
        }

        let allowed = match self.ledger.current() {
            Some(situation) => {
                if !situation.playable || situation.player != data.game.player {
                    return Err(SessionError::NotPlayable);
                }
                situation.allows(mv)
            }
            None => {
                if data.game.fen.side_to_move() != Some(data.game.player) {
                    return Err(SessionError::NotPlayable);
                }
                match (mv, &data.possible_moves) {
                    (UciMove::Normal { from, to, .. }, Some(dests)) => dests.contains(from, to),
                    _ => false,
                }
            }
        };
        if !allowed {
            return Err(SessionError::IllegalMove(mv));
        }
        debug!(game_id = %data.game.id, %mv, "move accepted for sending");
        Ok(())
    }

    /// Stops the clock and persists the session.
    ///
    /// If the store fails the session stays live.
    pub fn suspend(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        match self.state {
            SessionState::Terminal => return Err(self.finished()),
            SessionState::Live => {}
            other => return Err(SessionError::NotLive(other)),
        }
        let Some(data) = self.data.as_mut() else {
            return Err(SessionError::NotLive(self.state));
        };
        self.clock.write_back(&mut data.mode, now);
        let Some(record) = self.record() else {
            return Err(SessionError::NotLive(self.state));
        };
        self.store.save(&record.data.game.id, &record)?;

        self.clock.stop(now);
        self.state = SessionState::Suspended;
        info!(game_id = %record.data.game.id, ply = record.ply, "suspended");
        Ok(())
    }

    /// Brings a suspended session back with a fresh server snapshot.
    ///
    /// The snapshot is validated in full before any local or stored state
    /// changes, so a failed or abandoned resume can be retried from the same
    /// stored record. Where the server's history differs from the local one,
    /// the local history is discarded from the first differing ply. A
    /// snapshot without steps says nothing about history and keeps it.
    pub fn resume(&mut self, snapshot: GameData, now: DateTime<Utc>) -> Result<ResumeOutcome, SessionError> {
        match self.state {
            SessionState::Terminal => return Err(self.finished()),
            SessionState::Suspended => {}
            other => return Err(SessionError::NotSuspended(other)),
        }
        if let Some(expected) = self.game_id() {
            if expected != snapshot.game.id {
                return Err(SessionError::GameMismatch {
                    expected: expected.to_string(),
                    actual: snapshot.game.id.clone(),
                });
            }
        }

        let server = SituationLedger::replay(snapshot.steps.iter().cloned())?;
        let mut merged = self.ledger.clone();
        let divergence = if server.is_empty() {
            debug!(game_id = %snapshot.game.id, "snapshot carries no history, keeping local");
            None
        } else {
            merged.first_divergence(&server)
        };
        let outcome = match divergence {
            None => ResumeOutcome::Continued,
            Some(ply) => {
                warn!(
                    game_id = %snapshot.game.id,
                    error = %SessionError::DesyncDetected(ply),
                    "discarding local history"
                );
                merged.truncate_from(ply);
                ResumeOutcome::Diverged { ply }
            }
        };
        let last = merged.last_ply();
        for situation in server.iter().filter(|s| last.map_or(true, |l| s.ply > l)) {
            if let Err(e) = merged.append(situation.clone()) {
                warn!(error = %e, "server history does not extend local history, adopting it whole");
                merged = server.clone();
                break;
            }
        }

        self.commit_snapshot(snapshot, merged, now);
        info!(game_id = ?self.game_id(), ply = ?self.ledger.last_ply(), ?outcome, "resumed");
        if self.is_live() {
            self.persist();
        }
        Ok(outcome)
    }

    /// Gives up on the game locally and forgets its stored record.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if let Some(id) = self.game_id() {
            self.store.delete(id)?;
            info!(game_id = id, "abandoned");
        }
        self.clock.stop(now);
        self.state = SessionState::Terminal;
        Ok(())
    }

    fn load_snapshot(&mut self, data: GameData, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let ledger = SituationLedger::replay(data.steps.iter().cloned())?;
        info!(game_id = %data.game.id, ply = ?ledger.last_ply(), "loaded snapshot");
        self.commit_snapshot(data, ledger, now);
        Ok(())
    }

    fn commit_snapshot(&mut self, data: GameData, ledger: SituationLedger, now: DateTime<Utc>) {
        let turn = ledger
            .current()
            .map(|s| s.player)
            .or_else(|| data.game.fen.side_to_move())
            .unwrap_or_else(|| Color::from_ply(data.game.turns));
        let (clock, events) = GameClock::from_snapshot(&data.mode, turn, self.lag.estimate(), now);
        let terminal = ledger.is_closed() || data.game.status.is_terminal();

        self.data = Some(data);
        self.ledger = ledger;
        self.clock = clock;
        self.state = SessionState::Live;
        self.awaiting_resync = false;
        self.notify_changed(now);
        self.emit_clock_events(events);
        if terminal {
            self.finish(now);
        }
    }

    /// Appends a pushed situation. An error means local history can no
    /// longer be trusted and a resync is needed.
    fn apply_delta(&mut self, delta: SituationDelta, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.state != SessionState::Live {
            debug!(state = ?self.state, ply = delta.situation.ply, "move outside a live session");
            return Ok(());
        }
        if self.awaiting_resync {
            debug!(ply = delta.situation.ply, "dropping move while awaiting resync");
            return Ok(());
        }
        let SituationDelta { situation, clock } = delta;
        let ply = situation.ply;
        if let Ok(known) = self.ledger.at(ply) {
            if *known == situation {
                debug!(ply, "duplicate move");
                return Ok(());
            }
            return Err(SessionError::DesyncDetected(ply));
        }

        match self.ledger.append(situation.clone()) {
            Ok(()) => {}
            Err(LedgerError::DestsAfterEnd(ply)) => {
                warn!(ply, "ignoring final situation that lists destinations");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let Some(data) = self.data.as_mut() else {
            return Ok(());
        };
        let game = &mut data.game;
        game.fen = situation.fen.clone();
        game.last_move = situation.last_move();
        game.turns = ply;
        if let Some(status) = situation.status.clone() {
            update_status(game, status);
        }
        if situation.winner.is_some() {
            game.winner = situation.winner;
        }
        data.possible_moves = None;
        let terminal = situation.end || game.status.is_terminal();

        self.clock.on_move_applied(situation.player.opposite(), now);
        let events = match clock {
            Some(times) => {
                let running = (!situation.end).then_some(situation.player);
                self.clock.reconcile_times(&times, running, self.lag.estimate(), now)
            }
            None => Vec::new(),
        };
        debug!(ply, "applied move");
        self.notify_changed(now);
        self.emit_clock_events(events);
        if terminal {
            self.finish(now);
        }
        Ok(())
    }

    fn apply_clock(&mut self, times: ClockTimes, now: DateTime<Utc>) {
        if self.state != SessionState::Live {
            debug!(state = ?self.state, "clock push outside a live session");
            return;
        }
        let running = match self.ledger.current() {
            Some(situation) => (!situation.end).then_some(situation.player),
            None => self.game().and_then(|g| g.fen.side_to_move()),
        };
        let events = self.clock.reconcile_times(&times, running, self.lag.estimate(), now);
        self.notify_changed(now);
        self.emit_clock_events(events);
    }

    fn update_players(&mut self, now: DateTime<Utc>, update: impl FnOnce(&mut GameData)) {
        match self.data.as_mut() {
            Some(data) => update(data),
            None => {
                debug!("player update before the first snapshot");
                return;
            }
        }
        if self.is_live() {
            self.notify_changed(now);
        }
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::Terminal;
        self.clock.stop(now);
        let Some(data) = self.data.as_mut() else {
            return;
        };
        self.clock.write_back(&mut data.mode, now);
        let (status, winner) = (data.game.status.clone(), data.game.winner);
        info!(game_id = %data.game.id, status = status.name(), ?winner, "game finished");
        if let Err(e) = self.store.delete(&data.game.id) {
            warn!(game_id = %data.game.id, error = %e, "could not delete offline game");
        }
        self.notify_changed(now);
        self.observer.notify(RoundEvent::Finished { status, winner });
    }

    fn persist(&self) {
        let Some(record) = self.record() else {
            return;
        };
        if let Err(e) = self.store.save(&record.data.game.id, &record) {
            warn!(game_id = %record.data.game.id, error = %e, "could not refresh offline game");
        }
    }

    /// The current resumption point. Its snapshot steps are the ledger, so
    /// the stored data is itself a valid resume snapshot.
    fn record(&self) -> Option<StoredOfflineGame> {
        let mut data = self.data.clone()?;
        data.steps = self.ledger.situations().to_vec();
        let ply = self.ledger.last_ply().unwrap_or(data.game.turns);
        Some(StoredOfflineGame {
            situations: data.steps.clone(),
            data,
            ply,
        })
    }

    fn request_resync(&mut self) {
        self.awaiting_resync = true;
        self.observer.notify(RoundEvent::ResyncRequested);
    }

    fn notify_changed(&mut self, now: DateTime<Utc>) {
        if let Some(view) = self.view(now) {
            self.observer.notify(RoundEvent::Changed(Box::new(view)));
        }
    }

    fn emit_clock_events(&mut self, events: Vec<ClockEvent>) {
        for event in events {
            debug!(?event, "clock event");
            self.observer.notify(event.into());
        }
    }

    fn finished(&self) -> SessionError {
        SessionError::GameFinished(self.game_id().unwrap_or_default().to_string())
    }
}

// Late messages may carry an older status; those are ignored.
fn update_status(game: &mut Game, status: GameStatus) {
    if status.id() < game.status.id() {
        warn!(
            game_id = %game.id,
            current = game.status.name(),
            received = status.name(),
            "ignoring status regression"
        );
        return;
    }
    game.status = status;
}
