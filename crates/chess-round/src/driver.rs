//! Async driver owning one session.
//!
//! All access to a session goes through a single command queue, so pushes,
//! player actions and clock ticks are applied one at a time. The tick branch
//! is only polled while the session is live.

use chess_core::UciMove;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RoundConfig;
use crate::events::RoundObserver;
use crate::game::GameData;
use crate::message::ServerMessage;
use crate::session::{GameSessionController, ResumeOutcome, SessionError};
use crate::store::OfflineGameStore;

pub type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

#[derive(Debug)]
pub enum SessionCommand {
    Push(ServerMessage),
    /// The transport lost its connection. Unless another push arrives
    /// within the grace period, the session is suspended.
    ConnectionLost,
    Suspend(Reply<()>),
    Resume(Box<GameData>, Reply<ResumeOutcome>),
    Move(UciMove, Reply<()>),
    Shutdown,
}

/// Timing knobs for [`run_session`].
#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    pub tick_interval: Duration,
    pub suspend_grace: Duration,
}

impl From<&RoundConfig> for DriverSettings {
    fn from(config: &RoundConfig) -> Self {
        DriverSettings {
            tick_interval: config.tick_interval(),
            suspend_grace: config.suspend_grace(),
        }
    }
}

/// Runs `session` until a [`SessionCommand::Shutdown`] or until every
/// sender is dropped, then hands the session back.
pub async fn run_session<S, O>(
    mut session: GameSessionController<S, O>,
    mut commands: mpsc::Receiver<SessionCommand>,
    settings: DriverSettings,
) -> GameSessionController<S, O>
where
    S: OfflineGameStore,
    O: RoundObserver,
{
    let mut ticker = interval(settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();
    let mut grace_deadline: Option<Instant> = None;

    loop {
        let was_live = session.is_live();
        let deadline = grace_deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("command queue closed");
                    break;
                };
                match command {
                    SessionCommand::Push(message) => {
                        grace_deadline = None;
                        if let Err(e) = session.apply_update(message, Utc::now()) {
                            debug!(error = %e, "push rejected");
                        }
                    }
                    SessionCommand::ConnectionLost => {
                        if session.is_live() && grace_deadline.is_none() {
                            grace_deadline = Some(Instant::now() + settings.suspend_grace);
                        }
                    }
                    SessionCommand::Suspend(reply) => {
                        grace_deadline = None;
                        let _ = reply.send(session.suspend(Utc::now()));
                    }
                    SessionCommand::Resume(data, reply) => {
                        let _ = reply.send(session.resume(*data, Utc::now()));
                    }
                    SessionCommand::Move(mv, reply) => {
                        let _ = reply.send(session.attempt_move(mv));
                    }
                    SessionCommand::Shutdown => break,
                }
            }
            _ = ticker.tick(), if was_live => {
                let now = Instant::now();
                session.tick(now - last_tick, Utc::now());
                last_tick = now;
            }
            _ = sleep_until(deadline), if grace_deadline.is_some() => {
                grace_deadline = None;
                info!(game_id = ?session.game_id(), "connection lost past grace period");
                if let Err(e) = session.suspend(Utc::now()) {
                    warn!(error = %e, "could not suspend");
                }
            }
        }

        if !was_live && session.is_live() {
            last_tick = Instant::now();
            ticker.reset();
        }
    }
    session
}
