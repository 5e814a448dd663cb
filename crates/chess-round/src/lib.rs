//! Game situation and clock synchronization for one player's view of a game.
//!
//! # Overview
//!
//! - [`GameData`] and friends - the server's game, player and clock shapes
//! - [`SituationLedger`] - ply-indexed, append-only history of [`GameSituation`]s
//! - [`ClockSyncEngine`] and [`CorrespondenceClockModel`] - local clocks
//!   corrected by server pushes
//! - [`GameSessionController`] - applies pushes, suspends and resumes a game
//! - [`OfflineGameStore`] - persistence of suspended games
//! - [`run_session`] - async driver feeding a session from a command queue
//!
//! # Example
//!
//! ```ignore
//! use chess_round::{GameSessionController, MemoryStore, ServerMessage};
//!
//! let mut session = GameSessionController::new(MemoryStore::new(), Vec::new());
//! session.apply_update(ServerMessage::parse(&frame)?, chrono::Utc::now())?;
//! println!("{:?}", session.current());
//! ```

pub mod clock;
pub mod config;
pub mod driver;
pub mod events;
pub mod game;
pub mod ledger;
pub mod message;
pub mod session;
pub mod situation;
pub mod store;

pub use clock::{
    Clock, ClockEvent, ClockSyncEngine, ClockTimes, CorrespondenceClock, CorrespondenceClockModel,
    GameClock, LagTracker,
};
pub use config::{ConfigError, RoundConfig};
pub use driver::{run_session, DriverSettings, SessionCommand};
pub use events::{RoundEvent, RoundObserver, RoundView};
pub use game::{
    Game, GameData, GameDataError, GameMode, GameStatus, Perf, PlayTime, Player, RatedPerf,
    Tournament, User, Variant, Watching,
};
pub use ledger::{LedgerError, SituationLedger};
pub use message::{
    Crowd, EndData, Frame, MessageError, PongMessage, ServerMessage, SituationDelta, TakebackOffers,
};
pub use session::{GameSessionController, ResumeOutcome, SessionError, SessionState};
pub use situation::{CheckCount, Dests, GameSituation};
pub use store::{JsonFileStore, MemoryStore, OfflineGameStore, StoreError, StoredOfflineGame};
