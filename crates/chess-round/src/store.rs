//! Persistence of suspended games.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::game::GameData;
use crate::situation::GameSituation;

/// The resumption point written on suspend.
///
/// `data` carries the clock state current at suspension time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOfflineGame {
    pub data: GameData,
    pub situations: Vec<GameSituation>,
    pub ply: u32,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored game {0:?}")]
    NotFound(String),
    #[error("store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("stored game is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value contract for suspended games, keyed by game id.
///
/// Deleting a game that is not stored succeeds.
pub trait OfflineGameStore {
    fn save(&self, game_id: &str, game: &StoredOfflineGame) -> Result<(), StoreError>;
    fn load(&self, game_id: &str) -> Result<StoredOfflineGame, StoreError>;
    fn delete(&self, game_id: &str) -> Result<(), StoreError>;
}

impl<S: OfflineGameStore + ?Sized> OfflineGameStore for Arc<S> {
    fn save(&self, game_id: &str, game: &StoredOfflineGame) -> Result<(), StoreError> {
        (**self).save(game_id, game)
    }

    fn load(&self, game_id: &str) -> Result<StoredOfflineGame, StoreError> {
        (**self).load(game_id)
    }

    fn delete(&self, game_id: &str) -> Result<(), StoreError> {
        (**self).delete(game_id)
    }
}

impl<S: OfflineGameStore + ?Sized> OfflineGameStore for &S {
    fn save(&self, game_id: &str, game: &StoredOfflineGame) -> Result<(), StoreError> {
        (**self).save(game_id, game)
    }

    fn load(&self, game_id: &str) -> Result<StoredOfflineGame, StoreError> {
        (**self).load(game_id)
    }

    fn delete(&self, game_id: &str) -> Result<(), StoreError> {
        (**self).delete(game_id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    games: Mutex<HashMap<String, StoredOfflineGame>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, game_id: &str) -> bool {
        self.lock().contains_key(game_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredOfflineGame>> {
        self.games.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OfflineGameStore for MemoryStore {
    fn save(&self, game_id: &str, game: &StoredOfflineGame) -> Result<(), StoreError> {
        self.lock().insert(game_id.to_string(), game.clone());
        Ok(())
    }

    fn load(&self, game_id: &str) -> Result<StoredOfflineGame, StoreError> {
        self.lock()
            .get(game_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(game_id.to_string()))
    }

    fn delete(&self, game_id: &str) -> Result<(), StoreError> {
        self.lock().remove(game_id);
        Ok(())
    }
}

/// One `<game_id>.json` file per suspended game.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFileStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, game_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !game_id.is_empty()
            && game_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid game id {:?}", game_id),
            )));
        }
        Ok(self.dir.join(format!("{}.json", game_id)))
    }
}

impl OfflineGameStore for JsonFileStore {
    fn save(&self, game_id: &str, game: &StoredOfflineGame) -> Result<(), StoreError> {
        let path = self.path(game_id)?;
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(game)?;
        // Readers only ever see a complete file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        debug!(game_id, path = %path.display(), "saved offline game");
        Ok(())
    }

    fn load(&self, game_id: &str) -> Result<StoredOfflineGame, StoreError> {
        let path = self.path(game_id)?;
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(game_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    fn delete(&self, game_id: &str) -> Result<(), StoreError> {
        let path = self.path(game_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(game_id, "deleted offline game");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
