//! Ply-indexed history of game situations.

use thiserror::Error;

use crate::situation::GameSituation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("expected ply {expected}, got {actual}")]
    OutOfOrderPly { expected: u32, actual: u32 },
    #[error("ledger is closed at ply {0}")]
    LedgerClosed(u32),
    #[error("no situation at ply {0}")]
    PlyNotFound(u32),
    #[error("situation at ply {0} ends the game but still lists destinations")]
    DestsAfterEnd(u32),
}

/// An append-only sequence of situations with strictly consecutive plies.
///
/// The first situation may start at any ply, since games can begin from a
/// position. After a situation with `end` set, nothing more is accepted.
/// [`truncate_from`](Self::truncate_from) is the only other mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SituationLedger {
    situations: Vec<GameSituation>,
}

impl SituationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger by appending every situation in order.
    pub fn replay<I>(situations: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = GameSituation>,
    {
        let mut ledger = Self::new();
        for situation in situations {
            ledger.append(situation)?;
        }
        Ok(ledger)
    }

    /// Appends the next situation. On error the ledger is unchanged.
    pub fn append(&mut self, situation: GameSituation) -> Result<(), LedgerError> {
        if let Some(last) = self.situations.last() {
            if last.end {
                return Err(LedgerError::LedgerClosed(last.ply));
            }
            match last.ply.checked_add(1) {
                Some(expected) if expected == situation.ply => {}
                Some(expected) => {
                    return Err(LedgerError::OutOfOrderPly {
                        expected,
                        actual: situation.ply,
                    })
                }
                None => return Err(LedgerError::LedgerClosed(last.ply)),
            }
        }
        if situation.end && !situation.dests.is_empty() {
            return Err(LedgerError::DestsAfterEnd(situation.ply));
        }
        self.situations.push(situation);
        Ok(())
    }

    pub fn at(&self, ply: u32) -> Result<&GameSituation, LedgerError> {
        ply.checked_sub(self.first_ply().unwrap_or_default())
            .and_then(|offset| self.situations.get(offset as usize))
            .ok_or(LedgerError::PlyNotFound(ply))
    }

    pub fn current(&self) -> Option<&GameSituation> {
        self.situations.last()
    }

    /// Discards every situation from `ply` onward.
    pub fn truncate_from(&mut self, ply: u32) {
        let Some(first) = self.first_ply() else {
            return;
        };
        let keep = ply.saturating_sub(first) as usize;
        self.situations.truncate(keep);
    }

    pub fn first_ply(&self) -> Option<u32> {
        self.situations.first().map(|s| s.ply)
    }

    pub fn last_ply(&self) -> Option<u32> {
        self.situations.last().map(|s| s.ply)
    }

    pub fn len(&self) -> usize {
        self.situations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.situations.is_empty()
    }

    /// True once the last situation ends the game.
    pub fn is_closed(&self) -> bool {
        self.situations.last().is_some_and(|s| s.end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameSituation> {
        self.situations.iter()
    }

    pub fn situations(&self) -> &[GameSituation] {
        &self.situations
    }

    /// First ply of `self` that `other` lacks or holds differently.
    pub fn first_divergence(&self, other: &SituationLedger) -> Option<u32> {
        self.situations
            .iter()
            .find(|local| other.at(local.ply).ok() != Some(*local))
            .map(|local| local.ply)
    }
}
