//! Coordinate (UCI) move notation.

use crate::{Role, Square};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid uci move: {0:?}")]
pub struct UciMoveError(pub String);

/// A move in UCI notation: `e2e4`, `e7e8q`, or a drop such as `N@f3`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum UciMove {
    Normal {
        from: Square,
        to: Square,
        promotion: Option<Role>,
    },
    Drop {
        role: Role,
        to: Square,
    },
}

impl UciMove {
    /// Parses a move from UCI notation.
    pub fn from_uci(s: &str) -> Option<Self> {
        if let Some((role, to)) = s.split_once('@') {
            let mut letters = role.chars();
            let role = Role::from_char(letters.next()?)?;
            if letters.next().is_some() || role == Role::King {
                return None;
            }
            return Some(UciMove::Drop {
                role,
                to: Square::from_algebraic(to)?,
            });
        }

        if !s.is_ascii() || s.len() < 4 || s.len() > 5 {
            return None;
        }
        let from = Square::from_algebraic(&s[0..2])?;
        let to = Square::from_algebraic(&s[2..4])?;
        let promotion = match s[4..].chars().next() {
            Some(c) => match Role::from_char(c)? {
                Role::Pawn => return None,
                role => Some(role),
            },
            None => None,
        };
        Some(UciMove::Normal {
            from,
            to,
            promotion,
        })
    }

    /// Destination square of the move.
    pub const fn to(self) -> Square {
        match self {
            UciMove::Normal { to, .. } | UciMove::Drop { to, .. } => to,
        }
    }

    /// Origin square, `None` for drops.
    pub const fn from(self) -> Option<Square> {
        match self {
            UciMove::Normal { from, .. } => Some(from),
            UciMove::Drop { .. } => None,
        }
    }

    pub fn to_uci(self) -> String {
        self.to_string()
    }
}

impl FromStr for UciMove {
    type Err = UciMoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UciMove::from_uci(s).ok_or_else(|| UciMoveError(s.to_string()))
    }
}

impl fmt::Display for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            UciMove::Normal {
                from,
                to,
                promotion,
            } => {
                write!(f, "{}{}", from, to)?;
                if let Some(role) = promotion {
                    write!(f, "{}", role.to_char())?;
                }
                Ok(())
            }
            UciMove::Drop { role, to } => {
                write!(f, "{}@{}", role.to_char().to_ascii_uppercase(), to)
            }
        }
    }
}

impl fmt::Debug for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UciMove({})", self)
    }
}

impl Serialize for UciMove {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UciMove {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        s.parse().unwrap()
    }

    #[test]
    fn normal_move() {
        let m = UciMove::from_uci("e2e4").unwrap();
        assert_eq!(m.from(), Some(sq("e2")));
        assert_eq!(m.to(), sq("e4"));
        assert_eq!(m.to_uci(), "e2e4");
    }

    #[test]
    fn promotion() {
        let m = UciMove::from_uci("e7e8Q").unwrap();
        assert_eq!(
            m,
            UciMove::Normal {
                from: sq("e7"),
                to: sq("e8"),
                promotion: Some(Role::Queen)
            }
        );
        assert_eq!(m.to_string(), "e7e8q");
        assert!(UciMove::from_uci("e7e8p").is_none());
        assert!(UciMove::from_uci("e7e8x").is_none());
    }

    #[test]
    fn drop_move() {
        let m: UciMove = "N@f3".parse().unwrap();
        assert_eq!(m.from(), None);
        assert_eq!(m.to(), sq("f3"));
        assert_eq!(m.to_string(), "N@f3");
        assert!(UciMove::from_uci("K@f3").is_none());
        assert!(UciMove::from_uci("NN@f3").is_none());
    }

    #[test]
    fn invalid_moves() {
        assert!(UciMove::from_uci("e2").is_none());
        assert!(UciMove::from_uci("e2e9").is_none());
        assert!(UciMove::from_uci("e2e4qq").is_none());
        assert!(UciMove::from_uci("é2e4").is_none());
        assert_eq!(
            "zz".parse::<UciMove>(),
            Err(UciMoveError("zz".to_string()))
        );
    }

    #[test]
    fn serde_as_string() {
        let m: UciMove = serde_json::from_str("\"g1f3\"").unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"g1f3\"");
    }
}
