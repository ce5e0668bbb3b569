//! Playing positions a booking can request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BookingError;

/// Position code requested by a booking.
///
/// Serialized as its lowercase code (`"gk"`, `"player_front"`, ...), which
/// is also the key used in a match's quota configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Goalkeeper.
    Gk,
    /// Generic front-line player.
    PlayerFront,
    /// Generic back-line player.
    PlayerBack,
    /// Defender.
    Defender,
    /// Midfielder.
    Midfielder,
    /// Forward.
    Forward,
}

impl Position {
    /// Every known position, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Gk,
        Self::PlayerFront,
        Self::PlayerBack,
        Self::Defender,
        Self::Midfielder,
        Self::Forward,
    ];

    /// Returns the wire / quota-key code for this position.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Gk => "gk",
            Self::PlayerFront => "player_front",
            Self::PlayerBack => "player_back",
            Self::Defender => "defender",
            Self::Midfielder => "midfielder",
            Self::Forward => "forward",
        }
    }

    /// Returns `true` for goalkeeper-type positions.
    #[must_use]
    pub const fn is_goalkeeper(self) -> bool {
        matches!(self, Self::Gk)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Position {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.code() == code)
            .ok_or_else(|| BookingError::InvalidPosition(s.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_every_code() {
        for position in Position::ALL {
            let Ok(parsed) = position.code().parse::<Position>() else {
                panic!("{position} should parse");
            };
            assert_eq!(parsed, position);
        }
    }

    #[test]
    fn unknown_code_is_invalid_position() {
        let Err(err) = "striker".parse::<Position>() else {
            panic!("striker is not a position code");
        };
        assert_eq!(err.kind(), ErrorKind::InvalidPosition);
    }

    #[test]
    fn serde_uses_codes() {
        let json = serde_json::to_string(&Position::PlayerFront).unwrap_or_default();
        assert_eq!(json, "\"player_front\"");
    }

    #[test]
    fn only_gk_is_goalkeeper() {
        let keepers: Vec<_> = Position::ALL.into_iter().filter(|p| p.is_goalkeeper()).collect();
        assert_eq!(keepers, vec![Position::Gk]);
    }
}
