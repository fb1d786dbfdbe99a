#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a flag at one layer. `Undefined` is the absence of a stored value,
/// never a stored value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tristate {
    True,
    False,
    Undefined,
}

impl Tristate {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }

    /// Absent entries map to `Undefined`.
    pub fn from_stored(value: Option<bool>) -> Self {
        value.map(Self::from_bool).unwrap_or(Tristate::Undefined)
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Tristate::True => Some(true),
            Tristate::False => Some(false),
            Tristate::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        self != Tristate::Undefined
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tristate::True => "true",
            Tristate::False => "false",
            Tristate::Undefined => "undefined",
        }
    }

    /// Parses command input. Integers map by sign (`<= -1` false, `0` undefined,
    /// `>= 1` true); otherwise the case-insensitive names are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(n) = value.parse::<i64>() {
            return Some(match n {
                n if n <= -1 => Tristate::False,
                0 => Tristate::Undefined,
                _ => Tristate::True,
            });
        }
        match value.to_ascii_lowercase().as_str() {
            "true" => Some(Tristate::True),
            "false" => Some(Tristate::False),
            "undefined" => Some(Tristate::Undefined),
            _ => None,
        }
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        Tristate::from_bool(value)
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
