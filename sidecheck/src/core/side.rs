//! Execution sides of the two-sided runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two mutually exclusive execution contexts a type may be
/// restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The interactive side (the game client).
    #[serde(alias = "client")]
    Controller,
    /// The headless side (dedicated server).
    #[serde(alias = "server")]
    Worker,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Controller => "controller",
            Side::Worker => "worker",
        }
    }

    /// Map the enum constant carried by a parameterized marker to a side.
    ///
    /// Matching is case-insensitive. Dedicated-worker constants collapse to
    /// [`Side::Worker`]. Unknown constants yield `None`.
    pub fn from_marker_argument(value: &str) -> Option<Side> {
        match value.to_ascii_uppercase().as_str() {
            "CLIENT" | "CONTROLLER" => Some(Side::Controller),
            "SERVER" | "DEDICATED_SERVER" | "WORKER" | "DEDICATED_WORKER" => Some(Side::Worker),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Side`] from user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown side '{0}' (expected controller|client|worker|server)")]
pub struct ParseSideError(String);

impl FromStr for Side {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "controller" | "client" => Ok(Side::Controller),
            "worker" | "server" => Ok(Side::Worker),
            _ => Err(ParseSideError(s.to_string())),
        }
    }
}

/// Source of the current side, queried fresh on every scan.
pub trait SideSource {
    fn current_side(&self) -> Side;
}

impl SideSource for Side {
    fn current_side(&self) -> Side {
        *self
    }
}

impl<F> SideSource for F
where
    F: Fn() -> Side,
{
    fn current_side(&self) -> Side {
        self()
    }
}
