use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A destination reachable through the gateway.
///
/// Textual form is `channel:<id>` or `dm:<id>`; ids are non-zero platform
/// snowflakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    Channel { id: u64 },
    DirectEndpoint { id: u64 },
}

impl Target {
    pub fn id(&self) -> u64 {
        match self {
            Self::Channel { id } | Self::DirectEndpoint { id } => *id,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::DirectEndpoint { .. })
    }

    /// Parse every entry, splitting the syntactically valid targets from the
    /// rejected input strings. Duplicates are dropped.
    pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> (Vec<Target>, Vec<String>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for input in inputs {
            match input.as_ref().parse::<Target>() {
                Ok(target) if !valid.contains(&target) => valid.push(target),
                Ok(_) => {},
                Err(_) => invalid.push(input.as_ref().to_string()),
            }
        }
        (valid, invalid)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel { id } => write!(f, "channel:{id}"),
            Self::DirectEndpoint { id } => write!(f, "dm:{id}"),
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (kind, raw_id) = trimmed
            .split_once(':')
            .ok_or_else(|| Error::invalid_target(s))?;
        let id = raw_id
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .ok_or_else(|| Error::invalid_target(s))?;
        match kind.trim().to_ascii_lowercase().as_str() {
            "channel" => Ok(Self::Channel { id }),
            "dm" => Ok(Self::DirectEndpoint { id }),
            _ => Err(Error::invalid_target(s)),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}
