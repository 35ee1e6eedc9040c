use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Endpoint identifier assigned by the transport to each live connection.
///
/// The relay core never mints these; it only compares and stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Eid(pub u64);

/// The relay's own control identity. Devices address buffered messages here.
pub const RELAY_EID: Eid = Eid(0);

impl Eid {
    pub fn is_relay(self) -> bool {
        self == RELAY_EID
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseEidError {
    #[error("endpoint id is empty")]
    Empty,
    #[error("endpoint id {0:?} is not a decimal integer")]
    NotANumber(String),
    #[error("endpoint id 0 is reserved for the relay")]
    Reserved,
}

impl FromStr for Eid {
    type Err = ParseEidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseEidError::Empty);
        }
        // u64::from_str accepts a leading '+', which is not a valid id.
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseEidError::NotANumber(s.to_string()));
        }
        let value: u64 = s
            .parse()
            .map_err(|_| ParseEidError::NotANumber(s.to_string()))?;
        if value == 0 {
            return Err(ParseEidError::Reserved);
        }
        Ok(Eid(value))
    }
}

/// Opaque tag carried alongside each payload. Preserved, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubChannel(pub u32);

impl fmt::Display for SubChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
