//! Remote command protocol
//!
//! One JSON object per TCP connection, tagged by its `action` field:
//!
//! ```text
//! {"action":"state"}
//! {"action":"led","space":2,"value":false}
//! {"action":"gate","value":true}
//! {"action":"session","vehicle_id":4,"kind":"entry"}
//! ```
//!
//! `state` is answered with a [`StateReport`], everything else with [`ACK`].
//! Boolean values also accept 0/1, which is what the monitoring client sends
//! for `led`.

use alloc::vec::Vec;
use core::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::types::{SpaceId, VehicleId, SPACES};

/// Acknowledgement sent for every accepted non-query command
pub const ACK: &[u8] = b"OK";

/// Largest request the server reads
pub const MAX_REQUEST: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Entry,
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Command {
    State,
    /// `value == true` marks the space free
    Led {
        space: SpaceId,
        #[serde(deserialize_with = "flag")]
        value: bool,
    },
    /// Holds the gate in the given position until told otherwise
    Gate {
        #[serde(deserialize_with = "flag")]
        value: bool,
    },
    Session {
        vehicle_id: VehicleId,
        kind: SessionKind,
    },
}

/// Answer to `state`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateReport {
    pub free: usize,
    pub gate: bool,
    pub sessions: usize,
    /// Raw ambient light sensor readings
    pub light: [u16; 2],
    /// Per-space indicator, true = free
    pub leds: [bool; SPACES],
    /// Full fee in colones while an exit awaits confirmation
    pub pending_fee: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed command: {0}")]
    Malformed(serde_json::Error),
    #[error("could not encode reply: {0}")]
    Encode(serde_json::Error),
}

impl ProtocolError {
    /// The bytes so far are a valid prefix; more may complete the command
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::Malformed(e) if e.is_eof())
    }
}

pub fn parse(bytes: &[u8]) -> Result<Command, ProtocolError> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Malformed)
}

pub fn encode_state(report: &StateReport) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(report).map_err(ProtocolError::Encode)
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    struct FlagVisitor;

    impl Visitor<'_> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a boolean or 0/1")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match u64::try_from(v) {
                Ok(v) => self.visit_u64(v),
                Err(_) => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
            }
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}
