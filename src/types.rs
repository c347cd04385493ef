//! Value types shared by the controller modules.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::fee::Fee;

/// Number of parking spaces served by one gate
pub const SPACES: usize = 3;

/// Parking space number, 1-based as printed on the lot
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SpaceId(u8);

impl SpaceId {
    /// Returns `None` unless `1 <= n <= SPACES`
    pub const fn new(n: u8) -> Option<Self> {
        if n >= 1 && (n as usize) <= SPACES {
            Some(Self(n))
        } else {
            None
        }
    }

    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index as u8 + 1)
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no parking space {0}")]
pub struct InvalidSpace(pub u8);

impl TryFrom<u8> for SpaceId {
    type Error = InvalidSpace;

    fn try_from(n: u8) -> Result<Self, InvalidSpace> {
        Self::new(n).ok_or(InvalidSpace(n))
    }
}

impl From<SpaceId> for u8 {
    fn from(space: SpaceId) -> u8 {
        space.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vehicle identifier used by the session ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Entry/exit state machine states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsmState {
    Idle,
    GateOpeningForEntry,
    GateOpeningForExit,
    /// A fee was shown; the next exit request confirms payment
    AwaitingExitConfirmation { fee: Fee },
}

impl FsmState {
    pub const fn is_awaiting_payment(&self) -> bool {
        matches!(self, FsmState::AwaitingExitConfirmation { .. })
    }
}

/// Raw readings of the two ambient light sensors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightReadings(pub [u16; 2]);

/// One raw sample of every input, taken once per tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpiSample {
    pub entry_pressed: bool,
    pub exit_pressed: bool,
    pub light: LightReadings,
}

/// Released-to-pressed transitions detected on one tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonEdges {
    pub entry: bool,
    pub exit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_ids_are_one_based_and_bounded() {
        assert_eq!(SpaceId::new(0), None);
        assert_eq!(SpaceId::new(4), None);
        let s = SpaceId::new(3).unwrap();
        assert_eq!(s.index(), 2);
        assert_eq!(SpaceId::from_index(0).number(), 1);
        assert_eq!(SpaceId::try_from(5), Err(InvalidSpace(5)));
    }
}
