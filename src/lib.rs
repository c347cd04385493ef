//! Parking gate controller
//!
//! Senses vehicles at an entry/exit gate, drives the gate arm and a
//! single-digit display, tracks per-space occupancy, computes a time based
//! fee and answers a small JSON command set over TCP.
//!
//! Everything runs on one cooperative loop (see [`scheduler`]); the command
//! server is serviced from inside that loop, so the shared state in
//! [`fsm::Fsm`] has exactly one owner.
//!
//! ```text
//! gpi ──> scheduler ──> fsm ──> occupancy / ledger
//!             │          │
//!             │          └────> gpo (gate, display, indicators)
//!             └──> server ──> fsm
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod fee;
pub mod fsm;
pub mod gpi;
pub mod gpo;
pub mod ledger;
pub mod occupancy;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod settings;
pub mod types;

/// Host side adapters (TCP listener, simulated pins)
#[cfg(feature = "std")]
pub mod host;

/// ESP32 board adapters and the Wi-Fi command channel
#[cfg(feature = "firmware")]
pub mod board;
#[cfg(feature = "firmware")]
pub mod net;

pub use fee::Fee;
pub use fsm::{EntryOutcome, ExitOutcome, Fsm};
pub use scheduler::Scheduler;
pub use settings::{ConfigSlot, Settings};
pub use types::{FsmState, SpaceId, VehicleId, SPACES};
