//! FSM (Finite State Machine) module
//!
//! Owns the whole controller state: occupancy, the session ledger, the gate
//! flag and the entry/exit state. The scheduler and the command server both
//! work on the one [`Fsm`] value, always from the same task.
//!
//! Leaving the lot takes two exit requests: the first shows the fee on the
//! display, the second confirms payment and cycles the gate.

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use crate::fee::Fee;
use crate::gpo::Actuators;
use crate::ledger::{LedgerError, SessionLedger, VehicleSession};
use crate::occupancy::Occupancy;
use crate::settings::Settings;
use crate::types::{FsmState, SpaceId, VehicleId, SPACES};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    Admitted { vehicle: VehicleId, space: SpaceId },
    /// No free space; nothing moved
    LotFull,
    /// Session ledger exhausted; nothing moved
    LedgerFull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// First press: fee is on the display, waiting for confirmation
    FeeShown(Fee),
    /// Second press: gate cycled. Either side may be `None` when remote
    /// bookkeeping changed the ledger or the spaces in between.
    Released {
        vehicle: Option<VehicleId>,
        space: Option<SpaceId>,
    },
    /// No vehicle to process; nothing moved
    NoVehicle,
}

pub struct Fsm {
    occupancy: Occupancy,
    ledger: SessionLedger,
    gate_open: bool,
    state: FsmState,
    dwell: Duration,
    settle: Duration,
}

impl Fsm {
    pub fn new(settings: &Settings) -> Self {
        Self {
            occupancy: Occupancy::new(),
            ledger: SessionLedger::new(),
            gate_open: false,
            state: FsmState::Idle,
            dwell: settings.gate_dwell(),
            settle: settings.settle(),
        }
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn gate_open(&self) -> bool {
        self.gate_open
    }

    pub fn free_spaces(&self) -> usize {
        self.occupancy.free_count()
    }

    /// Full fee of the exit awaiting confirmation
    pub fn pending_fee(&self) -> Option<Fee> {
        match self.state {
            FsmState::AwaitingExitConfirmation { fee } => Some(fee),
            _ => None,
        }
    }

    /// What the digit display should show right now
    pub fn display_digit(&self) -> u8 {
        match self.pending_fee() {
            Some(fee) => fee.digit(),
            None => self.occupancy.free_count().min(9) as u8,
        }
    }

    fn set_state(&mut self, state: FsmState) {
        if self.state != state {
            info!("FSM state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
    }

    /// Entry button pressed
    ///
    /// `clock` is read once the gate has closed behind the vehicle; that
    /// instant starts the billed stay.
    pub async fn request_entry<A, D, C>(&mut self, act: &mut A, delay: &mut D, clock: C) -> EntryOutcome
    where
        A: Actuators,
        D: DelayNs,
        C: Fn() -> Instant,
    {
        let free = self.occupancy.free_count();
        info!("entry requested, {} of {} spaces free", free, SPACES);
        let Some(space) = self.occupancy.occupy_next() else {
            warn!("no free spaces, entry refused");
            return EntryOutcome::LotFull;
        };
        if !self.ledger.can_admit() {
            self.occupancy.set_free(space, true);
            warn!("entry refused: session ledger is full");
            return EntryOutcome::LedgerFull;
        }

        // an unconfirmed exit keeps its fee on the display across the entry
        let resume = self.state;
        self.set_state(FsmState::GateOpeningForEntry);
        self.gate_pulse(act, delay).await;

        let outcome = match self.ledger.admit(clock()) {
            Ok(session) => {
                info!("vehicle {} registered, space {} occupied", session.id, space);
                EntryOutcome::Admitted {
                    vehicle: session.id,
                    space,
                }
            }
            Err(e) => {
                self.occupancy.set_free(space, true);
                warn!("vehicle passed but was not registered: {}", e);
                EntryOutcome::LedgerFull
            }
        };

        delay.delay_ms(as_ms(self.settle)).await;
        self.set_state(match resume {
            FsmState::AwaitingExitConfirmation { .. } => resume,
            _ => FsmState::Idle,
        });
        outcome
    }

    /// Exit button pressed
    pub async fn request_exit<A, D>(&mut self, act: &mut A, delay: &mut D, now: Instant) -> ExitOutcome
    where
        A: Actuators,
        D: DelayNs,
    {
        if self.state.is_awaiting_payment() {
            return self.confirm_exit(act, delay).await;
        }

        let Some(oldest) = self.ledger.oldest() else {
            warn!("no vehicles to process at exit");
            return ExitOutcome::NoVehicle;
        };
        let fee = Fee::between(oldest.entered_at, now);
        info!(
            "vehicle {} owes {} colones (display {}), press exit again to leave",
            oldest.id,
            fee.colones(),
            fee.digit()
        );
        if let Err(e) = act.show_digit(fee.digit()) {
            warn!("fee display failed: {}", e);
        }
        self.set_state(FsmState::AwaitingExitConfirmation { fee });
        ExitOutcome::FeeShown(fee)
    }

    async fn confirm_exit<A, D>(&mut self, act: &mut A, delay: &mut D) -> ExitOutcome
    where
        A: Actuators,
        D: DelayNs,
    {
        info!("payment confirmed, processing exit");
        self.set_state(FsmState::GateOpeningForExit);
        self.gate_pulse(act, delay).await;

        let vehicle = self.ledger.pop_oldest().map(|s| s.id);
        let space = match vehicle {
            Some(id) => {
                let space = self.occupancy.release_next();
                match space {
                    Some(space) => info!("vehicle {} left, space {} released", id, space),
                    None => info!("vehicle {} left, no space was marked occupied", id),
                }
                space
            }
            None => {
                warn!("ledger emptied before exit confirmation");
                None
            }
        };

        self.set_state(FsmState::Idle);
        delay.delay_ms(as_ms(self.settle)).await;
        ExitOutcome::Released { vehicle, space }
    }

    /// Open, hold for the dwell time, close. There is no position feedback.
    async fn gate_pulse<A, D>(&mut self, act: &mut A, delay: &mut D)
    where
        A: Actuators,
        D: DelayNs,
    {
        self.set_gate(act, true);
        delay.delay_ms(as_ms(self.dwell)).await;
        self.set_gate(act, false);
    }

    /// Moves the gate without touching occupancy or sessions
    pub fn set_gate<A: Actuators>(&mut self, act: &mut A, open: bool) {
        info!("gate {}", if open { "opening" } else { "closing" });
        if let Err(e) = act.drive_gate(open) {
            warn!("gate actuation failed: {}", e);
        }
        self.gate_open = open;
    }

    /// Manual space override, `free == true` lights the indicator
    pub fn set_space<A: Actuators>(&mut self, act: &mut A, space: SpaceId, free: bool) {
        info!("space {} set {}", space, if free { "free" } else { "occupied" });
        self.occupancy.set_free(space, free);
        if let Err(e) = act.drive_indicators(self.occupancy.indicators()) {
            warn!("indicator update failed: {}", e);
        }
    }

    /// Remote bookkeeping: add or refresh a session without any fee logic
    pub fn record_entry(&mut self, id: VehicleId, now: Instant) -> Result<(), LedgerError> {
        self.ledger.insert(id, now)?;
        info!("vehicle {} recorded remotely", id);
        Ok(())
    }

    /// Remote bookkeeping: drop a session without any fee logic
    pub fn record_exit(&mut self, id: VehicleId) -> Option<VehicleSession> {
        let removed = self.ledger.remove(id);
        match removed {
            Some(_) => info!("vehicle {} removed remotely", id),
            None => info!("vehicle {} not in ledger, nothing removed", id),
        }
        removed
    }
}

fn as_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}
