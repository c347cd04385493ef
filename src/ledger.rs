//! Vehicle session ledger
//!
//! Sessions are kept in insertion order; the oldest one is the one processed
//! at the exit gate. The ledger is bounded so it fits a static allocation.

use embassy_time::Instant;
use heapless::Vec;
use log::debug;

use crate::types::{VehicleId, SPACES};

/// Ledger capacity. Remote bookkeeping may add sessions beyond the number of
/// spaces, so this is larger than [`crate::SPACES`].
pub const MAX_SESSIONS: usize = 16;

/// Sessions remote bookkeeping may open; the last [`SPACES`] slots are
/// left for vehicles admitted at the gate.
pub const REMOTE_SESSIONS: usize = MAX_SESSIONS - SPACES;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VehicleSession {
    pub id: VehicleId,
    pub entered_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("session ledger is full")]
    Full,
}

#[derive(Debug, Default)]
pub struct SessionLedger {
    sessions: Vec<VehicleSession, MAX_SESSIONS>,
    next_id: u32,
}

impl SessionLedger {
    pub const fn new() -> Self {
        Self {
            sessions: Vec::new(),
            next_id: 0,
        }
    }

    pub fn can_admit(&self) -> bool {
        !self.sessions.is_full()
    }

    /// Opens a session for a vehicle that just passed the entry gate
    ///
    /// Ids increase monotonically; ids already taken by remote bookkeeping
    /// are skipped.
    pub fn admit(&mut self, now: Instant) -> Result<VehicleSession, LedgerError> {
        if self.sessions.is_full() {
            return Err(LedgerError::Full);
        }
        while self.contains(VehicleId(self.next_id)) {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let session = VehicleSession {
            id: VehicleId(self.next_id),
            entered_at: now,
        };
        self.next_id = self.next_id.wrapping_add(1);
        self.sessions
            .push(session)
            .map_err(|_| LedgerError::Full)?;
        Ok(session)
    }

    /// Inserts or refreshes a session by id
    ///
    /// A known id keeps its place in the queue and gets a new entry time.
    /// New ids are refused once [`REMOTE_SESSIONS`] sessions are open.
    pub fn insert(&mut self, id: VehicleId, now: Instant) -> Result<(), LedgerError> {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            debug!("ledger: refreshing entry time of {}", id);
            session.entered_at = now;
            return Ok(());
        }
        if self.sessions.len() >= REMOTE_SESSIONS {
            return Err(LedgerError::Full);
        }
        self.sessions
            .push(VehicleSession { id, entered_at: now })
            .map_err(|_| LedgerError::Full)
    }

    pub fn remove(&mut self, id: VehicleId) -> Option<VehicleSession> {
        let pos = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(pos))
    }

    pub fn oldest(&self) -> Option<&VehicleSession> {
        self.sessions.first()
    }

    pub fn pop_oldest(&mut self) -> Option<VehicleSession> {
        if self.sessions.is_empty() {
            None
        } else {
            Some(self.sessions.remove(0))
        }
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.sessions.iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_in_order_and_pops_oldest_first() {
        let mut ledger = SessionLedger::new();
        let a = ledger.admit(Instant::from_secs(1)).unwrap();
        let b = ledger.admit(Instant::from_secs(2)).unwrap();
        assert_eq!(a.id, VehicleId(0));
        assert_eq!(b.id, VehicleId(1));
        assert_eq!(ledger.oldest().map(|s| s.id), Some(a.id));
        assert_eq!(ledger.pop_oldest(), Some(a));
        assert_eq!(ledger.pop_oldest(), Some(b));
        assert_eq!(ledger.pop_oldest(), None);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut ledger = SessionLedger::new();
        ledger.admit(Instant::from_secs(1)).unwrap();
        ledger.pop_oldest();
        let next = ledger.admit(Instant::from_secs(2)).unwrap();
        assert_eq!(next.id, VehicleId(1));
    }

    #[test]
    fn admit_skips_ids_inserted_remotely() {
        let mut ledger = SessionLedger::new();
        ledger.insert(VehicleId(0), Instant::from_secs(1)).unwrap();
        ledger.insert(VehicleId(1), Instant::from_secs(1)).unwrap();
        let admitted = ledger.admit(Instant::from_secs(2)).unwrap();
        assert_eq!(admitted.id, VehicleId(2));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn insert_refreshes_existing_id_in_place() {
        let mut ledger = SessionLedger::new();
        ledger.insert(VehicleId(7), Instant::from_secs(1)).unwrap();
        ledger.insert(VehicleId(8), Instant::from_secs(2)).unwrap();
        ledger.insert(VehicleId(7), Instant::from_secs(30)).unwrap();

        assert_eq!(ledger.len(), 2);
        let oldest = ledger.oldest().unwrap();
        assert_eq!(oldest.id, VehicleId(7));
        assert_eq!(oldest.entered_at, Instant::from_secs(30));
    }

    #[test]
    fn remove_unknown_id_is_none() {
        let mut ledger = SessionLedger::new();
        ledger.admit(Instant::from_secs(1)).unwrap();
        assert_eq!(ledger.remove(VehicleId(42)), None);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn full_ledger_refuses_new_sessions() {
        let mut ledger = SessionLedger::new();
        for _ in 0..MAX_SESSIONS {
            ledger.admit(Instant::from_secs(0)).unwrap();
        }
        assert_eq!(ledger.admit(Instant::from_secs(0)), Err(LedgerError::Full));
        assert_eq!(
            ledger.insert(VehicleId(999), Instant::from_secs(0)),
            Err(LedgerError::Full)
        );
        // refreshing a known id still works when full
        assert_eq!(ledger.insert(VehicleId(3), Instant::from_secs(5)), Ok(()));
    }

    #[test]
    fn remote_sessions_leave_room_for_the_gate() {
        let mut ledger = SessionLedger::new();
        for id in 100..100 + REMOTE_SESSIONS as u32 {
            ledger.insert(VehicleId(id), Instant::from_secs(0)).unwrap();
        }
        assert_eq!(
            ledger.insert(VehicleId(999), Instant::from_secs(0)),
            Err(LedgerError::Full)
        );
        for _ in 0..SPACES {
            assert!(ledger.can_admit());
            ledger.admit(Instant::from_secs(1)).unwrap();
        }
        assert!(!ledger.can_admit());
    }
}
