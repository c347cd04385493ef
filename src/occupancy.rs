//! Occupancy tracker
//!
//! Spaces are toggled by the state machine or by remote override, never by
//! the light sensors. Allocation and release scan in opposite directions:
//! vehicles are parked from the highest numbered free space down, and exits
//! free the lowest numbered occupied space first.

use crate::types::{SpaceId, SPACES};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Occupancy {
    /// Indicator flag per space: true = free (lamp lit)
    free: [bool; SPACES],
}

impl Default for Occupancy {
    fn default() -> Self {
        Self::new()
    }
}

impl Occupancy {
    /// All spaces free
    pub const fn new() -> Self {
        Self {
            free: [true; SPACES],
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.iter().filter(|free| **free).count()
    }

    pub fn occupied_count(&self) -> usize {
        SPACES - self.free_count()
    }

    pub fn is_free(&self, space: SpaceId) -> bool {
        self.free[space.index()]
    }

    pub fn set_free(&mut self, space: SpaceId, free: bool) {
        self.free[space.index()] = free;
    }

    /// Marks the highest numbered free space occupied
    pub fn occupy_next(&mut self) -> Option<SpaceId> {
        let index = self.free.iter().rposition(|free| *free)?;
        self.free[index] = false;
        Some(SpaceId::from_index(index))
    }

    /// Frees the lowest numbered occupied space
    pub fn release_next(&mut self) -> Option<SpaceId> {
        let index = self.free.iter().position(|free| !*free)?;
        self.free[index] = true;
        Some(SpaceId::from_index(index))
    }

    /// Indicator outputs, lit = free
    pub fn indicators(&self) -> [bool; SPACES] {
        self.free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(n: u8) -> SpaceId {
        SpaceId::new(n).unwrap()
    }

    #[test]
    fn fills_from_the_top() {
        let mut occ = Occupancy::new();
        assert_eq!(occ.occupy_next(), Some(space(3)));
        assert_eq!(occ.occupy_next(), Some(space(2)));
        assert_eq!(occ.occupy_next(), Some(space(1)));
        assert_eq!(occ.occupy_next(), None);
        assert_eq!(occ.free_count(), 0);
    }

    #[test]
    fn releases_from_the_bottom() {
        let mut occ = Occupancy::new();
        occ.occupy_next();
        occ.occupy_next();
        assert_eq!(occ.release_next(), Some(space(2)));
        assert_eq!(occ.release_next(), Some(space(3)));
        assert_eq!(occ.release_next(), None);
        assert_eq!(occ.free_count(), SPACES);
    }

    #[test]
    fn manual_override_is_respected_by_allocation() {
        let mut occ = Occupancy::new();
        occ.set_free(space(3), false);
        assert_eq!(occ.occupy_next(), Some(space(2)));
        assert_eq!(occ.indicators(), [true, false, false]);
        assert_eq!(occ.occupied_count(), 2);
    }
}
