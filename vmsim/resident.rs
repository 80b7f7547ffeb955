// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Tracks which lower-table entry owns each data frame.
//!
//! Every resident page is described in two places: its lower
//! page-table entry points at a data frame, and the resident
//! set index points from that frame's slot back to the entry.
//! The back-pointer is what lets the replacement engine walk
//! the resident frames and the swap controller rewrite a
//! victim's entry in constant time.
//!
//! The index stores plain real addresses rather than any form
//! of reference; the page table remains the single owner of
//! the mapping.

use memory::{RealAddr, PAGE_SIZE};

/// The resident set index: one slot per data frame, holding
/// the real address of the lower-table entry whose page is
/// resident in that frame.
///
/// A slot holding the null real address has never had a frame
/// assigned. Once the data sub-arena has been exhausted every
/// slot is occupied, and slots are only ever overwritten with
/// their next tenant.
///
pub struct ResidentSet {
    // The real address of the first data frame.
    base: RealAddr,

    owners: Vec<RealAddr>,
}

impl ResidentSet {
    /// Creates an index for `frames` data frames, the first
    /// of which starts at `base`.
    ///
    /// # Panics
    ///
    /// `new` will panic if `base` is not page-aligned.
    ///
    #[track_caller]
    pub fn new(base: RealAddr, frames: usize) -> Self {
        if !base.is_page_aligned() {
            panic!("misaligned data sub-arena base {:#x}", base);
        }

        ResidentSet {
            base,
            owners: vec![RealAddr::zero(); frames],
        }
    }

    /// Returns the number of data frames the index covers.
    ///
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns whether the index covers no frames at all.
    ///
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Returns the slot covering the data frame at `frame`.
    ///
    /// # Panics
    ///
    /// `slot_of` will panic if `frame` is not the page-aligned
    /// address of a covered data frame.
    ///
    #[track_caller]
    pub fn slot_of(&self, frame: RealAddr) -> usize {
        if !frame.is_page_aligned() || frame < self.base {
            panic!("invalid data frame address {:#x}", frame);
        }

        let slot = (frame - self.base) / PAGE_SIZE;
        if slot >= self.owners.len() {
            panic!("invalid data frame address {:#x}", frame);
        }

        slot
    }

    /// Returns the address of the data frame covered by
    /// `slot`.
    ///
    /// # Panics
    ///
    /// `frame_at` will panic if `slot` is not a valid slot.
    ///
    #[track_caller]
    pub fn frame_at(&self, slot: usize) -> RealAddr {
        if slot >= self.owners.len() {
            panic!("invalid resident set slot {}", slot);
        }

        self.base + slot * PAGE_SIZE
    }

    /// Records that the lower-table entry at `owner` holds the
    /// page now resident in the data frame at `frame`.
    ///
    /// # Panics
    ///
    /// `record` will panic if `frame` is not a covered data
    /// frame.
    ///
    #[track_caller]
    pub fn record(&mut self, frame: RealAddr, owner: RealAddr) {
        let slot = self.slot_of(frame);
        self.owners[slot] = owner;
    }

    /// Returns the lower-table entry address recorded for
    /// `slot`, or the null real address if the slot has never
    /// been assigned.
    ///
    /// # Panics
    ///
    /// `owner` will panic if `slot` is not a valid slot.
    ///
    #[track_caller]
    pub fn owner(&self, slot: usize) -> RealAddr {
        if slot >= self.owners.len() {
            panic!("invalid resident set slot {}", slot);
        }

        self.owners[slot]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_slot_arithmetic() {
        let set = ResidentSet::new(RealAddr::new(0x40_1000), 3);
        assert_eq!(set.len(), 3);
        assert!(!set.is_empty());
        assert_eq!(set.slot_of(RealAddr::new(0x40_1000)), 0);
        assert_eq!(set.slot_of(RealAddr::new(0x40_3000)), 2);
        assert_eq!(set.frame_at(0), RealAddr::new(0x40_1000));
        assert_eq!(set.frame_at(2), RealAddr::new(0x40_3000));
    }

    #[test]
    fn test_record_and_overwrite() {
        let mut set = ResidentSet::new(RealAddr::new(0x40_1000), 2);
        assert!(set.owner(0).is_zero());
        assert!(set.owner(1).is_zero());

        let frame = RealAddr::new(0x40_2000);
        set.record(frame, RealAddr::new(0x2004));
        assert_eq!(set.owner(1), RealAddr::new(0x2004));

        // A new tenant replaces the old owner.
        set.record(frame, RealAddr::new(0x2ffc));
        assert_eq!(set.owner(1), RealAddr::new(0x2ffc));
        assert!(set.owner(0).is_zero());
    }

    #[test]
    #[should_panic(expected = "invalid data frame address")]
    fn test_frame_outside_data_area() {
        let set = ResidentSet::new(RealAddr::new(0x40_1000), 2);
        let _ = set.slot_of(RealAddr::new(0x40_3000));
    }
}
