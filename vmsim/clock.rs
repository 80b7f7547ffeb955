// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Selects the pages that are paged out when real memory runs
//! short.
//!
//! Victim selection is pure policy: it inspects the resident
//! set and the page-table entries but performs no eviction
//! itself, so alternative policies can be substituted without
//! touching the swap controller. The policy shipped here is
//! CLOCK, which approximates least-recently-used using the
//! [`REFERENCED`](memory::PteFlags::REFERENCED) bit and a
//! rotating hand.

use crate::arena::Arena;
use crate::resident::ResidentSet;
use memory::{PteFlags, RealAddr};

/// A trait for types that can choose the next page to evict.
///
/// Implementations are handed the arena so they can read, and
/// where the policy calls for it rewrite, the page-table
/// entries the resident set points at.
///
pub trait ReplacementPolicy {
    /// Chooses a victim from the resident set, returning the
    /// real address of the victim's lower-table entry.
    ///
    /// `select_victim` is only invoked once the data sub-arena
    /// has been exhausted, so every slot in `resident` is
    /// occupied.
    ///
    fn select_victim(&mut self, arena: &mut Arena, resident: &ResidentSet) -> RealAddr;
}

/// The CLOCK page-replacement policy.
///
/// A hand sweeps the resident set in slot order. Each entry
/// with its `REFERENCED` bit set earns a second chance: the
/// bit is cleared and the hand moves on. The first entry found
/// with the bit already clear is the victim.
///
/// The hand deliberately stays on the victim rather than
/// advancing past it. The swap controller will rewrite that
/// slot for the page that replaces the victim, and the new
/// tenant's `REFERENCED` bit is set by the MMU as soon as it
/// is touched, so the next sweep treats the slot like any
/// other.
///
/// The sweep terminates: each step either returns or clears
/// one `REFERENCED` bit, and the translator is the only place
/// the bits are set, so after at most one full circuit every
/// entry has had its bit cleared.
///
pub struct ClockPolicy {
    hand: usize,
}

impl ClockPolicy {
    /// Returns a new policy with the hand at slot zero.
    ///
    pub const fn new() -> Self {
        ClockPolicy { hand: 0 }
    }
}

impl Default for ClockPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplacementPolicy for ClockPolicy {
    fn select_victim(&mut self, arena: &mut Arena, resident: &ResidentSet) -> RealAddr {
        loop {
            let owner = resident.owner(self.hand);
            debug_assert!(!owner.is_zero());

            let entry = arena.entry_at(owner);
            let flags = entry.flags();
            if !flags.referenced() {
                return owner;
            }

            arena.set_entry_at(owner, entry.with_flags(flags & !PteFlags::REFERENCED));
            self.hand = (self.hand + 1) % resident.len();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use memory::{PageTableEntry, PAGE_SIZE};

    // Builds an arena holding one lower table at 0x1000 with
    // `n` resident entries, and the matching resident set for
    // frames from 0x2000.
    //
    fn resident_pages(n: usize, flags: PteFlags) -> (Arena, ResidentSet) {
        let mut arena = Arena::new((2 + n) * PAGE_SIZE);
        let mut resident = ResidentSet::new(RealAddr::new(0x2000), n);

        for slot in 0..n {
            let owner = RealAddr::new(0x1000 + 4 * slot as u32);
            let frame = resident.frame_at(slot);
            arena.set_entry_at(owner, PageTableEntry::resident(frame, flags));
            resident.record(frame, owner);
        }

        (arena, resident)
    }

    #[test]
    fn test_all_referenced() {
        let flags = PteFlags::RESIDENT | PteFlags::REFERENCED;
        let (mut arena, resident) = resident_pages(3, flags);
        let mut policy = ClockPolicy::new();

        // Every entry gets a second chance, so the sweep comes
        // back around to slot 0.
        let victim = policy.select_victim(&mut arena, &resident);
        assert_eq!(victim, resident.owner(0));

        for slot in 0..3 {
            let entry = arena.entry_at(resident.owner(slot));
            assert!(!entry.flags().referenced(), "slot {} still referenced", slot);
            assert!(entry.is_resident());
        }
    }

    #[test]
    fn test_skips_referenced_entries() {
        let flags = PteFlags::RESIDENT | PteFlags::REFERENCED;
        let (mut arena, resident) = resident_pages(3, flags);
        let mut policy = ClockPolicy::new();

        // Clear slot 1's bit by hand; the sweep should stop
        // there and leave slot 2 untouched.
        let entry = arena.entry_at(resident.owner(1));
        arena.set_entry_at(
            resident.owner(1),
            entry.with_flags(PteFlags::RESIDENT),
        );

        let victim = policy.select_victim(&mut arena, &resident);
        assert_eq!(victim, resident.owner(1));
        assert!(!arena.entry_at(resident.owner(0)).flags().referenced());
        assert!(arena.entry_at(resident.owner(2)).flags().referenced());
    }

    #[test]
    fn test_hand_stays_on_victim() {
        let flags = PteFlags::RESIDENT;
        let (mut arena, resident) = resident_pages(2, flags);
        let mut policy = ClockPolicy::new();

        // With no referenced bits set, repeated selection
        // without intervening activity picks the same slot.
        let first = policy.select_victim(&mut arena, &resident);
        let second = policy.select_victim(&mut arena, &resident);
        assert_eq!(first, resident.owner(0));
        assert_eq!(second, resident.owner(0));
    }
}
