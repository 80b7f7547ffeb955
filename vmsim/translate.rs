// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Translates simulated addresses to real addresses.
//!
//! Translation walks the two-level page tables: the address's
//! upper index selects an upper-table entry holding a lower
//! table's address, the lower index selects the lower-table
//! entry describing the page, and the page offset lands inside
//! the entry's data frame. A walk that finds an empty upper
//! entry, an empty lower entry, or a paged-out lower entry is
//! a fault; the fault handler builds whatever is missing and
//! the walk is retried.
//!
//! A lower-table entry moves through three states:
//!
//! ```text
//!   empty ──first touch──▶ resident ──evict──▶ non-resident
//!                              ▲                    │
//!                              └─────swap in────────┘
//! ```
//!
//! Empty is never re-entered; a page that has existed keeps
//! either a frame or a backing store block forever.

use crate::{Error, VmSim};
use log::trace;
use memory::{entry_address, PageTableEntry, PteFlags, RealAddr, SimAddr};

impl VmSim {
    /// Translates `addr` to the real address backing it,
    /// faulting the page in if necessary.
    ///
    /// On a successful translation the lower-table entry's
    /// referenced bit is set, and for a write access the
    /// dirty bit too; the replacement engine relies on the
    /// referenced bit to spot recently used pages.
    ///
    pub fn map(&mut self, addr: SimAddr, write: bool) -> Result<RealAddr, Error> {
        loop {
            if let Some((pte_addr, frame)) = self.walk(addr) {
                let entry = self.arena.entry_at(pte_addr);
                let mut flags = entry.flags() | PteFlags::REFERENCED;
                if write {
                    flags |= PteFlags::DIRTY;
                }

                self.arena.set_entry_at(pte_addr, entry.with_flags(flags));

                return Ok(frame + addr.page_offset());
            }

            self.handle_fault(addr)?;
        }
    }

    // Walks the page tables for `addr`, returning the real
    // addresses of its lower-table entry and of the data frame
    // holding the page if it is resident, and None on any kind
    // of miss.
    //
    fn walk(&self, addr: SimAddr) -> Option<(RealAddr, RealAddr)> {
        let upper_addr = entry_address(self.upper_table, addr.upper_index());
        let table = self.arena.entry_at(upper_addr).as_table()?;

        let pte_addr = entry_address(table, addr.lower_index());
        let resident = self.arena.entry_at(pte_addr).as_resident()?;

        Some((pte_addr, resident.frame))
    }

    // Repairs the page tables so that a walk for `addr` will
    // succeed: creates the lower table if the upper entry is
    // empty, then makes the page resident, either in a fresh
    // frame (first touch) or by swapping against a CLOCK
    // victim (paged out).
    //
    fn handle_fault(&mut self, addr: SimAddr) -> Result<(), Error> {
        trace!("page fault at {:#x}", addr);

        let upper_addr = entry_address(self.upper_table, addr.upper_index());
        let table = match self.arena.entry_at(upper_addr).as_table() {
            Some(table) => table,
            None => {
                let table = self.allocate_table()?;
                self.arena.set_entry_at(upper_addr, PageTableEntry::table(table));
                trace!(
                    "created lower table {:#x} for upper index {}",
                    table,
                    addr.upper_index()
                );
                table
            }
        };

        let pte_addr = entry_address(table, addr.lower_index());
        let entry = self.arena.entry_at(pte_addr);
        if entry.is_empty() {
            let frame = self.allocate_frame()?;
            self.arena
                .set_entry_at(pte_addr, PageTableEntry::resident(frame, PteFlags::RESIDENT));
            self.resident.record(frame, pte_addr);
        } else if !entry.is_resident() {
            self.swap(pte_addr)?;
        }

        Ok(())
    }

    // Returns a zeroed page from the page-table sub-arena for
    // use as a lower table.
    //
    fn allocate_table(&mut self) -> Result<RealAddr, Error> {
        let table = match self.tables.allocate_page() {
            Some(table) => table,
            None => return Err(Error::PageTablesExhausted),
        };

        self.arena.zero_page(table);

        Ok(table)
    }
}

#[cfg(test)]
mod test {
    use crate::{Config, VmSim, PT_AREA_SIZE};
    use memory::{entry_address, PageTableEntry, RealAddr, SimAddr, PAGE_SIZE};

    fn simulator(data_frames: usize) -> VmSim {
        let config = Config::new(PT_AREA_SIZE + data_frames * PAGE_SIZE).unwrap();
        VmSim::new(config)
    }

    fn entry_at(sim: &VmSim, addr: RealAddr) -> PageTableEntry {
        let mut word = [0_u8; 4];
        sim.read_real(&mut word, addr);
        PageTableEntry::from_bits(u32::from_le_bytes(word))
    }

    #[test]
    fn test_cold_touch_builds_the_tables() {
        let mut sim = simulator(3);
        let addr = SimAddr::new(0x0040_1234);
        let real = sim.map(addr, false).unwrap();

        // Exactly one upper-table entry was populated, at the
        // address's upper index.
        for index in 0..memory::ENTRIES_PER_TABLE {
            let entry = entry_at(&sim, entry_address(sim.upper_table(), index));
            assert_eq!(entry.is_empty(), index != 1, "upper index {}", index);
        }

        // The lower entry is resident, pointing at the first
        // data frame, and the translation lands inside it.
        let table = entry_at(&sim, entry_address(sim.upper_table(), 1))
            .as_table()
            .unwrap();
        let entry = entry_at(&sim, entry_address(table, 1));
        let resident = entry.as_resident().unwrap();
        assert_eq!(resident.frame, RealAddr::from_usize(PT_AREA_SIZE));
        assert_eq!(real, resident.frame + 0x234);
    }

    #[test]
    fn test_translation_is_stable() {
        let mut sim = simulator(3);
        let addr = SimAddr::new(0x2abc);
        let first = sim.map(addr, false).unwrap();
        let second = sim.map(addr, true).unwrap();
        assert_eq!(first, second);

        // Addresses in the same page share a frame.
        let sibling = sim.map(SimAddr::new(0x2fff), false).unwrap();
        assert_eq!(sibling, first.align_down_page() + 0xfff);
    }

    #[test]
    fn test_read_access_sets_referenced() {
        let mut sim = simulator(3);
        let addr = SimAddr::new(0x3000);
        sim.map(addr, false).unwrap();

        let table = entry_at(&sim, entry_address(sim.upper_table(), 0))
            .as_table()
            .unwrap();
        let entry = entry_at(&sim, entry_address(table, 3));
        assert!(entry.flags().resident());
        assert!(entry.flags().referenced());
        assert!(!entry.flags().dirty());
    }

    #[test]
    fn test_write_access_sets_dirty() {
        let mut sim = simulator(3);
        let addr = SimAddr::new(0x3000);
        sim.map(addr, true).unwrap();

        let table = entry_at(&sim, entry_address(sim.upper_table(), 0))
            .as_table()
            .unwrap();
        let entry = entry_at(&sim, entry_address(table, 3));
        assert!(entry.flags().resident());
        assert!(entry.flags().referenced());
        assert!(entry.flags().dirty());
    }

    #[test]
    fn test_distinct_pages_get_distinct_frames() {
        let mut sim = simulator(3);
        let first = sim.map(SimAddr::new(0x1000), false).unwrap();
        let second = sim.map(SimAddr::new(0x2000), false).unwrap();
        let third = sim.map(SimAddr::new(0x0040_0000), false).unwrap();

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
        for real in [first, second, third].iter() {
            assert!(real.as_usize() >= PT_AREA_SIZE);
            assert!(real.as_usize() < sim.arena_size());
        }
    }

    #[test]
    fn test_resident_round_trip() {
        let mut sim = simulator(3);

        // More pages than frames, so some of these overflow
        // into the backing store.
        for page in 1..8_u32 {
            sim.map(SimAddr::new(page << 12), true).unwrap();
        }

        for page in 1..8_u32 {
            let addr = SimAddr::new(page << 12);
            let table = entry_at(
                &sim,
                entry_address(sim.upper_table(), addr.upper_index()),
            )
            .as_table()
            .unwrap();
            let pte_addr = entry_address(table, addr.lower_index());
            let entry = entry_at(&sim, pte_addr);

            if let Some(resident) = entry.as_resident() {
                // The resident set points straight back at the
                // entry that owns the frame.
                assert_eq!(sim.frame_owner(resident.frame), Some(pte_addr));
                assert!(resident.frame.as_usize() >= PT_AREA_SIZE);
            } else {
                let non_resident = entry.as_non_resident().unwrap();
                assert!(non_resident.block.as_u32() >= 1);
            }
        }
    }

    #[test]
    fn test_page_tables_exhausted() {
        let mut sim = simulator(1);

        // The table area holds 1023 lower tables; the 1024th
        // upper slot cannot be populated.
        for upper in 0..1023_u32 {
            sim.map(SimAddr::new(upper << 22), false).unwrap();
        }

        let last = SimAddr::new(1023 << 22);
        assert_eq!(sim.map(last, false), Err(crate::Error::PageTablesExhausted));
    }
}
