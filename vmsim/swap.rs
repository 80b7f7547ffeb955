// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Moves pages between data frames and the backing store.
//!
//! The swap controller is the only writer of the backing
//! store and the only code that rewrites an entry from one
//! layout to the other. Every eviction takes a fresh block
//! number from a monotone counter, so a block, once written,
//! is never written again; the prior block of a re-evicted
//! page is simply abandoned.

use crate::{Error, VmSim};
use log::{debug, trace};
use memory::{BlockNumber, PageTableEntry, PteFlags, RealAddr};

impl VmSim {
    /// Returns a zeroed data frame, evicting a victim page if
    /// the data sub-arena has been exhausted.
    ///
    pub(crate) fn allocate_frame(&mut self) -> Result<RealAddr, Error> {
        if let Some(frame) = self.frames.allocate_page() {
            self.arena.zero_page(frame);
            trace!("allocated data frame {:#x}", frame);
            return Ok(frame);
        }

        let victim = self.policy.select_victim(&mut self.arena, &self.resident);
        self.evict(victim)
    }

    /// Pages out the resident entry at `victim`, returning the
    /// freed, zeroed data frame.
    ///
    /// The entry is rewritten in the non-resident layout with
    /// a fresh block number and no flags; in particular the
    /// dirty bit is dropped, so the page's next eviction will
    /// write it out again even if it is never modified.
    ///
    pub(crate) fn evict(&mut self, victim: RealAddr) -> Result<RealAddr, Error> {
        let entry = self.arena.entry_at(victim);
        let frame = match entry.as_resident() {
            Some(resident) => resident.frame,
            None => panic!("eviction victim entry at {:#x} is not resident", victim),
        };

        let block = match BlockNumber::try_new(self.next_block) {
            Ok(block) => block,
            Err(_) => return Err(Error::BlockSpaceExhausted),
        };

        self.store.write_block(block, self.arena.page(frame))?;
        self.arena
            .set_entry_at(victim, PageTableEntry::non_resident(block, PteFlags::empty()));
        self.next_block += 1;
        self.arena.zero_page(frame);

        debug!("paged out frame {:#x} to block {}", frame, block);

        Ok(frame)
    }

    /// Pages the non-resident entry at `target` into the data
    /// frame at `frame`, rewriting the entry in the resident
    /// layout and recording the frame's new owner.
    ///
    pub(crate) fn swap_in(&mut self, target: RealAddr, frame: RealAddr) -> Result<(), Error> {
        let entry = self.arena.entry_at(target);
        let block = match entry.as_non_resident() {
            Some(non_resident) => non_resident.block,
            None => panic!("swap-in target entry at {:#x} is not paged out", target),
        };

        self.store.read_block(block, self.arena.page_mut(frame))?;
        self.arena
            .set_entry_at(target, PageTableEntry::resident(frame, PteFlags::RESIDENT));
        self.resident.record(frame, target);

        debug!("paged in block {} to frame {:#x}", block, frame);

        Ok(())
    }

    /// Evicts the victim chosen by the replacement policy and
    /// pages the entry at `target` into the freed frame.
    ///
    pub(crate) fn swap(&mut self, target: RealAddr) -> Result<(), Error> {
        let victim = self.policy.select_victim(&mut self.arena, &self.resident);
        let frame = self.evict(victim)?;
        self.swap_in(target, frame)
    }
}

#[cfg(test)]
mod test {
    use crate::{Config, VmSim, PT_AREA_SIZE};
    use memory::{entry_address, PageTableEntry, PteFlags, RealAddr, SimAddr, PAGE_SIZE};

    fn simulator(data_frames: usize) -> VmSim {
        let config = Config::new(PT_AREA_SIZE + data_frames * PAGE_SIZE).unwrap();
        VmSim::new(config)
    }

    fn entry_at(sim: &VmSim, addr: RealAddr) -> PageTableEntry {
        let mut word = [0_u8; 4];
        sim.read_real(&mut word, addr);
        PageTableEntry::from_bits(u32::from_le_bytes(word))
    }

    // Returns the lower-table entry for `addr`, whose lower
    // table must already exist.
    fn lower_entry(sim: &VmSim, addr: SimAddr) -> PageTableEntry {
        let upper = entry_at(sim, entry_address(sim.upper_table(), addr.upper_index()));
        let table = upper.as_table().expect("no lower table");
        entry_at(sim, entry_address(table, addr.lower_index()))
    }

    #[test]
    fn test_eviction_rewrites_the_entry() {
        let mut sim = simulator(1);
        let first = SimAddr::new(0x1000);
        let second = SimAddr::new(0x2000);

        sim.write(b"one", first).unwrap();
        assert!(lower_entry(&sim, first).is_resident());

        // The second page forces the only frame to turn over.
        sim.write(b"two", second).unwrap();

        let evicted = lower_entry(&sim, first);
        assert!(!evicted.is_resident());
        let non_resident = evicted.as_non_resident().unwrap();
        assert_eq!(non_resident.block.as_u32(), 1);
        assert_eq!(non_resident.flags, PteFlags::empty());

        assert!(lower_entry(&sim, second).is_resident());
    }

    #[test]
    fn test_block_numbers_are_monotone() {
        let mut sim = simulator(1);
        let pages = [
            SimAddr::new(0x1000),
            SimAddr::new(0x2000),
            SimAddr::new(0x3000),
        ];

        // Cycling three pages through one frame evicts on
        // every touch after the first; each eviction takes a
        // fresh block, even when the page has been paged out
        // before.
        let mut evictions = 0;
        for round in 0..4 {
            for (index, &page) in pages.iter().enumerate() {
                sim.write(&[round as u8 + 1], page).unwrap();
                if round == 0 && index == 0 {
                    continue;
                }

                evictions += 1;
                let top = pages
                    .iter()
                    .filter_map(|&page| lower_entry(&sim, page).as_non_resident())
                    .map(|entry| entry.block.as_u32())
                    .max()
                    .unwrap();
                assert_eq!(top, evictions);
            }
        }

        assert_eq!(evictions, 11);
    }

    #[test]
    fn test_contents_survive_eviction() {
        let mut sim = simulator(1);
        let first = SimAddr::new(0x1000);
        let second = SimAddr::new(0x2000);

        sim.write(b"kept across a swap", first).unwrap();
        sim.write(b"evicts the other", second).unwrap();

        let mut buf = [0_u8; 18];
        sim.read(&mut buf, first).unwrap();
        assert_eq!(&buf, b"kept across a swap");
    }
}
