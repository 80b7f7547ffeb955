// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Simulates a two-level paged virtual memory subsystem.
//!
//! A 32-bit simulated address space is mapped, page by page,
//! onto a byte arena of configurable size. The bottom of the
//! arena holds a two-level tree of page tables; the rest holds
//! data frames. When the data frames run out, the simulator
//! pages the least useful frame out to a backing store, chosen
//! by the CLOCK replacement policy.
//!
//! All state lives in a [`VmSim`] value:
//!
//! - the [`Arena`] of real memory, addressed by [`RealAddr`](memory::RealAddr);
//! - the page-table and data-frame bump cursors;
//! - the two-level page tables, made of [`PageTableEntry`](memory::PageTableEntry) words;
//! - the [`ResidentSet`] back-index from data frames to entries;
//! - the [`ReplacementPolicy`] and the [`BackingStore`];
//! - the monotone block-number counter and the simulated-address cursor.
//!
//! Translation is driven through [`VmSim::map`], which walks
//! the tables, faults missing pages in (allocating tables and
//! frames, or swapping against the backing store) and marks
//! the entry referenced, and dirty for writes. The byte-copy
//! helpers [`VmSim::read`] and [`VmSim::write`] go through the
//! same path.
//!
//! For callers that want the simulator as a process-wide
//! service, the module also provides free functions ([`init`],
//! [`alloc`], [`map`], [`read`], [`write`], and friends) over
//! a lazily-initialised global instance configured from the
//! environment. Errors at that boundary are fatal and abort
//! the process with a diagnostic.
//!
//! # Examples
//!
//! ```
//! vmsim::init();
//! let addr = vmsim::alloc(64);
//! vmsim::write(b"paged out and back", addr);
//!
//! let mut buf = [0_u8; 18];
//! vmsim::read(&mut buf, addr);
//! assert_eq!(&buf, b"paged out and back");
//! ```

#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]

mod arena;
mod bump;
mod clock;
mod config;
mod resident;
mod swap;
mod translate;

pub use crate::arena::Arena;
pub use crate::clock::{ClockPolicy, ReplacementPolicy};
pub use crate::config::{
    Config, ConfigError, DEFAULT_ARENA_SIZE, PT_AREA_SIZE, REAL_MEM_SIZE_VAR,
};
pub use crate::resident::ResidentSet;

use crate::bump::BumpAllocator;
use lazy_static::lazy_static;
use log::debug;
use memory::{BlockNumber, RealAddr, SimAddr, PAGE_SIZE};
use spin::Mutex;
use std::convert::TryFrom;
use storage::{BackingStore, MemoryBackingStore};

/// Describes an error encountered while handling a page
/// fault.
///
/// Every variant is fatal: the simulator defines no recovery,
/// and the global facade aborts the process on any of them.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The page-table sub-arena has no room for another lower
    /// table.
    PageTablesExhausted,

    /// Every block number the page-table entry layout can
    /// carry has been issued.
    BlockSpaceExhausted,

    /// The backing store failed to read or write a block.
    Storage(storage::Error),
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        Error::Storage(err)
    }
}

/// A paged virtual memory simulator.
///
/// The simulator owns every piece of mutable state: the real
/// memory arena, the bump cursors for the two sub-arenas, the
/// upper-table address, the resident set index, the
/// replacement policy, the backing store, the block-number
/// counter, and the simulated-address cursor. It is
/// single-threaded; no operation blocks, and the value can be
/// wrapped in a lock (as the global facade does) for use as a
/// process-wide service.
///
pub struct VmSim {
    arena: Arena,

    // Bump cursors for the two sub-arenas.
    tables: BumpAllocator,
    frames: BumpAllocator,

    // The root of the two-level page table tree.
    upper_table: RealAddr,

    resident: ResidentSet,
    policy: Box<dyn ReplacementPolicy + Send>,
    store: Box<dyn BackingStore + Send>,

    // The next backing store block to issue. Monotone; block
    // zero is never issued.
    next_block: u32,

    // The simulated-address allocator cursor.
    next_sim: SimAddr,
}

impl VmSim {
    /// Creates a simulator with the given configuration, a
    /// [`MemoryBackingStore`], and the [`ClockPolicy`].
    ///
    pub fn new(config: Config) -> Self {
        Self::with_parts(
            config,
            Box::new(MemoryBackingStore::new()),
            Box::new(ClockPolicy::new()),
        )
    }

    /// Creates a simulator with the given configuration,
    /// backing store, and replacement policy.
    ///
    /// The arena is allocated and zero-filled here. The first
    /// page is the reserved null page, the upper table is
    /// pinned to the page above it, and the cursors for lower
    /// tables and data frames start beyond each.
    ///
    pub fn with_parts(
        config: Config,
        store: Box<dyn BackingStore + Send>,
        policy: Box<dyn ReplacementPolicy + Send>,
    ) -> Self {
        let arena = Arena::new(config.arena_size());
        let upper_table = RealAddr::from_usize(PAGE_SIZE);
        let tables = BumpAllocator::new(
            upper_table + PAGE_SIZE,
            RealAddr::from_usize(PT_AREA_SIZE),
        );
        let data_base = RealAddr::from_usize(PT_AREA_SIZE);
        let frames = BumpAllocator::new(data_base, RealAddr::from_usize(config.arena_size()));
        let resident = ResidentSet::new(data_base, config.data_frames());

        debug!(
            "simulator arena is {} bytes with {} data frames",
            config.arena_size(),
            config.data_frames()
        );

        VmSim {
            arena,
            tables,
            frames,
            upper_table,
            resident,
            policy,
            store,
            next_block: BlockNumber::MIN,
            next_sim: SimAddr::new(PAGE_SIZE as u32),
        }
    }

    /// Returns the arena size in bytes.
    ///
    pub fn arena_size(&self) -> usize {
        self.arena.size()
    }

    /// Returns the real address of the upper page table.
    ///
    pub fn upper_table(&self) -> RealAddr {
        self.upper_table
    }

    /// Returns the real address of the lower-table entry that
    /// owns the data frame at `frame`, or `None` if the frame
    /// has never been assigned.
    ///
    /// This is a diagnostic accessor; the entry itself remains
    /// the authority on the mapping.
    ///
    /// # Panics
    ///
    /// `frame_owner` will panic if `frame` is not the
    /// page-aligned address of a data frame.
    ///
    pub fn frame_owner(&self, frame: RealAddr) -> Option<RealAddr> {
        let owner = self.resident.owner(self.resident.slot_of(frame));
        if owner.is_zero() {
            None
        } else {
            Some(owner)
        }
    }

    /// Allocates `size` bytes of simulated address space.
    ///
    /// The simulated-address allocator is a bump allocator
    /// starting at [`PAGE_SIZE`], so the null simulated
    /// address is never returned. Nothing is mapped until the
    /// addresses are touched.
    ///
    /// # Panics
    ///
    /// `alloc` will panic once the 32-bit simulated address
    /// space has been exhausted.
    ///
    pub fn alloc(&mut self, size: usize) -> SimAddr {
        let addr = self.next_sim;
        let size = match u32::try_from(size) {
            Ok(size) => size,
            Err(_) => panic!("simulated address space exhausted"),
        };

        self.next_sim = match addr.checked_add(size) {
            Some(next) => next,
            None => panic!("simulated address space exhausted"),
        };

        addr
    }

    /// Releases simulated address space returned by
    /// [`alloc`](Self::alloc).
    ///
    /// The simulated address space is never reclaimed, so this
    /// does nothing.
    ///
    pub fn free(&mut self, _addr: SimAddr) {}

    /// Copies `buf.len()` bytes from simulated memory at
    /// `addr` into `buf`, faulting the page in if necessary.
    ///
    /// # Panics
    ///
    /// `read` will panic if the transfer would straddle a
    /// page boundary; callers split larger transfers at page
    /// boundaries.
    ///
    pub fn read(&mut self, buf: &mut [u8], addr: SimAddr) -> Result<(), Error> {
        if addr.page_offset() + buf.len() > PAGE_SIZE {
            panic!("simulated read at {:#x} straddles a page boundary", addr);
        }

        let real = self.map(addr, false)?;
        self.arena.read(real, buf);

        Ok(())
    }

    /// Copies `buf` into simulated memory at `addr`, faulting
    /// the page in if necessary and marking it dirty.
    ///
    /// # Panics
    ///
    /// `write` will panic if the transfer would straddle a
    /// page boundary; callers split larger transfers at page
    /// boundaries.
    ///
    pub fn write(&mut self, buf: &[u8], addr: SimAddr) -> Result<(), Error> {
        if addr.page_offset() + buf.len() > PAGE_SIZE {
            panic!("simulated write at {:#x} straddles a page boundary", addr);
        }

        let real = self.map(addr, true)?;
        self.arena.write(real, buf);

        Ok(())
    }

    /// Copies `buf.len()` bytes of real memory at `addr` into
    /// `buf`, without touching the page tables.
    ///
    /// # Panics
    ///
    /// `read_real` will panic if the accessed region does not
    /// lie inside the arena.
    ///
    pub fn read_real(&self, buf: &mut [u8], addr: RealAddr) {
        self.arena.read(addr, buf);
    }

    /// Copies `buf` into real memory at `addr`, without
    /// touching the page tables.
    ///
    /// # Panics
    ///
    /// `write_real` will panic if the accessed region does not
    /// lie inside the arena.
    ///
    pub fn write_real(&mut self, buf: &[u8], addr: RealAddr) {
        self.arena.write(addr, buf);
    }
}

// The process-global simulator.

lazy_static! {
    /// The global simulator instance, configured from the
    /// environment on first use.
    ///
    /// All of the free functions below operate on this
    /// instance. Configuration problems surface as a panic on
    /// first use.
    ///
    static ref VMSIM: Mutex<VmSim> = Mutex::new(VmSim::new(
        Config::from_env().expect("invalid simulator configuration")
    ));
}

/// Initialises the global simulator.
///
/// Initialisation happens at most once; repeated calls, and
/// calls after another entry point has already initialised the
/// simulator, have no effect.
///
pub fn init() {
    let _ = VMSIM.lock();
}

/// Allocates `size` bytes of simulated address space from the
/// global simulator.
///
/// The returned address is never the null simulated address.
///
pub fn alloc(size: usize) -> SimAddr {
    VMSIM.lock().alloc(size)
}

/// Releases simulated address space returned by [`alloc`].
///
/// The simulated address space is never reclaimed, so this
/// does nothing.
///
pub fn free(addr: SimAddr) {
    VMSIM.lock().free(addr)
}

/// Translates `addr` through the global simulator's page
/// tables, faulting the page in if necessary.
///
/// `write` marks the access as a write, which sets the dirty
/// bit alongside the referenced bit.
///
/// # Panics
///
/// A fault that cannot be handled is fatal, so `map` panics
/// with the underlying [`Error`].
///
pub fn map(addr: SimAddr, write: bool) -> RealAddr {
    VMSIM
        .lock()
        .map(addr, write)
        .expect("page fault handling failed")
}

/// Copies simulated memory at `addr` into `buf` through the
/// global simulator.
///
/// The transfer must not straddle a page boundary.
///
/// # Panics
///
/// A fault that cannot be handled is fatal, so `read` panics
/// with the underlying [`Error`].
///
pub fn read(buf: &mut [u8], addr: SimAddr) {
    VMSIM
        .lock()
        .read(buf, addr)
        .expect("page fault handling failed")
}

/// Copies `buf` into simulated memory at `addr` through the
/// global simulator.
///
/// The transfer must not straddle a page boundary.
///
/// # Panics
///
/// A fault that cannot be handled is fatal, so `write` panics
/// with the underlying [`Error`].
///
pub fn write(buf: &[u8], addr: SimAddr) {
    VMSIM
        .lock()
        .write(buf, addr)
        .expect("page fault handling failed")
}

/// Copies real memory at `addr` into `buf`, without touching
/// the page tables.
///
pub fn read_real(buf: &mut [u8], addr: RealAddr) {
    VMSIM.lock().read_real(buf, addr)
}

/// Copies `buf` into real memory at `addr`, without touching
/// the page tables.
///
pub fn write_real(buf: &[u8], addr: RealAddr) {
    VMSIM.lock().write_real(buf, addr)
}

#[cfg(test)]
mod test {
    use super::*;

    fn simulator(data_frames: usize) -> VmSim {
        let config = Config::new(PT_AREA_SIZE + data_frames * PAGE_SIZE).unwrap();
        VmSim::new(config)
    }

    #[test]
    fn test_alloc_is_never_null() {
        let mut sim = simulator(2);
        let first = sim.alloc(PAGE_SIZE);
        assert!(first >= SimAddr::new(PAGE_SIZE as u32));

        let mut previous = first;
        for _ in 0..16 {
            let addr = sim.alloc(24);
            assert!(!addr.is_zero());
            assert!(addr >= previous);
            previous = addr;
        }
    }

    #[test]
    fn test_free_is_a_no_op() {
        let mut sim = simulator(2);
        let addr = sim.alloc(PAGE_SIZE);
        sim.free(addr);

        // The freed range is not recycled.
        let next = sim.alloc(PAGE_SIZE);
        assert!(next >= addr + PAGE_SIZE);
    }

    #[test]
    fn test_read_back_after_write() {
        let mut sim = simulator(2);
        let addr = SimAddr::new(0x5000);
        sim.write(&0xdead_beef_u32.to_le_bytes(), addr).unwrap();

        let mut buf = [0_u8; 4];
        sim.read(&mut buf, addr).unwrap();
        assert_eq!(u32::from_le_bytes(buf), 0xdead_beef);
    }

    #[test]
    fn test_untouched_memory_reads_zero() {
        let mut sim = simulator(2);
        let mut buf = [0xff_u8; 8];
        sim.read(&mut buf, SimAddr::new(0x7008)).unwrap();
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    #[should_panic(expected = "straddles a page boundary")]
    fn test_straddling_write_is_rejected() {
        let mut sim = simulator(2);
        let _ = sim.write(&[0_u8; 8], SimAddr::new(0x1ffc));
    }

    #[test]
    fn test_global_facade() {
        // The global simulator is shared process-wide, so this
        // is the only test that uses it.
        init();
        init();

        let addr = alloc(PAGE_SIZE);
        assert!(addr >= SimAddr::new(PAGE_SIZE as u32));

        write(b"paged", addr);
        let mut buf = [0_u8; 5];
        read(&mut buf, addr);
        assert_eq!(&buf, b"paged");

        let real = map(addr, false);
        let mut buf = [0_u8; 5];
        read_real(&mut buf, real);
        assert_eq!(&buf, b"paged");

        free(addr);
    }
}
