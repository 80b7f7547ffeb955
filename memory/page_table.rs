// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use crate::{BlockNumber, RealAddr, PAGE_SIZE};
use bitflags::bitflags;
use core::fmt;
use static_assertions::const_assert_eq;

/// The number of bytes in a single page-table entry.
///
pub const ENTRY_BYTES: usize = 4;

/// The number of entries in a page table.
///
pub const ENTRIES_PER_TABLE: usize = 1024;

/// The number of bytes in a page table.
///
pub const TABLE_BYTES: usize = ENTRIES_PER_TABLE * ENTRY_BYTES;

// A page table fills one page exactly, so tables can be
// handed out by the page-granular table allocator.
const_assert_eq!(TABLE_BYTES, PAGE_SIZE);

// The flag bits in the resident layout span exactly the page
// offset, so a page-aligned frame address and the flags cannot
// collide.
const_assert_eq!(FLAGS_MASK as usize, PAGE_SIZE - 1);

// The flag bits occupy the low 12 bits of a resident entry,
// leaving the rest for the page-aligned frame address.
//
const FLAGS_MASK: u32 = 0xfff;

// The frame address bits of a resident entry.
//
const FRAME_MASK: u32 = !FLAGS_MASK;

// The block number of a non-resident entry occupies bits
// 10 to 23 inclusive.
//
const BLOCK_SHIFT: u32 = 10;
const BLOCK_MASK: u32 = (BlockNumber::MAX) << BLOCK_SHIFT;

bitflags! {
    /// The flags in a page-table entry.
    ///
    pub struct PteFlags: u32 {
        /// Indicates that the entry's payload is the real
        /// address of a data frame. If unset on a non-empty
        /// entry, the payload is a backing store block number.
        const RESIDENT = 1 << 0;

        /// Indicates that the page has been accessed since
        /// this bit was last cleared by the replacement
        /// engine.
        const REFERENCED = 1 << 1;

        /// Indicates that the page has been written since it
        /// became resident.
        const DIRTY = 1 << 2;
    }
}

impl PteFlags {
    /// Returns whether the `RESIDENT` flag is set.
    ///
    pub const fn resident(&self) -> bool {
        self.contains(Self::RESIDENT)
    }

    /// Returns whether the `REFERENCED` flag is set.
    ///
    pub const fn referenced(&self) -> bool {
        self.contains(Self::REFERENCED)
    }

    /// Returns whether the `DIRTY` flag is set.
    ///
    pub const fn dirty(&self) -> bool {
        self.contains(Self::DIRTY)
    }
}

/// Represents a single entry in a page table.
///
/// An entry is a bit-packed 32-bit word with two mutually
/// exclusive payload layouts, selected by the
/// [`RESIDENT`](PteFlags::RESIDENT) flag:
///
/// | Layout       | Bits 12 - 31      | Bits 10 - 23   | Bits 0 - 11 / 0 - 9 |
/// | ------------ | ----------------- | -------------- | ------------------- |
/// | Resident     | frame address     | —              | flags (12 bits)     |
/// | Non-resident | —                 | block number   | flags (10 bits)     |
///
/// A word of zero is the empty entry: the page has never been
/// touched. Entries in the upper table use a fourth, simpler
/// form: the bare, page-aligned real address of a lower table,
/// read back with [`as_table`](Self::as_table).
///
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    /// Returns the empty page-table entry.
    ///
    #[inline]
    pub const fn empty() -> Self {
        PageTableEntry(0)
    }

    /// Returns a new entry in the resident layout, pointing
    /// at the data frame starting at `frame`.
    ///
    /// The [`RESIDENT`](PteFlags::RESIDENT) flag is set
    /// whether or not it is present in `flags`.
    ///
    /// # Panics
    ///
    /// `resident` will panic if `frame` is not page-aligned,
    /// or if it is the null real address.
    ///
    #[inline]
    #[track_caller]
    pub const fn resident(frame: RealAddr, flags: PteFlags) -> Self {
        if !frame.is_page_aligned() || frame.is_zero() {
            panic!("invalid frame address passed to PageTableEntry::resident");
        }

        PageTableEntry(frame.as_u32() | flags.bits() | PteFlags::RESIDENT.bits())
    }

    /// Returns a new entry in the non-resident layout,
    /// recording that the page's contents live in `block`.
    ///
    /// # Panics
    ///
    /// `non_resident` will panic if `flags` contains
    /// [`RESIDENT`](PteFlags::RESIDENT), or any flag outside
    /// the 10 bits the non-resident layout can carry.
    ///
    #[inline]
    #[track_caller]
    pub const fn non_resident(block: BlockNumber, flags: PteFlags) -> Self {
        if flags.bits() >= (1 << BLOCK_SHIFT) || flags.resident() {
            panic!("invalid flags passed to PageTableEntry::non_resident");
        }

        PageTableEntry((block.as_u32() << BLOCK_SHIFT) | flags.bits())
    }

    /// Returns a new upper-table entry, storing the bare real
    /// address of a lower table.
    ///
    /// # Panics
    ///
    /// `table` will panic if `addr` is not page-aligned, or if
    /// it is the null real address.
    ///
    #[inline]
    #[track_caller]
    pub const fn table(addr: RealAddr) -> Self {
        if !addr.is_page_aligned() || addr.is_zero() {
            panic!("invalid table address passed to PageTableEntry::table");
        }

        PageTableEntry(addr.as_u32())
    }

    /// Creates an entry from its in-memory representation.
    ///
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        PageTableEntry(bits)
    }

    /// Returns the entry's in-memory representation.
    ///
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns whether the entry is empty.
    ///
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns whether the entry is in the resident layout.
    ///
    #[inline]
    pub const fn is_resident(self) -> bool {
        self.flags().resident()
    }

    /// Returns the flags for this entry.
    ///
    #[inline]
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Returns the entry's structured view in the resident
    /// layout, or `None` if the entry is not resident.
    ///
    #[inline]
    pub fn as_resident(self) -> Option<ResidentEntry> {
        if !self.is_resident() {
            return None;
        }

        Some(ResidentEntry {
            frame: RealAddr::new(self.0 & FRAME_MASK),
            flags: self.flags(),
        })
    }

    /// Returns the entry's structured view in the non-resident
    /// layout, or `None` if the entry is empty or resident.
    ///
    #[inline]
    pub fn as_non_resident(self) -> Option<NonResidentEntry> {
        if self.is_empty() || self.is_resident() {
            return None;
        }

        let block = (self.0 & BLOCK_MASK) >> BLOCK_SHIFT;
        match BlockNumber::try_new(block) {
            Ok(block) => Some(NonResidentEntry {
                block,
                flags: self.flags(),
            }),
            Err(_) => None,
        }
    }

    /// Interprets an upper-table entry, returning the real
    /// address of the lower table it refers to, or `None` if
    /// the entry is empty.
    ///
    #[inline]
    pub fn as_table(self) -> Option<RealAddr> {
        if self.is_empty() {
            None
        } else {
            Some(RealAddr::new(self.0))
        }
    }

    /// Returns a copy of this resident entry with its flag
    /// bits replaced by `flags`, leaving the frame address
    /// untouched.
    ///
    #[inline]
    #[must_use]
    pub const fn with_flags(self, flags: PteFlags) -> Self {
        PageTableEntry((self.0 & FRAME_MASK) | flags.bits())
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("PageTableEntry")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

/// The structured view of a [`PageTableEntry`] in the resident
/// layout.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResidentEntry {
    /// The real address of the data frame holding the page.
    pub frame: RealAddr,
    /// The entry's flags.
    pub flags: PteFlags,
}

/// The structured view of a [`PageTableEntry`] in the
/// non-resident layout.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NonResidentEntry {
    /// The backing store block holding the page's contents.
    pub block: BlockNumber,
    /// The entry's flags.
    pub flags: PteFlags,
}

/// Returns the real address of the entry at `index` in the
/// page table starting at `table`.
///
/// # Panics
///
/// `entry_address` will panic if `index` is not smaller than
/// [`ENTRIES_PER_TABLE`].
///
#[inline]
#[track_caller]
pub fn entry_address(table: RealAddr, index: usize) -> RealAddr {
    if index >= ENTRIES_PER_TABLE {
        panic!("invalid index passed to entry_address");
    }

    table + index * ENTRY_BYTES
}
