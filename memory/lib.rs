// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Contains the core types for representing simulated and real memory.
//!
//! This crate provides the value types shared by the rest of the
//! simulator. From most basic to most sophisticated:
//!
//! - [`SimAddr`]: An address in the 32-bit simulated address space.
//! - [`RealAddr`]: A byte offset into the real memory arena.
//! - [`BlockNumber`]: The identity of one page-sized blob in the backing store.
//! - [`PteFlags`]: The flag bits carried by a page-table entry.
//! - [`PageTableEntry`]: A bit-packed entry in a two-level page table.
//!
//! A simulated address is partitioned into an upper-table index, a
//! lower-table index, and a byte offset into one page:
//!
//! | Bits    | Field         | Accessor                    |
//! | ------- | ------------- | --------------------------- |
//! | 22 - 31 | upper index   | [`SimAddr::upper_index`]    |
//! | 12 - 21 | lower index   | [`SimAddr::lower_index`]    |
//! |  0 - 11 | page offset   | [`SimAddr::page_offset`]    |
//!
//! A [`PageTableEntry`] is a tagged word: the [`RESIDENT`](PteFlags::RESIDENT)
//! bit selects between a frame address payload and a block number
//! payload. See [`page_table`](PageTableEntry) for the exact layouts.

#![no_std]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]

mod block;
mod page_table;
mod real_addr;
mod sim_addr;

pub use block::{BlockNumber, InvalidBlockNumber};
pub use page_table::{
    entry_address, NonResidentEntry, PageTableEntry, PteFlags, ResidentEntry, ENTRIES_PER_TABLE,
    ENTRY_BYTES, TABLE_BYTES,
};
pub use real_addr::RealAddr;
pub use sim_addr::SimAddr;

/// The number of bytes in one page of simulated memory, and
/// likewise in one frame of real memory.
///
pub const PAGE_SIZE: usize = 4096;
