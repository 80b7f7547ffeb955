// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the backing store that receives evicted pages.
//!
//! The swap controller moves page contents between data frames
//! in the arena and page-sized blocks in a [`BackingStore`].
//! Blocks are named by [`BlockNumber`] and are written exactly
//! once: the controller takes a fresh number for every
//! eviction, so a store never sees the same block rewritten.
//!
//! [`MemoryBackingStore`] is the store used by default, keeping
//! blocks in a growable in-memory table.

#![no_std]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use memory::{BlockNumber, PAGE_SIZE};

/// Describes an error encountered while operating on the
/// backing store.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The buffer passed to the store was not exactly one
    /// page long.
    InvalidBuffer,

    /// A read was attempted of a block that has never been
    /// written.
    UnknownBlock(BlockNumber),
}

/// Represents a store of page-sized blocks, addressed by
/// block number.
///
/// Implementations must return exactly the bytes most
/// recently written to a block. They need not preserve
/// blocks across processes; the simulator never re-reads a
/// block from an earlier run.
///
pub trait BackingStore {
    /// Populates `buf` with the contents of the given block.
    ///
    /// `buf` must be exactly one page long.
    ///
    fn read_block(&mut self, block: BlockNumber, buf: &mut [u8]) -> Result<(), Error>;

    /// Writes the contents of `buf` to the given block.
    ///
    /// `buf` must be exactly one page long.
    ///
    fn write_block(&mut self, block: BlockNumber, buf: &[u8]) -> Result<(), Error>;
}

/// A backing store that keeps its blocks in memory.
///
/// The store grows on demand as blocks are written. Reading
/// a block that has never been written returns
/// [`Error::UnknownBlock`].
///
pub struct MemoryBackingStore {
    // Block n is held at index n - 1; slots for blocks that
    // have never been written hold None.
    blocks: Vec<Option<Box<[u8]>>>,
}

impl MemoryBackingStore {
    /// Returns a new, empty store.
    ///
    pub const fn new() -> Self {
        MemoryBackingStore { blocks: Vec::new() }
    }

    /// Returns the number of blocks that have been written.
    ///
    pub fn len(&self) -> usize {
        self.blocks.iter().filter(|block| block.is_some()).count()
    }

    /// Returns whether no block has ever been written.
    ///
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingStore for MemoryBackingStore {
    fn read_block(&mut self, block: BlockNumber, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() != PAGE_SIZE {
            return Err(Error::InvalidBuffer);
        }

        let index = (block.as_u32() - 1) as usize;
        match self.blocks.get(index) {
            Some(Some(contents)) => {
                buf.copy_from_slice(contents);
                Ok(())
            }
            _ => Err(Error::UnknownBlock(block)),
        }
    }

    fn write_block(&mut self, block: BlockNumber, buf: &[u8]) -> Result<(), Error> {
        if buf.len() != PAGE_SIZE {
            return Err(Error::InvalidBuffer);
        }

        let index = (block.as_u32() - 1) as usize;
        if index >= self.blocks.len() {
            self.blocks.resize(index + 1, None);
        }

        self.blocks[index] = Some(buf.into());
        Ok(())
    }
}
