// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Contains constants describing the real memory layout, and
//! the simulator's runtime configuration.
//!
//! The arena is split into two sub-arenas at [`PT_AREA_SIZE`]:
//!
//! | Region          |      Start address |       Last address | Contents                         |
//! | --------------- | -----------------: | -----------------: | -------------------------------- |
//! | null page       |              `0x0` |            `0xfff` | reserved, never allocated        |
//! | page-table area |           `0x1000` |         `0x400fff` | upper table, then lower tables   |
//! | data area       |         `0x401000` | `arena_size - 1`   | data frames                      |
//!
//! The arena size defaults to [`DEFAULT_ARENA_SIZE`] and can be
//! overridden through the [`REAL_MEM_SIZE_VAR`] environment
//! variable, holding a size in decimal bytes. The size must be
//! a multiple of the page size and large enough to leave at
//! least one data frame after the page-table area.

use memory::{ENTRIES_PER_TABLE, PAGE_SIZE};
use std::env;

/// The number of bytes reserved for page tables at the bottom
/// of the arena. The first page is the reserved null page, the
/// second holds the upper table, and the remainder hold lower
/// tables as they are created.
///
pub const PT_AREA_SIZE: usize = (1 + ENTRIES_PER_TABLE) * PAGE_SIZE;

/// The default arena size: the page-table area plus three data
/// frames (4 MiB + 16 KiB).
///
pub const DEFAULT_ARENA_SIZE: usize = PT_AREA_SIZE + 3 * PAGE_SIZE;

/// The environment variable consulted by [`Config::from_env`]
/// for the arena size, in decimal bytes.
///
pub const REAL_MEM_SIZE_VAR: &str = "VMSIM_REAL_MEM_SIZE";

/// Describes an invalid simulator configuration.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The configured arena size was not a decimal integer.
    /// The rejected text is included.
    NotANumber(String),

    /// The configured arena size leaves no room for data
    /// frames after the page-table area. The rejected size is
    /// included.
    TooSmall(usize),

    /// The configured arena size is not a multiple of the
    /// page size. The rejected size is included.
    Misaligned(usize),

    /// The configured arena size does not fit in the 32-bit
    /// real address space. The rejected size is included.
    TooLarge(usize),
}

/// The simulator's runtime configuration.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    arena_size: usize,
}

impl Config {
    /// Returns a configuration with the given arena size.
    ///
    /// The size must be a multiple of the page size and must
    /// exceed the page-table area, so that the data sub-arena
    /// holds at least one frame.
    ///
    pub fn new(arena_size: usize) -> Result<Self, ConfigError> {
        if arena_size % PAGE_SIZE != 0 {
            Err(ConfigError::Misaligned(arena_size))
        } else if arena_size <= PT_AREA_SIZE {
            Err(ConfigError::TooSmall(arena_size))
        } else if arena_size > u32::MAX as usize {
            Err(ConfigError::TooLarge(arena_size))
        } else {
            Ok(Config { arena_size })
        }
    }

    /// Returns the configuration described by the process
    /// environment, falling back to [`DEFAULT_ARENA_SIZE`] if
    /// [`REAL_MEM_SIZE_VAR`] is unset.
    ///
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(REAL_MEM_SIZE_VAR) {
            Ok(text) => Self::parse(&text),
            Err(env::VarError::NotPresent) => Ok(Config {
                arena_size: DEFAULT_ARENA_SIZE,
            }),
            Err(env::VarError::NotUnicode(text)) => {
                Err(ConfigError::NotANumber(text.to_string_lossy().into_owned()))
            }
        }
    }

    /// Parses an arena size in decimal bytes.
    ///
    fn parse(text: &str) -> Result<Self, ConfigError> {
        match text.trim().parse::<usize>() {
            Ok(arena_size) => Self::new(arena_size),
            Err(_) => Err(ConfigError::NotANumber(text.into())),
        }
    }

    /// Returns the arena size in bytes.
    ///
    pub const fn arena_size(&self) -> usize {
        self.arena_size
    }

    /// Returns the number of data frames the arena holds.
    ///
    pub const fn data_frames(&self) -> usize {
        (self.arena_size - PT_AREA_SIZE) / PAGE_SIZE
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            arena_size: DEFAULT_ARENA_SIZE,
        }
    }
}
