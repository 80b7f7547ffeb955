// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use crate::PAGE_SIZE;
use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// A real memory address.
///
/// A real address is a byte offset into the arena that backs
/// the simulation, so its meaning is private to one simulator
/// instance. Address zero is reserved as the null real address:
/// neither allocator ever produces it, which lets a zero value
/// stand for "no address" in the page tables and the resident
/// set index.
///
#[repr(transparent)]
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RealAddr(u32);

impl RealAddr {
    /// Creates a new real memory address.
    ///
    #[inline]
    pub const fn new(addr: u32) -> Self {
        RealAddr(addr)
    }

    /// Creates a new real memory address from a byte offset.
    ///
    /// # Panics
    ///
    /// `from_usize` will panic if `addr` does not fit in the
    /// 32-bit real address space.
    ///
    #[inline]
    #[track_caller]
    pub const fn from_usize(addr: usize) -> Self {
        if addr > u32::MAX as usize {
            panic!("invalid address passed to RealAddr::from_usize");
        }

        RealAddr(addr as u32)
    }

    /// Returns the address's numerical value.
    ///
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the address as a byte offset into the arena.
    ///
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    // Special handling for the null address.

    /// Returns the zero real memory address.
    ///
    #[inline]
    pub const fn zero() -> Self {
        RealAddr(0)
    }

    /// Returns whether this is the zero address.
    ///
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    // Alignment.

    /// Checks whether the address is the first byte of a page.
    ///
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE as u32 - 1) == 0
    }

    /// Aligns the address downwards to the start of its page.
    ///
    #[inline]
    #[must_use]
    pub const fn align_down_page(self) -> Self {
        RealAddr(self.0 & !(PAGE_SIZE as u32 - 1))
    }

    // Overflow-safe mathematical operations.

    /// Checked integer addition. Computes `self + rhs`,
    /// returning `None` if the result does not fit in the
    /// 32-bit real address space.
    ///
    #[inline]
    pub const fn checked_add(self, rhs: usize) -> Option<Self> {
        if rhs > u32::MAX as usize {
            return None;
        }

        match self.0.checked_add(rhs as u32) {
            Some(sum) => Some(RealAddr(sum)),
            None => None,
        }
    }

    /// Checked integer subtraction. Computes `self - rhs`,
    /// returning `None` if overflow occurred.
    ///
    #[inline]
    pub const fn checked_sub(self, rhs: usize) -> Option<Self> {
        if rhs > u32::MAX as usize {
            return None;
        }

        match self.0.checked_sub(rhs as u32) {
            Some(diff) => Some(RealAddr(diff)),
            None => None,
        }
    }
}

// Formatting.

impl fmt::Binary for RealAddr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

impl fmt::Debug for RealAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("RealAddr")
            .field(&format_args!("{:#x}", self.0))
            .finish()
    }
}

impl fmt::LowerHex for RealAddr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Octal for RealAddr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Octal::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for RealAddr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

// Mathematical operators.

impl Add<usize> for RealAddr {
    type Output = Self;

    #[inline]
    #[track_caller]
    fn add(self, rhs: usize) -> Self::Output {
        match self.checked_add(rhs) {
            Some(sum) => sum,
            None => panic!("real address overflow"),
        }
    }
}

impl AddAssign<usize> for RealAddr {
    #[inline]
    #[track_caller]
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl Sub<usize> for RealAddr {
    type Output = Self;

    #[inline]
    #[track_caller]
    fn sub(self, rhs: usize) -> Self::Output {
        match self.checked_sub(rhs) {
            Some(diff) => diff,
            None => panic!("real address underflow"),
        }
    }
}

impl SubAssign<usize> for RealAddr {
    #[inline]
    #[track_caller]
    fn sub_assign(&mut self, rhs: usize) {
        *self = *self - rhs;
    }
}

impl Sub<RealAddr> for RealAddr {
    type Output = usize;

    #[inline]
    #[track_caller]
    fn sub(self, rhs: RealAddr) -> Self::Output {
        self.0.checked_sub(rhs.0).unwrap() as usize
    }
}
