// Copyright 2023 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use core::fmt;

/// The identity of one page-sized blob in the backing store.
///
/// Block numbers are issued by the swap controller, starting
/// at [`BlockNumber::MIN`] and strictly increasing. Number
/// zero is reserved to mean "never written", so it can never
/// name a block, and the largest representable number is
/// bounded by the 14 bits the non-resident page-table entry
/// layout can carry.
///
#[repr(transparent)]
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlockNumber(u32);

/// An invalid block number.
///
/// If an attempt is made to create a `BlockNumber` from a value
/// outside the encodable range, then `InvalidBlockNumber` is
/// returned, containing the attempted value.
///
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InvalidBlockNumber(pub u32);

impl BlockNumber {
    /// The smallest valid block number.
    ///
    pub const MIN: u32 = 1;

    /// The largest valid block number.
    ///
    pub const MAX: u32 = (1 << 14) - 1;

    /// Creates a new block number.
    ///
    /// # Panics
    ///
    /// `new` will panic if `block` is outside the encodable
    /// range.
    ///
    #[inline]
    #[track_caller]
    pub const fn new(block: u32) -> Self {
        match Self::try_new(block) {
            Ok(block) => block,
            Err(_) => panic!("invalid value passed to BlockNumber::new"),
        }
    }

    /// Tries to create a new block number.
    ///
    /// If the passed value is zero, or too large for the
    /// non-resident page-table entry layout, then an error is
    /// returned.
    ///
    #[inline]
    pub const fn try_new(block: u32) -> Result<Self, InvalidBlockNumber> {
        if block >= Self::MIN && block <= Self::MAX {
            Ok(BlockNumber(block))
        } else {
            Err(InvalidBlockNumber(block))
        }
    }

    /// Returns the block number's numerical value.
    ///
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

// Formatting.

impl fmt::Debug for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("BlockNumber").field(&self.0).finish()
    }
}

impl fmt::Display for BlockNumber {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encodable_range() {
        assert_eq!(BlockNumber::try_new(0), Err(InvalidBlockNumber(0)));
        assert_eq!(BlockNumber::try_new(1), Ok(BlockNumber::new(1)));
        assert_eq!(
            BlockNumber::try_new(BlockNumber::MAX),
            Ok(BlockNumber::new(BlockNumber::MAX))
        );
        assert_eq!(
            BlockNumber::try_new(BlockNumber::MAX + 1),
            Err(InvalidBlockNumber(BlockNumber::MAX + 1))
        );
    }

    #[test]
    fn test_value() {
        assert_eq!(BlockNumber::new(7).as_u32(), 7_u32);
    }
}
