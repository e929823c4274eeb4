/*
 * shardcrypt: threshold-protected encrypted backup containers
 * Copyright (C) 2020-2022 The shardcrypt Authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */


//! Shamir Secret Sharing of a single field element, over either of the two
//! 254-bit prime fields of the BN254 curve.
//!
//! A secret is the constant term of a random polynomial of degree
//! `threshold - 1`, and the shares are that polynomial evaluated at
//! `x = 1, ..., max_shares`. Any `threshold` shares recover the constant term
//! through Lagrange interpolation at zero.
//!
//! ## Security ##
//! **The field arithmetic is provided by arkworks and is not constant time.
//! Reconstruction with fewer than `threshold` shares does not fail, it returns
//! an unrelated field element.**

mod field;
mod share;
mod sharer;

pub use field::{FieldElement, FieldType, ELEMENT_LENGTH};
pub use share::Share;
pub use sharer::Config;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("threshold must be at least one")]
    ZeroThreshold,

    #[error("threshold {threshold} is larger than the number of shares {max_shares}")]
    ThresholdTooLarge { threshold: u32, max_shares: u32 },

    #[error("unknown field type tag {0}")]
    UnknownFieldType(u8),

    #[error("field element must be exactly {ELEMENT_LENGTH} bytes long (got {0})")]
    InvalidElementLength(usize),

    #[error("invalid field element: {0}")]
    InvalidElement(String),

    #[error("field element is in {got:?} but {expected:?} was expected")]
    FieldMismatch { expected: FieldType, got: FieldType },

    #[error("no shares provided")]
    NoShares,

    #[error("share index must be non-zero")]
    ZeroIndex,

    #[error("share index {0} appears more than once")]
    DuplicateIndex(u64),

    #[error("lagrange interpolation failed: repeated x-coordinate")]
    NonInvertiblePoint,

    #[error("failed to parse share: {0}")]
    Wire(#[from] crate::wire::Error),
}

// Copied from <https://github.com/BurntSushi/quickcheck/pull/292/files>.
#[cfg(test)]
pub(crate) fn arbitrary_fill_slice<S, T>(g: &mut quickcheck::Gen, mut slice: S)
where
    T: quickcheck::Arbitrary,
    S: AsMut<[T]>,
{
    slice.as_mut().fill_with(|| T::arbitrary(g))
}
