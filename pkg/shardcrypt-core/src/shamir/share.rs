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

use crate::{
    shamir::{
        field::{FieldElement, FieldType, ELEMENT_LENGTH},
        Error,
    },
    wire::{Error as WireError, FromWire, ToWire},
};

use multihash::Multihash;
use multihash_codetable::{Code, MultihashDigest};
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

const CHECKSUM_ALGORITHM: Code = Code::Sha2_256;
const CHECKSUM_MULTIBASE: multibase::Base = multibase::Base::Base32Z;

/// Piece of a secret which has been sharded with [Shamir Secret Sharing][sss].
///
/// A share is the point `(index, p(index))` on the secret-bearing polynomial
/// `p`. Its wire form is always [`Share::WIRE_LENGTH`] bytes: the index as a
/// little-endian `u64`, the canonical encoding of the value, and the field
/// type tag.
///
/// [sss]: https://en.wikipedia.org/wiki/Shamir%27s_Secret_Sharing
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Share {
    pub(super) index: u64,
    pub(super) value: FieldElement,
}

impl Share {
    pub const WIRE_LENGTH: usize = 8 + ELEMENT_LENGTH + 1;

    pub fn new(index: u64, value: FieldElement) -> Self {
        Self { index, value }
    }

    /// The x-coordinate of this share. Valid shares have an index of at least
    /// one.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn value(&self) -> &FieldElement {
        &self.value
    }

    pub fn field_type(&self) -> FieldType {
        self.value.field_type()
    }

    /// Returns the identifier for a given `Share`.
    ///
    /// If two shares have the same identifier, they cannot be used together for
    /// secret recovery.
    pub fn id(&self) -> String {
        multibase::encode(CHECKSUM_MULTIBASE, self.index.to_le_bytes())
    }

    /// Hash of the wire form of the share, which custodians can compare
    /// against the value printed when the share was handed out.
    pub fn checksum(&self) -> Multihash<64> {
        CHECKSUM_ALGORITHM.digest(&self.to_wire())
    }

    pub fn checksum_string(&self) -> String {
        multibase::encode(CHECKSUM_MULTIBASE, self.checksum().to_bytes())
    }
}

impl ToWire for Share {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::WIRE_LENGTH);

        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.value.to_bytes());
        bytes.push(self.value.field_type().tag());

        bytes
    }
}

impl FromWire for Share {
    type Error = Error;

    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Self::Error> {
        use nom::{bytes::complete::take, number::complete, sequence::tuple, IResult};

        fn parse(input: &[u8]) -> IResult<&[u8], (u64, &[u8], u8)> {
            tuple((complete::le_u64, take(ELEMENT_LENGTH), complete::u8))(input)
        }

        let (remain, (index, value, tag)) =
            parse(input).map_err(|err| WireError::from_nom(input, err))?;

        let field_type = FieldType::from_tag(tag)?;
        let value = FieldElement::from_bytes(field_type, value)?;

        Ok((remain, Share { index, value }))
    }
}

// Shares travel through serde as their wire form, as a byte string.
impl Serialize for Share {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for Share {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ShareVisitor;

        impl<'de> Visitor<'de> for ShareVisitor {
            type Value = Share;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "a {} byte share", Share::WIRE_LENGTH)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Share, E> {
                Share::from_wire(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_bytes(ShareVisitor)
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Share {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self {
            index: <u64 as quickcheck::Arbitrary>::arbitrary(g),
            value: <FieldElement as quickcheck::Arbitrary>::arbitrary(g),
        }
    }
}
