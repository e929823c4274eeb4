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
    filecrypt::{Error, FORMAT_VERSION},
    wire::{Error as WireError, FromWire, ToWire},
};

/// Length of every encryption header.
pub const HEADER_LENGTH: usize = 16;

const OFFSET_VERSION: u64 = 0;
const OFFSET_POSITION: u64 = 1;
const OFFSET_ALGORITHM: u64 = 2;
const OFFSET_BLOCK_SIZE: u64 = 3;
const OFFSET_NONCE_SIZE: u64 = 4;
const OFFSET_LAST_BLOCK_SIZE: u64 = 5;
const OFFSET_RESERVED: u64 = 6;
const OFFSET_BLOCK_COUNT: u64 = 8;

/// Where a block sits in the chain of blocks making up a container.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Position {
    /// First block of a chain with more than one block.
    First = 0,
    Middle = 1,
    /// Final block of a chain with more than one block.
    Last = 2,
    /// The only block in the container.
    Single = 3,
}

impl Position {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_tag(tag: u8, offset: u64) -> Result<Self, Error> {
        match tag {
            0 => Ok(Self::First),
            1 => Ok(Self::Middle),
            2 => Ok(Self::Last),
            3 => Ok(Self::Single),
            _ => Err(Error::UnknownPosition { offset, tag }),
        }
    }

    /// Whether this position is valid for the first block of a container.
    pub fn opens(self) -> bool {
        matches!(self, Self::First | Self::Single)
    }

    /// Whether decoding stops after a block in this position.
    pub fn closes(self) -> bool {
        matches!(self, Self::Last | Self::Single)
    }

    /// The position of block `index` (zero-based) in a chain of `count`
    /// blocks.
    pub fn for_index(index: usize, count: usize) -> Self {
        match (index, count) {
            (_, 1) => Self::Single,
            (0, _) => Self::First,
            (i, n) if i + 1 == n => Self::Last,
            _ => Self::Middle,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Algorithm {
    Clear = 0,
    /// AES-GCM, with AES-128 or AES-256 picked by the key length.
    Aead = 1,
    /// RSA-OAEP with SHA-256.
    PublicKey = 2,
    /// Only a SHA-256 digest of the payload is stored.
    DigestOnly = 3,
}

impl Algorithm {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_tag(tag: u8, offset: u64) -> Result<Self, Error> {
        match tag {
            0 => Ok(Self::Clear),
            1 => Ok(Self::Aead),
            2 => Ok(Self::PublicKey),
            3 => Ok(Self::DigestOnly),
            _ => Err(Error::UnknownAlgorithm { offset, tag }),
        }
    }

    fn accepts(self, block_size: BlockSize) -> bool {
        use BlockSize::*;

        match self {
            Self::Clear | Self::Aead => matches!(block_size, Bits128 | Bits256),
            Self::PublicKey => matches!(block_size, Bits2048 | Bits4096),
            Self::DigestOnly => block_size == Bits256,
        }
    }

    /// Nonce length written for this algorithm.
    pub(crate) fn nonce_size(self) -> u8 {
        match self {
            Self::Aead => crate::filecrypt::cipher::AEAD_NONCE_LENGTH as u8,
            _ => 0,
        }
    }
}

/// Granularity that block bodies are measured in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockSize {
    Bits128 = 0,
    Bits256 = 1,
    Bits2048 = 2,
    Bits4096 = 3,
}

impl BlockSize {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_tag(tag: u8, offset: u64) -> Result<Self, Error> {
        match tag {
            0 => Ok(Self::Bits128),
            1 => Ok(Self::Bits256),
            2 => Ok(Self::Bits2048),
            3 => Ok(Self::Bits4096),
            _ => Err(Error::UnknownBlockSize { offset, tag }),
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::Bits128 => 16,
            Self::Bits256 => 32,
            Self::Bits2048 => 256,
            Self::Bits4096 => 512,
        }
    }

    /// The block size matching an RSA modulus of `bytes` bytes.
    pub fn from_modulus_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            256 => Some(Self::Bits2048),
            512 => Some(Self::Bits4096),
            _ => None,
        }
    }
}

/// Per-block header describing how the body that follows it is encoded and
/// how long it is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionHeader {
    position: Position,
    algorithm: Algorithm,
    block_size: BlockSize,
    nonce_size: u8,
    last_block_size: u8,
    block_count: u64,
}

impl EncryptionHeader {
    /// Create a header for a block that has not been encrypted yet. The length
    /// fields are filled in by the encoder.
    pub fn new(
        algorithm: Algorithm,
        position: Position,
        block_size: BlockSize,
    ) -> Result<Self, Error> {
        if !algorithm.accepts(block_size) {
            return Err(Error::InvalidConfig(format!(
                "{:?} blocks cannot use block size {:?}",
                algorithm, block_size
            )));
        }
        Ok(Self {
            position,
            algorithm,
            block_size,
            nonce_size: algorithm.nonce_size(),
            last_block_size: 0,
            block_count: 0,
        })
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    pub fn nonce_size(&self) -> u8 {
        self.nonce_size
    }

    /// Number of bytes of cleartext in the final (partial) block, zero if the
    /// body is a whole number of blocks.
    pub fn last_block_size(&self) -> u8 {
        self.last_block_size
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Number of zero bytes written after the nonce, so that the ciphertext
    /// starts on a block boundary.
    pub fn nonce_padding(&self) -> usize {
        let bsize = self.block_size.bytes();
        let nonce = self.nonce_size as usize;
        (nonce + bsize - 1) / bsize * bsize - nonce
    }

    /// Record the length of the body that follows this header.
    pub(crate) fn set_body_length(&mut self, length: usize) -> Result<(), Error> {
        let bsize = self.block_size.bytes();
        let last = length % bsize;
        self.last_block_size = u8::try_from(last).map_err(|_| {
            Error::InvalidConfig(format!(
                "final block of {} bytes does not fit in the header",
                last
            ))
        })?;
        self.block_count = ((length + bsize - 1) / bsize) as u64;
        Ok(())
    }

    /// Length of the body declared by this header.
    pub fn body_length(&self) -> Result<u64, Error> {
        let bsize = self.block_size.bytes() as u64;
        let full = self.block_count.checked_mul(bsize).ok_or_else(|| {
            Error::MalformedHeader {
                offset: OFFSET_BLOCK_COUNT,
                reason: format!("block count {} overflows", self.block_count),
            }
        })?;
        Ok(match self.last_block_size {
            0 => full,
            last => full - (bsize - u64::from(last)),
        })
    }
}

impl ToWire for EncryptionHeader {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LENGTH);

        bytes.push(FORMAT_VERSION);
        bytes.push(self.position.tag());
        bytes.push(self.algorithm.tag());
        bytes.push(self.block_size.tag());
        bytes.push(self.nonce_size);
        bytes.push(self.last_block_size);
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&self.block_count.to_le_bytes());

        bytes
    }
}

impl FromWire for EncryptionHeader {
    type Error = Error;

    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Self::Error> {
        use nom::{
            bytes::complete::take,
            number::complete::{le_u64, u8 as take_u8},
            sequence::tuple,
            IResult,
        };

        type Fields<'a> = (u8, u8, u8, u8, u8, u8, &'a [u8], u64);

        fn parse(input: &[u8]) -> IResult<&[u8], Fields<'_>> {
            tuple((
                take_u8, take_u8, take_u8, take_u8, take_u8, take_u8, take(2usize), le_u64,
            ))(input)
        }

        let (rest, (version, position, algorithm, block_size, nonce_size, last, reserved, count)) =
            parse(input).map_err(|err| WireError::from_nom(input, err))?;

        if version != FORMAT_VERSION {
            return Err(Error::UnknownVersion {
                offset: OFFSET_VERSION,
                version,
            });
        }
        let position = Position::from_tag(position, OFFSET_POSITION)?;
        let algorithm = Algorithm::from_tag(algorithm, OFFSET_ALGORITHM)?;
        let block_size = BlockSize::from_tag(block_size, OFFSET_BLOCK_SIZE)?;

        if !algorithm.accepts(block_size) {
            return Err(Error::MalformedHeader {
                offset: OFFSET_BLOCK_SIZE,
                reason: format!(
                    "{:?} blocks cannot use block size {:?}",
                    algorithm, block_size
                ),
            });
        }
        if nonce_size != algorithm.nonce_size() {
            return Err(Error::MalformedHeader {
                offset: OFFSET_NONCE_SIZE,
                reason: format!(
                    "{:?} blocks use a {} byte nonce (got {})",
                    algorithm,
                    algorithm.nonce_size(),
                    nonce_size
                ),
            });
        }
        if last as usize >= block_size.bytes() {
            return Err(Error::MalformedHeader {
                offset: OFFSET_LAST_BLOCK_SIZE,
                reason: format!(
                    "final block size {} is not smaller than the block size",
                    last
                ),
            });
        }
        if reserved != [0, 0] {
            return Err(Error::MalformedHeader {
                offset: OFFSET_RESERVED,
                reason: "reserved bytes are not zero".into(),
            });
        }

        let header = Self {
            position,
            algorithm,
            block_size,
            nonce_size,
            last_block_size: last,
            block_count: count,
        };
        header.body_length()?;

        Ok((rest, header))
    }
}
