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

use rand::{rngs::OsRng, CryptoRng, RngCore};
use zeroize::Zeroizing;

/// Length of the fixed prefix (version, algorithm) shared by all key headers.
pub(crate) const KEY_PREFIX_LENGTH: usize = 2;
/// Length of a PBKDF2 key header, not counting the salt.
pub(crate) const PBKDF2_FIXED_LENGTH: usize = 10;

pub const PBKDF2_MAX_ITERATIONS: u32 = 100_000;
pub const PBKDF2_MAX_OUTPUT_LENGTH: u8 = 128;
pub const PBKDF2_MAX_SALT_LENGTH: u8 = 128;

const OFFSET_VERSION: u64 = 0;
const OFFSET_ALGORITHM: u64 = 1;
const OFFSET_HEADER_LENGTH: u64 = 2;
const OFFSET_HASH: u64 = 3;
const OFFSET_ITERATIONS: u64 = 4;
const OFFSET_OUTPUT_LENGTH: u64 = 8;
const OFFSET_SALT_LENGTH: u64 = 9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyAlgorithm {
    NoKey = 0,
    Direct = 1,
    Pbkdf2 = 2,
}

impl KeyAlgorithm {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_tag(tag: u8, offset: u64) -> Result<Self, Error> {
        match tag {
            0 => Ok(Self::NoKey),
            1 => Ok(Self::Direct),
            2 => Ok(Self::Pbkdf2),
            _ => Err(Error::UnknownKeyAlgorithm { offset, tag }),
        }
    }
}

/// HMAC hash used by PBKDF2. Tag `0` ("no hash") is never valid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HashType {
    Sha1 = 1,
    Sha256 = 2,
}

impl HashType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_tag(tag: u8, offset: u64) -> Result<Self, Error> {
        match tag {
            1 => Ok(Self::Sha1),
            2 => Ok(Self::Sha256),
            _ => Err(Error::UnknownHash { offset, tag }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pbkdf2Params {
    hash: HashType,
    iterations: u32,
    output_len: u8,
    salt: Vec<u8>,
}

impl Pbkdf2Params {
    pub fn new(
        hash: HashType,
        iterations: u32,
        output_len: u8,
        salt: Vec<u8>,
    ) -> Result<Self, Error> {
        if iterations == 0 || iterations >= PBKDF2_MAX_ITERATIONS {
            return Err(Error::InvalidConfig(format!(
                "pbkdf2 iteration count {} must be in [1, {})",
                iterations, PBKDF2_MAX_ITERATIONS
            )));
        }
        if output_len == 0 || output_len >= PBKDF2_MAX_OUTPUT_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "pbkdf2 output length {} must be in [1, {})",
                output_len, PBKDF2_MAX_OUTPUT_LENGTH
            )));
        }
        if salt.len() >= PBKDF2_MAX_SALT_LENGTH as usize {
            return Err(Error::InvalidConfig(format!(
                "pbkdf2 salt length {} must be less than {}",
                salt.len(),
                PBKDF2_MAX_SALT_LENGTH
            )));
        }
        Ok(Self {
            hash,
            iterations,
            output_len,
            salt,
        })
    }

    pub fn hash(&self) -> HashType {
        self.hash
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn output_len(&self) -> u8 {
        self.output_len
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    fn derive(&self, password: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut key = Zeroizing::new(vec![0u8; self.output_len as usize]);
        match self.hash {
            HashType::Sha1 => {
                pbkdf2::pbkdf2_hmac::<sha1::Sha1>(password, &self.salt, self.iterations, &mut key)
            }
            HashType::Sha256 => {
                pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password, &self.salt, self.iterations, &mut key)
            }
        }
        key
    }
}

/// Describes how the symmetric key for every block of a container is
/// produced from the caller's key input. Written once at the start of the
/// file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyHeader {
    /// No key material at all, for containers holding only clear blocks.
    NoKey,
    /// The key input is used verbatim.
    Direct,
    /// The key input is a password stretched with PBKDF2.
    Pbkdf2(Pbkdf2Params),
}

impl KeyHeader {
    /// Build a PBKDF2 key header with a fresh random salt of `salt_len` bytes.
    pub fn pbkdf2(
        hash: HashType,
        iterations: u32,
        output_len: u8,
        salt_len: u8,
    ) -> Result<Self, Error> {
        Self::pbkdf2_with_rng(hash, iterations, output_len, salt_len, &mut OsRng)
    }

    pub fn pbkdf2_with_rng<R: CryptoRng + RngCore + ?Sized>(
        hash: HashType,
        iterations: u32,
        output_len: u8,
        salt_len: u8,
        r: &mut R,
    ) -> Result<Self, Error> {
        let mut salt = vec![0u8; salt_len as usize];
        r.fill_bytes(&mut salt);
        Pbkdf2Params::new(hash, iterations, output_len, salt).map(Self::Pbkdf2)
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::NoKey => KeyAlgorithm::NoKey,
            Self::Direct => KeyAlgorithm::Direct,
            Self::Pbkdf2(_) => KeyAlgorithm::Pbkdf2,
        }
    }

    /// Produce the symmetric key from the caller's key input.
    ///
    /// `NoKey` ignores the input and yields an empty key. The other variants
    /// fail with [`Error::MissingKey`] if no input was provided.
    pub fn derive_key(&self, input: Option<&[u8]>) -> Result<Zeroizing<Vec<u8>>, Error> {
        match self {
            Self::NoKey => Ok(Zeroizing::new(Vec::new())),
            Self::Direct => match input {
                Some(key) if !key.is_empty() => Ok(Zeroizing::new(key.to_vec())),
                _ => Err(Error::MissingKey),
            },
            Self::Pbkdf2(params) => {
                let password = input.ok_or(Error::MissingKey)?;
                tracing::debug!(
                    hash = ?params.hash,
                    iterations = params.iterations,
                    output_len = params.output_len,
                    "deriving pbkdf2 key"
                );
                Ok(params.derive(password))
            }
        }
    }
}

impl ToWire for KeyHeader {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![FORMAT_VERSION, self.algorithm().tag()];

        if let Self::Pbkdf2(params) = self {
            bytes.push((PBKDF2_FIXED_LENGTH + params.salt.len()) as u8);
            bytes.push(params.hash.tag());
            bytes.extend_from_slice(&params.iterations.to_le_bytes());
            bytes.push(params.output_len);
            bytes.push(params.salt.len() as u8);
            bytes.extend_from_slice(&params.salt);
        }

        bytes
    }
}

impl FromWire for KeyHeader {
    type Error = Error;

    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Self::Error> {
        use nom::{
            bytes::complete::take,
            number::complete::{le_u32, u8 as take_u8},
            sequence::tuple,
            IResult,
        };

        type Pbkdf2Tail<'a> = (u8, u8, u32, u8, &'a [u8]);

        fn parse_pbkdf2(input: &[u8]) -> IResult<&[u8], Pbkdf2Tail<'_>> {
            let (input, (header_len, hash, iterations, output_len, salt_len)) =
                tuple((take_u8, take_u8, le_u32, take_u8, take_u8))(input)?;
            let (input, salt) = take(salt_len)(input)?;
            Ok((input, (header_len, hash, iterations, output_len, salt)))
        }

        let (rest, (version, tag)) = tuple((take_u8, take_u8))(input)
            .map_err(|err| WireError::from_nom(input, err))?;

        if version != FORMAT_VERSION {
            return Err(Error::UnknownVersion {
                offset: OFFSET_VERSION,
                version,
            });
        }

        match KeyAlgorithm::from_tag(tag, OFFSET_ALGORITHM)? {
            KeyAlgorithm::NoKey => Ok((rest, Self::NoKey)),
            KeyAlgorithm::Direct => Ok((rest, Self::Direct)),
            KeyAlgorithm::Pbkdf2 => {
                let (rest, (header_len, hash, iterations, output_len, salt)) =
                    parse_pbkdf2(rest).map_err(|err| WireError::from_nom(input, err))?;

                if header_len as usize != PBKDF2_FIXED_LENGTH + salt.len() {
                    return Err(Error::MalformedHeader {
                        offset: OFFSET_HEADER_LENGTH,
                        reason: format!(
                            "pbkdf2 header length {} does not match salt length {}",
                            header_len,
                            salt.len()
                        ),
                    });
                }
                let hash = HashType::from_tag(hash, OFFSET_HASH)?;
                let offset = if iterations == 0 || iterations >= PBKDF2_MAX_ITERATIONS {
                    OFFSET_ITERATIONS
                } else if output_len == 0 || output_len >= PBKDF2_MAX_OUTPUT_LENGTH {
                    OFFSET_OUTPUT_LENGTH
                } else {
                    OFFSET_SALT_LENGTH
                };
                let params = Pbkdf2Params::new(hash, iterations, output_len, salt.to_vec())
                    .map_err(|err| match err {
                        Error::InvalidConfig(reason) => Error::MalformedHeader { offset, reason },
                        err => err,
                    })?;

                Ok((rest, Self::Pbkdf2(params)))
            }
        }
    }
}
