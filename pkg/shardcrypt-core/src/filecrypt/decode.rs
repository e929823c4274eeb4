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
    filecrypt::{
        cipher::{self, Opened},
        codec,
        header::HEADER_LENGTH,
        key::{KEY_PREFIX_LENGTH, PBKDF2_FIXED_LENGTH},
        EncryptionHeader, Error, KeyAlgorithm, KeyHeader, FORMAT_VERSION,
    },
    wire::FromWire,
};

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

/// One decoded block of a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block<T> {
    /// The payload of a clear, AEAD or public-key block.
    Payload(T),
    /// The SHA-256 digest stored by a digest-only block.
    Digest(Vec<u8>),
}

impl<T> Block<T> {
    pub fn payload(self) -> Option<T> {
        match self {
            Self::Payload(payload) => Some(payload),
            Self::Digest(_) => None,
        }
    }

    pub fn as_payload(&self) -> Option<&T> {
        match self {
            Self::Payload(payload) => Some(payload),
            Self::Digest(_) => None,
        }
    }

    pub fn digest(&self) -> Option<&[u8]> {
        match self {
            Self::Payload(_) => None,
            Self::Digest(digest) => Some(digest),
        }
    }
}

/// Reader which remembers how far into the container it is, so that errors
/// can point at the offending byte.
struct Tracked<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> Tracked<R> {
    fn read_exact(&mut self, len: u64) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        let got = (&mut self.inner).take(len).read_to_end(&mut buf)? as u64;
        if got < len {
            return Err(Error::ShortRead {
                offset: self.offset,
                expected: len,
                got,
            });
        }
        self.offset += len;
        Ok(buf)
    }

    fn skip(&mut self, len: u64) -> Result<(), Error> {
        let got = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
        if got < len {
            return Err(Error::ShortRead {
                offset: self.offset,
                expected: len,
                got,
            });
        }
        self.offset += len;
        Ok(())
    }

    fn read_key_header(&mut self) -> Result<KeyHeader, Error> {
        let start = self.offset;
        let mut bytes = self.read_exact(KEY_PREFIX_LENGTH as u64)?;

        if bytes[0] != FORMAT_VERSION {
            return Err(Error::UnknownVersion {
                offset: start,
                version: bytes[0],
            });
        }
        if bytes[1] == KeyAlgorithm::Pbkdf2.tag() {
            // The PBKDF2 tail is variable length, and starts with the length
            // of the whole header.
            let header_len = self.read_exact(1)?[0];
            if (header_len as usize) < PBKDF2_FIXED_LENGTH {
                return Err(Error::MalformedHeader {
                    offset: start + KEY_PREFIX_LENGTH as u64,
                    reason: format!("pbkdf2 header length {} is too short", header_len),
                });
            }
            bytes.push(header_len);
            let remaining = header_len as usize - bytes.len();
            bytes.append(&mut self.read_exact(remaining as u64)?);
        }

        KeyHeader::from_wire(&bytes).map_err(|err| err.rebase(start))
    }

    /// Read the header of block number `block`, checking that its position
    /// is consistent with the chain so far.
    fn read_header(&mut self, block: usize) -> Result<EncryptionHeader, Error> {
        let start = self.offset;
        let bytes = self.read_exact(HEADER_LENGTH as u64)?;
        let header = EncryptionHeader::from_wire(&bytes).map_err(|err| err.rebase(start))?;

        let position = header.position();
        if position.opens() != (block == 0) {
            return Err(Error::UnexpectedPosition {
                block,
                offset: start,
                position,
            });
        }
        Ok(header)
    }
}

/// Reads the blocks of a container in order.
///
/// The key header is read and the key derived when the decoder is created.
/// Each call to [`Decoder::next_block`] reads one block and returns `None`
/// once the block closing the chain has been read. Any bytes after that
/// block are ignored.
pub struct Decoder<R> {
    reader: Tracked<R>,
    key_header: KeyHeader,
    key: Zeroizing<Vec<u8>>,
    blocks: usize,
    done: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R, key_input: Option<&[u8]>) -> Result<Self, Error> {
        let mut reader = Tracked {
            inner: reader,
            offset: 0,
        };
        let key_header = reader.read_key_header()?;
        tracing::debug!(key = ?key_header.algorithm(), "read key header");
        let key = key_header.derive_key(key_input)?;

        Ok(Self {
            reader,
            key_header,
            key,
            blocks: 0,
            done: false,
        })
    }

    pub fn key_header(&self) -> &KeyHeader {
        &self.key_header
    }

    /// Byte offset of the next unread byte in the container.
    pub fn offset(&self) -> u64 {
        self.reader.offset
    }

    pub fn next_block<T: DeserializeOwned>(
        &mut self,
    ) -> Result<Option<(EncryptionHeader, Block<T>)>, Error> {
        if self.done {
            return Ok(None);
        }

        let block = self.blocks;
        let header = self.reader.read_header(block)?;
        let offset = self.reader.offset;
        let body = self.reader.read_exact(header.body_length()?)?;

        tracing::trace!(
            block,
            offset,
            algorithm = ?header.algorithm(),
            position = ?header.position(),
            body_length = body.len(),
            "decoding block"
        );

        let decoded = match cipher::open(&header, &self.key, &body, block, offset)? {
            Opened::Cleartext(cleartext) => Block::Payload(codec::decode(&cleartext, block)?),
            Opened::Digest(digest) => Block::Digest(digest),
        };

        self.blocks += 1;
        self.done = header.position().closes();
        Ok(Some((header, decoded)))
    }

    /// Decode every remaining block. Nothing is returned unless the whole
    /// chain decodes.
    pub fn decode_all<T: DeserializeOwned>(mut self) -> Result<Vec<Block<T>>, Error> {
        let mut blocks = Vec::new();
        while let Some((_, block)) = self.next_block()? {
            blocks.push(block);
        }
        tracing::debug!(blocks = blocks.len(), "decoded container");
        Ok(blocks)
    }
}

/// Decrypt every block of the container at `path`, in file order.
///
/// `key_input` is the password (PBKDF2) or raw key (direct) the container was
/// written with. For public-key blocks it is the PKCS#8 DER private key.
pub fn decrypt<T: DeserializeOwned, P: AsRef<Path>>(
    path: P,
    key_input: Option<&[u8]>,
) -> Result<Vec<Block<T>>, Error> {
    let path = path.as_ref();
    let file = File::open(path).map_err(Error::io(path))?;
    Decoder::new(BufReader::new(file), key_input)?.decode_all()
}

/// Read the key header and every block header of a container without
/// decrypting anything.
pub fn inspect<R: Read>(reader: R) -> Result<(KeyHeader, Vec<EncryptionHeader>), Error> {
    let mut reader = Tracked {
        inner: reader,
        offset: 0,
    };
    let key_header = reader.read_key_header()?;

    let mut headers: Vec<EncryptionHeader> = Vec::new();
    while !headers.last().map_or(false, |h| h.position().closes()) {
        let header = reader.read_header(headers.len())?;
        reader.skip(header.body_length()?)?;
        headers.push(header);
    }
    Ok((key_header, headers))
}
