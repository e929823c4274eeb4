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
    filecrypt::{cipher, codec, EncryptionHeader, Error, KeyHeader},
    wire::ToWire,
};

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::Serialize;
use zeroize::Zeroizing;

/// Destination of an [`Encoder`].
pub trait Sink {
    /// Start a new container, discarding anything written before.
    fn create(&mut self) -> Result<(), Error>;

    /// Append one fully assembled block and make it durable.
    fn append(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// A container file on disk. It is created (or truncated) when the first
/// block is written, and synced after every block.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn create(&mut self) -> Result<(), Error> {
        tracing::debug!(path = ?self.path, "creating container");
        self.file = Some(File::create(&self.path).map_err(Error::io(&self.path))?);
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                return Err(Error::InvalidConfig(
                    "block appended before the container was created".into(),
                ))
            }
        };
        file.write_all(bytes).map_err(Error::io(&self.path))?;
        file.sync_all().map_err(Error::io(&self.path))
    }
}

/// In-memory containers.
impl Sink for Vec<u8> {
    fn create(&mut self) -> Result<(), Error> {
        self.clear();
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Writes a container one block at a time.
///
/// The key header and output are fixed when the encoder is created. The
/// container is created (or truncated) by the first call to
/// [`Encoder::encrypt`], which also writes the key header. Every block is
/// assembled in memory and then written and synced in one go, so a failed
/// call leaves the blocks written before it intact (but the container
/// unterminated).
pub struct Encoder<S = FileSink> {
    sink: S,
    key_header: KeyHeader,
    key_input: Option<Zeroizing<Vec<u8>>>,
    key: Option<Zeroizing<Vec<u8>>>,
    blocks: usize,
    offset: u64,
    closed: bool,
}

impl<S> std::fmt::Debug for Encoder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("key_header", &self.key_header)
            .field("blocks", &self.blocks)
            .field("offset", &self.offset)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Encoder<FileSink> {
    /// Encoder writing the container file at `path`.
    pub fn new<P: Into<PathBuf>>(path: P, key_header: KeyHeader, key_input: Option<&[u8]>) -> Self {
        Self::with_sink(FileSink::new(path), key_header, key_input)
    }

    pub fn path(&self) -> &Path {
        self.sink.path()
    }
}

impl Encoder<Vec<u8>> {
    /// Encoder building the container in memory, see [`Encoder::into_sink`].
    pub fn in_memory(key_header: KeyHeader, key_input: Option<&[u8]>) -> Self {
        Self::with_sink(Vec::new(), key_header, key_input)
    }
}

impl<S: Sink> Encoder<S> {
    pub fn with_sink(sink: S, key_header: KeyHeader, key_input: Option<&[u8]>) -> Self {
        Self {
            sink,
            key_header,
            key_input: key_input.map(|k| Zeroizing::new(k.to_vec())),
            key: None,
            blocks: 0,
            offset: 0,
            closed: false,
        }
    }

    pub fn key_header(&self) -> &KeyHeader {
        &self.key_header
    }

    /// Number of blocks written so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Whether a block closing the chain has been written.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Encode `payload` and append it to the container as the block described
    /// by `header`, returning the header as written (with its length fields
    /// filled in).
    ///
    /// Blocks must be added in chain order. The first block must be
    /// [`Position::First`] or [`Position::Single`], later blocks
    /// [`Position::Middle`] or [`Position::Last`], and no block may follow
    /// one that closed the chain. Out-of-order blocks, oversized public-key
    /// payloads and key derivation failures are all reported before anything
    /// is written.
    ///
    /// [`Position::First`]: crate::filecrypt::Position::First
    /// [`Position::Single`]: crate::filecrypt::Position::Single
    /// [`Position::Middle`]: crate::filecrypt::Position::Middle
    /// [`Position::Last`]: crate::filecrypt::Position::Last
    pub fn encrypt<T: Serialize + ?Sized>(
        &mut self,
        header: EncryptionHeader,
        payload: &T,
    ) -> Result<EncryptionHeader, Error> {
        self.encrypt_with_rng(header, payload, &mut OsRng)
    }

    pub fn encrypt_with_rng<T: Serialize + ?Sized, R: CryptoRng + RngCore>(
        &mut self,
        mut header: EncryptionHeader,
        payload: &T,
        r: &mut R,
    ) -> Result<EncryptionHeader, Error> {
        if self.closed {
            return Err(Error::ChainClosed);
        }
        let position = header.position();
        if position.opens() != (self.blocks == 0) {
            return Err(Error::UnexpectedPosition {
                block: self.blocks,
                offset: self.offset,
                position,
            });
        }

        let cleartext = codec::encode(payload)?;
        if self.key.is_none() {
            let key = self
                .key_header
                .derive_key(self.key_input.as_deref().map(Vec::as_slice))?;
            self.key = Some(key);
        }
        let key = self.key.as_deref().map(Vec::as_slice).unwrap_or_default();
        let body = cipher::seal(&mut header, key, &cleartext, r)?;

        let mut bytes = match self.blocks {
            0 => self.key_header.to_wire(),
            _ => Vec::new(),
        };
        bytes.extend_from_slice(&header.to_wire());
        bytes.extend_from_slice(&body);

        // A first block that failed to write is retried from scratch.
        if self.blocks == 0 {
            self.sink.create()?;
        }
        self.sink.append(&bytes)?;

        tracing::debug!(
            block = self.blocks,
            offset = self.offset,
            algorithm = ?header.algorithm(),
            position = ?position,
            body_length = body.len(),
            "wrote block"
        );

        self.offset += bytes.len() as u64;
        self.blocks += 1;
        self.closed = position.closes();
        Ok(header)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::filecrypt::{decrypt, Algorithm, Block, BlockSize, Position};

    fn clear(position: Position) -> EncryptionHeader {
        EncryptionHeader::new(Algorithm::Clear, position, BlockSize::Bits128).unwrap()
    }

    #[test]
    fn chain_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.fc");
        let mut encoder = Encoder::new(&path, KeyHeader::NoKey, None);

        for position in [Position::Middle, Position::Last] {
            assert!(matches!(
                encoder.encrypt(clear(position), "x"),
                Err(Error::UnexpectedPosition { block: 0, .. })
            ));
        }
        assert!(!path.exists(), "rejected blocks must not create the file");

        encoder.encrypt(clear(Position::First), "a").unwrap();
        for position in [Position::First, Position::Single] {
            assert!(matches!(
                encoder.encrypt(clear(position), "x"),
                Err(Error::UnexpectedPosition { block: 1, .. })
            ));
        }
        encoder.encrypt(clear(Position::Middle), "b").unwrap();
        encoder.encrypt(clear(Position::Last), "c").unwrap();
        assert!(encoder.is_closed());
        assert!(matches!(
            encoder.encrypt(clear(Position::Last), "d"),
            Err(Error::ChainClosed)
        ));
        assert_eq!(encoder.blocks(), 3);
        assert_eq!(encoder.path(), path);

        let blocks = decrypt::<String, _>(&path, None).unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::Payload("a".to_string()),
                Block::Payload("b".to_string()),
                Block::Payload("c".to_string()),
            ]
        );
    }

    #[test]
    fn truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.fc");
        std::fs::write(&path, vec![0xffu8; 4096]).unwrap();

        let mut encoder = Encoder::new(&path, KeyHeader::NoKey, None);
        let header = encoder.encrypt(clear(Position::Single), &7u8).unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, 2 + 16 + header.body_length().unwrap());
        assert_eq!(
            decrypt::<u8, _>(&path, None).unwrap(),
            vec![Block::Payload(7)]
        );
    }

    #[test]
    fn key_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pbkdf2.fc");
        let key_header = KeyHeader::pbkdf2(crate::filecrypt::HashType::Sha256, 10, 32, 8).unwrap();
        let key_bytes = key_header.to_wire();
        let mut encoder = Encoder::new(&path, key_header, Some(&b"pw"[..]));

        let aead = |position| {
            EncryptionHeader::new(Algorithm::Aead, position, BlockSize::Bits256).unwrap()
        };
        let h1 = encoder.encrypt(aead(Position::First), "one").unwrap();
        let h2 = encoder.encrypt(aead(Position::Last), "two").unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[..key_bytes.len()], key_bytes.as_slice());
        assert_eq!(
            data.len() as u64,
            key_bytes.len() as u64
                + 16
                + h1.body_length().unwrap()
                + 16
                + h2.body_length().unwrap()
        );
    }

    #[test]
    fn missing_key_is_reported_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nokey.fc");
        let mut encoder = Encoder::new(&path, KeyHeader::Direct, None);
        let header =
            EncryptionHeader::new(Algorithm::Aead, Position::Single, BlockSize::Bits128).unwrap();
        assert!(matches!(
            encoder.encrypt(header, "x"),
            Err(Error::MissingKey)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn in_memory() {
        let key = [4u8; 16];
        let mut encoder = Encoder::in_memory(KeyHeader::Direct, Some(&key[..]));
        let aead =
            EncryptionHeader::new(Algorithm::Aead, Position::First, BlockSize::Bits128).unwrap();
        encoder.encrypt(aead, &vec![1u32, 2, 3]).unwrap();
        encoder.encrypt(clear(Position::Last), &vec![4u32]).unwrap();

        let data = encoder.into_sink();
        let blocks = crate::filecrypt::Decoder::new(&data[..], Some(&key[..]))
            .unwrap()
            .decode_all::<Vec<u32>>()
            .unwrap();
        assert_eq!(
            blocks,
            vec![Block::Payload(vec![1, 2, 3]), Block::Payload(vec![4])]
        );
    }
}
