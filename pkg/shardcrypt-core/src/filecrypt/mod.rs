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


//! The FileCrypt container format.
//!
//! ```text
//! [key header: 2 byte prefix + variant tail]
//! [encryption header 1: 16 bytes] [body 1]
//! ...
//! [encryption header k: 16 bytes] [body k]   (position = last | single)
//! ```
//!
//! There is exactly one [`KeyHeader`] per file and every block is encrypted
//! with the key it yields. Each block carries its own [`EncryptionHeader`], so
//! ciphers and block sizes can differ between blocks of one file. Blocks form
//! an implicit chain through their [`Position`] tags and decoding stops after
//! the block that closes the chain.

mod cipher;
mod codec;
mod decode;
mod encode;
mod header;
mod key;

pub use decode::{decrypt, inspect, Block, Decoder};
pub use encode::{Encoder, FileSink, Sink};
pub use header::{Algorithm, BlockSize, EncryptionHeader, Position};
pub use key::{HashType, KeyAlgorithm, KeyHeader, Pbkdf2Params};

use std::path::PathBuf;

/// The only container format version.
pub const FORMAT_VERSION: u8 = 0;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown format version {version} at byte offset {offset}")]
    UnknownVersion { offset: u64, version: u8 },

    #[error("unknown key derivation algorithm {tag} at byte offset {offset}")]
    UnknownKeyAlgorithm { offset: u64, tag: u8 },

    #[error("unknown encryption algorithm {tag} at byte offset {offset}")]
    UnknownAlgorithm { offset: u64, tag: u8 },

    #[error("unknown block position {tag} at byte offset {offset}")]
    UnknownPosition { offset: u64, tag: u8 },

    #[error("unknown block size class {tag} at byte offset {offset}")]
    UnknownBlockSize { offset: u64, tag: u8 },

    #[error("unknown pbkdf2 hash {tag} at byte offset {offset}")]
    UnknownHash { offset: u64, tag: u8 },

    #[error("malformed header at byte offset {offset}: {reason}")]
    MalformedHeader { offset: u64, reason: String },

    #[error("block {block} at byte offset {offset} is out of order ({position:?})")]
    UnexpectedPosition {
        block: usize,
        offset: u64,
        position: Position,
    },

    #[error("short read at byte offset {offset}: expected {expected} bytes, got {got}")]
    ShortRead { offset: u64, expected: u64, got: u64 },

    #[error("authentication of block {block} at byte offset {offset} failed")]
    Authentication { block: usize, offset: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("payload of {len} bytes is larger than the {max} bytes the key can encrypt")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("key derivation requires key input but none was provided")]
    MissingKey,

    #[error("invalid key length {0} for aes-gcm (must be 16 or 32)")]
    InvalidKeyLength(usize),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("aead encryption cryptographic error: {0}")]
    AeadEncryption(aead::Error),

    #[error("rsa cryptographic error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to decode payload of block {block}: {reason}")]
    Decode { block: usize, reason: String },

    #[error("container chain is already closed")]
    ChainClosed,

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Read(#[from] std::io::Error),

    #[error("header decoding failed: {0}")]
    Wire(#[from] crate::wire::Error),
}

impl Error {
    /// Shift any byte offsets carried by this error by `base`, for errors
    /// produced by parsing a header that starts `base` bytes into the file.
    pub(crate) fn rebase(self, base: u64) -> Self {
        use crate::wire::Error as WireError;

        match self {
            Self::UnknownVersion { offset, version } => Self::UnknownVersion {
                offset: offset + base,
                version,
            },
            Self::UnknownKeyAlgorithm { offset, tag } => Self::UnknownKeyAlgorithm {
                offset: offset + base,
                tag,
            },
            Self::UnknownAlgorithm { offset, tag } => Self::UnknownAlgorithm {
                offset: offset + base,
                tag,
            },
            Self::UnknownPosition { offset, tag } => Self::UnknownPosition {
                offset: offset + base,
                tag,
            },
            Self::UnknownBlockSize { offset, tag } => Self::UnknownBlockSize {
                offset: offset + base,
                tag,
            },
            Self::UnknownHash { offset, tag } => Self::UnknownHash {
                offset: offset + base,
                tag,
            },
            Self::MalformedHeader { offset, reason } => Self::MalformedHeader {
                offset: offset + base,
                reason,
            },
            Self::Wire(WireError::Malformed { offset, kind }) => Self::MalformedHeader {
                offset: offset as u64 + base,
                reason: format!("{:?}", kind),
            },
            err => err,
        }
    }

    pub(crate) fn io<P: Into<PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
