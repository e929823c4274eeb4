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
        self, Algorithm, Block, BlockSize, Decoder, Encoder, EncryptionHeader, KeyHeader, Position,
    },
    shamir::{Config, FieldType, Share},
};

use std::{collections::HashSet, fs, path::Path};

use multihash_codetable::{Code, MultihashDigest};

const BUNDLE_BLOCK_SIZE: BlockSize = BlockSize::Bits128;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("container error: {0}")]
    Container(#[from] filecrypt::Error),

    #[error("bundle must hold exactly two blocks")]
    UnexpectedBlocks,

    #[error("bundle blocks must not be digests")]
    DigestBlock,

    #[error("bundle holds no shares")]
    NoShares,

    #[error("share {index} is in {got:?} but the bundle is for {expected:?}")]
    FieldMismatch {
        index: u64,
        expected: FieldType,
        got: FieldType,
    },

    #[error("share index {0} appears more than once")]
    DuplicateShare(u64),

    #[error("io error on {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn validate(config: &Config, shares: &[Share]) -> Result<(), Error> {
    if shares.is_empty() {
        return Err(Error::NoShares);
    }
    let mut seen = HashSet::new();
    for share in shares {
        if share.field_type() != config.field_type() {
            return Err(Error::FieldMismatch {
                index: share.index(),
                expected: config.field_type(),
                got: share.field_type(),
            });
        }
        if !seen.insert(share.index()) {
            return Err(Error::DuplicateShare(share.index()));
        }
    }
    Ok(())
}

/// Pack `shares` and the configuration they were generated with into an
/// unencrypted container.
pub fn encode(config: &Config, shares: &[Share]) -> Result<Vec<u8>, Error> {
    validate(config, shares)?;

    let mut encoder = Encoder::in_memory(KeyHeader::NoKey, None);
    encoder.encrypt(
        EncryptionHeader::new(Algorithm::Clear, Position::First, BUNDLE_BLOCK_SIZE)?,
        config,
    )?;
    encoder.encrypt(
        EncryptionHeader::new(Algorithm::Clear, Position::Last, BUNDLE_BLOCK_SIZE)?,
        shares,
    )?;
    Ok(encoder.into_sink())
}

/// Unpack a bundle produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<(Config, Vec<Share>), Error> {
    let mut decoder = Decoder::new(bytes, None)?;

    let config = match decoder.next_block::<Config>()? {
        Some((_, Block::Payload(config))) => config,
        Some((_, Block::Digest(_))) => return Err(Error::DigestBlock),
        None => return Err(Error::UnexpectedBlocks),
    };
    let shares = match decoder.next_block::<Vec<Share>>()? {
        Some((header, Block::Payload(shares))) if header.position().closes() => shares,
        Some((_, Block::Digest(_))) => return Err(Error::DigestBlock),
        _ => return Err(Error::UnexpectedBlocks),
    };

    validate(&config, &shares)?;
    tracing::debug!(num_shares = shares.len(), "decoded share bundle");
    Ok((config, shares))
}

pub fn write_file<P: AsRef<Path>>(path: P, config: &Config, shares: &[Share]) -> Result<(), Error> {
    let path = path.as_ref();
    let bytes = encode(config, shares)?;
    fs::write(path, bytes).map_err(|source| Error::Io {
        path: path.into(),
        source,
    })
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<(Config, Vec<Share>), Error> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| Error::Io {
        path: path.into(),
        source,
    })?;
    decode(&bytes)
}

/// Human-readable checksum of an encoded bundle, for custodians to compare
/// against the value printed when the bundle was handed out.
pub fn checksum_string<B: AsRef<[u8]>>(bytes: B) -> String {
    multibase::encode(
        multibase::Base::Base32Z,
        Code::Sha2_256.digest(bytes.as_ref()).to_bytes(),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{shamir::FieldElement, wire::ToWire};

    fn sample(threshold: u32, max_shares: u32) -> (Config, FieldElement, Vec<Share>) {
        let config = Config::new(threshold, max_shares, FieldType::Bn254Fr).unwrap();
        let secret = config.new_secret();
        let shares = config.generate_shares(&secret).unwrap();
        (config, secret, shares)
    }

    #[test]
    fn bundle_roundtrip() {
        let (config, secret, shares) = sample(3, 5);
        let bytes = encode(&config, &shares[1..4]).unwrap();

        let (config2, shares2) = decode(&bytes).unwrap();
        assert_eq!(config2, config);
        assert_eq!(shares2, shares[1..4].to_vec());
        assert_eq!(config2.generate_secret(shares2).unwrap(), secret);
    }

    #[test]
    fn bundle_is_a_clear_container() {
        let (config, _, shares) = sample(2, 2);
        let bytes = encode(&config, &shares).unwrap();

        let (key_header, headers) = filecrypt::inspect(&bytes[..]).unwrap();
        assert_eq!(key_header, KeyHeader::NoKey);
        assert_eq!(headers.len(), 2);
        assert!(headers.iter().all(|h| h.algorithm() == Algorithm::Clear));

        // Share wire bytes appear verbatim in the clear body.
        for share in &shares {
            let wire = share.to_wire();
            assert!(bytes.windows(wire.len()).any(|w| w == wire.as_slice()));
        }
    }

    #[test]
    fn bundle_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custodian-1.bundle");
        let (config, _, shares) = sample(2, 3);

        write_file(&path, &config, &shares[..1]).unwrap();
        let (config2, shares2) = read_file(&path).unwrap();
        assert_eq!(config2, config);
        assert_eq!(shares2, shares[..1].to_vec());

        let bytes = fs::read(&path).unwrap();
        assert_eq!(checksum_string(&bytes), checksum_string(encode(&config, &shares[..1]).unwrap()));
        assert!(matches!(
            read_file(dir.path().join("missing")),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn bundle_validation() {
        let (config, _, shares) = sample(2, 3);
        assert!(matches!(encode(&config, &[]), Err(Error::NoShares)));
        assert!(matches!(
            encode(&config, &[shares[0].clone(), shares[0].clone()]),
            Err(Error::DuplicateShare(1))
        ));

        let other = Config::new(2, 3, FieldType::Bn254Fq).unwrap();
        let foreign = other.generate_shares(&other.new_secret()).unwrap();
        assert!(matches!(
            encode(&config, &foreign),
            Err(Error::FieldMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn bundle_rejects_other_containers() {
        let (config, _, _) = sample(2, 3);

        let mut encoder = Encoder::in_memory(KeyHeader::NoKey, None);
        encoder
            .encrypt(
                EncryptionHeader::new(Algorithm::Clear, Position::Single, BUNDLE_BLOCK_SIZE)
                    .unwrap(),
                &config,
            )
            .unwrap();
        assert!(matches!(
            decode(&encoder.into_sink()),
            Err(Error::UnexpectedBlocks)
        ));

        let (config, _, shares) = sample(2, 3);
        let mut bytes = encode(&config, &shares).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            decode(&bytes),
            Err(Error::Container(filecrypt::Error::ShortRead { .. }))
        ));
    }
}
