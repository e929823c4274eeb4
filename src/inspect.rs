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


use std::{fs, io::BufReader};

use anyhow::{Context, Error};
use clap::{Arg, ArgAction, ArgMatches, Command};

use shardcrypt_core::{
    bundle,
    filecrypt::{self, EncryptionHeader, KeyHeader},
};

// shardcrypt inspect [--bundle] CONTAINER
pub(crate) fn subcommand() -> Command {
    Command::new("inspect")
        .about("Print the key header and block headers of a container without decrypting it.")
        .arg(
            Arg::new("bundle")
                .long("bundle")
                .help("The container is a share bundle, also print the sharing configuration and the shares it holds.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("CONTAINER")
                .help("Path to the container.")
                .action(ArgAction::Set)
                .required(true)
                .index(1),
        )
}

fn describe_key_header(key_header: &KeyHeader) -> String {
    match key_header {
        KeyHeader::NoKey => "no key".to_string(),
        KeyHeader::Direct => "direct key".to_string(),
        KeyHeader::Pbkdf2(params) => format!(
            "PBKDF2-HMAC-{:?}, {} iterations, {}-byte key, salt {}",
            params.hash(),
            params.iterations(),
            params.output_len(),
            hex::encode(params.salt()),
        ),
    }
}

fn describe_block(header: &EncryptionHeader) -> String {
    let body = match header.body_length() {
        Ok(len) => format!("{} bytes", len),
        Err(err) => format!("invalid length ({})", err),
    };
    format!(
        "{:?} {:?} block size {} bytes, nonce {} bytes, {} blocks, body {}",
        header.position(),
        header.algorithm(),
        header.block_size().bytes(),
        header.nonce_size(),
        header.block_count(),
        body,
    )
}

pub(crate) fn submatch(matches: &ArgMatches) -> Result<(), Error> {
    let path = matches
        .get_one::<String>("CONTAINER")
        .context("required CONTAINER argument not provided")?;
    let data = fs::read(path).with_context(|| format!("failed to read container '{}'", path))?;

    let (key_header, headers) = filecrypt::inspect(BufReader::new(data.as_slice()))
        .with_context(|| format!("failed to parse container '{}'", path))?;
    println!("key: {}", describe_key_header(&key_header));
    for (i, header) in headers.iter().enumerate() {
        println!("block {}: {}", i, describe_block(header));
    }

    if matches.get_flag("bundle") {
        let (config, shares) = bundle::decode(&data)
            .with_context(|| format!("'{}' is not a share bundle", path))?;
        println!("bundle checksum: {}", bundle::checksum_string(&data));
        println!(
            "sharing: {} of {} over {:?}",
            config.threshold(),
            config.max_shares(),
            config.field_type()
        );
        for share in shares {
            println!("share {}: checksum {}", share.id(), share.checksum_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    use shardcrypt_core::filecrypt::{Algorithm, BlockSize, HashType, Position};

    #[test]
    fn key_header_descriptions() {
        assert_eq!(describe_key_header(&KeyHeader::NoKey), "no key");
        assert_eq!(describe_key_header(&KeyHeader::Direct), "direct key");

        let header = KeyHeader::pbkdf2(HashType::Sha256, 1000, 32, 4).unwrap();
        let description = describe_key_header(&header);
        assert!(
            description.starts_with("PBKDF2-HMAC-Sha256, 1000 iterations, 32-byte key, salt "),
            "{}",
            description
        );
        assert_eq!(description.len(), "PBKDF2-HMAC-Sha256, 1000 iterations, 32-byte key, salt ".len() + 8);
    }

    #[test]
    fn block_descriptions() {
        let header = EncryptionHeader::new(Algorithm::Clear, Position::Single, BlockSize::Bits128)
            .unwrap();
        assert_eq!(
            describe_block(&header),
            "Single Clear block size 16 bytes, nonce 0 bytes, 0 blocks, body 0 bytes"
        );
    }
}
