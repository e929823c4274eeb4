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

use nom::{error::ErrorKind, Err as NomErr, Needed};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not enough bytes to decode (needed: {needed:?})")]
    Incomplete { needed: Option<usize> },

    #[error("malformed data at byte offset {offset}: {kind:?}")]
    Malformed { offset: usize, kind: ErrorKind },

    #[error("{0} trailing bytes left after deserialisation")]
    TrailingBytes(usize),

    #[error("multibase decoding failed: {0}")]
    Multibase(#[from] multibase::Error),
}

impl Error {
    /// Convert a `nom` parser error into a wire error, computing the offset of
    /// the failure relative to the start of `input`.
    pub(crate) fn from_nom(input: &[u8], err: NomErr<nom::error::Error<&[u8]>>) -> Self {
        match err {
            NomErr::Incomplete(Needed::Size(n)) => Error::Incomplete {
                needed: Some(n.get()),
            },
            NomErr::Incomplete(Needed::Unknown) => Error::Incomplete { needed: None },
            NomErr::Error(e) | NomErr::Failure(e) => Error::Malformed {
                offset: input.len() - e.input.len(),
                kind: e.code,
            },
        }
    }
}

pub trait ToWire {
    fn to_wire(&self) -> Vec<u8>;

    /// Convert a `ToWire`-implementing type to a multibase string.
    fn to_wire_multibase(&self, base: multibase::Base) -> String {
        multibase::encode(base, self.to_wire())
    }
}

pub trait FromWire: Sized {
    type Error: From<Error>;

    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Self::Error>;

    fn from_wire<B: AsRef<[u8]>>(input: B) -> Result<Self, Self::Error> {
        match Self::from_wire_partial(input.as_ref())? {
            ([], ret) => Ok(ret),
            (remain, _) => Err(Error::TrailingBytes(remain.len()).into()),
        }
    }

    /// Parse a multibase-encoded representation of a `FromWire`-implementing
    /// type as that type.
    fn from_wire_multibase<S: AsRef<str>>(input: S) -> Result<Self, Self::Error> {
        let (_, data) = multibase::decode(input).map_err(Error::from)?;
        Self::from_wire(data)
    }
}

/// Strip the whitespace (and for most bases, `-` separators) that humans tend
/// to add when copying a multibase string by hand.
pub fn multibase_strip<S: AsRef<str>>(data: S) -> Result<String, Error> {
    let data = data.as_ref().trim_start();
    match data.chars().next() {
        Some(ch) => Ok(data.replace(
            match multibase::Base::from_code(ch)? {
                // url-base64 -- do not remove "-"
                multibase::Base::Base64Url | multibase::Base::Base64UrlPad => {
                    &['\t', ' ', '\n', '\r'][..]
                }
                _ => &['\t', ' ', '\n', '\r', '-'][..],
            },
            "",
        )),
        None => Err(Error::Incomplete { needed: None }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strip_spaces_and_dashes() {
        let encoded = multibase::encode(multibase::Base::Base32Z, b"shardcrypt");
        let (head, tail) = encoded.split_at(5);
        let mangled = format!("  {}-\n{} \t", head, tail);
        assert_eq!(multibase_strip(mangled).unwrap(), encoded);
    }

    #[test]
    fn strip_keeps_base64url_dashes() {
        let encoded = multibase::encode(multibase::Base::Base64Url, [0xfb, 0xef, 0xbe]);
        assert!(encoded.contains('-'));
        assert_eq!(multibase_strip(&encoded).unwrap(), encoded);
    }

    #[test]
    fn strip_empty() {
        multibase_strip("").unwrap_err();
    }
}
