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


//! Payloads are encoded as CBOR before being handed to the block cipher.

use crate::filecrypt::Error;

use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

pub(crate) fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut data = Zeroizing::new(Vec::new());
    ciborium::ser::into_writer(payload, &mut *data)
        .map_err(|err| Error::Encode(format!("CBOR encode failed: {err}")))?;
    Ok(data)
}

/// Decode exactly one CBOR value, which must take up all of `data`.
pub(crate) fn decode<T: DeserializeOwned>(data: &[u8], block: usize) -> Result<T, Error> {
    let mut rest = data;
    let payload = ciborium::de::from_reader(&mut rest).map_err(|err| Error::Decode {
        block,
        reason: format!("CBOR decode failed: {err}"),
    })?;
    if !rest.is_empty() {
        return Err(Error::Decode {
            block,
            reason: format!("{} trailing bytes after CBOR payload", rest.len()),
        });
    }
    Ok(payload)
}

#[cfg(test)]
mod test {
    use super::*;

    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Payload {
        Note(String),
        Counter { value: u64, tags: Vec<String> },
    }

    #[quickcheck]
    fn payload_roundtrip(note: String, value: u64) -> bool {
        let a = Payload::Note(note);
        let b = Payload::Counter {
            value,
            tags: vec!["x".into()],
        };
        decode::<Payload>(&encode(&a).unwrap(), 0).unwrap() == a
            && decode::<Payload>(&encode(&b).unwrap(), 0).unwrap() == b
    }

    #[test]
    fn wrong_type() {
        let data = encode(&42u32).unwrap();
        assert!(matches!(
            decode::<Payload>(&data, 5),
            Err(Error::Decode { block: 5, .. })
        ));
    }

    #[test]
    fn trailing_bytes() {
        let mut data = encode(&Payload::Note("hello".into())).unwrap().to_vec();
        decode::<Payload>(&data, 0).unwrap();

        data.push(0x00);
        match decode::<Payload>(&data, 2) {
            Err(Error::Decode { block: 2, reason }) => {
                assert!(reason.contains("1 trailing bytes"), "{}", reason)
            }
            other => panic!("expected trailing bytes error, got {:?}", other),
        }
    }
}
