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


use crate::filecrypt::{Algorithm, BlockSize, EncryptionHeader, Error};

use aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use rand::{CryptoRng, RngCore};
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey},
    traits::PublicKeyParts,
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub(crate) const AEAD_NONCE_LENGTH: usize = 12;
pub(crate) const DIGEST_LENGTH: usize = 32;

// OAEP with SHA-256 costs two hash lengths plus two bytes of the modulus.
const OAEP_OVERHEAD: usize = 2 * DIGEST_LENGTH + 2;

/// The result of opening one block body.
pub(crate) enum Opened {
    Cleartext(Zeroizing<Vec<u8>>),
    Digest(Vec<u8>),
}

/// Largest payload a public-key block can hold for a modulus of
/// `modulus_bytes` bytes.
pub(crate) fn max_public_key_payload(modulus_bytes: usize) -> usize {
    modulus_bytes.saturating_sub(OAEP_OVERHEAD)
}

/// Transform `cleartext` into the body for `header`, filling in the length
/// fields of the header.
pub(crate) fn seal<R: CryptoRng + RngCore>(
    header: &mut EncryptionHeader,
    key: &[u8],
    cleartext: &[u8],
    r: &mut R,
) -> Result<Vec<u8>, Error> {
    let body = match header.algorithm() {
        Algorithm::Clear => cleartext.to_vec(),
        Algorithm::Aead => {
            let mut nonce = [0u8; AEAD_NONCE_LENGTH];
            r.fill_bytes(&mut nonce);

            let ciphertext = match key.len() {
                16 => aead_seal::<Aes128Gcm>(key, &nonce, cleartext)?,
                32 => aead_seal::<Aes256Gcm>(key, &nonce, cleartext)?,
                len => return Err(Error::InvalidKeyLength(len)),
            };

            let mut body =
                Vec::with_capacity(nonce.len() + header.nonce_padding() + ciphertext.len());
            body.extend_from_slice(&nonce);
            body.resize(nonce.len() + header.nonce_padding(), 0);
            body.extend_from_slice(&ciphertext);
            body
        }
        Algorithm::PublicKey => {
            let public_key = RsaPublicKey::from_public_key_der(key)
                .map_err(|err| Error::InvalidKey(err.to_string()))?;
            check_modulus(header.block_size(), public_key.size())?;

            let max = max_public_key_payload(public_key.size());
            if cleartext.len() > max {
                return Err(Error::PayloadTooLarge {
                    len: cleartext.len(),
                    max,
                });
            }
            public_key.encrypt(r, Oaep::new::<Sha256>(), cleartext)?
        }
        Algorithm::DigestOnly => Sha256::digest(cleartext).to_vec(),
    };

    header.set_body_length(body.len())?;
    Ok(body)
}

/// Reverse [`seal`] for a body read from a container. `block` and `offset`
/// locate the body for error reporting.
pub(crate) fn open(
    header: &EncryptionHeader,
    key: &[u8],
    body: &[u8],
    block: usize,
    offset: u64,
) -> Result<Opened, Error> {
    let auth_failed = || Error::Authentication { block, offset };

    match header.algorithm() {
        Algorithm::Clear => Ok(Opened::Cleartext(Zeroizing::new(body.to_vec()))),
        Algorithm::Aead => {
            let nonce_end = header.nonce_size() as usize;
            let ciphertext_start = nonce_end + header.nonce_padding();
            if body.len() < ciphertext_start {
                return Err(auth_failed());
            }
            let (nonce, ciphertext) = (&body[..nonce_end], &body[ciphertext_start..]);

            let cleartext = match key.len() {
                16 => aead_open::<Aes128Gcm>(key, nonce, ciphertext),
                32 => aead_open::<Aes256Gcm>(key, nonce, ciphertext),
                len => return Err(Error::InvalidKeyLength(len)),
            };
            cleartext.map(Opened::Cleartext).ok_or_else(auth_failed)
        }
        Algorithm::PublicKey => {
            let private_key = RsaPrivateKey::from_pkcs8_der(key)
                .map_err(|err| Error::InvalidKey(err.to_string()))?;
            check_modulus(header.block_size(), private_key.size())?;

            private_key
                .decrypt(Oaep::new::<Sha256>(), body)
                .map(|cleartext| Opened::Cleartext(Zeroizing::new(cleartext)))
                .map_err(|_| auth_failed())
        }
        Algorithm::DigestOnly => {
            if body.len() != DIGEST_LENGTH {
                return Err(Error::MalformedHeader {
                    offset,
                    reason: format!(
                        "digest block is {} bytes long (expected {})",
                        body.len(),
                        DIGEST_LENGTH
                    ),
                });
            }
            Ok(Opened::Digest(body.to_vec()))
        }
    }
}

fn check_modulus(block_size: BlockSize, modulus_bytes: usize) -> Result<(), Error> {
    match BlockSize::from_modulus_bytes(modulus_bytes) {
        Some(bs) if bs == block_size => Ok(()),
        _ => Err(Error::InvalidConfig(format!(
            "rsa modulus of {} bits does not match block size {:?}",
            modulus_bytes * 8,
            block_size
        ))),
    }
}

fn aead_seal<C: Aead + KeyInit>(key: &[u8], nonce: &[u8], cleartext: &[u8]) -> Result<Vec<u8>, Error> {
    let aead = C::new_from_slice(key).map_err(|_| Error::InvalidKeyLength(key.len()))?;
    aead.encrypt(aead::Nonce::<C>::from_slice(nonce), cleartext)
        .map_err(Error::AeadEncryption)
}

fn aead_open<C: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Option<Zeroizing<Vec<u8>>> {
    let aead = C::new_from_slice(key).ok()?;
    aead.decrypt(aead::Nonce::<C>::from_slice(nonce), ciphertext)
        .ok()
        .map(Zeroizing::new)
}
