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

use crate::shamir::{
    field::{FieldElement, FieldType, Polynomial, SharingField},
    Error, Share,
};

use itertools::Itertools;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Parameters for splitting one secret.
///
/// The same `Config` must be used to reconstruct the secret as was used to
/// split it. It is immutable once constructed, and deserialisation goes through
/// the same validation as [`Config::new`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct Config {
    threshold: u32,
    max_shares: u32,
    field_type: FieldType,
}

#[derive(Deserialize)]
struct RawConfig {
    threshold: u32,
    max_shares: u32,
    field_type: FieldType,
}

impl TryFrom<RawConfig> for Config {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        Config::new(raw.threshold, raw.max_shares, raw.field_type)
    }
}

impl Config {
    pub fn new(threshold: u32, max_shares: u32, field_type: FieldType) -> Result<Self, Error> {
        if threshold == 0 {
            return Err(Error::ZeroThreshold);
        }
        if threshold > max_shares {
            return Err(Error::ThresholdTooLarge {
                threshold,
                max_shares,
            });
        }
        Ok(Self {
            threshold,
            max_shares,
            field_type,
        })
    }

    /// Minimum number of shares needed to reconstruct the secret.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Number of shares produced by [`Config::generate_shares`].
    pub fn max_shares(&self) -> u32 {
        self.max_shares
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Generate a fresh random secret in this configuration's field.
    pub fn new_secret(&self) -> FieldElement {
        FieldElement::new_rand(self.field_type, &mut OsRng)
    }

    /// Split `secret` into [`Config::max_shares`] shares, any
    /// [`Config::threshold`] of which can reconstruct it.
    pub fn generate_shares(&self, secret: &FieldElement) -> Result<Vec<Share>, Error> {
        self.generate_shares_with_rng(secret, &mut OsRng)
    }

    pub fn generate_shares_with_rng<R: CryptoRng + RngCore + ?Sized>(
        &self,
        secret: &FieldElement,
        r: &mut R,
    ) -> Result<Vec<Share>, Error> {
        tracing::debug!(
            threshold = self.threshold,
            max_shares = self.max_shares,
            field = ?self.field_type,
            "splitting secret"
        );
        match self.field_type {
            FieldType::Bn254Fq => self.split::<ark_bn254::Fq, R>(secret, r),
            FieldType::Bn254Fr => self.split::<ark_bn254::Fr, R>(secret, r),
        }
    }

    fn split<F: SharingField, R: CryptoRng + RngCore + ?Sized>(
        &self,
        secret: &FieldElement,
        r: &mut R,
    ) -> Result<Vec<Share>, Error> {
        let secret = F::from_element(secret).ok_or(Error::FieldMismatch {
            expected: F::FIELD_TYPE,
            got: secret.field_type(),
        })?;

        // p(x) = secret + a_1 x + ... + a_{t-1} x^{t-1}
        let poly = Polynomial::<F>::new_rand(secret, (self.threshold - 1) as usize, r);

        // Never evaluate at x = 0, that is the secret itself.
        Ok((1..=u64::from(self.max_shares))
            .map(|x| Share::new(x, poly.evaluate(F::from(x)).into()))
            .collect())
    }

    /// Reconstruct the secret from a set of shares.
    ///
    /// **The number of shares is not checked against the threshold.** Given
    /// fewer than [`Config::threshold`] genuine shares this returns a
    /// well-formed field element which is (with overwhelming probability) not
    /// the original secret. Callers must check the result out-of-band, for
    /// instance by using it to open a container.
    ///
    /// Shares with an index of zero or with repeated indices are rejected, as
    /// is an empty set of shares.
    pub fn generate_secret<S: AsRef<[Share]>>(&self, shares: S) -> Result<FieldElement, Error> {
        let shares = shares.as_ref();
        if shares.is_empty() {
            return Err(Error::NoShares);
        }
        if shares.iter().any(|s| s.index == 0) {
            return Err(Error::ZeroIndex);
        }
        if let Some(index) = shares.iter().map(Share::index).duplicates().next() {
            return Err(Error::DuplicateIndex(index));
        }
        if shares.len() < self.threshold as usize {
            tracing::debug!(
                threshold = self.threshold,
                num_shares = shares.len(),
                "reconstructing from fewer shares than the threshold"
            );
        }

        match self.field_type {
            FieldType::Bn254Fq => Self::interpolate::<ark_bn254::Fq>(shares),
            FieldType::Bn254Fr => Self::interpolate::<ark_bn254::Fr>(shares),
        }
    }

    fn interpolate<F: SharingField>(shares: &[Share]) -> Result<FieldElement, Error> {
        let points = shares
            .iter()
            .map(|s| {
                F::from_element(&s.value)
                    .map(|y| (F::from(s.index), y))
                    .ok_or(Error::FieldMismatch {
                        expected: F::FIELD_TYPE,
                        got: s.field_type(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Polynomial::<F>::lagrange_constant(points).map(Into::into)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use quickcheck::TestResult;
    use rand::seq::index::sample;

    fn reconstruct_all_subsets(threshold: u32, max_shares: u32, field_type: FieldType) {
        let config = Config::new(threshold, max_shares, field_type).unwrap();
        let secret = config.new_secret();
        let shares = config.generate_shares(&secret).unwrap();
        assert_eq!(shares.len(), max_shares as usize);

        for subset in shares.iter().cloned().combinations(threshold as usize) {
            assert_eq!(
                config.generate_secret(&subset).unwrap(),
                secret,
                "t={} n={} subset={:?}",
                threshold,
                max_shares,
                subset.iter().map(Share::index).collect::<Vec<_>>()
            );
        }
    }

    fn reconstruct_sampled_subsets(threshold: u32, max_shares: u32, field_type: FieldType) {
        let config = Config::new(threshold, max_shares, field_type).unwrap();
        let secret = config.new_secret();
        let shares = config.generate_shares(&secret).unwrap();

        for _ in 0..16 {
            let subset = sample(&mut OsRng, max_shares as usize, threshold as usize)
                .into_iter()
                .map(|i| shares[i].clone())
                .collect::<Vec<_>>();
            assert_eq!(config.generate_secret(subset).unwrap(), secret);
        }
    }

    #[test]
    fn threshold_every_subset_small() {
        for max_shares in 1..=10 {
            for threshold in 1..=max_shares {
                reconstruct_all_subsets(threshold, max_shares, FieldType::Bn254Fr);
            }
        }
    }

    // Checking every subset for n up to 20 means ~2^20 interpolations, which
    // is far too slow for debug builds. Sample subsets instead, and only go
    // exhaustive on --release.
    #[test]
    fn threshold_large() {
        for max_shares in 11..=20 {
            for threshold in 1..=max_shares {
                #[cfg(debug_assertions)]
                reconstruct_sampled_subsets(threshold, max_shares, FieldType::Bn254Fr);
                #[cfg(not(debug_assertions))]
                {
                    if max_shares <= 14 {
                        reconstruct_all_subsets(threshold, max_shares, FieldType::Bn254Fr);
                    } else {
                        reconstruct_sampled_subsets(threshold, max_shares, FieldType::Bn254Fr);
                    }
                }
            }
        }
    }

    #[test]
    fn threshold_base_field() {
        for max_shares in 1..=6 {
            for threshold in 1..=max_shares {
                reconstruct_all_subsets(threshold, max_shares, FieldType::Bn254Fq);
            }
        }
    }

    #[test]
    fn bn254_three_of_five() {
        let config = Config::new(3, 5, FieldType::Bn254Fr).unwrap();
        let secret = FieldElement::new_rand(FieldType::Bn254Fr, &mut OsRng);
        let shares = config.generate_shares(&secret).unwrap();
        assert_eq!(
            shares.iter().map(Share::index).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        let pick = |idxs: &[u64]| {
            shares
                .iter()
                .filter(|s| idxs.contains(&s.index()))
                .cloned()
                .collect::<Vec<_>>()
        };

        assert_eq!(config.generate_secret(pick(&[1, 3, 5])).unwrap(), secret);
        assert_ne!(config.generate_secret(pick(&[1, 3])).unwrap(), secret);
    }

    #[test]
    fn insufficient_shares() {
        for threshold in 2..=6 {
            let config = Config::new(threshold, 8, FieldType::Bn254Fq).unwrap();
            for _ in 0..32 {
                let secret = config.new_secret();
                let shares = config.generate_shares(&secret).unwrap();
                let subset = sample(&mut OsRng, 8, threshold as usize - 1)
                    .into_iter()
                    .map(|i| shares[i].clone())
                    .collect::<Vec<_>>();
                assert_ne!(config.generate_secret(subset).unwrap(), secret);
            }
        }
    }

    #[test]
    fn extra_shares_still_reconstruct() {
        let config = Config::new(3, 7, FieldType::Bn254Fr).unwrap();
        let secret = config.new_secret();
        let shares = config.generate_shares(&secret).unwrap();
        assert_eq!(config.generate_secret(&shares).unwrap(), secret);
        assert_eq!(config.generate_secret(&shares[2..]).unwrap(), secret);
    }

    #[test]
    fn threshold_one_shares_are_the_secret() {
        let config = Config::new(1, 4, FieldType::Bn254Fr).unwrap();
        let secret = config.new_secret();
        let shares = config.generate_shares(&secret).unwrap();
        assert!(shares.iter().all(|s| *s.value() == secret));
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            Config::new(0, 5, FieldType::Bn254Fr),
            Err(Error::ZeroThreshold)
        ));
        assert!(matches!(
            Config::new(6, 5, FieldType::Bn254Fr),
            Err(Error::ThresholdTooLarge {
                threshold: 6,
                max_shares: 5
            })
        ));
        let config = Config::new(5, 5, FieldType::Bn254Fq).unwrap();
        assert_eq!(config.threshold(), 5);
        assert_eq!(config.max_shares(), 5);
        assert_eq!(config.field_type(), FieldType::Bn254Fq);
    }

    #[test]
    fn config_deserialize_is_validated() {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(
            &RawConfigOut {
                threshold: 4,
                max_shares: 2,
                field_type: FieldType::Bn254Fr,
            },
            &mut bytes,
        )
        .unwrap();
        ciborium::de::from_reader::<Config, _>(bytes.as_slice()).unwrap_err();

        let config = Config::new(2, 4, FieldType::Bn254Fr).unwrap();
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&config, &mut bytes).unwrap();
        let config2: Config = ciborium::de::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(config, config2);
    }

    #[derive(Serialize)]
    struct RawConfigOut {
        threshold: u32,
        max_shares: u32,
        field_type: FieldType,
    }

    #[test]
    fn field_mismatch() {
        let config = Config::new(2, 3, FieldType::Bn254Fr).unwrap();
        let wrong = FieldElement::from_u64(FieldType::Bn254Fq, 9);
        assert!(matches!(
            config.generate_shares(&wrong),
            Err(Error::FieldMismatch {
                expected: FieldType::Bn254Fr,
                got: FieldType::Bn254Fq
            })
        ));

        let other = Config::new(2, 3, FieldType::Bn254Fq).unwrap();
        let shares = other.generate_shares(&wrong).unwrap();
        assert!(matches!(
            config.generate_secret(shares),
            Err(Error::FieldMismatch { .. })
        ));
    }

    #[test]
    fn degenerate_share_sets() {
        let config = Config::new(2, 3, FieldType::Bn254Fr).unwrap();
        let secret = config.new_secret();
        let shares = config.generate_shares(&secret).unwrap();

        assert!(matches!(
            config.generate_secret(Vec::<Share>::new()),
            Err(Error::NoShares)
        ));
        assert!(matches!(
            config.generate_secret(vec![shares[0].clone(), shares[0].clone()]),
            Err(Error::DuplicateIndex(1))
        ));
        let zero = Share::new(0, *shares[1].value());
        assert!(matches!(
            config.generate_secret(vec![zero, shares[2].clone()]),
            Err(Error::ZeroIndex)
        ));
    }

    #[quickcheck]
    fn shamir_roundtrip_smoke(threshold: u8, extra: u8) -> TestResult {
        if threshold < 1 || threshold > 32 {
            return TestResult::discard();
        }
        let threshold = u32::from(threshold);
        let max_shares = threshold + u32::from(extra % 8);
        let config = Config::new(threshold, max_shares, FieldType::Bn254Fr).unwrap();
        let secret = config.new_secret();
        let shares = config.generate_shares(&secret).unwrap();
        let subset = sample(&mut OsRng, max_shares as usize, threshold as usize)
            .into_iter()
            .map(|i| shares[i].clone())
            .collect::<Vec<_>>();

        TestResult::from_bool(config.generate_secret(subset).unwrap() == secret)
    }
}
