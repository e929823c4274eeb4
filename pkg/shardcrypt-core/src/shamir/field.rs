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

use crate::shamir::Error;

use ark_ff::{BigInteger, PrimeField, Zero};
use ark_serialize::SerializationError;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Length in bytes of the canonical encoding of a [`FieldElement`].
pub const ELEMENT_LENGTH: usize = 32;

/// The prime fields that secrets can be shared over.
///
/// Both are the 254-bit fields of the BN254 (also known as `alt_bn128` or
/// BN256) pairing-friendly curve. The numeric value of each variant is the tag
/// used on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldType {
    /// Base field of BN254,
    /// `p = 21888242871839275222246405745257275088696311157297823662689037894645226208583`.
    Bn254Fq = 0,
    /// Scalar field of BN254,
    /// `r = 21888242871839275222246405745257275088548364400416034343698204186575808495617`.
    Bn254Fr = 1,
}

impl FieldType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(Self::Bn254Fq),
            1 => Ok(Self::Bn254Fr),
            _ => Err(Error::UnknownFieldType(tag)),
        }
    }
}

impl Default for FieldType {
    fn default() -> Self {
        Self::Bn254Fr
    }
}

/// An element of one of the supported [`FieldType`]s.
///
/// Arithmetic is not exposed on this type directly. The sharing code works on
/// the underlying arkworks field types (which are kept in Montgomery form) and
/// this wrapper only exists to carry the field type across API and
/// serialisation boundaries.
// NOTE: PartialEq is not timing-safe.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldElement {
    Bn254Fq(ark_bn254::Fq),
    Bn254Fr(ark_bn254::Fr),
}

impl From<ark_bn254::Fq> for FieldElement {
    fn from(elem: ark_bn254::Fq) -> Self {
        Self::Bn254Fq(elem)
    }
}

impl From<ark_bn254::Fr> for FieldElement {
    fn from(elem: ark_bn254::Fr) -> Self {
        Self::Bn254Fr(elem)
    }
}

impl FieldElement {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Bn254Fq(_) => FieldType::Bn254Fq,
            Self::Bn254Fr(_) => FieldType::Bn254Fr,
        }
    }

    /// Sample a uniformly random element of the given field.
    pub fn new_rand<R: CryptoRng + RngCore + ?Sized>(field_type: FieldType, r: &mut R) -> Self {
        match field_type {
            FieldType::Bn254Fq => Self::Bn254Fq(random_elem(r)),
            FieldType::Bn254Fr => Self::Bn254Fr(random_elem(r)),
        }
    }

    pub fn from_u64(field_type: FieldType, v: u64) -> Self {
        match field_type {
            FieldType::Bn254Fq => Self::Bn254Fq(v.into()),
            FieldType::Bn254Fr => Self::Bn254Fr(v.into()),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Self::Bn254Fq(x) => x.is_zero(),
            Self::Bn254Fr(x) => x.is_zero(),
        }
    }

    /// Canonical little-endian encoding of the element (out of Montgomery
    /// form).
    pub fn to_bytes(&self) -> [u8; ELEMENT_LENGTH] {
        match self {
            Self::Bn254Fq(x) => elem_to_bytes(x),
            Self::Bn254Fr(x) => elem_to_bytes(x),
        }
    }

    /// Parse the canonical little-endian encoding of an element of
    /// `field_type`. Values which are not fully reduced modulo the field prime
    /// are rejected.
    pub fn from_bytes<B: AsRef<[u8]>>(field_type: FieldType, bytes: B) -> Result<Self, Error> {
        let bytes = bytes.as_ref();
        if bytes.len() != ELEMENT_LENGTH {
            return Err(Error::InvalidElementLength(bytes.len()));
        }
        Ok(match field_type {
            FieldType::Bn254Fq => Self::Bn254Fq(elem_from_bytes(bytes)?),
            FieldType::Bn254Fr => Self::Bn254Fr(elem_from_bytes(bytes)?),
        })
    }
}

/// Glue between [`FieldElement`] and the concrete arkworks field types, so the
/// sharing code can be written once over any supported field.
pub(crate) trait SharingField: PrimeField + Into<FieldElement> {
    const FIELD_TYPE: FieldType;

    fn from_element(elem: &FieldElement) -> Option<Self>;
}

impl SharingField for ark_bn254::Fq {
    const FIELD_TYPE: FieldType = FieldType::Bn254Fq;

    fn from_element(elem: &FieldElement) -> Option<Self> {
        match elem {
            FieldElement::Bn254Fq(x) => Some(*x),
            _ => None,
        }
    }
}

impl SharingField for ark_bn254::Fr {
    const FIELD_TYPE: FieldType = FieldType::Bn254Fr;

    fn from_element(elem: &FieldElement) -> Option<Self> {
        match elem {
            FieldElement::Bn254Fr(x) => Some(*x),
            _ => None,
        }
    }
}

fn random_elem<F: PrimeField, R: CryptoRng + RngCore + ?Sized>(r: &mut R) -> F {
    // Reducing 64 uniform bytes modulo a 254-bit prime leaves a bias far below
    // anything observable.
    let mut bytes = [0u8; 2 * ELEMENT_LENGTH];
    r.fill_bytes(&mut bytes);
    F::from_le_bytes_mod_order(&bytes)
}

fn elem_to_bytes<F: PrimeField>(elem: &F) -> [u8; ELEMENT_LENGTH] {
    let mut bytes = [0u8; ELEMENT_LENGTH];
    let le = elem.into_bigint().to_bytes_le();
    bytes[..le.len()].copy_from_slice(&le);
    bytes
}

fn elem_from_bytes<F: PrimeField>(bytes: &[u8]) -> Result<F, Error> {
    F::deserialize_compressed(bytes)
        .map_err(|err: SerializationError| Error::InvalidElement(err.to_string()))
}

#[cfg(test)]
impl quickcheck::Arbitrary for FieldType {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        *g.choose(&[FieldType::Bn254Fq, FieldType::Bn254Fr])
            .expect("choice list is not empty")
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for FieldElement {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let mut bytes = [0u8; ELEMENT_LENGTH];
        crate::shamir::arbitrary_fill_slice(g, &mut bytes);
        match <FieldType as quickcheck::Arbitrary>::arbitrary(g) {
            FieldType::Bn254Fq => Self::Bn254Fq(ark_bn254::Fq::from_le_bytes_mod_order(&bytes)),
            FieldType::Bn254Fr => Self::Bn254Fr(ark_bn254::Fr::from_le_bytes_mod_order(&bytes)),
        }
    }
}

/// A polynomial over a prime field.
// The coefficients are in *increasing* degree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Polynomial<F: PrimeField>(Vec<F>);

impl<F: PrimeField> Polynomial<F> {
    /// Construct a polynomial of degree `n` with the given constant term and
    /// uniformly random higher-order coefficients.
    pub(crate) fn new_rand<R: CryptoRng + RngCore + ?Sized>(
        constant: F,
        n: usize,
        r: &mut R,
    ) -> Self {
        Self(
            std::iter::once(constant)
                .chain((0..n).map(|_| random_elem(r)))
                .collect(),
        )
    }

    #[allow(unused)]
    pub(crate) fn degree(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Retrieve the constant term of the polynomial.
    #[cfg(test)]
    pub(crate) fn constant(&self) -> F {
        self.0.first().copied().unwrap_or_else(F::zero)
    }

    /// Evaluate the polynomial at a given `x` value.
    pub(crate) fn evaluate(&self, x: F) -> F {
        // Horner's method, walking the coefficients from the highest degree
        // down.
        self.0
            .iter()
            .rev()
            .fold(F::zero(), |acc, coeff| *coeff + x * acc)
    }

    /// Interpolate the constant term of the polynomial passing through all of
    /// the given points, using [Lagrange interpolation][lagrange].
    ///
    /// With `x = 0` substituted, each basis polynomial collapses to
    ///
    /// ```text
    ///   l_j(0) = \prod_{m=0,m!=j}^{k} \frac{x_m}{x_m-x_j}
    /// ```
    ///
    /// so only one inversion is needed per point.
    ///
    /// [lagrange]: https://en.wikipedia.org/wiki/Lagrange_polynomial
    pub(crate) fn lagrange_constant<P: AsRef<[(F, F)]>>(points: P) -> Result<F, Error> {
        let points = points.as_ref();
        if points.is_empty() {
            return Err(Error::NoShares);
        }

        points
            .iter()
            .enumerate()
            .try_fold(F::zero(), |acc, (j, (xj, yj))| {
                let (num, den) = points
                    .iter()
                    .enumerate()
                    .filter(|(m, _)| *m != j)
                    .fold((F::one(), F::one()), |(num, den), (_, (xm, _))| {
                        (num * xm, den * (*xm - xj))
                    });
                let den_inv = den.inverse().ok_or(Error::NonInvertiblePoint)?;
                Ok(acc + *yj * num * den_inv)
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use ark_bn254::Fr;
    use ark_ff::Field;
    use quickcheck::TestResult;
    use rand::rngs::OsRng;

    #[derive(Clone, Debug)]
    struct SmallPoly(Polynomial<Fr>);

    impl quickcheck::Arbitrary for SmallPoly {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let degree = usize::arbitrary(g) % 16;
            SmallPoly(Polynomial::new_rand(Fr::from(u64::arbitrary(g)), degree, &mut OsRng))
        }
    }

    // Inefficient, but "obviously correct" implementation of
    // Polynomial::evaluate(), to compare against for the test.
    fn manual_poly(poly: &Polynomial<Fr>, x: Fr) -> Fr {
        poly.0
            .iter()
            .enumerate()
            .map(|(n, coeff)| *coeff * x.pow([n as u64]))
            .fold(Fr::zero(), |acc, term| acc + term)
    }

    #[quickcheck]
    fn polynomial_evaluate(poly: SmallPoly, x: u64) -> bool {
        let x = Fr::from(x);
        poly.0.evaluate(x) == manual_poly(&poly.0, x)
    }

    #[quickcheck]
    fn polynomial_constant(poly: SmallPoly) -> bool {
        poly.0.evaluate(Fr::from(0u64)) == poly.0.constant()
    }

    #[quickcheck]
    fn polynomial_lagrange_constant(poly: SmallPoly) -> bool {
        let n = poly.0.degree() as u64;
        let points = (1..=n + 1)
            .map(|x| (Fr::from(x), poly.0.evaluate(Fr::from(x))))
            .collect::<Vec<_>>();
        let constant = Polynomial::<Fr>::lagrange_constant(points.as_slice())
            .expect("should not get errors from lagrange_constant");

        poly.0.constant() == constant
    }

    #[test]
    fn lagrange_rejects_repeated_x() {
        let points = [
            (Fr::from(2u64), Fr::from(7u64)),
            (Fr::from(2u64), Fr::from(9u64)),
        ];
        assert!(matches!(
            Polynomial::<Fr>::lagrange_constant(points),
            Err(Error::NonInvertiblePoint)
        ));
    }

    #[quickcheck]
    fn field_element_bytes_roundtrip(elem: FieldElement) -> bool {
        FieldElement::from_bytes(elem.field_type(), elem.to_bytes()).unwrap() == elem
    }

    #[quickcheck]
    fn field_element_wrong_length(bytes: Vec<u8>) -> TestResult {
        if bytes.len() == ELEMENT_LENGTH {
            return TestResult::discard();
        }
        TestResult::from_bool(FieldElement::from_bytes(FieldType::Bn254Fr, bytes).is_err())
    }

    #[test]
    fn field_element_rejects_unreduced() {
        // All ones is larger than both BN254 primes.
        let bytes = [0xffu8; ELEMENT_LENGTH];
        FieldElement::from_bytes(FieldType::Bn254Fq, bytes).unwrap_err();
        FieldElement::from_bytes(FieldType::Bn254Fr, bytes).unwrap_err();
    }

    #[test]
    fn field_element_little_endian() {
        let one = FieldElement::from_u64(FieldType::Bn254Fr, 0x0102);
        let bytes = one.to_bytes();
        assert_eq!(&bytes[..3], &[0x02, 0x01, 0x00]);
        assert!(bytes[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn field_type_tags() {
        assert_eq!(FieldType::from_tag(0).unwrap(), FieldType::Bn254Fq);
        assert_eq!(FieldType::from_tag(1).unwrap(), FieldType::Bn254Fr);
        assert!(matches!(
            FieldType::from_tag(2),
            Err(Error::UnknownFieldType(2))
        ));
        assert_eq!(FieldType::default().tag(), 1);
    }

    #[test]
    fn random_elements_differ() {
        let a = FieldElement::new_rand(FieldType::Bn254Fr, &mut OsRng);
        let b = FieldElement::new_rand(FieldType::Bn254Fr, &mut OsRng);
        assert_ne!(a, b);
        assert!(!a.is_zero());
    }
}
