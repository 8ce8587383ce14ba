//! Fixed-point encoding of plaintext numbers into `Z/nZ`
//!
//! A number is represented as `mantissa * 16^exponent`. The mantissa is reduced modulo `n`,
//! so negative values occupy the top of the range: `[0, max_int]` holds non-negative
//! mantissas and `[n - max_int, n)` holds negative ones. Anything in between can only be
//! produced by an overflowing computation and is rejected when decoding.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Float, One, Signed, ToPrimitive, Zero};

use crate::error::{PaillierError, Result};
use crate::keys::PublicKey;

/// Base of the exponent
pub const BASE: u32 = 16;

/// `log2(BASE)`
pub const LOG2_BASE: i32 = 4;

/// Significand bits of an IEEE-754 double, hidden bit included
pub const FLOAT_MANTISSA_BITS: i32 = 53;

/// A plaintext encoded for a particular public key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedNumber {
    pub(crate) public_key: PublicKey,
    pub(crate) encoding: BigUint,
    pub(crate) exponent: i32,
}

impl EncodedNumber {
    /// Encode a float with the smallest exponent that keeps all of its significant bits.
    ///
    /// ```rust
    /// use paillier_he::{EncodedNumber, KeyPair};
    ///
    /// let keypair = KeyPair::generate(128).unwrap();
    /// let encoded = EncodedNumber::encode_f64(&keypair.public_key, 10.0).unwrap();
    /// assert_eq!(encoded.exponent(), -13);
    /// assert_eq!(encoded.decode().unwrap(), 10.0);
    /// ```
    pub fn encode_f64(public_key: &PublicKey, value: f64) -> Result<Self> {
        Self::encode_f64_with_max_exponent(public_key, value, None)
    }

    /// Encode a float, using at most `max_exponent` as the exponent.
    ///
    /// A lower exponent only adds trailing zero digits, so the encoding stays exact.
    pub fn encode_f64_with_max_exponent(
        public_key: &PublicKey,
        value: f64,
        max_exponent: Option<i32>,
    ) -> Result<Self> {
        if !value.is_finite() {
            return Err(PaillierError::EncodingOverflow(format!(
                "{value} is not a finite number"
            )));
        }

        // value = sign * mantissa * 2^exp2
        let (mantissa, exp2, sign) = Float::integer_decode(value);

        let frexp_exponent = if mantissa == 0 {
            0
        } else {
            (u64::BITS - mantissa.leading_zeros()) as i32 + i32::from(exp2)
        };
        let precision_exponent = (frexp_exponent - FLOAT_MANTISSA_BITS).div_euclid(LOG2_BASE);
        let exponent = max_exponent.map_or(precision_exponent, |max| max.min(precision_exponent));

        if mantissa == 0 {
            return Self::from_mantissa(public_key, &BigInt::from(0u8), exponent);
        }

        // The exponent never exceeds the precision exponent, so the shift is non-negative.
        let shift = i64::from(exp2) - i64::from(LOG2_BASE) * i64::from(exponent);
        let shift = u64::try_from(shift).map_err(|_| {
            PaillierError::InvalidParameter(format!(
                "exponent {exponent} would drop significant bits of {value}"
            ))
        })?;
        if shift >= public_key.bit_size() {
            return Err(PaillierError::EncodingOverflow(format!(
                "{value} at exponent {exponent} does not fit a {}-bit modulus",
                public_key.bit_size()
            )));
        }

        let magnitude = BigUint::from(mantissa) << shift;
        let sign = if sign < 0 { Sign::Minus } else { Sign::Plus };
        Self::from_mantissa(public_key, &BigInt::from_biguint(sign, magnitude), exponent)
    }

    /// Encode an integer exactly, with exponent 0
    pub fn encode_integer(public_key: &PublicKey, value: &BigInt) -> Result<Self> {
        Self::from_mantissa(public_key, value, 0)
    }

    /// Encode `mantissa * 16^exponent`
    pub fn from_mantissa(public_key: &PublicKey, mantissa: &BigInt, exponent: i32) -> Result<Self> {
        let max_int = public_key.max_int();
        if mantissa.magnitude() > &max_int {
            return Err(PaillierError::EncodingOverflow(format!(
                "mantissa does not fit a {}-bit modulus",
                public_key.bit_size()
            )));
        }

        let encoding = match mantissa.sign() {
            Sign::Minus => &public_key.n - mantissa.magnitude(),
            _ => mantissa.magnitude().clone(),
        };

        Ok(EncodedNumber {
            public_key: public_key.clone(),
            encoding,
            exponent,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The mantissa reduced modulo `n`
    pub fn encoding(&self) -> &BigUint {
        &self.encoding
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// Recover the signed mantissa, detecting overflow
    pub fn mantissa(&self) -> Result<BigInt> {
        let n = &self.public_key.n;
        let max_int = self.public_key.max_int();

        if &self.encoding >= n {
            Err(PaillierError::EncodingOverflow(
                "encoding is not reduced modulo n".to_string(),
            ))
        } else if self.encoding <= max_int {
            Ok(BigInt::from(self.encoding.clone()))
        } else if self.encoding >= n - &max_int {
            Ok(-BigInt::from(n - &self.encoding))
        } else {
            Err(PaillierError::EncodingOverflow(
                "value lies outside the representable range; the computation overflowed"
                    .to_string(),
            ))
        }
    }

    /// Decode to the nearest `f64`. Values beyond the `f64` range are an overflow.
    pub fn decode(&self) -> Result<f64> {
        let mantissa = self.mantissa()?;
        let value = scaled_to_f64(&mantissa, i64::from(LOG2_BASE) * i64::from(self.exponent));
        if !value.is_finite() {
            return Err(PaillierError::EncodingOverflow(format!(
                "value with exponent {} exceeds the f64 range",
                self.exponent
            )));
        }
        Ok(value)
    }

    /// Re-express the number with a smaller exponent, multiplying the mantissa by `16^Δ`
    pub fn decrease_exponent_to(&self, new_exponent: i32) -> Result<Self> {
        let delta = exponent_delta(self.exponent, new_exponent)?;
        let encoding = if self.encoding.is_zero() {
            BigUint::zero()
        } else {
            (&self.encoding * base_power(&self.public_key, delta)?) % &self.public_key.n
        };

        Ok(EncodedNumber {
            public_key: self.public_key.clone(),
            encoding,
            exponent: new_exponent,
        })
    }
}

/// `current - new`, which must not be negative
pub(crate) fn exponent_delta(current: i32, new: i32) -> Result<u64> {
    u64::try_from(i64::from(current) - i64::from(new)).map_err(|_| {
        PaillierError::InvalidParameter(format!(
            "new exponent {new} must not exceed the current exponent {current}"
        ))
    })
}

/// `16^delta`, refused once it reaches the modulus size.
///
/// Any nonzero mantissa scaled by such a power exceeds `max_int`.
pub(crate) fn base_power(public_key: &PublicKey, delta: u64) -> Result<BigUint> {
    let shift = delta.saturating_mul(LOG2_BASE as u64);
    if shift >= public_key.bit_size() {
        return Err(PaillierError::EncodingOverflow(format!(
            "rescaling by 16^{delta} exceeds a {}-bit modulus",
            public_key.bit_size()
        )));
    }
    Ok(BigUint::one() << shift)
}

/// `mantissa * 2^exp2` as the nearest `f64`
fn scaled_to_f64(mantissa: &BigInt, exp2: i64) -> f64 {
    let magnitude = mantissa.magnitude();
    let dropped = magnitude.bits().saturating_sub(128);
    let top = (magnitude >> dropped).to_f64().unwrap_or(f64::INFINITY);
    let value = scale_by_power_of_two(top, exp2 + dropped as i64);

    if mantissa.is_negative() {
        -value
    } else {
        value
    }
}

/// `value * 2^exp` without overflowing the intermediate power of two
fn scale_by_power_of_two(mut value: f64, mut exp: i64) -> f64 {
    const STEP: i64 = 1000;

    while exp > STEP && value.is_finite() {
        value *= 2f64.powi(STEP as i32);
        exp -= STEP;
    }
    while exp < -STEP && value != 0.0 {
        value *= 2f64.powi(-STEP as i32);
        exp += STEP;
    }

    value * 2f64.powi(exp.clamp(-2 * STEP, 2 * STEP) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use num_bigint::ToBigInt;

    fn test_key() -> PublicKey {
        KeyPair::generate(128).unwrap().public_key
    }

    #[test]
    fn test_float_exponents() {
        let public_key = test_key();

        let ten = EncodedNumber::encode_f64(&public_key, 10.0).unwrap();
        assert_eq!(ten.exponent(), -13);
        assert_eq!(ten.mantissa().unwrap(), 10.to_bigint().unwrap() << 52);

        let zero = EncodedNumber::encode_f64(&public_key, 0.0).unwrap();
        assert_eq!(zero.exponent(), -14);
        assert_eq!(zero.decode().unwrap(), 0.0);

        let quarter = EncodedNumber::encode_f64(&public_key, 0.25).unwrap();
        assert_eq!(quarter.exponent(), -14);
    }

    #[test]
    fn test_round_trip_is_exact() {
        let public_key = test_key();
        for value in [10.0, 0.1, -2.5, 1e6, -123.456, 1e-300, 1e300, f64::MIN_POSITIVE] {
            let encoded = EncodedNumber::encode_f64(&public_key, value).unwrap();
            assert_eq!(encoded.decode().unwrap(), value, "{value}");
        }
    }

    #[test]
    fn test_negative_values_wrap_modulo_n() {
        let public_key = test_key();
        let encoded = EncodedNumber::encode_integer(&public_key, &(-5).to_bigint().unwrap()).unwrap();

        assert_eq!(encoded.exponent(), 0);
        assert_eq!(encoded.encoding(), &(&public_key.n - 5u32));
        assert_eq!(encoded.mantissa().unwrap(), (-5).to_bigint().unwrap());
        assert_eq!(encoded.decode().unwrap(), -5.0);
    }

    #[test]
    fn test_max_exponent_adds_precision() {
        let public_key = test_key();
        let encoded =
            EncodedNumber::encode_f64_with_max_exponent(&public_key, 1.5, Some(-20)).unwrap();
        assert_eq!(encoded.exponent(), -20);
        assert_eq!(encoded.decode().unwrap(), 1.5);

        // A larger maximum does not reduce precision
        let encoded =
            EncodedNumber::encode_f64_with_max_exponent(&public_key, 1.5, Some(5)).unwrap();
        assert_eq!(encoded.exponent(), -13);
    }

    #[test]
    fn test_overflow_is_detected() {
        let tiny = KeyPair::generate(16).unwrap().public_key;

        assert!(matches!(
            EncodedNumber::encode_f64(&tiny, 10.0),
            Err(PaillierError::EncodingOverflow(_))
        ));
        assert!(EncodedNumber::encode_integer(&tiny, &7.to_bigint().unwrap()).is_ok());
        assert!(matches!(
            EncodedNumber::encode_f64(&tiny, f64::NAN),
            Err(PaillierError::EncodingOverflow(_))
        ));

        let in_gap = EncodedNumber {
            encoding: tiny.max_int() + 1u32,
            public_key: tiny.clone(),
            exponent: 0,
        };
        assert!(matches!(
            in_gap.mantissa(),
            Err(PaillierError::EncodingOverflow(_))
        ));
    }

    #[test]
    fn test_decode_beyond_f64_range_overflows() {
        let public_key = test_key();
        let mut encoded = EncodedNumber::encode_f64(&public_key, 1.0).unwrap();
        encoded.exponent = 300;

        assert!(matches!(
            encoded.decode(),
            Err(PaillierError::EncodingOverflow(_))
        ));

        encoded.exponent = -300;
        assert_eq!(encoded.decode().unwrap(), 0.0);
    }

    #[test]
    fn test_rescaling_is_bounded_by_modulus() {
        let public_key = test_key();
        let encoded = EncodedNumber::encode_f64(&public_key, 2.0).unwrap();

        assert!(matches!(
            encoded.decrease_exponent_to(-2_000_000_000),
            Err(PaillierError::EncodingOverflow(_))
        ));
        assert!(matches!(
            encoded.decrease_exponent_to(i32::MIN),
            Err(PaillierError::EncodingOverflow(_))
        ));

        assert!(matches!(
            EncodedNumber::encode_f64_with_max_exponent(&public_key, 0.5, Some(-2_000_000_000)),
            Err(PaillierError::EncodingOverflow(_))
        ));

        let zero = EncodedNumber::encode_integer(&public_key, &0.to_bigint().unwrap()).unwrap();
        let lowered = zero.decrease_exponent_to(-2_000_000_000).unwrap();
        assert_eq!(lowered.decode().unwrap(), 0.0);
    }

    #[test]
    fn test_decrease_exponent() {
        let public_key = test_key();
        let encoded = EncodedNumber::encode_f64(&public_key, -3.75).unwrap();

        let lowered = encoded.decrease_exponent_to(encoded.exponent() - 2).unwrap();
        assert_eq!(lowered.exponent(), encoded.exponent() - 2);
        assert_eq!(lowered.decode().unwrap(), -3.75);

        assert!(matches!(
            encoded.decrease_exponent_to(encoded.exponent() + 1),
            Err(PaillierError::InvalidParameter(_))
        ));
    }
}
