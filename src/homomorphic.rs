//! Homomorphic operations on ciphertexts

use num_bigint::BigUint;
use num_traits::One;
use rand::thread_rng;
use std::ops::{Add, Mul, Neg, Sub};
use tracing::debug;

use crate::encoding::{base_power, exponent_delta, EncodedNumber};
use crate::error::{PaillierError, Result};
use crate::keys::PublicKey;
use crate::types::EncryptedNumber;
use crate::utils::{mod_exp, mod_inverse, random_coprime};

/// Trait for homomorphic operations
pub trait HomomorphicOperations {
    /// Homomorphic addition of two ciphertexts
    fn add(&self, a: &EncryptedNumber, b: &EncryptedNumber) -> Result<EncryptedNumber>;

    /// Sum a non-empty sequence of ciphertexts, first to last
    fn add_many(&self, values: &[EncryptedNumber]) -> Result<EncryptedNumber>;

    /// Add a plaintext scalar to a ciphertext
    fn add_scalar(&self, a: &EncryptedNumber, scalar: f64) -> Result<EncryptedNumber>;

    /// Multiply a ciphertext by a plaintext scalar
    fn scalar_multiply(&self, a: &EncryptedNumber, scalar: f64) -> Result<EncryptedNumber>;

    /// Multiply a ciphertext by an encoded plaintext
    fn multiply_encoded(&self, a: &EncryptedNumber, k: &EncodedNumber) -> Result<EncryptedNumber>;

    /// Homomorphic negation
    fn negate(&self, a: &EncryptedNumber) -> Result<EncryptedNumber>;

    /// Homomorphic subtraction
    fn subtract(&self, a: &EncryptedNumber, b: &EncryptedNumber) -> Result<EncryptedNumber>;

    /// Compute `sum(coefficients[i] * values[i])`
    fn linear_combination(
        &self,
        values: &[EncryptedNumber],
        coefficients: &[f64],
    ) -> Result<EncryptedNumber>;

    /// Re-randomize a ciphertext (produces a different encryption of the same plaintext)
    fn rerandomize(&self, a: &EncryptedNumber) -> Result<EncryptedNumber>;
}

impl PublicKey {
    fn ensure_same_key(&self, value: &EncryptedNumber) -> Result<()> {
        if value.public_key.n != self.n {
            return Err(PaillierError::KeyMismatch);
        }
        Ok(())
    }

    /// Multiply the plaintext by `k`, where `k` is an encoding in `[0, n)`.
    ///
    /// Negative encodings are applied by inverting the ciphertext and raising it to
    /// `n - k`, which keeps the exponent small.
    fn raw_multiply(&self, ciphertext: &BigUint, k: &BigUint) -> Result<BigUint> {
        let n_squared = self.n_squared();
        let max_int = self.max_int();

        if k >= &(&self.n - &max_int) {
            let inverse = mod_inverse(ciphertext, &n_squared).ok_or_else(|| {
                PaillierError::InvalidParameter(
                    "ciphertext is not invertible modulo n^2".to_string(),
                )
            })?;
            let negated = &self.n - k;
            Ok(mod_exp(&inverse, &negated, &n_squared))
        } else if k <= &max_int {
            Ok(mod_exp(ciphertext, k, &n_squared))
        } else {
            Err(PaillierError::EncodingOverflow(
                "scalar lies outside the representable range".to_string(),
            ))
        }
    }
}

impl EncryptedNumber {
    /// Re-express the ciphertext with a smaller exponent by raising it to `16^Δ`,
    /// which multiplies the plaintext mantissa by the same factor.
    ///
    /// A `Δ` whose power reaches the modulus size fails with `EncodingOverflow`, even
    /// for an encrypted zero, since the mantissa is hidden.
    pub fn decrease_exponent_to(&self, new_exponent: i32) -> Result<EncryptedNumber> {
        let delta = exponent_delta(self.exponent, new_exponent)?;
        let ciphertext = mod_exp(
            &self.ciphertext,
            &base_power(&self.public_key, delta)?,
            &self.public_key.n_squared(),
        );

        Ok(EncryptedNumber {
            public_key: self.public_key.clone(),
            ciphertext,
            exponent: new_exponent,
        })
    }
}

impl HomomorphicOperations for PublicKey {
    fn add(&self, a: &EncryptedNumber, b: &EncryptedNumber) -> Result<EncryptedNumber> {
        self.ensure_same_key(a)?;
        self.ensure_same_key(b)?;

        // Align to the finer of the two scales before combining
        let (a, b) = match a.exponent.cmp(&b.exponent) {
            std::cmp::Ordering::Greater => {
                debug!(from = a.exponent, to = b.exponent, "aligning left operand");
                (a.decrease_exponent_to(b.exponent)?, b.clone())
            }
            std::cmp::Ordering::Less => {
                debug!(from = b.exponent, to = a.exponent, "aligning right operand");
                (a.clone(), b.decrease_exponent_to(a.exponent)?)
            }
            std::cmp::Ordering::Equal => (a.clone(), b.clone()),
        };

        let ciphertext = (&a.ciphertext * &b.ciphertext) % self.n_squared();

        Ok(EncryptedNumber {
            public_key: self.clone(),
            ciphertext,
            exponent: a.exponent,
        })
    }

    fn add_many(&self, values: &[EncryptedNumber]) -> Result<EncryptedNumber> {
        let (first, rest) = values.split_first().ok_or(PaillierError::EmptyOperand)?;
        self.ensure_same_key(first)?;

        rest.iter()
            .try_fold(first.clone(), |sum, value| self.add(&sum, value))
    }

    fn add_scalar(&self, a: &EncryptedNumber, scalar: f64) -> Result<EncryptedNumber> {
        self.ensure_same_key(a)?;

        let encoded = EncodedNumber::encode_f64_with_max_exponent(self, scalar, Some(a.exponent))?;
        // No blinding needed: the sum is as hidden as `a` already is
        let encrypted = self.encrypt_with_randomness(&encoded, &BigUint::one())?;
        self.add(a, &encrypted)
    }

    fn scalar_multiply(&self, a: &EncryptedNumber, scalar: f64) -> Result<EncryptedNumber> {
        let k = EncodedNumber::encode_f64(self, scalar)?;
        self.multiply_encoded(a, &k)
    }

    fn multiply_encoded(&self, a: &EncryptedNumber, k: &EncodedNumber) -> Result<EncryptedNumber> {
        self.ensure_same_key(a)?;
        if k.public_key.n != self.n {
            return Err(PaillierError::KeyMismatch);
        }

        let ciphertext = self.raw_multiply(&a.ciphertext, &k.encoding)?;
        let exponent = a.exponent.checked_add(k.exponent).ok_or_else(|| {
            PaillierError::EncodingOverflow("exponent out of range".to_string())
        })?;

        Ok(EncryptedNumber {
            public_key: self.clone(),
            ciphertext,
            exponent,
        })
    }

    fn negate(&self, a: &EncryptedNumber) -> Result<EncryptedNumber> {
        self.ensure_same_key(a)?;

        let ciphertext = mod_inverse(&a.ciphertext, &self.n_squared()).ok_or_else(|| {
            PaillierError::InvalidParameter("ciphertext is not invertible modulo n^2".to_string())
        })?;

        Ok(EncryptedNumber {
            public_key: self.clone(),
            ciphertext,
            exponent: a.exponent,
        })
    }

    fn subtract(&self, a: &EncryptedNumber, b: &EncryptedNumber) -> Result<EncryptedNumber> {
        self.ensure_same_key(a)?;
        let negated = self.negate(b)?;
        self.add(a, &negated)
    }

    fn linear_combination(
        &self,
        values: &[EncryptedNumber],
        coefficients: &[f64],
    ) -> Result<EncryptedNumber> {
        if values.len() != coefficients.len() {
            return Err(PaillierError::LengthMismatch(format!(
                "ciphertexts: {}, coefficients: {}",
                values.len(),
                coefficients.len()
            )));
        }

        let terms = values
            .iter()
            .zip(coefficients)
            .map(|(value, &coefficient)| self.scalar_multiply(value, coefficient))
            .collect::<Result<Vec<_>>>()?;

        self.add_many(&terms)
    }

    fn rerandomize(&self, a: &EncryptedNumber) -> Result<EncryptedNumber> {
        self.ensure_same_key(a)?;

        let n_squared = self.n_squared();
        let r = random_coprime(&self.n, &mut thread_rng())
            .map_err(|e| PaillierError::Randomness(e.to_string()))?;
        let ciphertext = (&a.ciphertext * mod_exp(&r, &self.n, &n_squared)) % &n_squared;

        Ok(EncryptedNumber {
            public_key: self.clone(),
            ciphertext,
            exponent: a.exponent,
        })
    }
}

impl Add for &EncryptedNumber {
    type Output = Result<EncryptedNumber>;

    fn add(self, rhs: Self) -> Self::Output {
        HomomorphicOperations::add(&self.public_key, self, rhs)
    }
}

impl Add<f64> for &EncryptedNumber {
    type Output = Result<EncryptedNumber>;

    fn add(self, rhs: f64) -> Self::Output {
        self.public_key.add_scalar(self, rhs)
    }
}

impl Sub for &EncryptedNumber {
    type Output = Result<EncryptedNumber>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.public_key.subtract(self, rhs)
    }
}

impl Neg for &EncryptedNumber {
    type Output = Result<EncryptedNumber>;

    fn neg(self) -> Self::Output {
        self.public_key.negate(self)
    }
}

impl Mul<f64> for &EncryptedNumber {
    type Output = Result<EncryptedNumber>;

    fn mul(self, rhs: f64) -> Self::Output {
        self.public_key.scalar_multiply(self, rhs)
    }
}
