//! Core types and data structures

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PaillierError, Result};
use crate::keys::{PublicKey, DEFAULT_PRIME_BITS};

/// Paillier ciphertext together with the encoding exponent of its plaintext.
///
/// The plaintext is `mantissa * 16^exponent`; only ciphertexts under the same public key
/// can be combined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedNumber {
    pub(crate) public_key: PublicKey,
    pub(crate) ciphertext: BigUint,
    pub(crate) exponent: i32,
}

impl EncryptedNumber {
    /// Wrap a raw ciphertext. It must lie in `[1, n^2)`.
    pub fn new(public_key: PublicKey, ciphertext: BigUint, exponent: i32) -> Result<Self> {
        if ciphertext.is_zero() || ciphertext >= public_key.n_squared() {
            return Err(PaillierError::InvalidParameter(
                "ciphertext must lie in [1, n^2)".to_string(),
            ));
        }

        Ok(EncryptedNumber {
            public_key,
            ciphertext,
            exponent,
        })
    }

    /// The public key this number was encrypted under
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Get the raw ciphertext
    pub fn ciphertext(&self) -> &BigUint {
        &self.ciphertext
    }

    /// Base-16 exponent of the encoded plaintext
    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// Get the size in bytes
    pub fn size_bytes(&self) -> usize {
        self.ciphertext.to_bytes_be().len()
    }
}

impl fmt::Display for EncryptedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EncryptedNumber(exponent {}, {} bytes)",
            self.exponent,
            self.size_bytes()
        )
    }
}

/// Configuration for key generation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaillierConfig {
    /// Bit size of each of the two primes; the modulus has twice as many bits
    pub prime_bits: u64,
    /// Number of Miller-Rabin rounds for primality testing
    pub primality_rounds: usize,
}

impl Default for PaillierConfig {
    fn default() -> Self {
        PaillierConfig {
            prime_bits: DEFAULT_PRIME_BITS,
            primality_rounds: 40,
        }
    }
}
