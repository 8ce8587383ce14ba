//! Key generation and management

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{thread_rng, CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, info};

use crate::error::{PaillierError, Result};
use crate::types::PaillierConfig;
use crate::utils::{carmichael_lambda, generate_prime, is_probable_prime, mod_inverse};

/// Smallest prime size accepted by key generation. Only useful for tests.
pub const MIN_PRIME_BITS: u64 = 16;

/// Prime size matching a 512-bit modulus.
pub const DEFAULT_PRIME_BITS: u64 = 256;

/// Miller-Rabin rounds used when validating externally supplied primes.
const VALIDATION_ROUNDS: usize = 20;

/// How many times a colliding or degenerate pair of primes is redrawn.
const MAX_KEYGEN_ATTEMPTS: u32 = 64;

/// Paillier public key `(n, g)` with `g = n + 1`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PublicKey {
    pub(crate) n: BigUint,
    pub(crate) g: BigUint,
}

impl PublicKey {
    /// Build a public key from its modulus. `n` must be odd and greater than one.
    pub fn from_modulus(n: BigUint) -> Result<Self> {
        if n <= BigUint::one() {
            return Err(PaillierError::InvalidKey(
                "modulus n must be greater than 1".to_string(),
            ));
        }
        if n.is_even() {
            return Err(PaillierError::InvalidKey(
                "modulus n must be odd".to_string(),
            ));
        }

        let g = &n + BigUint::one();
        Ok(PublicKey { n, g })
    }

    /// Get the modulus
    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    /// Get the generator `n + 1`
    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// `n^2`, the modulus of the ciphertext space
    pub fn n_squared(&self) -> BigUint {
        &self.n * &self.n
    }

    /// Largest magnitude an encoded plaintext may have: `n / 3 - 1`.
    ///
    /// Encodings above `max_int` and below `n - max_int` are treated as overflow, which
    /// leaves headroom to detect sums that wrapped around the modulus.
    pub fn max_int(&self) -> BigUint {
        let third = &self.n / 3u32;
        if third.is_zero() {
            third
        } else {
            third - BigUint::one()
        }
    }

    /// Get the bit size of the modulus
    pub fn bit_size(&self) -> u64 {
        self.n.bits()
    }

    /// Hex SHA-256 digest of the modulus
    pub fn fingerprint(&self) -> String {
        Sha256::digest(self.n.to_bytes_be())
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.bit_size())
    }
}

/// Paillier private key: the factorisation of `n`.
///
/// `λ = lcm(p - 1, q - 1)` and `μ = λ^-1 mod n` are derived on demand so the stored and
/// serialized form stays `{p, q}`.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub(crate) public_key: PublicKey,
    pub(crate) p: BigUint,
    pub(crate) q: BigUint,
}

impl PrivateKey {
    /// Build a private key from two primes, deriving the public key as `n = p * q`.
    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self> {
        let mut rng = thread_rng();
        for (name, prime) in [("p", &p), ("q", &q)] {
            if !is_probable_prime(prime, VALIDATION_ROUNDS, &mut rng) {
                return Err(PaillierError::InvalidKey(format!("{name} is not prime")));
            }
        }
        Self::from_trusted_primes(p, q)
    }

    /// Build a private key for an existing public key, checking that `p * q = n`.
    pub fn from_public_key_and_primes(public_key: &PublicKey, p: BigUint, q: BigUint) -> Result<Self> {
        let private_key = Self::from_primes(p, q)?;
        if !private_key.matches(public_key) {
            return Err(PaillierError::InvalidKey(
                "p * q does not equal the public modulus n".to_string(),
            ));
        }
        Ok(private_key)
    }

    /// Structural checks only; primality is the caller's responsibility.
    pub(crate) fn from_trusted_primes(p: BigUint, q: BigUint) -> Result<Self> {
        if p == q {
            return Err(PaillierError::InvalidKey("p and q must differ".to_string()));
        }

        let n = &p * &q;
        let public_key = PublicKey::from_modulus(n)?;

        let lambda = carmichael_lambda(&p, &q);
        if !public_key.n.gcd(&lambda).is_one() {
            return Err(PaillierError::InvalidKey(
                "gcd(n, lambda) must be 1".to_string(),
            ));
        }

        Ok(PrivateKey { public_key, p, q })
    }

    /// The public key this private key belongs to
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Whether this key's primes multiply to the modulus of `public_key`
    pub fn matches(&self, public_key: &PublicKey) -> bool {
        self.public_key.n == public_key.n
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }

    /// `λ = lcm(p - 1, q - 1)`
    pub fn lambda(&self) -> BigUint {
        carmichael_lambda(&self.p, &self.q)
    }

    /// `μ = λ^-1 mod n`
    pub fn mu(&self) -> Result<BigUint> {
        mod_inverse(&self.lambda(), &self.public_key.n).ok_or_else(|| {
            PaillierError::InvalidKey("lambda is not invertible modulo n".to_string())
        })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key)
            .field("p", &"***")
            .field("q", &"***")
            .finish()
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(***)")
    }
}

/// Paillier key pair
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Generate a new key pair whose primes have `prime_bits` bits each
    ///
    /// # Example
    ///
    /// ```rust
    /// use paillier_he::KeyPair;
    ///
    /// let keypair = KeyPair::generate(128).expect("Failed to generate keys");
    /// assert_eq!(keypair.bit_size(), 256);
    /// ```
    pub fn generate(prime_bits: u64) -> Result<Self> {
        Self::generate_with_config(&PaillierConfig {
            prime_bits,
            ..PaillierConfig::default()
        })
    }

    /// Generate a key pair with custom configuration
    pub fn generate_with_config(config: &PaillierConfig) -> Result<Self> {
        Self::generate_with_rng(config, &mut thread_rng())
    }

    /// Generate a key pair from a caller-supplied cryptographically secure RNG
    pub fn generate_with_rng<R: RngCore + CryptoRng + ?Sized>(
        config: &PaillierConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let bits = config.prime_bits;
        if bits < MIN_PRIME_BITS {
            return Err(PaillierError::InvalidKeySize {
                bits,
                min: MIN_PRIME_BITS,
            });
        }

        let max_prime_attempts = 100 * bits + 1_000;

        for attempt in 1..=MAX_KEYGEN_ATTEMPTS {
            let p = draw_prime(bits, config.primality_rounds, max_prime_attempts, rng)?;
            let q = draw_prime(bits, config.primality_rounds, max_prime_attempts, rng)?;

            match PrivateKey::from_trusted_primes(p, q) {
                Ok(private_key) => {
                    let public_key = private_key.public_key.clone();
                    info!(
                        modulus_bits = public_key.bit_size(),
                        fingerprint = %public_key.fingerprint(),
                        "generated Paillier key pair"
                    );
                    return Ok(KeyPair {
                        public_key,
                        private_key,
                    });
                }
                Err(err) => debug!(attempt, %err, "redrawing primes"),
            }
        }

        Err(PaillierError::KeyGeneration(format!(
            "could not find two distinct {bits}-bit primes after {MAX_KEYGEN_ATTEMPTS} attempts"
        )))
    }

    /// Rebuild a key pair from its primes
    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self> {
        let private_key = PrivateKey::from_primes(p, q)?;
        Ok(KeyPair {
            public_key: private_key.public_key.clone(),
            private_key,
        })
    }

    /// Get the bit size of the modulus
    pub fn bit_size(&self) -> u64 {
        self.public_key.bit_size()
    }
}

impl fmt::Display for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({} bits)", self.bit_size())
    }
}

fn draw_prime<R: RngCore + ?Sized>(
    bits: u64,
    rounds: usize,
    max_attempts: u64,
    rng: &mut R,
) -> Result<BigUint> {
    generate_prime(bits, rounds, max_attempts, rng)
        .map_err(|e| PaillierError::KeyGeneration(format!("random source failed: {e}")))?
        .ok_or_else(|| {
            PaillierError::KeyGeneration(format!(
                "no {bits}-bit prime found after {max_attempts} candidates"
            ))
        })
}
