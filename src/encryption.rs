//! Paillier encryption and decryption
//!
//! Decryption performs no integrity check: a ciphertext produced under another key, or
//! an arbitrary element of `Z*_{n^2}`, decrypts to an unrelated number instead of
//! failing. Authenticating ciphertexts is outside the scope of this crate.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{thread_rng, CryptoRng, RngCore};

use crate::encoding::EncodedNumber;
use crate::error::{PaillierError, Result};
use crate::keys::{PrivateKey, PublicKey};
use crate::types::EncryptedNumber;
use crate::utils::{l_function, mod_exp, random_coprime};

impl PublicKey {
    /// Encrypt a number
    ///
    /// ```rust
    /// use paillier_he::KeyPair;
    ///
    /// let keypair = KeyPair::generate(128).unwrap();
    /// let encrypted = keypair.public_key.encrypt(4.5).unwrap();
    /// assert_eq!(keypair.private_key.decrypt(&encrypted).unwrap(), 4.5);
    /// ```
    pub fn encrypt(&self, value: f64) -> Result<EncryptedNumber> {
        self.encrypt_with_rng(value, &mut thread_rng())
    }

    /// Encrypt a number, drawing the blinding factor from `rng`
    pub fn encrypt_with_rng<R: RngCore + CryptoRng + ?Sized>(
        &self,
        value: f64,
        rng: &mut R,
    ) -> Result<EncryptedNumber> {
        let encoded = EncodedNumber::encode_f64(self, value)?;
        self.encrypt_encoded(&encoded, rng)
    }

    /// Encrypt an already encoded number
    pub fn encrypt_encoded<R: RngCore + CryptoRng + ?Sized>(
        &self,
        encoded: &EncodedNumber,
        rng: &mut R,
    ) -> Result<EncryptedNumber> {
        if encoded.public_key.n != self.n {
            return Err(PaillierError::KeyMismatch);
        }

        let r = random_coprime(&self.n, rng)
            .map_err(|e| PaillierError::Randomness(e.to_string()))?;
        let ciphertext = self.raw_encrypt(&encoded.encoding, &r)?;

        Ok(EncryptedNumber {
            public_key: self.clone(),
            ciphertext,
            exponent: encoded.exponent,
        })
    }

    /// Encrypt with specific randomness (for testing or reproducible vectors)
    pub fn encrypt_with_randomness(
        &self,
        encoded: &EncodedNumber,
        randomness: &BigUint,
    ) -> Result<EncryptedNumber> {
        if encoded.public_key.n != self.n {
            return Err(PaillierError::KeyMismatch);
        }

        let ciphertext = self.raw_encrypt(&encoded.encoding, randomness)?;
        Ok(EncryptedNumber {
            public_key: self.clone(),
            ciphertext,
            exponent: encoded.exponent,
        })
    }

    /// `c = g^m * r^n mod n^2`
    ///
    /// Requires `0 <= m < n` and `r` in `[1, n)` coprime to `n`.
    pub fn raw_encrypt(&self, plaintext: &BigUint, r: &BigUint) -> Result<BigUint> {
        if plaintext >= &self.n {
            return Err(PaillierError::EncodingOverflow(
                "plaintext must be smaller than n".to_string(),
            ));
        }
        if r.is_zero() || r >= &self.n || !r.gcd(&self.n).is_one() {
            return Err(PaillierError::InvalidParameter(
                "blinding factor must lie in [1, n) and be coprime to n".to_string(),
            ));
        }

        let n_squared = self.n_squared();
        // With g = n + 1, g^m = 1 + n*m (mod n^2)
        let g_m = (&self.n * plaintext + BigUint::one()) % &n_squared;
        let r_n = mod_exp(r, &self.n, &n_squared);

        Ok((g_m * r_n) % &n_squared)
    }
}

impl PrivateKey {
    /// Decrypt a ciphertext to the nearest `f64`
    pub fn decrypt(&self, encrypted: &EncryptedNumber) -> Result<f64> {
        self.decrypt_encoded(encrypted)?.decode()
    }

    /// Decrypt a ciphertext without decoding it
    pub fn decrypt_encoded(&self, encrypted: &EncryptedNumber) -> Result<EncodedNumber> {
        if !self.matches(&encrypted.public_key) {
            return Err(PaillierError::Decryption(
                "private key does not belong to the ciphertext's public key".to_string(),
            ));
        }

        let encoding = self.raw_decrypt(&encrypted.ciphertext)?;
        Ok(EncodedNumber {
            public_key: self.public_key.clone(),
            encoding,
            exponent: encrypted.exponent,
        })
    }

    /// `m = L(c^λ mod n^2) * μ mod n`
    pub fn raw_decrypt(&self, ciphertext: &BigUint) -> Result<BigUint> {
        let n = &self.public_key.n;
        let n_squared = self.public_key.n_squared();

        if ciphertext.is_zero() || ciphertext >= &n_squared {
            return Err(PaillierError::Decryption(
                "ciphertext must lie in [1, n^2)".to_string(),
            ));
        }
        if !ciphertext.gcd(&n_squared).is_one() {
            return Err(PaillierError::Decryption(
                "ciphertext is not a unit modulo n^2".to_string(),
            ));
        }

        let lambda = self.lambda();
        let mu = self.mu()?;
        let x = mod_exp(ciphertext, &lambda, &n_squared);

        Ok((l_function(&x, n) * mu) % n)
    }
}
