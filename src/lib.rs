//! # Paillier Homomorphic Encryption Library
//!
//! This library provides an implementation of the Paillier cryptosystem with:
//! - Additive homomorphism over encrypted floating-point numbers
//! - Multiplication of ciphertexts by plaintext scalars
//! - A JSON wire format for keys and ciphertexts
//! - A request layer with a TTL-bounded keystore for demonstrations
//!
//! ## Features
//!
//! - **Fixed-point encoding**: floats are encoded as `mantissa * 16^exponent`, and operands
//!   with different exponents are aligned automatically
//! - **Overflow detection**: results that leave the representable range fail to decode
//!   instead of wrapping around silently
//! - **Key isolation**: combining ciphertexts from different keys is an error
//! - **Re-randomization**: generate different ciphertexts for the same plaintext
//!
//! ## Example
//!
//! ```rust
//! use paillier_he::{HomomorphicOperations, KeyPair};
//!
//! // Generate keys
//! let keypair = KeyPair::generate(128).unwrap();
//! let public_key = &keypair.public_key;
//!
//! // Encrypt values
//! let ct1 = public_key.encrypt(10.0).unwrap();
//! let ct2 = public_key.encrypt(20.5).unwrap();
//!
//! // Perform homomorphic addition
//! let sum = public_key.add(&ct1, &ct2).unwrap();
//!
//! // Decrypt result
//! let result = keypair.private_key.decrypt(&sum).unwrap();
//! assert_eq!(result, 30.5);
//! ```
//!
//! ## Limitations
//!
//! Paillier ciphertexts carry no integrity check. Decrypting with the wrong private key,
//! or decrypting a tampered ciphertext, yields an unrelated number rather than an error.

pub mod codec;
pub mod config;
pub mod encoding;
pub mod encryption;
pub mod error;
pub mod homomorphic;
pub mod keys;
pub mod keystore;
pub mod service;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use codec::{decode_private_key_for, JsonCodec};
pub use config::{ConfigError, ServiceConfig};
pub use encoding::EncodedNumber;
pub use error::{PaillierError, Result};
pub use homomorphic::HomomorphicOperations;
pub use keys::{KeyPair, PrivateKey, PublicKey};
pub use keystore::{KeyStore, KeyStoreConfig};
pub use service::{
    ComputeRequest, ComputeResponse, DecryptRequest, DecryptResponse, DemoReport,
    EncryptRequest, EncryptResponse, ErrorResponse, HomomorphicService, Operation, Request,
    Response, ServiceError,
};
pub use types::{EncryptedNumber, PaillierConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
