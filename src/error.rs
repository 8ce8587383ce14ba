//! Error types for the Paillier library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaillierError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaillierError {
    #[error("Invalid key size: {bits} bits per prime (must be at least {min})")]
    InvalidKeySize { bits: u64, min: u64 },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encoding overflow: {0}")]
    EncodingOverflow(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Operands were encrypted under different public keys")]
    KeyMismatch,

    #[error("Empty list provided for a homomorphic sum")]
    EmptyOperand,

    #[error("Malformed `{field}`: {reason}")]
    Codec { field: String, reason: String },

    #[error("Mismatched lengths: {0}")]
    LengthMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Random source unavailable: {0}")]
    Randomness(String),
}

impl PaillierError {
    pub(crate) fn codec(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PaillierError::Codec {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the caller's input rather than an internal fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            PaillierError::KeyGeneration(_) | PaillierError::Randomness(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_and_server_classes() {
        assert!(PaillierError::KeyMismatch.is_client_error());
        assert!(PaillierError::EmptyOperand.is_client_error());
        assert!(PaillierError::codec("n", "missing").is_client_error());
        assert!(!PaillierError::KeyGeneration("exhausted".into()).is_client_error());
        assert!(!PaillierError::Randomness("os rng".into()).is_client_error());
    }

    #[test]
    fn test_codec_error_names_field() {
        let err = PaillierError::codec("ciphertext", "missing");
        assert_eq!(err.to_string(), "Malformed `ciphertext`: missing");
    }
}
