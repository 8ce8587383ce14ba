//! Request handling on top of the core library
//!
//! [`HomomorphicService`] exposes the four demo operations (encrypt, compute, decrypt and
//! the full workflow) over plain request/response structs. Keys and ciphertexts travel as
//! the JSON strings produced by [`crate::codec`]. No transport is provided; the binary
//! drives the service from the command line and any HTTP layer can wrap it the same way.
//!
//! Returning the private key from `encrypt` and accepting it again in `decrypt` is only
//! acceptable for demonstrations. Set `expose_private_key = false` to keep private keys
//! in the keystore instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::codec::{decode_private_key_for, JsonCodec};
use crate::config::ServiceConfig;
use crate::error::PaillierError;
use crate::homomorphic::HomomorphicOperations;
use crate::keys::{KeyPair, PrivateKey, PublicKey};
use crate::keystore::KeyStore;
use crate::types::EncryptedNumber;

/// Numbers used by the full-workflow demo
pub const DEMO_NUMBERS: [f64; 3] = [10.0, 20.0, 30.0];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Invalid operation `{0}`. Use 'add', 'sum', or 'multiply'")]
    InvalidOperation(String),

    #[error("Missing parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("No private key stored for public key {0}")]
    UnknownKey(String),

    #[error(transparent)]
    Paillier(#[from] PaillierError),
}

impl ServiceError {
    /// HTTP-style status: 400 for caller faults, 404 for unknown keys, 500 otherwise
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidOperation(_) | ServiceError::MissingParameter(_) => 400,
            ServiceError::UnknownKey(_) => 404,
            ServiceError::Paillier(err) if err.is_client_error() => 400,
            ServiceError::Paillier(_) => 500,
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Operations accepted by `compute`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Sum every ciphertext (`add` or `sum`)
    Sum,
    /// Multiply the first ciphertext by a plaintext scalar
    Multiply,
}

impl FromStr for Operation {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" | "sum" => Ok(Operation::Sum),
            "multiply" => Ok(Operation::Multiply),
            _ => Err(ServiceError::InvalidOperation(s.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Sum => write!(f, "sum"),
            Operation::Multiply => write!(f, "multiply"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptRequest {
    pub numbers: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptResponse {
    pub encrypted_numbers: Vec<String>,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeRequest {
    pub encrypted_numbers: Vec<String>,
    pub public_key: String,
    pub operation: String,
    #[serde(default)]
    pub multiplier: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeResponse {
    pub encrypted_result: String,
}

/// Either `private_key` or `public_key` must be given. A bare private key is enough
/// since the public modulus is re-derived as `p * q`; a bare public key is looked up
/// in the keystore.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub encrypted_value: String,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub decrypted_value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemoReport {
    pub original_numbers: Vec<f64>,
    pub expected_sum: f64,
    pub computed_sum: f64,
    pub verified: bool,
    pub verification: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub detail: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        ErrorResponse {
            status: err.status_code(),
            detail: err.to_string(),
        }
    }
}

/// A single request for [`HomomorphicService::handle`], tagged by `op`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Encrypt(EncryptRequest),
    Compute(ComputeRequest),
    Decrypt(DecryptRequest),
    Demo,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Encrypt(EncryptResponse),
    Compute(ComputeResponse),
    Decrypt(DecryptResponse),
    Demo(DemoReport),
    Error(ErrorResponse),
}

/// Stateless apart from the keystore, so one instance can serve many threads.
pub struct HomomorphicService {
    config: ServiceConfig,
    keystore: Arc<KeyStore>,
}

impl HomomorphicService {
    pub fn new(config: ServiceConfig) -> Self {
        let keystore = Arc::new(KeyStore::from_config(&config.keystore));
        Self::with_keystore(config, keystore)
    }

    /// Build a service around an existing keystore
    pub fn with_keystore(config: ServiceConfig, keystore: Arc<KeyStore>) -> Self {
        HomomorphicService { config, keystore }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn keystore(&self) -> &Arc<KeyStore> {
        &self.keystore
    }

    /// Generate a fresh key pair and encrypt every number under it
    pub fn encrypt(&self, request: &EncryptRequest) -> ServiceResult<EncryptResponse> {
        let keypair = KeyPair::generate_with_config(&self.config.keygen)?;
        let public_key = &keypair.public_key;

        let encrypted_numbers = request
            .numbers
            .iter()
            .map(|&number| public_key.encrypt(number).map(|encrypted| encrypted.to_json()))
            .collect::<Result<Vec<_>, _>>()?;

        self.keystore.insert(&keypair.private_key);

        let private_key = if self.config.expose_private_key {
            warn!(
                fingerprint = %public_key.fingerprint(),
                "returning private key in encrypt response; use only for demonstrations"
            );
            Some(keypair.private_key.to_json())
        } else {
            None
        };

        info!(
            count = encrypted_numbers.len(),
            fingerprint = %public_key.fingerprint(),
            "encrypted numbers"
        );

        Ok(EncryptResponse {
            encrypted_numbers,
            public_key: public_key.to_json(),
            private_key,
        })
    }

    /// Run a homomorphic operation without decrypting
    pub fn compute(&self, request: &ComputeRequest) -> ServiceResult<ComputeResponse> {
        let public_key = PublicKey::from_json(&request.public_key, &())?;
        let operation: Operation = request.operation.parse()?;

        let multiplier = match operation {
            Operation::Multiply => Some(
                request
                    .multiplier
                    .ok_or(ServiceError::MissingParameter("multiplier"))?,
            ),
            Operation::Sum => None,
        };

        let encrypted = request
            .encrypted_numbers
            .iter()
            .map(|text| EncryptedNumber::from_json(text, &public_key))
            .collect::<Result<Vec<_>, _>>()?;

        let result = match multiplier {
            Some(multiplier) => {
                let first = encrypted.first().ok_or(PaillierError::EmptyOperand)?;
                public_key.scalar_multiply(first, multiplier)?
            }
            None => public_key.add_many(&encrypted)?,
        };

        info!(
            %operation,
            operands = encrypted.len(),
            fingerprint = %public_key.fingerprint(),
            "computed on encrypted values"
        );

        Ok(ComputeResponse {
            encrypted_result: result.to_json(),
        })
    }

    /// Decrypt a ciphertext with the supplied or stored private key
    pub fn decrypt(&self, request: &DecryptRequest) -> ServiceResult<DecryptResponse> {
        let private_key = self.resolve_private_key(request)?;
        let encrypted =
            EncryptedNumber::from_json(&request.encrypted_value, private_key.public_key())?;
        let decrypted_value = private_key.decrypt(&encrypted)?;

        info!(
            fingerprint = %private_key.public_key().fingerprint(),
            "decrypted value"
        );

        Ok(DecryptResponse { decrypted_value })
    }

    /// Encrypt [10, 20, 30] under a fresh key, sum while encrypted, and check the result
    pub fn demo_full_workflow(&self) -> ServiceResult<DemoReport> {
        let keypair = KeyPair::generate_with_config(&self.config.keygen)?;
        let public_key = &keypair.public_key;

        let encrypted = DEMO_NUMBERS
            .iter()
            .map(|&number| public_key.encrypt(number))
            .collect::<Result<Vec<_>, _>>()?;
        let encrypted_sum = public_key.add_many(&encrypted)?;
        let computed_sum = keypair.private_key.decrypt(&encrypted_sum)?;

        let expected_sum: f64 = DEMO_NUMBERS.iter().sum();
        let verified = (computed_sum - expected_sum).abs() < self.config.demo_tolerance;
        info!(expected_sum, computed_sum, verified, "demo workflow finished");

        Ok(DemoReport {
            original_numbers: DEMO_NUMBERS.to_vec(),
            expected_sum,
            computed_sum,
            verified,
            verification: if verified { "Success" } else { "Failed" }.to_string(),
        })
    }

    /// Dispatch a tagged request, turning failures into an error response
    pub fn handle(&self, request: &Request) -> Response {
        let result = match request {
            Request::Encrypt(request) => self.encrypt(request).map(Response::Encrypt),
            Request::Compute(request) => self.compute(request).map(Response::Compute),
            Request::Decrypt(request) => self.decrypt(request).map(Response::Decrypt),
            Request::Demo => self.demo_full_workflow().map(Response::Demo),
        };

        result.unwrap_or_else(|err| {
            let response = ErrorResponse::from(&err);
            if response.status >= 500 {
                error!(status = response.status, %err, "request failed");
            } else {
                debug!(status = response.status, %err, "request rejected");
            }
            Response::Error(response)
        })
    }

    fn resolve_private_key(&self, request: &DecryptRequest) -> ServiceResult<PrivateKey> {
        match (&request.private_key, &request.public_key) {
            (Some(private_key), Some(public_key)) => {
                let public_key = PublicKey::from_json(public_key, &())?;
                Ok(decode_private_key_for(private_key, &public_key)?)
            }
            (Some(private_key), None) => Ok(PrivateKey::from_json(private_key, &())?),
            (None, Some(public_key)) => {
                let public_key = PublicKey::from_json(public_key, &())?;
                self.keystore
                    .get(&public_key)
                    .ok_or_else(|| ServiceError::UnknownKey(public_key.fingerprint()))
            }
            (None, None) => Err(ServiceError::MissingParameter("private_key")),
        }
    }
}

impl Default for HomomorphicService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaillierConfig;
    use std::thread;

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            keygen: PaillierConfig {
                prime_bits: 128,
                primality_rounds: 20,
            },
            ..ServiceConfig::default()
        }
    }

    fn test_service() -> HomomorphicService {
        HomomorphicService::new(test_config())
    }

    fn encrypt(service: &HomomorphicService, numbers: &[f64]) -> EncryptResponse {
        service
            .encrypt(&EncryptRequest {
                numbers: numbers.to_vec(),
            })
            .unwrap()
    }

    #[test]
    fn test_encrypt_compute_decrypt() {
        let service = test_service();
        let encrypted = encrypt(&service, &[10.0, 20.0, 30.0]);
        assert_eq!(encrypted.encrypted_numbers.len(), 3);

        let computed = service
            .compute(&ComputeRequest {
                encrypted_numbers: encrypted.encrypted_numbers.clone(),
                public_key: encrypted.public_key.clone(),
                operation: "SUM".to_string(),
                multiplier: None,
            })
            .unwrap();

        let decrypted = service
            .decrypt(&DecryptRequest {
                encrypted_value: computed.encrypted_result,
                private_key: encrypted.private_key.clone(),
                public_key: None,
            })
            .unwrap();
        assert!((decrypted.decrypted_value - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_multiply_uses_first_ciphertext() {
        let service = test_service();
        let encrypted = encrypt(&service, &[5.0, 100.0]);

        let computed = service
            .compute(&ComputeRequest {
                encrypted_numbers: encrypted.encrypted_numbers,
                public_key: encrypted.public_key,
                operation: "multiply".to_string(),
                multiplier: Some(3.0),
            })
            .unwrap();

        let decrypted = service
            .decrypt(&DecryptRequest {
                encrypted_value: computed.encrypted_result,
                private_key: encrypted.private_key,
                public_key: None,
            })
            .unwrap();
        assert!((decrypted.decrypted_value - 15.0).abs() < 0.01);
    }

    #[test]
    fn test_compute_rejects_bad_requests() {
        let service = test_service();
        let encrypted = encrypt(&service, &[1.0]);
        let request = ComputeRequest {
            encrypted_numbers: encrypted.encrypted_numbers,
            public_key: encrypted.public_key,
            operation: "multiply".to_string(),
            multiplier: None,
        };

        let err = service.compute(&request).unwrap_err();
        assert_eq!(err, ServiceError::MissingParameter("multiplier"));
        assert_eq!(err.status_code(), 400);

        let err = service
            .compute(&ComputeRequest {
                operation: "divide".to_string(),
                ..request.clone()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOperation(_)));
        assert_eq!(err.status_code(), 400);

        let err = service
            .compute(&ComputeRequest {
                operation: "add".to_string(),
                encrypted_numbers: Vec::new(),
                ..request.clone()
            })
            .unwrap_err();
        assert_eq!(err, ServiceError::Paillier(PaillierError::EmptyOperand));
        assert_eq!(err.status_code(), 400);

        let err = service
            .compute(&ComputeRequest {
                operation: "add".to_string(),
                encrypted_numbers: vec![r#"{"ciphertext": "abc", "exponent": 0}"#.to_string()],
                ..request
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Paillier(PaillierError::Codec { ref field, .. }) if field == "ciphertext"
        ));
    }

    fn with_exponent(encrypted: &str, exponent: i64) -> String {
        let mut value: serde_json::Value = serde_json::from_str(encrypted).unwrap();
        value["exponent"] = serde_json::json!(exponent);
        value.to_string()
    }

    #[test]
    fn test_compute_rejects_forged_exponent() {
        let service = test_service();
        let encrypted = encrypt(&service, &[1.0, 2.0]);
        let forged = with_exponent(&encrypted.encrypted_numbers[1], -2_000_000_000);

        let err = service
            .compute(&ComputeRequest {
                encrypted_numbers: vec![encrypted.encrypted_numbers[0].clone(), forged],
                public_key: encrypted.public_key,
                operation: "add".to_string(),
                multiplier: None,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Paillier(PaillierError::EncodingOverflow(_))
        ));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_decrypt_rejects_values_beyond_f64_range() {
        let service = test_service();
        let encrypted = encrypt(&service, &[1.0]);

        let err = service
            .decrypt(&DecryptRequest {
                encrypted_value: with_exponent(&encrypted.encrypted_numbers[0], 300),
                private_key: encrypted.private_key,
                public_key: None,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Paillier(PaillierError::EncodingOverflow(_))
        ));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_operation_names() {
        assert_eq!("add".parse::<Operation>().unwrap(), Operation::Sum);
        assert_eq!("Sum".parse::<Operation>().unwrap(), Operation::Sum);
        assert_eq!("MULTIPLY".parse::<Operation>().unwrap(), Operation::Multiply);
        assert!("mul".parse::<Operation>().is_err());
    }

    #[test]
    fn test_decrypt_with_stored_key() {
        let service = HomomorphicService::new(ServiceConfig {
            expose_private_key: false,
            ..test_config()
        });
        let encrypted = encrypt(&service, &[-4.25]);
        assert!(encrypted.private_key.is_none());

        let decrypted = service
            .decrypt(&DecryptRequest {
                encrypted_value: encrypted.encrypted_numbers[0].clone(),
                private_key: None,
                public_key: Some(encrypted.public_key.clone()),
            })
            .unwrap();
        assert_eq!(decrypted.decrypted_value, -4.25);

        let other = KeyPair::generate(64).unwrap();
        let err = service
            .decrypt(&DecryptRequest {
                encrypted_value: encrypted.encrypted_numbers[0].clone(),
                private_key: None,
                public_key: Some(other.public_key.to_json()),
            })
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = service
            .decrypt(&DecryptRequest {
                encrypted_value: encrypted.encrypted_numbers[0].clone(),
                private_key: None,
                public_key: None,
            })
            .unwrap_err();
        assert_eq!(err, ServiceError::MissingParameter("private_key"));
    }

    #[test]
    fn test_private_key_must_match_public_key() {
        let service = test_service();
        let encrypted = encrypt(&service, &[1.0]);
        let other = KeyPair::generate(64).unwrap();

        let err = service
            .decrypt(&DecryptRequest {
                encrypted_value: encrypted.encrypted_numbers[0].clone(),
                private_key: Some(other.private_key.to_json()),
                public_key: Some(encrypted.public_key),
            })
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_demo_workflow() {
        let report = test_service().demo_full_workflow().unwrap();
        assert_eq!(report.original_numbers, vec![10.0, 20.0, 30.0]);
        assert_eq!(report.expected_sum, 60.0);
        assert!(report.verified);
        assert_eq!(report.verification, "Success");
    }

    #[test]
    fn test_handle_tagged_requests() {
        let service = test_service();

        let request: Request = serde_json::from_str(r#"{"op": "demo"}"#).unwrap();
        assert!(matches!(service.handle(&request), Response::Demo(_)));

        let request: Request =
            serde_json::from_str(r#"{"op": "encrypt", "numbers": [1.5, 2]}"#).unwrap();
        let Response::Encrypt(encrypted) = service.handle(&request) else {
            panic!("expected an encrypt response");
        };

        let request = Request::Compute(ComputeRequest {
            encrypted_numbers: encrypted.encrypted_numbers,
            public_key: encrypted.public_key,
            operation: "pow".to_string(),
            multiplier: None,
        });
        let response = service.handle(&request);
        assert!(matches!(response, Response::Error(ErrorResponse { status: 400, .. })));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], 400);
        assert!(json["detail"].as_str().unwrap().contains("pow"));
    }

    #[test]
    fn test_concurrent_requests() {
        let service = test_service();

        thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let service = &service;
                    scope.spawn(move || {
                        let value = f64::from(i) * 1.5;
                        let encrypted = encrypt(service, &[value]);
                        let decrypted = service
                            .decrypt(&DecryptRequest {
                                encrypted_value: encrypted.encrypted_numbers[0].clone(),
                                private_key: None,
                                public_key: Some(encrypted.public_key),
                            })
                            .unwrap();
                        assert_eq!(decrypted.decrypted_value, value);
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
        });

        assert_eq!(service.keystore().len(), 4);
    }
}
