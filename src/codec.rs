//! JSON wire format for keys and ciphertexts
//!
//! | entity            | encoding                                          |
//! |-------------------|---------------------------------------------------|
//! | `PublicKey`       | `{"n": "<decimal>"}`                              |
//! | `PrivateKey`      | `{"p": "<decimal>", "q": "<decimal>"}`            |
//! | `EncryptedNumber` | `{"ciphertext": "<decimal>", "exponent": <int>}`  |
//!
//! Big integers are always written as decimal strings so no reader truncates them to a
//! machine integer or a double. Readers also accept a bare JSON integer when it fits in
//! 64 bits. `g` is not transmitted: it is always `n + 1`.

use num_bigint::BigUint;
use serde_json::{json, Map, Value};

use crate::error::{PaillierError, Result};
use crate::keys::{PrivateKey, PublicKey};
use crate::types::EncryptedNumber;

/// Conversion to and from the JSON wire format
pub trait JsonCodec: Sized {
    /// What decoding needs besides the document itself
    type Context;

    fn to_json_value(&self) -> Value;

    fn from_json_value(value: &Value, context: &Self::Context) -> Result<Self>;

    fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    fn from_json(text: &str, context: &Self::Context) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| PaillierError::codec("document", format!("invalid JSON: {e}")))?;
        Self::from_json_value(&value, context)
    }
}

impl JsonCodec for PublicKey {
    type Context = ();

    fn to_json_value(&self) -> Value {
        json!({ "n": self.n.to_str_radix(10) })
    }

    fn from_json_value(value: &Value, _context: &()) -> Result<Self> {
        let object = as_object(value)?;
        let n = big_uint_field(object, "n")?;
        PublicKey::from_modulus(n).map_err(|e| PaillierError::codec("n", e.to_string()))
    }
}

/// A private key decodes on its own: the public key is re-derived as `n = p * q`.
impl JsonCodec for PrivateKey {
    type Context = ();

    fn to_json_value(&self) -> Value {
        json!({
            "p": self.p.to_str_radix(10),
            "q": self.q.to_str_radix(10),
        })
    }

    fn from_json_value(value: &Value, _context: &()) -> Result<Self> {
        let object = as_object(value)?;
        let p = big_uint_field(object, "p")?;
        let q = big_uint_field(object, "q")?;
        PrivateKey::from_primes(p, q).map_err(|e| PaillierError::codec("p, q", e.to_string()))
    }
}

impl JsonCodec for EncryptedNumber {
    type Context = PublicKey;

    fn to_json_value(&self) -> Value {
        json!({
            "ciphertext": self.ciphertext.to_str_radix(10),
            "exponent": self.exponent,
        })
    }

    fn from_json_value(value: &Value, public_key: &PublicKey) -> Result<Self> {
        let object = as_object(value)?;
        let ciphertext = big_uint_field(object, "ciphertext")?;
        let exponent = exponent_field(object, "exponent")?;

        EncryptedNumber::new(public_key.clone(), ciphertext, exponent)
            .map_err(|e| PaillierError::codec("ciphertext", e.to_string()))
    }
}

/// Decode a private key and check it belongs to `public_key`
pub fn decode_private_key_for(text: &str, public_key: &PublicKey) -> Result<PrivateKey> {
    let private_key = PrivateKey::from_json(text, &())?;
    if !private_key.matches(public_key) {
        return Err(PaillierError::codec(
            "p, q",
            "p * q does not equal the public modulus n",
        ));
    }
    Ok(private_key)
}

fn as_object(value: &Value) -> Result<&Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        PaillierError::codec(
            "document",
            format!("expected a JSON object, found {}", kind(value)),
        )
    })
}

fn big_uint_field(object: &Map<String, Value>, field: &str) -> Result<BigUint> {
    match object.get(field) {
        None | Some(Value::Null) => Err(PaillierError::codec(field, "missing")),
        Some(Value::String(text)) => parse_decimal(text).ok_or_else(|| {
            PaillierError::codec(field, "expected a non-negative decimal integer")
        }),
        Some(Value::Number(number)) => number.as_u64().map(BigUint::from).ok_or_else(|| {
            PaillierError::codec(
                field,
                "numeric literal is not an unsigned 64-bit integer; send big integers as decimal strings",
            )
        }),
        Some(other) => Err(PaillierError::codec(
            field,
            format!("expected a decimal string, found {}", kind(other)),
        )),
    }
}

fn exponent_field(object: &Map<String, Value>, field: &str) -> Result<i32> {
    match object.get(field) {
        None | Some(Value::Null) => Err(PaillierError::codec(field, "missing")),
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(|exponent| i32::try_from(exponent).ok())
            .ok_or_else(|| PaillierError::codec(field, "expected a 32-bit integer")),
        Some(other) => Err(PaillierError::codec(
            field,
            format!("expected an integer, found {}", kind(other)),
        )),
    }
}

/// Strict decimal parsing: ASCII digits only, no sign, no separators.
fn parse_decimal(text: &str) -> Option<BigUint> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(text.as_bytes(), 10)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
