// src/utils/serialization.rs
//! Serialization utilities for the credential service.
//!
//! Provides serialization and deserialization functions for:
//! - JSON data structures
//! - URL-safe, unpadded base64 segments used by the SD-JWT encoding
//! - The `?data=<urlencoded-json>` form carried inside QR codes

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json;
use url::form_urlencoded;

/// Serializes a value to a JSON string.
///
/// # Arguments
/// * `data` - The value to serialize (must implement `Serialize`)
///
/// # Returns
/// - `Ok(String)` with JSON representation on success
/// - `Err(serde_json::Error)` if serialization fails
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Deserializes a value from a JSON string.
///
/// # Note
/// The function uses a lifetime parameter to ensure the deserialized value
/// doesn't outlive the input data. This allows borrowing data from the input string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Encodes bytes as URL-safe base64 without padding.
pub fn b64url_encode(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

/// Decodes URL-safe, unpadded base64.
pub fn b64url_decode(data: &str) -> Result<Vec<u8>, String> {
    base64::decode_config(data, base64::URL_SAFE_NO_PAD)
        .map_err(|e| format!("Base64 decoding failed: {}", e))
}

/// Serializes a value to JSON and wraps it in a base64url segment.
pub fn encode_json_segment<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    Ok(b64url_encode(serialize(data)?.as_bytes()))
}

/// Reverses [`encode_json_segment`].
pub fn decode_json_segment<T: DeserializeOwned>(segment: &str) -> Result<T, String> {
    let bytes = b64url_decode(segment)?;
    serde_json::from_slice(&bytes).map_err(|e| format!("JSON decoding failed: {}", e))
}

/// Renders a payload as the `?data=<urlencoded>` query string used in QR codes.
pub fn to_query_payload(json: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(json.as_bytes()).collect();
    format!("?data={}", encoded)
}

/// Extracts the JSON carried by a scanned or pasted payload.
///
/// Accepts a full URL, a bare `?data=` query, or verbatim JSON text. Returns
/// `None` when a query is present but has no `data` parameter.
pub fn from_query_payload(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed.to_string());
    }
    let query = match trimmed.find('?') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    };
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "data")
        .map(|(_, value)| value.into_owned())
}
