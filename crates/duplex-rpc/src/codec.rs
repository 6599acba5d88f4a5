//! Message codecs.
//!
//! The content type of an RPC request selects how messages are encoded:
//!
//! | Content type | Codec |
//! |--------------|-------|
//! | `application/grpc` | [`Codec::Proto`] |
//! | `application/grpc+proto` | [`Codec::Proto`] |
//! | `application/grpc+json` | [`Codec::Json`] |
//!
//! The gateway always uses [`Codec::Json`].

use bytes::Bytes;
use duplex_core::Status;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A message usable by RPC handlers: protobuf-encodable and serde-compatible.
pub trait RpcMessage: prost::Message + Default + Serialize + DeserializeOwned + Send + 'static {}

impl<T> RpcMessage for T where T: prost::Message + Default + Serialize + DeserializeOwned + Send + 'static {}

/// Wire encoding of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Protocol Buffers binary encoding.
    Proto,
    /// JSON encoding.
    Json,
}

impl Codec {
    /// Selects the codec for an RPC content type.
    ///
    /// Returns `None` for content types that are not RPC framing or name an
    /// unsupported subtype.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/grpc" | "application/grpc+proto" => Some(Self::Proto),
            "application/grpc+json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Returns the response content type.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Proto => "application/grpc+proto",
            Self::Json => "application/grpc+json",
        }
    }

    /// Encodes a message.
    pub fn encode<M: RpcMessage>(self, message: &M) -> Result<Bytes, Status> {
        match self {
            Self::Proto => Ok(Bytes::from(message.encode_to_vec())),
            Self::Json => serde_json::to_vec(message)
                .map(Bytes::from)
                .map_err(|e| Status::internal(format!("failed to encode response: {e}"))),
        }
    }

    /// Decodes a message.
    ///
    /// JSON decoding is lenient about scalars: if the document does not fit
    /// the message as-is, string values that read as numbers or booleans are
    /// converted and decoding is retried. Gateway path and query parameters
    /// always arrive as strings.
    pub fn decode<M: RpcMessage>(self, bytes: &[u8]) -> Result<M, Status> {
        match self {
            Self::Proto => M::decode(bytes).map_err(|e| Status::internal(format!("failed to decode request: {e}"))),
            Self::Json => {
                let bytes = if bytes.is_empty() { b"{}".as_slice() } else { bytes };
                match serde_json::from_slice::<M>(bytes) {
                    Ok(message) => Ok(message),
                    Err(strict) => {
                        let mut value: Value = serde_json::from_slice(bytes)
                            .map_err(|e| Status::invalid_argument(format!("invalid JSON: {e}")))?;
                        if !coerce_scalars(&mut value) {
                            return Err(Status::invalid_argument(strict.to_string()));
                        }
                        serde_json::from_value(value).map_err(|_| Status::invalid_argument(strict.to_string()))
                    }
                }
            }
        }
    }
}

/// Converts numeric and boolean strings in place. Returns `true` if anything
/// changed.
fn coerce_scalars(value: &mut Value) -> bool {
    match value {
        Value::String(text) => match scalar(text) {
            Some(converted) => {
                *value = converted;
                true
            }
            None => false,
        },
        Value::Array(items) => items.iter_mut().fold(false, |changed, item| coerce_scalars(item) | changed),
        Value::Object(fields) => fields.values_mut().fold(false, |changed, item| coerce_scalars(item) | changed),
        _ => false,
    }
}

fn scalar(text: &str) -> Option<Value> {
    match text {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => text
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| text.parse::<u64>().map(Value::from))
            .ok()
            .or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            }),
    }
}
