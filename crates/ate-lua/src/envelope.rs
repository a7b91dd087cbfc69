//! Host-side view of the websocket RPC response envelope.
//!
//! Scripts build responses with the `network` prelude helpers; hosts parse
//! the encoded result of `network.incomingWsMsg` with [`ResponseEnvelope`].
//! An envelope without an error carries `"Error": ""`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Protocol tag written by the `network` helpers.
pub const PROTOCOL: &str = "EWSMP1";

/// JSON-RPC style error codes, mirrored by the `E_*` script globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCode {
    /// `E_PARSE`
    Parse,
    /// `E_INVALID_REQ`
    InvalidRequest,
    /// `E_NO_METHOD`
    MethodNotFound,
    /// `E_BAD_PARAMS`
    InvalidParams,
    /// `E_INTERNAL`
    Internal,
    /// `E_SERVER`
    Server,
}

impl RpcErrorCode {
    /// All codes.
    pub const ALL: [Self; 6] = [
        Self::Parse,
        Self::InvalidRequest,
        Self::MethodNotFound,
        Self::InvalidParams,
        Self::Internal,
        Self::Server,
    ];

    /// Numeric wire value.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Parse => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::Server => -32000,
        }
    }

    /// Name of the matching script global.
    #[must_use]
    pub fn global_name(self) -> &'static str {
        match self {
            Self::Parse => "E_PARSE",
            Self::InvalidRequest => "E_INVALID_REQ",
            Self::MethodNotFound => "E_NO_METHOD",
            Self::InvalidParams => "E_BAD_PARAMS",
            Self::Internal => "E_INTERNAL",
            Self::Server => "E_SERVER",
        }
    }

    /// Looks up a code by wire value.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// Error member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvelopeError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl EnvelopeError {
    /// The known code, if any.
    #[must_use]
    pub fn rpc_code(&self) -> Option<RpcErrorCode> {
        RpcErrorCode::from_code(self.code)
    }
}

/// A response produced by script code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEnvelope {
    pub protocol: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub result: JsonValue,
    #[serde(
        default,
        serialize_with = "serialize_error",
        deserialize_with = "deserialize_error"
    )]
    pub error: Option<EnvelopeError>,
    #[serde(default)]
    pub time: JsonValue,
    #[serde(default)]
    pub id: JsonValue,
}

impl ResponseEnvelope {
    /// An empty success response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocol: PROTOCOL.to_string(),
            method: String::new(),
            result: JsonValue::String(String::new()),
            error: None,
            time: JsonValue::String(String::new()),
            id: JsonValue::String(String::new()),
        }
    }

    /// An error response.
    #[must_use]
    pub fn error(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: Some(EnvelopeError {
                code: code.code(),
                message: message.into(),
                data: None,
            }),
            ..Self::new()
        }
    }

    /// Parses an encoded envelope.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if `text` is not a valid envelope.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Whether the response carries an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Default for ResponseEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<EnvelopeError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => e.serialize(serializer),
        None => serializer.serialize_str(""),
    }
}

fn deserialize_error<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<EnvelopeError>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    match value {
        JsonValue::Object(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
