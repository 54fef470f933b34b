//! Result payload carried by every response
//!
//! The payload shape is wire-stable: `{"code": <int>, "msg": <string>, "data": <any>}`.
//! `code == 0` is success; every other value names a failure category.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Outcome category of a handled request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum Code {
    /// Request handled successfully
    Success = 0,
    /// Malformed or missing request parameters, unknown action
    ParamsError = 1,
    /// Listing objects failed
    ListError = 2,
    /// Fetching an object failed
    GetError = 3,
    /// Converting an object to another format failed
    EncodeError = 4,
    /// Serializing a result failed
    MarshalError = 5,
    /// Creating an object failed
    CreateError = 6,
    /// Updating an object failed
    UpdateError = 7,
    /// Deleting an object failed
    DeleteError = 8,
    /// Declarative apply of a manifest failed (fully or partially)
    ApplyError = 9,
    /// Anything else, including a handler that panicked
    Unknown = 99,
}

impl Code {
    /// Convert to the wire integer
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Convert from the wire integer
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::ParamsError),
            2 => Some(Self::ListError),
            3 => Some(Self::GetError),
            4 => Some(Self::EncodeError),
            5 => Some(Self::MarshalError),
            6 => Some(Self::CreateError),
            7 => Some(Self::UpdateError),
            8 => Some(Self::DeleteError),
            9 => Some(Self::ApplyError),
            99 => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl From<Code> for u16 {
    fn from(code: Code) -> Self {
        code.as_u16()
    }
}

impl TryFrom<u16> for Code {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Code::from_u16(value).ok_or(ProtocolError::UnknownCode(value))
    }
}

/// Message used for every successful payload
pub const SUCCESS_MSG: &str = "Success";

/// `{code, msg, data}` result of one handled request or one relayed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Outcome category
    pub code: Code,
    /// Human-readable explanation
    #[serde(default)]
    pub msg: String,
    /// Arbitrary result value
    #[serde(default)]
    pub data: Value,
}

impl ResultPayload {
    /// Successful payload carrying `data`
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            code: Code::Success,
            msg: SUCCESS_MSG.to_string(),
            data: data.into(),
        }
    }

    /// Successful payload with no data
    pub fn ok() -> Self {
        Self::success(Value::Null)
    }

    /// Failure payload with the given category and message
    pub fn failure(code: Code, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: Value::Null,
        }
    }

    /// Attach data to a payload (used by partial failures that still report detail)
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// Whether the payload denotes success
    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}
