//! Bolt protocol response messages.
//!
//! Response messages are sent from the server to the client.

use std::fmt;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue, ValueMap};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// SUCCESS - Request completed
    Success(SuccessMessage),
    /// RECORD - One result row
    Record(RecordMessage),
    /// FAILURE - Request failed
    Failure(FailureMessage),
    /// IGNORED - Request was not processed (failed or interrupted session)
    Ignored,
}

/// Response message kinds, the keys of a registry's encoder table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ResponseKind {
    Success,
    Record,
    Failure,
    Ignored,
}

impl BoltResponse {
    /// Message kind.
    pub fn kind(&self) -> ResponseKind {
        match self {
            BoltResponse::Success(_) => ResponseKind::Success,
            BoltResponse::Record(_) => ResponseKind::Record,
            BoltResponse::Failure(_) => ResponseKind::Failure,
            BoltResponse::Ignored => ResponseKind::Ignored,
        }
    }

    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Failure(_) => tag::FAILURE,
            BoltResponse::Ignored => tag::IGNORED,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    /// Check if this is a success response.
    pub fn is_success(&self) -> bool {
        matches!(self, BoltResponse::Success(_))
    }

    /// Check if this is a failure response.
    pub fn is_failure(&self) -> bool {
        matches!(self, BoltResponse::Failure(_))
    }

    /// Check if this is an ignored response.
    pub fn is_ignored(&self) -> bool {
        matches!(self, BoltResponse::Ignored)
    }

    /// The SUCCESS payload, if any.
    pub fn as_success(&self) -> Option<&SuccessMessage> {
        match self {
            BoltResponse::Success(msg) => Some(msg),
            _ => None,
        }
    }

    /// The FAILURE payload, if any.
    pub fn as_failure(&self) -> Option<&FailureMessage> {
        match self {
            BoltResponse::Failure(msg) => Some(msg),
            _ => None,
        }
    }

    /// Structure fields for this response.
    pub fn to_fields(&self) -> Vec<PackStreamValue> {
        match self {
            BoltResponse::Success(msg) => vec![msg.metadata.clone().into()],
            BoltResponse::Record(msg) => vec![msg.fields.clone().into()],
            BoltResponse::Failure(msg) => vec![msg.to_map().into()],
            BoltResponse::Ignored => Vec::new(),
        }
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        PackStreamStructure::new(self.tag(), self.to_fields())
    }

    /// Parse from PackStream structure. Servers never need this; clients and tests do.
    pub fn from_structure(s: PackStreamStructure) -> Result<Self, PackStreamError> {
        let mut fields = s.fields.into_iter();
        match s.tag {
            tag::SUCCESS => {
                let metadata = fields.next().and_then(PackStreamValue::into_map).unwrap_or_default();
                Ok(BoltResponse::Success(SuccessMessage { metadata }))
            }
            tag::RECORD => {
                let values = fields
                    .next()
                    .and_then(PackStreamValue::into_list)
                    .ok_or_else(|| PackStreamError::invalid("RECORD fields must be a list"))?;
                Ok(BoltResponse::Record(RecordMessage::new(values)))
            }
            tag::FAILURE => {
                let metadata = fields
                    .next()
                    .and_then(PackStreamValue::into_map)
                    .ok_or_else(|| PackStreamError::invalid("FAILURE requires a metadata map"))?;
                Ok(BoltResponse::Failure(FailureMessage::from_map(metadata)?))
            }
            tag::IGNORED => Ok(BoltResponse::Ignored),
            other => Err(PackStreamError::invalid(format!(
                "Unknown response message tag: 0x{:02X}",
                other
            ))),
        }
    }
}

/// SUCCESS message - Request completed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: ValueMap,
}

impl SuccessMessage {
    /// Create a SUCCESS message with empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a SUCCESS message with metadata.
    pub fn with_metadata(metadata: ValueMap) -> Self {
        Self { metadata }
    }

    /// Get metadata entry.
    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    /// `server` agent from a HELLO reply.
    pub fn server(&self) -> Option<&str> {
        self.get("server").and_then(PackStreamValue::as_str)
    }

    /// `connection_id` from a HELLO reply.
    pub fn connection_id(&self) -> Option<&str> {
        self.get("connection_id").and_then(PackStreamValue::as_str)
    }

    /// Column names from a RUN reply.
    pub fn fields(&self) -> Option<Vec<String>> {
        self.get("fields").cloned().and_then(PackStreamValue::into_string_list)
    }

    /// Whether more records are waiting after a PULL/DISCARD.
    pub fn has_more(&self) -> bool {
        self.get("has_more").and_then(PackStreamValue::as_bool).unwrap_or(false)
    }

    /// Bookmark from a COMMIT or final autocommit PULL.
    pub fn bookmark(&self) -> Option<&str> {
        self.get("bookmark").and_then(PackStreamValue::as_str)
    }

    /// Query id from a RUN inside an explicit transaction.
    pub fn qid(&self) -> Option<i64> {
        self.get("qid").and_then(PackStreamValue::as_int)
    }

    /// Database name.
    pub fn db(&self) -> Option<&str> {
        self.get("db").and_then(PackStreamValue::as_str)
    }
}

/// RECORD message - One result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMessage {
    /// Field values
    pub fields: Vec<PackStreamValue>,
}

impl RecordMessage {
    /// Create a new RECORD message.
    pub fn new(fields: Vec<PackStreamValue>) -> Self {
        Self { fields }
    }

    /// Get field count.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if record is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// FAILURE message - Request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    /// Status code
    pub code: String,
    /// Error message
    pub message: String,
}

impl FailureMessage {
    /// Create a new FAILURE message.
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Status classification: `ClientError`, `TransientError` or `DatabaseError`.
    pub fn classification(&self) -> &str {
        self.code.split('.').nth(1).unwrap_or("Unknown")
    }

    /// Check if this is a transient error.
    pub fn is_transient(&self) -> bool {
        self.classification() == "TransientError"
    }

    fn to_map(&self) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert("code".to_string(), self.code.as_str().into());
        map.insert("message".to_string(), self.message.as_str().into());
        map
    }

    fn from_map(mut map: ValueMap) -> Result<Self, PackStreamError> {
        let mut take = |key: &str| {
            map.remove(key)
                .and_then(PackStreamValue::into_string)
                .ok_or_else(|| PackStreamError::invalid(format!("FAILURE requires {}", key)))
        };
        let code = take("code")?;
        let message = take("message")?;
        Ok(Self { code, message })
    }
}

impl fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
