//! Query model: wire request/response types and request parsing

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueryError, Result};

/// Operation kind carried in the `type` key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum QueryKind {
    Insert,
    Select,
    Delete,
    /// Any other string. Parses fine; the dispatcher rejects it.
    Other(String),
}

impl From<String> for QueryKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "insert" => QueryKind::Insert,
            "select" => QueryKind::Select,
            "delete" => QueryKind::Delete,
            _ => QueryKind::Other(s),
        }
    }
}

impl QueryKind {
    pub fn as_str(&self) -> &str {
        match self {
            QueryKind::Insert => "insert",
            QueryKind::Select => "select",
            QueryKind::Delete => "delete",
            QueryKind::Other(s) => s,
        }
    }
}

/// Request from client
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: QueryKind,
    #[serde(rename = "table")]
    pub target: String,
    /// Ordered column values for insert, `[column, value]` for a filter.
    #[serde(default)]
    pub payload: Option<Vec<Value>>,
}

/// A `[column, value]` pair narrowing a select or delete
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    /// Interpret a payload as a filter.
    pub fn from_payload(payload: &[Value]) -> Result<Self> {
        match payload {
            [Value::String(column), value] => Ok(Filter {
                column: column.clone(),
                value: value.clone(),
            }),
            _ => Err(QueryError::InvalidPayload(format!(
                "filter must be [column, value], got {} element(s)",
                payload.len()
            ))),
        }
    }
}

impl Request {
    /// Payload as a filter, if one was sent.
    pub fn filter(&self) -> Result<Option<Filter>> {
        self.payload
            .as_deref()
            .map(Filter::from_payload)
            .transpose()
    }
}

/// Decode one message body into a [`Request`].
///
/// Malformed JSON, a value of the wrong shape, and a value that decodes to
/// nothing (`null`, `{}`, `[]`, `""`, `0`, `false`) are all parse errors.
pub fn parse(raw: &[u8]) -> Result<Request> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| QueryError::Parse(e.to_string()))?;

    if is_falsy(&value) {
        return Err(QueryError::Parse("empty query".to_string()));
    }

    serde_json::from_value(value).map_err(|e| QueryError::Parse(e.to_string()))
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// One result row, column values in table order
pub type Row = Vec<Value>;

/// Response to client
///
/// `success` mirrors whether an error occurred; a select carries `payload`,
/// a failure carries `error`, an insert or delete carries neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Rows { success: bool, payload: Vec<Row> },
    Ok { success: bool },
    Error { success: bool, error: String },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok { success: true }
    }

    pub fn rows(payload: Vec<Row>) -> Self {
        Response::Rows {
            success: true,
            payload,
        }
    }

    pub fn error(err: &QueryError) -> Self {
        Response::Error {
            success: false,
            error: err.client_message().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Response::Error { .. })
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
