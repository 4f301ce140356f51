//! Command and response values exchanged with the transport
//!
//! A [`Command`] is built by the caller, handed to
//! [`RadioTransport::send`](crate::RadioTransport::send) and answered with a
//! fresh [`Response`]. Both are plain values with no shared ownership.

use bytes::Bytes;
use std::borrow::Cow;
use tracing::warn;

use crate::codebook::StatusCode;

/// Wire command codes (byte 1 of a frame)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// Read a value
    Get = 0x01,
    /// Write a value
    Set = 0x02,
    /// List children of a path
    List = 0x03,
    /// Search below a path
    Search = 0x04,
    /// Changes since a reference point
    Diff = 0x05,
    /// Several operations in one frame
    Batch = 0x06,
    /// Liveness check
    Ping = 0x07,
    /// Acknowledgement from the far end
    Ack = 0x80,
    /// Error reply from the far end
    Error = 0xFF,
}

impl CommandCode {
    /// Look up a code by its wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Get),
            0x02 => Some(Self::Set),
            0x03 => Some(Self::List),
            0x04 => Some(Self::Search),
            0x05 => Some(Self::Diff),
            0x06 => Some(Self::Batch),
            0x07 => Some(Self::Ping),
            0x80 => Some(Self::Ack),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

impl From<CommandCode> for u8 {
    fn from(code: CommandCode) -> Self {
        code as u8
    }
}

/// Request methods a caller can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    /// Read a value
    #[default]
    Get,
    /// Write a value
    Set,
    /// List children
    List,
    /// Search
    Search,
    /// Diff
    Diff,
    /// Batch
    Batch,
    /// Ping
    Ping,
}

impl Method {
    /// Parse a method name, case-insensitively
    ///
    /// Unrecognized names degrade to [`Method::Get`] with a warning.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "SET" => Method::Set,
            "LIST" => Method::List,
            "SEARCH" => Method::Search,
            "DIFF" => Method::Diff,
            "BATCH" => Method::Batch,
            "PING" => Method::Ping,
            _ => {
                warn!(method = name, "Unknown command method, sending as GET");
                Method::Get
            }
        }
    }

    /// Wire command code for this method
    pub fn code(&self) -> CommandCode {
        match self {
            Method::Get => CommandCode::Get,
            Method::Set => CommandCode::Set,
            Method::List => CommandCode::List,
            Method::Search => CommandCode::Search,
            Method::Diff => CommandCode::Diff,
            Method::Batch => CommandCode::Batch,
            Method::Ping => CommandCode::Ping,
        }
    }

    /// Upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Set => "SET",
            Method::List => "LIST",
            Method::Search => "SEARCH",
            Method::Diff => "DIFF",
            Method::Batch => "BATCH",
            Method::Ping => "PING",
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        Method::parse(name)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argument value kinds the compressor can carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Free text
    Text(String),
    /// 32-bit signed integer
    Integer(i32),
    /// Equipment status from the fixed vocabulary
    Status(StatusCode),
}

impl ArgValue {
    /// Convert a loosely typed JSON value
    ///
    /// Returns `None` for kinds the wire format cannot carry (null, bool,
    /// float, array, object, integers outside the i32 range).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(ArgValue::Text(s.clone())),
            serde_json::Value::Number(n) => n
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(ArgValue::Integer),
            _ => None,
        }
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Text(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Integer(value)
    }
}

impl From<StatusCode> for ArgValue {
    fn from(value: StatusCode) -> Self {
        ArgValue::Status(value)
    }
}

/// A request to the far end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    method: Method,
    path: String,
    building: Option<String>,
    args: Vec<(String, ArgValue)>,
}

impl Command {
    /// Create a command with no arguments
    pub fn new(method: impl Into<Method>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            building: None,
            args: Vec::new(),
        }
    }

    /// GET a path
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// SET a path
    pub fn set(path: impl Into<String>) -> Self {
        Self::new(Method::Set, path)
    }

    /// PING the far end
    pub fn ping() -> Self {
        Self::new(Method::Ping, "/")
    }

    /// Address this command to a specific building
    ///
    /// Overrides the transport's established context for this command only,
    /// so its path is abbreviated relative to `building`.
    pub fn with_building(mut self, building: impl Into<String>) -> Self {
        self.building = Some(building.into());
        self
    }

    /// Append an argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    /// Append arguments from a JSON object
    ///
    /// Values the wire format cannot carry are dropped with a warning.
    pub fn with_json_args(mut self, args: &serde_json::Map<String, serde_json::Value>) -> Self {
        for (key, value) in args {
            match ArgValue::from_json(value) {
                Some(arg) => self.args.push((key.clone(), arg)),
                None => warn!(key = %key, value = %value, "Dropping unsupported argument type"),
            }
        }
        self
    }

    /// Request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Equipment/location path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full building identifier, if given
    pub fn building(&self) -> Option<&str> {
        self.building.as_deref()
    }

    /// Arguments in insertion order
    pub fn args(&self) -> &[(String, ArgValue)] {
        &self.args
    }
}

/// Status reported for a successful reply
pub const STATUS_OK: u16 = 200;

/// Status reported for an error reply
pub const STATUS_ERROR: u16 = 500;

/// A reply from the far end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP-style status (200 or 500)
    pub status: u16,
    /// Opaque reply payload
    pub data: Bytes,
    /// Error message, only for error replies
    pub error: Option<String>,
}

impl Response {
    /// Successful reply carrying a payload
    pub fn ok(data: impl Into<Bytes>) -> Self {
        Self {
            status: STATUS_OK,
            data: data.into(),
            error: None,
        }
    }

    /// Error reply carrying a message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR,
            data: Bytes::new(),
            error: Some(message.into()),
        }
    }

    /// Check for a success status
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Payload as text (lossy UTF-8)
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parse_case_insensitive() {
        assert_eq!(Method::parse("get"), Method::Get);
        assert_eq!(Method::parse("Search"), Method::Search);
        assert_eq!(Method::parse("PING"), Method::Ping);
        assert_eq!(Method::parse("batch"), Method::Batch);
    }

    #[test]
    fn test_unknown_method_degrades_to_get() {
        assert_eq!(Method::parse("DELETE"), Method::Get);
        assert_eq!(Method::parse(""), Method::Get);
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(u8::from(Method::Get.code()), 0x01);
        assert_eq!(u8::from(Method::Ping.code()), 0x07);
        assert_eq!(u8::from(CommandCode::Ack), 0x80);
        assert_eq!(CommandCode::from_byte(0xFF), Some(CommandCode::Error));
        assert_eq!(CommandCode::from_byte(0x42), None);
    }

    #[test]
    fn test_command_builder_keeps_arg_order() {
        let cmd = Command::set("/floor-1/hvac/ahu-1")
            .with_building("HQ")
            .with_arg("setpoint", 21)
            .with_arg("mode", "cool")
            .with_arg("status", StatusCode::Operational);

        assert_eq!(cmd.method(), Method::Set);
        assert_eq!(cmd.building(), Some("HQ"));
        let keys: Vec<_> = cmd.args().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["setpoint", "mode", "status"]);
    }

    #[test]
    fn test_json_args_drop_unsupported() {
        let args = json!({
            "name": "outlet",
            "count": 4,
            "ratio": 0.5,
            "enabled": true,
            "huge": 10_000_000_000i64,
            "tags": ["a"]
        });
        let cmd = Command::get("/x").with_json_args(args.as_object().unwrap());

        assert_eq!(cmd.args().len(), 2);
        assert!(cmd
            .args()
            .contains(&("name".to_string(), ArgValue::Text("outlet".to_string()))));
        assert!(cmd
            .args()
            .contains(&("count".to_string(), ArgValue::Integer(4))));
    }

    #[test]
    fn test_response_helpers() {
        let ok = Response::ok(Bytes::from_static(b"21.5"));
        assert!(ok.is_success());
        assert_eq!(ok.text(), "21.5");

        let err = Response::error("no such device");
        assert!(!err.is_success());
        assert_eq!(err.status, STATUS_ERROR);
        assert_eq!(err.error.as_deref(), Some("no such device"));
    }
}
