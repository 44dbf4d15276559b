//! Wire envelopes for the clearnode protocol.
//!
//! Outbound frames are `{"req": [id, method, params, ts], "sig": [..]}`;
//! inbound frames are `{"res": [id, method, data, ts], "sig": [..]}`.
//! Element 0 of the positional array is the correlation identifier,
//! element 1 the method tag used for routing. A reserved set of method
//! tags marks asynchronous background notices that correlate to nothing.

use serde_json::{json, Value};

/// Method tags for server-push notices that must never resolve a waiter.
pub const BACKGROUND_METHODS: &[&str] = &["bu", "channels", "transfer", "assets", "ping"];

/// Method tag the clearnode uses for request rejections.
pub const ERROR_METHOD: &str = "error";

/// An outbound request envelope.
#[derive(Clone, Debug)]
pub struct RpcRequest {
    /// Correlation identifier, unique per connection lifetime
    pub id: u64,
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Value,
    /// Client timestamp, epoch milliseconds
    pub timestamp: u64,
}

impl RpcRequest {
    /// Creates a request envelope stamped with the current time.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        }
    }

    /// The positional payload array; this is what gets signed.
    pub fn payload(&self) -> Value {
        json!([self.id, self.method, self.params, self.timestamp])
    }

    /// Canonical bytes of the payload, for signing.
    pub fn payload_bytes(&self) -> Vec<u8> {
        self.payload().to_string().into_bytes()
    }

    /// The full wire frame with the given signatures attached.
    pub fn envelope(&self, signatures: &[String]) -> String {
        json!({ "req": self.payload(), "sig": signatures }).to_string()
    }
}

/// An inbound response envelope.
#[derive(Clone, Debug)]
pub struct RpcResponse {
    /// Correlation identifier matching the originating request
    pub id: u64,
    /// Method tag
    pub method: String,
    /// Response data
    pub data: Value,
    /// Server timestamp, epoch milliseconds
    pub timestamp: u64,
}

impl RpcResponse {
    /// True if the node rejected the originating request.
    pub fn is_error(&self) -> bool {
        self.method == ERROR_METHOD
    }

    /// The server-reported rejection reason, if this is an error frame.
    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error() {
            return None;
        }
        self.data
            .get("error")
            .and_then(Value::as_str)
            .or(Some("unspecified remote error"))
    }
}

/// Maps an error frame to the matching [`SwapError::Remote`] variant.
pub fn remote_error(res: &RpcResponse) -> clearswap_core::SwapError {
    clearswap_core::SwapError::Remote {
        code: res.data.get("code").and_then(Value::as_i64).unwrap_or(-1),
        message: res
            .error_message()
            .unwrap_or("unspecified remote error")
            .into(),
    }
}

/// Classification of one inbound text frame.
#[derive(Debug)]
pub enum InboundFrame {
    /// A response carrying a correlation identifier
    Response(RpcResponse),
    /// A background notice; dropped without resolving any waiter
    Notice {
        /// Method tag of the notice
        method: String,
    },
    /// A frame the codec could not make sense of; logged and dropped
    Malformed(String),
}

/// Parses and classifies one inbound text frame.
pub fn classify_frame(text: &str) -> InboundFrame {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return InboundFrame::Malformed(format!("invalid JSON: {e}")),
    };

    let Some(res) = value.get("res") else {
        // Server-initiated frames without a response envelope carry nothing
        // for the correlator.
        return InboundFrame::Malformed("frame has no res envelope".into());
    };

    let method = match res.get(1).and_then(Value::as_str) {
        Some(m) => m.to_string(),
        None => return InboundFrame::Malformed("res envelope has no method tag".into()),
    };

    if BACKGROUND_METHODS.contains(&method.as_str()) {
        return InboundFrame::Notice { method };
    }

    let Some(id) = res.get(0).and_then(Value::as_u64) else {
        return InboundFrame::Malformed(format!("res frame for {method} has no numeric id"));
    };

    let data = res.get(2).cloned().unwrap_or(Value::Null);
    let timestamp = res.get(3).and_then(Value::as_u64).unwrap_or(0);

    InboundFrame::Response(RpcResponse {
        id,
        method,
        data,
        timestamp,
    })
}
