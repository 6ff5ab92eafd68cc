//! Request and Response records
//!
//! These are the plaintext structures sealed inside an envelope payload. They
//! travel as JSON so requesters in any language can build them.
//!
//! ```text
//! Requester                                   Service node
//!   |                                              |
//!   |-- Request {requestId, replyPublicKey, ...} ->|   tagged addr(service node)
//!   |                                              |   (handler runs)
//!   |<- Response {requestId, output, status} ------|   tagged addr(replyPublicKey)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{WnsError, WnsResult};

/// Status code for a successful response
pub const STATUS_OK: &str = "200";
/// Status code when the request could not be served as sent
pub const STATUS_BAD_REQUEST: &str = "400";
/// Status code when no handler is registered for the service
pub const STATUS_UNSUPPORTED_SERVICE: &str = "404";
/// Status code when the handler failed
pub const STATUS_HANDLER_ERROR: &str = "500";

/// A service invocation addressed to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Opaque client-chosen correlation token
    pub request_id: String,
    /// Hex public key the response must be sealed for
    #[serde(alias = "publicKey")]
    pub reply_public_key: String,
    /// Name of the requested operation
    pub service: String,
    /// Opaque string argument
    #[serde(default)]
    pub input: String,
}

impl Request {
    pub fn new(
        request_id: impl Into<String>,
        reply_public_key: impl Into<String>,
        service: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            reply_public_key: reply_public_key.into(),
            service: service.into(),
            input: input.into(),
        }
    }

    /// Encode to JSON bytes
    pub fn encode(&self) -> WnsResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| WnsError::Serialization(format!("Failed to encode request: {}", e)))
    }

    /// Decode from JSON bytes
    pub fn decode(data: &[u8]) -> WnsResult<Self> {
        serde_json::from_slice(data).map_err(|e| WnsError::MalformedRequest(e.to_string()))
    }
}

/// The outcome of a request, echoed back under the same `requestId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: String,
    pub output: String,
    pub status_code: String,
    pub message: String,
}

impl Response {
    /// A `200 OK` response carrying `output`
    pub fn ok(request_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            output: output.into(),
            status_code: STATUS_OK.to_string(),
            message: "OK".to_string(),
        }
    }

    /// An error response with an empty output
    pub fn error(
        request_id: impl Into<String>,
        status_code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            output: String::new(),
            status_code: status_code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == STATUS_OK
    }

    /// Encode to JSON bytes
    pub fn encode(&self) -> WnsResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| WnsError::Serialization(format!("Failed to encode response: {}", e)))
    }

    /// Decode from JSON bytes
    pub fn decode(data: &[u8]) -> WnsResult<Self> {
        serde_json::from_slice(data).map_err(|e| WnsError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_field_names() {
        let req = Request::new("1234", "abcd", "ResolveWallet", "");
        let json: serde_json::Value = serde_json::from_slice(&req.encode().unwrap()).unwrap();

        assert_eq!(json["requestId"], "1234");
        assert_eq!(json["replyPublicKey"], "abcd");
        assert_eq!(json["service"], "ResolveWallet");
        assert_eq!(json["input"], "");
    }

    #[test]
    fn test_request_accepts_legacy_public_key_field() {
        let raw = br#"{"requestId":"1","publicKey":"beef","service":"ResolveWallet","input":"x"}"#;
        let req = Request::decode(raw).unwrap();
        assert_eq!(req.reply_public_key, "beef");
        assert_eq!(req.input, "x");
    }

    #[test]
    fn test_request_input_defaults_to_empty() {
        let raw = br#"{"requestId":"1","replyPublicKey":"beef","service":"ResolveWallet"}"#;
        assert_eq!(Request::decode(raw).unwrap().input, "");
    }

    #[test]
    fn test_request_rejects_garbage() {
        assert!(matches!(
            Request::decode(b"hellooo"),
            Err(WnsError::MalformedRequest(_))
        ));
        assert!(matches!(
            Request::decode(br#"{"requestId":"1"}"#),
            Err(WnsError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_response_wire_field_names() {
        let res = Response::ok("1234", "0xabc");
        let json: serde_json::Value = serde_json::from_slice(&res.encode().unwrap()).unwrap();

        assert_eq!(json["requestId"], "1234");
        assert_eq!(json["output"], "0xabc");
        assert_eq!(json["statusCode"], "200");
        assert_eq!(json["message"], "OK");
    }

    #[test]
    fn test_error_response() {
        let res = Response::error("9", STATUS_UNSUPPORTED_SERVICE, "unsupported service: Nope");
        assert!(!res.is_ok());
        assert!(res.output.is_empty());
        assert_eq!(Response::decode(&res.encode().unwrap()).unwrap(), res);
    }
}
