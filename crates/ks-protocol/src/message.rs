//! Frame types for the KubeSpace agent protocol
//!
//! # Message Flow
//!
//! 1. Agent dials the control endpoint (`/api/v1/kube/connect`) with its `token` header
//! 2. Server pushes [`Request`] frames; each names an `action` and carries raw `params`
//! 3. Agent answers each request with one [`Response`] of type [`ResType::Request`],
//!    written on a fresh connection to `/api/v1/kube/response`
//! 4. Streaming actions emit many [`ResType::Exec`] frames sharing the request id,
//!    all written over one persistent response connection
//! 5. The server ends a stream by sending the reserved [`actions::CLOSE_EXEC_CONN`]
//!    request naming the session
//!
//! Cluster change notifications use step 3 with a kind marker as the request id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::ResultPayload;
use crate::session::RequestId;

/// Reserved and well-known action names
pub mod actions {
    /// Terminate the exec session named by `session_id` in the params
    pub const CLOSE_EXEC_CONN: &str = "closeExecConn";
}

/// Inbound request from the control server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Server-assigned ID, unique per in-flight request
    pub request_id: RequestId,
    /// Selects the dispatcher entry
    pub action: String,
    /// Opaque parameters, decoded by the handler
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Create a new request
    pub fn new(request_id: impl Into<RequestId>, action: impl Into<String>, params: Value) -> Self {
        Self {
            request_id: request_id.into(),
            action: action.into(),
            params,
        }
    }

    /// Whether this request is the reserved session teardown action
    pub fn is_close_exec(&self) -> bool {
        self.action == actions::CLOSE_EXEC_CONN
    }
}

/// Parameters of the reserved session teardown action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseExecParams {
    /// Request ID of the exec session to stop
    #[serde(default)]
    pub session_id: String,
}

/// Response variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResType {
    /// One-shot reply to a request (or a relayed change notification)
    Request,
    /// One frame of a streaming session
    Exec,
}

/// Outbound response to the control server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Request this response belongs to (session key for exec frames)
    pub request_id: RequestId,
    /// Delivery path selector
    pub res_type: ResType,
    /// Result payload
    pub data: ResultPayload,
}

impl Response {
    /// One-shot reply
    pub fn request(request_id: impl Into<RequestId>, data: ResultPayload) -> Self {
        Self {
            request_id: request_id.into(),
            res_type: ResType::Request,
            data,
        }
    }

    /// One streaming frame
    pub fn exec(request_id: impl Into<RequestId>, data: ResultPayload) -> Self {
        Self {
            request_id: request_id.into(),
            res_type: ResType::Exec,
            data,
        }
    }

    /// Whether this frame belongs to a streaming session
    pub fn is_exec(&self) -> bool {
        self.res_type == ResType::Exec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Code;
    use serde_json::json;

    #[test]
    fn test_request_decodes_object_params() {
        let raw = r#"{"request_id":"r1","action":"config_map.get","params":{"name":"x","namespace":"ns"}}"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(request.request_id.as_str(), "r1");
        assert_eq!(request.action, "config_map.get");
        assert_eq!(request.params["namespace"], "ns");
        assert!(!request.is_close_exec());
    }

    #[test]
    fn test_request_without_params() {
        let request: Request =
            serde_json::from_str(r#"{"request_id":"r2","action":"cluster.get"}"#).unwrap();
        assert_eq!(request.params, Value::Null);
    }

    #[test]
    fn test_close_exec_request() {
        let request = Request::new("r3", actions::CLOSE_EXEC_CONN, json!({"session_id": "s1"}));
        assert!(request.is_close_exec());
        let params: CloseExecParams = serde_json::from_value(request.params).unwrap();
        assert_eq!(params.session_id, "s1");
    }

    #[test]
    fn test_response_res_type_wire_names() {
        let response = Response::exec("s1", ResultPayload::failure(Code::ParamsError, "bad"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["res_type"], "exec");
        assert_eq!(value["data"]["code"], 1);

        let response = Response::request("r1", ResultPayload::ok());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["res_type"], "request");
        assert!(!response.is_exec());
    }
}
