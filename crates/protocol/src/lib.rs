//! Gateway RPC and bus protocol definitions.
//!
//! Two surfaces share these types:
//! - the HTTP/JSON-RPC surface (`RpcEnvelope`, `Request`, `RequestId`)
//! - the process-local bus between the gateway and the owning component
//!   (`BusMessage` on the request channel, `BusReply` on the response channel,
//!   `OwnerFrame` for owners attached over the owner link)

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const JSONRPC_VERSION: &str = "2.0";
/// Id echoed when the caller did not supply one.
pub const DEFAULT_REQUEST_ID: &str = "1";
pub const DEFAULT_PORT: u16 = 4477;
/// Loopback port of the privileged helper (device info, file streaming).
pub const HELPER_PORT: u16 = 4447;
pub const FORWARD_TIMEOUT_MS: u64 = 30_000; // 30s
pub const MAX_BODY_BYTES: usize = 1_048_576; // 1 MB

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("missing method")]
    MissingMethod,
    #[error("params must be an array")]
    ParamsNotArray,
    #[error("id must be a string or a number")]
    InvalidId,
    #[error("reply carries both result and error")]
    AmbiguousReply,
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Method names ─────────────────────────────────────────────────────────────

pub mod methods {
    // Served by the gateway process.
    pub const DEVICE_INFO: &str = "deviceInfo";
    pub const SCREEN_WITH_XML: &str = "screenWithXml";
    pub const GET_INSTALLED_APPS: &str = "getInstalledApps";
    pub const IS_CLASH_RUNNING: &str = "isClashRunning";
    pub const EDIT_CLASH_PROXY_CONFIG: &str = "editClashProxyConfig";
    pub const SET_CLASH_AUTO_RESTART: &str = "setClashAutoRestart";
    pub const SET_ACCESS_CONTROL_PACKAGES: &str = "setAccessControlPackages";
    pub const SET_ACCESS_CONTROL_MODE: &str = "setAccessControlMode";
    pub const START_CLASH: &str = "startClash";
    pub const STOP_CLASH: &str = "stopClash";
    pub const GET_CLASH_CONFIG: &str = "getClashConfig";
    pub const UPDATE_CLASH: &str = "updateClash";

    // Owned by the UI-bound component.
    pub const AGENT_APP_INFO: &str = "agentAppInfo";
    pub const CLICK: &str = "click";
    pub const INPUT_TEXT: &str = "inputText";
    pub const PRESS_KEY: &str = "pressKey";
    pub const TAKE_SCREENSHOT: &str = "takeScreenshot";
    pub const DUMP_WINDOW_HIERARCHY: &str = "dumpWindowHierarchy";
    pub const SHOW_TOAST: &str = "showToast";
    pub const GET_OPENCV_JS: &str = "getOpencvJs";
    pub const CHECK_PERMISSION: &str = "checkPermission";
    pub const REQUEST_PERMISSION: &str = "requestPermission";
    pub const START_ACTION: &str = "startAction";
    pub const ON_START_RECORDING: &str = "onStartRecording";
    pub const ON_STOP_RECORDING: &str = "onStopRecording";
    pub const ON_START_INPUT: &str = "onStartInput";
    pub const ON_STOP_INPUT: &str = "onStopInput";
}

/// Fire-and-forget signal names published on the request channel.
pub mod signals {
    pub const PROXY_STATE_CHANGED: &str = "onProxyStateChanged";
}

// ── Request ──────────────────────────────────────────────────────────────────

/// Caller-assigned request id, echoed verbatim in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    Text(String),
}

impl Default for RequestId {
    fn default() -> Self {
        Self::Text(DEFAULT_REQUEST_ID.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl RequestId {
    fn from_value(value: Option<serde_json::Value>) -> Result<Self> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(serde_json::Value::String(s)) => Ok(Self::Text(s)),
            Some(serde_json::Value::Number(n)) => Ok(Self::Number(n)),
            Some(_) => Err(Error::InvalidId),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Arrived over HTTP from a paired client.
    External,
    /// Issued by the gateway itself (aliases, background jobs).
    Internal,
}

/// A parsed RPC call, independent of which HTTP shape carried it.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub params: Vec<serde_json::Value>,
    pub id: RequestId,
    pub source: Source,
}

impl Request {
    /// A call with no params and the default id (`/api`, aliases).
    pub fn bare(method: impl Into<String>, source: Source) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
            id: RequestId::default(),
            source,
        }
    }

    /// Parse a framed JSON-RPC body `{method, params, id}`.
    ///
    /// Absent or null `params` means no params; absent or null `id` becomes
    /// [`DEFAULT_REQUEST_ID`].
    pub fn from_rpc_body(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let serde_json::Value::Object(mut obj) = value else {
            return Err(Error::NotAnObject);
        };

        let method = match obj.remove("method") {
            Some(serde_json::Value::String(m)) if !m.is_empty() => m,
            _ => return Err(Error::MissingMethod),
        };
        let params = match obj.remove("params") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items,
            Some(_) => return Err(Error::ParamsNotArray),
        };
        let id = RequestId::from_value(obj.remove("id"))?;

        Ok(Self {
            method,
            params,
            id,
            source: Source::External,
        })
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// Outcome of one call: a result or an error message, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Result(serde_json::Value),
    Error(String),
}

impl Response {
    pub fn ok(result: serde_json::Value) -> Self {
        Self::Result(result)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Build from the two optional wire fields of a reply.
    ///
    /// A reply with neither field is treated as an empty-response error.
    pub fn from_parts(
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<Self> {
        match (result, error) {
            (Some(_), Some(_)) => Err(Error::AmbiguousReply),
            (Some(result), None) => Ok(Self::Result(result)),
            (None, Some(error)) => Ok(Self::Error(error)),
            (None, None) => Ok(Self::Error("Empty response".into())),
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Result(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Result(_) => None,
            Self::Error(e) => Some(e),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}

/// JSON-RPC envelope returned over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl RpcEnvelope {
    pub fn new(id: RequestId, response: Response) -> Self {
        let (result, err) = match response {
            Response::Result(v) => (Some(v), None),
            Response::Error(e) => (None, Some(e)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result,
            err,
        }
    }
}

// ── Bus frames ───────────────────────────────────────────────────────────────

/// Method call carried to the owning component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardPayload {
    pub method: String,
    pub params: Vec<serde_json::Value>,
}

/// Request channel: gateway → owning component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BusMessage {
    /// Expects exactly one [`BusReply`] carrying the same token.
    Request {
        token: String,
        payload: ForwardPayload,
    },
    /// No reply expected.
    Signal { signal: String },
}

/// Response channel: owning component → gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct BusReply {
    pub token: String,
    pub response: Response,
}

/// Frames an out-of-process owner sends over the owner link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OwnerFrame {
    Reply {
        token: String,
        #[serde(
            default,
            deserialize_with = "present",
            skip_serializing_if = "Option::is_none"
        )]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Readiness {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recording: Option<bool>,
    },
}

/// `null` is a valid result, so only an absent field reads as `None`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl OwnerFrame {
    /// Convert a reply frame into a [`BusReply`]. Returns `None` for
    /// non-reply frames.
    pub fn into_reply(self) -> Option<Result<BusReply>> {
        match self {
            Self::Reply {
                token,
                result,
                error,
            } => Some(Response::from_parts(result, error).map(|response| BusReply {
                token,
                response,
            })),
            Self::Readiness { .. } => None,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parses_full_body() {
        let req =
            Request::from_rpc_body(br#"{"method":"click","params":[10,20],"id":"abc"}"#).unwrap();
        assert_eq!(req.method, "click");
        assert_eq!(req.params, vec![json!(10), json!(20)]);
        assert_eq!(req.id, RequestId::Text("abc".into()));
        assert_eq!(req.source, Source::External);
    }

    #[test]
    fn numeric_id_is_kept_numeric() {
        let req = Request::from_rpc_body(br#"{"method":"deviceInfo","id":42}"#).unwrap();
        let env = RpcEnvelope::new(req.id, Response::ok(json!({})));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["id"], json!(42));
    }

    #[test]
    fn absent_id_and_params_use_defaults() {
        let req = Request::from_rpc_body(br#"{"method":"deviceInfo"}"#).unwrap();
        assert!(req.params.is_empty());
        assert_eq!(req.id, RequestId::Text("1".into()));
    }

    #[test]
    fn rejects_missing_method() {
        assert!(matches!(
            Request::from_rpc_body(br#"{"params":[]}"#),
            Err(Error::MissingMethod)
        ));
        assert!(matches!(
            Request::from_rpc_body(br#"{"method":""}"#),
            Err(Error::MissingMethod)
        ));
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(
            Request::from_rpc_body(b"not json"),
            Err(Error::InvalidJson(_))
        ));
        assert!(matches!(
            Request::from_rpc_body(b"[1,2]"),
            Err(Error::NotAnObject)
        ));
        assert!(matches!(
            Request::from_rpc_body(br#"{"method":"x","params":{"a":1}}"#),
            Err(Error::ParamsNotArray)
        ));
        assert!(matches!(
            Request::from_rpc_body(br#"{"method":"x","id":true}"#),
            Err(Error::InvalidId)
        ));
    }

    #[test]
    fn envelope_carries_exactly_one_outcome() {
        let ok = serde_json::to_value(RpcEnvelope::new(
            RequestId::default(),
            Response::ok(json!({"a": 1})),
        ))
        .unwrap();
        assert_eq!(ok["jsonrpc"], "2.0");
        assert_eq!(ok["result"], json!({"a": 1}));
        assert!(ok.get("err").is_none());

        let err = serde_json::to_value(RpcEnvelope::new(
            RequestId::default(),
            Response::error("boom"),
        ))
        .unwrap();
        assert_eq!(err["err"], "boom");
        assert!(err.get("result").is_none());
    }

    #[test]
    fn reply_parts_are_mutually_exclusive() {
        assert!(matches!(
            Response::from_parts(Some(json!(1)), Some("e".into())),
            Err(Error::AmbiguousReply)
        ));
        assert_eq!(
            Response::from_parts(None, None).unwrap(),
            Response::error("Empty response")
        );
        assert_eq!(
            Response::from_parts(Some(json!(true)), None).unwrap(),
            Response::ok(json!(true))
        );
    }

    #[test]
    fn null_result_is_a_successful_reply() {
        let frame: OwnerFrame =
            serde_json::from_str(r#"{"type":"reply","token":"t","result":null}"#).unwrap();
        let reply = frame.into_reply().unwrap().unwrap();
        assert_eq!(reply.token, "t");
        assert_eq!(reply.response, Response::ok(serde_json::Value::Null));

        let frame: OwnerFrame = serde_json::from_str(r#"{"type":"reply","token":"t"}"#).unwrap();
        assert_eq!(
            frame.into_reply().unwrap().unwrap().response,
            Response::error("Empty response")
        );

        let env = RpcEnvelope::new(RequestId::default(), Response::ok(serde_json::Value::Null));
        let v = serde_json::to_value(&env).unwrap();
        assert!(v.as_object().unwrap().contains_key("result"));
        assert!(v["result"].is_null());
        assert!(v.get("err").is_none());
        let back: RpcEnvelope = serde_json::from_value(v).unwrap();
        assert_eq!(back.result, Some(serde_json::Value::Null));
    }

    #[test]
    fn bus_request_wire_shape() {
        let msg = BusMessage::Request {
            token: "t-1".into(),
            payload: ForwardPayload {
                method: "click".into(),
                params: vec![json!(1), json!(2)],
            },
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "request");
        assert_eq!(v["token"], "t-1");
        assert_eq!(v["payload"]["method"], "click");

        let signal = serde_json::to_value(BusMessage::Signal {
            signal: signals::PROXY_STATE_CHANGED.into(),
        })
        .unwrap();
        assert_eq!(signal, json!({"type": "signal", "signal": "onProxyStateChanged"}));
    }

    #[test]
    fn owner_reply_frame_converts() {
        let frame: OwnerFrame =
            serde_json::from_value(json!({"type": "reply", "token": "t", "error": "nope"}))
                .unwrap();
        let reply = frame.into_reply().unwrap().unwrap();
        assert_eq!(reply.token, "t");
        assert_eq!(reply.response, Response::error("nope"));

        let readiness: OwnerFrame =
            serde_json::from_value(json!({"type": "readiness", "input": true})).unwrap();
        assert!(readiness.into_reply().is_none());
    }
}
