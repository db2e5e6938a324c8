//! Capability registry and command dispatch.
//!
//! Every method is either served here by a registered handler or forwarded to
//! the owning component through the correlation bridge. Anything else is an
//! unknown method.

mod device;
mod proxy;

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
};

use {
    futures::FutureExt,
    tracing::{debug, warn},
};

use tether_protocol::{ForwardPayload, Request, RequestId, Response, Source, methods as m};

use crate::{
    error::{Error, Result},
    params::Params,
    state::GatewayState,
};

// ── Types ────────────────────────────────────────────────────────────────────

/// Context passed to every local handler.
pub struct MethodContext {
    pub request_id: RequestId,
    pub method: String,
    pub params: Params,
    pub source: Source,
    pub state: Arc<GatewayState>,
}

/// The result a local handler produces.
pub type MethodResult = Result<serde_json::Value>;

/// A boxed async method handler.
pub type HandlerFn =
    Box<dyn Fn(MethodContext) -> Pin<Box<dyn Future<Output = MethodResult> + Send>> + Send + Sync>;

pub enum HandlerKind<'a> {
    Local(&'a HandlerFn),
    ForwardToOwner,
    Unknown,
}

/// Methods whose implementation lives in the owning component.
const FORWARDED_METHODS: &[&str] = &[
    m::AGENT_APP_INFO,
    m::CLICK,
    m::INPUT_TEXT,
    m::PRESS_KEY,
    m::TAKE_SCREENSHOT,
    m::DUMP_WINDOW_HIERARCHY,
    m::SHOW_TOAST,
    m::GET_OPENCV_JS,
    m::CHECK_PERMISSION,
    m::REQUEST_PERMISSION,
    m::START_ACTION,
    m::ON_START_RECORDING,
    m::ON_STOP_RECORDING,
    m::ON_START_INPUT,
    m::ON_STOP_INPUT,
];

// ── Registry ─────────────────────────────────────────────────────────────────

pub struct MethodRegistry {
    handlers: HashMap<&'static str, HandlerFn>,
    forwarded: HashSet<&'static str>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
            forwarded: HashSet::new(),
        };
        reg.register_defaults();
        reg
    }

    pub fn register(&mut self, method: &'static str, handler: HandlerFn) {
        self.forwarded.remove(method);
        self.handlers.insert(method, handler);
    }

    pub fn register_forward(&mut self, method: &'static str) {
        self.handlers.remove(method);
        self.forwarded.insert(method);
    }

    /// Pure lookup.
    pub fn resolve(&self, method: &str) -> HandlerKind<'_> {
        if let Some(handler) = self.handlers.get(method) {
            HandlerKind::Local(handler)
        } else if self.forwarded.contains(method) {
            HandlerKind::ForwardToOwner
        } else {
            HandlerKind::Unknown
        }
    }

    /// Run one request to completion. Every failure, including a panicking
    /// handler, comes back as [`Response::Error`].
    pub async fn dispatch(&self, state: &Arc<GatewayState>, request: Request) -> Response {
        let Request {
            method,
            params,
            id,
            source,
        } = request;

        match self.resolve(&method) {
            HandlerKind::Unknown => {
                warn!(method, request_id = %id, "unknown method");
                Response::error(Error::UnknownMethod(method).to_string())
            },
            HandlerKind::Local(handler) => {
                let params = match checked_params(&method, &id, &params) {
                    Ok(p) => p,
                    Err(rejected) => return rejected,
                };
                debug!(method, request_id = %id, ?source, "dispatching local method");
                let ctx = MethodContext {
                    request_id: id.clone(),
                    method: method.clone(),
                    params,
                    source,
                    state: Arc::clone(state),
                };
                match AssertUnwindSafe(handler(ctx)).catch_unwind().await {
                    Ok(Ok(payload)) => {
                        debug!(method, request_id = %id, "method ok");
                        Response::ok(payload)
                    },
                    Ok(Err(e)) => {
                        warn!(method, request_id = %id, error = %e, "method error");
                        Response::error(e.to_string())
                    },
                    Err(panic) => {
                        let e = Error::HandlerFailure(panic_message(panic.as_ref()));
                        warn!(method, request_id = %id, error = %e, "method panicked");
                        Response::error(e.to_string())
                    },
                }
            },
            HandlerKind::ForwardToOwner => {
                let params = match checked_params(&method, &id, &params) {
                    Ok(p) => p,
                    Err(rejected) => return rejected,
                };
                debug!(method, request_id = %id, ?source, "forwarding to owner");
                let payload = ForwardPayload {
                    method: method.clone(),
                    params: params.into_wire(),
                };
                match state.bridge.send(payload).await {
                    Ok(response) => response,
                    Err(e) => Response::error(e.to_string()),
                }
            },
        }
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .handlers
            .keys()
            .chain(self.forwarded.iter())
            .copied()
            .collect();
        names.sort_unstable();
        names
    }

    fn register_defaults(&mut self) {
        device::register(self);
        proxy::register(self);
        for &method in FORWARDED_METHODS {
            self.register_forward(method);
        }
    }
}

/// Validate params before anything runs; a rejection is already the response.
fn checked_params(
    method: &str,
    id: &RequestId,
    params: &[serde_json::Value],
) -> std::result::Result<Params, Response> {
    Params::parse(method, params).map_err(|e| {
        warn!(method, request_id = %id, error = %e, "invalid params");
        Response::error(e.to_string())
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".into()
    }
}

/// Handlers receive params already validated for their method; a mismatch
/// means the registry and the schema disagree.
pub(crate) fn unexpected_params(method: &str, params: &Params) -> Error {
    Error::HandlerFailure(format!("{method}: unexpected params {params:?}"))
}
