//! Gateway: on-device HTTP/JSON-RPC ingress, method dispatch, owner bridge.
//!
//! Startup:
//! 1. Load config, open the settings store
//! 2. Build [`state::GatewayState`] (bus, bridge, lifecycle, synthesizer)
//! 3. Register local and forwarded methods
//! 4. Serve HTTP routes and the `/owner` WebSocket link
//!
//! Owning components (input, screen recording) attach over `/owner` and
//! answer forwarded calls; the proxy service is driven through
//! [`services::ServiceControl`].

pub mod bridge;
pub mod error;
pub mod helper;
pub mod lifecycle;
pub mod methods;
pub mod owner_link;
pub mod params;
pub mod server;
pub mod services;
pub mod state;
pub mod store;
pub mod synth;

pub use error::{Error, Result};
