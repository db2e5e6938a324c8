use std::{sync::Arc, time::Instant};

use {tether_common::ReadinessSet, tether_config::TetherConfig};

use crate::{
    bridge::{Bridge, LocalBus},
    error::Result,
    helper::HelperClient,
    lifecycle::{LifecycleController, StopWait},
    owner_link::OwnerLink,
    services::GatewayServices,
    store::Store,
    synth::ConfigSynthesizer,
};

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    /// Server version string.
    pub version: String,
    /// Effective configuration.
    pub config: TetherConfig,
    /// Request channel towards owning components.
    pub bus: LocalBus,
    /// Pending forwarded calls.
    pub bridge: Arc<Bridge>,
    pub lifecycle: Arc<LifecycleController>,
    pub synthesizer: Arc<ConfigSynthesizer>,
    pub store: Arc<Store>,
    /// Readiness held on behalf of attached owners.
    pub owner_link: OwnerLink,
    /// Read-only view of every readiness flag.
    pub readiness: ReadinessSet,
    pub services: GatewayServices,
    pub helper: HelperClient,
    started_at: Instant,
}

impl GatewayState {
    pub fn new(config: TetherConfig, services: GatewayServices, store: Store) -> Result<Arc<Self>> {
        let bus = LocalBus::default();
        let bridge = Arc::new(Bridge::new(
            Arc::new(bus.clone()),
            config.bridge.forward_timeout(),
        ));
        let store = Arc::new(store);
        let synthesizer = Arc::new(ConfigSynthesizer::new(config.assets.config_template.clone()));
        let lifecycle = Arc::new(LifecycleController::new(
            Arc::clone(&services.control),
            Arc::clone(&services.profiles),
            Arc::clone(&synthesizer),
            Arc::clone(&store),
            Arc::clone(&bridge),
            config.server.port,
            StopWait::from(&config.lifecycle),
        ));
        let owner_link = OwnerLink::new();
        let readiness = ReadinessSet {
            input: owner_link.input(),
            recording: owner_link.recording(),
            proxy: services.control.readiness(),
        };
        let helper = HelperClient::new(&config.helper)?;

        Ok(Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            bus,
            bridge,
            lifecycle,
            synthesizer,
            store,
            owner_link,
            readiness,
            services,
            helper,
            started_at: Instant::now(),
        }))
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Noop services, in-memory store, helper pointed at a closed port.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Arc<Self> {
        let mut config = TetherConfig::default();
        config.helper.url = "http://127.0.0.1:9".into();
        config.helper.timeout_secs = 1;
        match Self::new(config, GatewayServices::noop(), Store::in_memory()) {
            Ok(state) => state,
            Err(e) => panic!("test state: {e}"),
        }
    }
}
