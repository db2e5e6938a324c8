//! Trait interfaces for the components the gateway drives but does not own:
//! the proxy service, its profile database, and the device surfaces.
//! Each trait has a `Noop` implementation so the gateway can run standalone.

use std::sync::Arc;

use {async_trait::async_trait, serde::Serialize, serde_json::Value, uuid::Uuid};

use tether_common::{Capability, ReadinessHandle, ReadinessOwner};

/// Error type returned by collaborator methods.
pub type ServiceError = String;
pub type ServiceResult<T = Value> = Result<T, ServiceError>;

// ── Proxy service ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The platform wants the user to approve the VPN first; nothing was started.
    ConsentRequired,
}

#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn start(&self) -> ServiceResult<StartOutcome>;
    async fn stop(&self) -> ServiceResult<()>;
    /// Running flag, owned and flipped by the service itself.
    fn readiness(&self) -> ReadinessHandle;
}

/// Holds a proxy readiness flag that never turns on.
pub struct NoopServiceControl {
    running: ReadinessOwner,
}

impl Default for NoopServiceControl {
    fn default() -> Self {
        Self {
            running: ReadinessOwner::new(Capability::Proxy),
        }
    }
}

#[async_trait]
impl ServiceControl for NoopServiceControl {
    async fn start(&self) -> ServiceResult<StartOutcome> {
        Err("proxy service not configured".into())
    }

    async fn stop(&self) -> ServiceResult<()> {
        Ok(())
    }

    fn readiness(&self) -> ReadinessHandle {
        self.running.handle()
    }
}

// ── Profiles ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInfo {
    pub uuid: Uuid,
    pub name: String,
    pub source_url: String,
}

/// The proxy service's profile database.
#[async_trait]
pub trait ProfileManager: Send + Sync {
    /// Create a URL profile pending commit.
    async fn create(&self, name: &str, source_url: &str) -> ServiceResult<Uuid>;
    async fn commit(&self, uuid: Uuid) -> ServiceResult<()>;
    async fn query(&self, uuid: Uuid) -> ServiceResult<Option<ProfileInfo>>;
    async fn patch(&self, uuid: Uuid, name: &str, source_url: &str) -> ServiceResult<()>;
    /// Re-fetch the profile from its source URL.
    async fn refresh(&self, uuid: Uuid) -> ServiceResult<()>;
    async fn set_active(&self, uuid: Uuid) -> ServiceResult<()>;
}

pub struct NoopProfileManager;

#[async_trait]
impl ProfileManager for NoopProfileManager {
    async fn create(&self, _name: &str, _source_url: &str) -> ServiceResult<Uuid> {
        Err("profile manager not configured".into())
    }

    async fn commit(&self, _uuid: Uuid) -> ServiceResult<()> {
        Err("profile manager not configured".into())
    }

    async fn query(&self, _uuid: Uuid) -> ServiceResult<Option<ProfileInfo>> {
        Ok(None)
    }

    async fn patch(&self, _uuid: Uuid, _name: &str, _source_url: &str) -> ServiceResult<()> {
        Err("profile manager not configured".into())
    }

    async fn refresh(&self, _uuid: Uuid) -> ServiceResult<()> {
        Err("profile manager not configured".into())
    }

    async fn set_active(&self, _uuid: Uuid) -> ServiceResult<()> {
        Err("profile manager not configured".into())
    }
}

// ── Device ───────────────────────────────────────────────────────────────────

/// Who this device reports to, used when the helper can't be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub server_url: String,
    pub client_id: String,
}

/// Screen, accessibility tree and package list. Only meaningful while the
/// matching readiness flag is set; the gateway checks before calling.
#[async_trait]
pub trait DeviceSurface: Send + Sync {
    /// UI hierarchy in uiautomator XML form.
    async fn window_hierarchy_xml(&self) -> ServiceResult<String>;
    /// Most recent captured frame, JPEG, base64 without a data-URL prefix.
    async fn latest_screen_jpeg(&self) -> ServiceResult<String>;
    async fn installed_apps(&self, include_system: bool) -> ServiceResult<Value>;
    async fn identity(&self) -> DeviceIdentity;
}

pub struct NoopDeviceSurface;

#[async_trait]
impl DeviceSurface for NoopDeviceSurface {
    async fn window_hierarchy_xml(&self) -> ServiceResult<String> {
        Ok(String::new())
    }

    async fn latest_screen_jpeg(&self) -> ServiceResult<String> {
        Ok(String::new())
    }

    async fn installed_apps(&self, _include_system: bool) -> ServiceResult<Value> {
        Ok(serde_json::json!([]))
    }

    async fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::default()
    }
}

// ── Bundle ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct GatewayServices {
    pub control: Arc<dyn ServiceControl>,
    pub profiles: Arc<dyn ProfileManager>,
    pub device: Arc<dyn DeviceSurface>,
}

impl GatewayServices {
    pub fn noop() -> Self {
        Self {
            control: Arc::new(NoopServiceControl::default()),
            profiles: Arc::new(NoopProfileManager),
            device: Arc::new(NoopDeviceSurface),
        }
    }

    pub fn with_control(mut self, control: Arc<dyn ServiceControl>) -> Self {
        self.control = control;
        self
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileManager>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceSurface>) -> Self {
        self.device = device;
        self
    }
}
