//! Proxy service lifecycle: start, stop, and the stop-wait-start sequence used
//! when the generated configuration changes.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    chrono::{DateTime, Local, Utc},
    serde::Serialize,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use {tether_common::ReadinessHandle, tether_protocol::signals};

use crate::{
    bridge::Bridge,
    error::{Error, Result},
    services::{ProfileManager, ServiceControl, StartOutcome},
    store::{ProfileBinding, Store},
    synth::ConfigSynthesizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProxyState {
    Stopped,
    Running,
    Restarting,
}

/// Timing knobs for waiting on the service to report stopped.
#[derive(Debug, Clone, Copy)]
pub struct StopWait {
    pub timeout: Duration,
    pub recheck_interval: Duration,
}

impl From<&tether_config::LifecycleConfig> for StopWait {
    fn from(cfg: &tether_config::LifecycleConfig) -> Self {
        Self {
            timeout: cfg.stop_timeout(),
            recheck_interval: cfg.recheck_interval(),
        }
    }
}

pub struct LifecycleController {
    control: Arc<dyn ServiceControl>,
    profiles: Arc<dyn ProfileManager>,
    synthesizer: Arc<ConfigSynthesizer>,
    store: Arc<Store>,
    bridge: Arc<Bridge>,
    running: ReadinessHandle,
    /// Serializes start, stop and update. Held for a whole transition,
    /// including the service and profile calls and the bounded stop wait;
    /// waiters queue in arrival order. The request/reply path never takes it.
    transition: Mutex<()>,
    restarting: AtomicBool,
    source_url: String,
    stop_wait: StopWait,
}

/// Clears the restarting flag however the update ends.
struct RestartingGuard<'a>(&'a AtomicBool);

impl Drop for RestartingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl LifecycleController {
    pub fn new(
        control: Arc<dyn ServiceControl>,
        profiles: Arc<dyn ProfileManager>,
        synthesizer: Arc<ConfigSynthesizer>,
        store: Arc<Store>,
        bridge: Arc<Bridge>,
        port: u16,
        stop_wait: StopWait,
    ) -> Self {
        let running = control.readiness();
        Self {
            control,
            profiles,
            synthesizer,
            store,
            bridge,
            running,
            transition: Mutex::new(()),
            restarting: AtomicBool::new(false),
            source_url: format!("http://127.0.0.1:{port}/clashConfig.yaml"),
            stop_wait,
        }
    }

    pub fn state(&self) -> ProxyState {
        if self.restarting.load(Ordering::SeqCst) {
            ProxyState::Restarting
        } else if self.running.is_ready() {
            ProxyState::Running
        } else {
            ProxyState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_ready()
    }

    /// URL the proxy service fetches its configuration from.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Start the service if it is stopped. Returns `false` when it was
    /// already running or the user has not granted consent yet.
    pub async fn start(&self) -> Result<bool> {
        let _transition = self.transition.lock().await;
        if self.running.is_ready() {
            debug!("proxy already running, start ignored");
            return Ok(false);
        }
        let started = self.start_service().await?;
        self.notify();
        Ok(started)
    }

    /// Stop the service if it is running.
    pub async fn stop(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        if !self.running.is_ready() {
            debug!("proxy not running, stop ignored");
            return Ok(());
        }
        self.control.stop().await.map_err(Error::HandlerFailure)?;
        info!("proxy stop requested");
        self.notify();
        Ok(())
    }

    /// Regenerate the profile and (re)start the service on it.
    ///
    /// A running service is stopped first and only started again once it
    /// reports stopped. If it does not stop within the configured cap the
    /// update fails and nothing is started. Returns `false` when the start
    /// was refused for lack of consent, leaving the service stopped.
    pub async fn update(&self) -> Result<bool> {
        let _transition = self.transition.lock().await;

        // Fail before touching the service if the document can't be built.
        self.synthesizer.synthesize(&self.store.settings())?;
        let binding = self.bind_profile().await?;
        info!(uuid = %binding.uuid, "proxy profile bound");

        let started = if self.running.is_ready() {
            self.restarting.store(true, Ordering::SeqCst);
            let _restarting = RestartingGuard(&self.restarting);
            self.notify();

            self.control.stop().await.map_err(Error::HandlerFailure)?;
            self.wait_until_stopped().await?;
            debug!("proxy stopped, starting on new profile");
            self.start_service().await?
        } else {
            self.start_service().await?
        };
        self.notify();
        Ok(started)
    }

    /// Run [`Self::update`] in the background, logging the outcome.
    pub fn spawn_update(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.update().await {
                Ok(true) => info!("proxy update complete"),
                Ok(false) => warn!("proxy update left the service stopped, consent required"),
                Err(e) => warn!(error = %e, "proxy update failed"),
            }
        })
    }

    async fn start_service(&self) -> Result<bool> {
        match self.control.start().await.map_err(Error::HandlerFailure)? {
            StartOutcome::Started => {
                info!("proxy start requested");
                Ok(true)
            },
            StartOutcome::ConsentRequired => {
                let refused = Error::ServiceControlRefused("user consent required".into());
                warn!(error = %refused, "proxy not started");
                Ok(false)
            },
        }
    }

    /// Wake on every readiness change, and on a fixed tick in case a change
    /// was coalesced away, until the service reports stopped or the cap hits.
    async fn wait_until_stopped(&self) -> Result<()> {
        let StopWait {
            timeout,
            recheck_interval,
        } = self.stop_wait;
        let mut rx = self.running.subscribe();

        let wait = async {
            loop {
                if !*rx.borrow_and_update() {
                    return Ok(());
                }
                if let Ok(Err(_)) = tokio::time::timeout(recheck_interval, rx.changed()).await {
                    return Err(Error::from(tether_common::Error::OwnerGone {
                        capability: self.running.capability().as_str(),
                    }));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "proxy did not stop in time");
                Err(Error::StopTimeout(timeout))
            },
        }
    }

    /// Point the active profile at our config URL, creating it on first use
    /// or when the proxy service lost it.
    async fn bind_profile(&self) -> Result<ProfileBinding> {
        let name = profile_name(Local::now());
        let uuid = match self.store.profile() {
            Some(existing) => {
                let found = self
                    .profiles
                    .query(existing.uuid)
                    .await
                    .map_err(Error::HandlerFailure)?;
                if found.is_some() {
                    self.rebind(existing.uuid, &name).await?;
                    existing.uuid
                } else {
                    info!(uuid = %existing.uuid, "bound profile is gone, creating a new one");
                    self.create_profile(&name).await?
                }
            },
            None => self.create_profile(&name).await?,
        };

        let binding = ProfileBinding {
            uuid,
            source_url: self.source_url.clone(),
            last_updated: Utc::now(),
        };
        self.store.set_profile(binding.clone())?;
        Ok(binding)
    }

    async fn create_profile(&self, name: &str) -> Result<Uuid> {
        let p = &self.profiles;
        let uuid = p
            .create(name, &self.source_url)
            .await
            .map_err(Error::HandlerFailure)?;
        p.commit(uuid).await.map_err(Error::HandlerFailure)?;
        p.set_active(uuid).await.map_err(Error::HandlerFailure)?;
        debug!(uuid = %uuid, name, "created proxy profile");
        Ok(uuid)
    }

    async fn rebind(&self, uuid: Uuid, name: &str) -> Result<()> {
        let p = &self.profiles;
        p.patch(uuid, name, &self.source_url)
            .await
            .map_err(Error::HandlerFailure)?;
        p.refresh(uuid).await.map_err(Error::HandlerFailure)?;
        p.set_active(uuid).await.map_err(Error::HandlerFailure)?;
        Ok(())
    }

    fn notify(&self) {
        self.bridge.signal(signals::PROXY_STATE_CHANGED);
    }
}

fn profile_name<Tz: chrono::TimeZone>(now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Proxy {}", now.format("%d %H:%M"))
}
