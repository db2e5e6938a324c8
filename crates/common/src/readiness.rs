//! Readiness flags with a single owner each.
//!
//! A component that provides a capability (input injection, screen recording,
//! the proxy service) holds the [`ReadinessOwner`] and is the only one that can
//! flip it. Everyone else gets a [`ReadinessHandle`]: a read-only view that can
//! also await changes.

use {serde::Serialize, tokio::sync::watch, tracing::debug};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Input,
    Recording,
    Proxy,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Recording => "recording",
            Self::Proxy => "proxy",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write side of one readiness flag.
#[derive(Debug)]
pub struct ReadinessOwner {
    capability: Capability,
    tx: watch::Sender<bool>,
}

impl ReadinessOwner {
    pub fn new(capability: Capability) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { capability, tx }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Set the flag. Returns `true` if the value changed.
    pub fn set(&self, ready: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == ready {
                return false;
            }
            *current = ready;
            true
        });
        if changed {
            debug!(capability = %self.capability, ready, "readiness changed");
        }
        changed
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn handle(&self) -> ReadinessHandle {
        ReadinessHandle {
            capability: self.capability,
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of one readiness flag.
#[derive(Debug, Clone)]
pub struct ReadinessHandle {
    capability: Capability,
    rx: watch::Receiver<bool>,
}

impl ReadinessHandle {
    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// A fresh receiver for callers that want to drive their own select loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Wait until the flag equals `ready`. Returns immediately if it already does.
    ///
    /// Callers bound this with a timeout; it only returns an error when the
    /// owner is dropped while the flag still has the wrong value.
    pub async fn wait_for(&self, ready: bool) -> Result<()> {
        let mut rx = self.rx.clone();
        rx.wait_for(|v| *v == ready)
            .await
            .map(|_| ())
            .map_err(|_| Error::OwnerGone {
                capability: self.capability.as_str(),
            })
    }
}

/// Snapshot of all readiness flags at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessFlags {
    pub input_ready: bool,
    pub recording_ready: bool,
    pub proxy_running: bool,
}

/// The handles the gateway reads, one per capability.
#[derive(Debug, Clone)]
pub struct ReadinessSet {
    pub input: ReadinessHandle,
    pub recording: ReadinessHandle,
    pub proxy: ReadinessHandle,
}

impl ReadinessSet {
    pub fn snapshot(&self) -> ReadinessFlags {
        ReadinessFlags {
            input_ready: self.input.is_ready(),
            recording_ready: self.recording.is_ready(),
            proxy_running: self.proxy.is_ready(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration};

    #[test]
    fn set_reports_changes_only() {
        let owner = ReadinessOwner::new(Capability::Input);
        assert!(!owner.is_ready());
        assert!(owner.set(true));
        assert!(!owner.set(true));
        assert!(owner.handle().is_ready());
    }

    #[tokio::test]
    async fn wait_for_wakes_on_change() {
        let owner = ReadinessOwner::new(Capability::Proxy);
        owner.set(true);
        let handle = owner.handle();

        let waiter = tokio::spawn(async move { handle.wait_for(false).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        owner.set(false);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_returns_immediately_when_already_there() {
        let owner = ReadinessOwner::new(Capability::Recording);
        owner.handle().wait_for(false).await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_errors_when_owner_dropped() {
        let owner = ReadinessOwner::new(Capability::Proxy);
        let handle = owner.handle();
        drop(owner);
        assert!(matches!(
            handle.wait_for(true).await,
            Err(Error::OwnerGone { capability: "proxy" })
        ));
    }

    #[test]
    fn snapshot_reads_every_flag() {
        let input = ReadinessOwner::new(Capability::Input);
        let recording = ReadinessOwner::new(Capability::Recording);
        let proxy = ReadinessOwner::new(Capability::Proxy);
        let set = ReadinessSet {
            input: input.handle(),
            recording: recording.handle(),
            proxy: proxy.handle(),
        };
        recording.set(true);
        assert_eq!(set.snapshot(), ReadinessFlags {
            input_ready: false,
            recording_ready: true,
            proxy_running: false,
        });
    }
}
