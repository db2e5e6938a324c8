//! Persisted proxy settings, preferences and the active profile binding.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
    uuid::Uuid,
};

use crate::error::{Error, Result};

pub const STORE_FILENAME: &str = "store.json";

// ── Types ────────────────────────────────────────────────────────────────────

/// Upstream proxy pool credentials, as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub proxy_pool_host: String,
    pub proxy_pool_port: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessControlMode {
    #[default]
    AcceptAll,
    AcceptSelected,
    DenySelected,
}

impl std::str::FromStr for AccessControlMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AcceptAll" => Ok(Self::AcceptAll),
            "AcceptSelected" => Ok(Self::AcceptSelected),
            "DenySelected" => Ok(Self::DenySelected),
            other => Err(format!("unknown access control mode: {other}")),
        }
    }
}

/// Which apps are routed through the proxy, and whether it comes back after reboot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyPreferences {
    pub access_control_mode: AccessControlMode,
    pub access_control_packages: BTreeSet<String>,
    pub auto_restart: bool,
}

/// The generated-configuration profile currently active in the proxy service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBinding {
    pub uuid: Uuid,
    pub source_url: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoreData {
    #[serde(flatten)]
    settings: Settings,
    #[serde(flatten)]
    preferences: ProxyPreferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<ProfileBinding>,
}

// ── Store ────────────────────────────────────────────────────────────────────

/// File-backed key/value store at `<data_dir>/store.json`.
///
/// Every write rewrites the whole file; the in-memory copy is the source of
/// truth between writes. Without a path the store lives in memory only.
#[derive(Debug)]
pub struct Store {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl Store {
    /// Open the store in `data_dir`. A missing file starts empty; an
    /// unreadable one is logged and replaced on the next write.
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(STORE_FILENAME);
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "store file is corrupt, starting empty");
                StoreData::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read store file, starting empty");
                StoreData::default()
            },
        };
        debug!(path = %path.display(), "opened store");
        Self {
            path: Some(path),
            data: Mutex::new(data),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn settings(&self) -> Settings {
        self.read(|d| d.settings.clone())
    }

    pub fn save_settings(&self, settings: Settings) -> Result<()> {
        self.write(|d| d.settings = settings)
    }

    pub fn preferences(&self) -> ProxyPreferences {
        self.read(|d| d.preferences.clone())
    }

    /// Apply `f` to the preferences and persist. Returns the new value.
    pub fn update_preferences(
        &self,
        f: impl FnOnce(&mut ProxyPreferences),
    ) -> Result<ProxyPreferences> {
        let mut updated = None;
        self.write(|d| {
            f(&mut d.preferences);
            updated = Some(d.preferences.clone());
        })?;
        Ok(updated.unwrap_or_default())
    }

    pub fn profile(&self) -> Option<ProfileBinding> {
        self.read(|d| d.profile.clone())
    }

    pub fn set_profile(&self, binding: ProfileBinding) -> Result<()> {
        self.write(|d| d.profile = Some(binding))
    }

    fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> T {
        let guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    /// Mutate a copy, write it out, then commit it to memory. A failed write
    /// leaves the in-memory state untouched.
    fn write(&self, f: impl FnOnce(&mut StoreData)) -> Result<()> {
        let mut guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.clone();
        f(&mut next);
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *guard = next;
        Ok(())
    }
}

fn persist(path: &Path, data: &StoreData) -> Result<()> {
    let store_err = |e: std::io::Error| Error::Store(format!("{}: {e}", path.display()));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(store_err)?;
    }
    let json = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(store_err)?;
    // Holds the proxy password.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600));
    }
    std::fs::rename(&tmp, path).map_err(store_err)?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_settings() -> Settings {
        Settings {
            proxy_pool_host: "10.0.0.2".into(),
            proxy_pool_port: "8080".into(),
            username: "u".into(),
            password: "p".into(),
        }
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = Uuid::new_v4();
        {
            let store = Store::open(dir.path());
            store.save_settings(sample_settings()).unwrap();
            store
                .update_preferences(|p| {
                    p.auto_restart = true;
                    p.access_control_packages.insert("com.example".into());
                })
                .unwrap();
            store
                .set_profile(ProfileBinding {
                    uuid,
                    source_url: "http://127.0.0.1:4477/clashConfig.yaml".into(),
                    last_updated: Utc::now(),
                })
                .unwrap();
        }

        let store = Store::open(dir.path());
        assert_eq!(store.settings(), sample_settings());
        let prefs = store.preferences();
        assert!(prefs.auto_restart);
        assert!(prefs.access_control_packages.contains("com.example"));
        assert_eq!(store.profile().unwrap().uuid, uuid);
    }

    #[test]
    fn file_uses_flat_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        store.save_settings(sample_settings()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(STORE_FILENAME)).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["proxyPoolHost"], "10.0.0.2");
        assert_eq!(v["accessControlMode"], "AcceptAll");
        assert!(v.get("profile").is_none());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STORE_FILENAME), "{not json").unwrap();
        let store = Store::open(dir.path());
        assert_eq!(store.settings(), Settings::default());
        store.save_settings(sample_settings()).unwrap();
        assert_eq!(Store::open(dir.path()).settings(), sample_settings());
    }

    #[test]
    fn failed_write_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        std::fs::create_dir(dir.path().join(STORE_FILENAME)).unwrap();
        let store = Store::open(dir.path());
        assert!(matches!(
            store.save_settings(sample_settings()),
            Err(Error::Store(_))
        ));
        assert_eq!(store.settings(), Settings::default());
    }

    #[test]
    fn access_control_mode_parses_known_names() {
        assert_eq!(
            "DenySelected".parse::<AccessControlMode>().unwrap(),
            AccessControlMode::DenySelected
        );
        assert!("Bogus".parse::<AccessControlMode>().is_err());
    }
}
