use std::path::Path;

use {anyhow::Result, clap::Subcommand, serde_json::json};

use tether_gateway::{
    params::{DEFAULT_POOL_PASSWORD, DEFAULT_POOL_PORT},
    store::{AccessControlMode, Settings, Store},
};

/// Edits go straight to the store file; a running gateway picks them up on
/// its next start.
#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print stored proxy-pool settings, preferences and the profile binding.
    Get,
    /// Store proxy-pool settings. An empty or loopback host routes traffic
    /// directly.
    Set {
        #[arg(long, default_value = "")]
        host: String,
        #[arg(long, default_value = DEFAULT_POOL_PORT)]
        port: String,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = DEFAULT_POOL_PASSWORD)]
        password: String,
    },
    /// Set the per-app access control mode
    /// (AcceptAll, AcceptSelected, DenySelected).
    Mode { mode: AccessControlMode },
}

pub fn handle_settings(action: &SettingsAction, data_dir: &Path) -> Result<()> {
    let store = Store::open(data_dir);
    match action {
        SettingsAction::Get => {
            let doc = json!({
                "settings": store.settings(),
                "preferences": store.preferences(),
                "profile": store.profile(),
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        },
        SettingsAction::Set {
            host,
            port,
            username,
            password,
        } => {
            store.save_settings(Settings {
                proxy_pool_host: host.clone(),
                proxy_pool_port: port.clone(),
                username: username.clone(),
                password: password.clone(),
            })?;
            eprintln!("Saved proxy pool settings to {}", data_dir.display());
        },
        SettingsAction::Mode { mode } => {
            let mode = *mode;
            store.update_preferences(|p| p.access_control_mode = mode)?;
            eprintln!("Access control mode set to {mode:?}");
        },
    }
    Ok(())
}
