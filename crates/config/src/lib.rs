//! Configuration loading and env substitution.
//!
//! Config files: `tether.toml`, `tether.yaml`, or `tether.json`
//! Searched in `./` then the user config dir (`~/.config/tether/` on Linux).
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, data_dir, discover_and_load, load_config, save_config},
    schema::{
        AssetsConfig, BridgeConfig, HelperConfig, LifecycleConfig, ServerConfig, TetherConfig,
    },
};
