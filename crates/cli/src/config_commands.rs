use std::path::Path;

use {
    anyhow::{Result, bail},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML, or a single dotted key
    /// (e.g. `server.port`).
    Get { key: Option<String> },
    /// Write the effective configuration to `tether.toml` in the config dir.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config(action: &ConfigAction, config_dir: Option<&Path>) -> Result<()> {
    let config = tether_config::discover_and_load(config_dir);
    match action {
        ConfigAction::Get { key } => {
            let value = toml::Value::try_from(&config)?;
            let value = match key {
                None => &value,
                Some(key) => match lookup(&value, key) {
                    Some(v) => v,
                    None => bail!("unknown config key: {key}"),
                },
            };
            println!("{}", render(value)?);
            Ok(())
        },
        ConfigAction::Init { force } => {
            let target = match config_dir {
                Some(dir) => dir.to_path_buf(),
                None => match tether_config::config_dir() {
                    Some(dir) => dir,
                    None => bail!("no config directory available, pass --config-dir"),
                },
            };
            let existing = target.join("tether.toml");
            if existing.exists() && !force {
                bail!("{} already exists (use --force)", existing.display());
            }
            let path = tether_config::save_config(&config, Some(&target))?;
            eprintln!("Wrote {}", path.display());
            Ok(())
        },
    }
}

fn lookup<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(value, |v, part| v.as_table().and_then(|t| t.get(part)))
}

fn render(value: &toml::Value) -> Result<String> {
    Ok(match value {
        toml::Value::Table(_) => toml::to_string_pretty(value)?,
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_lookup() {
        let value = toml::Value::try_from(tether_config::TetherConfig::default()).unwrap();
        assert_eq!(
            lookup(&value, "server.port").and_then(toml::Value::as_integer),
            Some(4477)
        );
        assert_eq!(render(lookup(&value, "server.bind").unwrap()).unwrap(), "0.0.0.0");
        assert!(lookup(&value, "server.nope").is_none());
        assert!(lookup(&value, "server.port.deeper").is_none());
    }
}
