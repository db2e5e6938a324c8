//! Proxy configuration synthesis: the packaged (or configured) template with
//! the user's proxy pool spliced in.

use std::{
    borrow::Cow,
    net::IpAddr,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    error::{Error, Result},
    store::Settings,
};

/// Built-in template, used when no template path is configured.
pub const DEFAULT_TEMPLATE: &str = include_str!("../assets/clash-template.yaml");

/// Line in the template replaced by the generated proxy node.
pub const PROXY_PLACEHOLDER: &str = "# - proxy";
pub const NODE_NAME: &str = "HTTP_NODE";
/// Port of the local forwarder used when no remote pool is configured.
pub const LOOPBACK_NODE_PORT: u16 = 4445;

const MATCH_PROXY: &str = "MATCH, HTTP";
const MATCH_DIRECT: &str = "MATCH, DIRECT";

#[derive(Debug, Clone, Default)]
pub struct ConfigSynthesizer {
    template_path: Option<PathBuf>,
}

impl ConfigSynthesizer {
    pub fn new(template_path: Option<PathBuf>) -> Self {
        Self { template_path }
    }

    pub fn template_path(&self) -> Option<&Path> {
        self.template_path.as_deref()
    }

    /// Load the template and render it for `settings`.
    pub fn synthesize(&self, settings: &Settings) -> Result<String> {
        let template = self.load_template()?;
        let document = render(&template, settings);
        debug!(
            bytes = document.len(),
            loopback = is_loopback_host(&settings.proxy_pool_host),
            "synthesized proxy config"
        );
        Ok(document)
    }

    fn load_template(&self) -> Result<Cow<'static, str>> {
        match &self.template_path {
            None => Ok(Cow::Borrowed(DEFAULT_TEMPLATE)),
            Some(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|e| Error::ConfigSynthesis(format!("{}: {e}", path.display()))),
        }
    }
}

/// Render `template` for `settings`. Pure and deterministic.
pub fn render(template: &str, settings: &Settings) -> String {
    if is_loopback_host(&settings.proxy_pool_host) {
        let node = format!(
            "- {{ name:  {NODE_NAME}, type: http, server: 127.0.0.1, port: {LOOPBACK_NODE_PORT} }}"
        );
        template
            .replace(PROXY_PLACEHOLDER, &node)
            .replace(MATCH_PROXY, MATCH_DIRECT)
    } else {
        let node = format!(
            "- {{ name: {NODE_NAME}, type: http, server: {}, port: {}, username: {}, password: {}  }}",
            quoted(settings.proxy_pool_host.trim()),
            port_scalar(&settings.proxy_pool_port),
            quoted(&settings.username),
            quoted(&settings.password),
        );
        template.replace(PROXY_PLACEHOLDER, &node)
    }
}

/// Double-quoted scalar. JSON string syntax is valid YAML, so `,`, `}` and
/// `: ` inside user values cannot end the flow mapping early.
fn quoted(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Numeric ports stay plain integers; anything else is quoted.
fn port_scalar(port: &str) -> String {
    match port.trim().parse::<u16>() {
        Ok(n) => n.to_string(),
        Err(_) => quoted(port),
    }
}

/// Empty, `localhost`, or any loopback address.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() || host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> Settings {
        Settings {
            proxy_pool_host: "203.0.113.7".into(),
            proxy_pool_port: "4455".into(),
            username: "alice".into(),
            password: "pwd".into(),
        }
    }

    #[test]
    fn empty_host_routes_direct() {
        let doc = ConfigSynthesizer::default()
            .synthesize(&Settings::default())
            .unwrap();
        assert!(doc.contains("MATCH, DIRECT"));
        assert!(!doc.contains("MATCH, HTTP"));
        assert!(doc.contains("server: 127.0.0.1, port: 4445"));
        assert!(!doc.contains(PROXY_PLACEHOLDER));
    }

    #[test]
    fn remote_host_keeps_proxy_match() {
        let doc = render(DEFAULT_TEMPLATE, &remote());
        assert!(doc.contains("MATCH, HTTP"));
        assert!(doc.contains(
            r#"- { name: HTTP_NODE, type: http, server: "203.0.113.7", port: 4455, username: "alice", password: "pwd"  }"#
        ));
    }

    #[test]
    fn rendering_is_deterministic() {
        let synth = ConfigSynthesizer::default();
        assert_eq!(
            synth.synthesize(&remote()).unwrap(),
            synth.synthesize(&remote()).unwrap()
        );
    }

    #[test]
    fn rendered_document_is_valid_yaml() {
        let doc = render(DEFAULT_TEMPLATE, &remote());
        let parsed: serde_yaml::Value = serde_yaml::from_str(&doc).unwrap();
        let proxies = parsed["proxies"].as_sequence().unwrap();
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0]["server"].as_str(), Some("203.0.113.7"));
    }

    #[test]
    fn credentials_with_flow_syntax_survive() {
        let settings = Settings {
            username: "bob: admin".into(),
            password: r#"p,w}d "x" \ #1"#.into(),
            ..remote()
        };
        let doc = render(DEFAULT_TEMPLATE, &settings);
        let parsed: serde_yaml::Value = serde_yaml::from_str(&doc).unwrap();
        let node = &parsed["proxies"][0];
        assert_eq!(node["username"].as_str(), Some("bob: admin"));
        assert_eq!(node["password"].as_str(), Some(r#"p,w}d "x" \ #1"#));
        assert_eq!(node["port"].as_u64(), Some(4455));
        assert_eq!(node["server"].as_str(), Some("203.0.113.7"));
        assert_eq!(node.as_mapping().unwrap().len(), 6);
    }

    #[test]
    fn non_numeric_port_is_quoted() {
        let settings = Settings {
            proxy_pool_port: "80, extra: 1".into(),
            ..remote()
        };
        let doc = render(DEFAULT_TEMPLATE, &settings);
        let parsed: serde_yaml::Value = serde_yaml::from_str(&doc).unwrap();
        assert_eq!(parsed["proxies"][0]["port"].as_str(), Some("80, extra: 1"));
        assert!(parsed["proxies"][0].get("extra").is_none());
    }

    #[test]
    fn loopback_detection() {
        for host in ["", "  ", "localhost", "127.0.0.1", "127.8.8.8", "::1", "[::1]"] {
            assert!(is_loopback_host(host), "{host:?}");
        }
        for host in ["10.0.0.1", "proxy.example.com", "::2"] {
            assert!(!is_loopback_host(host), "{host:?}");
        }
    }

    #[test]
    fn configured_template_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.yaml");
        std::fs::write(&path, "proxies:\n  # - proxy\nrules:\n  - MATCH, HTTP\n").unwrap();
        let doc = ConfigSynthesizer::new(Some(path))
            .synthesize(&Settings::default())
            .unwrap();
        assert_eq!(
            doc,
            "proxies:\n  - { name:  HTTP_NODE, type: http, server: 127.0.0.1, port: 4445 }\nrules:\n  - MATCH, DIRECT\n"
        );
    }

    #[test]
    fn unreadable_template_is_a_synthesis_error() {
        let synth = ConfigSynthesizer::new(Some("/nonexistent/template.yaml".into()));
        assert!(matches!(
            synth.synthesize(&remote()),
            Err(Error::ConfigSynthesis(_))
        ));
    }
}
