//! Typed per-method params, validated once before a handler or the owner sees them.

use std::collections::BTreeSet;

use serde_json::{Value, json};

use tether_protocol::methods as m;

use crate::{
    error::{Error, Result},
    store::{AccessControlMode, Settings},
};

pub const DEFAULT_POOL_PORT: &str = "4455";
pub const DEFAULT_POOL_PASSWORD: &str = "pwd";

/// Hardware/navigation keys the owner knows how to press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Back,
    Home,
    Recent,
    /// Passed through untouched; the owner decides what to do with it.
    Other(String),
}

impl Key {
    fn parse(name: &str) -> Self {
        match name {
            "back" => Self::Back,
            "home" => Self::Home,
            "recent" => Self::Recent,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Back => "back",
            Self::Home => "home",
            Self::Recent => "recent",
            Self::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Methods that take nothing. Extra positional values are ignored.
    Empty,
    AppScope { all: bool },
    ProxyPool(Settings),
    AutoRestart(bool),
    Packages(BTreeSet<String>),
    Mode(AccessControlMode),
    Point { x: serde_json::Number, y: serde_json::Number },
    Text(String),
    Key(Key),
    /// A permission name or an intent action.
    Name(String),
}

impl Params {
    /// Validate the positional `raw` values against `method`'s schema.
    pub fn parse(method: &str, raw: &[Value]) -> Result<Self> {
        let p = Positional { method, raw };
        Ok(match method {
            m::GET_INSTALLED_APPS => Self::AppScope {
                all: raw.first().and_then(Value::as_str) == Some("all"),
            },
            m::EDIT_CLASH_PROXY_CONFIG => Self::ProxyPool(Settings {
                proxy_pool_host: p.opt_scalar(0)?.unwrap_or_default(),
                proxy_pool_port: p
                    .opt_scalar(1)?
                    .unwrap_or_else(|| DEFAULT_POOL_PORT.into()),
                username: p.opt_scalar(2)?.unwrap_or_default(),
                password: p
                    .opt_scalar(3)?
                    .unwrap_or_else(|| DEFAULT_POOL_PASSWORD.into()),
            }),
            m::SET_CLASH_AUTO_RESTART => Self::AutoRestart(p.bool(0)?),
            m::SET_ACCESS_CONTROL_PACKAGES => Self::Packages(p.string_list(0)?),
            m::SET_ACCESS_CONTROL_MODE => Self::Mode(
                p.string(0)?
                    .parse()
                    .map_err(|reason: String| Error::invalid_params(method, reason))?,
            ),
            m::CLICK => Self::Point {
                x: p.number(0)?,
                y: p.number(1)?,
            },
            m::INPUT_TEXT => Self::Text(p.scalar(0)?),
            m::SHOW_TOAST => Self::Text(p.opt_scalar(0)?.unwrap_or_default()),
            m::PRESS_KEY => Self::Key(Key::parse(&p.string(0)?)),
            m::CHECK_PERMISSION | m::REQUEST_PERMISSION | m::START_ACTION => {
                Self::Name(p.string(0)?)
            },
            _ => Self::Empty,
        })
    }

    /// Positional form carried to the owning component.
    pub fn into_wire(self) -> Vec<Value> {
        match self {
            Self::Empty => Vec::new(),
            Self::AppScope { all } => {
                if all {
                    vec![json!("all")]
                } else {
                    Vec::new()
                }
            },
            Self::ProxyPool(s) => vec![
                json!(s.proxy_pool_host),
                json!(s.proxy_pool_port),
                json!(s.username),
                json!(s.password),
            ],
            Self::AutoRestart(enabled) => vec![json!(enabled)],
            Self::Packages(packages) => vec![json!(packages)],
            Self::Mode(mode) => vec![json!(mode)],
            Self::Point { x, y } => vec![Value::Number(x), Value::Number(y)],
            Self::Text(text) | Self::Name(text) => vec![json!(text)],
            Self::Key(key) => vec![json!(key.as_str())],
        }
    }
}

struct Positional<'a> {
    method: &'a str,
    raw: &'a [Value],
}

impl Positional<'_> {
    fn err(&self, index: usize, expected: &str) -> Error {
        Error::invalid_params(self.method, format!("param {index} must be {expected}"))
    }

    fn get(&self, index: usize) -> Option<&Value> {
        self.raw.get(index).filter(|v| !v.is_null())
    }

    fn string(&self, index: usize) -> Result<String> {
        match self.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(self.err(index, "a string")),
        }
    }

    /// A string, number or bool, rendered as text.
    fn opt_scalar(&self, index: usize) -> Result<Option<String>> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
            Some(_) => Err(self.err(index, "a string")),
        }
    }

    fn scalar(&self, index: usize) -> Result<String> {
        self.opt_scalar(index)?
            .ok_or_else(|| self.err(index, "a string"))
    }

    fn bool(&self, index: usize) -> Result<bool> {
        match self.get(index) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(self.err(index, "a boolean")),
        }
    }

    fn number(&self, index: usize) -> Result<serde_json::Number> {
        match self.get(index) {
            Some(Value::Number(n)) => Ok(n.clone()),
            _ => Err(self.err(index, "a number")),
        }
    }

    fn string_list(&self, index: usize) -> Result<BTreeSet<String>> {
        let Some(Value::Array(items)) = self.get(index) else {
            return Err(self.err(index, "an array of strings"));
        };
        items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.err(index, "an array of strings"))
            })
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_config_defaults_port_and_password() {
        let params = Params::parse(m::EDIT_CLASH_PROXY_CONFIG, &[json!("10.1.1.1")]).unwrap();
        assert_eq!(
            params,
            Params::ProxyPool(Settings {
                proxy_pool_host: "10.1.1.1".into(),
                proxy_pool_port: "4455".into(),
                username: String::new(),
                password: "pwd".into(),
            })
        );
    }

    #[test]
    fn proxy_config_accepts_numeric_port() {
        let Params::ProxyPool(s) = Params::parse(m::EDIT_CLASH_PROXY_CONFIG, &[
            json!("h"),
            json!(8080),
            json!("u"),
            json!(null),
        ])
        .unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(s.proxy_pool_port, "8080");
        assert_eq!(s.password, "pwd");
    }

    #[test]
    fn click_requires_two_numbers() {
        assert!(Params::parse(m::CLICK, &[json!(1), json!(2.5)]).is_ok());
        let err = Params::parse(m::CLICK, &[json!(1)]).unwrap_err();
        assert_eq!(err.to_string(), "invalid params for click: param 1 must be a number");
        assert!(Params::parse(m::CLICK, &[json!("1"), json!(2)]).is_err());
    }

    #[test]
    fn click_wire_keeps_numbers() {
        let wire = Params::parse(m::CLICK, &[json!(10), json!(20)])
            .unwrap()
            .into_wire();
        assert_eq!(wire, vec![json!(10), json!(20)]);
    }

    #[test]
    fn press_key_names() {
        assert_eq!(
            Params::parse(m::PRESS_KEY, &[json!("home")]).unwrap(),
            Params::Key(Key::Home)
        );
        let other = Params::parse(m::PRESS_KEY, &[json!("volume_up")]).unwrap();
        assert_eq!(other.into_wire(), vec![json!("volume_up")]);
        assert!(Params::parse(m::PRESS_KEY, &[]).is_err());
    }

    #[test]
    fn access_control_params() {
        assert_eq!(
            Params::parse(m::SET_ACCESS_CONTROL_MODE, &[json!("AcceptSelected")]).unwrap(),
            Params::Mode(AccessControlMode::AcceptSelected)
        );
        assert!(Params::parse(m::SET_ACCESS_CONTROL_MODE, &[json!("Everything")]).is_err());

        let Params::Packages(pkgs) = Params::parse(m::SET_ACCESS_CONTROL_PACKAGES, &[json!([
            "b", "a", "a"
        ])])
        .unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(pkgs.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(Params::parse(m::SET_ACCESS_CONTROL_PACKAGES, &[json!(["a", 1])]).is_err());
    }

    #[test]
    fn auto_restart_accepts_bool_or_text() {
        assert_eq!(
            Params::parse(m::SET_CLASH_AUTO_RESTART, &[json!("TRUE")]).unwrap(),
            Params::AutoRestart(true)
        );
        assert!(Params::parse(m::SET_CLASH_AUTO_RESTART, &[json!(1)]).is_err());
    }

    #[test]
    fn no_param_methods_ignore_extras() {
        assert_eq!(
            Params::parse(m::DEVICE_INFO, &[json!(1), json!("x")]).unwrap(),
            Params::Empty
        );
        assert_eq!(
            Params::parse(m::GET_INSTALLED_APPS, &[json!("all")]).unwrap(),
            Params::AppScope { all: true }
        );
        assert_eq!(
            Params::parse(m::SHOW_TOAST, &[]).unwrap(),
            Params::Text(String::new())
        );
    }
}
