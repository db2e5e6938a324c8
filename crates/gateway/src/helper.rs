//! Client for the privileged helper process on loopback.

use std::time::Duration;

use {serde_json::Value, tracing::debug};

use tether_config::HelperConfig;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct HelperClient {
    base_url: String,
    http: reqwest::Client,
}

impl HelperClient {
    pub fn new(config: &HelperConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /deviceInfo`, returning the `result` member of its JSON body.
    pub async fn device_info(&self) -> Result<Value> {
        let url = format!("{}/deviceInfo", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::message(format!(
                "helper returned {} for /deviceInfo",
                resp.status()
            )));
        }
        let mut body: Value = resp.json().await?;
        match body.get_mut("result").map(Value::take) {
            Some(result) if !result.is_null() => Ok(result),
            _ => Err(Error::message("helper /deviceInfo response has no result")),
        }
    }

    /// `GET /file?path=<path>`. The caller streams the body.
    pub async fn file(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}/file?path={}", self.base_url, urlencoding::encode(path));
        debug!(path, "fetching file from helper");
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::message(format!(
                "helper returned {} for {path}",
                resp.status()
            )));
        }
        Ok(resp)
    }
}
