use std::{fs, time::Duration};

use anyhow::{anyhow, Context};
use url::Url;

use crate::status_channel::ReconnectPolicy;

pub const SETTINGS_FILE: &str = "deployctl.toml";
pub const STATUS_PATH: &str = "/ws/status";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    /// Real-time origin. Derived from `api_base_url` when unset.
    pub ws_base_url: Option<String>,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".into(),
            ws_base_url: None,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
        }
    }
}

impl Settings {
    pub fn api_base(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.api_base_url.trim())
            .with_context(|| format!("invalid api base url: {}", self.api_base_url))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(anyhow!(
                "api base url must use http or https, got {other}://"
            )),
        }
    }

    pub fn ws_base(&self) -> anyhow::Result<Url> {
        let Some(raw) = self.ws_base_url.as_deref() else {
            let mut url = self.api_base()?;
            let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
            url.set_scheme(scheme)
                .map_err(|()| anyhow!("cannot derive websocket url from {url}"))?;
            return Ok(url);
        };
        let url =
            Url::parse(raw.trim()).with_context(|| format!("invalid websocket base url: {raw}"))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(anyhow!(
                "websocket base url must use ws or wss, got {other}://"
            )),
        }
    }

    pub fn status_url(&self) -> anyhow::Result<Url> {
        endpoint_url(&self.ws_base()?, STATUS_PATH)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}

/// Appends `path` to `base`, keeping any path prefix the base already has.
pub(crate) fn endpoint_url(base: &Url, path: &str) -> anyhow::Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .with_context(|| format!("failed to build endpoint url for {path}"))
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<toml::Table>(raw) else {
        tracing::warn!(file = SETTINGS_FILE, "ignoring unparseable settings file");
        return;
    };
    if let Some(v) = file_cfg.get("api_url").and_then(toml::Value::as_str) {
        settings.api_base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("ws_url").and_then(toml::Value::as_str) {
        settings.ws_base_url = Some(v.to_string());
    }
    if let Some(v) = file_cfg
        .get("reconnect_base_ms")
        .and_then(toml::Value::as_integer)
        .and_then(|v| u64::try_from(v).ok())
    {
        settings.reconnect_base_ms = v;
    }
    if let Some(v) = file_cfg
        .get("reconnect_max_ms")
        .and_then(toml::Value::as_integer)
        .and_then(|v| u64::try_from(v).ok())
    {
        settings.reconnect_max_ms = v;
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__WS_URL") {
        settings.ws_base_url = Some(v);
    }

    if let Some(v) = lookup("APP__RECONNECT_BASE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.reconnect_base_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__RECONNECT_MAX_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.reconnect_max_ms = parsed;
        }
    }
}
