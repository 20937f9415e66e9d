use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::Deserialize;
use url::Url;

use crate::load_failure::LoadFailureCode;

pub const DEFAULT_SCHEME: &str = "vertex";
pub const DEFAULT_PROD_URL: &str = "https://vertex.airqo.net/";
pub const DEFAULT_DEV_URL: &str = "http://localhost:3000/";

pub const ENV_DEV_FLAG: &str = "VERTEX_DESKTOP_DEV";
pub const ENV_DEV_URL: &str = "VERTEX_DEV_URL";
pub const ENV_PROD_URL: &str = "VERTEX_PROD_URL";

const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    pub title: String,
    pub width: f64,
    pub height: f64,
    pub min_width: f64,
    pub min_height: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "AirQo Vertex".to_string(),
            width: 1280.0,
            height: 800.0,
            min_width: 1024.0,
            min_height: 640.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateConfig {
    pub check_on_startup: bool,
    /// `None` disables the periodic check.
    pub interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scheme: String,
    pub dev_mode: bool,
    pub start_url: Url,
    pub window: WindowConfig,
    pub offline_page: String,
    pub recognized_load_failures: Vec<LoadFailureCode>,
    pub updates: UpdateConfig,
    pub probe_timeout: Duration,
}

/// Optional keys read from `~/.config/vertex/desktop.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverrides {
    pub scheme: Option<String>,
    pub window_title: Option<String>,
    pub window_width: Option<f64>,
    pub window_height: Option<f64>,
    pub min_window_width: Option<f64>,
    pub min_window_height: Option<f64>,
    pub offline_page: Option<String>,
    pub recognized_load_failures: Option<Vec<LoadFailureCode>>,
    pub check_updates_on_startup: Option<bool>,
    pub update_interval_secs: Option<u64>,
    pub probe_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    pub fn path() -> Option<PathBuf> {
        let mut dir = dirs::home_dir()?;
        dir.push(".config");
        dir.push("vertex");
        dir.push("desktop.json");
        Some(dir)
    }

    /// A missing file yields the defaults; a broken one is logged and skipped.
    pub fn read_from(path: &std::path::Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!(
                    "[desktop:config] Ignoring malformed {}: {}",
                    path.display(),
                    err
                );
                Self::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                warn!("[desktop:config] Failed to read {}: {}", path.display(), err);
                Self::default()
            }
        }
    }
}

fn flag_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_url(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).with_context(|| format!("{name} is not a valid URL: {raw}"))
}

impl AppConfig {
    pub fn load(packaged: bool) -> Result<Self> {
        let overrides = ConfigOverrides::path()
            .map(|path| ConfigOverrides::read_from(&path))
            .unwrap_or_default();
        Self::from_sources(packaged, overrides, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(packaged: bool, overrides: ConfigOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dev_mode = !packaged && env(ENV_DEV_FLAG).is_some_and(|value| flag_enabled(&value));

        let start_url = if dev_mode {
            let raw = env(ENV_DEV_URL).unwrap_or_else(|| DEFAULT_DEV_URL.to_string());
            parse_url(ENV_DEV_URL, &raw)?
        } else {
            let raw = env(ENV_PROD_URL).unwrap_or_else(|| DEFAULT_PROD_URL.to_string());
            parse_url(ENV_PROD_URL, &raw)?
        };
        if !matches!(start_url.scheme(), "http" | "https") {
            return Err(anyhow!("Start URL must be http or https: {start_url}"));
        }

        let scheme = overrides
            .scheme
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEME.to_string());

        let defaults = WindowConfig::default();
        let window = WindowConfig {
            title: overrides.window_title.unwrap_or(defaults.title),
            width: overrides.window_width.unwrap_or(defaults.width),
            height: overrides.window_height.unwrap_or(defaults.height),
            min_width: overrides.min_window_width.unwrap_or(defaults.min_width),
            min_height: overrides.min_window_height.unwrap_or(defaults.min_height),
        };

        let interval_secs = overrides
            .update_interval_secs
            .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS);

        Ok(Self {
            scheme,
            dev_mode,
            start_url,
            window,
            offline_page: overrides
                .offline_page
                .unwrap_or_else(|| "offline.html".to_string()),
            recognized_load_failures: overrides
                .recognized_load_failures
                .unwrap_or_else(|| LoadFailureCode::NETWORK.to_vec()),
            updates: UpdateConfig {
                check_on_startup: overrides.check_updates_on_startup.unwrap_or(true),
                interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            },
            probe_timeout: Duration::from_secs(
                overrides
                    .probe_timeout_secs
                    .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
            ),
        })
    }

    /// The only origin trusted with the full bridge.
    pub fn app_origin(&self) -> url::Origin {
        self.start_url.origin()
    }
}
