use std::collections::BTreeSet;
use std::time::Duration;

use havengeo::{parse_radius, Category, DEFAULT_RADIUS_M};
use log::warn;
use reqwest::Url;
use thiserror::Error;

use crate::tracker::WatchOptions;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org/route/v1/driving";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key}: invalid url `{value}`: {reason}")]
    Url {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub overpass_url: Url,
    pub osrm_url: Url,
    pub radius_m: u32,
    pub categories: BTreeSet<Category>,
    pub watch: WatchOptions,
    pub user_agent: String,
    pub http_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every setting through `lookup`. Unparsable numbers and flags fall
    /// back to their defaults, a bad endpoint url is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overpass_url = url(&lookup, "HAVEN_OVERPASS_URL", DEFAULT_OVERPASS_URL)?;
        let osrm_url = url(&lookup, "HAVEN_OSRM_URL", DEFAULT_OSRM_URL)?;
        let radius_m = lookup("HAVEN_RADIUS_M")
            .map(|v| parse_radius(&v))
            .unwrap_or(DEFAULT_RADIUS_M);
        let categories = lookup("HAVEN_CATEGORIES")
            .and_then(|v| match Category::parse_list::<BTreeSet<Category>>(&v) {
                Ok(set) => Some(set),
                Err(e) => {
                    warn!("HAVEN_CATEGORIES: {}, using all categories", e);
                    None
                }
            })
            .unwrap_or_else(|| Category::SELECTABLE.into_iter().collect());

        let defaults = WatchOptions::default();
        let high_accuracy = lookup("HAVEN_HIGH_ACCURACY")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.high_accuracy);
        let maximum_age = lookup("HAVEN_MAX_AGE_S")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or(defaults.maximum_age);
        let user_agent = lookup("HAVEN_USER_AGENT")
            .unwrap_or_else(|| format!("haven/{}", env!("CARGO_PKG_VERSION")));
        let http_timeout = lookup("HAVEN_HTTP_TIMEOUT_S")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        Ok(Self {
            overpass_url,
            osrm_url,
            radius_m,
            categories,
            watch: WatchOptions {
                high_accuracy,
                maximum_age,
            },
            user_agent,
            http_timeout,
        })
    }
}

fn url<F>(lookup: &F, key: &'static str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    Url::parse(value.trim()).map_err(|e| ConfigError::Url {
        key,
        reason: e.to_string(),
        value,
    })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
