//! Tiered IP-based location resolution
//!
//! The resolver looks up the caller's public IP once, then walks an ordered
//! list of [`LocationStrategy`] implementations and returns the first success.
//! When the IP lookup or every strategy fails, the configured default location
//! is returned instead, so callers always get a [`LocationResult`].

mod amap;
mod ip_api;

pub use amap::{parse_rectangle_center, AmapStrategy};
pub use ip_api::IpApiStrategy;

use crate::config::{Config, MethodPreference};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Timeout for the public IP lookup
const IP_ECHO_TIMEOUT: Duration = Duration::from_secs(5);

/// Placeholder for fields a provider did not return
pub const UNKNOWN: &str = "未知";

/// How a location was obtained
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationMethod {
    /// Center of the map vendor's bounding rectangle
    AmapRectangle,
    /// Map vendor forward-geocoding of the city name
    AmapGeocode,
    /// Generic IP geolocation
    Ip,
    /// Hardcoded fallback
    Default,
}

impl LocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationMethod::AmapRectangle => "amap_rectangle",
            LocationMethod::AmapGeocode => "amap_geocode",
            LocationMethod::Ip => "ip",
            LocationMethod::Default => "default",
        }
    }

    /// Human-readable provenance label
    pub fn label(&self) -> &'static str {
        match self {
            LocationMethod::AmapRectangle => "高德地图IP定位",
            LocationMethod::AmapGeocode => "高德地图地理编码",
            LocationMethod::Ip => "IP定位",
            LocationMethod::Default => "默认位置(湖南科技大学)",
        }
    }
}

impl fmt::Display for LocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A resolved location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationResult {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub region: String,
    pub method: LocationMethod,
}

impl fmt::Display for LocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {})",
            self.region, self.city, self.latitude, self.longitude
        )
    }
}

/// Why a single resolution attempt failed
#[derive(Debug, Error)]
pub enum LocateError {
    /// Transport failure; undecodable bodies are `Malformed` instead
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{provider} rejected the lookup: {reason}")]
    Rejected {
        provider: &'static str,
        reason: String,
    },

    #[error("Malformed {provider} response: {reason}")]
    Malformed {
        provider: &'static str,
        reason: String,
    },
}

/// One provider-specific attempt at locating an IP address
#[async_trait]
pub trait LocationStrategy: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &str;

    /// Locate `ip`, returning an error on any network, status or format failure
    async fn locate(&self, ip: &str) -> Result<LocationResult, LocateError>;
}

/// Read a string field, treating empty strings and non-strings as absent.
///
/// The map vendor returns `[]` instead of a string for missing values.
pub(crate) fn text_field(value: &serde_json::Value, key: &str) -> Option<String> {
    match value.get(key) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Read a response body as JSON, reporting an undecodable body as `Malformed`
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
    provider: &'static str,
) -> Result<T, LocateError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| LocateError::Malformed {
        provider,
        reason: e.to_string(),
    })
}

/// Look up the caller's public IP address via an IP-echo service
pub async fn fetch_public_ip(client: &reqwest::Client, url: &str) -> Result<String, LocateError> {
    let response = client.get(url).timeout(IP_ECHO_TIMEOUT).send().await?;

    if !response.status().is_success() {
        return Err(LocateError::Status {
            provider: "ip-echo",
            status: response.status(),
        });
    }

    let body: serde_json::Value = decode_json(response, "ip-echo").await?;
    text_field(&body, "origin").ok_or_else(|| LocateError::Malformed {
        provider: "ip-echo",
        reason: "missing 'origin' field".to_string(),
    })
}

/// Ordered chain of strategies with a guaranteed default
pub struct LocationResolver {
    client: reqwest::Client,
    ip_echo_url: String,
    strategies: Vec<Box<dyn LocationStrategy>>,
    fallback: LocationResult,
    debug: bool,
}

impl LocationResolver {
    pub fn new(
        client: reqwest::Client,
        ip_echo_url: impl Into<String>,
        strategies: Vec<Box<dyn LocationStrategy>>,
        fallback: LocationResult,
    ) -> Self {
        Self {
            client,
            ip_echo_url: ip_echo_url.into(),
            strategies,
            fallback,
            debug: false,
        }
    }

    /// Print failed attempts to stdout
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Build the strategy chain for the configured method preference
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let endpoints = &config.endpoints;
        let ip_api: Box<dyn LocationStrategy> = Box::new(IpApiStrategy::new(
            client.clone(),
            &endpoints.ip_api_base_url,
        ));

        let strategies = match config.location.method {
            MethodPreference::Amap => vec![
                Box::new(AmapStrategy::new(
                    client.clone(),
                    &endpoints.amap_base_url,
                    &config.location.amap_api_key,
                )) as Box<dyn LocationStrategy>,
                ip_api,
            ],
            MethodPreference::Ip => vec![ip_api],
        };

        Self::new(
            client,
            &endpoints.ip_echo_url,
            strategies,
            config.location.default.clone(),
        )
        .with_debug(config.debug)
    }

    /// Names of the strategies in the order they are tried
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve the current location. Never fails.
    pub async fn resolve(&self) -> LocationResult {
        let ip = match fetch_public_ip(&self.client, &self.ip_echo_url).await {
            Ok(ip) => ip,
            Err(e) => {
                tracing::debug!("Public IP lookup failed: {}", e);
                if self.debug {
                    println!("公网IP获取失败: {}", e);
                }
                return self.fallback.clone();
            }
        };
        tracing::debug!("Public IP: {}", ip);

        for strategy in &self.strategies {
            match strategy.locate(&ip).await {
                Ok(location) => {
                    tracing::debug!(
                        "Located via {}: {} ({})",
                        strategy.name(),
                        location,
                        location.method.as_str()
                    );
                    return location;
                }
                Err(e) => {
                    tracing::debug!("{} location lookup failed: {}", strategy.name(), e);
                    if self.debug {
                        println!("{} 定位失败: {}", strategy.name(), e);
                    }
                }
            }
        }

        tracing::debug!("All location strategies failed, using default location");
        self.fallback.clone()
    }
}
