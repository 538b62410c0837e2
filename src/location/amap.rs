//! Map-vendor (Amap) reverse-IP lookup with forward-geocoding fallback

use super::{
    decode_json, text_field, LocateError, LocationMethod, LocationResult, LocationStrategy,
    UNKNOWN,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const AMAP_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER: &str = "amap";

/// Forward-geocoding response; only the first match is used
#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    geocodes: Vec<Geocode>,
}

#[derive(Debug, Deserialize)]
struct Geocode {
    location: String,
}

pub struct AmapStrategy {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AmapStrategy {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, LocateError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .timeout(AMAP_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LocateError::Status {
                provider: PROVIDER,
                status: response.status(),
            });
        }

        decode_json(response, PROVIDER).await
    }

    /// Coordinates of the first forward-geocoding match for `address`
    async fn geocode(&self, address: &str) -> Result<(f64, f64), LocateError> {
        let response: GeocodeResponse = self
            .get_json("/v3/geocode/geo", &[("address", address)])
            .await?;

        if response.status != "1" {
            return Err(LocateError::Rejected {
                provider: PROVIDER,
                reason: format!("geocode status {}", response.status),
            });
        }

        let first = response.geocodes.first().ok_or(LocateError::Rejected {
            provider: PROVIDER,
            reason: format!("no geocode match for {}", address),
        })?;

        parse_lon_lat(&first.location)
            .map(|(lon, lat)| (lat, lon))
            .ok_or_else(|| LocateError::Malformed {
                provider: PROVIDER,
                reason: format!("bad geocode location '{}'", first.location),
            })
    }
}

/// Parse a `"lon,lat"` pair
fn parse_lon_lat(pair: &str) -> Option<(f64, f64)> {
    let (lon, lat) = pair.split_once(',')?;
    if lat.contains(',') {
        return None;
    }
    Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
}

/// Center of a `"lon1,lat1;lon2,lat2"` rectangle as `(latitude, longitude)`.
///
/// Returns `Ok(None)` when the string does not have two corners of two
/// components each, and an error when a component is not a number.
pub fn parse_rectangle_center(rectangle: &str) -> Result<Option<(f64, f64)>, LocateError> {
    let corners: Vec<&str> = rectangle.split(';').collect();
    if corners.len() != 2 {
        return Ok(None);
    }
    let bottom_left: Vec<&str> = corners[0].split(',').collect();
    let top_right: Vec<&str> = corners[1].split(',').collect();
    if bottom_left.len() != 2 || top_right.len() != 2 {
        return Ok(None);
    }

    let number = |s: &str| -> Result<f64, LocateError> {
        s.trim().parse::<f64>().map_err(|_| LocateError::Malformed {
            provider: PROVIDER,
            reason: format!("bad rectangle coordinate '{}'", s),
        })
    };

    let lon = (number(bottom_left[0])? + number(top_right[0])?) / 2.0;
    let lat = (number(bottom_left[1])? + number(top_right[1])?) / 2.0;
    Ok(Some((lat, lon)))
}

#[async_trait]
impl LocationStrategy for AmapStrategy {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn locate(&self, ip: &str) -> Result<LocationResult, LocateError> {
        let data: serde_json::Value = self.get_json("/v3/ip", &[("ip", ip)]).await?;

        let status = text_field(&data, "status").unwrap_or_default();
        let info = text_field(&data, "info").unwrap_or_default();
        if status != "1" || info != "OK" {
            return Err(LocateError::Rejected {
                provider: PROVIDER,
                reason: format!("status={} info={}", status, info),
            });
        }

        let region = text_field(&data, "province").unwrap_or_else(|| UNKNOWN.to_string());
        let city = text_field(&data, "city");

        if let Some(rectangle) = text_field(&data, "rectangle") {
            if let Some((latitude, longitude)) = parse_rectangle_center(&rectangle)? {
                return Ok(LocationResult {
                    latitude,
                    longitude,
                    city: city.unwrap_or_else(|| UNKNOWN.to_string()),
                    region,
                    method: LocationMethod::AmapRectangle,
                });
            }
        }

        match city {
            Some(city) if city != UNKNOWN => {
                let (latitude, longitude) = self.geocode(&city).await?;
                Ok(LocationResult {
                    latitude,
                    longitude,
                    city,
                    region,
                    method: LocationMethod::AmapGeocode,
                })
            }
            _ => Err(LocateError::Rejected {
                provider: PROVIDER,
                reason: "no rectangle or city in response".to_string(),
            }),
        }
    }
}
