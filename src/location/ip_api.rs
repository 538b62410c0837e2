//! Generic IP geolocation (ip-api.com style)

use super::{decode_json, LocateError, LocationMethod, LocationResult, LocationStrategy, UNKNOWN};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const IP_API_TIMEOUT: Duration = Duration::from_secs(5);
const PROVIDER: &str = "ip-api";

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default, rename = "regionName")]
    region_name: Option<String>,
}

pub struct IpApiStrategy {
    client: reqwest::Client,
    base_url: String,
}

impl IpApiStrategy {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LocationStrategy for IpApiStrategy {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn locate(&self, ip: &str) -> Result<LocationResult, LocateError> {
        let response = self
            .client
            .get(format!("{}/json/{}", self.base_url, ip))
            .timeout(IP_API_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LocateError::Status {
                provider: PROVIDER,
                status: response.status(),
            });
        }

        let data: IpApiResponse = decode_json(response, PROVIDER).await?;
        if data.status != "success" {
            return Err(LocateError::Rejected {
                provider: PROVIDER,
                reason: data.message.unwrap_or(data.status),
            });
        }

        Ok(LocationResult {
            latitude: data.lat.unwrap_or(0.0),
            longitude: data.lon.unwrap_or(0.0),
            city: data.city.unwrap_or_else(|| UNKNOWN.to_string()),
            region: data.region_name.unwrap_or_else(|| UNKNOWN.to_string()),
            method: LocationMethod::Ip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_missing_fields_deserializes() {
        let data: IpApiResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(data.status, "success");
        assert!(data.lat.is_none());
        assert!(data.city.is_none());
    }

    #[test]
    fn test_response_fail_message() {
        let data: IpApiResponse =
            serde_json::from_str(r#"{"status":"fail","message":"private range"}"#).unwrap();
        assert_eq!(data.message.as_deref(), Some("private range"));
    }
}
