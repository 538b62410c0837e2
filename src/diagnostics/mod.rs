//! Network and geolocation diagnostics
//!
//! Queries the IP-echo service and two IP-geolocation providers in sequence,
//! then reports the local network identity. Every section fails on its own:
//! an unreachable provider only replaces that section's body with a notice.

use crate::config::EndpointsConfig;
use crate::location::UNKNOWN;
use anyhow::Result;
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(5);
const RULE_WIDTH: usize = 40;

/// Well-known external address used only to pick the outbound interface
const ROUTE_PROBE: &str = "8.8.8.8:80";

pub struct DiagnosticReporter {
    client: reqwest::Client,
    endpoints: EndpointsConfig,
}

/// Render a JSON field for display, `未知` when absent
fn display_field(data: &serde_json::Value, key: &str) -> String {
    match data.get(key) {
        None | Some(serde_json::Value::Null) => UNKNOWN.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Map links for a coordinate pair: (name, url)
pub fn map_links(lat: f64, lon: f64) -> [(&'static str, String); 3] {
    [
        ("Google", format!("https://www.google.com/maps?q={},{}", lat, lon)),
        (
            "百度",
            format!(
                "https://api.map.baidu.com/marker?location={},{}&title=您的位置",
                lat, lon
            ),
        ),
        (
            "高德",
            format!(
                "https://uri.amap.com/marker?position={},{}&name=您的位置",
                lon, lat
            ),
        ),
    ]
}

impl DiagnosticReporter {
    pub fn new(client: reqwest::Client, endpoints: EndpointsConfig) -> Self {
        Self { client, endpoints }
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(DIAGNOSTIC_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// GET `url` and decode the JSON body whatever the status.
    ///
    /// The secondary provider explains rate limits in an error body.
    async fn get_json_any_status(
        &self,
        url: &str,
    ) -> Result<(reqwest::StatusCode, serde_json::Value)> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(DIAGNOSTIC_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        Ok((status, response.json().await?))
    }

    /// Run every section, writing the report to `out`
    pub async fn run(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "🔍 正在定位您的位置...")?;
        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;

        let ip = self.public_ip_section(out).await?;
        self.localized_section(out, ip.as_deref()).await?;
        self.secondary_section(out, ip.as_deref()).await?;

        writeln!(out, "\n{}", "=".repeat(RULE_WIDTH))?;
        writeln!(out, "✅ 位置查询完成!")?;

        self.local_network_section(out).await?;
        Ok(())
    }

    async fn public_ip_section(&self, out: &mut impl Write) -> Result<Option<String>> {
        writeln!(out, "📍 获取您的IP地址...")?;
        match self.get_json(&self.endpoints.ip_echo_url).await {
            Ok(data) => match data.get("origin").and_then(|v| v.as_str()) {
                Some(ip) => {
                    writeln!(out, "   您的公网IP: {}", ip)?;
                    Ok(Some(ip.to_string()))
                }
                None => {
                    writeln!(out, "   ❌ 公网IP响应缺少 origin 字段")?;
                    Ok(None)
                }
            },
            Err(e) => {
                tracing::debug!("IP echo failed: {:#}", e);
                writeln!(out, "   ❌ 获取公网IP失败: {}", e)?;
                Ok(None)
            }
        }
    }

    async fn localized_section(&self, out: &mut impl Write, ip: Option<&str>) -> Result<()> {
        writeln!(out, "\n🌍 获取位置详情...")?;
        let url = format!(
            "{}/json/{}?lang=zh-CN",
            self.endpoints.ip_api_base_url.trim_end_matches('/'),
            ip.unwrap_or_default()
        );

        let data = match self.get_json(&url).await {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("Localized geolocation failed: {:#}", e);
                writeln!(out, "   ❌ 位置详情服务暂不可用: {}", e)?;
                return Ok(());
            }
        };

        if data.get("status").and_then(|s| s.as_str()) != Some("success") {
            writeln!(out, "   ❌ 位置信息获取失败")?;
            return Ok(());
        }

        writeln!(out, "   🏳️  国家: {}", display_field(&data, "country"))?;
        writeln!(out, "   🏛️  省份: {}", display_field(&data, "regionName"))?;
        writeln!(out, "   🏙️  城市: {}", display_field(&data, "city"))?;
        writeln!(out, "   📮 邮编: {}", display_field(&data, "zip"))?;
        writeln!(out, "   🌐 运营商: {}", display_field(&data, "isp"))?;
        writeln!(out, "   📡 组织: {}", display_field(&data, "org"))?;

        let coordinate = |key: &str| data.get(key).and_then(|v| v.as_f64()).filter(|v| *v != 0.0);
        if let (Some(lat), Some(lon)) = (coordinate("lat"), coordinate("lon")) {
            writeln!(out, "   📍 坐标: {}, {}", lat, lon)?;
            writeln!(out, "   🗺️  地图链接:")?;
            for (name, link) in map_links(lat, lon) {
                writeln!(out, "      {}: {}", name, link)?;
            }
        }
        Ok(())
    }

    async fn secondary_section(&self, out: &mut impl Write, ip: Option<&str>) -> Result<()> {
        writeln!(out, "\n🎯 尝试获取更精确的位置...")?;
        let base = self.endpoints.ipapi_co_base_url.trim_end_matches('/');
        let url = match ip {
            Some(ip) => format!("{}/{}/json/", base, ip),
            None => format!("{}/json/", base),
        };

        let (status, data) = match self.get_json_any_status(&url).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!("Secondary geolocation failed: {:#}", e);
                writeln!(out, "   ⚠️  精确位置服务暂不可用")?;
                return Ok(());
            }
        };

        if data.get("error").and_then(|v| v.as_bool()).unwrap_or(false) {
            writeln!(out, "   ⚠️  精确位置查询受限: {}", display_field(&data, "reason"))?;
            return Ok(());
        }
        if !status.is_success() {
            tracing::debug!("Secondary geolocation returned HTTP {}", status);
            writeln!(out, "   ⚠️  精确位置服务暂不可用")?;
            return Ok(());
        }

        writeln!(out, "   🏢 地区: {}", display_field(&data, "region"))?;
        writeln!(out, "   🕐 时区: {}", display_field(&data, "timezone"))?;
        writeln!(out, "   🏦 ASN: {}", display_field(&data, "asn"))?;
        writeln!(out, "   🌐 网络: {}", display_field(&data, "network"))?;
        Ok(())
    }

    async fn local_network_section(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "\n💻 本地网络信息:")?;
        writeln!(out, "{}", "-".repeat(30))?;

        let hostname = match whoami::fallible::hostname() {
            Ok(name) => {
                writeln!(out, "   🖥️  主机名: {}", name)?;
                Some(name)
            }
            Err(e) => {
                writeln!(out, "   ❌ 获取主机名失败: {}", e)?;
                None
            }
        };

        if let Some(hostname) = hostname {
            match resolve_host(&hostname).await {
                Ok(addr) => writeln!(out, "   🏠 本地IP: {}", addr)?,
                Err(e) => writeln!(out, "   ❌ 解析本地IP失败: {}", e)?,
            }
        }

        match outbound_source_addr(ROUTE_PROBE).await {
            Ok(addr) => writeln!(out, "   📶 实际内网IP: {}", addr)?,
            Err(e) => writeln!(out, "   ❌ 获取内网IP失败: {}", e)?,
        }
        Ok(())
    }
}

/// Resolve a host name, preferring an IPv4 address
pub async fn resolve_host(hostname: &str) -> Result<IpAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((hostname, 0)).await?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(|a| a.ip())
        .ok_or_else(|| anyhow::anyhow!("no address for host {}", hostname))
}

/// Local address the OS would route traffic to `probe` from.
///
/// Connecting a UDP socket sends nothing; it only binds the route.
pub async fn outbound_source_addr(probe: &str) -> Result<IpAddr> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(probe).await?;
    Ok(socket.local_addr()?.ip())
}
