extern crate serde;

use crate::cloudflare::requests::Request;
use crate::errors::SpeedTestError;
use serde::{Deserialize, Serialize};
use url::Url;

const UNKNOWN: &str = "Unknown";

/// Datacenter answering the requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Colo {
    /// IATA airport code for the datacenter location
    #[serde(default)]
    pub iata: String,
    #[serde(default)]
    pub city: String,
}

/// Subset of the speed server's `/meta` document that describes the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "clientIp", default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub asn: Option<i64>,
    #[serde(rename = "asOrganization", default)]
    pub as_organization: Option<String>,
    #[serde(default)]
    pub colo: Option<Colo>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

pub struct MetaRequest<'a> {
    pub url: &'a Url,
}

impl Request for MetaRequest<'_> {
    type Response = Meta;

    fn url(&self) -> Result<Url, SpeedTestError> {
        Ok(self.url.clone())
    }
}

/// Who and where the client is, for display next to the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub isp: String,
    pub ip: String,
    pub location: String,
    pub server_location: String,
}

impl ConnectionInfo {
    /// Placeholder used when the lookup fails.
    pub fn unknown() -> Self {
        Self {
            isp: "Unknown ISP".to_string(),
            ip: UNKNOWN.to_string(),
            location: "Unknown Location".to_string(),
            server_location: "Unknown Location".to_string(),
        }
    }
}

impl From<Meta> for ConnectionInfo {
    fn from(meta: Meta) -> Self {
        let or_unknown = |value: Option<String>| {
            value.filter(|v| !v.is_empty()).unwrap_or_else(|| UNKNOWN.to_string())
        };

        let server_location = match meta.colo {
            Some(colo) if !colo.iata.is_empty() => {
                if colo.city.is_empty() {
                    colo.iata
                } else {
                    format!("{} ({})", colo.city, colo.iata)
                }
            }
            _ => "Unknown Location".to_string(),
        };

        Self {
            isp: meta
                .as_organization
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "Unknown ISP".to_string()),
            ip: or_unknown(meta.client_ip),
            location: format!(
                "{}, {}",
                or_unknown(meta.city),
                or_unknown(meta.region.or(meta.country))
            ),
            server_location,
        }
    }
}
