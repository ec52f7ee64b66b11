use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::schema::WorkUnit;

/// Log target for every outbound HTTP call
pub const API_TARGET: &str = "api";

/// Status and body of a completed HTTP request
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking GET with a per-request timeout
pub trait Transport {
    fn get(&self, url: &str, timeout: Duration) -> Result<Response, String>;
}

/// reqwest-backed transport used by the binary
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("acs-warehouse")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<Response, String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?;
        Ok(Response::new(status, body.to_vec()))
    }
}

/// Census API requests for one run
pub struct CensusClient<'a, T: Transport> {
    transport: &'a T,
    config: &'a ApiConfig,
}

impl<'a, T: Transport> CensusClient<'a, T> {
    pub fn new(transport: &'a T, config: &'a ApiConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ApiConfig {
        self.config
    }

    pub fn data_url(&self, unit: &WorkUnit) -> String {
        format!(
            "{}/data/{}/acs/acs5?get=NAME,group({})&for={}&key={}",
            self.config.base_url.trim_end_matches('/'),
            unit.year,
            unit.table.table_id,
            unit.geography.api_clause(),
            self.config.api_key
        )
    }

    pub fn labels_url(&self, unit: &WorkUnit) -> String {
        format!(
            "{}/data/{}/acs/acs5/groups/{}.{}",
            self.config.base_url.trim_end_matches('/'),
            unit.year,
            unit.table.table_id,
            self.config.label_format.extension()
        )
    }

    /// Fetch a unit's data rows as the raw JSON array-of-arrays
    pub fn fetch_data(&self, unit: &WorkUnit) -> Result<Vec<Vec<serde_json::Value>>, FetchError> {
        let url = self.data_url(unit);
        let response = self.get(&url, self.config.data_timeout)?;
        serde_json::from_slice(&response.body).map_err(|e| FetchError::Malformed {
            url: redact_key(&url),
            message: e.to_string(),
        })
    }

    /// Fetch the label metadata document for a unit's table
    pub fn fetch_labels(&self, unit: &WorkUnit) -> Result<String, FetchError> {
        let url = self.labels_url(unit);
        self.get(&url, self.config.data_timeout).map(|r| r.text())
    }

    /// GET that treats any non-2xx status as an error
    pub fn get(&self, url: &str, timeout: Duration) -> Result<Response, FetchError> {
        let shown = redact_key(url);
        debug!(target: API_TARGET, "GET {}", shown);

        let response = self.transport.get(url, timeout).map_err(|message| {
            warn!(target: API_TARGET, "{} failed: {}", shown, message);
            FetchError::Transport {
                url: shown.clone(),
                message,
            }
        })?;

        if !response.is_success() {
            warn!(target: API_TARGET, "{} returned HTTP {}", shown, response.status);
            return Err(FetchError::Status {
                url: shown,
                status: response.status,
            });
        }

        Ok(response)
    }
}

/// Mask the API key in a URL before it reaches logs or reports
pub fn redact_key(url: &str) -> String {
    match url.find("key=") {
        Some(idx) => {
            let value_start = idx + "key=".len();
            let value_end = url[value_start..]
                .find('&')
                .map(|i| value_start + i)
                .unwrap_or(url.len());
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}
