//! QRadar SIEM offenses API client

use super::OffenseSource;
use crate::config::SourceConfig;
use crate::error::{Result, WatchError};
use crate::types::Offense;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::time::Duration;

/// Reads offenses from `/api/siem/offenses`
pub struct QRadarSource {
    client: reqwest::Client,
    url: String,
    api_token: String,
    api_version: String,
    page_size: usize,
}

/// Server-side filter for the forward scan
pub fn offense_filter(cursor: u64, cutoff_millis: i64) -> String {
    format!(
        "status=OPEN and id > {} and start_time <= {}",
        cursor, cutoff_millis
    )
}

/// Decode an offense list response body
///
/// QRadar answers `[]` when nothing matches; anything that is not a JSON
/// array of offenses is a fetch failure.
pub fn decode_offenses(body: &str) -> Result<Vec<Offense>> {
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(120).collect();
        WatchError::fetch(
            "fetch_since",
            format!("unexpected response body ({}): {}", e, preview),
        )
    })
}

/// `Range` header value requesting the first `page_size` items
pub fn range_header(page_size: usize) -> String {
    format!("items=0-{}", page_size.saturating_sub(1))
}

impl QRadarSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("offense-watch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        if config.accept_invalid_certs {
            tracing::warn!(url = %config.url, "TLS certificate verification disabled for QRadar");
        }

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            api_token: config.api_token.expose().to_string(),
            api_version: config.api_version.clone(),
            page_size: config.page_size,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("SEC", &self.api_token)
            .header("Accept", "application/json")
            .header("Version", &self.api_version)
    }
}

#[async_trait]
impl OffenseSource for QRadarSource {
    async fn fetch_since(&self, cursor: u64, cutoff: DateTime<Utc>) -> Result<Vec<Offense>> {
        let filter = offense_filter(cursor, cutoff.timestamp_millis());
        let response = self
            .get(&self.url)
            .header("Range", range_header(self.page_size))
            .query(&[("filter", filter.as_str()), ("sort", "+start_time")])
            .send()
            .await
            .map_err(|e| WatchError::fetch("fetch_since", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::fetch(
                "fetch_since",
                format!("QRadar returned {}: {}", status, body),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WatchError::fetch("fetch_since", e))?;
        let mut offenses = decode_offenses(&body)?;
        offenses.truncate(self.page_size);

        tracing::debug!(
            cursor,
            filter = %filter,
            count = offenses.len(),
            "Fetched offenses from QRadar"
        );
        Ok(offenses)
    }

    async fn fetch_by_id(&self, id: u64) -> Result<Option<Offense>> {
        let url = format!("{}/{}", self.url, id);
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| WatchError::fetch(format!("fetch_by_id({})", id), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::fetch(
                format!("fetch_by_id({})", id),
                format!("QRadar returned {}: {}", status, body),
            ));
        }

        let offense = response
            .json::<Offense>()
            .await
            .map_err(|e| WatchError::fetch(format!("fetch_by_id({})", id), e))?;
        Ok(Some(offense))
    }

    fn name(&self) -> &str {
        "qradar"
    }
}
