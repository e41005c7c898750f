//! World Bank indicator API client.
//!
//! Responses are a two-element JSON array: paging metadata followed by the
//! records (or `null` past the last page). Errors come back as a
//! one-element array holding a `message` list.

use crate::config::DataConfig;
use crate::data::source::{
    IndicatorInfo, PageRequest, PanelPage, PanelSource, RawRecord, SourceError,
};
use crate::models::IndicatorCode;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("empirica/", env!("CARGO_PKG_VERSION"));

/// Client for the World Bank v2 API.
pub struct WorldBankClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl WorldBankClient {
    pub fn new(config: &DataConfig) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PanelSource for WorldBankClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PanelPage, SourceError> {
        let url = format!(
            "{}/country/all/indicator/{}",
            self.base_url, request.indicator
        );
        let query = [
            ("date", format!("{}:{}", request.start_year, request.end_year)),
            ("format", "json".to_string()),
            ("per_page", request.per_page.to_string()),
            ("page", request.page.to_string()),
        ];

        debug!(indicator = %request.indicator, page = request.page, "Requesting indicator page");

        let body = self.get_json(&url, &query).await?;
        parse_page(&body, request.page)
    }

    async fn indicator_info(
        &self,
        code: &IndicatorCode,
    ) -> Result<Option<IndicatorInfo>, SourceError> {
        let url = format!("{}/indicator/{}", self.base_url, code);
        let body = self
            .get_json(&url, &[("format", "json".to_string())])
            .await?;
        parse_indicator(&body)
    }
}

/// Parse one page of indicator data.
pub fn parse_page(body: &Value, requested_page: u32) -> Result<PanelPage, SourceError> {
    let items = body
        .as_array()
        .ok_or_else(|| SourceError::Parse("expected a JSON array".to_string()))?;

    let meta = match items.first() {
        Some(meta) if meta.get("message").is_none() => meta,
        Some(meta) => {
            debug!(provider_message = %meta["message"], "Provider returned an error message");
            return Ok(PanelPage::empty(requested_page));
        }
        None => return Ok(PanelPage::empty(requested_page)),
    };

    let records = match items.get(1).and_then(Value::as_array) {
        Some(records) => records.iter().filter_map(parse_record).collect(),
        None => Vec::new(),
    };

    Ok(PanelPage {
        page: lenient_u64(&meta["page"]).unwrap_or(requested_page as u64) as u32,
        pages: lenient_u64(&meta["pages"]).unwrap_or(1) as u32,
        total: lenient_u64(&meta["total"]).unwrap_or(0),
        records,
    })
}

fn parse_record(record: &Value) -> Option<RawRecord> {
    // The ISO3 code is what the aggregate list uses; `country.id` is ISO2.
    let iso3 = record["countryiso3code"].as_str().unwrap_or("").trim();
    let country_code = if iso3.is_empty() {
        record["country"]["id"].as_str()?.trim()
    } else {
        iso3
    };

    Some(RawRecord {
        country_code: country_code.to_string(),
        country_name: record["country"]["value"].as_str().unwrap_or("").to_string(),
        date: record["date"].as_str()?.to_string(),
        value: record["value"].as_f64(),
    })
}

/// Parse a catalog lookup. A `message` answer means the code is unknown.
pub fn parse_indicator(body: &Value) -> Result<Option<IndicatorInfo>, SourceError> {
    let items = body
        .as_array()
        .ok_or_else(|| SourceError::Parse("expected a JSON array".to_string()))?;

    if items.first().map_or(true, |meta| meta.get("message").is_some()) {
        return Ok(None);
    }

    let entry = match items.get(1).and_then(Value::as_array).and_then(|a| a.first()) {
        Some(entry) => entry,
        None => return Ok(None),
    };

    let code = match entry["id"].as_str() {
        Some(id) if !id.is_empty() => IndicatorCode::new(id),
        _ => return Ok(None),
    };

    Ok(Some(IndicatorInfo {
        code,
        name: entry["name"].as_str().unwrap_or("").to_string(),
        source: entry["source"]["value"].as_str().unwrap_or("").to_string(),
    }))
}

/// Paging numbers arrive as numbers or as numeric strings.
fn lenient_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_page() {
        let body = json!([
            {"page": 1, "pages": 3, "per_page": "2", "total": 6},
            [
                {
                    "country": {"id": "US", "value": "United States"},
                    "countryiso3code": "USA",
                    "date": "2020",
                    "value": 77.3
                },
                {
                    "country": {"id": "1W", "value": "World"},
                    "countryiso3code": "WLD",
                    "date": "2020",
                    "value": null
                }
            ]
        ]);

        let page = parse_page(&body, 1).unwrap();
        assert_eq!(page.pages, 3);
        assert_eq!(page.total, 6);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].country_code, "USA");
        assert_eq!(page.records[0].value, Some(77.3));
        assert_eq!(page.records[1].value, None);
    }

    #[test]
    fn test_parse_page_string_metadata() {
        let body = json!([{"page": "2", "pages": "2", "total": "3"}, []]);
        let page = parse_page(&body, 2).unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.pages, 2);
        assert_eq!(page.total, 3);
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_parse_page_past_end() {
        let body = json!([{"page": 4, "pages": 3, "total": 6}, null]);
        let page = parse_page(&body, 4).unwrap();
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_parse_page_error_message() {
        let body = json!([{"message": [{"id": "120", "key": "Invalid value"}]}]);
        let page = parse_page(&body, 1).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_parse_record_falls_back_to_country_id() {
        let record = json!({
            "country": {"id": "KEN", "value": "Kenya"},
            "countryiso3code": "",
            "date": "2015",
            "value": 1.5
        });
        let parsed = parse_record(&record).unwrap();
        assert_eq!(parsed.country_code, "KEN");
        assert_eq!(parsed.country_name, "Kenya");
    }

    #[test]
    fn test_parse_indicator_found() {
        let body = json!([
            {"page": 1, "pages": 1, "total": 1},
            [{
                "id": "SP.DYN.LE00.IN",
                "name": "Life expectancy at birth, total (years)",
                "source": {"id": "2", "value": "World Development Indicators"}
            }]
        ]);
        let info = parse_indicator(&body).unwrap().unwrap();
        assert_eq!(info.code.as_str(), "SP.DYN.LE00.IN");
        assert_eq!(info.source, "World Development Indicators");
    }

    #[test]
    fn test_parse_indicator_unknown() {
        let body = json!([{"message": [{"id": "120", "value": "The indicator was not found"}]}]);
        assert_eq!(parse_indicator(&body).unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_page(&json!({"a": 1}), 1).is_err());
        assert!(parse_indicator(&json!("x")).is_err());
    }
}
