//! Backend REST collaborator
//!
//! Reports are read with `GET <base_url><resource>?Page=..&PageSize=..`.
//! The body is returned as raw JSON; shape normalization happens in
//! `extract`, not here.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::FetchError;
use crate::query::ReportQuery;

/// Anything that can answer a report query with a raw response
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch(&self, resource: &str, query: &ReportQuery) -> Result<Value, FetchError>;
}

/// reqwest-backed source
pub struct HttpReportSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReportSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, FetchError> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    /// Full request URL with query parameters
    pub fn url(&self, resource: &str, query: &ReportQuery) -> Result<reqwest::Url, FetchError> {
        let base = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        );
        reqwest::Url::parse_with_params(&base, query.to_params())
            .map_err(|e| FetchError::Network(format!("invalid report URL '{}': {}", base, e)))
    }
}

#[async_trait]
impl ReportSource for HttpReportSource {
    async fn fetch(&self, resource: &str, query: &ReportQuery) -> Result<Value, FetchError> {
        let url = self.url(resource, query)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Report request failed with HTTP {}", status);
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportDefinition;
    use crate::filter::FilterState;
    use chrono::NaiveDate;

    #[test]
    fn test_url_joins_base_and_resource() {
        let source = HttpReportSource::new("https://erp.example.com/api/", Duration::from_secs(5)).unwrap();
        let def = ReportDefinition::new("Sales", "/reports/sales").with_server_date_filter();
        let filter = FilterState::default()
            .with_date_range(NaiveDate::from_ymd_opt(2025, 11, 1), None);
        let query = ReportQuery::build(&def, &filter, 3, 20);

        let url = source.url(&def.resource, &query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://erp.example.com/api/reports/sales?Page=3&PageSize=20&FromDate=2025-11-01"
        );
    }

    #[test]
    fn test_from_config() {
        let config = crate::config::FileConfig::parse(
            "[backend]\nbase_url = \"http://erp.local/api\"\ntimeout_secs = 5\n",
        )
        .unwrap();
        let source = HttpReportSource::from_config(&config.backend).unwrap();
        let query = ReportQuery::build(&ReportDefinition::new("R", "/r"), &FilterState::default(), 1, 10);
        assert_eq!(
            source.url("r", &query).unwrap().as_str(),
            "http://erp.local/api/r?Page=1&PageSize=10"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let source = HttpReportSource::new("not a url", Duration::from_secs(5)).unwrap();
        let query = ReportQuery::build(&ReportDefinition::new("R", "/r"), &FilterState::default(), 1, 10);
        assert!(matches!(source.url("/r", &query), Err(FetchError::Network(_))));
    }

    /// Answer one request with a canned HTTP response
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn fetch_from(status: &'static str, body: &'static str) -> Result<Value, FetchError> {
        let source = HttpReportSource::new(serve_once(status, body).await, Duration::from_secs(5)).unwrap();
        let query = ReportQuery::build(&ReportDefinition::new("R", "/r"), &FilterState::default(), 1, 10);
        source.fetch("/r", &query).await
    }

    #[tokio::test]
    async fn test_fetch_decodes_json_body() {
        let value = fetch_from("200 OK", r#"{"items":[{"id":1}]}"#).await.unwrap();
        assert_eq!(value["items"][0]["id"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_null() {
        assert_eq!(fetch_from("200 OK", "").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_fetch_undecodable_body() {
        let err = fetch_from("200 OK", "<html>").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_error_status_keeps_body() {
        let err = fetch_from("404 Not Found", "no such report").await.unwrap_err();
        match err {
            FetchError::Status { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such report");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_failure() {
        // Port 9 (discard) on localhost is closed in test environments
        let source = HttpReportSource::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let query = ReportQuery::build(&ReportDefinition::new("R", "/r"), &FilterState::default(), 1, 10);
        let err = source.fetch("/r", &query).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::FetchFailureKind::Network);
    }
}
