pub mod dto;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::RecordKind;

pub use dto::Row;

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub registrations_table: String,
    pub screenings_table: String,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn table(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Registration => &self.registrations_table,
            RecordKind::Screening => &self.screenings_table,
        }
    }
}

/// Hosted relational store the queue is drained into.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert all rows in one request. Returns the inserted rows in request
    /// order when the remote echoes them back.
    async fn insert_batch(&self, kind: RecordKind, rows: Vec<Row>) -> Result<Vec<Row>, AppError>;
    async fn insert_one(&self, kind: RecordKind, row: Row) -> Result<Option<Row>, AppError>;
    async fn count(&self, kind: RecordKind) -> Result<u64, AppError>;
    async fn select_recent(&self, kind: RecordKind, limit: u32) -> Result<Vec<Row>, AppError>;
    async fn ping(&self) -> Result<(), AppError>;
}

pub struct HttpRemoteStore {
    client: Client,
    config: RemoteConfig,
}

impl HttpRemoteStore {
    pub fn new(config: RemoteConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn table_url(&self, kind: RecordKind) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.table(kind)
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    async fn error_text(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<dto::ApiError>(&body) {
            Ok(api) => format!("{} {}", status, api.describe()),
            Err(_) => format!("{} {}", status, body),
        }
    }

    async fn post_rows(&self, kind: RecordKind, body: serde_json::Value) -> Result<Vec<Row>, AppError> {
        let response = self
            .request(reqwest::Method::POST, &self.table_url(kind))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::RemoteWriteFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::RemoteWriteFailed(Self::error_text(response).await));
        }

        // The write is committed at this point; an unreadable echo only
        // costs us the remote ids.
        let body_text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<Vec<Row>>(&body_text) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!("could not parse inserted {} rows: {}", kind, e);
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn insert_batch(&self, kind: RecordKind, rows: Vec<Row>) -> Result<Vec<Row>, AppError> {
        debug!("inserting {} {} rows", rows.len(), kind);
        let body = serde_json::Value::Array(rows.into_iter().map(serde_json::Value::Object).collect());
        self.post_rows(kind, body).await
    }

    async fn insert_one(&self, kind: RecordKind, row: Row) -> Result<Option<Row>, AppError> {
        let rows = self.post_rows(kind, serde_json::Value::Object(row)).await?;
        Ok(rows.into_iter().next())
    }

    async fn count(&self, kind: RecordKind) -> Result<u64, AppError> {
        let url = format!("{}?select=id", self.table_url(kind));
        let response = self
            .request(reqwest::Method::GET, &url)
            .header("Prefer", "count=exact")
            .header("Range-Unit", "items")
            .header("Range", "0-0")
            .send()
            .await
            .map_err(|e| AppError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Remote(Self::error_text(response).await));
        }

        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(dto::parse_content_range_total)
            .ok_or_else(|| AppError::Remote(format!("{} count missing from response", kind)))
    }

    async fn select_recent(&self, kind: RecordKind, limit: u32) -> Result<Vec<Row>, AppError> {
        let url = format!(
            "{}?select=*&order=created_at.desc&limit={}",
            self.table_url(kind),
            limit
        );
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| AppError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Remote(Self::error_text(response).await));
        }

        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| AppError::Remote(format!("Failed to parse {} rows: {}", kind, e)))
    }

    async fn ping(&self) -> Result<(), AppError> {
        let url = format!("{}/rest/v1/", self.config.base_url.trim_end_matches('/'));
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| AppError::Remote(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::Remote(format!("health probe returned {}", response.status())))
        }
    }
}

/// Accepts every write and stores nothing. Used when no remote is configured.
pub struct NoopRemoteStore;

#[async_trait]
impl RemoteStore for NoopRemoteStore {
    async fn insert_batch(&self, _kind: RecordKind, _rows: Vec<Row>) -> Result<Vec<Row>, AppError> {
        Ok(Vec::new())
    }

    async fn insert_one(&self, _kind: RecordKind, _row: Row) -> Result<Option<Row>, AppError> {
        Ok(None)
    }

    async fn count(&self, _kind: RecordKind) -> Result<u64, AppError> {
        Ok(0)
    }

    async fn select_recent(&self, _kind: RecordKind, _limit: u32) -> Result<Vec<Row>, AppError> {
        Ok(Vec::new())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
