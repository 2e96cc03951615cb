use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Serialize,
};

use super::ReviewBackend;
use crate::{
    core::{
        EngineSettings,
        KiokuError,
    },
    history::ReviewRecord,
};

const API_VERSION: u32 = 1;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> Result<Option<T>, KiokuError> {
        match self.error {
            Some(error) => Err(KiokuError::Backend(error)),
            None => Ok(self.result),
        }
    }
}

/// JSON-over-HTTP backend. Every call is a POST of `{ action, version, params }`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    url: String,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>) -> Result<Self, KiokuError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, url: url.into() })
    }

    pub fn from_settings(settings: &EngineSettings) -> Result<Self, KiokuError> {
        Self::new(settings.backend_url.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Option<T>, KiokuError> {
        let body = envelope(action, params);
        let response: ApiResponse<T> =
            self.client.post(&self.url).json(&body).send().await?.error_for_status()?.json().await?;

        response.into_result()
    }
}

fn envelope(action: &str, params: Option<serde_json::Value>) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("action".to_string(), serde_json::Value::String(action.to_string()));
    body.insert("version".to_string(), serde_json::Value::Number(API_VERSION.into()));

    if let Some(params) = params {
        body.insert("params".to_string(), params);
    }

    serde_json::Value::Object(body)
}

#[async_trait]
impl ReviewBackend for HttpBackend {
    async fn pull_all_records(&self) -> Result<Vec<ReviewRecord>, KiokuError> {
        let records: Option<Vec<ReviewRecord>> = self.request("pullReviews", None).await?;
        let records = records.unwrap_or_default();
        tracing::debug!(url = %self.url, records = records.len(), "pulled review records");
        Ok(records)
    }

    async fn push_records(&self, records: &[ReviewRecord]) -> Result<(), KiokuError> {
        let params = serde_json::json!({ "records": records });
        let _: Option<serde_json::Value> = self.request("pushReviews", Some(params)).await?;
        tracing::debug!(url = %self.url, records = records.len(), "pushed review records");
        Ok(())
    }
}
