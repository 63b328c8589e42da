//! Clever REST API client
//!
//! Only the courses resource is used. Authentication is a bearer token
//! supplied through configuration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// A course as rendered by `get_clever_courses`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Course {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
}

/// Source of course listings
#[async_trait]
pub trait CoursesClient: Send + Sync {
    /// Fetch all courses visible to the configured credential.
    /// Non-2xx responses and transport failures surface as `Error::Upstream`.
    async fn fetch_courses(&self) -> Result<Vec<Course>>;
}

/// Clever wraps every resource as `{"data": [{"data": {...}, "uri": ...}]}`
#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Option<Vec<Item>>,
}

#[derive(Deserialize)]
struct Item {
    data: Course,
}

// Clever returns identifiers as strings, but course numbers are free-form and
// occasionally arrive as JSON numbers.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// HTTP client for the Clever v3 API
pub struct CleverClient {
    client: Client,
    base_url: String,
}

impl CleverClient {
    /// Create a client against `base_url` (e.g. `https://api.clever.com/v3.0`)
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(token) = token {
            let mut value = format!("Bearer {}", token)
                .parse::<reqwest::header::HeaderValue>()
                .map_err(|e| Error::Config(format!("Invalid Clever token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| Error::Upstream {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Clever API {} returned {}: {}", path, status, body);
            return Err(Error::Upstream {
                status: Some(status.as_u16()),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CoursesClient for CleverClient {
    async fn fetch_courses(&self) -> Result<Vec<Course>> {
        let response = self.get("courses").await?;
        let status = response.status().as_u16();

        let list: ListResponse = response.json().await.map_err(|e| Error::Upstream {
            status: Some(status),
            message: format!("invalid courses payload: {}", e),
        })?;

        Ok(list
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.data)
            .collect())
    }
}
