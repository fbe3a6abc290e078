use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::moderation::{NewWarning, Warning, WarningStore, WarningStoreError};

/// Warnings kept in a Supabase `warnings` table, reached through its PostgREST API.
///
/// Columns: `id`, `user_id`, `moderator_id`, `reason`, `created_at`. User ids are
/// stored as text.
pub struct SupabaseWarningStore {
    client: Client,
    table_url: String,
}

impl SupabaseWarningStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, WarningStoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).map_err(|e| WarningStoreError::Malformed(e.to_string()))?,
        );
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| WarningStoreError::Malformed(e.to_string()))?,
        );
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WarningStoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/warnings", base_url.trim_end_matches('/')),
        })
    }

    fn check_status(status: StatusCode, what: &str) -> Result<(), WarningStoreError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(WarningStoreError::Unavailable(format!(
                "Supabase returned {} while {}",
                status, what
            )))
        }
    }
}

#[async_trait]
impl WarningStore for SupabaseWarningStore {
    async fn insert(&self, warning: NewWarning) -> Result<Warning, WarningStoreError> {
        let body = ApiNewWarning {
            user_id: warning.user_id.to_string(),
            moderator_id: warning.moderator_id.to_string(),
            reason: warning.reason.clone(),
            created_at: warning.created_at.to_rfc3339(),
        };

        let resp = self
            .client
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(|e| WarningStoreError::Unavailable(e.to_string()))?;
        Self::check_status(resp.status(), "inserting a warning")?;

        let rows: Vec<ApiWarning> = resp
            .json()
            .await
            .map_err(|e| WarningStoreError::Malformed(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| WarningStoreError::Malformed("insert returned no rows".to_string()))?
            .into_warning()
    }

    async fn query(&self, user_id: u64) -> Result<Vec<Warning>, WarningStoreError> {
        let resp = self
            .client
            .get(&self.table_url)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", user_id)),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await
            .map_err(|e| WarningStoreError::Unavailable(e.to_string()))?;
        Self::check_status(resp.status(), "listing warnings")?;

        let rows: Vec<ApiWarning> = resp
            .json()
            .await
            .map_err(|e| WarningStoreError::Malformed(e.to_string()))?;
        rows.into_iter().map(ApiWarning::into_warning).collect()
    }

    async fn delete_all(&self, user_id: u64) -> Result<u64, WarningStoreError> {
        let resp = self
            .client
            .delete(&self.table_url)
            .header("Prefer", "return=representation")
            .query(&[("user_id", format!("eq.{}", user_id))])
            .send()
            .await
            .map_err(|e| WarningStoreError::Unavailable(e.to_string()))?;
        Self::check_status(resp.status(), "clearing warnings")?;

        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| WarningStoreError::Malformed(e.to_string()))?;
        Ok(rows.len() as u64)
    }
}

#[derive(Debug, Serialize)]
struct ApiNewWarning {
    user_id: String,
    moderator_id: String,
    reason: String,
    created_at: String,
}

/// Ids may come back as text or numbers depending on the column type.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiId {
    Number(u64),
    Text(String),
}

impl ApiId {
    fn parse(self, column: &str) -> Result<u64, WarningStoreError> {
        match self {
            ApiId::Number(n) => Ok(n),
            ApiId::Text(s) => s
                .parse()
                .map_err(|_| WarningStoreError::Malformed(format!("{} is not an id: {:?}", column, s))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiWarning {
    id: i64,
    user_id: ApiId,
    moderator_id: ApiId,
    reason: Option<String>,
    created_at: Option<String>,
}

impl ApiWarning {
    fn into_warning(self) -> Result<Warning, WarningStoreError> {
        Ok(Warning {
            id: self.id,
            user_id: self.user_id.parse("user_id")?,
            moderator_id: self.moderator_id.parse("moderator_id")?,
            reason: self.reason.unwrap_or_else(|| "No reason provided".to_string()),
            created_at: self
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
        })
    }
}

/// Accepts RFC 3339 and the zone-less ISO form older rows were written with.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
