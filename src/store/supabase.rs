//! Supabase PostgREST read client.
//!
//! Fetches the most recent rows of a table, newest first.
//!
//! Endpoint: `{base}/rest/v1/{table}?select=*&order=created_at.desc&limit={n}`
//! Auth: `apikey` header plus `Authorization: Bearer {key}`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::{RecordStore, StoreError, TableNames};
use crate::types::{RecordKind, SoccerPick, TradingSignal};

/// PostgREST client for the two prediction tables.
pub struct SupabaseStore {
    http: Client,
    base_url: String,
    api_key: SecretString,
    tables: TableNames,
}

impl SupabaseStore {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        tables: TableNames,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
            return Err(StoreError::InvalidUrl(base_url));
        }

        let http = Client::builder()
            .timeout(timeout)
            .user_agent("opus-dashboard/0.1.0")
            .build()
            .map_err(|source| StoreError::Http {
                table: "<client>".to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url,
            api_key,
            tables,
        })
    }

    /// URL for the newest `limit` rows of `table`.
    fn rows_url(&self, table: &str, limit: usize) -> String {
        format!(
            "{}/rest/v1/{}?select=*&order=created_at.desc&limit={}",
            self.base_url,
            urlencoding::encode(table),
            limit,
        )
    }

    async fn fetch_recent<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        limit: usize,
    ) -> Result<Vec<T>, StoreError> {
        let table = self.tables.table(kind);
        let url = self.rows_url(table, limit);
        debug!(%kind, table, limit, "Fetching recent rows");

        let key = self.api_key.expose_secret();
        let resp = self
            .http
            .get(&url)
            .header("apikey", key.as_str())
            .bearer_auth(key)
            .send()
            .await
            .map_err(|source| StoreError::Http {
                table: table.to_string(),
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| StoreError::Http {
            table: table.to_string(),
            source,
        })?;

        if !status.is_success() {
            return Err(StoreError::Status {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        decode_rows(table, &body)
    }
}

/// Decode a PostgREST JSON array body. Rows that fail to decode are
/// skipped so one bad row cannot hide the rest of the table.
fn decode_rows<T: DeserializeOwned>(table: &str, body: &str) -> Result<Vec<T>, StoreError> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(body).map_err(|source| StoreError::Decode {
            table: table.to_string(),
            source,
        })?;

    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(table, index, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect();

    if decoded.len() < total {
        debug!(table, kept = decoded.len(), total, "Decoded rows with skips");
    }
    Ok(decoded)
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn recent_signals(&self, limit: usize) -> Result<Vec<TradingSignal>, StoreError> {
        self.fetch_recent(RecordKind::Signals, limit).await
    }

    async fn recent_picks(&self, limit: usize) -> Result<Vec<SoccerPick>, StoreError> {
        self.fetch_recent(RecordKind::Picks, limit).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> SupabaseStore {
        SupabaseStore::new(
            base,
            SecretString::new("anon-key".to_string()),
            TableNames::default(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_rows_url() {
        let s = store("https://xyz.supabase.co/");
        assert_eq!(
            s.rows_url("session_analysis", 20),
            "https://xyz.supabase.co/rest/v1/session_analysis?select=*&order=created_at.desc&limit=20"
        );
    }

    #[test]
    fn test_rows_url_encodes_table() {
        let s = store("https://xyz.supabase.co");
        assert!(s.rows_url("odd table", 5).contains("/rest/v1/odd%20table?"));
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(store(" https://xyz.supabase.co// ").base_url, "https://xyz.supabase.co");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = SupabaseStore::new(
            "xyz.supabase.co",
            SecretString::new("k".to_string()),
            TableNames::default(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(StoreError::InvalidUrl(_))));
    }

    #[test]
    fn test_decode_empty_array() {
        let rows: Vec<TradingSignal> = decode_rows("session_analysis", "[]").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_decode_picks() {
        let body = r#"[{
            "id": "p1", "match": "Real Madrid vs Sevilla", "league": "La Liga",
            "prediction": "OVER", "line": 2.5, "confidence": 71,
            "consensus": "7/8", "result": "LOSS",
            "created_at": "2026-02-20T18:00:00+00:00"
        }]"#;
        let rows: Vec<SoccerPick> = decode_rows("model_predictions", body).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].result.as_deref(), Some("LOSS"));
        assert_eq!(rows[0].confidence, 71.0);
    }

    #[test]
    fn test_decode_skips_malformed_row() {
        let body = r#"[
            {"id": "s1", "symbol": "ES", "direction": "LONG", "entry": 5021.25,
             "tp": 5040, "sl": 5010.5, "quality": "FIRE",
             "created_at": "2026-02-20T14:30:00Z"},
            {"id": "s2", "symbol": "NQ", "direction": "SHORT", "entry": null,
             "tp": 18000, "sl": 18100, "quality": "GOOD",
             "created_at": "2026-02-20T14:20:00Z"},
            {"id": "s3", "symbol": "CL", "direction": "LONG", "entry": 78.1,
             "tp": 79, "sl": 77.5, "quality": "WEAK",
             "created_at": "2026-02-20T14:10:00Z"}
        ]"#;
        let rows: Vec<TradingSignal> = decode_rows("session_analysis", body).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s3"]);
    }

    #[test]
    fn test_decode_null_text_columns() {
        let body = r#"[
            {"id": "s1", "symbol": null, "direction": null, "entry": 5021.25,
             "tp": 5040, "sl": 5010.5, "quality": null, "consensus": null,
             "created_at": "2026-02-20T14:30:00Z"},
            {"id": "s2", "symbol": "ES", "direction": "LONG", "entry": 5030,
             "tp": 5050, "sl": 5020, "quality": "STRONG",
             "created_at": "2026-02-20T14:00:00Z"}
        ]"#;
        let rows: Vec<TradingSignal> = decode_rows("session_analysis", body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].quality, "");
        assert_eq!(rows[0].direction, "");
        assert_eq!(rows[1].quality, "STRONG");
    }

    #[test]
    fn test_decode_error_names_table() {
        let err = decode_rows::<SoccerPick>("model_predictions", "{\"message\":\"x\"}").unwrap_err();
        assert!(err.to_string().contains("model_predictions"));
    }
}
