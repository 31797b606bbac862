//! Google Sheets v4 implementation of [`SpreadsheetStore`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::TokenProvider;
use super::error::check_status;
use super::{CellUpdate, SpreadsheetStore, StoreError};
use crate::retry::{self, RetryAction, RetryConfig};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct GoogleSheets {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    api_root: String,
    spreadsheet_id: String,
    retry: RetryConfig,
}

impl std::fmt::Debug for GoogleSheets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheets")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .finish_non_exhaustive()
    }
}

/// Qualify a range with its tab, quoting the tab name.
fn a1(tab: &str, range: &str) -> String {
    format!("'{}'!{}", tab.replace('\'', "''"), range)
}

/// Cells come back as formatted strings, but numbers and booleans can
/// appear when the render option changes; keep them as plain text.
fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn classify(e: &StoreError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

impl GoogleSheets {
    pub fn new(client: Client, tokens: Arc<dyn TokenProvider>, spreadsheet_id: &str) -> Self {
        Self::with_root(client, tokens, SHEETS_API, spreadsheet_id)
    }

    pub fn with_root(
        client: Client,
        tokens: Arc<dyn TokenProvider>,
        api_root: &str,
        spreadsheet_id: &str,
    ) -> Self {
        Self {
            client,
            tokens,
            api_root: api_root.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn values_url(&self, a1_range: &str) -> Result<Url, StoreError> {
        let base = format!("{}/{}/values", self.api_root, self.spreadsheet_id);
        let mut url = Url::parse(&base).map_err(|e| StoreError::Response {
            operation: "values",
            message: format!("invalid API root {}: {}", base, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Response {
                operation: "values",
                message: format!("API root {} cannot carry a path", base),
            })?
            .push(a1_range);
        Ok(url)
    }

    /// POST a JSON body to one of the `values:batch*` endpoints.
    async fn post_batch(&self, verb: &'static str, body: &Value) -> Result<(), StoreError> {
        retry::retry_with_backoff(&self.retry, classify, || async {
            let token = self.tokens.access_token().await?;
            let response = self
                .client
                .post(format!(
                    "{}/{}/values:{}",
                    self.api_root, self.spreadsheet_id, verb
                ))
                .bearer_auth(token)
                .json(body)
                .send()
                .await?;
            check_status(response, verb).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }
}

#[async_trait]
impl SpreadsheetStore for GoogleSheets {
    async fn read_range(&self, tab: &str, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let url = self.values_url(&a1(tab, range))?;
        let value_range: ValueRange = retry::retry_with_backoff(&self.retry, classify, || async {
            let token = self.tokens.access_token().await?;
            let response = self.client.get(url.clone()).bearer_auth(token).send().await?;
            let body = check_status(response, "values.get").await?.json().await?;
            Ok::<_, StoreError>(body)
        })
        .await?;

        Ok(value_range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn write_range(
        &self,
        tab: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), StoreError> {
        let qualified = a1(tab, range);
        let url = self.values_url(&qualified)?;
        let body = json!({
            "range": qualified,
            "majorDimension": "ROWS",
            "values": rows,
        });
        retry::retry_with_backoff(&self.retry, classify, || async {
            let token = self.tokens.access_token().await?;
            let response = self
                .client
                .put(url.clone())
                .bearer_auth(token)
                .query(&[("valueInputOption", VALUE_INPUT_OPTION)])
                .json(&body)
                .send()
                .await?;
            check_status(response, "values.update").await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn clear_ranges(&self, tab: &str, ranges: &[&str]) -> Result<(), StoreError> {
        let ranges: Vec<String> = ranges.iter().map(|r| a1(tab, r)).collect();
        self.post_batch("batchClear", &json!({ "ranges": ranges }))
            .await
    }

    async fn batch_update(&self, tab: &str, updates: Vec<CellUpdate>) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = updates
            .into_iter()
            .map(|u| json!({ "range": a1(tab, &u.range), "values": u.values }))
            .collect();
        self.post_batch(
            "batchUpdate",
            &json!({ "valueInputOption": VALUE_INPUT_OPTION, "data": data }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::auth::StaticToken;
    use wiremock::matchers::{body_json, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sheets(server: &MockServer) -> GoogleSheets {
        GoogleSheets::with_root(
            Client::new(),
            Arc::new(StaticToken("tok")),
            &format!("{}/v4/spreadsheets", server.uri()),
            "sheet1",
        )
        .with_retry(RetryConfig {
            max_retries: 0,
            base_delay_secs: 0,
            max_delay_secs: 0,
            backoff: retry::Backoff::Fixed,
        })
    }

    #[test]
    fn test_a1_quotes_tab() {
        assert_eq!(a1("Blue", "A2:G"), "'Blue'!A2:G");
        assert_eq!(a1("Dona's", "C2:C"), "'Dona''s'!C2:C");
    }

    #[tokio::test]
    async fn test_read_range_stringifies_cells() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/sheet1/values/.*Blue.*C2:R$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Blue!C2:R3",
                "values": [["INV1", 10, true], []]
            })))
            .mount(&server)
            .await;

        let rows = sheets(&server).read_range("Blue", "C2:R").await.unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["INV1".to_string(), "10".to_string(), "true".to_string()],
                vec![]
            ]
        );
    }

    #[tokio::test]
    async fn test_read_range_without_values_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"range": "X!A1"})))
            .mount(&server)
            .await;
        assert!(sheets(&server).read_range("X", "A1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_range_uses_user_entered() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/v4/spreadsheets/sheet1/values/.*A2:G$"))
            .and(query_param("valueInputOption", "USER_ENTERED"))
            .and(body_json(json!({
                "range": "'Blue'!A2:G",
                "majorDimension": "ROWS",
                "values": [["C1", "2024-12", "INV1"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        sheets(&server)
            .write_range(
                "Blue",
                "A2:G",
                vec![vec!["C1".into(), "2024-12".into(), "INV1".into()]],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clear_and_batch_update_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet1/values:batchClear"))
            .and(body_json(json!({"ranges": ["'Blue'!A2:G", "'Blue'!K2:K"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet1/values:batchUpdate"))
            .and(body_json(json!({
                "valueInputOption": "USER_ENTERED",
                "data": [{"range": "'Blue'!K3", "values": [["link"]]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let s = sheets(&server);
        s.clear_ranges("Blue", &["A2:G", "K2:K"]).await.unwrap();
        s.batch_update(
            "Blue",
            vec![CellUpdate {
                range: "K3".into(),
                values: vec![vec!["link".into()]],
            }],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;
        let err = sheets(&server)
            .clear_ranges("Blue", &["A2:G"])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 403, .. }));
    }
}
